//! URL-safe base64 used for every byte string that crosses the wire inside JSON.
//!
//! See [RFC 4648 §5](https://datatracker.ietf.org/doc/html/rfc4648#section-5).

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    prelude::*,
};

pub use base64::DecodeError;

/// Lenient decoder: padding is optional and unused trailing bits are ignored.
const LENIENT_URL_SAFE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Encodes `input` as unpadded base64url.
pub fn encode<T: ?Sized + AsRef<[u8]>>(input: &T) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

/// Encodes `input` as base64url, keeping the trailing `=` padding.
pub fn encode_with_padding<T: ?Sized + AsRef<[u8]>>(input: &T) -> String {
    BASE64_URL_SAFE.encode(input)
}

/// Decodes base64url (or standard base64) input, with or without padding.
///
/// Bytes outside the base64 alphabet, whitespace included, are skipped the way a non-strict
/// base64 decoder skips them. As a result `" AA"` decodes to `"\0"`.
pub fn decode<T: ?Sized + AsRef<[u8]>>(input: &T) -> Result<Vec<u8>, DecodeError> {
    let normalized = input
        .as_ref()
        .iter()
        .filter_map(|&byte| match byte {
            b'+' => Some(b'-'),
            b'/' => Some(b'_'),
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' => Some(byte),
            _ => None,
        })
        .collect::<Vec<u8>>();

    LENIENT_URL_SAFE.decode(normalized)
}
