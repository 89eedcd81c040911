//! JWS envelope for signed ACME v1 requests.
//!
//! See [RFC 7515 §7.2](https://datatracker.ietf.org/doc/html/rfc7515#section-7.2) and
//! [RFC 7638](https://datatracker.ietf.org/doc/html/rfc7638) for the thumbprint.

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::{codec, error::Result, key::KeyPair};

const ALG_RS256: &str = "RS256";

/// RSA public JSON Web Key.
///
/// This doubles as the thumbprint input, so only the required members are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
// LEXICAL ORDER OF FIELDS MATTER!
pub(crate) struct Jwk {
    e: String,
    kty: String,
    n: String,
}

impl From<&KeyPair> for Jwk {
    fn from(key: &KeyPair) -> Self {
        Jwk {
            e: codec::encode(&key.exponent()),
            kty: "RSA".to_owned(),
            n: codec::encode(&key.modulus()),
        }
    }
}

impl Jwk {
    /// base64url of the SHA-256 digest of the canonical JWK JSON.
    pub(crate) fn thumbprint(&self) -> Result<String> {
        let jwk_json = serde_json::to_string(self).map_err(encoding_error)?;
        Ok(codec::encode(&Sha256::digest(jwk_json)))
    }
}

/// Unprotected JWS header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JwsHeader {
    alg: String,
    jwk: Jwk,
}

impl JwsHeader {
    fn new(jwk: Jwk) -> Self {
        JwsHeader {
            alg: ALG_RS256.to_owned(),
            jwk,
        }
    }
}

/// Protected JWS header: the unprotected one plus the anti-replay nonce.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct JwsProtectedHeader {
    alg: String,
    jwk: Jwk,
    nonce: String,
}

/// Signed request body.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct SignedBody {
    header: JwsHeader,
    protected: String,
    payload: String,
    signature: String,
}

impl SignedBody {
    /// Signs `payload` with `key`, binding it to `nonce`.
    pub(crate) fn new<T: Serialize + ?Sized>(key: &KeyPair, nonce: String, payload: &T) -> Result<Self> {
        let jwk = Jwk::from(key);

        let protected = {
            let protected = JwsProtectedHeader {
                alg: ALG_RS256.to_owned(),
                jwk: jwk.clone(),
                nonce,
            };
            let pro_json = serde_json::to_string(&protected).map_err(encoding_error)?;
            codec::encode(&pro_json)
        };

        let payload = {
            let payload_json = serde_json::to_string(payload).map_err(encoding_error)?;
            codec::encode(&payload_json)
        };

        let to_sign = format!("{protected}.{payload}");
        let signature = codec::encode(&key.sign(to_sign.as_bytes())?);

        Ok(SignedBody {
            header: JwsHeader::new(jwk),
            protected,
            payload,
            signature,
        })
    }

    pub(crate) fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(encoding_error)
    }
}

fn encoding_error(err: serde_json::Error) -> crate::Error {
    crate::Error::Encoding(err.to_string())
}
