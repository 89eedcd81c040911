use std::{fmt, fs, path::Path};

use pkcs8::{DecodePrivateKey as _, DecodePublicKey as _, EncodePrivateKey as _, EncodePublicKey as _};
use rsa::{
    pkcs1::{DecodeRsaPrivateKey as _, DecodeRsaPublicKey as _},
    pkcs1v15::SigningKey,
    signature::{SignatureEncoding as _, Signer as _},
    traits::PublicKeyParts as _,
    RsaPrivateKey, RsaPublicKey,
};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{Error, KeyLoadError, KeyType, Result};

/// Modulus size of generated keys.
pub const DEFAULT_KEY_BITS: usize = 4096;

/// An RSA key pair, used either as the account identity or as a certificate's domain key.
///
/// Both halves are always present and never change after construction.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyPair {
    public_key: RsaPublicKey,
    private_key: RsaPrivateKey,
}

impl KeyPair {
    /// Pairs a public key with its private key.
    ///
    /// Fails if `public_key` is not the public half of `private_key`.
    pub fn new(public_key: RsaPublicKey, private_key: RsaPrivateKey) -> Result<Self, KeyLoadError> {
        if private_key.to_public_key() != public_key {
            return Err(KeyLoadError {
                key_type: KeyType::Public,
                path: None,
                message: "public key does not belong to the private key".to_owned(),
            });
        }

        Ok(KeyPair {
            public_key,
            private_key,
        })
    }

    /// Generates a fresh 4096-bit key pair.
    pub fn generate() -> Result<Self> {
        Self::generate_with_size(DEFAULT_KEY_BITS)
    }

    /// Generates a fresh key pair with a `bits`-sized modulus.
    pub fn generate_with_size(bits: usize) -> Result<Self> {
        let csprng = &mut rand::thread_rng();
        let private_key = RsaPrivateKey::new(csprng, bits).map_err(Error::KeyGeneration)?;
        Ok(Self::from_private_key(private_key))
    }

    /// Derives the public half from `private_key`.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        KeyPair {
            public_key: private_key.to_public_key(),
            private_key,
        }
    }

    /// Reads a key pair from a public key file and a private key file (PEM, PKCS#8 or PKCS#1).
    pub fn load(
        public_key_file: impl AsRef<Path>,
        private_key_file: impl AsRef<Path>,
    ) -> Result<Self, KeyLoadError> {
        let public_key_file = public_key_file.as_ref();
        let private_key_file = private_key_file.as_ref();

        let public_pem = read_key_file(KeyType::Public, public_key_file)?;
        let private_pem = read_key_file(KeyType::Private, private_key_file)?;

        let public_key = parse_public_key(&public_pem).map_err(|message| KeyLoadError {
            key_type: KeyType::Public,
            path: Some(public_key_file.to_owned()),
            message,
        })?;

        let private_key = parse_private_key(&private_pem).map_err(|message| KeyLoadError {
            key_type: KeyType::Private,
            path: Some(private_key_file.to_owned()),
            message,
        })?;

        Self::new(public_key, private_key).map_err(|err| KeyLoadError {
            path: Some(public_key_file.to_owned()),
            ..err
        })
    }

    /// Parses a key pair from in-memory PEM.
    pub fn from_pem(public_pem: &str, private_pem: &str) -> Result<Self, KeyLoadError> {
        let public_key = parse_public_key(public_pem).map_err(|message| KeyLoadError {
            key_type: KeyType::Public,
            path: None,
            message,
        })?;

        let private_key = parse_private_key(private_pem).map_err(|message| KeyLoadError {
            key_type: KeyType::Private,
            path: None,
            message,
        })?;

        Self::new(public_key, private_key)
    }

    /// Parses a private key PEM and derives the public half.
    pub fn from_private_pem(private_pem: &str) -> Result<Self, KeyLoadError> {
        let private_key = parse_private_key(private_pem).map_err(|message| KeyLoadError {
            key_type: KeyType::Private,
            path: None,
            message,
        })?;

        Ok(Self::from_private_key(private_key))
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Public modulus as an unsigned big-endian byte string.
    pub fn modulus(&self) -> Vec<u8> {
        self.public_key.n().to_bytes_be()
    }

    /// Public exponent as an unsigned big-endian byte string.
    pub fn exponent(&self) -> Vec<u8> {
        self.public_key.e().to_bytes_be()
    }

    /// RSASSA-PKCS1-v1_5 signature of `data` using SHA-256.
    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signature = self.signing_key().try_sign(data)?;
        Ok(signature.to_vec())
    }

    /// The private key in PKCS#8 PEM format.
    pub fn private_key_pem(&self) -> Result<Zeroizing<String>> {
        self.private_key
            .to_pkcs8_pem(pkcs8::LineEnding::LF)
            .map_err(|err| Error::Encoding(err.to_string()))
    }

    /// The public key in SPKI PEM format.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public_key
            .to_public_key_pem(pkcs8::LineEnding::LF)
            .map_err(|err| Error::Encoding(err.to_string()))
    }

    pub(crate) fn signing_key(&self) -> SigningKey<Sha256> {
        SigningKey::<Sha256>::new(self.private_key.clone())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &(self.public_key.size() * 8))
            .finish_non_exhaustive()
    }
}

fn read_key_file(key_type: KeyType, path: &Path) -> Result<String, KeyLoadError> {
    let err = |message: String| KeyLoadError {
        key_type,
        path: Some(path.to_owned()),
        message,
    };

    if !path.exists() {
        return Err(err("file does not exist".to_owned()));
    }

    fs::read_to_string(path).map_err(|io| err(io.to_string()))
}

fn parse_public_key(pem: &str) -> Result<RsaPublicKey, String> {
    RsaPublicKey::from_public_key_pem(pem)
        .map_err(|err| err.to_string())
        .or_else(|spki_err| {
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|_| spki_err)
        })
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, String> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .map_err(|err| err.to_string())
        .or_else(|pkcs8_err| {
            RsaPrivateKey::from_pkcs1_pem(pem).map_err(|_| pkcs8_err)
        })
}
