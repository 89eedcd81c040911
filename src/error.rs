use std::{fmt, path::PathBuf};

use reqwest::Method;
use serde_json::Value;

use crate::{
    api::Problem,
    dir::Resource,
    req::{ConnectionError, HttpRequest, HttpResponse},
};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Prefix of every ACME v1 error type URN.
const ERROR_URN_PREFIX: &str = "urn:acme:error:";

/// Response bodies quoted in error messages are cut at this many characters.
const BODY_SUMMARY_LEN: usize = 120;

/// Everything that can go wrong while talking to an ACME server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operation was called before an account key pair was bound.
    #[error("no account key pair is set, call `use_account_key_pair` first")]
    AccountKeyPairMissing,

    /// A caller-supplied value is unusable.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The server's directory does not list this resource.
    #[error("the ACME server does not offer the \"{0}\" resource")]
    ResourceUnsupported(Resource),

    /// The server answered with an error, or could not be reached.
    #[error(transparent)]
    Server(#[from] ServerError),

    /// The server claimed success but its body is not what the protocol requires.
    #[error("The ACME server did not return a valid response on request \"{method} {url}\" ({reason})")]
    MalformedResponse {
        method: String,
        url: String,
        reason: String,
    },

    /// The authorization offers no `http-01` challenge.
    #[error("the ACME server offered no http-01 challenge for {domain}")]
    ChallengeNotSupported { domain: String },

    /// The server reported the challenge as invalid (or reported no status).
    #[error("{message}")]
    ChallengeFailed { message: String, response: Value },

    /// The challenge was still pending when the polling budget ran out.
    #[error("Check challenge timed out (body: {response})")]
    ChallengeTimedOut { response: Value },

    /// The certificate location answered with an unexpected status.
    #[error("{message}")]
    CertificateRequestFailed {
        status: u16,
        message: String,
        body: String,
    },

    /// The certificate was still being issued when the polling budget ran out.
    #[error("Certificate request timed out (body: {body})")]
    CertificateRequestTimedOut { body: String },

    #[error(transparent)]
    KeyLoad(#[from] KeyLoadError),

    #[error("RSA key generation failed: {0}")]
    KeyGeneration(#[source] rsa::Error),

    #[error("CSR generation failed: {0}")]
    CsrGeneration(String),

    #[error("signing failed: {0}")]
    Signing(#[from] rsa::signature::Error),

    #[error("encoding failed: {0}")]
    Encoding(String),

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("could not build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl Error {
    pub(crate) fn malformed(method: &Method, url: &str, reason: impl Into<String>) -> Self {
        Error::MalformedResponse {
            method: method.to_string(),
            url: url.to_owned(),
            reason: reason.into(),
        }
    }

    /// Builds [`Error::ChallengeFailed`], preferring the `http-01` challenge's own error detail.
    pub(crate) fn challenge_failed(response: Value) -> Self {
        let detail = response["challenges"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|challenge| challenge["type"] == "http-01")
            .filter_map(|challenge| challenge["error"]["detail"].as_str())
            .last();

        let message = match detail {
            Some(detail) => {
                format!("Challenge check failed with message \"{detail}\"\nFull response:\n{response}")
            }
            None => format!("Challenge check failed (response: {response})"),
        };

        Error::ChallengeFailed { message, response }
    }

    pub(crate) fn certificate_request_failed(status: u16, body: &[u8]) -> Self {
        let body = String::from_utf8_lossy(body).into_owned();

        let detail = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|json| json["error"]["detail"].as_str().map(str::to_owned));

        let message = match detail {
            Some(detail) => format!(
                "Certificate request failed with message \"{detail}\"\nFull response:\n{body}"
            ),
            None => format!("Certificate request failed (status: {status}, response: {body})"),
        };

        Error::CertificateRequestFailed {
            status,
            message,
            body,
        }
    }

    /// Returns the classified server error, if this is one.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            Error::Server(err) => Some(err),
            _ => None,
        }
    }

    /// True for the timed-out variants: the server may still complete the operation.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::ChallengeTimedOut { .. } | Error::CertificateRequestTimedOut { .. }
        )
    }
}

/// The fixed vocabulary of ACME v1 server errors.
///
/// See [draft-ietf-acme-acme-01 §5.4](https://tools.ietf.org/html/draft-ietf-acme-acme-01#section-5.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerErrorKind {
    BadCsr,
    BadNonce,
    Connection,
    ServerInternal,
    InvalidEmail,
    Malformed,
    RateLimited,
    Tls,
    Unauthorized,
    UnknownHost,
}

impl ServerErrorKind {
    pub const ALL: [ServerErrorKind; 10] = [
        ServerErrorKind::BadCsr,
        ServerErrorKind::BadNonce,
        ServerErrorKind::Connection,
        ServerErrorKind::ServerInternal,
        ServerErrorKind::InvalidEmail,
        ServerErrorKind::Malformed,
        ServerErrorKind::RateLimited,
        ServerErrorKind::Tls,
        ServerErrorKind::Unauthorized,
        ServerErrorKind::UnknownHost,
    ];

    /// Maps a full error type URN (`urn:acme:error:<kind>`) to its kind.
    pub fn from_type(urn: &str) -> Option<Self> {
        let kind = urn.strip_prefix(ERROR_URN_PREFIX)?;
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    /// The `<kind>` part of the error type URN.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerErrorKind::BadCsr => "badCSR",
            ServerErrorKind::BadNonce => "badNonce",
            ServerErrorKind::Connection => "connection",
            ServerErrorKind::ServerInternal => "serverInternal",
            ServerErrorKind::InvalidEmail => "invalidEmail",
            ServerErrorKind::Malformed => "malformed",
            ServerErrorKind::RateLimited => "rateLimited",
            ServerErrorKind::Tls => "tls",
            ServerErrorKind::Unauthorized => "unauthorized",
            ServerErrorKind::UnknownHost => "unknownHost",
        }
    }
}

impl fmt::Display for ServerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed exchange, classified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServerError {
    /// The server sent a structured error of a known kind.
    #[error("{kind}: {detail} (on request \"{method} {url}\")")]
    Acme {
        kind: ServerErrorKind,
        method: String,
        url: String,
        detail: String,
    },

    /// An error status without a recognizable ACME error body.
    #[error("A non-ACME {status} HTTP error occurred on request \"{method} {url}\" (response body: \"{detail}\")")]
    NonAcme {
        status: u16,
        method: String,
        url: String,
        detail: String,
    },

    /// No response was received at all.
    #[error("A non-ACME error occurred on request \"{method} {url}\" (error: {detail})")]
    Unreachable {
        method: String,
        url: String,
        detail: String,
    },
}

impl ServerError {
    /// Kind of a structured ACME error.
    pub fn kind(&self) -> Option<ServerErrorKind> {
        match self {
            ServerError::Acme { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            ServerError::Acme { method, .. }
            | ServerError::NonAcme { method, .. }
            | ServerError::Unreachable { method, .. } => method,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            ServerError::Acme { url, .. }
            | ServerError::NonAcme { url, .. }
            | ServerError::Unreachable { url, .. } => url,
        }
    }

    /// Raw detail text: the server's `detail`, a body summary, or the connection error.
    pub fn detail(&self) -> &str {
        match self {
            ServerError::Acme { detail, .. }
            | ServerError::NonAcme { detail, .. }
            | ServerError::Unreachable { detail, .. } => detail,
        }
    }

    /// HTTP status of the failed response, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ServerError::NonAcme { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if problem type is "badNonce".
    ///
    /// The request can be retried as is; the failed response carried a fresh nonce.
    pub fn is_bad_nonce(&self) -> bool {
        self.kind() == Some(ServerErrorKind::BadNonce)
    }
}

/// Turns a failed exchange into a [`ServerError`].
///
/// `response` is the error response when one was received, `underlying` the connection failure
/// otherwise.
pub fn classify(
    request: &HttpRequest,
    response: Option<&HttpResponse>,
    underlying: Option<&ConnectionError>,
) -> ServerError {
    let method = request.method.to_string();
    let url = request.url.clone();

    let Some(response) = response else {
        let detail = underlying.map_or_else(|| "no response".to_owned(), ToString::to_string);
        return ServerError::Unreachable {
            method,
            url,
            detail,
        };
    };

    let problem = serde_json::from_slice::<Problem>(&response.body)
        .ok()
        .and_then(|problem| {
            let kind = ServerErrorKind::from_type(&problem._type)?;
            Some((kind, problem.detail?))
        });

    match problem {
        Some((kind, detail)) => ServerError::Acme {
            kind,
            method,
            url,
            detail,
        },

        None => ServerError::NonAcme {
            status: response.status.as_u16(),
            method,
            url,
            detail: body_summary(&response.body),
        },
    }
}

/// Printable excerpt of a response body.
pub(crate) fn body_summary(body: &[u8]) -> String {
    let body = String::from_utf8_lossy(body);
    let body = body.trim();

    match body.char_indices().nth(BODY_SUMMARY_LEN) {
        Some((idx, _)) => format!("{} (truncated...)", &body[..idx]),
        None => body.to_owned(),
    }
}

/// Which half of a key pair failed to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyType {
    Public,
    Private,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Public => f.write_str("public"),
            KeyType::Private => f.write_str("private"),
        }
    }
}

/// Reading a key from a file or PEM string failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLoadError {
    pub key_type: KeyType,

    /// File the key was read from; `None` for in-memory PEM.
    pub path: Option<PathBuf>,

    pub message: String,
}

impl fmt::Display for KeyLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "Reading of the {} key file \"{}\" failed with message: {}",
                self.key_type,
                path.display(),
                self.message
            ),
            None => write!(
                f,
                "Reading of the {} key PEM failed with message: {}",
                self.key_type, self.message
            ),
        }
    }
}

impl std::error::Error for KeyLoadError {}
