//! JSON API payloads.
//!
//! These follow the ACME v1 wire format, where each request names its `resource`. Not intended to
//! be used directly. Provided to aid debugging.

use std::fmt;

use serde::{Deserialize, Serialize};

mod authorization;
mod certificate;
mod challenge;
mod identifier;
mod registration;

pub use self::{
    authorization::{Authorization, NewAuthorization},
    certificate::NewCertificate,
    challenge::{Challenge, ChallengeResponse},
    identifier::Identifier,
    registration::{NewRegistration, Registration},
};

/// Structured error document sent by the server alongside an error status.
///
/// # Example JSON
///
/// ```json
/// {
///   "type": "urn:acme:error:badNonce",
///   "detail": "JWS has invalid anti-replay nonce",
///   "status": 400
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "type")]
    pub _type: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self._type),
            _ => write!(f, "{}", self._type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_display() {
        let problem = serde_json::from_str::<Problem>(
            r#"{"type":"urn:acme:error:malformed","detail":"Registration key is already in use","status":409}"#,
        )
        .unwrap();

        assert_eq!(problem.status, Some(409));
        assert_eq!(
            problem.to_string(),
            "urn:acme:error:malformed: Registration key is already in use"
        );
    }
}
