use serde::{Deserialize, Serialize};

use crate::api;

/// An ACME challenge object.
///
/// Represents a server's offer to validate a client's possession of an identifier in a specific
/// way.
///
/// # Example JSON
///
/// ```json
/// {
///   "type": "http-01",
///   "status": "pending",
///   "uri": "https://acme-staging.api.letsencrypt.org/acme/challenge/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs/216789597",
///   "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Type of challenge encoded in the object.
    #[serde(rename = "type")]
    pub _type: String,

    /// URL to which a response can be posted.
    #[serde(alias = "url")]
    pub uri: String,

    #[serde(default)]
    pub token: String,

    pub status: Option<String>,

    /// Error that occurred while the server was validating the challenge, if any.
    pub error: Option<api::Problem>,
}

/// Payload posted to a challenge URI once the key authorization is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub resource: &'static str,

    #[serde(rename = "type")]
    pub _type: &'static str,

    pub key_authorization: String,

    pub token: String,
}

impl ChallengeResponse {
    pub fn http(key_authorization: &str, token: &str) -> Self {
        ChallengeResponse {
            resource: "challenge",
            _type: "http-01",
            key_authorization: key_authorization.to_owned(),
            token: token.to_owned(),
        }
    }
}
