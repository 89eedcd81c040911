use serde::{Deserialize, Serialize};

use crate::api;

/// Payload of a `new-authz` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewAuthorization {
    pub resource: &'static str,
    pub identifier: api::Identifier,
}

impl NewAuthorization {
    pub fn dns(domain: &str) -> Self {
        NewAuthorization {
            resource: "new-authz",
            identifier: api::Identifier::dns(domain),
        }
    }
}

// {
//   "identifier": {
//     "type": "dns",
//     "value": "example.com"
//   },
//   "status": "pending",
//   "expires": "2016-01-09T08:26:43Z",
//   "challenges": [
//     {
//       "type": "http-01",
//       "status": "pending",
//       "uri": "https://example.com/acme/challenge/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs/216789597",
//       "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
//     },
//     {
//       "type": "dns-01",
//       "status": "pending",
//       "uri": "https://example.com/acme/challenge/YTqpYUthlVfwBncUufE8IRA2TkzZkN4eYWWLMSRqcSs/216789599",
//       "token": "RRo2ZcXAEqxKvMH8RGcATjSK1KknLEUmauwfQ5i3gG8"
//     }
//   ],
//   "combinations": [[0], [1]]
// }
/// An ACME authorization object.
///
/// Represents a server's authorization for an account to represent an identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: Option<api::Identifier>,

    pub status: Option<String>,

    /// Uses RFC 3339 format.
    pub expires: Option<String>,

    /// Challenges the client can fulfill to prove possession of the identifier.
    ///
    /// Absent and `null` are both `None`.
    pub challenges: Option<Vec<api::Challenge>>,
}

impl Authorization {
    /// Offered challenges; empty when the server listed none.
    pub fn challenges(&self) -> &[api::Challenge] {
        self.challenges.as_deref().unwrap_or_default()
    }

    /// Returns the first `http-01` challenge, if one is present.
    pub fn http_challenge(&self) -> Option<&api::Challenge> {
        self.challenges().iter().find(|c| c._type == "http-01")
    }
}
