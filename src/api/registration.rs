use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload of a `new-reg` request.
///
/// # Example JSON
///
/// ```json
/// {
///   "resource": "new-reg",
///   "agreement": "https://letsencrypt.org/documents/LE-SA-v1.0.1-July-27-2015.pdf",
///   "contact": ["mailto:cert-admin@example.com"]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRegistration {
    pub resource: &'static str,

    /// URL of the subscriber agreement being accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agreement: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact: Option<Vec<String>>,
}

impl NewRegistration {
    pub fn new(agreement: Option<String>, email: Option<&str>) -> Self {
        NewRegistration {
            resource: "new-reg",
            agreement,
            contact: email.map(|email| vec![format!("mailto:{email}")]),
        }
    }
}

/// Registration object returned by the server.
///
/// Every field is optional; CAs differ in what they echo back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: Option<u64>,

    /// Public key the registration is bound to, as a JWK.
    pub key: Option<Value>,

    #[serde(default)]
    pub contact: Vec<String>,

    pub agreement: Option<String>,

    pub initial_ip: Option<String>,

    /// Uses RFC 3339 format.
    pub created_at: Option<String>,

    pub status: Option<String>,
}
