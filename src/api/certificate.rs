use serde::Serialize;

/// Payload of a `new-cert` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCertificate {
    pub resource: &'static str,

    /// base64url of the DER-encoded CSR (not PEM).
    pub csr: String,
}

impl NewCertificate {
    pub fn new(csr: String) -> Self {
        NewCertificate {
            resource: "new-cert",
            csr,
        }
    }
}
