use serde::{Deserialize, Serialize};

/// Identifier an authorization is requested for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    /// Only `dns` is defined.
    #[serde(rename = "type")]
    pub _type: String,

    pub value: String,
}

impl Identifier {
    pub fn dns(value: impl Into<String>) -> Self {
        Identifier {
            _type: "dns".to_owned(),
            value: value.into(),
        }
    }
}
