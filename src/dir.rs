use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use reqwest::Method;
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    req::{HttpRequest, HttpSender},
    trans::{exchange, parse_json, NonceSlot},
};

const LETSENCRYPT_URL: &str = "https://acme-v01.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging.api.letsencrypt.org/directory";

/// Subscriber agreement accepted on registration with the Let's Encrypt v1 directories.
pub const LETSENCRYPT_LICENSE: &str =
    "https://letsencrypt.org/documents/LE-SA-v1.0.1-July-27-2015.pdf";

/// Enumeration of known ACME API directories.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid" certificates. The root signing
    /// certificate is not supposed to be in any trust chains.
    LetsEncryptStaging,

    /// Provide an arbitrary director URL to connect to.
    Other(&'a str),
}

impl<'a> DirectoryUrl<'a> {
    pub fn to_url(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::Other(url) => url,
        }
    }
}

/// Resources an ACME v1 directory may list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    NewRegistration,
    NewAuthorization,
    NewCertificate,
    RevokeCertificate,
}

impl Resource {
    pub const ALL: [Resource; 4] = [
        Resource::NewRegistration,
        Resource::NewAuthorization,
        Resource::NewCertificate,
        Resource::RevokeCertificate,
    ];

    /// Key of this resource in the directory object.
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::NewRegistration => "new-reg",
            Resource::NewAuthorization => "new-authz",
            Resource::NewCertificate => "new-cert",
            Resource::RevokeCertificate => "revoke-cert",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resource {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|resource| resource.as_str() == name)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown ACME resource \"{name}\"")))
    }
}

/// Resource URLs of one ACME server, fetched once.
///
/// The directory also owns the nonce captured by the fetch; clients built on it share that slot.
#[derive(Debug, Clone)]
pub struct Directory {
    url: String,
    resources: HashMap<String, String>,
    terms_of_service: Option<String>,
    nonce: Arc<NonceSlot>,
}

impl Directory {
    /// GETs the directory at `url`.
    pub async fn fetch<S: HttpSender>(sender: &S, url: DirectoryUrl<'_>) -> Result<Directory> {
        let url = url.to_url();
        let nonce = Arc::new(NonceSlot::default());

        log::debug!("Fetch directory: {url}");
        let res = exchange(sender, &nonce, HttpRequest::new(Method::GET, url)).await?;
        let object = parse_json::<Map<String, Value>>(&Method::GET, url, &res)?;

        // non-string entries such as "meta" are not resources
        let terms_of_service = object
            .get("meta")
            .and_then(|meta| meta.get("terms-of-service").or_else(|| meta.get("termsOfService")))
            .and_then(Value::as_str)
            .map(str::to_owned);

        let resources = object
            .into_iter()
            .filter_map(|(name, value)| match value {
                Value::String(target) => Some((name, target)),
                _ => None,
            })
            .collect();

        Ok(Directory {
            url: url.to_owned(),
            resources,
            terms_of_service,
            nonce,
        })
    }

    /// Builds a directory from an already known mapping, without I/O.
    pub fn from_resources(url: impl Into<String>, resources: HashMap<String, String>) -> Self {
        Directory {
            url: url.into(),
            resources,
            terms_of_service: None,
            nonce: Arc::default(),
        }
    }

    /// Looks up a resource by its wire name.
    ///
    /// Returns `Ok(None)` when the name is valid but the server does not offer it.
    pub fn resolve(&self, name: &str) -> Result<Option<&str>> {
        let resource = name.parse::<Resource>()?;
        Ok(self.resources.get(resource.as_str()).map(String::as_str))
    }

    /// URL of `resource`, failing if the server does not offer it.
    pub fn url_for(&self, resource: Resource) -> Result<&str> {
        self.resources
            .get(resource.as_str())
            .map(String::as_str)
            .ok_or(Error::ResourceUnsupported(resource))
    }

    /// The directory's own URL; also where fresh nonces are fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Subscriber agreement advertised in the directory's `meta` object.
    pub fn terms_of_service(&self) -> Option<&str> {
        self.terms_of_service.as_deref()
    }

    pub(crate) fn nonce_slot(&self) -> Arc<NonceSlot> {
        Arc::clone(&self.nonce)
    }
}
