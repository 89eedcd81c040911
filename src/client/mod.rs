use std::{fmt, sync::Arc, time::Duration};

use reqwest::{header::LOCATION, Method};
use tokio::time::Instant;

use crate::{
    api,
    dir::{Directory, Resource, LETSENCRYPT_LICENSE},
    error::{Error, Result},
    key::KeyPair,
    req::{HttpSender, ReqwestSender},
    trans::{parse_json, Transport},
};

mod auth;
mod issue;

pub use self::auth::Challenge;

/// Default polling budget of [`AcmeClient::check_challenge`] and
/// [`AcmeClient::request_certificate`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// End of a polling budget, `None` when `timeout` reaches past what an [`Instant`] can hold.
pub(crate) fn poll_deadline(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Pause before the next poll, or `None` once `deadline` has passed.
pub(crate) fn next_poll_delay(deadline: Option<Instant>, interval: Duration) -> Option<Duration> {
    let Some(deadline) = deadline else {
        return Some(interval);
    };

    let now = Instant::now();
    (now < deadline).then(|| interval.min(deadline - now))
}

/// Per-CA settings of an [`AcmeClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Subscriber agreement accepted on registration when the caller supplies none.
    pub license: Option<String>,

    /// Pause between two polling requests.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            license: None,
            poll_interval: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    /// Settings for the Let's Encrypt v1 directories.
    pub fn lets_encrypt() -> Self {
        ClientConfig {
            license: Some(LETSENCRYPT_LICENSE.to_owned()),
            ..Default::default()
        }
    }
}

/// A registration with an ACME provider, as returned by [`AcmeClient::register_account`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    location: Option<String>,
    registration: api::Registration,
}

impl Account {
    /// URL of the registration resource, if the server sent one.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Returns a reference to the registration's API object.
    ///
    /// Useful for debugging.
    pub fn registration(&self) -> &api::Registration {
        &self.registration
    }
}

/// ACME v1 protocol client.
///
/// Setup is:
///
/// 1. [`Directory::fetch()`] against the CA's directory URL.
/// 2. [`AcmeClient::new()`] with the directory.
/// 3. [`AcmeClient::use_account_key_pair()`] to bind the account identity.
///
/// Every operation fails with [`Error::AccountKeyPairMissing`], before any request is made, if
/// step 3 was skipped.
pub struct AcmeClient<S = ReqwestSender> {
    sender: Arc<S>,
    directory: Directory,
    config: ClientConfig,
    transport: Option<Transport<S>>,
}

impl<S: HttpSender> AcmeClient<S> {
    pub fn new(sender: Arc<S>, directory: Directory, config: ClientConfig) -> Self {
        AcmeClient {
            sender,
            directory,
            config,
            transport: None,
        }
    }

    /// Builder-style [`use_account_key_pair`](Self::use_account_key_pair).
    pub fn with_account_key_pair(mut self, key_pair: KeyPair) -> Self {
        self.use_account_key_pair(key_pair);
        self
    }

    /// Binds (or re-binds) the account identity used to sign requests.
    pub fn use_account_key_pair(&mut self, key_pair: KeyPair) {
        self.transport = Some(Transport::new(
            Arc::clone(&self.sender),
            self.directory.nonce_slot(),
            self.directory.url(),
            key_pair,
        ));
    }

    pub fn account_key_pair(&self) -> Option<&KeyPair> {
        self.transport.as_ref().map(Transport::account_key)
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn transport(&self) -> Result<&Transport<S>> {
        self.transport.as_ref().ok_or(Error::AccountKeyPairMissing)
    }

    /// Registers the account key with the CA.
    ///
    /// `agreement` defaults to the configured license. Registering a key twice is reported by the
    /// server as an error, which is returned as is.
    pub async fn register_account(
        &self,
        agreement: Option<&str>,
        email: Option<&str>,
    ) -> Result<Account> {
        let transport = self.transport()?;

        let url = self.directory.url_for(Resource::NewRegistration)?;

        let agreement = agreement
            .map(str::to_owned)
            .or_else(|| self.config.license.clone());
        let payload = api::NewRegistration::new(agreement, email);

        log::debug!("Registering account: {payload:?}");

        let res = transport.signed_request(Method::POST, url, &payload).await?;

        let location = res.header(&LOCATION).map(str::to_owned);
        let registration = parse_json::<api::Registration>(&Method::POST, url, &res)?;

        log::info!("Account registered: {}", location.as_deref().unwrap_or(url));

        Ok(Account {
            location,
            registration,
        })
    }
}

impl<S> fmt::Debug for AcmeClient<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcmeClient")
            .field("directory", &self.directory.url())
            .field("config", &self.config)
            .field("account_key_pair", &self.transport.is_some())
            .finish_non_exhaustive()
    }
}
