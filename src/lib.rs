//! Provisioning certificates from ACME (Automatic Certificate Management Environment) v1 providers
//! such as the original [Let's Encrypt](https://letsencrypt.org/) API.
//!
//! It speaks the draft ACME protocol (the `new-reg` / `new-authz` / `new-cert` resources), proving
//! domain ownership with `http-01` challenges.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use acme_client::{
//!     AcmeClient, ClientConfig, CsrSubject, Directory, DirectoryUrl, KeyPair, ReqwestSender,
//!     DEFAULT_TIMEOUT,
//! };
//!
//! async fn issue() -> acme_client::Result<()> {
//!     let sender = Arc::new(ReqwestSender::new(ReqwestSender::DEFAULT_TIMEOUT)?);
//!     let directory = Directory::fetch(&sender, DirectoryUrl::LetsEncryptStaging).await?;
//!
//!     let client = AcmeClient::new(sender, directory, ClientConfig::lets_encrypt())
//!         .with_account_key_pair(KeyPair::load("account.pub", "account.key")?);
//!
//!     client.register_account(None, Some("admin@example.org")).await?;
//!
//!     let challenge = client.request_challenge("example.org").await?;
//!     // serve `challenge.payload()` at `challenge.well_known_url()`, then:
//!     client.check_challenge(&challenge, DEFAULT_TIMEOUT).await?;
//!
//!     let domain_key = KeyPair::generate()?;
//!     let subject = CsrSubject::new("FR", "", "Paris", "Example", "", "admin@example.org");
//!     let cert = client
//!         .request_certificate("example.org", &domain_key, &subject, DEFAULT_TIMEOUT)
//!         .await?;
//!
//!     println!("{}", cert.pem());
//!     Ok(())
//! }
//! ```
//!
//! ## Examples
//!
//! A complete `http-01` flow, serving the challenge with Actix Web, is in `demos/http-01.rs`.
//!
//! # Domain Ownership
//!
//! The CA checks that you control the domain by fetching
//!
//! ```text
//! http://<domain>/.well-known/acme-challenge/<token>
//! ```
//!
//! which must answer with the key authorization of the [`Challenge`]. Publish it before calling
//! [`AcmeClient::check_challenge`].
//!
//! # Polling
//!
//! [`AcmeClient::check_challenge`] and [`AcmeClient::request_certificate`] wait for the CA with
//! `tokio` sleeps, so they only suspend the task driving them. Dropping the returned future
//! cancels the flow. Let's Encrypt enforces [rate limits], so don't set the poll interval too low.
//!
//! ## Use Staging For Development!
//!
//! Especially take care to use the Let's Encrypt staging environment for development where the rate
//! limits are more relaxed. See [`DirectoryUrl::LetsEncryptStaging`].
//!
//! [rate limits]: https://letsencrypt.org/docs/rate-limits

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod cert;
mod client;
mod dir;
mod error;
mod jws;
mod key;
mod req;
mod trans;

pub mod api;
pub mod codec;


pub use crate::{
    cert::{Certificate, CsrSubject},
    client::{AcmeClient, Account, Challenge, ClientConfig, DEFAULT_TIMEOUT},
    dir::{Directory, DirectoryUrl, Resource, LETSENCRYPT_LICENSE},
    error::{classify, Error, KeyLoadError, KeyType, Result, ServerError, ServerErrorKind},
    key::{KeyPair, DEFAULT_KEY_BITS},
    req::{ConnectionError, HttpRequest, HttpResponse, HttpSender, ReqwestSender, REPLAY_NONCE},
};
