use std::time::Duration;

use reqwest::{header::LOCATION, Method};
use serde_json::Value;
use tokio::time::sleep;

use crate::{
    api,
    dir::Resource,
    error::{Error, Result},
    jws::Jwk,
    key::KeyPair,
    req::HttpSender,
    trans::{expect_header, parse_json},
};

use super::{next_poll_delay, poll_deadline, AcmeClient};

/// An `http-01` challenge obtained from [`AcmeClient::request_challenge`].
///
/// The [`payload`](Self::payload) must be served at [`well_known_url`](Self::well_known_url)
/// before calling [`AcmeClient::check_challenge`]:
///
/// ```text
/// http://<domain>/.well-known/acme-challenge/<token>
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    domain: String,
    url: String,
    token: String,
    payload: String,
    location: String,
}

impl Challenge {
    pub fn new(
        domain: impl Into<String>,
        url: impl Into<String>,
        token: impl Into<String>,
        payload: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Challenge {
            domain: domain.into(),
            url: url.into(),
            token: token.into(),
            payload: payload.into(),
            location: location.into(),
        }
    }

    /// Domain name being authorized.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// URL the challenge response is posted to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the token, a unique identifier of the challenge.
    ///
    /// This is used as the file name in the HTTP challenge.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The key authorization: the exact content to serve for the token.
    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// URL of the authorization resource, polled while the challenge is checked.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Where the CA will look for the key authorization.
    pub fn well_known_url(&self) -> String {
        format!(
            "http://{}/.well-known/acme-challenge/{}",
            self.domain, self.token
        )
    }
}

impl<S: HttpSender> AcmeClient<S> {
    /// Requests an authorization for `domain` and returns its `http-01` challenge.
    ///
    /// Other challenge types offered by the server are ignored.
    pub async fn request_challenge(&self, domain: &str) -> Result<Challenge> {
        let transport = self.transport()?;

        if domain.is_empty() {
            return Err(Error::InvalidArgument(
                "request_challenge: domain must not be empty".to_owned(),
            ));
        }

        let url = self.directory().url_for(Resource::NewAuthorization)?;

        log::debug!("Requesting challenge for domain {domain}");

        let res = transport
            .signed_request(Method::POST, url, &api::NewAuthorization::dns(domain))
            .await?;

        let authz = parse_json::<api::Authorization>(&Method::POST, url, &res)?;

        let not_supported = || Error::ChallengeNotSupported {
            domain: domain.to_owned(),
        };

        if authz.challenges().is_empty() {
            return Err(not_supported());
        }

        let http = authz.http_challenge().ok_or_else(not_supported)?;

        let payload = key_authorization(&http.token, transport.account_key())?;
        let location = expect_header(&Method::POST, url, &res, &LOCATION)?;

        log::info!("Challenge data found for domain {domain}: token {}", http.token);

        Ok(Challenge::new(
            domain,
            &http.uri,
            &http.token,
            payload,
            location,
        ))
    }

    /// Tells the CA to validate `challenge` and waits until it is no longer pending.
    ///
    /// The key authorization must already be served at
    /// [`Challenge::well_known_url`]. Polling stops with
    /// [`Error::ChallengeTimedOut`] once `timeout` has elapsed.
    pub async fn check_challenge(&self, challenge: &Challenge, timeout: Duration) -> Result<()> {
        let transport = self.transport()?;

        let payload = api::ChallengeResponse::http(challenge.payload(), challenge.token());

        log::debug!(
            "Asking server to check challenge on {}: {payload:?}",
            challenge.well_known_url()
        );

        let res = transport
            .signed_request(Method::POST, challenge.url(), &payload)
            .await?;
        let response = parse_json::<Value>(&Method::POST, challenge.url(), &res)?;
        ensure_not_failed(response)?;

        let deadline = poll_deadline(timeout);

        loop {
            let res = transport
                .unsigned_request(Method::GET, challenge.location(), None)
                .await?;
            let response = parse_json::<Value>(&Method::GET, challenge.location(), &res)?;
            let response = ensure_not_failed(response)?;

            if response["status"] != "pending" {
                break;
            }

            let Some(delay) = next_poll_delay(deadline, self.config().poll_interval) else {
                return Err(Error::ChallengeTimedOut { response });
            };

            sleep(delay).await;
        }

        log::info!("Challenge check succeeded: {}", challenge.well_known_url());

        Ok(())
    }
}

/// `token` joined with the thumbprint of the account key.
///
/// See [RFC 8555 §8.1](https://datatracker.ietf.org/doc/html/rfc8555#section-8.1).
pub(crate) fn key_authorization(token: &str, key: &KeyPair) -> Result<String> {
    let thumbprint = Jwk::from(key).thumbprint()?;
    Ok(format!("{token}.{thumbprint}"))
}

/// A missing, empty or `invalid` status ends the check.
fn ensure_not_failed(response: Value) -> Result<Value> {
    match response["status"].as_str() {
        None | Some("") | Some("invalid") => Err(Error::challenge_failed(response)),
        Some(_) => Ok(response),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::{
        client::{ClientConfig, DEFAULT_TIMEOUT},
        dir::{Directory, DirectoryUrl},
        req::ReqwestSender,
        test::{
            account_key, directory_mock, mock_directory, response, MockSender, ACCOUNT_THUMBPRINT,
        },
    };

    const AUTHZ_URL: &str = "https://ca.test/acme/authz/abc";
    const CHALLENGE_URL: &str = "https://ca.test/acme/challenge/abc/1";

    fn challenge() -> Challenge {
        Challenge::new(
            "example.com",
            CHALLENGE_URL,
            "tok1",
            format!("tok1.{ACCOUNT_THUMBPRINT}"),
            AUTHZ_URL,
        )
    }

    async fn client(sender: &Arc<MockSender>) -> AcmeClient<MockSender> {
        let directory = mock_directory(sender).await;
        let config = ClientConfig {
            poll_interval: Duration::from_millis(100),
            ..Default::default()
        };
        AcmeClient::new(sender.clone(), directory, config).with_account_key_pair(account_key())
    }

    fn count(sender: &MockSender, method: Method, url: &str) -> usize {
        sender
            .requests()
            .iter()
            .filter(|req| req.method == method && req.url == url)
            .count()
    }

    #[test]
    fn test_key_authorization() {
        assert_eq!(
            key_authorization("tok1", &account_key()).unwrap(),
            "tok1.8zYim9b6COmO4DvUgv3wDVfhciNQ75aS-0y5x-WYJmQ"
        );
    }

    #[test]
    fn test_well_known_url() {
        assert_eq!(
            challenge().well_known_url(),
            "http://example.com/.well-known/acme-challenge/tok1"
        );
    }

    #[tokio::test]
    async fn test_request_challenge_end_to_end() {
        let server = crate::test::with_directory_server();
        let sender = Arc::new(ReqwestSender::new(ReqwestSender::DEFAULT_TIMEOUT).unwrap());

        let directory = Directory::fetch(&sender, DirectoryUrl::Other(&server.dir_url))
            .await
            .unwrap();
        let client = AcmeClient::new(sender, directory, ClientConfig::lets_encrypt())
            .with_account_key_pair(account_key());

        client.register_account(None, Some("foo@bar.com")).await.unwrap();

        let challenge = client.request_challenge("example.com").await.unwrap();

        assert_eq!(challenge.domain(), "example.com");
        assert_eq!(challenge.token(), "tok1");
        assert_eq!(
            challenge.payload(),
            "tok1.8zYim9b6COmO4DvUgv3wDVfhciNQ75aS-0y5x-WYJmQ"
        );
        assert_eq!(
            challenge.url(),
            format!("{}/acme/challenge/abc/1", server.url)
        );
        assert_eq!(challenge.location(), format!("{}/acme/authz/abc", server.url));

        client
            .check_challenge(&challenge, DEFAULT_TIMEOUT)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_request_challenge_without_challenges() {
        let sender = Arc::new(directory_mock(|_req| {
            Ok(response(201, r#"{"status":"pending","challenges":[]}"#, "n")
                .with_header(LOCATION, AUTHZ_URL.parse().unwrap()))
        }));
        let client = client(&sender).await;

        let err = client.request_challenge("example.com").await.unwrap_err();
        assert!(matches!(err, Error::ChallengeNotSupported { ref domain } if domain == "example.com"));
    }

    #[tokio::test]
    async fn test_request_challenge_null_challenges() {
        let sender = Arc::new(directory_mock(|_req| {
            Ok(response(201, r#"{"status":"pending","challenges":null}"#, "n")
                .with_header(LOCATION, AUTHZ_URL.parse().unwrap()))
        }));
        let client = client(&sender).await;

        let err = client.request_challenge("example.com").await.unwrap_err();
        assert!(matches!(err, Error::ChallengeNotSupported { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_request_challenge_without_http_challenge() {
        let sender = Arc::new(directory_mock(|_req| {
            let body = json!({
                "status": "pending",
                "challenges": [{ "type": "dns-01", "uri": CHALLENGE_URL, "token": "t" }],
            });
            Ok(response(201, &body.to_string(), "n").with_header(LOCATION, AUTHZ_URL.parse().unwrap()))
        }));
        let client = client(&sender).await;

        let err = client.request_challenge("example.com").await.unwrap_err();
        assert!(matches!(err, Error::ChallengeNotSupported { .. }));
    }

    #[tokio::test]
    async fn test_request_challenge_empty_domain() {
        let sender = Arc::new(directory_mock(|req| {
            panic!("unexpected request {} {}", req.method, req.url)
        }));
        let client = client(&sender).await;

        let err = client.request_challenge("").await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_check_challenge_invalid_fails_immediately() {
        let sender = Arc::new(directory_mock(|_req| {
            Ok(response(202, r#"{"type":"http-01","status":"invalid"}"#, "n"))
        }));
        let client = client(&sender).await;

        let err = client
            .check_challenge(&challenge(), DEFAULT_TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ChallengeFailed { .. }), "{err}");
        assert_eq!(count(&sender, Method::POST, CHALLENGE_URL), 1);
        assert_eq!(count(&sender, Method::GET, AUTHZ_URL), 0);
    }

    #[tokio::test]
    async fn test_check_challenge_missing_status_fails() {
        let sender = Arc::new(directory_mock(|_req| Ok(response(202, "{}", "n"))));
        let client = client(&sender).await;

        let err = client
            .check_challenge(&challenge(), DEFAULT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ChallengeFailed { .. }));
    }

    #[tokio::test]
    async fn test_check_challenge_polls_until_valid() {
        let polls = std::sync::atomic::AtomicUsize::new(0);
        let sender = Arc::new(directory_mock(move |req| {
            if req.method == Method::POST {
                return Ok(response(202, r#"{"status":"pending"}"#, "n"));
            }

            let status = match polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
                0 | 1 => "pending",
                _ => "valid",
            };
            Ok(response(200, &json!({ "status": status }).to_string(), "n"))
        }));
        let client = client(&sender).await;

        client
            .check_challenge(&challenge(), DEFAULT_TIMEOUT)
            .await
            .unwrap();

        assert_eq!(count(&sender, Method::GET, AUTHZ_URL), 3);
    }

    #[tokio::test]
    async fn test_check_challenge_without_deadline() {
        let polls = std::sync::atomic::AtomicUsize::new(0);
        let sender = Arc::new(directory_mock(move |req| {
            if req.method == Method::POST {
                return Ok(response(202, r#"{"status":"pending"}"#, "n"));
            }

            let status = match polls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
                0 => "pending",
                _ => "valid",
            };
            Ok(response(200, &json!({ "status": status }).to_string(), "n"))
        }));
        let client = client(&sender).await;

        // too far out to be an `Instant`: wait for as long as it takes
        client
            .check_challenge(&challenge(), Duration::MAX)
            .await
            .unwrap();

        assert_eq!(count(&sender, Method::GET, AUTHZ_URL), 2);
    }

    #[tokio::test]
    async fn test_check_challenge_invalid_while_polling() {
        let sender = Arc::new(directory_mock(|req| {
            if req.method == Method::POST {
                return Ok(response(202, r#"{"status":"pending"}"#, "n"));
            }

            let body = json!({
                "status": "invalid",
                "challenges": [{
                    "type": "http-01",
                    "status": "invalid",
                    "error": { "type": "urn:acme:error:unauthorized", "detail": "Invalid response from http://example.com" },
                }],
            });
            Ok(response(200, &body.to_string(), "n"))
        }));
        let client = client(&sender).await;

        let err = client
            .check_challenge(&challenge(), DEFAULT_TIMEOUT)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("Invalid response from http://example.com"));
        assert_eq!(count(&sender, Method::GET, AUTHZ_URL), 1);
    }

    #[tokio::test]
    async fn test_check_challenge_times_out() {
        let sender = Arc::new(directory_mock(|_req| {
            Ok(response(202, r#"{"status":"pending"}"#, "n"))
        }));
        let directory = mock_directory(&sender).await;
        let client = AcmeClient::new(sender.clone(), directory, ClientConfig::default())
            .with_account_key_pair(account_key());

        let start = std::time::Instant::now();
        let err = client
            .check_challenge(&challenge(), Duration::from_secs(2))
            .await
            .unwrap_err();
        let elapsed = start.elapsed();

        assert!(err.is_timeout());
        assert!(matches!(err, Error::ChallengeTimedOut { ref response } if response["status"] == "pending"));
        assert!(elapsed >= Duration::from_millis(1900), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
        assert_eq!(count(&sender, Method::GET, AUTHZ_URL), 3);
    }
}
