use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::{header::HeaderName, Method};
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    error::{classify, Error, Result},
    jws::SignedBody,
    key::KeyPair,
    req::{HttpRequest, HttpResponse, HttpSender, REPLAY_NONCE},
};

/// JWS payload and nonce handling for requests to the API.
///
/// Setup is:
///
/// 1. `Directory::fetch()` records the first nonce in the shared [`NonceSlot`].
/// 2. `Transport::new()` with the account key.
/// 3. `signed_request()` for every protocol call; `unsigned_request()` for polling.
pub(crate) struct Transport<S> {
    sender: Arc<S>,
    account_key: KeyPair,
    nonce: Arc<NonceSlot>,
    nonce_url: String,
}

impl<S: HttpSender> Transport<S> {
    /// `nonce_url` is fetched with an unsigned GET whenever no nonce is on hand.
    pub fn new(sender: Arc<S>, nonce: Arc<NonceSlot>, nonce_url: &str, account_key: KeyPair) -> Self {
        Transport {
            sender,
            account_key,
            nonce,
            nonce_url: nonce_url.to_owned(),
        }
    }

    /// The key used in the transport
    pub fn account_key(&self) -> &KeyPair {
        &self.account_key
    }

    /// Sends `body` as is. Non-2xx responses and connection failures come back classified.
    pub async fn unsigned_request(
        &self,
        method: Method,
        url: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        let mut request = HttpRequest::new(method, url);

        if let Some(body) = body {
            request = request.with_json_body(body);
        }

        exchange(&*self.sender, &self.nonce, request).await
    }

    /// Wraps `payload` in a JWS signed by the account key and sends it.
    ///
    /// Consumes the last observed nonce; the response supplies the next one.
    pub async fn signed_request<T>(&self, method: Method, url: &str, payload: &T) -> Result<HttpResponse>
    where
        T: Serialize + ?Sized,
    {
        let nonce = self.next_nonce().await?;

        let body = SignedBody::new(&self.account_key, nonce, payload)?.to_vec()?;

        log::debug!("Call endpoint: {url}");

        self.unsigned_request(method, url, Some(body)).await
    }

    async fn next_nonce(&self) -> Result<String> {
        if let Some(nonce) = self.nonce.take() {
            log::trace!("Use previous nonce");
            return Ok(nonce);
        }

        log::debug!("Request new nonce");
        self.unsigned_request(Method::GET, &self.nonce_url, None)
            .await?;

        self.nonce.take().ok_or_else(|| {
            Error::malformed(&Method::GET, &self.nonce_url, "missing replay-nonce header")
        })
    }
}

/// The single last observed replay-nonce, shared by everything that talks to one ACME server.
#[derive(Debug, Default)]
pub(crate) struct NonceSlot {
    nonce: Mutex<Option<String>>,
}

impl NonceSlot {
    /// Overwrites the slot if `res` carries a nonce.
    pub fn record(&self, res: &HttpResponse) {
        if let Some(nonce) = res.header(&REPLAY_NONCE) {
            log::trace!("Extracting new nonce");
            *self.nonce.lock() = Some(nonce.to_owned());
        }
    }

    pub fn take(&self) -> Option<String> {
        self.nonce.lock().take()
    }

    #[cfg(test)]
    pub fn peek(&self) -> Option<String> {
        self.nonce.lock().clone()
    }
}

/// One HTTP exchange: send, record the nonce, classify failures.
pub(crate) async fn exchange<S: HttpSender>(
    sender: &S,
    nonce: &NonceSlot,
    request: HttpRequest,
) -> Result<HttpResponse> {
    let res = match sender.send(&request).await {
        Ok(res) => res,
        Err(err) => {
            log::debug!("{} {} failed: {err}", request.method, request.url);
            return Err(classify(&request, None, Some(&err)).into());
        }
    };

    // Regardless of the request being a success or not, there might be a nonce in the response.
    nonce.record(&res);

    if !res.is_success() {
        return Err(classify(&request, Some(&res), None).into());
    }

    Ok(res)
}

/// Decodes a successful response body that must be JSON.
pub(crate) fn parse_json<T: DeserializeOwned>(
    method: &Method,
    url: &str,
    res: &HttpResponse,
) -> Result<T> {
    serde_json::from_slice(&res.body)
        .map_err(|err| Error::malformed(method, url, format!("invalid JSON body: {err}")))
}

/// Returns a header the protocol requires on a successful response.
pub(crate) fn expect_header(
    method: &Method,
    url: &str,
    res: &HttpResponse,
    name: &HeaderName,
) -> Result<String> {
    res.header(name)
        .map(str::to_owned)
        .ok_or_else(|| Error::malformed(method, url, format!("missing {name} header")))
}

#[cfg(test)]
mod tests {
    use reqwest::header::LOCATION;
    use serde_json::{json, Value};

    use super::*;
    use crate::{
        codec,
        error::ServerErrorKind,
        req::ConnectionError,
        test::{account_key, response, MockSender},
    };

    const DIR_URL: &str = "https://ca.test/directory";

    fn transport(sender: &Arc<MockSender>) -> (Transport<MockSender>, Arc<NonceSlot>) {
        let nonce = Arc::new(NonceSlot::default());
        let transport = Transport::new(sender.clone(), nonce.clone(), DIR_URL, account_key());
        (transport, nonce)
    }

    fn protected_nonce(request: &HttpRequest) -> String {
        let body = serde_json::from_slice::<Value>(request.body.as_ref().unwrap()).unwrap();
        let protected = codec::decode(body["protected"].as_str().unwrap()).unwrap();
        let protected = serde_json::from_slice::<Value>(&protected).unwrap();
        protected["nonce"].as_str().unwrap().to_owned()
    }

    #[tokio::test]
    async fn test_signed_request_bootstraps_nonce() {
        let sender = Arc::new(MockSender::new(|req| match req.method {
            Method::GET => Ok(response(200, "{}", "dir-nonce")),
            _ => Ok(response(201, "{}", "post-nonce")),
        }));
        let (transport, nonce) = transport(&sender);

        transport
            .signed_request(Method::POST, "https://ca.test/acme/new-reg", &json!({ "resource": "new-reg" }))
            .await
            .unwrap();

        let requests = sender.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::GET);
        assert_eq!(requests[0].url, DIR_URL);
        assert!(requests[0].body.is_none());

        assert_eq!(requests[1].method, Method::POST);
        assert_eq!(protected_nonce(&requests[1]), "dir-nonce");
        assert_eq!(
            requests[1].headers.get(reqwest::header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        assert_eq!(nonce.peek().as_deref(), Some("post-nonce"));
    }

    #[tokio::test]
    async fn test_signed_requests_chain_nonces() {
        let counter = std::sync::atomic::AtomicUsize::new(0);
        let sender = Arc::new(MockSender::new(move |_req| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(response(200, "{}", &format!("nonce-{n}")))
        }));
        let (transport, nonce) = transport(&sender);
        nonce.record(&response(200, "", "initial"));

        for _ in 0..3 {
            transport
                .signed_request(Method::POST, "https://ca.test/acme/new-authz", &json!({}))
                .await
                .unwrap();
        }

        let nonces = sender
            .requests()
            .iter()
            .map(protected_nonce)
            .collect::<Vec<_>>();
        assert_eq!(nonces, ["initial", "nonce-0", "nonce-1"]);
    }

    #[tokio::test]
    async fn test_error_response_is_classified_and_nonce_kept() {
        let sender = Arc::new(MockSender::new(|_req| {
            Ok(response(
                400,
                r#"{"type":"urn:acme:error:malformed","detail":"Registration key is already in use"}"#,
                "after-error",
            ))
        }));
        let (transport, nonce) = transport(&sender);
        nonce.record(&response(200, "", "before"));

        let err = transport
            .signed_request(Method::POST, "https://ca.test/acme/new-reg", &json!({}))
            .await
            .unwrap_err();

        let server_err = err.server_error().unwrap();
        assert_eq!(server_err.kind(), Some(ServerErrorKind::Malformed));
        assert_eq!(server_err.url(), "https://ca.test/acme/new-reg");
        assert_eq!(nonce.peek().as_deref(), Some("after-error"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_classified() {
        let sender = Arc::new(MockSender::new(|_req| {
            Err(ConnectionError("connection refused".to_owned()))
        }));
        let (transport, _) = transport(&sender);

        let err = transport
            .unsigned_request(Method::GET, "https://ca.test/acme/authz/1", None)
            .await
            .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("non-ACME"), "{msg}");
        assert!(msg.contains("connection refused"), "{msg}");
    }

    #[tokio::test]
    async fn test_bootstrap_without_nonce_header() {
        let sender = Arc::new(MockSender::new(|_req| {
            Ok(crate::req::HttpResponse::new(reqwest::StatusCode::OK, "{}"))
        }));
        let (transport, _) = transport(&sender);

        let err = transport
            .signed_request(Method::POST, "https://ca.test/acme/new-reg", &json!({}))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::MalformedResponse { .. }), "{err}");
        assert_eq!(sender.requests().len(), 1);
    }

    #[test]
    fn test_parse_json_and_expect_header() {
        let res = response(201, "not json", "n");

        let err = parse_json::<Value>(&Method::POST, "https://ca.test/x", &res).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("did not return a valid response"), "{msg}");
        assert!(msg.contains("POST https://ca.test/x"), "{msg}");

        let err = expect_header(&Method::POST, "https://ca.test/x", &res, &LOCATION).unwrap_err();
        assert!(err.to_string().contains("location"));

        assert_eq!(
            expect_header(&Method::POST, "https://ca.test/x", &res, &REPLAY_NONCE).unwrap(),
            "n"
        );
    }
}
