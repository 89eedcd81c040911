use std::time::Duration;

use reqwest::{header::LOCATION, Method, StatusCode};
use tokio::time::sleep;

use crate::{
    api,
    cert::{create_csr, csr_der, csr_pem, der_to_pem, Certificate, CsrSubject},
    codec,
    dir::Resource,
    error::{Error, Result},
    key::KeyPair,
    req::HttpSender,
    trans::expect_header,
};

use super::{next_poll_delay, poll_deadline, AcmeClient};

impl<S: HttpSender> AcmeClient<S> {
    /// Requests a certificate for `domain`, signed over `domain_key_pair`.
    ///
    /// The domain must have been authorized with [`check_challenge`](Self::check_challenge)
    /// first. The issued certificate is polled for until `timeout` has elapsed.
    pub async fn request_certificate(
        &self,
        domain: &str,
        domain_key_pair: &KeyPair,
        subject: &CsrSubject,
        timeout: Duration,
    ) -> Result<Certificate> {
        let transport = self.transport()?;

        if domain.is_empty() {
            return Err(Error::InvalidArgument(
                "request_certificate: domain must not be empty".to_owned(),
            ));
        }

        let url = self.directory().url_for(Resource::NewCertificate)?;

        log::debug!("Generating Certificate Signing Request for {domain}: {subject:?}");

        let csr = create_csr(domain, domain_key_pair, subject)?;
        let csr_pem = csr_pem(&csr)?;

        // convert to base64url of the DER (which is not PEM).
        let payload = api::NewCertificate::new(codec::encode(&csr_der(&csr)?));

        log::debug!("Requesting a certificate for domain {domain}");

        let res = transport.signed_request(Method::POST, url, &payload).await?;
        let location = expect_header(&Method::POST, url, &res, &LOCATION)?;

        let deadline = poll_deadline(timeout);

        let der = loop {
            let res = transport
                .unsigned_request(Method::GET, &location, None)
                .await?;

            match res.status {
                StatusCode::OK => break res.body,

                StatusCode::ACCEPTED => {}

                status => {
                    return Err(Error::certificate_request_failed(status.as_u16(), &res.body));
                }
            }

            let Some(delay) = next_poll_delay(deadline, self.config().poll_interval) else {
                return Err(Error::CertificateRequestTimedOut { body: res.text() });
            };

            sleep(delay).await;
        };

        let pem = der_to_pem(&der)?;

        log::info!("Certificate issued for domain {domain}");

        Ok(Certificate::new(
            domain.to_owned(),
            domain_key_pair.clone(),
            csr_pem,
            pem,
        ))
    }
}
