use std::io::{BufReader, Cursor};

use der::{
    asn1::{Any, BitString, Ia5String, ObjectIdentifier, SetOfVec},
    time::{OffsetDateTime, PrimitiveDateTime},
    Decode as _, Encode as _, EncodePem as _, Tag,
};
use x509_cert::{
    attr::AttributeTypeAndValue,
    builder::{Builder, RequestBuilder as CsrBuilder},
    ext::pkix::{name::GeneralName, BasicConstraints, KeyUsage, KeyUsages, SubjectAltName},
    name::{Name, RdnSequence, RelativeDistinguishedName},
    request::CertReq,
};

use crate::{
    error::{Error, Result},
    key::KeyPair,
};

const OID_COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
const OID_STATE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
const OID_LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
const OID_ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
const OID_ORGANIZATIONAL_UNIT: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
const OID_COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
const OID_EMAIL_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

/// Distinguished-name attributes of a certificate signing request.
///
/// The common name is always the requested domain and is not part of this type. Empty
/// attributes are left out of the CSR.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsrSubject {
    pub country: String,
    pub state: String,
    pub locality: String,
    pub organization: String,
    pub organizational_unit: String,
    pub email: String,

    /// Extra DNS names. The requested domain is added if missing.
    pub subject_alternative_names: Vec<String>,
}

impl CsrSubject {
    pub fn new(
        country: impl Into<String>,
        state: impl Into<String>,
        locality: impl Into<String>,
        organization: impl Into<String>,
        organizational_unit: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        CsrSubject {
            country: country.into(),
            state: state.into(),
            locality: locality.into(),
            organization: organization.into(),
            organizational_unit: organizational_unit.into(),
            email: email.into(),
            subject_alternative_names: Vec::new(),
        }
    }

    pub fn with_subject_alternative_names<I, N>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.subject_alternative_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Subject alternative names with `domain` appended when absent.
    fn dns_names(&self, domain: &str) -> Vec<String> {
        let mut names = self.subject_alternative_names.clone();

        if !names.iter().any(|name| name == domain) {
            names.push(domain.to_owned());
        }

        names
    }

    fn to_name(&self, domain: &str) -> Result<Name> {
        let attributes = [
            (OID_COUNTRY, Tag::PrintableString, self.country.as_str()),
            (OID_STATE, Tag::Utf8String, self.state.as_str()),
            (OID_LOCALITY, Tag::Utf8String, self.locality.as_str()),
            (OID_ORGANIZATION, Tag::Utf8String, self.organization.as_str()),
            (OID_ORGANIZATIONAL_UNIT, Tag::Utf8String, self.organizational_unit.as_str()),
            (OID_COMMON_NAME, Tag::Utf8String, domain),
            (OID_EMAIL_ADDRESS, Tag::Ia5String, self.email.as_str()),
        ];

        let rdns = attributes
            .into_iter()
            .filter(|(_, _, value)| !value.is_empty())
            .map(|(oid, tag, value)| {
                let atv = AttributeTypeAndValue {
                    oid,
                    value: Any::new(tag, value.as_bytes())?,
                };
                Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![atv])?))
            })
            .collect::<der::Result<Vec<_>>>()
            .map_err(|err| Error::CsrGeneration(format!("invalid subject: {err}")))?;

        Ok(RdnSequence(rdns))
    }
}

/// Creates a CSR for `domain` with `subject`'s attributes and signs it with `key` (SHA-256).
///
/// `domain` becomes the Common Name (CN). When more than one DNS name is involved they are all
/// added to a Subject Alternative Name (SAN) extension.
pub(crate) fn create_csr(domain: &str, key: &KeyPair, subject: &CsrSubject) -> Result<CertReq> {
    let csr_err = |err: x509_cert::builder::Error| Error::CsrGeneration(err.to_string());

    let signer = key.signing_key();
    let mut csr = CsrBuilder::new(subject.to_name(domain)?, &signer).map_err(csr_err)?;

    let dns_names = subject.dns_names(domain);

    if dns_names.len() > 1 {
        let san = dns_names
            .iter()
            .map(|name| Ia5String::new(name).map(GeneralName::DnsName))
            .collect::<der::Result<Vec<_>>>()
            .map_err(|err| Error::CsrGeneration(format!("invalid DNS name: {err}")))?;

        csr.add_extension(&BasicConstraints {
            ca: false,
            path_len_constraint: None,
        })
        .map_err(csr_err)?;

        csr.add_extension(&KeyUsage(
            KeyUsages::NonRepudiation | KeyUsages::DigitalSignature | KeyUsages::KeyEncipherment,
        ))
        .map_err(csr_err)?;

        csr.add_extension(&SubjectAltName(san)).map_err(csr_err)?;
    }

    let mut csr = csr.build::<rsa::pkcs1v15::Signature>().map_err(csr_err)?;

    // The builder always emits an extensionRequest attribute, and an empty one is not a valid
    // `Extensions` (SIZE (1..MAX)). Drop it and sign the request info again.
    if dns_names.len() <= 1 {
        let der_err = |err: der::Error| Error::CsrGeneration(err.to_string());

        csr.info.attributes = SetOfVec::new();
        let info = csr.info.to_der().map_err(der_err)?;
        csr.signature = BitString::from_bytes(&key.sign(&info)?).map_err(der_err)?;
    }

    Ok(csr)
}

/// PEM armor of a CSR.
pub(crate) fn csr_pem(csr: &CertReq) -> Result<String> {
    csr.to_pem(pem::LineEnding::LF)
        .map_err(|err| Error::Encoding(err.to_string()))
}

/// DER encoding of a CSR.
pub(crate) fn csr_der(csr: &CertReq) -> Result<Vec<u8>> {
    csr.to_der().map_err(|err| Error::Encoding(err.to_string()))
}

/// Wraps a DER certificate in PEM armor, 64 characters per line.
pub(crate) fn der_to_pem(der: &[u8]) -> Result<String> {
    pem::encode_string("CERTIFICATE", pem::LineEnding::LF, der)
        .map_err(|err| Error::Encoding(err.to_string()))
}

/// An issued certificate together with the domain key pair and CSR it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    domain: String,
    domain_key_pair: KeyPair,
    csr_pem: String,
    pem: String,
}

impl Certificate {
    pub(crate) fn new(domain: String, domain_key_pair: KeyPair, csr_pem: String, pem: String) -> Self {
        Certificate {
            domain,
            domain_key_pair,
            csr_pem,
            pem,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn domain_key_pair(&self) -> &KeyPair {
        &self.domain_key_pair
    }

    /// The CSR the certificate was requested with, in PEM format.
    pub fn csr_pem(&self) -> &str {
        &self.csr_pem
    }

    /// The issued certificate file in PEM format.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    /// The end-entity certificate in DER format.
    pub fn certificate_der(&self) -> Result<Vec<u8>> {
        self.certificate_chain()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::InvalidCertificate("no certificates in PEM".to_owned()))
    }

    /// The issued certificate chain in DER format.
    pub fn certificate_chain(&self) -> Result<Vec<Vec<u8>>> {
        let mut rdr = BufReader::new(Cursor::new(self.pem()));

        rustls_pemfile::certs(&mut rdr)
            .map(|res| res.map(|cert| cert.to_vec()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|err| Error::InvalidCertificate(err.to_string()))
    }

    /// Inspect the certificate to count the number of (whole) valid days left.
    ///
    /// It's up to the ACME API provider to decide how long an issued certificate is valid.
    /// Let's Encrypt sets the validity to 90 days. This function reports 89 days for newly
    /// issued cert, since it counts _whole_ days.
    ///
    /// It is possible to get negative days for an expired certificate.
    pub fn valid_days_left(&self) -> Result<i64> {
        let cert_ee = self.certificate_der()?;

        let cert = x509_cert::Certificate::from_der(&cert_ee)
            .map_err(|err| Error::InvalidCertificate(err.to_string()))?;

        let not_after = cert.tbs_certificate.validity.not_after.to_date_time();
        // X.509 validity times are always UTC
        let not_after = PrimitiveDateTime::try_from(not_after)
            .map_err(|err| Error::InvalidCertificate(err.to_string()))?
            .assume_utc();

        let diff = not_after - OffsetDateTime::now_utc();

        Ok(diff.whole_days())
    }
}

#[cfg(test)]
mod tests {
    use rsa::{pkcs1v15::VerifyingKey, signature::Verifier as _};
    use sha2::Sha256;

    use super::*;
    use crate::test::{domain_key, self_signed_der};

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|window| window == needle.as_bytes())
    }

    #[test]
    fn test_csr_subject_and_signature() {
        let key = domain_key();
        let subject = CsrSubject::new("FR", "Ile de France", "Paris", "Acme", "", "admin@example.com");

        let csr = create_csr("example.com", &key, &subject).unwrap();

        let name = csr.info.subject.to_string();
        assert!(name.contains("CN=example.com"), "{name}");
        assert!(name.contains("O=Acme"), "{name}");
        assert!(!name.contains("OU="), "{name}");

        // single name: no extensionRequest attribute at all, not even an empty one
        assert!(csr.info.attributes.is_empty());
        let der = csr_der(&csr).unwrap();
        const EXTENSION_REQUEST_OID: &[u8] = &[0x06, 0x09, 0x2a, 0x86, 0x48, 0x86, 0xf7, 0x0d, 0x01, 0x09, 0x0e];
        assert!(!der.windows(EXTENSION_REQUEST_OID.len()).any(|w| w == EXTENSION_REQUEST_OID));
        assert!(CertReq::from_der(&der).unwrap().info.attributes.is_empty());

        let info = csr.info.to_der().unwrap();
        let signature =
            rsa::pkcs1v15::Signature::try_from(csr.signature.raw_bytes()).unwrap();
        VerifyingKey::<Sha256>::new(key.public_key().clone())
            .verify(&info, &signature)
            .unwrap();
    }

    #[test]
    fn test_csr_subject_alternative_names() {
        let subject = CsrSubject::default()
            .with_subject_alternative_names(["www.example.com", "cdn.example.com"]);

        let csr = create_csr("example.com", &domain_key(), &subject).unwrap();
        let der = csr_der(&csr).unwrap();

        assert_eq!(csr.info.attributes.len(), 1);
        assert!(contains(&der, "www.example.com"));
        assert!(contains(&der, "cdn.example.com"));

        let pem = csr_pem(&csr).unwrap();
        assert!(pem.starts_with("-----BEGIN CERTIFICATE REQUEST-----\n"));
    }

    #[test]
    fn test_dns_names_append_domain() {
        let subject = CsrSubject::default().with_subject_alternative_names(["www.example.com"]);
        assert_eq!(subject.dns_names("example.com"), ["www.example.com", "example.com"]);

        let subject = CsrSubject::default().with_subject_alternative_names(["example.com"]);
        assert_eq!(subject.dns_names("example.com"), ["example.com"]);
    }

    #[test]
    fn test_der_to_pem_wraps_at_64() {
        let der = self_signed_der();
        let pem = der_to_pem(&der).unwrap();

        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.trim_end().ends_with("-----END CERTIFICATE-----"));
        assert!(pem.lines().all(|line| line.len() <= 64));
        assert_eq!(pem.lines().nth(1).unwrap().len(), 64);
    }

    #[test]
    fn test_certificate_accessors() {
        let der = self_signed_der();
        let cert = Certificate::new(
            "example.com".to_owned(),
            domain_key(),
            String::new(),
            der_to_pem(&der).unwrap(),
        );

        assert_eq!(cert.domain(), "example.com");
        assert_eq!(cert.certificate_der().unwrap(), der);
        assert_eq!(cert.certificate_chain().unwrap().len(), 1);
        assert!(cert.valid_days_left().unwrap() > 365);
    }

    #[test]
    fn test_certificate_without_pem_block() {
        let cert = Certificate::new(
            "example.com".to_owned(),
            domain_key(),
            String::new(),
            "CERT HERE".to_owned(),
        );

        assert!(matches!(
            cert.certificate_der().unwrap_err(),
            Error::InvalidCertificate(_)
        ));
    }
}
