//! X.509 validation for imported trust material.
//!
//! Nothing here touches storage; callers validate first and persist only
//! on success.

use x509_parser::pem::Pem;
use x509_parser::prelude::*;

use alarmd_crypto::fingerprint_of;

/// Largest accepted PEM body, for certificates and CRLs alike.
pub const MAX_PEM_BYTES: usize = 10 * 1024;

const CERTIFICATE_LABEL: &str = "CERTIFICATE";
const CRL_LABEL: &str = "X509 CRL";

#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("PEM body is empty")]
    Empty,

    #[error("PEM body is {actual} bytes, limit is {limit}")]
    TooLarge { limit: usize, actual: usize },

    #[error("Invalid PEM: {0}")]
    Pem(String),

    #[error("Invalid X.509 certificate: {0}")]
    Certificate(String),

    #[error("Invalid CRL: {0}")]
    Crl(String),

    #[error("Certificate chain contains no self-signed CA")]
    NoRootCa,

    #[error("Certificate chain contains {0} self-signed CAs, expected one")]
    MultipleRootCa(usize),

    #[error("Certificate {subject} is not currently valid")]
    NotValid { subject: String },

    #[error("CRL issuer {issuer} does not match root CA {subject}")]
    CrlIssuerMismatch { issuer: String, subject: String },

    #[error("CRL signature does not verify against root CA {subject}")]
    CrlSignature { subject: String },

    #[error("CRL is past its next update time")]
    CrlExpired,

    #[error("No root CA installed")]
    NotInstalled,
}

/// Summary of an accepted root CA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootCaInfo {
    pub subject: String,
    pub issuer: String,
    pub serial: String,
    pub not_before: i64,
    pub not_after: i64,
    /// SHA-256 over the root certificate DER.
    pub fingerprint: String,
    /// Number of certificates in the imported chain, root included.
    pub chain_len: usize,
}

fn check_size(pem: &str) -> Result<(), TrustError> {
    if pem.trim().is_empty() {
        return Err(TrustError::Empty);
    }
    if pem.len() > MAX_PEM_BYTES {
        return Err(TrustError::TooLarge {
            limit: MAX_PEM_BYTES,
            actual: pem.len(),
        });
    }
    Ok(())
}

/// Split a PEM body into blocks, all of which must carry `label`.
fn pem_blocks(pem: &str, label: &str) -> Result<Vec<Pem>, TrustError> {
    let mut blocks = Vec::new();
    for block in Pem::iter_from_buffer(pem.as_bytes()) {
        let block = block.map_err(|e| TrustError::Pem(e.to_string()))?;
        if block.label != label {
            return Err(TrustError::Pem(format!(
                "unexpected PEM block '{}', expected '{label}'",
                block.label
            )));
        }
        blocks.push(block);
    }
    if blocks.is_empty() {
        return Err(TrustError::Pem(format!("no '{label}' block found")));
    }
    Ok(blocks)
}

fn is_self_signed_ca(cert: &X509Certificate<'_>) -> bool {
    let is_ca = matches!(cert.basic_constraints(), Ok(Some(bc)) if bc.value.ca);
    is_ca && cert.subject() == cert.issuer() && cert.verify_signature(None).is_ok()
}

fn root_info(cert: &X509Certificate<'_>, der: &[u8], chain_len: usize) -> RootCaInfo {
    RootCaInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial: cert.raw_serial_as_string(),
        not_before: cert.validity().not_before.timestamp(),
        not_after: cert.validity().not_after.timestamp(),
        fingerprint: fingerprint_of(der),
        chain_len,
    }
}

/// Validate an imported root CA chain.
///
/// The chain must parse, every certificate must be inside its validity
/// window, and exactly one certificate must be a self-signed CA.
pub fn validate_root_chain(pem: &str) -> Result<RootCaInfo, TrustError> {
    check_size(pem)?;
    let blocks = pem_blocks(pem, CERTIFICATE_LABEL)?;

    let mut roots = Vec::new();
    for block in &blocks {
        let (_, cert) = X509Certificate::from_der(&block.contents)
            .map_err(|e| TrustError::Certificate(e.to_string()))?;

        if !cert.validity().is_valid() {
            return Err(TrustError::NotValid {
                subject: cert.subject().to_string(),
            });
        }
        if is_self_signed_ca(&cert) {
            roots.push(root_info(&cert, &block.contents, blocks.len()));
        }
    }

    match roots.len() {
        0 => Err(TrustError::NoRootCa),
        1 => roots.pop().ok_or(TrustError::NoRootCa),
        n => Err(TrustError::MultipleRootCa(n)),
    }
}

/// Validate a CRL against the installed root CA chain.
///
/// The CRL must parse, must not be stale, and must be issued and signed by
/// the chain's self-signed root.
pub fn validate_crl(crl_pem: &str, ca_pem: &str) -> Result<(), TrustError> {
    check_size(crl_pem)?;
    let crl_blocks = pem_blocks(crl_pem, CRL_LABEL)?;
    if crl_blocks.len() != 1 {
        return Err(TrustError::Crl(format!(
            "expected one CRL, found {}",
            crl_blocks.len()
        )));
    }
    let (_, crl) = parse_x509_crl(&crl_blocks[0].contents)
        .map_err(|e| TrustError::Crl(e.to_string()))?;

    if let Some(next_update) = crl.next_update() {
        if next_update.timestamp() < ASN1Time::now().timestamp() {
            return Err(TrustError::CrlExpired);
        }
    }

    let ca_blocks = pem_blocks(ca_pem, CERTIFICATE_LABEL)?;
    for block in &ca_blocks {
        let (_, cert) = X509Certificate::from_der(&block.contents)
            .map_err(|e| TrustError::Certificate(e.to_string()))?;
        if !is_self_signed_ca(&cert) {
            continue;
        }
        if crl.issuer() != cert.subject() {
            return Err(TrustError::CrlIssuerMismatch {
                issuer: crl.issuer().to_string(),
                subject: cert.subject().to_string(),
            });
        }
        return crl
            .verify_signature(cert.public_key())
            .map_err(|_| TrustError::CrlSignature {
                subject: cert.subject().to_string(),
            });
    }

    Err(TrustError::NoRootCa)
}

/// Re-read the root summary of already accepted trust material.
pub fn inspect_root(pem: &str) -> Result<RootCaInfo, TrustError> {
    let blocks = pem_blocks(pem, CERTIFICATE_LABEL)?;
    for block in &blocks {
        let (_, cert) = X509Certificate::from_der(&block.contents)
            .map_err(|e| TrustError::Certificate(e.to_string()))?;
        if is_self_signed_ca(&cert) {
            return Ok(root_info(&cert, &block.contents, blocks.len()));
        }
    }
    Err(TrustError::NoRootCa)
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use alarmd_crypto::certs::{generate_ca, generate_crl, generate_server_cert};

    fn expired_ca_pem() -> String {
        let mut params = rcgen::CertificateParams::default();
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "Expired CA");
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(2001, 1, 1);
        let key = rcgen::KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().pem()
    }

    #[test]
    fn accepts_single_root() {
        let ca = generate_ca("Acme").unwrap();
        let info = validate_root_chain(&ca.ca_cert_pem).unwrap();
        assert!(info.subject.contains("Acme CA"));
        assert_eq!(info.subject, info.issuer);
        assert_eq!(info.chain_len, 1);
        assert_eq!(info.fingerprint.len(), 32 * 3 - 1);
    }

    #[test]
    fn accepts_chain_with_one_root() {
        let ca = generate_ca("Acme").unwrap();
        let leaf = generate_server_cert(&ca, &["receiver.local"], 9).unwrap();
        let chain = format!("{}{}", leaf.cert_pem, ca.ca_cert_pem);

        let info = validate_root_chain(&chain).unwrap();
        assert_eq!(info.chain_len, 2);
        assert!(info.subject.contains("Acme CA"));
    }

    #[test]
    fn rejects_chain_without_root() {
        let ca = generate_ca("Acme").unwrap();
        let leaf = generate_server_cert(&ca, &["receiver.local"], 9).unwrap();
        let err = validate_root_chain(&leaf.cert_pem).unwrap_err();
        assert!(matches!(err, TrustError::NoRootCa));
    }

    #[test]
    fn rejects_two_roots() {
        let a = generate_ca("Acme").unwrap();
        let b = generate_ca("Globex").unwrap();
        let chain = format!("{}{}", a.ca_cert_pem, b.ca_cert_pem);
        let err = validate_root_chain(&chain).unwrap_err();
        assert!(matches!(err, TrustError::MultipleRootCa(2)));
    }

    #[test]
    fn rejects_expired_root() {
        let err = validate_root_chain(&expired_ca_pem()).unwrap_err();
        assert!(matches!(err, TrustError::NotValid { .. }));
    }

    #[test]
    fn rejects_oversized_body() {
        let body = "A".repeat(MAX_PEM_BYTES + 1);
        let err = validate_root_chain(&body).unwrap_err();
        assert!(matches!(err, TrustError::TooLarge { .. }));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            validate_root_chain("   ").unwrap_err(),
            TrustError::Empty
        ));
        assert!(validate_root_chain("not a certificate").is_err());
    }

    #[test]
    fn rejects_crl_where_certificate_expected() {
        let ca = generate_ca("Acme").unwrap();
        let crl = generate_crl(&ca, &[1]).unwrap();
        let err = validate_root_chain(&crl).unwrap_err();
        assert!(matches!(err, TrustError::Pem(_)));
    }

    #[test]
    fn crl_from_root_is_accepted() {
        let ca = generate_ca("Acme").unwrap();
        let crl = generate_crl(&ca, &[9]).unwrap();
        validate_crl(&crl, &ca.ca_cert_pem).unwrap();
    }

    #[test]
    fn crl_from_other_ca_is_rejected() {
        let ca = generate_ca("Acme").unwrap();
        let other = generate_ca("Globex").unwrap();
        let crl = generate_crl(&other, &[9]).unwrap();

        let err = validate_crl(&crl, &ca.ca_cert_pem).unwrap_err();
        assert!(matches!(err, TrustError::CrlIssuerMismatch { .. }));
    }

    #[test]
    fn crl_from_same_named_ca_is_rejected() {
        let ca = generate_ca("Acme").unwrap();
        let impostor = generate_ca("Acme").unwrap();
        let crl = generate_crl(&impostor, &[9]).unwrap();

        let err = validate_crl(&crl, &ca.ca_cert_pem).unwrap_err();
        assert!(matches!(err, TrustError::CrlSignature { .. }));
    }

    #[test]
    fn inspect_matches_validation() {
        let ca = generate_ca("Acme").unwrap();
        assert_eq!(
            inspect_root(&ca.ca_cert_pem).unwrap(),
            validate_root_chain(&ca.ca_cert_pem).unwrap()
        );
    }
}
