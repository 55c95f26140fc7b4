//! Certificate and CRL generation for development and tests.
//!
//! Produces a self-signed CA, server certificates signed by it, and CRLs
//! issued by it, all PEM-encoded.
//!
//! Requires the `certs` feature to be enabled.

use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams, DnType,
    ExtendedKeyUsagePurpose, IsCa, Issuer, KeyIdMethod, KeyPair, KeyUsagePurpose,
    RevokedCertParams, SerialNumber,
};

/// PEM-encoded CA material for signing certificates and CRLs.
pub struct CaBundle {
    /// CA certificate parameters (needed for signing).
    pub params: CertificateParams,
    /// CA key pair.
    pub key_pair: KeyPair,
    /// PEM-encoded CA certificate.
    pub ca_cert_pem: String,
}

/// PEM-encoded server certificate and key.
pub struct ServerCertBundle {
    pub cert_pem: String,
    pub key_pem: String,
}

/// Certificate generation errors.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    /// An error occurred during certificate generation or signing.
    #[error("Certificate generation error: {0}")]
    Generation(String),
}

fn generation(e: impl std::fmt::Display) -> CertError {
    CertError::Generation(e.to_string())
}

/// Generate a self-signed CA that may sign certificates and CRLs.
pub fn generate_ca(org_name: &str) -> Result<CaBundle, CertError> {
    let mut params = CertificateParams::default();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params
        .distinguished_name
        .push(DnType::CommonName, format!("{org_name} CA"));
    params
        .distinguished_name
        .push(DnType::OrganizationName, org_name);
    params.key_usages.push(KeyUsagePurpose::KeyCertSign);
    params.key_usages.push(KeyUsagePurpose::CrlSign);

    let key_pair = KeyPair::generate().map_err(generation)?;
    let ca_cert = params.self_signed(&key_pair).map_err(generation)?;

    Ok(CaBundle {
        ca_cert_pem: ca_cert.pem(),
        params,
        key_pair,
    })
}

/// Generate a server certificate with the given serial, signed by `ca`.
pub fn generate_server_cert(
    ca: &CaBundle,
    server_names: &[&str],
    serial: u64,
) -> Result<ServerCertBundle, CertError> {
    let issuer = Issuer::from_params(&ca.params, &ca.key_pair);

    let mut params = CertificateParams::new(
        server_names
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>(),
    )
    .map_err(generation)?;
    params
        .distinguished_name
        .push(DnType::CommonName, "Event Receiver");
    params
        .extended_key_usages
        .push(ExtendedKeyUsagePurpose::ServerAuth);
    params.serial_number = Some(SerialNumber::from_slice(&serial.to_be_bytes()));

    let key = KeyPair::generate().map_err(generation)?;
    let cert = params.signed_by(&key, &issuer).map_err(generation)?;

    Ok(ServerCertBundle {
        cert_pem: cert.pem(),
        key_pem: key.serialize_pem(),
    })
}

/// Generate a CRL issued by `ca` revoking the given serials.
pub fn generate_crl(ca: &CaBundle, revoked_serials: &[u64]) -> Result<String, CertError> {
    let issuer = Issuer::from_params(&ca.params, &ca.key_pair);

    let revoked_certs = revoked_serials
        .iter()
        .map(|serial| RevokedCertParams {
            serial_number: SerialNumber::from_slice(&serial.to_be_bytes()),
            revocation_time: rcgen::date_time_ymd(2024, 1, 1),
            reason_code: None,
            invalidity_date: None,
        })
        .collect();

    let params = CertificateRevocationListParams {
        this_update: rcgen::date_time_ymd(2024, 1, 1),
        next_update: rcgen::date_time_ymd(2099, 1, 1),
        crl_number: SerialNumber::from_slice(&[1]),
        issuing_distribution_point: None,
        revoked_certs,
        key_identifier_method: KeyIdMethod::Sha256,
    };

    let crl = params.signed_by(&issuer).map_err(generation)?;
    crl.pem().map_err(generation)
}
