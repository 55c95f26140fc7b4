//! HTTPS transport to the subscriber.
//!
//! A fresh client is built from the current trust material for every
//! delivery cycle, so trust rotation takes effect on the next cycle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::HeaderValue;
use rustls::client::WebPkiServerVerifier;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, CertificateRevocationListDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use super::payload::EventRecord;
use crate::error::EventError;
use crate::trust::TrustMaterial;

/// Header carrying the subscriber's credential.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Sends one batch of events and reports the HTTP status.
///
/// Transport failures (connect, TLS, timeout) are `Err`; any HTTP
/// response, successful or not, is `Ok(status)`.
pub trait EventSink: Send + Sync {
    fn post(
        &self,
        destination: &str,
        credential: &str,
        events: &[EventRecord],
    ) -> impl Future<Output = Result<u16, EventError>> + Send;
}

/// Builds the sink for one delivery cycle from the current trust material.
pub trait SinkFactory: Send + Sync {
    type Sink: EventSink;

    fn build(&self, trust: &TrustMaterial) -> Result<Self::Sink, EventError>;
}

/// Client certificate presented to the destination.
pub struct ClientIdentity {
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
}

impl std::fmt::Debug for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientIdentity")
            .field("chain_len", &self.chain.len())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl Clone for ClientIdentity {
    fn clone(&self) -> Self {
        Self {
            chain: self.chain.clone(),
            key: self.key.clone_key(),
        }
    }
}

impl ClientIdentity {
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self, EventError> {
        let chain = CertificateDer::pem_slice_iter(cert_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| EventError::Trust(format!("Invalid client certificate: {e}")))?;
        if chain.is_empty() {
            return Err(EventError::Trust("Client certificate file holds no certificate".to_string()));
        }
        let key = PrivateKeyDer::from_pem_slice(key_pem.as_bytes())
            .map_err(|e| EventError::Trust(format!("Invalid client key: {e}")))?;
        Ok(Self { chain, key })
    }

    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, EventError> {
        let read = |path: &Path| {
            std::fs::read_to_string(path).map_err(|e| {
                EventError::Trust(format!("Failed to read {}: {e}", path.display()))
            })
        };
        Self::from_pem(&read(cert_path)?, &read(key_path)?)
    }
}

fn tls_error(what: &str, e: impl std::fmt::Display) -> EventError {
    EventError::Trust(format!("{what}: {e}"))
}

/// Build the rustls client configuration for one cycle.
///
/// With a CRL the verifier checks revocation as well as the chain;
/// without one it validates the chain only.
pub fn build_tls_config(
    trust: &TrustMaterial,
    identity: Option<&ClientIdentity>,
) -> Result<ClientConfig, EventError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());

    let mut roots = RootCertStore::empty();
    for cert in CertificateDer::pem_slice_iter(trust.cert_pem.as_bytes()) {
        let cert = cert.map_err(|e| tls_error("Invalid trust certificate", e))?;
        roots
            .add(cert)
            .map_err(|e| tls_error("Rejected trust certificate", e))?;
    }

    let mut verifier = WebPkiServerVerifier::builder_with_provider(Arc::new(roots), Arc::clone(&provider));
    if let Some(crl_pem) = &trust.crl_pem {
        let crls = CertificateRevocationListDer::pem_slice_iter(crl_pem.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| tls_error("Invalid CRL", e))?;
        verifier = verifier.with_crls(crls).allow_unknown_revocation_status();
    }
    let verifier = verifier
        .build()
        .map_err(|e| tls_error("Failed to build certificate verifier", e))?;

    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| tls_error("Unsupported TLS configuration", e))?
        .with_webpki_verifier(verifier);

    let config = match identity {
        Some(id) => builder
            .with_client_auth_cert(id.chain.clone(), id.key.clone_key())
            .map_err(|e| tls_error("Rejected client certificate", e))?,
        None => builder.with_no_client_auth(),
    };

    Ok(config)
}

/// Builds [`HttpsSink`]s with a bounded request timeout.
#[derive(Debug, Clone)]
pub struct HttpsSinkFactory {
    timeout: Duration,
    identity: Option<ClientIdentity>,
}

impl HttpsSinkFactory {
    pub const fn new(timeout: Duration, identity: Option<ClientIdentity>) -> Self {
        Self { timeout, identity }
    }
}

impl SinkFactory for HttpsSinkFactory {
    type Sink = HttpsSink;

    fn build(&self, trust: &TrustMaterial) -> Result<HttpsSink, EventError> {
        let tls = build_tls_config(trust, self.identity.as_ref())?;
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| EventError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(HttpsSink { http })
    }
}

/// reqwest-backed sink for one cycle.
pub struct HttpsSink {
    http: reqwest::Client,
}

fn transport_error(e: &reqwest::Error) -> EventError {
    if e.is_timeout() {
        EventError::Transport(format!("Request timed out: {e}"))
    } else if e.is_connect() {
        EventError::Transport(format!("Connection failed: {e}"))
    } else {
        EventError::Transport(e.to_string())
    }
}

impl EventSink for HttpsSink {
    async fn post(
        &self,
        destination: &str,
        credential: &str,
        events: &[EventRecord],
    ) -> Result<u16, EventError> {
        let mut token = HeaderValue::from_str(credential)
            .map_err(|_| EventError::Validation("Credential is not a valid header value".to_string()))?;
        token.set_sensitive(true);

        let response = self
            .http
            .post(destination)
            .header(AUTH_TOKEN_HEADER, token)
            .json(events)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        Ok(response.status().as_u16())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use alarmd_crypto::certs::{ServerCertBundle, generate_ca, generate_crl, generate_server_cert};
    use rustls::pki_types::ServerName;
    use rustls::{ClientConnection, ServerConfig, ServerConnection};

    const RECEIVER: &str = "receiver.local";

    fn material(cert_pem: String, crl_pem: Option<String>) -> TrustMaterial {
        TrustMaterial {
            root_cert_id: 1,
            usage: "EventSubscription".to_string(),
            import_type: "text".to_string(),
            cert_pem,
            crl_pem,
            installed_at: 0,
        }
    }

    #[test]
    fn builds_chain_only_config() {
        let ca = generate_ca("Acme").unwrap();
        build_tls_config(&material(ca.ca_cert_pem, None), None).unwrap();
    }

    /// Run a full TLS handshake in memory between a client built from
    /// `config` and a server presenting `leaf`.
    fn handshake(config: ClientConfig, leaf: &ServerCertBundle) -> Result<(), rustls::Error> {
        let chain = vec![CertificateDer::from_pem_slice(leaf.cert_pem.as_bytes()).unwrap()];
        let key = PrivateKeyDer::from_pem_slice(leaf.key_pem.as_bytes()).unwrap();
        let server_config =
            ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()
                .unwrap()
                .with_no_client_auth()
                .with_single_cert(chain, key)
                .unwrap();

        let mut server = ServerConnection::new(Arc::new(server_config)).unwrap();
        let mut client =
            ClientConnection::new(Arc::new(config), ServerName::try_from(RECEIVER).unwrap())
                .unwrap();

        let mut wire = Vec::new();
        for _ in 0..16 {
            if !client.is_handshaking() && !server.is_handshaking() {
                return Ok(());
            }

            wire.clear();
            while client.wants_write() {
                client.write_tls(&mut wire).unwrap();
            }
            let mut incoming = wire.as_slice();
            while !incoming.is_empty() {
                server.read_tls(&mut incoming).unwrap();
            }
            server.process_new_packets()?;

            wire.clear();
            while server.wants_write() {
                server.write_tls(&mut wire).unwrap();
            }
            let mut incoming = wire.as_slice();
            while !incoming.is_empty() {
                client.read_tls(&mut incoming).unwrap();
            }
            client.process_new_packets()?;
        }
        panic!("handshake did not complete");
    }

    #[test]
    fn chain_only_config_accepts_trusted_leaf() {
        let ca = generate_ca("Acme").unwrap();
        let leaf = generate_server_cert(&ca, &[RECEIVER], 7).unwrap();
        let config = build_tls_config(&material(ca.ca_cert_pem.clone(), None), None).unwrap();
        handshake(config, &leaf).unwrap();
    }

    #[test]
    fn chain_only_config_rejects_foreign_leaf() {
        let ca = generate_ca("Acme").unwrap();
        let other = generate_ca("Globex").unwrap();
        let leaf = generate_server_cert(&other, &[RECEIVER], 7).unwrap();
        let config = build_tls_config(&material(ca.ca_cert_pem.clone(), None), None).unwrap();

        let err = handshake(config, &leaf).unwrap_err();
        assert!(matches!(err, rustls::Error::InvalidCertificate(_)));
    }

    #[test]
    fn crl_config_rejects_revoked_leaf() {
        let ca = generate_ca("Acme").unwrap();
        let revoked = generate_server_cert(&ca, &[RECEIVER], 7).unwrap();
        let crl = generate_crl(&ca, &[7]).unwrap();
        let config = build_tls_config(&material(ca.ca_cert_pem.clone(), Some(crl)), None).unwrap();

        let err = handshake(config, &revoked).unwrap_err();
        assert!(matches!(
            err,
            rustls::Error::InvalidCertificate(rustls::CertificateError::Revoked)
        ));
    }

    #[test]
    fn crl_config_accepts_unrevoked_leaf() {
        let ca = generate_ca("Acme").unwrap();
        let good = generate_server_cert(&ca, &[RECEIVER], 8).unwrap();
        let crl = generate_crl(&ca, &[7]).unwrap();
        let config = build_tls_config(&material(ca.ca_cert_pem.clone(), Some(crl)), None).unwrap();

        handshake(config, &good).unwrap();
    }

    #[test]
    fn crl_signed_by_other_key_fails_handshake() {
        let ca = generate_ca("Acme").unwrap();
        let impostor = generate_ca("Acme").unwrap();
        let good = generate_server_cert(&ca, &[RECEIVER], 8).unwrap();
        let crl = generate_crl(&impostor, &[7]).unwrap();
        let config = build_tls_config(&material(ca.ca_cert_pem.clone(), Some(crl)), None).unwrap();

        assert!(handshake(config, &good).is_err());
    }

    #[tokio::test]
    async fn refused_connection_is_transport_error() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let ca = generate_ca("Acme").unwrap();
        let sink = HttpsSinkFactory::new(Duration::from_secs(5), None)
            .build(&material(ca.ca_cert_pem, None))
            .unwrap();

        let err = sink
            .post(&format!("https://127.0.0.1:{port}/events"), "token", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EventError::Transport(_)));
    }

    #[tokio::test]
    async fn silent_peer_times_out_as_transport_error() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        // Accepts TCP but never answers the TLS handshake.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let ca = generate_ca("Acme").unwrap();
        let sink = HttpsSinkFactory::new(Duration::from_millis(300), None)
            .build(&material(ca.ca_cert_pem, None))
            .unwrap();

        let err = sink
            .post(&format!("https://127.0.0.1:{port}/events"), "token", &[])
            .await
            .unwrap_err();
        match err {
            EventError::Transport(msg) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("expected transport error, got {other:?}"),
        }
        drop(listener);
    }

    #[test]
    fn client_identity_is_presented() {
        let ca = generate_ca("Acme").unwrap();
        let client = generate_server_cert(&ca, &["alarmd.local"], 11).unwrap();
        let identity = ClientIdentity::from_pem(&client.cert_pem, &client.key_pem).unwrap();

        let config = build_tls_config(&material(ca.ca_cert_pem, None), Some(&identity)).unwrap();
        assert!(config.client_auth_cert_resolver.has_certs());
    }

    #[test]
    fn bad_identity_is_rejected() {
        assert!(ClientIdentity::from_pem("nope", "nope").is_err());
    }

    #[test]
    fn identity_debug_redacts_key() {
        let ca = generate_ca("Acme").unwrap();
        let client = generate_server_cert(&ca, &["alarmd.local"], 11).unwrap();
        let identity = ClientIdentity::from_pem(&client.cert_pem, &client.key_pem).unwrap();
        assert!(format!("{identity:?}").contains("REDACTED"));
    }
}
