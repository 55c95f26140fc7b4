//! Redfish `EventService` operations.
//!
//! Transport-agnostic: each operation takes a typed request and returns a
//! serde view or a [`RedfishError`] carrying the status and envelope. An
//! HTTP layer only has to route and serialize.

mod error;
mod views;

use serde::de::DeserializeOwned;
use tracing::{info, instrument};

use crate::error::EventError;
use crate::subscription::{
    EventType, NewSubscription, Protocol, SUBSCRIPTION_ID, SubscriptionStore,
};
use crate::trust::{CertTrustManager, IMPORT_TYPE_TEXT};

pub use error::{ErrorBody, ErrorEnvelope, RedfishError};
pub use views::{
    ActionResponse, CertChainInfo, CreateSubscriptionRequest, EVENT_SERVICE_URI, EventServiceView,
    HttpHeaders, ImportCrlRequest, ImportRootCaRequest, Link, MessageInfo, SERVICE_CERT_URI,
    SUBSCRIPTIONS_URI, ServiceCertView, SubscriptionCollectionView, SubscriptionView,
    subscription_uri,
};

/// The only root certificate slot.
pub const ROOT_CERT_ID: i64 = 1;

/// Decode a JSON request body. Malformed bodies are validation failures.
pub fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, RedfishError> {
    serde_json::from_slice(body)
        .map_err(|e| EventError::Validation(format!("Malformed request body: {e}")).into())
}

fn check_import_type(import_type: &str) -> Result<(), EventError> {
    if import_type == IMPORT_TYPE_TEXT {
        Ok(())
    } else {
        Err(EventError::Validation(format!(
            "Type must be \"{IMPORT_TYPE_TEXT}\", got \"{import_type}\""
        )))
    }
}

fn check_root_cert_id(id: i64) -> Result<(), EventError> {
    if id == ROOT_CERT_ID {
        Ok(())
    } else {
        Err(EventError::Validation(format!(
            "RootCertId must be {ROOT_CERT_ID}, got {id}"
        )))
    }
}

#[derive(Clone)]
pub struct EventService {
    subscriptions: SubscriptionStore,
    trust: CertTrustManager,
}

impl EventService {
    pub const fn new(subscriptions: SubscriptionStore, trust: CertTrustManager) -> Self {
        Self {
            subscriptions,
            trust,
        }
    }

    /// `GET /EventService`
    #[allow(clippy::unused_self)]
    pub fn root(&self) -> EventServiceView {
        EventServiceView::default()
    }

    /// `GET /EventService/Subscriptions`
    pub async fn list_subscriptions(&self) -> Result<SubscriptionCollectionView, RedfishError> {
        let subs = self.subscriptions.list().await?;
        Ok(SubscriptionCollectionView::new(subs.iter().map(|s| s.id)))
    }

    /// `POST /EventService/Subscriptions`
    #[instrument(skip_all, fields(destination = %request.destination))]
    pub async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<SubscriptionView, RedfishError> {
        let event_types = request
            .event_types
            .iter()
            .map(|name| name.parse::<EventType>())
            .collect::<Result<Vec<_>, _>>()?;
        let protocol: Protocol = request.protocol.parse()?;

        let info = self
            .subscriptions
            .create(&NewSubscription {
                destination: request.destination,
                event_types,
                protocol,
                credential: request.http_headers.auth_token,
            })
            .await?;
        Ok(SubscriptionView::from(&info))
    }

    /// `GET /EventService/Subscriptions/{id}`
    pub async fn get_subscription(&self, id: i64) -> Result<SubscriptionView, RedfishError> {
        let info = self
            .subscriptions
            .get(id)
            .await?
            .ok_or_else(|| EventError::NotFound(format!("Subscription {id}")))?;
        Ok(SubscriptionView::from(&info))
    }

    /// `DELETE /EventService/Subscriptions/{id}`
    pub async fn delete_subscription(&self, id: i64) -> Result<ActionResponse, RedfishError> {
        if id != SUBSCRIPTION_ID {
            return Err(EventError::NotFound(format!("Subscription {id}")).into());
        }
        self.subscriptions.delete(id).await?;
        Ok(ActionResponse::success())
    }

    /// `GET /EventService/ServiceCert`
    pub async fn service_cert(&self) -> Result<ServiceCertView, RedfishError> {
        let mut chain_info = Vec::new();
        if let Some(current) = self.trust.current().await? {
            let root = current.root().map_err(EventError::from)?;
            chain_info.push(CertChainInfo::new(&current, &root));
        }
        Ok(ServiceCertView::new(chain_info))
    }

    /// `POST .../ServiceCert.ImportRemoteHttpsServiceRootCA`
    #[instrument(skip_all, fields(root_cert_id = request.root_cert_id))]
    pub async fn import_root_ca(
        &self,
        request: ImportRootCaRequest,
    ) -> Result<ActionResponse, RedfishError> {
        check_import_type(&request.import_type)?;
        check_root_cert_id(request.root_cert_id)?;

        let root = self
            .trust
            .install_trust(request.root_cert_id, &request.content, None)
            .await?;
        info!(subject = %root.subject, chain_len = root.chain_len, "Root CA imported");
        Ok(ActionResponse::success())
    }

    /// `DELETE .../ServiceCert.DeleteRemoteHttpsServiceRootCA/{id}`
    ///
    /// Removes the backup generation only; the certificate in use stays.
    #[instrument(skip(self))]
    pub async fn delete_root_ca(&self, root_cert_id: i64) -> Result<ActionResponse, RedfishError> {
        check_root_cert_id(root_cert_id)?;

        let backup = self.trust.get_unused().await?;
        if backup.root_cert_id != root_cert_id {
            return Err(EventError::NotFound(format!("Backup root CA {root_cert_id}")).into());
        }
        self.trust.delete().await?;
        Ok(ActionResponse::success())
    }

    /// `POST .../ServiceCert.ImportRemoteHttpsServiceCrl`
    #[instrument(skip_all)]
    pub async fn import_crl(&self, request: ImportCrlRequest) -> Result<ActionResponse, RedfishError> {
        check_import_type(&request.import_type)?;
        self.trust.import_crl(&request.content).await?;
        Ok(ActionResponse::success())
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use alarmd_crypto::certs::{generate_ca, generate_crl};
    use alarmd_crypto::{AeadCredentialCipher, CredentialCipher, CredentialKey};

    use super::*;
    use crate::storage::EventDatabase;

    async fn service() -> (EventService, CertTrustManager) {
        let db = EventDatabase::open_in_memory().await.unwrap();
        let cipher: Arc<dyn CredentialCipher> =
            Arc::new(AeadCredentialCipher::new(&CredentialKey::generate()));
        let trust = CertTrustManager::new(db.clone(), Arc::clone(&cipher));
        let subs = SubscriptionStore::new(db, cipher);
        (EventService::new(subs, trust.clone()), trust)
    }

    fn create_body(event_types: &str) -> Vec<u8> {
        format!(
            r#"{{"Destination": "https://10.0.0.1/hook", "EventTypes": {event_types},
                "Protocol": "Redfish", "HttpHeaders": {{"X-Auth-Token": "token-abc"}}}}"#
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn create_then_get_subscription() {
        let (svc, _) = service().await;
        let req = parse_body(&create_body(r#"["Alert"]"#)).unwrap();

        let created = svc.create_subscription(req).await.unwrap();
        assert_eq!(created.odata_id, "/redfish/v1/EventService/Subscriptions/1");

        let fetched = svc.get_subscription(1).await.unwrap();
        assert_eq!(fetched.destination, "https://10.0.0.1/hook");

        let collection = svc.list_subscriptions().await.unwrap();
        assert_eq!(collection.members_count, 1);
    }

    #[tokio::test]
    async fn second_subscription_is_400() {
        let (svc, _) = service().await;
        svc.create_subscription(parse_body(&create_body(r#"["Alert"]"#)).unwrap())
            .await
            .unwrap();

        let err = svc
            .create_subscription(parse_body(&create_body(r#"["Alert"]"#)).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message_id(), "Base.1.0.CreateLimitReachedForResource");
    }

    #[tokio::test]
    async fn unsupported_event_type_is_400() {
        let (svc, _) = service().await;
        let err = svc
            .create_subscription(parse_body(&create_body(r#"["StatusChange"]"#)).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);

        let err = svc
            .create_subscription(parse_body(&create_body(r#"["Bogus"]"#)).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let err = parse_body::<CreateSubscriptionRequest>(b"{not json").unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn missing_subscription_is_404() {
        let (svc, _) = service().await;
        assert_eq!(svc.get_subscription(1).await.unwrap_err().status, 404);
        assert_eq!(svc.delete_subscription(1).await.unwrap_err().status, 404);
        assert_eq!(svc.delete_subscription(2).await.unwrap_err().status, 404);
    }

    #[tokio::test]
    async fn delete_subscription_succeeds() {
        let (svc, _) = service().await;
        svc.create_subscription(parse_body(&create_body(r#"["Alert"]"#)).unwrap())
            .await
            .unwrap();

        let resp = svc.delete_subscription(1).await.unwrap();
        assert_eq!(resp.extended_info[0].message_id, "Base.1.0.Success");
        assert_eq!(svc.list_subscriptions().await.unwrap().members_count, 0);
    }

    #[tokio::test]
    async fn import_root_ca_shows_in_service_cert() {
        let (svc, _) = service().await;
        let ca = generate_ca("Acme").unwrap();

        svc.import_root_ca(ImportRootCaRequest {
            import_type: "text".to_string(),
            content: ca.ca_cert_pem.clone(),
            root_cert_id: 1,
        })
        .await
        .unwrap();

        let view = svc.service_cert().await.unwrap();
        let info = &view.remote_https_server_cert_chain_info[0];
        assert_eq!(info.cert_id, 1);
        assert_eq!(info.usage, "EventSubscription");
        assert!(info.subject.contains("Acme CA"));
        assert!(!info.crl_imported);
    }

    #[tokio::test]
    async fn import_root_ca_checks_type_and_id() {
        let (svc, _) = service().await;
        let ca = generate_ca("Acme").unwrap();

        let err = svc
            .import_root_ca(ImportRootCaRequest {
                import_type: "file".to_string(),
                content: ca.ca_cert_pem.clone(),
                root_cert_id: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);

        let err = svc
            .import_root_ca(ImportRootCaRequest {
                import_type: "text".to_string(),
                content: ca.ca_cert_pem,
                root_cert_id: 2,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn garbage_root_ca_is_400() {
        let (svc, _) = service().await;
        let err = svc
            .import_root_ca(ImportRootCaRequest {
                import_type: "text".to_string(),
                content: "-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n"
                    .to_string(),
                root_cert_id: 1,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn import_crl_marks_service_cert() {
        let (svc, _) = service().await;
        let ca = generate_ca("Acme").unwrap();
        svc.import_root_ca(ImportRootCaRequest {
            import_type: "text".to_string(),
            content: ca.ca_cert_pem.clone(),
            root_cert_id: 1,
        })
        .await
        .unwrap();

        svc.import_crl(ImportCrlRequest {
            import_type: "text".to_string(),
            content: generate_crl(&ca, &[7]).unwrap(),
        })
        .await
        .unwrap();

        let view = svc.service_cert().await.unwrap();
        assert!(view.remote_https_server_cert_chain_info[0].crl_imported);
    }

    #[tokio::test]
    async fn import_crl_without_root_is_400() {
        let (svc, _) = service().await;
        let ca = generate_ca("Acme").unwrap();
        let err = svc
            .import_crl(ImportCrlRequest {
                import_type: "text".to_string(),
                content: generate_crl(&ca, &[]).unwrap(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status, 400);
    }

    #[tokio::test]
    async fn delete_root_ca_removes_backup_only() {
        let (svc, trust) = service().await;
        let a = generate_ca("Alpha").unwrap();
        let b = generate_ca("Beta").unwrap();

        // Nothing to delete yet.
        assert_eq!(svc.delete_root_ca(1).await.unwrap_err().status, 404);

        for ca in [&a, &b] {
            svc.import_root_ca(ImportRootCaRequest {
                import_type: "text".to_string(),
                content: ca.ca_cert_pem.clone(),
                root_cert_id: 1,
            })
            .await
            .unwrap();
        }

        svc.delete_root_ca(1).await.unwrap();
        let generations = trust.generations().await.unwrap();
        assert!(generations.previous.is_none());
        assert_eq!(generations.current.unwrap().cert_pem, b.ca_cert_pem);
    }
}
