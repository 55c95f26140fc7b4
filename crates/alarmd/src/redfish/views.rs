//! Request bodies and resource views, in Redfish property casing.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::TRUST_USAGE;
use crate::subscription::SubscriptionInfo;
use crate::trust::{RootCaInfo, TrustMaterial};

pub const EVENT_SERVICE_URI: &str = "/redfish/v1/EventService";
pub const SUBSCRIPTIONS_URI: &str = "/redfish/v1/EventService/Subscriptions";
pub const SERVICE_CERT_URI: &str = "/redfish/v1/EventService/ServiceCert";

const MESSAGE_ODATA_TYPE: &str = "#Message.v1_0_0.Message";

fn rfc3339(unix_secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(unix_secs, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
}

impl Link {
    pub fn new(odata_id: impl Into<String>) -> Self {
        Self {
            odata_id: odata_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageInfo {
    #[serde(rename = "@odata.type")]
    pub odata_type: String,
    pub message_id: String,
    pub message: String,
    pub severity: String,
    pub resolution: String,
}

impl MessageInfo {
    pub fn new(
        message_id: &str,
        message: impl Into<String>,
        severity: &str,
        resolution: &str,
    ) -> Self {
        Self {
            odata_type: MESSAGE_ODATA_TYPE.to_string(),
            message_id: message_id.to_string(),
            message: message.into(),
            severity: severity.to_string(),
            resolution: resolution.to_string(),
        }
    }
}

/// Body returned by actions and deletes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionResponse {
    #[serde(rename = "@Message.ExtendedInfo")]
    pub extended_info: Vec<MessageInfo>,
}

impl ActionResponse {
    pub fn success() -> Self {
        Self {
            extended_info: vec![MessageInfo::new(
                "Base.1.0.Success",
                "Successfully Completed Request",
                "OK",
                "None",
            )],
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct EventServiceView {
    #[serde(rename = "@odata.type")]
    pub odata_type: &'static str,
    #[serde(rename = "@odata.id")]
    pub odata_id: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub service_enabled: bool,
    pub event_types_for_subscription: Vec<&'static str>,
    pub subscriptions: Link,
    pub service_cert: Link,
}

impl Default for EventServiceView {
    fn default() -> Self {
        Self {
            odata_type: "#EventService.v1_0_0.EventService",
            odata_id: EVENT_SERVICE_URI,
            id: "EventService",
            name: "Event Service",
            service_enabled: true,
            event_types_for_subscription: vec!["Alert"],
            subscriptions: Link::new(SUBSCRIPTIONS_URI),
            service_cert: Link::new(SERVICE_CERT_URI),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionCollectionView {
    #[serde(rename = "@odata.type")]
    pub odata_type: &'static str,
    #[serde(rename = "@odata.id")]
    pub odata_id: &'static str,
    pub name: &'static str,
    #[serde(rename = "Members@odata.count")]
    pub members_count: usize,
    pub members: Vec<Link>,
}

impl SubscriptionCollectionView {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        let members: Vec<Link> = ids
            .into_iter()
            .map(|id| Link::new(subscription_uri(id)))
            .collect();
        Self {
            odata_type: "#EventDestinationCollection.EventDestinationCollection",
            odata_id: SUBSCRIPTIONS_URI,
            name: "Event Subscriptions Collection",
            members_count: members.len(),
            members,
        }
    }
}

pub fn subscription_uri(id: i64) -> String {
    format!("{SUBSCRIPTIONS_URI}/{id}")
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SubscriptionView {
    #[serde(rename = "@odata.type")]
    pub odata_type: &'static str,
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
    pub id: String,
    pub name: String,
    pub destination: String,
    pub event_types: Vec<String>,
    pub protocol: String,
    pub created_time: String,
    pub updated_time: String,
}

impl From<&SubscriptionInfo> for SubscriptionView {
    fn from(info: &SubscriptionInfo) -> Self {
        Self {
            odata_type: "#EventDestination.v1_0_0.EventDestination",
            odata_id: subscription_uri(info.id),
            id: info.id.to_string(),
            name: format!("EventSubscription {}", info.id),
            destination: info.destination.clone(),
            event_types: info.event_types.iter().map(ToString::to_string).collect(),
            protocol: info.protocol.as_str().to_string(),
            created_time: rfc3339(info.created_at),
            updated_time: rfc3339(info.updated_at),
        }
    }
}

/// One installed root CA.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CertChainInfo {
    pub cert_id: i64,
    pub usage: String,
    pub subject: String,
    pub issuer: String,
    pub serial_number: String,
    pub valid_not_before: String,
    pub valid_not_after: String,
    pub fingerprint: String,
    pub crl_imported: bool,
}

impl CertChainInfo {
    pub fn new(material: &TrustMaterial, root: &RootCaInfo) -> Self {
        Self {
            cert_id: material.root_cert_id,
            usage: TRUST_USAGE.to_string(),
            subject: root.subject.clone(),
            issuer: root.issuer.clone(),
            serial_number: root.serial.clone(),
            valid_not_before: rfc3339(root.not_before),
            valid_not_after: rfc3339(root.not_after),
            fingerprint: root.fingerprint.clone(),
            crl_imported: material.crl_pem.is_some(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionTarget {
    pub target: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceCertActions {
    #[serde(rename = "#ServiceCert.ImportRemoteHttpsServiceRootCA")]
    pub import_root_ca: ActionTarget,
    #[serde(rename = "#ServiceCert.DeleteRemoteHttpsServiceRootCA")]
    pub delete_root_ca: ActionTarget,
    #[serde(rename = "#ServiceCert.ImportRemoteHttpsServiceCrl")]
    pub import_crl: ActionTarget,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ServiceCertView {
    #[serde(rename = "@odata.id")]
    pub odata_id: &'static str,
    pub id: &'static str,
    pub name: &'static str,
    pub remote_https_server_cert_chain_info: Vec<CertChainInfo>,
    pub actions: ServiceCertActions,
}

impl ServiceCertView {
    pub fn new(chain_info: Vec<CertChainInfo>) -> Self {
        let action = |name: &str| ActionTarget {
            target: format!("{SERVICE_CERT_URI}/Actions/ServiceCert.{name}"),
        };
        Self {
            odata_id: SERVICE_CERT_URI,
            id: "ServiceCert",
            name: "Service Certificate",
            remote_https_server_cert_chain_info: chain_info,
            actions: ServiceCertActions {
                import_root_ca: action("ImportRemoteHttpsServiceRootCA"),
                delete_root_ca: action("DeleteRemoteHttpsServiceRootCA"),
                import_crl: action("ImportRemoteHttpsServiceCrl"),
            },
        }
    }
}

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpHeaders {
    #[serde(rename = "X-Auth-Token")]
    pub auth_token: String,
}

impl std::fmt::Debug for HttpHeaders {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpHeaders")
            .field("auth_token", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct CreateSubscriptionRequest {
    pub destination: String,
    pub event_types: Vec<String>,
    pub protocol: String,
    pub http_headers: HttpHeaders,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ImportRootCaRequest {
    #[serde(rename = "Type")]
    pub import_type: String,
    pub content: String,
    pub root_cert_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub struct ImportCrlRequest {
    #[serde(rename = "Type")]
    pub import_type: String,
    pub content: String,
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::subscription::{EventType, Protocol};

    #[test]
    fn subscription_view_uses_redfish_names() {
        let info = SubscriptionInfo {
            id: 1,
            destination: "https://10.0.0.1/hook".to_string(),
            event_types: vec![EventType::Alert],
            protocol: Protocol::Redfish,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
        };
        let json = serde_json::to_value(SubscriptionView::from(&info)).unwrap();

        assert_eq!(json["@odata.id"], "/redfish/v1/EventService/Subscriptions/1");
        assert_eq!(json["Id"], "1");
        assert_eq!(json["Destination"], "https://10.0.0.1/hook");
        assert_eq!(json["EventTypes"][0], "Alert");
        assert_eq!(json["Protocol"], "Redfish");
        assert_eq!(json["CreatedTime"], "2023-11-14T22:13:20Z");
    }

    #[test]
    fn collection_counts_members() {
        let json = serde_json::to_value(SubscriptionCollectionView::new([1])).unwrap();
        assert_eq!(json["Members@odata.count"], 1);
        assert_eq!(
            json["Members"][0]["@odata.id"],
            "/redfish/v1/EventService/Subscriptions/1"
        );
    }

    #[test]
    fn create_request_reads_auth_header() {
        let body = r#"{
            "Destination": "https://10.0.0.1/hook",
            "EventTypes": ["Alert"],
            "Protocol": "Redfish",
            "HttpHeaders": {"X-Auth-Token": "secret-token"}
        }"#;
        let req: CreateSubscriptionRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.http_headers.auth_token, "secret-token");
        assert!(!format!("{req:?}").contains("secret-token"));
    }

    #[test]
    fn unknown_request_fields_are_rejected() {
        let body = r#"{"Type": "text", "Content": "x", "RootCertId": 1, "Extra": true}"#;
        assert!(serde_json::from_str::<ImportRootCaRequest>(body).is_err());
    }

    #[test]
    fn service_cert_lists_actions() {
        let json = serde_json::to_value(ServiceCertView::new(Vec::new())).unwrap();
        assert_eq!(
            json["Actions"]["#ServiceCert.ImportRemoteHttpsServiceCrl"]["target"],
            "/redfish/v1/EventService/ServiceCert/Actions/ServiceCert.ImportRemoteHttpsServiceCrl"
        );
        assert!(json["RemoteHttpsServerCertChainInfo"].as_array().unwrap().is_empty());
    }
}
