//! The singleton event subscription.

mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EventError;

pub use store::{SUBSCRIPTION_ID, SubscriptionStore};

/// Longest accepted destination URL.
pub const MAX_DESTINATION_LEN: usize = 256;

/// Longest accepted `X-Auth-Token` credential, in bytes.
pub const MAX_CREDENTIAL_LEN: usize = 256;

/// Redfish event types. Only [`EventType::Alert`] may be subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    StatusChange,
    ResourceUpdated,
    ResourceAdded,
    ResourceRemoved,
    Alert,
}

impl EventType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusChange => "StatusChange",
            Self::ResourceUpdated => "ResourceUpdated",
            Self::ResourceAdded => "ResourceAdded",
            Self::ResourceRemoved => "ResourceRemoved",
            Self::Alert => "Alert",
        }
    }

    pub const fn is_supported(self) -> bool {
        matches!(self, Self::Alert)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "StatusChange" => Ok(Self::StatusChange),
            "ResourceUpdated" => Ok(Self::ResourceUpdated),
            "ResourceAdded" => Ok(Self::ResourceAdded),
            "ResourceRemoved" => Ok(Self::ResourceRemoved),
            "Alert" => Ok(Self::Alert),
            other => Err(EventError::Validation(format!("Unknown event type: {other}"))),
        }
    }
}

/// Delivery protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Protocol {
    Redfish,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Redfish => "Redfish",
        }
    }
}

impl FromStr for Protocol {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Redfish" => Ok(Self::Redfish),
            other => Err(EventError::Validation(format!("Unsupported protocol: {other}"))),
        }
    }
}

/// A subscription request with the plaintext credential.
pub struct NewSubscription {
    pub destination: String,
    pub event_types: Vec<EventType>,
    pub protocol: Protocol,
    pub credential: String,
}

impl fmt::Debug for NewSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewSubscription")
            .field("destination", &self.destination)
            .field("event_types", &self.event_types)
            .field("protocol", &self.protocol)
            .field("credential", &"[REDACTED]")
            .finish()
    }
}

impl NewSubscription {
    pub fn validate(&self) -> Result<(), EventError> {
        validate_destination(&self.destination)?;
        validate_event_types(&self.event_types)?;
        validate_credential(&self.credential)
    }
}

/// Public view of the stored subscription. Never carries the credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionInfo {
    pub id: i64,
    pub destination: String,
    pub event_types: Vec<EventType>,
    pub protocol: Protocol,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Destinations must be absolute `https` URLs with a host.
pub fn validate_destination(destination: &str) -> Result<(), EventError> {
    if destination.len() > MAX_DESTINATION_LEN {
        return Err(EventError::Validation(format!(
            "Destination exceeds {MAX_DESTINATION_LEN} characters"
        )));
    }
    let url = reqwest::Url::parse(destination)
        .map_err(|e| EventError::Validation(format!("Destination is not a valid URL: {e}")))?;
    if url.scheme() != "https" {
        return Err(EventError::Validation(format!(
            "Destination scheme must be https, got {}",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(EventError::Validation("Destination has no host".to_string()));
    }
    Ok(())
}

pub fn validate_event_types(event_types: &[EventType]) -> Result<(), EventError> {
    if event_types.is_empty() {
        return Err(EventError::Validation("EventTypes must not be empty".to_string()));
    }
    if let Some(unsupported) = event_types.iter().find(|t| !t.is_supported()) {
        return Err(EventError::Validation(format!(
            "Event type {unsupported} is not supported for subscription"
        )));
    }
    Ok(())
}

pub fn validate_credential(credential: &str) -> Result<(), EventError> {
    if credential.is_empty() || credential.len() > MAX_CREDENTIAL_LEN {
        return Err(EventError::Validation(format!(
            "X-Auth-Token must be 1 to {MAX_CREDENTIAL_LEN} bytes"
        )));
    }
    Ok(())
}

fn encode_event_types(event_types: &[EventType]) -> String {
    let mut names: Vec<&str> = event_types.iter().map(|t| t.as_str()).collect();
    names.sort_unstable();
    names.dedup();
    names.join(",")
}
