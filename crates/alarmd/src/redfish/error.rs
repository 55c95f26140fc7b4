//! Redfish failure envelope.

use serde::Serialize;
use tracing::error;

use super::views::MessageInfo;
use crate::error::EventError;

const GENERAL_ERROR: &str = "Base.1.0.GeneralError";
const GENERAL_MESSAGE: &str = "A general error has occurred. See ExtendedInfo for more information.";

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(rename = "@Message.ExtendedInfo")]
    pub extended_info: Vec<MessageInfo>,
}

/// An HTTP status paired with the body to send.
#[derive(Debug, Clone)]
pub struct RedfishError {
    pub status: u16,
    pub envelope: ErrorEnvelope,
}

impl RedfishError {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.envelope).unwrap_or(serde_json::Value::Null)
    }

    /// `MessageId` of the single extended info entry.
    pub fn message_id(&self) -> &str {
        self.envelope
            .error
            .extended_info
            .first()
            .map_or(GENERAL_ERROR, |info| info.message_id.as_str())
    }
}

impl std::fmt::Display for RedfishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let detail = self
            .envelope
            .error
            .extended_info
            .first()
            .map_or("", |info| info.message.as_str());
        write!(f, "HTTP {}: {detail}", self.status)
    }
}

impl std::error::Error for RedfishError {}

impl From<EventError> for RedfishError {
    fn from(e: EventError) -> Self {
        let (status, message_id, resolution) = match &e {
            EventError::Validation(_) => (
                400,
                "Base.1.0.PropertyValueFormatError",
                "Correct the value for the property in the request body and resubmit the request.",
            ),
            EventError::Capacity(_) => (
                400,
                "Base.1.0.CreateLimitReachedForResource",
                "Delete an existing subscription before creating a new one.",
            ),
            EventError::Trust(_) => (
                400,
                "Base.1.0.ActionParameterValueFormatError",
                "Provide a valid certificate or CRL and resubmit the request.",
            ),
            EventError::NotFound(_) => (
                404,
                "Base.1.0.ResourceMissingAtURI",
                "Provide a valid URI and resubmit the request.",
            ),
            EventError::Transport(_)
            | EventError::Persistence(_)
            | EventError::Crypto(_) => (
                500,
                "Base.1.0.InternalError",
                "Resubmit the request. If the problem persists, consider resetting the service.",
            ),
        };

        // Internal details stay in the log.
        let message = if status == 500 {
            error!(error = %e, "Redfish request failed");
            "The request failed due to an internal service error.".to_string()
        } else {
            e.to_string()
        };

        Self {
            status,
            envelope: ErrorEnvelope {
                error: ErrorBody {
                    code: GENERAL_ERROR.to_string(),
                    message: GENERAL_MESSAGE.to_string(),
                    extended_info: vec![MessageInfo::new(message_id, message, "Critical", resolution)],
                },
            },
        }
    }
}
