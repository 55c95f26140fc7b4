//! Destination-specific severity vocabularies.

use std::str::FromStr;

use crate::error::EventError;

/// Maps internal severity codes to the names a destination type expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeverityProfile {
    /// eSight-style destinations: `0` Critical, `1` Major, `2` Minor.
    ESight,
}

impl SeverityProfile {
    /// The destination name for `code`, or `None` if the profile has no
    /// mapping for it.
    pub const fn map(self, code: i64) -> Option<&'static str> {
        match self {
            Self::ESight => match code {
                0 => Some("Critical"),
                1 => Some("Major"),
                2 => Some("Minor"),
                _ => None,
            },
        }
    }
}

impl FromStr for SeverityProfile {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("esight") {
            Ok(Self::ESight)
        } else {
            Err(EventError::Validation(format!("Unknown severity profile: {s}")))
        }
    }
}
