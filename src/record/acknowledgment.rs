use crate::core::AttributeValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const ACKNOWLEDGE_QUEUED: &str = "Acknowledge_Queued";
pub const ACKNOWLEDGE_RELEASED: &str = "Acknowledge_Released";
pub const ACKNOWLEDGE_SENT: &str = "Acknowledge_Sent";
pub const COMMAND_COMPLETE: &str = "CommandComplete";

/// Pipeline stages every command passes through, in order.
pub const STANDARD_ACKNOWLEDGMENTS: [&str; 3] =
    [ACKNOWLEDGE_QUEUED, ACKNOWLEDGE_RELEASED, ACKNOWLEDGE_SENT];

const STATUS_SUFFIX: &str = "_Status";

/// Returns the stage name if `attribute` is a `<stage>_Status` attribute.
pub fn ack_stage_of(attribute: &str) -> Option<&str> {
    attribute
        .strip_suffix(STATUS_SUFFIX)
        .filter(|stage| !stage.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AckStatus {
    Ok,
    Nok,
    Pending,
    Disabled,
    Timeout,
    Cancelled,
    Other(String),
}

impl AckStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "OK" => Self::Ok,
            "NOK" => Self::Nok,
            "PENDING" => Self::Pending,
            "DISABLED" => Self::Disabled,
            "TIMEOUT" => Self::Timeout,
            "CANCELLED" => Self::Cancelled,
            other => Self::Other(other.to_string()),
        }
    }

    pub(crate) fn from_value(value: &AttributeValue) -> Self {
        match value.as_str() {
            Some(text) => Self::parse(text),
            None => Self::Other(value.to_string()),
        }
    }

    /// Anything but `PENDING` ends a stage.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for AckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Nok => write!(f, "NOK"),
            Self::Pending => write!(f, "PENDING"),
            Self::Disabled => write!(f, "DISABLED"),
            Self::Timeout => write!(f, "TIMEOUT"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Other(s) => write!(f, "{}", s),
        }
    }
}

/// Read-only view of one acknowledgment stage of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub name: String,
    pub status: AckStatus,
    pub time: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CommandEntry, CommandId};
    use crate::record::merge;

    #[test]
    fn test_stage_of() {
        assert_eq!(ack_stage_of("Acknowledge_Sent_Status"), Some(ACKNOWLEDGE_SENT));
        assert_eq!(ack_stage_of("Acknowledge_Sent_Time"), None);
        assert_eq!(ack_stage_of("_Status"), None);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(AckStatus::parse("OK"), AckStatus::Ok);
        assert_eq!(AckStatus::parse("ACCEPTED"), AckStatus::Other("ACCEPTED".into()));
        assert!(!AckStatus::Pending.is_terminal());
        assert!(AckStatus::Nok.is_terminal());
    }

    #[test]
    fn test_acknowledgment_order() {
        let id = CommandId::new("cmd-42").unwrap();
        let entry = CommandEntry::new(id)
            .with("Verifier_Execution_Status", "PENDING")
            .with("Acknowledge_Sent_Status", "OK")
            .with("Acknowledge_Queued_Status", "OK")
            .with("Acknowledge_Queued_Time", "2026-03-01T10:00:00Z")
            .with("Acknowledge_Queued_Message", "queued on default")
            .with("CommandComplete_Status", "PENDING");
        let record = merge(None, &entry);

        let names = record
            .acknowledgments()
            .into_iter()
            .map(|ack| ack.name)
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![ACKNOWLEDGE_QUEUED, ACKNOWLEDGE_SENT, "Verifier_Execution"]
        );

        let queued = record.acknowledgment(ACKNOWLEDGE_QUEUED).unwrap();
        assert_eq!(queued.status, AckStatus::Ok);
        assert!(queued.time.is_some());
        assert_eq!(queued.message.as_deref(), Some("queued on default"));

        assert_eq!(record.completion().unwrap().status, AckStatus::Pending);
        assert!(!record.is_complete());
    }
}
