use super::{AttributeValue, ReportError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque key identifying one issued command.
///
/// The key is compared for equality only; its printed form is whatever the
/// issuing system uses (typically `<generation-time>-<origin>-<sequence>-<command-name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(String);

impl CommandId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ReportError::Configuration(
                "command identifier cannot be empty".to_string(),
            ));
        }
        if id.trim() != id {
            return Err(ReportError::Configuration(format!(
                "command identifier '{}' has surrounding whitespace",
                id
            )));
        }
        Ok(Self(id))
    }

    /// Builds an identifier from an optional route/request parameter.
    pub fn from_param(param: Option<&str>) -> Result<Self> {
        match param {
            Some(id) => Self::new(id),
            None => Err(ReportError::Configuration(
                "missing command identifier parameter".to_string(),
            )),
        }
    }

    /// Composes the conventional printed key from its parts.
    ///
    /// Two commands issued by the same origin with the same sequence number
    /// and generation time still get distinct keys when their names differ.
    pub fn compose(
        generation_time: DateTime<Utc>,
        origin: &str,
        sequence_number: u32,
        command_name: &str,
    ) -> Result<Self> {
        if command_name.trim().is_empty() {
            return Err(ReportError::Configuration(
                "command name cannot be empty".to_string(),
            ));
        }
        Self::new(format!(
            "{}-{}-{}-{}",
            generation_time.to_rfc3339_opts(SecondsFormat::Millis, true),
            origin,
            sequence_number,
            command_name
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CommandId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandAttribute {
    pub name: String,
    pub value: AttributeValue,
}

impl CommandAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// One status update for a command, delivered by the live stream or by the
/// historical lookup. Attributes absent from an entry carry no information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEntry {
    command_id: CommandId,
    #[serde(default)]
    attributes: Vec<CommandAttribute>,
}

impl CommandEntry {
    pub fn new(command_id: CommandId) -> Self {
        Self {
            command_id,
            attributes: Vec::new(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.push(CommandAttribute::new(name, value));
        self
    }

    pub fn push(&mut self, attribute: CommandAttribute) {
        self.attributes.push(attribute);
    }

    pub fn command_id(&self) -> &CommandId {
        &self.command_id
    }

    pub fn attributes(&self) -> &[CommandAttribute] {
        &self.attributes
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Last value carried for `name`, if any.
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .rev()
            .find(|attr| attr.name == name)
            .map(|attr| &attr.value)
    }

    /// Parses `{"id": "...", "attributes": {"name": value, ...}}`.
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let id = value
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ReportError::Configuration("entry is missing 'id'".to_string()))?;
        let mut entry = Self::new(CommandId::new(id)?);
        if let Some(attributes) = value.get("attributes") {
            let object = attributes.as_object().ok_or_else(|| {
                ReportError::Configuration(format!(
                    "entry '{}' attributes must be an object",
                    id
                ))
            })?;
            for (name, raw) in object {
                entry.push(CommandAttribute::new(
                    name.as_str(),
                    AttributeValue::from_json(raw),
                ));
            }
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_command_id_validation() {
        assert!(CommandId::new("cmd-42").is_ok());
        assert!(matches!(
            CommandId::new(""),
            Err(ReportError::Configuration(_))
        ));
        assert!(matches!(
            CommandId::new(" cmd-42"),
            Err(ReportError::Configuration(_))
        ));
        assert!(matches!(
            CommandId::from_param(None),
            Err(ReportError::Configuration(_))
        ));
    }

    #[test]
    fn test_compose() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let id = CommandId::compose(ts, "ground-1", 17, "/YSS/SIMULATOR/SWITCH_VOLTAGE_ON").unwrap();
        assert_eq!(
            id.as_str(),
            "2026-03-01T10:00:00.000Z-ground-1-17-/YSS/SIMULATOR/SWITCH_VOLTAGE_ON"
        );

        let other = CommandId::compose(ts, "ground-1", 17, "/YSS/SIMULATOR/SWITCH_VOLTAGE_OFF")
            .unwrap();
        assert_ne!(id, other);
        assert!(matches!(
            CommandId::compose(ts, "ground-1", 17, " "),
            Err(ReportError::Configuration(_))
        ));
    }

    #[test]
    fn test_entry_last_value_wins_within_entry() {
        let entry = CommandEntry::new(CommandId::new("cmd-42").unwrap())
            .with("ack", "PENDING")
            .with("ack", "ACCEPTED");
        assert_eq!(entry.attribute("ack"), Some(&AttributeValue::from("ACCEPTED")));
        assert!(entry.attribute("queued").is_none());
    }

    #[test]
    fn test_entry_from_json() {
        let entry = CommandEntry::from_json(&json!({
            "id": "cmd-42",
            "attributes": {"queued": true, "ack": "ACCEPTED"}
        }))
        .unwrap();
        assert_eq!(entry.command_id().as_str(), "cmd-42");
        assert_eq!(entry.attribute("queued"), Some(&AttributeValue::Boolean(true)));
        assert!(CommandEntry::from_json(&json!({"attributes": {}})).is_err());
    }
}
