//! Accumulated state of one command's history and the rules for folding
//! entries into it.

mod acknowledgment;

pub use acknowledgment::{
    ACKNOWLEDGE_QUEUED, ACKNOWLEDGE_RELEASED, ACKNOWLEDGE_SENT, AckStatus, Acknowledgment,
    COMMAND_COMPLETE, STANDARD_ACKNOWLEDGMENTS, ack_stage_of,
};

use crate::core::{AttributeValue, CommandEntry, CommandId};
use im::OrdMap;
use serde::{Deserialize, Serialize};

/// Best-known state of one command.
///
/// Every merge yields a new record; attribute maps are persistent so the
/// previous snapshot stays valid for observers that still hold it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRecord {
    identity: CommandId,
    attributes: OrdMap<String, AttributeValue>,
    #[serde(rename = "merge_count")]
    merges: u64,
}

/// Folds `entry` into `current`, creating the record on first use.
///
/// Attributes present in the entry overwrite the record's value, everything
/// else is retained. Entries are never rejected.
///
/// # Panics
///
/// Panics if `entry` belongs to a different command than `current`; upstream
/// filtering must keep foreign entries out.
pub fn merge(current: Option<&CommandRecord>, entry: &CommandEntry) -> CommandRecord {
    match current {
        Some(record) => record.merge_entry(entry),
        None => CommandRecord::from_entry(entry),
    }
}

impl CommandRecord {
    pub fn from_entry(entry: &CommandEntry) -> Self {
        let mut record = Self {
            identity: entry.command_id().clone(),
            attributes: OrdMap::new(),
            merges: 0,
        };
        record.apply(entry);
        record
    }

    pub fn merge_entry(&self, entry: &CommandEntry) -> Self {
        assert_eq!(
            entry.command_id(),
            &self.identity,
            "entry for command '{}' merged into record of '{}'",
            entry.command_id(),
            self.identity
        );
        let mut record = self.clone();
        record.apply(entry);
        record
    }

    fn apply(&mut self, entry: &CommandEntry) {
        for attr in entry.attributes() {
            self.attributes.insert(attr.name.clone(), attr.value.clone());
        }
        self.merges = self.merges.saturating_add(1);
    }

    pub fn identity(&self) -> &CommandId {
        &self.identity
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Number of entries folded into this record so far, duplicates included.
    pub fn merge_count(&self) -> u64 {
        self.merges
    }

    pub fn comment(&self) -> Option<&str> {
        self.text_attribute("Comment")
    }

    pub fn source(&self) -> Option<&str> {
        self.text_attribute("source")
    }

    pub fn username(&self) -> Option<&str> {
        self.text_attribute("username")
    }

    pub fn binary(&self) -> Option<&[u8]> {
        self.attribute("binary").and_then(|v| v.as_bytes())
    }

    fn text_attribute(&self, name: &str) -> Option<&str> {
        self.attribute(name).and_then(|v| v.as_str())
    }

    /// Acknowledgment view for one stage (`<stage>_Status`, `_Time`, `_Message`).
    pub fn acknowledgment(&self, stage: &str) -> Option<Acknowledgment> {
        let status = self.attribute(&format!("{}_Status", stage))?;
        Some(Acknowledgment {
            name: stage.to_string(),
            status: AckStatus::from_value(status),
            time: self
                .attribute(&format!("{}_Time", stage))
                .and_then(|v| v.as_timestamp()),
            message: self
                .attribute(&format!("{}_Message", stage))
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }

    /// Standard pipeline stages first, in pipeline order, then any extra
    /// (verifier) stages in name order. Completion is reported separately.
    pub fn acknowledgments(&self) -> Vec<Acknowledgment> {
        let mut acks = STANDARD_ACKNOWLEDGMENTS
            .iter()
            .filter_map(|stage| self.acknowledgment(stage))
            .collect::<Vec<_>>();

        for name in self.attributes.keys() {
            let Some(stage) = ack_stage_of(name) else {
                continue;
            };
            if stage == COMMAND_COMPLETE || STANDARD_ACKNOWLEDGMENTS.contains(&stage) {
                continue;
            }
            if let Some(ack) = self.acknowledgment(stage) {
                acks.push(ack);
            }
        }
        acks
    }

    pub fn completion(&self) -> Option<Acknowledgment> {
        self.acknowledgment(COMMAND_COMPLETE)
    }

    pub fn is_complete(&self) -> bool {
        self.completion()
            .map(|ack| ack.status.is_terminal())
            .unwrap_or(false)
    }

    /// Plain JSON rendering: `{"id": ..., "attributes": {...}, "merge_count": n}`.
    pub fn to_json(&self) -> serde_json::Value {
        let attributes = self
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::json!({
            "id": self.identity.as_str(),
            "attributes": attributes,
            "merge_count": self.merges,
        })
    }
}

/// Two records are equal when they describe the same command state; how many
/// entries it took to get there does not matter.
impl PartialEq for CommandRecord {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity && self.attributes == other.attributes
    }
}

impl Eq for CommandRecord {}
