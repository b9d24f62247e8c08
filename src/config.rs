use crate::core::{ReportError, Result};
use std::fmt;

/// Where entries of other commands are filtered out of the live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterPlacement {
    /// Subscribe to every in-flight command and filter locally.
    #[default]
    ClientSide,
    /// Ask the transport for this command only, when it supports that.
    Transport,
}

impl fmt::Display for FilterPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientSide => write!(f, "client"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

/// Command report configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportConfig {
    /// Forwarded to the transport when opening the live stream
    pub ignore_past_commands: bool,

    /// Where foreign entries are filtered out
    pub filter_placement: FilterPlacement,

    /// Whether to look up the stored history of the command
    pub backfill: bool,
}

impl ReportConfig {
    pub fn new() -> Self {
        Self {
            ignore_past_commands: false,
            filter_placement: FilterPlacement::ClientSide,
            backfill: true,
        }
    }

    pub fn ignore_past_commands(mut self, ignore: bool) -> Self {
        self.ignore_past_commands = ignore;
        self
    }

    pub fn filter_placement(mut self, placement: FilterPlacement) -> Self {
        self.filter_placement = placement;
        self
    }

    pub fn backfill(mut self, enabled: bool) -> Self {
        self.backfill = enabled;
        self
    }

    /// Parse from a settings string
    ///
    /// Format: comma separated `key=value` pairs, e.g.
    /// `"ignore_past_commands=true,filter=transport,backfill=false"`.
    pub fn parse(settings: &str) -> Result<Self> {
        let pairs = settings
            .split(',')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                pair.split_once('=').ok_or_else(|| {
                    ReportError::Configuration(format!("expected key=value, got '{}'", pair))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_pairs(pairs)
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut config = Self::new();
        for (key, value) in pairs {
            let value = value.trim();
            match key.trim() {
                "ignore_past_commands" => {
                    config.ignore_past_commands = parse_bool(key, value)?;
                }
                "backfill" => {
                    config.backfill = parse_bool(key, value)?;
                }
                "filter" => {
                    config.filter_placement = match value {
                        "client" => FilterPlacement::ClientSide,
                        "transport" => FilterPlacement::Transport,
                        other => {
                            return Err(ReportError::Configuration(format!(
                                "filter must be 'client' or 'transport', got '{}'",
                                other
                            )));
                        }
                    };
                }
                other => {
                    return Err(ReportError::Configuration(format!(
                        "unknown report setting '{}'",
                        other
                    )));
                }
            }
        }
        Ok(config)
    }

    /// Convert to settings string
    pub fn to_settings(&self) -> String {
        format!(
            "ignore_past_commands={},filter={},backfill={}",
            self.ignore_past_commands, self.filter_placement, self.backfill
        )
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    value.parse::<bool>().map_err(|_| {
        ReportError::Configuration(format!("{} must be true or false, got '{}'", key, value))
    })
}
