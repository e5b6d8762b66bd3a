//! Status vocabularies for the ensemble and its nodes.
//!
//! Both sets are closed. Parsing is case-insensitive so that `"running"` and
//! `"Running"` name the same state; display and wire output use PascalCase.

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

/// Error parsing a status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {vocabulary} status: {value:?}")]
pub struct ParseStatusError {
    /// Which vocabulary was being parsed (`ensemble` or `node`).
    pub vocabulary: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Ensemble-level status. Set directly by control events, never derived from children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EnsembleStatus {
    #[default]
    Unknown,
    Starting,
    Running,
    Stopped,
    Cancelled,
    Failed,
}

impl EnsembleStatus {
    pub const ALL: [EnsembleStatus; 6] = [
        EnsembleStatus::Unknown,
        EnsembleStatus::Starting,
        EnsembleStatus::Running,
        EnsembleStatus::Stopped,
        EnsembleStatus::Cancelled,
        EnsembleStatus::Failed,
    ];

    /// PascalCase wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EnsembleStatus::Unknown => "Unknown",
            EnsembleStatus::Starting => "Starting",
            EnsembleStatus::Running => "Running",
            EnsembleStatus::Stopped => "Stopped",
            EnsembleStatus::Cancelled => "Cancelled",
            EnsembleStatus::Failed => "Failed",
        }
    }

    /// Whether the ensemble has reached a state it will not leave.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            EnsembleStatus::Stopped | EnsembleStatus::Cancelled | EnsembleStatus::Failed
        )
    }
}

/// Status of a realization, stage, step or job. Each node holds its own status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NodeStatus {
    #[default]
    Unknown,
    Pending,
    Waiting,
    Running,
    Finished,
    Failed,
}

impl NodeStatus {
    pub const ALL: [NodeStatus; 6] = [
        NodeStatus::Unknown,
        NodeStatus::Pending,
        NodeStatus::Waiting,
        NodeStatus::Running,
        NodeStatus::Finished,
        NodeStatus::Failed,
    ];

    /// PascalCase wire name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Unknown => "Unknown",
            NodeStatus::Pending => "Pending",
            NodeStatus::Waiting => "Waiting",
            NodeStatus::Running => "Running",
            NodeStatus::Finished => "Finished",
            NodeStatus::Failed => "Failed",
        }
    }

    /// True for `Finished` and `Failed`.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, NodeStatus::Finished | NodeStatus::Failed)
    }
}

fn parse_status<T: Copy>(
    all: &[T],
    name: fn(&T) -> &'static str,
    vocabulary: &'static str,
    s: &str,
) -> Result<T, ParseStatusError> {
    all.iter()
        .copied()
        .find(|candidate| name(candidate).eq_ignore_ascii_case(s.trim()))
        .ok_or_else(|| ParseStatusError {
            vocabulary,
            value: s.to_string(),
        })
}

impl FromStr for EnsembleStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_status(&Self::ALL, Self::as_str, "ensemble", s)
    }
}

impl FromStr for NodeStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_status(&Self::ALL, Self::as_str, "node", s)
    }
}

impl fmt::Display for EnsembleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl TryFrom<String> for EnsembleStatus {
    type Error = ParseStatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl TryFrom<String> for NodeStatus {
    type Error = ParseStatusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EnsembleStatus> for String {
    fn from(status: EnsembleStatus) -> Self {
        status.as_str().to_string()
    }
}

impl From<NodeStatus> for String {
    fn from(status: NodeStatus) -> Self {
        status.as_str().to_string()
    }
}
