//! Per-packet side channel: columns, expert infos, and extra data sources.

use std::fmt;
use std::sync::Arc;

use crate::tree::NodeId;
use crate::tvb::SourceId;

/// Packet list columns a chain may write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Protocol,
    Info,
    Source,
    Destination,
    SourcePort,
    DestinationPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Chat,
    Note,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpertGroup {
    /// The packet does not match what the chain expected.
    Malformed,
    /// Bytes were left without a dissector.
    Undecoded,
    Protocol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpertInfo {
    pub severity: Severity,
    pub group: ExpertGroup,
    pub message: String,
    /// The tree item the annotation is attached to, if a tree was built.
    pub item: Option<NodeId>,
}

impl fmt::Display for ExpertInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}/{:?}] {}", self.group, self.severity, self.message)
    }
}

/// A buffer created while dissecting, e.g. decompressed or reassembled payload.
#[derive(Debug, Clone)]
pub struct DataSource {
    pub name: String,
    pub data: Arc<[u8]>,
}

/// Everything a dissection produces besides the tree. All writes are appends; nothing is removed
/// until the whole `PacketInfo` is dropped.
#[derive(Debug, Default, Clone)]
pub struct PacketInfo {
    columns: Vec<(Column, String)>,
    experts: Vec<ExpertInfo>,
    sources: Vec<DataSource>,
}

impl PacketInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_column(&mut self, column: Column, text: impl Into<String>) {
        self.columns.push((column, text.into()));
    }

    /// The most recent text written to the column.
    pub fn column(&self, column: Column) -> Option<&str> {
        self.columns
            .iter()
            .rev()
            .find(|(c, _)| *c == column)
            .map(|(_, text)| text.as_str())
    }

    pub fn column_writes(&self) -> &[(Column, String)] {
        &self.columns
    }

    pub fn add_expert(&mut self, info: ExpertInfo) {
        self.experts.push(info);
    }

    pub fn expert_infos(&self) -> &[ExpertInfo] {
        &self.experts
    }

    pub(crate) fn add_data_source(&mut self, name: &str, data: Arc<[u8]>) -> SourceId {
        let id = SourceId::Derived(self.sources.len());
        self.sources.push(DataSource {
            name: name.to_string(),
            data,
        });
        id
    }

    /// The data source behind a derived buffer. The frame itself is owned by the caller, so
    /// `SourceId::Frame` yields `None`.
    pub fn data_source(&self, id: SourceId) -> Option<&DataSource> {
        match id {
            SourceId::Frame => None,
            SourceId::Derived(i) => self.sources.get(i),
        }
    }

    pub fn data_sources(&self) -> &[DataSource] {
        &self.sources
    }
}
