//! Header field and subtree registration.
//!
//! Every item a chain adds to the tree refers to a header field by [`FieldId`]. The field carries
//! the display name, the filter abbreviation, and how its bytes should be interpreted. Subtrees
//! are only identified by name; a renderer uses the [`SubtreeId`] to remember which nodes the user
//! expanded.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub(crate) u32);

impl FieldId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubtreeId(pub(crate) u32);

impl SubtreeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

/// How the bytes of a field are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// No value, the item is a label over a byte range.
    None,
    Uint8,
    Uint16,
    Uint24,
    Uint32,
    Bytes,
    String,
}

impl FieldType {
    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            FieldType::Uint8 | FieldType::Uint16 | FieldType::Uint24 | FieldType::Uint32
        )
    }
}

/// Display base for unsigned fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldDisplay {
    #[default]
    Dec,
    Hex,
    DecHex,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    /// Name shown in the tree, e.g. "Source Port".
    pub name: String,
    /// Filter string, e.g. "udp.srcport". Unique per registry.
    pub abbrev: String,
    pub ftype: FieldType,
    pub display: FieldDisplay,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, abbrev: impl Into<String>, ftype: FieldType) -> Self {
        Self {
            name: name.into(),
            abbrev: abbrev.into(),
            ftype,
            display: FieldDisplay::default(),
        }
    }

    pub fn with_display(mut self, display: FieldDisplay) -> Self {
        self.display = display;
        self
    }
}

/// Registered header fields, keyed by filter string.
#[derive(Debug, Default, Clone)]
pub struct FieldTable {
    infos: Vec<FieldInfo>,
    by_abbrev: HashMap<String, FieldId>,
}

impl FieldTable {
    /// Registers a field. If a field with the same filter string already exists, simply returns
    /// its id and ignores the new description.
    pub fn get_or_insert(&mut self, info: FieldInfo) -> FieldId {
        if let Some(id) = self.by_abbrev.get(&info.abbrev) {
            return *id;
        }
        let id = FieldId(self.infos.len() as u32);
        self.by_abbrev.insert(info.abbrev.clone(), id);
        self.infos.push(info);
        id
    }

    pub fn get(&self, id: FieldId) -> Option<&FieldInfo> {
        self.infos.get(id.0 as usize)
    }

    pub fn lookup(&self, abbrev: &str) -> Option<FieldId> {
        self.by_abbrev.get(abbrev).copied()
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }
}

/// Registered subtree identifiers, keyed by name.
#[derive(Debug, Default, Clone)]
pub struct SubtreeTable {
    names: Vec<String>,
    by_name: HashMap<String, SubtreeId>,
}

impl SubtreeTable {
    /// Creates a subtree id for the name. If one already exists, simply returns it.
    pub fn get_or_create(&mut self, name: &str) -> SubtreeId {
        if let Some(id) = self.by_name.get(name) {
            return *id;
        }
        let id = SubtreeId(self.names.len() as u32);
        self.by_name.insert(name.to_string(), id);
        self.names.push(name.to_string());
        id
    }

    pub fn name(&self, id: SubtreeId) -> Option<&str> {
        self.names.get(id.0 as usize).map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<SubtreeId> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
