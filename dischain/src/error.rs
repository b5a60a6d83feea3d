use thiserror::Error;

/// A read which does not fit inside the active buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("read of {length} bytes at offset {offset} exceeds buffer of {available} bytes")]
pub struct BoundsError {
    pub offset: usize,
    pub length: usize,
    pub available: usize,
}

/// Whether a stack problem concerns sub-buffers or sub-trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackKind {
    Buffer,
    Tree,
}

impl std::fmt::Display for StackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StackKind::Buffer => f.write_str("buffer"),
            StackKind::Tree => f.write_str("tree"),
        }
    }
}

/// A defect in how a chain was put together, as opposed to a problem with packet data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainIntegrityError {
    #[error("pop {kind} at instruction {index} has no matching push")]
    UnmatchedPop { kind: StackKind, index: usize },

    #[error("push {kind} at instruction {index} is never popped")]
    UnclosedPush { kind: StackKind, index: usize },

    #[error("pop {kind} at instruction {index} closes the {open} pushed at instruction {pushed_at}")]
    CrossedPush {
        kind: StackKind,
        index: usize,
        open: StackKind,
        pushed_at: usize,
    },

    #[error("instruction {index} refers to instruction {item}, which does not produce a tree item")]
    BadItemRef { index: usize, item: usize },

    #[error("instruction {index} refers to the item of instruction {item}, which was not produced")]
    MissingItem { index: usize, item: usize },

    #[error("instruction {index} uses unregistered field {field}")]
    UnknownField { index: usize, field: u32 },

    #[error("instruction {index} uses unregistered subtree {subtree}")]
    UnknownSubtree { index: usize, subtree: u32 },
}

/// Anything which aborts a single chain run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DissectError {
    #[error(transparent)]
    Bounds(#[from] BoundsError),

    #[error(transparent)]
    Integrity(#[from] ChainIntegrityError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("dissectors have already been registered")]
    AlreadyRegistered,

    #[error("protocol {0:?} is registered more than once")]
    DuplicateProtocol(String),

    #[error("chain for protocol {protocol:?} is invalid")]
    InvalidChain {
        protocol: String,
        #[source]
        source: ChainIntegrityError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
