//! Protocol name to chain mapping, loaded once and frozen.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::chain::Chain;
use crate::error::RegistryError;
use crate::fields::{FieldId, FieldInfo, FieldTable, SubtreeId, SubtreeTable};

/// Interned protocol name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProtocolId(u32);

impl ProtocolId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Dissector {
    name: String,
    chain: Chain,
}

impl Dissector {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }
}

/// Collects fields, subtrees and chains before anything is dissected.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    fields: FieldTable,
    subtrees: SubtreeTable,
    dissectors: Option<Vec<Dissector>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(&mut self, info: FieldInfo) -> FieldId {
        self.fields.get_or_insert(info)
    }

    pub fn subtree(&mut self, name: &str) -> SubtreeId {
        self.subtrees.get_or_create(name)
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    /// Bulk loads every chain. May only be called once; nothing is registered if any name
    /// appears twice.
    pub fn register_dissectors<I, S>(&mut self, chains: I) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = (S, Chain)>,
        S: Into<String>,
    {
        if self.dissectors.is_some() {
            return Err(RegistryError::AlreadyRegistered);
        }

        let mut seen = HashSet::new();
        let mut dissectors = Vec::new();
        for (name, chain) in chains {
            let name: String = name.into();
            if !seen.insert(name.clone()) {
                return Err(RegistryError::DuplicateProtocol(name));
            }
            dissectors.push(Dissector { name, chain });
        }

        debug!("registered {} dissectors", dissectors.len());
        self.dissectors = Some(dissectors);
        Ok(())
    }

    /// Validates every chain and freezes the registry.
    pub fn build(self) -> Result<Registry, RegistryError> {
        for dissector in self.dissectors.iter().flatten() {
            dissector
                .chain
                .validate(&self.fields, &self.subtrees)
                .map_err(|source| RegistryError::InvalidChain {
                    protocol: dissector.name.clone(),
                    source,
                })?;
        }
        Ok(self.freeze())
    }

    /// Freezes the registry without the push/pop checks. Construction defects then surface while
    /// dissecting, as malformed annotations.
    pub fn build_unvalidated(self) -> Registry {
        warn!("chain validation is disabled");
        self.freeze()
    }

    fn freeze(self) -> Registry {
        let dissectors = self.dissectors.unwrap_or_default();
        let ids: HashMap<_, _> = dissectors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name.clone(), ProtocolId(i as u32)))
            .collect();

        for dissector in &dissectors {
            for index in dissector.chain.zero_length_decodes() {
                warn!(
                    "{}: instruction {index} decodes a length outside 1 to 4 bytes, which reads as 0",
                    dissector.name
                );
            }
            for target in dissector.chain.delegation_targets() {
                if !ids.contains_key(target) {
                    warn!(
                        "{}: delegates to unregistered protocol {target:?}",
                        dissector.name
                    );
                }
            }
        }

        Registry {
            ids,
            dissectors,
            fields: self.fields,
            subtrees: self.subtrees,
        }
    }
}

/// Read-only after construction, so it can be shared across threads.
#[derive(Debug, Clone)]
pub struct Registry {
    ids: HashMap<String, ProtocolId>,
    dissectors: Vec<Dissector>,
    fields: FieldTable,
    subtrees: SubtreeTable,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn id(&self, name: &str) -> Option<ProtocolId> {
        self.ids.get(name).copied()
    }

    pub fn dissector(&self, id: ProtocolId) -> Option<&Dissector> {
        self.dissectors.get(id.0 as usize)
    }

    pub fn find(&self, name: &str) -> Option<&Dissector> {
        self.id(name).and_then(|id| self.dissector(id))
    }

    pub fn lookup(&self, name: &str) -> Option<&Chain> {
        self.find(name).map(Dissector::chain)
    }

    pub fn fields(&self) -> &FieldTable {
        &self.fields
    }

    pub fn subtrees(&self) -> &SubtreeTable {
        &self.subtrees
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.dissectors.iter().map(Dissector::name)
    }

    pub fn len(&self) -> usize {
        self.dissectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dissectors.is_empty()
    }
}

#[cfg(test)]
mod test_registry {
    use super::*;
    use crate::chain::ChainBuilder;
    use crate::error::{ChainIntegrityError, StackKind};
    use crate::fields::FieldType;

    #[test]
    fn lookup_by_name_and_id() {
        let mut builder = Registry::builder();
        builder
            .register_dissectors([
                ("foo", ChainBuilder::new().advance(1).build()),
                ("bar", Chain::default()),
            ])
            .unwrap();
        let registry = builder.build().unwrap();

        assert_eq!(registry.len(), 2);
        let foo = registry.id("foo").unwrap();
        assert_eq!(registry.dissector(foo).unwrap().name(), "foo");
        assert_eq!(registry.lookup("foo").unwrap().len(), 1);
        assert!(registry.lookup("bar").unwrap().is_empty());
        assert!(registry.lookup("baz").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["foo", "bar"]);
    }

    #[test]
    fn registration_happens_once() {
        let mut builder = Registry::builder();
        builder
            .register_dissectors([("foo", Chain::default())])
            .unwrap();
        assert_eq!(
            builder.register_dissectors([("bar", Chain::default())]),
            Err(RegistryError::AlreadyRegistered)
        );
    }

    #[test]
    fn duplicate_names_register_nothing() {
        let mut builder = Registry::builder();
        assert_eq!(
            builder.register_dissectors([("foo", Chain::default()), ("foo", Chain::default())]),
            Err(RegistryError::DuplicateProtocol("foo".into()))
        );
        // The failed attempt does not count as the one registration.
        builder
            .register_dissectors([("foo", Chain::default())])
            .unwrap();
    }

    #[test]
    fn build_rejects_invalid_chains() {
        let mut builder = Registry::builder();
        builder
            .register_dissectors([("broken", ChainBuilder::new().pop_tree().build())])
            .unwrap();
        assert_eq!(
            builder.build().unwrap_err(),
            RegistryError::InvalidChain {
                protocol: "broken".into(),
                source: ChainIntegrityError::UnmatchedPop {
                    kind: StackKind::Tree,
                    index: 0
                },
            }
        );
    }

    #[test]
    fn invalid_chain_error_reports_its_cause_once() {
        use std::error::Error;

        let mut builder = Registry::builder();
        builder
            .register_dissectors([("broken", ChainBuilder::new().pop_tree().build())])
            .unwrap();
        let err = builder.build().unwrap_err();
        assert_eq!(err.to_string(), "chain for protocol \"broken\" is invalid");
        assert_eq!(
            err.source().unwrap().to_string(),
            "pop tree at instruction 0 has no matching push"
        );
    }

    #[test]
    fn build_unvalidated_accepts_invalid_chains() {
        let mut builder = Registry::builder();
        builder
            .register_dissectors([("broken", ChainBuilder::new().pop_tree().build())])
            .unwrap();
        assert!(builder.build_unvalidated().lookup("broken").is_some());
    }

    #[test]
    fn fields_are_shared_by_filter() {
        let mut builder = Registry::builder();
        let a = builder.field(FieldInfo::new("Len", "foo.len", FieldType::Uint16));
        let b = builder.field(FieldInfo::new("Len", "foo.len", FieldType::Uint16));
        assert_eq!(a, b);
        let registry = builder.build().unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.fields().lookup("foo.len"), Some(a));
    }

    #[test]
    fn registry_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry>();
    }
}
