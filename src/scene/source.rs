use crate::foundation::core::ContextKind;
use crate::format::value::AttrValue;
use std::collections::{BTreeMap, BTreeSet};

/// Read access to the named attributes of one context node (scene, object, face, ...).
///
/// Implementations return the attribute's current value, or `None` when the node does not carry
/// it.
pub trait AttributeSource: Sync {
    /// Current value of `name`.
    fn attribute(&self, name: &str) -> Option<AttrValue>;
}

/// Host data model: which `(kind, attribute)` pairs exist at all.
///
/// Consulted when compiling a layout so that typos fail before any buffer is allocated.
pub trait AttributeSchema {
    /// Return `true` when contexts of `kind` expose `name`.
    fn has_attribute(&self, kind: ContextKind, name: &str) -> bool;
}

/// A fixed, enumerated schema.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticSchema {
    attrs: BTreeMap<ContextKind, BTreeSet<String>>,
}

impl StaticSchema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare one attribute.
    pub fn insert(&mut self, kind: ContextKind, name: impl Into<String>) {
        self.attrs.entry(kind).or_default().insert(name.into());
    }

    /// Builder form of [`Self::insert`].
    pub fn with(mut self, kind: ContextKind, name: impl Into<String>) -> Self {
        self.insert(kind, name);
        self
    }

    /// Add every attribute of `other`.
    pub fn extend(&mut self, other: &StaticSchema) {
        for (kind, names) in &other.attrs {
            self.attrs
                .entry(*kind)
                .or_default()
                .extend(names.iter().cloned());
        }
    }

    /// Declared attribute names of `kind`, sorted.
    pub fn attributes(&self, kind: ContextKind) -> impl Iterator<Item = &str> {
        self.attrs
            .get(&kind)
            .into_iter()
            .flat_map(|s| s.iter().map(String::as_str))
    }
}

impl AttributeSchema for StaticSchema {
    fn has_attribute(&self, kind: ContextKind, name: &str) -> bool {
        self.attrs.get(&kind).is_some_and(|s| s.contains(name))
    }
}

impl AttributeSource for BTreeMap<String, AttrValue> {
    fn attribute(&self, name: &str) -> Option<AttrValue> {
        self.get(name).cloned()
    }
}
