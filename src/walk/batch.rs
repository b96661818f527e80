use crate::foundation::core::{ContextKind, ObjectId};
use crate::format::value::AttrValue;
use crate::scene::source::{AttributeSchema, AttributeSource};
use std::collections::BTreeMap;

/// Name under which the batch index is exposed on the object context.
pub const BATCH_INDEX_ATTR: &str = "batch_index";

/// Per-export side-table: object → position in the export selection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchTable {
    index: BTreeMap<ObjectId, usize>,
}

impl BatchTable {
    /// Number objects in selection order.
    pub fn from_selection<'a>(ids: impl IntoIterator<Item = &'a ObjectId>) -> Self {
        Self {
            index: ids
                .into_iter()
                .enumerate()
                .map(|(i, id)| (id.clone(), i))
                .collect(),
        }
    }

    pub fn get(&self, id: &ObjectId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Object context that answers `batch_index` from the side-table and defers everything else.
pub struct BatchIndexed<'a> {
    inner: &'a dyn AttributeSource,
    batch_index: Option<usize>,
}

impl<'a> BatchIndexed<'a> {
    pub fn new(inner: &'a dyn AttributeSource, batch_index: Option<usize>) -> Self {
        Self { inner, batch_index }
    }
}

impl AttributeSource for BatchIndexed<'_> {
    fn attribute(&self, name: &str) -> Option<AttrValue> {
        match (name, self.batch_index) {
            (BATCH_INDEX_ATTR, Some(i)) => i64::try_from(i).ok().map(AttrValue::from),
            _ => self.inner.attribute(name),
        }
    }
}

/// Host schema extended with `object.batch_index`.
pub struct WithBatchIndex<'a>(pub &'a dyn AttributeSchema);

impl AttributeSchema for WithBatchIndex<'_> {
    fn has_attribute(&self, kind: ContextKind, name: &str) -> bool {
        (kind == ContextKind::Object && name == BATCH_INDEX_ATTR) || self.0.has_attribute(kind, name)
    }
}
