use crate::foundation::core::ContextKind;
use crate::foundation::error::{VtxError, VtxResult};
use crate::format::binary::BinaryFormat;
use crate::layout::convert::Converter;
use crate::layout::spec::AttributeSpec;
use crate::scene::source::AttributeSchema;
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Placement of one attribute spec inside a vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct PackedField {
    /// Byte offset from the start of the vertex.
    pub byte_offset: usize,
    /// Encoded size in bytes.
    pub byte_size: usize,
    /// Binary encoding.
    pub format: BinaryFormat,
    /// Target frame shift.
    pub frame_offset: i64,
    /// Optional conversion applied to the raw value.
    pub converter: Option<Converter>,
}

/// All placements of one attribute name within a context kind.
///
/// Several specs may reference the same attribute (usually with different frame offsets); the
/// value is fetched once and written once per field.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeFields {
    /// Attribute name.
    pub name: String,
    /// Placements in declaration order.
    pub fields: SmallVec<[PackedField; 1]>,
}

/// Compiled byte layout: context kind → attribute → placements.
#[derive(Clone, Debug, PartialEq)]
pub struct LayoutDescriptor {
    buckets: BTreeMap<ContextKind, Vec<AttributeFields>>,
    vertex_byte_size: usize,
    specs: Vec<AttributeSpec>,
}

impl LayoutDescriptor {
    /// Attributes declared for `kind`, in first-declaration order. `None` when the kind has no
    /// declared attributes.
    pub fn bucket(&self, kind: ContextKind) -> Option<&[AttributeFields]> {
        self.buckets.get(&kind).map(Vec::as_slice)
    }

    /// Byte stride between consecutive vertices.
    pub fn vertex_byte_size(&self) -> usize {
        self.vertex_byte_size
    }

    /// The specs this layout was compiled from, in declaration order.
    pub fn specs(&self) -> &[AttributeSpec] {
        &self.specs
    }

    /// `(min, max)` frame offset across all fields, with `0` included in both.
    pub fn frame_offset_bounds(&self) -> (i64, i64) {
        self.specs.iter().fold((0, 0), |(lo, hi), s| {
            (lo.min(s.frame_offset), hi.max(s.frame_offset))
        })
    }

    /// Deterministic textual dump of the layout.
    pub fn dump(&self) -> String {
        let mut s = String::new();
        s.push_str(&format!("LayoutDescriptor stride={}\n", self.vertex_byte_size));
        for (kind, attrs) in &self.buckets {
            s.push_str(&format!("{kind}:\n"));
            for a in attrs {
                for f in &a.fields {
                    s.push_str(&format!(
                        "  {} @{}+{} fmt={} frame_offset={} convert={}\n",
                        a.name,
                        f.byte_offset,
                        f.byte_size,
                        f.format,
                        f.frame_offset,
                        f.converter.as_ref().map_or("none", |c| c.name())
                    ));
                }
            }
        }
        s
    }

    /// 64-bit fingerprint of [`Self::dump`].
    pub fn fingerprint(&self) -> u64 {
        xxhash_rust::xxh3::xxh3_64(self.dump().as_bytes())
    }
}

/// Compile an ordered spec list into a [`LayoutDescriptor`].
///
/// Offsets depend only on spec order. Every `(source, attribute)` pair must exist in `schema`, and
/// specs repeating a pair must differ in frame offset.
pub fn compile(
    specs: &[AttributeSpec],
    schema: &dyn AttributeSchema,
) -> VtxResult<LayoutDescriptor> {
    let mut buckets = BTreeMap::<ContextKind, Vec<AttributeFields>>::new();
    let mut offset = 0usize;

    for spec in specs {
        if !schema.has_attribute(spec.source, &spec.attribute) {
            return Err(VtxError::unknown_attribute(format!(
                "{}.{} does not exist in the host data model",
                spec.source, spec.attribute
            )));
        }

        let byte_size = spec.format.byte_size();
        if byte_size == 0 {
            return Err(VtxError::invalid_format(format!(
                "format '{}' of {}.{} has zero size",
                spec.format, spec.source, spec.attribute
            )));
        }

        let attrs = buckets.entry(spec.source).or_default();
        let idx = match attrs.iter().position(|a| a.name == spec.attribute) {
            Some(idx) => idx,
            None => {
                attrs.push(AttributeFields {
                    name: spec.attribute.clone(),
                    fields: SmallVec::new(),
                });
                attrs.len() - 1
            }
        };
        if attrs[idx]
            .fields
            .iter()
            .any(|f| f.frame_offset == spec.frame_offset)
        {
            return Err(VtxError::validation(format!(
                "{}.{} is declared twice with frame offset {}",
                spec.source, spec.attribute, spec.frame_offset
            )));
        }
        attrs[idx].fields.push(PackedField {
            byte_offset: offset,
            byte_size,
            format: spec.format.clone(),
            frame_offset: spec.frame_offset,
            converter: spec.converter.clone(),
        });

        offset = offset.checked_add(byte_size).ok_or_else(|| {
            VtxError::capacity("vertex byte size overflows the addressable size")
        })?;
    }

    Ok(LayoutDescriptor {
        buckets,
        vertex_byte_size: offset,
        specs: specs.to_vec(),
    })
}

#[cfg(test)]
#[path = "../../tests/unit/layout/compiler.rs"]
mod tests;
