use crate::foundation::core::ContextKind;
use crate::foundation::error::{VtxError, VtxResult};
use crate::format::binary::BinaryFormat;
use crate::layout::convert::{Converter, ConverterRegistry};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Declares one field to extract from a context kind and pack with a binary format.
///
/// The position of a spec in its list determines its byte offset within a vertex.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeSpec {
    /// Context kind the value is read from.
    pub source: ContextKind,
    /// Attribute name on that context.
    pub attribute: String,
    /// Binary encoding.
    pub format: BinaryFormat,
    /// Frame shift: a value sampled at frame `f` is written to frame `f - frame_offset`.
    pub frame_offset: i64,
    /// Optional conversion applied before encoding.
    pub converter: Option<Converter>,
}

impl AttributeSpec {
    /// Build a spec with no frame offset and no converter.
    pub fn new(source: ContextKind, attribute: impl Into<String>, format: &str) -> VtxResult<Self> {
        Ok(Self {
            source,
            attribute: attribute.into(),
            format: BinaryFormat::parse(format)?,
            frame_offset: 0,
            converter: None,
        })
    }

    /// Set the frame offset.
    pub fn with_frame_offset(mut self, frame_offset: i64) -> Self {
        self.frame_offset = frame_offset;
        self
    }

    /// Set the converter.
    pub fn with_converter(mut self, converter: Converter) -> Self {
        self.converter = Some(converter);
        self
    }
}

/// JSON form of one attribute spec.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AttributeSpecDef {
    /// Context kind.
    pub source: ContextKind,
    /// Attribute name.
    pub attr: String,
    /// Format string.
    pub fmt: String,
    /// Frame offset (default `0`).
    #[serde(default)]
    pub frame_offset: i64,
    /// Converter name; absent or `"none"` means no conversion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<String>,
}

/// An ordered vertex format, as loaded from a JSON file.
#[derive(Clone, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VertexFormat {
    /// Attribute specs in byte order.
    pub attributes: Vec<AttributeSpecDef>,
}

impl VertexFormat {
    /// Parse a vertex format from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> VtxResult<Self> {
        serde_json::from_reader(r)
            .map_err(|e| VtxError::serde(format!("parse vertex format JSON: {e}")))
    }

    /// Parse a vertex format from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> VtxResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            VtxError::validation(format!("open vertex format '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Resolve format strings and converter names into [`AttributeSpec`]s.
    pub fn resolve(&self, converters: &ConverterRegistry) -> VtxResult<Vec<AttributeSpec>> {
        self.attributes
            .iter()
            .map(|def| {
                let converter = match def.convert.as_deref() {
                    None | Some("none") => None,
                    Some(name) => Some(converters.get(name)?),
                };
                Ok(AttributeSpec {
                    source: def.source,
                    attribute: def.attr.clone(),
                    format: BinaryFormat::parse(&def.fmt)?,
                    frame_offset: def.frame_offset,
                    converter,
                })
            })
            .collect()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layout/spec.rs"]
mod tests;
