use crate::foundation::error::{VtxError, VtxResult};
use std::fmt;
use std::str::FromStr;

/// Absolute 0-based frame index relative to the first exported frame.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct FrameIndex(pub u64);

impl FrameIndex {
    /// Apply a signed frame offset, returning `None` when the result would be negative.
    ///
    /// A field with `frame_offset = d` sampled at frame `f` lands in frame `f - d`.
    pub fn minus_offset(self, offset: i64) -> Option<FrameIndex> {
        let f = i128::from(self.0) - i128::from(offset);
        u64::try_from(f).ok().map(FrameIndex)
    }
}

/// Identifier of an exported object (its name in the host scene).
#[derive(
    Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct ObjectId(pub String);

impl ObjectId {
    /// Create an object identifier from a name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the underlying name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The hierarchical source a vertex attribute is read from.
///
/// The declaration order matches the fixed sub-order in which the topology walker visits
/// contexts for every emitted vertex.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ContextKind {
    /// Scene-wide values (current frame, render settings, ...).
    #[serde(alias = "Scene")]
    Scene,
    /// The exported object itself.
    #[serde(alias = "Object")]
    Object,
    /// The triangle currently being walked.
    #[serde(alias = "MeshPolygon", alias = "polygon")]
    Face,
    /// The face's material, when it is not shader-graph based.
    #[serde(alias = "Material")]
    Material,
    /// The face corner (loop) currently being walked.
    #[serde(alias = "MeshLoop")]
    Loop,
    /// The active texture-coordinate layer entry for the current loop.
    #[serde(alias = "MeshUVLoop", alias = "uv")]
    TexCoord,
    /// The mesh vertex referenced by the current loop.
    #[serde(alias = "MeshVertex")]
    Vertex,
}

impl ContextKind {
    /// All context kinds in walk order.
    pub const ALL: [ContextKind; 7] = [
        ContextKind::Scene,
        ContextKind::Object,
        ContextKind::Face,
        ContextKind::Material,
        ContextKind::Loop,
        ContextKind::TexCoord,
        ContextKind::Vertex,
    ];

    /// Stable lowercase name, as used in manifests and vertex format files.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scene => "scene",
            Self::Object => "object",
            Self::Face => "face",
            Self::Material => "material",
            Self::Loop => "loop",
            Self::TexCoord => "tex_coord",
            Self::Vertex => "vertex",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContextKind {
    type Err = VtxError;

    fn from_str(s: &str) -> VtxResult<Self> {
        match s {
            "scene" | "Scene" => Ok(Self::Scene),
            "object" | "Object" => Ok(Self::Object),
            "face" | "polygon" | "MeshPolygon" => Ok(Self::Face),
            "material" | "Material" => Ok(Self::Material),
            "loop" | "MeshLoop" => Ok(Self::Loop),
            "tex_coord" | "uv" | "MeshUVLoop" => Ok(Self::TexCoord),
            "vertex" | "MeshVertex" => Ok(Self::Vertex),
            other => Err(VtxError::unknown_attribute(format!(
                "unknown source kind '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
