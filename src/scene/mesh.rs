use crate::foundation::core::ObjectId;
use crate::foundation::error::{VtxError, VtxResult};
use crate::scene::source::{AttributeSchema, AttributeSource};

/// One face corner of an evaluated triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LoopRef {
    /// Loop index (also indexes the active texture-coordinate layer).
    pub index: usize,
    /// Index of the mesh vertex this loop references.
    pub vertex: usize,
}

/// An evaluated, triangulated face.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Triangle {
    /// Face index in the evaluated mesh.
    pub index: usize,
    /// Material slot, if the mesh has materials.
    pub material: Option<usize>,
    /// Corners in declaration (front-face) order.
    pub loops: [LoopRef; 3],
}

/// A face's material together with whether it is shader-graph based.
#[derive(Clone, Copy)]
pub struct MaterialSlot<'a> {
    /// Material attributes.
    pub source: &'a dyn AttributeSource,
    /// Node-based materials are not serialized: their simple properties do not describe the final
    /// appearance.
    pub uses_node_graph: bool,
}

/// Geometry of one object at one frame, already triangulated and (when requested) already in
/// world space.
pub trait EvaluatedMesh: Sync {
    /// Number of triangles; the object's vertex count is three times this.
    fn triangle_count(&self) -> usize;

    /// Triangles in face order. Every call starts a fresh pass.
    fn triangles(&self) -> Box<dyn Iterator<Item = Triangle> + '_>;

    /// Attributes of a face.
    fn face(&self, tri: &Triangle) -> VtxResult<&dyn AttributeSource>;

    /// The face's material, or `None` when the mesh has no materials.
    fn material(&self, tri: &Triangle) -> VtxResult<Option<MaterialSlot<'_>>>;

    /// Attributes of a loop.
    fn loop_source(&self, l: LoopRef) -> VtxResult<&dyn AttributeSource>;

    /// Active texture-coordinate layer entry for a loop, or `None` when the mesh has no
    /// texture-coordinate layer.
    fn tex_coord(&self, l: LoopRef) -> VtxResult<Option<&dyn AttributeSource>>;

    /// Attributes of the vertex a loop references.
    fn vertex(&self, l: LoopRef) -> VtxResult<&dyn AttributeSource>;
}

/// Inclusive host frame range (`frame_start..=frame_end`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HostFrameRange {
    /// First frame.
    pub start: i64,
    /// Last frame (inclusive).
    pub end: i64,
}

impl HostFrameRange {
    /// Create a validated range with `start <= end`.
    pub fn new(start: i64, end: i64) -> VtxResult<Self> {
        if start > end {
            return Err(VtxError::validation(format!(
                "frame range start {start} must be <= end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Number of frames in the range.
    pub fn len_frames(self) -> u64 {
        self.end.abs_diff(self.start).saturating_add(1)
    }
}

/// The host application: scene state, object lookup and mesh evaluation.
pub trait SceneEvaluator: Sync {
    /// Which `(kind, attribute)` pairs the host exposes.
    fn schema(&self) -> &dyn AttributeSchema;

    /// Scene frame range.
    fn frame_range(&self) -> HostFrameRange;

    /// Frame the scene is currently set to.
    fn current_frame(&self) -> i64;

    /// Advance animation state to `frame`.
    fn set_frame(&mut self, frame: i64) -> VtxResult<()>;

    /// Selected mesh objects, in selection order.
    fn selected_objects(&self) -> Vec<ObjectId>;

    /// Scene context attributes at the current frame.
    fn scene(&self) -> &dyn AttributeSource;

    /// Object context attributes at the current frame.
    fn object(&self, id: &ObjectId) -> VtxResult<&dyn AttributeSource>;

    /// Evaluate `id`'s mesh at the current frame.
    fn evaluate(
        &self,
        id: &ObjectId,
        apply_world_transform: bool,
    ) -> VtxResult<Box<dyn EvaluatedMesh + '_>>;
}
