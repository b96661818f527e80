use crate::buffer::alloc::ObjectExportState;
use crate::foundation::core::{ContextKind, FrameIndex};
use crate::foundation::error::{VtxError, VtxResult};
use crate::pack::packer::{FrameTargeting, pack_with};
use crate::scene::mesh::{EvaluatedMesh, SceneEvaluator};
use crate::scene::source::AttributeSource;
use crate::walk::batch::{BatchIndexed, BatchTable};

/// Per-walk switches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkOpts {
    /// Visit each face's loops last-to-first.
    pub winding_reversed: bool,
    /// Ask the evaluator for world-space geometry.
    pub apply_world_transform: bool,
    /// How frame offsets map onto buffers.
    pub frame_targeting: FrameTargeting,
}

/// What one walk did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Vertices emitted.
    pub vertices: usize,
    /// Triangles whose material context was not packed (node-graph material or no material slot).
    pub material_skips: usize,
    /// `true` when the mesh had no texture-coordinate layer.
    pub tex_coord_skipped: bool,
}

/// Evaluate `state`'s object at the host's current frame and pack it into frame `frame`.
#[tracing::instrument(
    level = "debug",
    skip_all,
    fields(object = %state.id(), frame = frame.0)
)]
pub fn walk(
    state: &mut ObjectExportState,
    host: &dyn SceneEvaluator,
    batch: &BatchTable,
    frame: FrameIndex,
    opts: WalkOpts,
) -> VtxResult<WalkStats> {
    let id = state.id().clone();
    let mesh = host.evaluate(&id, opts.apply_world_transform)?;
    let object = BatchIndexed::new(host.object(&id)?, batch.get(&id));
    walk_mesh(
        state,
        host.scene(),
        &object,
        mesh.as_ref(),
        frame,
        opts,
    )
}

/// Pack every vertex of an evaluated mesh into frame `frame` of `state`.
///
/// Per loop the contexts are packed in the fixed order scene, object, face, material, loop,
/// texture coordinate, vertex; the cursor then advances one vertex stride. The cursor starts at 0
/// on every call.
pub fn walk_mesh(
    state: &mut ObjectExportState,
    scene: &dyn AttributeSource,
    object: &dyn AttributeSource,
    mesh: &dyn EvaluatedMesh,
    frame: FrameIndex,
    opts: WalkOpts,
) -> VtxResult<WalkStats> {
    let vertex_count = state.vertex_count();
    if mesh.triangle_count().checked_mul(3) != Some(vertex_count) {
        return Err(VtxError::topology(format!(
            "object '{}': {} triangles do not fill {vertex_count} vertices",
            state.id(),
            mesh.triangle_count()
        )));
    }

    let id = state.id().clone();
    let stride = state.vertex_byte_size();
    let targeting = opts.frame_targeting;
    let (layout, buffers) = state.layout_and_buffers_mut();
    let mut stats = WalkStats::default();
    let mut cursor = 0usize;

    for tri in mesh.triangles() {
        if stats.vertices + 3 > vertex_count {
            return Err(VtxError::topology(format!(
                "object '{id}': mesh yielded more triangles than it reported"
            )));
        }

        let mut corners = tri.loops;
        if opts.winding_reversed {
            corners.reverse();
        }

        let face = mesh.face(&tri)?;
        let material = match mesh.material(&tri)? {
            Some(slot) if !slot.uses_node_graph => Some(slot.source),
            _ => {
                stats.material_skips += 1;
                None
            }
        };

        for l in corners {
            let mut pack = |node: &dyn AttributeSource, kind| {
                pack_with(node, kind, layout, buffers, cursor, frame, targeting)
            };
            pack(scene, ContextKind::Scene)?;
            pack(object, ContextKind::Object)?;
            pack(face, ContextKind::Face)?;
            if let Some(m) = material {
                pack(m, ContextKind::Material)?;
            }
            pack(mesh.loop_source(l)?, ContextKind::Loop)?;
            match mesh.tex_coord(l)? {
                Some(uv) => pack(uv, ContextKind::TexCoord)?,
                None => stats.tex_coord_skipped = true,
            }
            pack(mesh.vertex(l)?, ContextKind::Vertex)?;

            cursor += stride;
            stats.vertices += 1;
        }
    }

    if stats.vertices != vertex_count {
        return Err(VtxError::topology(format!(
            "object '{id}': walked {} of {vertex_count} vertices",
            stats.vertices
        )));
    }

    if stats.material_skips > 0 && layout.bucket(ContextKind::Material).is_some() {
        tracing::debug!(
            object = %id,
            frame = frame.0,
            faces = stats.material_skips,
            "material context skipped (node-based or missing material)"
        );
    }
    if stats.tex_coord_skipped && layout.bucket(ContextKind::TexCoord).is_some() {
        tracing::debug!(
            object = %id,
            frame = frame.0,
            "texture-coordinate context skipped (no active layer)"
        );
    }

    Ok(stats)
}

#[cfg(test)]
#[path = "../../tests/unit/walk/walker.rs"]
mod tests;
