use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::{
    buffer::alloc::ObjectExportState,
    emit::{
        atomic::AtomicFile,
        emitter::{OffsetTable, check_written, emit_to_file},
        manifest::{Manifest, ManifestSettings},
    },
    foundation::{
        core::{FrameIndex, ObjectId},
        error::{VtxError, VtxResult},
    },
    layout::{
        compiler::{LayoutDescriptor, compile},
        spec::AttributeSpec,
    },
    pack::packer::FrameTargeting,
    scene::mesh::SceneEvaluator,
    walk::{
        batch::{BatchTable, WithBatchIndex},
        walker::{WalkOpts, WalkStats, walk},
    },
};

/// Which host frames an export covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameSelection {
    /// Only the host's current frame.
    #[default]
    Current,
    /// Every frame from `frame_start` to `frame_end` inclusive.
    All,
}

/// Export options.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExportOpts {
    /// Visit each face's loops last-to-first.
    pub winding_reversed: bool,
    /// Export world-space geometry.
    pub apply_world_transform: bool,
    pub frames: FrameSelection,
    /// Pack objects of one frame on a rayon pool.
    pub parallel: bool,
    /// Worker count for the pool (rayon's default when unset).
    pub threads: Option<usize>,
    pub frame_targeting: FrameTargeting,
    /// Write `<out>.json` next to the binary.
    pub write_manifest: bool,
    /// Replace existing output files.
    pub overwrite: bool,
}

impl Default for ExportOpts {
    fn default() -> Self {
        Self {
            winding_reversed: false,
            apply_world_transform: false,
            frames: FrameSelection::Current,
            parallel: false,
            threads: None,
            frame_targeting: FrameTargeting::Strict,
            write_manifest: true,
            overwrite: true,
        }
    }
}

impl ExportOpts {
    /// Parse options from JSON.
    pub fn from_json(s: &str) -> VtxResult<Self> {
        serde_json::from_str(s).map_err(|e| VtxError::serde(format!("parse export options: {e}")))
    }

    fn walk_opts(&self) -> WalkOpts {
        WalkOpts {
            winding_reversed: self.winding_reversed,
            apply_world_transform: self.apply_world_transform,
            frame_targeting: self.frame_targeting,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExportStats {
    pub objects: usize,
    pub frames: usize,
    /// Vertices across all objects, per frame.
    pub vertices_per_frame: usize,
    /// Bytes across all objects and frames.
    pub bytes: u64,
    /// Triangles (summed over frames) whose material context was skipped.
    pub material_skips: usize,
    /// Object-frames without a texture-coordinate layer.
    pub tex_coord_skips: usize,
}

impl ExportStats {
    fn record(&mut self, walk: &WalkStats) {
        self.material_skips += walk.material_skips;
        self.tex_coord_skips += usize::from(walk.tex_coord_skipped);
    }
}

/// Filled buffers for every exported object, before emission.
#[derive(Clone, Debug)]
pub struct BakedExport {
    pub layout: LayoutDescriptor,
    pub states: Vec<ObjectExportState>,
    pub frame_count: usize,
    pub stats: ExportStats,
}

/// Files written by [`ExportSession::export`].
#[derive(Clone, Debug)]
pub struct ExportReport {
    pub binary: PathBuf,
    pub manifest: Option<PathBuf>,
    pub offsets: OffsetTable,
    pub stats: ExportStats,
}

/// One export: compile, allocate, walk every frame, emit.
///
/// Objects are exported in selection order, which also defines each object's `batch_index`.
#[derive(Clone, Debug)]
pub struct ExportSession {
    specs: Vec<AttributeSpec>,
    opts: ExportOpts,
    objects: Option<Vec<ObjectId>>,
}

impl ExportSession {
    pub fn new(specs: Vec<AttributeSpec>, opts: ExportOpts) -> Self {
        Self {
            specs,
            opts,
            objects: None,
        }
    }

    /// Export these objects instead of the host's selection.
    pub fn with_objects(mut self, objects: Vec<ObjectId>) -> Self {
        self.objects = Some(objects);
        self
    }

    pub fn opts(&self) -> &ExportOpts {
        &self.opts
    }

    /// Compile the layout against `host`'s schema (plus `object.batch_index`).
    pub fn compile(&self, host: &dyn SceneEvaluator) -> VtxResult<LayoutDescriptor> {
        compile(&self.specs, &WithBatchIndex(host.schema()))
    }

    /// Pack every frame of every object into memory.
    ///
    /// The host is left at the frame it was on before the call.
    #[tracing::instrument(skip_all, fields(specs = self.specs.len(), parallel = self.opts.parallel))]
    pub fn bake(&self, host: &mut dyn SceneEvaluator) -> VtxResult<BakedExport> {
        let original = host.current_frame();
        let result = self.bake_inner(host);
        let restored = host.set_frame(original);
        let baked = result?;
        restored?;
        Ok(baked)
    }

    fn bake_inner(&self, host: &mut dyn SceneEvaluator) -> VtxResult<BakedExport> {
        let layout = self.compile(host)?;
        if self.opts.frame_targeting == FrameTargeting::Strict {
            check_strict_offsets(&layout)?;
        }
        let (first, frame_count) = host_frames(host, self.opts.frames)?;

        let objects = match &self.objects {
            Some(ids) => ids.clone(),
            None => host.selected_objects(),
        };
        if objects.is_empty() {
            return Err(VtxError::validation("no objects to export"));
        }
        let batch = BatchTable::from_selection(&objects);
        if batch.len() != objects.len() {
            return Err(VtxError::validation("object selection contains duplicates"));
        }

        host.set_frame(first)?;
        let mut states = Vec::with_capacity(objects.len());
        for id in &objects {
            let vertex_count = first_frame_vertex_count(host, id, self.opts.apply_world_transform)?;
            states.push(ObjectExportState::new(
                id.clone(),
                layout.clone(),
                vertex_count,
                frame_count,
            )?);
        }

        let pool = if self.opts.parallel {
            Some(build_thread_pool(self.opts.threads)?)
        } else {
            None
        };

        let walk_opts = self.opts.walk_opts();
        let mut stats = ExportStats {
            objects: states.len(),
            frames: frame_count,
            vertices_per_frame: states.iter().map(ObjectExportState::vertex_count).sum(),
            bytes: states.iter().map(ObjectExportState::total_bytes).sum(),
            ..ExportStats::default()
        };

        for i in 0..frame_count {
            let frame = FrameIndex(i as u64);
            // i < frame_count, which came from an i64 range.
            host.set_frame(first + i as i64)?;
            let evaluator: &dyn SceneEvaluator = &*host;
            let walked: Vec<WalkStats> = match &pool {
                Some(pool) => pool.install(|| {
                    states
                        .par_iter_mut()
                        .map(|s| walk(s, evaluator, &batch, frame, walk_opts))
                        .collect::<VtxResult<Vec<_>>>()
                })?,
                None => states
                    .iter_mut()
                    .map(|s| walk(s, evaluator, &batch, frame, walk_opts))
                    .collect::<VtxResult<Vec<_>>>()?,
            };
            walked.iter().for_each(|w| stats.record(w));
        }

        Ok(BakedExport {
            layout,
            states,
            frame_count,
            stats,
        })
    }

    /// Bake, then write the binary to `out` (and the manifest next to it).
    ///
    /// Both files are staged and only committed once both are complete, so a failed export leaves
    /// neither behind.
    #[tracing::instrument(skip_all, fields(out = %out.display()))]
    pub fn export(&self, host: &mut dyn SceneEvaluator, out: &Path) -> VtxResult<ExportReport> {
        let manifest_path = self.check_outputs(out)?;
        let baked = self.bake(host)?;

        let mut binary_file = AtomicFile::create(out, self.opts.overwrite)?;
        let mut manifest_file = manifest_path
            .as_deref()
            .map(|p| AtomicFile::create(p, self.opts.overwrite))
            .transpose()?;

        let offsets = emit_to_file(&baked.states, &mut binary_file)?;
        if let Some(file) = &mut manifest_file {
            let m = Manifest::new(
                binary_file.dest(),
                &baked.layout,
                &offsets,
                baked.frame_count,
                ManifestSettings {
                    apply_transforms: self.opts.apply_world_transform,
                    reverse_loop: self.opts.winding_reversed,
                },
            )?;
            m.write_to(file)?;
        }

        let binary = binary_file.commit()?;
        let manifest = match manifest_file.map(AtomicFile::commit).transpose() {
            Ok(m) => m,
            Err(e) => {
                let _ = std::fs::remove_file(&binary);
                return Err(e);
            }
        };
        if let Err(e) = check_written(&binary, &offsets) {
            let _ = std::fs::remove_file(&binary);
            if let Some(m) = &manifest {
                let _ = std::fs::remove_file(m);
            }
            return Err(e);
        }
        if let Some(m) = &manifest {
            tracing::info!(path = %m.display(), "wrote manifest");
        }

        tracing::info!(
            objects = baked.stats.objects,
            frames = baked.stats.frames,
            bytes = baked.stats.bytes,
            "export complete"
        );
        Ok(ExportReport {
            binary,
            manifest,
            offsets,
            stats: baked.stats,
        })
    }

    /// Validate output paths before any work; returns the manifest path when one is written.
    fn check_outputs(&self, out: &Path) -> VtxResult<Option<PathBuf>> {
        let manifest = if self.opts.write_manifest {
            let path = Manifest::path_for(out);
            if path.as_path() == out {
                return Err(VtxError::validation(format!(
                    "output '{}' would be replaced by its own manifest",
                    out.display()
                )));
            }
            Some(path)
        } else {
            None
        };
        if !self.opts.overwrite {
            for path in std::iter::once(out).chain(manifest.as_deref()) {
                if path.exists() {
                    return Err(VtxError::validation(format!(
                        "output '{}' already exists",
                        path.display()
                    )));
                }
            }
        }
        Ok(manifest)
    }
}

// Under strict targeting a positive offset always misses at the first frame and a negative one at
// the last, whatever the frame count.
fn check_strict_offsets(layout: &LayoutDescriptor) -> VtxResult<()> {
    match layout.frame_offset_bounds() {
        (0, 0) => Ok(()),
        (lo, hi) => Err(VtxError::index_out_of_range(format!(
            "frame offsets {lo}..={hi} reach outside the exported frames; use wrapped targeting"
        ))),
    }
}

/// First host frame and frame count of an export.
fn host_frames(host: &dyn SceneEvaluator, selection: FrameSelection) -> VtxResult<(i64, usize)> {
    match selection {
        FrameSelection::Current => Ok((host.current_frame(), 1)),
        FrameSelection::All => {
            let range = host.frame_range();
            let count = usize::try_from(range.len_frames()).map_err(|_| {
                VtxError::capacity(format!(
                    "frame range {}..={} is too long",
                    range.start, range.end
                ))
            })?;
            Ok((range.start, count))
        }
    }
}

fn first_frame_vertex_count(
    host: &dyn SceneEvaluator,
    id: &ObjectId,
    apply_world_transform: bool,
) -> VtxResult<usize> {
    let mesh = host.evaluate(id, apply_world_transform)?;
    mesh.triangle_count().checked_mul(3).ok_or_else(|| {
        VtxError::capacity(format!(
            "object '{id}': {} triangles overflow the vertex count",
            mesh.triangle_count()
        ))
    })
}

fn build_thread_pool(threads: Option<usize>) -> VtxResult<rayon::ThreadPool> {
    if let Some(n) = threads
        && n == 0
    {
        return Err(VtxError::validation(
            "export option 'threads' must be >= 1 when set",
        ));
    }

    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = threads {
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| VtxError::validation(format!("failed to build rayon thread pool: {e}")))
}

#[cfg(test)]
#[path = "../../tests/unit/session/export_session.rs"]
mod tests;
