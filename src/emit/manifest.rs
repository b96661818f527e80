use crate::emit::atomic::{AtomicFile, io_error};
use crate::emit::emitter::OffsetTable;
use crate::foundation::core::ContextKind;
use crate::foundation::error::{VtxError, VtxResult};
use crate::layout::compiler::LayoutDescriptor;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Metadata document written next to the binary vertex buffer.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Manifest {
    pub mesh_data: MeshData,
    pub settings: ManifestSettings,
    /// Frames stored per object.
    pub no_frames: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MeshData {
    /// File name of the binary, relative to the manifest.
    pub location: String,
    /// Vertex layout, in byte order.
    pub format: Vec<ManifestAttribute>,
    /// Bytes per vertex.
    pub stride: usize,
    /// Hex xxh3 fingerprint of the compiled layout.
    pub layout_fingerprint: String,
    /// Per-object placement, keyed by object name.
    pub ranges: BTreeMap<String, ManifestRange>,
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManifestAttribute {
    #[serde(rename = "type")]
    pub kind: ContextKind,
    pub attr: String,
    pub fmt: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub frame_offset: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convert: Option<String>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManifestRange {
    pub no_verts: usize,
    pub offset: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ManifestSettings {
    pub apply_transforms: bool,
    pub reverse_loop: bool,
}

impl Manifest {
    /// Describe an emitted binary.
    pub fn new(
        binary: &Path,
        layout: &LayoutDescriptor,
        table: &OffsetTable,
        frame_count: usize,
        settings: ManifestSettings,
    ) -> VtxResult<Self> {
        let location = binary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                VtxError::validation(format!("binary '{}' has no file name", binary.display()))
            })?;

        let mut ranges = BTreeMap::new();
        for (id, range) in table.iter() {
            if range.frame_count != frame_count {
                return Err(VtxError::validation(format!(
                    "object '{id}' has {} frames, manifest declares {frame_count}",
                    range.frame_count
                )));
            }
            ranges.insert(
                id.as_str().to_owned(),
                ManifestRange {
                    no_verts: range.vertex_count,
                    offset: range.offset,
                },
            );
        }

        Ok(Self {
            mesh_data: MeshData {
                location,
                format: layout
                    .specs()
                    .iter()
                    .map(|s| ManifestAttribute {
                        kind: s.source,
                        attr: s.attribute.clone(),
                        fmt: s.format.as_str().to_owned(),
                        frame_offset: s.frame_offset,
                        convert: s.converter.as_ref().map(|c| c.name().to_owned()),
                    })
                    .collect(),
                stride: layout.vertex_byte_size(),
                layout_fingerprint: format!("{:016x}", layout.fingerprint()),
                ranges,
            },
            settings,
            no_frames: frame_count,
        })
    }

    /// `<binary stem>.json` next to the binary.
    pub fn path_for(binary: &Path) -> PathBuf {
        binary.with_extension("json")
    }

    pub fn from_reader<R: std::io::Read>(r: R) -> VtxResult<Self> {
        serde_json::from_reader(r).map_err(|e| VtxError::serde(format!("parse manifest JSON: {e}")))
    }

    pub fn from_path(path: impl AsRef<Path>) -> VtxResult<Self> {
        let path = path.as_ref();
        let f = std::fs::File::open(path).map_err(|e| {
            VtxError::validation(format!("open manifest '{}': {e}", path.display()))
        })?;
        Self::from_reader(std::io::BufReader::new(f))
    }

    /// Write pretty JSON to `path` atomically.
    pub fn write(&self, path: &Path, overwrite: bool) -> VtxResult<PathBuf> {
        let mut file = AtomicFile::create(path, overwrite)?;
        self.write_to(&mut file)?;
        let written = file.commit()?;
        tracing::info!(path = %written.display(), "wrote manifest");
        Ok(written)
    }

    /// Serialize into a staged file without committing it.
    pub fn write_to(&self, file: &mut AtomicFile) -> VtxResult<()> {
        serde_json::to_writer_pretty(&mut *file, self)
            .map_err(|e| VtxError::serde(format!("serialize manifest: {e}")))?;
        file.write_all(b"\n").map_err(|e| io_error(e, file.dest()))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/emit/manifest.rs"]
mod tests;
