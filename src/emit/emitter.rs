use crate::buffer::alloc::ObjectExportState;
use crate::emit::atomic::{AtomicFile, io_error};
use crate::foundation::core::ObjectId;
use crate::foundation::error::{VtxError, VtxResult};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Where one object's frames live in the binary output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ObjectRange {
    /// Byte offset of the object's first frame.
    pub offset: u64,
    /// Vertices per frame.
    pub vertex_count: usize,
    /// Frames stored back to back.
    pub frame_count: usize,
    /// Bytes per frame.
    pub frame_bytes: u64,
}

impl ObjectRange {
    /// Bytes across all frames.
    pub fn byte_len(&self) -> u64 {
        self.frame_bytes * self.frame_count as u64
    }
}

/// Object offsets in emission order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OffsetTable {
    entries: Vec<(ObjectId, ObjectRange)>,
}

impl OffsetTable {
    pub fn get(&self, id: &ObjectId) -> Option<&ObjectRange> {
        self.entries.iter().find(|(k, _)| k == id).map(|(_, r)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ObjectId, &ObjectRange)> {
        self.entries.iter().map(|(k, r)| (k, r))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// End offset of the last object.
    pub fn total_bytes(&self) -> u64 {
        self.entries
            .last()
            .map(|(_, r)| r.offset + r.byte_len())
            .unwrap_or(0)
    }

    fn push(&mut self, id: ObjectId, range: ObjectRange) -> VtxResult<()> {
        if self.get(&id).is_some() {
            return Err(VtxError::validation(format!(
                "object '{id}' emitted twice"
            )));
        }
        self.entries.push((id, range));
        Ok(())
    }
}

/// Byte sink contract for the emitter.
///
/// Writes are synchronous; `position` is the number of bytes accepted so far.
pub trait VertexSink {
    /// Current write position.
    fn position(&self) -> u64;
    /// Append one frame buffer.
    fn write_frame(&mut self, bytes: &[u8]) -> VtxResult<()>;
    /// Flush everything written so far.
    fn flush(&mut self) -> VtxResult<()>;
}

/// [`VertexSink`] over any [`Write`], counting bytes as they go out.
#[derive(Debug)]
pub struct StreamSink<W: Write> {
    writer: W,
    pos: u64,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, pos: 0 }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> VertexSink for StreamSink<W> {
    fn position(&self) -> u64 {
        self.pos
    }

    fn write_frame(&mut self, bytes: &[u8]) -> VtxResult<()> {
        self.writer
            .write_all(bytes)
            .map_err(|e| VtxError::Other(anyhow::anyhow!(e).context("write frame buffer")))?;
        self.pos += bytes.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> VtxResult<()> {
        self.writer
            .flush()
            .map_err(|e| VtxError::Other(anyhow::anyhow!(e).context("flush vertex sink")))
    }
}

/// Write every object's frame buffers, in the given order, and record where each object starts.
///
/// No header, padding or alignment: objects and frames are concatenated as-is.
pub fn emit(states: &[ObjectExportState], sink: &mut dyn VertexSink) -> VtxResult<OffsetTable> {
    let mut table = OffsetTable::default();
    for state in states {
        let offset = sink.position();
        for buf in state.buffers() {
            sink.write_frame(buf.as_bytes())?;
        }
        table.push(
            state.id().clone(),
            ObjectRange {
                offset,
                vertex_count: state.vertex_count(),
                frame_count: state.frame_count(),
                frame_bytes: (state.vertex_count() * state.vertex_byte_size()) as u64,
            },
        )?;
    }
    sink.flush()?;
    Ok(table)
}

/// [`emit`] into a staged file. Nothing is visible at the destination until the file is
/// committed.
pub fn emit_to_file(
    states: &[ObjectExportState],
    file: &mut AtomicFile,
) -> VtxResult<OffsetTable> {
    let mut sink = StreamSink::new(file);
    emit(states, &mut sink)
}

/// [`emit`] into `path`, atomically: the file appears only once every byte is on disk.
#[tracing::instrument(skip(states), fields(objects = states.len()))]
pub fn emit_to_path(
    states: &[ObjectExportState],
    path: &Path,
    overwrite: bool,
) -> VtxResult<(PathBuf, OffsetTable)> {
    let mut file = AtomicFile::create(path, overwrite)?;
    let table = emit_to_file(states, &mut file)?;
    let written = file.commit()?;
    check_written(&written, &table)?;
    Ok((written, table))
}

/// Verify a committed binary holds exactly the bytes `table` describes.
pub(crate) fn check_written(path: &Path, table: &OffsetTable) -> VtxResult<()> {
    let len = std::fs::metadata(path)
        .map_err(|e| io_error(e, path))?
        .len();
    if len != table.total_bytes() {
        return Err(VtxError::validation(format!(
            "'{}' holds {len} bytes, expected {}",
            path.display(),
            table.total_bytes()
        )));
    }
    tracing::info!(path = %path.display(), bytes = len, objects = table.len(), "wrote vertex buffer");
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/emit/emitter.rs"]
mod tests;
