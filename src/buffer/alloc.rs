use crate::foundation::core::ObjectId;
use crate::foundation::error::{VtxError, VtxResult};
use crate::layout::compiler::LayoutDescriptor;

/// Largest byte length a single frame buffer may have.
///
/// `Vec<u8>` cannot hold more than `isize::MAX` bytes.
pub const MAX_FRAME_BUFFER_BYTES: usize = isize::MAX as usize;

/// Zero-initialized vertex bytes for one (object, frame).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
}

impl FrameBuffer {
    fn zeroed(len: usize) -> Self {
        Self {
            bytes: vec![0u8; len],
        }
    }

    /// Byte length.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Return `true` when the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Mutably borrow the bytes.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

/// Allocate `frame_count` zero-filled buffers of `vertex_count * vertex_byte_size` bytes each.
pub fn allocate(
    vertex_count: usize,
    frame_count: usize,
    vertex_byte_size: usize,
) -> VtxResult<Vec<FrameBuffer>> {
    let len = vertex_count
        .checked_mul(vertex_byte_size)
        .filter(|&n| n <= MAX_FRAME_BUFFER_BYTES)
        .ok_or_else(|| {
            VtxError::capacity(format!(
                "{vertex_count} vertices x {vertex_byte_size} bytes exceeds the maximum buffer size"
            ))
        })?;
    len.checked_mul(frame_count).ok_or_else(|| {
        VtxError::capacity(format!(
            "{frame_count} frames x {len} bytes exceeds the addressable size"
        ))
    })?;

    Ok((0..frame_count).map(|_| FrameBuffer::zeroed(len)).collect())
}

/// Per-object export state: layout, vertex count and one buffer per frame.
#[derive(Clone, Debug)]
pub struct ObjectExportState {
    id: ObjectId,
    layout: LayoutDescriptor,
    vertex_count: usize,
    buffers: Vec<FrameBuffer>,
}

impl ObjectExportState {
    /// Allocate all frame buffers for `id` up front.
    pub fn new(
        id: ObjectId,
        layout: LayoutDescriptor,
        vertex_count: usize,
        frame_count: usize,
    ) -> VtxResult<Self> {
        let buffers = allocate(vertex_count, frame_count, layout.vertex_byte_size())?;
        Ok(Self {
            id,
            layout,
            vertex_count,
            buffers,
        })
    }

    /// Object identifier.
    pub fn id(&self) -> &ObjectId {
        &self.id
    }

    /// Compiled layout.
    pub fn layout(&self) -> &LayoutDescriptor {
        &self.layout
    }

    /// Byte stride between vertices.
    pub fn vertex_byte_size(&self) -> usize {
        self.layout.vertex_byte_size()
    }

    /// Vertices per frame.
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Number of frames.
    pub fn frame_count(&self) -> usize {
        self.buffers.len()
    }

    /// Frame buffers in frame order.
    pub fn buffers(&self) -> &[FrameBuffer] {
        &self.buffers
    }

    /// Split borrow of the layout and the mutable buffers, as needed by the packer.
    pub fn layout_and_buffers_mut(&mut self) -> (&LayoutDescriptor, &mut [FrameBuffer]) {
        (&self.layout, &mut self.buffers)
    }

    /// Total bytes across all frames.
    pub fn total_bytes(&self) -> u64 {
        self.buffers.iter().map(|b| b.len() as u64).sum()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/buffer/alloc.rs"]
mod tests;
