use crate::buffer::alloc::FrameBuffer;
use crate::foundation::core::{ContextKind, FrameIndex};
use crate::foundation::error::{VtxError, VtxResult};
use crate::format::value::AttrValue;
use crate::layout::compiler::{LayoutDescriptor, PackedField};
use crate::scene::source::AttributeSource;

/// How a field's target frame `current_frame - frame_offset` maps onto the buffer array.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameTargeting {
    /// Targets outside `0..frame_count` are an error.
    #[default]
    Strict,
    /// Targets wrap modulo the frame count, for looping animations.
    Wrap,
}

impl FrameTargeting {
    /// Buffer index for a field sampled at `current` with `frame_offset`.
    pub fn target(self, current: FrameIndex, frame_offset: i64, frame_count: usize) -> Option<usize> {
        match self {
            Self::Strict => current
                .minus_offset(frame_offset)
                .and_then(|f| usize::try_from(f.0).ok())
                .filter(|&f| f < frame_count),
            Self::Wrap => {
                let n = i128::try_from(frame_count).ok().filter(|&n| n > 0)?;
                let t = (i128::from(current.0) - i128::from(frame_offset)).rem_euclid(n);
                usize::try_from(t).ok()
            }
        }
    }
}

/// Write every field declared for `kind` from `node` into the frame buffers.
///
/// `vertex_byte_offset` is the cursor of the vertex being emitted. Each field lands in
/// `buffers[current_frame - field.frame_offset]`; an out-of-range target is an error, never
/// clamped. A kind without declared attributes is a no-op.
pub fn pack(
    node: &dyn AttributeSource,
    kind: ContextKind,
    layout: &LayoutDescriptor,
    buffers: &mut [FrameBuffer],
    vertex_byte_offset: usize,
    current_frame: FrameIndex,
) -> VtxResult<()> {
    pack_with(
        node,
        kind,
        layout,
        buffers,
        vertex_byte_offset,
        current_frame,
        FrameTargeting::Strict,
    )
}

/// [`pack`] with an explicit [`FrameTargeting`].
pub fn pack_with(
    node: &dyn AttributeSource,
    kind: ContextKind,
    layout: &LayoutDescriptor,
    buffers: &mut [FrameBuffer],
    vertex_byte_offset: usize,
    current_frame: FrameIndex,
    targeting: FrameTargeting,
) -> VtxResult<()> {
    let Some(attrs) = layout.bucket(kind) else {
        return Ok(());
    };

    for attr in attrs {
        let raw = node.attribute(&attr.name).ok_or_else(|| {
            VtxError::unknown_attribute(format!(
                "{kind} context does not provide attribute '{}'",
                attr.name
            ))
        })?;

        for field in &attr.fields {
            let converted;
            let value = match &field.converter {
                Some(c) => {
                    converted = c.apply(raw.clone())?;
                    &converted
                }
                None => &raw,
            };
            write_field(
                field,
                value,
                buffers,
                vertex_byte_offset,
                current_frame,
                targeting,
            )
            .map_err(|e| annotate(e, kind, &attr.name))?;
        }
    }
    Ok(())
}

fn write_field(
    field: &PackedField,
    value: &AttrValue,
    buffers: &mut [FrameBuffer],
    vertex_byte_offset: usize,
    current_frame: FrameIndex,
    targeting: FrameTargeting,
) -> VtxResult<()> {
    let frame_count = buffers.len();
    let target = targeting
        .target(current_frame, field.frame_offset, frame_count)
        .ok_or_else(|| {
            VtxError::index_out_of_range(format!(
                "frame {} with frame offset {} targets a buffer outside 0..{frame_count}",
                current_frame.0, field.frame_offset
            ))
        })?;

    let buf = buffers[target].as_bytes_mut();
    let len = buf.len();
    let (start, end) = vertex_byte_offset
        .checked_add(field.byte_offset)
        .and_then(|start| Some((start, start.checked_add(field.byte_size)?)))
        .ok_or_else(|| {
            VtxError::index_out_of_range(format!(
                "cursor {vertex_byte_offset} + field offset {} overflows",
                field.byte_offset
            ))
        })?;
    let dst = buf.get_mut(start..end).ok_or_else(|| {
        VtxError::index_out_of_range(format!(
            "byte range {start}..{end} is past the end of a {len}-byte frame buffer"
        ))
    })?;
    field.format.encode_into(value, dst)
}

fn annotate(err: VtxError, kind: ContextKind, name: &str) -> VtxError {
    match err {
        VtxError::EncodingMismatch(msg) => {
            VtxError::encoding_mismatch(format!("{kind}.{name}: {msg}"))
        }
        VtxError::IndexOutOfRange(msg) => {
            VtxError::index_out_of_range(format!("{kind}.{name}: {msg}"))
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/pack/packer.rs"]
mod tests;
