//! vtxbake bakes animated per-vertex mesh attributes into compact binary vertex buffers.
//!
//! An export is driven by an ordered list of attribute specs:
//!
//! - Compile the specs into a [`LayoutDescriptor`] against a host's attribute schema
//! - Walk every selected object's triangulated mesh once per frame, packing fields into
//!   pre-allocated frame buffers
//! - Emit all buffers back-to-back and describe them with an [`OffsetTable`] and [`Manifest`]
//!
//! [`ExportSession`] runs the whole pipeline against any [`SceneEvaluator`]; [`MemoryScene`] is
//! the bundled JSON-backed host.
#![forbid(unsafe_code)]

mod foundation;

/// Frame buffers and per-object export state.
pub mod buffer;
/// Vertex-buffer emission and the manifest.
pub mod emit;
/// Binary formats and attribute values.
pub mod format;
/// Attribute specs and the format compiler.
pub mod layout;
/// Attribute packing.
pub mod pack;
/// Host abstraction and the in-memory host.
pub mod scene;
/// Export sessions.
pub mod session;
/// Mesh traversal.
pub mod walk;

pub use crate::foundation::core::{ContextKind, FrameIndex, ObjectId};
pub use crate::foundation::error::{VtxError, VtxResult};

pub use crate::buffer::alloc::{FrameBuffer, ObjectExportState, allocate};
pub use crate::emit::emitter::{
    ObjectRange, OffsetTable, StreamSink, VertexSink, emit, emit_to_file, emit_to_path,
};
pub use crate::emit::atomic::AtomicFile;
pub use crate::emit::manifest::{Manifest, ManifestSettings};
pub use crate::format::binary::{BinaryFormat, ByteOrder, Primitive};
pub use crate::format::value::{AttrValue, Scalar};
pub use crate::layout::compiler::{LayoutDescriptor, compile};
pub use crate::layout::convert::{Converter, ConverterRegistry};
pub use crate::layout::spec::{AttributeSpec, AttributeSpecDef, VertexFormat};
pub use crate::pack::packer::{FrameTargeting, pack, pack_with};
pub use crate::scene::memory::{MemoryMesh, MemoryObject, MemoryScene, MemorySceneFile};
pub use crate::scene::mesh::{EvaluatedMesh, HostFrameRange, SceneEvaluator};
pub use crate::scene::source::{AttributeSchema, AttributeSource, StaticSchema};
pub use crate::session::export_session::{
    BakedExport, ExportOpts, ExportReport, ExportSession, ExportStats, FrameSelection,
};
pub use crate::walk::walker::{WalkOpts, WalkStats, walk};
