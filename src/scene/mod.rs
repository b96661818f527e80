//! Host scene collaborators.
//!
//! The packing core never walks a scene graph itself. It reads attribute values through
//! [`source::AttributeSource`], checks attribute names against [`source::AttributeSchema`] and
//! receives triangulated geometry from a [`mesh::SceneEvaluator`]. [`memory::MemoryScene`] is a
//! JSON-loadable implementation of all three.

pub mod memory;
pub mod mesh;
pub mod source;
