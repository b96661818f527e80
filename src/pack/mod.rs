//! Attribute packer.

/// Writes one context node's fields into frame buffers.
pub mod packer;
