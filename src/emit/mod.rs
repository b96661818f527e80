//! Binary output: frame buffer concatenation, offset table and manifest.

pub mod atomic;
pub mod emitter;
pub mod manifest;
