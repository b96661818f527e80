//! Buffer allocator and per-object export state.

/// Frame buffer allocation.
pub mod alloc;
