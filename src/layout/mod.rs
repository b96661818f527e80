//! Attribute specs and the format compiler that turns them into a byte layout.

/// Format compiler: spec list → [`compiler::LayoutDescriptor`].
pub mod compiler;
/// Named value converters.
pub mod convert;
/// Attribute specs and their JSON form.
pub mod spec;
