//! Binary formats and the attribute values they encode.

/// C-struct-pack style format strings.
pub mod binary;
/// Tagged scalar-or-sequence attribute values.
pub mod value;
