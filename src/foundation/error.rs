/// Convenience result type used across vtxbake.
pub type VtxResult<T> = Result<T, VtxError>;

/// Every variant is fatal for the export that raised it.
#[derive(thiserror::Error, Debug)]
pub enum VtxError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("unknown attribute: {0}")]
    UnknownAttribute(String),

    #[error("encoding mismatch: {0}")]
    EncodingMismatch(String),

    #[error("index out of range: {0}")]
    IndexOutOfRange(String),

    #[error("capacity error: {0}")]
    Capacity(String),

    #[error("topology error: {0}")]
    Topology(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VtxError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn unknown_attribute(msg: impl Into<String>) -> Self {
        Self::UnknownAttribute(msg.into())
    }

    pub fn encoding_mismatch(msg: impl Into<String>) -> Self {
        Self::EncodingMismatch(msg.into())
    }

    pub fn index_out_of_range(msg: impl Into<String>) -> Self {
        Self::IndexOutOfRange(msg.into())
    }

    pub fn capacity(msg: impl Into<String>) -> Self {
        Self::Capacity(msg.into())
    }

    pub fn topology(msg: impl Into<String>) -> Self {
        Self::Topology(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
