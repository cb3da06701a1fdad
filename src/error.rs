//! Error types for uatrie.

use thiserror::Error;

/// Error type for uatrie operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid dataset file magic bytes
    #[error("invalid magic bytes: expected UATRIE header")]
    InvalidMagic,

    /// Unsupported dataset format version
    #[error("unsupported format version: {0}")]
    UnsupportedVersion(u32),

    /// Checksum mismatch
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// Invalid header size
    #[error("invalid header size: expected {expected}, got {actual}")]
    InvalidHeaderSize { expected: usize, actual: usize },

    /// A section's declared offset/size falls outside the file
    #[error("section out of bounds: {section}")]
    SectionOutOfBounds { section: &'static str },

    /// A table section is not aligned for its record layout
    #[error("misaligned section: {section}")]
    MisalignedSection { section: &'static str },

    /// A node record references data outside the dataset
    #[error("corrupt node record at index {index}")]
    CorruptNode { index: u32 },

    /// A profile record references data outside the dataset
    #[error("corrupt profile record at index {index}")]
    CorruptProfile { index: u32 },

    /// A property record references data outside the dataset
    #[error("corrupt property record at index {index}")]
    CorruptProperty { index: u32 },

    /// A pooled value could not be decoded
    #[error("corrupt value at pool offset {offset}")]
    CorruptValue { offset: u32 },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Queried property is not defined for the matched profile
    #[error("property not found: {0}")]
    PropertyNotFound(String),

    /// Operation attempted after the provider was closed
    #[error("provider is closed")]
    ProviderClosed,

    /// Dataset builder misuse
    #[error("dataset build error: {0}")]
    Build(String),

    /// Metadata serialization error
    #[error("metadata error: {0}")]
    Metadata(String),
}

/// Result type alias for uatrie operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error indicates a structurally unusable dataset.
    pub fn is_load_fatal(&self) -> bool {
        matches!(
            self,
            Error::InvalidMagic
                | Error::UnsupportedVersion(_)
                | Error::ChecksumMismatch
                | Error::InvalidHeaderSize { .. }
                | Error::SectionOutOfBounds { .. }
                | Error::MisalignedSection { .. }
                | Error::CorruptNode { .. }
                | Error::CorruptProfile { .. }
                | Error::CorruptProperty { .. }
                | Error::Io(_)
        )
    }
}
