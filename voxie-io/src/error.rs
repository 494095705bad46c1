//! Container error types.

use thiserror::Error;

/// Result type for container operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Container error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A type descriptor is malformed.
    #[error("invalid type descriptor: {0}")]
    InvalidTypeDescriptor(String),

    /// Stored and requested element types differ.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    /// A stored enum value has no matching member.
    #[error("invalid value {value} for enum {ty}")]
    InvalidEnumValue { value: u64, ty: String },

    /// Named object, attribute, or reference target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The name is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Invalid object or attribute name.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// The handle outlived its file.
    #[error("file has been closed")]
    UseAfterClose,

    /// Mutation attempted on a file opened read-only.
    #[error("file is opened read-only")]
    ReadOnly,

    /// Element counts or dimensions do not agree.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Invalid or corrupt file contents.
    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    /// Type has no counterpart in another format.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] voxie_core::Error),

    /// HDF5 library error.
    #[cfg(feature = "hdf5")]
    #[error("HDF5 error: {0}")]
    Hdf5(#[from] hdf5::Error),
}
