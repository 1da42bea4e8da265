//! Error types for `comply-core`.
//!
//! Each error variant carries enough context to diagnose the problem
//! without a debugger. Nothing in this crate panics on a failure path;
//! every error here is meant to be converted into a user-facing
//! notification at the boundary that initiated the operation.

use comply_storage::StorageError;

/// Errors from validating a field value against a store schema.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    /// A required field was empty or missing on submit.
    #[error("required field '{field}' is missing or empty")]
    MissingRequired { field: String },

    /// A numeric field was outside its documented range.
    #[error("field '{field}' value {value} is outside the valid range [{min}, {max}]")]
    OutOfRange {
        field: String,
        value: i64,
        min: i64,
        max: i64,
    },

    /// A field value did not match its expected shape or enumeration.
    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Errors from record store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying storage backend returned an error.
    #[error("store storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serializing the store document for persistence failed.
    #[error("store serialization failed: {reason}")]
    Serialization { reason: String },

    /// A field value was rejected by the store's schema.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
}

/// Errors from the import path.
///
/// Any of these aborts the import before a single key is merged — there
/// is no partial-merge state to clean up.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The import payload was not valid JSON.
    #[error("import file is not valid JSON: {reason}")]
    InvalidJson { reason: String },

    /// The import payload parsed but was not a JSON object at the top level.
    #[error("import file must be a JSON object, got {found}")]
    NotAnObject { found: String },

    /// Writing a confirmed key to storage failed.
    #[error("import write failed: {0}")]
    Storage(#[from] StorageError),
}
