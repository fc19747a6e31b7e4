//! Error types for blob-store operations
//!
//! Backends report three kinds of failure:
//! - [`BlobError::NotFound`]: the key is absent on a read path
//! - [`BlobError::NotSupported`]: the backend has no such primitive
//! - [`BlobError::Backend`]: any other backend failure, passed through as-is
//!
//! Local reader/writer failures surface as [`BlobError::Io`], malformed
//! wildcard filters as [`BlobError::InvalidFilter`].
//!
//! # Recovering the backend error
//!
//! `Backend` keeps the original error as its source, so callers that care
//! about a specific backend can downcast:
//!
//! ```ignore
//! if let Some(kv) = err.backend_source::<KeyVaultError>() {
//!     eprintln!("vault said {:?}", kv.status());
//! }
//! ```

use thiserror::Error;

/// Boxed backend error carried by [`BlobError::Backend`]
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Blob-store operation errors
#[derive(Debug, Error)]
pub enum BlobError {
    /// Key does not exist
    #[error("Blob '{key}' not found")]
    NotFound {
        /// Logical key (prefix already removed)
        key: String,
    },

    /// Operation is not available on this backend
    #[error("Operation '{operation}' is not supported by this blob store")]
    NotSupported {
        /// Operation name
        operation: &'static str,
    },

    /// Wildcard filter could not be compiled
    #[error("Invalid filter '{filter}': {reason}")]
    InvalidFilter {
        /// Filter text
        filter: String,
        /// Why it was rejected
        reason: String,
    },

    /// Reading from or writing to a caller-supplied stream failed
    #[error("Blob stream I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure, unchanged
    #[error(transparent)]
    Backend(BoxError),
}

impl BlobError {
    /// Build a `NotFound` error for `key`
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Build a `NotSupported` error for `operation`
    pub fn not_supported(operation: &'static str) -> Self {
        Self::NotSupported { operation }
    }

    /// Wrap a backend failure without translating it
    pub fn backend<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(source))
    }

    /// True for [`BlobError::NotFound`]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True for [`BlobError::NotSupported`]
    pub fn is_not_supported(&self) -> bool {
        matches!(self, Self::NotSupported { .. })
    }

    /// Borrow the backend error as `E`, if this is a `Backend` error of that type
    pub fn backend_source<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Backend(source) => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Result type alias for blob-store operations
pub type BlobResult<T> = Result<T, BlobError>;
