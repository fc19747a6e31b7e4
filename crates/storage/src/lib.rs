//! Secretblob Storage
//!
//! The blob-store contract shared by every secretblob backend: string-keyed,
//! string/byte valued storage with put, get, delete, enumerate and find.
//!
//! # Example
//!
//! ```ignore
//! use secretblob_storage::prelude::*;
//!
//! let store = MemoryBlobStore::new();
//! store.put("bio", "Fred").await?;
//! assert_eq!(store.get("bio").await?, "Fred");
//! assert_eq!(store.find("*.*").await?, vec!["bio"]);
//! ```

#![warn(missing_docs)]

mod descriptor;
mod error;
mod memory;
mod store;
/// Visitor dispatch for enumeration
pub mod visit;
/// Wildcard name filters
pub mod wildcard;

pub use descriptor::BlobDescriptor;
pub use error::{BlobError, BlobResult, BoxError};
pub use memory::MemoryBlobStore;
pub use store::{BlobReader, BlobStore, BlobWriter};
pub use visit::{BlobVisitor, VisitMode, visitor};
pub use wildcard::{WildcardPattern, matches_wildcard};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::{
        BlobDescriptor, BlobError, BlobResult, BlobStore, BlobVisitor, MemoryBlobStore,
        VisitMode, visitor,
    };
}
