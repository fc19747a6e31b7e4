//! Read-only blob metadata returned by listings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata for one stored blob
///
/// Produced by [`BlobStore::blobs`](crate::BlobStore::blobs) and handed to
/// enumeration visitors. Names are logical keys: any backend prefix has
/// already been removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobDescriptor {
    /// Logical key
    pub name: String,

    /// Whether the blob is soft-deleted
    pub deleted: bool,

    /// Whether the backend currently serves the blob
    pub enabled: bool,

    /// Backend version identifier of the current content
    pub version: Option<String>,

    /// Content type recorded by the backend
    pub content_type: Option<String>,

    /// When the blob expires
    pub expires: Option<DateTime<Utc>>,

    /// Backend metadata dictionary
    #[serde(default)]
    pub metadata: HashMap<String, String>,

    /// Backend tags
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl BlobDescriptor {
    /// Descriptor for a live, enabled blob with no metadata
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            deleted: false,
            enabled: true,
            version: None,
            content_type: None,
            expires: None,
            metadata: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    /// Whether the blob has expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|exp| exp <= now)
    }
}
