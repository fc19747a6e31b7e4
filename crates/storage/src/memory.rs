//! In-memory blob store for tests and local runs

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use tokio::sync::RwLock;

use crate::descriptor::BlobDescriptor;
use crate::error::{BlobError, BlobResult};
use crate::store::{BlobReader, BlobStore, BlobWriter};
use crate::visit::{self, BlobVisitor, VisitMode};
use crate::wildcard::WildcardPattern;

/// In-memory implementation of [`BlobStore`]
///
/// Blobs live in an ordered map, so listings come back name-ascending.
/// Like a secret vault it has no streaming primitives: `open_read` and
/// `open_write` are not supported. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<BTreeMap<String, String>>>,
}

impl MemoryBlobStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs
    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    /// Whether the store is empty
    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Remove every blob
    pub async fn clear(&self) {
        self.blobs.write().await.clear();
    }

    async fn snapshot(&self) -> Vec<BlobDescriptor> {
        self.blobs
            .read()
            .await
            .keys()
            .map(BlobDescriptor::new)
            .collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, value: &str) -> BlobResult<()> {
        self.blobs
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<String> {
        self.blobs
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::not_found(key))
    }

    async fn open_read(&self, _key: &str) -> BlobResult<BlobReader> {
        Err(BlobError::not_supported("open_read"))
    }

    async fn open_write(&self, _key: &str) -> BlobResult<BlobWriter> {
        Err(BlobError::not_supported("open_write"))
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.blobs.write().await.remove(key);
        Ok(())
    }

    async fn enumerate(
        &self,
        filter: Option<&str>,
        visit: BlobVisitor,
        mode: VisitMode,
    ) -> BlobResult<()> {
        let pattern = filter.map(WildcardPattern::new).transpose()?;

        // Visit a snapshot so visitors may write back into the store.
        let page = self
            .snapshot()
            .await
            .into_iter()
            .filter(|blob| pattern.as_ref().is_none_or(|p| p.matches(&blob.name)))
            .collect();

        visit::dispatch(page, &visit, mode).await
    }

    async fn find(&self, filter: &str) -> BlobResult<Vec<String>> {
        let pattern = WildcardPattern::new(filter)?;
        Ok(self
            .blobs
            .read()
            .await
            .keys()
            .filter(|name| pattern.matches(name))
            .cloned()
            .collect())
    }

    fn blobs(&self) -> BoxStream<'_, BlobResult<BlobDescriptor>> {
        stream::once(self.snapshot())
            .flat_map(|page| stream::iter(page.into_iter().map(Ok)))
            .boxed()
    }
}
