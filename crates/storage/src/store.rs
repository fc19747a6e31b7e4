//! The blob-store contract

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::descriptor::BlobDescriptor;
use crate::error::BlobResult;
use crate::visit::{BlobVisitor, VisitMode};

/// Boxed reader returned by [`BlobStore::open_read`]
pub type BlobReader = Box<dyn AsyncRead + Unpin + Send>;

/// Boxed writer returned by [`BlobStore::open_write`]
pub type BlobWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// String-keyed blob storage
///
/// Keys are logical names; backends may namespace them (for example with a
/// prefix) but always report them back unchanged.
///
/// # Contract
///
/// - `put` followed by `get` on the same key returns exactly the value last
///   written
/// - `get` on a missing key fails with [`BlobError::NotFound`](crate::BlobError::NotFound)
/// - `delete` succeeds whether or not the key exists
/// - backends without streaming primitives fail `open_read`/`open_write`
///   with [`BlobError::NotSupported`](crate::BlobError::NotSupported)
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Create or replace the blob at `key`
    async fn put(&self, key: &str, value: &str) -> BlobResult<()>;

    /// Read `content` to the end as UTF-8 text and store it at `key`
    async fn put_reader(
        &self,
        key: &str,
        content: &mut (dyn AsyncRead + Unpin + Send),
    ) -> BlobResult<()> {
        let mut value = String::new();
        content.read_to_string(&mut value).await?;
        self.put(key, &value).await
    }

    /// Current value at `key`
    async fn get(&self, key: &str) -> BlobResult<String>;

    /// Write the value at `key` into `destination`
    async fn get_into(
        &self,
        key: &str,
        destination: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> BlobResult<()> {
        let value = self.get(key).await?;
        destination.write_all(value.as_bytes()).await?;
        destination.flush().await?;
        Ok(())
    }

    /// Value at `key` as UTF-8 bytes
    async fn get_bytes(&self, key: &str) -> BlobResult<Vec<u8>> {
        Ok(self.get(key).await?.into_bytes())
    }

    /// Open a streaming reader over the blob at `key`
    async fn open_read(&self, key: &str) -> BlobResult<BlobReader>;

    /// Open a streaming writer replacing the blob at `key`
    async fn open_write(&self, key: &str) -> BlobResult<BlobWriter>;

    /// Remove the blob at `key`; absent keys are not an error
    async fn delete(&self, key: &str) -> BlobResult<()>;

    /// Invoke `visit` for every blob whose name matches `filter`
    ///
    /// The filter is applied by the store itself, so visitors only ever see
    /// matching blobs. `None` visits everything. See [`VisitMode`] for when
    /// visits complete relative to the return of this call.
    async fn enumerate(
        &self,
        filter: Option<&str>,
        visit: BlobVisitor,
        mode: VisitMode,
    ) -> BlobResult<()>;

    /// Names of all blobs matching the wildcard `filter`
    async fn find(&self, filter: &str) -> BlobResult<Vec<String>>;

    /// Lazily list every blob
    ///
    /// Each call starts a fresh listing.
    fn blobs(&self) -> BoxStream<'_, BlobResult<BlobDescriptor>>;
}
