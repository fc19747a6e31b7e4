//! Visitor dispatch for [`BlobStore::enumerate`](crate::BlobStore::enumerate)
//!
//! Backends page through their listings and hand each page to [`dispatch`],
//! which invokes the visitor according to the caller's [`VisitMode`].

use std::future::Future;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::descriptor::BlobDescriptor;
use crate::error::BlobResult;

/// Shared async callback invoked once per enumerated blob
pub type BlobVisitor =
    Arc<dyn Fn(BlobDescriptor) -> BoxFuture<'static, BlobResult<()>> + Send + Sync>;

/// Wrap an async closure as a [`BlobVisitor`]
///
/// ```ignore
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = Arc::clone(&seen);
/// let visit = visitor(move |blob| {
///     let sink = Arc::clone(&sink);
///     async move {
///         sink.lock().await.push(blob.name);
///         Ok(())
///     }
/// });
/// ```
pub fn visitor<F, Fut>(f: F) -> BlobVisitor
where
    F: Fn(BlobDescriptor) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = BlobResult<()>> + Send + 'static,
{
    Arc::new(move |blob| Box::pin(f(blob)))
}

/// How `enumerate` runs the visitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitMode {
    /// One visit at a time; the first error stops enumeration
    #[default]
    Sequential,

    /// Visits of a page run together and are all awaited before the next
    /// page; the first error is returned once the page has finished
    Concurrent,

    /// Visits are spawned and never awaited
    ///
    /// `enumerate` may return while visits are still running, and visitor
    /// errors are only logged.
    Detached,
}

impl VisitMode {
    /// `Concurrent` when `concurrent` is set, `Sequential` otherwise
    pub fn from_concurrent(concurrent: bool) -> Self {
        if concurrent {
            Self::Concurrent
        } else {
            Self::Sequential
        }
    }
}

/// Run `visit` over one page of descriptors
pub async fn dispatch(
    page: Vec<BlobDescriptor>,
    visit: &BlobVisitor,
    mode: VisitMode,
) -> BlobResult<()> {
    match mode {
        VisitMode::Sequential => {
            for blob in page {
                visit(blob).await?;
            }
            Ok(())
        }
        VisitMode::Concurrent => {
            let mut pending: FuturesUnordered<_> =
                page.into_iter().map(|blob| visit(blob)).collect();

            let mut first_error = None;
            while let Some(result) = pending.next().await {
                if let Err(e) = result
                    && first_error.is_none()
                {
                    first_error = Some(e);
                }
            }

            first_error.map_or(Ok(()), Err)
        }
        VisitMode::Detached => {
            for blob in page {
                let name = blob.name.clone();
                let fut = visit(blob);
                tokio::spawn(async move {
                    if let Err(e) = fut.await {
                        warn!(blob = %name, error = %e, "Detached blob visit failed");
                    }
                });
            }
            Ok(())
        }
    }
}
