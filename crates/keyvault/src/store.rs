//! [`BlobStore`] over Key Vault secrets

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use secretblob_storage::visit::dispatch;
use secretblob_storage::{
    BlobDescriptor, BlobError, BlobReader, BlobResult, BlobStore, BlobVisitor, BlobWriter,
    VisitMode, WildcardPattern,
};
use tracing::{debug, info};

use crate::client::SecretClient;
use crate::config::{KeyVaultStoreConfig, ProviderConfig};
use crate::credential;
use crate::error::{KeyVaultError, Result};
use crate::metrics::StoreMetrics;
use crate::model::SecretPropertiesPage;

/// Blob store keeping each blob in one Key Vault secret
///
/// The blob at `key` lives in the secret named `prefix + key`; listings only
/// see secrets under the prefix and report names with the prefix removed.
/// Values are read and written as the latest secret version. Deletes are
/// Key Vault soft deletes.
///
/// # Example
///
/// ```rust,ignore
/// let config = KeyVaultStoreConfig::new("https://my-vault.vault.azure.net/".parse()?)
///     .with_prefix("orders-");
/// let store = KeyVaultBlobStore::new(config)?;
///
/// store.put("bio", "Fred").await?;
/// assert_eq!(store.get("bio").await?, "Fred");
/// ```
#[derive(Debug, Clone)]
pub struct KeyVaultBlobStore {
    client: SecretClient,
    prefix: String,
    content_type: Option<String>,
    default_tags: HashMap<String, String>,
}

impl KeyVaultBlobStore {
    /// Build a store from `config`
    ///
    /// Validates the configuration and prepares the HTTP client. No request
    /// is made until the first operation.
    pub fn new(config: KeyVaultStoreConfig) -> Result<Self> {
        config.validate()?;

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            http = http.timeout(timeout);
        }
        let http = http.build()?;

        let credential = credential::from_source(&config.credential, &http);
        let mut client = SecretClient::new(config.vault_url.clone(), credential, http)
            .with_api_version(config.api_version.clone())
            .with_scope(config.token_scope());
        if let Some(size) = config.page_size {
            client = client.with_page_size(size);
        }

        info!(
            provider = config.provider_name(),
            vault = %config.vault_url,
            prefix = %config.prefix,
            credential = config.credential_kind(),
            "Initialized Key Vault blob store"
        );

        Ok(Self {
            client,
            prefix: config.prefix,
            content_type: config.content_type,
            default_tags: config.default_tags,
        })
    }

    /// Prefix prepended to every key
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Underlying REST client
    pub fn client(&self) -> &SecretClient {
        &self.client
    }

    /// Remote call counters
    pub fn metrics(&self) -> &StoreMetrics {
        self.client.metrics()
    }

    fn secret_name(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    /// Descriptors for the entries of `page` under the prefix
    fn visible(&self, page: SecretPropertiesPage) -> Vec<BlobDescriptor> {
        page.value
            .iter()
            .filter_map(|properties| {
                let id = properties.secret_id()?;
                let key = id.name.strip_prefix(self.prefix.as_str())?;
                Some(properties.to_descriptor(key))
            })
            .collect()
    }

    /// Listing pages as visible descriptors
    ///
    /// A 404 on the first page means the vault has nothing to list and ends
    /// the stream without an error.
    fn pages(&self) -> BoxStream<'_, Result<Vec<BlobDescriptor>>> {
        self.client
            .list_properties()
            .enumerate()
            .filter_map(move |(index, page)| async move {
                match page {
                    Err(e) if index == 0 && e.is_not_found() => {
                        debug!("Listing answered 404, treating vault as empty");
                        None
                    }
                    other => Some(other.map(|page| self.visible(page))),
                }
            })
            .boxed()
    }
}

#[async_trait]
impl BlobStore for KeyVaultBlobStore {
    #[tracing::instrument(skip(self, value), fields(provider = "KeyVault"))]
    async fn put(&self, key: &str, value: &str) -> BlobResult<()> {
        self.client
            .set_secret(
                &self.secret_name(key),
                value,
                self.content_type.as_deref(),
                &self.default_tags,
            )
            .await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(provider = "KeyVault"))]
    async fn get(&self, key: &str) -> BlobResult<String> {
        let name = self.secret_name(key);
        if name.is_empty() {
            return Err(BlobError::not_found(key));
        }

        match self.client.get_secret(&name).await {
            Ok(bundle) => bundle.value.ok_or_else(|| {
                BlobError::from(KeyVaultError::InvalidResponse(format!(
                    "secret for '{key}' carries no value"
                )))
            }),
            Err(e) if e.is_not_found() => Err(BlobError::not_found(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn open_read(&self, _key: &str) -> BlobResult<BlobReader> {
        Err(BlobError::not_supported("open_read"))
    }

    async fn open_write(&self, _key: &str) -> BlobResult<BlobWriter> {
        Err(BlobError::not_supported("open_write"))
    }

    #[tracing::instrument(skip(self), fields(provider = "KeyVault"))]
    async fn delete(&self, key: &str) -> BlobResult<()> {
        let name = self.secret_name(key);
        if name.is_empty() {
            return Ok(());
        }

        match self.client.delete_secret(&name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("Secret not found (idempotent delete)");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Pages through the listing and filters each page on the stripped
    /// names before handing it to the visitor.
    #[tracing::instrument(skip(self, visit), fields(provider = "KeyVault"))]
    async fn enumerate(
        &self,
        filter: Option<&str>,
        visit: BlobVisitor,
        mode: VisitMode,
    ) -> BlobResult<()> {
        let pattern = filter.map(WildcardPattern::new).transpose()?;
        let mut pages = self.pages();
        let mut visited = 0usize;

        while let Some(page) = pages.try_next().await? {
            let page: Vec<_> = page
                .into_iter()
                .filter(|blob| pattern.as_ref().is_none_or(|p| p.matches(&blob.name)))
                .collect();
            visited += page.len();
            dispatch(page, &visit, mode).await?;
        }

        debug!(visited, "Enumeration finished");
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(provider = "KeyVault"))]
    async fn find(&self, filter: &str) -> BlobResult<Vec<String>> {
        let pattern = WildcardPattern::new(filter)?;
        let mut names = Vec::new();
        let mut pages = self.pages();

        while let Some(page) = pages.try_next().await? {
            names.extend(
                page.into_iter()
                    .map(|blob| blob.name)
                    .filter(|name| pattern.matches(name)),
            );
        }

        Ok(names)
    }

    fn blobs(&self) -> BoxStream<'_, BlobResult<BlobDescriptor>> {
        self.client
            .list_properties()
            .map_ok(move |page| {
                stream::iter(self.visible(page).into_iter().map(Ok::<_, BlobError>))
            })
            .map_err(BlobError::from)
            .try_flatten()
            .boxed()
    }
}
