//! Minimal Key Vault secrets REST client
//!
//! Covers the four calls the blob store needs: set, get, delete and the
//! paged properties listing. Every request carries `api-version` and a
//! bearer token from the configured [`TokenCredential`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::{ConfigError, DEFAULT_API_VERSION};
use crate::credential::TokenCredential;
use crate::error::{KeyVaultError, Result};
use crate::metrics::{Operation, StoreMetrics};
use crate::model::{ErrorBody, SecretBundle, SecretPropertiesPage, SetSecretRequest};

const PUBLIC_CLOUD_SCOPE: &str = "https://vault.azure.net/.default";

/// Handle to one vault's secrets endpoint
///
/// Cheap to clone; clones share the HTTP connection pool, the credential
/// and the metrics.
#[derive(Clone)]
pub struct SecretClient {
    vault_url: Url,
    api_version: String,
    scopes: Vec<String>,
    page_size: Option<u32>,
    credential: Arc<dyn TokenCredential>,
    http: reqwest::Client,
    metrics: Arc<StoreMetrics>,
}

impl fmt::Debug for SecretClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretClient")
            .field("vault_url", &self.vault_url.as_str())
            .field("api_version", &self.api_version)
            .field("credential", &self.credential.name())
            .finish_non_exhaustive()
    }
}

impl SecretClient {
    /// Client for `vault_url` using the public-cloud token scope
    pub fn new(vault_url: Url, credential: Arc<dyn TokenCredential>, http: reqwest::Client) -> Self {
        Self {
            vault_url,
            api_version: DEFAULT_API_VERSION.to_string(),
            scopes: vec![PUBLIC_CLOUD_SCOPE.to_string()],
            page_size: None,
            credential,
            http,
            metrics: Arc::new(StoreMetrics::new()),
        }
    }

    /// Override the `api-version` query parameter
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = api_version.into();
        self
    }

    /// Request tokens for `scope` instead of the public cloud
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes = vec![scope.into()];
        self
    }

    /// Ask for at most `page_size` entries per listing page
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Vault this client talks to
    pub fn vault_url(&self) -> &Url {
        &self.vault_url
    }

    /// Counters for calls made through this client and its clones
    pub fn metrics(&self) -> &StoreMetrics {
        &self.metrics
    }

    /// `{vault}/secrets[/{name}]?api-version=...`
    fn endpoint(&self, name: Option<&str>) -> Result<Url> {
        // An empty segment would address the collection itself
        if name == Some("") {
            return Err(KeyVaultError::EmptySecretName);
        }

        let mut url = self.vault_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                KeyVaultError::Config(ConfigError::invalid("vault_url", "cannot be a base URL"))
            })?;
            segments.pop_if_empty().push("secrets");
            if let Some(name) = name {
                segments.push(name);
            }
        }
        url.set_query(None);
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    /// Send with a bearer token, turning non-success statuses into errors
    async fn execute(
        &self,
        operation: Operation,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let start = Instant::now();
        let result = self.send(request).await;
        self.metrics
            .record(operation, start.elapsed(), result.is_ok());
        result
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let token = self.credential.get_token(&self.scopes).await?;
        let response = request.bearer_auth(token.secret()).send().await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(service_error(response).await)
        }
    }

    /// Create `name` or add a new version holding `value`
    #[tracing::instrument(skip_all, fields(secret = %name))]
    pub async fn set_secret(
        &self,
        name: &str,
        value: &str,
        content_type: Option<&str>,
        tags: &HashMap<String, String>,
    ) -> Result<SecretBundle> {
        let url = self.endpoint(Some(name))?;
        let body = SetSecretRequest {
            value,
            content_type,
            tags,
        };

        let response = self
            .execute(Operation::Put, self.http.put(url).json(&body))
            .await?;
        let bundle: SecretBundle = decode(response).await?;

        debug!(version = ?bundle.version(), "Secret written");
        Ok(bundle)
    }

    /// Latest version of `name`
    #[tracing::instrument(skip_all, fields(secret = %name))]
    pub async fn get_secret(&self, name: &str) -> Result<SecretBundle> {
        let url = self.endpoint(Some(name))?;
        let response = self.execute(Operation::Get, self.http.get(url)).await?;
        decode(response).await
    }

    /// Soft-delete `name`
    #[tracing::instrument(skip_all, fields(secret = %name))]
    pub async fn delete_secret(&self, name: &str) -> Result<()> {
        let url = self.endpoint(Some(name))?;
        self.execute(Operation::Delete, self.http.delete(url))
            .await?;
        Ok(())
    }

    /// One page of secret properties
    ///
    /// `None` fetches the first page; later pages are fetched by passing the
    /// previous page's `next_link`, which must point at this vault.
    #[tracing::instrument(skip_all, fields(first = next_link.is_none()))]
    pub async fn list_properties_page(
        &self,
        next_link: Option<&str>,
    ) -> Result<SecretPropertiesPage> {
        let url = match next_link {
            Some(link) => self.next_page_url(link)?,
            None => {
                let mut url = self.endpoint(None)?;
                if let Some(size) = self.page_size {
                    url.query_pairs_mut()
                        .append_pair("maxresults", &size.to_string());
                }
                url
            }
        };

        let response = self.execute(Operation::List, self.http.get(url)).await?;
        let page: SecretPropertiesPage = decode(response).await?;

        debug!(
            entries = page.value.len(),
            more = page.next_link.is_some(),
            "Fetched secret properties page"
        );
        Ok(page)
    }

    fn next_page_url(&self, link: &str) -> Result<Url> {
        let url = Url::parse(link)
            .map_err(|e| KeyVaultError::InvalidResponse(format!("nextLink '{link}': {e}")))?;

        // The bearer token must never leave the vault's origin
        if url.origin() != self.vault_url.origin() {
            return Err(KeyVaultError::InvalidResponse(format!(
                "nextLink '{link}' points outside the vault"
            )));
        }
        Ok(url)
    }

    /// Every properties page, fetched lazily
    ///
    /// Each call starts from the first page. The stream ends after the last
    /// page or after the first error.
    pub fn list_properties(&self) -> BoxStream<'_, Result<SecretPropertiesPage>> {
        enum Cursor {
            Start,
            Next(String),
            Done,
        }

        stream::try_unfold(Cursor::Start, move |cursor| async move {
            let link = match cursor {
                Cursor::Start => None,
                Cursor::Next(link) => Some(link),
                Cursor::Done => return Ok::<_, KeyVaultError>(None),
            };

            let page = self.list_properties_page(link.as_deref()).await?;
            let next = match page.next_link.as_deref() {
                Some(link) if !link.is_empty() => Cursor::Next(link.to_string()),
                _ => Cursor::Done,
            };
            Ok::<_, KeyVaultError>(Some((page, next)))
        })
        .boxed()
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| KeyVaultError::InvalidResponse(e.to_string()))
}

async fn service_error(response: reqwest::Response) -> KeyVaultError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();

    let (code, message) = match serde_json::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody { error }) => (error.code, error.message),
        Err(_) => (None, None),
    };
    let message = message
        .or_else(|| (!body.trim().is_empty()).then(|| body.trim().to_string()))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("no response body").to_string());

    KeyVaultError::Service {
        status,
        code,
        message,
    }
}
