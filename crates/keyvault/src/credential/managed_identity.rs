//! Managed identity for Azure-hosted workloads

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use super::client_secret::sanitize_response_for_logging;
use super::{AccessToken, TokenCache, TokenCredential, de_seconds, expiry_from};
use crate::error::{KeyVaultError, Result};

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";

/// IMDS probes give up quickly so the chain can move on off-Azure
const IMDS_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
enum Endpoint {
    /// App Service / Functions identity endpoint with its shared secret header
    AppService { url: Url, header: String },
    /// Instance metadata service on VMs, VMSS and AKS
    Imds { url: String },
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "de_seconds")]
    expires_on: Option<i64>,
    #[serde(default, deserialize_with = "de_seconds")]
    expires_in: Option<i64>,
}

/// Token from the hosting environment's managed identity
///
/// Uses `IDENTITY_ENDPOINT`/`IDENTITY_HEADER` when App Service provides them,
/// the instance metadata service otherwise. Construction does no I/O.
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    endpoint: Endpoint,
    client_id: Option<String>,
    http: reqwest::Client,
    cache: TokenCache,
}

impl ManagedIdentityCredential {
    /// System-assigned identity, endpoint picked from the environment
    pub fn new(http: reqwest::Client) -> Self {
        let app_service = std::env::var("IDENTITY_ENDPOINT")
            .ok()
            .zip(std::env::var("IDENTITY_HEADER").ok())
            .and_then(|(url, header)| Some((Url::parse(&url).ok()?, header)));

        let endpoint = match app_service {
            Some((url, header)) => Endpoint::AppService { url, header },
            None => Endpoint::Imds {
                url: IMDS_ENDPOINT.to_string(),
            },
        };

        Self {
            endpoint,
            client_id: None,
            http,
            cache: TokenCache::default(),
        }
    }

    /// Talk to an IMDS-compatible endpoint at `url`
    pub fn with_imds_endpoint(mut self, url: Url) -> Self {
        self.endpoint = Endpoint::Imds { url: url.into() };
        self
    }

    /// Talk to an App Service identity endpoint at `url`
    pub fn with_app_service_endpoint(mut self, url: Url, header: impl Into<String>) -> Self {
        self.endpoint = Endpoint::AppService {
            url,
            header: header.into(),
        };
        self
    }

    /// Use a user-assigned identity
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    async fn request_token(&self, scopes: &[String]) -> Result<AccessToken> {
        let resource = scopes
            .first()
            .map(|s| s.trim_end_matches("/.default").to_string())
            .ok_or_else(|| KeyVaultError::authentication("no scope requested"))?;

        let request = match &self.endpoint {
            Endpoint::AppService { url, header } => {
                let mut url = url.clone();
                {
                    let mut query = url.query_pairs_mut();
                    query.append_pair("api-version", APP_SERVICE_API_VERSION);
                    query.append_pair("resource", &resource);
                    if let Some(client_id) = &self.client_id {
                        query.append_pair("client_id", client_id);
                    }
                }
                self.http.get(url).header("X-IDENTITY-HEADER", header)
            }
            Endpoint::Imds { url } => {
                let mut url = Url::parse(url).map_err(|e| {
                    KeyVaultError::unavailable(self.name(), format!("bad IMDS endpoint {url}: {e}"))
                })?;
                {
                    let mut query = url.query_pairs_mut();
                    query.append_pair("api-version", IMDS_API_VERSION);
                    query.append_pair("resource", &resource);
                    if let Some(client_id) = &self.client_id {
                        query.append_pair("client_id", client_id);
                    }
                }
                self.http
                    .get(url)
                    .header("Metadata", "true")
                    .timeout(IMDS_TIMEOUT)
            }
        };

        debug!(resource = %resource, "Requesting managed identity token");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                return Err(KeyVaultError::unavailable(
                    self.name(),
                    format!("identity endpoint unreachable: {e}"),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(
                status = %status,
                body = %sanitize_response_for_logging(&body),
                "Managed identity token request failed"
            );
            // IMDS answers 400 when no identity is assigned to the host
            if status == reqwest::StatusCode::BAD_REQUEST {
                return Err(KeyVaultError::unavailable(
                    self.name(),
                    "no identity assigned to this host",
                ));
            }
            return Err(KeyVaultError::authentication(format!(
                "managed identity endpoint answered {status}"
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            KeyVaultError::InvalidResponse(format!("managed identity token response: {e}"))
        })?;

        let expires_on = expiry_from(token.expires_on, token.expires_in)?;
        Ok(AccessToken::new(token.access_token, expires_on))
    }
}

#[async_trait]
impl TokenCredential for ManagedIdentityCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        self.cache
            .get_or_fetch(scopes, || self.request_token(scopes))
            .await
    }

    fn name(&self) -> &'static str {
        "ManagedIdentityCredential"
    }
}
