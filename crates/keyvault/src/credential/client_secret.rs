//! Service principal authentication with a client secret

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use super::{AccessToken, TokenCache, TokenCredential, de_seconds, expiry_from};
use crate::error::{KeyVaultError, Result};

/// Public-cloud Microsoft identity platform
pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com/";

/// Maximum length for error response body to log (prevents log flooding)
const MAX_ERROR_BODY_LOG_LENGTH: usize = 500;

/// Truncate a token-endpoint body and blank anything that looks like a token
pub(crate) fn sanitize_response_for_logging(body: &str) -> String {
    let truncated = if body.len() > MAX_ERROR_BODY_LOG_LENGTH {
        let mut end = MAX_ERROR_BODY_LOG_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... [truncated, {} total bytes]",
            &body[..end],
            body.len()
        )
    } else {
        body.to_string()
    };

    if let Ok(mut json) = serde_json::from_str::<serde_json::Value>(&truncated) {
        for field in ["access_token", "refresh_token", "id_token", "accessToken"] {
            if json.get(field).is_some() {
                json[field] = serde_json::json!("[REDACTED]");
            }
        }
        json.to_string()
    } else {
        truncated
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default, deserialize_with = "de_seconds")]
    expires_in: Option<i64>,
    #[serde(default, deserialize_with = "de_seconds")]
    expires_on: Option<i64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth2 client-credentials grant against the Microsoft identity platform
pub struct ClientSecretCredential {
    tenant_id: String,
    client_id: String,
    client_secret: SecretString,
    authority_host: String,
    http: reqwest::Client,
    cache: TokenCache,
}

impl std::fmt::Debug for ClientSecretCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientSecretCredential")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl ClientSecretCredential {
    /// Credential for a service principal in `tenant_id`
    pub fn new(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        http: reqwest::Client,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret,
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            http,
            cache: TokenCache::default(),
        }
    }

    /// Use another authority, e.g. `https://login.chinacloudapi.cn/`
    pub fn with_authority_host(mut self, authority_host: Url) -> Self {
        self.authority_host = authority_host.into();
        self
    }

    fn token_endpoint(&self) -> Result<Url> {
        let raw = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        );
        Url::parse(&raw).map_err(|e| KeyVaultError::authentication(format!("{raw}: {e}")))
    }

    async fn request_token(&self, scopes: &[String]) -> Result<AccessToken> {
        let endpoint = self.token_endpoint()?;
        let scope = scopes.join(" ");

        debug!(
            client_id = %self.client_id,
            endpoint = %endpoint,
            scope = %scope,
            "Requesting token with client credentials"
        );

        let response = self
            .http
            .post(endpoint)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("scope", scope.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(
                status = %status,
                body = %sanitize_response_for_logging(&body),
                "Token request failed"
            );
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(e) => match e.error_description {
                    Some(description) => format!("{}: {description}", e.error),
                    None => e.error,
                },
                Err(_) => format!("HTTP {status}"),
            };
            return Err(KeyVaultError::authentication(reason));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            error!(
                error = %e,
                body = %sanitize_response_for_logging(&body),
                "Failed to parse token response"
            );
            KeyVaultError::InvalidResponse(format!("token response: {e}"))
        })?;

        let expires_on = expiry_from(token.expires_on, token.expires_in)?;
        Ok(AccessToken::new(token.access_token, expires_on))
    }
}

#[async_trait]
impl TokenCredential for ClientSecretCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        self.cache
            .get_or_fetch(scopes, || self.request_token(scopes))
            .await
    }

    fn name(&self) -> &'static str {
        "ClientSecretCredential"
    }
}
