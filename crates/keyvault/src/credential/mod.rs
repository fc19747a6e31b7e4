//! Access-token sources for Key Vault requests
//!
//! Every request carries a bearer token obtained from a [`TokenCredential`].
//! Token acquisition is lazy: nothing talks to an identity endpoint until the
//! first Key Vault call asks for a token.

mod azure_cli;
mod chain;
mod client_secret;
mod environment;
mod managed_identity;

pub use azure_cli::AzureCliCredential;
pub use chain::DefaultCredentialChain;
pub use client_secret::{ClientSecretCredential, DEFAULT_AUTHORITY_HOST};
pub use environment::EnvironmentCredential;
pub use managed_identity::ManagedIdentityCredential;

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};
use tokio::sync::Mutex;

use crate::config::CredentialSource;
use crate::error::{KeyVaultError, Result};

/// Tokens are renewed this long before they expire
const EXPIRY_MARGIN: Duration = Duration::minutes(5);

/// Bearer token with its expiry
#[derive(Clone)]
pub struct AccessToken {
    token: SecretString,
    /// When the token stops being accepted
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Token expiring at `expires_on`
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            expires_on,
        }
    }

    /// The raw token (use with caution)
    pub fn secret(&self) -> &str {
        self.token.expose_secret()
    }

    /// Whether the token should be renewed at `now`
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on
            .checked_sub_signed(EXPIRY_MARGIN)
            .is_none_or(|refresh_at| refresh_at <= now)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Source of bearer tokens
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenCredential: Send + Sync {
    /// Token valid for `scopes`
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken>;

    /// Name used in logs and chain diagnostics
    fn name(&self) -> &'static str;
}

/// Fixed bearer token
///
/// For tokens managed outside this crate and for tests. The token never
/// expires from the credential's point of view.
#[derive(Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    /// Credential always answering with `token`
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: AccessToken::new(token, DateTime::<Utc>::MAX_UTC),
        }
    }
}

impl fmt::Debug for StaticTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StaticTokenCredential[REDACTED]")
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scopes: &[String]) -> Result<AccessToken> {
        Ok(self.token.clone())
    }

    fn name(&self) -> &'static str {
        "StaticTokenCredential"
    }
}

/// Last token obtained by a credential, reused until close to expiry
#[derive(Debug, Default)]
pub(crate) struct TokenCache {
    slot: Mutex<Option<(Vec<String>, AccessToken)>>,
}

impl TokenCache {
    /// Cached token for `scopes`, or a fresh one from `fetch`
    ///
    /// The lock is held across `fetch` so concurrent callers share one
    /// request.
    pub(crate) async fn get_or_fetch<F, Fut>(
        &self,
        scopes: &[String],
        fetch: F,
    ) -> Result<AccessToken>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<AccessToken>> + Send,
    {
        let mut slot = self.slot.lock().await;
        if let Some((cached_scopes, token)) = slot.as_ref()
            && cached_scopes.as_slice() == scopes
            && !token.needs_refresh_at(Utc::now())
        {
            return Ok(token.clone());
        }

        let token = fetch().await?;
        *slot = Some((scopes.to_vec(), token.clone()));
        Ok(token)
    }
}

/// Build the credential described by `source`
pub(crate) fn from_source(
    source: &CredentialSource,
    http: &reqwest::Client,
) -> Arc<dyn TokenCredential> {
    match source {
        CredentialSource::ClientSecret {
            tenant_id,
            client_id,
            client_secret,
            authority_host,
        } => {
            let mut credential = ClientSecretCredential::new(
                tenant_id.clone(),
                client_id.clone(),
                client_secret.clone(),
                http.clone(),
            );
            if let Some(authority) = authority_host {
                credential = credential.with_authority_host(authority.clone());
            }
            Arc::new(credential)
        }
        CredentialSource::DefaultChain => Arc::new(DefaultCredentialChain::new(http.clone())),
        CredentialSource::Provided(credential) => Arc::clone(credential),
    }
}

/// `expires_on`/`expires_in` fields arrive as numbers or numeric strings
pub(crate) fn de_seconds<'de, D>(deserializer: D) -> std::result::Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Number(i64),
        Text(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Number(n)) => Ok(Some(n)),
        Some(Seconds::Text(s)) => s.trim().parse().map(Some).map_err(serde::de::Error::custom),
    }
}

/// Expiry from an absolute unix timestamp or a relative lifetime
pub(crate) fn expiry_from(
    expires_on: Option<i64>,
    expires_in: Option<i64>,
) -> Result<DateTime<Utc>> {
    if let Some(ts) = expires_on {
        return DateTime::from_timestamp(ts, 0)
            .ok_or_else(|| KeyVaultError::InvalidResponse(format!("bad expires_on {ts}")));
    }
    if let Some(secs) = expires_in {
        return Duration::try_seconds(secs)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| KeyVaultError::InvalidResponse(format!("bad expires_in {secs}")));
    }
    Err(KeyVaultError::InvalidResponse(
        "token response carries no expiry".into(),
    ))
}
