//! Service principal read from `AZURE_*` environment variables

use async_trait::async_trait;
use secrecy::SecretString;

use super::{AccessToken, ClientSecretCredential, TokenCredential};
use crate::error::{KeyVaultError, Result};

const TENANT_ID: &str = "AZURE_TENANT_ID";
const CLIENT_ID: &str = "AZURE_CLIENT_ID";
const CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
const AUTHORITY_HOST: &str = "AZURE_AUTHORITY_HOST";

/// Client-secret credential configured through the environment
///
/// Reads `AZURE_TENANT_ID`, `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET` and the
/// optional `AZURE_AUTHORITY_HOST` once, at construction. When any required
/// variable is missing the credential reports itself unavailable.
#[derive(Debug)]
pub struct EnvironmentCredential {
    inner: std::result::Result<ClientSecretCredential, String>,
}

impl EnvironmentCredential {
    /// Read the process environment
    pub fn new(http: reqwest::Client) -> Self {
        Self::from_lookup(|name| std::env::var(name).ok(), http)
    }

    /// Read variables through `lookup` instead of the process environment
    pub fn from_lookup<F>(lookup: F, http: reqwest::Client) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            inner: configured(&lookup, http),
        }
    }

    /// Whether all required variables were present
    pub fn is_configured(&self) -> bool {
        self.inner.is_ok()
    }
}

fn configured<F>(
    lookup: &F,
    http: reqwest::Client,
) -> std::result::Result<ClientSecretCredential, String>
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| {
        lookup(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| format!("{name} is not set"))
    };

    let mut credential = ClientSecretCredential::new(
        read(TENANT_ID)?,
        read(CLIENT_ID)?,
        SecretString::from(read(CLIENT_SECRET)?),
        http,
    );
    if let Some(raw) = lookup(AUTHORITY_HOST) {
        let authority = url::Url::parse(&raw).map_err(|e| format!("{AUTHORITY_HOST}: {e}"))?;
        credential = credential.with_authority_host(authority);
    }
    Ok(credential)
}

#[async_trait]
impl TokenCredential for EnvironmentCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        match &self.inner {
            Ok(credential) => credential.get_token(scopes).await,
            Err(reason) => Err(KeyVaultError::unavailable(self.name(), reason.clone())),
        }
    }

    fn name(&self) -> &'static str {
        "EnvironmentCredential"
    }
}
