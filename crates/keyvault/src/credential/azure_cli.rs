//! Token from a signed-in Azure CLI

use std::io::ErrorKind;

use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use super::{AccessToken, TokenCache, TokenCredential, de_seconds};
use crate::error::{KeyVaultError, Result};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CliToken {
    access_token: String,
    /// Unix timestamp, newer CLI versions only
    #[serde(default, rename = "expires_on", deserialize_with = "de_seconds")]
    expires_on_unix: Option<i64>,
    /// Local time, e.g. `2024-05-01 10:00:00.000000`
    #[serde(default)]
    expires_on: Option<String>,
}

fn parse_local_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S%.f").ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

fn parse_cli_output(stdout: &[u8]) -> Result<AccessToken> {
    let token: CliToken = serde_json::from_slice(stdout)
        .map_err(|e| KeyVaultError::InvalidResponse(format!("az output: {e}")))?;

    let expires_on = match (token.expires_on_unix, token.expires_on.as_deref()) {
        (Some(ts), _) => DateTime::from_timestamp(ts, 0),
        (None, Some(local)) => parse_local_expiry(local),
        (None, None) => None,
    }
    .ok_or_else(|| KeyVaultError::InvalidResponse("az output carries no usable expiry".into()))?;

    Ok(AccessToken::new(token.access_token, expires_on))
}

/// Runs `az account get-access-token` for the signed-in user
#[derive(Debug, Default)]
pub struct AzureCliCredential {
    cache: TokenCache,
}

impl AzureCliCredential {
    /// Credential backed by the `az` executable on `PATH`
    pub fn new() -> Self {
        Self::default()
    }

    async fn request_token(&self, scopes: &[String]) -> Result<AccessToken> {
        let resource = scopes
            .first()
            .map(|s| s.trim_end_matches("/.default").to_string())
            .ok_or_else(|| KeyVaultError::authentication("no scope requested"))?;

        debug!(resource = %resource, "Requesting token from Azure CLI");

        let output = Command::new("az")
            .args(["account", "get-access-token", "--output", "json", "--resource"])
            .arg(&resource)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    KeyVaultError::unavailable(self.name(), "az executable not found on PATH")
                }
                _ => KeyVaultError::unavailable(self.name(), format!("failed to run az: {e}")),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            if stderr.contains("az login") || stderr.contains("az account set") {
                return Err(KeyVaultError::unavailable(self.name(), stderr.to_string()));
            }
            return Err(KeyVaultError::authentication(format!(
                "az exited with {}: {stderr}",
                output.status
            )));
        }

        parse_cli_output(&output.stdout)
    }
}

#[async_trait]
impl TokenCredential for AzureCliCredential {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        self.cache
            .get_or_fetch(scopes, || self.request_token(scopes))
            .await
    }

    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }
}
