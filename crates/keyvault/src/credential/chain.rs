//! Ordered fallthrough across credential sources

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{
    AccessToken, AzureCliCredential, EnvironmentCredential, ManagedIdentityCredential,
    TokenCredential,
};
use crate::error::{KeyVaultError, Result};

/// Environment, then managed identity, then Azure CLI
///
/// The first credential that produces a token is remembered and used for
/// every later request. When all of them fail, the returned
/// [`KeyVaultError::Authentication`] lists each attempt.
pub struct DefaultCredentialChain {
    credentials: Vec<Arc<dyn TokenCredential>>,
    selected: Mutex<Option<usize>>,
}

impl std::fmt::Debug for DefaultCredentialChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.credentials.iter().map(|c| c.name()).collect();
        f.debug_struct("DefaultCredentialChain")
            .field("credentials", &names)
            .finish_non_exhaustive()
    }
}

impl DefaultCredentialChain {
    /// The standard chain sharing `http` between its members
    pub fn new(http: reqwest::Client) -> Self {
        Self::with_credentials(vec![
            Arc::new(EnvironmentCredential::new(http.clone())),
            Arc::new(ManagedIdentityCredential::new(http)),
            Arc::new(AzureCliCredential::new()),
        ])
    }

    /// Chain over an explicit list, tried in order
    pub fn with_credentials(credentials: Vec<Arc<dyn TokenCredential>>) -> Self {
        Self {
            credentials,
            selected: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TokenCredential for DefaultCredentialChain {
    async fn get_token(&self, scopes: &[String]) -> Result<AccessToken> {
        let mut selected = self.selected.lock().await;
        if let Some(index) = *selected {
            return self.credentials[index].get_token(scopes).await;
        }

        let mut failures = Vec::with_capacity(self.credentials.len());
        for (index, credential) in self.credentials.iter().enumerate() {
            match credential.get_token(scopes).await {
                Ok(token) => {
                    debug!(credential = credential.name(), "Credential selected");
                    *selected = Some(index);
                    return Ok(token);
                }
                Err(e) => {
                    warn!(credential = credential.name(), error = %e, "Credential failed, trying next");
                    failures.push(format!("{}: {e}", credential.name()));
                }
            }
        }

        Err(KeyVaultError::authentication(format!(
            "no credential in the chain produced a token [{}]",
            failures.join("; ")
        )))
    }

    fn name(&self) -> &'static str {
        "DefaultCredentialChain"
    }
}
