//! Store configuration
//!
//! Everything a [`KeyVaultBlobStore`](crate::KeyVaultBlobStore) needs is
//! supplied up front in one [`KeyVaultStoreConfig`]. It deserializes from any
//! serde format (credentials tagged by `type`) except for the
//! [`CredentialSource::Provided`] variant, which only exists in code.
//!
//! ```toml
//! vault_url = "https://my-vault.vault.azure.net/"
//! prefix = "orders-"
//! timeout = "30s"
//!
//! [credential]
//! type = "client_secret"
//! tenant_id = "..."
//! client_id = "..."
//! client_secret = "..."
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use url::{Host, Url};

use crate::credential::TokenCredential;

/// Key Vault REST API version used when none is configured
pub const DEFAULT_API_VERSION: &str = "7.4";

/// Largest `maxresults` the list endpoint accepts
pub const MAX_PAGE_SIZE: u32 = 25;

/// Environment variable holding the vault URL for [`KeyVaultStoreConfig::from_env`]
pub const VAULT_URL_ENV: &str = "AZURE_KEYVAULT_URL";

/// Environment variable holding the optional key prefix
pub const PREFIX_ENV: &str = "AZURE_KEYVAULT_PREFIX";

const PUBLIC_CLOUD_SCOPE: &str = "https://vault.azure.net/.default";

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration: {field}: {reason}")]
    InvalidValue {
        /// Offending field
        field: String,
        /// What is wrong with it
        reason: String,
    },

    /// Missing required configuration
    #[error("Missing required configuration: {field}")]
    MissingRequired {
        /// Missing field
        field: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Validation shared by provider configurations
pub trait ProviderConfig: Send + Sync + Clone {
    /// Check every parameter, reporting the first problem found
    fn validate(&self) -> Result<(), ConfigError>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

/// Where access tokens come from
#[derive(Clone, Default, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialSource {
    /// Service principal with a client secret
    ClientSecret {
        /// Directory (tenant) id
        tenant_id: String,
        /// Application (client) id
        client_id: String,
        /// Client secret
        #[serde(deserialize_with = "de_secret")]
        client_secret: SecretString,
        /// Authority override, e.g. for sovereign clouds
        #[serde(default)]
        authority_host: Option<Url>,
    },

    /// Environment, then managed identity, then Azure CLI
    #[default]
    DefaultChain,

    /// Caller-supplied credential
    #[serde(skip)]
    Provided(Arc<dyn TokenCredential>),
}

impl CredentialSource {
    /// Client-secret source using the public-cloud authority
    pub fn client_secret(
        tenant_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self::ClientSecret {
            tenant_id: tenant_id.into(),
            client_id: client_id.into(),
            client_secret: SecretString::from(client_secret.into()),
            authority_host: None,
        }
    }

    /// Source wrapping an existing credential
    pub fn provided(credential: impl TokenCredential + 'static) -> Self {
        Self::Provided(Arc::new(credential))
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::ClientSecret { .. } => "client_secret",
            Self::DefaultChain => "default_chain",
            Self::Provided(_) => "provided",
        }
    }
}

impl fmt::Debug for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientSecret {
                tenant_id,
                client_id,
                authority_host,
                ..
            } => f
                .debug_struct("ClientSecret")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .field("authority_host", authority_host)
                .finish(),
            Self::DefaultChain => f.write_str("DefaultChain"),
            Self::Provided(_) => f.write_str("Provided"),
        }
    }
}

/// Configuration for [`KeyVaultBlobStore`](crate::KeyVaultBlobStore)
#[derive(Debug, Clone, Deserialize)]
pub struct KeyVaultStoreConfig {
    /// Vault endpoint, e.g. `https://my-vault.vault.azure.net/`
    pub vault_url: Url,

    /// Token source
    #[serde(default)]
    pub credential: CredentialSource,

    /// Prepended to every key; only ASCII letters, digits and `-`
    #[serde(default)]
    pub prefix: String,

    /// REST API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// `maxresults` for listing calls (1..=25); service default when unset
    #[serde(default)]
    pub page_size: Option<u32>,

    /// Per-request HTTP timeout; none when unset
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Token scope; derived from the vault host when unset
    #[serde(default)]
    pub scope: Option<String>,

    /// Content type recorded on every write
    #[serde(default)]
    pub content_type: Option<String>,

    /// Tags recorded on every write
    #[serde(default)]
    pub default_tags: HashMap<String, String>,
}

fn de_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

impl KeyVaultStoreConfig {
    /// Configuration for `vault_url` with the default credential chain
    pub fn new(vault_url: Url) -> Self {
        Self {
            vault_url,
            credential: CredentialSource::DefaultChain,
            prefix: String::new(),
            api_version: default_api_version(),
            page_size: None,
            timeout: None,
            scope: None,
            content_type: None,
            default_tags: HashMap::new(),
        }
    }

    /// Read `AZURE_KEYVAULT_URL` and `AZURE_KEYVAULT_PREFIX`
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var(VAULT_URL_ENV).map_err(|_| ConfigError::MissingRequired {
            field: VAULT_URL_ENV.into(),
        })?;
        let vault_url =
            Url::parse(&raw).map_err(|e| ConfigError::invalid(VAULT_URL_ENV, e.to_string()))?;

        let mut config = Self::new(vault_url);
        if let Ok(prefix) = std::env::var(PREFIX_ENV) {
            config.prefix = prefix;
        }
        Ok(config)
    }

    /// Set the credential source
    pub fn with_credential(mut self, credential: CredentialSource) -> Self {
        self.credential = credential;
        self
    }

    /// Set the key prefix
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the listing page size
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the token scope
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Record `content_type` on every write
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Record a tag on every write
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_tags.insert(key.into(), value.into());
        self
    }

    /// Token scope for this vault
    ///
    /// Public-cloud vaults (`*.vault.azure.net`) and non-vault hosts use
    /// `https://vault.azure.net/.default`; sovereign clouds use their own
    /// DNS suffix, e.g. `https://vault.azure.cn/.default`.
    pub fn token_scope(&self) -> String {
        if let Some(scope) = &self.scope {
            return scope.clone();
        }

        match self.vault_url.host_str() {
            Some(host) if host.contains(".vault.") => match host.split_once('.') {
                Some((_, suffix)) => format!("https://{suffix}/.default"),
                None => PUBLIC_CLOUD_SCOPE.to_string(),
            },
            _ => PUBLIC_CLOUD_SCOPE.to_string(),
        }
    }

    pub(crate) fn credential_kind(&self) -> &'static str {
        self.credential.kind()
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain == "localhost",
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        None => false,
    }
}

impl ProviderConfig for KeyVaultStoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.vault_url.scheme() {
            "https" => {}
            "http" if is_loopback(&self.vault_url) => {}
            "http" => {
                return Err(ConfigError::invalid(
                    "vault_url",
                    "must use https (http is only accepted for loopback hosts)",
                ));
            }
            other => {
                return Err(ConfigError::invalid(
                    "vault_url",
                    format!("unsupported scheme '{other}'"),
                ));
            }
        }

        if self.vault_url.host_str().is_none_or(str::is_empty) {
            return Err(ConfigError::MissingRequired {
                field: "vault_url.host".into(),
            });
        }

        if let Some(bad) = self
            .prefix
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-'))
        {
            return Err(ConfigError::invalid(
                "prefix",
                format!("'{bad}' is not allowed; use letters, digits and '-'"),
            ));
        }

        if self.api_version.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "api_version".into(),
            });
        }

        if let Some(size) = self.page_size
            && !(1..=MAX_PAGE_SIZE).contains(&size)
        {
            return Err(ConfigError::invalid(
                "page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE}, got {size}"),
            ));
        }

        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(ConfigError::invalid("timeout", "must be greater than zero"));
        }

        if let CredentialSource::ClientSecret {
            tenant_id,
            client_id,
            ..
        } = &self.credential
        {
            if tenant_id.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "credential.tenant_id".into(),
                });
            }
            if client_id.trim().is_empty() {
                return Err(ConfigError::MissingRequired {
                    field: "credential.client_id".into(),
                });
            }
        }

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "AzureKeyVault"
    }
}
