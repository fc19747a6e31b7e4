//! Secretblob Key Vault
//!
//! Azure Key Vault secrets exposed as a [`BlobStore`](secretblob_storage::BlobStore).
//!
//! Each blob is one secret named `prefix + key`. The store talks to the
//! secrets REST API directly and authenticates with a [`TokenCredential`]:
//! a service principal secret, the default chain (environment, managed
//! identity, Azure CLI) or any credential supplied in code.
//!
//! # Example
//!
//! ```ignore
//! use secretblob_keyvault::prelude::*;
//!
//! let config = KeyVaultStoreConfig::from_env()?
//!     .with_credential(CredentialSource::client_secret(tenant, client, secret));
//! let store = KeyVaultBlobStore::new(config)?;
//!
//! store.put("bio", "Fred").await?;
//! let names = store.find("*.*").await?;
//! ```

pub mod client;
pub mod config;
pub mod credential;
mod error;
pub mod metrics;
pub mod model;
mod store;

pub use client::SecretClient;
pub use config::{CredentialSource, KeyVaultStoreConfig, ProviderConfig};
pub use credential::{AccessToken, StaticTokenCredential, TokenCredential};
pub use error::{KeyVaultError, Result};
pub use metrics::StoreMetrics;
pub use store::KeyVaultBlobStore;

/// Commonly used types and traits
pub mod prelude {
    pub use crate::{
        CredentialSource, KeyVaultBlobStore, KeyVaultError, KeyVaultStoreConfig,
        StaticTokenCredential, TokenCredential,
    };
    pub use secretblob_storage::prelude::*;
}
