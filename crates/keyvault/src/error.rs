//! Error types for Key Vault operations

use reqwest::StatusCode;
use secretblob_storage::BlobError;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the Key Vault client and credentials
#[derive(Debug, Error)]
pub enum KeyVaultError {
    /// The service answered with a non-success status
    #[error("Key Vault request failed with {status}: {message}")]
    Service {
        /// HTTP status
        status: StatusCode,
        /// Service error code, e.g. `SecretNotFound`
        code: Option<String>,
        /// Service error message
        message: String,
    },

    /// Transport-level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A credential could not obtain a token
    #[error("Authentication failed: {reason}")]
    Authentication {
        /// Why authentication failed
        reason: String,
    },

    /// A credential is not configured in this environment
    #[error("Credential '{credential}' unavailable: {reason}")]
    CredentialUnavailable {
        /// Credential name
        credential: &'static str,
        /// What is missing
        reason: String,
    },

    /// Secret name rejected before any request
    #[error("Secret name must not be empty")]
    EmptySecretName,

    /// The service answered with a body we could not understand
    #[error("Invalid Key Vault response: {0}")]
    InvalidResponse(String),

    /// Configuration rejected before any request
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl KeyVaultError {
    /// HTTP status of a `Service` error
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Service { status, .. } => Some(*status),
            Self::Http(e) => e.status(),
            _ => None,
        }
    }

    /// True when the service reported 404
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }

    pub(crate) fn unavailable(credential: &'static str, reason: impl Into<String>) -> Self {
        Self::CredentialUnavailable {
            credential,
            reason: reason.into(),
        }
    }

    pub(crate) fn authentication(reason: impl Into<String>) -> Self {
        Self::Authentication {
            reason: reason.into(),
        }
    }
}

impl From<KeyVaultError> for BlobError {
    fn from(err: KeyVaultError) -> Self {
        Self::backend(err)
    }
}

/// Result type alias for Key Vault operations
pub type Result<T> = std::result::Result<T, KeyVaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn service(status: StatusCode) -> KeyVaultError {
        KeyVaultError::Service {
            status,
            code: Some("SecretNotFound".into()),
            message: "A secret with (name/id) bio was not found in this key vault".into(),
        }
    }

    #[test]
    fn test_not_found_detection() {
        assert!(service(StatusCode::NOT_FOUND).is_not_found());
        assert!(!service(StatusCode::FORBIDDEN).is_not_found());
        assert!(!KeyVaultError::authentication("nope").is_not_found());
    }

    #[test]
    fn test_service_display() {
        let err = service(StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("404"));
        assert!(err.to_string().contains("was not found"));
    }

    #[test]
    fn test_into_blob_error_keeps_source() {
        let blob: BlobError = service(StatusCode::FORBIDDEN).into();
        let inner = blob.backend_source::<KeyVaultError>().unwrap();
        assert_eq!(inner.status(), Some(StatusCode::FORBIDDEN));
        assert!(!blob.is_not_found());
    }

    #[test]
    fn test_unavailable_display() {
        let err = KeyVaultError::unavailable("EnvironmentCredential", "AZURE_TENANT_ID not set");
        assert_eq!(
            err.to_string(),
            "Credential 'EnvironmentCredential' unavailable: AZURE_TENANT_ID not set"
        );
    }
}
