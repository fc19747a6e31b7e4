//! Key Vault secrets wire types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use secretblob_storage::BlobDescriptor;
use serde::{Deserialize, Serialize};
use url::Url;

/// Name and version parsed from a secret identifier
///
/// Identifiers look like `https://{vault}/secrets/{name}[/{version}]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretId {
    /// Secret name
    pub name: String,
    /// Version segment, absent on listing entries
    pub version: Option<String>,
}

impl SecretId {
    /// Parse an identifier, `None` when it is not a secret URL
    pub fn parse(id: &str) -> Option<Self> {
        let url = Url::parse(id).ok()?;
        let mut segments = url.path_segments()?.filter(|s| !s.is_empty());

        if segments.next()? != "secrets" {
            return None;
        }
        let name = segments.next()?.to_string();
        let version = segments.next().map(str::to_string);
        if segments.next().is_some() {
            return None;
        }

        Some(Self { name, version })
    }
}

/// Service-managed attributes of a secret
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretAttributes {
    /// Missing means enabled
    #[serde(default)]
    pub enabled: Option<bool>,
    /// Expiry, seconds since the unix epoch
    #[serde(default)]
    pub exp: Option<i64>,
    /// Not-before, seconds since the unix epoch
    #[serde(default)]
    pub nbf: Option<i64>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub updated: Option<i64>,
    #[serde(default)]
    pub recovery_level: Option<String>,
}

impl SecretAttributes {
    /// Expiry as a timestamp
    pub fn expires(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|ts| DateTime::from_timestamp(ts, 0))
    }
}

/// A secret with its value, as returned by get and set
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretBundle {
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub attributes: SecretAttributes,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
}

impl SecretBundle {
    /// Version segment of the bundle's identifier
    pub fn version(&self) -> Option<String> {
        self.id
            .as_deref()
            .and_then(SecretId::parse)
            .and_then(|id| id.version)
    }
}

/// One listing entry: a secret's properties without its value
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretProperties {
    pub id: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub attributes: SecretAttributes,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
    /// Set on secrets backing certificates
    #[serde(default)]
    pub managed: Option<bool>,
}

impl SecretProperties {
    /// Parsed identifier, `None` for malformed ids
    pub fn secret_id(&self) -> Option<SecretId> {
        SecretId::parse(&self.id)
    }

    /// Project into a blob descriptor named `name`
    ///
    /// Listings never include deleted secrets and the service has no
    /// metadata separate from tags, so `deleted` is false and `metadata`
    /// stays empty.
    pub fn to_descriptor(&self, name: impl Into<String>) -> BlobDescriptor {
        let mut descriptor = BlobDescriptor::new(name);
        descriptor.enabled = self.attributes.enabled.unwrap_or(true);
        descriptor.version = self.secret_id().and_then(|id| id.version);
        descriptor.content_type = self.content_type.clone();
        descriptor.expires = self.attributes.expires();
        descriptor.tags = self.tags.clone().unwrap_or_default();
        descriptor
    }
}

/// One page of `GET /secrets`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretPropertiesPage {
    #[serde(default)]
    pub value: Vec<SecretProperties>,
    /// Absolute URL of the next page
    #[serde(default)]
    pub next_link: Option<String>,
}

/// Body of `PUT /secrets/{name}`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SetSecretRequest<'a> {
    pub value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "no_tags")]
    pub tags: &'a HashMap<String, String>,
}

fn no_tags(tags: &&HashMap<String, String>) -> bool {
    tags.is_empty()
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorDetail {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}
