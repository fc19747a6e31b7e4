//! Stateful in-process stand-in for the Key Vault secrets API

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use secretblob_keyvault::{CredentialSource, KeyVaultBlobStore, KeyVaultStoreConfig, StaticTokenCredential};
use serde_json::{Value, json};
use wiremock::matchers::path_regex;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub const TOKEN: &str = "test-token";

/// Entries per listing page unless the request asks for fewer
pub const DEFAULT_PAGE_SIZE: usize = 2;

#[derive(Debug, Clone)]
struct Secret {
    value: String,
    version: u64,
    content_type: Option<String>,
    tags: Value,
}

/// Secrets held by a [`FakeVault`], shared with its clones
#[derive(Debug, Clone, Default)]
pub struct FakeVault {
    secrets: Arc<Mutex<BTreeMap<String, Secret>>>,
    versions: Arc<Mutex<u64>>,
}

impl FakeVault {
    /// Serve a fresh vault on `server`
    pub async fn mount(server: &MockServer) -> Self {
        let vault = Self::default();
        Mock::given(path_regex(r"^/secrets(/[^/]+)?/?$"))
            .respond_with(vault.clone())
            .mount(server)
            .await;
        vault
    }

    /// Secret names currently stored, including any prefix
    pub fn names(&self) -> Vec<String> {
        self.secrets.lock().unwrap().keys().cloned().collect()
    }

    /// Raw value of `name`
    pub fn value(&self, name: &str) -> Option<String> {
        self.secrets.lock().unwrap().get(name).map(|s| s.value.clone())
    }

    /// Tags recorded for `name`
    pub fn tags(&self, name: &str) -> Option<Value> {
        self.secrets.lock().unwrap().get(name).map(|s| s.tags.clone())
    }

    /// Content type recorded for `name`
    pub fn content_type(&self, name: &str) -> Option<String> {
        self.secrets
            .lock()
            .unwrap()
            .get(name)
            .and_then(|s| s.content_type.clone())
    }

    /// Store `name` directly, bypassing the API
    pub fn insert(&self, name: &str, value: &str) {
        let version = self.next_version();
        self.secrets.lock().unwrap().insert(
            name.to_string(),
            Secret {
                value: value.to_string(),
                version,
                content_type: None,
                tags: Value::Null,
            },
        );
    }

    fn next_version(&self) -> u64 {
        let mut versions = self.versions.lock().unwrap();
        *versions += 1;
        *versions
    }

    fn bundle(base: &str, name: &str, secret: &Secret, with_value: bool) -> Value {
        let mut body = json!({
            "id": format!("{base}/secrets/{name}/{:032x}", secret.version),
            "attributes": {"enabled": true, "created": 1_600_000_000, "updated": 1_600_000_000},
            "tags": secret.tags,
        });
        if with_value {
            body["value"] = json!(secret.value);
        }
        if let Some(content_type) = &secret.content_type {
            body["contentType"] = json!(content_type);
        }
        body
    }

    fn list(&self, base: &str, request: &Request) -> ResponseTemplate {
        let query = |key: &str| {
            request
                .url
                .query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
        };
        let skip: usize = query("$skiptoken").and_then(|v| v.parse().ok()).unwrap_or(0);
        let size: usize = query("maxresults")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);

        let secrets = self.secrets.lock().unwrap();
        let value: Vec<Value> = secrets
            .iter()
            .skip(skip)
            .take(size)
            .map(|(name, secret)| {
                // Listing ids carry no version
                let mut item = Self::bundle(base, name, secret, false);
                item["id"] = json!(format!("{base}/secrets/{name}"));
                item
            })
            .collect();

        let next_link = (skip + size < secrets.len()).then(|| {
            format!("{base}/secrets?api-version=7.4&$skiptoken={}&maxresults={size}", skip + size)
        });

        ResponseTemplate::new(200).set_body_json(json!({"value": value, "nextLink": next_link}))
    }
}

pub fn not_found(name: &str) -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "error": {
            "code": "SecretNotFound",
            "message": format!("A secret with (name/id) {name} was not found in this key vault."),
        }
    }))
}

impl Respond for FakeVault {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let authorized = request
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == format!("Bearer {TOKEN}"));
        if !authorized {
            return ResponseTemplate::new(401).set_body_json(json!({
                "error": {"code": "Unauthorized", "message": "AKV10000: Request is missing a Bearer or PoP token."}
            }));
        }

        if request.url.query_pairs().all(|(k, _)| k != "api-version") {
            return ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": "BadParameter", "message": "The request URI contains an invalid API version"}
            }));
        }

        let base = request.url.origin().ascii_serialization();
        let segments: Vec<String> = request
            .url
            .path_segments()
            .map(|s| s.filter(|s| !s.is_empty()).map(str::to_string).collect())
            .unwrap_or_default();

        match (request.method.as_str(), segments.as_slice()) {
            ("GET", [_]) => self.list(&base, request),
            ("GET", [_, name]) => match self.secrets.lock().unwrap().get(name) {
                Some(secret) => {
                    ResponseTemplate::new(200).set_body_json(Self::bundle(&base, name, secret, true))
                }
                None => not_found(name),
            },
            ("PUT", [_, name]) => {
                let body: Value = match serde_json::from_slice(&request.body) {
                    Ok(body) => body,
                    Err(_) => return ResponseTemplate::new(400),
                };
                let Some(value) = body["value"].as_str() else {
                    return ResponseTemplate::new(400);
                };
                let secret = Secret {
                    value: value.to_string(),
                    version: self.next_version(),
                    content_type: body["contentType"].as_str().map(str::to_string),
                    tags: body.get("tags").cloned().unwrap_or(Value::Null),
                };
                let response = Self::bundle(&base, name, &secret, true);
                self.secrets.lock().unwrap().insert(name.clone(), secret);
                ResponseTemplate::new(200).set_body_json(response)
            }
            ("DELETE", [_, name]) => match self.secrets.lock().unwrap().remove(name) {
                Some(secret) => {
                    ResponseTemplate::new(200).set_body_json(Self::bundle(&base, name, &secret, false))
                }
                None => not_found(name),
            },
            _ => ResponseTemplate::new(405),
        }
    }
}

/// Store talking to `server` with the fake vault's token
pub fn store(server: &MockServer, prefix: &str) -> KeyVaultBlobStore {
    KeyVaultBlobStore::new(config(server).with_prefix(prefix)).unwrap()
}

/// Configuration for `server` with the fake vault's token
pub fn config(server: &MockServer) -> KeyVaultStoreConfig {
    KeyVaultStoreConfig::new(server.uri().parse().unwrap())
        .with_credential(CredentialSource::provided(StaticTokenCredential::new(TOKEN)))
}
