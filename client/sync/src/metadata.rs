//! Content-addressed metadata: pinning, fetching, and a pointer-keyed cache.
//!
//! A pointer names immutable content, so a successful fetch is cached for the
//! life of the process and never refetched.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::{ClientError, Result};
use crate::events::{MetaPtr, IPFS_PROTOCOL};

/// Remote content-addressed store.
#[async_trait]
pub trait PinningService: Send + Sync {
    /// Pin the serialised document and return its content pointer.
    async fn pin_json(&self, body: &[u8]) -> Result<String>;

    /// Raw bytes of the document behind `pointer`.
    async fn fetch_json(&self, pointer: &str) -> Result<Vec<u8>>;
}

// ─────────────────────────────────────────────────────────
// Pinata
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PinataConfig {
    pub api_url: String,
    pub gateway_url: String,
    pub jwt: Option<String>,
}

/// The document rides along unparsed so its bytes, and thus its content
/// hash, are exactly what the caller serialised.
#[derive(Serialize)]
struct PinRequest<'a> {
    #[serde(rename = "pinataContent")]
    pinata_content: &'a RawValue,
}

#[derive(Debug, Deserialize)]
struct PinResponse {
    #[serde(rename = "IpfsHash")]
    ipfs_hash: String,
}

pub struct PinataClient {
    client: Client,
    config: PinataConfig,
}

impl PinataClient {
    pub fn new(client: Client, config: PinataConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl PinningService for PinataClient {
    async fn pin_json(&self, body: &[u8]) -> Result<String> {
        let jwt = self
            .config
            .jwt
            .as_deref()
            .ok_or_else(|| ClientError::Pinning("no pinning credentials configured".into()))?;
        let content: &RawValue = serde_json::from_slice(body)?;

        let response = self
            .client
            .post(format!(
                "{}/pinning/pinJSONToIPFS",
                self.config.api_url.trim_end_matches('/')
            ))
            .bearer_auth(jwt)
            .json(&PinRequest {
                pinata_content: content,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Pinning(format!("pinJSONToIPFS returned {status}")));
        }
        let pinned: PinResponse = response.json().await?;
        debug!("Pinned {} bytes as {}", body.len(), pinned.ipfs_hash);
        Ok(pinned.ipfs_hash)
    }

    async fn fetch_json(&self, pointer: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(format!(
                "{}/ipfs/{pointer}",
                self.config.gateway_url.trim_end_matches('/')
            ))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Pinning(format!("gateway returned {status} for {pointer}")));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

// ─────────────────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────────────────

pub struct MetadataStore {
    service: Arc<dyn PinningService>,
    documents: RwLock<HashMap<String, Arc<[u8]>>>,
}

impl MetadataStore {
    pub fn new(service: Arc<dyn PinningService>) -> Self {
        Self {
            service,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Serialise and pin `document`, returning an IPFS meta pointer.
    pub async fn pin<T: Serialize + ?Sized>(&self, document: &T) -> Result<MetaPtr> {
        let body = serde_json::to_vec(document)?;
        let pointer = self.service.pin_json(&body).await?;
        self.documents
            .write()
            .await
            .insert(pointer.clone(), Arc::from(body));
        Ok(MetaPtr {
            protocol: IPFS_PROTOCOL,
            pointer,
        })
    }

    /// Raw document bytes, from cache when already fetched.
    pub async fn fetch(&self, pointer: &str) -> Result<Arc<[u8]>> {
        if let Some(cached) = self.documents.read().await.get(pointer) {
            return Ok(cached.clone());
        }

        let body: Arc<[u8]> = Arc::from(self.service.fetch_json(pointer).await?);
        self.documents
            .write()
            .await
            .entry(pointer.to_string())
            .or_insert_with(|| body.clone());
        Ok(body)
    }

    /// Fetch and decode the document behind an IPFS meta pointer.
    pub async fn fetch_document<T: DeserializeOwned>(&self, meta_ptr: &MetaPtr) -> Result<T> {
        if meta_ptr.protocol != IPFS_PROTOCOL {
            return Err(ClientError::DataIntegrity(format!(
                "unsupported metadata protocol {}",
                meta_ptr.protocol
            )));
        }
        let body = self.fetch(&meta_ptr.pointer).await?;
        Ok(serde_json::from_slice(&body)?)
    }
}
