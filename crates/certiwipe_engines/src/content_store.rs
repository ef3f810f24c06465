#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Mutex;

use certiwipe_contracts::certificate::ContentId;
use certiwipe_contracts::provider_secrets::ProviderSecretId;
use rand::rngs::OsRng;
use rand::RngCore;
use url::Url;

use crate::canonical::sha256;
use crate::device_vault::DeviceVault;
use crate::provider_http::{
    endpoint_from_env, join_endpoint, parse_endpoint, provider_error_from_ureq,
    resolve_provider_secret, ProviderCallError, ProviderHttpConfig,
};

pub const PINATA_ENDPOINT_DEFAULT: &str = "https://api.pinata.cloud";
pub const IPFS_GATEWAY_DEFAULT: &str = "https://gateway.pinata.cloud/ipfs";
const MAX_FETCH_BYTES: u64 = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ContentStoreError {
    #[error("content store unavailable: {0}")]
    Unavailable(ProviderCallError),
    #[error("content {0} not found")]
    NotFound(ContentId),
    #[error("content store returned an unexpected response: {0}")]
    InvalidResponse(String),
}

/// Content-addressed storage capability. `put` returns the id the store
/// derived from the bytes; `get` returns them unchanged.
pub trait ContentStore: Send + Sync {
    fn put(&self, name: &str, content_type: &str, bytes: &[u8])
        -> Result<ContentId, ContentStoreError>;

    fn get(&self, content_id: &ContentId) -> Result<Vec<u8>, ContentStoreError>;
}

/// Pins through the Pinata HTTP API and reads back through an IPFS gateway.
#[derive(Debug, Clone)]
pub struct PinataContentStore {
    agent: ureq::Agent,
    api_endpoint: Url,
    gateway: Url,
    jwt: String,
}

impl PinataContentStore {
    pub fn new(http: &ProviderHttpConfig, api_endpoint: Url, gateway: Url, jwt: String) -> Self {
        Self {
            agent: http.build_agent(),
            api_endpoint,
            gateway,
            jwt,
        }
    }

    /// `None` when no JWT is configured in the environment or vault.
    pub fn from_env(http: &ProviderHttpConfig, vault: &DeviceVault) -> Option<Self> {
        let jwt = resolve_provider_secret(ProviderSecretId::PinataJwt, vault)?;
        let api_endpoint = endpoint_from_env("CERTIWIPE_PINATA_ENDPOINT")
            .or_else(|| parse_endpoint(PINATA_ENDPOINT_DEFAULT))?;
        let gateway = endpoint_from_env("CERTIWIPE_IPFS_GATEWAY")
            .or_else(|| parse_endpoint(IPFS_GATEWAY_DEFAULT))?;
        Some(Self::new(http, api_endpoint, gateway, jwt))
    }
}

impl ContentStore for PinataContentStore {
    fn put(
        &self,
        name: &str,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<ContentId, ContentStoreError> {
        let (boundary, body) = multipart_file_body(name, content_type, bytes);
        let response = self
            .agent
            .post(&join_endpoint(&self.api_endpoint, "pinning/pinFileToIPFS"))
            .set("Authorization", &format!("Bearer {}", self.jwt))
            .set(
                "Content-Type",
                &format!("multipart/form-data; boundary={boundary}"),
            )
            .send_bytes(&body)
            .map_err(|e| ContentStoreError::Unavailable(provider_error_from_ureq("pinata", e)))?;
        let json: serde_json::Value = response
            .into_json()
            .map_err(|e| ContentStoreError::InvalidResponse(e.to_string()))?;
        let hash = json
            .get("IpfsHash")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| ContentStoreError::InvalidResponse("missing IpfsHash".to_string()))?;
        ContentId::new(hash).map_err(|e| ContentStoreError::InvalidResponse(e.to_string()))
    }

    fn get(&self, content_id: &ContentId) -> Result<Vec<u8>, ContentStoreError> {
        let url = join_endpoint(&self.gateway, content_id.as_str());
        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => {
                return Err(ContentStoreError::NotFound(content_id.clone()))
            }
            Err(e) => {
                return Err(ContentStoreError::Unavailable(provider_error_from_ureq(
                    "ipfs_gateway",
                    e,
                )))
            }
        };
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_FETCH_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|e| ContentStoreError::InvalidResponse(e.to_string()))?;
        Ok(bytes)
    }
}

fn multipart_file_body(name: &str, content_type: &str, bytes: &[u8]) -> (String, Vec<u8>) {
    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut nonce);
    let boundary = format!("certiwipe-{}", hex::encode(nonce));
    let safe_name: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();

    let mut body = Vec::with_capacity(bytes.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{safe_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(
        format!(
            "\r\n--{boundary}\r\nContent-Disposition: form-data; name=\"pinataMetadata\"\r\n\r\n{}\r\n--{boundary}--\r\n",
            serde_json::json!({ "name": safe_name })
        )
        .as_bytes(),
    );
    (boundary, body)
}

/// Loopback store: ids are derived from the SHA-256 of the bytes.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentStore for InMemoryContentStore {
    fn put(
        &self,
        _name: &str,
        _content_type: &str,
        bytes: &[u8],
    ) -> Result<ContentId, ContentStoreError> {
        let id = format!("mem-{}", hex::encode(sha256(bytes)));
        let mut objects = self.objects.lock().map_err(|_| {
            ContentStoreError::Unavailable(ProviderCallError::new("memory", "lock_poisoned", None))
        })?;
        objects.insert(id.clone(), bytes.to_vec());
        ContentId::new(id).map_err(|e| ContentStoreError::InvalidResponse(e.to_string()))
    }

    fn get(&self, content_id: &ContentId) -> Result<Vec<u8>, ContentStoreError> {
        let objects = self.objects.lock().map_err(|_| {
            ContentStoreError::Unavailable(ProviderCallError::new("memory", "lock_poisoned", None))
        })?;
        objects
            .get(content_id.as_str())
            .cloned()
            .ok_or_else(|| ContentStoreError::NotFound(content_id.clone()))
    }
}
