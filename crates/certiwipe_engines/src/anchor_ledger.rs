#![forbid(unsafe_code)]

use std::sync::Mutex;

use certiwipe_contracts::anchor::AnchorReceipt;
use certiwipe_contracts::certificate::{ContentId, TransactionId};
use certiwipe_contracts::device::Imei;
use certiwipe_contracts::provider_secrets::ProviderSecretId;
use serde::Deserialize;
use serde_json::json;
use url::Url;

use crate::canonical::sha256;
use crate::device_vault::DeviceVault;
use crate::provider_http::{
    endpoint_from_env, env_string, join_endpoint, provider_error_from_ureq,
    resolve_provider_secret, ProviderCallError, ProviderHttpConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger does not support device event logging")]
    CapabilityUnsupported,
    #[error("ledger unavailable: {0}")]
    Unavailable(ProviderCallError),
    #[error("ledger rejected the transaction: {0}")]
    Rejected(String),
}

/// Append-only ledger used to attest content ids.
///
/// Device-event logging is an optional capability. Implementations that never
/// offer it should return `false` from [`supports_device_event_log`] so the
/// call is skipped instead of attempted.
///
/// [`supports_device_event_log`]: AnchorLedger::supports_device_event_log
pub trait AnchorLedger: Send + Sync {
    fn supports_device_event_log(&self) -> bool {
        true
    }

    fn log_device_event(
        &self,
        imei: &Imei,
        device_model: &str,
        content_id: &ContentId,
    ) -> Result<TransactionId, LedgerError>;

    /// `recipient` of `None` lets the ledger mint to its own issuing account.
    fn mint(
        &self,
        recipient: Option<&str>,
        content_id: &ContentId,
    ) -> Result<TransactionId, LedgerError>;
}

/// Outcome of the two ledger phases. Phase one is `None` when it was skipped.
#[derive(Debug)]
pub struct AnchorAttempt {
    pub device_event: Option<Result<TransactionId, LedgerError>>,
    pub mint: Result<TransactionId, LedgerError>,
}

impl AnchorAttempt {
    /// Phase one failures are absorbed here; only a failed mint is an error.
    pub fn into_receipt(self, content_id: ContentId) -> Result<AnchorReceipt, LedgerError> {
        let device_event_transaction_id = match self.device_event {
            Some(Ok(tx)) => Some(tx),
            Some(Err(err)) => {
                tracing::warn!(
                    content_id = %content_id,
                    error = %err,
                    "device event logging failed; continuing with mint"
                );
                None
            }
            None => None,
        };
        let transaction_id = self.mint?;
        Ok(AnchorReceipt {
            content_id,
            transaction_id,
            device_logged: device_event_transaction_id.is_some(),
            device_event_transaction_id,
        })
    }
}

pub fn anchor_content(
    ledger: &dyn AnchorLedger,
    recipient: Option<&str>,
    imei: &Imei,
    device_model: &str,
    content_id: &ContentId,
) -> AnchorAttempt {
    let device_event = if ledger.supports_device_event_log() {
        Some(ledger.log_device_event(imei, device_model, content_id))
    } else {
        tracing::warn!(imei = %imei, "ledger has no device event capability; skipping");
        None
    };
    AnchorAttempt {
        device_event,
        mint: ledger.mint(recipient, content_id),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayTxResponse {
    transaction_hash: String,
}

/// Ledger client for a transaction relay that holds the issuing wallet and
/// exposes `POST /v1/device-events` and `POST /v1/mint`.
#[derive(Debug, Clone)]
pub struct RelayAnchorLedger {
    agent: ureq::Agent,
    endpoint: Url,
    token: Option<String>,
}

impl RelayAnchorLedger {
    pub fn new(http: &ProviderHttpConfig, endpoint: Url, token: Option<String>) -> Self {
        Self {
            agent: http.build_agent(),
            endpoint,
            token,
        }
    }

    pub fn from_env(http: &ProviderHttpConfig, vault: &DeviceVault) -> Option<Self> {
        let endpoint = endpoint_from_env("CERTIWIPE_LEDGER_RELAY_ENDPOINT")?;
        let token = resolve_provider_secret(ProviderSecretId::LedgerRelayToken, vault);
        Some(Self::new(http, endpoint, token))
    }

    fn post(&self, path: &str, body: serde_json::Value) -> Result<TransactionId, ureq::Error> {
        let mut request = self.agent.post(&join_endpoint(&self.endpoint, path));
        if let Some(token) = &self.token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        let parsed: RelayTxResponse = request.send_json(body)?.into_json()?;
        TransactionId::new(parsed.transaction_hash).map_err(|e| {
            ureq::Error::from(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
        })
    }
}

impl AnchorLedger for RelayAnchorLedger {
    fn log_device_event(
        &self,
        imei: &Imei,
        device_model: &str,
        content_id: &ContentId,
    ) -> Result<TransactionId, LedgerError> {
        self.post(
            "v1/device-events",
            json!({
                "imei": imei.as_str(),
                "deviceModel": device_model,
                "contentId": content_id.as_str(),
            }),
        )
        .map_err(|e| match e {
            ureq::Error::Status(404 | 501, _) => LedgerError::CapabilityUnsupported,
            other => map_relay_error(other),
        })
    }

    fn mint(
        &self,
        recipient: Option<&str>,
        content_id: &ContentId,
    ) -> Result<TransactionId, LedgerError> {
        self.post(
            "v1/mint",
            json!({
                "recipient": recipient,
                "contentId": content_id.as_str(),
            }),
        )
        .map_err(map_relay_error)
    }
}

fn map_relay_error(err: ureq::Error) -> LedgerError {
    match err {
        ureq::Error::Status(status, response) if (400..500).contains(&status) => {
            let reason = response
                .into_string()
                .ok()
                .map(|s| s.chars().take(200).collect::<String>())
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| format!("status {status}"));
            LedgerError::Rejected(reason)
        }
        other => LedgerError::Unavailable(provider_error_from_ureq("ledger_relay", other)),
    }
}

/// Mint recipient from `CERTIWIPE_LEDGER_RECIPIENT`, if set.
pub fn recipient_from_env() -> Option<String> {
    env_string("CERTIWIPE_LEDGER_RECIPIENT")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    DeviceEvent {
        tx: TransactionId,
        imei: Imei,
        device_model: String,
        content_id: ContentId,
    },
    Mint {
        tx: TransactionId,
        recipient: Option<String>,
        content_id: ContentId,
    },
}

/// Loopback ledger with deterministic transaction hashes.
#[derive(Debug)]
pub struct InMemoryAnchorLedger {
    device_event_log: bool,
    entries: Mutex<Vec<LedgerEntry>>,
}

impl Default for InMemoryAnchorLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAnchorLedger {
    pub fn new() -> Self {
        Self {
            device_event_log: true,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// A ledger whose device-event call always reports `CapabilityUnsupported`.
    pub fn without_device_event_log() -> Self {
        Self {
            device_event_log: false,
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn append(
        &self,
        make: impl FnOnce(TransactionId) -> LedgerEntry,
        seed: &str,
    ) -> Result<TransactionId, LedgerError> {
        let mut entries = self.entries.lock().map_err(|_| {
            LedgerError::Unavailable(ProviderCallError::new("memory_ledger", "lock_poisoned", None))
        })?;
        let digest = sha256(format!("{}|{seed}", entries.len()).as_bytes());
        let tx = TransactionId::new(format!("0x{}", hex::encode(digest)))
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        entries.push(make(tx.clone()));
        Ok(tx)
    }
}

impl AnchorLedger for InMemoryAnchorLedger {
    fn log_device_event(
        &self,
        imei: &Imei,
        device_model: &str,
        content_id: &ContentId,
    ) -> Result<TransactionId, LedgerError> {
        if !self.device_event_log {
            return Err(LedgerError::CapabilityUnsupported);
        }
        self.append(
            |tx| LedgerEntry::DeviceEvent {
                tx,
                imei: imei.clone(),
                device_model: device_model.to_string(),
                content_id: content_id.clone(),
            },
            &format!("device|{imei}|{content_id}"),
        )
    }

    fn mint(
        &self,
        recipient: Option<&str>,
        content_id: &ContentId,
    ) -> Result<TransactionId, LedgerError> {
        self.append(
            |tx| LedgerEntry::Mint {
                tx,
                recipient: recipient.map(str::to_string),
                content_id: content_id.clone(),
            },
            &format!("mint|{}|{content_id}", recipient.unwrap_or("")),
        )
    }
}
