#![forbid(unsafe_code)]

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use certiwipe_contracts::certificate::{CertificateId, CertificateRecord, ContentId};
use certiwipe_contracts::device::{DeviceStatus, ErasureEvent, Imei};
use certiwipe_contracts::UnixTimeMs;
use certiwipe_engines::anchor_ledger::{
    recipient_from_env, AnchorLedger, InMemoryAnchorLedger, RelayAnchorLedger,
};
use certiwipe_engines::artifact::PdfCertificateRenderer;
use certiwipe_engines::content_store::{ContentStore, InMemoryContentStore, PinataContentStore};
use certiwipe_engines::device_vault::DeviceVault;
use certiwipe_engines::notify::{DisabledNotifier, Notifier, WebhookNotifier};
use certiwipe_engines::provider_http::ProviderHttpConfig;
use certiwipe_engines::signature::{parse_public_key, CertificateSigner, VerifyingKey};
use certiwipe_os::device_query::{
    DeviceDetail, DevicePage, DeviceQueryService, DeviceStatsSummary, ListDevicesQuery, QueryError,
};
use certiwipe_os::issuance::{
    IssuanceCollaborators, IssuanceError, IssuanceOrchestrator, IssuanceOutcome, IssuanceRequest,
};
use certiwipe_os::verification::{
    verify_issued_certificate, verify_payload_with_key_text, verify_stored_certificate,
    VerificationReport, VerificationStatus,
};
use certiwipe_storage::repo::{CertificateRepo, DeviceAuditRepo};
use certiwipe_storage::{CertiwipeStore, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const JOURNAL_SCHEMA_VERSION: u8 = 1;
pub const ISSUER_SIGNATURE_SCHEME: &str = "ECDSA-P256-SHA256";

/// Errors surfaced by the adapter, already classified for transport mapping.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("an internal server error occurred")]
    Internal,
}

impl AdapterError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::NotFound(_) => 404,
            Self::Internal => 500,
        }
    }
}

impl From<IssuanceError> for AdapterError {
    fn from(err: IssuanceError) -> Self {
        if err.is_validation() {
            return Self::BadRequest(err.to_string());
        }
        tracing::error!(stage = err.stage(), error = %err, "certificate issuance failed");
        Self::Internal
    }
}

impl From<QueryError> for AdapterError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::NotFound { what, .. } => Self::NotFound(format!("{what} not found")),
            QueryError::Storage(storage) => {
                tracing::error!(error = %storage, "device query failed");
                Self::Internal
            }
            client => Self::BadRequest(client.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub content_store: String,
    pub ledger: String,
    pub certificates: usize,
    pub devices: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCertificateRequest {
    #[serde(default)]
    pub content_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default)]
    pub public_key_pem: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerKeyResponse {
    pub scheme: String,
    pub signature_encoding: String,
    pub public_key_pem: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum AdapterJournalEvent {
    CertificateIssued {
        record: CertificateRecord,
        event: ErasureEvent,
        /// Position of `event` in the device history when journaled.
        #[serde(default)]
        sequence: u64,
    },
    DeviceStatusChanged {
        imei: Imei,
        status: DeviceStatus,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AdapterJournalEntry {
    schema_version: u8,
    event: AdapterJournalEvent,
}

impl AdapterJournalEntry {
    fn v1(event: AdapterJournalEvent) -> Self {
        Self {
            schema_version: JOURNAL_SCHEMA_VERSION,
            event,
        }
    }
}

#[derive(Debug, Clone)]
struct AdapterPersistenceConfig {
    journal_path: PathBuf,
}

/// Wiring for the HTTP surface. Safe to share behind an `Arc`: every
/// collaborator synchronizes internally.
pub struct AdapterRuntime {
    store: Arc<CertiwipeStore>,
    issuance: IssuanceOrchestrator,
    queries: DeviceQueryService,
    content_store: Arc<dyn ContentStore>,
    issuer_key: VerifyingKey,
    issuer_public_key_pem: String,
    content_store_mode: &'static str,
    ledger_mode: &'static str,
    persistence: Option<AdapterPersistenceConfig>,
    journal_lock: Mutex<()>,
}

/// Provider clients chosen at start-up.
pub struct AdapterProviders {
    pub content_store: Arc<dyn ContentStore>,
    pub content_store_mode: &'static str,
    pub ledger: Arc<dyn AnchorLedger>,
    pub ledger_mode: &'static str,
    pub notifier: Arc<dyn Notifier>,
    pub ledger_recipient: Option<String>,
}

impl AdapterProviders {
    /// All loopback: in-memory store and ledger, no notifications.
    pub fn loopback() -> Self {
        Self {
            content_store: Arc::new(InMemoryContentStore::new()),
            content_store_mode: "loopback",
            ledger: Arc::new(InMemoryAnchorLedger::new()),
            ledger_mode: "loopback",
            notifier: Arc::new(DisabledNotifier),
            ledger_recipient: None,
        }
    }

    pub fn from_env() -> Self {
        let http = ProviderHttpConfig::from_env();
        let vault = DeviceVault::default_local();
        let mut providers = Self::loopback();

        match PinataContentStore::from_env(&http, &vault) {
            Some(store) => {
                providers.content_store = Arc::new(store);
                providers.content_store_mode = "pinata";
            }
            None => tracing::warn!(
                "pinata credentials not configured; using loopback content store"
            ),
        }
        match RelayAnchorLedger::from_env(&http, &vault) {
            Some(ledger) => {
                providers.ledger = Arc::new(ledger);
                providers.ledger_mode = "relay";
            }
            None => tracing::warn!("CERTIWIPE_LEDGER_RELAY_ENDPOINT not set; using loopback ledger"),
        }
        match WebhookNotifier::from_env(&http, &vault) {
            Some(notifier) => providers.notifier = Arc::new(notifier),
            None => tracing::info!("CERTIWIPE_NOTIFY_ENDPOINT not set; notifications disabled"),
        }
        providers.ledger_recipient = recipient_from_env();
        providers
    }
}

impl AdapterRuntime {
    pub fn new(signer: CertificateSigner, providers: AdapterProviders) -> Result<Self, String> {
        let store = Arc::new(CertiwipeStore::new_in_memory());
        let issuer_key = signer.verifying_key();
        let issuer_public_key_pem = signer
            .public_key_pem()
            .map_err(|err| format!("failed to encode issuer public key: {err}"))?;
        let issuance = IssuanceOrchestrator::new(IssuanceCollaborators {
            signer: Arc::new(signer),
            renderer: Arc::new(PdfCertificateRenderer),
            content_store: providers.content_store.clone(),
            ledger: providers.ledger,
            audit: store.clone(),
            certificates: store.clone(),
            notifier: providers.notifier,
            ledger_recipient: providers.ledger_recipient,
        });
        let queries = DeviceQueryService::new(store.clone(), store.clone());
        Ok(Self {
            store,
            issuance,
            queries,
            content_store: providers.content_store,
            issuer_key,
            issuer_public_key_pem,
            content_store_mode: providers.content_store_mode,
            ledger_mode: providers.ledger_mode,
            persistence: None,
            journal_lock: Mutex::new(()),
        })
    }

    pub fn new_with_persistence(
        signer: CertificateSigner,
        providers: AdapterProviders,
        journal_path: PathBuf,
    ) -> Result<Self, String> {
        let mut runtime = Self::new(signer, providers)?;
        runtime.persistence = Some(AdapterPersistenceConfig { journal_path });
        runtime.ensure_persistence_ready()?;
        runtime.replay_journal_into_store()?;
        Ok(runtime)
    }

    pub fn default_from_env() -> Result<Self, String> {
        let key_path = env_path("CERTIWIPE_SIGNING_KEY_PATH")
            .unwrap_or_else(|| certiwipe_home().join("issuer_key.pem"));
        let signer = CertificateSigner::load_or_create(&key_path).map_err(|err| {
            format!(
                "failed to load issuer signing key '{}': {}",
                key_path.display(),
                err
            )
        })?;
        let journal_path = env_path("CERTIWIPE_ADAPTER_STORE_PATH")
            .unwrap_or_else(|| certiwipe_home().join("adapter/issuance_journal.jsonl"));
        Self::new_with_persistence(signer, AdapterProviders::from_env(), journal_path)
    }

    pub fn health_report(&self) -> Result<AdapterHealthResponse, AdapterError> {
        let certificates = self.store.certificate_rows().map_err(internal)?.len();
        let devices = self.store.device_rows().map_err(internal)?.len();
        Ok(AdapterHealthResponse {
            status: "ok".to_string(),
            content_store: self.content_store_mode.to_string(),
            ledger: self.ledger_mode.to_string(),
            certificates,
            devices,
        })
    }

    pub fn process_certificate(&self, body: Value) -> Result<IssuanceOutcome, AdapterError> {
        let request = IssuanceRequest::from_body(body)?;
        let outcome = self.issuance.issue(UnixTimeMs::now(), request)?;
        self.journal_issuance(&outcome.certificate_id);
        Ok(outcome)
    }

    pub fn certificate(&self, certificate_id: &str) -> Result<CertificateRecord, AdapterError> {
        Ok(self.queries.certificate(certificate_id)?)
    }

    pub fn verify_issued(&self, certificate_id: &str) -> Result<VerificationReport, AdapterError> {
        let id = CertificateId::new(certificate_id)
            .map_err(|err| AdapterError::BadRequest(err.to_string()))?;
        Ok(verify_issued_certificate(
            self.store.as_ref(),
            self.content_store.as_ref(),
            &id,
            &self.issuer_key,
        )?)
    }

    /// Third-party verification of either a stored artifact or an inline
    /// payload, against the issuer key unless another key is supplied.
    pub fn verify_submitted(
        &self,
        request: VerifyCertificateRequest,
    ) -> Result<VerificationReport, AdapterError> {
        let public_key = request
            .public_key_pem
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| self.issuer_public_key_pem.clone());
        if let Some(payload) = request.payload {
            return Ok(verify_payload_with_key_text(&payload, &public_key));
        }
        let raw_id = request
            .content_id
            .ok_or_else(|| AdapterError::BadRequest("content_id or payload is required".into()))?;
        let content_id =
            ContentId::new(raw_id).map_err(|err| AdapterError::BadRequest(err.to_string()))?;
        let key = match parse_public_key(&public_key) {
            Ok(key) => key,
            Err(err) => {
                return Ok(VerificationReport::failed(
                    VerificationStatus::Unverifiable,
                    err.to_string(),
                ))
            }
        };
        Ok(verify_stored_certificate(
            self.content_store.as_ref(),
            &content_id,
            &key,
        ))
    }

    pub fn device(&self, imei: &str) -> Result<DeviceDetail, AdapterError> {
        Ok(self.queries.device(imei)?)
    }

    pub fn list_devices(&self, query: &ListDevicesQuery) -> Result<DevicePage, AdapterError> {
        Ok(self.queries.list_devices(query)?)
    }

    pub fn device_summary(&self) -> Result<DeviceStatsSummary, AdapterError> {
        Ok(self.queries.summary(UnixTimeMs::now())?)
    }

    /// Store update and journal append share the journal lock, so the
    /// journal sees status changes in the order they were applied.
    pub fn set_device_status(&self, imei: &str, status: &str) -> Result<DeviceDetail, AdapterError> {
        let _guard = self.journal_lock.lock().map_err(|_| {
            tracing::error!("adapter journal lock poisoned");
            AdapterError::Internal
        })?;
        let detail = self.queries.set_status(imei, status)?;
        self.write_journal_entry(AdapterJournalEvent::DeviceStatusChanged {
            imei: detail.imei.clone(),
            status: detail.status,
        })
        .map_err(|err| {
            tracing::error!(imei = %detail.imei, error = %err, "status change not journaled");
            AdapterError::Internal
        })?;
        Ok(detail)
    }

    pub fn issuer_public_key(&self) -> IssuerKeyResponse {
        IssuerKeyResponse {
            scheme: ISSUER_SIGNATURE_SCHEME.to_string(),
            signature_encoding: "hex-der".to_string(),
            public_key_pem: self.issuer_public_key_pem.clone(),
        }
    }

    /// The issuance already committed; a journal failure only costs
    /// durability across restarts, so it is logged rather than returned.
    fn journal_issuance(&self, certificate_id: &CertificateId) {
        let entry = self.issued_journal_event(certificate_id).and_then(|event| {
            self.append_journal_entry(event)
        });
        if let Err(err) = entry {
            tracing::error!(certificate_id = %certificate_id, error = %err, "issuance not journaled");
        }
    }

    fn issued_journal_event(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<AdapterJournalEvent, String> {
        let record = self
            .store
            .certificate_row(certificate_id)
            .map_err(|err| err.to_string())?
            .ok_or_else(|| format!("certificate {certificate_id} missing after issuance"))?;
        let (sequence, event) = self
            .store
            .device_row(&record.device_imei)
            .map_err(|err| err.to_string())?
            .and_then(|device| {
                device
                    .erasure_history()
                    .iter()
                    .enumerate()
                    .find(|(_, e)| &e.certificate_id == certificate_id)
                    .map(|(idx, e)| (idx as u64, e.clone()))
            })
            .ok_or_else(|| format!("erasure event for {certificate_id} missing after issuance"))?;
        Ok(AdapterJournalEvent::CertificateIssued {
            record,
            event,
            sequence,
        })
    }

    fn ensure_persistence_ready(&self) -> Result<(), String> {
        let Some(persistence) = self.persistence.as_ref() else {
            return Ok(());
        };
        let path = &persistence.journal_path;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                format!(
                    "failed to create adapter store directory '{}': {}",
                    parent.display(),
                    err
                )
            })?;
        }
        if !path.exists() {
            File::create(path).map_err(|err| {
                format!(
                    "failed to create adapter store journal '{}': {}",
                    path.display(),
                    err
                )
            })?;
        }
        Ok(())
    }

    fn replay_journal_into_store(&self) -> Result<(), String> {
        let Some(persistence) = self.persistence.as_ref() else {
            return Ok(());
        };
        let path = &persistence.journal_path;
        let file = File::open(path).map_err(|err| {
            format!("failed to open adapter store journal '{}': {}", path.display(), err)
        })?;
        let mut issued = Vec::new();
        let mut status_changes = Vec::new();
        for (line_no, line_result) in BufReader::new(file).lines().enumerate() {
            let line = line_result.map_err(|err| {
                format!(
                    "failed reading adapter store journal '{}' at line {}: {}",
                    path.display(),
                    line_no + 1,
                    err
                )
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let entry: AdapterJournalEntry = serde_json::from_str(&line).map_err(|err| {
                format!(
                    "failed parsing adapter store journal '{}' at line {}: {}",
                    path.display(),
                    line_no + 1,
                    err
                )
            })?;
            if entry.schema_version != JOURNAL_SCHEMA_VERSION {
                return Err(format!(
                    "unsupported adapter store journal schema_version={} at line {}",
                    entry.schema_version,
                    line_no + 1
                ));
            }
            let line_no = line_no + 1;
            match entry.event {
                AdapterJournalEvent::CertificateIssued {
                    record,
                    event,
                    sequence,
                } => issued.push((sequence, line_no, record, event)),
                AdapterJournalEvent::DeviceStatusChanged { imei, status } => {
                    status_changes.push((line_no, imei, status))
                }
            }
        }

        // Issuances for one device may reach the journal out of append order.
        issued.sort_by_key(|(sequence, line_no, _, _)| (*sequence, *line_no));
        let replayed = issued.len();
        for (_, line_no, record, event) in issued {
            self.replay_issuance(record, event)
                .map_err(|err| format!("journal replay failed at line {line_no}: {err}"))?;
        }

        let mut skipped = 0usize;
        for (line_no, imei, status) in status_changes {
            match self.store.set_device_status_row(&imei, status) {
                Ok(_) => {}
                Err(StorageError::NotFound { .. }) => {
                    tracing::warn!(
                        line = line_no,
                        imei = %imei,
                        "journal status change for unknown device skipped"
                    );
                    skipped += 1;
                }
                Err(err) => {
                    return Err(format!("journal replay failed at line {line_no}: {err}"));
                }
            }
        }
        tracing::info!(
            path = %path.display(),
            certificates = replayed,
            skipped_status_changes = skipped,
            "adapter journal replayed"
        );
        Ok(())
    }

    fn replay_issuance(&self, record: CertificateRecord, event: ErasureEvent) -> Result<(), String> {
        self.store
            .record_erasure_row(
                event.timestamp,
                &record.device_imei,
                &record.device_model,
                &record.device_serial,
                event,
            )
            .map_err(|err| err.to_string())?;
        self.store
            .insert_certificate_row(record)
            .map_err(|err| err.to_string())
    }

    fn append_journal_entry(&self, event: AdapterJournalEvent) -> Result<(), String> {
        let _guard = self
            .journal_lock
            .lock()
            .map_err(|_| "adapter journal lock poisoned".to_string())?;
        self.write_journal_entry(event)
    }

    /// Caller holds `journal_lock`.
    fn write_journal_entry(&self, event: AdapterJournalEvent) -> Result<(), String> {
        let Some(persistence) = self.persistence.as_ref() else {
            return Ok(());
        };
        let json = serde_json::to_string(&AdapterJournalEntry::v1(event))
            .map_err(|err| format!("failed to encode adapter journal entry: {err}"))?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&persistence.journal_path)
            .map_err(|err| {
                format!(
                    "failed opening adapter store journal '{}' for append: {}",
                    persistence.journal_path.display(),
                    err
                )
            })?;
        file.write_all(json.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .and_then(|_| file.sync_data())
            .map_err(|err| {
                format!(
                    "failed writing adapter store journal '{}': {}",
                    persistence.journal_path.display(),
                    err
                )
            })
    }
}

fn internal(err: impl std::fmt::Display) -> AdapterError {
    tracing::error!(error = %err, "adapter storage read failed");
    AdapterError::Internal
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn certiwipe_home() -> PathBuf {
    if let Ok(home) = env::var("HOME") {
        let home = home.trim();
        if !home.is_empty() {
            return PathBuf::from(home).join(".certiwipe");
        }
    }
    PathBuf::from(".certiwipe")
}
