#![forbid(unsafe_code)]

use std::sync::Arc;

use certiwipe_contracts::anchor::AnchorReceipt;
use certiwipe_contracts::certificate::{
    imei_from_raw_payload, CertificateId, CertificatePayload, CertificateRecord, ContentId,
    TransactionId, VerificationSummary, CERTIFICATE_ID_FIELD, SIGNATURE_FIELD,
};
use certiwipe_contracts::device::{DeviceAuditSummary, ErasureEvent};
use certiwipe_contracts::{ContractViolation, UnixTimeMs};
use certiwipe_engines::anchor_ledger::{anchor_content, AnchorLedger, LedgerError};
use certiwipe_engines::artifact::{ArtifactError, ArtifactRenderer};
use certiwipe_engines::canonical::encode_stored_artifact;
use certiwipe_engines::content_store::{ContentStore, ContentStoreError};
use certiwipe_engines::notify::{
    notify_best_effort, CertificateNotification, NotificationOutcome, Notifier,
};
use certiwipe_engines::signature::{CertificateSigner, SigningError};
use certiwipe_engines::summary::verification_summary;
use certiwipe_storage::repo::{CertificateRepo, DeviceAuditRepo};
use certiwipe_storage::StorageError;
use rand::Rng;
use serde::Serialize;
use serde_json::{Map, Value};

pub const NOTIFY_EMAIL_FIELD: &str = "userEmail";
const ID_SUFFIX_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ID_SUFFIX_LEN: usize = 4;
const ID_ATTEMPTS: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum IssuanceError {
    #[error("invalid certificate request: {0}")]
    Validation(#[from] ContractViolation),
    #[error("certificate signing failed: {0}")]
    Signing(#[from] SigningError),
    #[error("certificate rendering failed: {0}")]
    Artifact(#[from] ArtifactError),
    #[error("storing {artifact} artifact failed: {source}")]
    Storage {
        artifact: &'static str,
        source: ContentStoreError,
    },
    #[error("certificate id allocation failed: {0}")]
    IdAllocation(StorageError),
    #[error("anchoring failed: {0}")]
    Anchor(#[from] LedgerError),
    #[error("device audit append failed: {0}")]
    Audit(StorageError),
    #[error("persisting certificate {certificate_id} (tx {transaction_id}) failed: {source}")]
    Persist {
        certificate_id: CertificateId,
        transaction_id: TransactionId,
        source: StorageError,
    },
}

impl IssuanceError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Signing(_) => "signing",
            Self::Artifact(_) => "artifact",
            Self::Storage { .. } => "storage",
            Self::IdAllocation(_) => "id_allocation",
            Self::Anchor(_) => "anchor",
            Self::Audit(_) => "audit",
            Self::Persist { .. } => "persist",
        }
    }
}

/// Request body split into the certificate payload and the optional
/// notification address.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuanceRequest {
    pub payload: Map<String, Value>,
    pub notify_email: Option<String>,
}

impl IssuanceRequest {
    pub fn from_body(body: Value) -> Result<Self, IssuanceError> {
        let Value::Object(mut payload) = body else {
            return Err(ContractViolation::InvalidValue {
                field: "body",
                reason: "must be a json object",
            }
            .into());
        };
        let notify_email = payload
            .remove(NOTIFY_EMAIL_FIELD)
            .and_then(|v| v.as_str().map(|s| s.trim().to_string()))
            .filter(|s| !s.is_empty());
        Ok(Self {
            payload,
            notify_email,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceOutcome {
    pub certificate_id: CertificateId,
    pub content_id_json: ContentId,
    pub content_id_pdf: ContentId,
    pub transaction_id: TransactionId,
    pub anchor: AnchorReceipt,
    pub device: DeviceAuditSummary,
    pub summary: VerificationSummary,
    pub notification: NotificationOutcome,
}

/// Everything the orchestrator talks to. Built once at start-up and shared.
#[derive(Clone)]
pub struct IssuanceCollaborators {
    pub signer: Arc<CertificateSigner>,
    pub renderer: Arc<dyn ArtifactRenderer>,
    pub content_store: Arc<dyn ContentStore>,
    pub ledger: Arc<dyn AnchorLedger>,
    pub audit: Arc<dyn DeviceAuditRepo>,
    pub certificates: Arc<dyn CertificateRepo>,
    pub notifier: Arc<dyn Notifier>,
    pub ledger_recipient: Option<String>,
}

#[derive(Clone)]
pub struct IssuanceOrchestrator {
    c: IssuanceCollaborators,
}

impl IssuanceOrchestrator {
    pub fn new(collaborators: IssuanceCollaborators) -> Self {
        Self { c: collaborators }
    }

    /// Runs one issuance. Stages after validation are not rolled back when a
    /// later stage fails.
    pub fn issue(
        &self,
        now: UnixTimeMs,
        request: IssuanceRequest,
    ) -> Result<IssuanceOutcome, IssuanceError> {
        let IssuanceRequest {
            mut payload,
            notify_email,
        } = request;

        let imei = imei_from_raw_payload(&Value::Object(payload.clone()))?;
        let certificate_id = self.fresh_certificate_id(now)?;
        payload.remove(SIGNATURE_FIELD);
        payload.insert(
            CERTIFICATE_ID_FIELD.to_string(),
            Value::String(certificate_id.as_str().to_string()),
        );
        let unsigned = Value::Object(payload);
        let typed = CertificatePayload::from_value(&unsigned)?;

        let signed = self.c.signer.attach_signature(&unsigned)?;
        let summary = verification_summary(&typed);
        let rendered = self.c.renderer.render(&typed, &summary)?;
        tracing::info!(certificate_id = %certificate_id, imei = %imei, "certificate signed and rendered");

        let json_bytes = encode_stored_artifact(&signed).map_err(SigningError::from)?;
        let content_id_json = self
            .c
            .content_store
            .put(
                &format!("{certificate_id}.json"),
                "application/json",
                &json_bytes,
            )
            .map_err(|source| IssuanceError::Storage {
                artifact: "json",
                source,
            })?;
        let content_id_pdf = self
            .c
            .content_store
            .put(
                &format!("{certificate_id}.{}", rendered.extension),
                rendered.content_type,
                &rendered.bytes,
            )
            .map_err(|source| IssuanceError::Storage {
                artifact: "pdf",
                source,
            })?;
        tracing::info!(
            certificate_id = %certificate_id,
            content_id_json = %content_id_json,
            content_id_pdf = %content_id_pdf,
            "certificate artifacts stored"
        );

        let anchor = anchor_content(
            self.c.ledger.as_ref(),
            self.c.ledger_recipient.as_deref(),
            &imei,
            &typed.device_info.model,
            &content_id_json,
        )
        .into_receipt(content_id_json.clone())
        .map_err(|err| {
            tracing::error!(certificate_id = %certificate_id, error = %err, "anchor mint failed");
            err
        })?;
        let transaction_id = anchor.transaction_id.clone();
        tracing::info!(
            certificate_id = %certificate_id,
            transaction_id = %transaction_id,
            device_logged = anchor.device_logged,
            "certificate anchored"
        );

        let event = ErasureEvent {
            certificate_id: certificate_id.clone(),
            timestamp: now,
            method: typed.wipe_details.method.clone(),
            compliance: typed.wipe_details.compliance.clone(),
            passes: typed.wipe_details.passes,
            duration_seconds: typed.wipe_details.duration_seconds,
            transaction_id: transaction_id.clone(),
            verified: true,
        };
        let device = self
            .c
            .audit
            .record_erasure_row(
                now,
                &imei,
                &typed.device_info.model,
                &typed.device_info.serial,
                event,
            )
            .map_err(|err| {
                tracing::error!(
                    certificate_id = %certificate_id,
                    transaction_id = %transaction_id,
                    imei = %imei,
                    error = %err,
                    "device audit append failed after anchoring"
                );
                IssuanceError::Audit(err)
            })?;

        let record = CertificateRecord {
            certificate_id: certificate_id.clone(),
            content_id_json: content_id_json.clone(),
            content_id_pdf: content_id_pdf.clone(),
            transaction_id: transaction_id.clone(),
            device_model: typed.device_info.model.clone(),
            device_imei: imei.clone(),
            device_serial: typed.device_info.serial.clone(),
            timestamp: now,
        };
        if let Err(source) = self.c.certificates.insert_certificate_row(record) {
            tracing::error!(
                certificate_id = %certificate_id,
                transaction_id = %transaction_id,
                content_id_json = %content_id_json,
                content_id_pdf = %content_id_pdf,
                error = %source,
                "certificate record not persisted; ledger anchor and audit entry exist"
            );
            return Err(IssuanceError::Persist {
                certificate_id,
                transaction_id,
                source,
            });
        }

        let notification = match notify_email.as_deref() {
            Some(recipient) => notify_best_effort(
                self.c.notifier.as_ref(),
                &CertificateNotification {
                    recipient,
                    certificate_id: &certificate_id,
                    device_model: &typed.device_info.model,
                    content_id_json: &content_id_json,
                    content_id_pdf: &content_id_pdf,
                    pdf: &rendered.bytes,
                },
            ),
            None => NotificationOutcome::not_requested(),
        };

        tracing::info!(
            certificate_id = %certificate_id,
            imei = %imei,
            erasure_count = device.erasure_count(),
            "certificate issued"
        );
        Ok(IssuanceOutcome {
            certificate_id,
            content_id_json,
            content_id_pdf,
            transaction_id,
            anchor,
            device: device.audit_summary(),
            summary,
            notification,
        })
    }

    fn fresh_certificate_id(&self, now: UnixTimeMs) -> Result<CertificateId, IssuanceError> {
        let mut rng = rand::thread_rng();
        let mut last = None;
        for _ in 0..ID_ATTEMPTS {
            let id = generate_certificate_id(now, &mut rng)?;
            match self.c.certificates.certificate_row(&id) {
                Ok(None) => return Ok(id),
                Ok(Some(_)) => last = Some(id),
                Err(err) => return Err(IssuanceError::IdAllocation(err)),
            }
        }
        Err(IssuanceError::IdAllocation(StorageError::DuplicateKey {
            table: "certificates",
            key: last.map(|id| id.as_str().to_string()).unwrap_or_default(),
        }))
    }
}

/// `CERT-<unix millis>-<4 base36 uppercase>`.
pub fn generate_certificate_id(
    now: UnixTimeMs,
    rng: &mut impl Rng,
) -> Result<CertificateId, ContractViolation> {
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_SUFFIX_ALPHABET[rng.gen_range(0..ID_SUFFIX_ALPHABET.len())] as char)
        .collect();
    CertificateId::new(format!("CERT-{}-{suffix}", now.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use certiwipe_contracts::device::Imei;
    use certiwipe_engines::anchor_ledger::InMemoryAnchorLedger;
    use certiwipe_engines::artifact::{PdfCertificateRenderer, RenderedArtifact};
    use certiwipe_engines::content_store::InMemoryContentStore;
    use certiwipe_engines::notify::{DisabledNotifier, NotifyError};
    use certiwipe_engines::provider_http::ProviderCallError;
    use certiwipe_engines::signature::{parse_public_key, verify_certificate};
    use certiwipe_storage::CertiwipeStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingStore {
        inner: InMemoryContentStore,
        puts: AtomicUsize,
    }

    impl ContentStore for CountingStore {
        fn put(
            &self,
            name: &str,
            content_type: &str,
            bytes: &[u8],
        ) -> Result<ContentId, ContentStoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.inner.put(name, content_type, bytes)
        }

        fn get(&self, content_id: &ContentId) -> Result<Vec<u8>, ContentStoreError> {
            self.inner.get(content_id)
        }
    }

    struct PdfStoreDown(InMemoryContentStore);

    impl ContentStore for PdfStoreDown {
        fn put(
            &self,
            name: &str,
            content_type: &str,
            bytes: &[u8],
        ) -> Result<ContentId, ContentStoreError> {
            if name.ends_with(".pdf") {
                return Err(ContentStoreError::Unavailable(ProviderCallError::new(
                    "pinata", "timeout", None,
                )));
            }
            self.0.put(name, content_type, bytes)
        }

        fn get(&self, content_id: &ContentId) -> Result<Vec<u8>, ContentStoreError> {
            self.0.get(content_id)
        }
    }

    struct CountingRenderer(AtomicUsize);

    impl ArtifactRenderer for CountingRenderer {
        fn render(
            &self,
            _payload: &CertificatePayload,
            _summary: &VerificationSummary,
        ) -> Result<RenderedArtifact, ArtifactError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RenderedArtifact {
                content_type: "application/pdf",
                extension: "pdf",
                bytes: b"%PDF-test".to_vec(),
            })
        }
    }

    struct CertificatesDown;

    impl CertificateRepo for CertificatesDown {
        fn insert_certificate_row(&self, _record: CertificateRecord) -> Result<(), StorageError> {
            Err(StorageError::LockPoisoned {
                table: "certificates",
            })
        }

        fn certificate_row(
            &self,
            _certificate_id: &CertificateId,
        ) -> Result<Option<CertificateRecord>, StorageError> {
            Err(StorageError::LockPoisoned {
                table: "certificates",
            })
        }

        fn certificate_rows(&self) -> Result<Vec<CertificateRecord>, StorageError> {
            Ok(Vec::new())
        }
    }

    struct RecordingNotifier;

    impl Notifier for RecordingNotifier {
        fn notify(&self, _n: &CertificateNotification<'_>) -> Result<(), NotifyError> {
            Err(NotifyError::Delivery(ProviderCallError::new(
                "notify",
                "connection",
                None,
            )))
        }
    }

    struct Harness {
        orchestrator: IssuanceOrchestrator,
        signer: Arc<CertificateSigner>,
        store: Arc<CertiwipeStore>,
        content: Arc<CountingStore>,
        ledger: Arc<InMemoryAnchorLedger>,
        renders: Arc<CountingRenderer>,
    }

    fn harness(ledger: InMemoryAnchorLedger) -> Harness {
        let signer = Arc::new(CertificateSigner::generate());
        let store = Arc::new(CertiwipeStore::new_in_memory());
        let content = Arc::new(CountingStore::default());
        let ledger = Arc::new(ledger);
        let renders = Arc::new(CountingRenderer(AtomicUsize::new(0)));
        let orchestrator = IssuanceOrchestrator::new(IssuanceCollaborators {
            signer: signer.clone(),
            renderer: renders.clone(),
            content_store: content.clone(),
            ledger: ledger.clone(),
            audit: store.clone(),
            certificates: store.clone(),
            notifier: Arc::new(DisabledNotifier),
            ledger_recipient: None,
        });
        Harness {
            orchestrator,
            signer,
            store,
            content,
            ledger,
            renders,
        }
    }

    fn body(imei: Option<&str>, method: &str, passes: u32) -> Value {
        let mut device_info = json!({"model": "Galaxy S21", "serial": "R58N", "size_bytes": 128000000000u64});
        if let Some(imei) = imei {
            device_info["imei"] = json!(imei);
        }
        json!({
            "certificate_id": "caller-supplied",
            "signature": "deadbeef",
            "device_info": device_info,
            "wipe_details": {
                "method": method, "compliance": "NIST SP 800-88 Rev.1", "passes": passes,
                "duration_seconds": 1200, "hpa_removed": false, "end_time": "2026-10-01T09:00:00Z"
            },
            "verification": {"result": "PASSED"}
        })
    }

    fn request(body: Value) -> IssuanceRequest {
        IssuanceRequest::from_body(body).unwrap()
    }

    #[test]
    fn at_issuance_01_missing_imei_rejected_before_any_external_call() {
        let h = harness(InMemoryAnchorLedger::new());
        let err = h
            .orchestrator
            .issue(UnixTimeMs(1_000), request(body(None, "NIST-800-88", 1)))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(h.content.puts.load(Ordering::SeqCst), 0);
        assert_eq!(h.renders.0.load(Ordering::SeqCst), 0);
        assert!(h.ledger.entries().is_empty());
        assert!(h.store.device_rows().unwrap().is_empty());
        assert!(h.store.certificate_rows().unwrap().is_empty());
    }

    #[test]
    fn at_issuance_02_two_issuances_same_imei_build_ordered_history() {
        let h = harness(InMemoryAnchorLedger::new());
        let imei = "123456789012345";
        let first = h
            .orchestrator
            .issue(
                UnixTimeMs(1_000),
                request(body(Some(imei), "NIST-800-88, 1 pass", 1)),
            )
            .unwrap();
        let second = h
            .orchestrator
            .issue(
                UnixTimeMs(2_000),
                request(body(Some(imei), "DoD-5220, 3 passes", 3)),
            )
            .unwrap();

        assert_eq!(second.device.erasure_count, 2);
        assert_eq!(second.device.first_seen, UnixTimeMs(1_000));
        assert_eq!(second.device.last_erasure, UnixTimeMs(2_000));
        let rec = h
            .store
            .device_row(&Imei::new(imei).unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(rec.erasure_history()[0].certificate_id, first.certificate_id);
        assert_eq!(rec.erasure_history()[1].method, "DoD-5220, 3 passes");
        assert_eq!(rec.status().as_str(), "active");
        assert_eq!(h.store.certificate_rows().unwrap().len(), 2);
    }

    #[test]
    fn at_issuance_03_stored_artifact_verifies_with_issuer_key() {
        let h = harness(InMemoryAnchorLedger::new());
        let out = h
            .orchestrator
            .issue(
                UnixTimeMs(1_700_000_000_000),
                request(body(Some("123456789012345"), "NIST-800-88", 1)),
            )
            .unwrap();
        assert!(out.certificate_id.as_str().starts_with("CERT-1700000000000-"));

        let stored: Value =
            serde_json::from_slice(&h.content.get(&out.content_id_json).unwrap()).unwrap();
        assert_ne!(stored["signature"], json!("deadbeef"));
        assert_eq!(stored["certificate_id"], json!(out.certificate_id.as_str()));

        let key = parse_public_key(&h.signer.public_key_pem().unwrap()).unwrap();
        assert!(verify_certificate(&stored, &key).unwrap().verified);
    }

    #[test]
    fn at_issuance_04_unsupported_device_log_still_issues() {
        let h = harness(InMemoryAnchorLedger::without_device_event_log());
        let out = h
            .orchestrator
            .issue(
                UnixTimeMs(5_000),
                request(body(Some("490154203237518"), "NIST-800-88", 1)),
            )
            .unwrap();
        assert!(!out.anchor.device_logged);
        assert_eq!(out.device.erasure_count, 1);
        assert!(h
            .store
            .certificate_row(&out.certificate_id)
            .unwrap()
            .is_some());
        assert_eq!(h.ledger.entries().len(), 1);
    }

    #[test]
    fn at_issuance_05_pdf_upload_failure_anchors_nothing() {
        let store = Arc::new(CertiwipeStore::new_in_memory());
        let ledger = Arc::new(InMemoryAnchorLedger::new());
        let orchestrator = IssuanceOrchestrator::new(IssuanceCollaborators {
            signer: Arc::new(CertificateSigner::generate()),
            renderer: Arc::new(PdfCertificateRenderer),
            content_store: Arc::new(PdfStoreDown(InMemoryContentStore::new())),
            ledger: ledger.clone(),
            audit: store.clone(),
            certificates: store.clone(),
            notifier: Arc::new(DisabledNotifier),
            ledger_recipient: None,
        });
        let err = orchestrator
            .issue(
                UnixTimeMs(1),
                request(body(Some("123456789012345"), "NIST-800-88", 1)),
            )
            .unwrap_err();
        assert!(matches!(err, IssuanceError::Storage { artifact: "pdf", .. }));
        assert!(ledger.entries().is_empty());
        assert!(store.device_rows().unwrap().is_empty());
    }

    #[test]
    fn at_issuance_06_notification_failure_is_advisory() {
        let store = Arc::new(CertiwipeStore::new_in_memory());
        let orchestrator = IssuanceOrchestrator::new(IssuanceCollaborators {
            signer: Arc::new(CertificateSigner::generate()),
            renderer: Arc::new(PdfCertificateRenderer),
            content_store: Arc::new(InMemoryContentStore::new()),
            ledger: Arc::new(InMemoryAnchorLedger::new()),
            audit: store.clone(),
            certificates: store.clone(),
            notifier: Arc::new(RecordingNotifier),
            ledger_recipient: Some("0x1111111111111111111111111111111111111111".to_string()),
        });
        let mut b = body(Some("123456789012345"), "NIST-800-88", 1);
        b["userEmail"] = json!(" owner@example.com ");
        let req = request(b);
        assert_eq!(req.notify_email.as_deref(), Some("owner@example.com"));
        assert!(!req.payload.contains_key("userEmail"));

        let out = orchestrator.issue(UnixTimeMs(9), req).unwrap();
        assert!(out.notification.attempted);
        assert!(!out.notification.delivered);
        assert_eq!(store.certificate_rows().unwrap().len(), 1);
    }

    #[test]
    fn at_issuance_07_concurrent_issuance_same_device() {
        let h = harness(InMemoryAnchorLedger::new());
        std::thread::scope(|scope| {
            for t in 0..4u64 {
                let h = &h;
                scope.spawn(move || {
                    for i in 0..5u64 {
                        h.orchestrator
                            .issue(
                                UnixTimeMs(10_000 + t * 100 + i),
                                request(body(Some("123456789012345"), "NIST-800-88", 1)),
                            )
                            .unwrap();
                    }
                });
            }
        });
        let rec = h
            .store
            .device_row(&Imei::new("123456789012345").unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(rec.erasure_count(), 20);
        assert_eq!(rec.erasure_history().len(), 20);
        assert_eq!(h.store.certificate_rows().unwrap().len(), 20);
        assert!(rec
            .erasure_history()
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(rec.last_erasure() >= rec.first_seen());
    }

    #[test]
    fn at_issuance_08_certificate_id_shape() {
        let mut rng = rand::thread_rng();
        let id = generate_certificate_id(UnixTimeMs(1_700_000_000_123), &mut rng).unwrap();
        let parts: Vec<&str> = id.as_str().split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "CERT");
        assert_eq!(parts[1], "1700000000123");
        assert_eq!(parts[2].len(), 4);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    }

    #[test]
    fn at_issuance_09_non_object_body_is_validation_error() {
        assert!(IssuanceRequest::from_body(json!([1, 2]))
            .unwrap_err()
            .is_validation());
    }

    #[test]
    fn at_issuance_10_id_lookup_failure_is_reported_before_anchoring() {
        let store = Arc::new(CertiwipeStore::new_in_memory());
        let content = Arc::new(CountingStore::default());
        let ledger = Arc::new(InMemoryAnchorLedger::new());
        let orchestrator = IssuanceOrchestrator::new(IssuanceCollaborators {
            signer: Arc::new(CertificateSigner::generate()),
            renderer: Arc::new(PdfCertificateRenderer),
            content_store: content.clone(),
            ledger: ledger.clone(),
            audit: store.clone(),
            certificates: Arc::new(CertificatesDown),
            notifier: Arc::new(DisabledNotifier),
            ledger_recipient: None,
        });
        let err = orchestrator
            .issue(
                UnixTimeMs(1_000),
                request(body(Some("123456789012345"), "NIST-800-88", 1)),
            )
            .unwrap_err();
        assert!(matches!(err, IssuanceError::IdAllocation(_)));
        assert_eq!(err.stage(), "id_allocation");
        assert_eq!(content.puts.load(Ordering::SeqCst), 0);
        assert!(ledger.entries().is_empty());
        assert!(store.device_rows().unwrap().is_empty());
    }
}
