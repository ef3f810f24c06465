#![forbid(unsafe_code)]

use certiwipe_contracts::certificate::{
    CertificateId, CertificatePayload, ContentId, VerificationSummary, CERTIFICATE_ID_FIELD,
    SIGNATURE_FIELD,
};
use certiwipe_engines::content_store::{ContentStore, ContentStoreError};
use certiwipe_engines::signature::{
    parse_public_key, verify_certificate, VerificationError, VerifyingKey,
};
use certiwipe_engines::summary::verification_summary;
use certiwipe_storage::repo::CertificateRepo;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device_query::QueryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified,
    Invalid,
    MissingSignature,
    Unverifiable,
}

/// Typed outcome handed to third-party verifiers. Verification problems are
/// reported here, never raised as errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub status: VerificationStatus,
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<VerificationSummary>,
}

impl VerificationReport {
    pub fn failed(status: VerificationStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            verified: false,
            reason: Some(reason.into()),
            certificate_id: None,
            payload: None,
            summary: None,
        }
    }

    fn with_payload(mut self, payload: Value) -> Self {
        self.certificate_id = payload
            .get(CERTIFICATE_ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);
        self.summary = CertificatePayload::from_value(&payload)
            .ok()
            .map(|typed| verification_summary(&typed));
        self.payload = Some(payload);
        self
    }
}

pub fn verify_payload(stored: &Value, key: &VerifyingKey) -> VerificationReport {
    match verify_certificate(stored, key) {
        Ok(check) if check.verified => VerificationReport {
            status: VerificationStatus::Verified,
            verified: true,
            reason: None,
            certificate_id: None,
            payload: None,
            summary: None,
        }
        .with_payload(check.payload),
        Ok(check) => VerificationReport::failed(
            VerificationStatus::Invalid,
            "signature does not match payload",
        )
        .with_payload(check.payload),
        Err(VerificationError::MissingSignature) => VerificationReport::failed(
            VerificationStatus::MissingSignature,
            VerificationError::MissingSignature.to_string(),
        )
        .with_payload(stored.clone()),
        Err(err @ VerificationError::MalformedSignature(_)) => {
            VerificationReport::failed(VerificationStatus::Invalid, err.to_string())
                .with_payload(strip_signature(stored))
        }
        Err(err) => VerificationReport::failed(VerificationStatus::Unverifiable, err.to_string()),
    }
}

/// Same as [`verify_payload`], with the key given as SPKI PEM or hex SEC1.
pub fn verify_payload_with_key_text(stored: &Value, public_key: &str) -> VerificationReport {
    match parse_public_key(public_key) {
        Ok(key) => verify_payload(stored, &key),
        Err(err) => VerificationReport::failed(VerificationStatus::Unverifiable, err.to_string()),
    }
}

/// Fetches the stored JSON artifact and verifies it.
pub fn verify_stored_certificate(
    store: &dyn ContentStore,
    content_id: &ContentId,
    key: &VerifyingKey,
) -> VerificationReport {
    let bytes = match store.get(content_id) {
        Ok(bytes) => bytes,
        Err(err @ ContentStoreError::NotFound(_)) => {
            return VerificationReport::failed(VerificationStatus::Unverifiable, err.to_string())
        }
        Err(err) => {
            tracing::warn!(content_id = %content_id, error = %err, "certificate fetch failed");
            return VerificationReport::failed(VerificationStatus::Unverifiable, err.to_string());
        }
    };
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(stored) => verify_payload(&stored, key),
        Err(_) => VerificationReport::failed(
            VerificationStatus::Unverifiable,
            "stored artifact is not valid json",
        ),
    }
}

/// Looks up an issued certificate and verifies its JSON artifact.
pub fn verify_issued_certificate(
    certificates: &dyn CertificateRepo,
    store: &dyn ContentStore,
    certificate_id: &CertificateId,
    key: &VerifyingKey,
) -> Result<VerificationReport, QueryError> {
    let record = certificates
        .certificate_row(certificate_id)?
        .ok_or_else(|| QueryError::NotFound {
            what: "certificate",
            key: certificate_id.as_str().to_string(),
        })?;
    Ok(verify_stored_certificate(
        store,
        &record.content_id_json,
        key,
    ))
}

fn strip_signature(stored: &Value) -> Value {
    let mut copy = stored.clone();
    if let Value::Object(map) = &mut copy {
        map.remove(SIGNATURE_FIELD);
    }
    copy
}
