#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::validate_token;
use crate::device::Imei;
use crate::{ContractViolation, UnixTimeMs, Validate};

/// Member name of the detached signature inside a stored certificate artifact.
pub const SIGNATURE_FIELD: &str = "signature";
pub const CERTIFICATE_ID_FIELD: &str = "certificate_id";

macro_rules! opaque_id {
    ($name:ident, $field:literal, $max:expr) => {
        #[derive(
            Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
                let id = id.into();
                validate_token($field, &id, $max)?;
                Ok(Self(id))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Validate for $name {
            fn validate(&self) -> Result<(), ContractViolation> {
                validate_token($field, &self.0, $max)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(CertificateId, "certificate_id", 128);
opaque_id!(ContentId, "content_id", 256);
opaque_id!(TransactionId, "transaction_id", 256);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub model: String,
    pub serial: String,
    #[serde(default)]
    pub imei: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WipeDetails {
    pub method: String,
    pub compliance: String,
    pub passes: u32,
    pub duration_seconds: u64,
    pub hpa_removed: bool,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub result: String,
}

/// Typed view over the signed certificate document.
///
/// The signed unit itself stays a `serde_json::Value` so that members this
/// view does not know about still take part in canonicalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificatePayload {
    pub certificate_id: String,
    pub device_info: DeviceInfo,
    pub wipe_details: WipeDetails,
    pub verification: VerificationOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl CertificatePayload {
    pub fn from_value(value: &Value) -> Result<Self, ContractViolation> {
        let payload: Self = serde_json::from_value(value.clone()).map_err(|_| {
            ContractViolation::InvalidValue {
                field: "certificate_payload",
                reason: "does not match the certificate schema",
            }
        })?;
        payload.validate()?;
        Ok(payload)
    }

    pub fn imei(&self) -> Result<Imei, ContractViolation> {
        Imei::new(self.device_info.imei.clone())
    }
}

impl Validate for CertificatePayload {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("certificate_id", &self.certificate_id, 128)?;
        self.imei()?;
        if self.wipe_details.method.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "wipe_details.method",
            });
        }
        Ok(())
    }
}

/// Reads `device_info.imei` from a raw request body.
pub fn imei_from_raw_payload(value: &Value) -> Result<Imei, ContractViolation> {
    let raw = value
        .get("device_info")
        .and_then(|info| info.get("imei"))
        .and_then(Value::as_str)
        .ok_or(ContractViolation::MissingField {
            field: "device_info.imei",
        })?;
    Imei::new(raw)
}

/// Issuance record persisted once per certificate. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    pub certificate_id: CertificateId,
    pub content_id_json: ContentId,
    pub content_id_pdf: ContentId,
    pub transaction_id: TransactionId,
    pub device_model: String,
    pub device_imei: Imei,
    pub device_serial: String,
    pub timestamp: UnixTimeMs,
}

impl Validate for CertificateRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.certificate_id.validate()?;
        self.content_id_json.validate()?;
        self.content_id_pdf.validate()?;
        self.transaction_id.validate()?;
        self.device_imei.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDeviceInfo {
    pub model: String,
    pub serial_number: String,
    pub storage_gb: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryWipeDetails {
    pub method: String,
    pub compliance: String,
    pub passes: u32,
    pub duration_minutes: String,
    pub hpa_dco_erased: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryVerification {
    pub algorithm: String,
    pub final_hash: String,
}

/// Curated subset embedded in the scannable code. Carries no signature and no
/// audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub certificate_id: String,
    pub device_info: SummaryDeviceInfo,
    pub wipe_details: SummaryWipeDetails,
    pub verification: SummaryVerification,
}
