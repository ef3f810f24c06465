#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::certificate::{CertificateId, TransactionId};
use crate::common::validate_token;
use crate::{ContractViolation, UnixTimeMs, Validate};

/// Stable device identity. Never reused across devices.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Imei(String);

impl Imei {
    pub fn new(id: impl Into<String>) -> Result<Self, ContractViolation> {
        let id = id.into();
        validate_token("device_info.imei", &id, 64)?;
        Ok(Self(id.trim().to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Validate for Imei {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_token("device_info.imei", &self.0, 64)
    }
}

impl fmt::Display for Imei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    #[default]
    Active,
    Retired,
    Flagged,
}

impl DeviceStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Retired => "retired",
            Self::Flagged => "flagged",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::Active, Self::Retired, Self::Flagged]
    }

    /// Exact match only; no case folding, no trimming.
    pub fn parse(raw: &str) -> Result<Self, ContractViolation> {
        Self::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == raw)
            .ok_or(ContractViolation::InvalidValue {
                field: "status",
                reason: "must be one of active, retired, flagged",
            })
    }
}

/// One entry of a device's erasure history. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErasureEvent {
    pub certificate_id: CertificateId,
    pub timestamp: UnixTimeMs,
    pub method: String,
    pub compliance: String,
    pub passes: u32,
    pub duration_seconds: u64,
    pub transaction_id: TransactionId,
    pub verified: bool,
}

impl Validate for ErasureEvent {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.certificate_id.validate()?;
        self.transaction_id.validate()?;
        if self.method.trim().is_empty() {
            return Err(ContractViolation::MissingField {
                field: "erasure_event.method",
            });
        }
        Ok(())
    }
}

/// Per-device audit trail row.
///
/// `device_model` and `serial_number` are pinned to the values seen on the
/// first erasure. Later erasures for the same IMEI never rewrite them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    imei: Imei,
    device_model: String,
    serial_number: String,
    erasure_count: u64,
    erasure_history: Vec<ErasureEvent>,
    first_seen: UnixTimeMs,
    last_erasure: UnixTimeMs,
    status: DeviceStatus,
}

impl DeviceRecord {
    /// `event.timestamp` is overwritten with `now`.
    pub fn from_first_erasure(
        imei: Imei,
        device_model: String,
        serial_number: String,
        mut event: ErasureEvent,
        now: UnixTimeMs,
    ) -> Result<Self, ContractViolation> {
        event.validate()?;
        event.timestamp = now;
        Ok(Self {
            imei,
            device_model,
            serial_number,
            erasure_count: 1,
            erasure_history: vec![event],
            first_seen: now,
            last_erasure: now,
            status: DeviceStatus::Active,
        })
    }

    /// Appends `event` stamped with `now`, clamped so history timestamps
    /// never decrease. Returns the stamp used.
    pub fn append_erasure(
        &mut self,
        mut event: ErasureEvent,
        now: UnixTimeMs,
    ) -> Result<UnixTimeMs, ContractViolation> {
        event.validate()?;
        let stamp = now.max(self.last_erasure);
        event.timestamp = stamp;
        self.erasure_count = self.erasure_count.saturating_add(1);
        self.erasure_history.push(event);
        self.last_erasure = stamp;
        Ok(stamp)
    }

    pub fn set_status(&mut self, status: DeviceStatus) {
        self.status = status;
    }

    pub fn imei(&self) -> &Imei {
        &self.imei
    }

    pub fn device_model(&self) -> &str {
        &self.device_model
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn erasure_count(&self) -> u64 {
        self.erasure_count
    }

    /// History in insertion (chronological) order.
    pub fn erasure_history(&self) -> &[ErasureEvent] {
        &self.erasure_history
    }

    /// History copy ordered newest first. Stored order is untouched.
    pub fn history_latest_first(&self) -> Vec<ErasureEvent> {
        let mut out = self.erasure_history.clone();
        // Reversed first so the stable sort puts later inserts ahead on equal timestamps.
        out.reverse();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        out
    }

    pub fn first_seen(&self) -> UnixTimeMs {
        self.first_seen
    }

    pub fn last_erasure(&self) -> UnixTimeMs {
        self.last_erasure
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn audit_summary(&self) -> DeviceAuditSummary {
        DeviceAuditSummary {
            imei: self.imei.clone(),
            erasure_count: self.erasure_count,
            first_seen: self.first_seen,
            last_erasure: self.last_erasure,
        }
    }
}

impl Validate for DeviceRecord {
    fn validate(&self) -> Result<(), ContractViolation> {
        self.imei.validate()?;
        if self.erasure_count != self.erasure_history.len() as u64 {
            return Err(ContractViolation::InvalidValue {
                field: "erasure_count",
                reason: "must equal erasure_history length",
            });
        }
        if self.last_erasure < self.first_seen {
            return Err(ContractViolation::InvalidValue {
                field: "last_erasure",
                reason: "must be >= first_seen",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAuditSummary {
    pub imei: Imei,
    pub erasure_count: u64,
    pub first_seen: UnixTimeMs,
    pub last_erasure: UnixTimeMs,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(cert: &str, at: u64, method: &str) -> ErasureEvent {
        ErasureEvent {
            certificate_id: CertificateId::new(cert).unwrap(),
            timestamp: UnixTimeMs(at),
            method: method.to_string(),
            compliance: "NIST 800-88 Clear".to_string(),
            passes: 1,
            duration_seconds: 60,
            transaction_id: TransactionId::new(format!("0x{cert}")).unwrap(),
            verified: true,
        }
    }

    #[test]
    fn at_device_01_status_parse_is_exact() {
        assert_eq!(DeviceStatus::parse("retired").unwrap(), DeviceStatus::Retired);
        assert!(DeviceStatus::parse("Retired").is_err());
        assert!(DeviceStatus::parse("deleted").is_err());
        assert_eq!(DeviceStatus::default(), DeviceStatus::Active);
    }

    #[test]
    fn at_device_02_append_keeps_first_seen_and_counts() {
        let imei = Imei::new("123456789012345").unwrap();
        let mut rec = DeviceRecord::from_first_erasure(
            imei,
            "Pixel".to_string(),
            "SN1".to_string(),
            event("c1", 10, "a"),
            UnixTimeMs(10),
        )
        .unwrap();
        rec.append_erasure(event("c2", 20, "b"), UnixTimeMs(20)).unwrap();
        assert_eq!(rec.erasure_count(), 2);
        assert_eq!(rec.first_seen(), UnixTimeMs(10));
        assert_eq!(rec.last_erasure(), UnixTimeMs(20));
        assert_eq!(rec.erasure_history()[0].method, "a");
        assert!(rec.validate().is_ok());
    }

    #[test]
    fn at_device_03_latest_first_view_does_not_reorder_storage() {
        let imei = Imei::new("111").unwrap();
        let mut rec = DeviceRecord::from_first_erasure(
            imei,
            "m".to_string(),
            "s".to_string(),
            event("c1", 10, "first"),
            UnixTimeMs(10),
        )
        .unwrap();
        rec.append_erasure(event("c2", 30, "second"), UnixTimeMs(30)).unwrap();
        rec.append_erasure(event("c3", 30, "third"), UnixTimeMs(30)).unwrap();
        let view = rec.history_latest_first();
        let methods: Vec<&str> = view.iter().map(|e| e.method.as_str()).collect();
        assert_eq!(methods, vec!["third", "second", "first"]);
        assert_eq!(rec.erasure_history()[0].method, "first");
    }

    #[test]
    fn at_device_04_late_commit_is_clamped_to_last_erasure() {
        let imei = Imei::new("123456789012345").unwrap();
        let mut rec = DeviceRecord::from_first_erasure(
            imei,
            "m".to_string(),
            "s".to_string(),
            event("cert-b", 5, "b"),
            UnixTimeMs(200),
        )
        .unwrap();
        assert_eq!(rec.erasure_history()[0].timestamp, UnixTimeMs(200));
        let stamp = rec
            .append_erasure(event("cert-a", 100, "a"), UnixTimeMs(100))
            .unwrap();
        assert_eq!(stamp, UnixTimeMs(200));
        assert_eq!(rec.last_erasure(), UnixTimeMs(200));
        assert_eq!(rec.erasure_history()[1].timestamp, UnixTimeMs(200));
        assert!(rec.validate().is_ok());
    }
}
