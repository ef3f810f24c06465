#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use certiwipe_contracts::certificate::{CertificateId, CertificateRecord};
use certiwipe_contracts::device::{DeviceRecord, DeviceStatus, ErasureEvent, Imei};
use certiwipe_contracts::{ContractViolation, UnixTimeMs, Validate};

#[derive(Debug, Clone, PartialEq)]
pub enum StorageError {
    DuplicateKey { table: &'static str, key: String },
    NotFound { table: &'static str, key: String },
    AppendOnlyViolation { table: &'static str },
    LockPoisoned { table: &'static str },
    ContractViolation(ContractViolation),
}

impl From<ContractViolation> for StorageError {
    fn from(v: ContractViolation) -> Self {
        StorageError::ContractViolation(v)
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateKey { table, key } => write!(f, "{table}: duplicate key {key}"),
            Self::NotFound { table, key } => write!(f, "{table}: no row for {key}"),
            Self::AppendOnlyViolation { table } => write!(f, "{table} is append-only"),
            Self::LockPoisoned { table } => write!(f, "{table}: lock poisoned"),
            Self::ContractViolation(v) => write!(f, "contract violation: {v}"),
        }
    }
}

impl std::error::Error for StorageError {}

const DEVICES: &str = "device_tracking";
const CERTIFICATES: &str = "certificates";

/// A device row guarded by its own lock. `None` until the first erasure for
/// the IMEI commits.
type DeviceSlot = Arc<Mutex<Option<DeviceRecord>>>;

/// In-memory tables for the device audit trail and issued certificates.
///
/// The device map lock is only held to find or create a per-IMEI slot. The
/// read-modify-write of a record happens under that slot's mutex, so two
/// issuances for one IMEI serialize while different IMEIs do not contend.
#[derive(Debug, Default)]
pub struct CertiwipeStore {
    devices: RwLock<BTreeMap<Imei, DeviceSlot>>,
    certificates: RwLock<BTreeMap<CertificateId, CertificateRecord>>,
}

impl CertiwipeStore {
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    fn existing_slot(&self, imei: &Imei) -> Result<Option<DeviceSlot>, StorageError> {
        let devices = self
            .devices
            .read()
            .map_err(|_| StorageError::LockPoisoned { table: DEVICES })?;
        Ok(devices.get(imei).cloned())
    }

    fn slot_for_write(&self, imei: &Imei) -> Result<DeviceSlot, StorageError> {
        if let Some(slot) = self.existing_slot(imei)? {
            return Ok(slot);
        }
        let mut devices = self
            .devices
            .write()
            .map_err(|_| StorageError::LockPoisoned { table: DEVICES })?;
        Ok(devices.entry(imei.clone()).or_default().clone())
    }

    /// Appends one erasure to the device's trail, creating the row on first
    /// sight. Model and serial are only taken from the first erasure.
    pub fn record_erasure(
        &self,
        now: UnixTimeMs,
        imei: &Imei,
        device_model: &str,
        serial_number: &str,
        event: ErasureEvent,
    ) -> Result<DeviceRecord, StorageError> {
        imei.validate()?;
        event.validate()?;
        let slot = self.slot_for_write(imei)?;
        let mut guard = slot
            .lock()
            .map_err(|_| StorageError::LockPoisoned { table: DEVICES })?;
        match guard.as_mut() {
            Some(record) => {
                if record.device_model() != device_model || record.serial_number() != serial_number
                {
                    tracing::debug!(
                        imei = %imei,
                        "device metadata differs from first-seen values; keeping first-seen"
                    );
                }
                record.append_erasure(event, now)?;
                Ok(record.clone())
            }
            None => {
                let record = DeviceRecord::from_first_erasure(
                    imei.clone(),
                    device_model.to_string(),
                    serial_number.to_string(),
                    event,
                    now,
                )?;
                *guard = Some(record.clone());
                Ok(record)
            }
        }
    }

    pub fn device(&self, imei: &Imei) -> Result<Option<DeviceRecord>, StorageError> {
        let Some(slot) = self.existing_slot(imei)? else {
            return Ok(None);
        };
        let guard = slot
            .lock()
            .map_err(|_| StorageError::LockPoisoned { table: DEVICES })?;
        Ok(guard.clone())
    }

    /// Snapshot of every committed device row, in IMEI order.
    pub fn devices(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        let slots: Vec<DeviceSlot> = {
            let devices = self
                .devices
                .read()
                .map_err(|_| StorageError::LockPoisoned { table: DEVICES })?;
            devices.values().cloned().collect()
        };
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            let guard = slot
                .lock()
                .map_err(|_| StorageError::LockPoisoned { table: DEVICES })?;
            if let Some(record) = guard.as_ref() {
                out.push(record.clone());
            }
        }
        Ok(out)
    }

    pub fn set_device_status(
        &self,
        imei: &Imei,
        status: DeviceStatus,
    ) -> Result<DeviceRecord, StorageError> {
        let not_found = || StorageError::NotFound {
            table: DEVICES,
            key: imei.as_str().to_string(),
        };
        let slot = self.existing_slot(imei)?.ok_or_else(not_found)?;
        let mut guard = slot
            .lock()
            .map_err(|_| StorageError::LockPoisoned { table: DEVICES })?;
        let record = guard.as_mut().ok_or_else(not_found)?;
        record.set_status(status);
        Ok(record.clone())
    }

    /// Erasure history is append-only.
    pub fn attempt_overwrite_erasure_event(
        &self,
        _imei: &Imei,
        _index: usize,
        _event: ErasureEvent,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation { table: DEVICES })
    }

    pub fn insert_certificate(&self, record: CertificateRecord) -> Result<(), StorageError> {
        record.validate()?;
        let mut certificates = self
            .certificates
            .write()
            .map_err(|_| StorageError::LockPoisoned {
                table: CERTIFICATES,
            })?;
        if certificates.contains_key(&record.certificate_id) {
            return Err(StorageError::DuplicateKey {
                table: CERTIFICATES,
                key: record.certificate_id.as_str().to_string(),
            });
        }
        certificates.insert(record.certificate_id.clone(), record);
        Ok(())
    }

    pub fn certificate(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<Option<CertificateRecord>, StorageError> {
        let certificates = self
            .certificates
            .read()
            .map_err(|_| StorageError::LockPoisoned {
                table: CERTIFICATES,
            })?;
        Ok(certificates.get(certificate_id).cloned())
    }

    pub fn certificates(&self) -> Result<Vec<CertificateRecord>, StorageError> {
        let certificates = self
            .certificates
            .read()
            .map_err(|_| StorageError::LockPoisoned {
                table: CERTIFICATES,
            })?;
        Ok(certificates.values().cloned().collect())
    }

    /// Certificate rows are written once per issuance and never updated.
    pub fn attempt_overwrite_certificate_row(
        &self,
        _record: CertificateRecord,
    ) -> Result<(), StorageError> {
        Err(StorageError::AppendOnlyViolation {
            table: CERTIFICATES,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use certiwipe_contracts::certificate::TransactionId;

    fn event(cert: &str, at: u64) -> ErasureEvent {
        ErasureEvent {
            certificate_id: CertificateId::new(cert).unwrap(),
            timestamp: UnixTimeMs(at),
            method: "NIST-800-88".to_string(),
            compliance: "NIST SP 800-88".to_string(),
            passes: 1,
            duration_seconds: 90,
            transaction_id: TransactionId::new(format!("0x{at}")).unwrap(),
            verified: true,
        }
    }

    #[test]
    fn at_store_01_invalid_event_leaves_no_visible_row() {
        let store = CertiwipeStore::new_in_memory();
        let imei = Imei::new("350000000000001").unwrap();
        let mut bad = event("CERT-1-AAAA", 10);
        bad.method = "  ".to_string();
        assert!(matches!(
            store.record_erasure(UnixTimeMs(10), &imei, "Pixel", "SN", bad),
            Err(StorageError::ContractViolation(_))
        ));
        assert_eq!(store.device(&imei).unwrap(), None);
        assert!(store.devices().unwrap().is_empty());
    }

    #[test]
    fn at_store_02_status_on_unknown_device_is_not_found() {
        let store = CertiwipeStore::new_in_memory();
        let imei = Imei::new("350000000000002").unwrap();
        assert!(matches!(
            store.set_device_status(&imei, DeviceStatus::Retired),
            Err(StorageError::NotFound { .. })
        ));
    }
}
