#![forbid(unsafe_code)]

use certiwipe_contracts::certificate::{CertificateId, CertificateRecord};
use certiwipe_contracts::device::{DeviceRecord, DeviceStatus, ErasureEvent, Imei};
use certiwipe_contracts::UnixTimeMs;

use crate::store::{CertiwipeStore, StorageError};

/// Typed repository interface for the per-device erasure audit trail.
///
/// `record_erasure_row` must be atomic per IMEI: concurrent calls for the same
/// device each increment the count exactly once and each append one event.
pub trait DeviceAuditRepo: Send + Sync {
    fn record_erasure_row(
        &self,
        now: UnixTimeMs,
        imei: &Imei,
        device_model: &str,
        serial_number: &str,
        event: ErasureEvent,
    ) -> Result<DeviceRecord, StorageError>;
    fn device_row(&self, imei: &Imei) -> Result<Option<DeviceRecord>, StorageError>;
    fn device_rows(&self) -> Result<Vec<DeviceRecord>, StorageError>;
    fn set_device_status_row(
        &self,
        imei: &Imei,
        status: DeviceStatus,
    ) -> Result<DeviceRecord, StorageError>;
}

/// Typed repository interface for issued certificate records.
pub trait CertificateRepo: Send + Sync {
    fn insert_certificate_row(&self, record: CertificateRecord) -> Result<(), StorageError>;
    fn certificate_row(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<Option<CertificateRecord>, StorageError>;
    fn certificate_rows(&self) -> Result<Vec<CertificateRecord>, StorageError>;
}

impl DeviceAuditRepo for CertiwipeStore {
    fn record_erasure_row(
        &self,
        now: UnixTimeMs,
        imei: &Imei,
        device_model: &str,
        serial_number: &str,
        event: ErasureEvent,
    ) -> Result<DeviceRecord, StorageError> {
        self.record_erasure(now, imei, device_model, serial_number, event)
    }

    fn device_row(&self, imei: &Imei) -> Result<Option<DeviceRecord>, StorageError> {
        self.device(imei)
    }

    fn device_rows(&self) -> Result<Vec<DeviceRecord>, StorageError> {
        self.devices()
    }

    fn set_device_status_row(
        &self,
        imei: &Imei,
        status: DeviceStatus,
    ) -> Result<DeviceRecord, StorageError> {
        self.set_device_status(imei, status)
    }
}

impl CertificateRepo for CertiwipeStore {
    fn insert_certificate_row(&self, record: CertificateRecord) -> Result<(), StorageError> {
        self.insert_certificate(record)
    }

    fn certificate_row(
        &self,
        certificate_id: &CertificateId,
    ) -> Result<Option<CertificateRecord>, StorageError> {
        self.certificate(certificate_id)
    }

    fn certificate_rows(&self) -> Result<Vec<CertificateRecord>, StorageError> {
        self.certificates()
    }
}
