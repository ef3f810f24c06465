#![forbid(unsafe_code)]

use std::sync::Arc;

use certiwipe_contracts::certificate::{CertificateId, CertificateRecord};
use certiwipe_contracts::device::{DeviceRecord, DeviceStatus, ErasureEvent, Imei};
use certiwipe_contracts::{ContractViolation, UnixTimeMs};
use certiwipe_storage::repo::{CertificateRepo, DeviceAuditRepo};
use certiwipe_storage::StorageError;
use serde::Serialize;

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;
pub const RECENT_WINDOW_DAYS: u64 = 30;
pub const TOP_DEVICES: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidStatus(ContractViolation),
    #[error("invalid query: {0}")]
    InvalidParameter(ContractViolation),
    #[error("{what} {key} not found")]
    NotFound { what: &'static str, key: String },
    #[error("storage error: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for QueryError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { key, .. } => QueryError::NotFound {
                what: "device",
                key,
            },
            other => QueryError::Storage(other),
        }
    }
}

impl QueryError {
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidStatus(_) | Self::InvalidParameter(_))
    }
}

/// Full device view; history newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceDetail {
    pub imei: Imei,
    pub device_model: String,
    pub serial_number: String,
    pub erasure_count: u64,
    pub first_seen: UnixTimeMs,
    pub last_erasure: UnixTimeMs,
    pub status: DeviceStatus,
    pub erasure_history: Vec<ErasureEvent>,
}

impl From<&DeviceRecord> for DeviceDetail {
    fn from(r: &DeviceRecord) -> Self {
        Self {
            imei: r.imei().clone(),
            device_model: r.device_model().to_string(),
            serial_number: r.serial_number().to_string(),
            erasure_count: r.erasure_count(),
            first_seen: r.first_seen(),
            last_erasure: r.last_erasure(),
            status: r.status(),
            erasure_history: r.history_latest_first(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRow {
    pub imei: Imei,
    pub device_model: String,
    pub serial_number: String,
    pub erasure_count: u64,
    pub first_seen: UnixTimeMs,
    pub last_erasure: UnixTimeMs,
    pub status: DeviceStatus,
}

impl From<&DeviceRecord> for DeviceRow {
    fn from(r: &DeviceRecord) -> Self {
        Self {
            imei: r.imei().clone(),
            device_model: r.device_model().to_string(),
            serial_number: r.serial_number().to_string(),
            erasure_count: r.erasure_count(),
            first_seen: r.first_seen(),
            last_erasure: r.last_erasure(),
            status: r.status(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current: u32,
    pub total: u64,
    pub count: usize,
    pub total_devices: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DevicePage {
    pub devices: Vec<DeviceRow>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopDevice {
    pub imei: Imei,
    pub device_model: String,
    pub erasure_count: u64,
    pub last_erasure: UnixTimeMs,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatsSummary {
    pub total_devices: u64,
    pub total_erasures: u64,
    pub recently_erased: u64,
    pub top_devices: Vec<TopDevice>,
}

/// Raw list parameters as they arrive from a query string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListDevicesQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
}

/// Read-only device surface plus the status transition.
#[derive(Clone)]
pub struct DeviceQueryService {
    audit: Arc<dyn DeviceAuditRepo>,
    certificates: Arc<dyn CertificateRepo>,
}

impl DeviceQueryService {
    pub fn new(audit: Arc<dyn DeviceAuditRepo>, certificates: Arc<dyn CertificateRepo>) -> Self {
        Self {
            audit,
            certificates,
        }
    }

    pub fn device(&self, raw_imei: &str) -> Result<DeviceDetail, QueryError> {
        let imei = Imei::new(raw_imei).map_err(QueryError::InvalidParameter)?;
        let record = self
            .audit
            .device_row(&imei)?
            .ok_or_else(|| QueryError::NotFound {
                what: "device",
                key: imei.as_str().to_string(),
            })?;
        Ok(DeviceDetail::from(&record))
    }

    pub fn list_devices(&self, query: &ListDevicesQuery) -> Result<DevicePage, QueryError> {
        let page = query.page.unwrap_or(1);
        if page == 0 {
            return Err(QueryError::InvalidParameter(ContractViolation::InvalidValue {
                field: "page",
                reason: "must be >= 1",
            }));
        }
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(QueryError::InvalidParameter(ContractViolation::InvalidValue {
                field: "limit",
                reason: "must be within 1..=100",
            }));
        }
        let status = query
            .status
            .as_deref()
            .map(DeviceStatus::parse)
            .transpose()
            .map_err(QueryError::InvalidStatus)?;

        let mut rows: Vec<DeviceRecord> = self
            .audit
            .device_rows()?
            .into_iter()
            .filter(|r| status.map_or(true, |s| r.status() == s))
            .collect();
        rows.sort_by(|a, b| {
            b.last_erasure()
                .cmp(&a.last_erasure())
                .then_with(|| a.imei().cmp(b.imei()))
        });

        let total_devices = rows.len() as u64;
        let skip = (page as usize - 1).saturating_mul(limit as usize);
        let devices: Vec<DeviceRow> = rows
            .iter()
            .skip(skip)
            .take(limit as usize)
            .map(DeviceRow::from)
            .collect();
        Ok(DevicePage {
            pagination: Pagination {
                current: page,
                total: total_devices.div_ceil(limit as u64),
                count: devices.len(),
                total_devices,
            },
            devices,
        })
    }

    pub fn summary(&self, now: UnixTimeMs) -> Result<DeviceStatsSummary, QueryError> {
        let rows = self.audit.device_rows()?;
        let window_start = now.saturating_sub_days(RECENT_WINDOW_DAYS);

        let mut ranked: Vec<&DeviceRecord> = rows.iter().collect();
        ranked.sort_by(|a, b| {
            b.erasure_count()
                .cmp(&a.erasure_count())
                .then_with(|| a.imei().cmp(b.imei()))
        });

        Ok(DeviceStatsSummary {
            total_devices: rows.len() as u64,
            total_erasures: rows.iter().map(DeviceRecord::erasure_count).sum(),
            recently_erased: rows
                .iter()
                .filter(|r| r.last_erasure() >= window_start)
                .count() as u64,
            top_devices: ranked
                .into_iter()
                .take(TOP_DEVICES)
                .map(|r| TopDevice {
                    imei: r.imei().clone(),
                    device_model: r.device_model().to_string(),
                    erasure_count: r.erasure_count(),
                    last_erasure: r.last_erasure(),
                })
                .collect(),
        })
    }

    pub fn set_status(&self, raw_imei: &str, raw_status: &str) -> Result<DeviceDetail, QueryError> {
        let status = DeviceStatus::parse(raw_status).map_err(QueryError::InvalidStatus)?;
        let imei = Imei::new(raw_imei).map_err(QueryError::InvalidParameter)?;
        let record = self.audit.set_device_status_row(&imei, status)?;
        tracing::info!(imei = %imei, status = status.as_str(), "device status updated");
        Ok(DeviceDetail::from(&record))
    }

    pub fn certificate(&self, raw_id: &str) -> Result<CertificateRecord, QueryError> {
        let id = CertificateId::new(raw_id).map_err(QueryError::InvalidParameter)?;
        self.certificates
            .certificate_row(&id)?
            .ok_or_else(|| QueryError::NotFound {
                what: "certificate",
                key: id.as_str().to_string(),
            })
    }
}
