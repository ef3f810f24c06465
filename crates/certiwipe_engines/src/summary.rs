#![forbid(unsafe_code)]

use certiwipe_contracts::certificate::{
    CertificatePayload, SummaryDeviceInfo, SummaryVerification, SummaryWipeDetails,
    VerificationSummary,
};
use rust_decimal::{Decimal, RoundingStrategy};

pub const SUMMARY_DIGEST_ALGORITHM: &str = "SHA-256";

const BYTES_PER_GIB: u64 = 1024 * 1024 * 1024;

/// Curated, human-readable subset used for the scannable code and the PDF.
pub fn verification_summary(payload: &CertificatePayload) -> VerificationSummary {
    VerificationSummary {
        certificate_id: payload.certificate_id.clone(),
        device_info: SummaryDeviceInfo {
            model: payload.device_info.model.clone(),
            serial_number: payload.device_info.serial.clone(),
            storage_gb: format!("{} GB", storage_gb(payload.device_info.size_bytes)),
        },
        wipe_details: SummaryWipeDetails {
            method: payload.wipe_details.method.clone(),
            compliance: payload.wipe_details.compliance.clone(),
            passes: payload.wipe_details.passes,
            duration_minutes: format!(
                "{} minutes",
                whole_minutes(payload.wipe_details.duration_seconds)
            ),
            hpa_dco_erased: yes_no(payload.wipe_details.hpa_removed).to_string(),
        },
        verification: SummaryVerification {
            algorithm: SUMMARY_DIGEST_ALGORITHM.to_string(),
            final_hash: payload.verification.result.clone(),
        },
    }
}

/// Size in GiB with exactly two decimals, half away from zero.
pub fn storage_gb(size_bytes: u64) -> String {
    let gb = Decimal::from(size_bytes) / Decimal::from(BYTES_PER_GIB);
    let rounded = gb.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    format!("{rounded:.2}")
}

pub fn whole_minutes(duration_seconds: u64) -> u64 {
    duration_seconds.saturating_add(30) / 60
}

pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Yes"
    } else {
        "No"
    }
}
