#![forbid(unsafe_code)]

use std::fmt;

/// Wall-clock instant in milliseconds since the Unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct UnixTimeMs(pub u64);

impl UnixTimeMs {
    pub const DAY_MS: u64 = 24 * 60 * 60 * 1_000;

    pub fn now() -> Self {
        let ms = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1);
        Self(ms.max(1))
    }

    pub fn saturating_sub_days(self, days: u64) -> Self {
        Self(self.0.saturating_sub(days.saturating_mul(Self::DAY_MS)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContractViolation {
    InvalidValue {
        field: &'static str,
        reason: &'static str,
    },
    MissingField {
        field: &'static str,
    },
}

impl fmt::Display for ContractViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { field, reason } => write!(f, "{field}: {reason}"),
            Self::MissingField { field } => write!(f, "{field}: is required"),
        }
    }
}

impl std::error::Error for ContractViolation {}

pub trait Validate {
    fn validate(&self) -> Result<(), ContractViolation>;
}

pub(crate) fn validate_token(
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Result<(), ContractViolation> {
    if value.trim().is_empty() {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "must not be empty",
        });
    }
    if value.len() > max_len {
        return Err(ContractViolation::InvalidValue {
            field,
            reason: "exceeds max length",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_common_01_day_window_saturates_at_epoch() {
        assert_eq!(UnixTimeMs(5).saturating_sub_days(30), UnixTimeMs(0));
        assert_eq!(
            UnixTimeMs(31 * UnixTimeMs::DAY_MS).saturating_sub_days(30),
            UnixTimeMs(UnixTimeMs::DAY_MS)
        );
    }

    #[test]
    fn at_common_02_token_validation_rejects_blank_and_oversized() {
        assert!(validate_token("x", "  ", 8).is_err());
        assert!(validate_token("x", "123456789", 8).is_err());
        assert!(validate_token("x", "abc", 8).is_ok());
    }
}
