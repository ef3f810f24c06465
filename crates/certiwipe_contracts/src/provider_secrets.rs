#![forbid(unsafe_code)]

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderSecretId {
    PinataJwt,
    LedgerRelayToken,
    NotifyBearerToken,
}

impl ProviderSecretId {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PinataJwt => "pinata_jwt",
            Self::LedgerRelayToken => "ledger_relay_token",
            Self::NotifyBearerToken => "notify_bearer_token",
        }
    }

    /// Environment variable that overrides the vault entry.
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::PinataJwt => "CERTIWIPE_PINATA_JWT",
            Self::LedgerRelayToken => "CERTIWIPE_LEDGER_RELAY_TOKEN",
            Self::NotifyBearerToken => "CERTIWIPE_NOTIFY_BEARER_TOKEN",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[Self::PinataJwt, Self::LedgerRelayToken, Self::NotifyBearerToken]
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == normalized)
    }

    pub fn allowed_key_names() -> Vec<&'static str> {
        Self::all().iter().map(|id| id.as_str()).collect()
    }
}
