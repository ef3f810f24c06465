#![forbid(unsafe_code)]

use std::env;
use std::time::Duration;

use certiwipe_contracts::provider_secrets::ProviderSecretId;
use url::Url;

use crate::device_vault::DeviceVault;

pub const PROVIDER_TIMEOUT_MS_DEFAULT: u64 = 10_000;
pub const PROVIDER_USER_AGENT: &str = concat!("certiwipe/", env!("CARGO_PKG_VERSION"));

/// Failure of one outbound provider call, safe to log (no secrets, no bodies).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCallError {
    pub provider: &'static str,
    pub http_status: Option<u16>,
    pub error_kind: &'static str,
}

impl ProviderCallError {
    pub fn new(provider: &'static str, error_kind: &'static str, http_status: Option<u16>) -> Self {
        Self {
            provider,
            http_status,
            error_kind,
        }
    }

    pub fn safe_detail(&self) -> String {
        match self.http_status {
            Some(status) => format!(
                "provider={} error={} status={}",
                self.provider, self.error_kind, status
            ),
            None => format!("provider={} error={}", self.provider, self.error_kind),
        }
    }
}

impl std::fmt::Display for ProviderCallError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.safe_detail())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderHttpConfig {
    pub timeout_ms: u64,
}

impl Default for ProviderHttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: PROVIDER_TIMEOUT_MS_DEFAULT,
        }
    }
}

impl ProviderHttpConfig {
    pub fn from_env() -> Self {
        let timeout_ms = env::var("CERTIWIPE_HTTP_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| (100..=120_000).contains(v))
            .unwrap_or(PROVIDER_TIMEOUT_MS_DEFAULT);
        Self { timeout_ms }
    }

    pub fn build_agent(&self) -> ureq::Agent {
        let timeout = Duration::from_millis(self.timeout_ms.max(100));
        ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .user_agent(PROVIDER_USER_AGENT)
            .build()
    }
}

/// Reads an http(s) endpoint from the environment. Blank or invalid values
/// count as unset.
pub fn endpoint_from_env(var: &str) -> Option<Url> {
    let raw = env::var(var).ok()?;
    parse_endpoint(&raw)
}

pub fn parse_endpoint(raw: &str) -> Option<Url> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let url = Url::parse(trimmed).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        tracing::warn!(endpoint = %trimmed, "ignoring non-http provider endpoint");
        return None;
    }
    Some(url)
}

/// Appends `path` to `base` without dropping any base path segments.
pub fn join_endpoint(base: &Url, path: &str) -> String {
    format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub fn env_string(var: &str) -> Option<String> {
    env::var(var).ok().and_then(|v| {
        let s = v.trim().to_string();
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    })
}

/// Environment first, then the local device vault.
pub fn resolve_provider_secret(id: ProviderSecretId, vault: &DeviceVault) -> Option<String> {
    if let Some(value) = env_string(id.env_var()) {
        return Some(value);
    }
    match vault.resolve_secret(id.as_str()) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(key_id = id.as_str(), error = %err, "device vault lookup failed");
            None
        }
    }
}

pub fn provider_error_from_ureq(provider: &'static str, err: ureq::Error) -> ProviderCallError {
    match err {
        ureq::Error::Status(status, _) => {
            ProviderCallError::new(provider, "http_non_2xx", Some(status))
        }
        ureq::Error::Transport(transport) => provider_error_from_transport(provider, transport),
    }
}

fn provider_error_from_transport(
    provider: &'static str,
    transport: ureq::Transport,
) -> ProviderCallError {
    let combined = format!("{:?} {}", transport.kind(), transport);
    ProviderCallError::new(provider, classify_transport_error_kind(&combined), None)
}

fn classify_transport_error_kind(raw: &str) -> &'static str {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        "timeout"
    } else if lower.contains("tls") || lower.contains("ssl") {
        "tls"
    } else if lower.contains("dns") {
        "dns"
    } else if lower.contains("connection") || lower.contains("connect") {
        "connection"
    } else {
        "transport"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_provider_http_01_endpoint_parsing_rejects_blank_and_non_http() {
        assert!(parse_endpoint("   ").is_none());
        assert!(parse_endpoint("ftp://example.com").is_none());
        assert!(parse_endpoint("not a url").is_none());
        assert_eq!(
            parse_endpoint(" https://api.pinata.cloud ").unwrap().as_str(),
            "https://api.pinata.cloud/"
        );
    }

    #[test]
    fn at_provider_http_02_join_keeps_base_path() {
        let base = parse_endpoint("https://relay.example.com/ledger/").unwrap();
        assert_eq!(
            join_endpoint(&base, "/v1/mint"),
            "https://relay.example.com/ledger/v1/mint"
        );
    }

    #[test]
    fn at_provider_http_03_transport_errors_are_classified() {
        assert_eq!(classify_transport_error_kind("Io: operation timed out"), "timeout");
        assert_eq!(classify_transport_error_kind("Dns failed"), "dns");
        assert_eq!(classify_transport_error_kind("ConnectionFailed"), "connection");
        assert_eq!(classify_transport_error_kind("weird"), "transport");
    }

    #[test]
    fn at_provider_http_04_safe_detail_includes_status() {
        let err = ProviderCallError::new("pinata", "http_non_2xx", Some(401));
        assert_eq!(err.safe_detail(), "provider=pinata error=http_non_2xx status=401");
    }
}
