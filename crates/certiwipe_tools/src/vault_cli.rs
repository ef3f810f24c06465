#![forbid(unsafe_code)]

use certiwipe_contracts::provider_secrets::ProviderSecretId;
use certiwipe_engines::device_vault::DeviceVault;

/// A parsed `certiwipe vault` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultCommand {
    Set(ProviderSecretId),
    Has(ProviderSecretId),
    Del(ProviderSecretId),
    Ls,
}

impl VaultCommand {
    pub fn parse(subcommand: &str, key_id: Option<&str>) -> Result<Self, String> {
        let secret = || -> Result<ProviderSecretId, String> {
            match key_id {
                Some(raw) => parse_provider_secret_id(raw),
                None => Err(format!("missing key id. allowed: {}", allowed_names())),
            }
        };
        Ok(match subcommand {
            "set" => Self::Set(secret()?),
            "has" => Self::Has(secret()?),
            "del" => Self::Del(secret()?),
            "ls" => Self::Ls,
            other => {
                return Err(format!(
                    "unknown vault subcommand: {other}. expected one of: set, has, del, ls"
                ))
            }
        })
    }
}

/// Runs one vault subcommand. Output never echoes a secret value.
pub fn execute_vault_command(
    vault: &DeviceVault,
    subcommand: &str,
    key_id: Option<&str>,
    value: Option<&str>,
) -> Result<String, String> {
    match VaultCommand::parse(subcommand, key_id)? {
        VaultCommand::Set(id) => {
            let secret = value.ok_or("missing secret input value")?;
            vault
                .set_secret(id.as_str(), secret)
                .map_err(|e| format!("could not store {}: {e}", id.as_str()))?;
            Ok(format!("stored {}", id.as_str()))
        }
        VaultCommand::Has(id) => match vault.has_secret(id.as_str()) {
            Ok(true) => Ok("YES".into()),
            Ok(false) => Ok("NO".into()),
            Err(e) => Err(format!("could not read {}: {e}", id.as_str())),
        },
        VaultCommand::Del(id) => match vault.delete_secret(id.as_str()) {
            Ok(true) => Ok(format!("deleted {}", id.as_str())),
            Ok(false) => Ok(format!("{} was not set", id.as_str())),
            Err(e) => Err(format!("could not delete {}: {e}", id.as_str())),
        },
        VaultCommand::Ls => vault
            .list_secret_ids()
            .map(|ids| ids.join("\n"))
            .map_err(|e| format!("could not list vault entries: {e}")),
    }
}

pub fn parse_provider_secret_id(raw: &str) -> Result<ProviderSecretId, String> {
    ProviderSecretId::parse(raw)
        .ok_or_else(|| format!("unknown key id '{raw}'. allowed: {}", allowed_names()))
}

fn allowed_names() -> String {
    ProviderSecretId::allowed_key_names().join(", ")
}
