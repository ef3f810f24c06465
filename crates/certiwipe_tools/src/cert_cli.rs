#![forbid(unsafe_code)]

use std::fs;
use std::path::Path;

use certiwipe_contracts::certificate::CertificatePayload;
use certiwipe_engines::canonical::encode_stored_artifact;
use certiwipe_engines::signature::{parse_public_key, verify_certificate, CertificateSigner};
use certiwipe_engines::summary::verification_summary;
use serde_json::Value;

/// Creates a new issuer key at `key_path` and returns its public key PEM.
/// Refuses to replace an existing key.
pub fn keygen(key_path: &Path) -> Result<String, String> {
    if key_path.exists() {
        return Err(format!("key file '{}' already exists", key_path.display()));
    }
    let signer = CertificateSigner::load_or_create(key_path)
        .map_err(|e| format!("failed to create key '{}': {e}", key_path.display()))?;
    signer
        .public_key_pem()
        .map_err(|e| format!("failed to encode public key: {e}"))
}

pub fn pubkey(key_path: &Path) -> Result<String, String> {
    load_signer(key_path)?
        .public_key_pem()
        .map_err(|e| format!("failed to encode public key: {e}"))
}

/// Signs a payload file and returns the stored-artifact encoding.
pub fn sign(json_path: &Path, key_path: &Path) -> Result<String, String> {
    let payload = read_json(json_path)?;
    let signer = load_signer(key_path)?;
    let signed = signer
        .attach_signature(&payload)
        .map_err(|e| format!("failed to sign: {e}"))?;
    let bytes = encode_stored_artifact(&signed).map_err(|e| format!("failed to encode: {e}"))?;
    String::from_utf8(bytes).map_err(|e| format!("failed to encode: {e}"))
}

/// `Ok` only when the signature verifies.
pub fn verify(json_path: &Path, public_key_path: &Path) -> Result<String, String> {
    let stored = read_json(json_path)?;
    let key_text = fs::read_to_string(public_key_path)
        .map_err(|e| format!("failed to read '{}': {e}", public_key_path.display()))?;
    let key = parse_public_key(&key_text).map_err(|e| e.to_string())?;
    let check = verify_certificate(&stored, &key).map_err(|e| e.to_string())?;
    if check.verified {
        Ok(format!("VERIFIED digest={}", check.digest_hex))
    } else {
        Err(format!("INVALID digest={}", check.digest_hex))
    }
}

pub fn summary(json_path: &Path) -> Result<String, String> {
    let value = read_json(json_path)?;
    let payload = CertificatePayload::from_value(&value).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&verification_summary(&payload))
        .map_err(|e| format!("failed to encode summary: {e}"))
}

fn load_signer(key_path: &Path) -> Result<CertificateSigner, String> {
    let pem = fs::read_to_string(key_path)
        .map_err(|e| format!("failed to read '{}': {e}", key_path.display()))?;
    CertificateSigner::from_pem(&pem).map_err(|e| format!("invalid signing key: {e}"))
}

fn read_json(path: &Path) -> Result<Value, String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("failed to read '{}': {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("'{}' is not valid json: {e}", path.display()))
}
