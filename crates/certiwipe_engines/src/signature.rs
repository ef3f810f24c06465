#![forbid(unsafe_code)]

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use certiwipe_contracts::certificate::SIGNATURE_FIELD;
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey};
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding};
use p256::{PublicKey, SecretKey};
use rand::rngs::OsRng;
use serde_json::Value;

use crate::canonical::{canonical_digest, CanonicalError};

pub use p256::ecdsa::VerifyingKey;

const FIXED_SIGNATURE_LEN: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
    #[error("issuer key error: {0}")]
    Key(String),
    #[error("issuer key io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ecdsa signing failed")]
    Crypto,
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("certificate does not contain a signature")]
    MissingSignature,
    #[error("signature is malformed: {0}")]
    MalformedSignature(&'static str),
    #[error("public key could not be parsed")]
    InvalidPublicKey,
    #[error(transparent)]
    Canonical(#[from] CanonicalError),
}

/// Issuer-side ECDSA P-256 signer over the canonical SHA-256 digest.
#[derive(Clone)]
pub struct CertificateSigner {
    secret: SecretKey,
}

impl std::fmt::Debug for CertificateSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateSigner").finish_non_exhaustive()
    }
}

impl CertificateSigner {
    pub fn generate() -> Self {
        Self {
            secret: SecretKey::random(&mut OsRng),
        }
    }

    /// Accepts SEC1 (`EC PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) PEM.
    pub fn from_pem(pem: &str) -> Result<Self, SigningError> {
        let secret = if pem.contains("BEGIN EC PRIVATE KEY") {
            SecretKey::from_sec1_pem(pem).map_err(|e| SigningError::Key(e.to_string()))?
        } else {
            SecretKey::from_pkcs8_pem(pem).map_err(|e| SigningError::Key(e.to_string()))?
        };
        Ok(Self { secret })
    }

    pub fn to_sec1_pem(&self) -> Result<String, SigningError> {
        let pem = self
            .secret
            .to_sec1_pem(LineEnding::LF)
            .map_err(|e| SigningError::Key(e.to_string()))?;
        Ok(pem.as_str().to_owned())
    }

    pub fn load_or_create(path: &Path) -> Result<Self, SigningError> {
        if path.exists() {
            let pem = fs::read_to_string(path)?;
            return Self::from_pem(&pem);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let signer = Self::generate();
        write_new_file_restricted(path, signer.to_sec1_pem()?.as_bytes())?;
        tracing::info!(path = %path.display(), "created new issuer signing key");
        Ok(signer)
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        VerifyingKey::from(self.secret.public_key())
    }

    pub fn public_key_pem(&self) -> Result<String, SigningError> {
        self.secret
            .public_key()
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| SigningError::Key(e.to_string()))
    }

    /// Hex-encoded DER signature over the canonical digest of `payload`.
    pub fn sign_payload(&self, payload: &Value) -> Result<String, SigningError> {
        let digest = canonical_digest(payload)?;
        let signing_key = SigningKey::from(&self.secret);
        let signature: Signature = signing_key
            .sign_prehash(&digest)
            .map_err(|_| SigningError::Crypto)?;
        Ok(hex::encode(signature.to_der().as_bytes()))
    }

    /// Returns a copy of `payload` carrying a fresh `signature` member.
    pub fn attach_signature(&self, payload: &Value) -> Result<Value, SigningError> {
        let signature = self.sign_payload(payload)?;
        let Value::Object(map) = payload else {
            return Err(SigningError::Canonical(CanonicalError::NotAnObject));
        };
        let mut signed = map.clone();
        signed.insert(SIGNATURE_FIELD.to_string(), Value::String(signature));
        Ok(Value::Object(signed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignatureCheck {
    pub verified: bool,
    /// Stored payload with `signature` removed, for display.
    pub payload: Value,
    pub digest_hex: String,
}

/// Strips `signature`, re-derives the canonical digest and checks it.
///
/// Works on a local copy; `stored` is never modified.
pub fn verify_certificate(
    stored: &Value,
    public_key: &VerifyingKey,
) -> Result<SignatureCheck, VerificationError> {
    let Value::Object(map) = stored else {
        return Err(VerificationError::Canonical(CanonicalError::NotAnObject));
    };
    let mut working = map.clone();
    let signature_hex = match working.remove(SIGNATURE_FIELD) {
        None | Some(Value::Null) => return Err(VerificationError::MissingSignature),
        Some(Value::String(s)) if s.trim().is_empty() => {
            return Err(VerificationError::MissingSignature)
        }
        Some(Value::String(s)) => s,
        Some(_) => return Err(VerificationError::MalformedSignature("must be a hex string")),
    };
    let payload = Value::Object(working);
    let digest = canonical_digest(&payload)?;
    let signature = decode_signature(&signature_hex)?;
    let verified = public_key.verify_prehash(&digest, &signature).is_ok();
    Ok(SignatureCheck {
        verified,
        payload,
        digest_hex: hex::encode(digest),
    })
}

/// DER or fixed 64-byte `r||s`, hex-encoded.
pub fn decode_signature(signature_hex: &str) -> Result<Signature, VerificationError> {
    let raw = hex::decode(signature_hex.trim())
        .map_err(|_| VerificationError::MalformedSignature("not valid hex"))?;
    if raw.len() == FIXED_SIGNATURE_LEN {
        Signature::from_slice(&raw)
            .map_err(|_| VerificationError::MalformedSignature("invalid r||s encoding"))
    } else {
        Signature::from_der(&raw).map_err(|_| VerificationError::MalformedSignature("invalid der"))
    }
}

/// SPKI PEM or hex-encoded SEC1 point.
pub fn parse_public_key(raw: &str) -> Result<VerifyingKey, VerificationError> {
    let trimmed = raw.trim();
    if trimmed.contains("BEGIN PUBLIC KEY") {
        let public_key =
            PublicKey::from_public_key_pem(trimmed).map_err(|_| VerificationError::InvalidPublicKey)?;
        return Ok(VerifyingKey::from(public_key));
    }
    let bytes = hex::decode(trimmed).map_err(|_| VerificationError::InvalidPublicKey)?;
    VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| VerificationError::InvalidPublicKey)
}

fn write_new_file_restricted(path: &Path, data: &[u8]) -> Result<(), SigningError> {
    let mut file = OpenOptions::new().create_new(true).write(true).open(path)?;
    file.write_all(data)?;
    file.flush()?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}
