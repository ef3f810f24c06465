#![forbid(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use certiwipe_contracts::certificate::{CertificateId, ContentId};
use certiwipe_contracts::provider_secrets::ProviderSecretId;
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::device_vault::DeviceVault;
use crate::provider_http::{
    endpoint_from_env, provider_error_from_ureq, resolve_provider_secret, ProviderCallError,
    ProviderHttpConfig,
};

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification channel is not configured")]
    NotConfigured,
    #[error("notification recipient is invalid")]
    InvalidRecipient,
    #[error("notification delivery failed: {0}")]
    Delivery(ProviderCallError),
}

#[derive(Debug, Clone)]
pub struct CertificateNotification<'a> {
    pub recipient: &'a str,
    pub certificate_id: &'a CertificateId,
    pub device_model: &'a str,
    pub content_id_json: &'a ContentId,
    pub content_id_pdf: &'a ContentId,
    pub pdf: &'a [u8],
}

/// Advisory result attached to an issuance. Never turns into an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOutcome {
    pub attempted: bool,
    pub delivered: bool,
    pub message: String,
}

impl NotificationOutcome {
    pub fn not_requested() -> Self {
        Self {
            attempted: false,
            delivered: false,
            message: "no recipient supplied".to_string(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &CertificateNotification<'_>) -> Result<(), NotifyError>;
}

/// Used when no notification endpoint is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledNotifier;

impl Notifier for DisabledNotifier {
    fn notify(&self, _notification: &CertificateNotification<'_>) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}

/// Posts the certificate (PDF attached as base64) to a mail relay webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    agent: ureq::Agent,
    endpoint: Url,
    bearer_token: Option<String>,
}

impl WebhookNotifier {
    pub fn new(http: &ProviderHttpConfig, endpoint: Url, bearer_token: Option<String>) -> Self {
        Self {
            agent: http.build_agent(),
            endpoint,
            bearer_token,
        }
    }

    pub fn from_env(http: &ProviderHttpConfig, vault: &DeviceVault) -> Option<Self> {
        let endpoint = endpoint_from_env("CERTIWIPE_NOTIFY_ENDPOINT")?;
        let token = resolve_provider_secret(ProviderSecretId::NotifyBearerToken, vault);
        Some(Self::new(http, endpoint, token))
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, n: &CertificateNotification<'_>) -> Result<(), NotifyError> {
        let body = json!({
            "to": n.recipient,
            "subject": format!("Erasure Certificate - {}", n.certificate_id),
            "certificateId": n.certificate_id.as_str(),
            "deviceModel": n.device_model,
            "contentIdJson": n.content_id_json.as_str(),
            "contentIdPdf": n.content_id_pdf.as_str(),
            "attachment": {
                "filename": format!("{}.pdf", n.certificate_id),
                "contentType": "application/pdf",
                "contentBase64": BASE64.encode(n.pdf),
            },
        });
        let mut request = self.agent.post(self.endpoint.as_str());
        if let Some(token) = &self.bearer_token {
            request = request.set("Authorization", &format!("Bearer {token}"));
        }
        request
            .send_json(body)
            .map_err(|e| NotifyError::Delivery(provider_error_from_ureq("notify", e)))?;
        Ok(())
    }
}

/// Minimal shape check; the relay does the real validation.
pub fn is_plausible_email(raw: &str) -> bool {
    let Some((local, domain)) = raw.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !raw.chars().any(|c| c.is_whitespace() || c.is_control())
}

/// Runs the side channel and folds every failure into the outcome.
pub fn notify_best_effort(
    notifier: &dyn Notifier,
    notification: &CertificateNotification<'_>,
) -> NotificationOutcome {
    let result = if is_plausible_email(notification.recipient) {
        notifier.notify(notification)
    } else {
        Err(NotifyError::InvalidRecipient)
    };
    match result {
        Ok(()) => NotificationOutcome {
            attempted: true,
            delivered: true,
            message: "certificate sent".to_string(),
        },
        Err(err) => {
            tracing::warn!(
                certificate_id = %notification.certificate_id,
                error = %err,
                "certificate notification not delivered"
            );
            NotificationOutcome {
                attempted: !matches!(err, NotifyError::NotConfigured | NotifyError::InvalidRecipient),
                delivered: false,
                message: err.to_string(),
            }
        }
    }
}
