#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::certificate::{ContentId, TransactionId};

/// Ledger proof for one issuance.
///
/// `device_logged` is false when the device-event call was unsupported,
/// failed, or skipped. That outcome never invalidates the receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorReceipt {
    pub content_id: ContentId,
    pub transaction_id: TransactionId,
    pub device_logged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_event_transaction_id: Option<TransactionId>,
}
