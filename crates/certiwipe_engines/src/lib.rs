#![forbid(unsafe_code)]

pub mod anchor_ledger;
pub mod artifact;
pub mod canonical;
pub mod content_store;
pub mod device_vault;
pub mod notify;
pub mod provider_http;
pub mod signature;
pub mod summary;
