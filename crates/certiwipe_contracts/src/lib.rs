#![forbid(unsafe_code)]

pub mod anchor;
pub mod certificate;
pub mod common;
pub mod device;
pub mod provider_secrets;

pub use common::{ContractViolation, UnixTimeMs, Validate};
