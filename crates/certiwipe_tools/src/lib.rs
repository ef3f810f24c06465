#![forbid(unsafe_code)]

pub mod cert_cli;
pub mod vault_cli;
