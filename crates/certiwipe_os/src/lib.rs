#![forbid(unsafe_code)]

pub mod device_query;
pub mod issuance;
pub mod verification;
