//! Host-facing implementations of the provider capabilities.

pub mod file_store;
pub mod systemd;
