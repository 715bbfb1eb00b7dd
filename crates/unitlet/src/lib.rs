//! Virtual-kubelet provider running each pod container as a systemd service.

pub mod cmd;
pub mod config;
pub mod domain;
pub mod infrastructure;
