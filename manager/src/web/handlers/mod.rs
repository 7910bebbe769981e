// File: manager/src/web/handlers/mod.rs
// API handlers organized by domain
//
// - common: shared response types and error mapping
// - services: registry listing, health reads, forced checks, restarts
// - market: package installation, status, and uninstallation

pub mod common;
pub mod market;
pub mod services;

pub use common::*;
pub use market::*;
pub use services::*;
