//! Configuration types for Gridlink.
//!
//! This crate provides the configuration types used by Gridlink
//! for `.gridlink/config.yaml` files, plus lookup of the grid security
//! environment (`X509_CERT_DIR`, `X509_USER_PROXY`).

pub mod types;
pub mod loader;
pub mod env;


pub use types::*;
pub use loader::*;
pub use env::*;
