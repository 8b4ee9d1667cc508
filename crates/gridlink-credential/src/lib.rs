//! Proxy and delegated credential provisioning.
//!
//! [`CredentialProvisioner`] keeps the local VOMS proxy and the delegated
//! credential on the delegation server fresh before REST calls are made.
//! Both stores sit behind narrow traits so they can be replaced in tests.

mod command;
pub mod error;
pub mod myproxy;
pub mod provisioner;
pub mod store;
pub mod voms;

pub use error::CredentialError;
pub use myproxy::MyProxyCommandService;
pub use provisioner::{CredentialProvisioner, ProvisionerSettings};
pub use store::{DelegationService, ProxyAttributes, ProxyStore, NULL_ROLE};
pub use voms::VomsCommandStore;
