//! Service-scoped REST facade.
//!
//! Every call is addressed as `/{service}/{instance}/{api}` on the
//! configured host and goes through the retry controller.

pub mod client;

pub use client::RestClient;
pub use gridlink_http::{Payload, RestError, RestResponse};
