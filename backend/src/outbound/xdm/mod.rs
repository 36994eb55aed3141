//! XDM outbound adapters.
//!
//! HTTP implementation of the `DeviceConfigGateway` port plus its
//! environment-backed configuration.

mod config;
mod dto;
mod http_client;

pub use config::{ConfigError, XdmConfig};
pub use http_client::XdmHttpClient;
