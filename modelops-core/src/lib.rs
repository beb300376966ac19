//! # modelops-core
//!
//! Shared plumbing for the modelops tools: layered configuration, the core
//! error type, and proxy handling for the tracking server connection.

pub mod config;
pub mod error;
pub mod proxy;

pub use config::{ModelOpsConfig, load_config, load_local_config};
pub use error::{ConfigError, CoreError};
pub use proxy::ProxyPolicy;
