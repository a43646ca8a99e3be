//! # Configuration
//!
//! Service configuration, loaded once at startup and passed explicitly into
//! the registration service.

mod service;

pub use service::{
    ArgoCdConfig, ConfigError, ImpersonationConfig, LogFormat, RegistrationConfig, ResourceKind,
    ServerConfig, ServiceConfig,
};
