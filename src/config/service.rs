//! # Service Configuration
//!
//! Settings are resolved in three layers:
//!
//! 1. Built-in defaults
//! 2. Optional YAML file (`--config` / `CONFIG_FILE`)
//! 3. Environment variable overrides (populated from a ConfigMap via `envFrom`)
//!
//! The result is checked by [`ServiceConfig::validate`] before use.

use crate::constants::{
    DEFAULT_CD_NAMESPACE, DEFAULT_DESTINATION_SERVER, DEFAULT_IMPERSONATION_SA_PREFIX,
    DEFAULT_PORT,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Invalid value for {key}: {message}")]
    InvalidEnv { key: String, message: String },
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// A Kubernetes resource type reference, as used by AppProject allow/deny lists
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct ResourceKind {
    /// API group ("" for core)
    #[serde(default)]
    pub group: String,
    pub kind: String,
}

impl ResourceKind {
    pub fn new(group: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ArgoCdConfig {
    /// Namespace holding AppProject and Application objects
    pub namespace: String,
    /// Cluster API server used as the only allowed destination
    pub destination_server: String,
}

impl Default for ArgoCdConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_CD_NAMESPACE.to_string(),
            destination_server: DEFAULT_DESTINATION_SERVER.to_string(),
        }
    }
}

/// Impersonation settings
///
/// When enabled, each tenant gets a generated-name service account bound to
/// `cluster_role` inside its namespace, and the AppProject maps the
/// destination to that account so ArgoCD syncs with the tenant's identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImpersonationConfig {
    pub enabled: bool,
    pub cluster_role: String,
    pub service_account_prefix: String,
}

impl Default for ImpersonationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cluster_role: String::new(),
            service_account_prefix: DEFAULT_IMPERSONATION_SA_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistrationConfig {
    /// Delete a converted (pre-existing) namespace when CD resource creation fails
    pub rollback_existing_namespace: bool,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            rollback_existing_namespace: true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    pub server: ServerConfig,
    /// Global log level, used when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
    pub argocd: ArgoCdConfig,
    pub impersonation: ImpersonationConfig,
    pub registration: RegistrationConfig,
    /// Resource types tenants may deploy (mutually exclusive with the deny list)
    pub resource_allow_list: Option<Vec<ResourceKind>>,
    /// Resource types tenants may not deploy
    pub resource_deny_list: Option<Vec<ResourceKind>>,
}

impl ServiceConfig {
    /// Load configuration: defaults, then optional YAML file, then environment
    pub fn load(config_file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_file {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        if config.log_level.is_empty() {
            config.log_level = "info".to_string();
        }
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Apply environment variable overrides
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|e| ConfigError::InvalidEnv {
                key: "PORT".to_string(),
                message: format!("{e}"),
            })?;
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        if let Some(format) = lookup("LOG_FORMAT") {
            self.log_format = match format.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                "text" => LogFormat::Text,
                other => {
                    return Err(ConfigError::InvalidEnv {
                        key: "LOG_FORMAT".to_string(),
                        message: format!("expected 'json' or 'text', got '{other}'"),
                    })
                }
            };
        }
        if let Some(ns) = lookup("ARGOCD_NAMESPACE") {
            self.argocd.namespace = ns;
        }
        if let Some(server) = lookup("DESTINATION_SERVER") {
            self.argocd.destination_server = server;
        }
        if let Some(enabled) = lookup("IMPERSONATION_ENABLED") {
            self.impersonation.enabled = parse_bool("IMPERSONATION_ENABLED", &enabled)?;
        }
        if let Some(role) = lookup("IMPERSONATION_CLUSTER_ROLE") {
            self.impersonation.cluster_role = role;
        }
        if let Some(prefix) = lookup("IMPERSONATION_SERVICE_ACCOUNT_PREFIX") {
            self.impersonation.service_account_prefix = prefix;
        }
        if let Some(raw) = lookup("RESOURCE_ALLOW_LIST") {
            self.resource_allow_list = Some(parse_resource_list("RESOURCE_ALLOW_LIST", &raw)?);
        }
        if let Some(raw) = lookup("RESOURCE_DENY_LIST") {
            self.resource_deny_list = Some(parse_resource_list("RESOURCE_DENY_LIST", &raw)?);
        }
        if let Some(rollback) = lookup("ROLLBACK_EXISTING_NAMESPACE") {
            self.registration.rollback_existing_namespace =
                parse_bool("ROLLBACK_EXISTING_NAMESPACE", &rollback)?;
        }
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        let allow = self.resource_allow_list.as_ref().is_some_and(|l| !l.is_empty());
        let deny = self.resource_deny_list.as_ref().is_some_and(|l| !l.is_empty());
        if allow && deny {
            return Err(ConfigError::Invalid(
                "resourceAllowList and resourceDenyList are mutually exclusive".to_string(),
            ));
        }
        if self.impersonation.enabled {
            if self.impersonation.cluster_role.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "impersonation is enabled but no clusterRole is configured".to_string(),
                ));
            }
            if self.impersonation.service_account_prefix.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "impersonation is enabled but serviceAccountPrefix is empty".to_string(),
                ));
            }
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".to_string()));
        }
        if self.argocd.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("argocd.namespace must be set".to_string()));
        }
        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidEnv {
            key: key.to_string(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_resource_list(key: &str, raw: &str) -> Result<Vec<ResourceKind>, ConfigError> {
    serde_json::from_str(raw).map_err(|e| ConfigError::InvalidEnv {
        key: key.to_string(),
        message: format!("expected JSON array of {{group, kind}}: {e}"),
    })
}
