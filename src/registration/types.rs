//! # Registration Types
//!
//! Request bodies and the in-memory registration record. The record is
//! never stored: the namespace and CD resources it produces are the durable
//! state.

use crate::constants::DEFAULT_BRANCH;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_branch() -> String {
    DEFAULT_BRANCH.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Repository {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            branch: default_branch(),
        }
    }
}

/// Register a repository into a new namespace
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub namespace: String,
    pub repository: Repository,
}

/// Convert an existing namespace into a tenant
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingNamespaceRequest {
    pub existing_namespace: String,
    pub repository: Repository,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationPhase {
    #[default]
    Creating,
    Active,
    Failed,
}

impl std::fmt::Display for RegistrationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Creating => "creating",
            Self::Active => "active",
            Self::Failed => "failed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStatus {
    pub phase: RegistrationPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub namespace_created: bool,
    pub app_project_created: bool,
    pub application_created: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argocd_app_project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argocd_application: Option<String>,
    /// Service account the CD controller syncs as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    pub impersonation_used: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_time: Option<DateTime<Utc>>,
}

impl RegistrationStatus {
    fn creating() -> Self {
        Self {
            phase: RegistrationPhase::Creating,
            message: Some("Registration in progress".to_string()),
            namespace_created: false,
            app_project_created: false,
            application_created: false,
            argocd_app_project: None,
            argocd_application: None,
            service_account: None,
            impersonation_used: false,
            last_sync_time: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub id: String,
    pub repository: Repository,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: RegistrationStatus,
}

impl Registration {
    /// A fresh record in the `creating` phase with a new UUID
    pub fn new(namespace: &str, repository: Repository) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repository,
            namespace: namespace.to_string(),
            created_by: None,
            created_at: now,
            updated_at: now,
            status: RegistrationStatus::creating(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub(crate) fn mark_failed(&mut self, message: impl Into<String>) {
        self.status.phase = RegistrationPhase::Failed;
        self.status.message = Some(message.into());
        self.touch();
    }

    pub(crate) fn mark_active(&mut self) {
        let now = Utc::now();
        self.status.phase = RegistrationPhase::Active;
        self.status.message = Some("Registration completed".to_string());
        self.status.last_sync_time = Some(now);
        self.updated_at = now;
    }
}
