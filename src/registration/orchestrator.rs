//! # Registration Orchestrator
//!
//! Sequences conflict detection, namespace and identity provisioning and CD
//! resource submission into a compensated workflow. Steps run strictly in
//! order; a failure triggers best-effort deletion of what the attempt
//! created, and the original error is always what the caller sees.
//!
//! No in-process locking exists between concurrent registrations. The
//! namespace path is protected by the create call itself (a racing create
//! surfaces as a namespace conflict). The repository-hash check has no such
//! backstop: two concurrent requests for one repository can both pass it.
//!
//! Converting an existing namespace always provisions the legacy `gitops`
//! identity. With impersonation enabled the AppProject still maps that
//! account as the destination service account, so the CD controller syncs
//! as it and `impersonation_used` is reported `true`.
//!
//! Dropping the returned future aborts the in-flight cluster call without
//! running compensation.

use super::types::{
    ExistingNamespaceRequest, Registration, RegistrationRequest, Repository,
};
use crate::argocd::{CdResourceBuilder, ConflictDetector};
use crate::auth::{Authorizer, UserIdentity};
use crate::cluster::{CdResourceStore, ClusterClients, ClusterError};
use crate::config::ServiceConfig;
use crate::constants::{
    ANNOTATION_REGISTERED_BY, ANNOTATION_REGISTRATION_ID, ANNOTATION_REPOSITORY_BRANCH,
    ANNOTATION_REPOSITORY_URL, APPLICATION_NAME_SUFFIX, LABEL_REGISTRATION_ID,
    LABEL_REPOSITORY_DOMAIN, LABEL_REPOSITORY_HASH, LEGACY_CLUSTER_ROLE, LEGACY_ROLE_BINDING,
    LEGACY_SERVICE_ACCOUNT,
};
use crate::error::{RegistrationError, RegistrationStep};
use crate::observability::metrics;
use crate::provisioner::{ClusterProvisioner, ClusterRoleValidation, CreateOutcome};
use crate::repository::{repository_domain, repository_hash, short_registration_id};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, field, info, info_span, warn, Instrument};

const FLOW_CREATE: &str = "create";
const FLOW_EXISTING: &str = "existing";

/// Objects an attempt created and must remove if a later step fails
#[derive(Debug, Default)]
struct Compensation {
    namespace: Option<String>,
    app_project: Option<String>,
}

/// Which identity the CD controller will sync as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdentityMode {
    Legacy,
    Impersonation,
}

pub struct RegistrationService {
    config: Arc<ServiceConfig>,
    provisioner: ClusterProvisioner,
    builder: CdResourceBuilder,
    conflicts: ConflictDetector,
    cd_resources: Arc<dyn CdResourceStore>,
    authorizer: Option<Arc<dyn Authorizer>>,
}

impl std::fmt::Debug for RegistrationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationService")
            .field("impersonation", &self.config.impersonation.enabled)
            .field("cd_namespace", &self.builder.cd_namespace())
            .finish_non_exhaustive()
    }
}

impl RegistrationService {
    pub fn new(clients: ClusterClients, config: Arc<ServiceConfig>) -> Self {
        Self {
            builder: CdResourceBuilder::from_config(&config),
            conflicts: ConflictDetector::new(Arc::clone(&clients.cd_resources)),
            cd_resources: Arc::clone(&clients.cd_resources),
            provisioner: ClusterProvisioner::new(clients),
            authorizer: None,
            config,
        }
    }

    #[must_use]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = Some(authorizer);
        self
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Analyze the impersonation ClusterRole, logging every finding
    ///
    /// Returns `None` when impersonation is disabled. Findings never fail
    /// the call; only an unreachable API server does.
    pub async fn validate_impersonation_role(
        &self,
    ) -> Result<Option<ClusterRoleValidation>, ClusterError> {
        if !self.config.impersonation.enabled {
            return Ok(None);
        }
        let role = &self.config.impersonation.cluster_role;
        let validation = self.provisioner.validate_cluster_role(role).await?;

        if validation.warnings.is_empty() {
            info!("Impersonation ClusterRole {} passed security analysis", role);
        } else {
            for warning in &validation.warnings {
                warn!("Impersonation ClusterRole {}: {}", role, warning);
            }
            metrics::increment_cluster_role_warnings(validation.warnings.len() as u64);
        }
        Ok(Some(validation))
    }

    /// Resolve a bearer token and check the caller may manage `namespace`
    pub async fn authorize(
        &self,
        token: Option<&str>,
        namespace: &str,
    ) -> Result<UserIdentity, RegistrationError> {
        let authorizer = self.authorizer.as_ref().ok_or_else(|| {
            RegistrationError::Unauthorized("no authorizer is configured".to_string())
        })?;
        let token = token.ok_or(crate::auth::AuthError::MissingToken)?;
        let user = authorizer.extract_user_info(token).await?;
        authorizer.validate_namespace_access(&user, namespace).await?;
        info!("User {} authorized for namespace {}", user.username, namespace);
        Ok(user)
    }

    /// Register a repository into a namespace this service creates
    pub async fn create_registration(
        &self,
        request: &RegistrationRequest,
    ) -> Result<Registration, RegistrationError> {
        let span = info_span!(
            "registration",
            flow = FLOW_CREATE,
            namespace = %request.namespace,
            registration_id = field::Empty,
        );
        let started = Instant::now();
        let result = self.create_registration_inner(request).instrument(span).await;
        record_outcome(FLOW_CREATE, &result, started);
        result
    }

    /// Authorize the caller, then convert an existing namespace into a tenant
    pub async fn register_existing_namespace_with_token(
        &self,
        request: &ExistingNamespaceRequest,
        token: Option<&str>,
    ) -> Result<Registration, RegistrationError> {
        // The namespace checked for access must be the one that gets converted
        let request = ExistingNamespaceRequest {
            existing_namespace: request.existing_namespace.trim().to_string(),
            repository: request.repository.clone(),
        };
        validate_fields(&request.existing_namespace, &request.repository)?;
        let user = match self.authorize(token, &request.existing_namespace).await {
            Ok(user) => user,
            Err(e) => {
                warn!(
                    "Rejected conversion of namespace {}: {}",
                    request.existing_namespace, e
                );
                return Err(e);
            }
        };
        self.register_existing_namespace(&request, &user).await
    }

    /// Convert an existing namespace into a tenant
    ///
    /// The caller must already have been authorized for the namespace; `user`
    /// is only recorded for audit.
    pub async fn register_existing_namespace(
        &self,
        request: &ExistingNamespaceRequest,
        user: &UserIdentity,
    ) -> Result<Registration, RegistrationError> {
        let span = info_span!(
            "registration",
            flow = FLOW_EXISTING,
            namespace = %request.existing_namespace,
            user = %user.username,
            registration_id = field::Empty,
        );
        let started = Instant::now();
        let result = self
            .register_existing_namespace_inner(request, user)
            .instrument(span)
            .await;
        record_outcome(FLOW_EXISTING, &result, started);
        result
    }

    async fn create_registration_inner(
        &self,
        request: &RegistrationRequest,
    ) -> Result<Registration, RegistrationError> {
        let namespace = request.namespace.trim();
        validate_fields(namespace, &request.repository)?;

        if self.config.impersonation.enabled {
            self.ensure_repository_unbound(&request.repository.url)
                .await?;
        }

        let exists = self
            .provisioner
            .namespace_exists(namespace)
            .await
            .map_err(|e| RegistrationError::dependency(RegistrationStep::NamespaceLookup, e))?;
        if exists {
            return Err(RegistrationError::NamespaceConflict(namespace.to_string()));
        }

        let mut registration = Registration::new(namespace, request.repository.clone());
        tracing::Span::current().record("registration_id", registration.id.as_str());
        info!(
            "Registering {} into new namespace {}",
            registration.repository.url, namespace
        );

        let (labels, annotations) = tenant_metadata(&registration);
        match self
            .provisioner
            .create_namespace_with_metadata(namespace, labels, annotations)
            .await
        {
            Ok(CreateOutcome::Created) => {
                registration.status.namespace_created = true;
                registration.touch();
            }
            Ok(CreateOutcome::AlreadyExisted) => {
                warn!("Namespace {} was created concurrently by another request", namespace);
                return Err(RegistrationError::NamespaceConflict(namespace.to_string()));
            }
            Err(e) => {
                return Err(RegistrationError::dependency(
                    RegistrationStep::NamespaceCreate,
                    e,
                ))
            }
        }

        let mut compensation = Compensation {
            namespace: Some(namespace.to_string()),
            app_project: None,
        };

        let mode = if self.config.impersonation.enabled {
            IdentityMode::Impersonation
        } else {
            IdentityMode::Legacy
        };
        self.complete_registration(registration, mode, &mut compensation)
            .await
    }

    async fn register_existing_namespace_inner(
        &self,
        request: &ExistingNamespaceRequest,
        user: &UserIdentity,
    ) -> Result<Registration, RegistrationError> {
        let namespace = request.existing_namespace.trim();
        validate_fields(namespace, &request.repository)?;

        if self.config.impersonation.enabled {
            self.ensure_repository_unbound(&request.repository.url)
                .await?;
        }

        let exists = self
            .provisioner
            .namespace_exists(namespace)
            .await
            .map_err(|e| RegistrationError::dependency(RegistrationStep::NamespaceLookup, e))?;
        if !exists {
            return Err(RegistrationError::NamespaceNotFound(namespace.to_string()));
        }

        let mut registration = Registration::new(namespace, request.repository.clone());
        registration.created_by = Some(user.username.clone());
        tracing::Span::current().record("registration_id", registration.id.as_str());
        info!(
            "Converting existing namespace {} to track {}",
            namespace, registration.repository.url
        );

        let (labels, mut annotations) = tenant_metadata(&registration);
        annotations.insert(ANNOTATION_REGISTERED_BY.to_string(), user.username.clone());
        if let Err(e) = self
            .provisioner
            .update_namespace_metadata(namespace, labels, annotations)
            .await
        {
            warn!(
                "Failed to update metadata on namespace {}, continuing: {}",
                namespace, e
            );
        }

        let mut compensation = Compensation {
            namespace: self
                .config
                .registration
                .rollback_existing_namespace
                .then(|| namespace.to_string()),
            app_project: None,
        };

        self.complete_registration(registration, IdentityMode::Legacy, &mut compensation)
            .await
    }

    /// Identity, AppProject and Application, then finalize
    async fn complete_registration(
        &self,
        mut registration: Registration,
        mode: IdentityMode,
        compensation: &mut Compensation,
    ) -> Result<Registration, RegistrationError> {
        let namespace = registration.namespace.clone();

        let service_account = match self.setup_identity(&namespace, mode).await {
            Ok(name) => name,
            Err(e) => {
                return Err(self
                    .fail(&mut registration, compensation, RegistrationStep::Identity, e)
                    .await)
            }
        };
        registration.status.service_account = Some(service_account.clone());
        registration.touch();

        let project_name = namespace.clone();
        let project = self.builder.build_app_project(
            &project_name,
            &namespace,
            &registration.repository.url,
            &service_account,
        );
        // The CD controller impersonates whenever the project maps a
        // destination service account, whichever identity mode set it up
        registration.status.impersonation_used =
            !project.spec.destination_service_accounts.is_empty();
        match self.cd_resources.create_app_project(project).await {
            Ok(_) => {
                info!("Created AppProject {}", project_name);
                compensation.app_project = Some(project_name.clone());
            }
            Err(e) if e.is_already_exists() => {
                info!("AppProject {} already exists", project_name);
            }
            Err(e) => {
                return Err(self
                    .fail(&mut registration, compensation, RegistrationStep::AppProject, e)
                    .await)
            }
        }
        registration.status.app_project_created = true;
        registration.status.argocd_app_project = Some(project_name.clone());
        registration.touch();

        let application_name = format!("{namespace}{APPLICATION_NAME_SUFFIX}");
        let application = self.builder.build_application(
            &application_name,
            &project_name,
            &registration.repository.url,
            &registration.repository.branch,
            &namespace,
        );
        match self.cd_resources.create_application(application).await {
            Ok(_) => info!("Created Application {}", application_name),
            Err(e) if e.is_already_exists() => {
                info!("Application {} already exists", application_name);
            }
            Err(e) => {
                return Err(self
                    .fail(&mut registration, compensation, RegistrationStep::Application, e)
                    .await)
            }
        }
        registration.status.application_created = true;
        registration.status.argocd_application = Some(application_name);

        registration.mark_active();
        info!(
            "Registration {} active for namespace {}",
            registration.id, namespace
        );
        Ok(registration)
    }

    /// Create the tenant's service account and role binding; returns the
    /// service account name
    async fn setup_identity(
        &self,
        namespace: &str,
        mode: IdentityMode,
    ) -> Result<String, ClusterError> {
        match mode {
            IdentityMode::Legacy => {
                self.provisioner
                    .create_service_account(namespace, LEGACY_SERVICE_ACCOUNT)
                    .await?;
                self.provisioner
                    .create_role_binding(
                        namespace,
                        LEGACY_ROLE_BINDING,
                        LEGACY_CLUSTER_ROLE,
                        LEGACY_SERVICE_ACCOUNT,
                    )
                    .await?;
                Ok(LEGACY_SERVICE_ACCOUNT.to_string())
            }
            IdentityMode::Impersonation => {
                let impersonation = &self.config.impersonation;
                let service_account = self
                    .provisioner
                    .create_service_account_with_generate_name(
                        namespace,
                        &impersonation.service_account_prefix,
                    )
                    .await?;
                self.provisioner
                    .create_role_binding_for_service_account(
                        namespace,
                        &service_account,
                        &impersonation.cluster_role,
                    )
                    .await?;
                Ok(service_account)
            }
        }
    }

    async fn ensure_repository_unbound(&self, repo_url: &str) -> Result<(), RegistrationError> {
        let hash = repository_hash(repo_url);
        let conflict = self
            .conflicts
            .find_repository_conflict(&hash)
            .await
            .map_err(|e| RegistrationError::dependency(RegistrationStep::ConflictCheck, e))?;
        match conflict {
            Some(conflict) => {
                info!(
                    "Repository {} (hash {}) already bound to AppProject {}",
                    repo_url, hash, conflict.app_project
                );
                Err(RegistrationError::RepositoryConflict {
                    repository_url: repo_url.to_string(),
                    app_project: conflict.app_project,
                })
            }
            None => Ok(()),
        }
    }

    /// Mark the registration failed, compensate, and build the error to return
    async fn fail(
        &self,
        registration: &mut Registration,
        compensation: &Compensation,
        step: RegistrationStep,
        source: ClusterError,
    ) -> RegistrationError {
        error!(
            "Registration {} failed during {}: {}",
            registration.id, step, source
        );
        registration.mark_failed(format!("Failed during {step}"));
        self.rollback(compensation).await;
        RegistrationError::dependency(step, source)
    }

    /// Best-effort removal of what this attempt created; failures are logged
    async fn rollback(&self, compensation: &Compensation) {
        if let Some(project) = &compensation.app_project {
            match self.cd_resources.delete_app_project(project).await {
                Ok(()) => info!("Rollback: deleted AppProject {}", project),
                Err(e) if e.is_not_found() => {}
                Err(e) => error!("Rollback: failed to delete AppProject {}: {}", project, e),
            }
        }

        match &compensation.namespace {
            Some(namespace) => match self.provisioner.delete_namespace(namespace).await {
                Ok(()) => {
                    info!("Rollback: deleted namespace {}", namespace);
                    metrics::increment_rollbacks("success");
                }
                Err(e) => {
                    error!("Rollback: failed to delete namespace {}: {}", namespace, e);
                    metrics::increment_rollbacks("failure");
                }
            },
            None => info!("Rollback: keeping pre-existing namespace"),
        }
    }
}

fn validate_fields(namespace: &str, repository: &Repository) -> Result<(), RegistrationError> {
    if namespace.trim().is_empty() {
        return Err(RegistrationError::Validation(
            "namespace is required".to_string(),
        ));
    }
    if repository.url.trim().is_empty() {
        return Err(RegistrationError::Validation(
            "repository.url is required".to_string(),
        ));
    }
    Ok(())
}

/// Labels and annotations recording a registration on its namespace
fn tenant_metadata(
    registration: &Registration,
) -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let url = &registration.repository.url;
    let labels = BTreeMap::from([
        (
            LABEL_REGISTRATION_ID.to_string(),
            short_registration_id(&registration.id),
        ),
        (LABEL_REPOSITORY_HASH.to_string(), repository_hash(url)),
        (LABEL_REPOSITORY_DOMAIN.to_string(), repository_domain(url)),
    ]);
    let annotations = BTreeMap::from([
        (ANNOTATION_REPOSITORY_URL.to_string(), url.clone()),
        (
            ANNOTATION_REPOSITORY_BRANCH.to_string(),
            registration.repository.branch.clone(),
        ),
        (ANNOTATION_REGISTRATION_ID.to_string(), registration.id.clone()),
    ]);
    (labels, annotations)
}

fn record_outcome(
    flow: &str,
    result: &Result<Registration, RegistrationError>,
    started: Instant,
) {
    let outcome = match result {
        Ok(_) => "success",
        Err(e) if e.is_conflict() => "conflict",
        Err(RegistrationError::Dependency { .. }) => "failure",
        Err(_) => "rejected",
    };
    metrics::record_registration(flow, outcome, started.elapsed().as_secs_f64());
}
