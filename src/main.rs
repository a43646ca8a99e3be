//! # GitOps Registration Service
//!
//! Serves the registration API. Startup order:
//!
//! 1. Install the rustls crypto provider
//! 2. Load configuration and initialize logging
//! 3. Register metrics and build the Kubernetes client
//! 4. Analyze the impersonation ClusterRole (warnings only)
//! 5. Serve HTTP until SIGTERM / Ctrl+C

use anyhow::{Context, Result};
use clap::Parser;
use gitops_registration::auth::KubeAuthorizer;
use gitops_registration::cluster::ClusterClients;
use gitops_registration::config::ServiceConfig;
use gitops_registration::observability::{init_tracing, metrics};
use gitops_registration::registration::RegistrationService;
use gitops_registration::server::{start_server, ServerState};
use kube::Client;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "gitops-registration-service", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(long, env = "CONFIG_FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // kube's rustls-tls needs a process-wide provider before the first client
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider was already installed");
    }

    let args = Args::parse();
    let config = ServiceConfig::load(args.config.as_deref())
        .context("Failed to load configuration")?;
    init_tracing(&config.log_level, config.log_format);

    info!(
        "Starting GitOps Registration Service (build {} at {})",
        env!("BUILD_GIT_HASH"),
        env!("BUILD_DATETIME")
    );
    info!(
        "ArgoCD namespace: {}, impersonation: {}",
        config.argocd.namespace, config.impersonation.enabled
    );

    metrics::register_metrics()?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let clients = ClusterClients::kube(client.clone(), &config.argocd.namespace);

    let port = config.server.port;
    let registrations = Arc::new(
        RegistrationService::new(clients, Arc::new(config))
            .with_authorizer(Arc::new(KubeAuthorizer::new(client))),
    );

    if let Err(e) = registrations.validate_impersonation_role().await {
        warn!("Could not analyze impersonation ClusterRole: {}", e);
    }

    let state = Arc::new(ServerState::new(Arc::clone(&registrations)));
    state.is_ready.store(true, Ordering::Relaxed);

    start_server(port, state).await?;
    info!("GitOps Registration Service stopped");
    Ok(())
}
