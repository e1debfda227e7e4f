/// cluster-broker - Kubernetes cluster operations across providers
///
/// Routes cluster lifecycle requests to the native compute provider or to
/// accounts of an external managed-cluster service, depending on which one
/// owns the target virtual datacenter.
mod broker;
mod config;
mod directory;
mod error;
mod manager;
mod session;
#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::broker::{NativeBroker, ProviderKind, RestBrokerFactory};
use crate::config::ServiceConfig;
use crate::directory::InMemoryDirectory;
use crate::manager::{BrokerManager, Operation, OperationRequest};

#[derive(Parser)]
#[command(name = "cluster-broker")]
#[command(about = "Dispatch Kubernetes cluster operations across providers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, default_value = "broker.yaml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate example configuration file
    Init,

    /// Cluster lifecycle operations
    Cluster {
        #[command(subcommand)]
        command: ClusterCommands,
    },

    /// Virtual datacenter operations
    Vdc {
        #[command(subcommand)]
        command: VdcCommands,
    },
}

/// Where a cluster lives; without a vdc the cluster is searched for
#[derive(clap::Args)]
struct Placement {
    /// Virtual datacenter owning the cluster
    #[arg(long)]
    vdc: Option<String>,

    /// Organization of the vdc, defaults to the session org
    #[arg(long)]
    org: Option<String>,
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// List clusters on every reachable provider, or on one vdc
    List {
        #[command(flatten)]
        placement: Placement,
    },

    /// Show one cluster
    Info {
        name: String,
        #[command(flatten)]
        placement: Placement,
    },

    /// Create a cluster
    Create {
        name: String,
        #[command(flatten)]
        placement: Placement,

        /// Number of worker nodes
        #[arg(long)]
        nodes: Option<u32>,

        /// External-service plan
        #[arg(long)]
        plan: Option<String>,

        /// Public hostname of the external-service cluster API
        #[arg(long)]
        external_host: Option<String>,

        #[arg(long)]
        storage_profile: Option<String>,

        #[arg(long)]
        network: Option<String>,

        #[arg(long)]
        template: Option<String>,
    },

    /// Change the worker count of a cluster
    Resize {
        name: String,
        #[command(flatten)]
        placement: Placement,

        #[arg(long)]
        nodes: u32,
    },

    /// Delete a cluster
    Delete {
        name: String,
        #[command(flatten)]
        placement: Placement,
    },

    /// Print the kubeconfig of a cluster
    Config {
        name: String,
        #[command(flatten)]
        placement: Placement,
    },
}

#[derive(Subcommand)]
enum VdcCommands {
    /// List vdcs and their container provider
    List,

    /// Show the provider binding of a vdc
    Info {
        /// Vdc id
        id: String,
    },

    /// Bind a vdc to a container provider
    Enable {
        /// Vdc id
        id: String,

        /// native, external or none
        #[arg(long)]
        provider: ProviderKind,

        /// External-service plans to offer in the vdc
        #[arg(long, value_delimiter = ',')]
        plans: Vec<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("cluster_broker={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let result = match cli.command {
        Commands::Init => init_config(&cli).await,
        Commands::Cluster { ref command } => {
            let (op, request) = cluster_request(command);
            dispatch(&cli, op, request).await
        }
        Commands::Vdc { ref command } => {
            let (op, request) = vdc_request(command);
            dispatch(&cli, op, request).await
        }
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn placed(name: Option<&str>, placement: &Placement) -> OperationRequest {
    let mut request = name.map(OperationRequest::for_cluster).unwrap_or_default();
    if let Some(vdc) = &placement.vdc {
        request = request.in_vdc(vdc);
    }
    if let Some(org) = &placement.org {
        request = request.in_org(org);
    }
    request
}

fn cluster_request(command: &ClusterCommands) -> (Operation, OperationRequest) {
    match command {
        ClusterCommands::List { placement } => (Operation::ListClusters, placed(None, placement)),
        ClusterCommands::Info { name, placement } => {
            (Operation::GetCluster, placed(Some(name.as_str()), placement))
        }
        ClusterCommands::Create {
            name,
            placement,
            nodes,
            plan,
            external_host,
            storage_profile,
            network,
            template,
        } => (
            Operation::CreateCluster,
            OperationRequest {
                node_count: *nodes,
                plan: plan.clone(),
                external_host: external_host.clone(),
                storage_profile: storage_profile.clone(),
                network: network.clone(),
                template: template.clone(),
                ..placed(Some(name.as_str()), placement)
            },
        ),
        ClusterCommands::Resize {
            name,
            placement,
            nodes,
        } => (
            Operation::ResizeCluster,
            placed(Some(name.as_str()), placement).with_node_count(*nodes),
        ),
        ClusterCommands::Delete { name, placement } => {
            (Operation::DeleteCluster, placed(Some(name.as_str()), placement))
        }
        ClusterCommands::Config { name, placement } => {
            (Operation::GetClusterConfig, placed(Some(name.as_str()), placement))
        }
    }
}

fn vdc_request(command: &VdcCommands) -> (Operation, OperationRequest) {
    match command {
        VdcCommands::List => (Operation::ListOvdcs, OperationRequest::default()),
        VdcCommands::Info { id } => (
            Operation::InfoOvdc,
            OperationRequest {
                ovdc_id: Some(id.clone()),
                ..Default::default()
            },
        ),
        VdcCommands::Enable {
            id,
            provider,
            plans,
        } => (
            Operation::EnableOvdc,
            OperationRequest {
                ovdc_id: Some(id.clone()),
                container_provider: Some(*provider),
                plans: plans.clone(),
                ..Default::default()
            },
        ),
    }
}

/// Build the dispatcher from configuration and run one operation
async fn dispatch(cli: &Cli, op: Operation, request: OperationRequest) -> Result<()> {
    let config = ServiceConfig::from_file(&cli.config).context("Failed to load configuration")?;

    let timeout = config.search.probe_timeout();
    let token = config.get_native_token()?;
    let native = NativeBroker::new(&config.native.endpoint, &token, timeout)?;
    let factory = RestBrokerFactory::new(native, timeout);
    let directory = InMemoryDirectory::from_config(&config);

    let manager = BrokerManager::new(
        Arc::new(directory),
        Arc::new(factory),
        config.session.clone(),
        config.search.clone(),
    );

    info!("Running {} as {}", op, config.session.user);
    let response = manager
        .invoke(op, &request)
        .await
        .with_context(|| format!("Failed to {}", op))?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Initialize example configuration file
async fn init_config(cli: &Cli) -> Result<()> {
    if cli.config.exists() {
        anyhow::bail!(
            "Configuration file already exists: {}",
            cli.config.display()
        );
    }

    let example_config = ServiceConfig::example();
    let yaml = serde_yaml::to_string(&example_config)?;

    tokio::fs::write(&cli.config, yaml)
        .await
        .context("Failed to write configuration file")?;

    info!("Example configuration created: {}", cli.config.display());
    info!("");
    info!("Next steps:");
    info!("  1. Edit the configuration file to match your environment");
    info!("  2. Set the native provider API token:");
    info!("     export NATIVE_API_TOKEN=your-token-here");
    info!("  3. List clusters:");
    info!("     cluster-broker cluster list");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_resize() {
        let cli = Cli::try_parse_from([
            "cluster-broker",
            "cluster",
            "resize",
            "web-app",
            "--nodes",
            "5",
            "--vdc",
            "vdc1",
        ])
        .unwrap();
        let Commands::Cluster { command } = cli.command else {
            panic!("expected cluster command");
        };
        let (op, request) = cluster_request(&command);
        assert_eq!(op, Operation::ResizeCluster);
        assert_eq!(request.cluster_name.as_deref(), Some("web-app"));
        assert_eq!(request.node_count, Some(5));
        assert_eq!(request.vdc.as_deref(), Some("vdc1"));
    }

    #[test]
    fn test_cli_parses_enable() {
        let cli = Cli::try_parse_from([
            "cluster-broker",
            "vdc",
            "enable",
            "vdc-2",
            "--provider",
            "external",
            "--plans",
            "small,large",
        ])
        .unwrap();
        let Commands::Vdc { command } = cli.command else {
            panic!("expected vdc command");
        };
        let (op, request) = vdc_request(&command);
        assert_eq!(op, Operation::EnableOvdc);
        assert_eq!(request.container_provider, Some(ProviderKind::External));
        assert_eq!(request.plans, ["small", "large"]);
    }
}
