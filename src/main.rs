use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dataplane_compute::api::{self, AppState, SecurityConfig};
use dataplane_compute::config::Config;
use dataplane_compute::deploy::ComputeDeployment;
use dataplane_compute::models::*;
use dataplane_compute::reconcile::reconcile_node;

#[derive(Parser)]
#[command(name = "dpctl")]
#[command(about = "Deploy external compute for data plane nodes")]
struct Cli {
    /// SQLite database path (overrides DPCTL_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port for HTTP API (overrides DPCTL_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Manage data plane nodes
    #[command(subcommand)]
    Node(NodeCommand),
    /// Run one deploy pass for a node
    Deploy {
        #[command(flatten)]
        node: NodeRef,

        /// Secret holding the Ansible SSH private key
        #[arg(long)]
        ssh_key_secret: String,

        /// ConfigMap holding the node inventory
        #[arg(long)]
        inventory: String,

        /// Network attachment (repeatable)
        #[arg(long = "network-attachment")]
        network_attachments: Vec<String>,

        /// Ansible execution environment runner image
        #[arg(long)]
        image: String,
    },
    /// Inspect or report on external compute records
    #[command(subcommand)]
    Compute(ComputeCommand),
}

#[derive(Subcommand)]
enum NodeCommand {
    Create(NodeRef),
    Show(NodeRef),
    List,
    /// Delete a node and the records it owns
    Delete(NodeRef),
}

#[derive(Subcommand)]
enum ComputeCommand {
    Show(NodeRef),
    List,
    /// Set the Ready condition, as the deploying process would
    SetReady {
        #[command(flatten)]
        node: NodeRef,

        /// True, False or Unknown
        #[arg(long)]
        status: String,

        /// Error, Warning or Info (for False)
        #[arg(long, default_value = "")]
        severity: String,

        #[arg(long, default_value = "")]
        reason: String,

        #[arg(long, default_value = "")]
        message: String,
    },
}

#[derive(Args)]
struct NodeRef {
    #[arg(short, long, default_value = "openstack")]
    namespace: String,

    name: String,
}

impl NodeRef {
    fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }
}

/// Initialize tracing with output to stderr so stdout stays machine-readable
fn init_tracing(filter: &str) {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(filter))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env();
    if cli.db.is_some() {
        config.db_path = cli.db.clone();
    }
    init_tracing(&config.log_filter);

    let db = config.open_database()?;

    match cli.command {
        Commands::Serve { port } => {
            let port = port.unwrap_or(config.port);
            let state = AppState::new(db);
            let shutdown = state.shutdown.clone();
            let security = match &config.api_key {
                Some(key) => SecurityConfig::with_api_key(key),
                None => SecurityConfig::disabled(),
            };
            let app = api::create_router_with(state, security);

            let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
            tracing::info!("dpctl API listening on http://127.0.0.1:{}", port);

            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = tokio::signal::ctrl_c().await;
                    tracing::info!("Shutting down");
                    shutdown.cancel();
                })
                .await?;
        }
        Commands::Node(NodeCommand::Create(node)) => {
            let created = db.create_node(CreateNodeInput {
                namespace: node.namespace,
                name: node.name,
            })?;
            print_json(&created)?;
        }
        Commands::Node(NodeCommand::Show(node)) => {
            let key = node.key();
            let found = db
                .get_node(&key)?
                .with_context(|| format!("node {} not found", key))?;
            print_json(&found)?;
        }
        Commands::Node(NodeCommand::List) => {
            print_json(&db.list_nodes()?)?;
        }
        Commands::Node(NodeCommand::Delete(node)) => {
            let key = node.key();
            let dependents = db
                .delete_node(&key)?
                .with_context(|| format!("node {} not found", key))?;
            println!("Deleted node {} and {} dependent record(s)", key, dependents);
        }
        Commands::Deploy {
            node,
            ssh_key_secret,
            inventory,
            network_attachments,
            image,
        } => {
            let deployment = ComputeDeployment {
                ssh_key_secret,
                inventory_config_map: inventory,
                network_attachments,
                ansible_ee_image: image,
            };
            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_interrupt.cancel();
                }
            });

            let outcome = reconcile_node(&db, &db, &node.key(), &deployment, &cancel).await?;
            print_json(&outcome)?;
            if let Some(error) = outcome.error {
                anyhow::bail!(error);
            }
        }
        Commands::Compute(ComputeCommand::Show(node)) => {
            let key = node.key();
            let found = db
                .get_external_compute(&key)?
                .with_context(|| format!("NovaExternalCompute {} not found", key))?;
            print_json(&found)?;
        }
        Commands::Compute(ComputeCommand::List) => {
            print_json(&db.list_external_computes()?)?;
        }
        Commands::Compute(ComputeCommand::SetReady {
            node,
            status,
            severity,
            reason,
            message,
        }) => {
            let key = node.key();
            let status = ConditionStatus::from_str(&status)
                .with_context(|| format!("invalid condition status {:?}", status))?;
            let severity = Severity::from_str(&severity)
                .with_context(|| format!("invalid severity {:?}", severity))?;
            let mut compute = db
                .get_external_compute(&key)?
                .with_context(|| format!("NovaExternalCompute {} not found", key))?;

            compute.status.conditions.set(Condition {
                status,
                severity,
                ..Condition::unknown(READY, reason, message)
            });
            let updated = db.update_external_compute_status(
                &key,
                &compute.status,
                compute.metadata.resource_version,
            )?;
            print_json(&updated)?;
        }
    }

    Ok(())
}
