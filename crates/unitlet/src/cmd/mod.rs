//! Command layer: runs one provider operation per invocation.

use core::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::config::Cli;
use crate::config::Commands;
use crate::config::OutputFormat;
use crate::config::ProviderArgs;
use crate::domain::provider::configure_node;
use crate::domain::provider::Provider;
use crate::domain::provider::Unitlet;
use crate::infrastructure::file_store::FileStore;
use crate::infrastructure::systemd::SystemdManager;

#[derive(Debug, derive_more::Display)]
pub enum CommandError {
    #[display("Failed to set up the provider")]
    Setup,
    #[display("Failed to read pod manifest")]
    Manifest,
    #[display("Provider operation failed")]
    Provider,
    #[display("Failed to render output")]
    Output,
}

impl Error for CommandError {}

/// Cancels when the deadline passes or on Ctrl-C.
fn deadline_token(timeout: Duration) -> CancellationToken {
    let cancel = CancellationToken::new();

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    warn!(?timeout, "deadline exceeded, cancelling");
                    cancel.cancel();
                }
                result = tokio::signal::ctrl_c() => {
                    if result.is_ok() {
                        warn!("interrupted, cancelling");
                        cancel.cancel();
                    }
                }
            }
        }
    });

    cancel
}

async fn read_manifest(path: &Path) -> Result<Pod, Report<CommandError>> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .change_context(CommandError::Manifest)
        .attach_printable_lazy(|| format!("path: {}", path.display()))?;
    serde_yaml::from_str(&raw)
        .change_context(CommandError::Manifest)
        .attach_printable_lazy(|| format!("path: {}", path.display()))
}

fn render<T: Serialize>(value: &T, format: OutputFormat) -> Result<String, Report<CommandError>> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(value).change_context(CommandError::Output)
        }
        OutputFormat::Yaml => serde_yaml::to_string(value).change_context(CommandError::Output),
    }
}

fn print<T: Serialize>(value: &T, format: OutputFormat) -> Result<(), Report<CommandError>> {
    println!("{}", render(value, format)?.trim_end());
    Ok(())
}

async fn build_provider(
    args: &ProviderArgs,
) -> Result<Unitlet<FileStore, SystemdManager>, Report<CommandError>> {
    let manager = SystemdManager::connect(args.bus())
        .await
        .change_context(CommandError::Setup)?;
    let store = FileStore::new(&args.unit_dir)
        .await
        .change_context(CommandError::Setup)?;
    Ok(Unitlet::new(
        args.node_name(),
        Arc::new(store),
        Arc::new(manager),
        args.node_config(),
    ))
}

/// Node object as configured by the provider, without touching systemd.
pub fn node_object(args: &ProviderArgs) -> Node {
    let mut node = Node {
        metadata: ObjectMeta {
            name: Some(args.node_name()),
            ..Default::default()
        },
        ..Default::default()
    };
    configure_node(&mut node, &args.node_config());
    node
}

pub async fn run(cli: Cli) -> Result<(), Report<CommandError>> {
    let args = cli.provider;

    if let Commands::Node(output) = &cli.command {
        return print(&node_object(&args), output.output);
    }

    let cancel = deadline_token(Duration::from_secs(args.timeout_secs));
    let _stop_timer = cancel.clone().drop_guard();
    let provider = build_provider(&args).await?;

    match cli.command {
        Commands::Create(manifest) => {
            let pod = read_manifest(&manifest.file).await?;
            provider
                .create_pod(&pod, &cancel)
                .await
                .change_context(CommandError::Provider)?;
            info!(pod = ?pod.metadata.name, "pod created");
        }
        Commands::Delete(manifest) => {
            let pod = read_manifest(&manifest.file).await?;
            provider
                .delete_pod(&pod, &cancel)
                .await
                .change_context(CommandError::Provider)?;
            info!(pod = ?pod.metadata.name, "pod deleted");
        }
        Commands::Get(target) => {
            let pod = provider
                .get_pod(&target.namespace, &target.name, &cancel)
                .await
                .change_context(CommandError::Provider)?;
            print(&pod, target.output.output)?;
        }
        Commands::Status(target) => {
            let status = provider
                .get_pod_status(&target.namespace, &target.name, &cancel)
                .await
                .change_context(CommandError::Provider)?;
            print(&status, target.output.output)?;
        }
        Commands::List(output) => {
            let pods = provider
                .get_pods(&cancel)
                .await
                .change_context(CommandError::Provider)?;
            print(&pods, output.output)?;
        }
        Commands::Node(_) => {}
    }

    Ok(())
}
