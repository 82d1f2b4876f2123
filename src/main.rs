use clap::{Parser, Subcommand, ValueEnum};
use kube::ResourceExt;
use patchroll::cluster::{build_client, KubeCluster};
use patchroll::config::{parse_duration_arg, RolloutConfig};
use patchroll::controller::clock::SystemClock;
use patchroll::controller::rollout::{
    duplicate_by_name, restart_by_name, trigger_smart_rollout, Context,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Zero-downtime rollouts for Deployments and the Services in front of them
#[derive(Debug, Parser)]
#[command(name = "patchroll", version, about)]
pub struct Cli {
    /// Kubernetes namespace to work in
    #[arg(short, long, global = true, default_value = "default")]
    pub namespace: String,

    /// Path to a kubeconfig file (default: in-cluster, then KUBECONFIG / ~/.kube/config)
    #[arg(long, global = true)]
    pub kubeconfig: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, value_enum, default_value_t = Output::Text)]
    pub output: Output,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Output {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Restart all pods of a Deployment using its own rolling-update strategy
    Restart {
        /// metadata.name of the Deployment
        name: String,
    },

    /// Create a copy of a Deployment named `<base-name>-<timestamp>`
    ///
    /// If the Deployment already carries a timestamp suffix, the copy gets a
    /// fresh one.
    Duplicate {
        /// metadata.name of the Deployment
        name: String,
    },

    /// Duplicate every Deployment under a label, wait until the copies are
    /// ready, point the Services at them, then remove the old Deployments
    SmartRollout {
        /// Common label of Deployments, pods and Services, e.g. app=my-app
        selector: String,

        /// Keep the old Deployments after the Services were patched
        #[arg(long)]
        no_cleanup: bool,

        /// Duplicate and await all Deployments concurrently
        #[arg(long, conflicts_with = "sequential")]
        parallel: bool,

        /// Handle Deployments one at a time, even if PATCHROLL_PARALLEL is set
        #[arg(long)]
        sequential: bool,

        /// Give up waiting for a Deployment after this long, e.g. 90s, 10m
        #[arg(long, value_parser = parse_duration_arg)]
        readiness_timeout: Option<Duration>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();
    debug!(args = ?cli, "Parsed arguments");

    let config = RolloutConfig::from_env()?;

    let client = match build_client(cli.kubeconfig.as_deref()).await {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, "Failed to create Kubernetes client");
            return Err(e);
        }
    };

    let namespace = cli.namespace.as_str();

    match cli.command {
        Command::Restart { name } => {
            let ctx = Context::new(
                Arc::new(KubeCluster::new(client)),
                Arc::new(SystemClock),
                config,
            );
            restart_by_name(&ctx, &name, namespace)
                .await
                .inspect_err(|e| error!(error = %e, deployment = ?name, "Restart failed"))?;
            info!(deployment = ?name, namespace = ?namespace, "Restart triggered");
            println!("{}", name);
        }
        Command::Duplicate { name } => {
            let ctx = Context::new(
                Arc::new(KubeCluster::new(client)),
                Arc::new(SystemClock),
                config,
            );
            let copy = duplicate_by_name(&ctx, &name, namespace)
                .await
                .inspect_err(|e| error!(error = %e, deployment = ?name, "Duplicate failed"))?;
            info!(deployment = ?name, copy = ?copy.name_any(), "Copy of deployment created");
            println!("{}", copy.name_any());
        }
        Command::SmartRollout {
            selector,
            no_cleanup,
            parallel,
            sequential,
            readiness_timeout,
        } => {
            let parallel = match (parallel, sequential) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            };
            let ctx = Context::new(
                Arc::new(KubeCluster::new(client)),
                Arc::new(SystemClock),
                config.with_overrides(readiness_timeout, parallel),
            );
            let report = trigger_smart_rollout(&ctx, &selector, namespace, !no_cleanup)
                .await
                .inspect_err(|e| error!(error = %e, selector = ?selector, "Smart rollout failed"))?;
            info!(version = %report.version, "All done");

            match cli.output {
                Output::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                Output::Text => {
                    for r in &report.replacements {
                        println!("{}", r.new);
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
