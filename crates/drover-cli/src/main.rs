//! `drover`: object store and EMR cluster operations from the shell.
//!
//! # Usage
//!
//! ```text
//! drover ls s3://bucket/prefix/
//! drover cat s3://bucket/report.csv
//! drover cp s3://bucket/in.csv s3://archive/
//! drover cluster launch nightly
//! drover cluster run etl --jar s3://jars/app.jar --job "com.acme.Load 2024-01-01"
//! drover step submit j-123 --jar s3://jars/app.jar --job com.acme.Report
//! drover step wait j-123 s-456
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use drover_cluster::ClusterManager;
use drover_core::{ActionOnFailure, ClusterId, DroverConfig, SparkJob, StepId, StepState};
use drover_storage::Session;

#[derive(Parser)]
#[command(name = "drover", version, about = "Object store and EMR cluster operations")]
struct Cli {
    /// Path to a JSON config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List objects at a path or under a prefix.
    Ls { path: String },
    /// Print an object to stdout.
    Cat { path: String },
    /// Delete an object or everything under a prefix.
    Rm { path: String },
    /// Copy an object or prefix.
    Cp { src: String, dst: String },
    /// Move an object or prefix.
    Mv { src: String, dst: String },
    /// Exit with status 1 if nothing exists at the path.
    Exists { path: String },

    /// Cluster operations.
    Cluster {
        #[command(subcommand)]
        action: ClusterCommands,
    },

    /// Step operations.
    Step {
        #[command(subcommand)]
        action: StepCommands,
    },
}

#[derive(Subcommand)]
enum ClusterCommands {
    /// Launch a long-lived cluster.
    Launch { name: String },
    /// Request termination of a cluster.
    Terminate { cluster_id: String },
    /// Show a cluster and its steps.
    Status { cluster_id: String },
    /// Launch a cluster that runs the given jobs and then terminates.
    Run {
        name: String,
        #[command(flatten)]
        jobs: JobArgs,
    },
}

#[derive(Subcommand)]
enum StepCommands {
    /// Show a step, with its error log if it failed.
    Status { cluster_id: String, step_id: String },
    /// Wait for a step to finish. Exits with status 1 unless it completed.
    Wait { cluster_id: String, step_id: String },
    /// Submit jobs to a running cluster.
    Submit {
        cluster_id: String,
        #[command(flatten)]
        jobs: JobArgs,
        /// Keep the cluster running if a step fails.
        #[arg(long)]
        continue_on_failure: bool,
    },
}

#[derive(clap::Args)]
struct JobArgs {
    /// Jar containing the job classes.
    #[arg(long)]
    jar: String,

    /// A job as "<class> [args...]". Can be given multiple times.
    #[arg(long = "job", required = true)]
    jobs: Vec<String>,
}

impl JobArgs {
    fn spark_jobs(&self) -> Result<Vec<SparkJob>> {
        self.jobs
            .iter()
            .map(|spec| {
                let mut parts = spec.split_whitespace();
                let Some(class_name) = parts.next() else {
                    bail!("empty --job");
                };
                Ok(SparkJob::new(class_name, parts))
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing();

    let config = match &cli.config {
        Some(path) => DroverConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => DroverConfig::default(),
    }
    .with_env_overrides()
    .context("invalid environment overrides")?;
    debug!(region = %config.region, "configuration loaded");

    match cli.command {
        Commands::Ls { path } => {
            for entry in Session::s3(&config).list(&path).await? {
                println!("{entry}");
            }
        }
        Commands::Cat { path } => {
            print!("{}", Session::s3(&config).get_string(&path).await?);
        }
        Commands::Rm { path } => {
            let removed = Session::s3(&config).delete(&path).await?;
            println!("deleted {removed} object(s)");
        }
        Commands::Cp { src, dst } => {
            let copied = Session::s3(&config).copy(&src, &dst).await?;
            println!("copied {copied} object(s)");
        }
        Commands::Mv { src, dst } => {
            let moved = Session::s3(&config).move_path(&src, &dst).await?;
            println!("moved {moved} object(s)");
        }
        Commands::Exists { path } => {
            let exists = Session::s3(&config).path_exists(&path).await?;
            println!("{exists}");
            if !exists {
                std::process::exit(1);
            }
        }
        Commands::Cluster { action } => cmd_cluster(config, action).await?,
        Commands::Step { action } => cmd_step(config, action).await?,
    }
    Ok(())
}

/// Logs go to stderr so `drover cat` output stays clean.
fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_cluster(config: DroverConfig, action: ClusterCommands) -> Result<()> {
    let manager = ClusterManager::from_config(config).await?;
    match action {
        ClusterCommands::Launch { name } => {
            println!("{}", manager.launch_cluster(&name).await?);
        }
        ClusterCommands::Terminate { cluster_id } => {
            manager.terminate_cluster(&ClusterId::new(cluster_id)).await?;
        }
        ClusterCommands::Status { cluster_id } => {
            print_json(&manager.cluster_status(&ClusterId::new(cluster_id)).await?)?;
        }
        ClusterCommands::Run { name, jobs } => {
            let launched = manager
                .launch_cluster_with_jobs(&name, &jobs.jar, &jobs.spark_jobs()?)
                .await?;
            print_json(&launched)?;
        }
    }
    Ok(())
}

async fn cmd_step(config: DroverConfig, action: StepCommands) -> Result<()> {
    let manager = ClusterManager::from_config(config).await?;
    match action {
        StepCommands::Status {
            cluster_id,
            step_id,
        } => {
            let status = manager
                .step_status(&StepId::new(step_id), &ClusterId::new(cluster_id))
                .await?;
            println!("{} {}", status.step.id, status.state());
            if let Some(log) = &status.error_log {
                println!("{log}");
            }
        }
        StepCommands::Wait {
            cluster_id,
            step_id,
        } => {
            let state = manager
                .report_step(&StepId::new(step_id), &ClusterId::new(cluster_id))
                .await?;
            println!("{state}");
            if state != StepState::Completed {
                std::process::exit(1);
            }
        }
        StepCommands::Submit {
            cluster_id,
            jobs,
            continue_on_failure,
        } => {
            let action_on_failure = if continue_on_failure {
                ActionOnFailure::Continue
            } else {
                ActionOnFailure::TerminateCluster
            };
            let ids = manager
                .run_steps_with(
                    &jobs.jar,
                    &ClusterId::new(cluster_id),
                    &jobs.spark_jobs()?,
                    action_on_failure,
                )
                .await?;
            for id in ids {
                println!("{id}");
            }
        }
    }
    Ok(())
}
