mod config;
mod run_cmd;
mod status_cmd;
mod validate_cmd;
mod worker;

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use drover_files::WorkerRegistry;

#[derive(Parser)]
#[command(name = "drover", about = "Drive fleets of autonomous workers through task graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Validate a task directory: cycles, levels, readiness
    Validate {
        /// Directory of task descriptors
        dir: PathBuf,
    },
    /// Show the task table and aggregate counts
    Status {
        /// Directory of task descriptors
        dir: PathBuf,
    },
    /// Run the orchestrator over a task directory
    Run {
        /// Directory of task descriptors
        dir: PathBuf,
        /// Event-loop tick in seconds
        #[arg(long)]
        poll_interval: Option<u64>,
        /// Per-role concurrency cap as role=N (repeatable)
        #[arg(long = "role-cap", value_parser = parse_role_cap)]
        role_caps: Vec<(String, usize)>,
        /// Spawn workers for roles that have tasks but no workers
        #[arg(long)]
        auto_spawn: bool,
        /// Keep running after all work settles
        #[arg(long)]
        watch: bool,
        /// Shell command run per worker invocation (prompt on stdin)
        #[arg(long)]
        worker_command: Option<String>,
    },
    /// List registered workers
    Workers {
        /// Directory of task descriptors
        dir: PathBuf,
    },
}

fn parse_role_cap(raw: &str) -> Result<(String, usize), String> {
    let (role, cap) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected role=N, got {raw:?}"))?;
    if role.is_empty() {
        return Err(format!("empty role in {raw:?}"));
    }
    let cap: usize = cap
        .parse()
        .map_err(|_| format!("invalid concurrency {cap:?} in {raw:?}"))?;
    if cap == 0 {
        return Err(format!("concurrency must be at least 1 in {raw:?}"));
    }
    Ok((role.to_owned(), cap))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("drover=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init { force } => init(force),
        Commands::Validate { dir } => validate_cmd::validate(&dir).await,
        Commands::Status { dir } => status_cmd::status(&dir).await,
        Commands::Run {
            dir,
            poll_interval,
            role_caps,
            auto_spawn,
            watch,
            worker_command,
        } => {
            let file = config::load_config()?;
            let flags = run_cmd::RunFlags {
                poll_interval_secs: poll_interval,
                role_caps,
                auto_spawn,
                watch,
                worker_command,
            };
            run_cmd::run(&dir, flags, &file).await
        }
        Commands::Workers { dir } => workers(&dir),
    }
}

fn init(force: bool) -> Result<()> {
    let path = config::config_path();
    if path.exists() && !force {
        bail!(
            "config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    config::save_config(&config::ConfigFile::default())?;
    println!("wrote {}", path.display());
    Ok(())
}

fn workers(dir: &std::path::Path) -> Result<()> {
    let registry = WorkerRegistry::new(dir.join(".drover").join("workers.json"));
    let records = registry.load()?;
    if records.is_empty() {
        println!("no workers registered in {}", dir.display());
        return Ok(());
    }
    println!("{:<16} {:<10} {:<10} COMMAND", "NAME", "ROLE", "STATUS");
    for record in records {
        println!(
            "{:<16} {:<10} {:<10} {}",
            record.name,
            record.role,
            record.status.to_string(),
            record.command.as_deref().unwrap_or("(default)"),
        );
    }
    Ok(())
}
