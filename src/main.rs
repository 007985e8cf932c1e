//! crontab - a cron replacement for containers.
//!
//! Usage:
//!   crontab run -c config.yaml            Start every enabled job
//!   crontab validate -c config.yaml       Validate the configuration
//!   crontab list -c config.yaml           List jobs, triggers and tasks
//!   crontab trigger <job> -c config.yaml  Run one job's task chain once
//!   crontab parse /etc/crontab -u         Convert a crontab file to YAML

use clap::{Parser, Subcommand};
use crontab::api::{self, ApiState};
use crontab::config::crontab::{self as crontab_file, DEFAULT_MATCHER};
use crontab::config::{Config, CrontabImport, LogFormat, YamlLoader};
use crontab::{EventData, GlobalState, Job, JobRunner, ShellDefaults};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// crontab - event driven jobs with retries, hooks and remote connections
#[derive(Parser)]
#[command(name = "crontab")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every enabled job and wait for ctrl-c
    Run {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },

    /// Validate the configuration without running anything
    Validate {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },

    /// List jobs with their triggers and tasks
    List {
        /// Path to the configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },

    /// Run one job's task chain once and exit
    Trigger {
        /// Name of the job
        #[arg(value_name = "JOB")]
        job: String,

        /// Path to the configuration file
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },

    /// Convert a crontab file into configuration YAML
    Parse {
        /// Path to the crontab file
        #[arg(value_name = "CRONTAB")]
        file: PathBuf,

        /// Also write the configuration to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Lines carry a user field after the timing, as in /etc/crontab
        #[arg(short = 'u', long)]
        with_user: bool,

        /// Regex matching the timing part of a line
        #[arg(long, default_value = DEFAULT_MATCHER)]
        matcher: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = load(&config)?;
            run(config).await?;
        }
        Commands::Validate { config } => {
            init_logging(&Config::default());
            validate(config)?;
        }
        Commands::List { config } => {
            let config = YamlLoader::load_config(&config)?;
            list(&config);
        }
        Commands::Trigger { job, config } => {
            let config = load(&config)?;
            trigger(config, job).await?;
        }
        Commands::Parse {
            file,
            output,
            with_user,
            matcher,
        } => {
            parse(&file, output.as_deref(), with_user, &matcher)?;
        }
    }

    Ok(())
}

fn load(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
    let config = YamlLoader::load_config(path)?;
    init_logging(&config);
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_directive()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Plain => builder.with_ansi(false).init(),
        LogFormat::Ansi => builder.init(),
    }
}

fn global_state(config: &Config) -> Arc<GlobalState> {
    let mut shell = ShellDefaults::default();
    if let Some(s) = config.shell.as_deref().filter(|s| !s.is_empty()) {
        shell.shell = s.to_string();
    }
    if let Some(args) = &config.shell_args {
        shell.shell_args = args.clone();
    }
    Arc::new(GlobalState::with_shell(shell))
}

/// Start the web server and every enabled job, then wait for ctrl-c.
async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let state = global_state(&config);
    let shutdown = CancellationToken::new();

    let mut runner = JobRunner::new(Arc::clone(&state)).with_shutdown(shutdown.clone());
    let started = runner.add_all(&config.jobs)?;
    if started == 0 {
        warn!("No enabled jobs in configuration");
    }

    let server = match &config.webserver {
        Some(web) => {
            let mut api_state = ApiState::new(Arc::clone(&state));
            if web.metrics {
                api_state = api_state.with_metrics(api::install_metrics()?);
            }
            if let Some((user, password)) = web.credentials() {
                api_state = api_state.with_credentials(user, password);
            }
            Some(api::start_server(web, api_state, shutdown.clone()).await?)
        }
        None => None,
    };

    info!("Starting {} job(s)...", started);
    info!("Press Ctrl+C to stop");
    let handle = runner.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    handle.shutdown();
    state.cron_engine().shutdown();
    handle.join().await;
    if let Some(server) = server {
        if let Err(e) = server.await {
            error!("API server task failed: {}", e);
        }
    }

    info!("Goodbye!");
    Ok(())
}

/// Validate the configuration without running.
fn validate(path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    info!("Validating {}", path.display());

    match YamlLoader::load_config(&path) {
        Ok(config) => {
            let state = global_state(&config);
            for job in config.jobs.iter().filter(|j| !j.disabled) {
                Job::compile(job, &state)?;
            }
            info!("All {} job(s) are valid:", config.jobs.len());
            for job in &config.jobs {
                let status = if job.disabled { "disabled" } else { "OK" };
                info!("  - {}: {}", job.name, status);
            }
            Ok(())
        }
        Err(e) => {
            error!("Validation failed: {}", e);
            Err(e.into())
        }
    }
}

/// Print jobs with their triggers and tasks.
fn list(config: &Config) {
    if config.jobs.is_empty() {
        println!("No jobs configured");
        return;
    }

    for job in &config.jobs {
        println!("Job: {}", job.name);
        if let Some(description) = &job.description {
            println!("  Description: {}", description);
        }
        println!("  Enabled: {}", !job.disabled);
        println!("  Concurrency: {}", job.concurrency());
        println!("  Events:");
        for event in &job.events {
            println!("    - {}", event);
        }
        println!("  Tasks: {}", job.tasks.len());
        for task in &job.tasks {
            println!("    - {}", task.id());
        }
        if !job.hooks.done.is_empty() || !job.hooks.failed.is_empty() {
            println!(
                "  Hooks: {} done, {} failed",
                job.hooks.done.len(),
                job.hooks.failed.len()
            );
        }
        println!();
    }
}

/// Run one job's task chain once.
async fn trigger(config: Config, name: String) -> Result<(), Box<dyn std::error::Error>> {
    let Some(job) = config.jobs.iter().find(|j| j.name == name) else {
        error!("Job '{}' not found", name);
        error!(
            "Available jobs: {}",
            config
                .jobs
                .iter()
                .map(|j| j.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        return Err(format!("Job '{}' not found", name).into());
    };

    let state = global_state(&config);
    let job = Job::compile(job, &state)?;
    let failures = job
        .run_chain(EventData::new("manual"), &CancellationToken::new())
        .await;

    if failures > 0 {
        return Err(format!("{} task(s) of '{}' failed", failures, name).into());
    }
    info!("Job '{}' completed", name);
    Ok(())
}

/// Convert a crontab file and print the resulting configuration.
fn parse(
    file: &Path,
    output: Option<&Path>,
    with_user: bool,
    matcher: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("can't open cron file '{}': {}", file.display(), e))?;
    let config = CrontabImport::new(matcher, with_user)?.parse(&content)?;
    let yaml = crontab_file::to_yaml(&config)?;

    println!("{}", yaml);
    if let Some(output) = output {
        std::fs::write(output, &yaml)?;
        eprintln!("Configuration written to {}", output.display());
    }
    Ok(())
}
