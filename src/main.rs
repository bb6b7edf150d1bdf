use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lpjobs::{Config, JobManager, JobView};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lpjobs")]
#[command(about = "Run and watch pose-estimation jobs", long_about = None)]
struct Args {
    /// Config file (defaults to the first of ~/.config/lpjobs/config.toml, ~/.lpjobs.toml, ./lpjobs.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Status monitor interval in milliseconds
    #[arg(short, long, global = true)]
    interval_ms: Option<u64>,

    /// Print job tables as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start jobs and watch them until they all stop or Ctrl-C
    Run {
        /// Job to start, as NAME=COMMAND
        #[arg(short, long = "job", value_parser = parse_job)]
        jobs: Vec<(String, String)>,

        /// Preset to start (name, shortcut, or fuzzy query)
        #[arg(short, long = "preset")]
        presets: Vec<String>,
    },
    /// Run TensorBoard as a managed job
    Tensorboard {
        /// Directory holding training outputs
        #[arg(long, default_value = "outputs")]
        logdir: PathBuf,

        #[arg(long, default_value_t = 6007)]
        port: u16,
    },
    /// List configured presets
    Presets {
        /// Fuzzy filter
        query: Option<String>,
    },
}

fn parse_job(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, command)) if !name.trim().is_empty() && !command.trim().is_empty() => {
            Ok((name.trim().to_string(), command.to_string()))
        }
        _ => Err(format!("expected NAME=COMMAND, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lpjobs=info")),
        )
        .with_target(false)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    if let Some(ms) = args.interval_ms {
        config.monitor.interval_ms = ms;
    }

    match &args.command {
        Command::Run { jobs, presets } => run(&config, jobs, presets, args.json).await,
        Command::Tensorboard { logdir, port } => {
            let command = format!("tensorboard --logdir {} --port {port}", logdir.display());
            println!("TensorBoard: http://localhost:{port}");
            run(&config, &[("tensorboard".to_string(), command)], &[], args.json).await
        }
        Command::Presets { query } => {
            let presets = config.presets();
            for (preset, _) in presets.fuzzy_search(query.as_deref().unwrap_or("")) {
                let shortcut = preset.shortcut.as_deref().unwrap_or("-");
                let auto = if preset.autostart { " (autostart)" } else { "" };
                println!("{:<20} {:<6} {}{auto}", preset.name, shortcut, preset.command);
            }
            Ok(())
        }
    }
}

/// Start the requested jobs, print the table on every change, and wait
async fn run(
    config: &Config,
    jobs: &[(String, String)],
    preset_queries: &[String],
    json: bool,
) -> Result<()> {
    let manager = JobManager::new(config.manager_settings());

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager.on_status_change(move |_| {
        let _ = tx.send(());
    });

    let presets = config.presets();
    let mut started = 0;

    for (name, command) in jobs {
        if manager.start_job(name, command) {
            started += 1;
        }
    }
    for query in preset_queries {
        let preset = presets
            .resolve(query)
            .with_context(|| format!("No preset matches '{query}'"))?;
        if manager.start_preset(preset) {
            started += 1;
        }
    }
    for preset in presets.autostart() {
        if manager.start_preset(preset) {
            started += 1;
        }
    }

    if started == 0 {
        manager.shutdown().await;
        bail!("No jobs started");
    }
    info!(started, interval = ?manager.settings().interval, "Watching jobs");

    loop {
        tokio::select! {
            changed = rx.recv() => {
                if changed.is_none() {
                    break;
                }
                // Coalesce bursts into one table
                while rx.try_recv().is_ok() {}
                print_jobs(&manager.get_jobs(), json)?;
                if manager.running_count() == 0 {
                    info!("All jobs stopped");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, stopping jobs");
                break;
            }
        }
    }

    manager.shutdown().await;
    // Give terminated jobs a moment to exit before we do
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(())
}

fn print_jobs(jobs: &BTreeMap<String, JobView>, json: bool) -> Result<()> {
    if json {
        let views: Vec<&JobView> = jobs.values().collect();
        println!("{}", serde_json::to_string(&views)?);
        return Ok(());
    }

    println!("{:<20} {:<8} {:<8} COMMAND", "NAME", "STATUS", "PID");
    for job in jobs.values() {
        let pid = job
            .process_id
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<20} {:<8} {:<8} {}", job.name, job.status.to_string(), pid, job.command);
    }
    Ok(())
}
