#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use kmon_api::{InProcApi, MonitorApi};
use kmon_core::{ChangeRecord, ChangeStats, MonitorConfig};
use kmon_kubehub::KubeSource;
use kmon_monitor::Engine;
use kmon_store::ChangeLog;
use tokio::signal;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "kmonctl", version, about = "Kubernetes change monitor")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Configuration file (created with defaults when missing)
    #[arg(long = "config", env = "KMON_CONFIG", global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the cluster and record changes until Ctrl-C
    Run {
        /// Seconds between stats log lines (0 disables)
        #[arg(long = "stats-every", default_value_t = 60)]
        stats_every: u64,
    },
    /// Print changes from the persisted snapshot
    Changes {
        /// Only changes not yet marked read
        #[arg(long = "unread", action = ArgAction::SetTrue)]
        unread: bool,
        /// Show at most this many, newest last
        #[arg(long = "limit")]
        limit: Option<usize>,
    },
    /// Summarize the persisted snapshot
    Stats,
    /// Print the effective configuration
    Config,
}

fn init_tracing() {
    let env = std::env::var("KMON_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("KMON_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid KMON_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = MonitorConfig::load(&cli.config).with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Commands::Run { stats_every } => {
            init_metrics();
            run(cfg, stats_every).await?;
        }
        Commands::Changes { unread, limit } => {
            let mut changes = read_changes(&cfg.persistence.file_path)?;
            if unread {
                changes.retain(|c| !c.is_read);
            }
            if let Some(n) = limit {
                let skip = changes.len().saturating_sub(n);
                changes.drain(..skip);
            }
            match cli.output {
                Output::Human => print_changes(&changes),
                Output::Json => println!("{}", serde_json::to_string_pretty(&changes)?),
            }
        }
        Commands::Stats => {
            let log = ChangeLog::new(Utc::now());
            log.restore(read_changes(&cfg.persistence.file_path)?);
            let stats = log.stats();
            match cli.output {
                Output::Human => print_stats(&stats),
                Output::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
            }
        }
        Commands::Config => match cli.output {
            Output::Human => {
                for r in &cfg.resources {
                    let on = if r.enabled { "on " } else { "off" };
                    println!("{} {:<24} {}", on, r.name, r.namespace().unwrap_or("(all)"));
                }
                let p = &cfg.persistence;
                println!(
                    "persistence: {} • {} • auto-save {} every {}s",
                    if p.enabled { "enabled" } else { "disabled" },
                    p.file_path.display(),
                    if p.auto_save { "on" } else { "off" },
                    p.save_interval
                );
            }
            Output::Json => println!("{}", serde_json::to_string_pretty(&cfg)?),
        },
    }
    Ok(())
}

async fn run(cfg: MonitorConfig, stats_every: u64) -> Result<()> {
    let source = KubeSource::try_default().await?;
    let engine = Arc::new(Engine::open(cfg, Arc::new(source)));
    let api = InProcApi::new(Arc::clone(&engine));
    engine.start().await;

    let mut ticker = tokio::time::interval(Duration::from_secs(stats_every.max(1)));
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick(), if stats_every > 0 => {
                if let Ok(s) = api.stats().await {
                    info!(total = s.total, unread = s.unread, session = s.current_session, uptime_secs = s.uptime_secs, "change log stats");
                }
            }
            _ = signal::ctrl_c() => {
                info!("Ctrl-C received; shutting down");
                break;
            }
        }
    }
    engine.shutdown().await;
    Ok(())
}

fn read_changes(path: &Path) -> Result<Vec<ChangeRecord>> {
    match kmon_persist::read_snapshot(path)? {
        Some(snap) => Ok(snap.changes),
        None => {
            warn!(path = %path.display(), "no snapshot file yet");
            Ok(Vec::new())
        }
    }
}

fn print_changes(changes: &[ChangeRecord]) {
    println!("  AGE     EVENT     RESOURCE       NAMESPACE/NAME                 DETAILS");
    for c in changes {
        let mark = if c.is_read { ' ' } else { '*' };
        let key = if c.namespace.is_empty() { c.name.clone() } else { c.object_key() };
        println!(
            "{} {:<7} {:<9} {:<14} {:<30} {}",
            mark,
            render_age(c.timestamp),
            c.event_type.as_str(),
            c.resource_type,
            key,
            c.details
        );
    }
}

fn print_stats(s: &ChangeStats) {
    println!("total: {}  unread: {}", s.total, s.unread);
    for (k, v) in &s.event_type_counts {
        println!("  {:<9} {}", k.as_str(), v);
    }
    for (k, v) in &s.resource_type_counts {
        println!("  {:<24} {}", k, v);
    }
}

fn render_age(ts: DateTime<Utc>) -> String {
    let mut secs = (Utc::now() - ts).num_seconds().max(0) as u64;
    let days = secs / 86_400; secs %= 86_400;
    let hours = secs / 3600; secs %= 3600;
    let mins = secs / 60; secs %= 60;
    if days > 0 { format!("{}d{}h", days, hours) }
    else if hours > 0 { format!("{}h{}m", hours, mins) }
    else if mins > 0 { format!("{}m", mins) }
    else { format!("{}s", secs) }
}
