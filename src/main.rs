//! kubesnap CLI - watch the snapshot manager from a terminal

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{Map, Value};

use kubesnap::persist::{FileFilterStorage, FilterStorage};
use kubesnap::{ChannelState, ClientConfig, FixSuggestion, SyncClient, SyncError, VolumeMap};

#[derive(Parser)]
#[command(name = "kubesnap")]
#[command(about = "Live client for the Kubernetes snapshot manager")]
#[command(version)]
struct Cli {
    /// Path to config.toml (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for client-local state such as the saved filter
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream volumes and PV listings as the server pushes them
    Watch {
        /// Server host[:port]
        #[arg(long)]
        host: Option<String>,

        /// Set the volume filter before connecting (persisted)
        #[arg(short, long)]
        filter: Option<String>,
    },

    /// Show or change the saved volume filter
    Filter {
        /// New filter value
        value: Option<String>,

        /// Reset the filter to empty
        #[arg(long, conflicts_with = "value")]
        clear: bool,
    },

    /// Press a debug panel button on the server
    Button {
        /// Cluster the button belongs to
        cluster: String,

        /// Button action name
        action: String,

        /// Server host[:port]
        #[arg(long)]
        host: Option<String>,

        /// Give up if the command has not been sent by then
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => match cli.command {
            Commands::Watch { host, filter } => watch(config, host, filter).await,
            Commands::Filter { value, clear } => show_or_set_filter(&config, value, clear),
            Commands::Button {
                cluster,
                action,
                host,
                timeout_secs,
            } => button(config, host, &cluster, &action, timeout_secs).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        if let Some(suggestion) = e.fix_suggestion() {
            eprintln!("  {} {}", "Fix:".yellow(), suggestion);
        }
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<ClientConfig, SyncError> {
    let config = match &cli.config {
        Some(path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };
    let config = config.with_env();
    Ok(match &cli.state_dir {
        Some(dir) => config.with_state_dir(dir),
        None => config,
    })
}

async fn watch(
    config: ClientConfig,
    host: Option<String>,
    filter: Option<String>,
) -> Result<(), SyncError> {
    let config = match host {
        Some(h) => config.with_host(h),
        None => config,
    };
    let client = SyncClient::from_config(&config)?;
    let handle = client.handle();
    let shown = filter.clone().unwrap_or_else(|| handle.store().filter());
    if let Some(f) = filter {
        handle.set_filter(f)?;
    }

    println!(
        "{} Watching {} (filter: {})",
        "→".cyan(),
        config.endpoint()?.as_str().cyan().bold(),
        display_filter(&shown),
    );

    let mut visible = handle.store().subscribe_visible();
    let mut pvs = handle.store().subscribe_pvs();
    let mut state = handle.state();
    let task = tokio::spawn(client.run());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                handle.shutdown();
                break;
            }
            changed = visible.changed() => {
                if changed.is_err() {
                    break;
                }
                let volumes = visible.borrow_and_update().clone();
                print_volumes(&volumes, &handle.store().filter());
            }
            changed = pvs.changed() => {
                if changed.is_err() {
                    break;
                }
                for (cluster, list) in pvs.borrow_and_update().iter() {
                    println!("  {} {}: {} PVs", "▸".blue(), cluster.bold(), list.len());
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = state.borrow_and_update().clone();
                print_state(&current);
            }
        }
    }

    match task.await {
        Ok(result) => result,
        Err(e) => Err(SyncError::Transport {
            reason: format!("client task failed: {}", e),
        }),
    }
}

fn show_or_set_filter(
    config: &ClientConfig,
    value: Option<String>,
    clear: bool,
) -> Result<(), SyncError> {
    let storage = FileFilterStorage::new(config.state_dir());

    let new_value = if clear { Some(String::new()) } else { value };
    if let Some(v) = new_value {
        storage.save(&v)?;
        println!("{} Filter saved: {}", "✓".green(), display_filter(&v));
        return Ok(());
    }

    let current = storage.load()?.unwrap_or_default();
    println!("Filter: {}", display_filter(&current));
    Ok(())
}

async fn button(
    config: ClientConfig,
    host: Option<String>,
    cluster: &str,
    action: &str,
    timeout_secs: u64,
) -> Result<(), SyncError> {
    let config = match host {
        Some(h) => config.with_host(h),
        None => config,
    };
    let endpoint = config.endpoint()?;
    let client = SyncClient::from_config(&config)?;
    let handle = client.handle();

    let mut extra = Map::new();
    extra.insert("cluster".into(), Value::String(cluster.to_string()));
    handle.debug_button(action, extra)?;

    let mut stats = handle.stats();
    let task = tokio::spawn(client.run());
    let sent = matches!(
        tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            stats.wait_for(|s| s.sent >= 1),
        )
        .await,
        Ok(Ok(_))
    );
    handle.shutdown();
    let _ = task.await;

    if !sent {
        return Err(SyncError::ConnectFailed {
            endpoint: endpoint.to_string(),
            reason: format!("command not sent within {}s", timeout_secs),
        });
    }
    println!("{} Sent '{}' to {}", "✓".green(), action, cluster.bold());
    Ok(())
}

fn print_volumes(volumes: &VolumeMap, filter: &str) {
    println!(
        "{} {} volumes (filter: {})",
        "■".cyan(),
        volumes.len().to_string().bold(),
        display_filter(filter)
    );
    for volume in volumes.values() {
        let state = volume
            .details
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or("-");
        println!("  {:<48} {:<12} {}", volume.name, state.dimmed(), volume.id.dimmed());
    }
}

fn print_state(state: &ChannelState) {
    match state {
        ChannelState::Open => println!("{} connected", "●".green()),
        ChannelState::Connecting { attempt } => {
            println!("{} connecting (attempt {})", "●".yellow(), attempt)
        }
        ChannelState::Backoff { delay, .. } => {
            println!("{} reconnecting in {}ms", "●".yellow(), delay.as_millis())
        }
        ChannelState::Idle => println!("{} disconnected", "●".red()),
        ChannelState::Stopped => println!("{} stopped", "●".red()),
    }
}

fn display_filter(value: &str) -> String {
    if value.is_empty() {
        "(none)".dimmed().to_string()
    } else {
        format!("'{}'", value)
    }
}
