//! SoundMaster CLI Application

mod render;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dialoguer::theme::ColorfulTheme;
use dialoguer::Select;
use soundmaster_core::domain::{
    AudioOutput, CommandResult, ConfigManager, ConfirmChoice, Confirmation, PowerState, Priority,
    RouteDecision, RoutingResolver, SessionStore, SoundmasterConfig, SourceDetector, SourceId,
    SourceRegistry,
};
use soundmaster_infra::detection::{DemoDetector, DetectionPoller};
use soundmaster_infra::store::{Reply, SourceStore, SourceStoreHandle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "soundmaster")]
#[command(about = "Per-app volume, playback and output routing", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List known audio sources
    List {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Route a source to an output
    Route {
        id: String,
        output: AudioOutput,
        /// Displace whatever is playing on the output
        #[arg(long)]
        force: bool,
        /// Priority to claim the output with
        #[arg(long)]
        priority: Option<u32>,
        /// Ask what to do when the output is taken
        #[arg(short, long)]
        interactive: bool,
    },
    /// Move a source to the next output (speakers, headphones, bluetooth)
    Cycle {
        id: String,
        #[arg(short, long)]
        interactive: bool,
    },
    /// Play or pause a source
    Toggle { id: String },
    /// Set a source's volume (0.0 to 1.0)
    Volume {
        id: String,
        #[arg(allow_hyphen_values = true)]
        level: f32,
    },
    /// Keep detecting sources and print notifications until Ctrl-C
    Watch {
        /// Battery charge in percent
        #[arg(long, default_value_t = 100)]
        battery: u8,
        #[arg(long)]
        charging: bool,
        #[arg(long)]
        power_saving: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => ConfigManager::default_config_dir()?,
    };
    let manager = ConfigManager::new(config_dir);
    let config = manager.load().await;
    let state_path = manager.state_path(&config);

    let (store, task) = start_store(&config, state_path).await?;

    match cli.command {
        Commands::List { json } => {
            let sources = store.snapshot().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sources)?);
            } else {
                render::print_sources(&sources);
            }
        }
        Commands::Route {
            id,
            output,
            force,
            priority,
            interactive,
        } => {
            let reply = store
                .request_output(SourceId::new(id), output, force, priority.map(Priority::new))
                .await?;
            resolve_confirmation(&store, reply, interactive).await?;
        }
        Commands::Cycle { id, interactive } => {
            let reply = store.cycle_output(SourceId::new(id)).await?;
            resolve_confirmation(&store, reply, interactive).await?;
        }
        Commands::Toggle { id } => {
            let reply = store.toggle_playback(SourceId::new(id)).await?;
            report(&reply);
        }
        Commands::Volume { id, level } => {
            let reply = store.set_volume(SourceId::new(id), level).await?;
            report(&reply);
        }
        Commands::Watch {
            battery,
            charging,
            power_saving,
        } => {
            let power = PowerState {
                battery_percent: battery.min(100),
                charging,
                power_saving,
            };
            watch_sources(&store, &config, power).await?;
        }
    }

    drop(store);
    task.await.context("source store task failed")?;
    Ok(())
}

/// Load saved sources, seeding from the detector on first run
async fn start_store(
    config: &SoundmasterConfig,
    state_path: PathBuf,
) -> anyhow::Result<(SourceStoreHandle, tokio::task::JoinHandle<RoutingResolver>)> {
    let session = SessionStore::new(state_path);
    let saved = session.load().await;
    let first_run = saved.is_empty();

    let resolver = RoutingResolver::new(SourceRegistry::from_sources(saved), config.routing.clone());
    let persistence = config.app.persist_state.then_some(session);
    let (store, task) = SourceStore::spawn(resolver, persistence, config.app.notification_capacity);

    if first_run {
        let sources = DemoDetector::new().detect().await?;
        store.refresh(sources).await?;
    }

    Ok((store, task))
}

fn report((result, notifications): &Reply) {
    render::print_result(result);
    for notification in notifications {
        render::print_notification(notification);
    }
}

/// Act as the confirmation surface for a blocked output change
async fn resolve_confirmation(
    store: &SourceStoreHandle,
    reply: Reply,
    interactive: bool,
) -> anyhow::Result<()> {
    let (result, notifications) = &reply;
    let CommandResult::Route(RouteDecision::NeedsConfirmation(confirmation)) = result else {
        report(&reply);
        return Ok(());
    };

    for notification in notifications.iter().filter(|n| n.actions.is_empty()) {
        render::print_notification(notification);
    }

    if !interactive {
        println!(
            "! {} is already playing through {}",
            confirmation.holder_name, confirmation.output
        );
        println!("  rerun with --force to take over, or --force --priority <N> to claim it with a priority");
        return Ok(());
    }

    let pending = confirmation.clone();
    let choice = tokio::task::spawn_blocking(move || prompt_choice(&pending)).await??;

    let reply = match choice {
        Some(choice) => store.confirm(confirmation.id, choice).await?,
        None => store.dismiss(confirmation.id).await?,
    };
    report(&reply);
    Ok(())
}

fn prompt_choice(confirmation: &Confirmation) -> anyhow::Result<Option<ConfirmChoice>> {
    let theme = ColorfulTheme::default();
    let mut items: Vec<&str> = ConfirmChoice::ALL.iter().map(|c| c.label()).collect();
    items.push("Cancel");

    let selection = Select::with_theme(&theme)
        .with_prompt(format!(
            "{} is already playing through {}",
            confirmation.holder_name, confirmation.output
        ))
        .items(&items)
        .default(0)
        .interact()?;

    Ok(ConfirmChoice::ALL.get(selection).copied())
}

async fn watch_sources(
    store: &SourceStoreHandle,
    config: &SoundmasterConfig,
    power: PowerState,
) -> anyhow::Result<()> {
    let mut notifications = store.subscribe();
    let (_power_tx, power_rx) = watch::channel(power);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let poller = DetectionPoller::new(
        Arc::new(DemoDetector::new()),
        store.clone(),
        config.detection.clone(),
        power_rx,
    );
    println!(
        "Watching audio sources every {:?} (Ctrl-C to stop)",
        poller.current_interval()
    );
    let poller = poller.spawn(shutdown_rx);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            received = notifications.recv() => match received {
                Ok(notification) => render::print_notification(&notification),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notification stream lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            _ = &mut ctrl_c => break,
        }
    }

    shutdown_tx.send(true).ok();
    let refreshes = poller.await?;
    tracing::info!(refreshes, "Stopped watching");
    render::print_sources(&store.snapshot().await?);
    Ok(())
}
