pub mod bridge;
pub mod config;
pub mod error;
pub mod logging;
pub mod mqtt;
pub mod persistence;
pub mod pipe;
pub mod routing;

use crate::bridge::Bridge;
use crate::config::AppContext;
use crate::mqtt::mqtt_handler::BrokerSession;
use crate::mqtt::subscriptions::SubscriptionList;
use crate::persistence::{ConfigMirror, ControlValue};
use crate::pipe::PipeChannel;
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Bridges the MQTT device tree with the local mirror file and command pipe.
#[derive(Parser, Debug)]
#[command(name = "brutus-bridge")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Settings file (default: $XDG_CONFIG_HOME/brutus-bridge/bridge.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bridge (default)
    Run,

    /// Write one command line to the pipe
    Send {
        /// `<port>/<device>/<control>` or a broker topic
        topic: String,

        /// Value; several words are joined with spaces
        #[arg(required = true, num_args = 1..)]
        value: Vec<String>,

        /// Also store the coerced value in the mirror file
        #[arg(long)]
        update_mirror: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;
    let cli = Cli::parse();
    let ctx = AppContext::load(cli.config.as_deref()).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(ctx).await,
        Command::Send {
            topic,
            value,
            update_mirror,
        } => send(ctx, topic, value.join(" "), update_mirror).await,
    }
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    Ok(())
}

async fn run(ctx: AppContext) -> Result<()> {
    let paths = &ctx.settings.paths;
    logging::init(Some(&paths.log))?;
    ctx.log_startup();

    let subscriptions = SubscriptionList::load(&paths.topics).await?;
    let mirror = ConfigMirror::load(&paths.mirror).await?;

    let (events_tx, events_rx) = mpsc::channel(ctx.settings.bridge.event_capacity);
    let shutdown = CancellationToken::new();

    let (session, publisher) = BrokerSession::create(
        ctx.settings.mqtt.clone(),
        subscriptions,
        paths.topics.clone(),
        events_tx.clone(),
    )?;

    // The actor has to be draining events before the session can deliver any.
    let bridge = Bridge::new(
        mirror,
        paths.mirror.clone(),
        ctx.routing.clone(),
        publisher,
        ctx.settings.relay.clone(),
    );
    let bridge_task = tokio::spawn(bridge.run(events_rx, shutdown.clone()));

    let session = session.start().await?;

    let _pipe_reader = PipeChannel::new(&paths.pipe).spawn_reader(events_tx)?;

    let broker_task = tokio::spawn(session.run(shutdown.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    shutdown.cancel();

    if let Err(e) = broker_task.await {
        warn!("Broker task ended abnormally: {}", e);
    }
    let (mirror, stats) = bridge_task.await?;
    info!("Exiting with {} mirrored values ({})", mirror.len(), stats);
    Ok(())
}

async fn send(ctx: AppContext, topic: String, value: String, update_mirror: bool) -> Result<()> {
    logging::init(None)?;
    ctx.log_startup();
    let paths = &ctx.settings.paths;

    if update_mirror {
        store_coerced(&paths.mirror, &topic, &value).await?;
    }

    let channel = PipeChannel::new(&paths.pipe);
    let line = format!("{} {}", topic, value);
    info!("Sending message to {}: {}", channel.path().display(), line);
    tokio::task::spawn_blocking(move || channel.send_line(&line)).await??;
    Ok(())
}

/// Load, coerce, set, full rewrite: the configuration UI's write path.
async fn store_coerced(mirror_file: &Path, topic: &str, value: &str) -> Result<()> {
    let (port, device, control) = mirror_path(topic).ok_or_else(|| {
        eyre!(
            "--update-mirror needs a <port>/<device>/<control> topic, got {}",
            topic
        )
    })?;

    let mut mirror = ConfigMirror::load(mirror_file).await?;
    let coerced = ControlValue::coerce(value);
    match mirror.get(port, device, control) {
        Some(previous) => info!(
            "Setting {}/{}/{} = {} (was {})",
            port, device, control, coerced, previous
        ),
        None => info!("Setting {}/{}/{} = {}", port, device, control, coerced),
    }
    mirror.set(port, device, control, coerced);
    mirror.save(mirror_file).await?;
    Ok(())
}

/// Splits `port/device/control` into its three non-empty parts.
fn mirror_path(topic: &str) -> Option<(&str, &str, &str)> {
    let mut parts = topic.split('/');
    let port = parts.next().filter(|s| !s.is_empty())?;
    let device = parts.next().filter(|s| !s.is_empty())?;
    let control = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some((port, device, control))
}
