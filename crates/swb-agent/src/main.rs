use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use zeroize::Zeroizing;

use swb_agent::config::AgentConfig;
use swb_agent::link::{self, LinkHandle, LinkTransport};
use swb_agent::services::DetachedServices;
use swb_core::keys::KeyExchange;
use swb_core::store::{ClientKeyStore, FileKeyStorage};
use swb_core::{PairingSignal, PairingStateMachine, Reactor, ReactorEvent};

#[derive(Parser)]
#[command(name = "swb-agent")]
#[command(about = "Switchboard agent - secure pairing service over a TCP development link")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (overrides the config file)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Start in pairing mode so new clients can pair
    #[arg(short, long)]
    pairing: bool,
}

fn init_tracing(
    config: &AgentConfig,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_new(format!(
        "swb_agent={level},swb_core={level},swb_crypto={level}",
        level = config.log_level
    ))
    .context("invalid log level")?;

    let console = if config.log_json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().with_target(true).boxed()
    };

    let (file, guard) = match &config.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let name = path.file_name().context("log_file must name a file")?;
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().json().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("tracing already initialized")?;
    Ok(guard)
}

fn on_signal(signal: PairingSignal, link: &LinkHandle) {
    match signal {
        PairingSignal::PinUpdated(pin) => {
            let pin = Zeroizing::new(pin);
            // The agent's only "screen".
            info!(target: "swb_agent::display", pin = %pin.as_str(), "enter this PIN in the app");
        }
        PairingSignal::PairingCompleted => info!("client paired"),
        PairingSignal::WifiCredentialsReceived { ssid, .. } => {
            info!(ssid = %String::from_utf8_lossy(&ssid), "Wi-Fi credentials received")
        }
        PairingSignal::OtaUpdateRequested(url) => info!(%url, "OTA update requested"),
        PairingSignal::Reset { forced } => {
            info!(forced, "pairing session reset");
            link.close();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AgentConfig::load_from_file(path)?,
        None => AgentConfig::load_from_env(),
    };
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    config.validate()?;

    let _log_guard = init_tracing(&config)?;
    info!(version = env!("CARGO_PKG_VERSION"), "starting swb-agent");

    // Identity and client records share one key file.
    let mut storage = FileKeyStorage::open(&config.key_file);
    let kex = KeyExchange::load_or_generate(&mut storage, &config.pairing.device_name_prefix)
        .context("device identity unavailable")?;
    info!(
        device = kex.device_name(),
        public_key = %hex::encode(kex.public_key()),
        key_file = %config.key_file.display(),
        "identity ready"
    );
    let clients = ClientKeyStore::load(Box::new(storage), config.pairing.max_clients);

    let listener = TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("cannot listen on {}", config.bind_addr))?;

    let (transport, link_handle) = LinkTransport::new();
    let services = DetachedServices::new(config.log_file.clone());
    let machine = PairingStateMachine::new(config.pairing.clone(), kex, clients, transport, services);

    let (event_tx, event_rx) = mpsc::channel(64);
    let (signal_tx, mut signal_rx) = mpsc::unbounded_channel();
    if args.pairing {
        event_tx.send(ReactorEvent::SetPairingMode(true)).await?;
    }
    let reactor = tokio::spawn(Reactor::new(machine, event_rx, signal_tx).run());
    let server = tokio::spawn(link::serve(listener, link_handle.clone(), event_tx.clone()));

    loop {
        tokio::select! {
            Some(signal) = signal_rx.recv() => on_signal(signal, &link_handle),
            result = tokio::signal::ctrl_c() => {
                result.context("signal handler")?;
                info!("shutdown signal received");
                break;
            }
        }
    }

    server.abort();
    // The reactor may already be gone if the listener failed.
    let _ = event_tx.send(ReactorEvent::Shutdown).await;
    let machine = reactor.await.context("pairing reactor panicked")?;
    info!(phase = ?machine.phase(), "swb-agent stopped");
    Ok(())
}
