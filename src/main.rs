use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{eyre, Result};
use tokio::sync::oneshot;
use tracing::info;

use conduit_nm::network::dbus::DbusNetworkProvider;
use conduit_nm::{
    ConnectCallbackMode, ConnectionHandler, ErrorCallback, HandlerConfig, StaticCertificateStore,
    StaticPolicy, StaticPolicyProvider, SuccessCallback,
};

/// conduit-nm: drive connection requests against a Shill-style daemon
#[derive(Parser, Debug)]
#[command(name = "conduit-nm", version, about, long_about = None)]
struct Cli {
    /// Log level filter (overrides RUST_LOG)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Path to a JSON policy document (global config plus provisioned GUIDs)
    #[arg(short, long)]
    policy: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List known networks and their states
    Status {
        /// Emit machine-readable JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Connect to a network by service path
    Connect {
        network_id: String,

        /// Skip the fail-fast check of the daemon's error properties
        #[arg(long)]
        no_check_error_state: bool,

        /// Resolve once the daemon accepts the call instead of waiting
        /// for a connected state
        #[arg(long)]
        no_wait: bool,
    },
    /// Disconnect a network by service path
    Disconnect { network_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install().ok();
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    info!("conduit-nm starting");

    let config = HandlerConfig::default();

    let provider = match DbusNetworkProvider::new().await {
        Ok(provider) => Arc::new(provider),
        Err(e) => {
            eprintln!("Failed to connect to the system D-Bus: {}", e);
            std::process::exit(1);
        }
    };
    if !provider.is_running().await {
        eprintln!("The network daemon is not reachable on the system bus.");
        std::process::exit(1);
    }

    // Initial snapshot, then keep the cache current in the background.
    provider.refresh().await?;
    provider.clone().start_polling(config.state_poll_interval());

    let policy = Arc::new(match &cli.policy {
        Some(path) => {
            let document = std::fs::read_to_string(path)?;
            let policy: StaticPolicy = serde_json::from_str(&document)?;
            StaticPolicyProvider::new(policy)
        }
        None => StaticPolicyProvider::default(),
    });
    let certificates = Arc::new(StaticCertificateStore::loaded());

    let handler = ConnectionHandler::new(
        config,
        provider.clone(),
        provider.clone(),
        policy,
        certificates,
        None,
    );

    match cli.command {
        Command::Status { json } => print_status(&provider, json)?,
        Command::Connect {
            network_id,
            no_check_error_state,
            no_wait,
        } => {
            let mode = if no_wait {
                ConnectCallbackMode::OnConfigured
            } else {
                ConnectCallbackMode::OnCompleted
            };
            let (on_success, on_error, rx) = oneshot_callbacks();
            handler.connect_to_network(
                &network_id,
                on_success,
                on_error,
                !no_check_error_state,
                mode,
            );
            match rx.await? {
                Ok(()) => println!("Connected: {}", network_id),
                Err(name) => return Err(eyre!("connect failed: {}", name)),
            }
        }
        Command::Disconnect { network_id } => {
            let (on_success, on_error, rx) = oneshot_callbacks();
            handler.disconnect_network(&network_id, on_success, on_error);
            match rx.await? {
                Ok(()) => println!("Disconnected: {}", network_id),
                Err(name) => return Err(eyre!("disconnect failed: {}", name)),
            }
        }
    }

    Ok(())
}

/// Bridge the handler's exactly-once callback pair onto a oneshot channel
/// the CLI can await.
fn oneshot_callbacks() -> (
    SuccessCallback,
    ErrorCallback,
    oneshot::Receiver<Result<(), String>>,
) {
    let (tx, rx) = oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));
    let success_tx = tx.clone();
    let on_success: SuccessCallback = Box::new(move || {
        if let Some(tx) = success_tx.lock().unwrap().take() {
            let _ = tx.send(Ok(()));
        }
    });
    let on_error: ErrorCallback = Box::new(move |error_name| {
        if let Some(tx) = tx.lock().unwrap().take() {
            let _ = tx.send(Err(error_name.to_string()));
        }
    });
    (on_success, on_error, rx)
}

fn print_status(provider: &DbusNetworkProvider, json: bool) -> Result<()> {
    let networks = provider.networks();
    if json {
        println!("{}", serde_json::to_string_pretty(&networks)?);
        return Ok(());
    }
    if networks.is_empty() {
        println!("No networks known to the daemon.");
        return Ok(());
    }
    println!("{:<36} {:<10} {:<14} NAME", "ID", "TYPE", "STATE");
    for network in networks {
        println!(
            "{:<36} {:<10} {:<14} {}",
            network.id,
            network.technology.to_string(),
            network.state.to_string(),
            network.name
        );
    }
    Ok(())
}

/// Initialize tracing to stderr, honoring RUST_LOG unless overridden.
fn init_logging(level: Option<&str>) {
    use tracing_subscriber::EnvFilter;

    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
