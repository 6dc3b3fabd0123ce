//! Latchkey - network-connected access control endpoint.
//!
//! Host build: the credential reader is simulated from stdin and output pins
//! report their level changes through the log.

mod config;
mod simulator;

use std::env;
use std::process::ExitCode;

use anyhow::Context;
use latchkey_controller::AccessController;
use latchkey_core::constants::{KEYS_NAMESPACE, LOG_QUEUE_CAPACITY};
use latchkey_hardware::mock::MockReader;
use latchkey_hardware::{Actuator, CredentialReader, TracingPin};
use latchkey_network::{ConnectionSupervisor, MqttSession, SyncRouter, SystemLink};
use latchkey_protocol::{Topics, log_channel};
use latchkey_storage::{AnyNamespace, Database, MemoryNamespace, SharedCredentialStore};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Settings, StorageBackend};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = "latchkey";
const DEFAULT_CONFIG_PATH: &str = "latchkey.toml";

fn main() -> ExitCode {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path = get_config_path(&args);

    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_logging(&settings);

    info!("Starting {} v{}", NAME, VERSION);
    info!(path = %config_path, device = %settings.device.id, "Configuration loaded");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(settings)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "Endpoint failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings) -> anyhow::Result<()> {
    let namespace = open_namespace(&settings)
        .await
        .context("Failed to open credential storage")?;
    let store = SharedCredentialStore::load(namespace)
        .await
        .context("Failed to load credential store")?;
    info!(keys = store.len().await, "Credential store loaded");

    let controller_config = settings.controller_config()?;
    let (log, log_rx) = log_channel(LOG_QUEUE_CAPACITY);

    let (mut reader, handle) = MockReader::with_name("Simulated PN532");
    match reader.open().await {
        Ok(info) => info!(
            reader = %info.name,
            firmware = info.firmware_version.as_deref().unwrap_or("unknown"),
            "Reader ready"
        ),
        Err(e) => {
            error!(error = %e, "Credential reader not found, halting");
            std::future::pending::<()>().await;
        }
    }

    tokio::spawn(simulator::feed_stdin(
        handle,
        controller_config.sector_block,
        controller_config.secret,
    ));

    let actuator = Actuator::new(
        TracingPin::new("granted-led"),
        TracingPin::new("idle-led"),
        TracingPin::new("buzzer"),
        settings.actuator,
    );
    let mut controller = AccessController::new(
        reader,
        store.reader(),
        actuator,
        log.clone(),
        controller_config,
    );
    let mut auth_task = tokio::spawn(async move { controller.run().await });

    let device_id = settings.device.id.clone();
    let router = SyncRouter::new(store, Topics::new(&device_id), log);
    let mut supervisor = ConnectionSupervisor::new(
        device_id,
        MqttSession::new(settings.mqtt_config()),
        SystemLink,
        router,
        TracingPin::new("mqtt-failure"),
        log_rx,
        settings.supervisor_config(),
    );

    tokio::select! {
        _ = supervisor.run() => {}
        result = &mut auth_task => {
            let error = result.context("Authentication loop panicked")?;
            return Err(error).context("Authentication loop stopped");
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received");
        }
    }

    auth_task.abort();
    info!("Endpoint stopped");
    Ok(())
}

async fn open_namespace(settings: &Settings) -> anyhow::Result<AnyNamespace> {
    match settings.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory storage, keys will not survive a restart");
            Ok(AnyNamespace::Memory(MemoryNamespace::new()))
        }
        StorageBackend::Sqlite => {
            let db = Database::new(settings.database_config()).await?;
            info!(path = %settings.storage.path.display(), "Database opened");
            Ok(AnyNamespace::Sqlite(db.namespace(KEYS_NAMESPACE)))
        }
    }
}

/// Wait for Ctrl-C.
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Access control endpoint: Mifare Classic reader, allow-list synced over MQTT.

Tags are simulated from stdin, one per line:
    <uid-hex> <block-hex> [<secret-hex>]

USAGE:
    {} [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file
                           [default: {}]
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME, DEFAULT_CONFIG_PATH
    );
}

/// Get configuration file path from command line arguments.
fn get_config_path(args: &[String]) -> String {
    for (i, arg) in args.iter().enumerate() {
        if (arg == "--config" || arg == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return path.to_string();
        }
    }
    DEFAULT_CONFIG_PATH.to_string()
}

/// Initialize logging based on settings. `RUST_LOG` takes precedence.
fn init_logging(settings: &Settings) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }
}
