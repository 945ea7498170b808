use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dotenv::dotenv;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use domain::LinkOpener;
use infrastructure::{ConsoleConfig, SerialLinkOpener, builtin_catalog};

mod cli;
mod commands;
mod demo;
mod observer;

use cli::{Args, Command};
use commands::Console;

fn init_tracing(debug: bool) {
    let default = if debug {
        "debug"
    } else {
        "info,sensor_console=debug,application=debug"
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

async fn run() -> Result<()> {
    dotenv().ok();
    let args = Args::parse();
    init_tracing(args.debug);

    // Development runs start from the workspace root
    let dev_config = "crates/sensor-console/config";
    let config_dir = if args.config_dir == "config" && std::path::Path::new(dev_config).exists() {
        dev_config.to_string()
    } else {
        args.config_dir.clone()
    };
    debug!("📂 Config directory: {}", config_dir);
    let config = ConsoleConfig::load(&config_dir)?;

    let catalog = builtin_catalog()?;

    let opener: Arc<dyn LinkOpener> = if args.simulate {
        info!("🧪 Using the simulated bus");
        Arc::new(demo::demo_bus().opener())
    } else {
        Arc::new(SerialLinkOpener)
    };

    let interrupt = CancellationToken::new();
    let on_ctrl_c = interrupt.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => on_ctrl_c.cancel(),
            Err(err) => warn!(error = %err, "Unable to listen for Ctrl-C"),
        }
    });

    let console = Console {
        catalog,
        config,
        opener,
        simulate: args.simulate,
        interrupt,
    };

    match &args.command {
        Command::Ports => commands::list_ports(),
        Command::Sensors => commands::list_sensors(&console.catalog),
        Command::Discover(target) => console.discover(target).await,
        Command::Test { target, count } => console.test(target, *count).await,
        Command::Configure {
            target,
            new_address,
            new_baudrate,
            new_parity,
        } => {
            console
                .configure(target, new_address, *new_baudrate, new_parity.as_deref())
                .await
        }
    }
}

fn main() {
    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("❌ Failed to start runtime: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(run()) {
        eprintln!("\n❌ {e:#}");
        std::process::exit(1);
    }
}
