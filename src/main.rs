//! LED grid pixel server daemon
//!
//! Listens for raw RGB frames on a UDP port, gamma-corrects them and shifts
//! them out to the LED panel over SPI.
//!
//! ## Architecture
//! - **Receive loop** (blocking thread): owns the UDP socket and the SPI bus
//! - **Signal dispatch** (tokio): `SIGINT`/`SIGTERM` close the server,
//!   `SIGUSR1` logs the current gamma values
//! - **HTTP API** (tokio/axum, optional): status and gamma adjustment
//!
//! ## Usage
//! ```sh
//! sudo ./target/release/ledgrid-slave --port 5333 --gamma 3.0,3.0,3.0
//! ./target/release/ledgrid-slave --simulate --http-port 8080
//! ```

use clap::Parser;
use ledgrid_slave::api::{self, AppState};
use ledgrid_slave::bus::{BusConfig, DEFAULT_CLOCK_HZ, DEFAULT_DEVICE};
use ledgrid_slave::config::{self, DEFAULT_GAMMA, DEFAULT_PORT, PixelServerConfig};
use ledgrid_slave::lifecycle::{self, LifecycleController};
use ledgrid_slave::{PanelConfig, PixelServer, ServerError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

/// LED grid pixel server
#[derive(Parser)]
#[command(name = "ledgrid-slave")]
#[command(about = "Receives RGB frames over UDP and drives an LED panel over SPI")]
#[command(version)]
struct Args {
    /// UDP port to receive frames on
    #[arg(long, default_value_t = DEFAULT_PORT, value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// SPI device the panel is attached to
    #[arg(long, default_value = DEFAULT_DEVICE)]
    device: PathBuf,

    /// SPI baudrate in Hz
    #[arg(long, default_value_t = DEFAULT_CLOCK_HZ)]
    baud: u32,

    /// Gamma value for red
    #[arg(long, default_value_t = DEFAULT_GAMMA)]
    red: f64,

    /// Gamma value for green
    #[arg(long, default_value_t = DEFAULT_GAMMA)]
    green: f64,

    /// Gamma value for blue
    #[arg(long, default_value_t = DEFAULT_GAMMA)]
    blue: f64,

    /// Gamma values as "R,G,B" (overrides --red, --green and --blue)
    #[arg(long, value_name = "R,G,B")]
    gamma: Option<String>,

    /// Number of rows on the LED panel
    #[arg(long, default_value = "10")]
    rows: u32,

    /// Number of columns on the LED panel
    #[arg(long, default_value = "10")]
    cols: u32,

    /// Log frames instead of writing them to the SPI device
    #[arg(long)]
    simulate: bool,

    /// Serve the HTTP control API on this port
    #[arg(long)]
    http_port: Option<u16>,
}

impl Args {
    fn into_config(self) -> Result<PixelServerConfig, ServerError> {
        let gamma = match &self.gamma {
            Some(triple) => config::parse_gamma_triple(triple)?,
            None => [self.red, self.green, self.blue],
        };

        let hardware_present = cfg!(feature = "hardware") && self.device.exists();
        if !self.simulate && !hardware_present {
            tracing::warn!(
                "No SPI device at {}, frames will only be logged",
                self.device.display()
            );
        }

        Ok(PixelServerConfig {
            port: self.port,
            bus: BusConfig {
                simulate: self.simulate || !hardware_present,
                device: self.device,
                clock_hz: self.baud,
            },
            gamma,
            panel: PanelConfig::new(self.rows, self.cols),
            ..PixelServerConfig::default()
        })
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Disable ANSI color codes for systemd/journald
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .compact()
        .init();

    match run(Args::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), ServerError> {
    let http_port = args.http_port;
    let config = args.into_config()?;

    tracing::info!("LED grid pixel server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        "Panel: {}x{} ({} bytes per frame)",
        config.panel.cols,
        config.panel.rows,
        config.panel.frame_byte_count()
    );
    tracing::info!(
        "Gamma: red {}, green {}, blue {}",
        config.gamma[0],
        config.gamma[1],
        config.gamma[2]
    );

    let server = Arc::new(PixelServer::new(config)?);

    let (signal_tx, signal_rx) = mpsc::channel(8);
    if let Err(err) = lifecycle::forward_signals(signal_tx) {
        tracing::warn!("Could not install signal handlers: {}", err);
    }

    if let Some(port) = http_port {
        spawn_http_api(Arc::clone(&server), port).await;
    }

    LifecycleController::new(server).run(signal_rx).await
}

/// Serve the control API in the background. Failing to bind is logged but
/// does not stop the pixel server.
async fn spawn_http_api(server: Arc<PixelServer>, port: u16) {
    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind HTTP API to {}: {}", addr, err);
            return;
        }
    };

    tracing::info!("HTTP API listening on http://{}", addr);
    tracing::info!("API Documentation: http://localhost:{}/docs", port);

    let app = api::create_router(AppState { server });
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            tracing::error!("HTTP API error: {}", err);
        }
    });
}
