//! The pixel server: UDP in, gamma correction, SPI out.
//!
//! ## Lifecycle
//! `Created -> Running -> Closing -> Closed`
//!
//! - `handle()` takes `Created` to `Running` and blocks in the receive loop.
//! - `close()` may be called from any thread. It moves the server to
//!   `Closing` and sends an empty datagram to the listener so the blocked
//!   read returns at once. The socket also has a read timeout, so the loop
//!   notices `Closing` within one poll interval even if that datagram is lost.
//! - When the loop exits, `handle()` blanks the whole panel, closes the bus
//!   and the server reaches `Closed`.
//!
//! A receive error other than the poll timeout ends `handle()` with
//! `ServerError::TransportFault` without blanking the panel.

use crate::PanelConfig;
use crate::bus::{self, Bus};
use crate::config::{BUFFER_SIZE, PixelServerConfig};
use crate::error::{ConfigError, ServerError};
use crate::frame::FrameDecoder;
use crate::gamma::{Channel, GammaReport, GammaTables};
use serde::Serialize;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

// ── State ────────────────────────────────────────────────────────────

/// Where a server is in its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Created,
    Running,
    Closing,
    Closed,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Running => 1,
            Self::Closing => 2,
            Self::Closed => 3,
        }
    }
}

/// Counters updated by the receive loop.
#[derive(Debug, Default)]
struct ServerStats {
    frames: AtomicU64,
    anomalies: AtomicU64,
    bus_errors: AtomicU64,
}

/// A point-in-time copy of the server counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct StatsSnapshot {
    /// Datagrams received
    pub frames: u64,
    /// Frames with a partial pixel or an unexpected length
    pub anomalies: u64,
    /// Failed bus writes
    pub bus_errors: u64,
}

/// What the server is doing, as reported by the HTTP API.
#[derive(Clone, Debug, Serialize, utoipa::ToSchema)]
pub struct ServerStatus {
    pub state: LifecycleState,
    pub gamma: GammaReport,
    pub stats: StatsSnapshot,
    pub panel: PanelConfig,
    /// UDP port frames are received on
    pub port: u16,
    pub version: String,
}

/// Where the receive loop reads datagrams from.
trait FrameSource {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl FrameSource for UdpSocket {
    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        UdpSocket::recv(self, buf)
    }
}

/// Socket and bus, owned by whichever `handle()` call takes them.
struct Resources {
    socket: UdpSocket,
    bus: Box<dyn Bus>,
}

// ── Server ───────────────────────────────────────────────────────────

/// Receives frames over UDP and forwards them, gamma-corrected, to the bus.
///
/// Share it as `Arc<PixelServer>`: one thread runs `handle()`, others call
/// `close()`, `set_gamma()` and `gamma()`.
pub struct PixelServer {
    config: PixelServerConfig,
    gamma: GammaTables,
    decoder: FrameDecoder,
    local_addr: SocketAddr,
    state: AtomicU8,
    stats: ServerStats,
    resources: Mutex<Option<Resources>>,
}

impl PixelServer {
    /// Bind the listener and open the bus described by `config`.
    pub fn new(config: PixelServerConfig) -> Result<Self, ServerError> {
        config.validate()?;
        let bus = bus::open(&config.bus)?;
        Self::with_bus(config, bus)
    }

    /// Like `new`, but with an already opened bus.
    pub fn with_bus(config: PixelServerConfig, bus: Box<dyn Bus>) -> Result<Self, ServerError> {
        config.validate()?;
        let gamma = GammaTables::new(config.gamma)?;

        let bind_error = |source| ServerError::Bind {
            port: config.port,
            source,
        };
        let socket =
            UdpSocket::bind((Ipv4Addr::UNSPECIFIED, config.port)).map_err(bind_error)?;
        socket
            .set_read_timeout(Some(config.poll_interval.max(Duration::from_millis(1))))
            .map_err(bind_error)?;
        let local_addr = socket.local_addr().map_err(bind_error)?;

        Ok(Self {
            decoder: FrameDecoder::new(config.panel),
            gamma,
            local_addr,
            state: AtomicU8::new(LifecycleState::Created.as_u8()),
            stats: ServerStats::default(),
            resources: Mutex::new(Some(Resources { socket, bus })),
            config,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    // ── Gamma ────────────────────────────────────────────────────────

    /// Replace the correction table for `channel`. Takes effect from the
    /// next frame on.
    pub fn set_gamma(&self, channel: Channel, exponent: f64) -> Result<(), ConfigError> {
        self.gamma.set_gamma(channel, exponent)?;
        tracing::info!("Gamma for {} set to {}", channel, exponent);
        Ok(())
    }

    pub fn gamma(&self, channel: Channel) -> f64 {
        self.gamma.gamma(channel)
    }

    pub fn gammas(&self) -> GammaReport {
        self.gamma.gammas()
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames: self.stats.frames.load(Ordering::Relaxed),
            anomalies: self.stats.anomalies.load(Ordering::Relaxed),
            bus_errors: self.stats.bus_errors.load(Ordering::Relaxed),
        }
    }

    pub fn status(&self) -> ServerStatus {
        ServerStatus {
            state: self.state(),
            gamma: self.gammas(),
            stats: self.stats(),
            panel: self.config.panel,
            port: self.local_addr.port(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Run the receive/correct/transmit loop until `close()` is called.
    ///
    /// On a clean exit every pixel is switched off and the bus is closed.
    /// Can only be called once.
    pub fn handle(&self) -> Result<(), ServerError> {
        let Resources { socket, mut bus } = self
            .resources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ServerError::AlreadyHandled)?;
        self.serve(&socket, bus.as_mut())
    }

    fn serve(&self, source: &dyn FrameSource, bus: &mut dyn Bus) -> Result<(), ServerError> {
        // Stays `Closing` if close() won the race.
        let _ = self.transition(LifecycleState::Created, LifecycleState::Running);
        tracing::info!(
            "Pixel server listening on UDP {} ({} pixels)",
            self.local_addr,
            self.config.panel.pixel_count()
        );

        if let Err(err) = self.receive_loop(source, bus) {
            self.set_state(LifecycleState::Closed);
            tracing::error!("{}", err);
            return Err(err);
        }

        self.blank(bus);
        if let Err(err) = bus.close() {
            tracing::warn!("{}", err);
        }
        self.set_state(LifecycleState::Closed);

        let stats = self.stats();
        tracing::info!(
            "Pixel server closed ({} frames received, {} anomalies, {} bus errors)",
            stats.frames,
            stats.anomalies,
            stats.bus_errors
        );
        Ok(())
    }

    /// Ask a running `handle()` to stop. Safe to call more than once and
    /// from any thread.
    pub fn close(&self) {
        let closing = self.transition(LifecycleState::Created, LifecycleState::Closing)
            || self.transition(LifecycleState::Running, LifecycleState::Closing);
        if closing {
            tracing::info!("Closing pixel server");
            self.wake();
        }
    }

    fn receive_loop(&self, source: &dyn FrameSource, bus: &mut dyn Bus) -> Result<(), ServerError> {
        let mut buffer = vec![0u8; BUFFER_SIZE.max(self.decoder.expected_len())];

        while self.state() == LifecycleState::Running {
            let received = match source.recv(&mut buffer) {
                Ok(received) => received,
                Err(err) if is_poll_timeout(&err) => continue,
                Err(_) if self.state() != LifecycleState::Running => break,
                Err(err) => return Err(ServerError::TransportFault(err)),
            };

            // The wake-up datagram from close(), or a frame racing it.
            if self.state() != LifecycleState::Running {
                break;
            }
            self.process_frame(&mut buffer, received, bus);
        }
        Ok(())
    }

    fn process_frame(&self, buffer: &mut [u8], received: usize, bus: &mut dyn Bus) {
        self.stats.frames.fetch_add(1, Ordering::Relaxed);

        let mut frame = self.decoder.decode(buffer, received);
        if let Some(anomaly) = frame.anomaly() {
            self.stats.anomalies.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("{}", anomaly);
        }
        if frame.is_empty() {
            return;
        }

        self.gamma.snapshot().correct_in_place(frame.as_bytes_mut());
        if let Err(err) = bus.write(frame.as_bytes()) {
            self.stats.bus_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Error during communication via SPI: {}", err);
        }
    }

    /// Switch every pixel of the panel off.
    fn blank(&self, bus: &mut dyn Bus) {
        tracing::info!("Turning all LEDs off");
        let zeros = vec![0u8; self.decoder.expected_len()];
        if let Err(err) = bus.write(&zeros) {
            self.stats.bus_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!("Error during communication via SPI: {}", err);
        }
    }

    /// Unblock the receive loop with an empty datagram.
    fn wake(&self) {
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, self.local_addr.port()));
        let result = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
            .and_then(|socket| socket.send_to(&[], target));
        if let Err(err) = result {
            tracing::debug!("Wake-up datagram failed, waiting for poll timeout: {}", err);
        }
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        self.state
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn set_state(&self, state: LifecycleState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

/// A read timeout, which is how the socket polls for `Closing`.
fn is_poll_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

// ── Tests ────────────────────────────────────────────────────────────
