//! Mapping of process signals onto the pixel server.
//!
//! - `SIGINT` / `SIGTERM` (Ctrl+C, systemd stop) close the server
//! - `SIGUSR1` logs the gamma exponents currently in effect
//!
//! OS signals are forwarded into a channel as `ControlSignal`s, so the
//! controller can be driven by tests the same way.

use crate::error::ServerError;
use crate::server::PixelServer;
use std::io;
use std::sync::Arc;
use tokio::sync::mpsc;

/// A request from the operating environment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlSignal {
    /// Shut down: blank the panel and exit.
    Terminate,
    /// Report the current gamma exponents.
    Report,
}

/// Forward OS signals into `tx` until the receiver is dropped.
///
/// Must be called from within a tokio runtime.
pub fn forward_signals(tx: mpsc::Sender<ControlSignal>) -> io::Result<()> {
    let mut signals = Signals::install()?;
    tokio::spawn(async move {
        loop {
            let signal = signals.recv().await;
            if tx.send(signal).await.is_err() {
                break;
            }
        }
    });
    Ok(())
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    report: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> io::Result<Self> {
        use tokio::signal::unix::{SignalKind, signal};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            report: signal(SignalKind::user_defined1())?,
        })
    }

    async fn recv(&mut self) -> ControlSignal {
        tokio::select! {
            Some(()) = self.interrupt.recv() => ControlSignal::Terminate,
            Some(()) = self.terminate.recv() => ControlSignal::Terminate,
            Some(()) = self.report.recv() => ControlSignal::Report,
            else => ControlSignal::Terminate,
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> ControlSignal {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::warn!("Ctrl+C handler failed: {}", err);
        }
        ControlSignal::Terminate
    }
}

/// Drives a `PixelServer` from control signals.
pub struct LifecycleController {
    server: Arc<PixelServer>,
}

impl LifecycleController {
    pub fn new(server: Arc<PixelServer>) -> Self {
        Self { server }
    }

    pub fn dispatch(&self, signal: ControlSignal) {
        match signal {
            ControlSignal::Terminate => {
                tracing::info!("Termination requested");
                self.server.close();
            }
            ControlSignal::Report => {
                tracing::info!("{}", self.server.gammas());
            }
        }
    }

    /// Run the server's receive loop on a blocking thread and dispatch
    /// signals from `signals` until the loop returns.
    pub async fn run(self, mut signals: mpsc::Receiver<ControlSignal>) -> Result<(), ServerError> {
        let runner = Arc::clone(&self.server);
        let mut handle = tokio::task::spawn_blocking(move || runner.handle());

        loop {
            tokio::select! {
                joined = &mut handle => {
                    return joined.map_err(|err| {
                        tracing::error!("Receive loop task failed: {}", err);
                        ServerError::LoopPanicked
                    })?;
                }
                Some(signal) = signals.recv() => self.dispatch(signal),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PixelServerConfig;
    use crate::gamma::Channel;
    use crate::server::LifecycleState;
    use pretty_assertions::assert_eq;

    fn simulated_server() -> Arc<PixelServer> {
        let mut config = PixelServerConfig {
            port: 0,
            ..PixelServerConfig::default()
        };
        config.bus.simulate = true;
        Arc::new(PixelServer::new(config).unwrap())
    }

    #[test]
    fn terminate_closes_the_server() {
        let server = simulated_server();
        LifecycleController::new(Arc::clone(&server)).dispatch(ControlSignal::Terminate);
        assert_eq!(server.state(), LifecycleState::Closing);
    }

    #[test]
    fn report_does_not_change_state() {
        let server = simulated_server();
        server.set_gamma(Channel::Red, 2.2).unwrap();
        LifecycleController::new(Arc::clone(&server)).dispatch(ControlSignal::Report);
        assert_eq!(server.state(), LifecycleState::Created);
        assert_eq!(server.gamma(Channel::Red), 2.2);
    }

    #[tokio::test]
    async fn run_returns_after_terminate() {
        let server = simulated_server();
        let (tx, rx) = mpsc::channel(4);
        let controller = LifecycleController::new(Arc::clone(&server));

        tx.send(ControlSignal::Report).await.unwrap();
        tx.send(ControlSignal::Terminate).await.unwrap();
        controller.run(rx).await.unwrap();

        assert_eq!(server.state(), LifecycleState::Closed);
    }

    #[tokio::test]
    async fn run_reports_already_handled_server() {
        let server = simulated_server();
        server.close();
        server.handle().unwrap();

        let (_tx, rx) = mpsc::channel(1);
        let result = LifecycleController::new(server).run(rx).await;
        assert!(matches!(result, Err(ServerError::AlreadyHandled)));
    }
}
