use anyhow::{Context, Result};
use log::info;
use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use tokio::signal::unix::{Signal, SignalKind, signal};

/// Turns SIGINT/SIGTERM into a fire of the shared cancellation token.
///
/// Handlers are installed by [`ShutdownService::install`], so a signal that
/// arrives after it returns is never lost.
pub struct ShutdownService {
    token: CancellationToken,
    signals: Signals,
}

impl ShutdownService {
    pub fn install(token: CancellationToken) -> Result<Self> {
        Ok(ShutdownService {
            token,
            signals: Signals::install()?,
        })
    }

    /// Returns once shutdown was requested, either by a signal or by someone
    /// else cancelling the token first.
    pub async fn wait_for_shutdown(mut self) -> Result<()> {
        tokio::select! {
            caught = self.signals.recv() => {
                info!("Caught {}, shutting down", caught?);
                self.token.cancel();
            }
            _ = self.token.cancelled() => {
                info!("Shutdown requested");
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
struct Signals {
    interrupt: Signal,
    terminate: Signal,
}

#[cfg(unix)]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Signals {
            interrupt: signal(SignalKind::interrupt()).context("Unable to listen for SIGINT")?,
            terminate: signal(SignalKind::terminate()).context("Unable to listen for SIGTERM")?,
        })
    }

    async fn recv(&mut self) -> Result<&'static str> {
        tokio::select! {
            _ = self.interrupt.recv() => Ok("SIGINT"),
            _ = self.terminate.recv() => Ok("SIGTERM"),
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn install() -> Result<Self> {
        Ok(Signals)
    }

    async fn recv(&mut self) -> Result<&'static str> {
        tokio::signal::ctrl_c()
            .await
            .context("Unable to listen for shutdown signal")?;
        Ok("ctrl-c")
    }
}
