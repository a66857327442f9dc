use crate::controllers::worker_controller::{Worker, WorkerDeps};
use crate::services::completion_barrier::CompletionBarrier;
use crate::services::http_service::HttpListener;
use crate::services::shutdown_service::ShutdownService;
use anyhow::{Context, Result};
use log::{debug, error, info};
use tokio_util::sync::CancellationToken;

/// Owns the worker pool, the HTTP listener and the two things they share:
/// the cancellation token and the completion barrier.
pub struct App {
    deps: WorkerDeps,
    listener: HttpListener,
    cancel: CancellationToken,
    barrier: CompletionBarrier,
    workers: Vec<Worker>,
}

impl App {
    pub fn new(deps: WorkerDeps, listener: HttpListener) -> Self {
        App {
            deps,
            listener,
            cancel: CancellationToken::new(),
            barrier: CompletionBarrier::new(),
            workers: Vec::new(),
        }
    }

    pub fn setup_workers(&mut self, count: usize) {
        info!("Setting up {} workers", count);
        let first = self.workers.len();
        for id in first..first + count {
            self.workers
                .push(Worker::new(id, self.deps.clone(), self.cancel.clone()));
        }
    }

    /// Firing this token stops the pool the same way SIGINT/SIGTERM does.
    #[cfg(test)]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[cfg(test)]
    pub fn barrier(&self) -> CompletionBarrier {
        self.barrier.clone()
    }

    /// Runs the listener and every worker until all of them have exited.
    ///
    /// The signal handler fires the token itself, which is what lets the
    /// barrier drain; nothing here waits on an action scheduled after the
    /// wait. Listener failures are logged, returned at the end and do not
    /// stop the workers.
    pub async fn run(self) -> Result<()> {
        info!("Starting application");
        let App {
            listener,
            cancel,
            barrier,
            workers,
            ..
        } = self;

        let shutdown = ShutdownService::install(cancel.clone())?;
        let signals = tokio::spawn(async move {
            if let Err(e) = shutdown.wait_for_shutdown().await {
                error!("Signal handling failed: {:#}", e);
            }
        });

        let listener_slot = barrier.register();
        let listener_cancel = cancel.clone();
        let listener = tokio::spawn(async move {
            let _slot = listener_slot;
            let outcome = listener.serve(listener_cancel).await;
            if let Err(e) = &outcome {
                error!("Server error: {}", e);
            }
            outcome
        });

        for worker in workers {
            debug!("Spawning worker {}", worker.id());
            let slot = barrier.register();
            tokio::spawn(worker.run(slot));
        }

        info!("Waiting on {} tasks", barrier.pending());
        barrier.wait().await;
        signals.abort();
        info!("Application shutdown complete");

        listener.await.context("HTTP listener task failed")??;
        Ok(())
    }
}
