use crate::config::HttpConfig;
use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use log::info;
use std::future::IntoFuture;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),

    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}

pub fn routes() -> Router {
    Router::new().route("/test", get(|| async {}))
}

/// Races a request against the hard stop; once that fires the handler is
/// dropped and the client gets a 503.
async fn abort_on_hard_stop(State(hard_stop): State<CancellationToken>, request: Request, next: Next) -> Response {
    tokio::select! {
        response = next.run(request) => response,
        _ = hard_stop.cancelled() => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}

/// HTTP endpoint whose shutdown is driven by the shared cancellation token.
///
/// Once the token fires the server stops accepting connections and gets
/// `shutdown_timeout` to drain in-flight requests. Requests still running
/// after that are aborted.
pub struct HttpListener {
    bind_addr: String,
    shutdown_timeout: Duration,
    router: Router,
}

impl HttpListener {
    pub fn new(config: &HttpConfig) -> Self {
        HttpListener {
            bind_addr: config.bind_addr.clone(),
            shutdown_timeout: Duration::from_secs(config.shutdown_timeout_secs),
            router: routes(),
        }
    }

    #[cfg(test)]
    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub async fn serve(self, cancel: CancellationToken) -> Result<(), ListenerError> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|source| ListenerError::Bind {
                addr: self.bind_addr.clone(),
                source,
            })?;
        self.serve_on(listener, cancel).await
    }

    pub async fn serve_on(self, listener: TcpListener, cancel: CancellationToken) -> Result<(), ListenerError> {
        if let Ok(addr) = listener.local_addr() {
            info!("Starting api on {}", addr);
        }

        let hard_stop = CancellationToken::new();
        let router = self
            .router
            .layer(middleware::from_fn_with_state(hard_stop.clone(), abort_on_hard_stop));

        let server = axum::serve(listener, router)
            .with_graceful_shutdown(cancel.clone().cancelled_owned())
            .into_future();
        tokio::pin!(server);

        tokio::select! {
            result = &mut server => return result.map_err(ListenerError::Serve),
            _ = cancel.cancelled() => {}
        }

        info!("Draining HTTP connections for up to {:?}", self.shutdown_timeout);
        match tokio::time::timeout(self.shutdown_timeout, server).await {
            Ok(result) => {
                result.map_err(ListenerError::Serve)?;
                info!("HTTP listener stopped");
                Ok(())
            }
            Err(_) => {
                // connections run as their own tasks and outlive `server`
                hard_stop.cancel();
                Err(ListenerError::ShutdownTimeout(self.shutdown_timeout))
            }
        }
    }
}
