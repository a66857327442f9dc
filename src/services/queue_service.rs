use crate::config::QueueConfig;
use crate::utils::retry_on_startup;
use anyhow::{Context, Result};
use async_channel::{Receiver, Sender, bounded};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("pop cancelled by shutdown")]
    Cancelled,

    #[error("malformed queue reply: {0}")]
    Malformed(String),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("connection pool closed")]
    PoolClosed,
}

#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Blocks until a payload is available or `cancel` fires.
    ///
    /// `Ok(None)` means the poll window elapsed without an item; callers
    /// loop and the token is rechecked on the next call.
    async fn pop(&self, cancel: &CancellationToken) -> Result<Option<String>, QueueError>;
}

/// Redis list consumer.
///
/// `BRPOP` holds its connection until it returns, so every concurrent pop
/// needs a connection of its own. They are kept in a channel that works as
/// a fixed-size pool; a connection that errored is dropped and reopened on
/// its next checkout.
pub struct RedisQueue {
    client: Client,
    queue_name: String,
    pop_timeout: Duration,
    idle_tx: Sender<Option<MultiplexedConnection>>,
    idle_rx: Receiver<Option<MultiplexedConnection>>,
}

impl RedisQueue {
    pub async fn connect(config: &QueueConfig, pool_size: usize) -> Result<Self> {
        let client = Client::open(config.redis_url.as_str())
            .with_context(|| format!("Invalid Redis URL: {}", config.redis_url))?;

        let (idle_tx, idle_rx) = bounded(pool_size.max(1));

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        let first = {
            let client = &client;
            retry_on_startup("Redis connect", connect_timeout, move || {
                client.get_multiplexed_async_connection()
            })
        }
        .await
        .context("Failed to connect to Redis")?;
        idle_tx.try_send(Some(first)).ok();
        for _ in 1..pool_size.max(1) {
            // Opened lazily by the first pop that checks it out.
            idle_tx.try_send(None).ok();
        }

        log::info!(
            "Connected to Redis queue '{}' ({} connections)",
            config.queue_name,
            pool_size
        );

        Ok(RedisQueue {
            client,
            queue_name: config.queue_name.clone(),
            pop_timeout: Duration::from_secs(config.pop_timeout_secs),
            idle_tx,
            idle_rx,
        })
    }

    async fn brpop(&self, conn: &mut MultiplexedConnection) -> Result<Option<String>, QueueError> {
        let reply: Option<Vec<Vec<u8>>> = redis::cmd("BRPOP")
            .arg(&self.queue_name)
            .arg(self.pop_timeout.as_secs())
            .query_async(conn)
            .await?;

        match reply {
            None => Ok(None),
            Some(pair) => parse_pop_reply(pair).map(Some),
        }
    }
}

#[async_trait]
impl QueueClient for RedisQueue {
    async fn pop(&self, cancel: &CancellationToken) -> Result<Option<String>, QueueError> {
        if cancel.is_cancelled() {
            return Err(QueueError::Cancelled);
        }

        let slot = self.idle_rx.recv().await.map_err(|_| QueueError::PoolClosed)?;
        let mut conn = match slot {
            Some(conn) => conn,
            None => match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    self.idle_tx.send(None).await.ok();
                    return Err(e.into());
                }
            },
        };

        let result = self.brpop(&mut conn).await;
        let keep = !matches!(result, Err(QueueError::Redis(_)));
        self.idle_tx.send(keep.then_some(conn)).await.ok();
        result
    }
}

/// `BRPOP` answers `[queue name, payload]`; anything else is rejected, and
/// so is a payload that is not UTF-8.
pub fn parse_pop_reply(mut reply: Vec<Vec<u8>>) -> Result<String, QueueError> {
    if reply.len() != 2 {
        return Err(QueueError::Malformed(format!(
            "expected [queue, payload], got {} elements",
            reply.len()
        )));
    }
    String::from_utf8(reply.swap_remove(1))
        .map_err(|e| QueueError::Malformed(format!("payload is not UTF-8: {}", e)))
}
