use backoff::ExponentialBackoff;
use backoff::ExponentialBackoffBuilder;
use chrono::{NaiveDate, Utc};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Current UTC date, truncated to the day boundary.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn startup_backoff(max_elapsed: Duration) -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_max_interval(Duration::from_secs(5))
        .with_max_elapsed_time(Some(max_elapsed))
        .build()
}

/// Retries a startup connection until it succeeds or `max_elapsed` passes.
/// Only used while bringing the process up, never for queue items.
pub async fn retry_on_startup<T, E, F, Fut>(what: &str, max_elapsed: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    backoff::future::retry_notify(
        startup_backoff(max_elapsed),
        || {
            let attempt = op();
            async move { attempt.await.map_err(backoff::Error::transient) }
        },
        |err: E, delay: Duration| {
            log::warn!("{} failed: {}. Retrying in {:?}", what, err, delay);
        },
    )
    .await
}
