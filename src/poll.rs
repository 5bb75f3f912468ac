use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Default polling interval for wait operations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum PollError {
    #[error("timed out waiting for the condition after {0:?}")]
    Timeout(Duration),
    #[error("cancelled while waiting for the condition")]
    Cancelled,
}

/// Calls `condition` right away and then once per `interval` until it returns `true`.
///
/// The deadline is checked independently of the interval, a pending tick never delays a timeout.
pub async fn poll_until<F>(
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    mut condition: F,
) -> Result<(), PollError>
where
    F: FnMut() -> bool,
{
    let mut ticks = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let wait = async {
        loop {
            ticks.tick().await;
            if condition() {
                return;
            }
            trace!("Polling condition not yet met, retrying...");
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        result = tokio::time::timeout(timeout, wait) => result.map_err(|_| PollError::Timeout(timeout)),
    }
}
