//! Background removal of expired consumer sessions.

use crate::pool::ConsumerPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Every `interval`, take expired sessions out of `pool` and close them on
/// their own tasks. Stops when `cancel` fires.
pub fn spawn_sweeper(
    pool: Arc<ConsumerPool>,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Consumer expiration sweeper started (interval {:?})", interval);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = pool.remove_expired(Instant::now());
                    if !expired.is_empty() {
                        debug!("Sweeping {} expired consumer sessions", expired.len());
                    }
                    for session in expired {
                        tokio::spawn(async move { session.close().await });
                    }
                }
            }
        }
        info!("Consumer expiration sweeper stopped");
    })
}
