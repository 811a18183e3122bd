use crate::tcp::FlushRequest;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default period between trip summary flushes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(300);

/// Ask every live connection to flush its sessions once per `period`.
///
/// The first tick fires one full period after start.
pub async fn run_flush_timer(
    period: Duration,
    flush_tx: broadcast::Sender<FlushRequest>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(period_secs = period.as_secs(), "flush timer started");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("flush timer stopped");
                return Ok(());
            }
            _ = ticker.tick() => {
                // an error only means no connection is currently open
                match flush_tx.send(FlushRequest) {
                    Ok(receivers) => debug!(receivers, "flush requested"),
                    Err(_) => debug!("flush tick with no open connections"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_after_each_period() {
        let (tx, mut rx) = broadcast::channel(4);
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_flush_timer(
            Duration::from_secs(300),
            tx,
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.try_recv().unwrap(), FlushRequest);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(rx.try_recv().unwrap(), FlushRequest);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_survives_ticks_without_receivers() {
        let (tx, rx) = broadcast::channel(4);
        drop(rx);
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_flush_timer(Duration::from_secs(1), tx, token.clone()));

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!handle.is_finished());

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
