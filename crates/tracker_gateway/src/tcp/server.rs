use crate::tcp::{handle_connection, ConnectionContext, FlushRequest};
use anyhow::Context;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, info_span, warn, Instrument};

/// Pause after a failed accept so a full fd table does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listener settings for the tracker TCP server
#[derive(Debug, Clone)]
pub struct TelemetryServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound for one frame, headers included
    pub max_frame_bytes: usize,
    /// Close connections silent for this long; `None` disables
    pub idle_timeout: Option<Duration>,
}

impl Default for TelemetryServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5055,
            max_frame_bytes: 64 * 1024,
            idle_timeout: None,
        }
    }
}

/// Accepts tracker connections and runs one task per connection
pub struct TelemetryServer {
    config: TelemetryServerConfig,
    context: ConnectionContext,
    flush_tx: broadcast::Sender<FlushRequest>,
}

impl TelemetryServer {
    /// `context` limits are overridden by `config`
    pub fn new(
        config: TelemetryServerConfig,
        mut context: ConnectionContext,
        flush_tx: broadcast::Sender<FlushRequest>,
    ) -> Self {
        context.max_frame_bytes = config.max_frame_bytes;
        context.idle_timeout = config.idle_timeout;
        Self {
            config,
            context,
            flush_tx,
        }
    }

    /// Bind the configured address and serve until cancelled
    pub async fn run(self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind tracker listener on {}", addr))?;
        self.serve(listener, cancellation_token).await
    }

    /// Serve on an already bound listener.
    ///
    /// On cancellation the listener is dropped first, then every connection
    /// flushes its sessions and this returns once all of them have finished.
    pub async fn serve(
        self,
        listener: TcpListener,
        cancellation_token: CancellationToken,
    ) -> anyhow::Result<()> {
        let local_addr = listener
            .local_addr()
            .context("tracker listener has no local address")?;
        info!(address = %local_addr, "tracker server listening");

        let tracker = TaskTracker::new();

        loop {
            let accepted = tokio::select! {
                _ = cancellation_token.cancelled() => break,
                accepted = listener.accept() => accepted,
            };

            let (stream, peer) = match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "failed to accept tracker connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            if let Err(e) = stream.set_nodelay(true) {
                debug!(error = %e, peer = %peer, "could not set TCP_NODELAY");
            }

            let span = info_span!("tracker_connection", peer = %peer);
            tracker.spawn(
                handle_connection(
                    stream,
                    peer,
                    self.context.clone(),
                    self.flush_tx.subscribe(),
                    cancellation_token.child_token(),
                )
                .instrument(span),
            );
        }

        drop(listener);
        tracker.close();
        info!(
            open_connections = tracker.len(),
            "tracker server stopping, waiting for connections to flush"
        );
        tracker.wait().await;
        info!("tracker server stopped");
        Ok(())
    }
}
