use crate::domain::{
    HistoriqueFlusher, IngestOutcome, StopDetectionConfig, TelemetryService, TrackerSessions,
};
use crate::tcp::{parse_reading, FrameAck, FrameError, TelemetryFrame, TelemetryFrameCodec};
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument, Span};

/// Broadcast by the flush timer to every live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushRequest;

/// Shared collaborators and limits for connection tasks
#[derive(Clone)]
pub struct ConnectionContext {
    pub telemetry_service: Arc<TelemetryService>,
    pub flusher: Arc<HistoriqueFlusher>,
    pub stop_detection: StopDetectionConfig,
    pub max_frame_bytes: usize,
    /// `None` keeps silent connections open forever
    pub idle_timeout: Option<Duration>,
}

enum ConnectionEvent {
    Shutdown,
    Flush,
    FlushSourceClosed,
    Frame(TelemetryFrame),
    FrameError(FrameError),
    Idle,
    Closed,
}

async fn next_flush(flush_rx: &mut Option<broadcast::Receiver<FlushRequest>>) -> ConnectionEvent {
    let Some(rx) = flush_rx else {
        return std::future::pending().await;
    };
    match rx.recv().await {
        Ok(FlushRequest) => ConnectionEvent::Flush,
        // missed ticks collapse into one flush
        Err(broadcast::error::RecvError::Lagged(_)) => ConnectionEvent::Flush,
        Err(broadcast::error::RecvError::Closed) => ConnectionEvent::FlushSourceClosed,
    }
}

async fn next_frame(
    framed: &mut Framed<TcpStream, TelemetryFrameCodec>,
    idle_deadline: Option<Instant>,
) -> ConnectionEvent {
    let next = match idle_deadline {
        Some(deadline) => match tokio::time::timeout_at(deadline, framed.next()).await {
            Ok(next) => next,
            Err(_) => return ConnectionEvent::Idle,
        },
        None => framed.next().await,
    };
    match next {
        Some(Ok(frame)) => ConnectionEvent::Frame(frame),
        Some(Err(e)) => ConnectionEvent::FrameError(e),
        None => ConnectionEvent::Closed,
    }
}

/// Serve one tracker connection until the peer goes away or shutdown is requested.
///
/// Sessions live on this task's stack; periodic flush requests and the final
/// flush on close all run here, so no other task ever touches them.
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: ConnectionContext,
    flush_rx: broadcast::Receiver<FlushRequest>,
    shutdown: CancellationToken,
) {
    let mut framed = Framed::new(stream, TelemetryFrameCodec::new(ctx.max_frame_bytes));
    let mut sessions = TrackerSessions::new(ctx.stop_detection);
    let mut flush_rx = Some(flush_rx);
    let idle_after = |timeout: Duration| Instant::now() + timeout;
    let mut idle_deadline = ctx.idle_timeout.map(idle_after);
    info!("tracker connected");

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => ConnectionEvent::Shutdown,
            event = next_flush(&mut flush_rx) => event,
            event = next_frame(&mut framed, idle_deadline) => event,
        };

        match event {
            ConnectionEvent::Frame(frame) => {
                idle_deadline = ctx.idle_timeout.map(idle_after);
                let http = frame.http;
                let span = info_span!(parent: Span::none(), "telemetry_message", peer = %peer);
                handle_frame(&ctx, &mut sessions, frame)
                    .instrument(span)
                    .await;
                if http {
                    if let Err(e) = framed.send(FrameAck::HttpOk).await {
                        warn!(error = %e, "failed to acknowledge frame");
                        break;
                    }
                }
            }
            ConnectionEvent::Flush => {
                let written = ctx.flusher.flush_sessions(&mut sessions, Utc::now()).await;
                debug!(written, "periodic flush");
            }
            ConnectionEvent::FlushSourceClosed => {
                debug!("flush timer gone, periodic flushes stop");
                flush_rx = None;
            }
            ConnectionEvent::FrameError(e) => {
                warn!(error = %e, "unrecoverable frame error, closing connection");
                break;
            }
            ConnectionEvent::Idle => {
                info!("tracker idle, closing connection");
                break;
            }
            ConnectionEvent::Closed => {
                info!("tracker disconnected");
                break;
            }
            ConnectionEvent::Shutdown => {
                debug!("shutdown requested");
                break;
            }
        }
    }

    let written = ctx.flusher.flush_sessions(&mut sessions, Utc::now()).await;
    info!(sessions = sessions.len(), written, "connection closed, sessions flushed");
}

async fn handle_frame(ctx: &ConnectionContext, sessions: &mut TrackerSessions, frame: TelemetryFrame) {
    if let Some(reason) = frame.header_error {
        warn!(reason = %reason, "dropping frame with malformed headers");
        return;
    }

    let reading = match parse_reading(&frame.body) {
        Ok(reading) => reading,
        Err(e) => {
            warn!(error = %e, "dropping malformed telemetry");
            return;
        }
    };

    match ctx
        .telemetry_service
        .ingest(reading, sessions, Utc::now())
        .await
    {
        Ok(IngestOutcome::Stored { position, stop }) => {
            debug!(
                vehicle_id = %position.vehicle_id,
                stop_closed = stop.is_some(),
                "telemetry ingested"
            );
        }
        Ok(IngestOutcome::UnknownDevice) => {}
        Err(e) => {
            warn!(error = %e, "telemetry ingestion failed");
        }
    }
}
