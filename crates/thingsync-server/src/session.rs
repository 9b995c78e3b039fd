//! WebSocket lifecycle of one joined client, from upgrade to leave.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::connection::Connection;
use crate::hub::Hub;

/// Shortest ping period the writer will use.
const MIN_PING_INTERVAL: Duration = Duration::from_millis(10);

/// Ping cadence and the silence after which a client is dropped.
#[derive(Clone, Copy, Debug)]
pub struct Heartbeat {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Heartbeat {
    /// Ping period, never zero.
    pub fn ping_interval(&self) -> Duration {
        self.interval.max(MIN_PING_INTERVAL)
    }
}

/// Run a joined client until its socket closes, it goes silent, it is
/// superseded, or the server shuts down.
///
/// 1. Joins the hub (join broadcast, then handshake frames)
/// 2. Spawns the writer: drains the outbound queue and sends pings
/// 3. Feeds inbound text (or UTF-8 binary) frames to the hub in order
/// 4. Leaves the hub exactly once
#[instrument(skip_all, fields(conn_id = %conn.id, user_id = conn.user.id))]
pub async fn run_connection(
    ws: WebSocket,
    hub: Arc<Hub>,
    conn: Arc<Connection>,
    mut outbound: mpsc::Receiver<Arc<String>>,
    heartbeat: Heartbeat,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    hub.join(&conn).await;
    info!("client connected");

    let writer_conn = Arc::clone(&conn);
    let writer = tokio::spawn(async move {
        let mut ping = tokio::time::interval(heartbeat.ping_interval());
        let _ = ping.tick().await;

        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(text) = frame else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if writer_conn.idle_for() > heartbeat.timeout {
                        warn!(idle_secs = writer_conn.idle_for().as_secs(), "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
                () = writer_conn.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        writer_conn.cancel();
    });

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = conn.cancelled() => break,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "socket read failed");
                break;
            }
            None => break,
        };
        conn.mark_alive();

        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => {
                    debug!(len = data.len(), "ignoring non-UTF8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        hub.process(&conn, &text).await;
    }

    let _ = hub.leave(&conn).await;
    conn.cancel();
    let _ = writer.await;
    info!(
        state = ?conn.state(),
        dropped = conn.drop_count(),
        secs = conn.connected_at.elapsed().as_secs(),
        "client disconnected"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_interval_is_clamped() {
        let heartbeat = Heartbeat {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(1),
        };
        assert_eq!(heartbeat.ping_interval(), MIN_PING_INTERVAL);
    }

    #[test]
    fn configured_interval_is_kept() {
        let heartbeat = Heartbeat {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(90),
        };
        assert_eq!(heartbeat.ping_interval(), Duration::from_secs(30));
    }
}
