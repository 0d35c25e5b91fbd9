//! Participant connections
//!
//! A connection is a bounded outbound queue drained by one writer task that
//! owns the socket's write half. Everything else holds a cheap
//! [`ConnectionHandle`] and only ever enqueues.

use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::frame::write_frame;
use crate::protocol::ServerMessage;

/// Outbound queue depth per connection
pub const OUTBOUND_QUEUE: usize = 64;

/// How long a closing connection may spend flushing queued frames
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::Sender<ServerMessage>,
    closed: CancellationToken,
}

impl ConnectionHandle {
    /// Create a handle and the receiving end its writer task drains
    pub fn new(id: Uuid, capacity: usize) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                id,
                tx,
                closed: CancellationToken::new(),
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Enqueue without waiting.
    ///
    /// A full or closed queue closes this connection; its reader then takes
    /// the usual disconnect path.
    pub fn send(&self, msg: ServerMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(participant_id = %self.id, "Outbound queue full, dropping connection");
                self.closed.cancel();
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.closed.cancel();
                false
            }
        }
    }

    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed from any side
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    pub(crate) fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

/// Write queued messages to the socket until the queue ends or the
/// connection closes. Frames queued before the close are still flushed.
pub async fn writer_task<W>(
    mut writer: W,
    mut rx: mpsc::Receiver<ServerMessage>,
    closed: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = write_frame(&mut writer, &msg).await {
                    debug!(error = %e, "Write failed");
                    closed.cancel();
                    return;
                }
            }
            _ = closed.cancelled() => {
                let drain = async {
                    while let Ok(msg) = rx.try_recv() {
                        if write_frame(&mut writer, &msg).await.is_err() {
                            break;
                        }
                    }
                };
                let _ = tokio::time::timeout(DRAIN_TIMEOUT, drain).await;
                break;
            }
        }
    }

    closed.cancel();
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::read_frame;
    use std::io::Cursor;

    #[tokio::test]
    async fn test_full_queue_closes_connection() {
        let (conn, _rx) = ConnectionHandle::new(Uuid::new_v4(), 2);
        assert!(conn.send(ServerMessage::Pong));
        assert!(conn.send(ServerMessage::Pong));
        assert!(!conn.is_closed());

        assert!(!conn.send(ServerMessage::Pong));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_dropped_receiver_closes_connection() {
        let (conn, rx) = ConnectionHandle::new(Uuid::new_v4(), 4);
        drop(rx);
        assert!(!conn.send(ServerMessage::Pong));
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn test_writer_flushes_queue_on_close() {
        let (conn, rx) = ConnectionHandle::new(Uuid::new_v4(), 4);
        conn.send(ServerMessage::TimerEnded);
        conn.send(ServerMessage::ServerShutdown);
        conn.close();

        let mut out = Vec::new();
        writer_task(&mut out, rx, conn.close_token()).await;

        let mut cursor = Cursor::new(out);
        let first: ServerMessage = read_frame(&mut cursor).await.unwrap();
        let second: ServerMessage = read_frame(&mut cursor).await.unwrap();
        assert_eq!(first, ServerMessage::TimerEnded);
        assert_eq!(second, ServerMessage::ServerShutdown);
    }
}
