//! Per-connection command dispatch
//!
//! Reads frames from a joined connection and applies them to its room.
//! Rejections go back to the sender only; nothing here holds a lock.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tracing::{debug, warn};

use crate::connection::ConnectionHandle;
use crate::error::Error;
use crate::frame::read_frame_bytes;
use crate::hub::Hub;
use crate::lobby;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::ratelimit::RateLimiter;
use crate::room::Room;

pub struct Dispatcher {
    hub: Arc<Hub>,
    room: Arc<Room>,
    conn: ConnectionHandle,
    limiter: RateLimiter,
}

impl Dispatcher {
    pub fn new(hub: Arc<Hub>, room: Arc<Room>, conn: ConnectionHandle, limiter: RateLimiter) -> Self {
        Self {
            hub,
            room,
            conn,
            limiter,
        }
    }

    /// Process frames until the peer goes away or the connection is closed
    /// from our side, then run the disconnect path.
    pub async fn run<R: AsyncRead + Unpin>(mut self, reader: &mut R) {
        loop {
            tokio::select! {
                biased;
                _ = self.conn.closed() => {
                    debug!(participant_id = %self.conn.id(), "Connection closed locally");
                    break;
                }
                frame = read_frame_bytes(reader) => match frame {
                    Ok(bytes) => self.handle_frame(&bytes).await,
                    Err(Error::ConnectionClosed) => {
                        debug!(participant_id = %self.conn.id(), "Peer disconnected");
                        break;
                    }
                    Err(e) => {
                        warn!(participant_id = %self.conn.id(), error = %e, "Read failed");
                        break;
                    }
                },
            }
        }

        self.disconnect().await;
    }

    async fn handle_frame(&mut self, bytes: &[u8]) {
        if !self.limiter.allow() {
            debug!(participant_id = %self.conn.id(), "Rate limited");
            self.reply_error("rate limit exceeded");
            return;
        }

        match ClientMessage::from_bytes(bytes) {
            Ok(msg) => self.dispatch(msg).await,
            Err(e) => self.reply_error(lobby::reason(e)),
        }
    }

    /// Apply one decoded command
    pub async fn dispatch(&self, msg: ClientMessage) {
        let id = self.conn.id();
        let result = match msg {
            ClientMessage::Vote { vote } => self.room.vote(id, &vote).await,
            ClientMessage::Reveal => self.room.reveal(id).await,
            ClientMessage::Reset => self.room.reset(id).await,
            ClientMessage::StartTimer {
                timer_duration,
                auto_reveal,
            } => self.room.start_timer(id, timer_duration, auto_reveal).await,
            ClientMessage::StopTimer => self.room.stop_timer(id).await,
            ClientMessage::Ping => {
                self.conn.send(ServerMessage::Pong);
                return;
            }
            ClientMessage::Join { .. } => {
                self.reply_error("already joined a room");
                return;
            }
            request => {
                if let Some(reply) = lobby::handle_request(&self.hub, &request).await {
                    self.conn.send(reply);
                }
                return;
            }
        };

        match result {
            Ok(()) => self.hub.save_room(&self.room).await,
            Err(e) => {
                debug!(
                    room = %self.room.code(),
                    participant_id = %id,
                    error = %e,
                    "Command rejected"
                );
                self.reply_error(e.to_string());
            }
        }
    }

    fn reply_error(&self, message: impl Into<String>) {
        self.conn.send(ServerMessage::error(message));
    }

    async fn disconnect(self) {
        self.conn.close();

        let outcome = self.room.leave(self.conn.id()).await;
        if outcome.now_empty {
            self.hub.schedule_delete_if_empty(self.room.code()).await;
        }
        self.hub.save_room(&self.room).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::OUTBOUND_QUEUE;
    use crate::frame::write_frame;
    use planpoker_core::config::RoomsConfig;
    use planpoker_core::VotingScale;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc::Receiver;
    use uuid::Uuid;

    struct Seated {
        dispatcher: Dispatcher,
        rx: Receiver<ServerMessage>,
    }

    async fn seat(hub: &Arc<Hub>, room: &Arc<Room>, name: &str) -> Seated {
        let (conn, mut rx) = ConnectionHandle::new(Uuid::new_v4(), OUTBOUND_QUEUE);
        room.join(conn.clone(), name, None).await.unwrap();
        while rx.try_recv().is_ok() {}
        Seated {
            dispatcher: Dispatcher::new(hub.clone(), room.clone(), conn, RateLimiter::default()),
            rx,
        }
    }

    async fn setup() -> (Arc<Hub>, Arc<Room>) {
        let hub = Hub::start(RoomsConfig::default(), None).await;
        let created = hub.create_room(None, VotingScale::default()).await.unwrap();
        (hub, created.room)
    }

    fn drain(rx: &mut Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_rejection_goes_to_sender_only() {
        let (hub, room) = setup().await;
        let mut host = seat(&hub, &room, "host").await;
        let mut guest = seat(&hub, &room, "guest").await;
        drain(&mut host.rx);

        guest.dispatcher.dispatch(ClientMessage::Reveal).await;
        assert_eq!(
            drain(&mut guest.rx),
            vec![ServerMessage::error("only the host can reveal votes")]
        );
        assert!(drain(&mut host.rx).is_empty());
    }

    #[tokio::test]
    async fn test_ping_and_second_join() {
        let (hub, room) = setup().await;
        let mut host = seat(&hub, &room, "host").await;

        host.dispatcher.dispatch(ClientMessage::Ping).await;
        host.dispatcher
            .dispatch(ClientMessage::Join {
                room_code: room.code().to_string(),
                name: "again".to_string(),
                host_token: None,
            })
            .await;
        assert_eq!(
            drain(&mut host.rx),
            vec![
                ServerMessage::Pong,
                ServerMessage::error("already joined a room")
            ]
        );
        assert_eq!(room.participant_count().await, 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_keeps_connection() {
        let (hub, room) = setup().await;
        let mut host = seat(&hub, &room, "host").await;

        let (mut client, mut server) = tokio::io::duplex(4096);
        let payload = br#"{"type":"vote","vote":5}"#;
        client.write_all(&(payload.len() as u32).to_be_bytes()).await.unwrap();
        client.write_all(payload).await.unwrap();
        write_frame(&mut client, &ClientMessage::Ping).await.unwrap();
        drop(client);

        host.dispatcher.run(&mut server).await;

        let msgs = drain(&mut host.rx);
        assert!(matches!(&msgs[0], ServerMessage::Error { message } if message.starts_with("malformed message")));
        assert_eq!(msgs[1], ServerMessage::Pong);
        // EOF ran the disconnect path
        assert!(room.is_empty().await);
    }

    #[tokio::test]
    async fn test_disconnect_notifies_and_promotes() {
        let (hub, room) = setup().await;
        let host = seat(&hub, &room, "host").await;
        let host_id = host.dispatcher.conn.id();
        let mut guest = seat(&hub, &room, "guest").await;
        let guest_id = guest.dispatcher.conn.id();

        host.dispatcher.disconnect().await;
        assert_eq!(
            drain(&mut guest.rx),
            vec![ServerMessage::ParticipantLeft {
                participant_id: host_id,
                new_host_id: Some(guest_id),
            }]
        );

        guest.dispatcher.dispatch(ClientMessage::Reveal).await;
        assert!(matches!(&drain(&mut guest.rx)[..], [ServerMessage::Revealed(_)]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit() {
        let (hub, room) = setup().await;
        let mut host = seat(&hub, &room, "host").await;

        let ping = ClientMessage::Ping.to_bytes().unwrap();
        for _ in 0..12 {
            host.dispatcher.handle_frame(&ping).await;
        }

        let msgs = drain(&mut host.rx);
        assert_eq!(msgs.iter().filter(|m| **m == ServerMessage::Pong).count(), 10);
        assert_eq!(
            msgs.iter()
                .filter(|m| **m == ServerMessage::error("rate limit exceeded"))
                .count(),
            2
        );
    }
}
