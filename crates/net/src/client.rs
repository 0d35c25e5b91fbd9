//! TCP client for talking to a planpoker server

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ClientMessage, ServerMessage};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, not in a room
    Lobby,
    /// Seated in a room
    Joined,
    Disconnected,
}

/// Client handle for network operations
pub struct Client {
    state: Arc<RwLock<ClientState>>,
    event_rx: mpsc::Receiver<ServerMessage>,
    cmd_tx: mpsc::Sender<ClientCommand>,
}

struct ClientState {
    connection: ConnectionState,
    participant_id: Option<Uuid>,
    room_code: Option<String>,
}

enum ClientCommand {
    Send(ClientMessage),
    Disconnect,
}

impl Client {
    /// Connect to a server
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        info!(addr = %addr, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, writer) = tokio::io::split(stream);

        let state = Arc::new(RwLock::new(ClientState {
            connection: ConnectionState::Lobby,
            participant_id: None,
            room_code: None,
        }));

        let (event_tx, event_rx) = mpsc::channel(256);
        let (cmd_tx, cmd_rx) = mpsc::channel(64);

        tokio::spawn(read_task(reader, state.clone(), event_tx));
        tokio::spawn(write_task(writer, cmd_rx));

        Ok(Client {
            state,
            event_rx,
            cmd_tx,
        })
    }

    /// Get the next server message; `None` once the connection is gone
    pub async fn next_event(&mut self) -> Option<ServerMessage> {
        self.event_rx.recv().await
    }

    /// Send any client message
    pub async fn send(&self, msg: ClientMessage) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send(msg))
            .await
            .map_err(|_| Error::NotConnected)
    }

    pub async fn join(&self, room_code: &str, name: &str, host_token: Option<&str>) -> Result<()> {
        self.send(ClientMessage::Join {
            room_code: room_code.to_string(),
            name: name.to_string(),
            host_token: host_token.map(str::to_string),
        })
        .await
    }

    /// Cast a vote; the empty string clears it
    pub async fn vote(&self, token: &str) -> Result<()> {
        self.send(ClientMessage::Vote {
            vote: token.to_string(),
        })
        .await
    }

    pub async fn reveal(&self) -> Result<()> {
        self.send(ClientMessage::Reveal).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(ClientMessage::Reset).await
    }

    pub async fn start_timer(&self, duration_secs: u64, auto_reveal: bool) -> Result<()> {
        self.send(ClientMessage::StartTimer {
            timer_duration: duration_secs,
            auto_reveal,
        })
        .await
    }

    pub async fn stop_timer(&self) -> Result<()> {
        self.send(ClientMessage::StopTimer).await
    }

    /// Send a ping
    pub async fn ping(&self) -> Result<()> {
        self.send(ClientMessage::Ping).await
    }

    /// Disconnect from the server
    pub async fn disconnect(&self) {
        let _ = self.cmd_tx.send(ClientCommand::Disconnect).await;
    }

    /// Get current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection
    }

    /// Our participant id, known once the first `sync` arrived
    pub async fn participant_id(&self) -> Option<Uuid> {
        self.state.read().await.participant_id
    }

    pub async fn room_code(&self) -> Option<String> {
        self.state.read().await.room_code.clone()
    }
}

/// Forward server frames to the event channel
async fn read_task(
    mut reader: ReadHalf<TcpStream>,
    state: Arc<RwLock<ClientState>>,
    event_tx: mpsc::Sender<ServerMessage>,
) {
    loop {
        match read_frame::<_, ServerMessage>(&mut reader).await {
            Ok(msg) => {
                track_state(&msg, &state).await;
                if event_tx.send(msg).await.is_err() {
                    break;
                }
            }
            Err(Error::ConnectionClosed) => {
                debug!("Server closed connection");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Read error");
                break;
            }
        }
    }

    let mut s = state.write().await;
    s.connection = ConnectionState::Disconnected;
}

async fn track_state(msg: &ServerMessage, state: &Arc<RwLock<ClientState>>) {
    match msg {
        ServerMessage::Sync(view) => {
            let mut s = state.write().await;
            s.connection = ConnectionState::Joined;
            s.participant_id = Some(view.current_participant_id);
            s.room_code = Some(view.code.clone());
        }
        ServerMessage::RoomClosed { .. } | ServerMessage::ServerShutdown => {
            let mut s = state.write().await;
            s.connection = ConnectionState::Disconnected;
        }
        _ => {}
    }
}

/// Write queued commands until asked to disconnect
async fn write_task(mut writer: WriteHalf<TcpStream>, mut cmd_rx: mpsc::Receiver<ClientCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            ClientCommand::Send(msg) => {
                if let Err(e) = write_frame(&mut writer, &msg).await {
                    warn!(error = %e, "Write error");
                    break;
                }
            }
            ClientCommand::Disconnect => {
                debug!("Disconnect requested");
                break;
            }
        }
    }

    let _ = writer.shutdown().await;
}
