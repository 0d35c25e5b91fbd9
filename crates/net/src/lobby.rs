//! Pre-join requests
//!
//! A fresh connection can create and inspect rooms before it joins one.
//! These requests touch the registry only and are answered to the sender.

use std::sync::Arc;

use planpoker_core::{ScaleKind, VotingScale, MAX_CUSTOM_VALUES, MAX_TOKEN_LEN};
use tokio::io::AsyncRead;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::connection::ConnectionHandle;
use crate::error::{Error, Result};
use crate::frame::read_frame_bytes;
use crate::hub::Hub;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::ratelimit::RateLimiter;
use crate::room::Room;

/// Answer a lifecycle request.
///
/// Returns `None` for `join` and for room commands, which need a
/// connection context.
pub async fn handle_request(hub: &Hub, msg: &ClientMessage) -> Option<ServerMessage> {
    let reply = match msg {
        ClientMessage::CreateRoom {
            expiry_hours,
            scale,
            custom_values,
        } => {
            let scale = match resolve_scale(scale.as_deref(), custom_values.as_deref()) {
                Some(scale) => scale,
                None => {
                    return Some(ServerMessage::error(format!(
                        "custom scale needs 1-{MAX_CUSTOM_VALUES} distinct values of at most {MAX_TOKEN_LEN} characters"
                    )))
                }
            };
            let expiry_hours = expiry_hours
                .filter(|h| *h > 0)
                .map(|h| u32::try_from(h).unwrap_or(u32::MAX));

            match hub.create_room(expiry_hours, scale).await {
                Ok(created) => ServerMessage::RoomCreated {
                    code: created.room.code().to_string(),
                    host_token: created.host_token,
                    expiry_hours: created.room.expiry_hours(),
                    scale: created.room.scale().clone(),
                },
                Err(Error::RegistryFull) => ServerMessage::error("server has reached its room limit"),
                Err(e) => ServerMessage::error(e.to_string()),
            }
        }
        ClientMessage::GetRoom { code } => match hub.get_room(code).await {
            Some(room) => ServerMessage::RoomInfo {
                code: room.code().to_string(),
                participant_count: room.participant_count().await,
                expiry_hours: room.expiry_hours(),
                scale: room.scale().clone(),
            },
            None => ServerMessage::error("room not found"),
        },
        ClientMessage::CheckRoom { code } => match hub.get_room(code).await {
            Some(room) => ServerMessage::RoomCheck {
                exists: true,
                participant_count: room.participant_count().await,
            },
            None => ServerMessage::RoomCheck {
                exists: false,
                participant_count: 0,
            },
        },
        ClientMessage::ListScales => ServerMessage::Scales {
            scales: VotingScale::presets(),
        },
        ClientMessage::Stats => {
            let stats = hub.stats().await;
            ServerMessage::Stats {
                rooms: stats.rooms,
                participants: stats.participants,
            }
        }
        _ => return None,
    };
    Some(reply)
}

/// Pick the scale for a new room. `None` means the custom values were unusable.
fn resolve_scale(name: Option<&str>, custom: Option<&[String]>) -> Option<VotingScale> {
    let kind = name.and_then(ScaleKind::parse);
    match (kind, custom) {
        (Some(ScaleKind::Custom), values) => VotingScale::custom(values.unwrap_or_default()),
        (None, Some(values)) if name.is_none() => VotingScale::custom(values),
        _ => Some(VotingScale::from_name(name.unwrap_or_default())),
    }
}

/// Seat the connection in the named room, or say why not
pub async fn join(
    hub: &Hub,
    conn: &ConnectionHandle,
    room_code: &str,
    name: &str,
    host_token: Option<&str>,
) -> Result<Arc<Room>> {
    let room = hub.get_room(room_code).await.ok_or(Error::RoomNotFound)?;
    room.join(conn.clone(), name, host_token).await?;
    Ok(room)
}

/// Text for an error frame
pub(crate) fn reason(err: Error) -> String {
    match err {
        Error::Protocol(msg) => msg,
        other => other.to_string(),
    }
}

/// Serve pre-join requests until the connection joins a room.
///
/// Returns `None` if the connection ends first.
pub async fn run<R: AsyncRead + Unpin>(
    reader: &mut R,
    hub: &Arc<Hub>,
    conn: &ConnectionHandle,
    limiter: &mut RateLimiter,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> Option<Arc<Room>> {
    loop {
        let bytes = tokio::select! {
            biased;
            _ = conn.closed() => return None,
            _ = shutdown_rx.recv() => {
                conn.send(ServerMessage::ServerShutdown);
                return None;
            }
            frame = read_frame_bytes(reader) => match frame {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!(error = %e, "Connection ended before join");
                    return None;
                }
            },
        };

        if !limiter.allow() {
            conn.send(ServerMessage::error("rate limit exceeded"));
            continue;
        }

        let msg = match ClientMessage::from_bytes(&bytes) {
            Ok(msg) => msg,
            Err(e) => {
                conn.send(ServerMessage::error(reason(e)));
                continue;
            }
        };

        match msg {
            ClientMessage::Join {
                room_code,
                name,
                host_token,
            } => match join(hub, conn, &room_code, &name, host_token.as_deref()).await {
                Ok(room) => {
                    hub.save_room(&room).await;
                    return Some(room);
                }
                Err(e) => {
                    let reason = reason(e);
                    info!(room = %room_code, reason = %reason, "Join rejected");
                    conn.send(ServerMessage::JoinRejected { reason });
                }
            },
            other => match handle_request(hub, &other).await {
                Some(reply) => {
                    conn.send(reply);
                }
                None => {
                    conn.send(ServerMessage::error("join a room first"));
                }
            },
        }
    }
}
