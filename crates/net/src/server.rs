//! TCP server
//!
//! Accepts connections, serves pre-join requests, then hands joined
//! connections to a [`Dispatcher`]. Each connection gets one reader task
//! (this one) and one writer task.

use std::net::SocketAddr;
use std::sync::Arc;

use planpoker_core::config::ServerConfig;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::connection::{writer_task, ConnectionHandle, OUTBOUND_QUEUE};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::hub::Hub;
use crate::lobby;
use crate::ratelimit::RateLimiter;

/// Server handle
pub struct Server {
    addr: SocketAddr,
    hub: Arc<Hub>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind and start accepting connections
    pub async fn start(config: &ServerConfig, hub: Arc<Hub>) -> Result<Self> {
        let listener = TcpListener::bind((config.bind.as_str(), config.port)).await?;
        let bound_addr = listener.local_addr()?;

        info!(addr = %bound_addr, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        tokio::spawn(accept_loop(listener, hub.clone(), shutdown_tx.subscribe()));

        Ok(Server {
            addr: bound_addr,
            hub,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Stop accepting, and tell every connected client the server is going away
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        self.hub.shutdown().await;
        info!("Server shutdown initiated");
    }
}

/// Accept incoming connections
async fn accept_loop(
    listener: TcpListener,
    hub: Arc<Hub>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(addr = %addr, "New connection");
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            hub.clone(),
                            shutdown_rx.resubscribe(),
                        ));
                    }
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    hub: Arc<Hub>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!(addr = %addr, error = %e, "Could not disable Nagle");
    }
    let (mut reader, writer) = tokio::io::split(stream);

    let (conn, outbound) = ConnectionHandle::new(Uuid::new_v4(), OUTBOUND_QUEUE);
    let writer_handle = tokio::spawn(writer_task(writer, outbound, conn.close_token()));
    let mut limiter = RateLimiter::default();

    if let Some(room) = lobby::run(&mut reader, &hub, &conn, &mut limiter, &mut shutdown_rx).await
    {
        info!(addr = %addr, participant_id = %conn.id(), room = %room.code(), "Peer joined");
        Dispatcher::new(hub, room, conn.clone(), limiter)
            .run(&mut reader)
            .await;
    }

    conn.close();
    let _ = writer_handle.await;
    info!(addr = %addr, participant_id = %conn.id(), "Peer disconnected");
}
