//! planpoker Network Library
//!
//! Room synchronization over TCP.
//!
//! # Architecture
//!
//! - **Hub**: registry of rooms, keyed by a short case-insensitive code
//! - **Room**: one mutex-guarded estimation session and its connections
//! - **Server**: accepts connections, answers pre-join requests, and runs a
//!   dispatcher per joined connection
//! - **Client**: connects to a server
//! - **Protocol**: length-prefixed JSON messages tagged by `"type"`
//!
//! # Usage
//!
//! ```ignore
//! let hub = Hub::start(config.rooms.clone(), None).await;
//! let server = Server::start(&config.server, hub).await?;
//!
//! let mut client = Client::connect(server.addr()).await?;
//! client.join("ABC123", "ann", None).await?;
//! while let Some(msg) = client.next_event().await {
//!     match msg {
//!         ServerMessage::Revealed(results) => { /* handle */ }
//!         _ => {}
//!     }
//! }
//! ```

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod error;
mod frame;
pub mod hub;
pub mod lobby;
pub mod protocol;
pub mod ratelimit;
pub mod room;
pub mod server;
mod timer;

pub use client::{Client, ConnectionState};
pub use connection::ConnectionHandle;
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use hub::{CreatedRoom, Hub, HubStats};
pub use protocol::{ClientMessage, ServerMessage};
pub use room::{LeaveOutcome, Room};
pub use server::Server;
