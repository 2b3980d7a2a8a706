//! Single-room line chat server library
//!
//! A plain-text TCP chat server built on tokio using the Actor pattern for
//! room state.
//!
//! # Protocol
//! - Server sends a banner line, then `Please Enter your username: `
//! - Client sends its display name as one line (`\n` or `\r\n`)
//! - Server replies `Welcome {name}` and announces
//!   `*** {name} just joined the channel` to everyone, the newcomer included
//! - Every later client line is broadcast as `[{name}]{text}`
//! - Departures are announced as `*** {name} left the channel`
//!
//! # Architecture
//! - `Coordinator` is the single owner of the room registry
//! - Each connection has a handler task (handshake + read activity) and a
//!   write task draining a bounded outgoing queue
//! - No locks needed - all registry access goes through message passing
//! - A slow reader never stalls the room: full queues trigger the
//!   configured `OverflowPolicy`
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//! use line_chat::{serve, Config};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::default();
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     serve(listener, config, CancellationToken::new()).await.unwrap();
//! }
//! ```

pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handler;
pub mod participant;
pub mod room;
pub mod server;
pub mod types;

// Re-export main types for convenience
pub use codec::{LineCodec, Outbound};
pub use config::{Config, OverflowPolicy};
pub use coordinator::{Coordinator, CoordinatorHandle, RoomEvent};
pub use error::{AppError, LineError, SendError};
pub use handler::handle_connection;
pub use participant::Participant;
pub use room::Room;
pub use server::serve;
pub use types::ParticipantId;
