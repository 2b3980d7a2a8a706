//! Error types for the chat server
//!
//! Defines connection-level errors, outgoing queue errors and line framing
//! errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors for one connection (the connection is closed)
/// and registration refusals (a notice is sent and the client may retry).
/// None of these terminate the process.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the connection (fatal for the connection)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Framing error on the inbound byte stream (fatal for the connection)
    #[error("Line error: {0}")]
    Line(#[from] LineError),

    /// Peer closed the connection
    #[error("Peer disconnected")]
    Disconnected,

    /// Coordinator is gone (internal channel broken)
    #[error("Room closed")]
    RoomClosed,

    /// Participant was cancelled (server shutdown or removal)
    #[error("Connection cancelled")]
    Cancelled,

    /// A socket write did not complete in time
    #[error("Write timed out")]
    WriteTimeout,

    /// Display name is empty
    #[error("Username cannot be empty")]
    EmptyName,

    /// Display name is already registered by another participant
    #[error("Username '{0}' is already taken")]
    NameTaken(String),
}

impl AppError {
    /// Whether the client may retry the handshake after this error
    pub fn is_refusal(&self) -> bool {
        matches!(self, AppError::EmptyName | AppError::NameTaken(_))
    }

    /// Line sent to the client for a refused registration
    ///
    /// Fatal errors have no notice; the connection simply closes.
    pub fn notice(&self) -> Option<String> {
        if self.is_refusal() {
            Some(self.to_string())
        } else {
            None
        }
    }
}

/// Outgoing queue errors
///
/// Occurs when the Coordinator attempts to enqueue a line for a participant.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The participant's outgoing queue is at capacity
    #[error("Queue full")]
    QueueFull,

    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Line framing errors
#[derive(Debug, Error)]
pub enum LineError {
    /// Underlying read or write failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line exceeded the configured maximum length
    #[error("Line exceeds {max} bytes")]
    TooLong { max: usize },

    /// Line is not valid UTF-8
    #[error("Line is not valid UTF-8")]
    InvalidUtf8,

    /// Stream ended in the middle of a line
    #[error("Stream ended with an unterminated line ({0} bytes)")]
    Unterminated(usize),
}
