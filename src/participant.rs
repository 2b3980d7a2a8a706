//! Participant struct definition
//!
//! The coordinator-side handle of one registered connection: its id, display
//! name, outgoing queue sender and lifecycle token.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::types::ParticipantId;

/// Registered participant
///
/// Owned by the room registry. The connection itself stays with the
/// participant's handler; this handle only reaches it through the bounded
/// outgoing queue and the cancellation token.
#[derive(Debug)]
pub struct Participant {
    /// Unique identifier for this session
    pub id: ParticipantId,
    /// Display name chosen during the handshake
    pub name: String,
    /// Coordinator → write activity queue
    sender: mpsc::Sender<String>,
    /// Shared with the handler's read and write activities
    token: CancellationToken,
}

impl Participant {
    /// Create a participant handle
    pub fn new(
        id: ParticipantId,
        name: String,
        sender: mpsc::Sender<String>,
        token: CancellationToken,
    ) -> Self {
        Self {
            id,
            name,
            sender,
            token,
        }
    }

    /// Enqueue a line for this participant's write activity
    ///
    /// Never waits: a full queue is reported as `SendError::QueueFull` so a
    /// slow reader cannot stall the caller.
    pub fn send(&self, line: String) -> Result<(), SendError> {
        self.sender.try_send(line).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Signal the participant's activities to stop
    pub fn disconnect(&self) {
        self.token.cancel();
    }
}
