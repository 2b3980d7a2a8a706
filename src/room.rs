//! Room registry
//!
//! The set of registered participants, keyed by display name. Owned by the
//! coordinator; nothing else reads or writes it.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{AppError, SendError};
use crate::participant::Participant;
use crate::types::ParticipantId;

/// Single global chat room
///
/// Display names are unique within the room. Each entry also carries the
/// participant's `ParticipantId` so removals can never evict a newer session
/// that reused the name.
#[derive(Debug, Default)]
pub struct Room {
    participants: HashMap<String, Participant>,
}

impl Room {
    /// Create an empty room
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a participant
    ///
    /// Rejects empty names and names already in use.
    pub fn insert(&mut self, participant: Participant) -> Result<(), AppError> {
        if participant.name.is_empty() {
            return Err(AppError::EmptyName);
        }
        if self.participants.contains_key(&participant.name) {
            return Err(AppError::NameTaken(participant.name));
        }
        self.participants
            .insert(participant.name.clone(), participant);
        Ok(())
    }

    /// Remove the entry for `name` if it still belongs to `id`
    pub fn remove(&mut self, name: &str, id: ParticipantId) -> Option<Participant> {
        match self.participants.get(name) {
            Some(p) if p.id == id => self.participants.remove(name),
            _ => None,
        }
    }

    /// Number of registered participants
    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    /// Registered display names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.participants.keys().cloned().collect();
        names.sort();
        names
    }

    /// Enqueue `line` for every registered participant
    ///
    /// Returns the participants whose queue was full. Participants whose
    /// queue is closed are already shutting down and will leave on their own.
    pub fn broadcast(&self, line: &str) -> Vec<(String, ParticipantId)> {
        let mut overflowed = Vec::new();

        for (name, participant) in &self.participants {
            match participant.send(line.to_string()) {
                Ok(()) => {}
                Err(SendError::QueueFull) => {
                    overflowed.push((name.clone(), participant.id));
                }
                Err(SendError::ChannelClosed) => {
                    debug!("Queue closed for {} (disconnecting)", name);
                }
            }
        }

        overflowed
    }
}
