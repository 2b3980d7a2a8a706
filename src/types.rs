//! Basic type definitions for the chat server
//!
//! Provides the `ParticipantId` newtype that distinguishes sessions
//! independently of their (user-chosen) display names.

use uuid::Uuid;

/// Unique participant identifier (newtype pattern)
///
/// Wraps a UUID v4. Two sessions never share an id, even when one reuses
/// the display name of a session that has already left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParticipantId(pub Uuid);

impl ParticipantId {
    /// Create a new random participant ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
