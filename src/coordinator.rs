//! Room Coordinator actor
//!
//! The single owner of the room registry. Handlers talk to it only through
//! a `CoordinatorHandle`. Chat lines, registrations and departures share one
//! FIFO channel, so a participant's last line is always broadcast before its
//! leave announcement. Every registry mutation and every broadcast happens
//! sequentially inside `Coordinator::run`, which gives all participants the
//! same total order of lines.

use std::collections::VecDeque;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::config::{Config, OverflowPolicy};
use crate::error::AppError;
use crate::participant::Participant;
use crate::room::Room;
use crate::types::ParticipantId;

/// Events sent from handlers to the coordinator
#[derive(Debug)]
pub enum RoomEvent {
    /// Already-framed chat line to broadcast
    Line(String),
    /// Handshake finished; register this participant
    Join {
        participant: Participant,
        reply: oneshot::Sender<Result<(), AppError>>,
    },
    /// Participant's activities have stopped
    Leave { id: ParticipantId, name: String },
    /// Registry snapshot for diagnostics and tests (no wire command maps here)
    Roster { reply: oneshot::Sender<Vec<String>> },
}

/// Announcement broadcast after a successful registration
pub fn join_announcement(name: &str) -> String {
    format!("*** {} just joined the channel", name)
}

/// Announcement broadcast after a participant is removed
pub fn leave_announcement(name: &str) -> String {
    format!("*** {} left the channel", name)
}

/// Cloneable sender side of the coordinator's event channel
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    events: mpsc::Sender<RoomEvent>,
}

impl CoordinatorHandle {
    /// Publish an already-framed chat line for broadcast
    pub async fn publish(&self, line: String) -> Result<(), AppError> {
        self.events
            .send(RoomEvent::Line(line))
            .await
            .map_err(|_| AppError::RoomClosed)
    }

    /// Register a participant and wait for the coordinator's verdict
    ///
    /// Fails with `EmptyName` or `NameTaken` if the name is refused.
    pub async fn register(&self, participant: Participant) -> Result<(), AppError> {
        let (reply, verdict) = oneshot::channel();
        self.events
            .send(RoomEvent::Join { participant, reply })
            .await
            .map_err(|_| AppError::RoomClosed)?;
        verdict.await.map_err(|_| AppError::RoomClosed)?
    }

    /// Report that a participant's activities have stopped
    pub async fn leave(&self, id: ParticipantId, name: String) -> Result<(), AppError> {
        self.events
            .send(RoomEvent::Leave { id, name })
            .await
            .map_err(|_| AppError::RoomClosed)
    }

    /// Currently registered display names, sorted
    ///
    /// Server-side inspection only; clients have no command that reaches it.
    pub async fn roster(&self) -> Result<Vec<String>, AppError> {
        let (reply, names) = oneshot::channel();
        self.events
            .send(RoomEvent::Roster { reply })
            .await
            .map_err(|_| AppError::RoomClosed)?;
        names.await.map_err(|_| AppError::RoomClosed)
    }
}

/// The Room Coordinator actor
pub struct Coordinator {
    room: Room,
    overflow: OverflowPolicy,
    /// Lines, registrations, departures and queries, in arrival order
    events: mpsc::Receiver<RoomEvent>,
}

impl Coordinator {
    /// Create a coordinator and the handle used to reach it
    pub fn new(config: &Config) -> (Self, CoordinatorHandle) {
        let (events_tx, events_rx) = mpsc::channel(config.event_buffer);

        let coordinator = Self {
            room: Room::new(),
            overflow: config.overflow,
            events: events_rx,
        };
        let handle = CoordinatorHandle { events: events_tx };
        (coordinator, handle)
    }

    /// Run the coordinator event loop
    ///
    /// Returns only once every `CoordinatorHandle` has been dropped.
    pub async fn run(mut self) {
        info!("Coordinator started");

        while let Some(event) = self.events.recv().await {
            self.handle_event(event);
        }

        info!("Coordinator shutting down");
    }

    fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Line(line) => self.broadcast(line),
            RoomEvent::Join { participant, reply } => self.handle_join(participant, reply),
            RoomEvent::Leave { id, name } => self.handle_leave(id, &name),
            RoomEvent::Roster { reply } => {
                let _ = reply.send(self.room.names());
            }
        }
    }

    fn handle_join(
        &mut self,
        participant: Participant,
        reply: oneshot::Sender<Result<(), AppError>>,
    ) {
        let name = participant.name.clone();
        let id = participant.id;

        if let Err(e) = self.room.insert(participant) {
            debug!("Registration of '{}' refused: {}", name, e);
            let _ = reply.send(Err(e));
            return;
        }

        if reply.send(Ok(())).is_err() {
            // Handler went away while waiting for the verdict
            self.room.remove(&name, id);
            return;
        }

        info!("{} ({}) joined, {} registered", name, id, self.room.len());
        self.broadcast(join_announcement(&name));
    }

    fn handle_leave(&mut self, id: ParticipantId, name: &str) {
        let Some(participant) = self.room.remove(name, id) else {
            debug!("Leave for {} ({}) ignored, not registered", name, id);
            return;
        };

        participant.disconnect();
        info!("{} ({}) left, {} registered", name, id, self.room.len());
        self.broadcast(leave_announcement(name));
    }

    /// Broadcast a line to every registered participant
    ///
    /// Never waits on a participant. Full queues are handled by the overflow
    /// policy; disconnections it causes are announced in turn.
    fn broadcast(&mut self, line: String) {
        let mut pending = VecDeque::from([line]);

        while let Some(line) = pending.pop_front() {
            for (name, id) in self.room.broadcast(&line) {
                match self.overflow {
                    OverflowPolicy::DropNewest => {
                        warn!("Queue full for {}, dropping line", name);
                    }
                    OverflowPolicy::Disconnect => {
                        if let Some(participant) = self.room.remove(&name, id) {
                            warn!("Queue full for {}, disconnecting", name);
                            participant.disconnect();
                            pending.push_back(leave_announcement(&name));
                        }
                    }
                }
            }
        }
    }
}
