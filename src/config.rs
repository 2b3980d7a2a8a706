//! Server configuration
//!
//! Defaults match the classic deployment (port 6677, "Mukul" banner).
//! The binary takes the bind address as its first positional argument and
//! a handful of `--flag value` overrides.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::codec::DEFAULT_MAX_LINE_LENGTH;

/// Default server address
pub const DEFAULT_ADDR: &str = "0.0.0.0:6677";

/// Default capacity of each participant's outgoing queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default channel buffer size for coordinator events
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default bound on a single socket write
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// What the coordinator does when a participant's outgoing queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OverflowPolicy {
    /// Drop the line for that participant only; keep the participant
    #[value(alias = "drop")]
    DropNewest,
    /// Remove the participant from the room and close its connection
    #[default]
    Disconnect,
}

/// Single-room line chat server
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "line_chat", version, about = "Single-room line chat server")]
pub struct Config {
    /// Listening address
    #[arg(default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Name shown in the welcome banner
    #[arg(long, default_value = "Mukul")]
    pub owner: String,

    /// Outgoing queue capacity per participant
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, value_parser = positive)]
    pub queue_capacity: usize,

    /// Overflow handling for full outgoing queues
    #[arg(long, value_enum, default_value_t = OverflowPolicy::Disconnect)]
    pub overflow: OverflowPolicy,

    /// Maximum time a single socket write may take, in milliseconds
    #[arg(long = "write-timeout-ms", default_value = "5000", value_parser = millis)]
    pub write_timeout: Duration,

    /// Maximum inbound line length in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH, value_parser = positive)]
    pub max_line_length: usize,

    /// Coordinator event channel buffer
    #[arg(long, default_value_t = DEFAULT_EVENT_BUFFER, value_parser = positive)]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            owner: "Mukul".to_string(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl Config {
    /// Banner line written on connect
    pub fn banner(&self) -> String {
        format!("Welcome to {}'s Ultimate chat server!", self.owner)
    }
}

fn positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("expected a positive integer, got '{}'", value)),
    }
}

fn millis(value: &str) -> Result<Duration, String> {
    positive(value).map(|ms| Duration::from_millis(ms as u64))
}
