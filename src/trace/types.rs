//! Data types produced by the trace parser.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Direction of an observed event, seen from the local container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Received by the local container (`<` marker).
    Inbound,
    /// Sent by the local container (`>` marker).
    Outbound,
}

impl Direction {
    pub const RECEIVED_MARKER: &'static str = "<";
    pub const SENT_MARKER: &'static str = ">";

    /// Lenient classification: only the received marker is inbound.
    pub fn from_marker(marker: &str) -> Direction {
        if marker == Self::RECEIVED_MARKER {
            Direction::Inbound
        } else {
            Direction::Outbound
        }
    }

    /// Strict classification: anything but the two known markers is rejected.
    pub fn from_marker_strict(marker: &str) -> Option<Direction> {
        match marker {
            Self::RECEIVED_MARKER => Some(Direction::Inbound),
            Self::SENT_MARKER => Some(Direction::Outbound),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "{}", Self::RECEIVED_MARKER),
            Direction::Outbound => write!(f, "{}", Self::SENT_MARKER),
        }
    }
}

/// One network observation: a local container talking over a remote port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub container: String,
    pub direction: Direction,
    pub port: u16,
}

impl EventRecord {
    pub fn new(container: impl Into<String>, direction: Direction, port: u16) -> Self {
        Self {
            container: container.into(),
            direction,
            port,
        }
    }
}
