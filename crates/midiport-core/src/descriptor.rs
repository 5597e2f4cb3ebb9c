//! Port descriptors.
//!
//! A descriptor is a snapshot: `index` is the position the port had in the
//! backend's list when the descriptor was produced and drifts as soon as any
//! port on the system opens or closes. Only `(name, direction)` identifies a
//! port over time.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which way data flows relative to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// A port the application can read from (opened by an input port).
    Readable,
    /// A port the application can write to (opened by an output port).
    Writable,
    Unknown,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Direction::Readable => "Readable",
            Direction::Writable => "Writable",
            Direction::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortDescriptor {
    pub name: String,
    pub index: usize,
    pub direction: Direction,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>, index: usize, direction: Direction) -> Self {
        Self {
            name: name.into(),
            index,
            direction,
        }
    }

    /// True if both descriptors name the same system port, ignoring the index.
    pub fn same_port(&self, other: &PortDescriptor) -> bool {
        self.name == other.name && self.direction == other.direction
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "name = '{}', index = {}, direction = {}",
            self.name, self.index, self.direction
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_port_ignores_index() {
        let a = PortDescriptor::new("Midi Through Port-0", 0, Direction::Readable);
        let b = PortDescriptor::new("Midi Through Port-0", 4, Direction::Readable);
        let c = PortDescriptor::new("Midi Through Port-0", 0, Direction::Writable);
        assert!(a.same_port(&b));
        assert!(!a.same_port(&c));
        assert_ne!(a, b);
    }

    #[test]
    fn test_display() {
        let desc = PortDescriptor::new("Synth:In 130:0", 2, Direction::Writable);
        insta::assert_snapshot!(desc.to_string(), @"name = 'Synth:In 130:0', index = 2, direction = Writable");
    }
}
