//! MIDI port layer: discovery, port lifecycle and realtime input delivery.
//!
//! Everything goes through an explicitly built [`MidiContext`], which owns a
//! [`MidiBackend`]. Ports re-resolve their system port by name before every
//! open, since indices drift whenever any port on the system comes or goes.
//!
//! Feature gates: `midi-io` (system MIDI through midir, on by default).

pub mod error;
pub use error::{Error, NativeError, Result};

pub mod backend;
pub use backend::{IgnoreFlags, LoopbackBackend, MidiBackend, NativeDevice, ReceiveCallback};

#[cfg(feature = "midi-io")]
pub use backend::MidirBackend;

mod catalog;
pub use catalog::PortCatalog;

mod config;
pub use config::MidiConfig;

mod handle;
pub use handle::NativeHandle;

mod port;
pub use port::{
    CallbackRemover, InputPort, MidiMessageCallback, MidiPort, OutputPort, Port, PortOptions,
};

mod system;
pub use system::{MidiContext, MidiContextBuilder};

pub use midiport_core::{status, Direction, MidiApi, MidiMessage, PortDescriptor};
