//! # midiport - MIDI Port Management
//!
//! Discovery and lifecycle of system MIDI ports, with realtime delivery of
//! incoming messages to a callback.
//!
//! ## Architecture
//!
//! midiport is an umbrella crate over:
//! - **midiport-core** - Message buffer, status bytes, API identifiers, port descriptors
//! - **midiport-io** - Backends, port catalog, input/output port state machine
//!
//! ## Quick Start
//!
//! ```ignore
//! use midiport::prelude::*;
//!
//! let midi = MidiContext::builder().build()?;
//!
//! // Listen on the first readable port
//! let source = midi.readable_ports()?.remove(0);
//! let mut input = midi.input_port(source)?;
//! input.set_callback(|msg: &MidiMessage, delta: f64| {
//!     println!("{:>8.4}s {}", delta, msg);
//! })?;
//! input.open("midiport in")?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - System MIDI
//! - `midi-io` - Hardware MIDI through midir (ALSA, CoreMIDI, WinMM, JACK)

/// Re-export of midiport-core for direct access
pub use midiport_core as core;

/// Re-export of midiport-io for direct access
pub use midiport_io as io;

pub use midiport_core::{data_length_for, status, Direction, MidiApi, MidiMessage, PortDescriptor};

pub use midiport_io::{
    CallbackRemover, Error, IgnoreFlags, InputPort, LoopbackBackend, MidiBackend, MidiConfig,
    MidiContext, MidiContextBuilder, MidiMessageCallback, MidiPort, NativeDevice, NativeError,
    NativeHandle, OutputPort, Port, PortCatalog, PortOptions, ReceiveCallback, Result,
};

#[cfg(feature = "midi-io")]
pub use midiport_io::MidirBackend;

/// Everything needed to list, open and use ports.
pub mod prelude {
    pub use crate::{
        status, Direction, Error, IgnoreFlags, InputPort, MidiApi, MidiContext, MidiMessage,
        MidiPort, OutputPort, Port, PortDescriptor, PortOptions, Result,
    };
}
