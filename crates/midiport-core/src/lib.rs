//! Backend-independent MIDI data types.
//!
//! - [`MidiMessage`]: a resizable byte buffer holding one message
//! - [`status`]: status byte constants and the data-length table
//! - [`PortDescriptor`] / [`Direction`]: snapshot references to system ports
//! - [`MidiApi`]: native API identifiers

pub mod api;
pub mod descriptor;
pub mod error;
pub mod message;
pub mod status;

pub use api::MidiApi;
pub use descriptor::{Direction, PortDescriptor};
pub use error::{Error, Result};
pub use message::MidiMessage;
pub use status::data_length_for;
