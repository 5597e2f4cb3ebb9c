//! Ports: the open/close/destroy state machine over a native handle.
//!
//! ```text
//! created ──open──▶ open ──close──▶ created (fresh handle) ──▶ ...
//!    │      open_virtual ▲                                     │
//!    └────────────── destroy ──────────▶ destroyed ◀───────────┘
//! ```
//!
//! [`InputPort`] and [`OutputPort`] share the [`MidiPort`] interface;
//! [`Port`] holds either one.

mod bridge;
mod input;
mod output;
mod state;

pub use bridge::{CallbackRemover, MidiMessageCallback};
pub use input::InputPort;
pub use output::OutputPort;

pub(crate) use state::PortCore;

use std::fmt;

use midiport_core::{Direction, MidiApi, MidiMessage, PortDescriptor};

use crate::error::Result;

/// How a port's native device is created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortOptions {
    pub client_name: Option<String>,
    pub api: MidiApi,
}

impl PortOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn client_name(mut self, name: impl Into<String>) -> Self {
        self.client_name = Some(name.into());
        self
    }

    pub fn api(mut self, api: MidiApi) -> Self {
        self.api = api;
        self
    }
}

/// Operations every port supports.
///
/// State queries never fail, even on a destroyed port. Everything else,
/// `close` included, fails with [`Error::Port`](crate::Error::Port) once the
/// port is destroyed; only `destroy` itself may be called again.
pub trait MidiPort {
    /// Descriptor as of the last successful open.
    fn descriptor(&self) -> Option<&PortDescriptor>;

    /// API the native device is running on.
    fn api(&self) -> MidiApi;

    fn client_name(&self) -> Option<&str>;

    fn is_open(&self) -> bool;

    fn is_virtual(&self) -> bool;

    fn is_destroyed(&self) -> bool;

    /// Last message received (input) or sent (output).
    fn last_message(&self) -> Option<MidiMessage>;

    /// Connect to the descriptor's system port, re-resolving its index by
    /// name first. No-op if already open.
    fn open(&mut self, port_name: &str) -> Result<()>;

    /// Publish a port other applications can connect to.
    fn open_virtual(&mut self, port_name: &str) -> Result<()>;

    /// Close the connection; the port can be opened again afterwards.
    /// No-op if not open. An input port loses its callback and ignore flags.
    fn close(&mut self) -> Result<()>;

    /// Release everything. Terminal and idempotent.
    fn destroy(&mut self) -> Result<()>;
}

/// Either kind of port.
pub enum Port {
    Input(InputPort),
    Output(OutputPort),
}

impl Port {
    /// `Readable` for input ports, `Writable` for output ports.
    pub fn direction(&self) -> Direction {
        match self {
            Port::Input(_) => Direction::Readable,
            Port::Output(_) => Direction::Writable,
        }
    }

    pub fn as_input(&self) -> Option<&InputPort> {
        match self {
            Port::Input(port) => Some(port),
            Port::Output(_) => None,
        }
    }

    pub fn as_input_mut(&mut self) -> Option<&mut InputPort> {
        match self {
            Port::Input(port) => Some(port),
            Port::Output(_) => None,
        }
    }

    pub fn as_output(&self) -> Option<&OutputPort> {
        match self {
            Port::Output(port) => Some(port),
            Port::Input(_) => None,
        }
    }

    pub fn as_output_mut(&mut self) -> Option<&mut OutputPort> {
        match self {
            Port::Output(port) => Some(port),
            Port::Input(_) => None,
        }
    }

    fn inner(&self) -> &dyn MidiPort {
        match self {
            Port::Input(port) => port,
            Port::Output(port) => port,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn MidiPort {
        match self {
            Port::Input(port) => port,
            Port::Output(port) => port,
        }
    }
}

impl MidiPort for Port {
    fn descriptor(&self) -> Option<&PortDescriptor> {
        self.inner().descriptor()
    }

    fn api(&self) -> MidiApi {
        self.inner().api()
    }

    fn client_name(&self) -> Option<&str> {
        self.inner().client_name()
    }

    fn is_open(&self) -> bool {
        self.inner().is_open()
    }

    fn is_virtual(&self) -> bool {
        self.inner().is_virtual()
    }

    fn is_destroyed(&self) -> bool {
        self.inner().is_destroyed()
    }

    fn last_message(&self) -> Option<MidiMessage> {
        self.inner().last_message()
    }

    fn open(&mut self, port_name: &str) -> Result<()> {
        self.inner_mut().open(port_name)
    }

    fn open_virtual(&mut self, port_name: &str) -> Result<()> {
        self.inner_mut().open_virtual(port_name)
    }

    fn close(&mut self) -> Result<()> {
        self.inner_mut().close()
    }

    fn destroy(&mut self) -> Result<()> {
        self.inner_mut().destroy()
    }
}

impl From<InputPort> for Port {
    fn from(port: InputPort) -> Self {
        Port::Input(port)
    }
}

impl From<OutputPort> for Port {
    fn from(port: OutputPort) -> Self {
        Port::Output(port)
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Input(port) => fmt::Display::fmt(port, f),
            Port::Output(port) => fmt::Display::fmt(port, f),
        }
    }
}

impl fmt::Debug for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Port::Input(port) => f.debug_tuple("Input").field(port).finish(),
            Port::Output(port) => f.debug_tuple("Output").field(port).finish(),
        }
    }
}
