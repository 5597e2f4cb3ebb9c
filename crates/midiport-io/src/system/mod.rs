//! Entry point owning the backend.
//!
//! ## Quick Start
//!
//! ```ignore
//! use midiport_io::{MidiContext, MidiMessage, MidiPort};
//!
//! let midi = MidiContext::builder().build()?;
//!
//! // Pick a port and open it
//! let ports = midi.writable_ports()?;
//! let mut output = midi.output_port(ports[0].clone())?;
//! output.open("My Output")?;
//!
//! // Send a note
//! output.send_message(&MidiMessage::from_bytes(&[0x90, 60, 100]))?;
//! ```

mod builder;

pub use builder::MidiContextBuilder;

use std::sync::Arc;

use midiport_core::{Direction, MidiApi, PortDescriptor};
use tracing::info;

use crate::catalog::PortCatalog;
use crate::config::MidiConfig;
use crate::error::{Error, Result};
use crate::port::{InputPort, OutputPort, Port, PortOptions};

/// Owns the backend every port and catalog query goes through.
///
/// Clone is cheap (Arc internally). Ports keep the backend alive on their
/// own, so they may outlive the context.
#[derive(Clone)]
pub struct MidiContext {
    inner: Arc<MidiContextInner>,
}

pub(crate) struct MidiContextInner {
    pub(crate) catalog: PortCatalog,
}

impl MidiContext {
    pub fn builder() -> MidiContextBuilder {
        MidiContextBuilder::default()
    }

    /// Port discovery for this context's backend.
    pub fn catalog(&self) -> &PortCatalog {
        &self.inner.catalog
    }

    pub fn config(&self) -> &MidiConfig {
        self.inner.catalog.config()
    }

    pub fn readable_ports(&self) -> Result<Vec<PortDescriptor>> {
        self.inner.catalog.readable_ports()
    }

    pub fn writable_ports(&self) -> Result<Vec<PortDescriptor>> {
        self.inner.catalog.writable_ports()
    }

    pub fn compiled_apis(&self) -> Vec<MidiApi> {
        self.inner.catalog.compiled_apis()
    }

    pub fn supports_virtual_ports(&self) -> bool {
        self.inner.catalog.supports_virtual_ports()
    }

    /// Input port for a readable port.
    pub fn input_port(&self, descriptor: PortDescriptor) -> Result<InputPort> {
        self.input_port_with(Some(descriptor), PortOptions::default())
    }

    /// Input port with explicit options. Without a descriptor the port can
    /// only be opened as a virtual port.
    pub fn input_port_with(
        &self,
        descriptor: Option<PortDescriptor>,
        options: PortOptions,
    ) -> Result<InputPort> {
        InputPort::new(self.inner.catalog.clone(), descriptor, options)
    }

    /// Output port for a writable port.
    pub fn output_port(&self, descriptor: PortDescriptor) -> Result<OutputPort> {
        self.output_port_with(Some(descriptor), PortOptions::default())
    }

    pub fn output_port_with(
        &self,
        descriptor: Option<PortDescriptor>,
        options: PortOptions,
    ) -> Result<OutputPort> {
        OutputPort::new(self.inner.catalog.clone(), descriptor, options)
    }

    /// Port of whichever kind matches the descriptor's direction.
    pub fn port(&self, descriptor: PortDescriptor) -> Result<Port> {
        match descriptor.direction {
            Direction::Readable => self.input_port(descriptor).map(Port::from),
            Direction::Writable => self.output_port(descriptor).map(Port::from),
            Direction::Unknown => Err(Error::Port(format!(
                "port '{}' has no direction",
                descriptor.name
            ))),
        }
    }

    /// Stop creating native devices. Existing ports keep working until they
    /// are destroyed; new ports and catalog queries fail.
    pub fn shutdown(&self) {
        if !self.inner.catalog.is_shut_down() {
            self.inner.catalog.shutdown();
            info!("MIDI context shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.catalog.is_shut_down()
    }
}

impl std::fmt::Debug for MidiContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiContext")
            .field("catalog", &self.inner.catalog)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::MidiPort;

    fn loopback() -> MidiContext {
        MidiContext::builder().loopback().build().unwrap()
    }

    #[test]
    fn test_port_kind_follows_direction() {
        let midi = loopback();
        let readable = midi.readable_ports().unwrap().remove(0);
        let writable = midi.writable_ports().unwrap().remove(0);

        let input = midi.port(readable).unwrap();
        assert_eq!(input.direction(), Direction::Readable);
        assert!(input.as_input().is_some());

        let output = midi.port(writable).unwrap();
        assert!(output.as_output().is_some());

        let unknown = PortDescriptor::new("Mystery", 0, Direction::Unknown);
        assert!(midi.port(unknown).unwrap_err().is_port_error());
    }

    #[test]
    fn test_wrong_direction_descriptor_rejected() {
        let midi = loopback();
        let writable = midi.writable_ports().unwrap().remove(0);
        assert!(midi.input_port(writable).unwrap_err().is_port_error());
    }

    #[test]
    fn test_explicit_api_uses_configured_client_name() {
        let midi = MidiContext::builder()
            .loopback()
            .input_client_name("Configured")
            .build()
            .unwrap();
        let mut input = midi
            .input_port_with(None, PortOptions::new().api(MidiApi::Dummy))
            .unwrap();
        input.open_virtual("In").unwrap();
        let names: Vec<String> = midi
            .writable_ports()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert!(names.iter().any(|n| n.starts_with("Configured:In ")));
    }

    #[test]
    fn test_shutdown_keeps_existing_ports() {
        let midi = loopback();
        let through = midi.writable_ports().unwrap().remove(0);
        let mut output = midi.output_port(through.clone()).unwrap();

        midi.shutdown();
        assert!(midi.is_shut_down());
        assert!(midi.output_port(through).unwrap_err().is_native_error());

        output.open("Out").unwrap();
        assert!(output.is_open());
        output.destroy().unwrap();
    }
}
