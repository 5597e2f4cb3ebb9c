//! Output ports.

use std::fmt;

use midiport_core::{Direction, MidiApi, MidiMessage, PortDescriptor};
use tracing::warn;

use super::{MidiPort, PortCore, PortOptions};
use crate::catalog::PortCatalog;
use crate::error::Result;

/// A port the application writes to.
pub struct OutputPort {
    core: PortCore,
    last_message: Option<MidiMessage>,
}

impl OutputPort {
    pub(crate) fn new(
        catalog: PortCatalog,
        descriptor: Option<PortDescriptor>,
        options: PortOptions,
    ) -> Result<Self> {
        let core = PortCore::new(catalog, Direction::Writable, descriptor, options)?;
        Ok(Self {
            core,
            last_message: None,
        })
    }

    /// Send `message` synchronously.
    ///
    /// Sending on a port that is not open does nothing and is not an error.
    pub fn send_message(&mut self, message: &MidiMessage) -> Result<()> {
        self.core.ensure_alive()?;
        if !self.core.is_open() {
            return Ok(());
        }
        self.core.handle_mut()?.send(message.as_slice())?;
        match &mut self.last_message {
            Some(last) => last.assign(message.as_slice()),
            None => self.last_message = Some(message.clone()),
        }
        Ok(())
    }
}

impl MidiPort for OutputPort {
    fn descriptor(&self) -> Option<&PortDescriptor> {
        self.core.descriptor()
    }

    fn api(&self) -> MidiApi {
        self.core.api()
    }

    fn client_name(&self) -> Option<&str> {
        self.core.client_name()
    }

    fn is_open(&self) -> bool {
        self.core.is_open()
    }

    fn is_virtual(&self) -> bool {
        self.core.is_virtual()
    }

    fn is_destroyed(&self) -> bool {
        self.core.is_destroyed()
    }

    fn last_message(&self) -> Option<MidiMessage> {
        self.last_message.clone()
    }

    fn open(&mut self, port_name: &str) -> Result<()> {
        self.core.open(port_name)
    }

    fn open_virtual(&mut self, port_name: &str) -> Result<()> {
        self.core.open_virtual(port_name)
    }

    fn close(&mut self) -> Result<()> {
        self.core.close().map(|_| ())
    }

    fn destroy(&mut self) -> Result<()> {
        self.core.destroy()
    }
}

impl Drop for OutputPort {
    fn drop(&mut self) {
        if let Err(e) = self.core.destroy() {
            warn!("error destroying dropped output port: {}", e);
        }
    }
}

impl fmt::Display for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.fmt_port(f, "OutputPort")
    }
}

impl fmt::Debug for OutputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputPort")
            .field("descriptor", &self.core.descriptor())
            .field("is_open", &self.core.is_open())
            .field("is_virtual", &self.core.is_virtual())
            .field("is_destroyed", &self.core.is_destroyed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{loopback::THROUGH_PORT_NAME, LoopbackBackend};
    use crate::config::MidiConfig;
    use std::sync::Arc;

    fn through_output(backend: &LoopbackBackend) -> OutputPort {
        let catalog = PortCatalog::new(Arc::new(backend.clone()), Arc::new(MidiConfig::default()));
        let through = PortDescriptor::new(THROUGH_PORT_NAME, 0, Direction::Writable);
        OutputPort::new(catalog, Some(through), PortOptions::default()).unwrap()
    }

    #[test]
    fn test_send_to_unopened_port_is_noop() {
        let backend = LoopbackBackend::new();
        let mut output = through_output(&backend);
        output
            .send_message(&MidiMessage::from_bytes(&[0x90, 60, 100]))
            .unwrap();
        assert_eq!(output.last_message(), None);
    }

    #[test]
    fn test_send_records_last_message() {
        let backend = LoopbackBackend::new();
        let mut output = through_output(&backend);
        output.open("Out").unwrap();

        output
            .send_message(&MidiMessage::from_bytes(&[0xF0, 0x7E, 0x01, 0xF7]))
            .unwrap();
        let note = MidiMessage::from_bytes(&[0x90, 60, 100]);
        output.send_message(&note).unwrap();
        assert_eq!(output.last_message(), Some(note.clone()));

        // Closing keeps the record
        output.close().unwrap();
        output
            .send_message(&MidiMessage::from_bytes(&[0x80, 60, 0]))
            .unwrap();
        assert_eq!(output.last_message(), Some(note));
    }

    #[test]
    fn test_backend_send_failure_is_native_error() {
        let backend = LoopbackBackend::new();
        let mut output = through_output(&backend);
        output.open("Out").unwrap();
        backend.inject_failure("write failed");
        let err = output
            .send_message(&MidiMessage::from_bytes(&[0x90, 60, 100]))
            .unwrap_err();
        assert!(err.is_native_error());
        assert_eq!(output.last_message(), None);
    }

    #[test]
    fn test_send_after_destroy_is_port_error() {
        let backend = LoopbackBackend::new();
        let mut output = through_output(&backend);
        output.destroy().unwrap();
        let err = output
            .send_message(&MidiMessage::new())
            .unwrap_err();
        assert!(err.is_port_error());
    }
}
