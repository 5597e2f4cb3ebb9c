//! Owned native device handle.

use midiport_core::{Direction, MidiApi};
use tracing::{trace, warn};

use crate::backend::{IgnoreFlags, MidiBackend, NativeDevice, ReceiveCallback};
use crate::error::NativeError;

/// Exclusive owner of one native device.
///
/// Every call is forwarded to the device and its result surfaced unchanged.
/// [`NativeHandle::free`] consumes the handle, so a device can never be freed
/// twice; a handle dropped without being freed frees itself.
pub struct NativeHandle {
    device: Option<Box<dyn NativeDevice>>,
    direction: Direction,
}

impl NativeHandle {
    /// Create a device on `backend`.
    ///
    /// A named device on `api` is requested when a client name is given;
    /// otherwise the backend picks both.
    pub fn create(
        backend: &dyn MidiBackend,
        direction: Direction,
        api: MidiApi,
        client_name: Option<&str>,
        queue_size_limit: usize,
    ) -> Result<Self, NativeError> {
        let device = match client_name {
            Some(client) => backend.create_named(direction, api, client, queue_size_limit)?,
            None => backend.create_default(direction)?,
        };
        trace!(
            "{}: created {} device (api {:?}, client {:?})",
            backend.name(),
            direction,
            api,
            client_name
        );
        Ok(Self {
            device: Some(device),
            direction,
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn device(&self) -> Result<&dyn NativeDevice, NativeError> {
        self.device.as_deref().ok_or_else(freed)
    }

    fn device_mut(&mut self) -> Result<&mut (dyn NativeDevice + 'static), NativeError> {
        self.device.as_deref_mut().ok_or_else(freed)
    }

    pub fn current_api(&self) -> Result<MidiApi, NativeError> {
        self.device()?.current_api()
    }

    pub fn port_count(&self) -> Result<usize, NativeError> {
        self.device()?.port_count()
    }

    pub fn port_name(&self, index: usize) -> Result<String, NativeError> {
        self.device()?.port_name(index)
    }

    pub fn open(&mut self, index: usize, port_name: &str) -> Result<(), NativeError> {
        trace!("native open: index {} as '{}'", index, port_name);
        self.device_mut()?.open(index, port_name)
    }

    pub fn open_virtual(&mut self, port_name: &str) -> Result<(), NativeError> {
        trace!("native open_virtual: '{}'", port_name);
        self.device_mut()?.open_virtual(port_name)
    }

    pub fn close(&mut self) -> Result<(), NativeError> {
        trace!("native close");
        self.device_mut()?.close()
    }

    pub fn set_receive_callback(&mut self, callback: ReceiveCallback) -> Result<(), NativeError> {
        trace!("native set_receive_callback");
        self.device_mut()?.set_receive_callback(callback)
    }

    pub fn cancel_receive_callback(&mut self) -> Result<(), NativeError> {
        trace!("native cancel_receive_callback");
        self.device_mut()?.cancel_receive_callback()
    }

    pub fn ignore_types(&mut self, flags: IgnoreFlags) -> Result<(), NativeError> {
        trace!("native ignore_types: {:?}", flags);
        self.device_mut()?.ignore_types(flags)
    }

    pub fn send(&mut self, bytes: &[u8]) -> Result<(), NativeError> {
        trace!("native send: {} bytes", bytes.len());
        self.device_mut()?.send(bytes)
    }

    pub fn free(mut self) -> Result<(), NativeError> {
        match self.device.take() {
            Some(device) => {
                trace!("native free");
                device.free()
            }
            None => Ok(()),
        }
    }
}

fn freed() -> NativeError {
    NativeError::new("native handle has been freed")
}

impl Drop for NativeHandle {
    fn drop(&mut self) {
        if let Some(device) = self.device.take() {
            if let Err(e) = device.free() {
                warn!("failed to free native {} device: {}", self.direction, e);
            }
        }
    }
}

impl std::fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeHandle")
            .field("direction", &self.direction)
            .field("freed", &self.device.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LoopbackBackend;

    #[test]
    fn test_default_and_named_creation() {
        let backend = LoopbackBackend::new();
        let default = NativeHandle::create(
            &backend,
            Direction::Readable,
            MidiApi::Unspecified,
            None,
            100,
        )
        .unwrap();
        assert_eq!(default.current_api().unwrap(), MidiApi::Dummy);
        default.free().unwrap();

        let mut named = NativeHandle::create(
            &backend,
            Direction::Readable,
            MidiApi::Dummy,
            Some("Named"),
            100,
        )
        .unwrap();
        named.open(0, "Port").unwrap();

        let probe =
            NativeHandle::create(&backend, Direction::Writable, MidiApi::Unspecified, None, 100)
                .unwrap();
        let last = probe.port_count().unwrap() - 1;
        assert!(probe.port_name(last).unwrap().starts_with("Named:Port "));
        probe.free().unwrap();
        named.free().unwrap();
    }

    #[test]
    fn test_backend_failure_surfaces_message() {
        let backend = LoopbackBackend::new();
        backend.inject_failure("no sequencer");
        let err = NativeHandle::create(
            &backend,
            Direction::Writable,
            MidiApi::Unspecified,
            None,
            100,
        )
        .unwrap_err();
        assert_eq!(err.message, "no sequencer");
        assert_eq!(err.to_string(), "native MIDI backend error: no sequencer");
    }

    #[test]
    fn test_drop_frees_device() {
        let backend = LoopbackBackend::new();
        {
            let mut handle = NativeHandle::create(
                &backend,
                Direction::Writable,
                MidiApi::Unspecified,
                None,
                100,
            )
            .unwrap();
            handle.open_virtual("Dropped").unwrap();
        }
        let probe =
            NativeHandle::create(&backend, Direction::Readable, MidiApi::Unspecified, None, 100)
                .unwrap();
        // Only the through port remains
        assert_eq!(probe.port_count().unwrap(), 1);
    }
}
