//! Input ports and callback registration.

use std::fmt;
use std::sync::Arc;

use midiport_core::{Direction, MidiApi, MidiMessage, PortDescriptor};
use tracing::{debug, warn};

use super::bridge::{CallbackBridge, CallbackRemover, MidiMessageCallback};
use super::{MidiPort, PortCore, PortOptions};
use crate::backend::IgnoreFlags;
use crate::catalog::PortCatalog;
use crate::error::{Error, Result};

/// A port the application reads from.
///
/// Messages reach the application through a callback set with
/// [`InputPort::set_callback`], invoked on the backend's delivery thread in
/// arrival order. Closing the port removes the callback and resets the
/// ignore flags, so both must be set again before the next `open`.
pub struct InputPort {
    core: PortCore,
    bridge: Arc<CallbackBridge>,
    ignore: IgnoreFlags,
}

impl InputPort {
    pub(crate) fn new(
        catalog: PortCatalog,
        descriptor: Option<PortDescriptor>,
        options: PortOptions,
    ) -> Result<Self> {
        let core = PortCore::new(catalog, Direction::Readable, descriptor, options)?;
        Ok(Self {
            core,
            bridge: Arc::new(CallbackBridge::default()),
            ignore: IgnoreFlags::default(),
        })
    }

    /// Register the message handler.
    ///
    /// Fails with a port error if a callback is already registered; remove
    /// it first.
    pub fn set_callback<C>(&mut self, callback: C) -> Result<()>
    where
        C: MidiMessageCallback + 'static,
    {
        self.core.ensure_alive()?;
        if self.bridge.is_registered() {
            return Err(Error::Port(
                "a callback is already registered; remove it first".to_string(),
            ));
        }

        let handle = self.core.handle_mut()?;
        self.bridge.install(Box::new(callback));
        if let Err(e) = handle.set_receive_callback(self.bridge.trampoline()) {
            self.bridge.clear();
            return Err(e.into());
        }
        debug!("input callback registered");
        Ok(())
    }

    /// Unregister the handler. No-op without one.
    ///
    /// Once this returns the callback will not be called again. If it is
    /// running on the delivery thread, this waits for it to finish, unless
    /// called from the callback itself.
    pub fn remove_callback(&mut self) -> Result<()> {
        self.core.ensure_alive()?;
        self.detach_callback()
    }

    pub fn has_callback(&self) -> bool {
        self.bridge.is_registered()
    }

    /// Handle for removing the callback from inside the callback.
    pub fn callback_remover(&self) -> CallbackRemover {
        CallbackRemover {
            bridge: Arc::clone(&self.bridge),
        }
    }

    /// Choose which message categories are dropped before they reach the
    /// callback. All three are ignored by default.
    pub fn ignore_types(&mut self, sysex: bool, time: bool, sense: bool) -> Result<()> {
        self.core.ensure_alive()?;
        let flags = IgnoreFlags::new(sysex, time, sense);
        self.core.handle_mut()?.ignore_types(flags)?;
        self.ignore = flags;
        Ok(())
    }

    pub fn ignore_flags(&self) -> IgnoreFlags {
        self.ignore
    }

    fn detach_callback(&mut self) -> Result<()> {
        if !self.bridge.is_registered() {
            return Ok(());
        }
        let cancelled = self
            .core
            .handle_mut()
            .and_then(|handle| handle.cancel_receive_callback().map_err(Error::from));
        // Whatever the backend said, nothing may reach the callback now
        self.bridge.clear();
        debug!("input callback removed");
        cancelled
    }
}

impl MidiPort for InputPort {
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
        self.bridge.last_message()
    }

    fn open(&mut self, port_name: &str) -> Result<()> {
        self.core.open(port_name)
    }

    fn open_virtual(&mut self, port_name: &str) -> Result<()> {
        self.core.open_virtual(port_name)
    }

    /// Close and start over on a fresh handle: no callback, default ignore
    /// flags.
    fn close(&mut self) -> Result<()> {
        self.core.ensure_alive()?;
        if !self.core.is_open() {
            return Ok(());
        }
        let removed = self.detach_callback();
        let closed = self.core.close();
        if matches!(closed, Ok(true)) {
            self.ignore = IgnoreFlags::default();
        }
        removed.and(closed.map(|_| ()))
    }

    fn destroy(&mut self) -> Result<()> {
        if self.core.is_destroyed() {
            return Ok(());
        }
        let removed = self.detach_callback();
        let destroyed = self.core.destroy();
        removed.and(destroyed)
    }
}

impl Drop for InputPort {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            warn!("error destroying dropped input port: {}", e);
        }
    }
}

impl fmt::Display for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.core.fmt_port(f, "InputPort")
    }
}

impl fmt::Debug for InputPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputPort")
            .field("descriptor", &self.core.descriptor())
            .field("is_open", &self.core.is_open())
            .field("is_virtual", &self.core.is_virtual())
            .field("is_destroyed", &self.core.is_destroyed())
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LoopbackBackend;
    use crate::config::MidiConfig;
    use crate::port::OutputPort;
    use crossbeam_channel::{unbounded, Receiver};
    use std::time::Duration;

    fn catalog(backend: &LoopbackBackend) -> PortCatalog {
        PortCatalog::new(Arc::new(backend.clone()), Arc::new(MidiConfig::default()))
    }

    /// Virtual input plus an output connected to it.
    fn pair(backend: &LoopbackBackend) -> (InputPort, OutputPort) {
        let catalog = catalog(backend);
        let mut input = InputPort::new(catalog.clone(), None, PortOptions::default()).unwrap();
        input.open_virtual("Test In").unwrap();
        let sink = catalog.writable_ports().unwrap().pop().unwrap();
        let mut output = OutputPort::new(catalog, Some(sink), PortOptions::default()).unwrap();
        output.open("Test Out").unwrap();
        (input, output)
    }

    fn forward(input: &mut InputPort) -> Receiver<Vec<u8>> {
        let (tx, rx) = unbounded();
        input
            .set_callback(move |msg: &MidiMessage, _: f64| {
                let _ = tx.send(msg.data_copy());
            })
            .unwrap();
        rx
    }

    #[test]
    fn test_second_callback_rejected() {
        let backend = LoopbackBackend::new();
        let (mut input, _output) = pair(&backend);
        let _rx = forward(&mut input);
        let err = input.set_callback(|_: &MidiMessage, _: f64| {}).unwrap_err();
        assert!(err.is_port_error());

        input.remove_callback().unwrap();
        assert!(!input.has_callback());
        input.set_callback(|_: &MidiMessage, _: f64| {}).unwrap();
        assert!(input.has_callback());
    }

    #[test]
    fn test_remove_without_callback_is_noop() {
        let backend = LoopbackBackend::new();
        let (mut input, _output) = pair(&backend);
        input.remove_callback().unwrap();
        input.remove_callback().unwrap();
    }

    #[test]
    fn test_native_failure_leaves_no_callback() {
        let backend = LoopbackBackend::new();
        let (mut input, _output) = pair(&backend);
        backend.inject_failure("callback refused");
        let err = input.set_callback(|_: &MidiMessage, _: f64| {}).unwrap_err();
        assert!(err.is_native_error());
        assert!(!input.has_callback());
    }

    #[test]
    fn test_last_message_tracks_deliveries() {
        let backend = LoopbackBackend::new();
        let (mut input, mut output) = pair(&backend);
        assert_eq!(input.last_message(), None);
        let rx = forward(&mut input);

        let msg = MidiMessage::from_bytes(&[0xB0, 7, 100]);
        output.send_message(&msg).unwrap();
        rx.recv_timeout(Duration::from_millis(200)).unwrap();
        // Waits for the delivery to return before reading the buffer
        assert_eq!(input.last_message(), Some(msg));

        input.remove_callback().unwrap();
        assert_eq!(input.last_message(), None);
    }

    #[test]
    fn test_close_drops_callback_and_flags() {
        let backend = LoopbackBackend::new();
        let catalog = catalog(&backend);
        let mut input = InputPort::new(catalog.clone(), None, PortOptions::default()).unwrap();
        input.open_virtual("Reopened").unwrap();
        input.ignore_types(false, false, false).unwrap();
        let _stale = forward(&mut input);

        input.close().unwrap();
        assert!(!input.has_callback());
        assert_eq!(input.ignore_flags(), IgnoreFlags::default());

        // A new callback can go in before reopening
        let rx = forward(&mut input);
        input.ignore_types(false, false, false).unwrap();
        input.open_virtual("Reopened").unwrap();

        let sink = catalog.writable_ports().unwrap().pop().unwrap();
        let mut output = OutputPort::new(catalog, Some(sink), PortOptions::default()).unwrap();
        output.open("Out").unwrap();
        output
            .send_message(&MidiMessage::from_bytes(&[0xF8]))
            .unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_millis(200)).unwrap(),
            vec![0xF8]
        );
    }

    #[test]
    fn test_close_of_unopened_port_keeps_callback() {
        let backend = LoopbackBackend::new();
        let mut input = InputPort::new(catalog(&backend), None, PortOptions::default()).unwrap();
        let _rx = forward(&mut input);
        input.close().unwrap();
        assert!(input.has_callback());
    }

    #[test]
    fn test_destroyed_port_rejects_operations() {
        let backend = LoopbackBackend::new();
        let (mut input, _output) = pair(&backend);
        let _rx = forward(&mut input);
        input.destroy().unwrap();
        assert!(!input.has_callback());

        assert!(input.set_callback(|_: &MidiMessage, _: f64| {}).unwrap_err().is_port_error());
        assert!(input.ignore_types(true, true, true).unwrap_err().is_port_error());
        assert!(input.open("x").unwrap_err().is_port_error());
        assert!(input.remove_callback().unwrap_err().is_port_error());
        input.destroy().unwrap();
    }

    #[test]
    fn test_display_after_destroy() {
        let backend = LoopbackBackend::new();
        let mut input = InputPort::new(
            catalog(&backend),
            None,
            PortOptions::new().client_name("Recorder"),
        )
        .unwrap();
        input.destroy().unwrap();
        insta::assert_snapshot!(input.to_string(), @r"
        InputPort {
            descriptor = none
            api = Dummy
            client_name = 'Recorder'
            is_open = false
            is_virtual = false
            is_destroyed = true
        }
        ");
    }
}
