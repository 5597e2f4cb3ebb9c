//! System MIDI through midir.
//!
//! midir consumes its `MidiInput`/`MidiOutput` when connecting and hands it
//! back on close, so each device is a small state machine over the two.
//! The receive callback is fixed at connect time; it reads the current user
//! callback and ignore flags from shared state so both can change while
//! connected.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use midiport_core::{Direction, MidiApi};
use ::midir::{
    ConnectError, Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection,
};
use tracing::trace;

use super::{AtomicIgnoreFlags, IgnoreFlags, MidiBackend, NativeDevice, ReceiveCallback};
use crate::error::NativeError;

const DEFAULT_INPUT_CLIENT: &str = "midiport input";
const DEFAULT_OUTPUT_CLIENT: &str = "midiport output";

fn platform_api() -> MidiApi {
    if cfg!(target_os = "linux") {
        MidiApi::LinuxAlsa
    } else if cfg!(target_os = "macos") {
        MidiApi::MacOsxCore
    } else if cfg!(target_os = "windows") {
        MidiApi::WindowsMm
    } else {
        MidiApi::Unspecified
    }
}

fn connect_error<T>(e: ConnectError<T>) -> (NativeError, T) {
    let error = NativeError::new(e.to_string());
    (error, e.into_inner())
}

fn lost_handle() -> NativeError {
    NativeError::new("native device handle was lost by a failed transition")
}

/// Hardware backend. Stateless; every device owns its own midir client.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidirBackend;

impl MidirBackend {
    pub fn new() -> Self {
        Self
    }

    fn create(
        &self,
        direction: Direction,
        client_name: &str,
    ) -> Result<Box<dyn NativeDevice>, NativeError> {
        match direction {
            Direction::Readable => {
                let mut midi_in = MidiInput::new(client_name)?;
                // Filtering happens in our own callback
                midi_in.ignore(Ignore::None);
                Ok(Box::new(MidirInputDevice {
                    client_name: client_name.to_string(),
                    state: Some(InputState::Idle(midi_in)),
                    shared: Arc::new(InputShared::default()),
                }))
            }
            Direction::Writable => {
                let midi_out = MidiOutput::new(client_name)?;
                Ok(Box::new(MidirOutputDevice {
                    client_name: client_name.to_string(),
                    state: Some(OutputState::Idle(midi_out)),
                }))
            }
            Direction::Unknown => Err(NativeError::new(
                "cannot create a device without a direction",
            )),
        }
    }
}

impl MidiBackend for MidirBackend {
    fn name(&self) -> &str {
        "midir"
    }

    fn compiled_apis(&self) -> Vec<MidiApi> {
        match platform_api() {
            MidiApi::Unspecified => Vec::new(),
            api => vec![api],
        }
    }

    fn supports_virtual_ports(&self) -> bool {
        cfg!(unix)
    }

    fn create_default(&self, direction: Direction) -> Result<Box<dyn NativeDevice>, NativeError> {
        let client = match direction {
            Direction::Readable => DEFAULT_INPUT_CLIENT,
            _ => DEFAULT_OUTPUT_CLIENT,
        };
        self.create(direction, client)
    }

    fn create_named(
        &self,
        direction: Direction,
        api: MidiApi,
        client_name: &str,
        queue_size_limit: usize,
    ) -> Result<Box<dyn NativeDevice>, NativeError> {
        if api != MidiApi::Unspecified && api != platform_api() {
            return Err(NativeError::new(format!(
                "{} is not available through midir on this platform",
                api.display_name()
            )));
        }
        trace!(
            "midir manages its own input queue, ignoring limit {}",
            queue_size_limit
        );
        self.create(direction, client_name)
    }
}

#[derive(Default)]
struct InputShared {
    callback: ArcSwapOption<ReceiveCallback>,
    ignore: AtomicIgnoreFlags,
}

enum InputState {
    Idle(MidiInput),
    Connected(MidiInputConnection<()>),
}

struct MidirInputDevice {
    client_name: String,
    /// `None` only if a transition failed without midir returning the handle
    state: Option<InputState>,
    shared: Arc<InputShared>,
}

impl MidirInputDevice {
    fn receiver(&self) -> impl FnMut(u64, &[u8], &mut ()) + Send + 'static {
        let shared = Arc::clone(&self.shared);
        let mut previous: Option<u64> = None;
        move |stamp, bytes, _| {
            if shared.ignore.load().blocks(bytes) {
                return;
            }
            // midir stamps are microseconds
            let delta = previous
                .map(|prev| stamp.saturating_sub(prev) as f64 / 1_000_000.0)
                .unwrap_or(0.0);
            previous = Some(stamp);
            if let Some(callback) = shared.callback.load_full() {
                callback(delta, Some(bytes));
            }
        }
    }

    /// Run `f` against an input client, making a throwaway one when ours is
    /// tied up in a connection.
    fn with_probe<T>(
        &self,
        f: impl FnOnce(&MidiInput) -> Result<T, NativeError>,
    ) -> Result<T, NativeError> {
        match &self.state {
            Some(InputState::Idle(midi_in)) => f(midi_in),
            _ => {
                let probe = MidiInput::new(&format!("{} probe", self.client_name))?;
                f(&probe)
            }
        }
    }

    fn take_idle(&mut self) -> Result<MidiInput, NativeError> {
        match self.state.take() {
            Some(InputState::Idle(midi_in)) => Ok(midi_in),
            Some(connected @ InputState::Connected(_)) => {
                self.state = Some(connected);
                Err(NativeError::new("input device is already open"))
            }
            None => Err(lost_handle()),
        }
    }
}

impl NativeDevice for MidirInputDevice {
    fn direction(&self) -> Direction {
        Direction::Readable
    }

    fn current_api(&self) -> Result<MidiApi, NativeError> {
        Ok(platform_api())
    }

    fn port_count(&self) -> Result<usize, NativeError> {
        self.with_probe(|midi_in| Ok(midi_in.port_count()))
    }

    fn port_name(&self, index: usize) -> Result<String, NativeError> {
        self.with_probe(|midi_in| {
            let ports = midi_in.ports();
            let port = ports
                .get(index)
                .ok_or_else(|| NativeError::new(format!("invalid port index {}", index)))?;
            Ok(midi_in.port_name(port)?)
        })
    }

    fn open(&mut self, index: usize, port_name: &str) -> Result<(), NativeError> {
        let midi_in = self.take_idle()?;
        let ports = midi_in.ports();
        let Some(port) = ports.get(index) else {
            self.state = Some(InputState::Idle(midi_in));
            return Err(NativeError::new(format!("invalid port index {}", index)));
        };
        let receiver = self.receiver();
        match midi_in.connect(port, port_name, receiver, ()) {
            Ok(connection) => {
                self.state = Some(InputState::Connected(connection));
                Ok(())
            }
            Err(e) => {
                let (error, midi_in) = connect_error(e);
                self.state = Some(InputState::Idle(midi_in));
                Err(error)
            }
        }
    }

    #[cfg(unix)]
    fn open_virtual(&mut self, port_name: &str) -> Result<(), NativeError> {
        use ::midir::os::unix::VirtualInput;

        let midi_in = self.take_idle()?;
        let receiver = self.receiver();
        match midi_in.create_virtual(port_name, receiver, ()) {
            Ok(connection) => {
                self.state = Some(InputState::Connected(connection));
                Ok(())
            }
            Err(e) => {
                let (error, midi_in) = connect_error(e);
                self.state = Some(InputState::Idle(midi_in));
                Err(error)
            }
        }
    }

    #[cfg(not(unix))]
    fn open_virtual(&mut self, _port_name: &str) -> Result<(), NativeError> {
        Err(NativeError::new("virtual ports are not supported on this platform"))
    }

    fn close(&mut self) -> Result<(), NativeError> {
        match self.state.take() {
            Some(InputState::Connected(connection)) => {
                let (midi_in, ()) = connection.close();
                self.state = Some(InputState::Idle(midi_in));
                Ok(())
            }
            Some(idle) => {
                self.state = Some(idle);
                Ok(())
            }
            None => Err(lost_handle()),
        }
    }

    fn set_receive_callback(&mut self, callback: ReceiveCallback) -> Result<(), NativeError> {
        self.shared.callback.store(Some(Arc::new(callback)));
        Ok(())
    }

    fn cancel_receive_callback(&mut self) -> Result<(), NativeError> {
        self.shared.callback.store(None);
        Ok(())
    }

    fn ignore_types(&mut self, flags: IgnoreFlags) -> Result<(), NativeError> {
        self.shared.ignore.store(flags);
        Ok(())
    }

    fn free(mut self: Box<Self>) -> Result<(), NativeError> {
        self.shared.callback.store(None);
        // Dropping a midir connection closes it
        self.state.take();
        Ok(())
    }
}

enum OutputState {
    Idle(MidiOutput),
    Connected(MidiOutputConnection),
}

struct MidirOutputDevice {
    client_name: String,
    state: Option<OutputState>,
}

impl MidirOutputDevice {
    fn with_probe<T>(
        &self,
        f: impl FnOnce(&MidiOutput) -> Result<T, NativeError>,
    ) -> Result<T, NativeError> {
        match &self.state {
            Some(OutputState::Idle(midi_out)) => f(midi_out),
            _ => {
                let probe = MidiOutput::new(&format!("{} probe", self.client_name))?;
                f(&probe)
            }
        }
    }

    fn take_idle(&mut self) -> Result<MidiOutput, NativeError> {
        match self.state.take() {
            Some(OutputState::Idle(midi_out)) => Ok(midi_out),
            Some(connected @ OutputState::Connected(_)) => {
                self.state = Some(connected);
                Err(NativeError::new("output device is already open"))
            }
            None => Err(lost_handle()),
        }
    }
}

impl NativeDevice for MidirOutputDevice {
    fn direction(&self) -> Direction {
        Direction::Writable
    }

    fn current_api(&self) -> Result<MidiApi, NativeError> {
        Ok(platform_api())
    }

    fn port_count(&self) -> Result<usize, NativeError> {
        self.with_probe(|midi_out| Ok(midi_out.port_count()))
    }

    fn port_name(&self, index: usize) -> Result<String, NativeError> {
        self.with_probe(|midi_out| {
            let ports = midi_out.ports();
            let port = ports
                .get(index)
                .ok_or_else(|| NativeError::new(format!("invalid port index {}", index)))?;
            Ok(midi_out.port_name(port)?)
        })
    }

    fn open(&mut self, index: usize, port_name: &str) -> Result<(), NativeError> {
        let midi_out = self.take_idle()?;
        let ports = midi_out.ports();
        let Some(port) = ports.get(index) else {
            self.state = Some(OutputState::Idle(midi_out));
            return Err(NativeError::new(format!("invalid port index {}", index)));
        };
        match midi_out.connect(port, port_name) {
            Ok(connection) => {
                self.state = Some(OutputState::Connected(connection));
                Ok(())
            }
            Err(e) => {
                let (error, midi_out) = connect_error(e);
                self.state = Some(OutputState::Idle(midi_out));
                Err(error)
            }
        }
    }

    #[cfg(unix)]
    fn open_virtual(&mut self, port_name: &str) -> Result<(), NativeError> {
        use ::midir::os::unix::VirtualOutput;

        let midi_out = self.take_idle()?;
        match midi_out.create_virtual(port_name) {
            Ok(connection) => {
                self.state = Some(OutputState::Connected(connection));
                Ok(())
            }
            Err(e) => {
                let (error, midi_out) = connect_error(e);
                self.state = Some(OutputState::Idle(midi_out));
                Err(error)
            }
        }
    }

    #[cfg(not(unix))]
    fn open_virtual(&mut self, _port_name: &str) -> Result<(), NativeError> {
        Err(NativeError::new("virtual ports are not supported on this platform"))
    }

    fn close(&mut self) -> Result<(), NativeError> {
        match self.state.take() {
            Some(OutputState::Connected(connection)) => {
                self.state = Some(OutputState::Idle(connection.close()));
                Ok(())
            }
            Some(idle) => {
                self.state = Some(idle);
                Ok(())
            }
            None => Err(lost_handle()),
        }
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), NativeError> {
        match &mut self.state {
            Some(OutputState::Connected(connection)) => Ok(connection.send(bytes)?),
            _ => Err(NativeError::new("output device is not open")),
        }
    }

    fn free(mut self: Box<Self>) -> Result<(), NativeError> {
        self.state.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiled_apis_match_platform() {
        let backend = MidirBackend::new();
        let apis = backend.compiled_apis();
        if cfg!(any(target_os = "linux", target_os = "macos", target_os = "windows")) {
            assert_eq!(apis, vec![platform_api()]);
        }
        assert!(!apis.contains(&MidiApi::UnixJack));
    }

    #[test]
    fn test_foreign_api_rejected() {
        let backend = MidirBackend::new();
        let foreign = if platform_api() == MidiApi::WindowsMm {
            MidiApi::LinuxAlsa
        } else {
            MidiApi::WindowsMm
        };
        let result = backend.create_named(Direction::Writable, foreign, "test", 100);
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_direction_rejected() {
        assert!(MidirBackend::new()
            .create_default(Direction::Unknown)
            .is_err());
    }
}
