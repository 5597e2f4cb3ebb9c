//! Live port discovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use midiport_core::{Direction, MidiApi, PortDescriptor};
use tracing::debug;

use crate::backend::MidiBackend;
use crate::config::MidiConfig;
use crate::error::{Error, NativeError, Result};
use crate::handle::NativeHandle;

/// Queries the backend for the ports that exist right now.
///
/// Results are snapshots in backend enumeration order. Indices are only
/// meaningful at the instant of the call; use [`PortCatalog::find`] to
/// re-resolve a descriptor by name.
#[derive(Clone)]
pub struct PortCatalog {
    backend: Arc<dyn MidiBackend>,
    config: Arc<MidiConfig>,
    alive: Arc<AtomicBool>,
}

impl PortCatalog {
    pub(crate) fn new(backend: Arc<dyn MidiBackend>, config: Arc<MidiConfig>) -> Self {
        Self {
            backend,
            config,
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Ports the application can read from.
    pub fn readable_ports(&self) -> Result<Vec<PortDescriptor>> {
        self.ports(Direction::Readable)
    }

    /// Ports the application can write to.
    pub fn writable_ports(&self) -> Result<Vec<PortDescriptor>> {
        self.ports(Direction::Writable)
    }

    /// Enumerate ports in `direction` through a throwaway probe device.
    ///
    /// Readable ports are listed by an input device and writable ports by an
    /// output device, matching how each would later be opened.
    pub fn ports(&self, direction: Direction) -> Result<Vec<PortDescriptor>> {
        self.ensure_running()?;
        self.snapshot(direction)
    }

    fn snapshot(&self, direction: Direction) -> Result<Vec<PortDescriptor>> {
        if direction == Direction::Unknown {
            return Err(Error::Port(
                "cannot list ports without a direction".to_string(),
            ));
        }
        let probe = self.create_handle(direction, MidiApi::Unspecified, None)?;
        let listed = Self::list(&probe, direction);
        // Release the probe even if listing failed
        let freed = probe.free();
        let ports = listed?;
        freed?;
        Ok(ports)
    }

    fn list(probe: &NativeHandle, direction: Direction) -> Result<Vec<PortDescriptor>> {
        let count = probe.port_count()?;
        let mut ports = Vec::with_capacity(count);
        for index in 0..count {
            let name = probe.port_name(index)?;
            ports.push(PortDescriptor::new(name, index, direction));
        }
        Ok(ports)
    }

    /// Current descriptor of the first port named `name` in `direction`.
    ///
    /// Ports sharing a name and direction cannot be told apart; the first one
    /// in enumeration order wins.
    pub fn find(&self, name: &str, direction: Direction) -> Result<Option<PortDescriptor>> {
        self.ensure_running()?;
        self.resolve(name, direction)
    }

    /// [`PortCatalog::find`] for ports that already exist, which keep working
    /// after shutdown.
    pub(crate) fn resolve(&self, name: &str, direction: Direction) -> Result<Option<PortDescriptor>> {
        let found = self
            .snapshot(direction)?
            .into_iter()
            .find(|port| port.name == name);
        debug!(
            "resolved '{}' ({}) to index {:?}",
            name,
            direction,
            found.as_ref().map(|port| port.index)
        );
        Ok(found)
    }

    /// APIs available to ports, minus any the configuration disallows.
    pub fn compiled_apis(&self) -> Vec<MidiApi> {
        self.backend
            .compiled_apis()
            .into_iter()
            .filter(|api| !(self.config.disallow_jack && *api == MidiApi::UnixJack))
            .collect()
    }

    pub fn supports_virtual_ports(&self) -> bool {
        self.backend.supports_virtual_ports() && !self.config.disallow_virtual_ports
    }

    pub fn config(&self) -> &MidiConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub(crate) fn shutdown(&self) {
        self.alive.store(false, Ordering::Release);
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        !self.alive.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(NativeError::new("MIDI context has been shut down").into());
        }
        Ok(())
    }

    /// Create a device for a port or probe.
    ///
    /// An explicit API without a client name falls back to the configured
    /// client name for `direction`.
    pub(crate) fn create_handle(
        &self,
        direction: Direction,
        api: MidiApi,
        client_name: Option<&str>,
    ) -> Result<NativeHandle> {
        if self.config.disallow_jack && api == MidiApi::UnixJack {
            return Err(Error::InvalidConfig(
                "the JACK API is disallowed by configuration".to_string(),
            ));
        }
        let client_name = match (client_name, api) {
            (Some(name), _) => Some(name),
            (None, MidiApi::Unspecified) => None,
            (None, _) => Some(match direction {
                Direction::Readable => self.config.input_client_name.as_str(),
                _ => self.config.output_client_name.as_str(),
            }),
        };
        Ok(NativeHandle::create(
            self.backend.as_ref(),
            direction,
            api,
            client_name,
            self.config.queue_size_limit,
        )?)
    }
}

impl std::fmt::Debug for PortCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortCatalog")
            .field("backend", &self.backend.name())
            .field("alive", &!self.is_shut_down())
            .finish()
    }
}
