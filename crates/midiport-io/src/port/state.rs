//! State machine shared by input and output ports.

use std::fmt;

use midiport_core::{Direction, MidiApi, PortDescriptor};
use tracing::{debug, info, warn};

use super::PortOptions;
use crate::catalog::PortCatalog;
use crate::error::{Error, Result};
use crate::handle::NativeHandle;

/// Open/close/destroy transitions over one native handle.
///
/// `handle` is `Some` for the whole life of the port and `None` once it is
/// destroyed. Closing swaps in a brand new handle so the port can be opened
/// again.
pub(crate) struct PortCore {
    catalog: PortCatalog,
    direction: Direction,
    descriptor: Option<PortDescriptor>,
    handle: Option<NativeHandle>,
    requested_api: MidiApi,
    client_name: Option<String>,
    api: MidiApi,
    is_open: bool,
    is_virtual: bool,
    is_destroyed: bool,
}

impl PortCore {
    pub(crate) fn new(
        catalog: PortCatalog,
        direction: Direction,
        descriptor: Option<PortDescriptor>,
        options: PortOptions,
    ) -> Result<Self> {
        if let Some(descriptor) = &descriptor {
            if descriptor.direction != direction {
                return Err(Error::Port(format!(
                    "descriptor for '{}' is {}, expected {}",
                    descriptor.name, descriptor.direction, direction
                )));
            }
        }
        catalog.ensure_running()?;
        let handle =
            catalog.create_handle(direction, options.api, options.client_name.as_deref())?;
        let api = handle.current_api()?;
        Ok(Self {
            catalog,
            direction,
            descriptor,
            handle: Some(handle),
            requested_api: options.api,
            client_name: options.client_name,
            api,
            is_open: false,
            is_virtual: false,
            is_destroyed: false,
        })
    }

    pub(crate) fn descriptor(&self) -> Option<&PortDescriptor> {
        self.descriptor.as_ref()
    }

    pub(crate) fn api(&self) -> MidiApi {
        self.api
    }

    pub(crate) fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.is_open
    }

    pub(crate) fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.is_destroyed
    }

    pub(crate) fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed {
            return Err(Error::destroyed());
        }
        Ok(())
    }

    pub(crate) fn handle_mut(&mut self) -> Result<&mut NativeHandle> {
        self.handle.as_mut().ok_or_else(Error::destroyed)
    }

    /// Re-resolve the descriptor by name and open the port at its current
    /// index.
    pub(crate) fn open(&mut self, port_name: &str) -> Result<()> {
        self.ensure_alive()?;
        if self.is_open {
            return Ok(());
        }
        let Some(stale) = &self.descriptor else {
            return Err(Error::Port(
                "port was created without a descriptor; only open_virtual is available"
                    .to_string(),
            ));
        };

        let current = self
            .catalog
            .resolve(&stale.name, stale.direction)?
            .ok_or_else(|| Error::Port(format!("port '{}' no longer exists", stale.name)))?;
        if current.index != stale.index {
            debug!(
                "port '{}' moved from index {} to {}",
                current.name, stale.index, current.index
            );
        }
        let index = current.index;
        self.descriptor = Some(current);

        self.handle_mut()?.open(index, port_name)?;
        self.is_open = true;
        self.is_virtual = false;
        info!("opened {} port {} as '{}'", self.direction, index, port_name);
        Ok(())
    }

    pub(crate) fn open_virtual(&mut self, port_name: &str) -> Result<()> {
        self.ensure_alive()?;
        if !self.catalog.supports_virtual_ports() {
            return Err(Error::Port(
                "virtual ports are not supported on this platform".to_string(),
            ));
        }
        if self.is_open {
            return Ok(());
        }
        self.handle_mut()?.open_virtual(port_name)?;
        self.is_open = true;
        self.is_virtual = true;
        info!("opened virtual {} port '{}'", self.direction, port_name);
        Ok(())
    }

    /// Close and swap in a fresh handle. Returns `true` if a new handle was
    /// installed, `false` if the port was not open.
    ///
    /// If the replacement cannot be created the port ends up destroyed.
    pub(crate) fn close(&mut self) -> Result<bool> {
        self.ensure_alive()?;
        if !self.is_open {
            return Ok(false);
        }

        let mut old = self.handle.take().ok_or_else(Error::destroyed)?;
        if let Err(e) = old.close() {
            self.handle = Some(old);
            return Err(e.into());
        }
        self.is_open = false;
        self.is_virtual = false;
        if let Err(e) = old.free() {
            warn!("failed to free closed {} handle: {}", self.direction, e);
        }

        let fresh = self
            .catalog
            .create_handle(self.direction, self.requested_api, self.client_name.as_deref())
            .and_then(|handle| Ok((handle.current_api()?, handle)));
        match fresh {
            Ok((api, handle)) => {
                self.api = api;
                self.handle = Some(handle);
                info!("closed {} port", self.direction);
                Ok(true)
            }
            Err(e) => {
                warn!("could not recreate {} handle after close: {}", self.direction, e);
                self.is_destroyed = true;
                Err(e)
            }
        }
    }

    /// Close if open, free the handle and mark the port destroyed.
    ///
    /// The port is destroyed even if the backend reports an error; the first
    /// error is returned.
    pub(crate) fn destroy(&mut self) -> Result<()> {
        if self.is_destroyed {
            return Ok(());
        }
        let mut result = Ok(());
        if let Some(mut handle) = self.handle.take() {
            if self.is_open {
                result = handle.close();
            }
            let freed = handle.free();
            result = result.and(freed);
        }
        self.is_open = false;
        self.is_virtual = false;
        self.is_destroyed = true;
        info!("destroyed {} port", self.direction);
        result.map_err(Error::from)
    }

    pub(crate) fn fmt_port(&self, f: &mut fmt::Formatter<'_>, kind: &str) -> fmt::Result {
        writeln!(f, "{} {{", kind)?;
        match &self.descriptor {
            Some(descriptor) => writeln!(f, "    {}", descriptor)?,
            None => writeln!(f, "    descriptor = none")?,
        }
        writeln!(f, "    api = {}", self.api)?;
        match &self.client_name {
            Some(name) => writeln!(f, "    client_name = '{}'", name)?,
            None => writeln!(f, "    client_name = default")?,
        }
        writeln!(f, "    is_open = {}", self.is_open)?;
        writeln!(f, "    is_virtual = {}", self.is_virtual)?;
        writeln!(f, "    is_destroyed = {}", self.is_destroyed)?;
        write!(f, "}}")
    }
}
