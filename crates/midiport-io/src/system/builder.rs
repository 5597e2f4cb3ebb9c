//! MidiContext builder for choosing a backend and configuration.

use std::sync::Arc;

use tracing::info;

use crate::backend::{LoopbackBackend, MidiBackend};
use crate::catalog::PortCatalog;
use crate::config::MidiConfig;
use crate::error::Result;

use super::{MidiContext, MidiContextInner};

#[derive(Default)]
pub struct MidiContextBuilder {
    pub(super) backend: Option<Arc<dyn MidiBackend>>,
    pub(super) config: MidiConfig,
}

impl MidiContextBuilder {
    /// Use a specific backend.
    pub fn backend(mut self, backend: Arc<dyn MidiBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// In-process loopback backend, no hardware needed.
    pub fn loopback(self) -> Self {
        self.backend(Arc::new(LoopbackBackend::new()))
    }

    /// System MIDI through midir.
    #[cfg(feature = "midi-io")]
    pub fn io(self) -> Self {
        self.backend(Arc::new(crate::backend::MidirBackend::new()))
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: MidiConfig) -> Self {
        self.config = config;
        self
    }

    pub fn disallow_virtual_ports(mut self, disallow: bool) -> Self {
        self.config.disallow_virtual_ports = disallow;
        self
    }

    pub fn disallow_jack(mut self, disallow: bool) -> Self {
        self.config.disallow_jack = disallow;
        self
    }

    pub fn queue_size_limit(mut self, limit: usize) -> Self {
        self.config.queue_size_limit = limit;
        self
    }

    pub fn input_client_name(mut self, name: impl Into<String>) -> Self {
        self.config.input_client_name = name.into();
        self
    }

    pub fn output_client_name(mut self, name: impl Into<String>) -> Self {
        self.config.output_client_name = name.into();
        self
    }

    pub fn build(self) -> Result<MidiContext> {
        self.config.validate()?;

        let backend = match self.backend {
            Some(backend) => backend,
            None => default_backend(),
        };
        info!("MIDI context using {} backend", backend.name());

        let catalog = PortCatalog::new(backend, Arc::new(self.config));
        Ok(MidiContext {
            inner: Arc::new(MidiContextInner { catalog }),
        })
    }
}

#[cfg(feature = "midi-io")]
fn default_backend() -> Arc<dyn MidiBackend> {
    Arc::new(crate::backend::MidirBackend::new())
}

#[cfg(not(feature = "midi-io"))]
fn default_backend() -> Arc<dyn MidiBackend> {
    Arc::new(LoopbackBackend::new())
}
