//! Native backend adapters.
//!
//! A [`MidiBackend`] creates [`NativeDevice`]s, one per direction. Every
//! device call returns `Result<_, NativeError>`; nothing above this layer
//! inspects backend state any other way.
//!
//! Two adapters ship:
//! - [`LoopbackBackend`]: in-process MIDI graph, no hardware needed
//! - `MidirBackend` (feature `midi-io`): system MIDI through midir

use std::sync::atomic::{AtomicU8, Ordering};

use midiport_core::{status, Direction, MidiApi};

use crate::error::NativeError;

pub mod loopback;
pub use loopback::LoopbackBackend;

#[cfg(feature = "midi-io")]
pub mod midir;
#[cfg(feature = "midi-io")]
pub use self::midir::MidirBackend;

/// Receive callback registered on an input device.
///
/// Called on the device's delivery thread with the seconds elapsed since the
/// previous message (0.0 for the first) and the raw bytes. `None` bytes mean
/// the backend had nothing usable to deliver.
pub type ReceiveCallback = Box<dyn Fn(f64, Option<&[u8]>) + Send + Sync>;

/// Message categories an input device can drop before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IgnoreFlags {
    /// System exclusive (0xF0).
    pub sysex: bool,
    /// MIDI time code quarter frames (0xF1) and timing clock (0xF8).
    pub time: bool,
    /// Active sensing (0xFE).
    pub sense: bool,
}

impl IgnoreFlags {
    pub const NONE: IgnoreFlags = IgnoreFlags {
        sysex: false,
        time: false,
        sense: false,
    };

    pub fn new(sysex: bool, time: bool, sense: bool) -> Self {
        Self { sysex, time, sense }
    }

    /// True if a message starting with `bytes[0]` should be dropped.
    pub fn blocks(&self, bytes: &[u8]) -> bool {
        match bytes.first() {
            Some(&status::SYSEX) => self.sysex,
            Some(&status::MIDI_TIME_CODE) | Some(&status::TIMING_CLOCK) => self.time,
            Some(&status::ACTIVE_SENSING) => self.sense,
            _ => false,
        }
    }

    fn to_bits(self) -> u8 {
        (self.sysex as u8) | ((self.time as u8) << 1) | ((self.sense as u8) << 2)
    }

    fn from_bits(bits: u8) -> Self {
        Self {
            sysex: bits & 0b001 != 0,
            time: bits & 0b010 != 0,
            sense: bits & 0b100 != 0,
        }
    }
}

/// Fresh devices ignore everything but channel and system common messages.
impl Default for IgnoreFlags {
    fn default() -> Self {
        Self {
            sysex: true,
            time: true,
            sense: true,
        }
    }
}

/// Ignore flags readable from a delivery thread without locking.
#[derive(Debug)]
pub(crate) struct AtomicIgnoreFlags(AtomicU8);

impl AtomicIgnoreFlags {
    pub(crate) fn new(flags: IgnoreFlags) -> Self {
        Self(AtomicU8::new(flags.to_bits()))
    }

    pub(crate) fn load(&self) -> IgnoreFlags {
        IgnoreFlags::from_bits(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, flags: IgnoreFlags) {
        self.0.store(flags.to_bits(), Ordering::Release);
    }
}

impl Default for AtomicIgnoreFlags {
    fn default() -> Self {
        Self::new(IgnoreFlags::default())
    }
}

/// Factory for native devices. One backend serves a whole [`MidiContext`].
///
/// [`MidiContext`]: crate::MidiContext
pub trait MidiBackend: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// APIs this backend was built with.
    fn compiled_apis(&self) -> Vec<MidiApi>;

    /// Whether devices can open virtual ports on this platform.
    fn supports_virtual_ports(&self) -> bool;

    /// Device with backend-chosen API and client name.
    fn create_default(&self, direction: Direction) -> Result<Box<dyn NativeDevice>, NativeError>;

    /// Device on a specific API under a specific client name.
    fn create_named(
        &self,
        direction: Direction,
        api: MidiApi,
        client_name: &str,
        queue_size_limit: usize,
    ) -> Result<Box<dyn NativeDevice>, NativeError>;
}

/// One native device handle, either input (`Readable`) or output (`Writable`).
///
/// Operations that only make sense for the other direction fail with a
/// `NativeError` through the default implementations.
pub trait NativeDevice: Send {
    fn direction(&self) -> Direction;

    /// API actually in use, resolved even when `Unspecified` was requested.
    fn current_api(&self) -> Result<MidiApi, NativeError>;

    fn port_count(&self) -> Result<usize, NativeError>;

    fn port_name(&self, index: usize) -> Result<String, NativeError>;

    /// Connect to the system port at `index`, naming our end `port_name`.
    fn open(&mut self, index: usize, port_name: &str) -> Result<(), NativeError>;

    /// Create a port other applications can connect to.
    fn open_virtual(&mut self, port_name: &str) -> Result<(), NativeError>;

    fn close(&mut self) -> Result<(), NativeError>;

    fn set_receive_callback(&mut self, _callback: ReceiveCallback) -> Result<(), NativeError> {
        Err(wrong_direction("set_receive_callback", self.direction()))
    }

    fn cancel_receive_callback(&mut self) -> Result<(), NativeError> {
        Err(wrong_direction("cancel_receive_callback", self.direction()))
    }

    fn ignore_types(&mut self, _flags: IgnoreFlags) -> Result<(), NativeError> {
        Err(wrong_direction("ignore_types", self.direction()))
    }

    fn send(&mut self, _bytes: &[u8]) -> Result<(), NativeError> {
        Err(wrong_direction("send", self.direction()))
    }

    /// Release the native resource. Consuming, so it cannot run twice.
    fn free(self: Box<Self>) -> Result<(), NativeError>;
}

pub(crate) fn wrong_direction(operation: &str, direction: Direction) -> NativeError {
    NativeError::new(format!(
        "{} is not supported on a {} device",
        operation, direction
    ))
}
