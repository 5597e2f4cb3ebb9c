//! Delivery-thread side of an input port.
//!
//! The bridge owns the user callback and the reusable message buffer. The
//! backend holds a trampoline closure with an `Arc` to the bridge, so the
//! bridge outlives any native handle the port cycles through.
//!
//! A re-entrant lock is held for the whole of each delivery. Clearing from
//! another thread therefore waits for an in-flight call to finish, and
//! nothing is delivered once `clear` returns. Clearing from inside the
//! callback re-enters the lock and returns at once; the generation counter
//! tells the running delivery not to put the callback back.

use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use midiport_core::MidiMessage;
use parking_lot::ReentrantMutex;
use tracing::error;

use crate::backend::ReceiveCallback;

/// Handler for messages arriving on an [`InputPort`](super::InputPort).
///
/// Runs on the backend's delivery thread. The message borrows the port's
/// reusable buffer and is only valid for the duration of the call; the
/// second argument is the seconds elapsed since the previous message.
pub trait MidiMessageCallback: Send {
    fn on_message(&mut self, message: &MidiMessage, delta_seconds: f64);
}

impl<F> MidiMessageCallback for F
where
    F: FnMut(&MidiMessage, f64) + Send,
{
    fn on_message(&mut self, message: &MidiMessage, delta_seconds: f64) {
        self(message, delta_seconds)
    }
}

#[derive(Default)]
struct Slot {
    callback: Option<Box<dyn MidiMessageCallback>>,
    buffer: Option<MidiMessage>,
    received: bool,
}

#[derive(Default)]
pub(crate) struct CallbackBridge {
    slot: ReentrantMutex<RefCell<Slot>>,
    generation: AtomicU64,
    registered: AtomicBool,
}

impl CallbackBridge {
    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Install `callback` with a fresh buffer, replacing any previous one.
    pub(crate) fn install(&self, callback: Box<dyn MidiMessageCallback>) {
        let guard = self.slot.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut slot = guard.borrow_mut();
        slot.callback = Some(callback);
        slot.buffer = Some(MidiMessage::new());
        slot.received = false;
        self.registered.store(true, Ordering::Release);
    }

    /// Drop the callback and buffer. Waits for a delivery running on another
    /// thread; returns immediately when called from inside the callback.
    pub(crate) fn clear(&self) {
        let guard = self.slot.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        let mut slot = guard.borrow_mut();
        slot.callback = None;
        slot.buffer = None;
        slot.received = false;
        self.registered.store(false, Ordering::Release);
    }

    /// Copy of the buffer as of the last delivery.
    ///
    /// `None` before the first delivery, after the callback is removed, and
    /// while called from inside the callback (which already has the message).
    pub(crate) fn last_message(&self) -> Option<MidiMessage> {
        let guard = self.slot.lock();
        let slot = guard.borrow();
        if slot.received {
            slot.buffer.clone()
        } else {
            None
        }
    }

    pub(crate) fn deliver(&self, delta_seconds: f64, bytes: Option<&[u8]>) {
        let Some(bytes) = bytes else {
            return;
        };

        let guard = self.slot.lock();
        let generation = self.generation.load(Ordering::Acquire);
        let (mut callback, mut buffer) = {
            let mut slot = guard.borrow_mut();
            let Some(callback) = slot.callback.take() else {
                return;
            };
            (callback, slot.buffer.take().unwrap_or_default())
        };

        // Only grows when this message is longer than any before it
        buffer.assign(bytes);

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            callback.on_message(&buffer, delta_seconds)
        }));
        if outcome.is_err() {
            error!("MIDI input callback panicked; message dropped");
        }

        // Removed or replaced while it ran
        if self.generation.load(Ordering::Acquire) != generation {
            return;
        }
        let mut slot = guard.borrow_mut();
        slot.callback = Some(callback);
        slot.buffer = Some(buffer);
        slot.received = true;
    }

    /// Closure registered with the backend in place of the user callback.
    pub(crate) fn trampoline(self: &Arc<Self>) -> ReceiveCallback {
        let bridge = Arc::clone(self);
        Box::new(move |delta_seconds, bytes| bridge.deliver(delta_seconds, bytes))
    }
}

/// Removes an input port's callback without access to the port.
///
/// Meant to be moved into the callback itself so it can unregister from the
/// delivery thread. The native receive hook stays installed and ignores
/// messages until a new callback is set.
#[derive(Clone)]
pub struct CallbackRemover {
    pub(crate) bridge: Arc<CallbackBridge>,
}

impl CallbackRemover {
    pub fn remove(&self) {
        self.bridge.clear();
    }
}
