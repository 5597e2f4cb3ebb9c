//! In-process loopback backend.
//!
//! Models a small MIDI graph the way ALSA sequencer clients see it:
//!
//! - sources are the readable list, sinks are the writable list
//! - opening an input subscribes to a source and publishes a sink of its own
//! - opening an output targets a sink and publishes a source of its own
//! - the system through port is a sink that echoes into its paired source
//!
//! Each open input owns one delivery thread fed by a bounded channel.
//! Messages arriving while the queue is full are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use midiport_core::{Direction, MidiApi};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::{
    wrong_direction, AtomicIgnoreFlags, IgnoreFlags, MidiBackend, NativeDevice, ReceiveCallback,
};
use crate::error::NativeError;

pub const THROUGH_PORT_NAME: &str = "Midi Through:Midi Through Port-0 14:0";
const FIRST_CLIENT_ID: u32 = 128;
const DEFAULT_QUEUE_SIZE: usize = 100;
const DEFAULT_INPUT_CLIENT: &str = "Loopback Input Client";
const DEFAULT_OUTPUT_CLIENT: &str = "Loopback Output Client";

type EndpointId = u64;

struct Packet {
    bytes: Vec<u8>,
    received_at: Instant,
}

enum SinkRoute {
    Input(Sender<Packet>),
    Through(EndpointId),
}

struct Source {
    id: EndpointId,
    name: String,
    owner: Option<u64>,
    /// (subscribing device, its queue)
    subscribers: Vec<(u64, Sender<Packet>)>,
}

struct Sink {
    id: EndpointId,
    name: String,
    owner: Option<u64>,
    route: SinkRoute,
}

struct Graph {
    sources: Vec<Source>,
    sinks: Vec<Sink>,
    next_id: u64,
    next_client: u32,
}

impl Graph {
    fn new() -> Self {
        let mut graph = Self {
            sources: Vec::new(),
            sinks: Vec::new(),
            next_id: 1,
            next_client: FIRST_CLIENT_ID,
        };
        let source = graph.alloc_id();
        let sink = graph.alloc_id();
        graph.sources.push(Source {
            id: source,
            name: THROUGH_PORT_NAME.to_string(),
            owner: None,
            subscribers: Vec::new(),
        });
        graph.sinks.push(Sink {
            id: sink,
            name: THROUGH_PORT_NAME.to_string(),
            owner: None,
            route: SinkRoute::Through(source),
        });
        graph
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn alloc_client(&mut self) -> u32 {
        let id = self.next_client;
        self.next_client += 1;
        id
    }

    fn names(&self, direction: Direction) -> Vec<&str> {
        match direction {
            Direction::Readable => self.sources.iter().map(|s| s.name.as_str()).collect(),
            _ => self.sinks.iter().map(|s| s.name.as_str()).collect(),
        }
    }

    fn publish_to_sink(&self, sink: EndpointId, bytes: &[u8], at: Instant) {
        match self.sinks.iter().find(|s| s.id == sink).map(|s| &s.route) {
            Some(SinkRoute::Input(queue)) => enqueue(queue, bytes, at),
            Some(SinkRoute::Through(source)) => self.publish_to_source(*source, bytes, at),
            None => trace!("loopback sink {} is gone, message dropped", sink),
        }
    }

    fn publish_to_source(&self, source: EndpointId, bytes: &[u8], at: Instant) {
        if let Some(source) = self.sources.iter().find(|s| s.id == source) {
            for (_, queue) in &source.subscribers {
                enqueue(queue, bytes, at);
            }
        }
    }

    /// Drop every endpoint and subscription belonging to `device`.
    fn detach(&mut self, device: u64) {
        self.sources.retain(|s| s.owner != Some(device));
        self.sinks.retain(|s| s.owner != Some(device));
        for source in &mut self.sources {
            source.subscribers.retain(|(owner, _)| *owner != device);
        }
    }
}

fn enqueue(queue: &Sender<Packet>, bytes: &[u8], received_at: Instant) {
    let packet = Packet {
        bytes: bytes.to_vec(),
        received_at,
    };
    match queue.try_send(packet) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => debug!("loopback input queue full, message dropped"),
        Err(TrySendError::Disconnected(_)) => trace!("loopback input queue closed"),
    }
}

struct Shared {
    graph: Mutex<Graph>,
    failure: Mutex<Option<String>>,
    create_failure: Mutex<Option<String>>,
    next_device: AtomicU64,
}

impl Shared {
    fn check(&self) -> Result<(), NativeError> {
        match self.failure.lock().take() {
            Some(message) => Err(NativeError::new(message)),
            None => Ok(()),
        }
    }

    fn check_create(&self) -> Result<(), NativeError> {
        if let Some(message) = self.create_failure.lock().take() {
            return Err(NativeError::new(message));
        }
        self.check()
    }
}

/// In-process backend with no system dependencies.
///
/// Clones share the same graph, so ports created from one clone are visible
/// to devices created from another.
#[derive(Clone)]
pub struct LoopbackBackend {
    shared: Arc<Shared>,
    virtual_ports: bool,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                graph: Mutex::new(Graph::new()),
                failure: Mutex::new(None),
                create_failure: Mutex::new(None),
                next_device: AtomicU64::new(1),
            }),
            virtual_ports: true,
        }
    }

    /// Same graph, but reports virtual ports as unsupported.
    pub fn without_virtual_ports(mut self) -> Self {
        self.virtual_ports = false;
        self
    }

    /// Make the next device call (or device creation) fail with `message`.
    pub fn inject_failure(&self, message: impl Into<String>) {
        *self.shared.failure.lock() = Some(message.into());
    }

    /// Make the next device creation fail, leaving calls on existing
    /// devices alone.
    pub fn inject_create_failure(&self, message: impl Into<String>) {
        *self.shared.create_failure.lock() = Some(message.into());
    }

    fn create(
        &self,
        direction: Direction,
        client_name: &str,
        queue_size: usize,
    ) -> Result<Box<dyn NativeDevice>, NativeError> {
        self.shared.check_create()?;
        if direction == Direction::Unknown {
            return Err(NativeError::new("cannot create a device without a direction"));
        }
        let device_id = self.shared.next_device.fetch_add(1, Ordering::Relaxed);
        let client_id = self.shared.graph.lock().alloc_client();
        trace!(
            "loopback: created {} device '{}' as client {}",
            direction,
            client_name,
            client_id
        );
        Ok(Box::new(LoopbackDevice {
            shared: Arc::clone(&self.shared),
            virtual_ports: self.virtual_ports,
            direction,
            device_id,
            client_id,
            client_name: client_name.to_string(),
            queue_size: queue_size.max(1),
            input: Arc::new(InputShared::default()),
            connection: None,
        }))
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MidiBackend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }

    fn compiled_apis(&self) -> Vec<MidiApi> {
        vec![MidiApi::Dummy]
    }

    fn supports_virtual_ports(&self) -> bool {
        self.virtual_ports
    }

    fn create_default(&self, direction: Direction) -> Result<Box<dyn NativeDevice>, NativeError> {
        let client = match direction {
            Direction::Readable => DEFAULT_INPUT_CLIENT,
            _ => DEFAULT_OUTPUT_CLIENT,
        };
        self.create(direction, client, DEFAULT_QUEUE_SIZE)
    }

    fn create_named(
        &self,
        direction: Direction,
        api: MidiApi,
        client_name: &str,
        queue_size_limit: usize,
    ) -> Result<Box<dyn NativeDevice>, NativeError> {
        if !matches!(api, MidiApi::Unspecified | MidiApi::Dummy) {
            return Err(NativeError::new(format!(
                "{} support is not compiled into this backend",
                api.display_name()
            )));
        }
        self.create(direction, client_name, queue_size_limit)
    }
}

#[derive(Default)]
struct InputShared {
    callback: ArcSwapOption<ReceiveCallback>,
    ignore: AtomicIgnoreFlags,
}

struct DeliveryWorker {
    shutdown: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DeliveryWorker {
    fn spawn(
        name: String,
        messages: Receiver<Packet>,
        input: Arc<InputShared>,
    ) -> Result<Self, NativeError> {
        let (shutdown_tx, shutdown_rx) = bounded::<()>(0);
        let thread = thread::Builder::new()
            .name(name)
            .spawn(move || delivery_loop(messages, shutdown_rx, input))
            .map_err(|e| NativeError::new(format!("failed to spawn delivery thread: {}", e)))?;
        Ok(Self {
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    fn stop(&mut self) {
        // Dropping the sender wakes the loop
        self.shutdown.take();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() == thread::current().id() {
                // Closed from inside a callback; the loop exits once it returns
                return;
            }
            if thread.join().is_err() {
                debug!("loopback delivery thread panicked");
            }
        }
    }
}

fn delivery_loop(messages: Receiver<Packet>, shutdown: Receiver<()>, input: Arc<InputShared>) {
    let mut previous: Option<Instant> = None;
    loop {
        let packet = select! {
            recv(messages) -> packet => packet.ok(),
            recv(shutdown) -> _ => None,
        };
        let Some(packet) = packet else { break };

        if input.ignore.load().blocks(&packet.bytes) {
            continue;
        }
        let delta = previous
            .map(|prev| packet.received_at.saturating_duration_since(prev).as_secs_f64())
            .unwrap_or(0.0);
        previous = Some(packet.received_at);

        if let Some(callback) = input.callback.load_full() {
            callback(delta, Some(packet.bytes.as_slice()));
        }
    }
}

enum Connection {
    Input { worker: DeliveryWorker },
    Output { source: EndpointId, target: Option<EndpointId> },
}

struct LoopbackDevice {
    shared: Arc<Shared>,
    virtual_ports: bool,
    direction: Direction,
    device_id: u64,
    client_id: u32,
    client_name: String,
    queue_size: usize,
    input: Arc<InputShared>,
    connection: Option<Connection>,
}

impl LoopbackDevice {
    fn endpoint_name(&self, port_name: &str) -> String {
        format!("{}:{} {}:0", self.client_name, port_name, self.client_id)
    }

    /// `source`: the index of the readable port to subscribe to, if any.
    fn connect_input(&mut self, source: Option<usize>, port_name: &str) -> Result<(), NativeError> {
        let (queue, messages) = bounded(self.queue_size);
        let mut graph = self.shared.graph.lock();

        if let Some(index) = source {
            let source = graph
                .sources
                .get_mut(index)
                .ok_or_else(|| invalid_index(index))?;
            source.subscribers.push((self.device_id, queue.clone()));
        }

        let sink = graph.alloc_id();
        graph.sinks.push(Sink {
            id: sink,
            name: self.endpoint_name(port_name),
            owner: Some(self.device_id),
            route: SinkRoute::Input(queue),
        });
        drop(graph);

        let worker = DeliveryWorker::spawn(
            format!("midiport-loopback-{}", self.client_id),
            messages,
            Arc::clone(&self.input),
        );
        match worker {
            Ok(worker) => {
                self.connection = Some(Connection::Input { worker });
                Ok(())
            }
            Err(e) => {
                self.shared.graph.lock().detach(self.device_id);
                Err(e)
            }
        }
    }

    fn connect_output(&mut self, sink: Option<usize>, port_name: &str) -> Result<(), NativeError> {
        let mut graph = self.shared.graph.lock();
        let target = match sink {
            Some(index) => Some(graph.sinks.get(index).ok_or_else(|| invalid_index(index))?.id),
            None => None,
        };
        let source = graph.alloc_id();
        graph.sources.push(Source {
            id: source,
            name: self.endpoint_name(port_name),
            owner: Some(self.device_id),
            subscribers: Vec::new(),
        });
        self.connection = Some(Connection::Output { source, target });
        Ok(())
    }

    fn connect(&mut self, index: Option<usize>, port_name: &str) -> Result<(), NativeError> {
        self.shared.check()?;
        if self.connection.is_some() {
            return Err(NativeError::new("device is already open"));
        }
        match self.direction {
            Direction::Readable => self.connect_input(index, port_name),
            _ => self.connect_output(index, port_name),
        }
    }

    fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.shared.graph.lock().detach(self.device_id);
            if let Connection::Input { mut worker } = connection {
                worker.stop();
            }
        }
    }
}

fn invalid_index(index: usize) -> NativeError {
    NativeError::new(format!("invalid port index {}", index))
}

impl NativeDevice for LoopbackDevice {
    fn direction(&self) -> Direction {
        self.direction
    }

    fn current_api(&self) -> Result<MidiApi, NativeError> {
        self.shared.check()?;
        Ok(MidiApi::Dummy)
    }

    fn port_count(&self) -> Result<usize, NativeError> {
        self.shared.check()?;
        Ok(self.shared.graph.lock().names(self.direction).len())
    }

    fn port_name(&self, index: usize) -> Result<String, NativeError> {
        self.shared.check()?;
        let graph = self.shared.graph.lock();
        graph
            .names(self.direction)
            .get(index)
            .map(|name| name.to_string())
            .ok_or_else(|| invalid_index(index))
    }

    fn open(&mut self, index: usize, port_name: &str) -> Result<(), NativeError> {
        self.connect(Some(index), port_name)
    }

    fn open_virtual(&mut self, port_name: &str) -> Result<(), NativeError> {
        if !self.virtual_ports {
            self.shared.check()?;
            return Err(NativeError::new("virtual ports are not supported"));
        }
        self.connect(None, port_name)
    }

    fn close(&mut self) -> Result<(), NativeError> {
        self.shared.check()?;
        self.disconnect();
        Ok(())
    }

    fn set_receive_callback(&mut self, callback: ReceiveCallback) -> Result<(), NativeError> {
        self.shared.check()?;
        if self.direction != Direction::Readable {
            return Err(wrong_direction("set_receive_callback", self.direction));
        }
        self.input.callback.store(Some(Arc::new(callback)));
        Ok(())
    }

    fn cancel_receive_callback(&mut self) -> Result<(), NativeError> {
        self.shared.check()?;
        if self.direction != Direction::Readable {
            return Err(wrong_direction("cancel_receive_callback", self.direction));
        }
        self.input.callback.store(None);
        Ok(())
    }

    fn ignore_types(&mut self, flags: IgnoreFlags) -> Result<(), NativeError> {
        self.shared.check()?;
        if self.direction != Direction::Readable {
            return Err(wrong_direction("ignore_types", self.direction));
        }
        self.input.ignore.store(flags);
        Ok(())
    }

    fn send(&mut self, bytes: &[u8]) -> Result<(), NativeError> {
        self.shared.check()?;
        if self.direction != Direction::Writable {
            return Err(wrong_direction("send", self.direction));
        }
        let Some(Connection::Output { source, target }) = &self.connection else {
            return Err(NativeError::new("output device is not open"));
        };
        let now = Instant::now();
        let graph = self.shared.graph.lock();
        if let Some(sink) = target {
            graph.publish_to_sink(*sink, bytes, now);
        }
        graph.publish_to_source(*source, bytes, now);
        Ok(())
    }

    fn free(mut self: Box<Self>) -> Result<(), NativeError> {
        self.disconnect();
        self.input.callback.store(None);
        trace!("loopback: freed client {}", self.client_id);
        Ok(())
    }
}

impl Drop for LoopbackDevice {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn names(backend: &LoopbackBackend, direction: Direction) -> Vec<String> {
        let probe = backend.create_default(direction).unwrap();
        let count = probe.port_count().unwrap();
        let names = (0..count).map(|i| probe.port_name(i).unwrap()).collect();
        probe.free().unwrap();
        names
    }

    fn collecting_callback() -> (ReceiveCallback, Receiver<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let callback: ReceiveCallback = Box::new(move |_, bytes| {
            if let Some(bytes) = bytes {
                let _ = tx.send(bytes.to_vec());
            }
        });
        (callback, rx)
    }

    #[test]
    fn test_fresh_graph_has_through_port() {
        let backend = LoopbackBackend::new();
        assert_eq!(names(&backend, Direction::Readable), vec![THROUGH_PORT_NAME]);
        assert_eq!(names(&backend, Direction::Writable), vec![THROUGH_PORT_NAME]);
    }

    #[test]
    fn test_open_publishes_opposite_endpoint() {
        let backend = LoopbackBackend::new();
        let mut input = backend
            .create_named(Direction::Readable, MidiApi::Dummy, "Synth", 16)
            .unwrap();
        input.open(0, "In").unwrap();

        let writable = names(&backend, Direction::Writable);
        assert_eq!(writable.len(), 2);
        assert!(writable[1].starts_with("Synth:In "));
        assert!(writable[1].ends_with(":0"));

        input.close().unwrap();
        assert_eq!(names(&backend, Direction::Writable).len(), 1);
        input.free().unwrap();
    }

    #[test]
    fn test_client_ids_keep_names_distinct() {
        let backend = LoopbackBackend::new();
        let mut a = backend.create_default(Direction::Readable).unwrap();
        let mut b = backend.create_default(Direction::Readable).unwrap();
        a.open(0, "Port").unwrap();
        b.open(0, "Port").unwrap();
        let writable = names(&backend, Direction::Writable);
        assert_ne!(writable[1], writable[2]);
        a.free().unwrap();
        b.free().unwrap();
    }

    #[test]
    fn test_output_reaches_input_and_through_port() {
        let backend = LoopbackBackend::new();

        let mut input = backend.create_default(Direction::Readable).unwrap();
        let (callback, received) = collecting_callback();
        input.set_receive_callback(callback).unwrap();
        input.ignore_types(IgnoreFlags::NONE).unwrap();
        // Subscribe to the through port
        input.open(0, "Monitor").unwrap();

        // Write into the through port, which echoes to its subscribers
        let mut output = backend.create_default(Direction::Writable).unwrap();
        output.open(0, "Out").unwrap();
        output.send(&[0x90, 60, 100]).unwrap();

        let got = received.recv_timeout(Duration::from_millis(200)).unwrap();
        assert_eq!(got, vec![0x90, 60, 100]);

        output.free().unwrap();
        input.free().unwrap();
    }

    #[test]
    fn test_ignore_flags_filter_before_callback() {
        let backend = LoopbackBackend::new();
        let mut input = backend.create_default(Direction::Readable).unwrap();
        let (callback, received) = collecting_callback();
        input.set_receive_callback(callback).unwrap();
        input.open_virtual("Filtered").unwrap();

        let sink = names(&backend, Direction::Writable).len() - 1;
        let mut output = backend.create_default(Direction::Writable).unwrap();
        output.open(sink, "Out").unwrap();

        // Default flags drop timing clock
        output.send(&[0xF8]).unwrap();
        output.send(&[0x80, 60, 0]).unwrap();
        assert_eq!(
            received.recv_timeout(Duration::from_millis(200)).unwrap(),
            vec![0x80, 60, 0]
        );
        assert!(received.try_recv().is_err());

        output.free().unwrap();
        input.free().unwrap();
    }

    #[test]
    fn test_full_queue_drops_messages() {
        let backend = LoopbackBackend::new();
        let mut input = backend
            .create_named(Direction::Readable, MidiApi::Unspecified, "Slow", 1)
            .unwrap();

        let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        let count = Arc::new(AtomicUsize::new(0));
        let count_cb = Arc::clone(&count);
        input
            .set_receive_callback(Box::new(move |_, _| {
                if count_cb.fetch_add(1, Ordering::SeqCst) == 0 {
                    let _ = entered_tx.send(());
                    let _ = release_rx.recv();
                }
            }))
            .unwrap();
        input.open_virtual("Slow In").unwrap();

        let sink = names(&backend, Direction::Writable).len() - 1;
        let mut output = backend.create_default(Direction::Writable).unwrap();
        output.open(sink, "Out").unwrap();

        output.send(&[0x90, 1, 1]).unwrap();
        entered_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        // One slot: the second is queued, the third dropped
        output.send(&[0x90, 2, 1]).unwrap();
        output.send(&[0x90, 3, 1]).unwrap();
        release_tx.send(()).unwrap();

        thread::sleep(Duration::from_millis(100));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        output.free().unwrap();
        input.free().unwrap();
    }

    #[test]
    fn test_injected_failure_hits_next_call_only() {
        let backend = LoopbackBackend::new();
        let device = backend.create_default(Direction::Writable).unwrap();
        backend.inject_failure("device exploded");
        let err = device.port_count().unwrap_err();
        assert_eq!(err.message, "device exploded");
        assert!(device.port_count().is_ok());
        device.free().unwrap();
    }

    #[test]
    fn test_wrong_direction_operations_fail() {
        let backend = LoopbackBackend::new();
        let mut output = backend.create_default(Direction::Writable).unwrap();
        assert!(output.ignore_types(IgnoreFlags::NONE).is_err());
        assert!(output.cancel_receive_callback().is_err());

        let mut input = backend.create_default(Direction::Readable).unwrap();
        assert!(input.send(&[0x90, 60, 100]).is_err());

        output.free().unwrap();
        input.free().unwrap();
    }

    #[test]
    fn test_virtual_ports_can_be_disabled() {
        let backend = LoopbackBackend::new().without_virtual_ports();
        assert!(!backend.supports_virtual_ports());
        let mut input = backend.create_default(Direction::Readable).unwrap();
        assert!(input.open_virtual("Nope").is_err());
        input.free().unwrap();
    }

    #[test]
    fn test_uncompiled_api_rejected() {
        let backend = LoopbackBackend::new();
        assert!(backend
            .create_named(Direction::Readable, MidiApi::UnixJack, "Jack", 10)
            .is_err());
    }
}
