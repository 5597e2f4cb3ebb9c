//! Hardware integration tests against the system MIDI stack.
//!
//! Linux: needs the ALSA sequencer with the `snd-seq-dummy` module loaded,
//! which provides the "Midi Through" port. macOS: enable the IAC Driver in
//! Audio MIDI Setup.
//! All tests are `#[ignore]` so CI doesn't fail without hardware.
//!
//! Run with:
//!   cargo test -p midiport-io --test hardware -- --ignored --test-threads=1

#![cfg(feature = "midi-io")]

use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use midiport_io::{MidiContext, MidiMessage, MidiPort};

const SETTLE: Duration = Duration::from_millis(200);
const DELIVERY_TIMEOUT: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn system() -> MidiContext {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    MidiContext::builder()
        .io()
        .build()
        .expect("Failed to build MidiContext")
}

/// First port whose name looks like a loopback the OS provides.
fn loopback_name(names: &[String]) -> Option<String> {
    names
        .iter()
        .find(|name| name.contains("Midi Through") || name.contains("IAC"))
        .cloned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
#[ignore]
fn test_system_catalog_lists_ports() {
    let midi = system();
    let readable = midi.readable_ports().expect("listing readable ports");
    let writable = midi.writable_ports().expect("listing writable ports");
    for (i, port) in readable.iter().enumerate() {
        assert_eq!(port.index, i);
    }
    for (i, port) in writable.iter().enumerate() {
        assert_eq!(port.index, i);
    }
    assert!(!midi.compiled_apis().is_empty());
}

#[test]
#[ignore]
fn test_system_loopback_round_trip() {
    let midi = system();
    let readable = midi.readable_ports().unwrap();
    let writable = midi.writable_ports().unwrap();

    let in_name = loopback_name(&readable.iter().map(|p| p.name.clone()).collect::<Vec<_>>())
        .expect("no system loopback port found");
    let out_name = loopback_name(&writable.iter().map(|p| p.name.clone()).collect::<Vec<_>>())
        .expect("no system loopback port found");

    let source = readable.into_iter().find(|p| p.name == in_name).unwrap();
    let sink = writable.into_iter().find(|p| p.name == out_name).unwrap();

    let mut input = midi.input_port(source).unwrap();
    let (tx, rx) = unbounded();
    input
        .set_callback(move |msg: &MidiMessage, _: f64| {
            let _ = tx.send(msg.data_copy());
        })
        .unwrap();
    input.open("midiport hardware in").unwrap();

    let mut output = midi.output_port(sink).unwrap();
    output.open("midiport hardware out").unwrap();
    thread::sleep(SETTLE);

    // Drain anything the OS buffered before we connected
    while rx.try_recv().is_ok() {}

    output
        .send_message(&MidiMessage::from_bytes(&[0x90, 69, 69]))
        .unwrap();
    assert_eq!(rx.recv_timeout(DELIVERY_TIMEOUT).unwrap(), vec![0x90, 69, 69]);

    input.close().unwrap();
    output.close().unwrap();
}

#[test]
#[ignore]
fn test_system_virtual_port_appears_in_catalog() {
    let midi = system();
    if !midi.supports_virtual_ports() {
        return;
    }
    let mut output = midi.output_port_with(None, Default::default()).unwrap();
    output.open_virtual("midiport virtual out").unwrap();
    thread::sleep(SETTLE);

    let readable = midi.readable_ports().unwrap();
    assert!(readable
        .iter()
        .any(|p| p.name.contains("midiport virtual out")));
    output.destroy().unwrap();
}
