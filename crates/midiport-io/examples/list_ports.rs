use midiport_io::MidiContext;

fn main() -> midiport_io::Result<()> {
    tracing_subscriber::fmt::init();

    let midi = MidiContext::builder().build()?;

    println!("=== Compiled APIs ===");
    for api in midi.compiled_apis() {
        println!("  {} ({})", api.display_name(), api.name());
    }

    println!("\n=== Readable Ports ===");
    let readable = midi.readable_ports()?;
    if readable.is_empty() {
        println!("  (none found)");
    }
    for port in &readable {
        println!("  [{}] {}", port.index, port.name);
    }

    println!("\n=== Writable Ports ===");
    let writable = midi.writable_ports()?;
    if writable.is_empty() {
        println!("  (none found)");
    }
    for port in &writable {
        println!("  [{}] {}", port.index, port.name);
    }

    println!(
        "\nVirtual ports: {}",
        if midi.supports_virtual_ports() { "supported" } else { "unsupported" }
    );
    Ok(())
}
