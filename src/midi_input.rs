use crate::collector::MidiEventCollector;
use crate::error::MidiConnectError;
use crate::midi::MidiEvent;
use midir::{Ignore, MidiInput, MidiInputConnection};
use std::sync::Arc;

/// Opens every available hardware MIDI input port and forwards its events
/// into the collector, stamped with the collector's clock.
///
/// Invalid or unsupported messages are discarded at the port. The returned
/// connections keep the ports open; drop them to disconnect.
pub fn connect_midi_inputs(
    collector: Arc<MidiEventCollector>,
) -> Result<Vec<MidiInputConnection<()>>, MidiConnectError> {
    let ports = {
        let mut probe = MidiInput::new("processor-player probe")?;
        probe.ignore(Ignore::ActiveSense);
        probe.ports()
    };

    let mut connections = Vec::with_capacity(ports.len());
    for port in &ports {
        let mut midi_in = MidiInput::new("processor-player input")?;
        midi_in.ignore(Ignore::ActiveSense);

        if let Ok(name) = midi_in.port_name(port) {
            log::info!("connecting MIDI input: {name}");
        }

        let collector = Arc::clone(&collector);
        let connection = midi_in
            .connect(
                port,
                "processor-player-read",
                move |_, message: &[u8], _| {
                    let event = MidiEvent::from_raw(message);
                    if event.is_invalid() {
                        return;
                    }
                    collector.push_now(event);
                },
                (),
            )
            .map_err(|err| MidiConnectError::Connect(err.to_string()))?;
        connections.push(connection);
    }

    Ok(connections)
}
