use midir::{Ignore, MidiInput, MidiInputConnection};
use tracing::{debug, info};

use super::{InputAdapter, InputError};
use crate::dispatch::CommandSink;
use crate::types::command::Command;
use crate::types::device::find_device;

const CLIENT_NAME: &str = "serpentone-input";

/// MIDI message types we care about
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
    Unknown,
}

impl MidiMessage {
    /// Parse raw MIDI bytes into a message
    /// Handles standard MIDI protocol: [status, data1, data2]
    pub fn parse(bytes: &[u8]) -> Self {
        let &[status, note, velocity, ..] = bytes else {
            return MidiMessage::Unknown;
        };
        let channel = status & 0x0F;
        let note = note & 0x7F;
        let velocity = velocity & 0x7F;

        match status & 0xF0 {
            // Note On with velocity 0 is a Note Off
            0x90 if velocity == 0 => MidiMessage::NoteOff { channel, note },
            0x90 => MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            },
            0x80 => MidiMessage::NoteOff { channel, note },
            _ => MidiMessage::Unknown,
        }
    }

    /// Every channel is accepted
    pub fn to_command(self) -> Option<Command> {
        match self {
            MidiMessage::NoteOn { note, velocity, .. } => Some(Command::note_on(note, velocity)),
            MidiMessage::NoteOff { note, .. } => Some(Command::note_off(note)),
            MidiMessage::Unknown => None,
        }
    }
}

/// MIDI keyboard adapter backed by midir.
/// Commands are sent from midir's driver callback thread.
pub struct MidiAdapter {
    port: String,
    connection: Option<MidiInputConnection<()>>,
    /// Client handed back when the connection closes; dropped with the adapter
    client: Option<MidiInput>,
}

impl MidiAdapter {
    /// `port` is an index or case-insensitive name substring
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            connection: None,
            client: None,
        }
    }

    /// List all available MIDI input devices
    pub fn list_devices() -> Result<Vec<String>, InputError> {
        let midi_in = MidiInput::new("serpentone-list").map_err(|e| InputError::MidiBackend(e.to_string()))?;
        Ok(midi_in
            .ports()
            .iter()
            .filter_map(|port| midi_in.port_name(port).ok())
            .collect())
    }
}

impl InputAdapter for MidiAdapter {
    fn name(&self) -> &str {
        "MIDI"
    }

    fn listen(&mut self, sink: CommandSink) -> Result<(), InputError> {
        if self.connection.is_some() {
            return Err(InputError::AlreadyListening(self.name().to_string()));
        }

        let mut midi_in = MidiInput::new(CLIENT_NAME).map_err(|e| InputError::MidiBackend(e.to_string()))?;
        midi_in.ignore(Ignore::All);

        let ports = midi_in.ports();
        if ports.is_empty() {
            return Err(InputError::NoMidiDevices);
        }
        let names: Vec<String> = ports
            .iter()
            .map(|port| midi_in.port_name(port).unwrap_or_else(|_| "Unknown".to_string()))
            .collect();
        let index =
            find_device(&names, &self.port).ok_or_else(|| InputError::MidiDeviceNotFound(self.port.clone()))?;

        let connection = midi_in
            .connect(
                &ports[index],
                CLIENT_NAME,
                move |_timestamp, bytes, _| {
                    if let Some(command) = MidiMessage::parse(bytes).to_command() {
                        sink.send(command);
                    }
                },
                (),
            )
            .map_err(|e| InputError::MidiBackend(format!("failed to connect to MIDI port: {}", e)))?;

        info!(port = %names[index], "listening for MIDI input");
        self.connection = Some(connection);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(connection) = self.connection.take() {
            let (client, ()) = connection.close();
            self.client = Some(client);
            debug!("MIDI input closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_note_on() {
        let msg = MidiMessage::parse(&[0x90, 60, 100]);
        assert_eq!(
            msg,
            MidiMessage::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100
            }
        );
        assert_eq!(msg.to_command(), Some(Command::note_on(60, 100)));
    }

    #[test]
    fn test_parse_note_off_ignores_velocity() {
        let msg = MidiMessage::parse(&[0x80, 60, 64]);
        assert_eq!(msg, MidiMessage::NoteOff { channel: 0, note: 60 });
        assert_eq!(msg.to_command(), Some(Command::note_off(60)));
    }

    #[test]
    fn test_note_on_velocity_zero_is_note_off() {
        let msg = MidiMessage::parse(&[0x90, 60, 0]);
        assert_eq!(msg.to_command(), Some(Command::note_off(60)));
    }

    #[test]
    fn test_every_channel_is_accepted() {
        for channel in 0..16u8 {
            assert_eq!(
                MidiMessage::parse(&[0x90 | channel, 64, 90]).to_command(),
                Some(Command::note_on(64, 90))
            );
            assert_eq!(
                MidiMessage::parse(&[0x80 | channel, 64, 0]).to_command(),
                Some(Command::note_off(64))
            );
        }
    }

    #[test]
    fn test_other_messages_are_ignored() {
        assert_eq!(MidiMessage::parse(&[0xB0, 123, 0]).to_command(), None); // all notes off CC
        assert_eq!(MidiMessage::parse(&[0xE0, 0, 64]).to_command(), None); // pitch bend
        assert_eq!(MidiMessage::parse(&[0xF8]).to_command(), None); // clock
        assert_eq!(MidiMessage::parse(&[0x90, 60]).to_command(), None); // truncated
        assert_eq!(MidiMessage::parse(&[]).to_command(), None);
    }
}
