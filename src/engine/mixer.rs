use crossbeam_channel::{Receiver, Sender};

use super::{envelope::Envelope, oscillator::Oscillator, Instrument, Placement, VoiceHandle};
use crate::types::note::MAX_PITCH;

/// Fixed gain applied to the voice sum to leave headroom for chords
const HEADROOM: f32 = 0.25;

/// One slot per pitch plus room for releasing tails
pub const MAX_VOICES: usize = 2 * (MAX_PITCH as usize + 1);

/// Requests sent from the engine handle to the audio callback
pub enum EngineCommand {
    /// Answer as soon as the callback runs
    Ping(Sender<()>),
    /// Replace the instrument table and answer with the previous one,
    /// so it is dropped off the audio thread
    Load {
        instruments: Vec<Instrument>,
        ack: Sender<Vec<Instrument>>,
    },
    AddVoice {
        handle: VoiceHandle,
        instrument: usize,
        frequency: f32,
        amplitude: f32,
        placement: Placement,
    },
    Release(VoiceHandle),
    /// Silence everything, then answer
    Stop(Sender<()>),
}

/// One sounding voice: Oscillator → ring modulator → Envelope → gain
struct SoundingVoice {
    handle: VoiceHandle,
    carrier: Oscillator,
    modulator: Option<Oscillator>,
    envelope: Envelope,
    amplitude: f32,
}

impl SoundingVoice {
    fn new(
        sample_rate: f32,
        handle: VoiceHandle,
        instrument: &Instrument,
        frequency: f32,
        amplitude: f32,
    ) -> Self {
        Self {
            handle,
            carrier: Oscillator::new(sample_rate, instrument.wave, frequency),
            modulator: instrument
                .modulator
                .map(|m| Oscillator::new(sample_rate, m.wave, frequency * m.ratio)),
            envelope: Envelope::new(
                sample_rate,
                instrument.attack,
                instrument.decay,
                instrument.sustain,
                instrument.release,
            ),
            amplitude,
        }
    }

    fn next_sample(&mut self) -> f32 {
        let mut sample = self.carrier.next_sample();
        if let Some(modulator) = &mut self.modulator {
            sample *= modulator.next_sample();
        }
        sample * self.envelope.next_sample() * self.amplitude
    }
}

/// Audio-thread side of the engine.
/// Drains pending commands at the start of every buffer, then renders.
///
/// The voice list never grows past [`MAX_VOICES`], so rendering does not
/// allocate. When it is full the oldest voice is dropped for the new one.
pub struct Mixer {
    sample_rate: f32,
    instruments: Vec<Instrument>,
    voices: Vec<SoundingVoice>,
    commands: Receiver<EngineCommand>,
    stopped: bool,
}

impl Mixer {
    pub fn new(sample_rate: f32, commands: Receiver<EngineCommand>) -> Self {
        Self {
            sample_rate,
            instruments: Vec::new(),
            voices: Vec::with_capacity(MAX_VOICES),
            commands,
            stopped: false,
        }
    }

    /// Voices still rendering, including ones in release
    #[cfg(test)]
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    fn handle_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                EngineCommand::Ping(ack) => {
                    let _ = ack.try_send(());
                }
                EngineCommand::Load { instruments, ack } => {
                    let previous = std::mem::replace(&mut self.instruments, instruments);
                    let _ = ack.try_send(previous);
                }
                EngineCommand::AddVoice {
                    handle,
                    instrument,
                    frequency,
                    amplitude,
                    placement,
                } => {
                    if self.stopped {
                        continue;
                    }
                    let Some(instrument) = self.instruments.get(instrument) else {
                        continue;
                    };
                    let voice =
                        SoundingVoice::new(self.sample_rate, handle, instrument, frequency, amplitude);
                    // With a single placement in use the oldest voice sits at
                    // the end opposite the insertion point
                    match placement {
                        Placement::Head => {
                            if self.voices.len() == MAX_VOICES {
                                self.voices.pop();
                            }
                            self.voices.insert(0, voice);
                        }
                        Placement::Tail => {
                            if self.voices.len() == MAX_VOICES {
                                self.voices.remove(0);
                            }
                            self.voices.push(voice);
                        }
                    }
                }
                EngineCommand::Release(handle) => {
                    if let Some(voice) = self.voices.iter_mut().find(|v| v.handle == handle) {
                        voice.envelope.release();
                    }
                }
                EngineCommand::Stop(ack) => {
                    self.stopped = true;
                    self.voices.clear();
                    let _ = ack.try_send(());
                }
            }
        }
    }

    /// Render interleaved output; the mono voice sum goes to every channel
    pub fn process(&mut self, output: &mut [f32], channels: usize) {
        self.handle_commands();

        if self.stopped || self.voices.is_empty() || channels == 0 {
            output.fill(0.0);
            return;
        }

        for frame in output.chunks_mut(channels) {
            let mut sum = 0.0;
            for voice in &mut self.voices {
                sum += voice.next_sample();
            }
            frame.fill(sum * HEADROOM);
        }

        self.voices.retain(|v| !v.envelope.is_finished());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::waveform::Waveform;
    use crossbeam_channel::{bounded, unbounded};

    fn loaded_mixer() -> (Mixer, Sender<EngineCommand>) {
        let (tx, rx) = unbounded();
        let mut mixer = Mixer::new(1000.0, rx);
        let (ack_tx, ack_rx) = bounded(1);
        let mut instrument = Instrument::new("square", Waveform::Square);
        instrument.release = 0.01;
        tx.send(EngineCommand::Load {
            instruments: vec![instrument],
            ack: ack_tx,
        })
        .unwrap();
        mixer.process(&mut [0.0; 2], 2);
        assert_eq!(ack_rx.try_recv().unwrap(), Vec::new());
        (mixer, tx)
    }

    fn add(tx: &Sender<EngineCommand>, id: u64, placement: Placement) {
        tx.send(EngineCommand::AddVoice {
            handle: VoiceHandle(id),
            instrument: 0,
            frequency: 100.0,
            amplitude: 1.0,
            placement,
        })
        .unwrap();
    }

    #[test]
    fn test_ping_is_answered() {
        let (tx, rx) = unbounded();
        let mut mixer = Mixer::new(44100.0, rx);
        let (ack_tx, ack_rx) = bounded(1);
        tx.send(EngineCommand::Ping(ack_tx)).unwrap();
        mixer.process(&mut [0.0; 4], 2);
        assert!(ack_rx.try_recv().is_ok());
    }

    #[test]
    fn test_voice_produces_output_on_all_channels() {
        let (mut mixer, tx) = loaded_mixer();
        add(&tx, 1, Placement::Head);
        let mut output = vec![0.0; 200];
        mixer.process(&mut output, 2);
        assert_eq!(mixer.active_voices(), 1);
        assert!(output.iter().any(|s| s.abs() > 0.01));
        for frame in output.chunks(2) {
            assert_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn test_released_voice_is_removed_after_fade() {
        let (mut mixer, tx) = loaded_mixer();
        add(&tx, 1, Placement::Tail);
        add(&tx, 2, Placement::Head);
        mixer.process(&mut [0.0; 100], 1);
        tx.send(EngineCommand::Release(VoiceHandle(1))).unwrap();
        mixer.process(&mut [0.0; 100], 1);
        assert_eq!(mixer.active_voices(), 1);
    }

    #[test]
    fn test_unknown_instrument_is_ignored() {
        let (mut mixer, tx) = loaded_mixer();
        tx.send(EngineCommand::AddVoice {
            handle: VoiceHandle(7),
            instrument: 3,
            frequency: 100.0,
            amplitude: 1.0,
            placement: Placement::Head,
        })
        .unwrap();
        mixer.process(&mut [0.0; 10], 1);
        assert_eq!(mixer.active_voices(), 0);
    }

    #[test]
    fn test_stop_silences_and_answers() {
        let (mut mixer, tx) = loaded_mixer();
        add(&tx, 1, Placement::Head);
        mixer.process(&mut [0.0; 10], 1);

        let (ack_tx, ack_rx) = bounded(1);
        tx.send(EngineCommand::Stop(ack_tx)).unwrap();
        add(&tx, 2, Placement::Head);
        let mut output = vec![1.0; 10];
        mixer.process(&mut output, 1);

        assert!(ack_rx.try_recv().is_ok());
        assert_eq!(mixer.active_voices(), 0);
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_reload_hands_back_previous_table() {
        let (mut mixer, tx) = loaded_mixer();
        let (ack_tx, ack_rx) = bounded(1);
        tx.send(EngineCommand::Load {
            instruments: Instrument::builtins(),
            ack: ack_tx,
        })
        .unwrap();
        mixer.process(&mut [0.0; 2], 1);

        let previous = ack_rx.try_recv().unwrap();
        assert_eq!(previous.len(), 1);
        assert_eq!(previous[0].name, "square");
    }

    #[test]
    fn test_voice_list_never_grows_past_capacity() {
        let (mut mixer, tx) = loaded_mixer();
        let capacity = mixer.voices.capacity();
        for id in 0..(MAX_VOICES as u64 + 10) {
            add(&tx, id, Placement::Head);
        }
        mixer.process(&mut [0.0; 1], 1);
        assert_eq!(mixer.active_voices(), MAX_VOICES);
        assert_eq!(mixer.voices.capacity(), capacity);
        // Oldest voices made room for the newest
        assert_eq!(mixer.voices[0].handle, VoiceHandle(MAX_VOICES as u64 + 9));
        assert!(mixer.voices.iter().all(|v| v.handle.0 >= 10));

        for id in 1000..1005 {
            add(&tx, id, Placement::Tail);
        }
        mixer.process(&mut [0.0; 1], 1);
        assert_eq!(mixer.active_voices(), MAX_VOICES);
        assert_eq!(mixer.voices.last().unwrap().handle, VoiceHandle(1004));
    }
}
