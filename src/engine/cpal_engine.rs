use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{bounded, unbounded, Sender};
use std::time::Duration;
use tracing::{debug, error, info};

use super::mixer::{EngineCommand, Mixer};
use super::{EngineError, Instrument, Placement, SoundEngine, VoiceHandle};
use crate::types::device::find_device;

/// How long boot, load and quit wait for the audio callback to answer
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// Sound engine rendering voices into a cpal output stream.
///
/// The stream is created by `boot`, so the engine must be constructed on
/// the thread that will drive it: some platforms cannot move a live stream.
pub struct CpalEngine {
    device: Option<String>,
    handshake_timeout: Duration,
    stream: Option<cpal::Stream>,
    commands: Option<Sender<EngineCommand>>,
    loaded: Vec<String>,
    next_handle: u64,
}

impl CpalEngine {
    /// `device` is an index or name substring; `None` uses the host default
    pub fn new(device: Option<String>) -> Self {
        Self {
            device,
            handshake_timeout: HANDSHAKE_TIMEOUT,
            stream: None,
            commands: None,
            loaded: Vec::new(),
            next_handle: 0,
        }
    }

    /// List available audio output devices
    pub fn list_output_devices() -> Result<Vec<String>, EngineError> {
        let host = cpal::default_host();

        let mut devices: Vec<String> = host
            .output_devices()
            .map_err(backend)?
            .filter_map(|device| device.description().ok().map(|desc| desc.name().to_string()))
            .collect();

        if let Some(default_device) = host.default_output_device() {
            if let Ok(default_desc) = default_device.description() {
                let default_name = default_desc.name().to_string();
                if !devices.contains(&default_name) {
                    devices.push(default_name);
                }
            }
        }

        Ok(devices)
    }

    fn select_device(&self, host: &cpal::Host) -> Result<cpal::Device, EngineError> {
        let Some(search) = &self.device else {
            return host.default_output_device().ok_or(EngineError::NoDevice);
        };

        let devices: Vec<cpal::Device> = host.output_devices().map_err(backend)?.collect();
        let names: Vec<String> = devices
            .iter()
            .map(|device| {
                device
                    .description()
                    .map(|desc| desc.name().to_string())
                    .unwrap_or_default()
            })
            .collect();

        let index = find_device(&names, search)
            .ok_or_else(|| EngineError::DeviceNotFound(search.clone()))?;
        devices
            .into_iter()
            .nth(index)
            .ok_or_else(|| EngineError::DeviceNotFound(search.clone()))
    }

    /// Send a request carrying an ack channel and wait for the callback to answer
    fn handshake<T>(
        &self,
        what: &'static str,
        request: impl FnOnce(Sender<T>) -> EngineCommand,
    ) -> Result<T, EngineError> {
        let commands = self.commands.as_ref().ok_or(EngineError::NotRunning)?;
        let (ack_tx, ack_rx) = bounded(1);
        commands
            .send(request(ack_tx))
            .map_err(|_| EngineError::NotRunning)?;
        ack_rx
            .recv_timeout(self.handshake_timeout)
            .map_err(|_| EngineError::Timeout(what, self.handshake_timeout))
    }
}

impl SoundEngine for CpalEngine {
    fn boot(&mut self) -> Result<(), EngineError> {
        let host = cpal::default_host();
        let device = self.select_device(&host)?;
        let supported = device.default_output_config().map_err(backend)?;
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();
        let channels = config.channels as usize;

        let (tx, rx) = unbounded();
        let mixer = Mixer::new(config.sample_rate as f32, rx);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, mixer, channels)?,
            cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, mixer, channels)?,
            cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, mixer, channels)?,
            other => return Err(EngineError::UnsupportedFormat(format!("{:?}", other))),
        };
        stream.play().map_err(backend)?;

        self.stream = Some(stream);
        self.commands = Some(tx);
        self.handshake("boot", EngineCommand::Ping)?;

        info!(channels, sample_rate = config.sample_rate as f32, "audio engine booted");
        Ok(())
    }

    fn load_instruments(&mut self, instruments: &[Instrument]) -> Result<(), EngineError> {
        let instruments = instruments.to_vec();
        let names = instruments.iter().map(|i| i.name.clone()).collect();
        // The replaced table comes back here and is dropped off the audio thread
        let _previous = self.handshake("instrument load", |ack| EngineCommand::Load { instruments, ack })?;
        self.loaded = names;
        debug!(count = self.loaded.len(), "instruments loaded");
        Ok(())
    }

    fn add_voice(
        &mut self,
        instrument: &Instrument,
        frequency: f64,
        amplitude: f64,
        placement: Placement,
    ) -> Result<VoiceHandle, EngineError> {
        let index = self
            .loaded
            .iter()
            .position(|name| *name == instrument.name)
            .ok_or_else(|| EngineError::UnknownInstrument(instrument.name.clone()))?;
        let commands = self.commands.as_ref().ok_or(EngineError::NotRunning)?;

        self.next_handle += 1;
        let handle = VoiceHandle(self.next_handle);
        commands
            .send(EngineCommand::AddVoice {
                handle,
                instrument: index,
                frequency: frequency as f32,
                amplitude: amplitude as f32,
                placement,
            })
            .map_err(|_| EngineError::NotRunning)?;
        Ok(handle)
    }

    fn free(&mut self, handle: VoiceHandle) {
        let sent = self
            .commands
            .as_ref()
            .map(|commands| commands.send(EngineCommand::Release(handle)).is_ok())
            .unwrap_or(false);
        if !sent {
            debug!(?handle, "free ignored, engine not running");
        }
    }

    fn quit(&mut self) -> Result<(), EngineError> {
        let result = self.handshake("quit", EngineCommand::Stop);
        self.commands = None;
        self.stream = None;
        self.loaded.clear();
        info!("audio engine stopped");
        result
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut mixer: Mixer,
    channels: usize,
) -> Result<cpal::Stream, EngineError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    // Pre-allocate so the callback only grows the buffer on unusual sizes
    let mut buffer = vec![0.0f32; 1024 * channels];

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                if buffer.len() < data.len() {
                    buffer.resize(data.len(), 0.0);
                }
                let buffer = &mut buffer[..data.len()];
                mixer.process(buffer, channels);
                for (out, sample) in data.iter_mut().zip(buffer.iter()) {
                    *out = T::from_sample(*sample);
                }
            },
            |err| error!("audio stream error: {}", err),
            None,
        )
        .map_err(backend)
}

fn backend(err: impl std::fmt::Display) -> EngineError {
    EngineError::Backend(err.to_string())
}
