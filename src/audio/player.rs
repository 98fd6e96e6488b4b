//! cpal audio output.
//!
//! The render worker queues mixed PCM chunks through a crossbeam channel; the
//! cpal callback pulls them in order and outputs silence on underrun or while
//! paused. `cpal::Stream` is not `Send`, so [`CpalOutput`] stays on the thread
//! that created it and only the [`CpalAudioSink`] end moves to the worker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam::channel;

use crate::audio::mixer::samples_from_payload;
use crate::audio::sink::{AudioSink, AudioSpec};

/// Output channel count requested from the device
const PREFERRED_CHANNELS: u16 = 2;

/// Error type for audio output
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("No audio device available")]
    NoDevice,
    #[error("cpal default config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
    #[error("cpal supported configs error: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),
    #[error("cpal build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),
    #[error("cpal play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
    #[error("Unsupported device sample format: {0:?}")]
    UnsupportedFormat(SampleFormat),
    #[error("Audio output is closed")]
    Disconnected,
}

/// Live cpal output stream. Dropping it stops playback.
pub struct CpalOutput {
    _stream: Stream,
    spec: AudioSpec,
    tx: channel::Sender<Vec<f32>>,
    paused: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default output device, preferring `preferred_rate` stereo.
    /// Falls back to the device default configuration when that rate is not
    /// supported; the chosen format is reported by the sink handed out by [`CpalOutput::sink`].
    pub fn open(preferred_rate: u32) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoDevice)?;

        let (config, sample_format) = choose_config(&device, preferred_rate)?;
        let spec = AudioSpec {
            sample_rate: config.sample_rate.0,
            channels: config.channels,
        };

        let (tx, rx) = channel::unbounded();
        let paused = Arc::new(AtomicBool::new(false));
        let feeder = Feeder::new(rx, Arc::clone(&paused));

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, feeder)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, feeder)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, feeder)?,
            other => return Err(AudioError::UnsupportedFormat(other)),
        };

        // Playing from the start; pause/resume only toggle the feeder
        stream.play()?;

        tracing::info!(
            "Audio output opened: {} Hz, {} channels, {:?}",
            spec.sample_rate,
            spec.channels,
            sample_format
        );

        Ok(Self {
            _stream: stream,
            spec,
            tx,
            paused,
        })
    }

    /// Sendable queue handle for the render worker
    pub fn sink(&self) -> CpalAudioSink {
        CpalAudioSink {
            tx: self.tx.clone(),
            paused: Arc::clone(&self.paused),
            spec: self.spec,
        }
    }
}

fn choose_config(
    device: &Device,
    preferred_rate: u32,
) -> Result<(StreamConfig, SampleFormat), AudioError> {
    let rate = cpal::SampleRate(preferred_rate);
    let mut fallback = None;

    for range in device.supported_output_configs()? {
        if range.channels() != PREFERRED_CHANNELS
            || range.min_sample_rate() > rate
            || range.max_sample_rate() < rate
        {
            continue;
        }
        let format = range.sample_format();
        if format == SampleFormat::F32 {
            return Ok((range.with_sample_rate(rate).config(), format));
        }
        if fallback.is_none() && matches!(format, SampleFormat::I16 | SampleFormat::U16) {
            fallback = Some((range.with_sample_rate(rate).config(), format));
        }
    }

    if let Some(found) = fallback {
        return Ok(found);
    }

    let default_config = device.default_output_config()?;
    tracing::debug!(
        "Device does not support {} Hz stereo, using default {:?}",
        preferred_rate,
        default_config
    );
    let format = default_config.sample_format();
    Ok((default_config.config(), format))
}

fn build_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut feeder: Feeder,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            // Real-time thread: no locks. Spent chunks are freed here.
            if feeder.is_paused() {
                data.fill(T::EQUILIBRIUM);
                return;
            }
            for out in data.iter_mut() {
                *out = T::from_sample(feeder.next_sample());
            }
        },
        |err| tracing::warn!("Audio stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

/// Pulls queued chunks sample by sample inside the cpal callback
struct Feeder {
    rx: channel::Receiver<Vec<f32>>,
    current: Vec<f32>,
    position: usize,
    paused: Arc<AtomicBool>,
}

impl Feeder {
    fn new(rx: channel::Receiver<Vec<f32>>, paused: Arc<AtomicBool>) -> Self {
        Self {
            rx,
            current: Vec::new(),
            position: 0,
            paused,
        }
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Next queued sample, or silence on underrun
    fn next_sample(&mut self) -> f32 {
        while self.position >= self.current.len() {
            match self.rx.try_recv() {
                Ok(chunk) => {
                    self.current = chunk;
                    self.position = 0;
                }
                Err(_) => return 0.0,
            }
        }
        let sample = self.current[self.position];
        self.position += 1;
        sample
    }
}

/// [`AudioSink`] end of a [`CpalOutput`]
#[derive(Debug, Clone)]
pub struct CpalAudioSink {
    tx: channel::Sender<Vec<f32>>,
    paused: Arc<AtomicBool>,
    spec: AudioSpec,
}

impl AudioSink for CpalAudioSink {
    fn spec(&self) -> AudioSpec {
        self.spec
    }

    fn queue(&mut self, payload: &[u8]) -> Result<(), AudioError> {
        let samples: Vec<f32> = samples_from_payload(payload).collect();
        self.tx
            .send(samples)
            .map_err(|_| AudioError::Disconnected)
    }

    fn pause(&mut self) {
        self.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&mut self) {
        self.paused.store(false, Ordering::Relaxed);
    }
}
