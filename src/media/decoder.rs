//! FFmpeg-backed media source.
//!
//! Opens a container, decodes its first video and first audio stream, and
//! hands out units already converted for the sinks: BGRA at the pixel sink's
//! size, packed f32 at the audio sink's rate and channel count.

use std::collections::VecDeque;
use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg::format::{context::Input, sample, Pixel, Sample};
use ffmpeg::software::{resampling, scaling};
use ffmpeg::{codec, decoder, frame, media, ChannelLayout, Packet, Rational};

use crate::audio::sink::AudioSpec;
use crate::core::time::{self, Seconds};
use crate::decode::source::{DecodeError, DecodedUnit, MediaSource};
use crate::decode::stream_info::{AudioStreamInfo, MediaInfo, StreamInfo, VideoStreamInfo};
use crate::render::sink::BYTES_PER_PIXEL;

/// Container timestamps (start time, duration) are in microseconds
const AV_TIME_BASE: f64 = 1_000_000.0;

/// Capacity of each frame the resampler tail is flushed into
const TAIL_CHUNK: usize = 1024;

struct VideoLane {
    index: usize,
    decoder: decoder::Video,
    time_base: (i32, i32),
    scaler: Option<scaling::Context>,
    target_width: u32,
    target_height: u32,
}

struct AudioLane {
    index: usize,
    decoder: decoder::Audio,
    time_base: (i32, i32),
    resampler: Option<resampling::Context>,
    target: AudioSpec,
    /// End of the last audio unit handed out, stamps the resampler tail
    end: Option<Seconds>,
}

/// Demuxer plus one video and one audio decoder over a local file
pub struct FfmpegSource {
    input: Input,
    video: VideoLane,
    audio: AudioLane,
    info: MediaInfo,
    /// Container start time, subtracted from every unit
    start_offset: Seconds,
    /// Units decoded from one packet but not handed out yet
    pending: VecDeque<DecodedUnit>,
    /// Decoders have been drained after the last packet
    flushed: bool,
}

// SAFETY: the source is moved into the producer thread once and only ever
// used from there. The scaler and resampler hold raw pointers that are never
// shared.
unsafe impl Send for FfmpegSource {}

impl FfmpegSource {
    /// Open `path` and scale video to `width` x `height`.
    ///
    /// Audio resamples to the stream's own layout until
    /// [`set_audio_target`](Self::set_audio_target) is called.
    pub fn open<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Self, DecodeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DecodeError::FileNotFound(path.to_path_buf()));
        }

        ffmpeg::init()?;
        let input = ffmpeg::format::input(&path)?;

        let video_stream = input
            .streams()
            .find(|stream| stream.parameters().medium() == media::Type::Video)
            .ok_or(DecodeError::NoVideoStream)?;
        let audio_stream = input
            .streams()
            .find(|stream| stream.parameters().medium() == media::Type::Audio)
            .ok_or(DecodeError::NoAudioStream)?;

        let video_decoder = codec::context::Context::from_parameters(video_stream.parameters())?
            .decoder()
            .video()?;
        let audio_decoder = codec::context::Context::from_parameters(audio_stream.parameters())?
            .decoder()
            .audio()?;

        let video_time_base = rational_pair(video_stream.time_base());
        let audio_time_base = rational_pair(audio_stream.time_base());

        let fps = {
            let rate = video_stream.avg_frame_rate();
            if rate.denominator() != 0 {
                f64::from(rate)
            } else {
                0.0
            }
        };

        let native_spec = AudioSpec {
            sample_rate: audio_decoder.rate(),
            channels: audio_decoder.channels().max(1),
        };

        let start_offset = match input.start_time() {
            ts if ts == ffmpeg::ffi::AV_NOPTS_VALUE => time::ZERO,
            ts => ts as f64 / AV_TIME_BASE,
        };
        let duration = match input.duration() {
            d if d <= 0 => None,
            d => Some(d as f64 / AV_TIME_BASE),
        };

        let info = MediaInfo {
            video: VideoStreamInfo {
                stream_info: StreamInfo {
                    index: video_stream.index(),
                    codec_name: codec_name(video_decoder.id()),
                    time_base: video_time_base,
                },
                width: video_decoder.width(),
                height: video_decoder.height(),
                fps,
            },
            audio: AudioStreamInfo {
                stream_info: StreamInfo {
                    index: audio_stream.index(),
                    codec_name: codec_name(audio_decoder.id()),
                    time_base: audio_time_base,
                },
                sample_rate: native_spec.sample_rate,
                channels: native_spec.channels,
            },
            duration,
        };

        tracing::info!(
            "Opened {}: video {}x{} {} @ {:.2} fps, audio {} Hz x{} {}",
            path.display(),
            info.video.width,
            info.video.height,
            info.video.stream_info.codec_name,
            info.video.fps,
            info.audio.sample_rate,
            info.audio.channels,
            info.audio.stream_info.codec_name,
        );

        let video_index = video_stream.index();
        let audio_index = audio_stream.index();

        Ok(Self {
            input,
            video: VideoLane {
                index: video_index,
                decoder: video_decoder,
                time_base: video_time_base,
                scaler: None,
                target_width: width.max(1),
                target_height: height.max(1),
            },
            audio: AudioLane {
                index: audio_index,
                decoder: audio_decoder,
                time_base: audio_time_base,
                resampler: None,
                target: native_spec,
                end: None,
            },
            info,
            start_offset,
            pending: VecDeque::new(),
            flushed: false,
        })
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    /// Resample audio to the format the output device was opened with
    pub fn set_audio_target(&mut self, spec: AudioSpec) {
        if self.audio.target != spec {
            tracing::debug!(
                "Audio target {} Hz x{} -> {} Hz x{}",
                self.audio.target.sample_rate,
                self.audio.target.channels,
                spec.sample_rate,
                spec.channels
            );
            self.audio.target = spec;
            self.audio.resampler = None;
        }
    }

    /// Read one packet and decode whatever it yields. Returns false once the
    /// container is exhausted.
    fn read_packet(&mut self) -> Result<bool, DecodeError> {
        let mut packet = Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => {}
            Err(ffmpeg::Error::Eof) => return Ok(false),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                return Ok(true)
            }
            Err(err) => return Err(err.into()),
        }

        let stream = packet.stream();
        if stream == self.video.index {
            if let Err(err) = self.video.decoder.send_packet(&packet) {
                tracing::warn!("Skipping undecodable video packet: {}", err);
                return Ok(true);
            }
            self.drain_video()?;
        } else if stream == self.audio.index {
            if let Err(err) = self.audio.decoder.send_packet(&packet) {
                tracing::warn!("Skipping undecodable audio packet: {}", err);
                return Ok(true);
            }
            self.drain_audio()?;
        }
        Ok(true)
    }

    /// Signal end of input to both decoders and collect their last frames
    fn flush(&mut self) -> Result<(), DecodeError> {
        tracing::debug!("Flushing decoders");
        // A decoder that never got a packet rejects EOF; nothing to drain then
        if self.video.decoder.send_eof().is_ok() {
            self.drain_video()?;
        }
        if self.audio.decoder.send_eof().is_ok() {
            self.drain_audio()?;
        }
        let tail = self.audio.drain_resampler();
        if !tail.is_empty() {
            tracing::debug!("Resampler tail of {} samples", tail.len());
            let timestamp = self.audio.end.unwrap_or(time::ZERO);
            self.pending.push_back(DecodedUnit::Audio {
                samples: tail,
                timestamp,
            });
        }
        self.flushed = true;
        Ok(())
    }

    fn drain_video(&mut self) -> Result<(), DecodeError> {
        let mut decoded = frame::Video::empty();
        loop {
            match self.video.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let pixels = self.video.convert(&decoded)?;
                    let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
                    let timestamp = self.relative(pts, self.video.time_base);
                    self.pending
                        .push_back(DecodedUnit::Video { pixels, timestamp });
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    return Ok(())
                }
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn drain_audio(&mut self) -> Result<(), DecodeError> {
        let mut decoded = frame::Audio::empty();
        loop {
            match self.audio.decoder.receive_frame(&mut decoded) {
                Ok(()) => {
                    let samples = self.audio.convert(&decoded)?;
                    if samples.is_empty() {
                        continue;
                    }
                    let pts = decoded.timestamp().or(decoded.pts()).unwrap_or(0);
                    let timestamp = self.relative(pts, self.audio.time_base);
                    let span = samples_duration(samples.len(), self.audio.target);
                    self.audio.end = Some(timestamp + span);
                    self.pending
                        .push_back(DecodedUnit::Audio { samples, timestamp });
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    return Ok(())
                }
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn relative(&self, pts: i64, time_base: (i32, i32)) -> Seconds {
        time::from_rational(pts, time_base.0, time_base.1) - self.start_offset
    }
}

impl MediaSource for FfmpegSource {
    fn next_unit(&mut self) -> Result<Option<DecodedUnit>, DecodeError> {
        loop {
            if let Some(unit) = self.pending.pop_front() {
                return Ok(Some(unit));
            }
            if self.flushed {
                return Ok(None);
            }
            if !self.read_packet()? {
                self.flush()?;
            }
        }
    }
}

impl VideoLane {
    /// Scale to the target size in BGRA, rows tightly packed
    fn convert(&mut self, decoded: &frame::Video) -> Result<Vec<u8>, DecodeError> {
        let (format, width, height) = (decoded.format(), decoded.width(), decoded.height());
        let stale = self.scaler.as_ref().map_or(true, |scaler| {
            let input = scaler.input();
            input.format != format || input.width != width || input.height != height
        });
        if stale {
            self.scaler = Some(scaling::Context::get(
                format,
                width,
                height,
                Pixel::BGRA,
                self.target_width,
                self.target_height,
                scaling::Flags::BILINEAR,
            )?);
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| DecodeError::Backend("scaler unavailable".into()))?;

        let mut scaled = frame::Video::empty();
        scaler.run(decoded, &mut scaled)?;

        let row_len = self.target_width as usize * BYTES_PER_PIXEL;
        let stride = scaled.stride(0);
        let data = scaled.data(0);
        let mut pixels = Vec::with_capacity(row_len * self.target_height as usize);
        for row in data.chunks(stride).take(self.target_height as usize) {
            pixels.extend_from_slice(&row[..row_len.min(row.len())]);
        }
        Ok(pixels)
    }
}

impl AudioLane {
    /// Resample to packed f32 in the target layout
    fn convert(&mut self, decoded: &frame::Audio) -> Result<Vec<f32>, DecodeError> {
        let format = decoded.format();
        let rate = decoded.rate();
        let layout = match decoded.channel_layout() {
            layout if layout.is_empty() => ChannelLayout::default(i32::from(decoded.channels())),
            layout => layout,
        };

        let stale = self.resampler.as_ref().map_or(true, |resampler| {
            let input = resampler.input();
            input.format != format || input.rate != rate || input.channel_layout != layout
        });
        if stale {
            self.resampler = Some(resampling::Context::get(
                format,
                layout,
                rate,
                Sample::F32(sample::Type::Packed),
                target_layout(self.target.channels),
                self.target.sample_rate,
            )?);
        }
        let resampler = self
            .resampler
            .as_mut()
            .ok_or_else(|| DecodeError::Backend("resampler unavailable".into()))?;

        let mut resampled = frame::Audio::empty();
        resampler.run(decoded, &mut resampled)?;
        Ok(packed_samples(&resampled, self.target.channels))
    }

    /// Samples still held by the resampler once the decoder is drained
    fn drain_resampler(&mut self) -> Vec<f32> {
        match self.resampler.as_mut() {
            Some(resampler) => resampler_tail(resampler, self.target.channels),
            None => Vec::new(),
        }
    }
}

/// Flush a resampler until it yields nothing more. An error ends the drain.
fn resampler_tail(resampler: &mut resampling::Context, channels: u16) -> Vec<f32> {
    let output = *resampler.output();
    let mut tail = Vec::new();
    loop {
        let mut resampled = frame::Audio::new(output.format, TAIL_CHUNK, output.channel_layout);
        match resampler.flush(&mut resampled) {
            Ok(_) if resampled.samples() > 0 => {
                tail.extend(packed_samples(&resampled, channels));
            }
            _ => return tail,
        }
    }
}

fn packed_samples(resampled: &frame::Audio, channels: u16) -> Vec<f32> {
    let count = resampled.samples() * channels as usize;
    resampled
        .data(0)
        .chunks_exact(std::mem::size_of::<f32>())
        .take(count)
        .map(|bytes| f32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .collect()
}

/// Play time of `len` interleaved samples
fn samples_duration(len: usize, spec: AudioSpec) -> Seconds {
    let frames = len / usize::from(spec.channels.max(1));
    frames as f64 / f64::from(spec.sample_rate.max(1))
}

fn target_layout(channels: u16) -> ChannelLayout {
    match channels {
        1 => ChannelLayout::MONO,
        2 => ChannelLayout::STEREO,
        n => ChannelLayout::default(i32::from(n)),
    }
}

fn rational_pair(rational: Rational) -> (i32, i32) {
    (rational.numerator(), rational.denominator())
}

fn codec_name(id: codec::Id) -> String {
    format!("{:?}", id).to_lowercase()
}
