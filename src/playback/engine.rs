//! Host-facing playback handle.
//!
//! A [`Player`] owns one pipeline: the decode producer thread, started on
//! creation, and the render thread, started by [`Player::start_render`]. Both
//! communicate only through [`SharedState`]. Dropping the player requests a
//! kill and joins both threads.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::audio::mixer::gain_from_host_level;
use crate::audio::player::{AudioError, CpalOutput};
use crate::audio::sink::AudioSink;
use crate::core::config::PlaybackSettings;
use crate::decode::producer::Producer;
use crate::decode::source::{DecodeError, MediaSource};
use crate::decode::stream_info::MediaInfo;
use crate::media::decoder::FfmpegSource;
use crate::playback::renderer::Renderer;
use crate::playback::state::{Phase, SharedState, StatsSnapshot};
use crate::render::focus::FocusProbe;
use crate::render::sink::PixelSink;

/// Numeric status codes exposed to hosts that poll integers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    VideoNotFinished = 1,
    DecoderInstanceAlreadyCreated = 2,
    DecoderNotCreated = 3,
    FileNotFound = 4,
    InvalidFile = 5,
    BitmapIsDisposed = 6,
    FailedToFindVideoStream = 7,
    FailedToFindAudioStream = 8,
    FailedToOpenAudioDevice = 9,
    InternalError = 10,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    pub fn description(self) -> &'static str {
        match self {
            ErrorCode::Success => "Successful operation",
            ErrorCode::VideoNotFinished => "Video still decoding",
            ErrorCode::DecoderInstanceAlreadyCreated => "Attempted to create secondary video decoder",
            ErrorCode::DecoderNotCreated => "Decoder has not been created",
            ErrorCode::FileNotFound => "File does not exist",
            ErrorCode::InvalidFile => "File is not a playable video",
            ErrorCode::BitmapIsDisposed => "Bitmap is disposed",
            ErrorCode::FailedToFindVideoStream => "Video file has no video streams",
            ErrorCode::FailedToFindAudioStream => "Video file has no audio streams",
            ErrorCode::FailedToOpenAudioDevice => "Failed to open an audio device",
            ErrorCode::InternalError => "An internal error has occured",
        }
    }
}

/// Error type for player setup and control
#[derive(Debug, thiserror::Error)]
pub enum PlayerError {
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Not a playable file: {0}")]
    InvalidFile(PathBuf),
    #[error("Pixel sink is disposed")]
    PixelSinkDisposed,
    #[error("No video stream found")]
    VideoStreamNotFound,
    #[error("No audio stream found")]
    AudioStreamNotFound,
    #[error("Audio device error: {0}")]
    AudioDevice(#[from] AudioError),
    #[error("Decode setup error: {0}")]
    Decode(DecodeError),
    #[error("Render already started")]
    RenderAlreadyStarted,
    #[error("Failed to spawn worker: {0}")]
    Spawn(#[from] io::Error),
}

impl From<DecodeError> for PlayerError {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::FileNotFound(path) => PlayerError::FileNotFound(path),
            DecodeError::NoVideoStream => PlayerError::VideoStreamNotFound,
            DecodeError::NoAudioStream => PlayerError::AudioStreamNotFound,
            other => PlayerError::Decode(other),
        }
    }
}

impl PlayerError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PlayerError::FileNotFound(_) => ErrorCode::FileNotFound,
            PlayerError::InvalidFile(_) => ErrorCode::InvalidFile,
            PlayerError::PixelSinkDisposed => ErrorCode::BitmapIsDisposed,
            PlayerError::VideoStreamNotFound => ErrorCode::FailedToFindVideoStream,
            PlayerError::AudioStreamNotFound => ErrorCode::FailedToFindAudioStream,
            PlayerError::AudioDevice(_) => ErrorCode::FailedToOpenAudioDevice,
            PlayerError::Decode(_) | PlayerError::RenderAlreadyStarted | PlayerError::Spawn(_) => {
                ErrorCode::InternalError
            }
        }
    }
}

/// Coarse status for polling hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Finished,
}

impl PlaybackStatus {
    pub fn code(self) -> ErrorCode {
        match self {
            PlaybackStatus::Playing => ErrorCode::VideoNotFinished,
            PlaybackStatus::Finished => ErrorCode::Success,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Worker {
    Decoder,
    Render,
}

/// Sets the worker's finished flag when the worker closure ends, including
/// by unwinding
struct FinishOnDrop {
    shared: Arc<SharedState>,
    worker: Worker,
}

impl Drop for FinishOnDrop {
    fn drop(&mut self) {
        let lifecycle = &self.shared.lifecycle;
        if thread::panicking() {
            match self.worker {
                Worker::Decoder => lifecycle.mark_bad_termination(-1, "decode worker panicked"),
                Worker::Render => lifecycle.record_error(-1, "render worker panicked"),
            }
            lifecycle.request_kill();
        }
        match self.worker {
            Worker::Decoder => lifecycle.mark_decoder_finished(),
            Worker::Render => lifecycle.mark_render_finished(),
        }
    }
}

/// Named worker thread, joined on drop
struct WorkerHandle {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    fn spawn<F>(name: &'static str, work: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = thread::Builder::new().name(name.to_string()).spawn(work)?;
        Ok(Self {
            name,
            handle: Some(handle),
        })
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("{} thread panicked", self.name);
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.join();
    }
}

/// One playback pipeline
pub struct Player {
    shared: Arc<SharedState>,
    info: Option<MediaInfo>,
    /// Built at creation, moved onto the render thread by `start_render`
    pending_render: Option<Renderer>,
    producer: Option<WorkerHandle>,
    render: Option<WorkerHandle>,
    /// Device stream, kept on the creating thread
    _output: Option<CpalOutput>,
}

impl Player {
    /// Open `path`, the default audio device, and start decoding ahead.
    ///
    /// `initial_volume` is in 0..=128. Fails before any thread is started.
    pub fn create<P: AsRef<Path>>(
        path: P,
        initial_volume: i32,
        pixel_sink: Box<dyn PixelSink>,
        focus: Arc<dyn FocusProbe>,
        settings: PlaybackSettings,
    ) -> Result<Self, PlayerError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PlayerError::FileNotFound(path.to_path_buf()));
        }
        if path.is_dir() {
            return Err(PlayerError::InvalidFile(path.to_path_buf()));
        }
        if !pixel_sink.is_valid() {
            return Err(PlayerError::PixelSinkDisposed);
        }

        let mut source = FfmpegSource::open(path, pixel_sink.width(), pixel_sink.height())?;
        let info = source.info().clone();

        let output = CpalOutput::open(info.audio.sample_rate)?;
        let audio_sink = output.sink();
        source.set_audio_target(audio_sink.spec());

        let mut player = Self::spawn(
            Box::new(source),
            initial_volume,
            pixel_sink,
            Box::new(audio_sink),
            focus,
            settings,
        )?;
        player.info = Some(info);
        player._output = Some(output);
        Ok(player)
    }

    /// Start a pipeline over caller-supplied collaborators
    pub fn from_parts(
        source: Box<dyn MediaSource>,
        initial_volume: i32,
        pixel_sink: Box<dyn PixelSink>,
        audio_sink: Box<dyn AudioSink>,
        focus: Arc<dyn FocusProbe>,
        settings: PlaybackSettings,
    ) -> Result<Self, PlayerError> {
        if !pixel_sink.is_valid() {
            return Err(PlayerError::PixelSinkDisposed);
        }
        Self::spawn(source, initial_volume, pixel_sink, audio_sink, focus, settings)
    }

    fn spawn(
        mut source: Box<dyn MediaSource>,
        initial_volume: i32,
        pixel_sink: Box<dyn PixelSink>,
        audio_sink: Box<dyn AudioSink>,
        focus: Arc<dyn FocusProbe>,
        settings: PlaybackSettings,
    ) -> Result<Self, PlayerError> {
        let shared = Arc::new(SharedState::new(gain_from_host_level(initial_volume)));
        let frame_len = pixel_sink.frame_len();
        let renderer = Renderer::new(
            Arc::clone(&shared),
            settings.clone(),
            pixel_sink,
            audio_sink,
            focus,
        );

        shared.lifecycle.set_phase(Phase::Prefill);
        let worker_shared = Arc::clone(&shared);
        let producer = WorkerHandle::spawn("aotplay-decode", move || {
            let _finished = FinishOnDrop {
                shared: Arc::clone(&worker_shared),
                worker: Worker::Decoder,
            };
            let exit = Producer::new(&worker_shared, &settings, frame_len).run(source.as_mut());
            tracing::debug!("Producer exited: {:?}", exit);
        })?;
        tracing::info!("Decode worker started");

        Ok(Self {
            shared,
            info: None,
            pending_render: Some(renderer),
            producer: Some(producer),
            render: None,
            _output: None,
        })
    }

    /// Start pacing and delivering units. Only the first call starts the
    /// render worker.
    pub fn start_render(&mut self) -> Result<(), PlayerError> {
        let mut renderer = self
            .pending_render
            .take()
            .ok_or(PlayerError::RenderAlreadyStarted)?;

        let worker_shared = Arc::clone(&self.shared);
        let handle = WorkerHandle::spawn("aotplay-render", move || {
            let _finished = FinishOnDrop {
                shared: worker_shared,
                worker: Worker::Render,
            };
            let exit = renderer.run();
            tracing::debug!("Render exited: {:?}", exit);
        })?;
        self.render = Some(handle);
        tracing::info!("Render worker started");
        Ok(())
    }

    /// Request a kill and join both workers. Safe to call more than once.
    pub fn close(&mut self) {
        if self.producer.is_none() && self.render.is_none() && self.pending_render.is_none() {
            return;
        }

        self.shared.lifecycle.request_kill();
        if let Some(mut producer) = self.producer.take() {
            producer.join();
        }
        if let Some(mut render) = self.render.take() {
            render.join();
        }
        if self.pending_render.take().is_some() {
            // render never ran; nothing else will set its flag
            self.shared.lifecycle.mark_render_finished();
        }
        tracing::info!("Player closed");
    }

    /// Host volume in 0..=128; applies to audio decoded from now on
    pub fn set_volume(&self, level: i32) {
        self.shared.volume.set(gain_from_host_level(level));
    }

    pub fn poll_state(&self) -> PlaybackStatus {
        if self.shared.lifecycle.is_completed() {
            PlaybackStatus::Finished
        } else {
            PlaybackStatus::Playing
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.lifecycle.last_error().map(|err| err.message)
    }

    /// 0 when no error was recorded
    pub fn last_error_code(&self) -> i32 {
        self.shared
            .lifecycle
            .last_error()
            .map_or(0, |err| err.code)
    }

    pub fn was_abnormal_termination(&self) -> bool {
        self.shared.lifecycle.was_bad_termination()
    }

    pub fn phase(&self) -> Phase {
        self.shared.lifecycle.phase()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// Buffered (video, audio) unit counts
    pub fn buffered(&self) -> (usize, usize) {
        (self.shared.video_len(), self.shared.audio_len())
    }

    /// Stream metadata; only known for players opened from a file
    pub fn info(&self) -> Option<&MediaInfo> {
        self.info.as_ref()
    }

    pub fn render_started(&self) -> bool {
        self.pending_render.is_none()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.close();
    }
}
