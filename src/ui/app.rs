//! Player window.
//!
//! Owns the [`Player`] and the [`FrameBuffer`] it renders into. Each frame the
//! window publishes its focus state to the render worker, uploads the frame
//! buffer to a texture when its generation changed, and draws the controls.

use std::path::PathBuf;
use std::sync::Arc;

use eframe::egui::*;
use eframe::{App, CreationContext};

use crate::audio::mixer::MAX_HOST_VOLUME;
use crate::core::config::PlaybackSettings;
use crate::playback::{Phase, PlaybackStatus, Player};
use crate::render::focus::SharedFocus;
use crate::render::sink::FrameBuffer;

/// Everything needed to open the player window
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub path: PathBuf,
    /// Host volume, 0..=128
    pub volume: i32,
    pub width: u32,
    pub height: u32,
    pub settings: PlaybackSettings,
    /// Start rendering as soon as the window opens
    pub autoplay: bool,
}

pub struct PlayerApp {
    player: Option<Player>,
    frame: Arc<FrameBuffer>,
    focus: SharedFocus,
    texture: Option<TextureHandle>,
    shown_generation: u64,
    volume: i32,
    setup_error: Option<String>,
}

impl PlayerApp {
    pub fn new(_cc: &CreationContext<'_>, options: LaunchOptions) -> Self {
        let frame = FrameBuffer::new(options.width, options.height);
        let focus = SharedFocus::default();

        let (player, setup_error) = match Player::create(
            &options.path,
            options.volume,
            Box::new(frame.sink()),
            Arc::new(focus.clone()),
            options.settings,
        ) {
            Ok(mut player) => {
                let mut setup_error = None;
                if options.autoplay {
                    if let Err(err) = player.start_render() {
                        setup_error = Some(err.to_string());
                    }
                }
                (Some(player), setup_error)
            }
            Err(err) => {
                tracing::error!("Failed to open {}: {}", options.path.display(), err);
                let code = err.code();
                let message = format!("{} (code {}): {}", code.description(), code.as_i32(), err);
                (None, Some(message))
            }
        };

        Self {
            player,
            frame,
            focus,
            texture: None,
            shown_generation: 0,
            volume: options.volume.clamp(0, MAX_HOST_VOLUME),
            setup_error,
        }
    }

    fn refresh_texture(&mut self, ctx: &Context) {
        let generation = self.frame.generation();
        if generation == self.shown_generation {
            return;
        }
        self.shown_generation = generation;

        let size = [self.frame.width() as usize, self.frame.height() as usize];
        let image = ColorImage::from_rgba_unmultiplied(size, &self.frame.to_rgba_top_down());
        match &mut self.texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("video_frame", image, TextureOptions::LINEAR))
            }
        }
    }

    fn controls(&mut self, ui: &mut Ui) {
        if let Some(error) = &self.setup_error {
            ui.colored_label(Color32::LIGHT_RED, error);
        }
        let Some(player) = self.player.as_mut() else {
            return;
        };

        ui.horizontal(|ui| {
            if ui
                .add_enabled(!player.render_started(), Button::new("Play"))
                .clicked()
            {
                if let Err(err) = player.start_render() {
                    tracing::warn!("Start render failed: {}", err);
                }
            }

            if ui
                .add(Slider::new(&mut self.volume, 0..=MAX_HOST_VOLUME).text("Volume"))
                .changed()
            {
                player.set_volume(self.volume);
            }
        });

        let stats = player.stats();
        let (video, audio) = player.buffered();
        ui.label(format!(
            "{} | {} | frames {} shown, {} skipped | buffered {} video, {} audio",
            phase_label(player.phase()),
            status_label(player.poll_state()),
            stats.frames_written,
            stats.frames_skipped,
            video,
            audio
        ));

        if let Some(info) = player.info() {
            if let Some(duration) = info.duration {
                ui.label(format!(
                    "{}x{} @ {:.2} fps, {}",
                    info.video.width,
                    info.video.height,
                    info.video.fps,
                    crate::core::time::format_time(duration)
                ));
            }
        }

        if player.poll_state() == PlaybackStatus::Finished {
            if let Some(error) = player.last_error() {
                let label = if player.was_abnormal_termination() {
                    format!("Decoding stopped: {} (code {})", error, player.last_error_code())
                } else {
                    format!("Playback stopped: {}", error)
                };
                ui.colored_label(Color32::LIGHT_RED, label);
            }
        }
    }
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "Idle",
        Phase::Prefill => "Buffering",
        Phase::AwaitingFill => "Waiting for buffers",
        Phase::Playing => "Playing",
        Phase::PausedByFocus => "Paused (window unfocused)",
        Phase::Draining => "Finishing",
        Phase::Completed => "Finished",
        Phase::Aborted => "Stopped",
    }
}

/// Host-facing status code, as polled by scripts driving the player
fn status_label(status: PlaybackStatus) -> String {
    let code = status.code();
    format!("status {} ({})", code.as_i32(), code.description())
}

impl App for PlayerApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        self.focus.set(ctx.input(|i| i.focused));
        self.refresh_texture(ctx);

        TopBottomPanel::bottom("controls")
            .resizable(false)
            .show(ctx, |ui| self.controls(ui));

        CentralPanel::default().show(ctx, |ui| {
            ui.centered_and_justified(|ui| match &self.texture {
                Some(texture) => {
                    ui.add(Image::from_texture(load::SizedTexture::from_handle(texture)).shrink_to_fit());
                }
                None => {
                    ui.label("No frame yet");
                }
            });
        });

        let running = self
            .player
            .as_ref()
            .is_some_and(|player| !player.phase().is_terminal());
        if running {
            ctx.request_repaint();
        }
    }
}
