// Submodules
mod keyboard_handlers;
mod message;

// Re-exports
pub use message::Message;

use iced_custom as iced;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[allow(unused_imports)]
use log::{Level, trace, debug, info, warn, error};

use iced::widget::canvas;
use iced::{keyboard, window, Color, Element, Length, Size, Subscription, Task, Theme};

use crate::build_info::BuildInfo;
use crate::config::{CONFIG, SETTINGS_PATH};
use crate::detection::script::ScriptedDetector;
use crate::detection::synthetic::SyntheticDetector;
use crate::detection::{Detector, Frame};
use crate::logging::{self, LogBuffer};
use crate::orientation::SweepOrientation;
use crate::pipeline::{HudPipeline, PipelineConfig};
use crate::render::{DrawList, RenderOutcome};
use crate::settings::UserSettings;
use crate::widgets::hud_canvas::HudCanvas;

use keyboard_handlers::{action_for_key, KeyAction};

pub const APP_NAME: &str = "arhud";

const BACKGROUND: Color = Color { r: 0.03, g: 0.04, b: 0.05, a: 1.0 };

/// Everything `main` resolved from the command line.
pub struct LaunchOptions {
    pub settings: UserSettings,
    pub script: Option<PathBuf>,
    pub markers: Option<PathBuf>,
    pub simulate_orientation: bool,
    pub log_buffer: LogBuffer,
}

pub struct ArHud {
    pipeline: HudPipeline,
    frame: DrawList,                        // Last rendered HUD frame, replayed by the canvas
    settings: UserSettings,
    capture_size: (u32, u32),
    sweep: Option<SweepOrientation>,        // Stands in for a device orientation sensor
    started: Instant,
    log_buffer: LogBuffer,
    surface_ready: bool,
}

fn make_detector(script: Option<&PathBuf>) -> Box<dyn Detector> {
    if let Some(path) = script {
        match ScriptedDetector::load(path) {
            Ok(detector) => return Box::new(detector),
            Err(e) => error!("{}; falling back to the synthetic scene", e),
        }
    }
    Box::new(SyntheticDetector::default())
}

async fn read_text(path: PathBuf) -> Result<String, String> {
    tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))
}

impl ArHud {
    pub fn new(options: LaunchOptions) -> (Self, Task<Message>) {
        let LaunchOptions { settings, script, markers, simulate_orientation, log_buffer } = options;
        let config = PipelineConfig::from_settings(&settings);

        let mut pipeline = match HudPipeline::with_detector(config, make_detector(script.as_ref())) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                error!("Running without a detector: {}", e);
                HudPipeline::new(config)
            }
        };
        pipeline.set_viewport(CONFIG.window_width as f32, CONFIG.window_height as f32);

        let task = match markers {
            Some(path) => {
                info!("Loading external markers from {}", path.display());
                Task::perform(read_text(path), Message::ExternalMarkersLoaded)
            }
            None => Task::none(),
        };

        let app = Self {
            pipeline,
            frame: DrawList::new(),
            settings,
            capture_size: (CONFIG.capture_width, CONFIG.capture_height),
            sweep: simulate_orientation.then(SweepOrientation::default),
            started: Instant::now(),
            log_buffer,
            surface_ready: false,
        };
        (app, task)
    }

    pub fn title(&self) -> String {
        format!("ARHud {}", BuildInfo::display_version())
    }

    /// The frame handed to the detector. There is no camera backend; the
    /// bundled detectors ignore the pixels.
    fn capture_frame(&self) -> Frame {
        let (width, height) = self.capture_size;
        Frame::from_pixel(width, height, image::Rgba([0, 0, 0, 255]))
    }

    fn on_tick(&mut self, now: Instant) -> Task<Message> {
        self.pipeline.tick(now);

        let task = if self.pipeline.wants_frame(now) {
            let frame = self.capture_frame();
            match self.pipeline.request_detection(frame, now) {
                Some(ticket) => Task::perform(ticket, Message::DetectionFinished),
                None => Task::none(),
            }
        } else {
            Task::none()
        };

        self.frame.clear();
        match self.pipeline.render(&mut self.frame) {
            RenderOutcome::Drawn(stats) => {
                if !self.surface_ready {
                    debug!("Draw surface ready");
                    self.surface_ready = true;
                }
                trace!("Frame: {} drawn, {} hidden, {} culled", stats.drawn, stats.hidden, stats.culled);
            }
            RenderOutcome::SurfaceUnavailable => {
                trace!("Draw surface not ready, retrying next frame");
            }
        }
        task
    }

    fn save_settings(&mut self) {
        let view = *self.pipeline.controls().view();
        self.settings.stereo = view.stereo;
        self.settings.theme = view.theme.name().to_string();
        self.settings.reference_overlays = view.reference_overlays;
        let result = match SETTINGS_PATH.get() {
            Some(path) => self.settings.save_to(Path::new(path)),
            None => self.settings.save(),
        };
        match result {
            Ok(()) => info!("Settings saved"),
            Err(e) => error!("Failed to save settings: {}", e),
        }
    }

    pub fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::Tick(now) => self.on_tick(now),
            Message::DetectionFinished(reply) => {
                self.pipeline.apply_reply(reply, Instant::now());
                Task::none()
            }
            Message::Resized(size) => {
                debug!("Window resized to {}x{}", size.width, size.height);
                self.pipeline.set_viewport(size.width, size.height);
                Task::none()
            }
            Message::KeyPressed(key, modifiers) => match action_for_key(&key, modifiers) {
                Some(KeyAction::Command(command)) => {
                    self.pipeline.apply_command(command);
                    Task::none()
                }
                Some(KeyAction::ExportDebugLogs) => self.update(Message::ExportDebugLogs),
                Some(KeyAction::SaveSettings) => self.update(Message::SaveSettings),
                Some(KeyAction::Quit) => self.update(Message::Quit),
                None => Task::none(),
            },
            Message::OrientationTick(now) => {
                if let Some(sweep) = self.sweep {
                    let elapsed = now.saturating_duration_since(self.started);
                    self.pipeline.push_orientation(sweep.sample_at(elapsed));
                }
                Task::none()
            }
            Message::ExternalMarkersLoaded(result) => {
                match result.and_then(|json| {
                    self.pipeline
                        .set_external_markers_json(&json, Instant::now())
                        .map_err(|e| e.to_string())
                }) {
                    Ok(report) => info!("Loaded {} external markers", report.spawned.len() + report.matched()),
                    Err(e) => warn!("External markers not loaded: {}", e),
                }
                Task::none()
            }
            Message::ExportDebugLogs => {
                match logging::export_debug_logs(APP_NAME, Arc::clone(&self.log_buffer)) {
                    Ok(path) => info!("Debug logs exported to {}", path.display()),
                    Err(e) => error!("Failed to export debug logs: {}", e),
                }
                Task::none()
            }
            Message::SaveSettings => {
                self.save_settings();
                Task::none()
            }
            Message::Quit => {
                self.pipeline.dispose();
                iced::exit()
            }
        }
    }

    pub fn view(&self) -> Element<'_, Message> {
        canvas(HudCanvas::new(&self.frame, BACKGROUND))
            .width(Length::Fill)
            .height(Length::Fill)
            .into()
    }

    pub fn subscription(&self) -> Subscription<Message> {
        let mut subscriptions = vec![
            window::frames().map(Message::Tick),
            window::resize_events().map(|(_id, size)| Message::Resized(size)),
            keyboard::on_key_press(|key, modifiers| Some(Message::KeyPressed(key, modifiers))),
        ];
        if self.sweep.is_some() {
            subscriptions.push(
                iced::time::every(Duration::from_millis(CONFIG.orientation_interval_ms)).map(Message::OrientationTick),
            );
        }
        Subscription::batch(subscriptions)
    }
}

/// Open the HUD window and run until it is closed.
pub fn run(options: LaunchOptions) -> iced::Result {
    let window_size = Size::new(CONFIG.window_width as f32, CONFIG.window_height as f32);

    iced::application(ArHud::title, ArHud::update, ArHud::view)
        .subscription(ArHud::subscription)
        .theme(|_| Theme::Dark)
        .window_size(window_size)
        .antialiasing(true)
        .run_with(move || ArHud::new(options))
}
