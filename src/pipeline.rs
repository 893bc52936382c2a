//! The frame driver that ties the HUD together.
//!
//! [`HudPipeline`] owns the marker store and every component that reads or
//! writes it. The host calls [`HudPipeline::tick`] once per display frame,
//! hands captured frames to [`HudPipeline::request_detection`] and feeds the
//! replies back through [`HudPipeline::apply_reply`]. All of this happens on
//! the host's update thread; only the detector itself runs elsewhere.

use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};
use serde::Deserialize;

use crate::detection::wire;
use crate::detection::{
    DetectionBatch, DetectionError, DetectionOutcome, DetectionReply, DetectionScheduler, DetectionTicket,
    DetectionWorker, Detector, DetectorError, Frame, RawDetection, SchedulerConfig,
};
use crate::geometry::Point2;
use crate::motion::{AdaptiveLerp, FilterKind, MotionFilter, SecondOrderDynamics};
use crate::orientation::{OrientationSample, OrientationStabilizer, StabilizerConfig};
use crate::render::hud::{MAX_ZOOM, MIN_ZOOM};
use crate::render::{HudRenderer, HudView, RenderConfig, RenderOutcome, Surface, ThemeMode};
use crate::settings::UserSettings;
use crate::tracking::{AdvanceReport, LifecycleConfig, MarkerFilters, MarkerStore, ReconcileReport, Reconciler, ReconcilerConfig};
use crate::utils::timing::{FrameClock, ScopedTimer, TimingStats};

/// Multiplier applied by `zoom_in` / `zoom_out`.
pub const ZOOM_STEP: f32 = 1.25;

/// Every tunable of the pipeline, resolved from the user settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
    pub stabilizer: StabilizerConfig,
    pub lifecycle: LifecycleConfig,
    pub reconciler: ReconcilerConfig,
    pub scheduler: SchedulerConfig,
    pub render: RenderConfig,
    pub filters: MarkerFilters,
    pub max_frame_dt: Duration,
    pub show_telemetry: bool,
    pub initial_view: HudView,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stabilizer: StabilizerConfig::default(),
            lifecycle: LifecycleConfig::default(),
            reconciler: ReconcilerConfig::default(),
            scheduler: SchedulerConfig::default(),
            render: RenderConfig::default(),
            filters: MarkerFilters::default(),
            max_frame_dt: Duration::from_millis(crate::config::DEFAULT_MAX_FRAME_DT_MS),
            show_telemetry: true,
            initial_view: HudView::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_settings(settings: &UserSettings) -> Self {
        let max_frame_dt = Duration::from_millis(crate::config::DEFAULT_MAX_FRAME_DT_MS);
        let filter = match settings.get_position_filter() {
            FilterKind::SecondOrder => MotionFilter::SecondOrder(
                SecondOrderDynamics::new(settings.spring_frequency, settings.spring_damping, settings.spring_response)
                    .with_max_dt(max_frame_dt.as_secs_f32()),
            ),
            FilterKind::Lerp => MotionFilter::Lerp(AdaptiveLerp::new(
                settings.lerp_base_rate,
                settings.lerp_boost_per_px,
                settings.lerp_min_factor,
                settings.lerp_max_factor,
                settings.lerp_deadzone_px,
            )),
        };

        Self {
            stabilizer: StabilizerConfig {
                fov_deg: settings.fov_deg,
                smoothing: settings.orientation_smoothing,
                policy: settings.get_anchor_policy(),
            },
            lifecycle: LifecycleConfig {
                opacity_rate: settings.opacity_rate.clamp(0.0, 1.0),
                fade_epsilon: settings.fade_epsilon,
                stale_after: Duration::from_millis(settings.stale_after_ms),
                max_missing: Duration::from_millis(settings.max_missing_ms),
            },
            reconciler: ReconcilerConfig {
                min_iou: settings.min_iou,
                max_point_distance: settings.max_point_distance.max(0.0),
                min_spawn_confidence: settings.min_spawn_confidence,
                velocity_blend: settings.velocity_blend.clamp(0.0, 1.0),
                min_hits: settings.min_hits,
                max_misses: settings.max_misses,
                extrapolation_window: Duration::from_millis(settings.extrapolation_window_ms),
                max_missing: Duration::from_millis(settings.max_missing_ms),
            },
            scheduler: SchedulerConfig {
                min_interval: Duration::from_millis(settings.detection_interval_ms),
                watchdog: Duration::from_millis(settings.watchdog_ms),
            },
            render: RenderConfig {
                visibility_threshold: settings.visibility_threshold,
                cull_margin: settings.cull_margin_px,
                keypoint_confidence: settings.keypoint_confidence,
                tunnel: settings.tunnel,
                label_joints: true,
                ipd_px: settings.ipd_px,
            },
            filters: MarkerFilters {
                position: filter,
                size: filter,
                keypoints: filter,
            },
            max_frame_dt,
            show_telemetry: settings.show_telemetry,
            initial_view: HudView {
                zoom: MIN_ZOOM,
                theme: settings.get_theme(),
                stereo: settings.stereo,
                reference_overlays: settings.reference_overlays,
            },
        }
    }
}

/// A command from the host or an external command stream, already parsed
/// out of whatever transport carried it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HudCommand {
    Zoom(f32),
    ZoomIn,
    ZoomOut,
    Filter(ThemeMode),
    NextFilter,
    /// `None` toggles.
    Stereo(Option<bool>),
    /// Reference overlays on/off; `None` toggles.
    Grid(Option<bool>),
    Resync,
}

/// `{"type": ..., "value": ...}` as emitted by a command stream.
#[derive(Debug, Clone, Deserialize)]
pub struct WireCommand {
    #[serde(rename = "type", alias = "kind")]
    pub kind: String,
    #[serde(default)]
    pub value: serde_json::Value,
}

fn value_as_f32(value: &serde_json::Value) -> Option<f32> {
    let parsed: Option<f32> = match value {
        serde_json::Value::Number(n) => n.as_f64().map(|v| v as f32),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// `true`/`false`, `on`/`off`, `1`/`0`; null or `toggle` gives `Some(None)`.
fn value_as_switch(value: &serde_json::Value) -> Option<Option<bool>> {
    match value {
        serde_json::Value::Null => Some(None),
        serde_json::Value::Bool(b) => Some(Some(*b)),
        serde_json::Value::Number(n) => n.as_i64().map(|v| Some(v != 0)),
        serde_json::Value::String(s) => match s.trim().to_lowercase().as_str() {
            "" | "toggle" => Some(None),
            "on" | "true" | "1" | "enable" => Some(Some(true)),
            "off" | "false" | "0" | "disable" => Some(Some(false)),
            _ => None,
        },
        _ => None,
    }
}

impl HudCommand {
    /// Interpret one wire command. Unknown kinds and unusable values are
    /// logged and ignored.
    pub fn from_wire(command: &WireCommand) -> Option<Self> {
        let kind = command.kind.trim().to_lowercase();
        let parsed = match kind.as_str() {
            "zoom" => value_as_f32(&command.value).map(HudCommand::Zoom),
            "zoom_in" => Some(HudCommand::ZoomIn),
            "zoom_out" => Some(HudCommand::ZoomOut),
            "filter" | "theme" => match &command.value {
                serde_json::Value::Null => Some(HudCommand::NextFilter),
                serde_json::Value::String(name) => ThemeMode::from_name(name).map(HudCommand::Filter),
                _ => None,
            },
            "stereo" => value_as_switch(&command.value).map(HudCommand::Stereo),
            "grid" => value_as_switch(&command.value).map(HudCommand::Grid),
            "resync" => Some(HudCommand::Resync),
            _ => {
                warn!("Ignoring unknown HUD command '{}'", command.kind);
                return None;
            }
        };
        if parsed.is_none() {
            warn!("Ignoring HUD command '{}' with unusable value {}", command.kind, command.value);
        }
        parsed
    }

    /// Parse a JSON array of wire commands, skipping the ones that do not apply.
    pub fn parse_list(json: &str) -> Result<Vec<HudCommand>, DetectionError> {
        let commands: Vec<WireCommand> = serde_json::from_str(json).map_err(|e| DetectionError::Json(e.to_string()))?;
        Ok(commands.iter().filter_map(HudCommand::from_wire).collect())
    }
}

/// The host-adjustable part of the HUD.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HudControls {
    view: HudView,
}

impl HudControls {
    pub fn new(view: HudView) -> Self {
        let mut controls = Self { view };
        controls.set_zoom(view.zoom);
        controls
    }

    pub fn view(&self) -> &HudView {
        &self.view
    }

    pub fn zoom(&self) -> f32 {
        self.view.zoom
    }

    /// Non-finite values are ignored; the rest is clamped to the zoom range.
    pub fn set_zoom(&mut self, zoom: f32) {
        if zoom.is_finite() {
            self.view.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        }
    }

    pub fn set_theme(&mut self, theme: ThemeMode) {
        self.view.theme = theme;
    }

    pub fn set_stereo(&mut self, stereo: bool) {
        self.view.stereo = stereo;
    }

    pub fn set_reference_overlays(&mut self, enabled: bool) {
        self.view.reference_overlays = enabled;
    }
}

pub struct HudPipeline {
    store: MarkerStore,
    reconciler: Reconciler,
    stabilizer: OrientationStabilizer,
    scheduler: DetectionScheduler,
    worker: Option<DetectionWorker>,
    controls: HudControls,
    clock: FrameClock,
    renderer: HudRenderer,
    filters: MarkerFilters,
    viewport: (f32, f32),
    show_telemetry: bool,
    render_stats: TimingStats,
    disposed: bool,
}

impl HudPipeline {
    /// A pipeline without a detector; detections arrive through
    /// [`Self::apply_batch`] or [`Self::ingest_json`].
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            store: MarkerStore::new(config.lifecycle),
            reconciler: Reconciler::new(config.reconciler),
            stabilizer: OrientationStabilizer::new(config.stabilizer),
            scheduler: DetectionScheduler::new(config.scheduler),
            worker: None,
            controls: HudControls::new(config.initial_view),
            clock: FrameClock::new(config.max_frame_dt),
            renderer: HudRenderer::new(config.render),
            filters: config.filters,
            viewport: (0.0, 0.0),
            show_telemetry: config.show_telemetry,
            render_stats: TimingStats::new("HUD render"),
            disposed: false,
        }
    }

    pub fn with_detector(config: PipelineConfig, detector: Box<dyn Detector>) -> Result<Self, DetectorError> {
        let mut pipeline = Self::new(config);
        pipeline.worker = Some(DetectionWorker::spawn(detector)?);
        Ok(pipeline)
    }

    pub fn store(&self) -> &MarkerStore {
        &self.store
    }

    pub fn stabilizer(&self) -> &OrientationStabilizer {
        &self.stabilizer
    }

    pub fn scheduler(&self) -> &DetectionScheduler {
        &self.scheduler
    }

    pub fn controls(&self) -> &HudControls {
        &self.controls
    }

    pub fn fps(&self) -> f32 {
        self.clock.fps()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport = (width.max(0.0), height.max(0.0));
    }

    /// Pixels per normalized unit of one eye's viewport, used by the
    /// pixel-based parts of the motion filters.
    fn filter_scale(&self) -> Point2 {
        let (width, height) = self.viewport;
        let view = self.controls.view();
        let eye_width = if view.stereo { width / 2.0 } else { width };
        Point2::new(eye_width * view.zoom, height * view.zoom)
    }

    /// Per-frame step: clamp the frame delta, run the watchdog, then advance
    /// every marker's filters and opacity.
    pub fn tick(&mut self, now: Instant) -> AdvanceReport {
        let dt = self.clock.tick(now);
        self.scheduler.check_watchdog(now);
        let scale = self.filter_scale();
        let report = self.store.advance(now, dt, &self.filters, scale);
        if !report.evicted.is_empty() || !report.faded_out.is_empty() {
            trace!("Tick removed {} evicted, {} faded", report.evicted.len(), report.faded_out.len());
        }
        report
    }

    /// Whether a new frame would be accepted by [`Self::request_detection`].
    pub fn wants_frame(&self, now: Instant) -> bool {
        !self.disposed
            && self.worker.as_ref().is_some_and(|w| w.is_running())
            && self.scheduler.can_submit(now)
    }

    /// Submit a captured frame unless a request is still in flight or the
    /// minimum interval has not passed. The frame is dropped when refused.
    pub fn request_detection(&mut self, frame: Frame, now: Instant) -> Option<DetectionTicket> {
        if !self.wants_frame(now) {
            return None;
        }
        let worker = self.worker.as_mut()?;
        let ticket = worker.submit(frame, now);
        self.scheduler.mark_submitted(ticket.seq(), now);
        Some(ticket)
    }

    /// Fold a detector reply into the markers. Replies after disposal and
    /// replies older than one already applied are discarded.
    pub fn apply_reply(&mut self, reply: DetectionReply, now: Instant) -> Option<ReconcileReport> {
        if self.disposed {
            debug!("Discarding detection reply #{} after disposal", reply.seq);
            return None;
        }
        if !self.scheduler.accept(reply.seq, now) {
            return None;
        }
        trace!("Detection #{} took {:?} in the detector", reply.seq, reply.elapsed);

        match reply.outcome {
            DetectionOutcome::Detections(batch) => Some(self.apply_batch(&batch, now)),
            DetectionOutcome::Failed(e) => {
                warn!("Detection cycle #{} failed, treating as empty: {}", reply.seq, e);
                let (width, height) = self.viewport;
                let empty = DetectionBatch::new(width as u32, height as u32, Vec::new(), now);
                Some(self.apply_batch(&empty, now))
            }
            DetectionOutcome::Cancelled => {
                debug!("Detection #{} was cancelled", reply.seq);
                None
            }
        }
    }

    pub fn apply_batch(&mut self, batch: &DetectionBatch, now: Instant) -> ReconcileReport {
        let report = self.reconciler.reconcile(&mut self.store, batch, now);
        self.stabilizer.on_detection_batch(batch.detections.len());
        trace!(
            "Reconciled batch: {} matched, {} spawned, {} dropped",
            report.matched(),
            report.spawned.len(),
            report.dropped
        );
        report
    }

    /// Decode a wire-format batch and apply it.
    pub fn ingest_json(&mut self, json: &str, now: Instant) -> Result<ReconcileReport, DetectionError> {
        let parsed = wire::parse_batch(json, now)?;
        let mut report = self.apply_batch(&parsed.batch, now);
        report.dropped += parsed.dropped;
        Ok(report)
    }

    pub fn push_orientation(&mut self, sample: OrientationSample) {
        self.stabilizer.push_sample(sample);
    }

    /// Replace the live external marker list.
    pub fn set_external_markers(&mut self, markers: &[RawDetection], now: Instant) -> ReconcileReport {
        self.reconciler.merge_external(&mut self.store, markers, now)
    }

    pub fn set_external_markers_json(&mut self, json: &str, now: Instant) -> Result<ReconcileReport, DetectionError> {
        let markers = wire::parse_marker_list(json)?;
        Ok(self.set_external_markers(&markers, now))
    }

    pub fn apply_command(&mut self, command: HudCommand) {
        debug!("Applying HUD command {:?}", command);
        let view = *self.controls.view();
        match command {
            HudCommand::Zoom(zoom) => self.controls.set_zoom(zoom),
            HudCommand::ZoomIn => self.controls.set_zoom(view.zoom * ZOOM_STEP),
            HudCommand::ZoomOut => self.controls.set_zoom(view.zoom / ZOOM_STEP),
            HudCommand::Filter(theme) => self.controls.set_theme(theme),
            HudCommand::NextFilter => self.controls.set_theme(view.theme.next()),
            HudCommand::Stereo(on) => self.controls.set_stereo(on.unwrap_or(!view.stereo)),
            HudCommand::Grid(on) => self.controls.set_reference_overlays(on.unwrap_or(!view.reference_overlays)),
            HudCommand::Resync => self.stabilizer.resync(),
        }
    }

    pub fn telemetry_lines(&self) -> Vec<String> {
        let view = self.controls.view();
        let lock = if self.stabilizer.is_available() { "WORLD" } else { "SCREEN" };
        let detector = match &self.worker {
            Some(worker) if worker.is_running() => format!(
                "DET {} {:.0} ms #{}",
                worker.name(),
                self.scheduler.latency_ms(),
                self.scheduler.completed()
            ),
            _ => "DET offline".to_string(),
        };
        vec![
            format!("FPS {:.0}", self.clock.fps()),
            format!("MARKERS {}", self.store.len()),
            detector,
            format!("ZOOM {:.1}x  {}", view.zoom, view.theme.name().to_uppercase()),
            format!("{}{}", lock, if view.stereo { "  STEREO" } else { "" }),
        ]
    }

    /// Draw the current state. Reads only; call [`Self::tick`] first.
    pub fn render(&mut self, surface: &mut dyn Surface) -> RenderOutcome {
        let telemetry = if self.show_telemetry { self.telemetry_lines() } else { Vec::new() };
        let (width, height) = self.viewport;

        let _timer = ScopedTimer::new(&mut self.render_stats);
        self.renderer.render(
            surface,
            width,
            height,
            &self.store,
            &self.stabilizer,
            self.controls.view(),
            &telemetry,
        )
    }

    /// Stop the detector. In-flight requests are dropped and later replies
    /// are ignored; the markers already on screen stay until the host drops
    /// the pipeline.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        if let Some(mut worker) = self.worker.take() {
            worker.dispose();
        }
        info!("HUD pipeline disposed with {} markers live", self.store.len());
    }
}

impl Drop for HudPipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}
