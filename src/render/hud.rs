use log::trace;

use crate::geometry::{BBox, Point2};
use crate::orientation::{CameraShift, OrientationStabilizer, DEFAULT_FOV_DEG};
use crate::tracking::{MarkerShape, MarkerStore, TrackedMarker};

use super::overlays;
use super::palette::{Palette, ThemeMode};
use super::shapes;
use super::surface::{Rect, Surface};

pub const DEFAULT_VISIBILITY_THRESHOLD: f32 = 0.02;
pub const DEFAULT_CULL_MARGIN_PX: f32 = 50.0;
pub const DEFAULT_KEYPOINT_CONFIDENCE: f32 = 0.3;
pub const DEFAULT_IPD_PX: f32 = 24.0;
pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    /// Markers fainter than this are not drawn.
    pub visibility_threshold: f32,
    /// Markers further than this outside the viewport are culled.
    pub cull_margin: f32,
    pub keypoint_confidence: f32,
    pub tunnel: bool,
    pub label_joints: bool,
    /// Horizontal separation between the stereo eyes.
    pub ipd_px: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            visibility_threshold: DEFAULT_VISIBILITY_THRESHOLD,
            cull_margin: DEFAULT_CULL_MARGIN_PX,
            keypoint_confidence: DEFAULT_KEYPOINT_CONFIDENCE,
            tunnel: true,
            label_joints: true,
            ipd_px: DEFAULT_IPD_PX,
        }
    }
}

/// The host-controlled part of what gets drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HudView {
    pub zoom: f32,
    pub theme: ThemeMode,
    pub stereo: bool,
    pub reference_overlays: bool,
}

impl Default for HudView {
    fn default() -> Self {
        Self {
            zoom: MIN_ZOOM,
            theme: ThemeMode::Normal,
            stereo: false,
            reference_overlays: true,
        }
    }
}

/// Normalized frame coordinates to viewport pixels, with zoom about the
/// centre, the orientation counter-rotation and pan, and the stereo eye offset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenMapper {
    pub width: f32,
    pub height: f32,
    pub zoom: f32,
    pub shift: CameraShift,
    pub eye_offset: f32,
}

impl ScreenMapper {
    pub fn center(&self) -> Point2 {
        Point2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Apply the camera compensation to a point already in viewport pixels.
    pub fn compensate(&self, p: Point2) -> Point2 {
        let c = self.center();
        let d = p - c;
        let (sin, cos) = self.shift.roll.sin_cos();
        let rotated = Point2::new(d.x * cos - d.y * sin, d.x * sin + d.y * cos);
        c + rotated + Point2::new(self.shift.dx + self.eye_offset, self.shift.dy)
    }

    pub fn map(&self, p: Point2) -> Point2 {
        let c = self.center();
        self.compensate(Point2::new(
            (p.x - 0.5) * self.width * self.zoom + c.x,
            (p.y - 0.5) * self.height * self.zoom + c.y,
        ))
    }

    pub fn map_box(&self, bbox: &BBox) -> Rect {
        let scale = self.scale();
        Rect::centered(self.map(bbox.center()), bbox.w * scale.x, bbox.h * scale.y)
    }

    /// Pixels per normalized unit on each axis.
    pub fn scale(&self) -> Point2 {
        Point2::new(self.width * self.zoom, self.height * self.zoom)
    }

    pub fn px_per_degree(&self) -> f32 {
        if self.shift.px_per_degree > 0.0 {
            self.shift.px_per_degree
        } else {
            self.width / DEFAULT_FOV_DEG * self.zoom
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub viewports: usize,
    pub drawn: usize,
    pub hidden: usize,
    pub culled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Drawn(FrameStats),
    /// No drawable area yet; the frame is skipped and retried next tick.
    SurfaceUnavailable,
}

#[derive(Debug, Clone, Default)]
pub struct HudRenderer {
    config: RenderConfig,
}

impl HudRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Draw one frame of the HUD into `surface` of `width` x `height` pixels.
    ///
    /// Only reads the marker state; filters and opacity are advanced by the
    /// frame driver before this is called.
    pub fn render(
        &self,
        surface: &mut dyn Surface,
        width: f32,
        height: f32,
        markers: &MarkerStore,
        stabilizer: &OrientationStabilizer,
        view: &HudView,
        telemetry: &[String],
    ) -> RenderOutcome {
        if !(width >= 1.0 && height >= 1.0) {
            return RenderOutcome::SurfaceUnavailable;
        }

        let palette = Palette::for_mode(view.theme);
        let zoom = view.zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        let eyes: Vec<(Rect, f32)> = if view.stereo {
            let half = width / 2.0;
            let offset = self.config.ipd_px / 2.0;
            vec![
                (Rect::new(0.0, 0.0, half, height), offset),
                (Rect::new(half, 0.0, half, height), -offset),
            ]
        } else {
            vec![(Rect::new(0.0, 0.0, width, height), 0.0)]
        };

        let mut stats = FrameStats::default();
        for (rect, eye_offset) in eyes {
            surface.begin_viewport(rect);
            let mapper = ScreenMapper {
                width: rect.width,
                height: rect.height,
                zoom,
                shift: stabilizer.shift(rect.width, rect.height, zoom),
                eye_offset,
            };

            if view.reference_overlays {
                overlays::ground_grid(surface, &mapper, &palette);
                overlays::horizon(surface, &mapper, &palette);
                overlays::pitch_ladder(surface, &mapper, &palette);
            }

            let bounds = Rect::new(0.0, 0.0, rect.width, rect.height);
            for marker in markers.iter() {
                if marker.opacity < self.config.visibility_threshold {
                    stats.hidden += 1;
                    continue;
                }
                if self.draw_marker(surface, marker, &mapper, &palette, bounds) {
                    stats.drawn += 1;
                } else {
                    stats.culled += 1;
                }
            }

            overlays::telemetry(surface, telemetry, &palette);
            stats.viewports += 1;
        }

        trace!("HUD frame: {:?}", stats);
        RenderOutcome::Drawn(stats)
    }

    /// Returns `false` when the marker is culled.
    fn draw_marker(
        &self,
        surface: &mut dyn Surface,
        marker: &TrackedMarker,
        mapper: &ScreenMapper,
        palette: &Palette,
        bounds: Rect,
    ) -> bool {
        let bbox = marker.bbox();
        let rect = mapper.map_box(&bbox);
        if !rect.expand(self.config.cull_margin).intersects(&bounds) {
            return false;
        }

        let color = palette.marker_color(&marker.label).fade(marker.opacity);
        let depth = shapes::depth_factor(marker.distance);

        match &marker.shape {
            MarkerShape::Box => {
                if self.config.tunnel {
                    shapes::tunnel(surface, rect, mapper.compensate(mapper.center()), color);
                }
                shapes::corner_brackets(surface, rect, color, depth);
            }
            MarkerShape::Point => {
                shapes::point_marker(surface, rect.center(), color, depth);
            }
            MarkerShape::Skeleton { keypoints } => {
                let joints: Vec<(Point2, f32)> = keypoints
                    .iter()
                    .map(|kp| (mapper.map(kp.position()), kp.confidence()))
                    .collect();
                shapes::skeleton(
                    surface,
                    &joints,
                    color,
                    palette,
                    self.config.keypoint_confidence,
                    depth,
                    self.config.label_joints,
                );
            }
            MarkerShape::FaceMesh { offsets } => {
                let center = bbox.center();
                let contours: Vec<(String, Vec<Point2>)> = offsets
                    .iter()
                    .map(|(name, points)| (name.clone(), points.iter().map(|o| mapper.map(center + *o)).collect()))
                    .collect();
                shapes::face_mesh(surface, &contours, color, depth);
                shapes::corner_brackets(surface, rect, color, depth);
            }
        }

        shapes::label(surface, &label_lines(marker), rect, bounds, color, palette, marker.opacity);
        true
    }
}

/// Name and confidence, then distance and speed when known.
pub fn label_lines(marker: &TrackedMarker) -> Vec<String> {
    let name = if marker.label.is_empty() { marker.id.as_str() } else { marker.label.as_str() };
    let mut lines = vec![format!("{} {:.0}%", name.to_uppercase(), marker.confidence * 100.0)];

    if let Some(distance) = marker.distance {
        let mut line = format!("{:.1} m", distance);
        if let Some(speed) = marker.speed_mps.filter(|s| *s >= 0.05) {
            line.push_str(&format!("  {:.1} m/s", speed));
        }
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use crate::detection::{Keypoint, RawDetection, Shape};
    use crate::orientation::{OrientationSample, StabilizerConfig};
    use crate::render::surface::{DrawCommand, DrawList};
    use crate::tracking::{FrameSize, MarkerFilters, MarkerSource, Reconciler};
    use crate::detection::DetectionBatch;

    fn visible_store(detections: Vec<RawDetection>) -> MarkerStore {
        let now = Instant::now();
        let mut store = MarkerStore::default();
        Reconciler::default().reconcile(&mut store, &DetectionBatch::new(1280, 720, detections, now), now);
        for _ in 0..30 {
            store.advance(now, 0.016, &MarkerFilters::default(), Point2::new(1280.0, 720.0));
        }
        store
    }

    fn no_overlays() -> HudView {
        HudView {
            reference_overlays: false,
            ..HudView::default()
        }
    }

    fn first_line_from(list: &DrawList) -> Point2 {
        list.commands()
            .find_map(|c| match c {
                DrawCommand::Line { from, .. } => Some(*from),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_zero_size_surface_is_unavailable() {
        let mut list = DrawList::new();
        let outcome = HudRenderer::default().render(
            &mut list,
            0.0,
            720.0,
            &MarkerStore::default(),
            &OrientationStabilizer::new(StabilizerConfig::default()),
            &HudView::default(),
            &[],
        );
        assert_eq!(outcome, RenderOutcome::SurfaceUnavailable);
        assert!(list.is_empty());
    }

    #[test]
    fn test_box_marker_draws_brackets_and_label() {
        let store = visible_store(vec![RawDetection::boxed("person", 0.5, 0.5, 0.1, 0.2, 0.9).with_id("a")]);
        let renderer = HudRenderer::new(RenderConfig { tunnel: false, ..RenderConfig::default() });
        let mut list = DrawList::new();
        let outcome = renderer.render(
            &mut list,
            1280.0,
            720.0,
            &store,
            &OrientationStabilizer::new(StabilizerConfig::default()),
            &no_overlays(),
            &[],
        );

        assert_eq!(outcome, RenderOutcome::Drawn(FrameStats { viewports: 1, drawn: 1, hidden: 0, culled: 0 }));
        let strokes = list.commands().filter(|c| matches!(c, DrawCommand::Line { .. })).count();
        assert_eq!(strokes, 8);
        assert_eq!(list.texts(), vec!["PERSON 90%", "10.2 m"]);
        // Top-left bracket corner sits on the box corner: (0.45 * 1280, 0.4 * 720)
        let corner = first_line_from(&list);
        assert!((corner.x - 576.0).abs() < 0.5);
        assert!((corner.y - 288.0).abs() < 0.5);
    }

    #[test]
    fn test_faint_and_offscreen_markers_are_skipped() {
        let now = Instant::now();
        let mut store = visible_store(vec![RawDetection::boxed("car", 3.0, 0.5, 0.1, 0.1, 0.9).with_id("far")]);
        let fresh = RawDetection::boxed("car", 0.5, 0.5, 0.1, 0.1, 0.9);
        store.insert(TrackedMarker::spawn("new".into(), MarkerSource::Detector, &fresh, FrameSize::default(), now));

        let mut list = DrawList::new();
        let outcome = HudRenderer::default().render(
            &mut list,
            1280.0,
            720.0,
            &store,
            &OrientationStabilizer::new(StabilizerConfig::default()),
            &no_overlays(),
            &[],
        );
        assert_eq!(outcome, RenderOutcome::Drawn(FrameStats { viewports: 1, drawn: 0, hidden: 1, culled: 1 }));
        assert!(list.is_empty());
    }

    #[test]
    fn test_stereo_draws_two_offset_viewports() {
        let store = visible_store(vec![RawDetection::boxed("person", 0.5, 0.5, 0.1, 0.2, 0.9).with_id("a")]);
        let renderer = HudRenderer::new(RenderConfig { tunnel: false, ..RenderConfig::default() });
        let view = HudView { stereo: true, ..no_overlays() };
        let mut list = DrawList::new();
        let outcome = renderer.render(
            &mut list,
            1280.0,
            720.0,
            &store,
            &OrientationStabilizer::new(StabilizerConfig::default()),
            &view,
            &["FPS 60".to_string()],
        );

        assert!(matches!(outcome, RenderOutcome::Drawn(FrameStats { viewports: 2, drawn: 2, .. })));
        let viewports = list.viewports();
        assert_eq!(viewports[0].rect, Rect::new(0.0, 0.0, 640.0, 720.0));
        assert_eq!(viewports[1].rect, Rect::new(640.0, 0.0, 640.0, 720.0));

        let left = match &viewports[0].commands[0] {
            DrawCommand::Line { from, .. } => *from,
            other => panic!("unexpected {:?}", other),
        };
        let right = match &viewports[1].commands[0] {
            DrawCommand::Line { from, .. } => *from,
            other => panic!("unexpected {:?}", other),
        };
        assert!((left.x - right.x - DEFAULT_IPD_PX).abs() < 1e-3);
        assert_eq!(list.texts().iter().filter(|t| **t == "FPS 60").count(), 2);
    }

    #[test]
    fn test_overlays_and_markers_share_the_shift() {
        let store = visible_store(vec![RawDetection::boxed("person", 0.5, 0.5, 0.1, 0.2, 0.9).with_id("a")]);
        let mut stabilizer = OrientationStabilizer::new(StabilizerConfig { smoothing: 1.0, ..StabilizerConfig::default() });
        stabilizer.push_sample(OrientationSample::new(0.0, 0.0, 0.0));
        stabilizer.push_sample(OrientationSample::new(6.0, 0.0, 0.0));

        let renderer = HudRenderer::new(RenderConfig { tunnel: false, ..RenderConfig::default() });
        let view = HudView::default();
        let mut list = DrawList::new();
        renderer.render(&mut list, 1200.0, 600.0, &store, &stabilizer, &view, &[]);

        // 6 degrees of yaw at 20 px/degree moves everything 120px left
        let shift = stabilizer.shift(1200.0, 600.0, 1.0);
        assert!((shift.dx + 120.0).abs() < 1e-3);

        let mapper = ScreenMapper { width: 1200.0, height: 600.0, zoom: 1.0, shift, eye_offset: 0.0 };
        let horizon_start = mapper.compensate(Point2::new(-1200.0, 300.0));
        let has_horizon = list.commands().any(|c| matches!(c, DrawCommand::Line { from, .. } if *from == horizon_start));
        assert!(has_horizon);

        let corner = mapper.map(Point2::new(0.45, 0.4));
        let has_bracket = list.commands().any(|c| matches!(c, DrawCommand::Line { from, .. }
            if (from.x - corner.x).abs() < 1e-3 && (from.y - corner.y).abs() < 1e-3));
        assert!(has_bracket);
        assert!((corner.x - 420.0).abs() < 1e-3);
    }

    #[test]
    fn test_skeleton_and_face_shapes_render() {
        let keypoints = (0..17).map(|i| Keypoint::new(0.5, 0.3 + i as f32 * 0.02, 0.9)).collect();
        let skeleton = RawDetection::boxed("person", 0.5, 0.5, 0.1, 0.4, 0.9)
            .with_id("p")
            .with_shape(Shape::Skeleton { keypoints });
        let store = visible_store(vec![skeleton]);

        let mut list = DrawList::new();
        HudRenderer::default().render(
            &mut list,
            1280.0,
            720.0,
            &store,
            &OrientationStabilizer::new(StabilizerConfig::default()),
            &no_overlays(),
            &[],
        );
        let joints = list.commands().filter(|c| matches!(c, DrawCommand::Circle { .. })).count();
        assert_eq!(joints, 17);
        assert!(list.texts().contains(&"HEAD"));
    }

    #[test]
    fn test_label_lines() {
        let now = Instant::now();
        let det = RawDetection::boxed("", 0.5, 0.5, 0.1, 0.1, 0.5);
        let mut marker = TrackedMarker::spawn("trk-7".into(), MarkerSource::Detector, &det, FrameSize::default(), now);
        assert_eq!(label_lines(&marker), vec!["TRK-7 50%".to_string()]);

        marker.distance = Some(12.34);
        marker.speed_mps = Some(1.26);
        assert_eq!(label_lines(&marker)[1], "12.3 m  1.3 m/s");
    }
}
