//! Matches each detector cycle against the live markers.
//!
//! Detections carrying an id are matched by id. The rest are re-identified by
//! greedy IoU against every unmatched marker's predicted box, which is good
//! enough for the handful of objects a HUD frame holds. Sizeless detections
//! (points) have no overlap to measure and match on centre distance instead.
//! Unmatched markers are
//! dead-reckoned for a short window when they are established, otherwise they
//! start fading.

use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};

use crate::detection::{DetectionBatch, RawDetection};
use crate::geometry::{iou, BBox};

use super::marker::{FrameSize, MarkerSource, TrackedMarker};
use super::store::{MarkerStore, DEFAULT_MAX_MISSING_MS};

pub const DEFAULT_MIN_IOU: f32 = 0.05;
pub const DEFAULT_MAX_POINT_DISTANCE: f32 = 0.05;
pub const DEFAULT_MIN_SPAWN_CONFIDENCE: f32 = 0.35;
pub const DEFAULT_VELOCITY_BLEND: f32 = 0.3;
pub const DEFAULT_MIN_HITS: u32 = 3;
pub const DEFAULT_MAX_MISSES: u32 = 5;
pub const DEFAULT_EXTRAPOLATION_WINDOW_MS: u64 = 300;

/// Prefix that keeps externally supplied ids apart from detector ids.
const EXTERNAL_PREFIX: &str = "ext:";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconcilerConfig {
    pub min_iou: f32,
    /// Normalized centre distance within which a sizeless detection matches.
    pub max_point_distance: f32,
    /// Unmatched detections below this confidence do not spawn markers.
    pub min_spawn_confidence: f32,
    /// Weight of the newest velocity sample.
    pub velocity_blend: f32,
    /// Hits before a marker counts as established and may be dead-reckoned.
    pub min_hits: u32,
    /// Consecutive misses tolerated before fading.
    pub max_misses: u32,
    pub extrapolation_window: Duration,
    pub max_missing: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            min_iou: DEFAULT_MIN_IOU,
            max_point_distance: DEFAULT_MAX_POINT_DISTANCE,
            min_spawn_confidence: DEFAULT_MIN_SPAWN_CONFIDENCE,
            velocity_blend: DEFAULT_VELOCITY_BLEND,
            min_hits: DEFAULT_MIN_HITS,
            max_misses: DEFAULT_MAX_MISSES,
            extrapolation_window: Duration::from_millis(DEFAULT_EXTRAPOLATION_WINDOW_MS),
            max_missing: Duration::from_millis(DEFAULT_MAX_MISSING_MS),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileReport {
    pub matched_by_id: usize,
    /// Anonymous matches, by overlap or by proximity for points.
    pub matched_by_iou: usize,
    pub spawned: Vec<String>,
    pub rejected: usize,
    pub dropped: usize,
    pub extrapolated: usize,
    pub faded: usize,
    pub evicted: Vec<String>,
}

impl ReconcileReport {
    pub fn matched(&self) -> usize {
        self.matched_by_id + self.matched_by_iou
    }
}

fn labels_compatible(a: &str, b: &str) -> bool {
    a.is_empty() || b.is_empty() || a.eq_ignore_ascii_case(b)
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Fold one detector cycle into `store`. An empty batch (or a failed
    /// detector cycle) only advances the miss handling.
    pub fn reconcile(&self, store: &mut MarkerStore, batch: &DetectionBatch, now: Instant) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let frame = FrameSize::new(batch.frame_width, batch.frame_height);

        let mut detections = Vec::with_capacity(batch.detections.len());
        for det in batch.detections.iter().cloned() {
            match det.validate() {
                Ok(det) => detections.push(det),
                Err(e) => {
                    warn!("Dropping malformed detection: {}", e);
                    report.dropped += 1;
                }
            }
        }

        let mut matched: HashSet<String> = HashSet::new();
        let mut anonymous = Vec::new();

        for det in detections {
            let Some(id) = det.id.clone() else {
                anonymous.push(det);
                continue;
            };
            match store.get_mut(&id) {
                Some(marker) if marker.source == MarkerSource::Detector => {
                    marker.observe(&det, frame, self.config.velocity_blend, now);
                    report.matched_by_id += 1;
                }
                Some(_) => {
                    warn!("Detection id '{}' collides with an external marker, ignoring", id);
                    report.rejected += 1;
                    continue;
                }
                None => {
                    if det.confidence < self.config.min_spawn_confidence {
                        report.rejected += 1;
                        continue;
                    }
                    store.insert(TrackedMarker::spawn(id.clone(), MarkerSource::Detector, &det, frame, now));
                    report.spawned.push(id.clone());
                }
            }
            matched.insert(id);
        }

        // Greedy one-to-one pass against predicted positions, best score first
        let mut pairs = Vec::new();
        for (index, det) in anonymous.iter().enumerate() {
            let det_box = det.bbox();
            for marker in store.iter() {
                if marker.source != MarkerSource::Detector
                    || matched.contains(&marker.id)
                    || !labels_compatible(&marker.label, &det.label)
                {
                    continue;
                }
                if let Some(score) = self.match_score(&det_box, &marker.predicted(now)) {
                    pairs.push((score, index, marker.id.clone()));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let mut used = vec![false; anonymous.len()];
        for (score, index, id) in pairs {
            if used[index] || matched.contains(&id) {
                continue;
            }
            if let Some(marker) = store.get_mut(&id) {
                trace!("Matched detection #{} to {} (score {:.2})", index, id, score);
                marker.observe(&anonymous[index], frame, self.config.velocity_blend, now);
                used[index] = true;
                matched.insert(id);
                report.matched_by_iou += 1;
            }
        }

        for (det, used) in anonymous.iter().zip(used) {
            if used {
                continue;
            }
            if det.confidence < self.config.min_spawn_confidence {
                trace!("Ignoring low confidence {} ({:.2})", det.label, det.confidence);
                report.rejected += 1;
                continue;
            }
            let id = store.next_track_id();
            store.insert(TrackedMarker::spawn(id.clone(), MarkerSource::Detector, det, frame, now));
            matched.insert(id.clone());
            report.spawned.push(id);
        }

        self.handle_misses(store, &matched, now, &mut report);

        trace!(
            "Reconciled {} detections: {} by id, {} by IoU, {} spawned, {} extrapolated, {} fading, {} evicted",
            batch.detections.len(),
            report.matched_by_id,
            report.matched_by_iou,
            report.spawned.len(),
            report.extrapolated,
            report.faded,
            report.evicted.len()
        );
        report
    }

    /// Score in `(0, 1]` for pairing a detection with a predicted box, or
    /// `None` when they are too far apart. Boxes use IoU; when either side
    /// has no area the score falls off linearly with centre distance.
    fn match_score(&self, detection: &BBox, predicted: &BBox) -> Option<f32> {
        if detection.area() > 0.0 && predicted.area() > 0.0 {
            let overlap = iou(detection, predicted);
            return (overlap >= self.config.min_iou && overlap > 0.0).then_some(overlap);
        }
        let radius = self.config.max_point_distance;
        let distance = (detection.center() - predicted.center()).length();
        (radius > 0.0 && distance <= radius).then(|| (1.0 - distance / radius).max(f32::EPSILON))
    }

    fn handle_misses(&self, store: &mut MarkerStore, matched: &HashSet<String>, now: Instant, report: &mut ReconcileReport) {
        for id in store.ids(MarkerSource::Detector) {
            if matched.contains(&id) {
                continue;
            }
            let Some(marker) = store.get_mut(&id) else {
                continue;
            };
            marker.misses = marker.misses.saturating_add(1);
            let unseen = now.saturating_duration_since(marker.last_seen);

            if unseen > self.config.max_missing {
                debug!("Evicting marker {} unseen for {:?}", id, unseen);
                store.remove(&id);
                report.evicted.push(id);
                continue;
            }

            let established = marker.hits >= self.config.min_hits;
            if established
                && marker.misses <= self.config.max_misses
                && unseen <= self.config.extrapolation_window
                && !marker.is_fading()
            {
                marker.extrapolate(now);
                report.extrapolated += 1;
            } else if !marker.is_fading() {
                marker.begin_fade();
                report.faded += 1;
            }
        }
    }

    /// Merge the externally supplied marker list. Each entry is tracked
    /// under its own id space; entries missing from the list fade out.
    /// Entries without an id are keyed by label, with `#n` appended to the
    /// nth repeat of the same label.
    pub fn merge_external(&self, store: &mut MarkerStore, markers: &[RawDetection], now: Instant) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut present = HashSet::new();
        let mut label_counts: HashMap<String, usize> = HashMap::new();

        for (index, det) in markers.iter().cloned().enumerate() {
            let det = match det.validate() {
                Ok(det) => det,
                Err(e) => {
                    warn!("Dropping malformed external marker #{}: {}", index, e);
                    report.dropped += 1;
                    continue;
                }
            };
            let key = match (&det.id, det.label.is_empty()) {
                (Some(id), _) => id.clone(),
                (None, false) => {
                    let seen = label_counts.entry(det.label.clone()).or_insert(0);
                    *seen += 1;
                    if *seen == 1 {
                        det.label.clone()
                    } else {
                        format!("{}#{}", det.label, seen)
                    }
                }
                (None, true) => index.to_string(),
            };
            let id = format!("{}{}", EXTERNAL_PREFIX, key);
            if present.contains(&id) {
                warn!("Duplicate external marker id '{}', skipping entry #{}", id, index);
                report.rejected += 1;
                continue;
            }

            match store.get_mut(&id) {
                Some(marker) => {
                    marker.observe(&det, FrameSize::default(), self.config.velocity_blend, now);
                    report.matched_by_id += 1;
                }
                None => {
                    store.insert(TrackedMarker::spawn(id.clone(), MarkerSource::External, &det, FrameSize::default(), now));
                    report.spawned.push(id.clone());
                }
            }
            present.insert(id);
        }

        for id in store.ids(MarkerSource::External) {
            if present.contains(&id) {
                continue;
            }
            if let Some(marker) = store.get_mut(&id) {
                if !marker.is_fading() {
                    marker.begin_fade();
                    report.faded += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::Shape;
    use crate::geometry::Point2;
    use crate::tracking::marker::MarkerFilters;

    const SCALE: Point2 = Point2::new(1280.0, 720.0);

    fn batch(detections: Vec<RawDetection>) -> DetectionBatch {
        DetectionBatch::new(1280, 720, detections, Instant::now())
    }

    fn person(x: f32, y: f32) -> RawDetection {
        RawDetection::boxed("person", x, y, 0.1, 0.1, 0.9)
    }

    #[test]
    fn test_held_detection_settles_then_is_removed() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let filters = MarkerFilters::default();
        let det = person(0.5, 0.5).with_id("a");

        // Five detector cycles with four rendered frames each
        let mut now = Instant::now();
        for _ in 0..5 {
            reconciler.reconcile(&mut store, &batch(vec![det.clone()]), now);
            for _ in 0..4 {
                now += Duration::from_millis(16);
                store.advance(now, 0.016, &filters, SCALE);
            }
        }
        for _ in 0..10 {
            now += Duration::from_millis(16);
            store.advance(now, 0.016, &filters, SCALE);
        }

        let marker = store.get("a").unwrap();
        assert_eq!(marker.hits, 5);
        assert!(marker.opacity > 0.99);
        assert!((marker.x.value - 0.5).abs() < 1e-3);
        assert!((marker.y.value - 0.5).abs() < 1e-3);

        // Silence past the persistence window removes it regardless of state
        let later = now + Duration::from_millis(DEFAULT_MAX_MISSING_MS);
        let report = reconciler.reconcile(&mut store, &batch(Vec::new()), later);
        assert_eq!(report.evicted, vec!["a".to_string()]);
        assert!(store.get("a").is_none());
    }

    #[test]
    fn test_moving_detection_keeps_identity() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let t0 = Instant::now();

        let first = reconciler.reconcile(&mut store, &batch(vec![person(0.40, 0.50)]), t0);
        assert_eq!(first.spawned.len(), 1);
        let id = first.spawned[0].clone();

        let second = reconciler.reconcile(&mut store, &batch(vec![person(0.43, 0.49)]), t0 + Duration::from_millis(100));
        assert_eq!(second.matched_by_iou, 1);
        assert!(second.spawned.is_empty());
        assert_eq!(store.len(), 1);

        let marker = store.get(&id).unwrap();
        assert!(marker.velocity.x > 0.0);
        assert!(marker.velocity.y < 0.0);
    }

    #[test]
    fn test_each_marker_matches_once() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let t0 = Instant::now();
        reconciler.reconcile(&mut store, &batch(vec![person(0.5, 0.5)]), t0);

        // Two detections overlap the single marker; the closer one wins
        let report = reconciler.reconcile(
            &mut store,
            &batch(vec![person(0.53, 0.5), person(0.505, 0.5)]),
            t0 + Duration::from_millis(50),
        );
        assert_eq!(report.matched_by_iou, 1);
        assert_eq!(report.spawned.len(), 1);
        let original = store.get("trk-1").unwrap();
        assert!((original.observed.cx - 0.505).abs() < 1e-6);
    }

    #[test]
    fn test_labels_must_agree() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let t0 = Instant::now();
        reconciler.reconcile(&mut store, &batch(vec![person(0.5, 0.5)]), t0);
        let car = RawDetection::boxed("car", 0.5, 0.5, 0.1, 0.1, 0.9);
        let report = reconciler.reconcile(&mut store, &batch(vec![car]), t0 + Duration::from_millis(50));
        assert_eq!(report.matched(), 0);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_low_confidence_does_not_spawn() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let weak = RawDetection::boxed("person", 0.5, 0.5, 0.1, 0.1, 0.1);
        let report = reconciler.reconcile(&mut store, &batch(vec![weak]), Instant::now());
        assert_eq!(report.rejected, 1);
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_detection_dropped_alone() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let bad = RawDetection::boxed("person", f32::NAN, 0.5, 0.1, 0.1, 0.9);
        let report = reconciler.reconcile(&mut store, &batch(vec![bad, person(0.2, 0.2)]), Instant::now());
        assert_eq!(report.dropped, 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_established_marker_extrapolates_then_fades() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let t0 = Instant::now();
        for i in 0..4 {
            let x = 0.3 + 0.01 * i as f32;
            reconciler.reconcile(&mut store, &batch(vec![person(x, 0.5).with_id("a")]), t0 + Duration::from_millis(66 * i));
        }
        let last_seen = t0 + Duration::from_millis(66 * 3);

        let report = reconciler.reconcile(&mut store, &batch(Vec::new()), last_seen + Duration::from_millis(100));
        assert_eq!(report.extrapolated, 1);
        let marker = store.get("a").unwrap();
        assert!(marker.target.cx > marker.observed.cx);
        assert!(!marker.is_fading());

        let report = reconciler.reconcile(&mut store, &batch(Vec::new()), last_seen + Duration::from_millis(400));
        assert_eq!(report.faded, 1);
        assert!(store.get("a").unwrap().is_fading());
    }

    #[test]
    fn test_fresh_marker_fades_on_first_miss() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let t0 = Instant::now();
        reconciler.reconcile(&mut store, &batch(vec![person(0.5, 0.5).with_id("a")]), t0);
        let report = reconciler.reconcile(&mut store, &batch(Vec::new()), t0 + Duration::from_millis(66));
        assert_eq!(report.faded, 1);
    }

    #[test]
    fn test_sizeless_point_keeps_identity() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let t0 = Instant::now();

        // Bare {x, y} entries decode to sizeless points
        let cup = |x: f32| RawDetection { size: None, ..RawDetection::boxed("cup", x, 0.5, 0.0, 0.0, 0.9) }.with_shape(Shape::Point);
        for i in 0..5u64 {
            let x = 0.5 + 0.001 * i as f32;
            let report = reconciler.reconcile(&mut store, &batch(vec![cup(x)]), t0 + Duration::from_millis(66 * i));
            if i == 0 {
                assert_eq!(report.spawned, vec!["trk-1".to_string()]);
            } else {
                assert_eq!(report.matched_by_iou, 1);
                assert!(report.spawned.is_empty());
            }
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("trk-1").unwrap().hits, 5);

        // Too far away to be the same cup
        let report = reconciler.reconcile(&mut store, &batch(vec![cup(0.9)]), t0 + Duration::from_millis(400));
        assert_eq!(report.matched(), 0);
        assert_eq!(report.spawned.len(), 1);
    }

    #[test]
    fn test_external_markers_without_id_stay_apart() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let t0 = Instant::now();

        let pins = vec![
            RawDetection::boxed("door", 0.2, 0.3, 0.05, 0.1, 1.0),
            RawDetection::boxed("door", 0.7, 0.3, 0.05, 0.1, 1.0),
        ];
        let report = reconciler.merge_external(&mut store, &pins, t0);
        assert_eq!(report.spawned, vec!["ext:door".to_string(), "ext:door#2".to_string()]);

        let report = reconciler.merge_external(&mut store, &pins, t0 + Duration::from_millis(100));
        assert_eq!(report.matched_by_id, 2);
        assert!((store.get("ext:door#2").unwrap().observed.cx - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_external_markers_are_separate() {
        let reconciler = Reconciler::default();
        let mut store = MarkerStore::default();
        let t0 = Instant::now();

        let pin = RawDetection::boxed("door", 0.2, 0.3, 0.05, 0.1, 1.0).with_id("a");
        reconciler.merge_external(&mut store, &[pin.clone()], t0);
        reconciler.reconcile(&mut store, &batch(vec![person(0.5, 0.5).with_id("a")]), t0);
        assert!(store.contains("ext:a"));
        assert!(store.contains("a"));

        // Detector misses do not touch the external marker
        reconciler.reconcile(&mut store, &batch(Vec::new()), t0 + Duration::from_millis(66));
        assert!(!store.get("ext:a").unwrap().is_fading());

        // Dropping it from the external list does
        let report = reconciler.merge_external(&mut store, &[], t0 + Duration::from_millis(100));
        assert_eq!(report.faded, 1);
        assert!(store.get("ext:a").unwrap().is_fading());
    }
}
