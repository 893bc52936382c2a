use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::geometry::Point2;

use super::marker::{MarkerFilters, MarkerSource, TrackedMarker};

pub const DEFAULT_OPACITY_RATE: f32 = 0.15;
pub const DEFAULT_FADE_EPSILON: f32 = 0.02;
pub const DEFAULT_STALE_AFTER_MS: u64 = 600;
pub const DEFAULT_MAX_MISSING_MS: u64 = 1500;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleConfig {
    /// Fraction of the remaining opacity gap closed on every frame.
    pub opacity_rate: f32,
    /// Faded markers below this opacity are deleted.
    pub fade_epsilon: f32,
    /// Detector markers unseen this long start fading even when no batch
    /// arrives to report the miss (stalled detector).
    pub stale_after: Duration,
    /// Detector markers unseen this long are deleted outright.
    pub max_missing: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            opacity_rate: DEFAULT_OPACITY_RATE,
            fade_epsilon: DEFAULT_FADE_EPSILON,
            stale_after: Duration::from_millis(DEFAULT_STALE_AFTER_MS),
            max_missing: Duration::from_millis(DEFAULT_MAX_MISSING_MS),
        }
    }
}

/// What one [`MarkerStore::advance`] call removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdvanceReport {
    pub evicted: Vec<String>,
    pub faded_out: Vec<String>,
}

/// The live set of tracked markers, keyed by id.
///
/// Readers get shared access; only the reconciler (and the frame driver via
/// [`MarkerStore::advance`]) mutate it.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    markers: BTreeMap<String, TrackedMarker>,
    config: LifecycleConfig,
    next_track: u64,
}

impl MarkerStore {
    pub fn new(config: LifecycleConfig) -> Self {
        Self {
            markers: BTreeMap::new(),
            config,
            next_track: 1,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn get(&self, id: &str) -> Option<&TrackedMarker> {
        self.markers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.markers.contains_key(id)
    }

    /// Markers in id order.
    pub fn iter(&self) -> impl Iterator<Item = &TrackedMarker> {
        self.markers.values()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut TrackedMarker> {
        self.markers.get_mut(id)
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackedMarker> {
        self.markers.values_mut()
    }

    pub(crate) fn insert(&mut self, marker: TrackedMarker) {
        debug!("Spawned marker {} ({})", marker.id, marker.label);
        self.markers.insert(marker.id.clone(), marker);
    }

    pub(crate) fn remove(&mut self, id: &str) -> Option<TrackedMarker> {
        self.markers.remove(id)
    }

    pub(crate) fn ids(&self, source: MarkerSource) -> Vec<String> {
        self.markers
            .values()
            .filter(|m| m.source == source)
            .map(|m| m.id.clone())
            .collect()
    }

    /// A fresh id for a detection that carried none.
    pub(crate) fn next_track_id(&mut self) -> String {
        loop {
            let id = format!("trk-{}", self.next_track);
            self.next_track += 1;
            if !self.markers.contains_key(&id) {
                return id;
            }
        }
    }

    /// Per-frame lifecycle step: time out detector markers, advance every
    /// motion filter, move opacity toward its target and drop fully faded
    /// entries.
    pub fn advance(&mut self, now: Instant, dt: f32, filters: &MarkerFilters, scale: Point2) -> AdvanceReport {
        let config = self.config;
        let mut report = AdvanceReport::default();

        self.markers.retain(|id, marker| {
            if marker.source == MarkerSource::Detector {
                let unseen = now.saturating_duration_since(marker.last_seen);
                if unseen > config.max_missing {
                    debug!("Evicting marker {} unseen for {:?}", id, unseen);
                    report.evicted.push(id.clone());
                    return false;
                }
                if unseen > config.stale_after {
                    marker.begin_fade();
                }
            }

            marker.advance(filters, dt, scale);
            marker.opacity += (marker.target_opacity - marker.opacity) * config.opacity_rate;
            marker.opacity = marker.opacity.clamp(0.0, 1.0);

            if marker.is_fading() && marker.opacity < config.fade_epsilon {
                debug!("Marker {} faded out", id);
                report.faded_out.push(id.clone());
                return false;
            }
            true
        });

        trace!("Advanced {} markers by {:.1}ms", self.markers.len(), dt * 1000.0);
        report
    }
}

impl Default for MarkerStore {
    fn default() -> Self {
        Self::new(LifecycleConfig::default())
    }
}
