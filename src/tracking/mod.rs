//! Tracked markers: the smoothed visual state mirrored from detections, the
//! keyed store that owns it, and the reconciler that folds each detector
//! cycle into the store.

pub mod marker;
pub mod reconciler;
pub mod store;

pub use marker::{FrameSize, MarkerFilters, MarkerShape, MarkerSource, SmoothedKeypoint, TrackedMarker};
pub use reconciler::{ReconcileReport, Reconciler, ReconcilerConfig};
pub use store::{AdvanceReport, LifecycleConfig, MarkerStore};
