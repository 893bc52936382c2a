//! ARHud: an augmented-reality heads-up display that keeps detector
//! annotations smoothly attached to objects in a moving camera view.

pub mod app;
pub mod build_info;
pub mod config;
pub mod detection;
pub mod distance;
pub mod geometry;
pub mod logging;
pub mod motion;
pub mod orientation;
pub mod pipeline;
pub mod render;
pub mod settings;
pub mod tracking;
pub mod utils;
pub mod widgets;
