//! Per-frame image primitives: pixel color math, the background model and the two
//! frame-level detectors built on them.

pub mod background_model;
pub mod fire_detector;
pub mod motion_gate;
pub mod pixel;
