//! Testing utilities for idcapture
//!
//! Synthetic frames for offline tests and benchmarks, so the detectors can be
//! exercised without a camera.

pub mod synthetic_frames;

pub use synthetic_frames::{
    add_glare_spot, box_blur, card_rect, card_scene, checkerboard, gray_field, id_card_scene,
    id_card_scene_at, BACKGROUND_RGB, CARD_RGB,
};
