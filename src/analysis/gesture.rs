//! Swipe recognition
//!
//! Pure geometric classification of a fling: horizontal-dominant motion that
//! clears both the distance and velocity thresholds is a swipe.

use crate::config::GestureSettings;

/// Direction of a recognized swipe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Swipe {
    Left,
    Right,
}

/// A completed touch fling: down position, up position, release velocity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fling {
    pub start: (f32, f32),
    pub end: (f32, f32),
    /// Pixels per second
    pub velocity: (f32, f32),
}

/// Classifies flings into swipes
#[derive(Debug, Clone, Copy)]
pub struct SwipeDetector {
    distance_threshold: f32,
    velocity_threshold: f32,
}

impl SwipeDetector {
    pub fn new(settings: &GestureSettings) -> Self {
        Self {
            distance_threshold: settings.distance_threshold,
            velocity_threshold: settings.velocity_threshold,
        }
    }

    /// Classify a fling; `None` for vertical-dominant or sub-threshold motion
    pub fn classify(&self, fling: &Fling) -> Option<Swipe> {
        let dx = fling.end.0 - fling.start.0;
        let dy = fling.end.1 - fling.start.1;

        let is_swipe = dx.abs() > dy.abs()
            && dx.abs() > self.distance_threshold
            && fling.velocity.0.abs() > self.velocity_threshold;
        if !is_swipe {
            return None;
        }

        Some(if dx > 0.0 { Swipe::Right } else { Swipe::Left })
    }
}

impl Default for SwipeDetector {
    fn default() -> Self {
        Self::new(&GestureSettings::default())
    }
}
