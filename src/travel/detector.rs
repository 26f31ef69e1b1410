//! Moving→stopped edge detection.
//!
//! The detector remembers the most recent moving mode it has seen. A slow
//! evaluation while that memory is armed reports a stop and disarms it, so a
//! single stop produces a single recording no matter how many slow ticks
//! follow. The stop threshold is wider than the stationary band used for
//! classification: a 0-4 km/h sample classifies as stationary and is also the
//! regime that fires the stop.

use super::mode::{ModeThresholds, TravelMode, speed_to_kmh};

/// Result of feeding one speed reading through the detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub mode: TravelMode,
    pub speed_kmh: f64,
    /// Set when this reading completed a moving→stopped transition.
    pub stop_detected: bool,
    /// Moving mode that was armed when the stop fired.
    pub stopped_from: Option<TravelMode>,
}

/// Stateful stop detector owned by a single recorder.
#[derive(Debug, Clone, Default)]
pub struct TransitionDetector {
    thresholds: ModeThresholds,
    last_moving_mode: Option<TravelMode>,
}

impl TransitionDetector {
    /// Build a detector; `thresholds` are normalized first.
    pub fn new(thresholds: ModeThresholds) -> Self {
        Self {
            thresholds: thresholds.normalized(),
            last_moving_mode: None,
        }
    }

    pub fn thresholds(&self) -> &ModeThresholds {
        &self.thresholds
    }

    /// Moving mode currently armed, if any.
    pub fn last_moving_mode(&self) -> Option<TravelMode> {
        self.last_moving_mode
    }

    /// Forget any armed moving mode.
    pub fn reset(&mut self) {
        self.last_moving_mode = None;
    }

    /// Classify `speed_mps` and update the moving-mode memory.
    pub fn evaluate(&mut self, speed_mps: f64) -> Evaluation {
        let speed_kmh = speed_to_kmh(speed_mps);
        let mode = self.thresholds.classify_kmh(speed_kmh);

        let armed = self.last_moving_mode.filter(|armed| armed.is_moving());
        let stop_detected = armed.is_some() && self.thresholds.is_stopped_kmh(speed_kmh);
        if stop_detected {
            self.last_moving_mode = None;
        }
        if mode.is_moving() {
            self.last_moving_mode = Some(mode);
        }

        Evaluation {
            mode,
            speed_kmh,
            stop_detected,
            stopped_from: armed.filter(|_| stop_detected),
        }
    }
}
