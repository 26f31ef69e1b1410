use serde::{Deserialize, Serialize};

const MPS_TO_KMH: f64 = 3.6;

/// Motion state derived from ground speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TravelMode {
    #[default]
    Stationary,
    Bicycle,
    Driving,
}

impl TravelMode {
    /// Return true for the modes that arm the stop detector.
    pub fn is_moving(self) -> bool {
        matches!(self, Self::Bicycle | Self::Driving)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Stationary => "stationary",
            Self::Bicycle => "bicycle",
            Self::Driving => "driving",
        }
    }
}

impl std::fmt::Display for TravelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Speed cut-offs in km/h.
///
/// Config keys (TOML `[thresholds]`): `bicycle_kmh`, `driving_kmh`, `stop_kmh`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModeThresholds {
    /// Speeds strictly above this are at least cycling.
    #[serde(default = "default_bicycle_kmh")]
    pub bicycle_kmh: f64,
    /// Speeds strictly above this are driving.
    #[serde(default = "default_driving_kmh")]
    pub driving_kmh: f64,
    /// Speeds strictly below this count as stopped after moving.
    #[serde(default = "default_stop_kmh")]
    pub stop_kmh: f64,
}

impl Default for ModeThresholds {
    fn default() -> Self {
        Self {
            bicycle_kmh: default_bicycle_kmh(),
            driving_kmh: default_driving_kmh(),
            stop_kmh: default_stop_kmh(),
        }
    }
}

impl ModeThresholds {
    /// Replace unusable values with defaults and keep the bands ordered.
    ///
    /// The stop threshold never exceeds the cycling threshold, so a speed
    /// that fires a stop always classifies as stationary.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        let usable = |value: f64, fallback: f64| {
            if value.is_finite() && value >= 0.0 {
                value
            } else {
                fallback
            }
        };
        let bicycle_kmh = usable(self.bicycle_kmh, defaults.bicycle_kmh);
        let driving_kmh = usable(self.driving_kmh, defaults.driving_kmh).max(bicycle_kmh);
        let stop_kmh = usable(self.stop_kmh, defaults.stop_kmh).min(bicycle_kmh);
        Self {
            bicycle_kmh,
            driving_kmh,
            stop_kmh,
        }
    }

    /// Classify a speed already expressed in km/h.
    pub fn classify_kmh(&self, speed_kmh: f64) -> TravelMode {
        if speed_kmh == 0.0 {
            TravelMode::Stationary
        } else if speed_kmh > self.driving_kmh {
            TravelMode::Driving
        } else if speed_kmh > self.bicycle_kmh {
            TravelMode::Bicycle
        } else {
            TravelMode::Stationary
        }
    }

    /// Classify a raw ground speed in m/s.
    pub fn classify(&self, speed_mps: f64) -> TravelMode {
        self.classify_kmh(speed_to_kmh(speed_mps))
    }

    pub fn is_stopped_kmh(&self, speed_kmh: f64) -> bool {
        speed_kmh < self.stop_kmh
    }
}

/// Convert m/s to km/h, treating negative and NaN speeds as zero.
pub fn speed_to_kmh(speed_mps: f64) -> f64 {
    speed_mps.max(0.0) * MPS_TO_KMH
}

/// Classify a raw ground speed in m/s with the default thresholds.
pub fn classify(speed_mps: f64) -> TravelMode {
    ModeThresholds::default().classify(speed_mps)
}

fn default_bicycle_kmh() -> f64 {
    8.0
}

fn default_driving_kmh() -> f64 {
    40.0
}

fn default_stop_kmh() -> f64 {
    4.0
}
