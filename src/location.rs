//! Position fixes and the latest-value cell that holds them.
//!
//! Fixes arrive from an asynchronous delivery channel and only the most recent
//! one matters, so the cell is a single mutex-guarded slot rather than a queue.

use std::sync::{
    Mutex,
    atomic::{AtomicU8, Ordering},
};

use time::OffsetDateTime;

/// One momentary position and velocity reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: OffsetDateTime,
    pub latitude: f64,
    pub longitude: f64,
    /// Meters above sea level.
    pub altitude: f64,
    /// Ground speed in meters per second; negative when the fix has no valid speed.
    pub speed: f64,
    /// Radius of uncertainty in meters.
    pub horizontal_accuracy: f64,
}

impl Sample {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.6}, {:.6}", self.latitude, self.longitude)
    }
}

/// Location permission state reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AuthorizationStatus {
    #[default]
    NotDetermined = 0,
    Restricted = 1,
    Denied = 2,
    AuthorizedAlways = 3,
    AuthorizedWhenInUse = 4,
}

impl AuthorizationStatus {
    /// Return true when recording is permitted.
    pub fn is_granted(self) -> bool {
        matches!(self, Self::AuthorizedAlways | Self::AuthorizedWhenInUse)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Restricted,
            2 => Self::Denied,
            3 => Self::AuthorizedAlways,
            4 => Self::AuthorizedWhenInUse,
            _ => Self::NotDetermined,
        }
    }
}

/// Read side of a positioning provider, as seen by the recorder.
pub trait SampleSource: Send + Sync {
    /// Most recent fix, if any has been delivered yet.
    fn latest_sample(&self) -> Option<Sample>;

    /// Whether the user granted location access.
    fn is_authorized(&self) -> bool;
}

/// Single-slot cell holding the newest delivered fix.
#[derive(Debug, Default)]
pub struct LatestSample {
    slot: Mutex<Option<Sample>>,
    authorization: AtomicU8,
}

impl LatestSample {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cell that already reports the given permission state.
    pub fn with_authorization(status: AuthorizationStatus) -> Self {
        let cell = Self::new();
        cell.set_authorization(status);
        cell
    }

    /// Replace the stored fix.
    pub fn publish(&self, sample: Sample) {
        match self.slot.lock() {
            Ok(mut guard) => *guard = Some(sample),
            Err(poisoned) => *poisoned.into_inner() = Some(sample),
        }
    }

    /// Store the last fix of a delivered batch; an empty batch leaves the cell untouched.
    pub fn publish_batch(&self, samples: impl IntoIterator<Item = Sample>) {
        if let Some(last) = samples.into_iter().last() {
            self.publish(last);
        }
    }

    /// Forget the stored fix.
    pub fn clear(&self) {
        match self.slot.lock() {
            Ok(mut guard) => *guard = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        self.authorization.store(status as u8, Ordering::Release);
    }

    pub fn authorization(&self) -> AuthorizationStatus {
        AuthorizationStatus::from_u8(self.authorization.load(Ordering::Acquire))
    }
}

impl SampleSource for LatestSample {
    fn latest_sample(&self) -> Option<Sample> {
        match self.slot.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn is_authorized(&self) -> bool {
        self.authorization().is_granted()
    }
}

#[cfg(test)]
pub(crate) fn sample_at(unix_seconds: i64, speed: f64) -> Sample {
    Sample {
        timestamp: OffsetDateTime::from_unix_timestamp(unix_seconds)
            .expect("test timestamp in range"),
        latitude: 22.3193,
        longitude: 114.1694,
        altitude: 12.0,
        speed,
        horizontal_accuracy: 5.0,
    }
}
