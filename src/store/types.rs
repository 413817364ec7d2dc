//! Value types exchanged with the time-series store.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a building (house) in the dataset.
pub type BuildingId = u32;

/// A single power reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerSample {
    /// Time the reading was taken
    pub timestamp: DateTime<Utc>,
    /// Power in watts
    pub power: f64,
}

impl PowerSample {
    /// Create a reading.
    pub fn new(timestamp: DateTime<Utc>, power: f64) -> Self {
        Self { timestamp, power }
    }

    /// Timestamp in milliseconds since the Unix epoch.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Which meter of a building to read.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Meter {
    /// Aggregate whole-premises meter
    Mains,
    /// Sub-meter of a single named appliance
    Appliance(String),
}

impl Meter {
    /// Sub-meter of the named appliance.
    pub fn appliance(name: impl Into<String>) -> Self {
        Meter::Appliance(name.into())
    }
}

impl std::fmt::Display for Meter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Meter::Mains => write!(f, "mains"),
            Meter::Appliance(name) => write!(f, "appliance '{name}'"),
        }
    }
}

/// A half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFrame {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeFrame {
    /// Create the frame `[start, end)`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Check if a timestamp falls within this frame.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start && timestamp < self.end
    }

    /// True when the frame covers no instant.
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Length of the frame; zero for empty frames.
    pub fn duration(&self) -> Duration {
        if self.is_empty() {
            Duration::zero()
        } else {
            self.end - self.start
        }
    }

    /// The period covered by both frames, if any.
    pub fn overlap(&self, other: &TimeFrame) -> Option<TimeFrame> {
        let frame = TimeFrame {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        };
        (!frame.is_empty()).then_some(frame)
    }

    /// Split the frame into consecutive sub-frames of at most `chunk` length.
    ///
    /// The last sub-frame is clamped to the end of this frame. A non-positive
    /// chunk length yields no sub-frames.
    pub fn chunks(&self, chunk: Duration) -> TimeFrameChunks {
        TimeFrameChunks {
            frame: *self,
            next_start: self.start,
            chunk,
        }
    }
}

/// Iterator over the consecutive sub-frames of a [`TimeFrame`].
#[derive(Debug, Clone)]
pub struct TimeFrameChunks {
    frame: TimeFrame,
    next_start: DateTime<Utc>,
    chunk: Duration,
}

impl Iterator for TimeFrameChunks {
    type Item = TimeFrame;

    fn next(&mut self) -> Option<TimeFrame> {
        if self.chunk <= Duration::zero() || self.next_start >= self.frame.end {
            return None;
        }

        let end = self
            .next_start
            .checked_add_signed(self.chunk)
            .map_or(self.frame.end, |end| end.min(self.frame.end));
        let chunk = TimeFrame::new(self.next_start, end);
        self.next_start = end;
        Some(chunk)
    }
}

/// Errors reported by a time-series store.
#[derive(Debug)]
pub enum StoreError {
    /// The store has no such meter for the building
    UnknownMeter { building: BuildingId, meter: Meter },
    /// The meter exists but holds no readings
    EmptyMeter { building: BuildingId, meter: Meter },
    /// Backend failure while reading
    Read(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::UnknownMeter { building, meter } => {
                write!(f, "Building {building} has no {meter} meter")
            }
            StoreError::EmptyMeter { building, meter } => {
                write!(f, "The {meter} meter of building {building} has no readings")
            }
            StoreError::Read(e) => write!(f, "Read error: {e}"),
        }
    }
}

impl std::error::Error for StoreError {}
