//! Slicing aligned series into fixed-length training windows.
//!
//! Windows are non-overlapping and copied out of the series. A trailing
//! remainder shorter than one window is dropped rather than padded.

use crate::config::ConfigError;
use crate::core::alignment::AlignedSeries;
use chrono::{DateTime, Utc};

/// A fixed-length slice of mains and appliance values.
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    /// Timestamp of the first sample
    pub start: DateTime<Utc>,
    /// Normalized mains values
    pub mains: Vec<f64>,
    /// Masked and clipped appliance values
    pub appliance: Vec<f64>,
}

impl Window {
    /// Number of samples in the window.
    pub fn len(&self) -> usize {
        self.mains.len()
    }

    /// True for a zero-length window.
    pub fn is_empty(&self) -> bool {
        self.mains.is_empty()
    }
}

/// Cuts aligned series into windows of `window_size` samples.
#[derive(Debug, Clone, Copy)]
pub struct WindowSegmenter {
    window_size: usize,
}

impl WindowSegmenter {
    /// Create a segmenter; `window_size` must be positive.
    pub fn new(window_size: usize) -> Result<Self, ConfigError> {
        if window_size == 0 {
            return Err(ConfigError::Invalid("window_size must be positive".to_string()));
        }
        Ok(Self { window_size })
    }

    /// Samples per window.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of whole windows in a series of `len` samples.
    pub fn window_count(&self, len: usize) -> usize {
        len / self.window_size
    }

    /// The `index`-th window of a series, if the series is long enough.
    pub fn window_at(&self, series: &AlignedSeries, index: usize) -> Option<Window> {
        if index >= self.window_count(series.len()) {
            return None;
        }

        let range = index * self.window_size..(index + 1) * self.window_size;
        Some(Window {
            start: series.timestamps()[range.start],
            mains: series.mains()[range.clone()].to_vec(),
            appliance: series.appliance()[range].to_vec(),
        })
    }

    /// Lazily iterate over all windows of a series.
    ///
    /// Calling this again restarts from the first window.
    pub fn segment<'a>(&self, series: &'a AlignedSeries) -> Windows<'a> {
        Windows {
            segmenter: *self,
            series,
            next: 0,
        }
    }
}

/// Iterator over the windows of one series.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    segmenter: WindowSegmenter,
    series: &'a AlignedSeries,
    next: usize,
}

impl Iterator for Windows<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        let window = self.segmenter.window_at(self.series, self.next)?;
        self.next += 1;
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self
            .segmenter
            .window_count(self.series.len())
            .saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Windows<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn series(len: usize) -> AlignedSeries {
        let timestamps = (0..len)
            .map(|i| Utc.timestamp_opt(i as i64 * 6, 0).unwrap())
            .collect();
        let mains = (0..len).map(|i| i as f64).collect();
        let appliance = (0..len).map(|i| (i * 10) as f64).collect();
        AlignedSeries::new(timestamps, mains, appliance).unwrap()
    }

    #[test]
    fn test_trailing_samples_dropped() {
        let segmenter = WindowSegmenter::new(4).unwrap();
        let windows: Vec<Window> = segmenter.segment(&series(10)).collect();

        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].mains, vec![0.0, 1.0, 2.0, 3.0]);
        assert_eq!(windows[1].mains, vec![4.0, 5.0, 6.0, 7.0]);
        assert_eq!(windows[1].appliance, vec![40.0, 50.0, 60.0, 70.0]);
        assert_eq!(windows[1].start, Utc.timestamp_opt(24, 0).unwrap());
    }

    #[test]
    fn test_windows_tile_the_series() {
        for window_size in 1..=7 {
            let segmenter = WindowSegmenter::new(window_size).unwrap();
            for len in 0..30 {
                let s = series(len);
                let windows: Vec<Window> = segmenter.segment(&s).collect();

                assert_eq!(windows.len(), len / window_size);
                let covered: Vec<f64> = windows.iter().flat_map(|w| w.mains.clone()).collect();
                assert_eq!(covered, s.mains()[..windows.len() * window_size].to_vec());
                assert!(windows.iter().all(|w| w.len() == window_size));
            }
        }
    }

    #[test]
    fn test_series_shorter_than_window() {
        let segmenter = WindowSegmenter::new(8).unwrap();
        assert_eq!(segmenter.segment(&series(7)).count(), 0);
        assert!(segmenter.window_at(&series(7), 0).is_none());
    }

    #[test]
    fn test_segment_restarts() {
        let segmenter = WindowSegmenter::new(3).unwrap();
        let s = series(9);

        let mut windows = segmenter.segment(&s);
        assert_eq!(windows.len(), 3);
        windows.next();
        assert_eq!(windows.len(), 2);

        let first_again = segmenter.segment(&s).next().unwrap();
        assert_eq!(first_again.mains, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_zero_window_size_rejected() {
        assert!(WindowSegmenter::new(0).is_err());
    }
}
