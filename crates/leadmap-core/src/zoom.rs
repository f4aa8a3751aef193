// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use serde::{Deserialize, Serialize};
use std::fmt;

/// Aggregation granularity requested from the cluster query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResolutionBucket(pub u8);

/// Bucket whose aggregate covers the whole dataset and is cached under one key.
pub const GLOBAL_BUCKET: ResolutionBucket = ResolutionBucket(5);

/// Zoom at or above which individual records replace clusters.
pub const DEFAULT_DISPLAY_THRESHOLD: f64 = 12.0;

// Evaluated top-down, first matching lower bound wins.
const BUCKET_TABLE: [(f64, u8); 5] = [(12.0, 10), (11.0, 9), (10.0, 8), (8.0, 6), (3.0, 5)];

impl ResolutionBucket {
    pub fn is_global(&self) -> bool {
        *self == GLOBAL_BUCKET
    }
}

impl fmt::Display for ResolutionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Maps a continuous zoom level onto its resolution bucket.
///
/// Below the lowest table entry the rounded zoom is used directly.
/// Non-finite or negative zooms fall to bucket 0.
pub fn bucket_for(zoom: f64) -> ResolutionBucket {
    for &(min_zoom, bucket) in BUCKET_TABLE.iter() {
        if zoom >= min_zoom {
            return ResolutionBucket(bucket);
        }
    }
    let rounded = zoom.round();
    if rounded.is_finite() && rounded > 0.0 {
        ResolutionBucket(rounded as u8)
    } else {
        ResolutionBucket(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    Clustered,
    Individual,
}

impl DisplayMode {
    pub fn for_zoom(zoom: f64, threshold: f64) -> Self {
        if zoom >= threshold {
            DisplayMode::Individual
        } else {
            DisplayMode::Clustered
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_table() {
        assert_eq!(bucket_for(18.0), ResolutionBucket(10));
        assert_eq!(bucket_for(12.0), ResolutionBucket(10));
        assert_eq!(bucket_for(11.5), ResolutionBucket(9));
        assert_eq!(bucket_for(10.0), ResolutionBucket(8));
        assert_eq!(bucket_for(9.0), ResolutionBucket(6));
        assert_eq!(bucket_for(8.0), ResolutionBucket(6));
        assert_eq!(bucket_for(5.0), ResolutionBucket(5));
        assert_eq!(bucket_for(3.0), ResolutionBucket(5));
        assert_eq!(bucket_for(2.4), ResolutionBucket(2));
        assert_eq!(bucket_for(0.0), ResolutionBucket(0));
        assert_eq!(bucket_for(f64::NAN), ResolutionBucket(0));
    }

    #[test]
    fn test_bucket_never_increases_as_zoom_decreases() {
        let mut previous = bucket_for(22.0);
        let mut zoom = 22.0;
        while zoom >= 0.0 {
            let current = bucket_for(zoom);
            assert!(
                current <= previous,
                "bucket rose from {} to {} at zoom {}",
                previous,
                current,
                zoom
            );
            previous = current;
            zoom -= 0.05;
        }
    }

    #[test]
    fn test_zoom_five_is_global() {
        assert!(bucket_for(5.0).is_global());
        assert!(!bucket_for(9.0).is_global());
    }

    #[test]
    fn test_display_mode() {
        assert_eq!(
            DisplayMode::for_zoom(12.0, DEFAULT_DISPLAY_THRESHOLD),
            DisplayMode::Individual
        );
        assert_eq!(
            DisplayMode::for_zoom(11.9, DEFAULT_DISPLAY_THRESHOLD),
            DisplayMode::Clustered
        );
    }
}
