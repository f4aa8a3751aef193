// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::geo::Region;
use crate::markers::ClusterPoint;
use crate::sequencer::FetchTicket;
use crate::zoom::ResolutionBucket;
use log::debug;
use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;

// 4 decimal degrees, roughly 11 m at the equator.
const KEY_SCALE: f64 = 1e4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClusterKey {
    /// The whole-dataset aggregate, identical for every pan.
    Global(ResolutionBucket),
    Scoped {
        bucket: ResolutionBucket,
        south: i64,
        west: i64,
        north: i64,
        east: i64,
    },
}

impl ClusterKey {
    pub fn new(bucket: ResolutionBucket, expanded: &Region) -> Self {
        if bucket.is_global() {
            return ClusterKey::Global(bucket);
        }
        ClusterKey::Scoped {
            bucket,
            south: quantize(expanded.south),
            west: quantize(expanded.west),
            north: quantize(expanded.north),
            east: quantize(expanded.east),
        }
    }

    pub fn bucket(&self) -> ResolutionBucket {
        match self {
            ClusterKey::Global(bucket) => *bucket,
            ClusterKey::Scoped { bucket, .. } => *bucket,
        }
    }
}

fn quantize(degrees: f64) -> i64 {
    (degrees * KEY_SCALE).round() as i64
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterKey::Global(bucket) => write!(f, "zoom_{}_all", bucket),
            ClusterKey::Scoped {
                bucket,
                south,
                west,
                north,
                east,
            } => write!(
                f,
                "zoom_{}_sw_{:.4}_{:.4}_ne_{:.4}_{:.4}",
                bucket,
                *south as f64 / KEY_SCALE,
                *west as f64 / KEY_SCALE,
                *north as f64 / KEY_SCALE,
                *east as f64 / KEY_SCALE
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: ClusterKey,
    pub points: Vec<ClusterPoint>,
    pub inserted_at: FetchTicket,
}

/// Memoized cluster responses for the session.
///
/// Unbounded unless a capacity is configured, in which case the least
/// recently published key is dropped first.
pub struct ClusterCache {
    entries: LruCache<ClusterKey, CacheEntry>,
}

impl Default for ClusterCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterCache {
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
        }
    }

    pub fn with_capacity(capacity: Option<NonZeroUsize>) -> Self {
        match capacity {
            Some(cap) => Self {
                entries: LruCache::new(cap),
            },
            None => Self::new(),
        }
    }

    pub fn get(&mut self, key: &ClusterKey) -> Option<&[ClusterPoint]> {
        self.entries.get(key).map(|entry| entry.points.as_slice())
    }

    pub fn contains(&self, key: &ClusterKey) -> bool {
        self.entries.contains(key)
    }

    /// Stores a response. Existing entries are never replaced; returns
    /// `false` when the key was already cached.
    pub fn put(&mut self, key: ClusterKey, points: Vec<ClusterPoint>, ticket: FetchTicket) -> bool {
        if self.entries.contains(&key) {
            debug!("Cluster key already cached; keeping first entry — key={}", key);
            return false;
        }
        debug!(
            "Caching clusters — key={} points={} ticket={}",
            key,
            points.len(),
            ticket
        );
        self.entries.put(
            key,
            CacheEntry {
                key,
                points,
                inserted_at: ticket,
            },
        );
        true
    }

    pub fn entry(&self, key: &ClusterKey) -> Option<&CacheEntry> {
        self.entries.peek(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Regions already fetched in individual-record mode.
#[derive(Debug, Default)]
pub struct CoverageCache {
    regions: Vec<Region>,
}

impl CoverageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_covered(&self, region: &Region) -> bool {
        self.regions.iter().any(|covered| covered.contains(region))
    }

    pub fn record(&mut self, region: Region) {
        self.regions.push(region);
    }

    pub fn reset(&mut self) {
        if !self.regions.is_empty() {
            debug!("Resetting record coverage — regions={}", self.regions.len());
        }
        self.regions.clear();
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
