// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::geo::LatLng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MIN_CLUSTER_SCALE: f64 = 20.0;
const MAX_CLUSTER_SCALE: f64 = 50.0;

/// One aggregated point returned by the cluster query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub count: u64,
}

/// One geolocated record shown in individual mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualRecord {
    pub id: i64,
    pub latitude: f64,
    pub longitude: f64,
    /// Small backend status code, 0 when absent.
    #[serde(default)]
    pub status: u8,
    #[serde(default, alias = "user_id")]
    pub assigned_owner: Option<String>,
}

/// Stable identity of a rendered marker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MarkerId {
    /// Clusters are keyed by their position in micro-degrees.
    Cluster { lat_e6: i64, lng_e6: i64 },
    Record(i64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MarkerKind {
    Cluster { count: u64, scale: f64 },
    Record { status: u8, owner: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: MarkerId,
    pub position: LatLng,
    pub kind: MarkerKind,
}

impl Marker {
    pub fn from_cluster(point: &ClusterPoint) -> Option<Self> {
        let position = LatLng::new(point.latitude, point.longitude);
        if !position.is_finite() {
            return None;
        }
        Some(Self {
            id: MarkerId::Cluster {
                lat_e6: (point.latitude * 1e6).round() as i64,
                lng_e6: (point.longitude * 1e6).round() as i64,
            },
            position,
            kind: MarkerKind::Cluster {
                count: point.count,
                scale: cluster_scale(point.count),
            },
        })
    }

    pub fn from_record(record: &IndividualRecord) -> Option<Self> {
        let position = LatLng::new(record.latitude, record.longitude);
        if !position.is_finite() {
            return None;
        }
        Some(Self {
            id: MarkerId::Record(record.id),
            position,
            kind: MarkerKind::Record {
                status: record.status,
                owner: record.assigned_owner.clone(),
            },
        })
    }

    pub fn is_assigned(&self) -> bool {
        matches!(&self.kind, MarkerKind::Record { owner: Some(_), .. })
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self.kind, MarkerKind::Cluster { .. })
    }
}

/// Marker radius for a cluster: linear in count, saturating at 1000.
pub fn cluster_scale(count: u64) -> f64 {
    let normalized = ((count.max(1) - 1) as f64 / 999.0).clamp(0.0, 1.0);
    MIN_CLUSTER_SCALE + normalized * (MAX_CLUSTER_SCALE - MIN_CLUSTER_SCALE)
}

/// The marker set currently published to the map.
///
/// `revision` increases on every mutation so a renderer can skip redraws.
#[derive(Debug, Default)]
pub struct MarkerLayer {
    markers: BTreeMap<MarkerId, Marker>,
    revision: u64,
}

impl MarkerLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace_all<I: IntoIterator<Item = Marker>>(&mut self, markers: I) {
        self.markers = markers.into_iter().map(|m| (m.id.clone(), m)).collect();
        self.revision += 1;
    }

    /// Adds markers not already present. Returns how many were new.
    pub fn merge_add<I: IntoIterator<Item = Marker>>(&mut self, markers: I) -> usize {
        let mut added = 0;
        for marker in markers {
            if !self.markers.contains_key(&marker.id) {
                self.markers.insert(marker.id.clone(), marker);
                added += 1;
            }
        }
        self.revision += 1;
        added
    }

    pub fn clear(&mut self) {
        if !self.markers.is_empty() {
            self.markers.clear();
            self.revision += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn get(&self, id: &MarkerId) -> Option<&Marker> {
        self.markers.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    pub fn cluster_count(&self) -> usize {
        self.iter().filter(|m| m.is_cluster()).count()
    }

    pub fn record_count(&self) -> usize {
        self.iter().filter(|m| !m.is_cluster()).count()
    }
}
