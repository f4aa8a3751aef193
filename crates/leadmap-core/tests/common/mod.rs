// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

#![allow(dead_code)]

use leadmap_core::backend::{Backend, ClusterQuery, NewTerritory, RecordQuery};
use leadmap_core::geo::{LatLng, Region};
use leadmap_core::markers::{ClusterPoint, IndividualRecord, MarkerLayer};
use leadmap_core::session::MapSurface;
use leadmap_core::territory::{CountState, Territory, TerritoryId};
use leadmap_core::viewport::CameraTarget;
use leadmap_core::MapError;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

pub fn init_logging() {
    let _ = simplelog::TestLogger::init(simplelog::LevelFilter::Debug, simplelog::Config::default());
}

pub fn region(south: f64, west: f64, north: f64, east: f64) -> Region {
    Region::new(south, west, north, east).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Clusters(ClusterQuery),
    Records(RecordQuery),
    ListTerritories,
    Save(NewTerritory),
    Delete(TerritoryId),
    Count(Vec<LatLng>),
    Boundary(String),
    Assign(Vec<LatLng>, String),
}

/// In-memory backend. Every call is logged, then sleeps for the next
/// scripted delay (or `latency`) before answering.
pub struct MockBackend {
    pub calls: RefCell<Vec<Call>>,
    pub delays: RefCell<VecDeque<Duration>>,
    pub latency: Duration,
    pub records: Vec<IndividualRecord>,
    pub stored: Vec<Territory>,
    pub boundaries: HashMap<String, String>,
    pub failing_bucket: Option<u8>,
    pub fail_save: bool,
    pub count_total: u64,
    pub assigned: u64,
    pub next_id: Cell<u64>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            delays: RefCell::new(VecDeque::new()),
            latency: Duration::from_millis(50),
            records: Vec::new(),
            stored: Vec::new(),
            boundaries: HashMap::new(),
            failing_bucket: None,
            fail_save: false,
            count_total: 42,
            assigned: 3,
            next_id: Cell::new(100),
        }
    }
}

impl MockBackend {
    pub fn with_delays(self, delays: &[Duration]) -> Self {
        self.delays.borrow_mut().extend(delays.iter().copied());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn cluster_calls(&self) -> Vec<ClusterQuery> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Clusters(q) => Some(q),
                _ => None,
            })
            .collect()
    }

    pub fn record_calls(&self) -> Vec<RecordQuery> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Records(q) => Some(q),
                _ => None,
            })
            .collect()
    }

    async fn respond(&self, call: Call) {
        self.calls.borrow_mut().push(call);
        let delay = self.delays.borrow_mut().pop_front().unwrap_or(self.latency);
        tokio::time::sleep(delay).await;
    }
}

/// One cluster per bucket level, so responses for different buckets differ in size.
pub fn clusters_for(bucket: u8) -> Vec<ClusterPoint> {
    (0..bucket)
        .map(|i| ClusterPoint {
            latitude: 40.0 + i as f64 * 0.01,
            longitude: -111.0,
            count: 10 * (i as u64 + 1),
        })
        .collect()
}

pub fn record(id: i64, lat: f64, lng: f64) -> IndividualRecord {
    IndividualRecord {
        id,
        latitude: lat,
        longitude: lng,
        status: 0,
        assigned_owner: None,
    }
}

pub fn territory(id: &str, name: &str, ring: &[(f64, f64)]) -> Territory {
    Territory {
        id: TerritoryId::Stored(id.to_string()),
        name: name.to_string(),
        color: "#00FF00".to_string(),
        ring: ring.iter().map(|&(lat, lng)| LatLng::new(lat, lng)).collect(),
        created_at: None,
    }
}

impl Backend for MockBackend {
    async fn fetch_clusters(&self, query: &ClusterQuery) -> Result<Vec<ClusterPoint>, MapError> {
        self.respond(Call::Clusters(query.clone())).await;
        if self.failing_bucket == Some(query.bucket.0) {
            return Err(MapError::NetworkFailure("HTTP 503: unavailable".into()));
        }
        Ok(clusters_for(query.bucket.0))
    }

    async fn fetch_records(
        &self,
        query: &RecordQuery,
    ) -> Result<Vec<IndividualRecord>, MapError> {
        self.respond(Call::Records(query.clone())).await;
        Ok(self
            .records
            .iter()
            .filter(|r| {
                query
                    .region
                    .contains_point(&LatLng::new(r.latitude, r.longitude))
            })
            .cloned()
            .collect())
    }

    async fn list_territories(&self) -> Result<Vec<Territory>, MapError> {
        self.respond(Call::ListTerritories).await;
        Ok(self.stored.clone())
    }

    async fn save_territory(&self, territory: &NewTerritory) -> Result<Territory, MapError> {
        self.respond(Call::Save(territory.clone())).await;
        if self.fail_save {
            return Err(MapError::BackendRejection {
                status: 500,
                message: "insert failed".into(),
            });
        }
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Ok(Territory {
            id: TerritoryId::Stored(id.to_string()),
            name: territory.name.clone(),
            color: territory.color.clone(),
            ring: territory.coordinates.clone(),
            created_at: None,
        })
    }

    async fn delete_territory(&self, id: &TerritoryId) -> Result<(), MapError> {
        self.respond(Call::Delete(id.clone())).await;
        Ok(())
    }

    async fn territory_record_count(&self, ring: &[LatLng]) -> Result<u64, MapError> {
        self.respond(Call::Count(ring.to_vec())).await;
        Ok(self.count_total)
    }

    async fn postal_boundary(&self, zip: &str) -> Result<String, MapError> {
        self.respond(Call::Boundary(zip.to_string())).await;
        self.boundaries.get(zip).cloned().ok_or_else(|| {
            MapError::InvalidGeometry(format!("No polygon found for zip code {}", zip))
        })
    }

    async fn assign_records(&self, ring: &[LatLng], owner: &str) -> Result<u64, MapError> {
        self.respond(Call::Assign(ring.to_vec(), owner.to_string()))
            .await;
        Ok(self.assigned)
    }
}

#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub marker_renders: usize,
    pub marker_count: usize,
    pub territory_names: Vec<String>,
    pub candidate: Vec<LatLng>,
    pub banners: Vec<String>,
    pub fitted: Vec<Region>,
    pub moves: Vec<CameraTarget>,
    pub counts: Vec<(TerritoryId, CountState)>,
}

impl MapSurface for RecordingSurface {
    fn render_markers(&mut self, markers: &MarkerLayer) {
        self.marker_renders += 1;
        self.marker_count = markers.len();
    }

    fn render_territories(&mut self, territories: &[Territory]) {
        self.territory_names = territories.iter().map(|t| t.name.clone()).collect();
    }

    fn render_candidate(&mut self, ring: &[LatLng]) {
        self.candidate = ring.to_vec();
    }

    fn show_banner(&mut self, message: &str) {
        self.banners.push(message.to_string());
    }

    fn fit_bounds(&mut self, bounds: &Region) {
        self.fitted.push(*bounds);
    }

    fn move_camera(&mut self, target: &CameraTarget) {
        self.moves.push(*target);
    }

    fn show_count(&mut self, id: &TerritoryId, state: &CountState) {
        self.counts.push((id.clone(), state.clone()));
    }
}
