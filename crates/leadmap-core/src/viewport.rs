// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Cluster-versus-individual orchestration for one map view.
//!
//! The controller never performs I/O. Each settled evaluation returns at most
//! one [`FetchCommand`]; the caller runs it against a backend and hands the
//! outcome back through [`ViewportController::complete_clusters`] or
//! [`ViewportController::complete_records`]. Only the latest ticket of each
//! stream may change markers or caches.

use crate::backend::{ClusterQuery, RecordQuery};
use crate::cache::{ClusterCache, ClusterKey, CoverageCache};
use crate::config::ViewportConfig;
use crate::filter::RecordFilter;
use crate::geo::{LatLng, Region};
use crate::markers::{ClusterPoint, IndividualRecord, Marker, MarkerLayer};
use crate::sequencer::{FetchTicket, RequestSequencer};
use crate::zoom::{bucket_for, DisplayMode, ResolutionBucket};
use crate::MapError;
use log::{debug, info, warn};

/// Zoom levels added when a cluster marker is clicked.
pub const CLUSTER_CLICK_ZOOM_STEP: f64 = 2.0;

/// What the map reports once it has settled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub zoom: f64,
    /// `None` until the map has laid out.
    pub bounds: Option<Region>,
}

impl Camera {
    pub fn new(zoom: f64, bounds: Region) -> Self {
        Self {
            zoom,
            bounds: Some(bounds),
        }
    }
}

/// A requested camera move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraTarget {
    pub center: LatLng,
    pub zoom: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterFetch {
    pub ticket: FetchTicket,
    pub key: ClusterKey,
    pub query: ClusterQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFetch {
    pub ticket: FetchTicket,
    pub query: RecordQuery,
    /// Replace the marker set instead of merging into it (filters changed).
    pub replace: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FetchCommand {
    Clusters(ClusterFetch),
    Records(RecordFetch),
}

#[derive(Debug)]
pub enum Applied {
    Published,
    /// Superseded by a newer ticket; nothing changed.
    Stale,
    /// The fetch failed; the previous markers are untouched.
    Failed(MapError),
}

pub struct ViewportController {
    config: ViewportConfig,
    mode: Option<DisplayMode>,
    published_bucket: Option<ResolutionBucket>,
    inflight_bucket: Option<ResolutionBucket>,
    inflight_records: Option<Region>,
    cluster_seq: RequestSequencer,
    record_seq: RequestSequencer,
    clusters: ClusterCache,
    coverage: CoverageCache,
    markers: MarkerLayer,
    filters: Vec<RecordFilter>,
    replace_records: bool,
}

impl ViewportController {
    pub fn new(config: ViewportConfig) -> Self {
        let clusters = ClusterCache::with_capacity(config.cluster_cache_capacity);
        Self {
            config,
            mode: None,
            published_bucket: None,
            inflight_bucket: None,
            inflight_records: None,
            cluster_seq: RequestSequencer::new(),
            record_seq: RequestSequencer::new(),
            clusters,
            coverage: CoverageCache::new(),
            markers: MarkerLayer::new(),
            filters: Vec::new(),
            replace_records: false,
        }
    }

    pub fn mode(&self) -> Option<DisplayMode> {
        self.mode
    }

    pub fn markers(&self) -> &MarkerLayer {
        &self.markers
    }

    pub fn filters(&self) -> &[RecordFilter] {
        &self.filters
    }

    pub fn cluster_cache(&self) -> &ClusterCache {
        &self.clusters
    }

    pub fn coverage(&self) -> &CoverageCache {
        &self.coverage
    }

    /// One settled evaluation of the camera.
    pub fn evaluate(&mut self, camera: &Camera) -> Option<FetchCommand> {
        let viewport = match camera.bounds {
            Some(bounds) if bounds.is_valid() && camera.zoom.is_finite() => bounds,
            _ => {
                debug!(
                    "Skipping evaluation; map bounds not ready — zoom={} bounds={:?}",
                    camera.zoom, camera.bounds
                );
                return None;
            }
        };

        let target = DisplayMode::for_zoom(camera.zoom, self.config.display_threshold);
        let previous = self.mode.replace(target);
        match (previous, target) {
            (Some(DisplayMode::Clustered), DisplayMode::Individual) => {
                info!("Switching to individual records — zoom={}", camera.zoom);
                self.leave_clustered();
                self.fetch_records(&viewport)
            }
            (Some(DisplayMode::Individual), DisplayMode::Clustered) => {
                info!("Switching to clusters — zoom={}", camera.zoom);
                self.leave_individual();
                self.fetch_clusters(bucket_for(camera.zoom), &viewport)
            }
            (_, DisplayMode::Clustered) => {
                let bucket = bucket_for(camera.zoom);
                if self.inflight_bucket == Some(bucket) {
                    debug!("Cluster bucket already in flight — bucket={}", bucket);
                    return None;
                }
                if self.published_bucket == Some(bucket) {
                    if let Some(pending) = self.inflight_bucket.take() {
                        // Back on the published bucket; the pending one must not land.
                        debug!("Dropping in-flight cluster fetch — bucket={}", pending);
                        self.cluster_seq.invalidate();
                    }
                    debug!("Cluster bucket unchanged — bucket={}", bucket);
                    return None;
                }
                self.fetch_clusters(bucket, &viewport)
            }
            (_, DisplayMode::Individual) => self.fetch_records(&viewport),
        }
    }

    fn leave_clustered(&mut self) {
        self.markers.clear();
        self.cluster_seq.invalidate();
        self.inflight_bucket = None;
        self.published_bucket = None;
    }

    fn leave_individual(&mut self) {
        self.markers.clear();
        self.coverage.reset();
        self.record_seq.invalidate();
        self.inflight_records = None;
    }

    fn fetch_clusters(&mut self, bucket: ResolutionBucket, viewport: &Region) -> Option<FetchCommand> {
        let expanded = viewport.expand(self.config.cluster_expansion);
        let key = ClusterKey::new(bucket, &expanded);

        if let Some(points) = self.clusters.get(&key) {
            debug!("Cluster cache hit — key={}", key);
            let markers: Vec<Marker> = points.iter().filter_map(Marker::from_cluster).collect();
            self.markers.replace_all(markers);
            // Anything still in flight is older than what we just published.
            self.cluster_seq.invalidate();
            self.inflight_bucket = None;
            self.published_bucket = Some(bucket);
            return None;
        }

        let ticket = self.cluster_seq.next_ticket();
        self.inflight_bucket = Some(bucket);
        debug!("Requesting clusters — key={} ticket={}", key, ticket);
        Some(FetchCommand::Clusters(ClusterFetch {
            ticket,
            key,
            query: ClusterQuery {
                bucket,
                bounds: if bucket.is_global() { None } else { Some(expanded) },
            },
        }))
    }

    fn fetch_records(&mut self, viewport: &Region) -> Option<FetchCommand> {
        if self.coverage.is_covered(viewport) {
            debug!("Viewport already covered — viewport={}", viewport);
            return None;
        }
        if let Some(pending) = &self.inflight_records {
            if pending.contains(viewport) {
                debug!("Viewport covered by in-flight fetch — viewport={}", viewport);
                return None;
            }
        }

        let expanded = viewport.expand(self.config.record_expansion);
        let ticket = self.record_seq.next_ticket();
        self.inflight_records = Some(expanded);
        debug!("Requesting records — region={} ticket={}", expanded, ticket);
        Some(FetchCommand::Records(RecordFetch {
            ticket,
            query: RecordQuery {
                region: expanded,
                filters: self.filters.clone(),
            },
            replace: self.replace_records,
        }))
    }

    pub fn complete_clusters(
        &mut self,
        fetch: &ClusterFetch,
        result: Result<Vec<ClusterPoint>, MapError>,
    ) -> Applied {
        if !self.cluster_seq.is_current(fetch.ticket) {
            debug!("Discarding stale cluster response — ticket={}", fetch.ticket);
            return Applied::Stale;
        }
        self.inflight_bucket = None;

        match result {
            Ok(points) => {
                let markers: Vec<Marker> = points.iter().filter_map(Marker::from_cluster).collect();
                if markers.len() < points.len() {
                    warn!(
                        "Dropped clusters with invalid coordinates — dropped={}",
                        points.len() - markers.len()
                    );
                }
                self.markers.replace_all(markers);
                self.clusters.put(fetch.key, points, fetch.ticket);
                self.published_bucket = Some(fetch.query.bucket);
                Applied::Published
            }
            Err(e) => {
                warn!("Cluster fetch failed — key={} error={}", fetch.key, e);
                Applied::Failed(e)
            }
        }
    }

    pub fn complete_records(
        &mut self,
        fetch: &RecordFetch,
        result: Result<Vec<IndividualRecord>, MapError>,
    ) -> Applied {
        if !self.record_seq.is_current(fetch.ticket) {
            debug!("Discarding stale record response — ticket={}", fetch.ticket);
            return Applied::Stale;
        }
        self.inflight_records = None;

        match result {
            Ok(records) => {
                let markers = records.iter().filter_map(Marker::from_record);
                if fetch.replace {
                    self.markers.replace_all(markers);
                    self.replace_records = false;
                } else {
                    let added = self.markers.merge_add(markers);
                    debug!(
                        "Merged records — fetched={} added={} total={}",
                        records.len(),
                        added,
                        self.markers.len()
                    );
                }
                self.coverage.record(fetch.query.region);
                Applied::Published
            }
            Err(e) => {
                warn!("Record fetch failed — region={} error={}", fetch.query.region, e);
                Applied::Failed(e)
            }
        }
    }

    /// Installs new record filters. Coverage gathered under the old filters is
    /// dropped; in individual mode the current viewport is refetched at once.
    pub fn set_filters(
        &mut self,
        filters: Vec<RecordFilter>,
        camera: Option<&Camera>,
    ) -> Option<FetchCommand> {
        info!("Applying record filters — count={}", filters.len());
        self.filters = filters;
        self.coverage.reset();
        self.inflight_records = None;
        self.record_seq.invalidate();
        self.replace_records = true;

        if self.mode != Some(DisplayMode::Individual) {
            return None;
        }
        let viewport = camera.and_then(|c| c.bounds).filter(Region::is_valid)?;
        self.fetch_records(&viewport)
    }

    /// Forgets everything shown for the current view. The next evaluation
    /// behaves like the first reading of a fresh map.
    pub fn reset_view(&mut self) {
        self.markers.clear();
        self.coverage.reset();
        self.cluster_seq.invalidate();
        self.record_seq.invalidate();
        self.inflight_bucket = None;
        self.inflight_records = None;
        self.published_bucket = None;
        self.mode = None;
    }

    /// Where the camera should go after a click on a cluster marker: centred
    /// on it, two levels in.
    pub fn zoom_into_cluster(&self, camera: &Camera, position: LatLng) -> CameraTarget {
        CameraTarget {
            center: position,
            zoom: camera.zoom + CLUSTER_CLICK_ZOOM_STEP,
        }
    }

    /// Re-evaluates after the backend data changed under the current view.
    /// Cached clusters are kept; record markers are replaced.
    pub fn refresh(&mut self, camera: &Camera) -> Option<FetchCommand> {
        self.coverage.reset();
        self.record_seq.invalidate();
        self.inflight_records = None;
        self.published_bucket = None;
        self.inflight_bucket = None;
        self.cluster_seq.invalidate();
        self.replace_records = true;
        self.evaluate(camera)
    }
}
