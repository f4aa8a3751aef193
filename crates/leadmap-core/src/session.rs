// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

//! Event loop tying the map, the controllers and the backend together.
//!
//! Everything runs on one task. Backend calls are queued as local futures and
//! their completions are applied in arrival order, so controller state is
//! never touched concurrently.

use crate::backend::Backend;
use crate::config::ViewportConfig;
use crate::debounce::DebounceScheduler;
use crate::filter::RecordFilter;
use crate::geo::{LatLng, Region};
use crate::markers::{ClusterPoint, IndividualRecord, MarkerLayer};
use crate::territory::{
    AcquisitionMode, CountState, PendingSave, Territory, TerritoryId, TerritoryOverlayManager,
    VertexEdit,
};
use crate::viewport::{
    Applied, Camera, CameraTarget, ClusterFetch, FetchCommand, RecordFetch, ViewportController,
};
use crate::zoom::DisplayMode;
use crate::MapError;
use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use log::{debug, info, warn};
use std::rc::Rc;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// Rendering seam. A map widget implements whichever calls it cares about.
pub trait MapSurface {
    fn render_markers(&mut self, _markers: &MarkerLayer) {}
    fn render_territories(&mut self, _territories: &[Territory]) {}
    /// The polygon being drawn or looked up; empty when there is none.
    fn render_candidate(&mut self, _ring: &[LatLng]) {}
    fn show_banner(&mut self, _message: &str) {}
    fn fit_bounds(&mut self, _bounds: &Region) {}
    fn move_camera(&mut self, _target: &CameraTarget) {}
    fn show_count(&mut self, _id: &TerritoryId, _state: &CountState) {}
}

/// Surface that draws nothing.
#[derive(Debug, Default)]
pub struct NullSurface;

impl MapSurface for NullSurface {}

#[derive(Debug, Clone, PartialEq)]
pub enum MapEvent {
    Idle(Camera),
    ZoomChanged(Camera),
    ApplyFilters(Vec<RecordFilter>),
    StartTerritory(AcquisitionMode),
    DrawCompleted(Vec<LatLng>),
    EditVertex(VertexEdit),
    SearchZip(String),
    CancelTerritory,
    SubmitTerritory { name: String, color: String },
    DeleteTerritory(TerritoryId),
    SelectTerritory(TerritoryId),
    JumpToTerritory(TerritoryId),
    AssignCandidate { owner: String },
    LoadTerritories,
    ClusterClicked(LatLng),
    Shutdown,
}

enum Completion {
    Clusters(ClusterFetch, Result<Vec<ClusterPoint>, MapError>),
    Records(RecordFetch, Result<Vec<IndividualRecord>, MapError>),
    Territories(Result<Vec<Territory>, MapError>),
    Saved(PendingSave, Result<Territory, MapError>),
    Deleted(TerritoryId, Result<(), MapError>),
    Counted(TerritoryId, Result<u64, MapError>),
    Boundary(String, Result<String, MapError>),
    Assigned(String, Result<u64, MapError>),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    pub evaluations: u64,
    pub cluster_fetches: u64,
    pub record_fetches: u64,
    pub stale_discarded: u64,
}

pub struct MapSession<B: Backend + 'static, S: MapSurface> {
    backend: Rc<B>,
    surface: S,
    controller: ViewportController,
    territories: TerritoryOverlayManager,
    debounce: DebounceScheduler,
    camera: Option<Camera>,
    pending: FuturesUnordered<LocalBoxFuture<'static, Completion>>,
    rendered_revision: Option<u64>,
    banner: Option<String>,
    stats: SessionStats,
}

impl<B: Backend + 'static, S: MapSurface> MapSession<B, S> {
    pub fn new(backend: B, surface: S, config: ViewportConfig) -> Self {
        let debounce = DebounceScheduler::new(config.debounce_window());
        Self {
            backend: Rc::new(backend),
            surface,
            controller: ViewportController::new(config),
            territories: TerritoryOverlayManager::default(),
            debounce,
            camera: None,
            pending: FuturesUnordered::new(),
            rendered_revision: None,
            banner: None,
            stats: SessionStats::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn controller(&self) -> &ViewportController {
        &self.controller
    }

    pub fn territories(&self) -> &TerritoryOverlayManager {
        &self.territories
    }

    pub fn camera(&self) -> Option<&Camera> {
        self.camera.as_ref()
    }

    /// Last message shown to the user.
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Processes events until the channel closes or `Shutdown` arrives, then
    /// flushes a pending evaluation and waits for every in-flight call.
    pub async fn run(&mut self, mut events: mpsc::Receiver<MapEvent>) {
        info!("Map session started");
        let mut open = true;
        loop {
            if !open {
                self.flush_debounce();
                if self.pending.is_empty() {
                    break;
                }
            }
            let deadline = self.debounce.deadline();
            tokio::select! {
                event = events.recv(), if open => match event {
                    Some(MapEvent::Shutdown) | None => open = false,
                    Some(event) => self.handle_event(event, Instant::now()),
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.fire_debounce(Instant::now());
                }
                Some(completion) = self.pending.next(), if !self.pending.is_empty() => {
                    self.apply_completion(completion);
                }
            }
        }
        info!(
            "Map session stopped — evaluations={} cluster_fetches={} record_fetches={} stale={}",
            self.stats.evaluations,
            self.stats.cluster_fetches,
            self.stats.record_fetches,
            self.stats.stale_discarded
        );
    }

    /// Waits for every in-flight call and applies the results.
    pub async fn settle(&mut self) {
        while let Some(completion) = self.pending.next().await {
            self.apply_completion(completion);
        }
    }

    pub fn handle_event(&mut self, event: MapEvent, now: Instant) {
        match event {
            MapEvent::Idle(camera) | MapEvent::ZoomChanged(camera) => {
                self.camera = Some(camera);
                self.debounce.notify(now);
            }
            MapEvent::ApplyFilters(filters) => {
                let command = self.controller.set_filters(filters, self.camera.as_ref());
                self.render_markers();
                if let Some(command) = command {
                    self.dispatch(command);
                }
            }
            MapEvent::StartTerritory(mode) => {
                self.territories.start_adding(mode);
                self.surface.render_candidate(&[]);
            }
            MapEvent::DrawCompleted(path) => {
                self.territories.draw_completed(path);
                self.surface.render_candidate(self.territories.candidate());
            }
            MapEvent::EditVertex(edit) => match self.territories.apply_vertex_edit(edit) {
                Ok(()) => self.surface.render_candidate(self.territories.candidate()),
                Err(e) => warn!("Ignoring vertex edit — {}", e),
            },
            MapEvent::SearchZip(zip) => self.search_zip(zip),
            MapEvent::CancelTerritory => {
                self.territories.cancel();
                self.surface.render_candidate(&[]);
            }
            MapEvent::SubmitTerritory { name, color } => self.submit_territory(&name, &color),
            MapEvent::DeleteTerritory(id) => self.delete_territory(id),
            MapEvent::SelectTerritory(id) => self.select_territory(&id),
            MapEvent::JumpToTerritory(id) => self.jump_to_territory(&id, now),
            MapEvent::AssignCandidate { owner } => self.assign_candidate(owner),
            MapEvent::LoadTerritories => {
                let backend = Rc::clone(&self.backend);
                self.pending.push(
                    async move { Completion::Territories(backend.list_territories().await) }
                        .boxed_local(),
                );
            }
            MapEvent::ClusterClicked(position) => {
                if let Some(camera) = self.camera {
                    let target = self.controller.zoom_into_cluster(&camera, position);
                    debug!("Zooming into cluster — zoom={}", target.zoom);
                    self.surface.move_camera(&target);
                }
            }
            MapEvent::Shutdown => self.flush_debounce(),
        }
    }

    /// Runs the settled evaluation if the debounce window has elapsed. The
    /// camera is read here, not when the notification arrived.
    pub fn fire_debounce(&mut self, now: Instant) {
        if !self.debounce.fire_if_due(now) {
            return;
        }
        let Some(camera) = self.camera else {
            debug!("Debounce fired before any camera reading");
            return;
        };
        self.stats.evaluations += 1;
        let command = self.controller.evaluate(&camera);
        self.render_markers();
        if let Some(command) = command {
            self.dispatch(command);
        }
    }

    /// Runs a pending evaluation now instead of waiting out the window.
    fn flush_debounce(&mut self) {
        if let Some(deadline) = self.debounce.deadline() {
            self.fire_debounce(deadline);
        }
    }

    fn dispatch(&mut self, command: FetchCommand) {
        let backend = Rc::clone(&self.backend);
        match command {
            FetchCommand::Clusters(fetch) => {
                self.stats.cluster_fetches += 1;
                self.pending.push(
                    async move {
                        let result = backend.fetch_clusters(&fetch.query).await;
                        Completion::Clusters(fetch, result)
                    }
                    .boxed_local(),
                );
            }
            FetchCommand::Records(fetch) => {
                self.stats.record_fetches += 1;
                self.pending.push(
                    async move {
                        let result = backend.fetch_records(&fetch.query).await;
                        Completion::Records(fetch, result)
                    }
                    .boxed_local(),
                );
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Clusters(fetch, result) => {
                let applied = self.controller.complete_clusters(&fetch, result);
                self.after_fetch(applied, "Failed to load clusters.");
            }
            Completion::Records(fetch, result) => {
                let applied = self.controller.complete_records(&fetch, result);
                self.after_fetch(applied, "Failed to load individual markers.");
            }
            Completion::Territories(Ok(stored)) => {
                self.territories.load(stored);
                self.surface.render_territories(self.territories.territories());
            }
            Completion::Territories(Err(e)) => {
                self.report(&e, "Failed to load territories.");
            }
            Completion::Saved(save, result) => {
                let outcome = self.territories.finish_submit(&save, result).map(|_| ());
                self.surface.render_territories(self.territories.territories());
                match outcome {
                    Ok(()) => self.surface.render_candidate(self.territories.candidate()),
                    Err(e) => self.report(&e, &format!("Failed to save territory: {}", e)),
                }
            }
            Completion::Deleted(id, Ok(())) => {
                if self.territories.remove(&id).is_some() {
                    info!("Territory deleted — id={}", id);
                }
                self.surface.render_territories(self.territories.territories());
            }
            Completion::Deleted(id, Err(e)) => {
                warn!("Territory delete failed — id={} error={}", id, e);
                self.report(&e, "Failed to delete territory.");
            }
            Completion::Counted(id, result) => {
                if let Some(state) = self.territories.count_resolved(&id, result).cloned() {
                    self.surface.show_count(&id, &state);
                }
            }
            Completion::Boundary(zip, Ok(wkt)) => {
                let installed = self
                    .territories
                    .set_zip_candidate(&zip, &wkt)
                    .map(Region::bounding);
                match installed {
                    Ok(bounds) => {
                        self.surface.render_candidate(self.territories.candidate());
                        if let Some(bounds) = bounds {
                            self.surface.fit_bounds(&bounds);
                        }
                    }
                    Err(e) => self.report(&e, &format!("Invalid boundary for zip code {}.", zip)),
                }
            }
            Completion::Boundary(zip, Err(e)) => {
                let message = match &e {
                    MapError::InvalidGeometry(m) => m.clone(),
                    _ => format!("Failed to look up zip code {}.", zip),
                };
                self.report(&e, &message);
            }
            Completion::Assigned(owner, Ok(updated)) => {
                info!("Leads assigned — owner={} updated={}", owner, updated);
                self.territories.cancel();
                self.territories.invalidate_counts();
                self.surface.render_candidate(&[]);
                self.show_banner(&format!("Assigned {} leads to {}.", updated, owner));
                if let Some(camera) = self.camera {
                    let command = self.controller.refresh(&camera);
                    self.render_markers();
                    if let Some(command) = command {
                        self.dispatch(command);
                    }
                }
            }
            Completion::Assigned(_, Err(e)) => {
                self.report(&e, &format!("Failed to assign leads: {}", e));
            }
        }
    }

    fn after_fetch(&mut self, applied: Applied, failure_message: &str) {
        match applied {
            Applied::Published => self.render_markers(),
            Applied::Stale => self.stats.stale_discarded += 1,
            Applied::Failed(e) => self.report(&e, failure_message),
        }
    }

    fn search_zip(&mut self, zip: String) {
        let zip = zip.trim().to_string();
        if zip.is_empty() {
            self.show_banner("Please enter a zip code.");
            return;
        }
        let backend = Rc::clone(&self.backend);
        self.pending.push(
            async move {
                let result = backend.postal_boundary(&zip).await;
                Completion::Boundary(zip, result)
            }
            .boxed_local(),
        );
    }

    fn submit_territory(&mut self, name: &str, color: &str) {
        match self.territories.begin_submit(name, color) {
            Ok(save) => {
                self.surface.render_territories(self.territories.territories());
                let backend = Rc::clone(&self.backend);
                self.pending.push(
                    async move {
                        let result = backend.save_territory(&save.request).await;
                        Completion::Saved(save, result)
                    }
                    .boxed_local(),
                );
            }
            Err(e) => {
                if matches!(e, MapError::InvalidGeometry(_)) {
                    self.surface.render_candidate(&[]);
                }
                self.report(&e, &e.to_string());
            }
        }
    }

    fn delete_territory(&mut self, id: TerritoryId) {
        if id.is_pending() {
            self.show_banner("Territory is still being saved.");
            return;
        }
        if self.territories.get(&id).is_none() {
            debug!("Delete requested for unknown territory — id={}", id);
            return;
        }
        let backend = Rc::clone(&self.backend);
        self.pending.push(
            async move {
                let result = backend.delete_territory(&id).await;
                Completion::Deleted(id, result)
            }
            .boxed_local(),
        );
    }

    fn select_territory(&mut self, id: &TerritoryId) {
        let Some(selection) = self.territories.select(id) else {
            debug!("Selected territory has no usable ring — id={}", id);
            return;
        };
        self.surface.fit_bounds(&selection.bounds);

        if selection.request_count {
            self.surface.show_count(&selection.id, &CountState::Loading);
            let backend = Rc::clone(&self.backend);
            let id = selection.id.clone();
            let ring = selection.ring.clone();
            self.pending.push(
                async move {
                    let result = backend.territory_record_count(&ring).await;
                    Completion::Counted(id, result)
                }
                .boxed_local(),
            );
        }

        // The stored camera is left alone; the idle event after the fit
        // brings the real reading.
        if self.controller.mode() == Some(DisplayMode::Individual) {
            let zoom = self.camera.map(|c| c.zoom).unwrap_or_default();
            let fitted = Camera::new(zoom, selection.bounds);
            if let Some(command) = self.controller.evaluate(&fitted) {
                self.dispatch(command);
            }
        }
    }

    /// Fits the map to a territory and forgets what was shown, so the next
    /// settled reading refetches from scratch.
    fn jump_to_territory(&mut self, id: &TerritoryId, now: Instant) {
        let Some(bounds) = self.territories.get(id).and_then(Territory::bounds) else {
            return;
        };
        self.controller.reset_view();
        self.render_markers();
        self.surface.fit_bounds(&bounds);
        if let Some(camera) = self.camera.as_mut() {
            camera.bounds = Some(bounds);
        }
        self.debounce.notify(now);
    }

    fn assign_candidate(&mut self, owner: String) {
        let owner = owner.trim().to_string();
        if owner.is_empty() {
            self.show_banner("Please choose an owner for the leads.");
            return;
        }
        let ring = match self.territories.assignment_ring() {
            Ok(ring) => ring,
            Err(e) => {
                self.surface.render_candidate(&[]);
                self.report(&e, &e.to_string());
                return;
            }
        };
        let backend = Rc::clone(&self.backend);
        self.pending.push(
            async move {
                let result = backend.assign_records(&ring, &owner).await;
                Completion::Assigned(owner, result)
            }
            .boxed_local(),
        );
    }

    fn render_markers(&mut self) {
        let revision = self.controller.markers().revision();
        if self.rendered_revision != Some(revision) {
            self.rendered_revision = Some(revision);
            self.surface.render_markers(self.controller.markers());
        }
    }

    fn report(&mut self, error: &MapError, message: &str) {
        if error.is_user_visible() {
            self.show_banner(message);
        } else {
            debug!("Suppressed error — {}", error);
        }
    }

    fn show_banner(&mut self, message: &str) {
        self.banner = Some(message.to_string());
        self.surface.show_banner(message);
    }
}
