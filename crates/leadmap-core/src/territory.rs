// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use crate::backend::NewTerritory;
use crate::geo::{LatLng, Region};
use crate::MapError;
use log::{debug, info, warn};
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

pub const DEFAULT_COLOR: &str = "#FF0000";

// Vertices are stored at ~0.1 m precision.
const VERTEX_DECIMALS: i32 = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TerritoryId {
    /// Local placeholder for an optimistic insert awaiting the backend.
    Pending(u64),
    Stored(String),
}

impl TerritoryId {
    pub fn is_pending(&self) -> bool {
        matches!(self, TerritoryId::Pending(_))
    }
}

impl fmt::Display for TerritoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerritoryId::Pending(n) => write!(f, "temp-{}", n),
            TerritoryId::Stored(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Territory {
    pub id: TerritoryId,
    pub name: String,
    pub color: String,
    /// Closed ring: first vertex equals last.
    pub ring: Vec<LatLng>,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Territory {
    pub fn bounds(&self) -> Option<Region> {
        Region::bounding(&self.ring)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    Draw,
    Zip,
}

/// Path mutation reported by the drawing tool on an editable polygon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VertexEdit {
    InsertAt(usize, LatLng),
    SetAt(usize, LatLng),
    RemoveAt(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CountState {
    Loading,
    Loaded(u64),
    Failed,
}

/// Result of selecting a territory from the list.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub id: TerritoryId,
    pub bounds: Region,
    pub ring: Vec<LatLng>,
    /// Whether a contained-record count should be requested now.
    pub request_count: bool,
}

/// An optimistic insert waiting for the persistence call.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSave {
    pub temp_id: TerritoryId,
    pub request: NewTerritory,
}

fn color_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").unwrap())
}

fn wkt_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?is)^\s*POLYGON\s*\(\s*\((.*?)\)").unwrap())
}

/// Parses the outer ring of a WKT `POLYGON((lng lat, ...))` string.
///
/// Interior rings are ignored.
pub fn parse_wkt_polygon(wkt: &str) -> Result<Vec<LatLng>, MapError> {
    let inner = wkt_pattern()
        .captures(wkt)
        .and_then(|cap| cap.get(1))
        .ok_or_else(|| MapError::InvalidGeometry("boundary is not a WKT POLYGON".to_string()))?
        .as_str();

    let mut ring = Vec::new();
    for pair in inner.split(',') {
        let mut coords = pair.split_whitespace().map(str::parse::<f64>);
        match (coords.next(), coords.next()) {
            (Some(Ok(lng)), Some(Ok(lat))) => ring.push(LatLng::new(lat, lng)),
            _ => {
                return Err(MapError::InvalidGeometry(format!(
                    "unreadable WKT vertex '{}'",
                    pair.trim()
                )))
            }
        }
    }

    if ring.len() < 3 {
        return Err(MapError::InvalidGeometry(format!(
            "boundary has {} vertices, need at least 3",
            ring.len()
        )));
    }
    Ok(ring)
}

/// Rounds, checks and closes a candidate ring for submission.
pub fn validate_ring(vertices: &[LatLng]) -> Result<Vec<LatLng>, MapError> {
    if vertices.len() < 3 {
        return Err(MapError::InvalidGeometry(format!(
            "polygon has {} vertices, need at least 3",
            vertices.len()
        )));
    }
    if let Some(bad) = vertices.iter().find(|v| !v.is_finite()) {
        return Err(MapError::InvalidGeometry(format!(
            "non-finite vertex ({}, {})",
            bad.lat, bad.lng
        )));
    }

    let mut ring: Vec<LatLng> = vertices.iter().map(|v| v.rounded(VERTEX_DECIMALS)).collect();
    if ring.first() != ring.last() {
        ring.push(ring[0]);
    }
    if ring.len() < 4 {
        return Err(MapError::InvalidGeometry(
            "closed polygon needs at least 4 vertices".to_string(),
        ));
    }
    Ok(ring)
}

/// Polygon overlays: the stored territories plus the one being drawn.
#[derive(Debug, Default)]
pub struct TerritoryOverlayManager {
    territories: Vec<Territory>,
    adding: Option<AcquisitionMode>,
    candidate: Vec<LatLng>,
    zip_code: Option<String>,
    selected: Option<TerritoryId>,
    counts: HashMap<TerritoryId, CountState>,
    next_temp_id: u64,
}

impl TerritoryOverlayManager {
    pub fn new(territories: Vec<Territory>) -> Self {
        Self {
            territories,
            ..Self::default()
        }
    }

    pub fn territories(&self) -> &[Territory] {
        &self.territories
    }

    pub fn get(&self, id: &TerritoryId) -> Option<&Territory> {
        self.territories.iter().find(|t| &t.id == id)
    }

    /// Replaces the stored set with a fresh backend listing, keeping any
    /// optimistic inserts still in flight.
    pub fn load(&mut self, stored: Vec<Territory>) {
        let pending: Vec<Territory> = self
            .territories
            .drain(..)
            .filter(|t| t.id.is_pending())
            .collect();
        self.territories = stored;
        self.territories.extend(pending);
        debug!("Loaded territories — count={}", self.territories.len());
    }

    /// Case-insensitive name search for the list view.
    pub fn filtered(&self, query: &str) -> Vec<&Territory> {
        let q = query.to_lowercase();
        self.territories
            .iter()
            .filter(|t| t.name.to_lowercase().contains(&q))
            .collect()
    }

    pub fn start_adding(&mut self, mode: AcquisitionMode) {
        self.candidate.clear();
        self.zip_code = None;
        self.selected = None;
        self.adding = Some(mode);
    }

    pub fn mode(&self) -> Option<AcquisitionMode> {
        self.adding
    }

    pub fn candidate(&self) -> &[LatLng] {
        &self.candidate
    }

    /// Takes the path of a finished freehand polygon.
    pub fn draw_completed(&mut self, path: Vec<LatLng>) {
        if self.adding.is_none() {
            self.adding = Some(AcquisitionMode::Draw);
        }
        debug!("Polygon drawn — vertices={}", path.len());
        self.candidate = path;
    }

    pub fn apply_vertex_edit(&mut self, edit: VertexEdit) -> Result<(), MapError> {
        let len = self.candidate.len();
        match edit {
            VertexEdit::InsertAt(i, p) if i <= len => self.candidate.insert(i, p),
            VertexEdit::SetAt(i, p) if i < len => self.candidate[i] = p,
            VertexEdit::RemoveAt(i) if i < len => {
                self.candidate.remove(i);
            }
            _ => {
                return Err(MapError::InvalidGeometry(format!(
                    "vertex edit {:?} out of range for {} vertices",
                    edit, len
                )))
            }
        }
        Ok(())
    }

    /// Installs a postal-code boundary as the candidate polygon.
    pub fn set_zip_candidate(&mut self, zip: &str, wkt: &str) -> Result<&[LatLng], MapError> {
        let ring = parse_wkt_polygon(wkt)?;
        self.adding = Some(AcquisitionMode::Zip);
        self.zip_code = Some(zip.trim().to_string());
        self.candidate = ring;
        Ok(&self.candidate)
    }

    pub fn cancel(&mut self) {
        self.adding = None;
        self.candidate.clear();
        self.zip_code = None;
    }

    /// Validates the candidate and performs the optimistic insert.
    ///
    /// Geometry failures discard the candidate and never reach the backend.
    pub fn begin_submit(&mut self, name: &str, color: &str) -> Result<PendingSave, MapError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(MapError::InvalidInput(
                "Please provide a territory name.".to_string(),
            ));
        }
        if !color_pattern().is_match(color) {
            return Err(MapError::InvalidInput(format!(
                "colour '{}' is not #RRGGBB",
                color
            )));
        }
        let ring = match validate_ring(&self.candidate) {
            Ok(ring) => ring,
            Err(e) => {
                warn!("Discarding candidate polygon — {}", e);
                self.cancel();
                return Err(e);
            }
        };

        self.next_temp_id += 1;
        let temp_id = TerritoryId::Pending(self.next_temp_id);
        self.territories.push(Territory {
            id: temp_id.clone(),
            name: name.to_string(),
            color: color.to_string(),
            ring: ring.clone(),
            created_at: None,
        });
        debug!("Optimistic territory insert — id={} vertices={}", temp_id, ring.len());

        let zip_code = match self.adding {
            Some(AcquisitionMode::Zip) => self.zip_code.clone(),
            _ => None,
        };
        Ok(PendingSave {
            temp_id,
            request: NewTerritory {
                name: name.to_string(),
                color: color.to_string(),
                coordinates: ring,
                zip_code,
            },
        })
    }

    /// Reconciles or rolls back an optimistic insert. The candidate is only
    /// cleared while it still describes the polygon that was saved.
    pub fn finish_submit(
        &mut self,
        save: &PendingSave,
        result: Result<Territory, MapError>,
    ) -> Result<&Territory, MapError> {
        let temp_id = &save.temp_id;
        let index = self.territories.iter().position(|t| &t.id == temp_id);
        if result.is_ok() && self.candidate_is(&save.request.coordinates) {
            self.cancel();
        }
        match (result, index) {
            (Ok(stored), Some(i)) => {
                info!("Territory saved — temp_id={} id={}", temp_id, stored.id);
                self.selected = Some(stored.id.clone());
                self.territories[i] = stored;
                Ok(&self.territories[i])
            }
            (Ok(stored), None) => {
                // Rolled back locally in the meantime; the backend still has it.
                self.territories.push(stored);
                Ok(&self.territories[self.territories.len() - 1])
            }
            (Err(e), i) => {
                warn!("Territory save failed; rolling back — temp_id={} error={}", temp_id, e);
                if let Some(i) = i {
                    self.territories.remove(i);
                }
                Err(e)
            }
        }
    }

    fn candidate_is(&self, ring: &[LatLng]) -> bool {
        validate_ring(&self.candidate).is_ok_and(|closed| closed == ring)
    }

    /// Removes a territory after the backend confirmed deletion.
    pub fn remove(&mut self, id: &TerritoryId) -> Option<Territory> {
        let index = self.territories.iter().position(|t| &t.id == id)?;
        if self.selected.as_ref() == Some(id) {
            self.selected = None;
        }
        self.counts.remove(id);
        Some(self.territories.remove(index))
    }

    pub fn select(&mut self, id: &TerritoryId) -> Option<Selection> {
        let territory = self.get(id)?;
        let bounds = territory.bounds()?;
        let ring = territory.ring.clone();
        let request_count = !id.is_pending()
            && !matches!(
                self.counts.get(id),
                Some(CountState::Loading) | Some(CountState::Loaded(_))
            );
        if request_count {
            self.counts.insert(id.clone(), CountState::Loading);
        }
        self.selected = Some(id.clone());
        Some(Selection {
            id: id.clone(),
            bounds,
            ring,
            request_count,
        })
    }

    pub fn selected(&self) -> Option<&Territory> {
        self.selected.as_ref().and_then(|id| self.get(id))
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    /// Stores a finished count. Counts for territories deleted in the
    /// meantime are dropped.
    pub fn count_resolved(
        &mut self,
        id: &TerritoryId,
        result: Result<u64, MapError>,
    ) -> Option<&CountState> {
        if self.get(id).is_none() {
            debug!("Dropping count for removed territory — id={}", id);
            return None;
        }
        let state = match result {
            Ok(total) => CountState::Loaded(total),
            Err(e) => {
                warn!("Territory count failed — id={} error={}", id, e);
                CountState::Failed
            }
        };
        self.counts.insert(id.clone(), state);
        self.counts.get(id)
    }

    pub fn count_state(&self, id: &TerritoryId) -> Option<&CountState> {
        self.counts.get(id)
    }

    /// Forgets cached counts, e.g. after records were reassigned.
    pub fn invalidate_counts(&mut self) {
        self.counts.retain(|_, state| matches!(state, CountState::Loading));
    }

    /// Validated, closed candidate ring for a bulk assignment.
    pub fn assignment_ring(&mut self) -> Result<Vec<LatLng>, MapError> {
        validate_ring(&self.candidate).inspect_err(|_| self.cancel())
    }
}
