//! The project store: canonical entities plus synchronous change notification.
//!
//! Every successful mutation runs all listeners with the event and the
//! post-mutation project before returning. A rejected call leaves the project
//! untouched and notifies nobody.

use super::types::*;
use super::validation::{ensure_area, ensure_finite, ensure_module_type, ensure_position};
use crate::geometry::{self, LatLng, LocalFrame, EPSILON};
use crate::ids::{EntityId, IdGenerator, ModuleTypeId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, warn};

// =============================================================================
// Events & errors
// =============================================================================

/// Which aspect of an area a [`StoreEvent::AreaUpdated`] touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaChange {
    Geometry,
    Parameters,
    Lock,
    Topography,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum StoreEvent {
    AreaAdded { id: EntityId },
    AreaUpdated { id: EntityId, change: AreaChange },
    AreaDeleted { id: EntityId },
    ObservationPointAdded { id: EntityId },
    ObservationPointUpdated { id: EntityId },
    ObservationPointDeleted { id: EntityId },
    ModuleTypeAdded { id: ModuleTypeId },
    ModuleTypeUpdated { id: ModuleTypeId },
    ModuleTypeDeleted { id: ModuleTypeId },
    MetadataUpdated,
    SimulationParametersUpdated,
    ProjectLoaded,
    ProjectCleared,
}

impl StoreEvent {
    /// The PV area this event concerns, if any.
    pub fn area_id(&self) -> Option<EntityId> {
        match self {
            StoreEvent::AreaAdded { id }
            | StoreEvent::AreaUpdated { id, .. }
            | StoreEvent::AreaDeleted { id } => Some(*id),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("PV area {0} not found")]
    AreaNotFound(EntityId),
    #[error("observation point {0} not found")]
    ObservationPointNotFound(EntityId),
    #[error("module type {0} not found")]
    ModuleTypeNotFound(ModuleTypeId),
    #[error("PV area {0} is locked")]
    Locked(EntityId),
    #[error("module type {0} is built in and cannot be modified")]
    ProtectedModuleType(ModuleTypeId),
    #[error("module type {id} is used by {areas} PV area(s)")]
    ModuleTypeInUse { id: ModuleTypeId, areas: usize },
    #[error("a {kind} area needs {expected} corners, got {actual}")]
    InvalidCornerCount {
        kind: AreaKindTag,
        expected: &'static str,
        actual: usize,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("topography result for PV area {0} is out of date")]
    StaleTopography(EntityId),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
}

impl StoreError {
    /// Stable machine-readable code, used in error frames.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::AreaNotFound(_) => "AREA_NOT_FOUND",
            StoreError::ObservationPointNotFound(_) => "OBSERVATION_POINT_NOT_FOUND",
            StoreError::ModuleTypeNotFound(_) => "MODULE_TYPE_NOT_FOUND",
            StoreError::Locked(_) => "AREA_LOCKED",
            StoreError::ProtectedModuleType(_) => "MODULE_TYPE_PROTECTED",
            StoreError::ModuleTypeInUse { .. } => "MODULE_TYPE_IN_USE",
            StoreError::InvalidCornerCount { .. } => "INVALID_CORNER_COUNT",
            StoreError::InvalidInput(_) => "INVALID_INPUT",
            StoreError::StaleTopography(_) => "STALE_TOPOGRAPHY",
            StoreError::Snapshot(_) => "SNAPSHOT_ERROR",
        }
    }
}

fn rejected(err: StoreError) -> StoreError {
    warn!(code = err.code(), "store rejected mutation: {}", err);
    err
}

fn invalid(message: impl Into<String>) -> StoreError {
    StoreError::InvalidInput(message.into())
}

// =============================================================================
// Topography commits
// =============================================================================

/// Issued when a topography job is planned. Only the most recent ticket of
/// an area may commit, and only while the area's corners are unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct TopographyTicket {
    pub area: EntityId,
    pub serial: u64,
    pub corners: Vec<LatLng>,
    /// Grid spacing at planning time, for ground areas.
    pub grid_spacing: Option<f64>,
}

/// What a finished job writes to the support grid.
#[derive(Debug, Clone, PartialEq)]
pub enum GridCommit {
    Unchanged,
    /// Replace every generated point; the grid becomes clean.
    Replace(Vec<SupportPoint>),
    /// New heights for the existing generated points, in order.
    Reheight(Vec<f64>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopographyCommit {
    pub terrain_heights: Option<Vec<f64>>,
    pub reference_ground_height: Option<f64>,
    pub grid: GridCommit,
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

pub type Listener = Box<dyn FnMut(&StoreEvent, &Project) + Send>;

pub struct ProjectStore {
    project: Project,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    ids: IdGenerator,
    topography_tickets: HashMap<EntityId, u64>,
    next_ticket: u64,
}

impl fmt::Debug for ProjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectStore")
            .field("project", &self.project)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

impl Default for ProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::with_id_generator(IdGenerator::random())
    }

    /// Store whose new entities get ids from `ids` (seeded generators give
    /// reproducible ids).
    pub fn with_id_generator(ids: IdGenerator) -> Self {
        Self {
            project: Project::default(),
            listeners: Vec::new(),
            next_subscription: 0,
            ids,
            topography_tickets: HashMap::new(),
            next_ticket: 0,
        }
    }

    pub fn from_project(project: Project) -> Result<Self, StoreError> {
        let mut store = Self::new();
        store.load_project(project)?;
        Ok(store)
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn area(&self, id: EntityId) -> Option<&PvArea> {
        self.project.area(id)
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&StoreEvent, &Project) + Send + 'static,
    {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sid, _)| *sid != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: StoreEvent) {
        debug!(?event, "store event");
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event, &self.project);
        }
    }

    // -------------------------------------------------------------------------
    // PV areas
    // -------------------------------------------------------------------------

    fn area_index(&self, id: EntityId) -> Result<usize, StoreError> {
        self.project
            .pv_areas
            .iter()
            .position(|a| a.id == id)
            .ok_or(StoreError::AreaNotFound(id))
            .map_err(rejected)
    }

    /// Apply `edit` to a copy of an unlocked area, validate the copy, then
    /// swap it in. Unchanged results emit nothing.
    fn edit_area<F>(&mut self, id: EntityId, change: AreaChange, edit: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut PvArea) -> Result<(), StoreError>,
    {
        let index = self.area_index(id)?;
        let current = &self.project.pv_areas[index];
        if current.locked {
            return Err(rejected(StoreError::Locked(id)));
        }
        let mut next = current.clone();
        edit(&mut next).map_err(rejected)?;
        ensure_area(&next).map_err(rejected)?;
        if next == self.project.pv_areas[index] {
            return Ok(());
        }
        self.project.pv_areas[index] = next;
        self.emit(StoreEvent::AreaUpdated { id, change });
        Ok(())
    }

    /// Create an area from a completed draw gesture.
    pub fn add_area(
        &mut self,
        name: &str,
        tag: AreaKindTag,
        corners: Vec<LatLng>,
        module_type_id: ModuleTypeId,
    ) -> Result<EntityId, StoreError> {
        let name = if name.trim().is_empty() {
            format!("PV Area {}", self.project.pv_areas.len() + 1)
        } else {
            name.to_string()
        };
        let mut area = PvArea::new(self.ids.next_id(), &name, tag, corners, module_type_id);
        derive_roof_parallel(&mut area, false);
        self.insert_area(area)
    }

    /// Insert a fully specified area, e.g. one restored from a snapshot.
    pub fn insert_area(&mut self, area: PvArea) -> Result<EntityId, StoreError> {
        if self.project.area(area.id).is_some() {
            return Err(rejected(invalid(format!("PV area {} already exists", area.id))));
        }
        if self.project.module_type(area.module_type_id).is_none() {
            return Err(rejected(StoreError::ModuleTypeNotFound(area.module_type_id)));
        }
        ensure_area(&area).map_err(rejected)?;
        let id = area.id;
        debug!(%id, kind = %area.tag(), corners = area.corners.len(), "adding PV area");
        self.project.pv_areas.push(area);
        self.emit(StoreEvent::AreaAdded { id });
        Ok(id)
    }

    pub fn update_area(&mut self, id: EntityId, update: AreaUpdate) -> Result<(), StoreError> {
        if let Some(module_type_id) = update.module_type_id {
            if self.project.module_type(module_type_id).is_none() {
                return Err(rejected(StoreError::ModuleTypeNotFound(module_type_id)));
            }
        }
        self.edit_area(id, AreaChange::Parameters, |area| apply_area_update(area, update))
    }

    /// Replace an area's corners, optionally with a new azimuth (rotation).
    pub fn update_geometry(
        &mut self,
        id: EntityId,
        corners: Vec<LatLng>,
        azimuth: Option<f64>,
    ) -> Result<(), StoreError> {
        if let Some(azimuth) = azimuth {
            ensure_finite(azimuth, "azimuth").map_err(rejected)?;
        }
        self.edit_area(id, AreaChange::Geometry, |area| {
            if area.corners == corners && azimuth.is_none() {
                return Ok(());
            }
            let boundary_changed = area.corners != corners;
            area.kind.resize_per_corner(corners.len());
            area.corners = corners;
            if let Some(azimuth) = azimuth {
                area.azimuth = geometry::normalize_degrees(azimuth);
            }
            if let Some(ground) = area.ground_mut() {
                if boundary_changed && ground.has_grid() {
                    ground.grid_needs_update = true;
                }
            }
            derive_roof_parallel(area, false);
            Ok(())
        })
    }

    pub fn set_corners(&mut self, id: EntityId, corners: Vec<LatLng>) -> Result<(), StoreError> {
        self.update_geometry(id, corners, None)
    }

    /// The one mutation allowed on a locked area.
    pub fn set_locked(&mut self, id: EntityId, locked: bool) -> Result<(), StoreError> {
        let index = self.area_index(id)?;
        if self.project.pv_areas[index].locked == locked {
            return Ok(());
        }
        self.project.pv_areas[index].locked = locked;
        debug!(%id, locked, "lock state changed");
        self.emit(StoreEvent::AreaUpdated { id, change: AreaChange::Lock });
        Ok(())
    }

    pub fn delete_area(&mut self, id: EntityId) -> Result<(), StoreError> {
        let index = self.area_index(id)?;
        if self.project.pv_areas[index].locked {
            return Err(rejected(StoreError::Locked(id)));
        }
        self.project.pv_areas.remove(index);
        self.topography_tickets.remove(&id);
        debug!(%id, "deleted PV area");
        self.emit(StoreEvent::AreaDeleted { id });
        Ok(())
    }

    /// Place a user-defined support point on a ground area.
    pub fn add_support_point(&mut self, id: EntityId, position: LatLng, height: f64) -> Result<(), StoreError> {
        ensure_position(position, "support point").map_err(rejected)?;
        ensure_finite(height, "support point height").map_err(rejected)?;
        self.edit_area(id, AreaChange::Topography, |area| {
            let ground = area
                .ground_mut()
                .ok_or_else(|| invalid("support points only exist on ground areas"))?;
            ground.support_points.push(SupportPoint::manual(position, height));
            Ok(())
        })
    }

    pub fn remove_support_point(&mut self, id: EntityId, index: usize) -> Result<(), StoreError> {
        self.edit_area(id, AreaChange::Topography, |area| {
            let ground = area
                .ground_mut()
                .ok_or_else(|| invalid("support points only exist on ground areas"))?;
            if index >= ground.support_points.len() {
                return Err(invalid(format!("no support point at index {}", index)));
            }
            ground.support_points.remove(index);
            Ok(())
        })
    }

    // -------------------------------------------------------------------------
    // Topography jobs
    // -------------------------------------------------------------------------

    /// Start a topography job for an area. Any earlier ticket for the same
    /// area is superseded.
    pub fn issue_topography_ticket(&mut self, id: EntityId) -> Result<TopographyTicket, StoreError> {
        let index = self.area_index(id)?;
        let area = &self.project.pv_areas[index];
        if area.locked {
            return Err(rejected(StoreError::Locked(id)));
        }
        self.next_ticket += 1;
        let serial = self.next_ticket;
        self.topography_tickets.insert(id, serial);
        Ok(TopographyTicket {
            area: id,
            serial,
            corners: area.corners.clone(),
            grid_spacing: area.ground().map(|g| g.grid_spacing_meters),
        })
    }

    pub fn is_current_ticket(&self, ticket: &TopographyTicket) -> bool {
        self.topography_tickets.get(&ticket.area) == Some(&ticket.serial)
    }

    /// Write sampled heights back. Rejected for deleted or locked areas,
    /// superseded tickets, and areas whose corners moved since planning.
    /// A grid replacement is also rejected once the spacing changed.
    pub fn commit_topography(
        &mut self,
        ticket: &TopographyTicket,
        commit: TopographyCommit,
    ) -> Result<(), StoreError> {
        let id = ticket.area;
        if !self.is_current_ticket(ticket) {
            if self.project.area(id).is_none() {
                return Err(rejected(StoreError::AreaNotFound(id)));
            }
            return Err(rejected(StoreError::StaleTopography(id)));
        }
        let area = self.project.area(id).ok_or(StoreError::AreaNotFound(id)).map_err(rejected)?;
        if area.corners != ticket.corners {
            return Err(rejected(StoreError::StaleTopography(id)));
        }
        match &commit.grid {
            GridCommit::Replace(_) if area.ground().map(|g| g.grid_spacing_meters) != ticket.grid_spacing => {
                return Err(rejected(StoreError::StaleTopography(id)));
            }
            GridCommit::Reheight(heights) => {
                let generated = area.ground().map(|g| g.generated_points().count()).unwrap_or(0);
                if generated != heights.len() {
                    return Err(rejected(StoreError::StaleTopography(id)));
                }
            }
            _ => {}
        }

        self.edit_area(id, AreaChange::Topography, |area| apply_topography(area, commit))?;
        self.topography_tickets.remove(&id);
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Observation points
    // -------------------------------------------------------------------------

    pub fn add_observation_point(&mut self, name: &str, position: LatLng) -> Result<EntityId, StoreError> {
        ensure_position(position, "observation point").map_err(rejected)?;
        let name = if name.trim().is_empty() {
            format!("OP {}", self.project.observation_points.len() + 1)
        } else {
            name.to_string()
        };
        let op = ObservationPoint::new(self.ids.next_id(), &name, position);
        let id = op.id;
        self.project.observation_points.push(op);
        self.emit(StoreEvent::ObservationPointAdded { id });
        Ok(id)
    }

    pub fn update_observation_point(
        &mut self,
        id: EntityId,
        update: ObservationPointUpdate,
    ) -> Result<(), StoreError> {
        let index = self
            .project
            .observation_points
            .iter()
            .position(|p| p.id == id)
            .ok_or(StoreError::ObservationPointNotFound(id))
            .map_err(rejected)?;

        let mut next = self.project.observation_points[index].clone();
        if let Some(name) = update.name {
            next.name = name;
        }
        next.lat = update.lat.unwrap_or(next.lat);
        next.lng = update.lng.unwrap_or(next.lng);
        next.height_observer = update.height_observer.unwrap_or(next.height_observer);
        next.height_object = update.height_object.unwrap_or(next.height_object);

        ensure_position(next.position(), "observation point").map_err(rejected)?;
        for (value, field) in [(next.height_observer, "heightObserver"), (next.height_object, "heightObject")] {
            ensure_finite(value, field).map_err(rejected)?;
            if value < 0.0 {
                return Err(rejected(invalid(format!("{} cannot be negative", field))));
            }
        }
        if next == self.project.observation_points[index] {
            return Ok(());
        }
        self.project.observation_points[index] = next;
        self.emit(StoreEvent::ObservationPointUpdated { id });
        Ok(())
    }

    pub fn delete_observation_point(&mut self, id: EntityId) -> Result<(), StoreError> {
        let before = self.project.observation_points.len();
        self.project.observation_points.retain(|p| p.id != id);
        if self.project.observation_points.len() == before {
            return Err(rejected(StoreError::ObservationPointNotFound(id)));
        }
        self.emit(StoreEvent::ObservationPointDeleted { id });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Module types
    // -------------------------------------------------------------------------

    pub fn add_module_type(
        &mut self,
        name: &str,
        reflection_profile: ReflectionProfile,
        beam_spread: f64,
    ) -> Result<ModuleTypeId, StoreError> {
        let next_id = self
            .project
            .module_types
            .iter()
            .map(|m| m.id.0 + 1)
            .max()
            .unwrap_or(0)
            .max(ModuleTypeId::FIRST_CUSTOM);
        let module_type = ModuleType {
            id: ModuleTypeId(next_id),
            name: name.to_string(),
            reflection_profile,
            beam_spread,
            protected: false,
        };
        ensure_module_type(&module_type).map_err(rejected)?;
        let id = module_type.id;
        self.project.module_types.push(module_type);
        self.emit(StoreEvent::ModuleTypeAdded { id });
        Ok(id)
    }

    fn editable_module_type(&self, id: ModuleTypeId) -> Result<usize, StoreError> {
        let index = self
            .project
            .module_types
            .iter()
            .position(|m| m.id == id)
            .ok_or(StoreError::ModuleTypeNotFound(id))
            .map_err(rejected)?;
        if self.project.module_types[index].protected || id.is_builtin() {
            return Err(rejected(StoreError::ProtectedModuleType(id)));
        }
        Ok(index)
    }

    pub fn update_module_type(&mut self, id: ModuleTypeId, update: ModuleTypeUpdate) -> Result<(), StoreError> {
        let index = self.editable_module_type(id)?;
        let mut next = self.project.module_types[index].clone();
        if let Some(name) = update.name {
            next.name = name;
        }
        if let Some(profile) = update.reflection_profile {
            next.reflection_profile = profile;
        }
        if let Some(beam_spread) = update.beam_spread {
            next.beam_spread = beam_spread;
        }
        ensure_module_type(&next).map_err(rejected)?;
        if next == self.project.module_types[index] {
            return Ok(());
        }
        self.project.module_types[index] = next;
        self.emit(StoreEvent::ModuleTypeUpdated { id });
        Ok(())
    }

    /// Deleting a type still referenced by an area is rejected.
    pub fn delete_module_type(&mut self, id: ModuleTypeId) -> Result<(), StoreError> {
        let index = self.editable_module_type(id)?;
        let areas = self.project.pv_areas.iter().filter(|a| a.module_type_id == id).count();
        if areas > 0 {
            return Err(rejected(StoreError::ModuleTypeInUse { id, areas }));
        }
        self.project.module_types.remove(index);
        self.emit(StoreEvent::ModuleTypeDeleted { id });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Project level
    // -------------------------------------------------------------------------

    pub fn update_metadata(&mut self, metadata: ProjectMetadata) -> Result<(), StoreError> {
        if metadata.language != "en" && metadata.language != "de" {
            return Err(rejected(invalid(format!("unsupported language {}", metadata.language))));
        }
        ensure_finite(metadata.utc_offset, "utcOffset").map_err(rejected)?;
        if !(-12.0..=14.0).contains(&metadata.utc_offset) {
            return Err(rejected(invalid(format!("UTC offset {} out of range", metadata.utc_offset))));
        }
        if metadata == self.project.metadata {
            return Ok(());
        }
        self.project.metadata = metadata;
        self.emit(StoreEvent::MetadataUpdated);
        Ok(())
    }

    pub fn update_simulation_parameters(&mut self, params: SimulationParameters) -> Result<(), StoreError> {
        let mut errors = Vec::new();
        if !(0.1..=10.0).contains(&params.grid_width) {
            errors.push(format!("gridWidth {}", params.grid_width));
        }
        if ![1, 5, 10, 30, 60].contains(&params.resolution_minutes) {
            errors.push(format!("resolutionMinutes {}", params.resolution_minutes));
        }
        if !(1000.0..=100000.0).contains(&params.glare_threshold) {
            errors.push(format!("glareThreshold {}", params.glare_threshold));
        }
        if !errors.is_empty() {
            return Err(rejected(invalid(format!("out of range: {}", errors.join(", ")))));
        }
        if params == self.project.simulation_parameters {
            return Ok(());
        }
        self.project.simulation_parameters = params;
        self.emit(StoreEvent::SimulationParametersUpdated);
        Ok(())
    }

    /// Remove every area and observation point. The catalog stays.
    pub fn clear(&mut self) {
        self.project.pv_areas.clear();
        self.project.observation_points.clear();
        self.topography_tickets.clear();
        self.emit(StoreEvent::ProjectCleared);
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.project)?)
    }

    pub fn load_json(&mut self, json: &str) -> Result<(), StoreError> {
        let project: Project = serde_json::from_str(json).map_err(|e| rejected(e.into()))?;
        self.load_project(project)
    }

    /// Replace the whole project. Every area must be valid; built-in module
    /// types are restored to their canonical definitions.
    pub fn load_project(&mut self, mut project: Project) -> Result<(), StoreError> {
        for builtin in default_module_types() {
            match project.module_types.iter_mut().find(|m| m.id == builtin.id) {
                Some(existing) => *existing = builtin,
                None => project.module_types.push(builtin),
            }
        }
        project.module_types.sort_by_key(|m| m.id);
        for area in &project.pv_areas {
            ensure_area(area).map_err(rejected)?;
            if project.module_type(area.module_type_id).is_none() {
                return Err(rejected(StoreError::ModuleTypeNotFound(area.module_type_id)));
            }
        }
        debug!(areas = project.pv_areas.len(), ops = project.observation_points.len(), "loading project");
        self.project = project;
        self.topography_tickets.clear();
        self.emit(StoreEvent::ProjectLoaded);
        Ok(())
    }
}

// =============================================================================
// Area helpers
// =============================================================================

fn kind_mismatch(field: &str, tag: AreaKindTag) -> StoreError {
    invalid(format!("{} does not apply to a {} area", field, tag))
}

fn apply_area_update(area: &mut PvArea, update: AreaUpdate) -> Result<(), StoreError> {
    if let Some(name) = update.name {
        area.name = name;
    }
    if let Some(visible) = update.visible {
        area.visible = visible;
    }
    if let Some(azimuth) = update.azimuth {
        ensure_finite(azimuth, "azimuth")?;
        area.azimuth = geometry::normalize_degrees(azimuth);
    }
    if let Some(tilt) = update.tilt {
        area.tilt = tilt;
    }
    if let Some(cross_tilt) = update.cross_tilt {
        area.cross_tilt = cross_tilt;
    }
    if let Some(module_type_id) = update.module_type_id {
        area.module_type_id = module_type_id;
    }

    let tag = area.tag();
    let mut heights_changed = false;
    match &mut area.kind {
        AreaKind::RoofParallel(params) => {
            if let Some(top) = update.top_height {
                params.top_height = top;
                heights_changed = true;
            }
            if let Some(bottom) = update.bottom_height {
                params.bottom_height = bottom;
                heights_changed = true;
            }
        }
        _ if update.top_height.is_some() => return Err(kind_mismatch("topHeight", tag)),
        _ if update.bottom_height.is_some() => return Err(kind_mismatch("bottomHeight", tag)),
        _ => {}
    }
    match &mut area.kind {
        AreaKind::RoofMounted(params) => {
            if let Some(heights) = update.corner_heights {
                params.corner_heights = heights;
            }
            if let Some(reference) = update.reference_ground_height {
                params.reference_ground_height = reference;
            }
            if let Some(auto) = update.auto_calculate_reference_height {
                params.auto_calculate_reference_height = auto;
            }
        }
        _ if update.corner_heights.is_some() => return Err(kind_mismatch("cornerHeights", tag)),
        _ if update.reference_ground_height.is_some() => {
            return Err(kind_mismatch("referenceGroundHeight", tag))
        }
        _ if update.auto_calculate_reference_height.is_some() => {
            return Err(kind_mismatch("autoCalculateReferenceHeight", tag))
        }
        _ => {}
    }
    match &mut area.kind {
        AreaKind::Ground(params) => {
            if let Some(heights) = update.terrain_heights {
                params.terrain_heights = heights;
            }
            if let Some(spacing) = update.grid_spacing_meters {
                ensure_finite(spacing, "gridSpacingMeters")?;
                let spacing = spacing.max(MIN_GRID_SPACING_M);
                if spacing != params.grid_spacing_meters {
                    params.grid_spacing_meters = spacing;
                    if params.has_grid() {
                        params.grid_needs_update = true;
                    }
                }
            }
        }
        _ if update.terrain_heights.is_some() => return Err(kind_mismatch("terrainHeights", tag)),
        _ if update.grid_spacing_meters.is_some() => return Err(kind_mismatch("gridSpacingMeters", tag)),
        _ => {}
    }

    if heights_changed {
        derive_roof_parallel(area, true);
    }
    Ok(())
}

/// Distance between the two defining edges of a roof-parallel area, in
/// meters: edge 2–3's midpoint measured against the line through 0–1.
pub fn roof_parallel_perpendicular_distance(corners: &[LatLng]) -> Option<f64> {
    if corners.len() != 4 {
        return None;
    }
    let frame = LocalFrame::anchored_at_first(corners)?;
    let local = frame.to_local_all(corners);
    let far_mid = geometry::midpoint(local[2], local[3]);
    if geometry::distance(local[0], local[1]) < EPSILON {
        return Some(geometry::distance(local[0], far_mid));
    }
    Some(geometry::distance_point_to_line(local[0], local[1], far_mid))
}

/// Keep `perpendicularDistance` in sync with the corners and derive the tilt
/// from the heights. Entered heights always win, so equal heights give a
/// flat roof; a corner edit only re-derives the tilt of a sloped roof.
fn derive_roof_parallel(area: &mut PvArea, heights_entered: bool) {
    let Some(distance) = roof_parallel_perpendicular_distance(&area.corners) else {
        return;
    };
    if let AreaKind::RoofParallel(params) = &mut area.kind {
        params.perpendicular_distance = distance;
        let rise = params.top_height - params.bottom_height;
        if distance > EPSILON && (heights_entered || rise.abs() > EPSILON) {
            area.tilt = (rise.abs() / distance).atan().to_degrees();
        }
    }
}

fn apply_topography(area: &mut PvArea, commit: TopographyCommit) -> Result<(), StoreError> {
    let tag = area.tag();
    if let Some(reference) = commit.reference_ground_height {
        match &mut area.kind {
            AreaKind::RoofMounted(params) => params.reference_ground_height = reference,
            _ => return Err(kind_mismatch("referenceGroundHeight", tag)),
        }
    }
    if commit.terrain_heights.is_none() && commit.grid == GridCommit::Unchanged {
        return Ok(());
    }
    let ground = area.ground_mut().ok_or_else(|| kind_mismatch("terrain data", tag))?;
    if let Some(heights) = commit.terrain_heights {
        ground.terrain_heights = heights;
    }
    match commit.grid {
        GridCommit::Unchanged => {}
        GridCommit::Replace(points) => {
            ground.support_points.retain(|p| p.manual);
            ground.support_points.extend(points.into_iter().map(|p| SupportPoint { manual: false, ..p }));
            ground.grid_needs_update = false;
        }
        GridCommit::Reheight(heights) => {
            let generated = ground.support_points.iter_mut().filter(|p| !p.manual);
            for (point, height) in generated.zip(heights) {
                point.height = height;
            }
        }
    }
    Ok(())
}
