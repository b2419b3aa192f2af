//! The editor: turns map events into store mutations.
//!
//! One [`Editor`] per map view. It owns the drag state machine and the
//! current draw session; the store is passed in per event so the editor
//! never holds on to project data between events.

use super::draw::{DrawError, DrawSession, DrawStep};
use super::drag::{DragError, DragHandle, DragInput, DragState, TickThrottle};
use super::measurement::{measure_area, AreaMeasurements};
use super::rotation::area_azimuth;
use crate::config::EditorConfig;
use crate::geometry::LatLng;
use crate::ids::EntityId;
use crate::project::{AreaKindTag, AreaUpdate, ProjectStore, StoreError, MIN_GRID_SPACING_M};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

/// Input from the map surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MapEvent {
    VertexDrag { area: EntityId, vertex: usize, position: LatLng },
    /// `delta` is the offset in degrees since the drag started.
    EdgeDrag { area: EntityId, edge: usize, delta: LatLng },
    RotationDrag { area: EntityId, pointer: LatLng },
    DragEnd,
    Click { position: LatLng },
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EditorOutcome {
    Ignored,
    /// Geometry changed. Dimensions are only present when the refresh
    /// throttle let this tick through.
    Moved { area: EntityId, dimensions: Option<AreaMeasurements> },
    DragFinished { area: EntityId, dimensions: Option<AreaMeasurements> },
    DragCancelled { area: EntityId },
    DrawPending { placed: usize },
    AreaCreated { area: EntityId },
    DrawCancelled,
}

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Drag(#[from] DragError),
    #[error(transparent)]
    Draw(#[from] DrawError),
    #[error("no drawing in progress")]
    NotDrawing,
}

impl EditError {
    pub fn code(&self) -> &'static str {
        match self {
            EditError::Store(e) => e.code(),
            EditError::Drag(DragError::Locked(_)) => "AREA_LOCKED",
            EditError::Drag(_) => "INVALID_DRAG",
            EditError::Draw(_) => "INVALID_DRAW",
            EditError::NotDrawing => "NOT_DRAWING",
        }
    }
}

#[derive(Debug)]
pub struct Editor {
    config: EditorConfig,
    drag: DragState,
    draw: Option<DrawSession>,
    throttle: TickThrottle,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(EditorConfig::default())
    }
}

impl Editor {
    pub fn new(config: EditorConfig) -> Self {
        let throttle = TickThrottle::new(config.drag_throttle());
        Self { config, drag: DragState::Idle, draw: None, throttle }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn drag_state(&self) -> &DragState {
        &self.drag
    }

    pub fn drawing(&self) -> Option<&DrawSession> {
        self.draw.as_ref()
    }

    pub fn handle(
        &mut self,
        store: &mut ProjectStore,
        event: MapEvent,
        now: Instant,
    ) -> Result<EditorOutcome, EditError> {
        match event {
            MapEvent::VertexDrag { area, vertex, position } => {
                self.ensure_drag(store, area, DragHandle::Vertex(vertex), position)?;
                self.drag_tick(store, DragInput::Vertex(position), now)
            }
            MapEvent::EdgeDrag { area, edge, delta } => {
                self.ensure_drag(store, area, DragHandle::Edge(edge), delta)?;
                self.drag_tick(store, DragInput::Edge(delta), now)
            }
            MapEvent::RotationDrag { area, pointer } => {
                self.ensure_drag(store, area, DragHandle::Rotate, pointer)?;
                self.drag_tick(store, DragInput::Pointer(pointer), now)
            }
            MapEvent::DragEnd => Ok(self.end_drag(store)),
            MapEvent::Click { position } => self.click(store, position),
            MapEvent::Cancel => self.cancel(store),
        }
    }

    fn ensure_drag(
        &mut self,
        store: &ProjectStore,
        area: EntityId,
        handle: DragHandle,
        pointer: LatLng,
    ) -> Result<(), EditError> {
        let continuing = self
            .drag
            .session()
            .is_some_and(|s| s.area == area && s.handle == handle);
        if continuing {
            return Ok(());
        }
        if let Some(previous) = self.drag.finish() {
            debug!(area = %previous.area, "drag superseded by a new gesture");
        }
        let pv_area = store.area(area).ok_or(StoreError::AreaNotFound(area))?;
        self.drag = DragState::begin(pv_area, handle, pointer)?;
        self.throttle.reset();
        debug!(%area, ?handle, "drag started");
        Ok(())
    }

    fn drag_tick(
        &mut self,
        store: &mut ProjectStore,
        input: DragInput,
        now: Instant,
    ) -> Result<EditorOutcome, EditError> {
        let Some(session) = self.drag.session_mut() else {
            return Ok(EditorOutcome::Ignored);
        };
        let area = session.area;
        let proposal = match session.propose(input) {
            Ok(proposal) => proposal,
            Err(err) => {
                debug!(%area, "drag tick ignored: {}", err);
                return Ok(EditorOutcome::Ignored);
            }
        };
        store.update_geometry(area, proposal.corners.clone(), proposal.azimuth)?;
        session.accept(&proposal);

        let dimensions = if self.throttle.ready(now) {
            store.area(area).map(measure_area)
        } else {
            None
        };
        Ok(EditorOutcome::Moved { area, dimensions })
    }

    fn end_drag(&mut self, store: &ProjectStore) -> EditorOutcome {
        self.throttle.reset();
        match self.drag.finish() {
            Some(session) => EditorOutcome::DragFinished {
                area: session.area,
                dimensions: store.area(session.area).map(measure_area),
            },
            None => EditorOutcome::Ignored,
        }
    }

    fn cancel(&mut self, store: &mut ProjectStore) -> Result<EditorOutcome, EditError> {
        if let Some(session) = self.drag.finish() {
            self.throttle.reset();
            if store.area(session.area).is_some() {
                store.update_geometry(session.area, session.original_corners, Some(session.original_azimuth))?;
            }
            debug!(area = %session.area, "drag cancelled");
            return Ok(EditorOutcome::DragCancelled { area: session.area });
        }
        if self.draw.take().is_some() {
            return Ok(EditorOutcome::DrawCancelled);
        }
        Ok(EditorOutcome::Ignored)
    }

    // -------------------------------------------------------------------------
    // Drawing
    // -------------------------------------------------------------------------

    /// Start drawing a new area. Any unfinished drawing is discarded.
    pub fn begin_draw(&mut self, kind: AreaKindTag) {
        if let Some(session) = self.drag.finish() {
            debug!(area = %session.area, "drag abandoned for drawing");
        }
        self.draw = Some(DrawSession::new(kind));
    }

    /// Close a free-form drawing and create its area.
    pub fn finish_draw(&mut self, store: &mut ProjectStore) -> Result<EntityId, EditError> {
        let draw = self.draw.as_mut().ok_or(EditError::NotDrawing)?;
        let kind = draw.kind();
        let corners = draw.finish()?;
        self.draw = None;
        self.create_area(store, kind, corners)
    }

    fn click(&mut self, store: &mut ProjectStore, position: LatLng) -> Result<EditorOutcome, EditError> {
        let Some(draw) = self.draw.as_mut() else {
            return Ok(EditorOutcome::Ignored);
        };
        let kind = draw.kind();
        match draw.click(position)? {
            DrawStep::Pending { placed } => Ok(EditorOutcome::DrawPending { placed }),
            DrawStep::Complete(corners) => {
                self.draw = None;
                let area = self.create_area(store, kind, corners)?;
                Ok(EditorOutcome::AreaCreated { area })
            }
        }
    }

    fn create_area(
        &mut self,
        store: &mut ProjectStore,
        kind: AreaKindTag,
        corners: Vec<LatLng>,
    ) -> Result<EntityId, EditError> {
        let azimuth = match kind {
            AreaKindTag::RoofParallel => area_azimuth(&corners),
            _ => None,
        };
        let id = store.add_area("", kind, corners, self.config.default_module_type)?;

        let spacing = self.config.grid_spacing();
        let update = AreaUpdate {
            azimuth,
            grid_spacing_meters: (kind == AreaKindTag::Ground && spacing > MIN_GRID_SPACING_M).then_some(spacing),
            ..Default::default()
        };
        if update != AreaUpdate::default() {
            store.update_area(id, update)?;
        }
        info!(%id, %kind, "PV area drawn");
        Ok(id)
    }
}
