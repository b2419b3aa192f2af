//! Drag gesture state machine.
//!
//! `Idle -> Dragging -> Idle`. A drag remembers the corners it started from,
//! so cancelling restores them wholesale and every tick is computed from the
//! start of the gesture instead of accumulating per-tick rounding.

use super::constraints::{compute_constrained_vertex, translate_edge, ConstraintError};
use super::rotation::{rotate_quadrilateral, RotationError};
use crate::geometry::{LatLng, LocalFrame};
use crate::ids::EntityId;
use crate::project::{AreaKindTag, PvArea};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DragHandle {
    Vertex(usize),
    Edge(usize),
    Rotate,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DragError {
    #[error("PV area {0} is locked")]
    Locked(EntityId),
    #[error("handle {handle:?} does not exist on a shape with {corners} corners")]
    InvalidHandle { handle: DragHandle, corners: usize },
    #[error(transparent)]
    Constraint(#[from] ConstraintError),
    #[error(transparent)]
    Rotation(#[from] RotationError),
}

/// Pointer input for one drag tick, matching the handle being dragged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragInput {
    /// New position of the dragged vertex.
    Vertex(LatLng),
    /// Cumulative offset of the dragged edge since the drag began, in degrees.
    Edge(LatLng),
    /// Current pointer position of a rotation drag.
    Pointer(LatLng),
}

/// Geometry proposed by one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct DragProposal {
    pub corners: Vec<LatLng>,
    pub azimuth: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DragSession {
    pub area: EntityId,
    pub kind: AreaKindTag,
    pub handle: DragHandle,
    pub original_corners: Vec<LatLng>,
    pub original_azimuth: f64,
    /// Vertex position or pointer position at the start of the gesture.
    pub anchor: LatLng,
    pub frame: LocalFrame,
    current: Vec<LatLng>,
}

impl DragSession {
    pub fn current_corners(&self) -> &[LatLng] {
        &self.current
    }

    /// Compute the geometry for this tick without touching the session.
    pub fn propose(&self, input: DragInput) -> Result<DragProposal, DragError> {
        match (self.handle, input) {
            (DragHandle::Vertex(index), DragInput::Vertex(target)) => {
                let moved = compute_constrained_vertex(self.kind, &self.current, index, self.anchor, target)?;
                let mut corners = self.current.clone();
                corners[index] = moved;
                Ok(DragProposal { corners, azimuth: None })
            }
            (DragHandle::Edge(edge), DragInput::Edge(delta)) => Ok(DragProposal {
                corners: translate_edge(&self.original_corners, edge, delta)?,
                azimuth: None,
            }),
            (DragHandle::Rotate, DragInput::Pointer(pointer)) => {
                let rotation = rotate_quadrilateral(&self.original_corners, self.anchor, pointer)?;
                Ok(DragProposal { corners: rotation.corners, azimuth: Some(rotation.azimuth) })
            }
            (handle, _) => Err(DragError::InvalidHandle { handle, corners: self.current.len() }),
        }
    }

    /// Record a proposal once it has been accepted by the store.
    pub fn accept(&mut self, proposal: &DragProposal) {
        self.current = proposal.corners.clone();
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}

impl DragState {
    /// Start dragging `handle` of `area`. For rotations `pointer` is the
    /// pointer position; for vertex and edge drags it is ignored and the
    /// vertex itself becomes the anchor.
    pub fn begin(area: &PvArea, handle: DragHandle, pointer: LatLng) -> Result<DragState, DragError> {
        if area.locked {
            return Err(DragError::Locked(area.id));
        }
        let n = area.corners.len();
        let anchor = match handle {
            DragHandle::Vertex(i) if i < n => area.corners[i],
            DragHandle::Edge(i) if i < n && n >= 2 => area.corners[i],
            DragHandle::Rotate if n == 4 => pointer,
            _ => return Err(DragError::InvalidHandle { handle, corners: n }),
        };
        if !anchor.is_finite() {
            return Err(DragError::Constraint(ConstraintError::NonFinite));
        }
        Ok(DragState::Dragging(DragSession {
            area: area.id,
            kind: area.tag(),
            handle,
            original_corners: area.corners.clone(),
            original_azimuth: area.azimuth,
            anchor,
            frame: LocalFrame::new(anchor),
            current: area.corners.clone(),
        }))
    }

    pub fn session(&self) -> Option<&DragSession> {
        match self {
            DragState::Idle => None,
            DragState::Dragging(session) => Some(session),
        }
    }

    pub fn session_mut(&mut self) -> Option<&mut DragSession> {
        match self {
            DragState::Idle => None,
            DragState::Dragging(session) => Some(session),
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self, DragState::Dragging(_))
    }

    /// Leave the drag, handing back the finished session.
    pub fn finish(&mut self) -> Option<DragSession> {
        match std::mem::take(self) {
            DragState::Idle => None,
            DragState::Dragging(session) => Some(session),
        }
    }
}

/// Fixed-interval gate for refreshing dimension labels during a drag.
#[derive(Debug, Clone)]
pub struct TickThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl TickThrottle {
    pub fn new(interval: Duration) -> Self {
        Self { interval, last: None }
    }

    /// True if at least one interval has passed since the last accepted tick.
    pub fn ready(&mut self, now: Instant) -> bool {
        match self.last {
            Some(last) if now.saturating_duration_since(last) < self.interval => false,
            _ => {
                self.last = Some(now);
                true
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ModuleTypeId;

    fn roof_parallel() -> PvArea {
        let frame = LocalFrame::new(LatLng::new(48.0, 11.0));
        let corners = frame.to_geo_all(&[[0.0, 0.0], [0.0, 10.0], [8.0, 10.0], [8.0, 0.0]]);
        PvArea::new(EntityId::new(), "Roof", AreaKindTag::RoofParallel, corners, ModuleTypeId(0))
    }

    #[test]
    fn test_begin_validates_handle() {
        let area = roof_parallel();
        let p = area.corners[0];
        assert!(DragState::begin(&area, DragHandle::Vertex(3), p).is_ok());
        assert!(matches!(
            DragState::begin(&area, DragHandle::Vertex(4), p),
            Err(DragError::InvalidHandle { corners: 4, .. })
        ));

        let mut locked = area.clone();
        locked.locked = true;
        assert!(matches!(DragState::begin(&locked, DragHandle::Rotate, p), Err(DragError::Locked(_))));
    }

    #[test]
    fn test_mismatched_input_is_rejected() {
        let area = roof_parallel();
        let state = DragState::begin(&area, DragHandle::Rotate, area.corners[0]).unwrap();
        let session = state.session().unwrap();
        assert!(session.propose(DragInput::Vertex(area.corners[1])).is_err());
    }

    #[test]
    fn test_finish_returns_to_idle() {
        let area = roof_parallel();
        let mut state = DragState::begin(&area, DragHandle::Edge(1), area.corners[0]).unwrap();
        assert!(state.is_dragging());
        let session = state.finish().unwrap();
        assert_eq!(session.original_corners, area.corners);
        assert_eq!(state, DragState::Idle);
        assert!(state.finish().is_none());
    }

    #[test]
    fn test_throttle_interval() {
        let mut throttle = TickThrottle::new(Duration::from_millis(50));
        let t0 = Instant::now();
        assert!(throttle.ready(t0));
        assert!(!throttle.ready(t0 + Duration::from_millis(20)));
        assert!(throttle.ready(t0 + Duration::from_millis(50)));
        assert!(!throttle.ready(t0 + Duration::from_millis(99)));
        throttle.reset();
        assert!(throttle.ready(t0 + Duration::from_millis(100)));
    }
}
