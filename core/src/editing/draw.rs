//! Click-to-place drawing of new PV areas.

use crate::geometry::{self, LatLng, LocalFrame};
use crate::project::AreaKindTag;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DrawError {
    #[error("clicked position is not a valid coordinate")]
    InvalidPoint,
    #[error("a {kind} area needs {needed} points, {placed} placed")]
    NotEnoughPoints {
        kind: AreaKindTag,
        needed: usize,
        placed: usize,
    },
    #[error("the drawing is already complete")]
    AlreadyComplete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawStep {
    Pending { placed: usize },
    Complete(Vec<LatLng>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DrawSession {
    kind: AreaKindTag,
    points: Vec<LatLng>,
    complete: bool,
}

impl DrawSession {
    pub fn new(kind: AreaKindTag) -> Self {
        Self { kind, points: Vec::new(), complete: false }
    }

    pub fn kind(&self) -> AreaKindTag {
        self.kind
    }

    pub fn points(&self) -> &[LatLng] {
        &self.points
    }

    /// Clicks after which the shape completes by itself, if any.
    fn auto_complete_at(&self) -> Option<usize> {
        match self.kind {
            AreaKindTag::RoofParallel => Some(3),
            AreaKindTag::Facade => Some(2),
            AreaKindTag::RoofMounted | AreaKindTag::Ground => None,
        }
    }

    pub fn click(&mut self, position: LatLng) -> Result<DrawStep, DrawError> {
        if self.complete {
            return Err(DrawError::AlreadyComplete);
        }
        if !position.is_finite() || !position.in_range() {
            return Err(DrawError::InvalidPoint);
        }
        self.points.push(position);
        match self.auto_complete_at() {
            Some(count) if self.points.len() == count => self.complete().map(DrawStep::Complete),
            _ => Ok(DrawStep::Pending { placed: self.points.len() }),
        }
    }

    pub fn undo_last(&mut self) -> Option<LatLng> {
        if self.complete {
            return None;
        }
        self.points.pop()
    }

    /// Close a free-form polygon.
    pub fn finish(&mut self) -> Result<Vec<LatLng>, DrawError> {
        if self.complete {
            return Err(DrawError::AlreadyComplete);
        }
        match self.auto_complete_at() {
            Some(needed) => Err(DrawError::NotEnoughPoints { kind: self.kind, needed, placed: self.points.len() }),
            None if self.points.len() < 3 => {
                Err(DrawError::NotEnoughPoints { kind: self.kind, needed: 3, placed: self.points.len() })
            }
            None => self.complete(),
        }
    }

    fn complete(&mut self) -> Result<Vec<LatLng>, DrawError> {
        self.complete = true;
        let mut corners = self.points.clone();
        if self.kind == AreaKindTag::RoofParallel {
            corners.push(complete_parallelogram(corners[0], corners[1], corners[2]));
        }
        Ok(corners)
    }
}

/// Fourth corner of the parallelogram P1 P2 P3: `P1 + P3 - P2`.
pub fn complete_parallelogram(p1: LatLng, p2: LatLng, p3: LatLng) -> LatLng {
    let frame = LocalFrame::new(p1);
    let [a, b, c] = [p1, p2, p3].map(|p| frame.to_local(p));
    frame.to_geo(geometry::sub_2d(geometry::add_2d(a, c), b))
}
