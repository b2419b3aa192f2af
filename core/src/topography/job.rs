//! Topography jobs: plan against the store, sample asynchronously, commit.
//!
//! Planning and committing borrow the store briefly; sampling does not touch
//! it at all, so other edits can land while elevations are in flight. The
//! store's ticket check decides at commit time whether the result still
//! applies.

use super::grid::generate_topography_grid;
use super::sampler::{ElevationBatchSampler, ElevationError, ElevationService};
use crate::geometry::{self, LatLng, LocalFrame};
use crate::ids::EntityId;
use crate::project::{
    AreaKind, AreaKindTag, GridCommit, ProjectStore, StoreError, SupportPoint, TopographyCommit, TopographyTicket,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Upper bound on generated grid points for one area.
pub const MAX_GRID_POINTS: usize = 20_000;

#[derive(Debug, Error)]
pub enum TopographyError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Elevation(#[from] ElevationError),
    #[error("a {0} area has no topography to sample")]
    NotApplicable(AreaKindTag),
    #[error("grid would have {points} points, more than the limit of {limit}")]
    GridTooLarge { points: usize, limit: usize },
}

impl TopographyError {
    pub fn code(&self) -> &'static str {
        match self {
            TopographyError::Store(e) => e.code(),
            TopographyError::Elevation(_) => "ELEVATION_FAILED",
            TopographyError::NotApplicable(_) => "NO_TOPOGRAPHY",
            TopographyError::GridTooLarge { .. } => "GRID_TOO_LARGE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobMode {
    /// Rebuild the generated grid from the current boundary and spacing.
    Regenerate,
    /// Re-query heights for the existing generated points.
    Refresh,
    /// Re-query only the boundary corners and the roof reference point.
    Corners,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopographyJob {
    ticket: TopographyTicket,
    mode: JobMode,
    kind: AreaKindTag,
    /// Generated points to sample (new lattice or existing points).
    grid: Vec<LatLng>,
    /// Ground corners for `terrainHeights`.
    corners: Vec<LatLng>,
    /// Centroid for an automatic roof reference height.
    reference: Option<LatLng>,
}

impl TopographyJob {
    /// Snapshot what needs sampling for `area` and take a fresh ticket.
    pub fn plan(store: &mut ProjectStore, area: EntityId, mode: JobMode) -> Result<Self, TopographyError> {
        let pv_area = store.area(area).ok_or(StoreError::AreaNotFound(area))?;
        let kind = pv_area.tag();
        let (grid, corners, reference) = match &pv_area.kind {
            AreaKind::Ground(params) => {
                let grid = match mode {
                    JobMode::Regenerate => generate_topography_grid(&pv_area.corners, params.grid_spacing_meters),
                    JobMode::Refresh => params.generated_points().map(|p| p.position()).collect(),
                    JobMode::Corners => Vec::new(),
                };
                (grid, pv_area.corners.clone(), None)
            }
            AreaKind::RoofMounted(params) if params.auto_calculate_reference_height => {
                let reference = LocalFrame::anchored_at_first(&pv_area.corners).and_then(|frame| {
                    geometry::vertex_centroid(&frame.to_local_all(&pv_area.corners)).map(|c| frame.to_geo(c))
                });
                (Vec::new(), Vec::new(), reference)
            }
            _ => return Err(TopographyError::NotApplicable(kind)),
        };
        if grid.len() > MAX_GRID_POINTS {
            return Err(TopographyError::GridTooLarge { points: grid.len(), limit: MAX_GRID_POINTS });
        }

        let ticket = store.issue_topography_ticket(area)?;
        info!(
            %area,
            ?mode,
            grid = grid.len(),
            corners = corners.len(),
            serial = ticket.serial,
            "topography job planned"
        );
        Ok(Self { ticket, mode, kind, grid, corners, reference })
    }

    pub fn area(&self) -> EntityId {
        self.ticket.area
    }

    pub fn ticket(&self) -> &TopographyTicket {
        &self.ticket
    }

    pub fn mode(&self) -> JobMode {
        self.mode
    }

    /// Every point the job asks elevations for: grid, then corners, then
    /// the reference point.
    pub fn query_points(&self) -> Vec<LatLng> {
        let mut points = self.grid.clone();
        points.extend_from_slice(&self.corners);
        points.extend(self.reference);
        points
    }

    /// Query elevations and shape them into a store commit.
    pub async fn sample<S>(
        &self,
        sampler: &ElevationBatchSampler,
        service: &S,
    ) -> Result<TopographyCommit, TopographyError>
    where
        S: ElevationService + ?Sized,
    {
        let heights = sampler.sample(service, &self.query_points()).await.map_err(|e| {
            warn!(area = %self.area(), "topography job aborted: {}", e);
            e
        })?;
        Ok(self.build_commit(&heights))
    }

    fn build_commit(&self, heights: &[f64]) -> TopographyCommit {
        let (grid_heights, rest) = heights.split_at(self.grid.len());
        let (corner_heights, rest) = rest.split_at(self.corners.len());

        let grid = match (self.kind, self.mode) {
            (AreaKindTag::Ground, JobMode::Regenerate) => GridCommit::Replace(
                self.grid
                    .iter()
                    .zip(grid_heights)
                    .map(|(p, h)| SupportPoint::generated(*p, *h))
                    .collect(),
            ),
            (AreaKindTag::Ground, JobMode::Refresh) => GridCommit::Reheight(grid_heights.to_vec()),
            _ => GridCommit::Unchanged,
        };
        TopographyCommit {
            terrain_heights: (self.kind == AreaKindTag::Ground).then(|| corner_heights.to_vec()),
            reference_ground_height: self.reference.and(rest.first().copied()),
            grid,
        }
    }

    /// Write the result back. Fails if the area was deleted, locked, moved,
    /// or handed to a newer job in the meantime.
    pub fn commit(self, store: &mut ProjectStore, commit: TopographyCommit) -> Result<(), TopographyError> {
        let area = self.area();
        store.commit_topography(&self.ticket, commit).map_err(|e| {
            warn!(%area, "discarding topography result: {}", e);
            e
        })?;
        info!(%area, mode = ?self.mode, "topography committed");
        Ok(())
    }
}

/// Plan, sample and commit in one go, for callers that own the store for the
/// whole duration.
pub async fn run_topography_job<S>(
    store: &mut ProjectStore,
    area: EntityId,
    mode: JobMode,
    sampler: &ElevationBatchSampler,
    service: &S,
) -> Result<(), TopographyError>
where
    S: ElevationService + ?Sized,
{
    let job = TopographyJob::plan(store, area, mode)?;
    let commit = job.sample(sampler, service).await?;
    job.commit(store, commit)
}
