//! Terrain sampling for ground areas and roof reference heights.

pub mod grid;
pub mod sampler;
pub mod job;

pub use grid::generate_topography_grid;
pub use sampler::{ElevationBatchSampler, ElevationError, ElevationService, MAX_ELEVATION_BATCH};
pub use job::{run_topography_job, JobMode, TopographyError, TopographyJob};
