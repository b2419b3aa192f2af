//! Batched elevation lookups.
//!
//! The elevation collaborator accepts at most [`MAX_ELEVATION_BATCH`] points
//! per request. The sampler splits a query into sequential batches and
//! stitches the answers back by position. A single failed batch fails the
//! whole query, so callers never see a partially populated result.

use crate::geometry::LatLng;
use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};

pub const MAX_ELEVATION_BATCH: usize = 256;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ElevationError {
    #[error("elevation service error: {0}")]
    Service(String),
    #[error("elevation service returned {actual} values for {expected} points")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("elevation for point {index} is not a finite number")]
    NonFinite { index: usize },
    #[error("elevation request timed out")]
    Timeout,
    #[error("elevation service is not connected")]
    Disconnected,
}

/// Source of ground elevations (meters above datum).
pub trait ElevationService: Send + Sync {
    /// One elevation per input point, in input order. Never called with
    /// more than [`MAX_ELEVATION_BATCH`] points.
    fn query_elevations<'a>(&'a self, points: &'a [LatLng]) -> BoxFuture<'a, Result<Vec<f64>, ElevationError>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElevationBatchSampler {
    batch_size: usize,
}

impl Default for ElevationBatchSampler {
    fn default() -> Self {
        Self::new(MAX_ELEVATION_BATCH)
    }
}

impl ElevationBatchSampler {
    /// Batch size is clamped to `1..=MAX_ELEVATION_BATCH`.
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size: batch_size.clamp(1, MAX_ELEVATION_BATCH) }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of requests a query of `points` points takes.
    pub fn batch_count(&self, points: usize) -> usize {
        points.div_ceil(self.batch_size)
    }

    pub async fn sample<S>(&self, service: &S, points: &[LatLng]) -> Result<Vec<f64>, ElevationError>
    where
        S: ElevationService + ?Sized,
    {
        let mut heights = vec![0.0; points.len()];
        let batches = self.batch_count(points.len());

        for (batch, chunk) in points.chunks(self.batch_size).enumerate() {
            let offset = batch * self.batch_size;
            debug!(batch = batch + 1, batches, points = chunk.len(), "querying elevations");

            let result = service.query_elevations(chunk).await.map_err(|e| {
                warn!(batch = batch + 1, batches, "elevation batch failed: {}", e);
                e
            })?;
            if result.len() != chunk.len() {
                return Err(ElevationError::LengthMismatch { expected: chunk.len(), actual: result.len() });
            }
            if let Some(i) = result.iter().position(|h| !h.is_finite()) {
                return Err(ElevationError::NonFinite { index: offset + i });
            }
            heights[offset..offset + chunk.len()].copy_from_slice(&result);
        }
        Ok(heights)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::SyntheticTerrain;
    use super::*;
    use futures::executor::block_on;

    fn points(n: usize) -> Vec<LatLng> {
        (0..n).map(|i| LatLng::new(48.0 + i as f64 * 1e-4, 11.0 - i as f64 * 1e-4)).collect()
    }

    #[test]
    fn test_700_points_take_three_batches_in_order() {
        let service = SyntheticTerrain::default();
        let sampler = ElevationBatchSampler::default();
        let pts = points(700);

        let heights = block_on(sampler.sample(&service, &pts)).unwrap();
        assert_eq!(service.call_sizes(), vec![256, 256, 188]);
        assert_eq!(heights.len(), 700);
        for (p, h) in pts.iter().zip(&heights) {
            assert_eq!(*h, SyntheticTerrain::height(*p));
        }
    }

    #[test]
    fn test_failure_aborts_everything() {
        let service = SyntheticTerrain::failing_on(1);
        let sampler = ElevationBatchSampler::default();
        let result = block_on(sampler.sample(&service, &points(600)));
        assert!(matches!(result, Err(ElevationError::Service(_))));
        // Third batch never sent
        assert_eq!(service.call_sizes(), vec![256, 256]);
    }

    #[test]
    fn test_batch_size_bounds() {
        assert_eq!(ElevationBatchSampler::new(0).batch_size(), 1);
        assert_eq!(ElevationBatchSampler::new(10_000).batch_size(), 256);
        assert_eq!(ElevationBatchSampler::new(100).batch_count(250), 3);
        assert_eq!(ElevationBatchSampler::default().batch_count(0), 0);
    }

    #[test]
    fn test_empty_query_makes_no_calls() {
        let service = SyntheticTerrain::default();
        let heights = block_on(ElevationBatchSampler::default().sample(&service, &[])).unwrap();
        assert!(heights.is_empty());
        assert!(service.call_sizes().is_empty());
    }

    struct ShortAnswers;

    impl ElevationService for ShortAnswers {
        fn query_elevations<'a>(&'a self, points: &'a [LatLng]) -> BoxFuture<'a, Result<Vec<f64>, ElevationError>> {
            Box::pin(async move { Ok(vec![0.0; points.len().saturating_sub(1)]) })
        }
    }

    #[test]
    fn test_length_mismatch() {
        let result = block_on(ElevationBatchSampler::default().sample(&ShortAnswers, &points(3)));
        assert_eq!(result, Err(ElevationError::LengthMismatch { expected: 3, actual: 2 }));
    }
}
