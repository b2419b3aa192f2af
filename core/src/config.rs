//! Tunables for the interactive editor and topography jobs.

use crate::ids::ModuleTypeId;
use crate::project::MIN_GRID_SPACING_M;
use crate::topography::MAX_ELEVATION_BATCH;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    /// Minimum interval between dimension refreshes while dragging.
    pub drag_throttle_ms: u64,
    /// Points per elevation request, capped at [`MAX_ELEVATION_BATCH`].
    pub elevation_batch_size: usize,
    /// Grid spacing given to newly drawn ground areas.
    pub default_grid_spacing_meters: f64,
    /// Module type assigned to newly drawn areas.
    pub default_module_type: ModuleTypeId,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            drag_throttle_ms: 50,
            elevation_batch_size: MAX_ELEVATION_BATCH,
            default_grid_spacing_meters: MIN_GRID_SPACING_M,
            default_module_type: ModuleTypeId(0),
        }
    }
}

impl EditorConfig {
    pub fn drag_throttle(&self) -> Duration {
        Duration::from_millis(self.drag_throttle_ms)
    }

    pub fn batch_size(&self) -> usize {
        self.elevation_batch_size.clamp(1, MAX_ELEVATION_BATCH)
    }

    pub fn grid_spacing(&self) -> f64 {
        if self.default_grid_spacing_meters.is_finite() {
            self.default_grid_spacing_meters.max(MIN_GRID_SPACING_M)
        } else {
            MIN_GRID_SPACING_M
        }
    }
}
