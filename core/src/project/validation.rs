//! Input checks shared by the store and the pre-simulation report.
//!
//! The `ensure_*` helpers are gatekeepers: the store calls them before any
//! mutation so a rejected call leaves no trace. [`validate_project`] instead
//! walks a whole project and collects every problem it finds, the way a
//! simulation request is checked before it is handed to the glare engine.

use super::store::StoreError;
use super::types::{AreaKind, ModuleType, Project, PvArea, SimulationParameters};
use crate::geometry::LatLng;

const VALID_RESOLUTIONS: [u32; 5] = [1, 5, 10, 30, 60];

pub fn ensure_finite(value: f64, field: &str) -> Result<(), StoreError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(StoreError::InvalidInput(format!("{} must be a finite number, got {}", field, value)))
    }
}

pub fn ensure_position(p: LatLng, field: &str) -> Result<(), StoreError> {
    if !p.is_finite() {
        return Err(StoreError::InvalidInput(format!("{} has a non-finite coordinate", field)));
    }
    if !p.in_range() {
        return Err(StoreError::InvalidInput(format!(
            "{} is out of range ({}, {})",
            field, p.lat, p.lng
        )));
    }
    Ok(())
}

pub fn ensure_corners(area: &PvArea) -> Result<(), StoreError> {
    let tag = area.tag();
    if !tag.accepts_corner_count(area.corners.len()) {
        return Err(StoreError::InvalidCornerCount {
            kind: tag,
            expected: tag.corner_requirement(),
            actual: area.corners.len(),
        });
    }
    for (i, c) in area.corners.iter().enumerate() {
        ensure_position(*c, &format!("corner {}", i))?;
    }
    Ok(())
}

/// Structural and numeric validity of a single area.
pub fn ensure_area(area: &PvArea) -> Result<(), StoreError> {
    ensure_corners(area)?;
    ensure_finite(area.azimuth, "azimuth")?;
    ensure_finite(area.tilt, "tilt")?;
    ensure_finite(area.cross_tilt, "crossTilt")?;
    if !(0.0..=90.0).contains(&area.tilt) {
        return Err(StoreError::InvalidInput(format!("tilt must be within [0, 90], got {}", area.tilt)));
    }
    if !(-90.0..=90.0).contains(&area.cross_tilt) {
        return Err(StoreError::InvalidInput(format!(
            "crossTilt must be within [-90, 90], got {}",
            area.cross_tilt
        )));
    }
    if area.kind.numbers().iter().any(|v| !v.is_finite()) {
        return Err(StoreError::InvalidInput("kind-specific fields contain a non-finite number".into()));
    }
    let corner_count = area.corners.len();
    match &area.kind {
        AreaKind::RoofMounted(params) if params.corner_heights.len() != corner_count => {
            Err(StoreError::InvalidInput(format!(
                "expected {} corner heights, got {}",
                corner_count,
                params.corner_heights.len()
            )))
        }
        AreaKind::Ground(params) if params.terrain_heights.len() != corner_count => {
            Err(StoreError::InvalidInput(format!(
                "expected {} terrain heights, got {}",
                corner_count,
                params.terrain_heights.len()
            )))
        }
        _ => Ok(()),
    }
}

pub fn ensure_module_type(module_type: &ModuleType) -> Result<(), StoreError> {
    if module_type.name.trim().is_empty() {
        return Err(StoreError::InvalidInput("module type name cannot be empty".into()));
    }
    ensure_finite(module_type.beam_spread, "beamSpread")?;
    for (angle, radiance) in &module_type.reflection_profile {
        if *angle > 90 || angle % 10 != 0 {
            return Err(StoreError::InvalidInput(format!(
                "reflection profile angle {} is not one of 0, 10, ..., 90",
                angle
            )));
        }
        ensure_finite(*radiance, &format!("radiance at {}°", angle))?;
        if *radiance < 0.0 {
            return Err(StoreError::InvalidInput(format!("radiance at {}° cannot be negative", angle)));
        }
    }
    Ok(())
}

/// Collect every problem that would make the project unusable as a
/// simulation request. An empty list means the project is ready.
pub fn validate_project(project: &Project) -> Vec<String> {
    let mut errors = Vec::new();

    if project.pv_areas.is_empty() {
        errors.push("At least one PV area is required".to_string());
    }
    for (i, area) in project.pv_areas.iter().enumerate() {
        validate_area(project, area, i, &mut errors);
    }

    if project.observation_points.is_empty() {
        errors.push("At least one observation point is required".to_string());
    }
    for (i, op) in project.observation_points.iter().enumerate() {
        if op.name.trim().is_empty() {
            errors.push(format!("Observation point {}: name cannot be empty", i));
        }
        if !op.position().is_finite() || !op.position().in_range() {
            errors.push(format!("Observation point {}: invalid coordinates ({}, {})", i, op.lat, op.lng));
        }
        if !(0.0..=100.0).contains(&op.height_observer) {
            errors.push(format!("Observation point {}: invalid observer height {}", i, op.height_observer));
        }
        if !(op.height_object >= 0.0) {
            errors.push(format!("Observation point {}: invalid object height {}", i, op.height_object));
        }
    }

    let meta = &project.metadata;
    if meta.project_name.trim().is_empty() {
        errors.push("Metadata: missing or empty project_name".to_string());
    }
    if meta.language != "en" && meta.language != "de" {
        errors.push(format!("Metadata: unsupported language {}", meta.language));
    }
    if !(-12.0..=14.0).contains(&meta.utc_offset) {
        errors.push(format!("Metadata: invalid UTC offset {}", meta.utc_offset));
    }

    validate_simulation_parameters(&project.simulation_parameters, &mut errors);
    errors
}

fn validate_area(project: &Project, area: &PvArea, index: usize, errors: &mut Vec<String>) {
    let label = if area.name.is_empty() {
        format!("PV area {}", index)
    } else {
        format!("PV area {} ({})", index, area.name)
    };

    if let Err(e) = ensure_area(area) {
        errors.push(format!("{}: {}", label, e));
    }
    if !(0.0..=360.0).contains(&area.azimuth) {
        errors.push(format!("{}: invalid azimuth {}", label, area.azimuth));
    }
    if project.module_type(area.module_type_id).is_none() {
        errors.push(format!("{}: unknown module type {}", label, area.module_type_id));
    }
    if let AreaKind::Ground(params) = &area.kind {
        if params.grid_needs_update {
            errors.push(format!("{}: topography grid is out of date", label));
        }
    }
}

fn validate_simulation_parameters(params: &SimulationParameters, errors: &mut Vec<String>) {
    if !(0.1..=10.0).contains(&params.grid_width) {
        errors.push(format!("Simulation: invalid grid_width {}", params.grid_width));
    }
    if !VALID_RESOLUTIONS.contains(&params.resolution_minutes) {
        errors.push(format!("Simulation: invalid resolution {}min", params.resolution_minutes));
    }
    if !(1000.0..=100000.0).contains(&params.glare_threshold) {
        errors.push(format!("Simulation: invalid glare_threshold {}", params.glare_threshold));
    }
}
