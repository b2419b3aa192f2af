//! Glare-engine request document built from a project.
//!
//! The engine speaks snake_case and flat per-corner elevations, so this is a
//! one-way projection of the store's camelCase model.

use super::types::{AreaKind, Project, PvArea};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CornerRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub ground_elevation: f64,
    pub height_above_ground: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvAreaRequest {
    pub name: String,
    pub corners: Vec<CornerRequest>,
    pub holes: Vec<Vec<CornerRequest>>,
    pub azimuth: f64,
    pub tilt: f64,
    pub module_type: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PvAreaInformation {
    pub azimuth: f64,
    pub tilt: f64,
    pub module_type: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationPointRequest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub ground_elevation: f64,
    pub height_above_ground: f64,
    pub height_object: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaDataRequest {
    pub user_id: String,
    pub project_id: String,
    pub project_name: String,
    pub description: String,
    pub client: String,
    pub utc: f64,
    pub language: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameterRequest {
    pub grid_width: f64,
    /// e.g. `"10min"`
    pub resolution: String,
    pub intensity_threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub pv_areas: Vec<PvAreaRequest>,
    pub list_of_pv_area_information: Vec<PvAreaInformation>,
    pub list_of_ops: Vec<ObservationPointRequest>,
    pub meta_data: MetaDataRequest,
    pub simulation_parameter: SimulationParameterRequest,
}

/// Datum elevation and height above it for every corner of an area.
///
/// Roof-parallel areas slope from edge 0–1 (top) down to edge 2–3 (bottom).
fn corner_elevations(area: &PvArea) -> Vec<(f64, f64)> {
    let n = area.corners.len();
    match &area.kind {
        AreaKind::RoofParallel(p) => (0..n)
            .map(|i| (0.0, if i < 2 { p.top_height } else { p.bottom_height }))
            .collect(),
        AreaKind::RoofMounted(p) => (0..n)
            .map(|i| (p.reference_ground_height, p.corner_heights.get(i).copied().unwrap_or(0.0)))
            .collect(),
        AreaKind::Ground(p) => (0..n)
            .map(|i| (p.terrain_heights.get(i).copied().unwrap_or(0.0), 0.0))
            .collect(),
        AreaKind::Facade => vec![(0.0, 0.0); n],
    }
}

pub fn simulation_request(project: &Project) -> SimulationRequest {
    let pv_areas = project
        .pv_areas
        .iter()
        .map(|area| PvAreaRequest {
            name: area.name.clone(),
            corners: area
                .corners
                .iter()
                .zip(corner_elevations(area))
                .map(|(c, (ground, above))| CornerRequest {
                    latitude: c.lat,
                    longitude: c.lng,
                    ground_elevation: ground,
                    height_above_ground: above,
                })
                .collect(),
            holes: Vec::new(),
            azimuth: area.azimuth,
            tilt: area.tilt,
            module_type: area.module_type_id.0,
        })
        .collect();

    let list_of_pv_area_information = project
        .pv_areas
        .iter()
        .map(|area| PvAreaInformation {
            azimuth: area.azimuth,
            tilt: area.tilt,
            module_type: area.module_type_id.0,
        })
        .collect();

    let list_of_ops = project
        .observation_points
        .iter()
        .map(|op| ObservationPointRequest {
            name: op.name.clone(),
            latitude: op.lat,
            longitude: op.lng,
            ground_elevation: 0.0,
            height_above_ground: op.height_observer,
            height_object: op.height_object,
        })
        .collect();

    let meta = &project.metadata;
    let params = &project.simulation_parameters;
    SimulationRequest {
        pv_areas,
        list_of_pv_area_information,
        list_of_ops,
        meta_data: MetaDataRequest {
            user_id: meta.user_id.clone(),
            project_id: meta.project_id.clone(),
            project_name: meta.project_name.clone(),
            description: meta.description.clone(),
            client: meta.client.clone(),
            utc: meta.utc_offset,
            language: meta.language.clone(),
            created_at: meta.created_at.clone(),
        },
        simulation_parameter: SimulationParameterRequest {
            grid_width: params.grid_width,
            resolution: format!("{}min", params.resolution_minutes),
            intensity_threshold: params.glare_threshold,
        },
    }
}
