use crate::geometry::LatLng;
use crate::ids::{EntityId, ModuleTypeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Smallest grid spacing accepted for topography sampling, in meters.
pub const MIN_GRID_SPACING_M: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AreaKindTag {
    RoofParallel,
    RoofMounted,
    Facade,
    Ground,
}

impl AreaKindTag {
    /// Whether a shape of this kind may have `count` corners.
    pub fn accepts_corner_count(&self, count: usize) -> bool {
        match self {
            AreaKindTag::RoofParallel => count == 4,
            AreaKindTag::Facade => count == 2,
            AreaKindTag::RoofMounted | AreaKindTag::Ground => count >= 3,
        }
    }

    pub fn corner_requirement(&self) -> &'static str {
        match self {
            AreaKindTag::RoofParallel => "exactly 4",
            AreaKindTag::Facade => "exactly 2",
            AreaKindTag::RoofMounted | AreaKindTag::Ground => "at least 3",
        }
    }
}

impl fmt::Display for AreaKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AreaKindTag::RoofParallel => "roof-parallel",
            AreaKindTag::RoofMounted => "roof-mounted",
            AreaKindTag::Facade => "facade",
            AreaKindTag::Ground => "ground",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoofParallelParams {
    pub top_height: f64,
    pub bottom_height: f64,
    /// Distance between the two defining edges (0–1 and 2–3), in meters.
    pub perpendicular_distance: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoofMountedParams {
    /// One height per corner, relative to `reference_ground_height`.
    pub corner_heights: Vec<f64>,
    /// Ground level (GOK) above datum.
    #[serde(default)]
    pub reference_ground_height: f64,
    pub auto_calculate_reference_height: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundParams {
    /// Terrain height above datum at each corner.
    pub terrain_heights: Vec<f64>,
    pub support_points: Vec<SupportPoint>,
    pub grid_spacing_meters: f64,
    pub grid_needs_update: bool,
}

impl Default for GroundParams {
    fn default() -> Self {
        Self {
            terrain_heights: Vec::new(),
            support_points: Vec::new(),
            grid_spacing_meters: MIN_GRID_SPACING_M,
            grid_needs_update: false,
        }
    }
}

/// Freshness of a ground area's generated support grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridState {
    Clean,
    Dirty,
}

impl GroundParams {
    pub fn grid_state(&self) -> GridState {
        if self.grid_needs_update {
            GridState::Dirty
        } else {
            GridState::Clean
        }
    }

    /// A grid exists once any generated (non-manual) point is present.
    pub fn has_grid(&self) -> bool {
        self.support_points.iter().any(|p| !p.manual)
    }

    pub fn manual_points(&self) -> impl Iterator<Item = &SupportPoint> {
        self.support_points.iter().filter(|p| p.manual)
    }

    pub fn generated_points(&self) -> impl Iterator<Item = &SupportPoint> {
        self.support_points.iter().filter(|p| !p.manual)
    }
}

/// Kind-specific part of a PV area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum AreaKind {
    RoofParallel(RoofParallelParams),
    RoofMounted(RoofMountedParams),
    Facade,
    Ground(GroundParams),
}

impl AreaKind {
    /// Fresh parameters for a newly drawn shape with `corner_count` corners.
    pub fn new(tag: AreaKindTag, corner_count: usize) -> Self {
        match tag {
            AreaKindTag::RoofParallel => AreaKind::RoofParallel(RoofParallelParams::default()),
            AreaKindTag::RoofMounted => AreaKind::RoofMounted(RoofMountedParams {
                corner_heights: vec![0.0; corner_count],
                reference_ground_height: 0.0,
                auto_calculate_reference_height: true,
            }),
            AreaKindTag::Facade => AreaKind::Facade,
            AreaKindTag::Ground => AreaKind::Ground(GroundParams {
                terrain_heights: vec![0.0; corner_count],
                ..GroundParams::default()
            }),
        }
    }

    pub fn tag(&self) -> AreaKindTag {
        match self {
            AreaKind::RoofParallel(_) => AreaKindTag::RoofParallel,
            AreaKind::RoofMounted(_) => AreaKindTag::RoofMounted,
            AreaKind::Facade => AreaKindTag::Facade,
            AreaKind::Ground(_) => AreaKindTag::Ground,
        }
    }

    /// Keep per-corner arrays the same length as the corner list.
    /// New corners get the height of the last existing entry (or 0).
    pub fn resize_per_corner(&mut self, corner_count: usize) {
        fn resize(values: &mut Vec<f64>, len: usize) {
            let fill = values.last().copied().unwrap_or(0.0);
            values.resize(len, fill);
        }
        match self {
            AreaKind::RoofMounted(params) => resize(&mut params.corner_heights, corner_count),
            AreaKind::Ground(params) => resize(&mut params.terrain_heights, corner_count),
            AreaKind::RoofParallel(_) | AreaKind::Facade => {}
        }
    }

    /// Every number stored in the kind-specific fields.
    pub fn numbers(&self) -> Vec<f64> {
        match self {
            AreaKind::RoofParallel(p) => vec![p.top_height, p.bottom_height, p.perpendicular_distance],
            AreaKind::RoofMounted(p) => {
                let mut out = p.corner_heights.clone();
                out.push(p.reference_ground_height);
                out
            }
            AreaKind::Facade => Vec::new(),
            AreaKind::Ground(p) => {
                let mut out = p.terrain_heights.clone();
                out.push(p.grid_spacing_meters);
                for sp in &p.support_points {
                    out.extend([sp.lat, sp.lng, sp.height]);
                }
                out
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SupportPoint {
    pub lat: f64,
    pub lng: f64,
    pub height: f64,
    pub manual: bool,
}

impl SupportPoint {
    pub fn generated(position: LatLng, height: f64) -> Self {
        Self { lat: position.lat, lng: position.lng, height, manual: false }
    }

    pub fn manual(position: LatLng, height: f64) -> Self {
        Self { lat: position.lat, lng: position.lng, height, manual: true }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PvArea {
    pub id: EntityId,
    #[serde(default)]
    pub name: String,
    pub corners: Vec<LatLng>,
    pub locked: bool,
    pub visible: bool,
    pub azimuth: f64,
    pub tilt: f64,
    pub cross_tilt: f64,
    pub module_type_id: ModuleTypeId,
    #[serde(flatten)]
    pub kind: AreaKind,
}

impl PvArea {
    pub fn new(id: EntityId, name: &str, tag: AreaKindTag, corners: Vec<LatLng>, module_type_id: ModuleTypeId) -> Self {
        let kind = AreaKind::new(tag, corners.len());
        // Facades are vertical by definition
        let tilt = match tag {
            AreaKindTag::Facade => 90.0,
            AreaKindTag::Ground => 20.0,
            AreaKindTag::RoofParallel | AreaKindTag::RoofMounted => 30.0,
        };
        Self {
            id,
            name: name.to_string(),
            corners,
            locked: false,
            visible: true,
            azimuth: 180.0,
            tilt,
            cross_tilt: 0.0,
            module_type_id,
            kind,
        }
    }

    pub fn tag(&self) -> AreaKindTag {
        self.kind.tag()
    }

    pub fn ground(&self) -> Option<&GroundParams> {
        match &self.kind {
            AreaKind::Ground(params) => Some(params),
            _ => None,
        }
    }

    pub fn ground_mut(&mut self) -> Option<&mut GroundParams> {
        match &mut self.kind {
            AreaKind::Ground(params) => Some(params),
            _ => None,
        }
    }
}

/// Partial update of a PV area's parameters. `None` leaves a field as is.
/// Kind-specific fields are rejected for areas of another kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AreaUpdate {
    pub name: Option<String>,
    pub visible: Option<bool>,
    pub azimuth: Option<f64>,
    pub tilt: Option<f64>,
    pub cross_tilt: Option<f64>,
    pub module_type_id: Option<ModuleTypeId>,
    pub top_height: Option<f64>,
    pub bottom_height: Option<f64>,
    pub corner_heights: Option<Vec<f64>>,
    pub reference_ground_height: Option<f64>,
    pub auto_calculate_reference_height: Option<bool>,
    pub terrain_heights: Option<Vec<f64>>,
    pub grid_spacing_meters: Option<f64>,
}

/// Angle of incidence (degrees) to radiance.
pub type ReflectionProfile = BTreeMap<u32, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleType {
    pub id: ModuleTypeId,
    pub name: String,
    pub reflection_profile: ReflectionProfile,
    #[serde(default = "default_beam_spread")]
    pub beam_spread: f64,
    #[serde(default)]
    pub protected: bool,
}

fn default_beam_spread() -> f64 {
    0.5
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleTypeUpdate {
    pub name: Option<String>,
    pub reflection_profile: Option<ReflectionProfile>,
    pub beam_spread: Option<f64>,
}

fn profile(values: [f64; 10]) -> ReflectionProfile {
    values
        .iter()
        .enumerate()
        .map(|(i, v)| (i as u32 * 10, *v))
        .collect()
}

/// The three built-in module types. They cannot be edited or deleted.
pub fn default_module_types() -> Vec<ModuleType> {
    vec![
        ModuleType {
            id: ModuleTypeId(0),
            name: "Standard Modul".to_string(),
            reflection_profile: profile([
                70000.0, 70000.0, 71000.0, 79000.0, 120000.0,
                280000.0, 930000.0, 3900000.0, 16134855.0, 58377635.0,
            ]),
            beam_spread: 0.5,
            protected: true,
        },
        ModuleType {
            id: ModuleTypeId(1),
            name: "Anti-Reflex Modul".to_string(),
            reflection_profile: profile([
                2800.0, 2900.0, 3200.0, 3900.0, 5400.0,
                9500.0, 21000.0, 65000.0, 180000.0, 510000.0,
            ]),
            beam_spread: 40.0,
            protected: true,
        },
        ModuleType {
            id: ModuleTypeId(2),
            name: "Strukturglas Modul".to_string(),
            reflection_profile: profile([
                8000.0, 8000.0, 8000.0, 8000.0, 12000.0,
                16000.0, 20000.0, 24000.0, 28000.0, 32000.0,
            ]),
            beam_spread: 0.5,
            protected: true,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationPoint {
    pub id: EntityId,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
    /// Eye height above ground, in meters.
    #[serde(default = "default_height_observer")]
    pub height_observer: f64,
    /// Height of the observed object (e.g. a building) above ground.
    #[serde(default = "default_height_object")]
    pub height_object: f64,
}

fn default_height_observer() -> f64 {
    1.5
}

fn default_height_object() -> f64 {
    10.0
}

impl ObservationPoint {
    pub fn new(id: EntityId, name: &str, position: LatLng) -> Self {
        Self {
            id,
            name: name.to_string(),
            lat: position.lat,
            lng: position.lng,
            height_observer: default_height_observer(),
            height_object: default_height_object(),
        }
    }

    pub fn position(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ObservationPointUpdate {
    pub name: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub height_observer: Option<f64>,
    pub height_object: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectMetadata {
    pub project_name: String,
    pub description: String,
    pub client: String,
    pub user_id: String,
    pub project_id: String,
    /// Report language, `en` or `de`.
    pub language: String,
    /// Hours offset from UTC, [-12, 14].
    pub utc_offset: f64,
    /// RFC 3339 timestamp set by the caller.
    pub created_at: String,
}

impl Default for ProjectMetadata {
    fn default() -> Self {
        Self {
            project_name: String::new(),
            description: String::new(),
            client: String::new(),
            user_id: String::new(),
            project_id: String::new(),
            language: "en".to_string(),
            utc_offset: 0.0,
            created_at: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimulationParameters {
    /// Sample spacing on the PV surface, meters.
    pub grid_width: f64,
    /// Sun position time step, minutes.
    pub resolution_minutes: u32,
    /// Luminance above which a reflection counts as glare, cd/m².
    pub glare_threshold: f64,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            grid_width: 0.5,
            resolution_minutes: 1,
            glare_threshold: 50000.0,
        }
    }
}

/// The flat JSON document persisted for a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default)]
    pub pv_areas: Vec<PvArea>,
    #[serde(default)]
    pub observation_points: Vec<ObservationPoint>,
    #[serde(default = "default_module_types")]
    pub module_types: Vec<ModuleType>,
    #[serde(default)]
    pub metadata: ProjectMetadata,
    #[serde(default)]
    pub simulation_parameters: SimulationParameters,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            pv_areas: Vec::new(),
            observation_points: Vec::new(),
            module_types: default_module_types(),
            metadata: ProjectMetadata::default(),
            simulation_parameters: SimulationParameters::default(),
        }
    }
}

impl Project {
    pub fn area(&self, id: EntityId) -> Option<&PvArea> {
        self.pv_areas.iter().find(|a| a.id == id)
    }

    pub fn observation_point(&self, id: EntityId) -> Option<&ObservationPoint> {
        self.observation_points.iter().find(|p| p.id == id)
    }

    pub fn module_type(&self, id: ModuleTypeId) -> Option<&ModuleType> {
        self.module_types.iter().find(|m| m.id == id)
    }
}
