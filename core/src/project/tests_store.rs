
use crate::geometry::LatLng;
use crate::ids::{IdGenerator, ModuleTypeId};
use crate::project::*;
use std::sync::{Arc, Mutex};

fn square(lat: f64, lng: f64) -> Vec<LatLng> {
    vec![
        LatLng::new(lat, lng),
        LatLng::new(lat + 0.001, lng),
        LatLng::new(lat + 0.001, lng + 0.001),
        LatLng::new(lat, lng + 0.001),
    ]
}

/// Store with a recorder attached; returns the shared event log.
fn recorded_store() -> (ProjectStore, Arc<Mutex<Vec<StoreEvent>>>) {
    let mut store = ProjectStore::with_id_generator(IdGenerator::new("StoreTests"));
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    store.subscribe(move |event, _| sink.lock().unwrap().push(event.clone()));
    (store, log)
}

#[test]
fn test_listener_sees_post_mutation_state() {
    let mut store = ProjectStore::new();
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    store.subscribe(move |event, project| {
        if let StoreEvent::AreaAdded { id } = event {
            *sink.lock().unwrap() = project.area(*id).map(|a| a.name.clone());
        }
    });

    store
        .add_area("South roof", AreaKindTag::RoofMounted, square(48.0, 11.0), ModuleTypeId(0))
        .unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some("South roof"));
}

#[test]
fn test_default_names_and_ids() {
    let (mut store, log) = recorded_store();
    let a = store.add_area("", AreaKindTag::Ground, square(48.0, 11.0), ModuleTypeId(0)).unwrap();
    let b = store.add_area("", AreaKindTag::Ground, square(48.1, 11.0), ModuleTypeId(0)).unwrap();
    assert_ne!(a, b);
    assert_eq!(store.area(a).unwrap().name, "PV Area 1");
    assert_eq!(store.area(b).unwrap().name, "PV Area 2");
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn test_unsubscribe_stops_notifications() {
    let (mut store, log) = recorded_store();
    let counter = Arc::new(Mutex::new(0));
    let c = counter.clone();
    let sub = store.subscribe(move |_, _| *c.lock().unwrap() += 1);

    store.add_observation_point("House", LatLng::new(48.0, 11.0)).unwrap();
    assert!(store.unsubscribe(sub));
    assert!(!store.unsubscribe(sub));
    store.add_observation_point("Road", LatLng::new(48.0, 11.1)).unwrap();

    assert_eq!(*counter.lock().unwrap(), 1);
    assert_eq!(log.lock().unwrap().len(), 2);
}

#[test]
fn test_locked_area_rejects_everything_but_unlock() {
    let (mut store, log) = recorded_store();
    let id = store.add_area("Roof", AreaKindTag::RoofMounted, square(48.0, 11.0), ModuleTypeId(0)).unwrap();
    store.set_locked(id, true).unwrap();
    log.lock().unwrap().clear();
    let before = store.project().clone();

    let update = AreaUpdate { tilt: Some(10.0), ..Default::default() };
    assert!(matches!(store.update_area(id, update), Err(StoreError::Locked(_))));
    assert!(matches!(store.set_corners(id, square(49.0, 11.0)), Err(StoreError::Locked(_))));
    assert!(matches!(store.delete_area(id), Err(StoreError::Locked(_))));
    assert!(matches!(store.issue_topography_ticket(id), Err(StoreError::Locked(_))));

    assert_eq!(store.project(), &before);
    assert!(log.lock().unwrap().is_empty());

    store.set_locked(id, false).unwrap();
    assert_eq!(
        log.lock().unwrap().as_slice(),
        &[StoreEvent::AreaUpdated { id, change: AreaChange::Lock }]
    );
    store.delete_area(id).unwrap();
    assert!(store.area(id).is_none());
}

#[test]
fn test_invalid_numbers_are_rejected_without_event() {
    let (mut store, log) = recorded_store();
    let id = store.add_area("Roof", AreaKindTag::RoofMounted, square(48.0, 11.0), ModuleTypeId(0)).unwrap();
    log.lock().unwrap().clear();

    let nan_tilt = AreaUpdate { tilt: Some(f64::NAN), ..Default::default() };
    assert!(matches!(store.update_area(id, nan_tilt), Err(StoreError::InvalidInput(_))));

    let steep = AreaUpdate { tilt: Some(120.0), ..Default::default() };
    assert!(store.update_area(id, steep).is_err());

    let mut corners = square(48.0, 11.0);
    corners[1].lat = f64::INFINITY;
    assert!(store.set_corners(id, corners).is_err());

    let short = AreaUpdate { corner_heights: Some(vec![1.0, 2.0]), ..Default::default() };
    assert!(store.update_area(id, short).is_err());

    let wrong_kind = AreaUpdate { top_height: Some(5.0), ..Default::default() };
    assert!(store.update_area(id, wrong_kind).is_err());

    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn test_corner_count_enforced() {
    let mut store = ProjectStore::new();
    let three = square(48.0, 11.0)[..3].to_vec();
    let err = store
        .add_area("Roof", AreaKindTag::RoofParallel, three.clone(), ModuleTypeId(0))
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidCornerCount { actual: 3, .. }));

    let id = store.add_area("Roof", AreaKindTag::RoofParallel, square(48.0, 11.0), ModuleTypeId(0)).unwrap();
    assert!(store.set_corners(id, three).is_err());
    assert_eq!(store.area(id).unwrap().corners.len(), 4);

    assert!(store.add_area("Wall", AreaKindTag::Facade, square(48.0, 11.0), ModuleTypeId(0)).is_err());
}

#[test]
fn test_azimuth_is_normalized() {
    let mut store = ProjectStore::new();
    let id = store.add_area("Roof", AreaKindTag::RoofMounted, square(48.0, 11.0), ModuleTypeId(0)).unwrap();
    store.update_area(id, AreaUpdate { azimuth: Some(-90.0), ..Default::default() }).unwrap();
    assert!((store.area(id).unwrap().azimuth - 270.0).abs() < 1e-9);
    store.update_geometry(id, square(48.0, 11.0), Some(725.0)).unwrap();
    assert!((store.area(id).unwrap().azimuth - 5.0).abs() < 1e-9);
}

#[test]
fn test_roof_parallel_tilt_from_heights() {
    let mut store = ProjectStore::new();
    // Edges 0-1 and 2-3 run east-west, 0.0001° (11.1 m) apart
    let corners = vec![
        LatLng::new(0.0, 0.0),
        LatLng::new(0.0, 0.0002),
        LatLng::new(-0.0001, 0.0002),
        LatLng::new(-0.0001, 0.0),
    ];
    let id = store.add_area("Roof", AreaKindTag::RoofParallel, corners, ModuleTypeId(0)).unwrap();
    let distance = match &store.area(id).unwrap().kind {
        AreaKind::RoofParallel(p) => p.perpendicular_distance,
        _ => unreachable!(),
    };
    assert!((distance - 11.1).abs() < 1e-6);

    let update = AreaUpdate { top_height: Some(11.1 + 3.0), bottom_height: Some(3.0), ..Default::default() };
    store.update_area(id, update).unwrap();
    assert!((store.area(id).unwrap().tilt - 45.0).abs() < 1e-6);

    // Editing the heights again follows them down to a flat roof
    store.update_area(id, AreaUpdate { top_height: Some(8.0), bottom_height: Some(0.0), ..Default::default() }).unwrap();
    assert!((store.area(id).unwrap().tilt - (8.0f64 / 11.1).atan().to_degrees()).abs() < 1e-6);
    store.update_area(id, AreaUpdate { bottom_height: Some(8.0), ..Default::default() }).unwrap();
    assert!(store.area(id).unwrap().tilt.abs() < 1e-9);
}

#[test]
fn test_ground_grid_goes_dirty_on_boundary_change() {
    let mut store = ProjectStore::new();
    let id = store.add_area("Field", AreaKindTag::Ground, square(48.0, 11.0), ModuleTypeId(0)).unwrap();

    // No grid yet: boundary edits keep it clean
    store.set_corners(id, square(48.0, 11.0005)).unwrap();
    assert_eq!(store.area(id).unwrap().ground().unwrap().grid_state(), GridState::Clean);

    let ticket = store.issue_topography_ticket(id).unwrap();
    let grid = vec![SupportPoint::generated(LatLng::new(48.0005, 11.001), 0.0)];
    store
        .commit_topography(
            &ticket,
            TopographyCommit { terrain_heights: None, reference_ground_height: None, grid: GridCommit::Replace(grid) },
        )
        .unwrap();
    assert!(store.area(id).unwrap().ground().unwrap().has_grid());

    store.update_area(id, AreaUpdate { grid_spacing_meters: Some(10.0), ..Default::default() }).unwrap();
    let ground = store.area(id).unwrap().ground().unwrap().clone();
    assert_eq!(ground.grid_spacing_meters, MIN_GRID_SPACING_M);
    assert_eq!(ground.grid_state(), GridState::Clean, "clamped spacing is unchanged");

    store.update_area(id, AreaUpdate { grid_spacing_meters: Some(75.0), ..Default::default() }).unwrap();
    assert_eq!(store.area(id).unwrap().ground().unwrap().grid_state(), GridState::Dirty);
}

#[test]
fn test_topography_commit_rejections() {
    let mut store = ProjectStore::new();
    let id = store.add_area("Field", AreaKindTag::Ground, square(48.0, 11.0), ModuleTypeId(0)).unwrap();
    let commit = || TopographyCommit {
        terrain_heights: Some(vec![500.0; 4]),
        reference_ground_height: None,
        grid: GridCommit::Unchanged,
    };

    // Superseded
    let old = store.issue_topography_ticket(id).unwrap();
    let new = store.issue_topography_ticket(id).unwrap();
    assert!(matches!(store.commit_topography(&old, commit()), Err(StoreError::StaleTopography(_))));

    // Corners moved since planning
    store.set_corners(id, square(48.0, 11.0002)).unwrap();
    assert!(matches!(store.commit_topography(&new, commit()), Err(StoreError::StaleTopography(_))));

    // Deleted
    let ticket = store.issue_topography_ticket(id).unwrap();
    store.delete_area(id).unwrap();
    assert!(matches!(store.commit_topography(&ticket, commit()), Err(StoreError::AreaNotFound(_))));
}

#[test]
fn test_protected_module_types() {
    let (mut store, log) = recorded_store();
    let update = ModuleTypeUpdate { name: Some("Renamed".into()), ..Default::default() };
    for id in 0..3 {
        let id = ModuleTypeId(id);
        assert!(matches!(store.update_module_type(id, update.clone()), Err(StoreError::ProtectedModuleType(_))));
        assert!(matches!(store.delete_module_type(id), Err(StoreError::ProtectedModuleType(_))));
    }
    assert!(log.lock().unwrap().is_empty());
    assert_eq!(store.project().module_types.len(), 3);
}

#[test]
fn test_custom_module_type_lifecycle() {
    let mut store = ProjectStore::new();
    let profile: ReflectionProfile = (0..10).map(|i| (i * 10, 1000.0 * (i + 1) as f64)).collect();
    let id = store.add_module_type("Custom", profile, 2.0).unwrap();
    assert_eq!(id, ModuleTypeId(3));

    store.update_module_type(id, ModuleTypeUpdate { beam_spread: Some(3.0), ..Default::default() }).unwrap();
    assert_eq!(store.project().module_type(id).unwrap().beam_spread, 3.0);

    let area = store.add_area("Roof", AreaKindTag::RoofMounted, square(48.0, 11.0), id).unwrap();
    assert!(matches!(store.delete_module_type(id), Err(StoreError::ModuleTypeInUse { areas: 1, .. })));

    store.update_area(area, AreaUpdate { module_type_id: Some(ModuleTypeId(0)), ..Default::default() }).unwrap();
    store.delete_module_type(id).unwrap();
    assert!(store.project().module_type(id).is_none());
}

#[test]
fn test_json_round_trip_restores_builtins() {
    let mut store = ProjectStore::new();
    let id = store.add_area("Field", AreaKindTag::Ground, square(48.0, 11.0), ModuleTypeId(2)).unwrap();
    store.add_support_point(id, LatLng::new(48.0005, 11.0005), 512.0).unwrap();
    store.add_observation_point("House", LatLng::new(48.002, 11.0)).unwrap();
    let json = store.to_json().unwrap();

    // Tamper with a built-in type in the document
    let mut doc: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(doc["pvAreas"][0]["kind"], "Ground");
    doc["moduleTypes"][0]["name"] = "Hacked".into();

    let (mut restored, log) = recorded_store();
    restored.load_json(&doc.to_string()).unwrap();
    assert_eq!(restored.project().pv_areas, store.project().pv_areas);
    assert_eq!(restored.project().module_types[0].name, "Standard Modul");
    assert_eq!(log.lock().unwrap().as_slice(), &[StoreEvent::ProjectLoaded]);

    assert!(restored.load_json("{ not json").is_err());
    assert_eq!(restored.project().pv_areas.len(), 1);
}

#[test]
fn test_support_point_add_and_remove() {
    let (mut store, log) = recorded_store();
    let id = store.add_area("Field", AreaKindTag::Ground, square(48.0, 11.0), ModuleTypeId(0)).unwrap();
    store.add_support_point(id, LatLng::new(48.0005, 11.0005), 512.0).unwrap();

    let points = &store.area(id).unwrap().ground().unwrap().support_points;
    assert_eq!(points.len(), 1);
    assert!(points[0].manual);

    assert!(matches!(store.remove_support_point(id, 3), Err(StoreError::InvalidInput(_))));
    store.remove_support_point(id, 0).unwrap();
    assert!(store.area(id).unwrap().ground().unwrap().support_points.is_empty());
    assert_eq!(
        log.lock().unwrap().last(),
        Some(&StoreEvent::AreaUpdated { id, change: AreaChange::Topography })
    );

    let roof = store.add_area("Roof", AreaKindTag::RoofMounted, square(48.0, 11.0), ModuleTypeId(0)).unwrap();
    assert!(store.add_support_point(roof, LatLng::new(48.0, 11.0), 1.0).is_err());
}

#[test]
fn test_clear_keeps_catalog() {
    let (mut store, log) = recorded_store();
    store.add_area("Roof", AreaKindTag::RoofMounted, square(48.0, 11.0), ModuleTypeId(0)).unwrap();
    store.add_observation_point("House", LatLng::new(48.0, 11.0)).unwrap();
    store.clear();
    assert!(store.project().pv_areas.is_empty());
    assert!(store.project().observation_points.is_empty());
    assert_eq!(store.project().module_types.len(), 3);
    assert_eq!(log.lock().unwrap().last(), Some(&StoreEvent::ProjectCleared));
}

#[test]
fn test_simulation_parameter_ranges() {
    let mut store = ProjectStore::new();
    let mut params = SimulationParameters::default();
    params.grid_width = 20.0;
    assert!(store.update_simulation_parameters(params).is_err());

    let params = SimulationParameters { resolution_minutes: 10, ..Default::default() };
    store.update_simulation_parameters(params).unwrap();
    assert_eq!(store.project().simulation_parameters.resolution_minutes, 10);
}

#[test]
fn test_event_serialization() {
    let id = crate::ids::EntityId::new_deterministic("area");
    let event = StoreEvent::AreaUpdated { id, change: AreaChange::Geometry };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["kind"], "AreaUpdated");
    assert_eq!(json["payload"]["change"], "Geometry");
}
