
use crate::editing::*;
use crate::geometry::{self, LatLng, LocalFrame};
use crate::ids::{EntityId, IdGenerator, ModuleTypeId};
use crate::project::{AreaKindTag, ProjectStore, StoreError};
use std::time::{Duration, Instant};

fn frame() -> LocalFrame {
    LocalFrame::new(LatLng::new(48.137, 11.575))
}

fn store() -> ProjectStore {
    ProjectStore::with_id_generator(IdGenerator::new("EditorTests"))
}

/// Draw the 8 m x 10 m roof-parallel rectangle with three clicks.
fn draw_roof(editor: &mut Editor, store: &mut ProjectStore) -> EntityId {
    let f = frame();
    editor.begin_draw(AreaKindTag::RoofParallel);
    let now = Instant::now();
    for p in [[0.0, 0.0], [0.0, 10.0]] {
        let outcome = editor.handle(store, MapEvent::Click { position: f.to_geo(p) }, now).unwrap();
        assert!(matches!(outcome, EditorOutcome::DrawPending { .. }));
    }
    match editor.handle(store, MapEvent::Click { position: f.to_geo([8.0, 10.0]) }, now).unwrap() {
        EditorOutcome::AreaCreated { area } => area,
        other => panic!("expected a new area, got {:?}", other),
    }
}

fn local_corners(store: &ProjectStore, id: EntityId) -> Vec<[f64; 2]> {
    frame().to_local_all(&store.area(id).unwrap().corners)
}

#[test]
fn test_drawn_roof_completes_parallelogram() {
    let mut editor = Editor::default();
    let mut store = store();
    let id = draw_roof(&mut editor, &mut store);

    let corners = local_corners(&store, id);
    assert!(geometry::points_equal(corners[3], [8.0, 0.0]), "P4 = {:?}", corners[3]);
    // Edge 0-1 runs north, the far edge is to the east
    assert!((store.area(id).unwrap().azimuth - 90.0).abs() < 1e-6);
    assert_eq!(store.area(id).unwrap().module_type_id, ModuleTypeId(0));
}

#[test]
fn test_vertex_drag_extends_edge() {
    let mut editor = Editor::default();
    let mut store = store();
    let id = draw_roof(&mut editor, &mut store);
    let before = local_corners(&store, id);

    let event = MapEvent::VertexDrag { area: id, vertex: 0, position: frame().to_geo([0.0, -2.0]) };
    let outcome = editor.handle(&mut store, event, Instant::now()).unwrap();
    assert!(matches!(outcome, EditorOutcome::Moved { dimensions: Some(_), .. }));

    let after = local_corners(&store, id);
    assert!(geometry::points_equal(after[0], [0.0, -2.0]), "P1 = {:?}", after[0]);
    for i in 1..4 {
        assert_eq!(after[i], before[i]);
    }
    assert!((geometry::distance(after[0], after[1]) - 12.0).abs() < 1e-6);
}

#[test]
fn test_constrained_drag_stays_on_edge_line() {
    let mut editor = Editor::default();
    let mut store = store();
    let id = draw_roof(&mut editor, &mut store);
    let start = local_corners(&store, id)[1];
    let t0 = Instant::now();

    for (i, pointer) in [[1.5, 12.0], [-3.0, 15.0], [2.0, 4.0], [0.3, 30.0]].into_iter().enumerate() {
        let event = MapEvent::VertexDrag { area: id, vertex: 1, position: frame().to_geo(pointer) };
        editor.handle(&mut store, event, t0 + Duration::from_millis(10 * i as u64)).unwrap();

        let corners = local_corners(&store, id);
        let direction = geometry::sub_2d(corners[1], corners[0]);
        let offset = geometry::sub_2d(corners[1], start);
        let cross = geometry::cross_2d(direction, offset) / geometry::length_2d(direction);
        assert!(cross.abs() < 1e-6, "tick {} left the edge line by {}", i, cross);
    }
}

#[test]
fn test_throttle_limits_dimension_refresh() {
    let mut editor = Editor::default();
    let mut store = store();
    let id = draw_roof(&mut editor, &mut store);
    let t0 = Instant::now();

    let refreshed: Vec<bool> = [0, 10, 30, 55, 70]
        .iter()
        .enumerate()
        .map(|(i, ms)| {
            let event = MapEvent::VertexDrag {
                area: id,
                vertex: 0,
                position: frame().to_geo([0.0, -(i as f64) - 1.0]),
            };
            match editor.handle(&mut store, event, t0 + Duration::from_millis(*ms)).unwrap() {
                EditorOutcome::Moved { dimensions, .. } => dimensions.is_some(),
                other => panic!("unexpected {:?}", other),
            }
        })
        .collect();
    assert_eq!(refreshed, vec![true, false, false, true, false]);

    // Drag end always refreshes
    let end = editor.handle(&mut store, MapEvent::DragEnd, t0 + Duration::from_millis(71)).unwrap();
    assert!(matches!(end, EditorOutcome::DragFinished { dimensions: Some(_), .. }));
    assert_eq!(editor.drag_state(), &DragState::Idle);
}

#[test]
fn test_cancel_restores_original_geometry() {
    let mut editor = Editor::default();
    let mut store = store();
    let id = draw_roof(&mut editor, &mut store);
    let original = store.area(id).unwrap().clone();
    let f = frame();
    let now = Instant::now();

    editor
        .handle(&mut store, MapEvent::RotationDrag { area: id, pointer: f.to_geo([30.0, 5.0]) }, now)
        .unwrap();
    editor
        .handle(&mut store, MapEvent::RotationDrag { area: id, pointer: f.to_geo([4.0, 30.0]) }, now)
        .unwrap();
    assert_ne!(store.area(id).unwrap().corners, original.corners);

    let outcome = editor.handle(&mut store, MapEvent::Cancel, now).unwrap();
    assert_eq!(outcome, EditorOutcome::DragCancelled { area: id });
    assert_eq!(store.area(id).unwrap().corners, original.corners);
    assert_eq!(store.area(id).unwrap().azimuth, original.azimuth);
}

#[test]
fn test_degenerate_edge_tick_is_ignored() {
    let mut editor = Editor::default();
    let mut store = store();
    let id = draw_roof(&mut editor, &mut store);
    let f = frame();
    let now = Instant::now();

    // Collapse vertex 0 onto vertex 1, then try to move on
    editor
        .handle(&mut store, MapEvent::VertexDrag { area: id, vertex: 0, position: f.to_geo([0.0, 10.0]) }, now)
        .unwrap();
    let collapsed = store.area(id).unwrap().corners.clone();

    let outcome = editor
        .handle(&mut store, MapEvent::VertexDrag { area: id, vertex: 0, position: f.to_geo([0.0, 3.0]) }, now)
        .unwrap();
    assert_eq!(outcome, EditorOutcome::Ignored);
    assert_eq!(store.area(id).unwrap().corners, collapsed);
}

#[test]
fn test_locked_area_cannot_be_dragged() {
    let mut editor = Editor::default();
    let mut store = store();
    let id = draw_roof(&mut editor, &mut store);
    store.set_locked(id, true).unwrap();

    let event = MapEvent::EdgeDrag { area: id, edge: 1, delta: LatLng::new(0.0001, 0.0) };
    let err = editor.handle(&mut store, event, Instant::now()).unwrap_err();
    assert_eq!(err.code(), "AREA_LOCKED");
}

#[test]
fn test_edge_drag_uses_cumulative_delta() {
    let mut editor = Editor::default();
    let mut store = store();
    let id = draw_roof(&mut editor, &mut store);
    let original = store.area(id).unwrap().corners.clone();
    let now = Instant::now();

    for step in 1..=3 {
        let delta = LatLng::new(0.0, 0.00001 * step as f64);
        editor.handle(&mut store, MapEvent::EdgeDrag { area: id, edge: 2, delta }, now).unwrap();
    }
    let corners = &store.area(id).unwrap().corners;
    assert_eq!(corners[0], original[0]);
    assert_eq!(corners[1], original[1]);
    assert!((corners[2].lng - original[2].lng - 0.00003).abs() < 1e-12);
    assert!((corners[3].lng - original[3].lng - 0.00003).abs() < 1e-12);
}

#[test]
fn test_polygon_draw_and_unknown_area() {
    let mut editor = Editor::default();
    let mut store = store();
    assert!(matches!(editor.finish_draw(&mut store), Err(EditError::NotDrawing)));

    editor.begin_draw(AreaKindTag::Ground);
    let now = Instant::now();
    for p in [[0.0, 0.0], [0.0, 100.0], [100.0, 100.0]] {
        editor.handle(&mut store, MapEvent::Click { position: frame().to_geo(p) }, now).unwrap();
    }
    let id = editor.finish_draw(&mut store).unwrap();
    assert_eq!(store.area(id).unwrap().corners.len(), 3);
    assert!(editor.drawing().is_none());

    let ghost = EntityId::new();
    let event = MapEvent::RotationDrag { area: ghost, pointer: LatLng::new(48.0, 11.0) };
    assert!(matches!(
        editor.handle(&mut store, event, now),
        Err(EditError::Store(StoreError::AreaNotFound(_)))
    ));
}
