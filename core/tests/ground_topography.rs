use futures::executor::block_on;
use futures::future::BoxFuture;
use pv_core::geometry::{LatLng, LocalFrame};
use pv_core::ids::{IdGenerator, ModuleTypeId};
use pv_core::project::{AreaKindTag, AreaUpdate, GridCommit, GridState, ProjectStore, SupportPoint, TopographyCommit};
use pv_core::topography::{
    generate_topography_grid, run_topography_job, ElevationBatchSampler, ElevationError, ElevationService, JobMode,
};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Gently sloped terrain rising to the north-east.
#[derive(Default)]
struct Slope {
    batches: AtomicUsize,
}

impl Slope {
    fn height(p: LatLng) -> f64 {
        420.0 + 500.0 * (p.lat - 47.0) + 250.0 * (p.lng - 8.0)
    }
}

impl ElevationService for Slope {
    fn query_elevations<'a>(&'a self, points: &'a [LatLng]) -> BoxFuture<'a, Result<Vec<f64>, ElevationError>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(points.iter().map(|p| Slope::height(*p)).collect()) })
    }
}

fn field() -> Vec<LatLng> {
    LocalFrame::new(LatLng::new(47.0, 8.0)).to_geo_all(&[[0.0, 0.0], [400.0, 0.0], [400.0, 300.0], [0.0, 300.0]])
}

#[test]
fn test_regeneration_keeps_manual_points() {
    let mut store = ProjectStore::with_id_generator(IdGenerator::new("GroundTopography"));
    let id = store.add_area("Meadow", AreaKindTag::Ground, field(), ModuleTypeId(2)).unwrap();
    let sampler = ElevationBatchSampler::new(16);
    let service = Slope::default();

    block_on(run_topography_job(&mut store, id, JobMode::Regenerate, &sampler, &service)).unwrap();

    let frame = LocalFrame::new(LatLng::new(47.0, 8.0));
    let manual = [frame.to_geo([100.0, 100.0]), frame.to_geo([250.0, 50.0])];
    store.add_support_point(id, manual[0], 431.5).unwrap();
    store.add_support_point(id, manual[1], 433.0).unwrap();

    store.update_area(id, AreaUpdate { grid_spacing_meters: Some(100.0), ..Default::default() }).unwrap();
    assert_eq!(store.area(id).unwrap().ground().unwrap().grid_state(), GridState::Dirty);

    block_on(run_topography_job(&mut store, id, JobMode::Regenerate, &sampler, &service)).unwrap();

    let area = store.area(id).unwrap();
    let ground = area.ground().unwrap();
    assert_eq!(ground.grid_state(), GridState::Clean);

    let kept: Vec<_> = ground.manual_points().collect();
    assert_eq!(kept.len(), 2);
    assert_eq!(kept[0].position(), manual[0]);
    assert_eq!(kept[0].height, 431.5);
    assert_eq!(kept[1].height, 433.0);

    let expected = generate_topography_grid(&area.corners, 100.0);
    assert_eq!(ground.generated_points().count(), expected.len());
    for p in ground.generated_points() {
        assert_eq!(p.height, Slope::height(p.position()));
    }
    for (corner, h) in area.corners.iter().zip(&ground.terrain_heights) {
        assert_eq!(*h, Slope::height(*corner));
    }

    // Every query went out in batches of at most 16
    let queried = expected.len() + area.corners.len();
    assert!(service.batches.load(Ordering::SeqCst) >= queried.div_ceil(16));
}

#[test]
fn test_replace_commit_spares_manual_points() {
    let mut store = ProjectStore::with_id_generator(IdGenerator::new("GroundTopography"));
    let id = store.add_area("Meadow", AreaKindTag::Ground, field(), ModuleTypeId(2)).unwrap();
    let frame = LocalFrame::new(LatLng::new(47.0, 8.0));

    let generated = |offset: f64| -> Vec<SupportPoint> {
        (0..40)
            .map(|i| {
                let p = frame.to_geo([10.0 + 9.0 * i as f64, 150.0]);
                SupportPoint::generated(p, offset + i as f64)
            })
            .collect()
    };
    let commit = |grid| TopographyCommit { terrain_heights: None, reference_ground_height: None, grid };

    let ticket = store.issue_topography_ticket(id).unwrap();
    store.commit_topography(&ticket, commit(GridCommit::Replace(generated(400.0)))).unwrap();
    store.add_support_point(id, frame.to_geo([50.0, 50.0]), 401.25).unwrap();
    store.add_support_point(id, frame.to_geo([350.0, 250.0]), 399.5).unwrap();
    let manual_before: Vec<SupportPoint> = store.area(id).unwrap().ground().unwrap().manual_points().copied().collect();

    let ticket = store.issue_topography_ticket(id).unwrap();
    store.commit_topography(&ticket, commit(GridCommit::Replace(generated(600.0)))).unwrap();

    let ground = store.area(id).unwrap().ground().unwrap();
    let manual_after: Vec<SupportPoint> = ground.manual_points().copied().collect();
    assert_eq!(manual_after, manual_before);
    assert_eq!(ground.generated_points().count(), 40);
    assert!(ground.generated_points().all(|p| p.height >= 600.0));
}
