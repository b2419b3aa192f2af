use crate::editing::measurement::measure_edges;
use crate::geometry::{self, LatLng, LocalFrame};
use crate::ids::EntityId;
use crate::project::{Project, ProjectStore, PvArea, StoreEvent, SubscriptionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayId(pub u64);

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "overlay-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OverlayKind {
    VertexHandle { index: usize },
    /// Sits on the edge midpoint; dragging it moves the whole edge.
    EdgeHandle { edge: usize },
    RotationHandle,
    DimensionLabel { edge: usize, text: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayElement {
    pub id: OverlayId,
    pub owner: EntityId,
    pub kind: OverlayKind,
    pub position: LatLng,
}

/// Derived interactive elements drawn on top of PV areas.
///
/// Elements refer to their area by id only. The registry is rebuilt per
/// area from store events and never reaches into the store itself.
#[derive(Debug, Default, Clone)]
pub struct OverlayRegistry {
    elements: HashMap<OverlayId, OverlayElement>,
    by_owner: HashMap<EntityId, Vec<OverlayId>>,
    next_id: u64,
}

impl OverlayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a shared registry to `store`, seeded with its current areas.
    pub fn attach(store: &mut ProjectStore) -> (Arc<Mutex<Self>>, SubscriptionId) {
        let mut registry = Self::new();
        registry.rebuild(store.project());
        let shared = Arc::new(Mutex::new(registry));
        let sink = Arc::clone(&shared);
        let subscription = store.subscribe(move |event, project| match sink.lock() {
            Ok(mut registry) => registry.on_store_event(event, project),
            Err(_) => warn!("overlay registry lock poisoned, dropping {:?}", event),
        });
        (shared, subscription)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn clear(&mut self) {
        self.elements.clear();
        self.by_owner.clear();
    }

    pub fn resolve(&self, id: OverlayId) -> Option<&OverlayElement> {
        self.elements.get(&id)
    }

    /// Elements of one area in creation order.
    pub fn elements_for(&self, owner: EntityId) -> Vec<&OverlayElement> {
        self.by_owner
            .get(&owner)
            .map(|ids| ids.iter().filter_map(|id| self.elements.get(id)).collect())
            .unwrap_or_default()
    }

    fn register(&mut self, owner: EntityId, kind: OverlayKind, position: LatLng) {
        let id = OverlayId(self.next_id);
        self.next_id += 1;
        self.elements.insert(id, OverlayElement { id, owner, kind, position });
        self.by_owner.entry(owner).or_default().push(id);
    }

    /// Drop every element owned by `owner`. Returns how many were removed.
    pub fn purge(&mut self, owner: EntityId) -> usize {
        let ids = self.by_owner.remove(&owner).unwrap_or_default();
        for id in &ids {
            self.elements.remove(id);
        }
        ids.len()
    }

    /// Rebuild the elements of one area from its current state.
    pub fn sync_area(&mut self, area: &PvArea) {
        self.purge(area.id);
        if !area.visible {
            return;
        }
        for dim in measure_edges(&area.corners) {
            let text = format!("{:.2} m", dim.length_meters);
            self.register(area.id, OverlayKind::DimensionLabel { edge: dim.edge, text }, dim.midpoint);
        }
        if area.locked {
            return;
        }
        for (index, corner) in area.corners.iter().enumerate() {
            self.register(area.id, OverlayKind::VertexHandle { index }, *corner);
        }
        for dim in measure_edges(&area.corners) {
            self.register(area.id, OverlayKind::EdgeHandle { edge: dim.edge }, dim.midpoint);
        }
        if let Some(position) = rotation_handle_position(&area.corners) {
            self.register(area.id, OverlayKind::RotationHandle, position);
        }
    }

    pub fn rebuild(&mut self, project: &Project) {
        self.clear();
        for area in &project.pv_areas {
            self.sync_area(area);
        }
    }

    pub fn on_store_event(&mut self, event: &StoreEvent, project: &Project) {
        match event {
            StoreEvent::AreaAdded { id } | StoreEvent::AreaUpdated { id, .. } => match project.area(*id) {
                Some(area) => self.sync_area(area),
                None => {
                    self.purge(*id);
                }
            },
            StoreEvent::AreaDeleted { id } => {
                self.purge(*id);
            }
            StoreEvent::ProjectLoaded | StoreEvent::ProjectCleared => self.rebuild(project),
            _ => {}
        }
    }
}

/// Beyond the midpoint of edge 0–1, half again its distance from the
/// centroid. Only 4-corner areas rotate.
fn rotation_handle_position(corners: &[LatLng]) -> Option<LatLng> {
    if corners.len() != 4 {
        return None;
    }
    let frame = LocalFrame::anchored_at_centroid(corners)?;
    let local = frame.to_local_all(corners);
    let centroid = geometry::vertex_centroid(&local)?;
    let mid = geometry::midpoint(local[0], local[1]);
    let outward = geometry::sub_2d(mid, centroid);
    Some(frame.to_geo(geometry::add_2d(mid, geometry::scale_2d(outward, 0.5))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::ModuleTypeId;
    use crate::project::AreaKindTag;

    fn corners() -> Vec<LatLng> {
        vec![
            LatLng::new(48.0, 11.0),
            LatLng::new(48.0001, 11.0),
            LatLng::new(48.0001, 11.0001),
            LatLng::new(48.0, 11.0001),
        ]
    }

    fn count(registry: &OverlayRegistry, owner: EntityId, pred: impl Fn(&OverlayKind) -> bool) -> usize {
        registry.elements_for(owner).iter().filter(|e| pred(&e.kind)).count()
    }

    #[test]
    fn test_sync_quadrilateral() {
        let area = PvArea::new(EntityId::new(), "Roof", AreaKindTag::RoofParallel, corners(), ModuleTypeId(0));
        let mut registry = OverlayRegistry::new();
        registry.sync_area(&area);

        assert_eq!(count(&registry, area.id, |k| matches!(k, OverlayKind::VertexHandle { .. })), 4);
        assert_eq!(count(&registry, area.id, |k| matches!(k, OverlayKind::EdgeHandle { .. })), 4);
        assert_eq!(count(&registry, area.id, |k| matches!(k, OverlayKind::RotationHandle)), 1);
        assert_eq!(count(&registry, area.id, |k| matches!(k, OverlayKind::DimensionLabel { .. })), 4);

        // Re-sync replaces rather than duplicates
        registry.sync_area(&area);
        assert_eq!(registry.len(), 13);
    }

    #[test]
    fn test_locked_and_hidden_areas() {
        let mut area = PvArea::new(EntityId::new(), "Field", AreaKindTag::Ground, corners(), ModuleTypeId(0));
        area.locked = true;
        let mut registry = OverlayRegistry::new();
        registry.sync_area(&area);
        assert!(registry.elements_for(area.id).iter().all(|e| matches!(e.kind, OverlayKind::DimensionLabel { .. })));

        area.visible = false;
        registry.sync_area(&area);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_follows_store_events() {
        let mut store = ProjectStore::new();
        let (registry, _) = OverlayRegistry::attach(&mut store);

        let a = store.add_area("A", AreaKindTag::RoofParallel, corners(), ModuleTypeId(0)).unwrap();
        let b = store.add_area("B", AreaKindTag::Facade, corners()[..2].to_vec(), ModuleTypeId(0)).unwrap();
        {
            let registry = registry.lock().unwrap();
            assert_eq!(registry.elements_for(a).len(), 13);
            // Facade: 1 label, 2 vertices, 1 edge handle
            assert_eq!(registry.elements_for(b).len(), 4);
        }

        let label_before = registry.lock().unwrap().elements_for(a)[0].clone();
        let mut moved = corners();
        moved[0].lat -= 0.0001;
        store.set_corners(a, moved).unwrap();
        let label_after = registry.lock().unwrap().elements_for(a)[0].clone();
        assert_ne!(label_before.kind, label_after.kind);

        store.delete_area(a).unwrap();
        assert!(registry.lock().unwrap().elements_for(a).is_empty());
        assert_eq!(registry.lock().unwrap().len(), 4);

        store.clear();
        assert!(registry.lock().unwrap().is_empty());
    }
}
