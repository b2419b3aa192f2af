//! One editing session per websocket connection.
//!
//! The session owns the project store, the editor and the overlay registry.
//! Commands are handled synchronously and answered with text frames.
//! Topography sampling runs on spawned tasks and comes back through the
//! job channel to be committed.

use crate::config::ServerConfig;
use crate::elevation::{ElevationRelay, ElevationResponse};
use pv_core::editing::{measure_area, EditError, Editor, EditorOutcome, MapEvent};
use pv_core::geometry::{reconcile_corner_heights, LatLng};
use pv_core::ids::{EntityId, ModuleTypeId};
use pv_core::overlay::{OverlayElement, OverlayRegistry};
use pv_core::project::{
    simulation_request, validate_project, AreaKind, AreaKindTag, AreaUpdate, ProjectStore, StoreError, StoreEvent,
    TopographyCommit,
};
use pv_core::topography::{ElevationBatchSampler, JobMode, TopographyError, TopographyJob};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Format an error as a JSON message for the frontend
pub fn format_error(code: &str, message: &str, severity: &str) -> String {
    format!("ERROR_UPDATE:{}", json!({
        "code": code,
        "message": message,
        "severity": severity
    }))
}

fn frame<T: Serialize>(kind: &str, payload: &T) -> String {
    format!("{}:{}", kind, serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string()))
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command {0}")]
    Unknown(String),
    #[error("malformed {command} payload: {source}")]
    Payload {
        command: String,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    Topography(#[from] TopographyError),
    #[error("area {0} has no corner heights to fit a plane through")]
    NoPlane(EntityId),
}

impl CommandError {
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::Unknown(_) => "UNKNOWN_COMMAND",
            CommandError::Payload { .. } => "BAD_PAYLOAD",
            CommandError::Store(e) => e.code(),
            CommandError::Edit(e) => e.code(),
            CommandError::Topography(e) => e.code(),
            CommandError::NoPlane(_) => "NO_PLANE",
        }
    }

    fn to_frame(&self) -> String {
        format_error(self.code(), &self.to_string(), "error")
    }
}

// =============================================================================
// Payloads
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateArea {
    kind: AreaKindTag,
    #[serde(default)]
    name: String,
    corners: Vec<LatLng>,
    module_type_id: Option<ModuleTypeId>,
}

#[derive(Debug, Deserialize)]
struct AreaRef {
    id: EntityId,
}

#[derive(Debug, Deserialize)]
struct UpdateArea {
    id: EntityId,
    update: AreaUpdate,
}

#[derive(Debug, Deserialize)]
struct SetLocked {
    id: EntityId,
    locked: bool,
}

#[derive(Debug, Deserialize)]
struct AddObservationPoint {
    #[serde(default)]
    name: String,
    position: LatLng,
}

#[derive(Debug, Deserialize)]
struct DrawBegin {
    kind: AreaKindTag,
}

#[derive(Debug, Deserialize)]
struct AddSupportPoint {
    id: EntityId,
    position: LatLng,
    height: f64,
}

#[derive(Debug, Deserialize)]
struct RemoveSupportPoint {
    id: EntityId,
    index: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AreaOverlay<'a> {
    area: EntityId,
    elements: Vec<&'a OverlayElement>,
}

fn parse<T: for<'de> Deserialize<'de>>(command: &str, payload: &str) -> Result<T, CommandError> {
    serde_json::from_str(payload).map_err(|source| CommandError::Payload { command: command.to_string(), source })
}

// =============================================================================
// Session
// =============================================================================

/// A finished sampling run, ready to be committed.
pub struct JobOutcome {
    job: TopographyJob,
    result: Result<TopographyCommit, TopographyError>,
}

pub struct Session {
    store: ProjectStore,
    editor: Editor,
    overlays: Arc<Mutex<OverlayRegistry>>,
    events: Arc<Mutex<Vec<StoreEvent>>>,
    relay: Arc<ElevationRelay>,
    sampler: ElevationBatchSampler,
    jobs: mpsc::UnboundedSender<JobOutcome>,
}

impl Session {
    /// `outbound` carries frames the session sends on its own (elevation
    /// requests). Job results arrive on the returned receiver.
    pub fn new(config: &ServerConfig, outbound: mpsc::UnboundedSender<String>) -> (Self, mpsc::UnboundedReceiver<JobOutcome>) {
        let mut store = ProjectStore::new();
        let (overlays, _) = OverlayRegistry::attach(&mut store);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        store.subscribe(move |event, _| {
            if let Ok(mut queue) = sink.lock() {
                queue.push(event.clone());
            }
        });

        let relay = ElevationRelay::new(outbound, config.elevation_timeout(), config.elevation_batch_delay());
        let (jobs, job_results) = mpsc::unbounded_channel();
        let session = Self {
            store,
            editor: Editor::new(config.editor.clone()),
            overlays,
            events,
            relay: Arc::new(relay),
            sampler: ElevationBatchSampler::new(config.editor.batch_size()),
            jobs,
        };
        (session, job_results)
    }

    pub fn store(&self) -> &ProjectStore {
        &self.store
    }

    /// Frames sent right after the socket opens.
    pub fn greeting(&self) -> Vec<String> {
        vec![frame("PROJECT_UPDATE", self.store.project())]
    }

    /// Fail outstanding elevation batches so running jobs end.
    pub fn shutdown(&self) {
        self.relay.fail_pending();
    }

    pub fn handle_frame(&mut self, text: &str) -> Vec<String> {
        let (command, payload) = text.split_once(':').unwrap_or((text, ""));
        let payload = payload.trim();
        debug!("command {}", command);

        let mut replies = match self.dispatch(command, payload) {
            Ok(replies) => replies,
            Err(e) => {
                warn!("{} failed: {}", command, e);
                vec![e.to_frame()]
            }
        };
        replies.extend(self.flush_events());
        replies
    }

    fn dispatch(&mut self, command: &str, payload: &str) -> Result<Vec<String>, CommandError> {
        match command {
            "GET_PROJECT" => Ok(self.greeting()),
            "CREATE_AREA" => {
                let cmd: CreateArea = parse(command, payload)?;
                let module_type = cmd.module_type_id.unwrap_or(self.editor.config().default_module_type);
                let id = self.store.add_area(&cmd.name, cmd.kind, cmd.corners, module_type)?;
                self.start_topography(id, JobMode::Regenerate);
                Ok(Vec::new())
            }
            "UPDATE_AREA" => {
                let cmd: UpdateArea = parse(command, payload)?;
                self.store.update_area(cmd.id, cmd.update)?;
                Ok(Vec::new())
            }
            "DELETE_AREA" => {
                let cmd: AreaRef = parse(command, payload)?;
                self.store.delete_area(cmd.id)?;
                Ok(Vec::new())
            }
            "SET_LOCKED" => {
                let cmd: SetLocked = parse(command, payload)?;
                self.store.set_locked(cmd.id, cmd.locked)?;
                Ok(Vec::new())
            }
            "ADD_OP" => {
                let cmd: AddObservationPoint = parse(command, payload)?;
                self.store.add_observation_point(&cmd.name, cmd.position)?;
                Ok(Vec::new())
            }
            "DELETE_OP" => {
                let cmd: AreaRef = parse(command, payload)?;
                self.store.delete_observation_point(cmd.id)?;
                Ok(Vec::new())
            }
            "MAP_EVENT" => {
                let event: MapEvent = parse(command, payload)?;
                self.map_event(event)
            }
            "DRAW_BEGIN" => {
                let cmd: DrawBegin = parse(command, payload)?;
                self.editor.begin_draw(cmd.kind);
                Ok(Vec::new())
            }
            "DRAW_FINISH" => {
                let id = self.editor.finish_draw(&mut self.store)?;
                self.start_topography(id, JobMode::Regenerate);
                Ok(vec![frame("EDIT_UPDATE", &EditorOutcome::AreaCreated { area: id })])
            }
            "FIT_PLANE" => {
                let cmd: AreaRef = parse(command, payload)?;
                self.fit_plane(cmd.id).map(|reply| vec![reply])
            }
            "CONFIRM_GRID" => {
                let cmd: AreaRef = parse(command, payload)?;
                let job = TopographyJob::plan(&mut self.store, cmd.id, JobMode::Regenerate)?;
                self.spawn_job(job);
                Ok(Vec::new())
            }
            "REFRESH_HEIGHTS" => {
                let cmd: AreaRef = parse(command, payload)?;
                let job = TopographyJob::plan(&mut self.store, cmd.id, JobMode::Refresh)?;
                self.spawn_job(job);
                Ok(Vec::new())
            }
            "ADD_SUPPORT_POINT" => {
                let cmd: AddSupportPoint = parse(command, payload)?;
                self.store.add_support_point(cmd.id, cmd.position, cmd.height)?;
                Ok(Vec::new())
            }
            "REMOVE_SUPPORT_POINT" => {
                let cmd: RemoveSupportPoint = parse(command, payload)?;
                self.store.remove_support_point(cmd.id, cmd.index)?;
                Ok(Vec::new())
            }
            "EXPORT" => {
                let project = self.store.project();
                let export = json!({
                    "request": simulation_request(project),
                    "warnings": validate_project(project),
                });
                Ok(vec![frame("EXPORT_UPDATE", &export)])
            }
            "LOAD_PROJECT" => {
                self.store.load_json(payload)?;
                Ok(self.greeting())
            }
            "ELEVATION_RESPONSE" => {
                let response: ElevationResponse = parse(command, payload)?;
                self.relay.resolve(response);
                Ok(Vec::new())
            }
            other => Err(CommandError::Unknown(other.to_string())),
        }
    }

    fn map_event(&mut self, event: MapEvent) -> Result<Vec<String>, CommandError> {
        let outcome = self.editor.handle(&mut self.store, event, Instant::now())?;
        match &outcome {
            EditorOutcome::AreaCreated { area } => self.start_topography(*area, JobMode::Regenerate),
            // Corners moved, so their terrain heights are stale. The grid
            // waits for an explicit confirm or refresh.
            EditorOutcome::DragFinished { area, .. } | EditorOutcome::DragCancelled { area } => {
                self.start_topography(*area, JobMode::Corners)
            }
            _ => {}
        }
        if outcome == EditorOutcome::Ignored {
            return Ok(Vec::new());
        }
        Ok(vec![frame("EDIT_UPDATE", &outcome)])
    }

    fn fit_plane(&self, id: EntityId) -> Result<String, CommandError> {
        let area = self.store.area(id).ok_or(StoreError::AreaNotFound(id))?;
        let AreaKind::RoofMounted(params) = &area.kind else {
            return Err(CommandError::NoPlane(id));
        };
        let reconciliation =
            reconcile_corner_heights(&area.corners, params.reference_ground_height, &params.corner_heights);
        Ok(frame(
            "PLANE_UPDATE",
            &json!({
                "id": id,
                "corners": reconciliation.corners,
                "fit": reconciliation.fit,
                "measurements": measure_area(area),
            }),
        ))
    }

    // -------------------------------------------------------------------------
    // Topography jobs
    // -------------------------------------------------------------------------

    /// Start sampling for areas that have terrain to sample. Other kinds
    /// are skipped quietly.
    fn start_topography(&mut self, area: EntityId, mode: JobMode) {
        match TopographyJob::plan(&mut self.store, area, mode) {
            Ok(job) => self.spawn_job(job),
            Err(TopographyError::NotApplicable(_)) => {}
            Err(e) => warn!(%area, "topography not started: {}", e),
        }
    }

    fn spawn_job(&self, job: TopographyJob) {
        let relay = Arc::clone(&self.relay);
        let sampler = self.sampler;
        let jobs = self.jobs.clone();
        tokio::spawn(async move {
            let result = job.sample(&sampler, relay.as_ref()).await;
            if jobs.send(JobOutcome { job, result }).is_err() {
                debug!("session closed before topography finished");
            }
        });
    }

    pub fn finish_job(&mut self, outcome: JobOutcome) -> Vec<String> {
        let JobOutcome { job, result } = outcome;
        let area = job.area();
        let committed = result.and_then(|commit| job.commit(&mut self.store, commit));
        let mut replies = match committed {
            Ok(()) => {
                info!(%area, "topography applied");
                Vec::new()
            }
            // Superseded or deleted meanwhile; nothing for the user to fix
            Err(TopographyError::Store(e @ (StoreError::StaleTopography(_) | StoreError::AreaNotFound(_)))) => {
                vec![format_error(e.code(), &e.to_string(), "warning")]
            }
            Err(e) => vec![format_error(e.code(), &e.to_string(), "error")],
        };
        replies.extend(self.flush_events());
        replies
    }

    // -------------------------------------------------------------------------
    // Store events
    // -------------------------------------------------------------------------

    fn flush_events(&mut self) -> Vec<String> {
        let events: Vec<StoreEvent> = match self.events.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(_) => return Vec::new(),
        };
        if events.is_empty() {
            return Vec::new();
        }

        let mut replies: Vec<String> = events.iter().map(|e| frame("STORE_EVENT", e)).collect();

        let reload = events.iter().any(|e| matches!(e, StoreEvent::ProjectLoaded | StoreEvent::ProjectCleared));
        let mut touched: Vec<EntityId> = if reload {
            self.store.project().pv_areas.iter().map(|a| a.id).collect()
        } else {
            Vec::new()
        };
        for id in events.iter().filter_map(StoreEvent::area_id) {
            if !touched.contains(&id) {
                touched.push(id);
            }
        }

        if !touched.is_empty() {
            if let Ok(registry) = self.overlays.lock() {
                let areas: Vec<AreaOverlay> = touched
                    .iter()
                    .map(|id| AreaOverlay { area: *id, elements: registry.elements_for(*id) })
                    .collect();
                replies.push(frame("OVERLAY_UPDATE", &json!({ "reset": reload, "areas": areas })));
            }
        }
        replies
    }
}
