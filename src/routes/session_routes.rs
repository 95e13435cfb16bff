use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

use box_annotation::{
    AnnotationError, AnnotationRecord, BoxGeometry, ClassInfo, SequenceManager, SessionState,
    TrackAssignment,
};

use crate::models::service_model::{
    CreateAnnotationRequest, FrameView, GotoRequest, ImportRequest, ImportResponse, InitRequest,
    InitResponse, NavigationResponse, OpenRequest, PatchAnnotationRequest, SequenceSummary,
    TracksResponse,
};
use crate::routes::error::{ApiError, ApiResult};
use crate::state::app_state::AppState;

/// =======================
/// ROUTER
/// =======================

pub fn session_routes(state: AppState) -> Router {
    Router::new()
        .route("/sequence", get(sequence_summary))
        .route("/sequence/open", post(open_sequence))
        .route("/sequence/init", post(init_sequence))
        .route("/frames/current", get(current_frame))
        .route("/frames/next", post(next_frame))
        .route("/frames/previous", post(previous_frame))
        .route("/frames/goto", post(goto_frame))
        .route("/frames/import", post(import_point_cloud))
        .route("/annotations", post(create_annotation))
        .route("/annotations/{id}", patch(update_annotation).delete(delete_annotation))
        .route("/propagate", post(propagate))
        .route("/save", post(save))
        .route("/tracks", get(list_tracks))
        .route("/classes", get(list_classes))
        .with_state(state)
}

/// =======================
/// HELPERS
/// =======================

fn not_ready(manager: &SequenceManager) -> AnnotationError {
    match manager.state() {
        SessionState::Error(reason) => AnnotationError::NotReady(reason.clone()),
        _ => AnnotationError::NotReady("no sequence is open".to_string()),
    }
}

fn summary(manager: &SequenceManager) -> SequenceSummary {
    SequenceSummary {
        state: manager.state().clone(),
        root: manager.project_root().map(|p| p.to_path_buf()),
        frames: manager.frame_ids().to_vec(),
        current: manager.current_frame_id(),
        position: manager.current_index(),
    }
}

fn frame_view(manager: &SequenceManager) -> ApiResult<FrameView> {
    let (Some(set), Some(position)) = (manager.current(), manager.current_index()) else {
        return Err(not_ready(manager).into());
    };
    Ok(FrameView {
        frame_id: set.frame_id(),
        position,
        total: manager.frame_ids().len(),
        point_cloud: manager.point_cloud_path(set.frame_id()),
        annotations: set.annotations().to_vec(),
    })
}

async fn lookup_class(state: &AppState, class_id: &str) -> ApiResult<ClassInfo> {
    state
        .catalog
        .read()
        .await
        .get(class_id)
        .cloned()
        .ok_or_else(|| ApiError::UnknownClass(class_id.to_string()))
}

/// =======================
/// SEQUENCE
/// =======================

async fn sequence_summary(State(state): State<AppState>) -> Json<SequenceSummary> {
    let manager = state.session.lock().await;
    Json(summary(&manager))
}

async fn open_sequence(
    State(state): State<AppState>,
    Json(request): Json<OpenRequest>,
) -> ApiResult<Json<SequenceSummary>> {
    info!("Opening sequence {}", request.path.display());
    state.open(&request.path).await?;
    let manager = state.session.lock().await;
    Ok(Json(summary(&manager)))
}

async fn init_sequence(Json(request): Json<InitRequest>) -> ApiResult<(StatusCode, Json<InitResponse>)> {
    let frames = SequenceManager::create_frame_structure(&request.path, request.frames)?;
    Ok((
        StatusCode::CREATED,
        Json(InitResponse {
            path: request.path,
            frames,
        }),
    ))
}

/// =======================
/// FRAMES
/// =======================

async fn current_frame(State(state): State<AppState>) -> ApiResult<Json<FrameView>> {
    let manager = state.session.lock().await;
    Ok(Json(frame_view(&manager)?))
}

async fn next_frame(State(state): State<AppState>) -> ApiResult<Json<NavigationResponse>> {
    let mut manager = state.session.lock().await;
    let navigation = manager.next()?;
    Ok(Json(NavigationResponse {
        navigation,
        frame: frame_view(&manager)?,
    }))
}

async fn previous_frame(State(state): State<AppState>) -> ApiResult<Json<NavigationResponse>> {
    let mut manager = state.session.lock().await;
    let navigation = manager.previous()?;
    Ok(Json(NavigationResponse {
        navigation,
        frame: frame_view(&manager)?,
    }))
}

async fn goto_frame(
    State(state): State<AppState>,
    Json(request): Json<GotoRequest>,
) -> ApiResult<Json<NavigationResponse>> {
    let mut manager = state.session.lock().await;
    let navigation = manager.go_to(request.frame_id)?;
    Ok(Json(NavigationResponse {
        navigation,
        frame: frame_view(&manager)?,
    }))
}

async fn import_point_cloud(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> ApiResult<(StatusCode, Json<ImportResponse>)> {
    let mut manager = state.session.lock().await;
    let path = manager.import_point_cloud(&request.source, request.frame_id)?;
    Ok((
        StatusCode::CREATED,
        Json(ImportResponse {
            frame_id: request.frame_id,
            path,
        }),
    ))
}

/// =======================
/// ANNOTATIONS
/// =======================

async fn create_annotation(
    State(state): State<AppState>,
    Json(request): Json<CreateAnnotationRequest>,
) -> ApiResult<(StatusCode, Json<AnnotationRecord>)> {
    let class = lookup_class(&state, &request.class_id).await?;
    let geometry = BoxGeometry::new(request.center, request.size, request.rotation)?;
    let track = match (request.track_id, request.untracked) {
        (Some(track_id), _) => TrackAssignment::Existing(track_id),
        (None, true) => TrackAssignment::None,
        (None, false) => TrackAssignment::New,
    };

    let mut manager = state.session.lock().await;
    let record = manager.create_annotation(&class, geometry, track)?;
    debug!("Created annotation {}", record.id);
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PatchAnnotationRequest>,
) -> ApiResult<Json<AnnotationRecord>> {
    let mut patch = request.patch;
    if let Some(class_id) = &request.class_id {
        patch.class = Some(lookup_class(&state, class_id).await?);
    }

    let mut manager = state.session.lock().await;
    Ok(Json(manager.update_annotation(&id, &patch)?))
}

async fn delete_annotation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AnnotationRecord>> {
    let mut manager = state.session.lock().await;
    Ok(Json(manager.remove_annotation(&id)?))
}

/// =======================
/// PERSISTENCE / TRACKS
/// =======================

async fn propagate(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut manager = state.session.lock().await;
    let report = manager.propagate_to_next()?;
    Ok(Json(json!({ "propagation": report })))
}

async fn save(State(state): State<AppState>) -> ApiResult<Json<SequenceSummary>> {
    let mut manager = state.session.lock().await;
    manager.save()?;
    Ok(Json(summary(&manager)))
}

async fn list_tracks(State(state): State<AppState>) -> ApiResult<Json<TracksResponse>> {
    let manager = state.session.lock().await;
    let index = manager.track_index().ok_or_else(|| not_ready(&manager))?;

    let mut tracks: BTreeMap<_, BTreeMap<_, _>> = BTreeMap::new();
    for (track_id, frame_id, annotation_id) in index.read().entries() {
        tracks
            .entry(track_id.to_string())
            .or_default()
            .insert(frame_id, annotation_id.to_string());
    }
    Ok(Json(TracksResponse { tracks }))
}

async fn list_classes(State(state): State<AppState>) -> Json<Vec<ClassInfo>> {
    Json(state.catalog.read().await.classes().to_vec())
}
