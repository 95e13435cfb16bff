use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::Level;

use box_annotation::{
    AnnotationPatch, AnnotationRecord, FrameId, NavigationOutcome, SessionOptions, SessionState,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub version: String,
    pub description: String,
    pub log_level: String,
    pub connection: Connection,
    /// Project opened at startup, if any.
    pub sequence: Option<PathBuf>,
    /// Overrides `<project>/class_labels/classes.json`.
    pub class_file: Option<PathBuf>,
    pub session: SessionOptions,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "pointcloud-box-annotator".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: "3D box annotation and track propagation for point-cloud sequences"
                .to_string(),
            log_level: "info".to_string(),
            connection: Connection::default(),
            sequence: None,
            class_file: None,
            session: SessionOptions::default(),
        }
    }
}

impl ServiceConfig {
    pub fn max_level(&self) -> Level {
        self.log_level.parse().unwrap_or(Level::INFO)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    pub ip: String,
    pub port: u16,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: 8700,
        }
    }
}

// =======================
// REQUESTS
// =======================

#[derive(Deserialize, Debug)]
pub struct OpenRequest {
    pub path: PathBuf,
}

#[derive(Deserialize, Debug)]
pub struct InitRequest {
    pub path: PathBuf,
    pub frames: u32,
}

#[derive(Deserialize, Debug)]
pub struct GotoRequest {
    pub frame_id: FrameId,
}

#[derive(Deserialize, Debug)]
pub struct ImportRequest {
    pub source: PathBuf,
    pub frame_id: FrameId,
}

/// Body of `POST /annotations`. Without `track_id` the box starts a new
/// track unless `untracked` is set.
#[derive(Deserialize, Debug)]
pub struct CreateAnnotationRequest {
    pub class_id: String,
    pub center: [f64; 3],
    pub size: [f64; 3],
    #[serde(default)]
    pub rotation: [f64; 3],
    #[serde(default)]
    pub track_id: Option<String>,
    #[serde(default)]
    pub untracked: bool,
}

#[derive(Deserialize, Debug)]
pub struct PatchAnnotationRequest {
    #[serde(default)]
    pub class_id: Option<String>,
    #[serde(flatten)]
    pub patch: AnnotationPatch,
}

// =======================
// RESPONSES
// =======================

#[derive(Serialize, Debug)]
pub struct SequenceSummary {
    pub state: SessionState,
    pub root: Option<PathBuf>,
    pub frames: Vec<FrameId>,
    pub current: Option<FrameId>,
    pub position: Option<usize>,
}

#[derive(Serialize, Debug)]
pub struct FrameView {
    pub frame_id: FrameId,
    pub position: usize,
    pub total: usize,
    pub point_cloud: Option<PathBuf>,
    pub annotations: Vec<AnnotationRecord>,
}

#[derive(Serialize, Debug)]
pub struct NavigationResponse {
    pub navigation: NavigationOutcome,
    pub frame: FrameView,
}

#[derive(Serialize, Debug)]
pub struct InitResponse {
    pub path: PathBuf,
    pub frames: Vec<FrameId>,
}

#[derive(Serialize, Debug)]
pub struct ImportResponse {
    pub frame_id: FrameId,
    pub path: PathBuf,
}

#[derive(Serialize, Debug)]
pub struct TracksResponse {
    pub tracks: BTreeMap<String, BTreeMap<FrameId, String>>,
}
