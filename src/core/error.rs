// Error handling for the annotation core

use std::path::PathBuf;
use thiserror::Error;

use crate::core::format::FrameId;

pub type Result<T> = std::result::Result<T, AnnotationError>;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Duplicate annotation id {id} in frame {frame_id}")]
    DuplicateAnnotationId { frame_id: FrameId, id: String },

    #[error("Track {track_id} already has an annotation in frame {frame_id}")]
    DuplicateTrackId { frame_id: FrameId, track_id: String },

    #[error("Annotation not found: {0}")]
    AnnotationNotFound(String),

    #[error("Invalid frame id: {0:?}")]
    InvalidFrameId(String),

    #[error("Frame not found: {0}")]
    FrameNotFound(String),

    #[error("No frame directories found under {}", .0.display())]
    EmptySequence(PathBuf),

    #[error("I/O error on {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupted file {}: {source}", path.display())]
    CorruptFile {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("No sequence ready: {0}")]
    NotReady(String),
}

impl AnnotationError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AnnotationError::Persistence {
            path: path.into(),
            source,
        }
    }

    /// True for failures reading or writing files on disk.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            AnnotationError::Persistence { .. } | AnnotationError::CorruptFile { .. }
        )
    }

    /// Path of the file involved, when the error is about one.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            AnnotationError::Persistence { path, .. } | AnnotationError::CorruptFile { path, .. } => {
                Some(path)
            }
            AnnotationError::EmptySequence(path) => Some(path),
            _ => None,
        }
    }
}
