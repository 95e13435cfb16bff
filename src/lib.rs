// Point-cloud box annotation core
// Main library entry point

pub mod core;

// Re-export main types
pub use crate::core::annotation_set::FrameAnnotationSet;
pub use crate::core::catalog::ClassCatalog;
pub use crate::core::error::{AnnotationError, Result};
pub use crate::core::format::FrameId;
pub use crate::core::frame_store::FrameStore;
pub use crate::core::ids::{IdGenerator, SequentialIdGenerator, TimestampIdGenerator};
pub use crate::core::options::{PropagationPolicy, SessionOptions};
pub use crate::core::propagation::{PropagationEngine, PropagationReport};
pub use crate::core::record::{AnnotationPatch, AnnotationRecord, BoxGeometry, ClassInfo};
pub use crate::core::sequence::{NavigationOutcome, SequenceManager, SessionState, TrackAssignment};
pub use crate::core::track_index::{SharedTrackIndex, TrackIndex};

#[cfg(test)]
mod tests {
    #[test]
    fn test_constants() {
        use crate::core::constants::*;
        assert_eq!(FRAMES_DIR, "frames");
        assert_eq!(TRACK_INFO_FILE, "track_info.json");
        assert_eq!(FRAME_DIR_PREFIX.len() + FRAME_ID_WIDTH, "frame_00000".len());
    }
}
