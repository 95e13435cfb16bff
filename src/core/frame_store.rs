// Per-frame annotation files

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::core::annotation_set::FrameAnnotationSet;
use crate::core::constants::{ANNOTATION_FILE, FRAMES_DIR};
use crate::core::error::Result;
use crate::core::format::{FrameFile, FrameId};
use crate::core::persist::{read_json, remove_file_if_exists, write_json_atomic};

/// Reads and writes `frames/frame_XXXXX/annotations.json` under a project root.
#[derive(Debug, Clone)]
pub struct FrameStore {
    frames_dir: PathBuf,
}

impl FrameStore {
    pub fn new<P: AsRef<Path>>(project_root: P) -> Self {
        Self {
            frames_dir: project_root.as_ref().join(FRAMES_DIR),
        }
    }

    pub fn frames_dir(&self) -> &Path {
        &self.frames_dir
    }

    pub fn frame_dir(&self, frame_id: FrameId) -> PathBuf {
        self.frames_dir.join(frame_id.dir_name())
    }

    pub fn annotation_path(&self, frame_id: FrameId) -> PathBuf {
        self.frame_dir(frame_id).join(ANNOTATION_FILE)
    }

    pub fn exists(&self, frame_id: FrameId) -> bool {
        self.annotation_path(frame_id).is_file()
    }

    /// Loads a frame's annotations. A frame that was never saved is empty.
    pub fn load(&self, frame_id: FrameId) -> Result<FrameAnnotationSet> {
        let path = self.annotation_path(frame_id);
        let Some(file) = read_json::<FrameFile>(&path)? else {
            debug!("no annotations yet for frame {}", frame_id);
            return Ok(FrameAnnotationSet::new(frame_id));
        };

        match file.frame_id {
            Some(declared) if declared == frame_id => {}
            Some(declared) => warn!(
                "{} declares frame {}, using {} from its directory",
                path.display(),
                declared,
                frame_id
            ),
            None => warn!(
                "{} has no readable frame_id, using {} from its directory",
                path.display(),
                frame_id
            ),
        }

        let set = FrameAnnotationSet::from_records(frame_id, file.annotations)?;
        for track_id in set.duplicate_tracks() {
            warn!(
                "frame {} has several annotations for track {}; fix before saving",
                frame_id, track_id
            );
        }
        debug!("loaded {} annotations for frame {}", set.len(), frame_id);
        Ok(set)
    }

    /// Atomically replaces the frame's file with `set`.
    pub fn save(&self, set: &FrameAnnotationSet) -> Result<()> {
        set.validate()?;
        let file = FrameFile {
            frame_id: Some(set.frame_id()),
            annotations: set.annotations().to_vec(),
        };
        write_json_atomic(&self.annotation_path(set.frame_id()), &file)
    }

    /// Deletes the frame's annotation file, leaving the directory in place.
    pub fn discard(&self, frame_id: FrameId) -> Result<()> {
        remove_file_if_exists(&self.annotation_path(frame_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AnnotationError;
    use crate::core::record::{AnnotationRecord, BoxGeometry, ClassInfo};
    use std::fs;

    fn record(id: &str, x: f64, track: Option<&str>) -> AnnotationRecord {
        let geometry = BoxGeometry::new([x, 1.0, -2.5], [2.0, 4.0, 1.5], [0.0, 0.0, 30.0]).unwrap();
        let record = AnnotationRecord::new(id, &ClassInfo::new("car_01", "car", [255, 0, 0]), geometry);
        match track {
            Some(t) => record.with_track(t),
            None => record,
        }
    }

    #[test]
    fn test_first_visit_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let set = store.load(FrameId::new(0).unwrap()).unwrap();
        assert!(set.is_empty());
        assert!(!store.exists(FrameId::new(0).unwrap()));
    }

    #[test]
    fn test_save_load_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let frame = FrameId::new(12).unwrap();

        let mut set = FrameAnnotationSet::new(frame);
        set.insert(record("z-last-alphabetically", 3.0, Some("T1"))).unwrap();
        set.insert(record("a-first", -1.25, None)).unwrap();
        set.insert(record("m", 0.1, Some("T2"))).unwrap();

        store.save(&set).unwrap();
        assert!(store.exists(frame));
        assert_eq!(
            store.annotation_path(frame),
            dir.path().join("frames/frame_00012/annotations.json")
        );
        assert_eq!(store.load(frame).unwrap(), set);
    }

    #[test]
    fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let mut set = FrameAnnotationSet::new(FrameId::new(1).unwrap());
        set.insert(record("a", 0.0, Some("T1"))).unwrap();
        store.save(&set).unwrap();

        let raw = fs::read_to_string(store.annotation_path(set.frame_id())).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["frame_id"], "00001");
        assert_eq!(value["annotations"][0]["track_id"], "T1");
    }

    #[test]
    fn test_directory_wins_over_declared_frame_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let frame = FrameId::new(4).unwrap();
        let path = store.annotation_path(frame);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, r#"{"frame_id":"00009","annotations":[]}"#).unwrap();
        assert_eq!(store.load(frame).unwrap().frame_id(), frame);
    }

    #[test]
    fn test_missing_or_malformed_frame_id_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let frame = FrameId::new(4).unwrap();
        let path = store.annotation_path(frame);
        fs::create_dir_all(path.parent().unwrap()).unwrap();

        let box_json = r#"{"id":"a","class_id":"car_01","class_label":"car","class_color":[255,0,0],
            "center":[0,0,0],"size":[1,1,1],"rotation":[0,0,0],"track_id":"T1"}"#;
        for declared in [r#""frame_id":"4","#, r#""frame_id":4,"#, r#""frame_id":null,"#, r#""frame_id":[1],"#, ""] {
            fs::write(&path, format!(r#"{{{declared}"annotations":[{box_json}]}}"#)).unwrap();
            let set = store.load(frame).unwrap();
            assert_eq!(set.frame_id(), frame);
            assert_eq!(set.get("a").and_then(|r| r.track_id.as_deref()), Some("T1"));
        }

        // saving writes the canonical form back
        store.save(&store.load(frame).unwrap()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["frame_id"], "00004");
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let frame = FrameId::new(2).unwrap();
        let path = store.annotation_path(frame);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[").unwrap();
        let err = store.load(frame).unwrap_err();
        assert!(matches!(err, AnnotationError::CorruptFile { .. }));
    }

    #[test]
    fn test_save_rejects_duplicate_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let frame = FrameId::new(0).unwrap();
        let set = FrameAnnotationSet::from_records(
            frame,
            vec![record("a", 0.0, Some("T1")), record("b", 1.0, Some("T1"))],
        )
        .unwrap();
        assert!(matches!(store.save(&set), Err(AnnotationError::DuplicateTrackId { .. })));
        assert!(!store.exists(frame));
    }

    #[test]
    fn test_discard() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let set = FrameAnnotationSet::new(FrameId::new(0).unwrap());
        store.save(&set).unwrap();
        store.discard(set.frame_id()).unwrap();
        assert!(!store.exists(set.frame_id()));
        store.discard(set.frame_id()).unwrap();
    }
}
