// Copy-forward of tracked boxes into the following frame

use serde::Serialize;
use tracing::{error, info, warn};

use crate::core::annotation_set::FrameAnnotationSet;
use crate::core::error::Result;
use crate::core::format::FrameId;
use crate::core::frame_store::FrameStore;
use crate::core::ids::IdGenerator;
use crate::core::track_index::SharedTrackIndex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagatedRecord {
    pub track_id: String,
    pub annotation_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropagationReport {
    pub source: FrameId,
    pub target: FrameId,
    pub copied: Vec<PropagatedRecord>,
    /// Tracks the target frame already had; their records were left alone.
    pub skipped: Vec<String>,
}

impl PropagationReport {
    fn new(source: FrameId, target: FrameId) -> Self {
        Self {
            source,
            target,
            copied: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn copied_count(&self) -> usize {
        self.copied.len()
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    /// Every track touched, copied ones first.
    pub fn track_ids(&self) -> Vec<&str> {
        self.copied
            .iter()
            .map(|c| c.track_id.as_str())
            .chain(self.skipped.iter().map(String::as_str))
            .collect()
    }
}

pub struct PropagationEngine<'a> {
    store: &'a FrameStore,
    index: &'a SharedTrackIndex,
    ids: &'a dyn IdGenerator,
}

impl<'a> PropagationEngine<'a> {
    pub fn new(store: &'a FrameStore, index: &'a SharedTrackIndex, ids: &'a dyn IdGenerator) -> Self {
        Self { store, index, ids }
    }

    /// Seeds `target` with every track in `source` that `target` lacks.
    ///
    /// Geometry and class are copied verbatim under a fresh id. Tracks the
    /// target already holds are reported as skipped and never modified.
    /// The new records and the index entries are committed together: if any
    /// write fails, the target file and the in-memory index are put back and
    /// the error is returned.
    pub fn propagate(&self, source: &FrameAnnotationSet, target: FrameId) -> Result<PropagationReport> {
        let mut report = PropagationReport::new(source.frame_id(), target);
        if target == source.frame_id() {
            warn!("refusing to propagate frame {} onto itself", target);
            return Ok(report);
        }

        self.index.with_write(|index, index_path| -> Result<()> {
            let existed = self.store.exists(target);
            let original = self.store.load(target)?;
            index.reconcile_frame(&original);

            let mut seeded = original.clone();
            for record in source.annotations() {
                let Some(track_id) = record.track_id.as_deref() else {
                    continue;
                };
                if seeded.find_by_track(track_id).is_some() {
                    if !report.skipped.iter().any(|t| t == track_id) {
                        report.skipped.push(track_id.to_string());
                    }
                    continue;
                }
                let copy = record.copy_forward(self.ids.next_id());
                report.copied.push(PropagatedRecord {
                    track_id: track_id.to_string(),
                    annotation_id: copy.id.clone(),
                });
                seeded.insert(copy)?;
            }

            if report.copied.is_empty() {
                info!(
                    "nothing to propagate from {} to {} ({} skipped)",
                    report.source,
                    target,
                    report.skipped_count()
                );
                return Ok(());
            }

            self.store.save(&seeded)?;

            let previous: Vec<Option<String>> = report
                .copied
                .iter()
                .map(|c| {
                    let before = index.lookup(&c.track_id, target).map(str::to_string);
                    index.register(&c.track_id, target, &c.annotation_id);
                    before
                })
                .collect();

            if let Err(e) = index.save(index_path) {
                error!("track index save failed, rolling back frame {}: {}", target, e);
                for (copied, before) in report.copied.iter().zip(previous) {
                    match before {
                        Some(annotation_id) => {
                            index.register(&copied.track_id, target, &annotation_id);
                        }
                        None => {
                            index.unregister(&copied.track_id, target);
                        }
                    }
                }
                let restored = if existed {
                    self.store.save(&original)
                } else {
                    self.store.discard(target)
                };
                if let Err(restore_err) = restored {
                    error!("could not restore frame {}: {}", target, restore_err);
                }
                return Err(e);
            }

            info!(
                "propagated {} -> {}: {} copied, {} skipped",
                report.source,
                target,
                report.copied_count(),
                report.skipped_count()
            );
            Ok(())
        })?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AnnotationError;
    use crate::core::ids::SequentialIdGenerator;
    use crate::core::record::{AnnotationRecord, BoxGeometry, ClassInfo};
    use crate::core::track_index::TrackIndex;
    use std::fs;

    fn f(n: u32) -> FrameId {
        FrameId::new(n).unwrap()
    }

    fn record(id: &str, center: [f64; 3], track: Option<&str>) -> AnnotationRecord {
        let geometry = BoxGeometry::new(center, [2.0, 4.0, 1.5], [0.0, 0.0, 15.0]).unwrap();
        let record = AnnotationRecord::new(id, &ClassInfo::new("car_01", "car", [255, 0, 0]), geometry);
        match track {
            Some(t) => record.with_track(t),
            None => record,
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        store: FrameStore,
        index: SharedTrackIndex,
        ids: SequentialIdGenerator,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let index = SharedTrackIndex::open(dir.path());
        Fixture {
            _dir: dir,
            store,
            index,
            ids: SequentialIdGenerator::new("p"),
        }
    }

    fn source() -> FrameAnnotationSet {
        let mut set = FrameAnnotationSet::new(f(0));
        set.insert(record("a", [1.0, 2.0, 3.0], Some("T1"))).unwrap();
        set.insert(record("b", [4.0, 5.0, 6.0], Some("T2"))).unwrap();
        set.insert(record("loose", [0.0; 3], None)).unwrap();
        set
    }

    #[test]
    fn test_copies_tracked_records() {
        let fx = fixture();
        let engine = PropagationEngine::new(&fx.store, &fx.index, &fx.ids);
        let report = engine.propagate(&source(), f(1)).unwrap();

        assert_eq!(report.copied_count(), 2);
        assert_eq!(report.skipped_count(), 0);
        assert_eq!(report.track_ids(), ["T1", "T2"]);

        let target = fx.store.load(f(1)).unwrap();
        assert_eq!(target.len(), 2);
        let t1 = target.find_by_track("T1").unwrap();
        assert_eq!(t1.id, "p-1");
        assert_eq!(t1.geometry(), source().get("a").unwrap().geometry());
        assert_eq!(t1.class_label, "car");

        let saved = TrackIndex::load(fx.index.path());
        assert_eq!(saved.lookup("T1", f(1)), Some("p-1"));
        assert_eq!(saved.lookup("T2", f(1)), Some("p-2"));
    }

    #[test]
    fn test_second_run_skips_everything() {
        let fx = fixture();
        let engine = PropagationEngine::new(&fx.store, &fx.index, &fx.ids);
        engine.propagate(&source(), f(1)).unwrap();
        let before = fs::read(fx.store.annotation_path(f(1))).unwrap();

        let report = engine.propagate(&source(), f(1)).unwrap();
        assert_eq!(report.copied_count(), 0);
        assert_eq!(report.skipped, ["T1", "T2"]);
        assert_eq!(fs::read(fx.store.annotation_path(f(1))).unwrap(), before);
    }

    #[test]
    fn test_existing_manual_edit_is_not_clobbered() {
        let fx = fixture();
        let mut target = FrameAnnotationSet::new(f(1));
        target.insert(record("manual", [9.0, 9.0, 9.0], Some("T1"))).unwrap();
        fx.store.save(&target).unwrap();

        let engine = PropagationEngine::new(&fx.store, &fx.index, &fx.ids);
        let report = engine.propagate(&source(), f(1)).unwrap();
        assert_eq!(report.skipped, ["T1"]);
        assert_eq!(report.copied.len(), 1);

        let after = fx.store.load(f(1)).unwrap();
        assert_eq!(after.get("manual"), target.get("manual"));
        assert_eq!(after.annotations()[0].id, "manual");
        assert_eq!(fx.index.lookup("T1", f(1)).as_deref(), Some("manual"));
    }

    #[test]
    fn test_failed_index_save_rolls_back() {
        let fx = fixture();
        // a directory where the index file should go makes the rename fail
        fs::create_dir_all(fx.index.path()).unwrap();
        fs::write(fx.index.path().join("keep"), b"x").unwrap();

        let engine = PropagationEngine::new(&fx.store, &fx.index, &fx.ids);
        let err = engine.propagate(&source(), f(1)).unwrap_err();
        assert!(err.is_persistence());

        assert!(!fx.store.exists(f(1)));
        assert!(fx.index.tracks_at(f(1)).is_empty());
    }

    #[test]
    fn test_failed_index_save_restores_existing_target() {
        let fx = fixture();
        let mut target = FrameAnnotationSet::new(f(1));
        target.insert(record("manual", [9.0; 3], Some("T1"))).unwrap();
        fx.store.save(&target).unwrap();
        fs::create_dir_all(fx.index.path()).unwrap();
        fs::write(fx.index.path().join("keep"), b"x").unwrap();

        let engine = PropagationEngine::new(&fx.store, &fx.index, &fx.ids);
        assert!(engine.propagate(&source(), f(1)).is_err());
        assert_eq!(fx.store.load(f(1)).unwrap(), target);
        assert_eq!(fx.index.lookup("T2", f(1)), None);
    }

    #[test]
    fn test_id_collision_aborts_before_writing() {
        struct Constant;
        impl IdGenerator for Constant {
            fn next_id(&self) -> String {
                "same".to_string()
            }
        }
        let fx = fixture();
        let engine = PropagationEngine::new(&fx.store, &fx.index, &Constant);
        let err = engine.propagate(&source(), f(1)).unwrap_err();
        assert!(matches!(err, AnnotationError::DuplicateAnnotationId { .. }));
        assert!(!fx.store.exists(f(1)));
    }
}
