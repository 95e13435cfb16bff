// Track identity across frames: track id -> frame id -> annotation id
//
// The per-frame files are the source of truth. This index is a cache kept in
// step with every edit, and rebuilt frame by frame when it is lost.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::core::annotation_set::FrameAnnotationSet;
use crate::core::constants::{TRACK_INFO_FILE, TRACK_KEY_PREFIX};
use crate::core::error::Result;
use crate::core::format::{FrameId, TrackInfoFile};
use crate::core::persist::{read_json, write_json_atomic};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackIndex {
    tracks: BTreeMap<String, BTreeMap<FrameId, String>>,
    // reverse map so tracks_at does not scan every track
    by_frame: HashMap<FrameId, BTreeSet<String>>,
}

/// What `reconcile_frame` had to change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub registered: usize,
    pub dropped: usize,
}

impl ReconcileSummary {
    pub fn is_clean(&self) -> bool {
        self.registered == 0 && self.dropped == 0
    }
}

impl TrackIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `annotation_id` realizes `track_id` in `frame_id`.
    /// Returns false when the entry was already present.
    pub fn register(&mut self, track_id: &str, frame_id: FrameId, annotation_id: &str) -> bool {
        let frames = self.tracks.entry(track_id.to_string()).or_default();
        if frames.get(&frame_id).map(String::as_str) == Some(annotation_id) {
            return false;
        }
        frames.insert(frame_id, annotation_id.to_string());
        self.by_frame
            .entry(frame_id)
            .or_default()
            .insert(track_id.to_string());
        true
    }

    /// Drops the entry for `track_id` in `frame_id`, and the whole track once
    /// it has no frames left. Returns the annotation id that was mapped.
    pub fn unregister(&mut self, track_id: &str, frame_id: FrameId) -> Option<String> {
        let frames = self.tracks.get_mut(track_id)?;
        let removed = frames.remove(&frame_id)?;
        if frames.is_empty() {
            self.tracks.remove(track_id);
        }
        if let Some(tracks) = self.by_frame.get_mut(&frame_id) {
            tracks.remove(track_id);
            if tracks.is_empty() {
                self.by_frame.remove(&frame_id);
            }
        }
        Some(removed)
    }

    pub fn lookup(&self, track_id: &str, frame_id: FrameId) -> Option<&str> {
        self.tracks.get(track_id)?.get(&frame_id).map(String::as_str)
    }

    pub fn tracks_at(&self, frame_id: FrameId) -> BTreeSet<String> {
        self.by_frame.get(&frame_id).cloned().unwrap_or_default()
    }

    /// Frames a track appears in, in frame order.
    pub fn frames_of(&self, track_id: &str) -> Vec<(FrameId, &str)> {
        self.tracks
            .get(track_id)
            .map(|frames| frames.iter().map(|(f, a)| (*f, a.as_str())).collect())
            .unwrap_or_default()
    }

    pub fn track_ids(&self) -> impl Iterator<Item = &str> {
        self.tracks.keys().map(String::as_str)
    }

    /// Every (track, frame, annotation) triple.
    pub fn entries(&self) -> impl Iterator<Item = (&str, FrameId, &str)> {
        self.tracks.iter().flat_map(|(track, frames)| {
            frames
                .iter()
                .map(move |(frame, annotation)| (track.as_str(), *frame, annotation.as_str()))
        })
    }

    /// Number of tracks.
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Brings the entries for one frame in line with that frame's records.
    pub fn reconcile_frame(&mut self, set: &FrameAnnotationSet) -> ReconcileSummary {
        let frame_id = set.frame_id();
        let mut summary = ReconcileSummary::default();

        for track_id in self.tracks_at(frame_id) {
            let still_valid = self
                .lookup(&track_id, frame_id)
                .and_then(|annotation_id| set.get(annotation_id))
                .is_some_and(|record| record.track_id.as_deref() == Some(track_id.as_str()));
            if !still_valid {
                self.unregister(&track_id, frame_id);
                summary.dropped += 1;
            }
        }

        for record in set.annotations() {
            let Some(track_id) = record.track_id.as_deref() else {
                continue;
            };
            // first record wins when a track is claimed twice
            if set.find_by_track(track_id).map(|r| r.id.as_str()) != Some(record.id.as_str()) {
                continue;
            }
            if self.register(track_id, frame_id, &record.id) {
                summary.registered += 1;
            }
        }

        if !summary.is_clean() {
            debug!(
                "reconciled frame {}: {} registered, {} dropped",
                frame_id, summary.registered, summary.dropped
            );
        }
        summary
    }

    pub fn from_file(file: TrackInfoFile) -> Self {
        let mut index = Self::new();
        for (key, frames) in file {
            // files written before the prefix was introduced use raw ids
            let track_id = key.strip_prefix(TRACK_KEY_PREFIX).unwrap_or(&key);
            for (frame_id, annotation_id) in frames {
                index.register(track_id, frame_id, &annotation_id);
            }
        }
        index
    }

    pub fn to_file(&self) -> TrackInfoFile {
        self.tracks
            .iter()
            .map(|(track_id, frames)| (format!("{}{}", TRACK_KEY_PREFIX, track_id), frames.clone()))
            .collect()
    }

    /// Reads the index file. A missing or unreadable file yields an empty
    /// index; frames re-register their tracks as they are visited.
    pub fn load(path: &Path) -> Self {
        match read_json::<TrackInfoFile>(path) {
            Ok(Some(file)) => {
                let index = Self::from_file(file);
                info!("loaded {} tracks from {}", index.len(), path.display());
                index
            }
            Ok(None) => {
                debug!("no track index at {}, starting empty", path.display());
                Self::new()
            }
            Err(e) => {
                warn!("ignoring unusable track index: {}", e);
                Self::new()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, &self.to_file())
    }
}

/// Project-wide index shared by the sequence manager and propagation.
/// Mutations and saves go through the write lock, lookups through the read
/// lock.
#[derive(Debug, Clone)]
pub struct SharedTrackIndex {
    inner: Arc<RwLock<TrackIndex>>,
    path: PathBuf,
}

impl SharedTrackIndex {
    pub fn new(path: impl Into<PathBuf>, index: TrackIndex) -> Self {
        Self {
            inner: Arc::new(RwLock::new(index)),
            path: path.into(),
        }
    }

    /// Loads `track_info.json` from the project root.
    pub fn open(project_root: &Path) -> Self {
        let path = project_root.join(TRACK_INFO_FILE);
        let index = TrackIndex::load(&path);
        Self::new(path, index)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TrackIndex> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, TrackIndex> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn register(&self, track_id: &str, frame_id: FrameId, annotation_id: &str) -> bool {
        self.write().register(track_id, frame_id, annotation_id)
    }

    pub fn unregister(&self, track_id: &str, frame_id: FrameId) -> Option<String> {
        self.write().unregister(track_id, frame_id)
    }

    pub fn lookup(&self, track_id: &str, frame_id: FrameId) -> Option<String> {
        self.read().lookup(track_id, frame_id).map(str::to_string)
    }

    pub fn tracks_at(&self, frame_id: FrameId) -> BTreeSet<String> {
        self.read().tracks_at(frame_id)
    }

    pub fn reconcile_frame(&self, set: &FrameAnnotationSet) -> ReconcileSummary {
        self.write().reconcile_frame(set)
    }

    pub fn snapshot(&self) -> TrackIndex {
        self.read().clone()
    }

    pub fn save(&self) -> Result<()> {
        let index = self.write();
        index.save(&self.path)
    }

    /// Runs `f` with exclusive access, for multi-step commits.
    pub fn with_write<T>(&self, f: impl FnOnce(&mut TrackIndex, &Path) -> T) -> T {
        let mut index = self.write();
        f(&mut index, &self.path)
    }
}

/// Checks every index entry against the frame files on disk. Returns the
/// entries that do not resolve to a record carrying the same track.
pub fn find_dangling(
    index: &TrackIndex,
    mut load: impl FnMut(FrameId) -> Result<FrameAnnotationSet>,
) -> Result<Vec<(String, FrameId, String)>> {
    let mut frames: HashMap<FrameId, FrameAnnotationSet> = HashMap::new();
    let mut dangling = Vec::new();
    for (track_id, frame_id, annotation_id) in index.entries() {
        if !frames.contains_key(&frame_id) {
            frames.insert(frame_id, load(frame_id)?);
        }
        let ok = frames
            .get(&frame_id)
            .and_then(|set| set.get(annotation_id))
            .is_some_and(|r| r.track_id.as_deref() == Some(track_id));
        if !ok {
            dangling.push((track_id.to_string(), frame_id, annotation_id.to_string()));
        }
    }
    Ok(dangling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::{AnnotationRecord, BoxGeometry, ClassInfo};
    use std::fs;

    fn f(n: u32) -> FrameId {
        FrameId::new(n).unwrap()
    }

    fn record(id: &str, track: &str) -> AnnotationRecord {
        let geometry = BoxGeometry::new([0.0; 3], [1.0; 3], [0.0; 3]).unwrap();
        AnnotationRecord::new(id, &ClassInfo::new("c", "car", [1, 2, 3]), geometry).with_track(track)
    }

    #[test]
    fn test_register_is_idempotent_and_overwrites() {
        let mut index = TrackIndex::new();
        assert!(index.register("T1", f(0), "a"));
        assert!(!index.register("T1", f(0), "a"));
        assert!(index.register("T1", f(0), "b"));
        assert_eq!(index.lookup("T1", f(0)), Some("b"));
        assert_eq!(index.frames_of("T1").len(), 1);
    }

    #[test]
    fn test_unregister_drops_empty_track() {
        let mut index = TrackIndex::new();
        index.register("T1", f(0), "a");
        index.register("T1", f(1), "b");
        assert_eq!(index.unregister("T1", f(0)).as_deref(), Some("a"));
        assert_eq!(index.len(), 1);
        assert_eq!(index.unregister("T1", f(1)).as_deref(), Some("b"));
        assert!(index.is_empty());
        assert!(index.tracks_at(f(1)).is_empty());
        assert_eq!(index.unregister("T1", f(1)), None);
    }

    #[test]
    fn test_tracks_at() {
        let mut index = TrackIndex::new();
        index.register("T1", f(0), "a");
        index.register("T2", f(0), "b");
        index.register("T2", f(1), "c");
        let at0: Vec<String> = index.tracks_at(f(0)).into_iter().collect();
        assert_eq!(at0, ["T1", "T2"]);
        assert_eq!(index.tracks_at(f(1)).len(), 1);
        assert!(index.tracks_at(f(7)).is_empty());
    }

    #[test]
    fn test_file_uses_prefixed_keys() {
        let mut index = TrackIndex::new();
        index.register("T1", f(0), "id0");
        index.register("T1", f(1), "id1");
        let json = serde_json::to_value(index.to_file()).unwrap();
        assert_eq!(json, serde_json::json!({"track_T1": {"00000": "id0", "00001": "id1"}}));
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRACK_INFO_FILE);
        let mut index = TrackIndex::new();
        index.register("T1", f(0), "a");
        index.register("track_nested", f(3), "b");
        index.save(&path).unwrap();
        assert_eq!(TrackIndex::load(&path), index);
    }

    #[test]
    fn test_legacy_unprefixed_keys() {
        let file: TrackInfoFile =
            serde_json::from_str(r#"{"abc": {"00002": "x"}, "track_T1": {"00000": "y"}}"#).unwrap();
        let index = TrackIndex::from_file(file);
        assert_eq!(index.lookup("abc", f(2)), Some("x"));
        assert_eq!(index.lookup("T1", f(0)), Some("y"));
    }

    #[test]
    fn test_corrupt_or_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(TRACK_INFO_FILE);
        assert!(TrackIndex::load(&path).is_empty());

        fs::write(&path, r#"{"track_T1": {"bad-frame": "a"}}"#).unwrap();
        assert!(TrackIndex::load(&path).is_empty());

        fs::write(&path, "{\"track_T1\": {\"1\": \"a\"}}").unwrap();
        assert!(TrackIndex::load(&path).is_empty());
    }

    #[test]
    fn test_reconcile_frame() {
        let mut index = TrackIndex::new();
        index.register("stale", f(0), "gone");
        index.register("moved", f(0), "a");
        index.register("other_frame", f(1), "z");

        let mut set = FrameAnnotationSet::new(f(0));
        set.insert(record("a", "renamed")).unwrap();
        set.insert(record("b", "T2")).unwrap();

        let summary = index.reconcile_frame(&set);
        assert_eq!(summary, ReconcileSummary { registered: 2, dropped: 2 });
        let at0: Vec<String> = index.tracks_at(f(0)).into_iter().collect();
        assert_eq!(at0, ["T2", "renamed"]);
        assert_eq!(index.lookup("other_frame", f(1)), Some("z"));
        assert!(index.reconcile_frame(&set).is_clean());
    }

    #[test]
    fn test_reconcile_picks_first_claim() {
        let set = FrameAnnotationSet::from_records(f(0), vec![record("a", "T1"), record("b", "T1")])
            .unwrap();
        let mut index = TrackIndex::new();
        index.reconcile_frame(&set);
        assert_eq!(index.lookup("T1", f(0)), Some("a"));
    }

    #[test]
    fn test_shared_index_save() {
        let dir = tempfile::tempdir().unwrap();
        let shared = SharedTrackIndex::open(dir.path());
        assert!(shared.snapshot().is_empty());
        shared.register("T1", f(0), "a");
        shared.save().unwrap();

        let reopened = SharedTrackIndex::open(dir.path());
        assert_eq!(reopened.lookup("T1", f(0)).as_deref(), Some("a"));
        assert_eq!(reopened.tracks_at(f(0)).len(), 1);
    }

    #[test]
    fn test_find_dangling() {
        let mut index = TrackIndex::new();
        index.register("T1", f(0), "a");
        index.register("T2", f(0), "missing");
        let mut set = FrameAnnotationSet::new(f(0));
        set.insert(record("a", "T1")).unwrap();

        let dangling = find_dangling(&index, |_| Ok(set.clone())).unwrap();
        assert_eq!(dangling, vec![("T2".to_string(), f(0), "missing".to_string())]);
    }
}
