// Frame sequence navigation and the editing session around it

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::annotation_set::FrameAnnotationSet;
use crate::core::constants::{FRAMES_DIR, MAX_FRAME_NUMBER};
use crate::core::error::{AnnotationError, Result};
use crate::core::format::FrameId;
use crate::core::frame_store::FrameStore;
use crate::core::ids::{IdGenerator, TimestampIdGenerator};
use crate::core::options::{PropagationPolicy, SessionOptions};
use crate::core::propagation::{PropagationEngine, PropagationReport};
use crate::core::record::{AnnotationPatch, AnnotationRecord, BoxGeometry, ClassInfo};
use crate::core::track_index::{find_dangling, SharedTrackIndex};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum SessionState {
    Unloaded,
    Ready,
    /// The last open failed after the previous session was closed.
    Error(String),
}

/// Result of a navigation command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavigationOutcome {
    pub frame_id: FrameId,
    pub moved: bool,
    pub propagation: Option<PropagationReport>,
}

/// How a newly created box relates to tracks.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TrackAssignment {
    None,
    /// Start a new track named after the box id.
    #[default]
    New,
    Existing(String),
}

struct OpenSequence {
    root: PathBuf,
    store: FrameStore,
    index: SharedTrackIndex,
    frames: Vec<FrameId>,
    cursor: usize,
    current: FrameAnnotationSet,
}

impl OpenSequence {
    /// Writes the current frame, then the index that points into it.
    fn persist(&self) -> Result<()> {
        self.store.save(&self.current)?;
        self.index.save()
    }

    fn enter(&mut self, position: usize) -> Result<()> {
        let frame_id = self.frames[position];
        let set = self.store.load(frame_id)?;
        self.index.reconcile_frame(&set);
        self.cursor = position;
        self.current = set;
        debug!("entered frame {} ({}/{})", frame_id, position + 1, self.frames.len());
        Ok(())
    }

    fn current_id(&self) -> FrameId {
        self.frames[self.cursor]
    }
}

/// Owns the frame list, the cursor and the frame being edited.
///
/// The frame being left is always written before the cursor moves, so a
/// crash right after navigation cannot lose it.
pub struct SequenceManager {
    options: SessionOptions,
    ids: Box<dyn IdGenerator>,
    state: SessionState,
    session: Option<OpenSequence>,
}

impl Default for SequenceManager {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl SequenceManager {
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            ids: Box::new(TimestampIdGenerator),
            state: SessionState::Unloaded,
            session: None,
        }
    }

    pub fn with_id_generator(mut self, ids: Box<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    // =========================================================================
    // Open / close
    // =========================================================================

    /// Opens the project at `path`: enumerates `frames/frame_XXXXX`, loads the
    /// track index and the first frame.
    ///
    /// A scan failure leaves any open session untouched. If the first frame
    /// cannot be read the manager ends up in `SessionState::Error`.
    pub fn open_sequence<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let root = path.as_ref().to_path_buf();
        let frames = scan_frames(&root.join(FRAMES_DIR))?;

        if let Some(previous) = &self.session {
            previous.persist()?;
            info!("closed sequence {}", previous.root.display());
        }
        self.session = None;

        let store = FrameStore::new(&root);
        let index = SharedTrackIndex::open(&root);
        let first = match store.load(frames[0]) {
            Ok(set) => set,
            Err(e) => {
                warn!("cannot open {}: {}", root.display(), e);
                self.state = SessionState::Error(e.to_string());
                return Err(e);
            }
        };
        index.reconcile_frame(&first);

        info!(
            "opened sequence {} with {} frames ({} known tracks)",
            root.display(),
            frames.len(),
            index.read().len()
        );
        self.session = Some(OpenSequence {
            root,
            store,
            index,
            frames,
            cursor: 0,
            current: first,
        });
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Saves and drops the open sequence.
    pub fn close(&mut self) -> Result<()> {
        if let Some(session) = &self.session {
            session.persist()?;
            info!("closed sequence {}", session.root.display());
        }
        self.session = None;
        self.state = SessionState::Unloaded;
        Ok(())
    }

    /// Lays out `frames/frame_00000 ..` for a new project with `count` frames.
    pub fn create_frame_structure<P: AsRef<Path>>(path: P, count: u32) -> Result<Vec<FrameId>> {
        if count > MAX_FRAME_NUMBER + 1 {
            return Err(AnnotationError::InvalidFrameId(format!("{count} frames")));
        }
        let store = FrameStore::new(path);
        let mut created = Vec::with_capacity(count as usize);
        for number in 0..count {
            let frame_id = FrameId::new(number)?;
            let dir = store.frame_dir(frame_id);
            fs::create_dir_all(&dir).map_err(|e| AnnotationError::persistence(&dir, e))?;
            created.push(frame_id);
        }
        info!("created {} frame directories under {}", count, store.frames_dir().display());
        Ok(created)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    fn session(&self) -> Result<&OpenSequence> {
        self.session.as_ref().ok_or_else(|| self.not_ready())
    }

    fn session_mut(&mut self) -> Result<&mut OpenSequence> {
        let err = self.not_ready();
        self.session.as_mut().ok_or(err)
    }

    fn not_ready(&self) -> AnnotationError {
        match &self.state {
            SessionState::Error(reason) => AnnotationError::NotReady(reason.clone()),
            _ => AnnotationError::NotReady("no sequence is open".to_string()),
        }
    }

    pub fn project_root(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.root.as_path())
    }

    pub fn frame_ids(&self) -> &[FrameId] {
        self.session.as_ref().map(|s| s.frames.as_slice()).unwrap_or(&[])
    }

    pub fn current_frame_id(&self) -> Option<FrameId> {
        self.session.as_ref().map(OpenSequence::current_id)
    }

    pub fn current_index(&self) -> Option<usize> {
        self.session.as_ref().map(|s| s.cursor)
    }

    pub fn current(&self) -> Option<&FrameAnnotationSet> {
        self.session.as_ref().map(|s| &s.current)
    }

    pub fn track_index(&self) -> Option<&SharedTrackIndex> {
        self.session.as_ref().map(|s| &s.index)
    }

    /// Point-cloud file for a frame, handed to the external decoder.
    pub fn point_cloud_path(&self, frame_id: FrameId) -> Option<PathBuf> {
        let session = self.session.as_ref()?;
        let mut candidates: Vec<PathBuf> = fs::read_dir(session.store.frame_dir(frame_id))
            .ok()?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && self.options.is_point_cloud(path))
            .collect();
        candidates.sort();
        candidates.into_iter().next()
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Writes the current frame and the track index.
    pub fn save(&mut self) -> Result<()> {
        let session = self.session()?;
        session.persist()?;
        info!("saved frame {}", session.current_id());
        Ok(())
    }

    pub fn go_to(&mut self, frame_id: FrameId) -> Result<NavigationOutcome> {
        let session = self.session_mut()?;
        let position = session
            .frames
            .binary_search(&frame_id)
            .map_err(|_| AnnotationError::FrameNotFound(frame_id.to_string()))?;
        if position == session.cursor {
            return Ok(NavigationOutcome {
                frame_id,
                moved: false,
                propagation: None,
            });
        }
        session.persist()?;
        session.enter(position)?;
        Ok(NavigationOutcome {
            frame_id,
            moved: true,
            propagation: None,
        })
    }

    /// Moves one frame forward; a no-op on the last frame.
    pub fn next(&mut self) -> Result<NavigationOutcome> {
        let auto = self.options.propagation == PropagationPolicy::AutoOnEmpty;
        let not_ready = self.not_ready();
        let ids = self.ids.as_ref();
        let session = self.session.as_mut().ok_or(not_ready)?;

        let position = session.cursor + 1;
        if position >= session.frames.len() {
            return Ok(NavigationOutcome {
                frame_id: session.current_id(),
                moved: false,
                propagation: None,
            });
        }

        session.persist()?;
        let target = session.frames[position];
        let propagation = if auto && !session.store.exists(target) {
            let engine = PropagationEngine::new(&session.store, &session.index, ids);
            Some(engine.propagate(&session.current, target)?)
        } else {
            None
        };
        session.enter(position)?;
        Ok(NavigationOutcome {
            frame_id: target,
            moved: true,
            propagation,
        })
    }

    /// Moves one frame back; a no-op on the first frame.
    pub fn previous(&mut self) -> Result<NavigationOutcome> {
        let session = self.session_mut()?;
        if session.cursor == 0 {
            return Ok(NavigationOutcome {
                frame_id: session.current_id(),
                moved: false,
                propagation: None,
            });
        }
        session.persist()?;
        session.enter(session.cursor - 1)?;
        Ok(NavigationOutcome {
            frame_id: session.current_id(),
            moved: true,
            propagation: None,
        })
    }

    // =========================================================================
    // Editing the current frame
    // =========================================================================

    /// Adds a caller-built record to the current frame.
    pub fn add_annotation(&mut self, record: AnnotationRecord) -> Result<()> {
        let session = self.session_mut()?;
        let frame_id = session.current_id();
        let track_id = record.track_id.clone();
        let id = record.id.clone();
        session.current.insert(record)?;
        if let Some(track_id) = track_id {
            session.index.register(&track_id, frame_id, &id);
        }
        debug!("added annotation {} to frame {}", id, frame_id);
        Ok(())
    }

    /// Creates a box with a generated id in the current frame.
    pub fn create_annotation(
        &mut self,
        class: &ClassInfo,
        geometry: BoxGeometry,
        track: TrackAssignment,
    ) -> Result<AnnotationRecord> {
        let record = AnnotationRecord::new(self.ids.next_id(), class, geometry);
        let record = match track {
            TrackAssignment::None => record,
            TrackAssignment::New => record.starting_track(),
            TrackAssignment::Existing(track_id) => record.with_track(track_id),
        };
        self.add_annotation(record.clone())?;
        Ok(record)
    }

    pub fn update_annotation(&mut self, id: &str, patch: &AnnotationPatch) -> Result<AnnotationRecord> {
        let session = self.session_mut()?;
        let frame_id = session.current_id();
        let old = session
            .current
            .get(id)
            .ok_or_else(|| AnnotationError::AnnotationNotFound(id.to_string()))?;
        let edited = patch.apply(old)?;
        let old = session.current.replace(edited.clone())?;

        if old.track_id != edited.track_id {
            if let Some(track_id) = old.track_id.as_deref() {
                release_track(&session.index, &session.current, track_id, id);
            }
            if let Some(track_id) = edited.track_id.as_deref() {
                session.index.register(track_id, frame_id, id);
            }
        }
        debug!("updated annotation {} in frame {}", id, frame_id);
        Ok(edited)
    }

    pub fn remove_annotation(&mut self, id: &str) -> Result<AnnotationRecord> {
        let session = self.session_mut()?;
        let frame_id = session.current_id();
        let removed = session
            .current
            .remove(id)
            .ok_or_else(|| AnnotationError::AnnotationNotFound(id.to_string()))?;
        if let Some(track_id) = removed.track_id.as_deref() {
            release_track(&session.index, &session.current, track_id, id);
        }
        debug!("removed annotation {} from frame {}", id, frame_id);
        Ok(removed)
    }

    // =========================================================================
    // Propagation and import
    // =========================================================================

    /// Saves the current frame, then seeds the next frame from it. Returns
    /// `None` on the last frame.
    pub fn propagate_to_next(&mut self) -> Result<Option<PropagationReport>> {
        let session = self.session.as_ref().ok_or_else(|| self.not_ready())?;
        let Some(target) = session.frames.get(session.cursor + 1).copied() else {
            info!("frame {} is the last frame, nothing to propagate into", session.current_id());
            return Ok(None);
        };
        session.persist()?;
        let engine = PropagationEngine::new(&session.store, &session.index, self.ids.as_ref());
        engine.propagate(&session.current, target).map(Some)
    }

    /// Copies a point-cloud file into a frame directory, adding the frame to
    /// the sequence if it is new. Returns the copied file's path.
    pub fn import_point_cloud<P: AsRef<Path>>(&mut self, source: P, frame_id: FrameId) -> Result<PathBuf> {
        let source = source.as_ref();
        let session = self.session_mut()?;
        let file_name = source.file_name().ok_or_else(|| {
            AnnotationError::persistence(source, io::Error::new(io::ErrorKind::InvalidInput, "not a file"))
        })?;

        let dir = session.store.frame_dir(frame_id);
        fs::create_dir_all(&dir).map_err(|e| AnnotationError::persistence(&dir, e))?;
        let dest = dir.join(file_name);
        fs::copy(source, &dest).map_err(|e| AnnotationError::persistence(source, e))?;

        if let Err(position) = session.frames.binary_search(&frame_id) {
            session.frames.insert(position, frame_id);
            if position <= session.cursor {
                session.cursor += 1;
            }
        }
        info!("imported {} into frame {}", source.display(), frame_id);
        Ok(dest)
    }

    /// Index entries that do not match the saved frame files.
    pub fn check_track_index(&self) -> Result<Vec<(String, FrameId, String)>> {
        let session = self.session()?;
        let index = session.index.snapshot();
        find_dangling(&index, |frame_id| session.store.load(frame_id))
    }
}

// Unregister only if the index still points at this record. A loaded frame
// may hold another claimant of the same track; it takes over the entry.
fn release_track(index: &SharedTrackIndex, set: &FrameAnnotationSet, track_id: &str, annotation_id: &str) {
    let frame_id = set.frame_id();
    let mut guard = index.write();
    if guard.lookup(track_id, frame_id) != Some(annotation_id) {
        return;
    }
    guard.unregister(track_id, frame_id);
    if let Some(other) = set.find_by_track(track_id) {
        debug!("track {} in frame {} now points at {}", track_id, frame_id, other.id);
        guard.register(track_id, frame_id, &other.id);
    }
}

/// Lists `frame_XXXXX` directories in numeric order.
pub fn scan_frames(frames_dir: &Path) -> Result<Vec<FrameId>> {
    let entries = match fs::read_dir(frames_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(AnnotationError::EmptySequence(frames_dir.to_path_buf()));
        }
        Err(e) => return Err(AnnotationError::persistence(frames_dir, e)),
    };

    let mut frames = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AnnotationError::persistence(frames_dir, e))?;
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir {
            continue;
        }
        if let Some(frame_id) = entry.file_name().to_str().and_then(FrameId::from_dir_name) {
            frames.push(frame_id);
        }
    }

    if frames.is_empty() {
        return Err(AnnotationError::EmptySequence(frames_dir.to_path_buf()));
    }
    frames.sort();
    Ok(frames)
}
