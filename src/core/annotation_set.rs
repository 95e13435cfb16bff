// Annotations belonging to a single frame

use std::collections::HashSet;

use crate::core::error::{AnnotationError, Result};
use crate::core::format::FrameId;
use crate::core::record::AnnotationRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct FrameAnnotationSet {
    frame_id: FrameId,
    annotations: Vec<AnnotationRecord>,
}

impl FrameAnnotationSet {
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            annotations: Vec::new(),
        }
    }

    /// Builds a set from records read elsewhere. Ids must be unique; a track
    /// claimed twice is allowed here and caught by `validate` before saving.
    pub fn from_records(frame_id: FrameId, records: Vec<AnnotationRecord>) -> Result<Self> {
        let mut seen = HashSet::new();
        for record in &records {
            record.validate()?;
            if !seen.insert(record.id.as_str()) {
                return Err(AnnotationError::DuplicateAnnotationId {
                    frame_id,
                    id: record.id.clone(),
                });
            }
        }
        Ok(Self {
            frame_id,
            annotations: records,
        })
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn annotations(&self) -> &[AnnotationRecord] {
        &self.annotations
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&AnnotationRecord> {
        self.annotations.iter().find(|a| a.id == id)
    }

    /// First record carrying `track_id`.
    pub fn find_by_track(&self, track_id: &str) -> Option<&AnnotationRecord> {
        self.annotations
            .iter()
            .find(|a| a.track_id.as_deref() == Some(track_id))
    }

    /// Appends a record, rejecting id and track collisions.
    pub fn insert(&mut self, record: AnnotationRecord) -> Result<()> {
        record.validate()?;
        if self.get(&record.id).is_some() {
            return Err(AnnotationError::DuplicateAnnotationId {
                frame_id: self.frame_id,
                id: record.id,
            });
        }
        if let Some(track_id) = record.track_id.as_deref() {
            if self.find_by_track(track_id).is_some() {
                return Err(AnnotationError::DuplicateTrackId {
                    frame_id: self.frame_id,
                    track_id: track_id.to_string(),
                });
            }
        }
        self.annotations.push(record);
        Ok(())
    }

    /// Swaps in an edited version of an existing record, keeping its position.
    pub fn replace(&mut self, record: AnnotationRecord) -> Result<AnnotationRecord> {
        record.validate()?;
        let position = self
            .annotations
            .iter()
            .position(|a| a.id == record.id)
            .ok_or_else(|| AnnotationError::AnnotationNotFound(record.id.clone()))?;
        if let Some(track_id) = record.track_id.as_deref() {
            let clash = self
                .annotations
                .iter()
                .any(|a| a.id != record.id && a.track_id.as_deref() == Some(track_id));
            if clash {
                return Err(AnnotationError::DuplicateTrackId {
                    frame_id: self.frame_id,
                    track_id: track_id.to_string(),
                });
            }
        }
        Ok(std::mem::replace(&mut self.annotations[position], record))
    }

    pub fn remove(&mut self, id: &str) -> Option<AnnotationRecord> {
        let position = self.annotations.iter().position(|a| a.id == id)?;
        Some(self.annotations.remove(position))
    }

    /// Track ids present in this frame, in record order.
    pub fn track_ids(&self) -> impl Iterator<Item = &str> {
        self.annotations.iter().filter_map(|a| a.track_id.as_deref())
    }

    /// Track ids claimed by more than one record.
    pub fn duplicate_tracks(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for track_id in self.track_ids() {
            if !seen.insert(track_id) && !duplicates.iter().any(|d| d == track_id) {
                duplicates.push(track_id.to_string());
            }
        }
        duplicates
    }

    /// Checks the invariants required before the set is written out.
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for record in &self.annotations {
            record.validate()?;
            if !ids.insert(record.id.as_str()) {
                return Err(AnnotationError::DuplicateAnnotationId {
                    frame_id: self.frame_id,
                    id: record.id.clone(),
                });
            }
        }
        if let Some(track_id) = self.duplicate_tracks().into_iter().next() {
            return Err(AnnotationError::DuplicateTrackId {
                frame_id: self.frame_id,
                track_id,
            });
        }
        Ok(())
    }
}
