// Oriented 3D box annotations

use serde::{Deserialize, Deserializer, Serialize};

use crate::core::constants::DEFAULT_CLASS_COLOR;
use crate::core::error::{AnnotationError, Result};

/// Class catalog entry copied onto each record at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub id: String,
    pub label: String,
    pub color: [u8; 3],
}

impl ClassInfo {
    pub fn new(id: impl Into<String>, label: impl Into<String>, color: [u8; 3]) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            color,
        }
    }
}

/// Validated box placement.
///
/// `center` is in point-cloud coordinates, `size` is (length, width, height)
/// and `rotation` holds Euler angles in degrees applied about X, then Y,
/// then Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxGeometry {
    center: [f64; 3],
    size: [f64; 3],
    rotation: [f64; 3],
}

impl BoxGeometry {
    pub fn new(center: [f64; 3], size: [f64; 3], rotation: [f64; 3]) -> Result<Self> {
        if center.iter().any(|v| !v.is_finite()) {
            return Err(AnnotationError::InvalidGeometry(format!(
                "center must be finite, got {center:?}"
            )));
        }
        // NaN fails this comparison too
        if !size.iter().all(|v| *v > 0.0 && v.is_finite()) {
            return Err(AnnotationError::InvalidGeometry(format!(
                "size components must be positive, got {size:?}"
            )));
        }
        if rotation.iter().any(|v| !v.is_finite()) {
            return Err(AnnotationError::InvalidGeometry(format!(
                "rotation must be finite, got {rotation:?}"
            )));
        }
        Ok(Self {
            center,
            size,
            rotation,
        })
    }

    pub fn center(&self) -> [f64; 3] {
        self.center
    }

    pub fn size(&self) -> [f64; 3] {
        self.size
    }

    pub fn rotation(&self) -> [f64; 3] {
        self.rotation
    }
}

/// One box within one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub class_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub class_label: String,
    #[serde(default = "default_color", deserialize_with = "null_as_default_color")]
    pub class_color: [u8; 3],
    center: [f64; 3],
    size: [f64; 3],
    rotation: [f64; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
}

impl AnnotationRecord {
    /// Record that belongs to no track yet.
    pub fn new(id: impl Into<String>, class: &ClassInfo, geometry: BoxGeometry) -> Self {
        Self {
            id: id.into(),
            class_id: class.id.clone(),
            class_label: class.label.clone(),
            class_color: class.color,
            center: geometry.center,
            size: geometry.size,
            rotation: geometry.rotation,
            track_id: None,
        }
    }

    /// Makes this record the origin of a new track named after its id.
    pub fn starting_track(mut self) -> Self {
        self.track_id = Some(self.id.clone());
        self
    }

    pub fn with_track(mut self, track_id: impl Into<String>) -> Self {
        self.track_id = Some(track_id.into());
        self
    }

    pub fn geometry(&self) -> BoxGeometry {
        BoxGeometry {
            center: self.center,
            size: self.size,
            rotation: self.rotation,
        }
    }

    pub fn set_geometry(&mut self, geometry: BoxGeometry) {
        self.center = geometry.center;
        self.size = geometry.size;
        self.rotation = geometry.rotation;
    }

    pub fn class(&self) -> ClassInfo {
        ClassInfo::new(self.class_id.clone(), self.class_label.clone(), self.class_color)
    }

    pub fn set_class(&mut self, class: &ClassInfo) {
        self.class_id = class.id.clone();
        self.class_label = class.label.clone();
        self.class_color = class.color;
    }

    pub fn center(&self) -> [f64; 3] {
        self.center
    }

    pub fn size(&self) -> [f64; 3] {
        self.size
    }

    pub fn rotation(&self) -> [f64; 3] {
        self.rotation
    }

    /// Re-checks a record that did not come through `BoxGeometry::new`,
    /// e.g. one read from disk.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(AnnotationError::InvalidGeometry(
                "annotation id must not be empty".to_string(),
            ));
        }
        BoxGeometry::new(self.center, self.size, self.rotation).map(|_| ())
    }

    /// Copy for another frame: same class, geometry and track, new id.
    pub fn copy_forward(&self, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..self.clone()
        }
    }
}

/// Partial edit of a record. `track_id: Some(None)` detaches the record from
/// its track.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AnnotationPatch {
    #[serde(default)]
    pub class: Option<ClassInfo>,
    #[serde(default)]
    pub center: Option<[f64; 3]>,
    #[serde(default)]
    pub size: Option<[f64; 3]>,
    #[serde(default)]
    pub rotation: Option<[f64; 3]>,
    #[serde(default, deserialize_with = "explicit_option")]
    pub track_id: Option<Option<String>>,
}

impl AnnotationPatch {
    /// Returns the edited record; `record` is left alone if validation fails.
    pub fn apply(&self, record: &AnnotationRecord) -> Result<AnnotationRecord> {
        let current = record.geometry();
        let geometry = BoxGeometry::new(
            self.center.unwrap_or(current.center),
            self.size.unwrap_or(current.size),
            self.rotation.unwrap_or(current.rotation),
        )?;

        let mut edited = record.clone();
        edited.set_geometry(geometry);
        if let Some(class) = &self.class {
            edited.set_class(class);
        }
        if let Some(track_id) = &self.track_id {
            edited.track_id = track_id.clone();
        }
        Ok(edited)
    }
}

fn default_color() -> [u8; 3] {
    DEFAULT_CLASS_COLOR
}

fn null_as_default<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_default_color<'de, D>(deserializer: D) -> std::result::Result<[u8; 3], D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<[u8; 3]>::deserialize(deserializer)?.unwrap_or(DEFAULT_CLASS_COLOR))
}

// Distinguishes a missing field (outer None) from an explicit null (Some(None))
fn explicit_option<'de, D>(deserializer: D) -> std::result::Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Some(Option::<String>::deserialize(deserializer)?))
}
