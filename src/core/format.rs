// Frame identifiers and the JSON layouts stored on disk

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::constants::{FRAME_DIR_PREFIX, FRAME_ID_WIDTH, MAX_FRAME_NUMBER};
use crate::core::error::AnnotationError;
use crate::core::record::AnnotationRecord;

/// Five-digit frame number. Ordering is numeric, the textual form is
/// always zero padded (`"00042"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FrameId(u32);

impl FrameId {
    pub fn new(number: u32) -> Result<Self, AnnotationError> {
        if number > MAX_FRAME_NUMBER {
            return Err(AnnotationError::InvalidFrameId(number.to_string()));
        }
        Ok(Self(number))
    }

    pub fn number(&self) -> u32 {
        self.0
    }

    pub fn next(&self) -> Option<Self> {
        Self::new(self.0 + 1).ok()
    }

    /// Parses a directory name of the form `frame_XXXXX`.
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix(FRAME_DIR_PREFIX)?.parse().ok()
    }

    pub fn dir_name(&self) -> String {
        format!("{}{}", FRAME_DIR_PREFIX, self)
    }
}

impl FromStr for FrameId {
    type Err = AnnotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != FRAME_ID_WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(AnnotationError::InvalidFrameId(s.to_string()));
        }
        let number = s
            .parse::<u32>()
            .map_err(|_| AnnotationError::InvalidFrameId(s.to_string()))?;
        Self::new(number)
    }
}

impl TryFrom<String> for FrameId {
    type Error = AnnotationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FrameId> for String {
    fn from(id: FrameId) -> Self {
        id.to_string()
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:0width$}", self.0, width = FRAME_ID_WIDTH)
    }
}

// Contents of frames/frame_XXXXX/annotations.json
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameFile {
    /// Informational only; the directory name decides the frame. `None` when
    /// the field is absent or unreadable.
    #[serde(default, deserialize_with = "lenient_frame_id")]
    pub frame_id: Option<FrameId>,
    #[serde(default)]
    pub annotations: Vec<AnnotationRecord>,
}

// Accepts "00004", "4" or 4; anything else reads as None instead of failing
fn lenient_frame_id<'de, D>(deserializer: D) -> Result<Option<FrameId>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let number = match value {
        Some(serde_json::Value::String(s)) => s.trim().parse::<u32>().ok(),
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        _ => None,
    };
    Ok(number.and_then(|n| FrameId::new(n).ok()))
}

// Contents of track_info.json: "track_<id>" -> { frame id -> annotation id }
pub type TrackInfoFile = BTreeMap<String, BTreeMap<FrameId, String>>;
