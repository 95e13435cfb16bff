// On-disk layout of an annotation project

pub const FRAMES_DIR: &str = "frames";
pub const FRAME_DIR_PREFIX: &str = "frame_";
pub const ANNOTATION_FILE: &str = "annotations.json";
pub const TRACK_INFO_FILE: &str = "track_info.json";
pub const TRACK_KEY_PREFIX: &str = "track_";

// Suffix appended to a file name while it is being rewritten
pub const TEMP_SUFFIX: &str = ".tmp";

// Frame ids are exactly this many zero-padded digits
pub const FRAME_ID_WIDTH: usize = 5;
pub const MAX_FRAME_NUMBER: u32 = 99_999;

pub const DEFAULT_CLASS_COLOR: [u8; 3] = [255, 255, 255];

pub const CLASS_LABELS_DIR: &str = "class_labels";
pub const CLASS_LABELS_FILE: &str = "classes.json";

pub const DEFAULT_POINT_CLOUD_EXTENSIONS: [&str; 2] = ["pcd", "npy"];
