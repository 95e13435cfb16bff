pub mod annotation_set;
pub mod catalog;
pub mod constants;
pub mod error;
pub mod format;
pub mod frame_store;
pub mod ids;
pub mod options;
pub mod persist;
pub mod propagation;
pub mod record;
pub mod sequence;
pub mod track_index;
