// Session behaviour knobs, usually read from the service config

use serde::{Deserialize, Serialize};

use crate::core::constants::DEFAULT_POINT_CLOUD_EXTENSIONS;

/// What `next()` does when the following frame has never been annotated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationPolicy {
    /// Only propagate when explicitly asked to.
    #[default]
    Manual,
    /// Seed an unannotated next frame before moving onto it.
    AutoOnEmpty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub propagation: PropagationPolicy,
    pub point_cloud_extensions: Vec<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            propagation: PropagationPolicy::Manual,
            point_cloud_extensions: DEFAULT_POINT_CLOUD_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }
}

impl SessionOptions {
    pub fn is_point_cloud(&self, path: &std::path::Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.point_cloud_extensions
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext))
            })
    }
}
