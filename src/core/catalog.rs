// Read-only class label lookup

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::core::persist::read_json;
use crate::core::record::ClassInfo;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCatalog {
    classes: Vec<ClassInfo>,
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self {
            classes: vec![
                ClassInfo::new("car_01", "car", [255, 0, 0]),
                ClassInfo::new("pedestrian_01", "pedestrian", [0, 255, 0]),
                ClassInfo::new("bicycle_01", "bicycle", [0, 0, 255]),
            ],
        }
    }
}

impl ClassCatalog {
    /// Builds a catalog, keeping the first entry for a repeated id.
    pub fn new(classes: Vec<ClassInfo>) -> Self {
        let mut unique: Vec<ClassInfo> = Vec::with_capacity(classes.len());
        for class in classes {
            if unique.iter().any(|c| c.id == class.id) {
                warn!("duplicate class id {} ignored", class.id);
                continue;
            }
            unique.push(class);
        }
        Self { classes: unique }
    }

    /// Reads `{"classes": [...]}`; falls back to the built-in classes when the
    /// file is missing, unreadable or empty.
    pub fn load_or_default(path: &Path) -> Self {
        match read_json::<ClassCatalog>(path) {
            Ok(Some(catalog)) if !catalog.classes.is_empty() => {
                let catalog = Self::new(catalog.classes);
                info!("loaded {} classes from {}", catalog.classes.len(), path.display());
                catalog
            }
            Ok(_) => Self::default(),
            Err(e) => {
                warn!("using default classes: {}", e);
                Self::default()
            }
        }
    }

    pub fn get(&self, class_id: &str) -> Option<&ClassInfo> {
        self.classes.iter().find(|c| c.id == class_id)
    }

    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = ClassCatalog::load_or_default(&dir.path().join("classes.json"));
        assert_eq!(catalog.get("car_01").map(|c| c.color), Some([255, 0, 0]));
        assert_eq!(catalog.classes().len(), 3);
    }

    #[test]
    fn test_loads_file_and_drops_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("classes.json");
        std::fs::write(
            &path,
            r#"{"classes":[{"id":"truck","label":"truck","color":[1,2,3]},
                           {"id":"truck","label":"lorry","color":[4,5,6]}]}"#,
        )
        .unwrap();
        let catalog = ClassCatalog::load_or_default(&path);
        assert_eq!(catalog.classes().len(), 1);
        assert_eq!(catalog.get("truck").unwrap().label, "truck");
        assert!(catalog.get("car_01").is_none());
    }
}
