use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use box_annotation::core::constants::{CLASS_LABELS_DIR, CLASS_LABELS_FILE};
use box_annotation::{ClassCatalog, SequenceManager};

use crate::models::service_model::ServiceConfig;

#[derive(Clone)]
pub struct AppState {
    // One command at a time; handlers hold the lock for the whole operation
    pub session: Arc<Mutex<SequenceManager>>,
    pub catalog: Arc<RwLock<ClassCatalog>>,
    pub class_file: Option<PathBuf>,
}

impl AppState {
    pub fn new(manager: SequenceManager, class_file: Option<PathBuf>) -> Self {
        let catalog = class_file
            .as_deref()
            .map(ClassCatalog::load_or_default)
            .unwrap_or_default();
        Self {
            session: Arc::new(Mutex::new(manager)),
            catalog: Arc::new(RwLock::new(catalog)),
            class_file,
        }
    }

    /// Builds the state from config and opens the startup sequence, if any.
    /// A sequence that fails to open is logged and the service starts empty.
    pub async fn from_config(config: &ServiceConfig) -> Self {
        let state = Self::new(SequenceManager::new(config.session.clone()), config.class_file.clone());
        if let Some(path) = &config.sequence {
            if let Err(e) = state.open(path).await {
                warn!("startup sequence {} not opened: {}", path.display(), e);
            }
        }
        state
    }

    /// Opens a project and refreshes the class catalog from it unless a
    /// class file is pinned in config.
    pub async fn open(&self, path: &Path) -> box_annotation::Result<()> {
        let mut session = self.session.lock().await;
        session.open_sequence(path)?;
        if self.class_file.is_none() {
            let catalog = ClassCatalog::load_or_default(&self.project_class_file(path));
            *self.catalog.write().await = catalog;
        }
        Ok(())
    }

    pub fn project_class_file(&self, project: &Path) -> PathBuf {
        project.join(CLASS_LABELS_DIR).join(CLASS_LABELS_FILE)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(SequenceManager::default(), None)
    }
}
