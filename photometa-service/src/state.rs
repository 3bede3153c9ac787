use crate::error::AppError;
use photometa_core::Library;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

pub type SharedState = Arc<AppState>;

/// Open libraries, keyed by canonical root. Opening is cheap (config read
/// plus a SQLite handle), so libraries stay open for the process lifetime.
pub struct AppState {
    libraries: RwLock<HashMap<PathBuf, Arc<Library>>>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            libraries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn library_count(&self) -> usize {
        self.libraries.read().await.len()
    }

    /// Library for `root`, opening (and initializing if needed) on first use.
    pub async fn library(&self, root: &Path) -> Result<Arc<Library>, AppError> {
        let canonical = {
            let target = root.to_path_buf();
            tokio::task::spawn_blocking(move || target.canonicalize())
                .await?
                .map_err(|e| AppError::not_found(format!("library {}: {e}", root.display())))?
        };

        if let Some(lib) = self.libraries.read().await.get(&canonical) {
            return Ok(Arc::clone(lib));
        }

        let opened = {
            let root = canonical.clone();
            tokio::task::spawn_blocking(move || Library::open_or_init(&root)).await??
        };

        let mut libraries = self.libraries.write().await;
        // Another request may have won the race to open the same root
        let entry = libraries
            .entry(canonical)
            .or_insert_with(|| Arc::new(opened));
        Ok(Arc::clone(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn opens_once_and_reuses() {
        let tmp = TempDir::new().unwrap();
        let state = AppState::new();

        let a = state.library(tmp.path()).await.unwrap();
        let b = state.library(tmp.path()).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(state.library_count().await, 1);
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let state = AppState::new();
        let err = state
            .library(Path::new("/definitely/not/a/directory"))
            .await
            .unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }
}
