use crate::domain::model::CommerceState;
use crate::domain::ports::Store;
use crate::utils::error::{CommerceError, Result};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

pub const STATE_FILE_NAME: &str = "commerce_state.json";

/// 以 JSON 檔保存狀態的 Store。每次提交先寫入暫存檔再 rename，寫入成功才更新記憶體中的狀態。
pub struct FileStore {
    path: PathBuf,
    state: RwLock<CommerceState>,
}

impl FileStore {
    pub async fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        tokio::fs::create_dir_all(data_dir).await?;

        let path = data_dir.join(STATE_FILE_NAME);
        let state = if tokio::fs::try_exists(&path).await? {
            let content = tokio::fs::read(&path).await?;
            serde_json::from_slice(&content).map_err(|e| CommerceError::PersistenceError {
                message: format!("Corrupted state file {}: {}", path.display(), e),
            })?
        } else {
            CommerceState::default()
        };

        tracing::debug!("📂 State loaded from {}", path.display());
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, state: &CommerceState) -> Result<()> {
        let content = serde_json::to_vec_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");

        tokio::fs::write(&tmp_path, content).await.map_err(|e| {
            CommerceError::PersistenceError {
                message: format!("Cannot write {}: {}", tmp_path.display(), e),
            }
        })?;
        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            CommerceError::PersistenceError {
                message: format!("Cannot replace {}: {}", self.path.display(), e),
            }
        })?;

        tracing::debug!("💾 State saved to {}", self.path.display());
        Ok(())
    }
}

impl Store for FileStore {
    async fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&CommerceState) -> Result<T> + Send,
        T: Send,
    {
        let state = self.state.read().await;
        f(&state)
    }

    async fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut CommerceState) -> Result<T> + Send,
        T: Send,
    {
        let mut state = self.state.write().await;
        let mut draft = state.clone();
        let output = f(&mut draft)?;
        self.persist(&draft).await?;
        *state = draft;
        Ok(output)
    }
}
