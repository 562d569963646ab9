use std::path::{Path, PathBuf};

use tokio::fs;

use super::{Store, StoreKey};
use crate::error::AppResult;

/// Stores each key as `<dir>/<key>.json`
///
/// Writes land in a sibling temp file first and are renamed into place, so
/// a reader never sees a half-written value.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens the store, creating the directory if needed
    pub async fn open(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        tracing::info!(dir = %dir.display(), "File store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: StoreKey) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

#[async_trait::async_trait]
impl Store for FileStore {
    async fn read(&self, key: StoreKey) -> AppResult<Option<String>> {
        match fs::read_to_string(self.path_for(key)).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: StoreKey, value: String) -> AppResult<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn clear(&self, key: StoreKey) -> AppResult<()> {
        match fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
