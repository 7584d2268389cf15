use std::{
    io,
    path::{Path, PathBuf},
};

use tokio::fs;

use crate::domain::edition::{AssetKind, EditionId};

/// Where each edition's files live. Paths depend only on the edition ID, so
/// later phases can locate files without state carried over in memory.
#[derive(Debug, Clone)]
pub struct BuildLayout {
    artifacts_dir: PathBuf,
    thumbnails_dir: PathBuf,
}

impl BuildLayout {
    pub fn new(artifacts_dir: impl Into<PathBuf>, thumbnails_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_dir: artifacts_dir.into(),
            thumbnails_dir: thumbnails_dir.into(),
        }
    }

    pub fn file_name(id: EditionId, kind: AssetKind) -> String {
        format!("{}.{}", id.get(), kind.extension())
    }

    pub fn path_for(&self, id: EditionId, kind: AssetKind) -> PathBuf {
        let dir = match kind {
            AssetKind::Artifact => &self.artifacts_dir,
            AssetKind::Thumbnail => &self.thumbnails_dir,
        };
        dir.join(Self::file_name(id, kind))
    }

    pub fn artifact_path(&self, id: EditionId) -> PathBuf {
        self.path_for(id, AssetKind::Artifact)
    }

    pub fn thumbnail_path(&self, id: EditionId) -> PathBuf {
        self.path_for(id, AssetKind::Thumbnail)
    }

    pub async fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.artifacts_dir).await?;
        fs::create_dir_all(&self.thumbnails_dir).await
    }
}

/// Write through a sibling `.partial` file and rename it into place, so a
/// reader never observes a half-written file at `path`.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut staging = path.as_os_str().to_owned();
    staging.push(".partial");
    let staging = PathBuf::from(staging);

    fs::write(&staging, contents).await?;
    if let Err(err) = fs::rename(&staging, path).await {
        let _ = fs::remove_file(&staging).await;
        return Err(err);
    }
    Ok(())
}
