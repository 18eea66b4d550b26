//! Per-job working directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::ResolveError;

pub const RAW_MANIFEST: &str = "raw.m3u8";
pub const META: &str = "meta.json";
pub const MASTER_MANIFEST: &str = "master.m3u8";
pub const PLAYLISTS: &str = "playLists.json";

/// The directory receiving every artifact of one resolution job.
///
/// Nothing here locks the directory; two jobs must not share one.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Create the directory (and parents) if missing
    pub async fn ensure(&self) -> Result<(), ResolveError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ResolveError::write(&self.root, e))
    }

    pub async fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Result<PathBuf, ResolveError> {
        let path = self.path(name);
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| ResolveError::write(&path, e))?;
        debug!(path = %path.display(), "Wrote artifact");
        Ok(path)
    }

    /// Serialize `value` as compact JSON into `name`
    pub async fn write_json<T: Serialize>(
        &self,
        name: &'static str,
        value: &T,
    ) -> Result<PathBuf, ResolveError> {
        let json = serde_json::to_vec(value).map_err(|source| ResolveError::Serialization {
            what: name,
            source,
        })?;
        self.write(name, json).await
    }

    pub async fn copy(&self, from: &str, to: &str) -> Result<PathBuf, ResolveError> {
        let target = self.path(to);
        tokio::fs::copy(self.path(from), &target)
            .await
            .map_err(|e| ResolveError::write(&target, e))?;
        Ok(target)
    }

    /// Remove everything inside the directory, keeping the directory itself
    pub async fn clear(&self) -> Result<(), ResolveError> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(ResolveError::write(&self.root, e)),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ResolveError::write(&self.root, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| ResolveError::write(&path, e))?;
            let removed = if file_type.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            removed.map_err(|e| ResolveError::write(&path, e))?;
        }
        debug!(path = %self.root.display(), "Cleared working directory");
        Ok(())
    }
}
