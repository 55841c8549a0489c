use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, error, warn};
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum TempStoreError {
    #[error("Scratch I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Scratch file is empty after write: {0}")]
    EmptyAfterWrite(PathBuf),
}

/// A staged payload on local disk. Not `Clone`: exactly one owner at a time.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    owner: String,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Id of the request that staged this file.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug)]
pub struct TempStore {
    root: PathBuf,
}

impl TempStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn stage(
        &self,
        owner: &str,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<ScratchFile, TempStoreError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|source| TempStoreError::Io {
                path: self.root.clone(),
                source,
            })?;

        let path = self
            .root
            .join(format!("{}_{}", Uuid::new_v4(), sanitize_filename(suggested_name)));

        fs::write(&path, bytes)
            .await
            .map_err(|source| TempStoreError::Io {
                path: path.clone(),
                source,
            })?;

        let written = fs::metadata(&path)
            .await
            .map_err(|source| TempStoreError::Io {
                path: path.clone(),
                source,
            })?
            .len();

        if written == 0 {
            if let Err(e) = fs::remove_file(&path).await {
                warn!("Failed to remove empty scratch file {}: {}", path.display(), e);
            }
            return Err(TempStoreError::EmptyAfterWrite(path));
        }

        debug!("Staged {} bytes at {}", written, path.display());
        Ok(ScratchFile {
            path,
            owner: owner.to_string(),
        })
    }

    /// Removes the file behind `file`. Missing files are not an error.
    pub async fn release(&self, file: &ScratchFile) {
        match fs::remove_file(&file.path).await {
            Ok(()) => debug!("Released scratch file {}", file.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Scratch file {} already released", file.path.display())
            }
            Err(e) => error!(
                "Failed to release scratch file {} for {}: {}",
                file.path.display(),
                file.owner,
                e
            ),
        }
    }
}

/// Reduces an uploaded filename to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') => Some(c),
            c if c.is_whitespace() => Some('_'),
            _ => None,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.').to_string();

    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sanitize_strips_paths_and_unsafe_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\fotos\\my bottle.JPG"), "my_bottle.JPG");
        assert_eq!(sanitize_filename("..hidden.png"), "hidden.png");
        assert_eq!(sanitize_filename("ボトル.png"), "png");
        assert_eq!(sanitize_filename("???"), "upload");
    }

    #[tokio::test]
    async fn stage_creates_missing_directory_lazily() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::new(dir.path().join("nested").join("scratch"));

        let file = store.stage("req-1", b"payload", "a.png").await.unwrap();

        assert!(file.path().starts_with(store.root()));
        assert!(file.file_name().ends_with("_a.png"));
        assert_eq!(file.owner(), "req-1");
        assert_eq!(std::fs::read(file.path()).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn same_name_staged_twice_does_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::new(dir.path());

        let first = store.stage("r1", b"one", "same.png").await.unwrap();
        let second = store.stage("r2", b"two", "same.png").await.unwrap();

        assert_ne!(first.path(), second.path());
    }

    #[tokio::test]
    async fn empty_payload_is_a_storage_fault_and_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::new(dir.path());

        let err = store.stage("r1", b"", "empty.png").await.unwrap_err();

        assert!(matches!(err, TempStoreError::EmptyAfterWrite(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn unwritable_root_is_a_storage_fault() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = TempStore::new(blocker.join("scratch"));

        let err = store.stage("r1", b"data", "a.png").await.unwrap_err();

        assert!(matches!(err, TempStoreError::Io { .. }));
    }

    #[tokio::test]
    async fn release_twice_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::new(dir.path());
        let file = store.stage("r1", b"data", "a.png").await.unwrap();

        store.release(&file).await;
        store.release(&file).await;

        assert!(!file.path().exists());
    }

    #[tokio::test]
    async fn release_of_never_staged_handle_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let store = TempStore::new(dir.path());
        let ghost = ScratchFile {
            path: dir.path().join("never-written.png"),
            owner: "ghost".to_string(),
        };

        store.release(&ghost).await;

        assert!(dir.path().exists());
    }
}
