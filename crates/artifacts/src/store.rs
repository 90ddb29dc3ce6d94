use crate::error::StorageError;
use crate::naming::{AudioKind, audio_name, upload_name};
use std::io;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Where uploads and audio land on disk, and the URL prefix each is served
/// under.
#[derive(Debug, Clone)]
pub struct ArtifactDirs {
    pub upload_dir: PathBuf,
    pub upload_url_prefix: String,
    pub audio_dir: PathBuf,
    pub audio_url_prefix: String,
}

impl Default for ArtifactDirs {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("static/upload"),
            upload_url_prefix: "/static/upload".to_string(),
            audio_dir: PathBuf::from("static/audio"),
            audio_url_prefix: "/static/audio".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub fs_path: PathBuf,
    pub url_path: String,
}

/// Persists uploaded images and synthesized audio under unique names.
///
/// Every name carries a random token, and files are opened with
/// `create_new`, so concurrent writers never overwrite each other.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dirs: ArtifactDirs,
}

impl ArtifactStore {
    pub fn new(dirs: ArtifactDirs) -> Self {
        Self { dirs }
    }

    pub async fn ensure_dirs(&self) -> Result<(), StorageError> {
        for dir in [&self.dirs.upload_dir, &self.dirs.audio_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|source| StorageError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
        }
        tracing::debug!(
            upload_dir = %self.dirs.upload_dir.display(),
            audio_dir = %self.dirs.audio_dir.display(),
            "Artifact directories ready"
        );
        Ok(())
    }

    pub async fn save_upload(
        &self,
        bytes: &[u8],
        filename_hint: Option<&str>,
    ) -> Result<StoredArtifact, StorageError> {
        let name = upload_name(unix_seconds(), filename_hint);
        write_new(
            &self.dirs.upload_dir,
            &self.dirs.upload_url_prefix,
            name,
            bytes,
        )
        .await
    }

    pub async fn save_audio(
        &self,
        bytes: &[u8],
        kind: AudioKind,
    ) -> Result<StoredArtifact, StorageError> {
        let name = audio_name(unix_seconds(), kind);
        write_new(&self.dirs.audio_dir, &self.dirs.audio_url_prefix, name, bytes).await
    }
}

fn unix_seconds() -> i64 {
    chrono::Utc::now().timestamp()
}

pub(crate) fn url_join(prefix: &str, name: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), name)
}

pub(crate) async fn write_new(
    dir: &Path,
    url_prefix: &str,
    name: String,
    bytes: &[u8],
) -> Result<StoredArtifact, StorageError> {
    let fs_path = dir.join(&name);

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&fs_path)
        .await
        .map_err(|source| match source.kind() {
            io::ErrorKind::AlreadyExists => StorageError::Collision {
                path: fs_path.clone(),
            },
            _ => StorageError::Write {
                path: fs_path.clone(),
                source,
            },
        })?;

    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;

    if let Err(source) = written {
        return Err(StorageError::Write {
            path: fs_path,
            source,
        });
    }

    tracing::debug!(path = %fs_path.display(), bytes = bytes.len(), "Artifact stored");

    Ok(StoredArtifact {
        url_path: url_join(url_prefix, &name),
        fs_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn store_in(root: &TempDir) -> ArtifactStore {
        ArtifactStore::new(ArtifactDirs {
            upload_dir: root.path().join("upload"),
            upload_url_prefix: "/static/upload".to_string(),
            audio_dir: root.path().join("audio"),
            audio_url_prefix: "/static/audio/".to_string(),
        })
    }

    #[tokio::test]
    async fn test_ensure_dirs_is_idempotent() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);

        store.ensure_dirs().await.unwrap();
        store.ensure_dirs().await.unwrap();

        assert!(root.path().join("upload").is_dir());
        assert!(root.path().join("audio").is_dir());
    }

    #[tokio::test]
    async fn test_save_audio_writes_bytes_and_url() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);
        store.ensure_dirs().await.unwrap();

        let stored = store
            .save_audio(b"ID3fake", AudioKind::Invalid)
            .await
            .unwrap();

        assert_eq!(std::fs::read(&stored.fs_path).unwrap(), b"ID3fake");
        assert!(stored.url_path.starts_with("/static/audio/audio_invalid_"));
        assert!(!stored.url_path.contains("//"));
        assert!(stored.fs_path.starts_with(root.path().join("audio")));
    }

    #[tokio::test]
    async fn test_save_upload_sanitizes_hint() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);
        store.ensure_dirs().await.unwrap();

        let stored = store
            .save_upload(b"not really a jpeg", Some("../../evil.jpg"))
            .await
            .unwrap();

        assert_eq!(stored.fs_path.parent(), Some(root.path().join("upload").as_path()));
        assert!(stored.url_path.starts_with("/static/upload/"));
        assert!(stored.url_path.ends_with("_evil.jpg"));
    }

    #[tokio::test]
    async fn test_existing_file_is_a_collision() {
        let root = TempDir::new().unwrap();
        let dir = root.path().to_path_buf();
        std::fs::write(dir.join("taken.mp3"), b"first").unwrap();

        let err = write_new(&dir, "/static/audio", "taken.mp3".to_string(), b"second")
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Collision { .. }));
        assert_eq!(std::fs::read(dir.join("taken.mp3")).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_missing_directory_is_write_error() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);

        let err = store.save_audio(b"x", AudioKind::Valid).await.unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_saves_never_collide() {
        let root = TempDir::new().unwrap();
        let store = store_in(&root);
        store.ensure_dirs().await.unwrap();

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .save_audio(format!("clip {i}").as_bytes(), AudioKind::Valid)
                        .await
                })
            })
            .collect();

        let mut urls = HashSet::new();
        for handle in handles {
            let stored = handle.await.unwrap().unwrap();
            urls.insert(stored.url_path);
        }

        assert_eq!(urls.len(), 32);
        assert_eq!(std::fs::read_dir(root.path().join("audio")).unwrap().count(), 32);
    }

    #[test]
    fn test_url_join_handles_trailing_slash() {
        assert_eq!(url_join("/static/audio/", "a.mp3"), "/static/audio/a.mp3");
        assert_eq!(url_join("/static/audio", "a.mp3"), "/static/audio/a.mp3");
    }
}
