//! Per-caller upload directories.
//!
//! Large-object parameters and batch files are uploaded ahead of the
//! statement request and referenced by a handle. A handle resolves to
//! `<upload_root>/<username>/<handle>`; both parts must be a single plain
//! path component.

use crate::error::ParameterError;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

fn is_single_component(part: &str) -> bool {
    let mut components = Path::new(part).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

impl UploadDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Upload folder of `username`.
    fn user_dir(&self, username: &str) -> Result<PathBuf, ParameterError> {
        if !is_single_component(username) {
            return Err(ParameterError::InvalidHandle {
                handle: format!("{username}/"),
            });
        }
        Ok(self.root.join(username))
    }

    /// Resolve `handle` for `username` to an existing file.
    pub async fn resolve(&self, username: &str, handle: &str) -> Result<PathBuf, ParameterError> {
        let handle = handle.trim();
        if !is_single_component(handle) {
            return Err(ParameterError::InvalidHandle {
                handle: handle.to_string(),
            });
        }

        let path = self.user_dir(username)?.join(handle);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            Ok(_) => Err(ParameterError::HandleNotFound {
                handle: handle.to_string(),
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ParameterError::HandleNotFound {
                handle: handle.to_string(),
            }),
            Err(source) => Err(ParameterError::Io { path, source }),
        }
    }
}

/// Write the HTML-decoded content of `path` to a sibling file and return
/// the sibling's path.
pub async fn decode_html_sibling(path: &Path) -> Result<PathBuf, ParameterError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ParameterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    let decoded = html_escape::decode_html_entities(&content);

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let sibling = path.with_file_name(format!("{file_name}.{}.decoded", uuid::Uuid::new_v4()));

    tokio::fs::write(&sibling, decoded.as_bytes())
        .await
        .map_err(|source| ParameterError::Io {
            path: sibling.clone(),
            source,
        })?;
    Ok(sibling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path());

        for handle in ["../secret", "/etc/passwd", "a/b", "..", ""] {
            assert!(
                matches!(
                    uploads.resolve("alice", handle).await,
                    Err(ParameterError::InvalidHandle { .. })
                ),
                "{handle:?} accepted"
            );
        }
        assert!(matches!(
            uploads.resolve("../bob", "file").await,
            Err(ParameterError::InvalidHandle { .. })
        ));
    }

    #[tokio::test]
    async fn test_resolve_existing_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let uploads = UploadDir::new(dir.path());
        std::fs::create_dir_all(dir.path().join("alice")).unwrap();
        std::fs::write(dir.path().join("alice/photo.bin"), b"\x00\x01").unwrap();

        let path = uploads.resolve("alice", "photo.bin").await.unwrap();
        assert_eq!(path, dir.path().join("alice").join("photo.bin"));

        assert!(matches!(
            uploads.resolve("bob", "photo.bin").await,
            Err(ParameterError::HandleNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_decode_html_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, "fish &amp; chips &lt;3").unwrap();

        let sibling = decode_html_sibling(&path).await.unwrap();
        assert_ne!(sibling, path);
        assert_eq!(sibling.parent(), path.parent());
        assert_eq!(std::fs::read_to_string(&sibling).unwrap(), "fish & chips <3");
    }
}
