//! Crash-safe artifact commits: write to a temporary path, then rename.
//!
//! Any observer that sees a file at the final path sees a complete,
//! validated artifact. Partial writes from interrupted transfers never
//! become visible under the final name.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Returns the temporary sibling path used while writing `final_path`.
///
/// Lives in the same directory (and therefore the same filesystem volume)
/// so the final rename is a single atomic operation.
#[must_use]
pub fn part_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map_or_else(|| "artifact".into(), std::ffi::OsStr::to_os_string);
    name.push(".part");
    final_path.with_file_name(name)
}

/// Writes `bytes` to a temporary sibling of `final_path`, flushes and syncs,
/// then renames into place.
///
/// On any failure the temporary file is removed best-effort and the final
/// path is left untouched.
///
/// # Errors
///
/// Returns the underlying I/O error from create, write, sync, or rename.
pub async fn commit(bytes: &[u8], final_path: &Path) -> io::Result<()> {
    let tmp = part_path(final_path);

    let result = write_and_rename(bytes, &tmp, final_path).await;
    if result.is_err() {
        debug!(path = %tmp.display(), "removing partial file after write error");
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    result
}

async fn write_and_rename(bytes: &[u8], tmp: &Path, final_path: &Path) -> io::Result<()> {
    let mut file = File::create(tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    // Data must be durable before the rename makes it visible.
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(tmp, final_path).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_part_path_appends_suffix() {
        let path = Path::new("/data/NDSS/2024/papers/study.pdf");
        assert_eq!(
            part_path(path),
            PathBuf::from("/data/NDSS/2024/papers/study.pdf.part")
        );
    }

    #[tokio::test]
    async fn test_commit_writes_complete_file() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("paper.pdf");

        commit(b"%PDF-1.7 content", &final_path).await.unwrap();

        let written = tokio::fs::read(&final_path).await.unwrap();
        assert_eq!(written, b"%PDF-1.7 content");
    }

    #[tokio::test]
    async fn test_commit_leaves_no_part_file() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("paper.pdf");

        commit(b"%PDF-1.7 content", &final_path).await.unwrap();

        assert!(!part_path(&final_path).exists());
    }

    #[tokio::test]
    async fn test_commit_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("paper.pdf");
        tokio::fs::write(&final_path, b"old").await.unwrap();

        commit(b"new content", &final_path).await.unwrap();

        let written = tokio::fs::read(&final_path).await.unwrap();
        assert_eq!(written, b"new content");
    }

    #[tokio::test]
    async fn test_commit_into_missing_directory_fails_cleanly() {
        let dir = TempDir::new().unwrap();
        let final_path = dir.path().join("missing").join("paper.pdf");

        let result = commit(b"content", &final_path).await;

        assert!(result.is_err());
        assert!(!final_path.exists());
        assert!(!part_path(&final_path).exists());
    }
}
