//! Knowledge loader - reference files seeded into worker context
//!
//! Used once at startup: scan a data directory, upload each file through
//! the oracle side, and hand the resulting remote ids to the root worker.

use std::io;
use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::PhalanxError;
use crate::protocol::RemoteFileId;

/// Uploads a local file for use as worker context.
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<RemoteFileId, PhalanxError>;
}

/// List regular files in a directory, optionally filtered by extension.
///
/// The filter matches with or without a leading dot (`"md"` and `".md"`
/// are equivalent). Subdirectories are not descended into.
pub fn list_files(dir: &Path, extension: Option<&str>) -> io::Result<Vec<PathBuf>> {
    let wanted = extension.map(|e| e.trim_start_matches('.'));

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if let Some(wanted) = wanted {
            let matches = path
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case(wanted))
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }
        info!(path = %path.display(), "Found knowledge file");
        paths.push(path);
    }
    paths.sort();
    Ok(paths)
}

/// Scan a directory and upload everything in it.
///
/// A file that fails to upload is skipped with a warning; the rest of the
/// context still seeds.
pub async fn seed_context(
    uploader: &dyn Uploader,
    dir: &Path,
    extension: Option<&str>,
) -> Vec<RemoteFileId> {
    let paths = match list_files(dir, extension) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Could not scan knowledge directory");
            return Vec::new();
        }
    };

    let mut ids = Vec::with_capacity(paths.len());
    for path in paths {
        match uploader.upload(&path).await {
            Ok(id) => ids.push(id),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Upload failed, skipping file");
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(dir: &Path) {
        std::fs::write(dir.join("notes.md"), "notes").unwrap();
        std::fs::write(dir.join("data.csv"), "a,b").unwrap();
        std::fs::write(dir.join("more.md"), "more").unwrap();
        std::fs::create_dir(dir.join("sub")).unwrap();
    }

    #[test]
    fn test_list_all_files() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let paths = list_files(dir.path(), None).unwrap();
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_list_with_extension_filter() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let paths = list_files(dir.path(), Some(".md")).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths.iter().all(|p| p.extension().unwrap() == "md"));

        // Dotless form is equivalent
        let paths = list_files(dir.path(), Some("md")).unwrap();
        assert_eq!(paths.len(), 2);
    }

    #[test]
    fn test_list_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(list_files(&missing, None).is_err());
    }

    struct FlakyUploader;

    #[async_trait]
    impl Uploader for FlakyUploader {
        async fn upload(&self, path: &Path) -> Result<RemoteFileId, PhalanxError> {
            if path.extension().map(|e| e == "csv").unwrap_or(false) {
                return Err(PhalanxError::OracleUnavailable("upload refused".into()));
            }
            Ok(RemoteFileId(format!("file-{}", path.file_name().unwrap().to_string_lossy())))
        }
    }

    #[tokio::test]
    async fn test_seed_context_skips_failed_uploads() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let ids = seed_context(&FlakyUploader, dir.path(), None).await;
        assert_eq!(ids.len(), 2);
        assert!(ids.iter().all(|id| id.0.starts_with("file-")));
    }

    #[tokio::test]
    async fn test_seed_context_missing_directory_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ids = seed_context(&FlakyUploader, &dir.path().join("nope"), None).await;
        assert!(ids.is_empty());
    }
}
