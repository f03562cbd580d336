//! Best-effort removal of known-noise lines from diagnostic logs.
//!
//! Filtering never raises: missing files, unreadable or read-only targets and
//! non-UTF-8 content are logged and left alone. A changed file is replaced
//! atomically through a temp file in the same directory that carries the
//! original permissions. Blank lines are dropped on rewrite and the result
//! has no trailing newline. Lines split on `\n` only, so a kept line keeps
//! any `\r` it carried.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use serde_json::Value;
use tempfile::NamedTempFile;

use crate::Error;
use crate::store::SharedStore;

/// Remove every line equal to `line_to_delete` after trimming.
///
/// Returns the number of lines removed; failures count as zero.
pub fn delete_matching_lines(path: &Path, line_to_delete: &str) -> usize {
    fail_soft(path, try_delete_lines(path, &HashSet::from([line_to_delete])))
}

/// Like [`delete_matching_lines`] but surfaces the failure.
pub fn try_delete_matching_lines(path: &Path, line_to_delete: &str) -> Result<usize, Error> {
    try_delete_lines(path, &HashSet::from([line_to_delete]))
}

fn fail_soft(path: &Path, result: Result<usize, Error>) -> usize {
    result.unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "log filter skipped file");
        0
    })
}

fn try_delete_lines(path: &Path, targets: &HashSet<&str>) -> Result<usize, Error> {
    let metadata = match fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::file_access(path, e)),
    };
    if !metadata.is_file() {
        return Err(Error::file_access(path, io::Error::new(io::ErrorKind::InvalidInput, "not a regular file")));
    }
    if metadata.len() == 0 {
        return Ok(0);
    }
    if metadata.permissions().readonly() {
        return Err(Error::file_access(path, io::Error::new(io::ErrorKind::PermissionDenied, "file is read-only")));
    }

    let contents = fs::read_to_string(path).map_err(|e| Error::file_access(path, e))?;

    let mut removed = 0;
    let kept: Vec<&str> = contents
        .split('\n')
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let matched = targets.contains(line.trim());
            removed += usize::from(matched);
            !matched
        })
        .collect();
    let updated = kept.join("\n");

    if updated != contents {
        rewrite_atomic(path, &updated, metadata.permissions())?;
    }
    Ok(removed)
}

fn rewrite_atomic(path: &Path, content: &str, permissions: fs::Permissions) -> Result<(), Error> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| Error::file_access(path, e))?;
    tmp.write_all(content.as_bytes()).map_err(|e| Error::file_access(path, e))?;
    tmp.as_file().set_permissions(permissions).map_err(|e| Error::file_access(path, e))?;
    tmp.persist(path).map_err(|e| Error::file_access(path, e.error))?;
    Ok(())
}

/// Outcome of a dependency-noise pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoiseReport {
    /// Digest of the snapshot used, if any decoded.
    pub digest: Option<String>,
    /// Number of file paths in that snapshot.
    pub patterns: usize,
    pub removed: usize,
}

/// Strips recorded dependency paths out of a log file.
#[derive(Clone)]
pub struct LogFilter {
    store: Arc<dyn SharedStore>,
    table: String,
}

impl LogFilter {
    pub fn new(store: Arc<dyn SharedStore>, table: impl Into<String>) -> Self {
        Self { store, table: table.into() }
    }

    /// Remove every line of `path` naming a file from the recorded snapshot.
    ///
    /// The snapshot with the smallest digest that decodes is used; malformed
    /// ones are skipped. Equivalent to calling [`delete_matching_lines`] once
    /// per path in stored order, done in a single rewrite.
    ///
    /// # Errors
    ///
    /// `StoreUnavailable` when the dependency table cannot be read. File
    /// problems are logged, not returned.
    pub async fn remove_dependency_noise(&self, path: &Path) -> Result<NoiseReport, Error> {
        let entries = self.store.read_all(&self.table).await?;
        let Some((digest, files)) = select_snapshot(&entries) else {
            tracing::debug!(table = %self.table, "no dependency snapshot to filter with");
            return Ok(NoiseReport::default());
        };

        let patterns = files.len();
        let target = path.to_path_buf();
        let removed = tokio::task::spawn_blocking(move || {
            let targets: HashSet<&str> = files.iter().map(String::as_str).collect();
            fail_soft(&target, try_delete_lines(&target, &targets))
        })
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "log filter task did not finish");
            0
        });

        tracing::info!(path = %path.display(), %digest, removed, "removed dependency noise");
        Ok(NoiseReport { digest: Some(digest.clone()), patterns, removed })
    }
}

fn select_snapshot(entries: &BTreeMap<String, String>) -> Option<(&String, Vec<String>)> {
    entries.iter().find_map(|(digest, raw)| match decode_snapshot(digest, raw) {
        Ok(files) => Some((digest, files)),
        Err(e) => {
            tracing::warn!(error = %e, "skipping dependency snapshot");
            None
        }
    })
}

fn decode_snapshot(digest: &str, raw: &str) -> Result<Vec<String>, Error> {
    let items: Vec<Value> =
        serde_json::from_str(raw).map_err(|e| Error::MalformedSnapshot(format!("{digest}: {e}")))?;
    Ok(items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(path) => Some(path),
            other => {
                tracing::warn!(%digest, entry = %other, "ignoring non-path snapshot entry");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::path::PathBuf;
    use std::time::Duration;

    fn write_lines(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, lines.concat()).unwrap();
        path
    }

    #[test]
    fn test_delete_existing_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(
            dir.path(),
            "log.txt",
            &["Line 1\n", "Line 2\n", "Line to be deleted\n", "Line 3\n", "Line 4\n"],
        );

        assert_eq!(delete_matching_lines(&path, "Line to be deleted"), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Line 1\nLine 2\nLine 3\nLine 4");
    }

    #[test]
    fn test_delete_multiple_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "log.txt", &["Line 1\n", "Line 2\n", "DEL\n", "DEL\n", "Line 3\n"]);

        assert_eq!(delete_matching_lines(&path, "DEL"), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "Line 1\nLine 2\nLine 3");
    }

    #[test]
    fn test_delete_matches_after_trimming() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "log.txt", &["keep\n", "  DEL \t\n", "DEL\r\n", "keep too"]);

        assert_eq!(delete_matching_lines(&path, "DEL"), 2);
        assert_eq!(fs::read_to_string(&path).unwrap(), "keep\nkeep too");
    }

    #[test]
    fn test_delete_keeps_crlf_on_kept_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "log.txt", &["first\r\n", "DEL\r\n", "second\r\n"]);

        assert_eq!(delete_matching_lines(&path, "DEL"), 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "first\r\nsecond\r");
    }

    #[test]
    fn test_delete_special_characters() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(
            dir.path(),
            "log.txt",
            &[
                "Line 1\n",
                "Another line\n",
                "Line with special characters: !@#$%^&*()\n",
                "Line to be deleted\n",
                "Line with utf-8 characters: äöüß\n",
                "Final line\n",
            ],
        );

        delete_matching_lines(&path, "Line with special characters: !@#$%^&*()");
        delete_matching_lines(&path, "Line with utf-8 characters: äöüß");

        assert_eq!(fs::read_to_string(&path).unwrap(), "Line 1\nAnother line\nLine to be deleted\nFinal line");
    }

    #[test]
    fn test_delete_nonexistent_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");

        assert_eq!(delete_matching_lines(&path, "anything"), 0);
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_delete_from_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "empty.txt", &[]);

        assert_eq!(delete_matching_lines(&path, "Line to be deleted"), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn test_delete_read_only_file_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "restricted.txt", &["Line 1\n", "DEL\n"]);
        let mut permissions = fs::metadata(&path).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&path, permissions).unwrap();

        assert_eq!(delete_matching_lines(&path, "DEL"), 0);
        assert!(matches!(try_delete_matching_lines(&path, "DEL"), Err(Error::FileAccessDenied { .. })));
        assert_eq!(fs::read_to_string(&path).unwrap(), "Line 1\nDEL\n");
    }

    #[test]
    fn test_delete_without_match_does_not_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "log.txt", &["a\n", "b"]);

        assert_eq!(delete_matching_lines(&path, "zzz"), 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "a\nb");
    }

    #[test]
    fn test_delete_on_directory_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(delete_matching_lines(dir.path(), "x"), 0);
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_keeps_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "log.txt", &["a\n", "DEL\n"]);
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        delete_matching_lines(&path, "DEL");

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    async fn filter_with(snapshots: &[(&str, &str)]) -> LogFilter {
        let store = SqliteStore::open_in_memory(Duration::from_secs(100_800)).await.unwrap();
        for (digest, raw) in snapshots {
            store.write_field("included_files", digest, raw).await.unwrap();
        }
        LogFilter::new(Arc::new(store), "included_files")
    }

    #[tokio::test]
    async fn test_remove_dependency_noise() {
        let filter = filter_with(&[("aaa", r#"["/srv/app/index.php","/srv/app/boot.php"]"#)]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(
            dir.path(),
            "app.log",
            &["/srv/app/index.php\n", "real warning\n", "/srv/app/boot.php\n", "/srv/app/index.php\n"],
        );

        let report = filter.remove_dependency_noise(&path).await.unwrap();

        assert_eq!(report.digest.as_deref(), Some("aaa"));
        assert_eq!(report.patterns, 2);
        assert_eq!(report.removed, 3);
        assert_eq!(fs::read_to_string(&path).unwrap(), "real warning");
    }

    #[tokio::test]
    async fn test_remove_dependency_noise_picks_smallest_digest() {
        let filter = filter_with(&[("bbb", r#"["/b.php"]"#), ("aaa", r#"["/a.php"]"#)]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "app.log", &["/a.php\n", "/b.php\n"]);

        let report = filter.remove_dependency_noise(&path).await.unwrap();

        assert_eq!(report.digest.as_deref(), Some("aaa"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "/b.php");
    }

    #[tokio::test]
    async fn test_remove_dependency_noise_skips_malformed_snapshot() {
        let filter = filter_with(&[("aaa", "not json"), ("bbb", r#"["/b.php", 42]"#)]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "app.log", &["/b.php\n", "42\n"]);

        let report = filter.remove_dependency_noise(&path).await.unwrap();

        assert_eq!(report.digest.as_deref(), Some("bbb"));
        assert_eq!(report.patterns, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "42");
    }

    #[tokio::test]
    async fn test_remove_dependency_noise_without_snapshots() {
        let filter = filter_with(&[]).await;
        let dir = tempfile::tempdir().unwrap();
        let path = write_lines(dir.path(), "app.log", &["/a.php\n"]);

        let report = filter.remove_dependency_noise(&path).await.unwrap();

        assert_eq!(report, NoiseReport::default());
        assert_eq!(fs::read_to_string(&path).unwrap(), "/a.php\n");
    }

    #[tokio::test]
    async fn test_remove_dependency_noise_missing_log() {
        let filter = filter_with(&[("aaa", r#"["/a.php"]"#)]).await;
        let dir = tempfile::tempdir().unwrap();

        let report = filter.remove_dependency_noise(&dir.path().join("missing.log")).await.unwrap();

        assert_eq!(report.removed, 0);
    }
}
