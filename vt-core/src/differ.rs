//! Differ (§4.4): computes a `FileStateChanges` between a working tree and
//! a remote snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::VtResult;
use crate::path_classifier::{self, IgnoreRules};
use crate::remote_api::{BranchId, Kind, RemoteApi, RemoteError, ValId};

/// Bounded fan-out width for local stat calls (§4.4 step 1, §5).
const STAT_CONCURRENCY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeStatus {
    Created,
    Modified,
    Deleted,
    NotModified,
}

#[derive(Debug, Clone)]
pub struct FileStatus {
    pub path: String,
    pub kind: Kind,
    pub status: ChangeStatus,
}

/// The four-way partition produced by every diff, plus a side channel for
/// non-fatal warnings (§7: per-file 409s, copy-back failures) that the
/// caller decides whether to treat as success or failure.
#[derive(Debug, Clone, Default)]
pub struct FileStateChanges {
    pub created: Vec<FileStatus>,
    pub modified: Vec<FileStatus>,
    pub deleted: Vec<FileStatus>,
    pub not_modified: Vec<FileStatus>,
    pub warnings: Vec<String>,
}

impl FileStateChanges {
    pub fn is_clean(&self) -> bool {
        self.created.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    /// Collapse `(created=path) ∧ (deleted=path)` into a single `modified`
    /// entry (§3: "the comparison algorithm can report a rename-of-case or
    /// a retyped val as both").
    fn collapse_renames(mut self) -> Self {
        let deleted_paths: std::collections::HashSet<String> =
            self.deleted.iter().map(|f| f.path.clone()).collect();

        let mut still_created = Vec::new();
        for created in self.created {
            if deleted_paths.contains(&created.path) {
                self.modified.push(FileStatus {
                    status: ChangeStatus::Modified,
                    ..created
                });
            } else {
                still_created.push(created);
            }
        }
        self.created = still_created;

        let collapsed_paths: std::collections::HashSet<String> =
            self.modified.iter().map(|f| f.path.clone()).collect();
        self.deleted.retain(|f| !collapsed_paths.contains(&f.path));

        self
    }
}

struct LocalEntry {
    path: String,
    abs_path: PathBuf,
    mtime_ms: i64,
}

/// Scan `root` for non-ignored regular files, fetching each file's mtime
/// with `STAT_CONCURRENCY` stats in flight at once.
async fn scan_working_tree(root: &Path, ignore_rules: &IgnoreRules) -> VtResult<Vec<LocalEntry>> {
    let mut candidates = Vec::new();
    let mut queue = vec![root.to_path_buf()];
    while let Some(dir) = queue.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(rel) = path.strip_prefix(root) else {
                continue;
            };
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if ignore_rules.is_ignored(rel, true) {
                    continue;
                }
                queue.push(path);
            } else if file_type.is_file() {
                if ignore_rules.is_ignored(rel, false) {
                    continue;
                }
                candidates.push((rel.to_path_buf(), path));
            }
        }
    }

    let semaphore = Arc::new(Semaphore::new(STAT_CONCURRENCY));
    let mut tasks = Vec::with_capacity(candidates.len());
    for (rel, abs) in candidates {
        let semaphore = semaphore.clone();
        tasks.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let mtime_ms = tokio::task::spawn_blocking(move || stat_mtime_ms(&abs)).await;
            (rel, mtime_ms)
        }));
    }

    let mut entries = Vec::new();
    for task in tasks {
        if let Ok((rel, Ok(Ok((abs_path, mtime_ms))))) = task.await {
            entries.push(LocalEntry {
                path: path_to_posix(&rel),
                abs_path,
                mtime_ms,
            });
        }
    }
    Ok(entries)
}

fn stat_mtime_ms(path: &Path) -> std::io::Result<(PathBuf, i64)> {
    let meta = std::fs::metadata(path)?;
    let modified = meta.modified()?;
    let millis = modified
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok((path.to_path_buf(), millis))
}

pub fn path_to_posix(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Compute the changes between the working tree at `root` and the remote
/// listing for `(val_id, branch_id, version)`, per the five-step algorithm
/// in §4.4.
pub async fn diff(
    root: &Path,
    ignore_rules: &IgnoreRules,
    remote: &dyn RemoteApi,
    val_id: ValId,
    branch_id: BranchId,
    version: u64,
) -> VtResult<FileStateChanges> {
    let local_entries = scan_working_tree(root, ignore_rules).await?;
    let remote_entries = remote
        .list_files(val_id, branch_id, version, true)
        .await?;

    let remote_by_path: HashMap<String, (i64, Kind)> = remote_entries
        .iter()
        .filter(|e| !e.kind.is_directory())
        .map(|e| (e.path.clone(), (e.mtime_ms, e.kind)))
        .collect();

    let mut changes = FileStateChanges::default();
    let mut seen_locally: std::collections::HashSet<String> = std::collections::HashSet::new();

    for local in &local_entries {
        seen_locally.insert(local.path.clone());

        match remote_by_path.get(&local.path) {
            None => {
                let kind = path_classifier::infer_kind(Path::new(&local.path), None);
                changes.created.push(FileStatus {
                    path: local.path.clone(),
                    kind,
                    status: ChangeStatus::Created,
                });
            }
            Some((remote_mtime, remote_kind)) => {
                // Strict `>` per the Open Question in §9: equal mtimes after
                // a round-trip are treated as unchanged.
                if local.mtime_ms <= *remote_mtime {
                    changes.not_modified.push(FileStatus {
                        path: local.path.clone(),
                        kind: *remote_kind,
                        status: ChangeStatus::NotModified,
                    });
                    continue;
                }

                let local_bytes = std::fs::read(&local.abs_path).unwrap_or_default();
                match remote
                    .get_content(val_id, &local.path, branch_id, version)
                    .await
                {
                    Ok(remote_bytes) if remote_bytes == local_bytes => {
                        changes.not_modified.push(FileStatus {
                            path: local.path.clone(),
                            kind: *remote_kind,
                            status: ChangeStatus::NotModified,
                        });
                    }
                    Ok(_) => {
                        changes.modified.push(FileStatus {
                            path: local.path.clone(),
                            kind: *remote_kind,
                            status: ChangeStatus::Modified,
                        });
                    }
                    Err(RemoteError::NotFound(_)) => {
                        // Vanished between listing and fetch: treat as created.
                        let kind = path_classifier::infer_kind(Path::new(&local.path), None);
                        changes.created.push(FileStatus {
                            path: local.path.clone(),
                            kind,
                            status: ChangeStatus::Created,
                        });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    for (path, (_, kind)) in &remote_by_path {
        if !seen_locally.contains(path) {
            changes.deleted.push(FileStatus {
                path: path.clone(),
                kind: *kind,
                status: ChangeStatus::Deleted,
            });
        }
    }

    Ok(changes.collapse_renames())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRemote;

    #[tokio::test]
    async fn clone_then_diff_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let remote = FakeRemote::new();
        let (val_id, branch_id) = remote.seed_simple_val("hello.txt", b"hi").await;
        std::fs::write(dir.path().join("hello.txt"), b"hi").unwrap();
        // Make the local mtime clearly newer than the remote's so the
        // content-check path (not just the mtime fast path) is exercised.
        let far_future = filetime::FileTime::from_unix_time(32_503_680_000, 0);
        filetime::set_file_mtime(dir.path().join("hello.txt"), far_future).unwrap();

        let ignore_rules = IgnoreRules::empty();
        let changes = diff(dir.path(), &ignore_rules, &remote, val_id, branch_id, 1)
            .await
            .unwrap();

        assert!(changes.created.is_empty());
        assert!(changes.modified.is_empty());
        assert!(changes.deleted.is_empty());
        assert_eq!(changes.not_modified.len(), 1);
    }

    #[tokio::test]
    async fn created_and_deleted_same_path_collapses_to_modified() {
        let mut changes = FileStateChanges::default();
        changes.created.push(FileStatus {
            path: "a.txt".into(),
            kind: Kind::File,
            status: ChangeStatus::Created,
        });
        changes.deleted.push(FileStatus {
            path: "a.txt".into(),
            kind: Kind::File,
            status: ChangeStatus::Deleted,
        });

        let collapsed = changes.collapse_renames();
        assert!(collapsed.created.is_empty());
        assert!(collapsed.deleted.is_empty());
        assert_eq!(collapsed.modified.len(), 1);
    }
}
