//! SyncOps (§4.5): the five public operations built on `PathClassifier`,
//! `AtomicStage`, `MetaStore`, and `Differ`.

use std::collections::BTreeSet;
use std::path::Path;

use crate::atomic_stage::{self, with_staging};
use crate::differ::{self, ChangeStatus, FileStateChanges, FileStatus};
use crate::error::{VtError, VtResult};
use crate::meta_store::{BranchRef, MetaStore, StateUpdate, ValRef, WorkingTreeState};
use crate::path_classifier::{self, IgnoreRules};
use crate::progress::{ProgressSink, SyncEvent};
use crate::remote_api::{BranchId, FileWrite, Kind, RemoteApi, RemoteError, ValId};
use crate::session::Session;

/// Fetch remote content into `dir`, recursively, skipping ignored paths.
/// Directory entries materialize as created directories; file entries are
/// fetched with bounded concurrency and written with the server's mtime.
///
/// When `classify_against_existing` is set (the `pull` case), each write is
/// compared against whatever bytes already sit at that path in `dir` so the
/// result distinguishes `created` from `modified` from `not_modified`;
/// otherwise (the `clone` case) every written file is unconditionally
/// `created`, per §4.5.
#[allow(clippy::too_many_arguments)]
async fn materialize_remote(
    dir: &Path,
    remote: &dyn RemoteApi,
    val_id: ValId,
    branch_id: BranchId,
    version: u64,
    ignore_rules: &IgnoreRules,
    classify_against_existing: bool,
    progress: &dyn ProgressSink,
) -> VtResult<FileStateChanges> {
    progress.on_event(SyncEvent::Scanning);
    let entries = remote.list_files(val_id, branch_id, version, true).await?;

    let mut changes = FileStateChanges::default();
    for entry in &entries {
        let rel = Path::new(&entry.path);
        if entry.kind.is_directory() {
            if ignore_rules.is_ignored(rel, true) {
                continue;
            }
            std::fs::create_dir_all(dir.join(rel)).ok();
            continue;
        }
        if ignore_rules.is_ignored(rel, false) {
            continue;
        }

        progress.on_event(SyncEvent::Fetching(entry.path.clone()));
        let content = remote
            .get_content(val_id, &entry.path, branch_id, version)
            .await?;
        let dest = dir.join(rel);

        let status = if classify_against_existing {
            match std::fs::read(&dest) {
                Ok(existing) if existing == content => ChangeStatus::NotModified,
                Ok(_) => ChangeStatus::Modified,
                Err(_) => ChangeStatus::Created,
            }
        } else {
            ChangeStatus::Created
        };

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        std::fs::write(&dest, &content).map_err(|source| VtError::Io {
            path: dest.clone(),
            source,
        })?;
        atomic_stage::set_mtime_ms(&dest, entry.mtime_ms)?;

        let status_entry = FileStatus {
            path: entry.path.clone(),
            kind: entry.kind,
            status,
        };
        match status {
            ChangeStatus::Created => changes.created.push(status_entry),
            ChangeStatus::Modified => changes.modified.push(status_entry),
            ChangeStatus::NotModified => changes.not_modified.push(status_entry),
            ChangeStatus::Deleted => unreachable!(),
        }
    }

    remove_empty_dirs(dir);
    Ok(changes)
}

fn remove_empty_dirs(root: &Path) {
    fn visit(dir: &Path) -> bool {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return false;
        };
        let mut is_empty = true;
        for entry in entries.flatten() {
            let path = entry.path();
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                if visit(&path) {
                    let _ = std::fs::remove_dir(&path);
                } else {
                    is_empty = false;
                }
            } else {
                is_empty = false;
            }
        }
        is_empty
    }
    visit(root);
}

fn is_dir_nonempty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut it| it.next().is_some())
        .unwrap_or(false)
}

pub struct CloneRequest {
    pub val_id: ValId,
    pub branch_id: BranchId,
    pub version: Option<u64>,
    pub dry_run: bool,
    pub upload_existing: bool,
}

/// `clone` (§4.5): materialize a remote branch into a (typically empty or
/// nonexistent) target directory and anchor it with a fresh `.vt/state`.
pub async fn clone(
    target_dir: &Path,
    remote: &dyn RemoteApi,
    request: CloneRequest,
    progress: &dyn ProgressSink,
) -> VtResult<FileStateChanges> {
    let already_working_tree = target_dir.join(".vt").is_dir();
    if already_working_tree {
        return Err(VtError::AlreadyInitialized);
    }
    if target_dir.exists() && is_dir_nonempty(target_dir) && !request.upload_existing {
        return Err(VtError::TargetNotEmpty(target_dir.to_path_buf()));
    }

    let CloneRequest {
        val_id,
        branch_id,
        version,
        dry_run,
        upload_existing: _,
    } = request;

    let branch = remote.retrieve_branch(val_id, branch_id).await?;
    let version = version.unwrap_or(branch.version);
    let ignore_rules = IgnoreRules::build(target_dir, std::iter::empty());

    let (changes, _report) = with_staging(target_dir, "vt-clone", move |staging| async move {
        let changes = materialize_remote(
            &staging,
            remote,
            val_id,
            branch_id,
            version,
            &ignore_rules,
            false,
            progress,
        )
        .await?;
        Ok((changes, !dry_run))
    })
    .await?;

    if !dry_run {
        let meta = MetaStore::new(target_dir.to_path_buf());
        meta.init_state(&WorkingTreeState {
            val: ValRef { id: val_id },
            branch: BranchRef { id: branch_id, version },
            last_run: None,
        })?;
    }

    Ok(changes)
}

/// `status` (§4.5): a dry run of `push` — the changes a push would apply,
/// with no writes performed. Also used by `pull`/`checkout` to test
/// dirtiness.
pub async fn status(session: &Session) -> VtResult<FileStateChanges> {
    let meta = MetaStore::new(session.root.clone());
    let state = meta.get_state()?;
    let ignore_rules = meta.load_ignore_rules()?;
    differ::diff(
        &session.root,
        &ignore_rules,
        session.remote.as_ref(),
        state.val.id,
        state.branch.id,
        state.branch.version,
    )
    .await
}

pub struct PullOutcome {
    pub changes: FileStateChanges,
    /// `false` when a dirty tree blocked the pull (§4.5's dirty-tree
    /// policy) — `changes` then holds the diagnostic diff `status` would
    /// have reported, and nothing was written.
    pub applied: bool,
}

/// `pull` (§4.5). Refuses to discard local changes unless `force` is set;
/// see `PullOutcome::applied`.
pub async fn pull(
    session: &Session,
    dry_run: bool,
    force: bool,
    progress: &dyn ProgressSink,
) -> VtResult<PullOutcome> {
    let meta = MetaStore::new(session.root.clone());
    let state = meta.get_state()?;
    let ignore_rules = meta.load_ignore_rules()?;

    if !force {
        let dirty = differ::diff(
            &session.root,
            &ignore_rules,
            session.remote.as_ref(),
            state.val.id,
            state.branch.id,
            state.branch.version,
        )
        .await?;
        if !dirty.created.is_empty() || !dirty.modified.is_empty() {
            return Ok(PullOutcome {
                changes: dirty,
                applied: false,
            });
        }
    }

    let branch = session
        .remote
        .retrieve_branch(state.val.id, state.branch.id)
        .await?;
    let target_version = branch.version;
    let root = session.root.clone();
    let remote = session.remote.clone();
    let val_id = state.val.id;
    let branch_id = state.branch.id;

    let pre_existing_paths = list_non_ignored_files(&root, &ignore_rules);

    let (changes, _report) = with_staging(&root, "vt-pull", move |staging| {
        let ignore_rules = IgnoreRules::build(&staging, std::iter::empty());
        async move {
            let mut changes = materialize_remote(
                &staging,
                remote.as_ref(),
                val_id,
                branch_id,
                target_version,
                &ignore_rules,
                true,
                progress,
            )
            .await?;

            let remote_paths: std::collections::HashSet<String> = remote
                .list_files(val_id, branch_id, target_version, true)
                .await?
                .into_iter()
                .filter(|e| !e.kind.is_directory())
                .map(|e| e.path)
                .collect();

            for path in &pre_existing_paths {
                if remote_paths.contains(path) {
                    continue;
                }
                let staged_path = staging.join(path);
                let kind = path_classifier::infer_kind(Path::new(path), None);
                progress.on_event(SyncEvent::Deleting(path.clone()));
                let _ = std::fs::remove_file(&staged_path);
                changes.deleted.push(FileStatus {
                    path: path.clone(),
                    kind,
                    status: ChangeStatus::Deleted,
                });
            }

            Ok((changes, !dry_run))
        }
    })
    .await?;

    if !dry_run {
        for deleted in &changes.deleted {
            let _ = std::fs::remove_file(session.root.join(&deleted.path));
        }
        meta.update_state(StateUpdate {
            branch_version: Some(target_version),
            ..Default::default()
        })?;
    }

    Ok(PullOutcome {
        changes,
        applied: true,
    })
}

fn list_non_ignored_files(root: &Path, ignore_rules: &IgnoreRules) -> Vec<String> {
    let mut out = Vec::new();
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
                out.push(differ::path_to_posix(rel));
            }
        }
    }
    out
}

/// `push` (§4.5). Accepts a precomputed diff (e.g. from `status`) or
/// computes one itself.
pub async fn push(
    session: &Session,
    dry_run: bool,
    precomputed: Option<FileStateChanges>,
    progress: &dyn ProgressSink,
) -> VtResult<FileStateChanges> {
    let meta = MetaStore::new(session.root.clone());
    let state = meta.get_state()?;

    let val_info = session.remote.retrieve_val(state.val.id).await?;
    if !val_info.can_write {
        return Err(VtError::PermissionDenied(
            "current user cannot write to this val".to_string(),
        ));
    }

    let changes = match precomputed {
        Some(changes) => changes,
        None => status(session).await?,
    };

    if dry_run {
        return Ok(changes);
    }

    let mut changes = changes;

    for deleted in &changes.deleted {
        progress.on_event(SyncEvent::Deleting(deleted.path.clone()));
        match session
            .remote
            .delete_file(state.val.id, &deleted.path, state.branch.id, state.branch.version)
            .await
        {
            Ok(()) => {}
            Err(RemoteError::NotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    for modified in &changes.modified {
        progress.on_event(SyncEvent::Uploading(modified.path.clone()));
        let bytes = std::fs::read(session.root.join(&modified.path)).map_err(|source| VtError::Io {
            path: session.root.join(&modified.path),
            source,
        })?;
        let name = basename(&modified.path);
        match session
            .remote
            .update_file(
                state.val.id,
                &modified.path,
                state.branch.id,
                FileWrite {
                    name: &name,
                    kind: modified.kind,
                    content: Some(&bytes),
                },
            )
            .await
        {
            Ok(()) => {}
            Err(RemoteError::Conflict(msg)) => {
                changes.warnings.push(format!("{}: {msg}", modified.path));
            }
            Err(err) => return Err(err.into()),
        }
    }

    let needed_dirs: BTreeSet<String> = changes
        .created
        .iter()
        .filter(|c| !c.kind.is_directory())
        .flat_map(|c| parent_chain(&c.path))
        .collect();
    for dir in &needed_dirs {
        let name = basename(dir);
        match session
            .remote
            .create_file(
                state.val.id,
                dir,
                state.branch.id,
                FileWrite {
                    name: &name,
                    kind: Kind::Directory,
                    content: None,
                },
            )
            .await
        {
            Ok(()) | Err(RemoteError::Conflict(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }

    for created in &changes.created {
        if created.kind.is_directory() {
            continue;
        }
        progress.on_event(SyncEvent::Uploading(created.path.clone()));
        let bytes = std::fs::read(session.root.join(&created.path)).map_err(|source| VtError::Io {
            path: session.root.join(&created.path),
            source,
        })?;
        let name = basename(&created.path);
        match session
            .remote
            .create_file(
                state.val.id,
                &created.path,
                state.branch.id,
                FileWrite {
                    name: &name,
                    kind: created.kind,
                    content: Some(&bytes),
                },
            )
            .await
        {
            Ok(()) => {}
            Err(RemoteError::Conflict(msg)) => {
                changes.warnings.push(format!("{}: {msg}", created.path));
            }
            Err(err) => return Err(err.into()),
        }
    }

    let latest = session
        .remote
        .retrieve_branch(state.val.id, state.branch.id)
        .await?;
    meta.update_state(StateUpdate {
        branch_version: Some(latest.version),
        ..Default::default()
    })?;

    Ok(changes)
}

fn parent_chain(path: &str) -> Vec<String> {
    let mut parts: Vec<&str> = path.split('/').collect();
    parts.pop();
    let mut acc = Vec::new();
    let mut cur = String::new();
    for part in parts {
        if !cur.is_empty() {
            cur.push('/');
        }
        cur.push_str(part);
        acc.push(cur.clone());
    }
    acc
}

fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

pub enum CheckoutTarget {
    Existing { name: String },
    NewBranch { name: String, forked_from: BranchId },
}

/// `checkout` (§4.5): the branch state machine — fetch-target then apply,
/// with a hard dirty-tree gate unless `force` is passed (unlike `pull`,
/// which degrades to a diagnostic return, checkout's gate is a genuine
/// error: there is no "would-be changes" to show since the entire tree is
/// being replaced).
pub async fn checkout(
    session: &Session,
    target: CheckoutTarget,
    force: bool,
    progress: &dyn ProgressSink,
) -> VtResult<FileStateChanges> {
    let meta = MetaStore::new(session.root.clone());
    let state = meta.get_state()?;

    if !force {
        let dirty = status(session).await?;
        if !dirty.created.is_empty() || !dirty.modified.is_empty() {
            return Err(VtError::DirtyWorkingTree);
        }
    }

    let branch_id = match target {
        CheckoutTarget::Existing { name } => {
            let branches = session.remote.list_branches(state.val.id).await?;
            branches
                .into_iter()
                .find(|b| b.name == name)
                .map(|b| b.id)
                .ok_or(VtError::BranchNotFound(name))?
        }
        CheckoutTarget::NewBranch { name, forked_from } => {
            match session
                .remote
                .create_branch(state.val.id, &name, forked_from)
                .await
            {
                Ok(branch) => branch.id,
                Err(RemoteError::Conflict(_)) => return Err(VtError::BranchExists(name)),
                Err(err) => return Err(err.into()),
            }
        }
    };

    let branch = session.remote.retrieve_branch(state.val.id, branch_id).await?;
    let version = branch.version;
    let ignore_rules = meta.load_ignore_rules()?;

    let existing_paths = list_non_ignored_files(&session.root, &ignore_rules);
    let root = session.root.clone();
    let remote = session.remote.clone();
    let val_id = state.val.id;

    let (changes, _report) = with_staging(&root, "vt-checkout", move |staging| {
        let ignore_rules = IgnoreRules::build(&staging, std::iter::empty());
        async move {
            // A plain checkout replaces the whole tree, so every existing
            // file is cleared from the scratch copy before remote content
            // is written back in.
            for path in &existing_paths {
                let _ = std::fs::remove_file(staging.join(path));
            }
            let changes = materialize_remote(
                &staging, remote.as_ref(), val_id, branch_id, version, &ignore_rules, false, progress,
            )
            .await?;
            Ok(((changes, existing_paths), true))
        }
    })
    .await?;
    let (changes, existing_paths) = changes;

    // `with_staging`'s copy-back is additive: it never deletes a real-tree
    // path absent from the staged copy. A path that existed before checkout
    // and isn't part of the new branch's listing has to be removed here.
    let new_paths: std::collections::HashSet<&str> = changes
        .created
        .iter()
        .chain(changes.modified.iter())
        .chain(changes.not_modified.iter())
        .map(|f| f.path.as_str())
        .collect();
    for path in &existing_paths {
        if !new_paths.contains(path.as_str()) {
            let _ = std::fs::remove_file(session.root.join(path));
        }
    }

    meta.update_state(StateUpdate {
        branch_id: Some(branch_id),
        branch_version: Some(version),
        ..Default::default()
    })?;

    Ok(changes)
}

/// `delete` — teardown of the local working tree binding plus, unless the
/// caller only wants the local unbind, the remote val itself (§3, §6's
/// `delete [-f]` command).
pub async fn delete_working_tree(session: &Session, delete_remote: bool, force: bool) -> VtResult<()> {
    if !force {
        let dirty = status(session).await?;
        if !dirty.created.is_empty() || !dirty.modified.is_empty() {
            return Err(VtError::DirtyWorkingTree);
        }
    }
    let meta = MetaStore::new(session.root.clone());
    let state = meta.get_state()?;
    if delete_remote {
        session.remote.delete_val(state.val.id).await?;
    }
    meta.delete()
}

