//! The engine's error taxonomy. One variant per row of the error table in
//! the design document, following the teacher's convention of a plain enum
//! with a hand-written `Display` rather than a derive-macro crate.

use std::fmt;
use std::path::PathBuf;

use crate::remote_api::RemoteError;

#[derive(Debug)]
pub enum VtError {
    NotInWorkingTree,
    NotInitialized,
    AlreadyInitialized,
    TargetNotEmpty(PathBuf),
    DirtyWorkingTree,
    BranchExists(String),
    BranchNotFound(String),
    PermissionDenied(String),
    Unauthenticated,
    RemoteUnavailable(String),
    AlreadyWatching(u32),
    Io { path: PathBuf, source: std::io::Error },
}

impl fmt::Display for VtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VtError::NotInWorkingTree => {
                write!(f, "not inside a vt working tree (no .vt/ found in any ancestor)")
            }
            VtError::NotInitialized => {
                write!(f, ".vt/state is missing or could not be parsed")
            }
            VtError::AlreadyInitialized => {
                write!(f, "this directory is already an initialized working tree")
            }
            VtError::TargetNotEmpty(path) => {
                write!(f, "target directory {} is not empty", path.display())
            }
            VtError::DirtyWorkingTree => {
                write!(f, "working tree has local changes; pass --force to discard them")
            }
            VtError::BranchExists(name) => {
                write!(f, "branch `{name}` already exists; choose another name")
            }
            VtError::BranchNotFound(name) => {
                write!(f, "branch `{name}` was not found")
            }
            VtError::PermissionDenied(msg) => {
                write!(f, "permission denied: {msg}")
            }
            VtError::Unauthenticated => {
                write!(f, "request was rejected: missing or invalid api key")
            }
            VtError::RemoteUnavailable(msg) => {
                write!(f, "remote unavailable: {msg}")
            }
            VtError::AlreadyWatching(pid) => {
                write!(f, "another process (pid {pid}) is already watching this working tree")
            }
            VtError::Io { path, source } => {
                write!(f, "I/O error at {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for VtError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VtError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<RemoteError> for VtError {
    fn from(value: RemoteError) -> Self {
        match value {
            RemoteError::NotFound(what) => {
                // A bare NotFound from the remote is only ever fatal here when the
                // caller didn't already special-case it (e.g. content-fetch-for-diff
                // treats NotFound as "deleted", not an error).
                VtError::RemoteUnavailable(format!("not found: {what}"))
            }
            RemoteError::Conflict(msg) => VtError::RemoteUnavailable(format!("conflict: {msg}")),
            RemoteError::PermissionDenied(msg) => VtError::PermissionDenied(msg),
            RemoteError::Unauthenticated => VtError::Unauthenticated,
            RemoteError::Unavailable(msg) => VtError::RemoteUnavailable(msg),
        }
    }
}

pub type VtResult<T> = Result<T, VtError>;

pub(crate) trait IoContext<T> {
    fn with_path(self, path: &std::path::Path) -> VtResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn with_path(self, path: &std::path::Path) -> VtResult<T> {
        self.map_err(|source| VtError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
