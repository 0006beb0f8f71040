//! The `RemoteApi` contract (§6). This is the one required collaborator the
//! engine never implements a concrete production client for — per
//! `spec.md` §1, the real HTTP client is explicitly out of scope. What
//! lives here is the trait itself, the shapes it trades in, and the error
//! taxonomy it reports through; `vt-cli` supplies a real implementation,
//! `vt_core::testing` supplies an in-memory one for the engine's own
//! tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type ValId = Uuid;
pub type BranchId = Uuid;

/// The semantic type of a file on the remote. `Directory` entries carry no
/// content and never appear in a push payload (§3 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Directory,
    File,
    Script,
    Http,
    Email,
    Interval,
}

impl Kind {
    pub fn is_directory(self) -> bool {
        matches!(self, Kind::Directory)
    }
}

/// Shared shape used for both the remote listing and the local working-tree
/// scan, per §3.
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// POSIX-style path relative to the working-tree root.
    pub path: String,
    pub kind: Kind,
    /// Unix time in milliseconds: server `updated_at` on the remote side,
    /// filesystem mtime on the local side.
    pub mtime_ms: i64,
    /// Present only when the caller asked for content (listings are
    /// metadata-only by default, per §3).
    pub content: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct BranchInfo {
    pub id: BranchId,
    pub name: String,
    pub version: u64,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct ValInfo {
    pub id: ValId,
    pub author_id: String,
    pub privacy: ValPrivacy,
    pub can_write: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValPrivacy {
    Public,
    Private,
    Unlisted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: String,
    pub username: String,
}

/// A write payload for `create_file` / `update_file`. `name` is the
/// basename, kept distinct from `path` because the remote API addresses
/// files by full path but stores a display name separately.
#[derive(Debug, Clone)]
pub struct FileWrite<'a> {
    pub name: &'a str,
    pub kind: Kind,
    pub content: Option<&'a [u8]>,
}

/// The taxonomy every `RemoteApi` method reports through (§6). This is the
/// boundary where transport-level detail (HTTP status codes, timeouts)
/// becomes a structured sum type, rather than the source's
/// `error.status === 409` duck-typing called out in §9.
#[derive(Debug, Clone)]
pub enum RemoteError {
    NotFound(String),
    Conflict(String),
    PermissionDenied(String),
    Unauthenticated,
    Unavailable(String),
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::NotFound(what) => write!(f, "not found: {what}"),
            RemoteError::Conflict(msg) => write!(f, "conflict: {msg}"),
            RemoteError::PermissionDenied(msg) => write!(f, "permission denied: {msg}"),
            RemoteError::Unauthenticated => write!(f, "unauthenticated"),
            RemoteError::Unavailable(msg) => write!(f, "remote unavailable: {msg}"),
        }
    }
}

impl std::error::Error for RemoteError {}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// The capability set `spec.md` §6 requires of the remote. Every method may
/// fail per the `RemoteError` taxonomy above; `RemoteError::NotFound` on
/// `get_content` in particular is how the Differ (§4.4) learns a remote
/// file vanished between listing and fetch.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn retrieve_val(&self, val_id: ValId) -> RemoteResult<ValInfo>;
    async fn list_branches(&self, val_id: ValId) -> RemoteResult<Vec<BranchInfo>>;
    async fn retrieve_branch(&self, val_id: ValId, branch_id: BranchId) -> RemoteResult<BranchInfo>;
    async fn create_branch(
        &self,
        val_id: ValId,
        name: &str,
        forked_from_id: BranchId,
    ) -> RemoteResult<BranchInfo>;
    async fn delete_branch(&self, val_id: ValId, branch_id: BranchId) -> RemoteResult<()>;

    /// `recursive = true` returns every file under the root; directory
    /// entries are included (the Differ discards them per §4.4 step 2).
    async fn list_files(
        &self,
        val_id: ValId,
        branch_id: BranchId,
        version: u64,
        recursive: bool,
    ) -> RemoteResult<Vec<FileEntry>>;

    async fn get_content(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        version: u64,
    ) -> RemoteResult<Vec<u8>>;

    async fn create_file(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        write: FileWrite<'_>,
    ) -> RemoteResult<()>;

    async fn update_file(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        write: FileWrite<'_>,
    ) -> RemoteResult<()>;

    async fn delete_file(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        version: u64,
    ) -> RemoteResult<()>;

    async fn create_val(
        &self,
        name: &str,
        privacy: ValPrivacy,
        description: Option<&str>,
        org_id: Option<&str>,
    ) -> RemoteResult<ValInfo>;

    async fn delete_val(&self, val_id: ValId) -> RemoteResult<()>;

    async fn current_user(&self) -> RemoteResult<UserIdentity>;
}
