//! An in-memory `RemoteApi` implementation used by the engine's own tests
//! and by the integration tests in `tests/`. Per `spec.md` §1 the real
//! HTTP client is out of scope for the core; this fake is the stand-in the
//! spec anticipates ("specified only through the interfaces the core
//! requires").

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::remote_api::{
    BranchId, BranchInfo, FileEntry, FileWrite, Kind, RemoteApi, RemoteError, RemoteResult,
    UserIdentity, ValId, ValInfo, ValPrivacy,
};

#[derive(Clone)]
struct FileRecord {
    kind: Kind,
    mtime_ms: i64,
    content: Vec<u8>,
}

struct BranchRecord {
    name: String,
    version: u64,
    created_at_ms: i64,
    updated_at_ms: i64,
    files: HashMap<String, FileRecord>,
}

struct ValRecord {
    info: ValInfo,
    branches: HashMap<BranchId, BranchRecord>,
}

#[derive(Default)]
struct State {
    vals: HashMap<ValId, ValRecord>,
    clock_ms: i64,
}

/// An in-memory val store. Every mutation bumps the owning branch's
/// `version` and `updated_at`, matching the remote's "version is
/// monotonically increasing per branch" invariant (§3).
pub struct FakeRemote {
    state: Mutex<State>,
    current_user: UserIdentity,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeRemote {
    pub fn new() -> Self {
        FakeRemote {
            state: Mutex::new(State::default()),
            current_user: UserIdentity {
                id: "user-1".to_string(),
                username: "tester".to_string(),
            },
        }
    }

    fn tick(state: &mut State) -> i64 {
        state.clock_ms += 1000;
        state.clock_ms
    }

    /// Create a val with a single `main` branch containing one file.
    /// Convenience for tests that don't care about the val/branch
    /// scaffolding.
    pub async fn seed_simple_val(&self, path: &str, content: &[u8]) -> (ValId, BranchId) {
        let val_id = Uuid::new_v4();
        let branch_id = Uuid::new_v4();
        let mut state = self.state.lock().await;
        let now = Self::tick(&mut state);

        let mut files = HashMap::new();
        files.insert(
            path.to_string(),
            FileRecord {
                kind: Kind::File,
                mtime_ms: now,
                content: content.to_vec(),
            },
        );

        state.vals.insert(
            val_id,
            ValRecord {
                info: ValInfo {
                    id: val_id,
                    author_id: self.current_user.id.clone(),
                    privacy: ValPrivacy::Public,
                    can_write: true,
                },
                branches: HashMap::from([(
                    branch_id,
                    BranchRecord {
                        name: "main".to_string(),
                        version: 1,
                        created_at_ms: now,
                        updated_at_ms: now,
                        files,
                    },
                )]),
            },
        );
        (val_id, branch_id)
    }

    /// Seed a val with an arbitrary set of `(path, kind, content)` entries,
    /// including directory entries (content ignored for directories).
    pub async fn seed_val(&self, entries: &[(&str, Kind, &[u8])]) -> (ValId, BranchId) {
        let val_id = Uuid::new_v4();
        let branch_id = Uuid::new_v4();
        let mut state = self.state.lock().await;
        let now = Self::tick(&mut state);

        let mut files = HashMap::new();
        for (path, kind, content) in entries {
            files.insert(
                path.to_string(),
                FileRecord {
                    kind: *kind,
                    mtime_ms: now,
                    content: content.to_vec(),
                },
            );
        }

        state.vals.insert(
            val_id,
            ValRecord {
                info: ValInfo {
                    id: val_id,
                    author_id: self.current_user.id.clone(),
                    privacy: ValPrivacy::Public,
                    can_write: true,
                },
                branches: HashMap::from([(
                    branch_id,
                    BranchRecord {
                        name: "main".to_string(),
                        version: 1,
                        created_at_ms: now,
                        updated_at_ms: now,
                        files,
                    },
                )]),
            },
        );
        (val_id, branch_id)
    }

    pub async fn set_can_write(&self, val_id: ValId, can_write: bool) {
        let mut state = self.state.lock().await;
        if let Some(val) = state.vals.get_mut(&val_id) {
            val.info.can_write = can_write;
        }
    }

    fn resolve(state: &State, val_id: ValId) -> RemoteResult<&ValRecord> {
        state
            .vals
            .get(&val_id)
            .ok_or_else(|| RemoteError::NotFound(format!("val {val_id}")))
    }

    fn resolve_mut(state: &mut State, val_id: ValId) -> RemoteResult<&mut ValRecord> {
        state
            .vals
            .get_mut(&val_id)
            .ok_or_else(|| RemoteError::NotFound(format!("val {val_id}")))
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn retrieve_val(&self, val_id: ValId) -> RemoteResult<ValInfo> {
        let state = self.state.lock().await;
        Ok(Self::resolve(&state, val_id)?.info.clone())
    }

    async fn list_branches(&self, val_id: ValId) -> RemoteResult<Vec<BranchInfo>> {
        let state = self.state.lock().await;
        let val = Self::resolve(&state, val_id)?;
        Ok(val
            .branches
            .iter()
            .map(|(id, b)| BranchInfo {
                id: *id,
                name: b.name.clone(),
                version: b.version,
                created_at_ms: b.created_at_ms,
                updated_at_ms: b.updated_at_ms,
            })
            .collect())
    }

    async fn retrieve_branch(&self, val_id: ValId, branch_id: BranchId) -> RemoteResult<BranchInfo> {
        let state = self.state.lock().await;
        let val = Self::resolve(&state, val_id)?;
        let branch = val
            .branches
            .get(&branch_id)
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch_id}")))?;
        Ok(BranchInfo {
            id: branch_id,
            name: branch.name.clone(),
            version: branch.version,
            created_at_ms: branch.created_at_ms,
            updated_at_ms: branch.updated_at_ms,
        })
    }

    async fn create_branch(
        &self,
        val_id: ValId,
        name: &str,
        forked_from_id: BranchId,
    ) -> RemoteResult<BranchInfo> {
        let mut state = self.state.lock().await;
        let now = Self::tick(&mut state);
        let val = Self::resolve_mut(&mut state, val_id)?;

        if val.branches.values().any(|b| b.name == name) {
            return Err(RemoteError::Conflict(format!("branch `{name}` already exists")));
        }
        let source_files = val
            .branches
            .get(&forked_from_id)
            .ok_or_else(|| RemoteError::NotFound(format!("branch {forked_from_id}")))?
            .files
            .clone();

        let new_id = Uuid::new_v4();
        val.branches.insert(
            new_id,
            BranchRecord {
                name: name.to_string(),
                version: 1,
                created_at_ms: now,
                updated_at_ms: now,
                files: source_files,
            },
        );
        Ok(BranchInfo {
            id: new_id,
            name: name.to_string(),
            version: 1,
            created_at_ms: now,
            updated_at_ms: now,
        })
    }

    async fn delete_branch(&self, val_id: ValId, branch_id: BranchId) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        let val = Self::resolve_mut(&mut state, val_id)?;
        val.branches
            .remove(&branch_id)
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch_id}")))?;
        Ok(())
    }

    async fn list_files(
        &self,
        val_id: ValId,
        branch_id: BranchId,
        _version: u64,
        _recursive: bool,
    ) -> RemoteResult<Vec<FileEntry>> {
        let state = self.state.lock().await;
        let val = Self::resolve(&state, val_id)?;
        let branch = val
            .branches
            .get(&branch_id)
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch_id}")))?;
        Ok(branch
            .files
            .iter()
            .map(|(path, record)| FileEntry {
                path: path.clone(),
                kind: record.kind,
                mtime_ms: record.mtime_ms,
                content: None,
            })
            .collect())
    }

    async fn get_content(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        _version: u64,
    ) -> RemoteResult<Vec<u8>> {
        let state = self.state.lock().await;
        let val = Self::resolve(&state, val_id)?;
        let branch = val
            .branches
            .get(&branch_id)
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch_id}")))?;
        branch
            .files
            .get(path)
            .map(|f| f.content.clone())
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    async fn create_file(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        write: FileWrite<'_>,
    ) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        let now = Self::tick(&mut state);
        let val = Self::resolve_mut(&mut state, val_id)?;
        let branch = val
            .branches
            .get_mut(&branch_id)
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch_id}")))?;

        if branch.files.contains_key(path) {
            return Err(RemoteError::Conflict(format!("{path} already exists")));
        }
        branch.files.insert(
            path.to_string(),
            FileRecord {
                kind: write.kind,
                mtime_ms: now,
                content: write.content.unwrap_or_default().to_vec(),
            },
        );
        branch.version += 1;
        branch.updated_at_ms = now;
        Ok(())
    }

    async fn update_file(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        write: FileWrite<'_>,
    ) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        let now = Self::tick(&mut state);
        let val = Self::resolve_mut(&mut state, val_id)?;
        let branch = val
            .branches
            .get_mut(&branch_id)
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch_id}")))?;
        let record = branch
            .files
            .get_mut(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        record.content = write.content.unwrap_or_default().to_vec();
        record.mtime_ms = now;
        branch.version += 1;
        branch.updated_at_ms = now;
        Ok(())
    }

    async fn delete_file(
        &self,
        val_id: ValId,
        path: &str,
        branch_id: BranchId,
        _version: u64,
    ) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        let now = Self::tick(&mut state);
        let val = Self::resolve_mut(&mut state, val_id)?;
        let branch = val
            .branches
            .get_mut(&branch_id)
            .ok_or_else(|| RemoteError::NotFound(format!("branch {branch_id}")))?;
        branch
            .files
            .remove(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
        branch.version += 1;
        branch.updated_at_ms = now;
        Ok(())
    }

    async fn create_val(
        &self,
        name: &str,
        privacy: ValPrivacy,
        _description: Option<&str>,
        _org_id: Option<&str>,
    ) -> RemoteResult<ValInfo> {
        let mut state = self.state.lock().await;
        let now = Self::tick(&mut state);
        let val_id = Uuid::new_v4();
        let branch_id = Uuid::new_v4();
        let info = ValInfo {
            id: val_id,
            author_id: self.current_user.id.clone(),
            privacy,
            can_write: true,
        };
        state.vals.insert(
            val_id,
            ValRecord {
                info: info.clone(),
                branches: HashMap::from([(
                    branch_id,
                    BranchRecord {
                        name: name.to_string(),
                        version: 1,
                        created_at_ms: now,
                        updated_at_ms: now,
                        files: HashMap::new(),
                    },
                )]),
            },
        );
        Ok(info)
    }

    async fn delete_val(&self, val_id: ValId) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        state
            .vals
            .remove(&val_id)
            .ok_or_else(|| RemoteError::NotFound(format!("val {val_id}")))?;
        Ok(())
    }

    async fn current_user(&self) -> RemoteResult<UserIdentity> {
        Ok(self.current_user.clone())
    }
}
