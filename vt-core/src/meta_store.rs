//! MetaStore (§4.3): reads and writes `.vt/state`, and loads the merged
//! `.vtignore` rule set for a working tree.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{IoContext, VtError, VtResult};
use crate::path_classifier::{IgnoreRules, MAX_WALK_UP_LEVELS};

const STATE_DIR: &str = ".vt";
const STATE_FILE: &str = "state";
const IGNORE_FILE_NAME: &str = ".vtignore";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValRef {
    pub id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchRef {
    pub id: Uuid,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastRun {
    pub pid: u32,
    pub time: DateTime<Utc>,
}

/// The contents of `.vt/state` (§3): which val/branch/version this
/// directory is bound to, plus advisory last-run bookkeeping used for the
/// watcher's cooperative single-instance check (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingTreeState {
    pub val: ValRef,
    pub branch: BranchRef,
    #[serde(rename = "lastRun", skip_serializing_if = "Option::is_none")]
    pub last_run: Option<LastRun>,
}

/// A partial update applied over the current state by `update_state`.
/// Every field is optional; present fields win.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    pub branch_id: Option<Uuid>,
    pub branch_version: Option<u64>,
    pub last_run: Option<LastRun>,
}

pub struct MetaStore {
    root: PathBuf,
}

impl MetaStore {
    pub fn new(root: PathBuf) -> Self {
        MetaStore { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn state_path(&self) -> PathBuf {
        self.root.join(STATE_DIR).join(STATE_FILE)
    }

    /// Climb at most `MAX_WALK_UP_LEVELS` parents from `start` looking for a
    /// directory containing `.vt/` (§4.3). A nested working tree is never
    /// created (`init_state` checks this directly), so the first `.vt/`
    /// found going up is unambiguous.
    pub fn find_root(start: &Path) -> VtResult<PathBuf> {
        let mut current = start
            .canonicalize()
            .unwrap_or_else(|_| start.to_path_buf());
        for _ in 0..MAX_WALK_UP_LEVELS {
            if current.join(STATE_DIR).is_dir() {
                return Ok(current);
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }
        Err(VtError::NotInWorkingTree)
    }

    pub fn get_state(&self) -> VtResult<WorkingTreeState> {
        let path = self.state_path();
        let raw = std::fs::read_to_string(&path).map_err(|_| VtError::NotInitialized)?;
        toml::from_str(&raw).map_err(|_| VtError::NotInitialized)
    }

    /// Overwrite `.vt/state` after validating it parses back (catches a
    /// would-be-corrupt write before it lands on disk).
    pub fn init_state(&self, state: &WorkingTreeState) -> VtResult<()> {
        let dir = self.root.join(STATE_DIR);
        std::fs::create_dir_all(&dir).with_path(&dir)?;
        self.write_state(state)
    }

    pub fn update_state(&self, update: StateUpdate) -> VtResult<WorkingTreeState> {
        let mut state = self.get_state()?;
        if let Some(id) = update.branch_id {
            state.branch.id = id;
        }
        if let Some(version) = update.branch_version {
            state.branch.version = version;
        }
        if let Some(last_run) = update.last_run {
            state.last_run = Some(last_run);
        }
        self.write_state(&state)?;
        Ok(state)
    }

    /// Atomic write-to-temp + rename, per §5's ordering guarantee that
    /// `.vt/state` is rewritten atomically at the end of each mutating op.
    fn write_state(&self, state: &WorkingTreeState) -> VtResult<()> {
        let path = self.state_path();
        let serialized = toml::to_string_pretty(state).expect("WorkingTreeState always serializes");
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, serialized).with_path(&tmp_path)?;
        std::fs::rename(&tmp_path, &path).with_path(&path)?;
        Ok(())
    }

    pub fn delete(&self) -> VtResult<()> {
        let dir = self.root.join(STATE_DIR);
        if dir.exists() {
            std::fs::remove_dir_all(&dir).with_path(&dir)?;
        }
        Ok(())
    }

    /// Walk the working tree collecting every `.vtignore`, shallowest
    /// first, and compile them plus `ALWAYS_IGNORE_PATTERNS` into one rule
    /// set (§4.3).
    pub fn load_ignore_rules(&self) -> VtResult<IgnoreRules> {
        let mut files: Vec<(PathBuf, String)> = Vec::new();
        let mut queue = vec![self.root.clone()];
        while let Some(dir) = queue.pop() {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                if file_type.is_dir() {
                    let name = entry.file_name();
                    if name == STATE_DIR || name == ".git" {
                        continue;
                    }
                    queue.push(path);
                } else if entry.file_name() == IGNORE_FILE_NAME
                    && let Ok(contents) = std::fs::read_to_string(&path)
                {
                    files.push((dir.clone(), contents));
                }
            }
        }
        // Shallowest first so a deeper .vtignore can override it, matching
        // gitignore's closer-wins precedence.
        files.sort_by_key(|(dir, _)| dir.components().count());

        let borrowed: Vec<(&Path, &str)> = files
            .iter()
            .map(|(dir, contents)| (dir.as_path(), contents.as_str()))
            .collect();
        Ok(IgnoreRules::build(&self.root, borrowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> WorkingTreeState {
        WorkingTreeState {
            val: ValRef { id: Uuid::nil() },
            branch: BranchRef {
                id: Uuid::nil(),
                version: 1,
            },
            last_run: None,
        }
    }

    #[test]
    fn init_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::new(dir.path().to_path_buf());
        store.init_state(&sample_state()).unwrap();

        let state = store.get_state().unwrap();
        assert_eq!(state.branch.version, 1);
    }

    #[test]
    fn missing_state_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::new(dir.path().to_path_buf());
        assert!(matches!(store.get_state(), Err(VtError::NotInitialized)));
    }

    #[test]
    fn update_state_bumps_version_and_preserves_val() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::new(dir.path().to_path_buf());
        store.init_state(&sample_state()).unwrap();

        let state = store
            .update_state(StateUpdate {
                branch_version: Some(7),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(state.branch.version, 7);
        assert_eq!(state.val.id, Uuid::nil());
    }

    #[test]
    fn find_root_climbs_ancestors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(STATE_DIR)).unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let root = MetaStore::find_root(&nested).unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn find_root_fails_outside_working_tree() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            MetaStore::find_root(dir.path()),
            Err(VtError::NotInWorkingTree)
        ));
    }

    #[test]
    fn load_ignore_rules_merges_nested_vtignore_and_always_ignore() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetaStore::new(dir.path().to_path_buf());
        std::fs::write(dir.path().join(".vtignore"), "*.log\n").unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/.vtignore"), "!keep.log\n").unwrap();

        let rules = store.load_ignore_rules().unwrap();
        assert!(rules.is_ignored(Path::new("a.log"), false));
        assert!(rules.is_ignored(Path::new("sub/a.log"), false));
        assert!(!rules.is_ignored(Path::new("sub/keep.log"), false));
    }
}
