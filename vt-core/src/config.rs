//! The `Config` collaborator (§6, §1): supplies an API key and the
//! dangerous-operations confirmation flag. Loading follows the teacher's
//! layered-merge shape (`vizier-core/src/config/{load,merge}.rs`) — a
//! global file merged under a local override — but lands in a plain
//! `Config` value rather than a `lazy_static! RwLock`, per the
//! "Singleton session state" redesign flag in §9.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::VtResult;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DangerousOperations {
    #[serde(default)]
    pub confirmation: bool,
}

/// A single config layer as read off disk; every field optional so a
/// layer can be merged over another without clobbering unset fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigLayer {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    dangerous_operations: Option<DangerousOperations>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub user_id: Option<String>,
    pub dangerous_operations: DangerousOperations,
}

impl ConfigLayer {
    fn read(path: &Path) -> VtResult<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => toml::from_str(&raw).map_err(|_| crate::error::VtError::NotInitialized),
            Err(_) => Ok(Self::default()),
        }
    }

    fn apply_over(self, base: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            api_key: self.api_key.or(base.api_key),
            user_id: self.user_id.or(base.user_id),
            dangerous_operations: self.dangerous_operations.or(base.dangerous_operations),
        }
    }
}

/// Global config path: `~/.config/vt/config.toml`. Returns `None` when the
/// platform has no resolvable home directory — callers treat that the same
/// as a missing file.
pub fn global_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".config").join("vt").join("config.toml"))
}

/// Load the global config, then merge `<root>/.vt/config` over it
/// (present local fields win). A missing file at either layer is not an
/// error; an unparseable one is.
pub fn load(root: &Path) -> VtResult<Config> {
    let global = global_config_path()
        .map(|p| ConfigLayer::read(&p))
        .transpose()?
        .unwrap_or_default();
    let local = ConfigLayer::read(&root.join(".vt").join("config"))?;
    let merged = local.apply_over(global);

    Ok(Config {
        api_key: merged.api_key.unwrap_or_default(),
        user_id: merged.user_id,
        dangerous_operations: merged.dangerous_operations.unwrap_or_default(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_overrides_global_field_by_field() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".vt")).unwrap();
        std::fs::write(
            dir.path().join(".vt").join("config"),
            "api_key = \"local-key-xxxxxxxxxxxxxxxxxxxxxxxxxxxxxx\"\n",
        )
        .unwrap();

        let config = load(dir.path()).unwrap();
        assert_eq!(config.api_key, "local-key-xxxxxxxxxxxxxxxxxxxxxxxxxxxxxx");
        assert!(!config.dangerous_operations.confirmation);
    }

    #[test]
    fn missing_files_yield_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load(dir.path()).unwrap();
        assert_eq!(config.api_key, "");
    }
}
