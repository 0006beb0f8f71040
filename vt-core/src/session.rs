//! `Session`: the explicit value that replaces the teacher's "current
//! user" / ambient-config singleton pattern (§9's "Singleton session
//! state" redesign flag). One `Session` is built per CLI invocation and
//! the `Watcher` loop owns exactly one for its lifetime.

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::Config;
use crate::remote_api::RemoteApi;

pub struct Session {
    pub remote: Arc<dyn RemoteApi>,
    pub config: Config,
    pub root: PathBuf,
}

impl Session {
    pub fn new(remote: Arc<dyn RemoteApi>, config: Config, root: PathBuf) -> Self {
        Session {
            remote,
            config,
            root,
        }
    }
}
