//! Watcher (§4.6): a debounced filesystem watch loop that drives repeated
//! `push` calls, strictly serialized per working tree.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent};
use tokio::sync::mpsc;

use crate::differ::FileStateChanges;
use crate::error::{VtError, VtResult};
use crate::meta_store::{LastRun, MetaStore, StateUpdate};
use crate::progress::ProgressSink;
use crate::session::Session;
use crate::sync_ops;

/// One iteration of the watch loop: the `FileStateChanges` from a push, run
/// in response to filesystem activity (possibly empty, per §4.6: "including
/// zero-change runs for visibility").
pub struct WatchTick {
    pub changes: FileStateChanges,
}

/// Returns true if a process with the given pid is still alive. Used by
/// `start` to decide whether a recorded `lastRun.pid` blocks a new watcher
/// (§4.6, §5's cooperative cross-process exclusivity).
#[cfg(unix)]
fn pid_is_alive(pid: u32) -> bool {
    // Signal 0 performs no action but still validates the pid exists and is
    // owned by this user (EPERM also counts as "alive").
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM) }
}

#[cfg(not(unix))]
fn pid_is_alive(_pid: u32) -> bool {
    false
}

/// Run the watch loop until `cancel` resolves. Debounces filesystem events
/// behind `debounce_ms`, then runs one `push`; events arriving during a push
/// coalesce into the next post-push run. `on_tick` is invoked with every
/// push's result, including zero-change runs.
pub async fn watch(
    session: &Session,
    debounce_ms: u64,
    progress: &dyn ProgressSink,
    mut cancel: mpsc::Receiver<()>,
    mut on_tick: impl FnMut(VtResult<WatchTick>),
) -> VtResult<()> {
    let meta = MetaStore::new(session.root.clone());
    let state = meta.get_state()?;
    if let Some(LastRun { pid, .. }) = state.last_run
        && pid_is_alive(pid)
    {
        return Err(VtError::AlreadyWatching(pid));
    }
    meta.update_state(StateUpdate {
        last_run: Some(LastRun {
            pid: std::process::id(),
            time: chrono::Utc::now(),
        }),
        ..Default::default()
    })?;

    let ignore_rules = meta.load_ignore_rules()?;
    let root = session.root.clone();

    let (tx, mut rx) = mpsc::channel::<Vec<DebouncedEvent>>(64);
    let mut debouncer = new_debouncer(Duration::from_millis(debounce_ms), move |res| {
        if let Ok(events) = res {
            let _ = tx.blocking_send(events);
        }
    })
    .map_err(|err| VtError::RemoteUnavailable(format!("failed to start filesystem watch: {err}")))?;
    debouncer
        .watcher()
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|err| VtError::RemoteUnavailable(format!("failed to watch {}: {err}", root.display())))?;

    // A push is always fully awaited before the next `rx.recv()` is polled,
    // so events arriving during a push simply queue in the channel and are
    // picked up whole by the next iteration — this is the coalescing
    // behavior `watch` promises, with no separate pending-flag bookkeeping
    // needed.
    loop {
        tokio::select! {
            _ = cancel.recv() => {
                break;
            }
            events = rx.recv() => {
                let Some(events) = events else { break };
                if events_all_ignored(&events, &root, &ignore_rules) {
                    continue;
                }
                let result = run_one_push(session, progress).await;
                on_tick(result);
            }
        }
    }

    Ok(())
}

fn events_all_ignored(
    events: &[DebouncedEvent],
    root: &PathBuf,
    ignore_rules: &crate::path_classifier::IgnoreRules,
) -> bool {
    events.iter().all(|event| {
        let Ok(rel) = event.path.strip_prefix(root) else {
            return true;
        };
        ignore_rules.is_ignored(rel, event.path.is_dir())
    })
}

/// Pushes are strictly serialized (§4.6, §5): this is the only call site
/// that invokes `sync_ops::push` from the watch loop, and the loop above
/// never polls two of these concurrently.
async fn run_one_push(session: &Session, progress: &dyn ProgressSink) -> VtResult<WatchTick> {
    let changes = sync_ops::push(session, false, None, progress).await?;
    Ok(WatchTick { changes })
}

pub fn default_cancel_channel() -> (mpsc::Sender<()>, mpsc::Receiver<()>) {
    mpsc::channel(1)
}

pub type ProgressHandle = Arc<dyn ProgressSink>;
