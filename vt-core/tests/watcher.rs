//! Integration tests for the debounced watch loop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use vt_core::config::{Config, DangerousOperations};
use vt_core::remote_api::RemoteApi;
use vt_core::session::Session;
use vt_core::sync_ops::{self, CloneRequest};
use vt_core::testing::FakeRemote;
use vt_core::watcher;

fn test_config() -> Config {
    Config {
        api_key: "test-key".to_string(),
        user_id: None,
        dangerous_operations: DangerousOperations::default(),
    }
}

#[tokio::test]
async fn rapid_writes_coalesce_into_one_push() {
    let remote = Arc::new(FakeRemote::new());
    let (val_id, branch_id) = remote.seed_simple_val("seed.txt", b"seed").await;
    let dir = tempfile::tempdir().unwrap();

    sync_ops::clone(
        dir.path(),
        remote.as_ref(),
        CloneRequest {
            val_id,
            branch_id,
            version: None,
            dry_run: false,
            upload_existing: false,
        },
        &vt_core::progress::NullSink,
    )
    .await
    .unwrap();

    let dir_path = dir.path().to_path_buf();
    let remote_for_watch = remote.clone();
    let tick_counts = Arc::new(Mutex::new(Vec::new()));
    let tick_counts_for_watch = tick_counts.clone();

    let (cancel_tx, cancel_rx) = watcher::default_cancel_channel();
    let watch_handle = tokio::spawn(async move {
        let session = Session::new(remote_for_watch, test_config(), dir_path);
        watcher::watch(
            &session,
            150,
            &vt_core::progress::NullSink,
            cancel_rx,
            move |result| {
                tick_counts_for_watch
                    .lock()
                    .unwrap()
                    .push(result.map(|t| t.changes.created.len()));
            },
        )
        .await
        .unwrap();
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    for i in 0..10 {
        std::fs::write(dir.path().join(format!("file{i}.txt")), format!("content {i}")).unwrap();
        tokio::time::sleep(Duration::from_millis(15)).await;
    }

    tokio::time::sleep(Duration::from_millis(800)).await;
    let _ = cancel_tx.send(()).await;
    watch_handle.await.unwrap();

    // Directory-level fs events (e.g. the parent dir's mtime bumping as each
    // file lands) can trigger additional debounced ticks after the real
    // push has already caught everything up — those surface as zero-change
    // runs, which §4.6 explicitly allows ("including zero-change runs for
    // visibility"). Under load the 150ms-apart writes can also split across
    // more than one debounce window, so what's asserted is that coalescing
    // happened at all (a handful of pushes, not one per write) and that
    // every created file was accounted for exactly once.
    let nonzero: Vec<usize> = {
        let collected = tick_counts.lock().unwrap();
        let nonzero: Vec<usize> = collected
            .iter()
            .filter_map(|r| r.as_ref().ok())
            .copied()
            .filter(|&n| n > 0)
            .collect();
        assert!(
            nonzero.len() <= 3,
            "writes should coalesce into a handful of pushes, not one per file: {collected:?}"
        );
        nonzero
    };
    assert_eq!(
        nonzero.iter().sum::<usize>(),
        10,
        "every created file must be accounted for across the observed pushes: {nonzero:?}"
    );

    let remote_files = remote.list_files(val_id, branch_id, 0, true).await.unwrap();
    let created_count = remote_files.iter().filter(|f| f.path != "seed.txt").count();
    assert_eq!(created_count, 10);
}
