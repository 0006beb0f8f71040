//! Integration tests for the five `SyncOps` against `FakeRemote`, covering
//! the concrete end-to-end scenarios and universal properties from the
//! design document's testable-properties section.

use std::sync::Arc;

use vt_core::config::{Config, DangerousOperations};
use vt_core::meta_store::MetaStore;
use vt_core::progress::NullSink;
use vt_core::remote_api::{Kind, RemoteApi};
use vt_core::session::Session;
use vt_core::sync_ops::{self, CheckoutTarget, CloneRequest};
use vt_core::testing::FakeRemote;

fn test_config() -> Config {
    Config {
        api_key: "test-key".to_string(),
        user_id: None,
        dangerous_operations: DangerousOperations::default(),
    }
}

#[tokio::test]
async fn fresh_clone_of_known_fixture() {
    let remote = FakeRemote::new();
    let (val_id, branch_id) = remote
        .seed_val(&[
            ("proudLimeGoose.http.tsx", Kind::Http, b"// Example Content"),
            ("merryCopperAsp.script.tsx", Kind::Script, b""),
            ("thoughtfulPeachPrimate", Kind::Directory, b""),
            (
                "thoughtfulPeachPrimate/clearAquamarineSmelt.cron.tsx",
                Kind::Interval,
                b"const test = \"test\";",
            ),
            ("tirelessHarlequinSmelt", Kind::File, b""),
        ])
        .await;

    let dir = tempfile::tempdir().unwrap();
    sync_ops::clone(
        dir.path(),
        &remote,
        CloneRequest {
            val_id,
            branch_id,
            version: None,
            dry_run: false,
            upload_existing: false,
        },
        &NullSink,
    )
    .await
    .unwrap();

    assert_eq!(
        std::fs::read(dir.path().join("proudLimeGoose.http.tsx")).unwrap(),
        b"// Example Content"
    );
    assert_eq!(
        std::fs::read(dir.path().join("merryCopperAsp.script.tsx")).unwrap(),
        b""
    );
    assert_eq!(
        std::fs::read(
            dir.path()
                .join("thoughtfulPeachPrimate/clearAquamarineSmelt.cron.tsx")
        )
        .unwrap(),
        b"const test = \"test\";"
    );
    assert_eq!(std::fs::read(dir.path().join("tirelessHarlequinSmelt")).unwrap(), b"");

    let session = Session::new(Arc::new(remote), test_config(), dir.path().to_path_buf());
    let status = sync_ops::status(&session).await.unwrap();
    assert!(status.created.is_empty());
    assert!(status.modified.is_empty());
    assert!(status.deleted.is_empty());
}

#[tokio::test]
async fn create_push_overwrite_push_delete_push_round_trip() {
    let remote = Arc::new(FakeRemote::new());
    let (val_id, branch_id) = remote.seed_simple_val("keep.txt", b"keep").await;
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
        &NullSink,
    )
    .await
    .unwrap();

    let session = Session::new(remote.clone(), test_config(), dir.path().to_path_buf());

    std::fs::write(dir.path().join("test.txt"), b"test").unwrap();
    sync_ops::push(&session, false, None, &NullSink).await.unwrap();
    let content = remote.get_content(val_id, "test.txt", branch_id, 0).await.unwrap();
    assert_eq!(content, b"test");

    std::fs::write(dir.path().join("test.txt"), b"test2").unwrap();
    let far_future = filetime::FileTime::from_unix_time(32_503_680_000, 0);
    filetime::set_file_mtime(dir.path().join("test.txt"), far_future).unwrap();
    sync_ops::push(&session, false, None, &NullSink).await.unwrap();
    let content = remote.get_content(val_id, "test.txt", branch_id, 0).await.unwrap();
    assert_eq!(content, b"test2");

    std::fs::remove_file(dir.path().join("test.txt")).unwrap();
    sync_ops::push(&session, false, None, &NullSink).await.unwrap();
    assert!(remote.get_content(val_id, "test.txt", branch_id, 0).await.is_err());
}

#[tokio::test]
async fn dirty_pull_is_rejected_without_force() {
    let remote = Arc::new(FakeRemote::new());
    let (val_id, branch_id) = remote.seed_simple_val("a.txt", b"original").await;
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
        &NullSink,
    )
    .await
    .unwrap();

    let session = Session::new(remote.clone(), test_config(), dir.path().to_path_buf());
    std::fs::write(dir.path().join("local_edit.txt"), b"dirty").unwrap();

    let outcome = sync_ops::pull(&session, false, false, &NullSink).await.unwrap();
    assert!(!outcome.applied);
    assert_eq!(outcome.changes.created.len(), 1);
    assert_eq!(outcome.changes.created[0].path, "local_edit.txt");
    // Tree was left untouched: the original file is still there, unmodified.
    assert!(dir.path().join("local_edit.txt").exists());
}

#[tokio::test]
async fn checkout_across_fixture_branches() {
    let remote = Arc::new(FakeRemote::new());
    let (val_id, branch_a) = remote.seed_simple_val("only_in_a.txt", b"a-only").await;
    let branch_b = remote
        .create_branch(val_id, "feature-b", branch_a)
        .await
        .unwrap()
        .id;
    remote.delete_file(val_id, "only_in_a.txt", branch_b, 1).await.unwrap();
    remote
        .create_file(
            val_id,
            "only_in_b.txt",
            branch_b,
            vt_core::remote_api::FileWrite {
                name: "only_in_b.txt",
                kind: Kind::File,
                content: Some(b"b-only"),
            },
        )
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    sync_ops::clone(
        dir.path(),
        remote.as_ref(),
        CloneRequest {
            val_id,
            branch_id: branch_a,
            version: None,
            dry_run: false,
            upload_existing: false,
        },
        &NullSink,
    )
    .await
    .unwrap();

    let session = Session::new(remote.clone(), test_config(), dir.path().to_path_buf());
    sync_ops::checkout(
        &session,
        CheckoutTarget::Existing {
            name: "feature-b".to_string(),
        },
        false,
        &NullSink,
    )
    .await
    .unwrap();

    assert!(!dir.path().join("only_in_a.txt").exists());
    assert_eq!(
        std::fs::read(dir.path().join("only_in_b.txt")).unwrap(),
        b"b-only"
    );

    let state = MetaStore::new(dir.path().to_path_buf()).get_state().unwrap();
    assert_eq!(state.branch.id, branch_b);
}

#[tokio::test]
async fn ignored_file_never_appears_in_diff_or_push() {
    let remote = Arc::new(FakeRemote::new());
    let (val_id, branch_id) = remote.seed_simple_val("keep.txt", b"keep").await;
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
        &NullSink,
    )
    .await
    .unwrap();

    std::fs::write(dir.path().join(".vtignore"), "*.log\n").unwrap();
    std::fs::write(dir.path().join("debug.log"), b"noise").unwrap();

    let session = Session::new(remote.clone(), test_config(), dir.path().to_path_buf());
    let changes = sync_ops::status(&session).await.unwrap();
    assert!(changes.created.iter().all(|f| f.path != "debug.log"));

    sync_ops::push(&session, false, None, &NullSink).await.unwrap();
    assert!(remote
        .get_content(val_id, "debug.log", branch_id, 0)
        .await
        .is_err());
}

#[tokio::test]
async fn kind_inference_on_push() {
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
        &NullSink,
    )
    .await
    .unwrap();

    let session = Session::new(remote.clone(), test_config(), dir.path().to_path_buf());
    for name in ["myCron.ts", "myHttpHandler.ts", "myCronHttpEmail.ts", "readme.md"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    sync_ops::push(&session, false, None, &NullSink).await.unwrap();

    let files = remote.list_files(val_id, branch_id, 0, true).await.unwrap();
    let kind_of = |name: &str| files.iter().find(|f| f.path == name).unwrap().kind;
    assert_eq!(kind_of("myCron.ts"), Kind::Interval);
    assert_eq!(kind_of("myHttpHandler.ts"), Kind::Http);
    assert_eq!(kind_of("myCronHttpEmail.ts"), Kind::Script);
    assert_eq!(kind_of("readme.md"), Kind::File);
}

#[tokio::test]
async fn pull_is_idempotent() {
    let remote = Arc::new(FakeRemote::new());
    let (val_id, branch_id) = remote.seed_simple_val("a.txt", b"a").await;
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
        &NullSink,
    )
    .await
    .unwrap();

    let session = Session::new(remote.clone(), test_config(), dir.path().to_path_buf());
    let first = sync_ops::pull(&session, false, false, &NullSink).await.unwrap();
    assert!(first.changes.is_clean());

    let second = sync_ops::pull(&session, false, false, &NullSink).await.unwrap();
    assert!(second.changes.is_clean());
}
