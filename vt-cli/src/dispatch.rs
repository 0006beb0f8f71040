use std::path::{Path, PathBuf};
use std::sync::Arc;

use vt_core::differ::FileStateChanges;
use vt_core::error::{VtError, VtResult};
use vt_core::meta_store::MetaStore;
use vt_core::progress::NullSink;
use vt_core::remote_api::{RemoteApi, ValPrivacy};
use vt_core::session::Session;
use vt_core::sync_ops::{self, CheckoutTarget, CloneRequest};
use vt_core::watcher;

use crate::args::{Cli, Commands, PrivacyArg};
use crate::http_remote::HttpRemoteApi;

const DEFAULT_API_URL: &str = "https://api.val.town";

fn build_remote(api_key: &str) -> Arc<dyn RemoteApi> {
    let base_url = std::env::var("VT_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
    Arc::new(HttpRemoteApi::new(base_url, api_key))
}

fn print_changes(changes: &FileStateChanges) {
    for f in &changes.created {
        println!("created  {}", f.path);
    }
    for f in &changes.modified {
        println!("modified {}", f.path);
    }
    for f in &changes.deleted {
        println!("deleted  {}", f.path);
    }
    for warning in &changes.warnings {
        eprintln!("warning: {warning}");
    }
}

async fn open_session(root: &Path) -> VtResult<Session> {
    let working_root = MetaStore::find_root(root)?;
    let config = vt_core::config::load(&working_root)?;
    let remote = build_remote(&config.api_key);
    Ok(Session::new(remote, config, working_root))
}

pub async fn run() -> VtResult<()> {
    let cli: Cli = clap::Parser::parse();
    let cwd = std::env::current_dir().map_err(|source| VtError::Io {
        path: PathBuf::from("."),
        source,
    })?;

    match cli.command {
        Commands::Clone {
            val_id,
            target_dir,
            branch_name,
            upload_existing,
        } => {
            let config = vt_core::config::load(&cwd)?;
            let remote = build_remote(&config.api_key);
            let branches = remote.list_branches(val_id).await?;
            let branch_name = branch_name.unwrap_or_else(|| "main".to_string());
            let branch = branches
                .into_iter()
                .find(|b| b.name == branch_name)
                .ok_or(VtError::BranchNotFound(branch_name))?;
            let target = target_dir.map(PathBuf::from).unwrap_or_else(|| cwd.clone());

            let changes = sync_ops::clone(
                &target,
                remote.as_ref(),
                CloneRequest {
                    val_id,
                    branch_id: branch.id,
                    version: None,
                    dry_run: false,
                    upload_existing,
                },
                &NullSink,
            )
            .await?;
            print_changes(&changes);
        }

        Commands::Pull { force, dry_run } => {
            let session = open_session(&cwd).await?;
            let outcome = sync_ops::pull(&session, dry_run, force, &NullSink).await?;
            if !outcome.applied {
                eprintln!("working tree has local changes; pass --force to discard them:");
            }
            print_changes(&outcome.changes);
        }

        Commands::Push { dry_run } => {
            let session = open_session(&cwd).await?;
            let changes = sync_ops::push(&session, dry_run, None, &NullSink).await?;
            print_changes(&changes);
        }

        Commands::Status => {
            let session = open_session(&cwd).await?;
            let changes = sync_ops::status(&session).await?;
            print_changes(&changes);
        }

        Commands::Checkout { branch, new_branch, force } => {
            let session = open_session(&cwd).await?;
            let meta = MetaStore::new(session.root.clone());
            let state = meta.get_state()?;
            let target = match (branch, new_branch) {
                (Some(name), None) => CheckoutTarget::Existing { name },
                (None, Some(name)) => CheckoutTarget::NewBranch {
                    name,
                    forked_from: state.branch.id,
                },
                _ => {
                    eprintln!("specify either a branch name or -b <new>");
                    return Ok(());
                }
            };
            let changes = sync_ops::checkout(&session, target, force, &NullSink).await?;
            print_changes(&changes);
        }

        Commands::Watch { debounce_delay } => {
            let session = open_session(&cwd).await?;
            let (_tx, rx) = watcher::default_cancel_channel();
            watcher::watch(&session, debounce_delay, &NullSink, rx, |tick| match tick {
                Ok(tick) => print_changes(&tick.changes),
                Err(err) => eprintln!("push failed: {err}"),
            })
            .await?;
        }

        Commands::Branch { delete } => {
            let session = open_session(&cwd).await?;
            let meta = MetaStore::new(session.root.clone());
            let state = meta.get_state()?;
            match delete {
                Some(name) => {
                    let branches = session.remote.list_branches(state.val.id).await?;
                    let branch = branches
                        .into_iter()
                        .find(|b| b.name == name)
                        .ok_or(VtError::BranchNotFound(name))?;
                    session.remote.delete_branch(state.val.id, branch.id).await?;
                }
                None => {
                    for branch in session.remote.list_branches(state.val.id).await? {
                        println!("{}", branch.name);
                    }
                }
            }
        }

        Commands::Create { name, target_dir, privacy, org } => {
            let config = vt_core::config::load(&cwd)?;
            let remote = build_remote(&config.api_key);
            let privacy = match privacy {
                PrivacyArg::Public => ValPrivacy::Public,
                PrivacyArg::Private => ValPrivacy::Private,
                PrivacyArg::Unlisted => ValPrivacy::Unlisted,
            };
            let val = remote.create_val(&name, privacy, None, org.as_deref()).await?;
            let branches = remote.list_branches(val.id).await?;
            let branch = branches.into_iter().next().ok_or(VtError::NotInitialized)?;
            let target = target_dir.map(PathBuf::from).unwrap_or_else(|| cwd.join(&name));
            let changes = sync_ops::clone(
                &target,
                remote.as_ref(),
                CloneRequest {
                    val_id: val.id,
                    branch_id: branch.id,
                    version: None,
                    dry_run: false,
                    upload_existing: false,
                },
                &NullSink,
            )
            .await?;
            print_changes(&changes);
        }

        Commands::Delete { force, remote } => {
            let session = open_session(&cwd).await?;
            sync_ops::delete_working_tree(&session, remote, force).await?;
        }
    }

    Ok(())
}
