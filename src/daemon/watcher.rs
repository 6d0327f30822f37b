use super::errors::Result;
use super::git_ops::{MirrorExecutor, SyncAction};
use super::registry::Registry;
use super::repo_config::Repository;
use log::{error, info, warn};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::{task, time};

/// Spawn one update loop per repository. The loops run until the process exits.
pub fn spawn_watchers<E: MirrorExecutor>(registry: &Registry, executor: Arc<E>) -> Vec<JoinHandle<()>> {
    if registry.is_empty() {
        warn!("no repositories to watch");
    }

    let mut tasks = Vec::with_capacity(registry.len());
    for repo in registry.iter() {
        let repo = repo.clone();
        let executor = Arc::clone(&executor);
        tasks.push(task::spawn(
            async move { watch_single_repo(&repo, executor.as_ref()).await },
        ));
    }
    tasks
}

/// Run every update loop and wait on them; only returns if one of them panics.
pub async fn start_watching_repos<E: MirrorExecutor>(registry: &Registry, executor: Arc<E>) -> Result<()> {
    for task in spawn_watchers(registry, executor) {
        task.await?;
    }

    Ok(())
}

async fn watch_single_repo<E: MirrorExecutor>(repo: &Repository, executor: &E) {
    loop {
        update_once(repo, executor).await;
        time::sleep(repo.interval).await;
    }
}

async fn update_once<E: MirrorExecutor>(repo: &Repository, executor: &E) {
    info!("updating {}", repo.name);
    match executor.sync(repo).await {
        Ok(report) => {
            let verb = match report.action {
                SyncAction::Cloned => "cloned",
                SyncAction::Refreshed => "updated",
            };
            match report.refs {
                Some(refs) => info!("{verb} {} ({refs} refs)", repo.name),
                None => info!("{verb} {}", repo.name),
            }
        }
        Err(err) => error!("error updating {}, {err}", err.repository()),
    }
}
