//! Mirror daemon: keeps bare git mirrors fresh and serves them over dumb HTTP.

pub mod config;
pub mod duration;
pub mod errors;
pub mod git_ops;
pub mod naming;
pub mod registry;
pub mod repo_config;
pub mod router;
pub mod server;
pub mod watcher;

use config::GlobalConfig;
use errors::{DaemonError, Result};
use git_ops::GitExecutor;
use log::info;
use registry::Registry;
use router::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Create the base directory that holds every mirror.
fn prepare_base_path(global: &GlobalConfig) -> Result<()> {
    std::fs::create_dir_all(&global.base_path).map_err(|source| DaemonError::BaseDir {
        path: global.base_path.clone(),
        source,
    })
}

/// Print the resolved configuration.
pub fn describe(global: &GlobalConfig, registry: &Registry) {
    println!("listen address: {}", global.listen_addr);
    println!("base path:      {}", global.base_path.display());
    println!("interval:       {:?}", global.interval);
    for repo in registry.iter() {
        println!("{} <- {} (every {:?})", repo.name, repo.origin, repo.interval);
    }
}

/// Run the update loops and the HTTP server until one of them fails.
pub async fn run(global: GlobalConfig, registry: Registry) -> Result<()> {
    prepare_base_path(&global)?;

    let registry = Arc::new(registry);
    let executor = Arc::new(GitExecutor::new(&global.base_path));
    let router = Arc::new(Router::new(&global.base_path, Arc::clone(&registry), global.fallback));

    let addr = global.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| DaemonError::Bind { addr: addr.clone(), source })?;

    // Run background tasks to keep mirrors up to date.
    info!("watching {} repos under {}", registry.len(), global.base_path.display());
    let watchers = watcher::start_watching_repos(&registry, executor);

    info!("starting web server on {}", global.listen_addr);
    tokio::select! {
        res = watchers => res,
        res = server::serve(listener, router) => res,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn load_with_base(base: &std::path::Path) -> (GlobalConfig, Registry) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mirror.toml");
        let text = format!(
            "BasePath = {:?}\n\n[[Repo]]\nOrigin = \"https://example.com/foo\"\n",
            base.to_string_lossy()
        );
        std::fs::write(&path, text).unwrap();
        config::load(&path).unwrap()
    }

    #[test]
    fn checking_leaves_the_base_path_alone() {
        let scratch = TempDir::new().unwrap();
        let base = scratch.path().join("mirrors");
        let (global, registry) = load_with_base(&base);

        describe(&global, &registry);
        assert!(!base.exists());

        prepare_base_path(&global).unwrap();
        assert!(base.is_dir());
    }

    #[test]
    fn unusable_base_path_is_fatal() {
        let scratch = TempDir::new().unwrap();
        let base = scratch.path().join("taken");
        std::fs::write(&base, "not a directory").unwrap();
        let (global, _) = load_with_base(&base);

        let err = prepare_base_path(&global).unwrap_err();
        assert!(matches!(err, DaemonError::BaseDir { .. }), "{err}");
    }
}
