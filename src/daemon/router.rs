//! Maps request paths onto mirror directories.

use super::registry::Registry;
use super::repo_config::Repository;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A request path claimed by a repository.
#[derive(Debug, PartialEq, Eq)]
pub struct Route<'a> {
    pub repository: &'a Repository,
    /// Path below the mirror directory, without a leading `/`
    pub remainder: &'a str,
}

#[derive(Debug, PartialEq, Eq)]
pub enum Resolution<'a> {
    /// Serve `remainder` from the mirror directory `dir`.
    Mirror { repository: &'a Repository, dir: PathBuf, remainder: &'a str },
    /// No repository matched; serve from the whole base path.
    Fallback,
    NotFound,
}

/// Built once from the registry and shared by every request handler.
#[derive(Debug)]
pub struct Router {
    base_path: PathBuf,
    registry: Arc<Registry>,
    fallback: bool,
    /// Registry names, longest first, so the most specific name wins.
    names: Vec<String>,
}

impl Router {
    pub fn new(base_path: impl Into<PathBuf>, registry: Arc<Registry>, fallback: bool) -> Self {
        let mut names: Vec<String> = registry.iter().map(|repo| repo.name.clone()).collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        Self { base_path: base_path.into(), registry, fallback, names }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Find the repository whose name is the longest prefix of the decoded
    /// `path`, ending on a segment boundary.
    pub fn route<'a>(&'a self, path: &'a str) -> Option<Route<'a>> {
        let search = path.strip_prefix('/').unwrap_or(path);
        self.names.iter().find_map(|name| {
            let remainder = search.strip_prefix(name.as_str())?;
            let remainder = match remainder.strip_prefix('/') {
                Some(rest) => rest,
                None if remainder.is_empty() => remainder,
                None => return None,
            };
            let repository = self.registry.get(name)?;
            Some(Route { repository, remainder })
        })
    }

    pub fn resolve<'a>(&'a self, path: &'a str) -> Resolution<'a> {
        match self.route(path) {
            Some(Route { repository, remainder }) => Resolution::Mirror {
                repository,
                dir: self.base_path.join(&repository.name),
                remainder,
            },
            None if self.fallback => Resolution::Fallback,
            None => Resolution::NotFound,
        }
    }
}
