use std::collections::btree_map::{BTreeMap, Entry};
use std::ops::Bound;

use super::repo_config::Repository;

/// Immutable mapping from repository name to repository, built once at startup.
#[derive(Debug, Default, Clone)]
pub struct Registry {
    repos: BTreeMap<String, Repository>,
}

impl Registry {
    /// Insert a repository, handing it back if the name is already taken.
    pub(super) fn insert(&mut self, repo: Repository) -> Result<(), Repository> {
        match self.repos.entry(repo.name.clone()) {
            Entry::Occupied(_) => Err(repo),
            Entry::Vacant(slot) => {
                slot.insert(repo);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Repository> {
        self.repos.get(name)
    }

    pub fn len(&self) -> usize {
        self.repos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repos.is_empty()
    }

    /// Repositories in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Repository> + '_ {
        self.repos.values()
    }

    /// Pairs `(shorter, longer)` where one name is a textual prefix of another.
    /// Requests under such names are ambiguous without a tie-break.
    pub fn overlaps(&self) -> Vec<(&str, &str)> {
        let mut pairs = Vec::new();
        for short in self.repos.keys() {
            // Every name sharing `short` as a prefix sorts directly after it.
            for long in self
                .repos
                .range::<String, _>((Bound::Excluded(short), Bound::Unbounded))
                .map(|(name, _)| name)
                .take_while(|name| name.starts_with(short.as_str()))
            {
                pairs.push((short.as_str(), long.as_str()));
            }
        }
        pairs
    }
}

/// Whether `inner` lives below `outer` as a directory, e.g. `a` and `a/b`.
pub fn is_nested(outer: &str, inner: &str) -> bool {
    inner
        .strip_prefix(outer)
        .is_some_and(|rest| rest.starts_with('/'))
}
