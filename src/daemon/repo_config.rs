use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// A `[[Repo]]` block as written in the config file.
#[derive(Debug, Default, Deserialize)]
pub struct RepoCfg {
    /// Registry key and mirror directory (derived from the origin when absent)
    #[serde(default, rename = "Name", alias = "name")]
    pub name: Option<String>,
    /// Remote URL or SCP-like address to mirror
    #[serde(default, rename = "Origin", alias = "origin")]
    pub origin: String,
    /// Time between updates (falls back to the global interval)
    #[serde(
        default,
        rename = "Interval",
        alias = "interval",
        deserialize_with = "duration::deserialize_opt"
    )]
    pub interval: Option<Duration>,
    /// Limit for each git invocation (falls back to the global timeout)
    #[serde(
        default,
        rename = "Timeout",
        alias = "timeout",
        deserialize_with = "duration::deserialize_opt"
    )]
    pub timeout: Option<Duration>,
}

/// A validated, registered repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub origin: String,
    pub interval: Duration,
    pub timeout: Option<Duration>,
}
