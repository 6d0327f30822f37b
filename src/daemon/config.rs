use super::duration;
use super::errors::ConfigError;
use super::naming::{derive_name, validate_name};
use super::registry::{is_nested, Registry};
use super::repo_config::{RepoCfg, Repository};
use log::warn;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LISTEN_ADDR: &str = ":8080";
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(15 * 60);

fn default_fallback() -> bool { true }

/// The config file as written.
#[derive(Deserialize, Debug)]
struct Config {
    #[serde(default, rename = "ListenAddr", alias = "listenaddr", alias = "listen_addr")]
    listen_addr: String,
    #[serde(
        default,
        rename = "Interval",
        alias = "interval",
        deserialize_with = "duration::deserialize_opt"
    )]
    interval: Option<Duration>,
    #[serde(default, rename = "BasePath", alias = "basepath", alias = "base_path")]
    base_path: String,
    #[serde(
        default,
        rename = "Timeout",
        alias = "timeout",
        deserialize_with = "duration::deserialize_opt"
    )]
    timeout: Option<Duration>,
    #[serde(default = "default_fallback", rename = "Fallback", alias = "fallback")]
    fallback: bool,
    #[serde(default, rename = "Repo", alias = "repo")]
    repos: Vec<RepoCfg>,
}

/// Daemon-wide settings after defaults have been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalConfig {
    pub listen_addr: String,
    pub interval: Duration,
    /// Absolute directory holding every mirror
    pub base_path: PathBuf,
    pub timeout: Option<Duration>,
    /// Serve the whole base path for requests no repository claims
    pub fallback: bool,
}

impl GlobalConfig {
    /// Address to bind; a bare `:port` listens on all interfaces.
    pub fn bind_addr(&self) -> String {
        match self.listen_addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.listen_addr.clone(),
        }
    }
}

/// Read a config file and resolve it into global settings and a registry.
pub fn load(path: &Path) -> Result<(GlobalConfig, Registry), ConfigError> {
    let file_text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&file_text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    resolve(config, path)
}

fn resolve(config: Config, path: &Path) -> Result<(GlobalConfig, Registry), ConfigError> {
    let listen_addr = if config.listen_addr.is_empty() {
        DEFAULT_LISTEN_ADDR.to_string()
    } else {
        config.listen_addr
    };
    let base_path = if config.base_path.is_empty() { "." } else { config.base_path.as_str() };
    let base_path = absolutize(Path::new(base_path)).map_err(|source| ConfigError::BasePath {
        path: PathBuf::from(base_path),
        source,
    })?;
    let global = GlobalConfig {
        listen_addr,
        interval: config.interval.unwrap_or(DEFAULT_INTERVAL),
        base_path,
        timeout: config.timeout,
        fallback: config.fallback,
    };

    if config.repos.is_empty() {
        return Err(ConfigError::NoRepositories { path: path.to_path_buf() });
    }

    let mut registry = Registry::default();
    for (i, decl) in config.repos.into_iter().enumerate() {
        if decl.origin.is_empty() {
            return Err(ConfigError::MissingOrigin { index: i + 1, path: path.to_path_buf() });
        }

        // Generate a name if there isn't one already
        let name = match decl.name.filter(|name| !name.is_empty()) {
            Some(name) => name,
            None => derive_name(&decl.origin),
        };
        if name.is_empty() {
            return Err(ConfigError::UnnamedOrigin {
                origin: decl.origin,
                path: path.to_path_buf(),
            });
        }
        if let Err(reason) = validate_name(&name) {
            return Err(ConfigError::InvalidName { name, reason, path: path.to_path_buf() });
        }

        let repo = Repository {
            name,
            origin: decl.origin,
            interval: decl.interval.unwrap_or(global.interval),
            timeout: decl.timeout.or(global.timeout),
        };
        if let Err(repo) = registry.insert(repo) {
            return Err(ConfigError::DuplicateName { name: repo.name, path: path.to_path_buf() });
        }
    }

    for (short, long) in registry.overlaps() {
        if is_nested(short, long) {
            return Err(ConfigError::NestedName {
                outer: short.to_string(),
                inner: long.to_string(),
                path: path.to_path_buf(),
            });
        }
        warn!("repo name {short} is a textual prefix of {long}");
    }

    Ok((global, registry))
}

/// Make `path` absolute against the working directory and clean it lexically.
fn absolutize(path: &Path) -> std::io::Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    let mut clean = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                clean.pop();
            }
            other => clean.push(other.as_os_str()),
        }
    }
    Ok(clean)
}
