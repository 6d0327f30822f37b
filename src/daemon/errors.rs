use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;

pub type Result<T> = std::result::Result<T, DaemonError>;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to create {}, {source}", path.display())]
    BaseDir { path: PathBuf, source: std::io::Error },
    #[error("failed to listen on {addr}, {source}")]
    Bind { addr: String, source: std::io::Error },
    #[error("task join error: {0}")]
    Join(#[from] JoinError),
}

/// Problems with the configuration file. All of them stop the daemon at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unable to read config file {}, {source}", path.display())]
    Read { path: PathBuf, source: std::io::Error },
    #[error("unable to load config {}, {source}", path.display())]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("unable to get absolute path to base path {}, {source}", path.display())]
    BasePath { path: PathBuf, source: std::io::Error },
    #[error("no repos found in config {}, please define repos under [[Repo]] sections", path.display())]
    NoRepositories { path: PathBuf },
    #[error("Origin required for repo {index} in config {}", path.display())]
    MissingOrigin { index: usize, path: PathBuf },
    #[error("could not generate name for Origin {origin} in config {}, please specify a Name", path.display())]
    UnnamedOrigin { origin: String, path: PathBuf },
    #[error("invalid repository name {name:?} in config {}: {reason}", path.display())]
    InvalidName { name: String, reason: &'static str, path: PathBuf },
    #[error("duplicate repository name {name} in config {}", path.display())]
    DuplicateName { name: String, path: PathBuf },
    #[error("repository {inner} would be mirrored inside repository {outer} in config {}", path.display())]
    NestedName { outer: String, inner: String, path: PathBuf },
}

/// Failure of a single `git` invocation.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("could not run {command}: {source}")]
    Spawn { command: String, source: std::io::Error },
    #[error("{command} exited with {status}: {stderr}")]
    Failed { command: String, status: std::process::ExitStatus, stderr: String },
    #[error("{command} timed out after {after:?}")]
    TimedOut { command: String, after: Duration },
}

/// Failure of one synchronisation attempt for one repository.
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("failed to stat {} for {name}, {source}", path.display())]
    Stat { name: String, path: PathBuf, source: std::io::Error },
    #[error("failed to create parent directory for cloning {}, {source}", path.display())]
    Mkdir { name: String, path: PathBuf, source: std::io::Error },
    #[error("failed to clone {origin} for {name}, {source}")]
    Clone { name: String, origin: String, source: CommandError },
    #[error("failed to update remote in {} for {name}, {source}", path.display())]
    Refresh { name: String, path: PathBuf, source: CommandError },
    #[error("failed to update-server-info in {} for {name}, {source}", path.display())]
    PublishInfo { name: String, path: PathBuf, source: CommandError },
}

impl MirrorError {
    /// Name of the repository whose attempt failed.
    pub fn repository(&self) -> &str {
        match self {
            MirrorError::Stat { name, .. }
            | MirrorError::Mkdir { name, .. }
            | MirrorError::Clone { name, .. }
            | MirrorError::Refresh { name, .. }
            | MirrorError::PublishInfo { name, .. } => name,
        }
    }
}
