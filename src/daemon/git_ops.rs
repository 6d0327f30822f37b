use super::errors::{CommandError, MirrorError};
use super::repo_config::Repository;
use git2::Repository as GitRepository;
use log::debug;
use std::ffi::OsStr;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::{fs, time};

/// What a successful synchronisation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncAction {
    Cloned,
    Refreshed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub action: SyncAction,
    /// Number of references in the mirror, when it could be inspected
    pub refs: Option<usize>,
}

/// Brings one repository's mirror up to date.
pub trait MirrorExecutor: Send + Sync + 'static {
    fn sync<'a>(
        &'a self,
        repo: &'a Repository,
    ) -> impl Future<Output = Result<SyncReport, MirrorError>> + Send + 'a;
}

/// Keeps mirrors under `base_path` fresh by running the `git` binary.
#[derive(Debug, Clone)]
pub struct GitExecutor {
    base_path: PathBuf,
    git: PathBuf,
}

impl GitExecutor {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into(), git: PathBuf::from("git") }
    }

    /// Run `git` from somewhere other than `PATH`.
    #[cfg(test)]
    fn with_git(mut self, git: impl Into<PathBuf>) -> Self {
        self.git = git.into();
        self
    }

    /// Directory holding the mirror of `repo`.
    pub fn mirror_path(&self, repo: &Repository) -> PathBuf {
        self.base_path.join(&repo.name)
    }

    async fn mirror(&self, repo: &Repository) -> Result<SyncReport, MirrorError> {
        let repo_path = self.mirror_path(repo);
        debug!("Checking mirror {} for {}", repo_path.display(), repo.name);

        let action = match fs::metadata(&repo_path).await {
            Ok(_) => {
                // Directory exists, update.
                self.git(&["remote", "update"], &repo_path, repo.timeout)
                    .await
                    .map_err(|source| MirrorError::Refresh {
                        name: repo.name.clone(),
                        path: repo_path.clone(),
                        source,
                    })?;
                SyncAction::Refreshed
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                let parent = repo_path.parent().unwrap_or(&self.base_path);
                fs::create_dir_all(parent).await.map_err(|source| MirrorError::Mkdir {
                    name: repo.name.clone(),
                    path: repo_path.clone(),
                    source,
                })?;
                let args = [
                    OsStr::new("clone"),
                    OsStr::new("--mirror"),
                    OsStr::new("--"),
                    OsStr::new(&repo.origin),
                    repo_path.as_os_str(),
                ];
                self.git(&args, parent, repo.timeout)
                    .await
                    .map_err(|source| MirrorError::Clone {
                        name: repo.name.clone(),
                        origin: repo.origin.clone(),
                        source,
                    })?;
                SyncAction::Cloned
            }
            Err(source) => {
                return Err(MirrorError::Stat { name: repo.name.clone(), path: repo_path, source });
            }
        };

        self.git(&["update-server-info"], &repo_path, repo.timeout)
            .await
            .map_err(|source| MirrorError::PublishInfo {
                name: repo.name.clone(),
                path: repo_path.clone(),
                source,
            })?;

        Ok(SyncReport { action, refs: count_refs(&repo_path) })
    }

    async fn git<S: AsRef<OsStr>>(&self, args: &[S], dir: &Path, timeout: Option<Duration>) -> Result<(), CommandError> {
        let mut command = Command::new(&self.git);
        command.args(args).current_dir(dir);
        run_command(command, timeout).await
    }
}

impl MirrorExecutor for GitExecutor {
    fn sync<'a>(
        &'a self,
        repo: &'a Repository,
    ) -> impl Future<Output = Result<SyncReport, MirrorError>> + Send + 'a {
        self.mirror(repo)
    }
}

/// Run a command to completion, killing it if it outlives `timeout`.
pub async fn run_command(mut command: Command, timeout: Option<Duration>) -> Result<(), CommandError> {
    let description = describe(&command);
    debug!("Running {description}");
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| CommandError::Spawn {
        command: description.clone(),
        source,
    })?;
    let output = match timeout {
        Some(after) => match time::timeout(after, child.wait_with_output()).await {
            Ok(output) => output,
            Err(_) => return Err(CommandError::TimedOut { command: description, after }),
        },
        None => child.wait_with_output().await,
    }
    .map_err(|source| CommandError::Spawn { command: description.clone(), source })?;

    if output.status.success() {
        Ok(())
    } else {
        Err(CommandError::Failed {
            command: description,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn describe(command: &Command) -> String {
    let std = command.as_std();
    std::iter::once(std.get_program())
        .chain(std.get_args())
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn count_refs(repo_path: &Path) -> Option<usize> {
    let inspect = || -> Result<usize, git2::Error> {
        let repository = GitRepository::open_bare(repo_path)?;
        let count = repository.references()?.count();
        Ok(count)
    };
    match inspect() {
        Ok(count) => Some(count),
        Err(error) => {
            debug!("could not inspect {}: {error}", repo_path.display());
            None
        }
    }
}
