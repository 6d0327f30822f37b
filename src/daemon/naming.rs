//! Registry keys derived from repository origins.

use std::path::{Component, Path};
use url::Url;

/// Derive a repository name from its origin.
///
/// Hierarchical URLs (`https://host/path`) become `host/path`. Anything else is
/// read as an SCP-like address (`[user@]host:path`) and becomes `host/path`.
/// The result may be empty, in which case the repository needs an explicit name.
pub fn derive_name(origin: &str) -> String {
    if let Ok(url) = Url::parse(origin) {
        if !url.cannot_be_a_base() {
            return from_url(&url);
        }
    }
    from_scp(origin)
}

fn from_url(url: &Url) -> String {
    let mut host = url.host_str().unwrap_or_default().to_string();
    if let Some(port) = url.port() {
        host.push_str(&format!(":{port}"));
    }
    let path = urlencoding::decode(url.path())
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| url.path().to_string());
    collapse_slashes(&format!("{host}{path}"))
}

fn from_scp(origin: &str) -> String {
    let address = origin.rsplit('@').next().unwrap_or_default();
    collapse_slashes(&address.replace(':', "/"))
}

/// Drop empty segments, so `host//srv/repo` becomes `host/srv/repo`.
fn collapse_slashes(name: &str) -> String {
    name.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Check that a name can safely be used as a directory below the base path
/// and as a URL prefix.
pub fn validate_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("name is empty");
    }
    if name.starts_with('/') || Path::new(name).is_absolute() {
        return Err("name must be a relative path");
    }
    for segment in name.split('/') {
        if segment.is_empty() {
            return Err("name contains an empty path segment");
        }
        if segment == "." || segment == ".." {
            return Err("name must not contain '.' or '..' segments");
        }
    }
    if !Path::new(name)
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
    {
        return Err("name must be a plain relative path");
    }
    Ok(())
}
