//! Repository discovery for the create picker.
//!
//! Walks the configured roots looking for directories that contain `.git`
//! and streams what it finds over a channel, so the picker can show results
//! while the walk is still running.

use crate::config::RepositorySettings;
use crate::coordinator::RepoTarget;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

const CHANNEL_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    /// Account or group owning the `origin` remote, if any.
    pub owner: Option<String>,
    pub path: PathBuf,
    /// `origin` remote URL, empty if none.
    pub url: String,
}

impl Repository {
    fn at(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().into_owned();
        let url = std::fs::read_to_string(path.join(".git").join("config"))
            .ok()
            .and_then(|config| origin_url(&config))
            .unwrap_or_default();
        let owner = url_owner(&url);
        Some(Repository {
            name,
            owner,
            path: path.to_path_buf(),
            url,
        })
    }

    pub fn target(&self) -> RepoTarget {
        RepoTarget {
            name: self.name.clone(),
            owner: self.owner.clone(),
            path: self.path.clone(),
            command: None,
        }
    }

    /// Text the picker filters on.
    pub fn label(&self) -> String {
        match &self.owner {
            Some(owner) => format!("{owner}/{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// `url` of `[remote "origin"]` in a git config file.
pub fn origin_url(config: &str) -> Option<String> {
    let mut in_origin = false;
    for line in config.lines().map(str::trim) {
        if line.starts_with('[') {
            in_origin = line == r#"[remote "origin"]"#;
            continue;
        }
        if !in_origin {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "url" {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Owner segment of an scp-style or URL-style remote.
///
/// `git@github.com:alice/core.git` and `https://github.com/alice/core` both
/// give `alice`.
pub fn url_owner(url: &str) -> Option<String> {
    let rest = match url.split_once("://") {
        Some((_, rest)) => rest.split_once('/')?.1,
        None => url.split_once(':')?.1,
    };
    let mut segments: Vec<&str> = rest.trim_end_matches('/').split('/').collect();
    segments.pop()?;
    segments
        .pop()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Walk `roots` synchronously, calling `found` for each repository. Stops
/// early when `found` returns false. Hidden directories and repository
/// contents are not descended into.
pub fn walk(roots: &[PathBuf], depth: usize, mut found: impl FnMut(Repository) -> bool) {
    for root in roots {
        let mut entries = WalkDir::new(root)
            .min_depth(1)
            .max_depth(depth)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = entries.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!(target: "muxctx::repos", "skipping: {e}");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                entries.skip_current_dir();
                continue;
            }
            if !entry.path().join(".git").exists() {
                continue;
            }
            entries.skip_current_dir();
            if let Some(repo) = Repository::at(entry.path()) {
                if !found(repo) {
                    return;
                }
            }
        }
    }
}

/// Every repository below `roots`, in walk order.
pub fn scan(roots: &[PathBuf], depth: usize) -> Vec<Repository> {
    let mut out = Vec::new();
    walk(roots, depth, |repo| {
        out.push(repo);
        true
    });
    out
}

/// Start a background walk. The receiver closes when the walk finishes; the
/// walk stops once the receiver is dropped.
pub fn discover(settings: &RepositorySettings) -> mpsc::Receiver<Repository> {
    let (tx, rx) = mpsc::channel(CHANNEL_SIZE);
    let roots = settings.roots.clone();
    let depth = settings.depth;
    tokio::task::spawn_blocking(move || {
        for root in roots.iter().filter(|r| !r.is_dir()) {
            warn!(target: "muxctx::repos", "repository root {} does not exist", root.display());
        }
        walk(&roots, depth, |repo| tx.blocking_send(repo).is_ok());
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_repo(root: &Path, rel: &str, url: Option<&str>) -> PathBuf {
        let path = root.join(rel);
        std::fs::create_dir_all(path.join(".git")).unwrap();
        if let Some(url) = url {
            let config = format!(
                "[core]\n\tbare = false\n[remote \"upstream\"]\n\turl = git@x:y/z.git\n[remote \"origin\"]\n\turl = {url}\n\tfetch = +refs/heads/*:refs/remotes/origin/*\n"
            );
            std::fs::write(path.join(".git/config"), config).unwrap();
        }
        path
    }

    #[test]
    fn test_origin_url() {
        let config = "[remote \"upstream\"]\n url = a\n[remote \"origin\"]\n url = b\n";
        assert_eq!(origin_url(config).as_deref(), Some("b"));
        assert_eq!(origin_url("[core]\n url = a\n"), None);
    }

    #[test]
    fn test_url_owner() {
        assert_eq!(url_owner("git@github.com:alice/core.git").as_deref(), Some("alice"));
        assert_eq!(url_owner("https://github.com/alice/core").as_deref(), Some("alice"));
        assert_eq!(url_owner("https://gitlab.com/g/sub/core.git/").as_deref(), Some("sub"));
        assert_eq!(url_owner("https://host/core"), None);
        assert_eq!(url_owner(""), None);
    }

    #[test]
    fn test_scan_finds_nested_repos_and_skips_contents() {
        let dir = TempDir::new().unwrap();
        git_repo(dir.path(), "work/core", Some("git@github.com:alice/core.git"));
        git_repo(dir.path(), "work/core/vendor/inner", None);
        git_repo(dir.path(), "tools", None);
        git_repo(dir.path(), ".hidden/secret", None);
        git_repo(dir.path(), "a/b/c/too-deep", None);

        let repos = scan(&[dir.path().to_path_buf()], 3);
        let names: Vec<_> = repos.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["tools", "core"]);

        let core = &repos[1];
        assert_eq!(core.owner.as_deref(), Some("alice"));
        assert_eq!(core.label(), "alice/core");
        assert_eq!(core.target().path, dir.path().join("work/core"));
        assert_eq!(repos[0].label(), "tools");
    }

    #[tokio::test]
    async fn test_discover_streams_until_done() {
        let dir = TempDir::new().unwrap();
        git_repo(dir.path(), "one", None);
        git_repo(dir.path(), "two", None);
        let settings = RepositorySettings {
            roots: vec![dir.path().to_path_buf(), dir.path().join("missing")],
            depth: 2,
        };

        let mut rx = discover(&settings);
        let mut names = Vec::new();
        while let Some(repo) = rx.recv().await {
            names.push(repo.name);
        }
        assert_eq!(names, vec!["one", "two"]);
    }
}
