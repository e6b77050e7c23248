use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::WorkspaceSettings;
use crate::error::{Error, Result};
use crate::remote::RepoName;
use crate::vcs::{VersionControl, parse_github_remote};

/// What one backup covers: a user's social graph or a whole repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    User(String),
    Repo(RepoName),
}

impl Target {
    /// Dedicated branch holding this target's artifacts and resume marker.
    pub fn branch(&self, prefix: &str) -> String {
        let suffix = match self {
            Target::User(login) => format!("user-{login}"),
            Target::Repo(r) => format!("repo-{}-{}", r.owner, r.name),
        };
        format!("{prefix}{}", branch_safe(&suffix))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::User(login) => write!(f, "user {login}"),
            Target::Repo(r) => write!(f, "repo {r}"),
        }
    }
}

fn branch_safe(raw: &str) -> String {
    raw.to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Targets named on the command line or in config. With neither a user nor
/// a repository, the repository behind the `origin` remote is used.
pub fn resolve_targets(
    user: Option<&str>,
    repo: Option<&str>,
    vcs: &dyn VersionControl,
) -> Result<Vec<Target>> {
    let user = user.map(str::trim).filter(|s| !s.is_empty());
    let repo = repo.map(str::trim).filter(|s| !s.is_empty());

    let mut out = Vec::new();
    if let Some(u) = user {
        out.push(Target::User(u.to_string()));
    }
    if let Some(r) = repo {
        out.push(Target::Repo(r.parse()?));
    }
    if !out.is_empty() {
        return Ok(out);
    }

    let url = vcs.remote_url("origin")?.ok_or_else(|| {
        Error::msg("no --user or --repo given and the git directory has no 'origin' remote")
    })?;
    let repo = parse_github_remote(&url).ok_or_else(|| {
        Error::msg(format!(
            "no --user or --repo given and origin '{url}' is not a github.com repository"
        ))
    })?;
    Ok(vec![Target::Repo(repo)])
}

#[derive(Debug, Clone)]
pub struct WorkspacePaths {
    pub git_dir: PathBuf,
    pub branch_prefix: String,
    /// Marker location relative to the worktree root.
    pub resume_file: PathBuf,
}

impl WorkspacePaths {
    pub fn marker_path(&self, worktree: &Path) -> PathBuf {
        worktree.join(&self.resume_file)
    }
}

/// Resolve configured paths. `git_dir_override` comes from `-d`.
pub fn load_paths(cfg: &WorkspaceSettings, git_dir_override: Option<&Path>) -> Result<WorkspacePaths> {
    let cwd = std::env::current_dir().map_err(|e| Error::msg(format!("cwd error: {e}")))?;
    let git_dir = match git_dir_override {
        Some(p) => p.to_path_buf(),
        None => {
            let raw = cfg.git_dir.trim();
            if raw.is_empty() {
                return Err(Error::msg("empty [workspace].git_dir"));
            }
            PathBuf::from(raw)
        }
    };
    let git_dir = if git_dir.is_absolute() {
        git_dir
    } else {
        cwd.join(git_dir)
    };
    Ok(WorkspacePaths {
        git_dir,
        branch_prefix: cfg.branch_prefix.clone(),
        resume_file: PathBuf::from(cfg.resume_file.trim()),
    })
}
