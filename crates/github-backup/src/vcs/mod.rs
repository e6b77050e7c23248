//! Local working-tree operations used to isolate a backup on its own branch.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;
use crate::remote::RepoName;

pub mod git;

pub use git::GitCli;

pub trait VersionControl {
    /// Root of the working tree. Artifact and marker paths are relative to it.
    fn worktree(&self) -> &Path;

    /// Branch name, or a commit id when detached.
    fn current_ref(&self) -> Result<String>;
    /// Tracked changes and untracked files, relative to the worktree.
    fn modified_paths(&self) -> Result<Vec<String>>;
    /// Set aside local changes, untracked files included.
    fn stash(&self) -> Result<()>;
    fn unstash(&self) -> Result<()>;

    fn branch_exists(&self, name: &str) -> Result<bool>;
    fn checkout(&self, name: &str) -> Result<()>;
    /// New branch with no history, an empty index and no untracked files.
    fn create_orphan_branch(&self, name: &str) -> Result<()>;

    fn stage(&self, paths: &[&Path]) -> Result<()>;
    /// Drop `path` from the index. For a deleted file this stages the deletion.
    fn unstage(&self, path: &Path) -> Result<()>;
    fn has_staged_changes(&self) -> Result<bool>;
    fn commit(&self, message: &str) -> Result<()>;
    fn clean_untracked(&self) -> Result<()>;

    fn remote_url(&self, remote: &str) -> Result<Option<String>>;
    /// Contents of `path` as committed on `rev`, without checking it out.
    fn show_file(&self, rev: &str, path: &Path) -> Result<Option<String>>;
}

/// `owner/name` from a github.com remote URL, https or ssh.
pub fn parse_github_remote(url: &str) -> Option<RepoName> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(
            r"^(?:https?://(?:[^@/]+@)?github\.com/|ssh://git@github\.com/|git@github\.com:)([A-Za-z0-9_.-]+)/([A-Za-z0-9_.-]+?)(?:\.git)?/?$",
        )
        .expect("static regex")
    });
    let caps = re.captures(url.trim())?;
    Some(RepoName::new(caps.get(1)?.as_str(), caps.get(2)?.as_str()))
}
