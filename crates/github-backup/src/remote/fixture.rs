use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::{
    CommitComment, Comment, Hook, Issue, IssueState, Milestone, Organization, PullRequest,
    RemoteSource, RepoName, Repository, Team, User, UserRef,
};

fn default_quota() -> i64 {
    5000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureUser {
    pub profile: Option<User>,
    pub followers: Vec<UserRef>,
    pub following: Vec<UserRef>,
    pub orgs: Vec<Organization>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureRepo {
    pub repo: Option<Repository>,
    pub collaborators: Vec<UserRef>,
    /// Issues and pull requests share numbering, and comments, as on GitHub.
    pub issues: Vec<Issue>,
    pub pulls: Vec<PullRequest>,
    pub comments: BTreeMap<u64, Vec<Comment>>,
    pub merged: BTreeSet<u64>,
    pub hooks: Vec<Hook>,
    pub teams: Vec<Team>,
    pub commit_comments: Vec<CommitComment>,
    pub milestones: Vec<Milestone>,
}

/// Offline snapshot of a remote, as read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FixtureData {
    #[serde(default = "default_quota")]
    pub quota: i64,
    pub users: BTreeMap<String, FixtureUser>,
    pub repos: BTreeMap<String, FixtureRepo>,
    pub team_members: BTreeMap<u64, Vec<UserRef>>,
    /// Call keys (see [`FixtureSource::calls`]) that fail instead of answering.
    pub failures: BTreeSet<String>,
}

impl Default for FixtureData {
    fn default() -> Self {
        Self {
            quota: default_quota(),
            users: BTreeMap::new(),
            repos: BTreeMap::new(),
            team_members: BTreeMap::new(),
            failures: BTreeSet::new(),
        }
    }
}

/// `RemoteSource` over an in-memory snapshot. Records every call it serves.
#[derive(Debug)]
pub struct FixtureSource {
    data: FixtureData,
    calls: RefCell<Vec<String>>,
}

impl FixtureSource {
    pub fn new(data: FixtureData) -> Self {
        Self {
            data,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::msg(format!("failed to read fixture {}: {e}", path.display())))?;
        let data: FixtureData = serde_json::from_str(&raw)
            .map_err(|e| Error::msg(format!("failed to parse fixture {}: {e}", path.display())))?;
        Ok(Self::new(data))
    }

    pub fn data(&self) -> &FixtureData {
        &self.data
    }

    /// Every remote call served so far, as `"<op> <args>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn reset_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, key: String) -> Result<()> {
        let failing = self.data.failures.contains(&key);
        self.calls.borrow_mut().push(key.clone());
        if failing {
            return Err(Error::msg(format!("fixture failure for '{key}'")));
        }
        Ok(())
    }

    fn user_entry(&self, login: &str) -> Option<&FixtureUser> {
        self.data.users.get(login)
    }

    fn repo_entry(&self, repo: &RepoName) -> Option<&FixtureRepo> {
        self.data.repos.get(&repo.to_string())
    }
}

impl RemoteSource for FixtureSource {
    fn remaining_quota(&self) -> Result<i64> {
        if self.data.failures.contains("rate_limit") {
            return Err(Error::msg("fixture failure for 'rate_limit'"));
        }
        Ok(self.data.quota)
    }

    fn user(&self, login: &str) -> Result<Option<User>> {
        self.record(format!("user {login}"))?;
        Ok(self.user_entry(login).and_then(|u| u.profile.clone()))
    }

    fn repository(&self, repo: &RepoName) -> Result<Option<Repository>> {
        self.record(format!("repository {repo}"))?;
        Ok(self.repo_entry(repo).and_then(|r| r.repo.clone()))
    }

    fn followers(&self, login: &str) -> Result<Vec<UserRef>> {
        self.record(format!("followers {login}"))?;
        Ok(self
            .user_entry(login)
            .map(|u| u.followers.clone())
            .unwrap_or_default())
    }

    fn following(&self, login: &str) -> Result<Vec<UserRef>> {
        self.record(format!("following {login}"))?;
        Ok(self
            .user_entry(login)
            .map(|u| u.following.clone())
            .unwrap_or_default())
    }

    fn organizations(&self, login: &str) -> Result<Vec<Organization>> {
        self.record(format!("orgs {login}"))?;
        Ok(self
            .user_entry(login)
            .map(|u| u.orgs.clone())
            .unwrap_or_default())
    }

    fn collaborators(&self, repo: &RepoName) -> Result<Vec<UserRef>> {
        self.record(format!("collaborators {repo}"))?;
        Ok(self
            .repo_entry(repo)
            .map(|r| r.collaborators.clone())
            .unwrap_or_default())
    }

    fn issues(&self, repo: &RepoName, state: IssueState) -> Result<Vec<Issue>> {
        self.record(format!("issues {repo} {state}"))?;
        Ok(self
            .repo_entry(repo)
            .map(|r| {
                r.issues
                    .iter()
                    .filter(|i| state.matches(&i.state) && i.pull_request.is_none())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn issue_comments(&self, repo: &RepoName, number: u64) -> Result<Vec<Comment>> {
        self.record(format!("comments {repo} {number}"))?;
        Ok(self
            .repo_entry(repo)
            .and_then(|r| r.comments.get(&number).cloned())
            .unwrap_or_default())
    }

    fn pull_requests(&self, repo: &RepoName, state: IssueState) -> Result<Vec<PullRequest>> {
        self.record(format!("pulls {repo} {state}"))?;
        Ok(self
            .repo_entry(repo)
            .map(|r| {
                r.pulls
                    .iter()
                    .filter(|p| state.matches(&p.state))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn pull_merged(&self, repo: &RepoName, number: u64) -> Result<bool> {
        self.record(format!("merged {repo} {number}"))?;
        Ok(self
            .repo_entry(repo)
            .is_some_and(|r| r.merged.contains(&number)))
    }

    fn hooks(&self, repo: &RepoName) -> Result<Vec<Hook>> {
        self.record(format!("hooks {repo}"))?;
        Ok(self
            .repo_entry(repo)
            .map(|r| r.hooks.clone())
            .unwrap_or_default())
    }

    fn teams(&self, repo: &RepoName) -> Result<Vec<Team>> {
        self.record(format!("teams {repo}"))?;
        Ok(self
            .repo_entry(repo)
            .map(|r| r.teams.clone())
            .unwrap_or_default())
    }

    fn team_members(&self, team: &Team) -> Result<Vec<UserRef>> {
        self.record(format!("team_members {}", team.id))?;
        Ok(self
            .data
            .team_members
            .get(&team.id)
            .cloned()
            .unwrap_or_default())
    }

    fn commit_comments(&self, repo: &RepoName) -> Result<Vec<CommitComment>> {
        self.record(format!("commit_comments {repo}"))?;
        Ok(self
            .repo_entry(repo)
            .map(|r| r.commit_comments.clone())
            .unwrap_or_default())
    }

    fn milestones(&self, repo: &RepoName, state: IssueState) -> Result<Vec<Milestone>> {
        self.record(format!("milestones {repo} {state}"))?;
        Ok(self
            .repo_entry(repo)
            .map(|r| {
                r.milestones
                    .iter()
                    .filter(|m| state.matches(&m.state))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
