//! Remote data source: the records a backup reads and the trait that serves them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub mod fixture;
pub mod github;

pub use fixture::FixtureSource;
pub use github::GithubClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IssueState {
    Open,
    Closed,
}

impl IssueState {
    /// Traversal order: open before closed.
    pub const ALL: [IssueState; 2] = [IssueState::Open, IssueState::Closed];

    pub fn as_str(self) -> &'static str {
        match self {
            IssueState::Open => "open",
            IssueState::Closed => "closed",
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            IssueState::Open => "OPEN",
            IssueState::Closed => "CLOSED",
        }
    }

    pub fn matches(self, state: &str) -> bool {
        state.eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `owner/name`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RepoName {
    pub owner: String,
    pub name: String,
}

impl RepoName {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoName {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim().trim_matches('/');
        let Some((owner, name)) = raw.split_once('/') else {
            return Err(Error::msg(format!(
                "repository '{raw}' must look like owner/name"
            )));
        };
        let owner = owner.trim();
        let name = name.trim().trim_end_matches(".git");
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(Error::msg(format!(
                "repository '{raw}' must look like owner/name"
            )));
        }
        Ok(Self::new(owner, name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub login: String,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub login: String,
    pub id: u64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub location: Option<String>,
    pub avatar_url: Option<String>,
    pub blog: Option<String>,
    pub company: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub login: String,
    pub id: u64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: u64,
    pub name: String,
    pub full_name: String,
    pub owner: UserRef,
    pub language: Option<String>,
    pub description: Option<String>,
    pub homepage: Option<String>,
    pub default_branch: Option<String>,
    pub created_at: Option<String>,
}

impl Repository {
    pub fn repo_name(&self) -> RepoName {
        RepoName::new(self.owner.login.clone(), self.name.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneRef {
    pub number: u64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub assignee: Option<UserRef>,
    pub milestone: Option<MilestoneRef>,
    #[serde(default)]
    pub labels: Vec<Label>,
    // Present when the "issue" is really a pull request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: u64,
    pub user: Option<UserRef>,
    pub body: Option<String>,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    pub milestone: Option<MilestoneRef>,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hook {
    pub id: u64,
    pub name: String,
    pub active: bool,
    #[serde(default)]
    pub events: Vec<String>,
    #[serde(default)]
    pub config: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub permission: Option<String>,
    pub members_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitComment {
    pub id: u64,
    pub commit_id: String,
    pub path: Option<String>,
    pub line: Option<u64>,
    pub body: Option<String>,
    pub user: Option<UserRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub number: u64,
    pub title: String,
    pub description: Option<String>,
    pub state: String,
}

/// Everything the backup reads from the remote.
///
/// Listings are finite and can only be restarted from the beginning; the
/// traversal never assumes a cursor survives between runs. `Ok(None)` and
/// `Ok(false)` stand for "not found".
pub trait RemoteSource {
    /// Accesses left in the current rate-limit window. Must not consume one.
    fn remaining_quota(&self) -> Result<i64>;

    fn user(&self, login: &str) -> Result<Option<User>>;
    fn repository(&self, repo: &RepoName) -> Result<Option<Repository>>;

    fn followers(&self, login: &str) -> Result<Vec<UserRef>>;
    fn following(&self, login: &str) -> Result<Vec<UserRef>>;
    fn organizations(&self, login: &str) -> Result<Vec<Organization>>;

    fn collaborators(&self, repo: &RepoName) -> Result<Vec<UserRef>>;
    fn issues(&self, repo: &RepoName, state: IssueState) -> Result<Vec<Issue>>;
    fn issue_comments(&self, repo: &RepoName, number: u64) -> Result<Vec<Comment>>;
    fn pull_requests(&self, repo: &RepoName, state: IssueState) -> Result<Vec<PullRequest>>;
    fn pull_merged(&self, repo: &RepoName, number: u64) -> Result<bool>;
    fn hooks(&self, repo: &RepoName) -> Result<Vec<Hook>>;
    fn teams(&self, repo: &RepoName) -> Result<Vec<Team>>;
    fn team_members(&self, team: &Team) -> Result<Vec<UserRef>>;
    fn commit_comments(&self, repo: &RepoName) -> Result<Vec<CommitComment>>;
    fn milestones(&self, repo: &RepoName, state: IssueState) -> Result<Vec<Milestone>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_name_parses_common_forms() {
        let r: RepoName = "octo/hello".parse().expect("parse");
        assert_eq!(r, RepoName::new("octo", "hello"));
        let r: RepoName = "/octo/hello.git".parse().expect("parse");
        assert_eq!(r.to_string(), "octo/hello");
        assert!("octo".parse::<RepoName>().is_err());
        assert!("octo/a/b".parse::<RepoName>().is_err());
        assert!("/hello".parse::<RepoName>().is_err());
    }

    #[test]
    fn issue_decodes_github_shape() {
        let raw = r#"{
            "number": 3, "title": "Crash", "body": null, "state": "open",
            "assignee": {"login": "a", "id": 1},
            "milestone": {"number": 2, "title": "v1", "extra": true},
            "labels": [{"name": "bug", "color": "f00"}],
            "pull_request": {"url": "x"}
        }"#;
        let issue: Issue = serde_json::from_str(raw).expect("decode");
        assert_eq!(issue.number, 3);
        assert!(issue.body.is_none());
        assert!(issue.pull_request.is_some());
        assert_eq!(issue.milestone.map(|m| m.title), Some("v1".into()));
    }
}
