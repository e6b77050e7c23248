#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use github_backup::artifact::ArtifactWriter;
use github_backup::budget::Budget;
use github_backup::checkpoint::{CheckpointId, ResumeStore};
use github_backup::remote::fixture::FixtureData;
use github_backup::remote::{FixtureSource, RemoteSource, RepoName, Repository};
use github_backup::report::{NullSink, RunReport};
use github_backup::sections::{repo_sections, walk_all};
use github_backup::traversal::{Flow, RunCtx, Traversal};

pub const MARKER: &str = "RESUME_POINT";

/// Traversal cost of a full pass over `sample()`, target fetch excluded.
pub const FULL_COST: i64 = 24;

pub fn have_bin(name: &str) -> bool {
    Command::new(name)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

pub fn id(s: &str) -> CheckpointId {
    s.parse().expect("parse id")
}

pub fn sample() -> FixtureData {
    serde_json::from_value(serde_json::json!({
        "quota": 5000,
        "users": {
            "octo": {
                "profile": {
                    "login": "octo", "id": 1, "name": "Octo Cat",
                    "location": "Sea", "created_at": "2011-01-25T18:44:36Z"
                },
                "followers": [{"login": "bea", "id": 3}, {"login": "al", "id": 2}],
                "following": [{"login": "cy", "id": 4}],
                "orgs": [{"login": "github", "id": 9, "description": "How people build software"}]
            }
        },
        "repos": {
            "octo/hello": {
                "repo": {
                    "id": 100, "name": "hello", "full_name": "octo/hello",
                    "owner": {"login": "octo", "id": 1},
                    "language": "Rust", "description": "Says hello",
                    "default_branch": "main", "created_at": "2020-02-02T00:00:00Z"
                },
                "collaborators": [{"login": "octo", "id": 1}, {"login": "al", "id": 2}],
                "issues": [
                    {"number": 10, "title": "Ten", "body": "later", "state": "open"},
                    {"number": 1, "title": "One", "body": "first\nsecond line", "state": "open",
                     "labels": [{"name": "bug"}], "assignee": {"login": "al", "id": 2}},
                    {"number": 2, "title": "Two", "body": null, "state": "closed",
                     "milestone": {"number": 1, "title": "v1"}},
                    {"number": 3, "title": "PR as issue", "state": "open", "pull_request": {"url": "x"}}
                ],
                "pulls": [
                    {"number": 3, "title": "Add greeting", "body": "please", "state": "open"},
                    {"number": 4, "title": "Old change", "body": "done", "state": "closed"}
                ],
                "comments": {
                    "1": [{"id": 11, "user": {"login": "bea", "id": 3}, "body": "me too",
                           "created_at": "2021-01-01T00:00:00Z"}],
                    "3": [{"id": 31, "user": {"login": "octo", "id": 1}, "body": "LGTM"}]
                },
                "merged": [4],
                "hooks": [{"id": 7, "name": "web", "active": true, "events": ["push"],
                           "config": {"url": "https://example.invalid/hook"}}],
                "teams": [{"id": 5, "name": "Core", "slug": "core", "permission": "push"}],
                "commit_comments": [
                    {"id": 2, "commit_id": "abc123", "path": "src/lib.rs", "line": 4, "body": "nit"},
                    {"id": 1, "commit_id": "abc123", "body": "why?"},
                    {"id": 3, "commit_id": "0ff1ce", "body": "ok"}
                ],
                "milestones": [
                    {"number": 1, "title": "v1", "state": "open", "description": "first"},
                    {"number": 2, "title": "v0", "state": "closed"}
                ]
            }
        },
        "team_members": {"5": [{"login": "octo", "id": 1}]}
    }))
    .expect("sample fixture")
}

pub fn hello() -> RepoName {
    RepoName::new("octo", "hello")
}

pub struct Pass {
    pub flow: Flow,
    pub report: RunReport,
    pub remaining: i64,
}

/// One traversal of the sample repository into `dir`, clearing the marker
/// on completion the way the finalizer does.
pub fn walk_repo(dir: &Path, quota: i64, src: &FixtureSource) -> Pass {
    let repo: Repository = src
        .repository(&hello())
        .expect("repository")
        .expect("repository exists");
    let mut store = ResumeStore::load(dir.join(MARKER)).expect("load marker");
    let mut writer = ArtifactWriter::new(dir);
    let mut ctx = RunCtx::new(Budget::new(quota), Arc::new(NullSink));
    let flow = {
        let root = CheckpointId::root();
        let mut t = Traversal::new(&mut ctx, &mut store, src, &mut writer);
        t.run(|t| walk_all(&repo_sections(), t, &root, &repo))
    };
    if flow.is_ok() {
        store.clear().expect("clear marker");
    }
    Pass {
        flow,
        report: ctx.report,
        remaining: ctx.budget.remaining(),
    }
}

/// Every file under `dir` except the marker, keyed by relative path.
pub fn read_tree(dir: &Path) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1) {
        let entry = entry.expect("walk");
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dir)
            .expect("relative")
            .to_string_lossy()
            .replace('\\', "/");
        if rel == MARKER {
            continue;
        }
        out.insert(rel, fs::read_to_string(entry.path()).expect("read artifact"));
    }
    out
}
