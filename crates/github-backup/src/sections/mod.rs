//! The backup tree. Each section is one top-level node (and its subtree)
//! under a user or repository target, walked in the order listed here.

use std::fmt;

use crate::checkpoint::CheckpointId;
use crate::remote::{Repository, User};
use crate::traversal::{Flow, Node, Traversal};

pub mod commit_comments;
pub mod hooks;
pub mod issues;
pub mod milestones;
pub mod pulls;
pub mod repo;
pub mod teams;
pub mod user;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Structural, free.
    Group,
    /// Lists its children from the remote.
    Scope,
    /// Fetches and writes artifacts.
    Step,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NodeKind::Group => "group",
            NodeKind::Scope => "scope",
            NodeKind::Step => "step",
        })
    }
}

/// Static description of a node. Implemented by `#[Section]`.
pub trait SectionInfo {
    fn token(&self) -> &'static str;
    fn kind(&self) -> NodeKind;
    fn cost(&self) -> u32;
    fn label(&self) -> &'static str;
}

/// One line of `ghbackup plan`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLine {
    pub path: String,
    pub kind: NodeKind,
    pub cost: u32,
    pub label: &'static str,
}

impl PlanLine {
    pub fn new(path: impl Into<String>, kind: NodeKind, cost: u32, label: &'static str) -> Self {
        Self {
            path: path.into(),
            kind,
            cost,
            label,
        }
    }
}

pub trait Section<T: ?Sized>: SectionInfo {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, target: &T) -> Flow;

    fn node(&self, parent: &CheckpointId) -> Node {
        Node::of(self, parent)
    }

    /// Nodes beneath this one, with paths relative to it.
    fn outline(&self) -> Vec<PlanLine> {
        Vec::new()
    }
}

pub fn user_sections() -> Vec<Box<dyn Section<User>>> {
    vec![
        Box::new(user::FollowersSection),
        Box::new(user::FollowsSection),
        Box::new(user::OrgsSection),
    ]
}

pub fn repo_sections() -> Vec<Box<dyn Section<Repository>>> {
    vec![
        Box::new(repo::OwnerSection),
        Box::new(repo::InfoSection),
        Box::new(issues::IssuesSection),
        Box::new(pulls::PullsSection),
        Box::new(hooks::HooksSection),
        Box::new(teams::TeamsSection),
        Box::new(commit_comments::CommitCommentsSection),
        Box::new(milestones::MilestonesSection),
    ]
}

/// Walk every section in order, stopping at the first halt.
pub fn walk_all<T: ?Sized>(
    sections: &[Box<dyn Section<T>>],
    t: &mut Traversal<'_>,
    parent: &CheckpointId,
    target: &T,
) -> Flow {
    for s in sections {
        s.walk(t, parent, target)?;
    }
    Ok(())
}

/// Flattened tree for display.
pub fn plan<T: ?Sized>(sections: &[Box<dyn Section<T>>]) -> Vec<PlanLine> {
    let mut out = Vec::new();
    for s in sections {
        out.push(PlanLine::new(s.token(), s.kind(), s.cost(), s.label()));
        for child in s.outline() {
            out.push(PlanLine {
                path: format!("{}/{}", s.token(), child.path),
                ..child
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_tree_is_in_fixed_order() {
        let tokens: Vec<&str> = repo_sections().iter().map(|s| s.token()).collect();
        assert_eq!(
            tokens,
            vec![
                "OWNER",
                "INFO",
                "ISSUES",
                "PULLS",
                "HOOKS",
                "TEAMS",
                "COMMIT_COMMENTS",
                "MILESTONES"
            ]
        );
    }

    #[test]
    fn plan_lists_nested_nodes_with_costs() {
        let lines = plan(&repo_sections());
        let find = |p: &str| lines.iter().find(|l| l.path == p).cloned();
        assert_eq!(
            find("TEAMS").map(|l| (l.kind, l.cost)),
            Some((NodeKind::Scope, 2))
        );
        assert_eq!(
            find("ISSUES/OPEN/<number>").map(|l| l.kind),
            Some(NodeKind::Step)
        );
        assert_eq!(find("ISSUES").map(|l| l.cost), Some(0));
        assert_eq!(find("OWNER/FOLLOWS").map(|l| l.cost), Some(1));
    }
}
