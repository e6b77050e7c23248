use github_backup_macros::Section;

use crate::artifact::{block, field};
use crate::checkpoint::CheckpointId;
use crate::remote::{IssueState, PullRequest, Repository};
use crate::sections::issues::{comment_lines, labels_line, milestone_line};
use crate::sections::{NodeKind, PlanLine, Section};
use crate::traversal::{Flow, Listing, Node, Traversal};

const MERGED: &str = "MERGED";
const COMMENTS: &str = "COMMENTS";

/// One file per pull request, written in two steps: the header with merge
/// status, then the conversation appended as its own section.
#[Section(token = "PULLS", kind = "group", label = "Pull requests")]
pub struct PullsSection;

impl Section<Repository> for PullsSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, repo: &Repository) -> Flow {
        let id = Self::id(parent);
        let name = repo.repo_name();
        t.group(self.node(parent), |t| {
            for state in IssueState::ALL {
                let state_id = id.child(state.token());
                t.scope(
                    Node::scope(state_id.clone(), 1, "Pull request listing"),
                    |t| {
                        let mut pulls = t.remote().pull_requests(&name, state)?;
                        pulls.sort_by_key(|p| p.number);
                        Ok(pulls)
                    },
                    |t, pulls| {
                        for pull in pulls {
                            let pull_id = state_id.child(pull.number);
                            let rel = format!("pull_requests/{state}/{}.txt", pull.number);
                            t.group(Node::group(pull_id.clone(), "Pull request"), |t| {
                                t.step(Node::step(pull_id.child(MERGED), 1, "Merge status"), |t| {
                                    let merged = t.remote().pull_merged(&name, pull.number)?;
                                    t.writer().overwrite(&rel, &pull_lines(&pull, merged))
                                })?;
                                t.step(Node::step(pull_id.child(COMMENTS), 1, "Pull request comments"), |t| {
                                    let comments = t.remote().issue_comments(&name, pull.number)?;
                                    t.writer()
                                        .append_section(&rel, "comments:", &comment_lines(&comments))
                                })
                            })?;
                        }
                        Ok(())
                    },
                )?;
            }
            Ok(())
        })
    }

    fn outline(&self) -> Vec<PlanLine> {
        IssueState::ALL
            .iter()
            .flat_map(|s| {
                let tok = s.token();
                [
                    PlanLine::new(tok, NodeKind::Scope, 1, "Pull request listing"),
                    PlanLine::new(format!("{tok}/<number>"), NodeKind::Group, 0, "Pull request"),
                    PlanLine::new(format!("{tok}/<number>/{MERGED}"), NodeKind::Step, 1, "Merge status"),
                    PlanLine::new(
                        format!("{tok}/<number>/{COMMENTS}"),
                        NodeKind::Step,
                        1,
                        "Pull request comments",
                    ),
                ]
            })
            .collect()
    }
}

impl Listing for Vec<PullRequest> {
    fn child_segments(&self) -> Vec<String> {
        self.iter().map(|p| p.number.to_string()).collect()
    }
}

fn pull_lines(pull: &PullRequest, merged: bool) -> Vec<String> {
    let mut lines = vec![
        field("title", Some(&pull.title)),
        field("number", Some(pull.number)),
        field("state", Some(&pull.state)),
        field("merged", Some(if merged { "yes" } else { "no" })),
        milestone_line(pull.milestone.as_ref()),
        labels_line(&pull.labels),
        "body:".to_string(),
    ];
    lines.extend(block(pull.body.as_deref()));
    lines
}
