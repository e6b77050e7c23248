use github_backup_macros::Section;

use crate::artifact::{block, field, item};
use crate::checkpoint::CheckpointId;
use crate::remote::{Comment, Issue, IssueState, Label, MilestoneRef, Repository};
use crate::sections::{NodeKind, PlanLine, Section};
use crate::traversal::{Flow, Listing, Node, Traversal};

#[Section(token = "ISSUES", kind = "group", label = "Issues")]
pub struct IssuesSection;

impl Section<Repository> for IssuesSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, repo: &Repository) -> Flow {
        let id = Self::id(parent);
        let name = repo.repo_name();
        t.group(self.node(parent), |t| {
            for state in IssueState::ALL {
                let state_id = id.child(state.token());
                t.scope(
                    Node::scope(state_id.clone(), 1, "Issue listing"),
                    |t| {
                        let mut issues = t.remote().issues(&name, state)?;
                        issues.sort_by_key(|i| i.number);
                        Ok(issues)
                    },
                    |t, issues| {
                        for issue in issues {
                            let node = Node::step(state_id.child(issue.number), 1, "Issue");
                            t.step(node, |t| {
                                let comments = t.remote().issue_comments(&name, issue.number)?;
                                let rel = format!("issues/{state}/{}.txt", issue.number);
                                t.writer().overwrite(rel, &issue_lines(&issue, &comments))
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
                [
                    PlanLine::new(s.token(), NodeKind::Scope, 1, "Issue listing"),
                    PlanLine::new(format!("{}/<number>", s.token()), NodeKind::Step, 1, "Issue"),
                ]
            })
            .collect()
    }
}

impl Listing for Vec<Issue> {
    fn child_segments(&self) -> Vec<String> {
        self.iter().map(|i| i.number.to_string()).collect()
    }
}

pub(crate) fn labels_line(labels: &[Label]) -> String {
    let mut names: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();
    names.sort_unstable();
    field("labels", (!names.is_empty()).then(|| names.join(", ")))
}

pub(crate) fn milestone_line(milestone: Option<&MilestoneRef>) -> String {
    field(
        "milestone",
        milestone.map(|m| format!("{} (#{})", m.title, m.number)),
    )
}

/// Comments oldest first, each as an author line and an indented body.
pub(crate) fn comment_lines(comments: &[Comment]) -> Vec<String> {
    let mut sorted: Vec<&Comment> = comments.iter().collect();
    sorted.sort_by_key(|c| c.id);
    let mut out = Vec::new();
    for c in sorted {
        let author = c.user.as_ref().map(|u| u.login.as_str()).unwrap_or("(unknown)");
        let when = c.created_at.as_deref().unwrap_or("(unavailable)");
        out.push(item(format!("{author} on {when}:")));
        out.extend(block(c.body.as_deref()).into_iter().map(|l| format!("\t{l}")));
    }
    out
}

fn issue_lines(issue: &Issue, comments: &[Comment]) -> Vec<String> {
    let mut lines = vec![
        field("title", Some(&issue.title)),
        field("number", Some(issue.number)),
        field("state", Some(&issue.state)),
        field("assignee", issue.assignee.as_ref().map(|a| &a.login)),
        milestone_line(issue.milestone.as_ref()),
        labels_line(&issue.labels),
        "body:".to_string(),
    ];
    lines.extend(block(issue.body.as_deref()));
    lines.push("comments:".to_string());
    lines.extend(comment_lines(comments));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::UserRef;

    #[test]
    fn issue_file_keeps_headings_unambiguous() {
        let issue = Issue {
            number: 4,
            title: "Crash".into(),
            body: Some("comments:\nsecond".into()),
            state: "open".into(),
            assignee: None,
            milestone: None,
            labels: vec![Label { name: "bug".into() }],
            pull_request: None,
        };
        let comments = vec![Comment {
            id: 9,
            user: Some(UserRef {
                login: "amy".into(),
                id: 2,
            }),
            body: Some("me too".into()),
            created_at: Some("2024-01-02T03:04:05Z".into()),
        }];
        let lines = issue_lines(&issue, &comments);
        let top_level: Vec<&String> = lines.iter().filter(|l| *l == "comments:").collect();
        assert_eq!(top_level.len(), 1);
        assert!(lines.contains(&"assignee: (unavailable)".to_string()));
        assert!(lines.contains(&"labels: bug".to_string()));
        assert!(lines.contains(&"\tamy on 2024-01-02T03:04:05Z:".to_string()));
        assert!(lines.contains(&"\t\tme too".to_string()));
    }
}
