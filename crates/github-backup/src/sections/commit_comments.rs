use std::collections::BTreeMap;

use github_backup_macros::Section;

use crate::artifact::{block, field};
use crate::checkpoint::CheckpointId;
use crate::remote::{CommitComment, Repository};
use crate::sections::Section;
use crate::traversal::{Flow, Traversal};

/// All commit comments of the repository, one file per commit.
#[Section(
    token = "COMMIT_COMMENTS",
    kind = "step",
    cost = 2,
    label = "Commit comments"
)]
pub struct CommitCommentsSection;

impl Section<Repository> for CommitCommentsSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, repo: &Repository) -> Flow {
        t.step(self.node(parent), |t| {
            let comments = t.remote().commit_comments(&repo.repo_name())?;
            for (sha, group) in by_commit(comments) {
                t.writer()
                    .overwrite(format!("commit_comments/{sha}.txt"), &commit_lines(&group))?;
            }
            Ok(())
        })
    }
}

fn by_commit(comments: Vec<CommitComment>) -> BTreeMap<String, Vec<CommitComment>> {
    let mut out: BTreeMap<String, Vec<CommitComment>> = BTreeMap::new();
    for c in comments {
        out.entry(c.commit_id.clone()).or_default().push(c);
    }
    for group in out.values_mut() {
        group.sort_by_key(|c| c.id);
    }
    out
}

fn commit_lines(group: &[CommitComment]) -> Vec<String> {
    let mut lines = Vec::new();
    for c in group {
        lines.push(format!("comment {}:", c.id));
        lines.push(field("author", c.user.as_ref().map(|u| &u.login)));
        lines.push(field("path", c.path.as_deref()));
        lines.push(field("line", c.line));
        lines.extend(block(c.body.as_deref()));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: u64, sha: &str) -> CommitComment {
        CommitComment {
            id,
            commit_id: sha.into(),
            path: None,
            line: None,
            body: Some(format!("c{id}")),
            user: None,
        }
    }

    #[test]
    fn comments_group_by_sha_in_id_order() {
        let grouped = by_commit(vec![comment(3, "bbb"), comment(2, "aaa"), comment(1, "bbb")]);
        let keys: Vec<&String> = grouped.keys().collect();
        assert_eq!(keys, vec!["aaa", "bbb"]);
        let ids: Vec<u64> = grouped["bbb"].iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 3]);
        let lines = commit_lines(&grouped["aaa"]);
        assert_eq!(lines[0], "comment 2:");
        assert_eq!(lines[3], "line: (unavailable)");
    }
}
