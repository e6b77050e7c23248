use github_backup_macros::Section;

use crate::artifact::{block, field};
use crate::checkpoint::CheckpointId;
use crate::remote::{IssueState, Milestone, Repository};
use crate::sections::{NodeKind, PlanLine, Section};
use crate::traversal::{Flow, Node, Traversal};

#[Section(token = "MILESTONES", kind = "group", label = "Milestones")]
pub struct MilestonesSection;

impl Section<Repository> for MilestonesSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, repo: &Repository) -> Flow {
        let id = Self::id(parent);
        let name = repo.repo_name();
        t.group(self.node(parent), |t| {
            for state in IssueState::ALL {
                t.step(Node::step(id.child(state.token()), 1, "Milestones"), |t| {
                    let mut milestones = t.remote().milestones(&name, state)?;
                    milestones.sort_by_key(|m| m.number);
                    for m in &milestones {
                        t.writer().overwrite(
                            format!("milestones/{state}/{}.txt", m.number),
                            &milestone_lines(m),
                        )?;
                    }
                    Ok(())
                })?;
            }
            Ok(())
        })
    }

    fn outline(&self) -> Vec<PlanLine> {
        IssueState::ALL
            .iter()
            .map(|s| PlanLine::new(s.token(), NodeKind::Step, 1, "Milestones"))
            .collect()
    }
}

fn milestone_lines(m: &Milestone) -> Vec<String> {
    let mut lines = vec![
        field("title", Some(&m.title)),
        field("number", Some(m.number)),
        field("state", Some(&m.state)),
        "description:".to_string(),
    ];
    lines.extend(block(m.description.as_deref()));
    lines
}
