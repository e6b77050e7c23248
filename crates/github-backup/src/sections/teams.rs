use github_backup_macros::Section;

use crate::artifact::{field, item};
use crate::checkpoint::CheckpointId;
use crate::remote::{Repository, Team};
use crate::sections::{NodeKind, PlanLine, Section};
use crate::traversal::{Flow, Listing, Node, Traversal};

#[Section(token = "TEAMS", kind = "scope", cost = 2, label = "Teams")]
pub struct TeamsSection;

impl Section<Repository> for TeamsSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, repo: &Repository) -> Flow {
        let id = Self::id(parent);
        t.scope(
            self.node(parent),
            |t| {
                let mut teams = t.remote().teams(&repo.repo_name())?;
                teams.sort_by_key(|team| team.id);
                Ok(teams)
            },
            |t, teams| {
                for team in teams {
                    t.step(Node::step(id.child(team.id), 1, "Team"), |t| {
                        let mut members = t.remote().team_members(&team)?;
                        members.sort_by(|a, b| a.login.cmp(&b.login));
                        let mut lines = team_lines(&team);
                        lines.extend(members.iter().map(|m| item(&m.login)));
                        t.writer()
                            .overwrite(format!("teams/{}.txt", team.id), &lines)
                    })?;
                }
                Ok(())
            },
        )
    }

    fn outline(&self) -> Vec<PlanLine> {
        vec![PlanLine::new("<id>", NodeKind::Step, 1, "Team")]
    }
}

impl Listing for Vec<Team> {
    fn child_segments(&self) -> Vec<String> {
        self.iter().map(|team| team.id.to_string()).collect()
    }
}

fn team_lines(team: &Team) -> Vec<String> {
    vec![
        field("name", Some(&team.name)),
        field("id", Some(team.id)),
        field("slug", Some(&team.slug)),
        field("permission", team.permission.as_deref()),
        "members:".to_string(),
    ]
}
