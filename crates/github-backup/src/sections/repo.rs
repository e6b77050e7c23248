use github_backup_macros::Section;

use crate::artifact::{field, item};
use crate::checkpoint::CheckpointId;
use crate::error::Error;
use crate::remote::{Repository, User};
use crate::sections::{PlanLine, Section, SectionInfo, user_sections, walk_all};
use crate::traversal::{Flow, Listing, Traversal};

/// The owner's profile, followers, following and organizations.
#[Section(token = "OWNER", kind = "scope", cost = 1, label = "Owner")]
pub struct OwnerSection;

impl Section<Repository> for OwnerSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, repo: &Repository) -> Flow {
        let id = Self::id(parent);
        t.scope(
            self.node(parent),
            |t| {
                t.remote().user(&repo.owner.login)?.ok_or_else(|| {
                    Error::msg(format!("owner '{}' not found", repo.owner.login))
                })
            },
            |t, owner| walk_all(&user_sections(), t, &id, &owner),
        )
    }

    fn outline(&self) -> Vec<PlanLine> {
        user_sections()
            .iter()
            .map(|s| PlanLine::new(s.token(), s.kind(), s.cost(), s.label()))
            .collect()
    }
}

/// The owner's sections do not depend on what was fetched.
impl Listing for User {
    fn child_segments(&self) -> Vec<String> {
        user_sections().iter().map(|s| s.token().to_string()).collect()
    }
}

/// `repo.txt`: descriptive attributes and collaborators.
#[Section(token = "INFO", kind = "step", cost = 1, label = "Repository info")]
pub struct InfoSection;

impl Section<Repository> for InfoSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, repo: &Repository) -> Flow {
        t.step(self.node(parent), |t| {
            let mut collaborators = t.remote().collaborators(&repo.repo_name())?;
            collaborators.sort_by(|a, b| a.login.cmp(&b.login));
            let mut lines = vec![
                field("name", Some(&repo.name)),
                field("full name", Some(&repo.full_name)),
                field("owner", Some(&repo.owner.login)),
                field("language", repo.language.as_deref()),
                field("description", repo.description.as_deref()),
                field("homepage", repo.homepage.as_deref()),
                field("default branch", repo.default_branch.as_deref()),
                field("created on", repo.created_at.as_deref()),
                "collaborators:".to_string(),
            ];
            lines.extend(collaborators.iter().map(|c| item(&c.login)));
            t.writer().overwrite("repo.txt", &lines)
        })
    }
}
