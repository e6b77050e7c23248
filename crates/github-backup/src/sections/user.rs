use github_backup_macros::Section;

use crate::artifact::{field, item};
use crate::checkpoint::CheckpointId;
use crate::remote::User;
use crate::sections::Section;
use crate::traversal::{Flow, Traversal};

pub fn user_file(user: &User) -> String {
    format!("user_{}.txt", user.id)
}

fn profile_lines(user: &User) -> Vec<String> {
    vec![
        field("login", Some(&user.login)),
        field("id", Some(user.id)),
        field("name", user.name.as_deref()),
        field("email", user.email.as_deref()),
        field("location", user.location.as_deref()),
        field("company", user.company.as_deref()),
        field("blog", user.blog.as_deref()),
        field("avatar", user.avatar_url.as_deref()),
        field("created on", user.created_at.as_deref()),
    ]
}

/// Profile plus followers. Starts the user file afresh.
#[Section(token = "FOLLOWERS", kind = "step", cost = 1, label = "Followers")]
pub struct FollowersSection;

impl Section<User> for FollowersSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, user: &User) -> Flow {
        t.step(self.node(parent), |t| {
            let mut followers = t.remote().followers(&user.login)?;
            followers.sort_by(|a, b| a.login.cmp(&b.login));
            let mut lines = profile_lines(user);
            lines.push("followed by:".to_string());
            lines.extend(followers.iter().map(|u| item(&u.login)));
            t.writer().overwrite(user_file(user), &lines)
        })
    }
}

#[Section(token = "FOLLOWS", kind = "step", cost = 1, label = "Following")]
pub struct FollowsSection;

impl Section<User> for FollowsSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, user: &User) -> Flow {
        t.step(self.node(parent), |t| {
            let mut following = t.remote().following(&user.login)?;
            following.sort_by(|a, b| a.login.cmp(&b.login));
            let lines: Vec<String> = following.iter().map(|u| item(&u.login)).collect();
            t.writer().append_section(user_file(user), "follows:", &lines)
        })
    }
}

#[Section(token = "ORGS", kind = "step", cost = 1, label = "Organizations")]
pub struct OrgsSection;

impl Section<User> for OrgsSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, user: &User) -> Flow {
        t.step(self.node(parent), |t| {
            let mut orgs = t.remote().organizations(&user.login)?;
            orgs.sort_by(|a, b| a.login.cmp(&b.login));
            let lines: Vec<String> = orgs
                .iter()
                .map(|o| match o.description.as_deref().map(str::trim) {
                    Some(d) if !d.is_empty() => item(format!("{} - {}", o.login, d.replace('\n', " "))),
                    _ => item(&o.login),
                })
                .collect();
            t.writer()
                .append_section(user_file(user), "organizations:", &lines)
        })
    }
}
