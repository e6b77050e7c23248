use github_backup_macros::Section;

use crate::artifact::{field, item};
use crate::checkpoint::CheckpointId;
use crate::remote::{Hook, Repository};
use crate::sections::Section;
use crate::traversal::{Flow, Traversal};

#[Section(token = "HOOKS", kind = "step", cost = 1, label = "Hooks")]
pub struct HooksSection;

impl Section<Repository> for HooksSection {
    fn walk(&self, t: &mut Traversal<'_>, parent: &CheckpointId, repo: &Repository) -> Flow {
        t.step(self.node(parent), |t| {
            let mut hooks = t.remote().hooks(&repo.repo_name())?;
            hooks.sort_by_key(|h| h.id);
            for hook in &hooks {
                t.writer()
                    .overwrite(format!("hooks/{}.txt", hook.id), &hook_lines(hook))?;
            }
            Ok(())
        })
    }
}

fn hook_lines(hook: &Hook) -> Vec<String> {
    let mut events = hook.events.clone();
    events.sort();
    let mut lines = vec![
        field("name", Some(&hook.name)),
        field("id", Some(hook.id)),
        field("active", Some(hook.active)),
        field("events", (!events.is_empty()).then(|| events.join(", "))),
        "config:".to_string(),
    ];
    // BTreeMap: keys already sorted.
    for (k, v) in &hook.config {
        let v = match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        lines.push(item(format!("{k} = {v}")));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_values_are_listed_in_key_order() {
        let hook: Hook = serde_json::from_value(serde_json::json!({
            "id": 5, "name": "web", "active": true,
            "events": ["push", "issues"],
            "config": {"url": "https://example.invalid/h", "content_type": "json", "insecure_ssl": 0}
        }))
        .expect("hook");
        let lines = hook_lines(&hook);
        assert_eq!(lines[3], "events: issues, push");
        assert_eq!(
            &lines[5..],
            &[
                "\tcontent_type = json".to_string(),
                "\tinsecure_ssl = 0".to_string(),
                "\turl = https://example.invalid/h".to_string(),
            ]
        );
    }
}
