use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

const SEPARATOR: char = '/';

/// Hierarchical identity of a node in the backup tree.
///
/// Ancestry is decided segment by segment, so `ISSUES/OPEN/1` is never
/// mistaken for an ancestor of `ISSUES/OPEN/10`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CheckpointId {
    segments: Vec<String>,
}

impl CheckpointId {
    /// The empty id. Ancestor of every other id.
    pub fn root() -> Self {
        Self::default()
    }

    pub fn child(&self, segment: impl fmt::Display) -> Self {
        let segment = segment.to_string();
        debug_assert!(
            valid_segment(&segment),
            "invalid checkpoint segment '{segment}'"
        );
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// True when `self` equals `other` or is one of its ancestors.
    pub fn is_prefix_of(&self, other: &CheckpointId) -> bool {
        self.segments.len() <= other.segments.len()
            && self
                .segments
                .iter()
                .zip(&other.segments)
                .all(|(a, b)| a == b)
    }

    /// Strict ancestry.
    pub fn is_ancestor_of(&self, other: &CheckpointId) -> bool {
        self.segments.len() < other.segments.len() && self.is_prefix_of(other)
    }

    pub fn is_related(&self, other: &CheckpointId) -> bool {
        self.is_prefix_of(other) || other.is_prefix_of(self)
    }
}

fn valid_segment(s: &str) -> bool {
    !s.is_empty() && !s.contains(SEPARATOR) && !s.chars().any(char::is_whitespace)
}

impl fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "<root>");
        }
        for (i, seg) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            write!(f, "{seg}")?;
        }
        Ok(())
    }
}

impl FromStr for CheckpointId {
    type Err = Error;

    fn from_str(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::msg("checkpoint id is empty"));
        }
        let mut segments = Vec::new();
        for seg in raw.split(SEPARATOR) {
            if !valid_segment(seg) {
                return Err(Error::msg(format!(
                    "checkpoint id '{raw}' has an invalid segment '{seg}'"
                )));
            }
            segments.push(seg.to_string());
        }
        Ok(Self { segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CheckpointId {
        s.parse().expect("parse id")
    }

    #[test]
    fn child_keeps_parent_as_prefix() {
        let parent = CheckpointId::root().child("ISSUES").child("OPEN");
        let child = parent.child(12);
        assert!(parent.is_ancestor_of(&child));
        assert!(parent.is_prefix_of(&child));
        assert_eq!(child.to_string(), "ISSUES/OPEN/12");
    }

    #[test]
    fn numeric_segments_do_not_collide() {
        let one = id("ISSUES/OPEN/1");
        let ten = id("ISSUES/OPEN/10");
        assert!(!one.is_prefix_of(&ten));
        assert!(!one.is_related(&ten));
        // Raw string prefix would have said otherwise.
        assert!(ten.to_string().starts_with(&one.to_string()));
    }

    #[test]
    fn token_prefixes_do_not_collide() {
        let user = id("OWNER");
        let other = id("OWNERS/FOLLOWS");
        assert!(!user.is_related(&other));
    }

    #[test]
    fn root_is_ancestor_of_everything() {
        let root = CheckpointId::root();
        assert!(root.is_ancestor_of(&id("HOOKS")));
        assert!(!root.is_ancestor_of(&root));
        assert!(root.is_prefix_of(&root));
    }

    #[test]
    fn display_round_trips_through_parse() {
        let original = CheckpointId::root()
            .child("PULLS")
            .child("CLOSED")
            .child(7)
            .child("COMMENTS");
        assert_eq!(id(&original.to_string()), original);
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!("".parse::<CheckpointId>().is_err());
        assert!("ISSUES//OPEN".parse::<CheckpointId>().is_err());
        assert!("ISSUES/OPEN /1".parse::<CheckpointId>().is_err());
        assert!("/HOOKS".parse::<CheckpointId>().is_err());
    }
}
