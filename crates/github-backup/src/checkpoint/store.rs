use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::checkpoint::CheckpointId;
use crate::error::{Error, Result};

/// How a resuming traversal relates to the node being queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeKind {
    /// The node is the one the marker names. The marker has been cleared and
    /// the node runs again.
    Exact,
    /// The node contains the marker. Enter it without redoing finished work.
    Ancestor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Already passed in an earlier run.
    Skip,
    /// Not resuming. The caller persists a marker before risky work.
    Normal,
    Resume(ResumeKind),
}

/// Single-slot, file-backed resume marker.
///
/// `target` is what the traversal is still looking for; `persisted` mirrors
/// the file. They diverge once an exact match is reached: the in-memory
/// target is cleared but the file keeps naming that node until the next
/// `set` or `clear`.
#[derive(Debug)]
pub struct ResumeStore {
    path: PathBuf,
    target: Option<CheckpointId>,
    persisted: Option<CheckpointId>,
}

impl ResumeStore {
    /// A store with no marker. Nothing is read from disk.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target: None,
            persisted: None,
        }
    }

    /// Read the marker at `path`. A missing or empty file means no marker.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let marker = read_marker(&path)?;
        if let Some(m) = &marker {
            debug!(marker = %m, path = %path.display(), "loaded resume marker");
        }
        Ok(Self {
            path,
            target: marker.clone(),
            persisted: marker,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target(&self) -> Option<&CheckpointId> {
        self.target.as_ref()
    }

    pub fn persisted(&self) -> Option<&CheckpointId> {
        self.persisted.as_ref()
    }

    pub fn is_resuming(&self) -> bool {
        self.target.is_some()
    }

    pub fn query(&mut self, id: &CheckpointId) -> Query {
        let Some(target) = self.target.as_ref() else {
            return Query::Normal;
        };
        if id == target {
            self.target = None;
            return Query::Resume(ResumeKind::Exact);
        }
        if id.is_ancestor_of(target) {
            return Query::Resume(ResumeKind::Ancestor);
        }
        if target.is_ancestor_of(id) {
            // Pre-order visits the marker's node before anything beneath it,
            // so this only happens when that node was never queried.
            self.target = None;
            return Query::Normal;
        }
        Query::Skip
    }

    /// Durably replace the marker with `id`.
    pub fn set(&mut self, id: &CheckpointId) -> Result<()> {
        write_marker(&self.path, id)?;
        self.persisted = Some(id.clone());
        Ok(())
    }

    /// Remove the marker file and stop resuming.
    pub fn clear(&mut self) -> Result<()> {
        self.target = None;
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(Error::msg(format!(
                    "failed to remove resume marker {}: {e}",
                    self.path.display()
                )));
            }
        }
        self.persisted = None;
        Ok(())
    }

    /// Stop looking for the marker without touching the file.
    pub fn discard_target(&mut self) -> Option<CheckpointId> {
        self.target.take()
    }
}

pub fn read_marker(path: &Path) -> Result<Option<CheckpointId>> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::msg(format!(
                "failed to read resume marker {}: {e}",
                path.display()
            )));
        }
    };
    let line = raw.lines().next().unwrap_or_default().trim();
    if line.is_empty() {
        return Ok(None);
    }
    line.parse::<CheckpointId>()
        .map(Some)
        .map_err(|e| e.context(format!("invalid resume marker {}", path.display())))
}

fn write_marker(path: &Path, id: &CheckpointId) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)
        .map_err(|e| Error::msg(format!("failed to create {}: {e}", dir.display())))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        Error::msg(format!(
            "failed to create temp marker in {}: {e}",
            dir.display()
        ))
    })?;
    writeln!(tmp, "{id}")
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::msg(format!("failed to write resume marker: {e}")))?;
    tmp.persist(path).map_err(|e| {
        Error::msg(format!(
            "failed to move resume marker into {}: {}",
            path.display(),
            e.error
        ))
    })?;
    sync_dir(dir);
    Ok(())
}

// Make the rename itself durable.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(d) = fs::File::open(dir) {
        let _ = d.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> CheckpointId {
        s.parse().expect("parse id")
    }

    fn store_with(tmp: &Path, marker: &str) -> ResumeStore {
        let path = tmp.join("RESUME_POINT");
        fs::write(&path, format!("{marker}\n")).expect("write marker");
        ResumeStore::load(path).expect("load")
    }

    #[test]
    fn missing_file_means_no_marker() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut store = ResumeStore::load(tmp.path().join("RESUME_POINT")).expect("load");
        assert!(!store.is_resuming());
        assert_eq!(store.query(&id("HOOKS")), Query::Normal);
    }

    #[test]
    fn empty_file_means_no_marker() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("RESUME_POINT");
        fs::write(&path, "").expect("write");
        let store = ResumeStore::load(&path).expect("load");
        assert!(store.persisted().is_none());
    }

    #[test]
    fn garbage_marker_is_an_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("RESUME_POINT");
        fs::write(&path, "ISSUES//OPEN\n").expect("write");
        let err = ResumeStore::load(&path).unwrap_err().to_string();
        assert!(err.contains("invalid resume marker"), "unexpected err: {err}");
    }

    #[test]
    fn query_classifies_against_marker() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut store = store_with(tmp.path(), "PULLS/OPEN/4/COMMENTS");

        assert_eq!(store.query(&id("OWNER")), Query::Skip);
        assert_eq!(store.query(&id("PULLS/OPEN/40")), Query::Skip);
        assert_eq!(
            store.query(&id("PULLS")),
            Query::Resume(ResumeKind::Ancestor)
        );
        assert_eq!(
            store.query(&id("PULLS/OPEN/4")),
            Query::Resume(ResumeKind::Ancestor)
        );
        assert_eq!(store.query(&id("PULLS/OPEN/4/MERGED")), Query::Skip);
        assert!(store.is_resuming());

        assert_eq!(
            store.query(&id("PULLS/OPEN/4/COMMENTS")),
            Query::Resume(ResumeKind::Exact)
        );
        assert!(!store.is_resuming());
        // The file still names the step until something overwrites it.
        assert_eq!(store.persisted(), Some(&id("PULLS/OPEN/4/COMMENTS")));
        assert_eq!(store.query(&id("PULLS/OPEN/5/MERGED")), Query::Normal);
    }

    #[test]
    fn set_overwrites_the_single_slot() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join("nested").join("RESUME_POINT");
        let mut store = ResumeStore::new(&path);
        store.set(&id("OWNER/FOLLOWERS")).expect("set");
        store.set(&id("INFO")).expect("set");

        let raw = fs::read_to_string(&path).expect("read");
        assert_eq!(raw, "INFO\n");
        let reloaded = ResumeStore::load(&path).expect("load");
        assert_eq!(reloaded.target(), Some(&id("INFO")));
    }

    #[test]
    fn clear_removes_file_and_tolerates_absence() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut store = store_with(tmp.path(), "HOOKS");
        store.clear().expect("clear");
        assert!(!store.path().exists());
        assert!(store.persisted().is_none());
        store.clear().expect("second clear");
    }
}
