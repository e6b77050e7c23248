use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const UNAVAILABLE: &str = "(unavailable)";

/// Writes text artifacts under a root directory and remembers what it wrote.
#[derive(Debug)]
pub struct ArtifactWriter {
    root: PathBuf,
    written: BTreeSet<PathBuf>,
}

impl ArtifactWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            written: BTreeSet::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative paths written this run, sorted.
    pub fn written(&self) -> impl Iterator<Item = &Path> {
        self.written.iter().map(PathBuf::as_path)
    }

    pub fn written_count(&self) -> usize {
        self.written.len()
    }

    pub fn overwrite(&mut self, rel: impl AsRef<Path>, lines: &[String]) -> Result<()> {
        let rel = checked_rel(rel.as_ref())?;
        let path = self.root.join(&rel);
        self.write_file(&path, &render(lines))?;
        self.written.insert(rel);
        Ok(())
    }

    /// Append `heading` and `lines`. An earlier copy of the same top-level
    /// heading and everything after it is replaced, so replaying an
    /// interrupted section leaves a single copy.
    pub fn append_section(
        &mut self,
        rel: impl AsRef<Path>,
        heading: &str,
        lines: &[String],
    ) -> Result<()> {
        let rel = checked_rel(rel.as_ref())?;
        let path = self.root.join(&rel);
        let existing = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(Error::msg(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let mut kept: Vec<&str> = Vec::new();
        for line in existing.lines() {
            if line == heading {
                break;
            }
            kept.push(line);
        }
        let mut out = String::new();
        for line in kept {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(heading);
        out.push('\n');
        out.push_str(&render(lines));

        self.write_file(&path, &out)?;
        self.written.insert(rel);
        Ok(())
    }

    /// Remove empty directories below the root, deepest first.
    pub fn prune_empty_dirs(&self) -> Result<usize> {
        if !self.root.is_dir() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(&self.root)
            .min_depth(1)
            .contents_first(true)
            .into_iter()
            .filter_entry(|e| e.file_name() != ".git")
        {
            let entry =
                entry.map_err(|e| Error::msg(format!("failed to walk artifacts: {e}")))?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let empty = fs::read_dir(entry.path())
                .map(|mut it| it.next().is_none())
                .unwrap_or(false);
            if empty {
                fs::remove_dir(entry.path()).map_err(|e| {
                    Error::msg(format!(
                        "failed to remove empty dir {}: {e}",
                        entry.path().display()
                    ))
                })?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn write_file(&self, path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| Error::msg(format!("failed to create {}: {e}", parent.display())))?;
        }
        fs::write(path, content)
            .map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))
    }
}

fn checked_rel(rel: &Path) -> Result<PathBuf> {
    let ok = !rel.as_os_str().is_empty()
        && rel.components().all(|c| matches!(c, Component::Normal(_)));
    if !ok {
        return Err(Error::msg(format!(
            "invalid artifact path '{}' (must be relative, without '..')",
            rel.display()
        )));
    }
    Ok(rel.to_path_buf())
}

fn render(lines: &[String]) -> String {
    let mut out = String::new();
    for line in lines {
        out.push_str(line);
        out.push('\n');
    }
    out
}

/// `label: value`, or the placeholder when the remote left it out.
pub fn field(label: &str, value: Option<impl Display>) -> String {
    match value {
        Some(v) => {
            let v = v.to_string();
            if v.trim().is_empty() {
                format!("{label}: {UNAVAILABLE}")
            } else {
                format!("{label}: {}", v.replace(['\r', '\n'], " "))
            }
        }
        None => format!("{label}: {UNAVAILABLE}"),
    }
}

/// Free text as tab-indented lines, so it can never read as a heading.
pub fn block(text: Option<&str>) -> Vec<String> {
    match text {
        Some(t) if !t.trim().is_empty() => t
            .replace("\r\n", "\n")
            .lines()
            .map(|l| format!("\t{l}"))
            .collect(),
        _ => vec![format!("\t{UNAVAILABLE}")],
    }
}

pub fn item(text: impl Display) -> String {
    format!("\t{text}")
}
