use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use toml::Value;

use crate::error::{Error, Result};

pub const DEFAULT_CONFIG_FILE: &str = "ghbackup.toml";

#[derive(Debug, Clone)]
pub struct ConfigDoc {
    pub path: Option<PathBuf>,
    pub value: Value,
}

impl ConfigDoc {
    pub fn empty() -> Self {
        Self {
            path: None,
            value: Value::Table(Default::default()),
        }
    }

    pub fn value_path(&self, path: &str) -> Option<&Value> {
        let path = path.trim();
        if path.is_empty() {
            return Some(&self.value);
        }
        let mut cur = &self.value;
        for seg in path.split('.') {
            cur = cur.as_table()?.get(seg)?;
        }
        Some(cur)
    }

    pub fn deserialize_path<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let Some(v) = self.value_path(path) else {
            return Ok(None);
        };
        let parsed = v
            .clone()
            .try_into()
            .map_err(|e| Error::msg(format!("failed to deserialize config at '{path}': {e}")))?;
        Ok(Some(parsed))
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => *base_slot = child_val,
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "config extends cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    // Root-level single-parent extends; the child wins table by table.
    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        out = load_value_inner(&resolve_ref_path(path, ext), stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<ConfigDoc> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    Ok(ConfigDoc {
        path: Some(path.to_path_buf()),
        value,
    })
}

/// `explicit` if given, else `ghbackup.toml` in the current directory when
/// present, else an empty document.
pub fn load_or_default(explicit: Option<&Path>) -> Result<ConfigDoc> {
    if let Some(p) = explicit {
        return load(p);
    }
    let fallback = Path::new(DEFAULT_CONFIG_FILE);
    if fallback.is_file() {
        return load(fallback);
    }
    Ok(ConfigDoc::empty())
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

fn default_token_env() -> Option<String> {
    Some("GITHUB_TOKEN".into())
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("ghbackup/", env!("CARGO_PKG_VERSION")).into()
}

fn default_git_dir() -> String {
    ".".into()
}

fn default_branch_prefix() -> String {
    "backup-".into()
}

fn default_resume_file() -> String {
    "RESUME_POINT".into()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubSettings {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    pub token: Option<String>,
    #[serde(default = "default_token_env")]
    pub token_env: Option<String>,
    pub login: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for GithubSettings {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            token_env: default_token_env(),
            login: None,
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl GithubSettings {
    /// Inline token first, then the configured environment variable.
    pub fn resolve_token(&self) -> Option<String> {
        let inline = self
            .token
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        if let Some(t) = inline {
            return Some(t.to_string());
        }
        let var = self.token_env.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        std::env::var(var)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub user: Option<String>,
    pub repo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkspaceSettings {
    #[serde(default = "default_git_dir")]
    pub git_dir: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default = "default_resume_file")]
    pub resume_file: String,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            git_dir: default_git_dir(),
            branch_prefix: default_branch_prefix(),
            resume_file: default_resume_file(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Cap below the quota the remote reports.
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct BackupConfig {
    pub github: GithubSettings,
    pub target: TargetConfig,
    pub workspace: WorkspaceSettings,
    pub budget: BudgetConfig,
}

impl BackupConfig {
    pub fn from_doc(doc: &ConfigDoc) -> Result<Self> {
        let cfg = Self {
            github: doc.deserialize_path("github")?.unwrap_or_default(),
            target: doc.deserialize_path("target")?.unwrap_or_default(),
            workspace: doc.deserialize_path("workspace")?.unwrap_or_default(),
            budget: doc.deserialize_path("budget")?.unwrap_or_default(),
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.github.api_url.trim().is_empty() {
            return Err(Error::msg("[github].api_url must not be empty"));
        }
        if self.github.timeout_secs == 0 {
            return Err(Error::msg("[github].timeout_secs must be at least 1"));
        }
        if let Some(limit) = self.budget.limit {
            if limit < 0 {
                return Err(Error::msg(format!(
                    "[budget].limit must not be negative (got {limit})"
                )));
            }
        }
        let rf = self.workspace.resume_file.trim();
        if rf.is_empty() || rf.contains('/') || rf.contains('\\') || rf == "." || rf == ".." {
            return Err(Error::msg(format!(
                "[workspace].resume_file '{rf}' must be a plain file name"
            )));
        }
        let prefix = &self.workspace.branch_prefix;
        if prefix.chars().any(|c| c.is_whitespace() || "~^:?*[\\".contains(c)) {
            return Err(Error::msg(format!(
                "[workspace].branch_prefix '{prefix}' is not usable in a branch name"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extends_chain_merges_with_child_winning() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(
            tmp.path().join("base.toml"),
            "[github]\nlogin = \"base\"\ntimeout_secs = 5\n[budget]\nlimit = 10\n",
        )
        .expect("write base");
        fs::write(
            tmp.path().join("child.toml"),
            "extends = \"base.toml\"\n[github]\nlogin = \"child\"\n[target]\nrepo = \"o/r\"\n",
        )
        .expect("write child");

        let doc = load(&tmp.path().join("child.toml")).expect("load");
        let cfg = BackupConfig::from_doc(&doc).expect("config");
        assert_eq!(cfg.github.login.as_deref(), Some("child"));
        assert_eq!(cfg.github.timeout_secs, 5);
        assert_eq!(cfg.github.api_url, "https://api.github.com");
        assert_eq!(cfg.budget.limit, Some(10));
        assert_eq!(cfg.target.repo.as_deref(), Some("o/r"));
        assert_eq!(cfg.workspace.resume_file, "RESUME_POINT");
    }

    #[test]
    fn extends_cycle_is_rejected() {
        let tmp = tempfile::tempdir().expect("tempdir");
        fs::write(tmp.path().join("a.toml"), "extends = \"b.toml\"\n").expect("write");
        fs::write(tmp.path().join("b.toml"), "extends = \"a.toml\"\n").expect("write");
        let err = load(&tmp.path().join("a.toml")).unwrap_err().to_string();
        assert!(err.contains("cycle"), "unexpected err: {err}");
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut cfg = BackupConfig::default();
        cfg.workspace.resume_file = "a/b".into();
        assert!(cfg.validate().is_err());
        let mut cfg = BackupConfig::default();
        cfg.budget.limit = Some(-1);
        assert!(cfg.validate().is_err());
        assert!(BackupConfig::default().validate().is_ok());
    }

    #[test]
    fn inline_token_beats_environment() {
        let s = GithubSettings {
            token: Some(" abc ".into()),
            token_env: Some("GHBACKUP_TEST_TOKEN_UNSET".into()),
            ..GithubSettings::default()
        };
        assert_eq!(s.resolve_token().as_deref(), Some("abc"));
        let s = GithubSettings {
            token: None,
            token_env: Some("GHBACKUP_TEST_TOKEN_UNSET".into()),
            ..GithubSettings::default()
        };
        assert!(s.resolve_token().is_none());
    }
}
