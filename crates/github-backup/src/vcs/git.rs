use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::error::{Error, Result};
use crate::vcs::VersionControl;

const STASH_MESSAGE: &str = "ghbackup: local changes";
// Keep argv well below platform limits when staging many artifacts.
const STAGE_CHUNK: usize = 200;

/// `VersionControl` backed by the `git` executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    worktree: PathBuf,
}

impl GitCli {
    /// Open the working tree containing `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        let out = run(dir, ["rev-parse", "--show-toplevel"])?;
        if !out.status.success() {
            return Err(Error::msg(format!(
                "{} is not inside a git working tree: {}",
                dir.display(),
                stderr(&out)
            )));
        }
        let top = stdout(&out);
        if top.is_empty() {
            return Err(Error::msg(format!(
                "{} is a bare repository; a working tree is required",
                dir.display()
            )));
        }
        Ok(Self {
            worktree: PathBuf::from(top),
        })
    }

    fn output<I, S>(&self, args: I) -> Result<Output>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        run(&self.worktree, args)
    }

    /// Run and require success; returns trimmed stdout.
    fn git<I, S>(&self, what: &str, args: I) -> Result<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let out = self.output(args)?;
        if !out.status.success() {
            return Err(Error::msg(format!("git {what} failed: {}", stderr(&out))));
        }
        Ok(stdout(&out))
    }
}

fn run<I, S>(dir: &Path, args: I) -> Result<Output>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0");
    debug!(cmd = ?cmd, "git");
    cmd.output()
        .map_err(|e| Error::msg(format!("failed to run git in {}: {e}", dir.display())))
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn stderr(out: &Output) -> String {
    let s = String::from_utf8_lossy(&out.stderr).trim().to_string();
    if s.is_empty() {
        format!("exit status {}", out.status)
    } else {
        s
    }
}

impl VersionControl for GitCli {
    fn worktree(&self) -> &Path {
        &self.worktree
    }

    fn current_ref(&self) -> Result<String> {
        let out = self.output(["symbolic-ref", "-q", "--short", "HEAD"])?;
        if out.status.success() {
            let name = stdout(&out);
            if !name.is_empty() {
                return Ok(name);
            }
        }
        self.git("rev-parse", ["rev-parse", "--verify", "HEAD"])
    }

    fn modified_paths(&self) -> Result<Vec<String>> {
        // Not trimmed: the status columns carry leading spaces.
        let out = self.output(["status", "--porcelain", "--untracked-files=all"])?;
        if !out.status.success() {
            return Err(Error::msg(format!("git status failed: {}", stderr(&out))));
        }
        Ok(String::from_utf8_lossy(&out.stdout)
            .lines()
            .filter(|l| l.len() > 3)
            .map(|l| l[3..].to_string())
            .collect())
    }

    fn stash(&self) -> Result<()> {
        self.git(
            "stash push",
            ["stash", "push", "--include-untracked", "-m", STASH_MESSAGE],
        )?;
        Ok(())
    }

    fn unstash(&self) -> Result<()> {
        self.git("stash pop", ["stash", "pop", "--index"])?;
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        let out = self.output([
            "rev-parse",
            "--verify",
            "--quiet",
            &format!("refs/heads/{name}"),
        ])?;
        Ok(out.status.success())
    }

    fn checkout(&self, name: &str) -> Result<()> {
        self.git("checkout", ["checkout", "-q", name])?;
        Ok(())
    }

    fn create_orphan_branch(&self, name: &str) -> Result<()> {
        self.git("checkout --orphan", ["checkout", "-q", "--orphan", name])?;
        self.git(
            "rm --cached",
            ["rm", "-r", "-q", "--cached", "--ignore-unmatch", "."],
        )?;
        self.clean_untracked()
    }

    fn stage(&self, paths: &[&Path]) -> Result<()> {
        for chunk in paths.chunks(STAGE_CHUNK) {
            let mut args: Vec<&OsStr> = vec![OsStr::new("add"), OsStr::new("-A"), OsStr::new("--")];
            args.extend(chunk.iter().map(|p| p.as_os_str()));
            self.git("add", args)?;
        }
        Ok(())
    }

    fn unstage(&self, path: &Path) -> Result<()> {
        let mut args: Vec<&OsStr> = ["rm", "-q", "--cached", "--ignore-unmatch", "--"]
            .iter()
            .map(OsStr::new)
            .collect();
        args.push(path.as_os_str());
        self.git("rm --cached", args)?;
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let out = self.output(["diff", "--cached", "--quiet"])?;
        match out.status.code() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(Error::msg(format!(
                "git diff --cached failed: {}",
                stderr(&out)
            ))),
        }
    }

    fn commit(&self, message: &str) -> Result<()> {
        self.git(
            "commit",
            ["commit", "-q", "--no-verify", "--no-gpg-sign", "-m", message],
        )?;
        Ok(())
    }

    fn clean_untracked(&self) -> Result<()> {
        self.git("clean", ["clean", "-f", "-d", "-q"])?;
        Ok(())
    }

    fn remote_url(&self, remote: &str) -> Result<Option<String>> {
        let out = self.output(["remote", "get-url", remote])?;
        if !out.status.success() {
            return Ok(None);
        }
        let url = stdout(&out);
        Ok((!url.is_empty()).then_some(url))
    }

    fn show_file(&self, rev: &str, path: &Path) -> Result<Option<String>> {
        let object = format!("{rev}:{}", path.to_string_lossy().replace('\\', "/"));
        let out = self.output(["show", object.as_str()])?;
        if !out.status.success() {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&out.stdout).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn have_git() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn init_repo(dir: &Path) -> GitCli {
        for args in [
            vec!["init", "-q", "-b", "main"],
            vec!["config", "user.name", "Backup Test"],
            vec!["config", "user.email", "backup@example.invalid"],
        ] {
            let out = run(dir, &args).expect("git");
            assert!(out.status.success(), "git {args:?}: {}", stderr(&out));
        }
        fs::write(dir.join("README.md"), "hello\n").expect("write");
        let git = GitCli::open(dir).expect("open");
        git.stage(&[Path::new("README.md")]).expect("stage");
        git.commit("init").expect("commit");
        git
    }

    #[test]
    fn orphan_branch_starts_empty_and_commits_independently() {
        if !have_git() {
            eprintln!("skipping: git not available");
            return;
        }
        let tmp = tempfile::tempdir().expect("tempdir");
        let git = init_repo(tmp.path());
        assert_eq!(git.current_ref().expect("ref"), "main");
        assert!(!git.branch_exists("backup-x").expect("exists"));

        git.create_orphan_branch("backup-x").expect("orphan");
        assert!(!tmp.path().join("README.md").exists());
        assert!(!git.has_staged_changes().expect("staged"));

        fs::write(tmp.path().join("a.txt"), "a\n").expect("write");
        git.stage(&[Path::new("a.txt")]).expect("stage");
        assert!(git.has_staged_changes().expect("staged"));
        git.commit("backup").expect("commit");
        assert!(git.branch_exists("backup-x").expect("exists"));

        git.checkout("main").expect("checkout");
        assert!(tmp.path().join("README.md").exists());
        assert!(!tmp.path().join("a.txt").exists());
        assert_eq!(
            git.show_file("backup-x", Path::new("a.txt"))
                .expect("show")
                .as_deref(),
            Some("a\n")
        );
        assert!(
            git.show_file("backup-x", Path::new("README.md"))
                .expect("show")
                .is_none()
        );
    }

    #[test]
    fn stash_round_trips_untracked_files() {
        if !have_git() {
            eprintln!("skipping: git not available");
            return;
        }
        let tmp = tempfile::tempdir().expect("tempdir");
        let git = init_repo(tmp.path());
        fs::write(tmp.path().join("README.md"), "changed\n").expect("write");
        fs::write(tmp.path().join("notes.txt"), "wip\n").expect("write");

        let mut modified = git.modified_paths().expect("status");
        modified.sort();
        assert_eq!(modified, vec!["README.md", "notes.txt"]);

        git.stash().expect("stash");
        assert!(git.modified_paths().expect("status").is_empty());
        git.unstash().expect("unstash");
        assert_eq!(
            fs::read_to_string(tmp.path().join("notes.txt")).expect("read"),
            "wip\n"
        );
    }

    #[test]
    fn unstage_records_a_deletion() {
        if !have_git() {
            eprintln!("skipping: git not available");
            return;
        }
        let tmp = tempfile::tempdir().expect("tempdir");
        let git = init_repo(tmp.path());
        fs::remove_file(tmp.path().join("README.md")).expect("remove");
        git.unstage(Path::new("README.md")).expect("unstage");
        assert!(git.has_staged_changes().expect("staged"));
        // Nothing tracked and nothing on disk: still fine.
        git.unstage(Path::new("MISSING")).expect("unstage missing");
    }

    #[test]
    fn remote_url_is_none_without_origin() {
        if !have_git() {
            eprintln!("skipping: git not available");
            return;
        }
        let tmp = tempfile::tempdir().expect("tempdir");
        let git = init_repo(tmp.path());
        assert!(git.remote_url("origin").expect("remote").is_none());
    }
}
