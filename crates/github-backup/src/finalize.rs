//! Per-target run: isolate the working tree on the target's backup branch,
//! walk the tree, commit whatever was produced and put everything back.

use std::path::Path;

use chrono::Local;
use tracing::{error, info, warn};

use crate::artifact::ArtifactWriter;
use crate::checkpoint::{CheckpointId, ResumeStore};
use crate::error::{Error, Result};
use crate::remote::{RemoteSource, Repository, User};
use crate::report::{RunEvent, TargetOutcome};
use crate::sections::{repo_sections, user_sections, walk_all};
use crate::traversal::{RunCtx, Traversal};
use crate::vcs::VersionControl;
use crate::workspace::{Target, WorkspacePaths};

enum Record {
    User(User),
    Repo(Repository),
}

/// Working-tree state to put back once the target is done.
struct Isolation {
    original: String,
    stashed: bool,
    switched: bool,
}

impl Isolation {
    fn enter(vcs: &dyn VersionControl, branch: &str) -> Result<Self> {
        let original = vcs.current_ref()?;
        if original == branch {
            // A previous run stopped before it could switch back.
            warn!(branch, "already on the backup branch, continuing in place");
            return Ok(Self {
                original,
                stashed: false,
                switched: false,
            });
        }

        let stashed = if vcs.modified_paths()?.is_empty() {
            false
        } else {
            info!("stashing local changes");
            vcs.stash()?;
            true
        };

        let switched = if vcs.branch_exists(branch)? {
            vcs.checkout(branch)
        } else {
            info!(branch, "creating backup branch");
            vcs.create_orphan_branch(branch)
        };
        let iso = Self {
            original,
            stashed,
            switched: true,
        };
        if let Err(e) = switched {
            iso.leave(vcs).unwrap_or_else(|re| warn!("failed to restore working tree: {re}"));
            return Err(e.context(format!("failed to switch to {branch}")));
        }
        Ok(iso)
    }

    fn leave(self, vcs: &dyn VersionControl) -> Result<()> {
        if self.switched {
            vcs.clean_untracked()?;
            vcs.checkout(&self.original)
                .map_err(|e| e.context(format!("failed to return to {}", self.original)))?;
        }
        if self.stashed {
            vcs.unstash()
                .map_err(|e| e.context("failed to restore stashed changes (see `git stash list`)"))?;
        }
        Ok(())
    }
}

fn commit_message(complete: bool) -> String {
    format!(
        "{} - {}",
        Local::now().format("%Y/%m/%d %H:%M:%S"),
        if complete { "complete" } else { "incremental" }
    )
}

fn open_store(path: &Path, clean: bool) -> ResumeStore {
    if clean {
        let mut store = ResumeStore::new(path);
        if let Err(e) = store.clear() {
            warn!("failed to discard resume marker: {e}");
        }
        return store;
    }
    match ResumeStore::load(path) {
        Ok(store) => store,
        Err(e) => {
            warn!("{e}; starting from the beginning");
            ResumeStore::new(path)
        }
    }
}

/// Back up one target. `Err` means the working tree could not be isolated
/// or restored; everything else is recorded in `ctx.report`.
pub fn backup_target(
    ctx: &mut RunCtx,
    vcs: &dyn VersionControl,
    remote: &dyn RemoteSource,
    target: &Target,
    paths: &WorkspacePaths,
    clean: bool,
) -> Result<TargetOutcome> {
    let branch = target.branch(&paths.branch_prefix);
    let mut outcome = TargetOutcome {
        target: target.to_string(),
        branch: branch.clone(),
        complete: false,
        committed: false,
        artifacts: 0,
        resume_point: None,
    };

    if !ctx.budget.reserve(1) {
        warn!("budget exhausted before {target} could be fetched, skipping it");
        return Ok(outcome);
    }
    let record = match target {
        Target::User(login) => remote
            .user(login)?
            .map(Record::User)
            .ok_or_else(|| Error::msg(format!("user '{login}' not found")))?,
        Target::Repo(name) => remote
            .repository(name)?
            .map(Record::Repo)
            .ok_or_else(|| Error::msg(format!("repository '{name}' not found")))?,
    };

    let iso = Isolation::enter(vcs, &branch)?;
    let marker_path = paths.marker_path(vcs.worktree());
    let mut store = open_store(&marker_path, clean);
    ctx.emit(RunEvent::TargetStarted {
        target: target.to_string(),
        branch: branch.clone(),
        resume_from: store.target().map(ToString::to_string),
    });

    let mut writer = ArtifactWriter::new(vcs.worktree());
    let flow = {
        let root = CheckpointId::root();
        let mut t = Traversal::new(ctx, &mut store, remote, &mut writer);
        t.run(|t| match &record {
            Record::User(u) => walk_all(&user_sections(), t, &root, u),
            Record::Repo(r) => walk_all(&repo_sections(), t, &root, r),
        })
    };
    outcome.complete = flow.is_ok();
    if outcome.complete {
        if let Err(e) = store.clear() {
            warn!("failed to remove resume marker: {e}");
        }
    }
    outcome.artifacts = writer.written_count();
    outcome.resume_point = store.persisted().cloned();

    match record_results(vcs, &writer, &paths.resume_file, outcome.complete) {
        Ok(committed) => outcome.committed = committed,
        Err(e) => {
            // Leave the branch checked out so nothing lands on the user's branch.
            error!(branch = %branch, "failed to commit backup: {e}");
            ctx.report.errors.push(format!(
                "{target}: {e} (artifacts left staged on {branch}; original ref was {})",
                iso.original
            ));
            ctx.emit(RunEvent::TargetFinished {
                target: outcome.target.clone(),
                complete: outcome.complete,
                committed: false,
                artifacts: outcome.artifacts,
            });
            return Ok(outcome);
        }
    }

    iso.leave(vcs)?;
    info!(
        what = %target,
        complete = outcome.complete,
        committed = outcome.committed,
        artifacts = outcome.artifacts,
        "target finished"
    );
    ctx.emit(RunEvent::TargetFinished {
        target: outcome.target.clone(),
        complete: outcome.complete,
        committed: outcome.committed,
        artifacts: outcome.artifacts,
    });
    Ok(outcome)
}

/// Stage artifacts and the marker, then commit if anything changed.
fn record_results(
    vcs: &dyn VersionControl,
    writer: &ArtifactWriter,
    resume_file: &Path,
    complete: bool,
) -> Result<bool> {
    let written: Vec<&Path> = writer.written().collect();
    if !written.is_empty() {
        vcs.stage(&written)?;
    }
    if vcs.worktree().join(resume_file).exists() {
        vcs.stage(&[resume_file])?;
    } else {
        vcs.unstage(resume_file)?;
    }
    match writer.prune_empty_dirs() {
        Ok(0) => {}
        Ok(n) => info!("removed {n} empty artifact directories"),
        Err(e) => warn!("failed to prune empty directories: {e}"),
    }
    if !vcs.has_staged_changes()? {
        info!("nothing changed, no commit");
        return Ok(false);
    }
    vcs.commit(&commit_message(complete))?;
    Ok(true)
}

/// Back up every target in order, sharing one budget. Stops after a target
/// whose results could not be committed.
pub fn run_targets(
    ctx: &mut RunCtx,
    vcs: &dyn VersionControl,
    remote: &dyn RemoteSource,
    targets: &[Target],
    paths: &WorkspacePaths,
    clean: bool,
) -> Result<()> {
    for target in targets {
        let outcome = backup_target(ctx, vcs, remote, target, paths, clean)?;
        ctx.report.targets.push(outcome);
        if !ctx.report.ok() {
            break;
        }
    }
    Ok(())
}

/// Remove a target's resume marker from its backup branch so the next run
/// starts from the beginning.
pub fn reset_target(vcs: &dyn VersionControl, target: &Target, paths: &WorkspacePaths) -> Result<bool> {
    let branch = target.branch(&paths.branch_prefix);
    if !vcs.branch_exists(&branch)? {
        return Ok(false);
    }
    if vcs.show_file(&branch, &paths.resume_file)?.is_none() {
        return Ok(false);
    }
    let iso = Isolation::enter(vcs, &branch)?;
    let mut store = ResumeStore::new(paths.marker_path(vcs.worktree()));
    let result = store
        .clear()
        .and_then(|_| vcs.unstage(&paths.resume_file))
        .and_then(|_| vcs.commit(&format!(
            "{} - reset",
            Local::now().format("%Y/%m/%d %H:%M:%S")
        )));
    iso.leave(vcs)?;
    result.map(|_| true)
}
