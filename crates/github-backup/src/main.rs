use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use github_backup::Result;
use github_backup::budget::Budget;
use github_backup::checkpoint::CheckpointId;
use github_backup::config::{self, BackupConfig};
use github_backup::finalize;
use github_backup::remote::{FixtureSource, GithubClient, RemoteSource};
use github_backup::report::{RunEvent, StdoutSink};
use github_backup::sections::{self, PlanLine};
use github_backup::traversal::RunCtx;
use github_backup::vcs::{GitCli, VersionControl};
use github_backup::workspace::{self, Target, WorkspacePaths};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Log output format (filter with RUST_LOG)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PlanKind {
    User,
    Repo,
}

#[derive(Debug, clap::Args)]
struct TargetOpts {
    /// Config file (default: ghbackup.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Git working tree that holds the backup branches
    #[arg(short = 'd', long = "dir")]
    dir: Option<PathBuf>,
    /// Back up this user's profile and social graph
    #[arg(short, long)]
    user: Option<String>,
    /// Back up this repository (owner/name); defaults to the origin remote
    #[arg(short, long)]
    repo: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Back up the targets, resuming where the last run stopped
    Run {
        #[command(flatten)]
        target: TargetOpts,
        /// GitHub login for basic authentication
        #[arg(short, long)]
        login: Option<String>,
        /// GitHub token (overrides config and the token environment variable)
        #[arg(short, long)]
        token: Option<String>,
        /// Ignore any resume marker and start from the beginning
        #[arg(long)]
        clean: bool,
        /// Spend at most this many remote accesses
        #[arg(long)]
        limit: Option<i64>,
        /// Read the remote from a JSON snapshot instead of GitHub
        #[arg(long)]
        fixture: Option<PathBuf>,
    },
    /// Show each target's backup branch and pending resume point
    Status {
        #[command(flatten)]
        target: TargetOpts,
    },
    /// Drop pending resume points so the next run starts over
    Clean {
        #[command(flatten)]
        target: TargetOpts,
    },
    /// Print the backup tree with node kinds and costs
    Plan {
        #[arg(value_enum)]
        kind: PlanKind,
    },
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();
    init_tracing(args.log_format);

    let res = match args.cmd {
        Command::Run {
            target,
            login,
            token,
            clean,
            limit,
            fixture,
        } => cmd_run(&target, login, token, clean, limit, fixture),
        Command::Status { target } => cmd_status(&target).map(|_| true),
        Command::Clean { target } => cmd_clean(&target).map(|_| true),
        Command::Plan { kind } => {
            cmd_plan(kind);
            Ok(true)
        }
    };
    match res {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

struct Setup {
    cfg: BackupConfig,
    paths: WorkspacePaths,
    vcs: GitCli,
    targets: Vec<Target>,
}

fn setup(opts: &TargetOpts, tweak: impl FnOnce(&mut BackupConfig)) -> Result<Setup> {
    let doc = config::load_or_default(opts.config.as_deref())?;
    let mut cfg = BackupConfig::from_doc(&doc)?;
    if opts.user.is_some() || opts.repo.is_some() {
        cfg.target.user = opts.user.clone();
        cfg.target.repo = opts.repo.clone();
    }
    tweak(&mut cfg);
    cfg.validate()?;

    let paths = workspace::load_paths(&cfg.workspace, opts.dir.as_deref())?;
    let vcs = GitCli::open(&paths.git_dir)?;
    let targets = workspace::resolve_targets(
        cfg.target.user.as_deref(),
        cfg.target.repo.as_deref(),
        &vcs,
    )?;
    Ok(Setup {
        cfg,
        paths,
        vcs,
        targets,
    })
}

fn cmd_run(
    opts: &TargetOpts,
    login: Option<String>,
    token: Option<String>,
    clean: bool,
    limit: Option<i64>,
    fixture: Option<PathBuf>,
) -> Result<bool> {
    let s = setup(opts, |cfg| {
        if login.is_some() {
            cfg.github.login = login;
        }
        if token.is_some() {
            cfg.github.token = token;
        }
        if limit.is_some() {
            cfg.budget.limit = limit;
        }
    })?;

    let remote: Box<dyn RemoteSource> = match fixture {
        Some(p) => Box::new(FixtureSource::from_path(&p)?),
        None => Box::new(GithubClient::new(&s.cfg.github)?),
    };
    let budget = Budget::from_quota(remote.remaining_quota(), s.cfg.budget.limit);
    println!("BUDGET: {}", budget.remaining());

    let mut ctx = RunCtx::new(budget, Arc::new(StdoutSink::default()));
    let res = finalize::run_targets(
        &mut ctx,
        &s.vcs,
        remote.as_ref(),
        &s.targets,
        &s.paths,
        clean,
    );
    let error = match &res {
        Err(e) => Some(e.to_string()),
        Ok(()) => ctx.report.errors.first().cloned(),
    };
    let ok = res.is_ok() && ctx.report.ok();
    ctx.emit(RunEvent::RunDone {
        ok,
        spent: ctx.budget.spent(),
        error,
    });
    Ok(ok)
}

fn cmd_status(opts: &TargetOpts) -> Result<()> {
    let s = setup(opts, |_| {})?;
    let current = s.vcs.current_ref()?;
    for target in &s.targets {
        let branch = target.branch(&s.paths.branch_prefix);
        if !s.vcs.branch_exists(&branch)? {
            println!("{target}: {branch} (never backed up)");
            continue;
        }
        let raw = if current == branch {
            std::fs::read_to_string(s.paths.marker_path(s.vcs.worktree())).ok()
        } else {
            s.vcs.show_file(&branch, &s.paths.resume_file)?
        };
        let marker = raw
            .as_deref()
            .and_then(|r| r.lines().next())
            .map(str::trim)
            .filter(|l| !l.is_empty());
        match marker {
            None => println!("{target}: {branch} (complete)"),
            Some(m) => match m.parse::<CheckpointId>() {
                Ok(id) => println!("{target}: {branch} (resumes at {id})"),
                Err(e) => println!("{target}: {branch} (unreadable resume point: {e})"),
            },
        }
    }
    Ok(())
}

fn cmd_clean(opts: &TargetOpts) -> Result<()> {
    let s = setup(opts, |_| {})?;
    for target in &s.targets {
        let branch = target.branch(&s.paths.branch_prefix);
        if finalize::reset_target(&s.vcs, target, &s.paths)? {
            println!("CLEAN: {target} ({branch})");
        } else {
            println!("CLEAN: {target} has no pending resume point");
        }
    }
    Ok(())
}

fn cmd_plan(kind: PlanKind) {
    let lines: Vec<PlanLine> = match kind {
        PlanKind::User => sections::plan(&sections::user_sections()),
        PlanKind::Repo => sections::plan(&sections::repo_sections()),
    };
    for (i, line) in lines.iter().enumerate() {
        println!(
            "{:>2}. {:<36} {:<6} {:>4}  {}",
            i + 1,
            line.path,
            line.kind.to_string(),
            line.cost,
            line.label
        );
    }
}
