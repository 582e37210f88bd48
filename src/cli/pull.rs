use std::collections::BTreeSet;
use std::time::Instant;

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::{debug, warn};

use super::VERSION;
use crate::config::Settings;
use crate::error::Abort;
use crate::git::Git;
use crate::lfs;
use crate::output::{self, Console, PALETTE, PullSummary};
use crate::prompt::{Prompter, StdinPrompter};

const FEATURES: &str = "\
Features:
  - checks the working tree for uncommitted changes
  - untracks LFS files that were deleted
  - fetches from the remote and prunes deleted remote branches
  - creates local tracking branches for new remote branches
  - fetches new tags and drops deleted ones
  - fast-forwards local branches that are behind their upstream
  - prunes stale remote-tracking references
  - prints a repository summary";

const LATEST_TAGS_SHOWN: usize = 5;

pub fn cmd() -> Command {
    Command::new("mypull")
        .about("Bring the current repository fully up to date with its remote")
        .version(VERSION)
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .help("Only print errors and prompts"),
        )
        .arg(
            Arg::new("force")
                .short('f')
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Skip the uncommitted-changes check"),
        )
        .arg(
            Arg::new("no-lfs")
                .long("no-lfs")
                .action(ArgAction::SetTrue)
                .help("Skip the LFS stale-tracking cleanup"),
        )
        .after_help(FEATURES)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PullOptions {
    pub quiet: bool,
    pub force: bool,
    pub no_lfs: bool,
}

impl PullOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        PullOptions {
            quiet: matches.get_flag("quiet"),
            force: matches.get_flag("force"),
            no_lfs: matches.get_flag("no-lfs"),
        }
    }
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    let opts = PullOptions::from_matches(matches);
    let console = Console::new(&PALETTE, opts.quiet);
    let settings = Settings::load()?;
    let git = Git::new(std::env::current_dir()?);
    sync(&git, &console, &settings, &mut StdinPrompter, &opts)?;
    Ok(())
}

/// What a sync run changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct PullReport {
    pub created: Vec<String>,
    pub branches: SyncReport,
    pub pruned: usize,
    /// Local tag counts before and after the tag fetch, when it succeeded.
    pub tags: Option<(usize, usize)>,
}

/// Runs every sync step against the repository at `git`. Only the missing
/// repository, a declined working-tree check and the initial fetch stop the
/// run; everything after the fetch is best effort.
pub fn sync(
    git: &Git,
    console: &Console,
    settings: &Settings,
    prompter: &mut dyn Prompter,
    opts: &PullOptions,
) -> Result<PullReport> {
    let started = Instant::now();
    console.banner("syncing repository...");

    if !git.is_repo() {
        return Err(Abort::NotARepository.into());
    }
    let git = git.rooted()?;

    if opts.force {
        console.warn("skipping the uncommitted-changes check (--force)");
    } else {
        check_working_tree(&git, console, prompter)?;
    }

    if !opts.no_lfs {
        if let Err(e) = lfs::cleanup_stale(&git, console) {
            console.warn(format!("LFS cleanup failed: {:#}", e));
        }
    }

    console.info(format!("fetching from {}...", settings.remote));
    let fetch = git.fetch_prune(&settings.remote)?;
    if !fetch.success() {
        return Err(Abort::Precondition(format!(
            "cannot reach remote {}:\n{}",
            settings.remote,
            fetch.combined().trim()
        ))
        .into());
    }
    console.ok("fetch complete");

    let mut report = PullReport {
        created: create_tracking_branches(&git, console, settings, prompter),
        ..PullReport::default()
    };
    report.tags = sync_tags(&git, console, settings);
    report.branches = sync_branches(&git, console);
    report.pruned = prune_remote_refs(&git, console, settings);

    console.blank();
    let summary = PullSummary {
        current_branch: git.current_branch().unwrap_or_default(),
        local_branches: git.local_branches().ok().map(|b| b.len()),
        remote_branches: git.remote_tracking_branches().ok().map(|b| b.len()),
        tags: git.tags().ok().map(|t| t.len()),
        latest_commit: git.latest_commit(),
    };
    output::render_pull_summary(console, &summary)?;
    console.ok(format!(
        "sync finished in {}s",
        started.elapsed().as_secs()
    ));
    Ok(report)
}

fn check_working_tree(git: &Git, console: &Console, prompter: &mut dyn Prompter) -> Result<()> {
    console.info("checking the working tree...");
    if !git.has_tracked_changes()? {
        console.ok("working tree is clean");
        return Ok(());
    }

    console.warn("there are uncommitted changes:");
    console.plain(git.short_status()?);
    if !prompter.confirm("Continue anyway?", false) {
        return Err(Abort::Cancelled("sync cancelled: commit or stash your changes first".into()).into());
    }
    Ok(())
}

/// Remote branch names with no local branch of the same name, alphabetical.
pub fn new_remote_branches(remote: &[String], local: &[String]) -> Vec<String> {
    let local: BTreeSet<&str> = local.iter().map(String::as_str).collect();
    remote
        .iter()
        .map(String::as_str)
        .collect::<BTreeSet<&str>>()
        .difference(&local)
        .map(|b| b.to_string())
        .collect()
}

fn create_tracking_branches(
    git: &Git,
    console: &Console,
    settings: &Settings,
    prompter: &mut dyn Prompter,
) -> Vec<String> {
    console.info("looking for new remote branches...");
    let branches = git
        .remote_branches(&settings.remote)
        .and_then(|remote| Ok((remote, git.local_branches()?)));
    let (remote, local) = match branches {
        Ok(b) => b,
        Err(e) => {
            console.warn(format!("cannot list branches: {:#}", e));
            return Vec::new();
        }
    };

    let fresh = new_remote_branches(&remote, &local);
    if fresh.is_empty() {
        console.ok("no new remote branches");
        return Vec::new();
    }

    console.info(format!("{} new remote branch(es):", fresh.len()));
    for b in &fresh {
        console.item(b);
    }
    if !prompter.confirm("Create local tracking branches for them?", true) {
        console.warn("skipped creating tracking branches");
        return Vec::new();
    }

    let mut created = Vec::new();
    for b in fresh {
        match git.create_tracking_branch(&b, &settings.remote) {
            Ok(()) => {
                console.ok(format!("created {} -> {}/{}", b, settings.remote, b));
                created.push(b);
            }
            Err(e) => console.error(format!("cannot create {}: {:#}", b, e)),
        }
    }
    created
}

fn sync_tags(git: &Git, console: &Console, settings: &Settings) -> Option<(usize, usize)> {
    console.info("syncing tags...");
    let before = git.tags().map(|t| t.len()).unwrap_or(0);
    match git.fetch_tags_prune(&settings.remote) {
        Ok(out) if out.success() => {}
        Ok(out) => {
            console.warn(format!("tag fetch failed: {}", out.combined().trim()));
            return None;
        }
        Err(e) => {
            console.warn(format!("tag fetch failed: {:#}", e));
            return None;
        }
    }
    let after = git.tags().map(|t| t.len()).unwrap_or(0);
    console.ok(output::format_tag_delta(before, after));
    if after > before {
        if let Ok(latest) = git.latest_tags(LATEST_TAGS_SHOWN) {
            console.info("latest tags:");
            for t in latest {
                console.item(t);
            }
        }
    }
    Some((before, after))
}

/// What to do with one local branch whose upstream tip differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchPlan {
    UpToDate,
    /// The checked-out branch: `pull --ff-only`.
    PullCurrent,
    /// Behind only: move the ref without touching the working tree.
    FastForward,
    /// Ahead or diverged. Never merged or rebased automatically.
    Manual,
}

pub fn plan_branch(
    local: &str,
    upstream: &str,
    is_current: bool,
    is_ancestor: impl FnOnce() -> Result<bool>,
) -> Result<BranchPlan> {
    if local == upstream {
        return Ok(BranchPlan::UpToDate);
    }
    if is_current {
        return Ok(BranchPlan::PullCurrent);
    }
    Ok(if is_ancestor()? {
        BranchPlan::FastForward
    } else {
        BranchPlan::Manual
    })
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: Vec<String>,
    pub manual: Vec<String>,
}

fn sync_branches(git: &Git, console: &Console) -> SyncReport {
    console.info("updating local branches...");
    let mut report = SyncReport::default();
    let branches = match git.local_branches() {
        Ok(b) => b,
        Err(e) => {
            console.warn(format!("cannot list local branches: {:#}", e));
            return report;
        }
    };
    let current = git.current_branch().unwrap_or_default();

    for branch in &branches {
        match sync_branch(git, console, branch, *branch == current) {
            Ok(BranchPlan::UpToDate) => {}
            Ok(BranchPlan::PullCurrent | BranchPlan::FastForward) => {
                report.updated.push(branch.clone())
            }
            Ok(BranchPlan::Manual) => report.manual.push(branch.clone()),
            Err(e) => {
                warn!(branch = %branch, error = %e, "branch sync failed");
                console.warn(format!("cannot update {}: {:#}", branch, e));
                report.manual.push(branch.clone());
            }
        }
    }

    if report.updated.is_empty() && report.manual.is_empty() {
        console.ok("all branches are up to date");
    } else if !report.manual.is_empty() {
        console.warn("these branches need manual handling (ahead or diverged):");
        for b in &report.manual {
            console.item(b);
        }
    }
    report
}

/// Returns the plan that was carried out. A failed current-branch pull is
/// reported as `Manual`.
fn sync_branch(git: &Git, console: &Console, branch: &str, is_current: bool) -> Result<BranchPlan> {
    let Some(upstream) = git.upstream(branch)? else {
        debug!(branch, "no upstream");
        return Ok(BranchPlan::UpToDate);
    };
    let tracking = upstream.tracking_ref();
    if !git.ref_exists(&tracking) {
        debug!(branch, tracking = %tracking, "upstream ref is gone");
        return Ok(BranchPlan::UpToDate);
    }

    let local_id = git.rev_parse(branch)?;
    let upstream_id = git.rev_parse(&tracking)?;
    let plan = plan_branch(&local_id, &upstream_id, is_current, || {
        git.is_ancestor(&local_id, &upstream_id)
    })?;

    match plan {
        BranchPlan::UpToDate => {}
        BranchPlan::PullCurrent => {
            console.step("PULL", format!("{} (current branch)", branch));
            let out = git.pull_ff_only()?;
            if !out.success() {
                console.warn(format!("cannot fast-forward {}: {}", branch, out.combined().trim()));
                return Ok(BranchPlan::Manual);
            }
            console.ok(format!("updated {}", branch));
        }
        BranchPlan::FastForward => {
            console.step("FF", branch);
            git.update_branch_ref(branch, &upstream_id, &local_id)?;
            console.ok(format!("updated {}", branch));
        }
        BranchPlan::Manual => {}
    }
    Ok(plan)
}

/// Counts `[would prune]` lines in `git remote prune --dry-run` output.
pub fn count_would_prune(out: &str) -> usize {
    out.lines().filter(|l| l.contains("[would prune]")).count()
}

fn prune_remote_refs(git: &Git, console: &Console, settings: &Settings) -> usize {
    console.info("checking for stale remote-tracking references...");
    let stale = match git.remote_prune_dry_run(&settings.remote) {
        Ok(out) if out.success() => count_would_prune(&out.stdout),
        Ok(out) => {
            console.warn(format!("prune check failed: {}", out.combined().trim()));
            return 0;
        }
        Err(e) => {
            console.warn(format!("prune check failed: {:#}", e));
            return 0;
        }
    };
    if stale == 0 {
        console.ok("no stale remote-tracking references");
        return 0;
    }

    match git.remote_prune(&settings.remote) {
        Ok(out) if out.success() => {
            console.ok(format!("pruned {} stale reference(s)", stale));
            stale
        }
        Ok(out) => {
            console.warn(format!("prune failed: {}", out.combined().trim()));
            0
        }
        Err(e) => {
            console.warn(format!("prune failed: {:#}", e));
            0
        }
    }
}
