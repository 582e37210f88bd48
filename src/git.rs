use std::env;
use std::ffi::OsString;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::exec::{self, CmdOutput};

const NEW_SUFFIX: &str = ":new";

/// Handle on one repository. Every call is an explicit argument vector run
/// with the repository as the working directory.
#[derive(Debug, Clone)]
pub struct Git {
    dir: PathBuf,
    path_prefix: Option<PathBuf>,
}

impl Git {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Git {
            dir: dir.into(),
            path_prefix: None,
        }
    }

    /// Prepends `bin_dir` to `PATH` for every spawned git, so helpers such as
    /// `git-lfs` resolve there first.
    pub fn with_path_prefix(mut self, bin_dir: impl Into<PathBuf>) -> Self {
        self.path_prefix = Some(bin_dir.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.dir);
        if let Some(prefix) = &self.path_prefix {
            let mut paths = vec![prefix.clone()];
            if let Some(existing) = env::var_os("PATH") {
                paths.extend(env::split_paths(&existing));
            }
            if let Ok(joined) = env::join_paths(paths) {
                cmd.env("PATH", joined);
            }
        }
        cmd
    }

    /// Buffered run that reports the exit code instead of failing on it.
    pub fn exec(&self, args: &[&str]) -> Result<CmdOutput> {
        debug!(args = ?args, dir = %self.dir.display(), "git");
        let out = exec::run(self.command(args))
            .with_context(|| format!("cannot run git {}", args.join(" ")))?;
        debug!(code = out.code, "git exited");
        Ok(out)
    }

    /// Buffered run that fails on a non-zero exit and returns trimmed stdout.
    pub fn run(&self, args: &[&str]) -> Result<String> {
        let out = self.exec(args)?;
        if !out.success() {
            bail!(
                "git {} (in {}): exit status {}\n{}",
                args.join(" "),
                self.dir.display(),
                out.code,
                out.stderr.trim()
            );
        }
        Ok(out.stdout.trim().to_string())
    }

    /// Runs git on a pseudo-terminal, echoing to `sink`.
    pub fn stream(
        &self,
        args: &[&str],
        sink: &mut dyn Write,
        poll_interval: Duration,
    ) -> Result<CmdOutput> {
        debug!(args = ?args, dir = %self.dir.display(), "git (tty)");
        let out = exec::stream(self.command(args), sink, poll_interval)
            .with_context(|| format!("cannot run git {}", args.join(" ")))?;
        debug!(code = out.code, "git exited");
        Ok(out)
    }

    // -----------------------------------------------------------------------
    // Repository context
    // -----------------------------------------------------------------------

    pub fn is_repo(&self) -> bool {
        self.exec(&["rev-parse", "--git-dir"])
            .map(|o| o.success())
            .unwrap_or(false)
    }

    pub fn git_dir(&self) -> Result<PathBuf> {
        self.run(&["rev-parse", "--absolute-git-dir"])
            .map(PathBuf::from)
    }

    pub fn toplevel(&self) -> Result<PathBuf> {
        self.run(&["rev-parse", "--show-toplevel"]).map(PathBuf::from)
    }

    /// The same handle re-anchored at the working tree's top level, so
    /// root-relative paths from git output resolve correctly.
    pub fn rooted(&self) -> Result<Git> {
        Ok(Git {
            dir: self.toplevel()?,
            path_prefix: self.path_prefix.clone(),
        })
    }

    /// Empty when HEAD is detached.
    pub fn current_branch(&self) -> Result<String> {
        self.run(&["branch", "--show-current"])
    }

    pub fn in_progress(&self) -> Result<Option<InProgress>> {
        let git_dir = self.git_dir()?;
        Ok(InProgress::detect(&git_dir))
    }

    // -----------------------------------------------------------------------
    // Working tree
    // -----------------------------------------------------------------------

    /// Any change at all, untracked files included.
    pub fn is_dirty(&self) -> Result<bool> {
        Ok(!self.run(&["status", "--porcelain"])?.is_empty())
    }

    /// False on an unborn branch.
    pub fn has_commits(&self) -> bool {
        self.exec(&["rev-parse", "--verify", "--quiet", "HEAD"])
            .map(|o| o.success())
            .unwrap_or(false)
    }

    /// Changes to tracked files only. Before the first commit every staged
    /// file counts.
    pub fn has_tracked_changes(&self) -> Result<bool> {
        if !self.has_commits() {
            let staged = self.run(&["status", "--porcelain", "--untracked-files=no"])?;
            return Ok(!staged.is_empty());
        }
        self.exec(&["update-index", "-q", "--refresh"])?;
        let out = self.exec(&["diff-index", "--quiet", "HEAD", "--"])?;
        match out.code {
            0 => Ok(false),
            1 => Ok(true),
            _ => bail!("git diff-index: exit status {}\n{}", out.code, out.stderr.trim()),
        }
    }

    pub fn short_status(&self) -> Result<String> {
        self.run(&["status", "--short"])
    }

    // -----------------------------------------------------------------------
    // Branches and refs
    // -----------------------------------------------------------------------

    pub fn local_branches(&self) -> Result<Vec<String>> {
        let out = self.run(&["for-each-ref", "--format=%(refname:short)", "refs/heads/"])?;
        Ok(sorted_lines(&out))
    }

    /// Branch names advertised by `remote`.
    pub fn remote_branches(&self, remote: &str) -> Result<Vec<String>> {
        let out = self.run(&["ls-remote", "--heads", remote])?;
        Ok(parse_heads(&out))
    }

    /// Remote-tracking refs, without the symbolic `<remote>/HEAD`.
    pub fn remote_tracking_branches(&self) -> Result<Vec<String>> {
        let out = self.run(&["for-each-ref", "--format=%(refname)", "refs/remotes/"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|r| !r.is_empty() && !r.ends_with("/HEAD"))
            .map(|r| r.trim_start_matches("refs/remotes/").to_string())
            .collect())
    }

    pub fn upstream(&self, branch: &str) -> Result<Option<Upstream>> {
        let remote = self.config_get(&format!("branch.{}.remote", branch))?;
        let merge = self.config_get(&format!("branch.{}.merge", branch))?;
        Ok(match (remote, merge) {
            (Some(remote), Some(merge)) => Some(Upstream { remote, merge }),
            _ => None,
        })
    }

    pub fn has_upstream(&self, branch: &str) -> bool {
        let rev = format!("{}@{{upstream}}", branch);
        self.exec(&["rev-parse", "--abbrev-ref", "--verify", "--quiet", &rev])
            .map(|o| o.success())
            .unwrap_or(false)
    }

    /// Commits on `branch` that its upstream does not have.
    pub fn unpushed_count(&self, branch: &str) -> Result<u32> {
        let range = format!("{}@{{upstream}}..{}", branch, branch);
        self.count_commits(&range)
    }

    pub fn count_commits(&self, range: &str) -> Result<u32> {
        let out = self.run(&["rev-list", "--count", range])?;
        out.parse::<u32>()
            .with_context(|| format!("unexpected rev-list output {:?}", out))
    }

    pub fn rev_parse(&self, rev: &str) -> Result<String> {
        self.run(&["rev-parse", "--verify", "--quiet", rev])
    }

    pub fn ref_exists(&self, git_ref: &str) -> bool {
        self.exec(&["show-ref", "--verify", "--quiet", git_ref])
            .map(|o| o.success())
            .unwrap_or(false)
    }

    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> Result<bool> {
        let out = self.exec(&["merge-base", "--is-ancestor", ancestor, descendant])?;
        match out.code {
            0 => Ok(true),
            1 => Ok(false),
            _ => bail!(
                "git merge-base --is-ancestor (in {}): exit status {}\n{}",
                self.dir.display(),
                out.code,
                out.stderr.trim()
            ),
        }
    }

    pub fn create_tracking_branch(&self, branch: &str, remote: &str) -> Result<()> {
        let start = format!("{}/{}", remote, branch);
        self.run(&["branch", "--track", "--", branch, &start])?;
        Ok(())
    }

    /// Moves `refs/heads/<branch>` to `new`, refusing if it no longer points at `old`.
    pub fn update_branch_ref(&self, branch: &str, new: &str, old: &str) -> Result<()> {
        let full = format!("refs/heads/{}", branch);
        self.run(&["update-ref", &full, new, old])?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Remote operations
    // -----------------------------------------------------------------------

    pub fn fetch_prune(&self, remote: &str) -> Result<CmdOutput> {
        self.exec(&["fetch", remote, "--prune"])
    }

    pub fn fetch_tags_prune(&self, remote: &str) -> Result<CmdOutput> {
        // --prune-tags only takes effect together with --prune
        self.exec(&["fetch", remote, "--prune", "--prune-tags", "--tags"])
    }

    pub fn pull_ff_only(&self) -> Result<CmdOutput> {
        self.exec(&["pull", "--ff-only"])
    }

    pub fn remote_prune_dry_run(&self, remote: &str) -> Result<CmdOutput> {
        self.exec(&["remote", "prune", remote, "--dry-run"])
    }

    pub fn remote_prune(&self, remote: &str) -> Result<CmdOutput> {
        self.exec(&["remote", "prune", remote])
    }

    pub fn push(
        &self,
        remote: &str,
        branch: &BranchRef,
        sink: &mut dyn Write,
        poll_interval: Duration,
    ) -> Result<CmdOutput> {
        let mut args = vec!["push"];
        if branch.is_new {
            args.push("-u");
        }
        args.extend([remote, branch.name.as_str()]);
        self.stream(&args, sink, poll_interval)
    }

    pub fn push_force_with_lease(
        &self,
        remote: &str,
        branch: &str,
        sink: &mut dyn Write,
        poll_interval: Duration,
    ) -> Result<CmdOutput> {
        self.stream(
            &["push", "--force-with-lease", remote, branch],
            sink,
            poll_interval,
        )
    }

    pub fn push_tags(
        &self,
        remote: &str,
        sink: &mut dyn Write,
        poll_interval: Duration,
    ) -> Result<CmdOutput> {
        self.stream(&["push", remote, "--tags"], sink, poll_interval)
    }

    // -----------------------------------------------------------------------
    // Tags and history
    // -----------------------------------------------------------------------

    pub fn tags(&self) -> Result<Vec<String>> {
        let out = self.run(&["tag"])?;
        Ok(out.lines().filter(|l| !l.trim().is_empty()).map(String::from).collect())
    }

    /// Most recently created tags first.
    pub fn latest_tags(&self, n: usize) -> Result<Vec<String>> {
        let out = self.run(&["tag", "--sort=-creatordate"])?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(n)
            .map(String::from)
            .collect())
    }

    /// `<short-hash> <subject>` of HEAD, `None` in an empty repository.
    pub fn latest_commit(&self) -> Option<String> {
        self.run(&["log", "-1", "--pretty=format:%h %s"])
            .ok()
            .filter(|s| !s.is_empty())
    }

    /// Full message of HEAD with trailing newlines removed.
    pub fn head_message(&self) -> Result<String> {
        let out = self.exec(&["log", "-1", "--format=%B"])?;
        if !out.success() {
            bail!("git log -1: exit status {}\n{}", out.code, out.stderr.trim());
        }
        Ok(out.stdout.trim_end_matches('\n').to_string())
    }

    // -----------------------------------------------------------------------
    // Index and commits
    // -----------------------------------------------------------------------

    pub fn add_all(&self) -> Result<()> {
        self.run(&["add", "-A"])?;
        Ok(())
    }

    pub fn add_paths(&self, paths: &[&str]) -> Result<()> {
        let mut args = vec!["add", "--"];
        args.extend_from_slice(paths);
        self.run(&args)?;
        Ok(())
    }

    pub fn commit_with_message(&self, message: &str) -> Result<CmdOutput> {
        self.exec(&["commit", "-m", message])
    }

    /// Commits with the exact bytes of `file` as the message.
    pub fn commit_from_file(&self, file: &Path) -> Result<CmdOutput> {
        let file = file.to_str().context("path contains non-UTF8 characters")?;
        self.exec(&["commit", "--cleanup=verbatim", "-F", file])
    }

    /// Moves HEAD back one commit, keeping index and working tree.
    pub fn reset_soft_parent(&self) -> Result<()> {
        self.run(&["reset", "--soft", "HEAD~1"])?;
        Ok(())
    }

    pub fn user_name(&self) -> Option<String> {
        self.config_get("user.name").ok().flatten()
    }

    fn config_get(&self, key: &str) -> Result<Option<String>> {
        let out = self.exec(&["config", "--get", key])?;
        match out.code {
            0 => Ok(Some(out.stdout.trim().to_string()).filter(|s| !s.is_empty())),
            1 => Ok(None),
            _ => bail!("git config --get {}: exit status {}\n{}", key, out.code, out.stderr.trim()),
        }
    }
}

/// A branch's configured upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub remote: String,
    /// Remote-side ref, e.g. `refs/heads/main`.
    pub merge: String,
}

impl Upstream {
    /// Local remote-tracking ref for this upstream.
    pub fn tracking_ref(&self) -> String {
        let name = self.merge.trim_start_matches("refs/heads/");
        format!("refs/remotes/{}/{}", self.remote, name)
    }
}

/// A local branch selected for pushing.
///
/// The text form appends `:new` when the branch has no upstream yet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct BranchRef {
    pub name: String,
    pub is_new: bool,
}

impl BranchRef {
    pub fn tracked(name: impl Into<String>) -> Self {
        BranchRef {
            name: name.into(),
            is_new: false,
        }
    }

    pub fn new_branch(name: impl Into<String>) -> Self {
        BranchRef {
            name: name.into(),
            is_new: true,
        }
    }
}

impl fmt::Display for BranchRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_new {
            write!(f, "{}{}", self.name, NEW_SUFFIX)
        } else {
            f.write_str(&self.name)
        }
    }
}

impl FromStr for BranchRef {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, is_new) = match s.strip_suffix(NEW_SUFFIX) {
            Some(name) => (name, true),
            None => (s, false),
        };
        if name.is_empty() {
            bail!("empty branch name in {:?}", s);
        }
        Ok(BranchRef {
            name: name.to_string(),
            is_new,
        })
    }
}

/// A history-rewriting operation left unfinished in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InProgress {
    Merge,
    CherryPick,
    Revert,
    Rebase,
}

impl InProgress {
    pub fn detect(git_dir: &Path) -> Option<InProgress> {
        let markers = [
            ("MERGE_HEAD", InProgress::Merge),
            ("CHERRY_PICK_HEAD", InProgress::CherryPick),
            ("REVERT_HEAD", InProgress::Revert),
            ("rebase-merge", InProgress::Rebase),
            ("rebase-apply", InProgress::Rebase),
        ];
        markers
            .into_iter()
            .find(|(marker, _)| git_dir.join(marker).exists())
            .map(|(_, op)| op)
    }
}

impl fmt::Display for InProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InProgress::Merge => "merge",
            InProgress::CherryPick => "cherry-pick",
            InProgress::Revert => "revert",
            InProgress::Rebase => "rebase",
        })
    }
}

fn sorted_lines(out: &str) -> Vec<String> {
    let mut lines: Vec<String> = out
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    lines.sort();
    lines
}

/// Parses `ls-remote --heads` output into sorted branch names.
pub fn parse_heads(out: &str) -> Vec<String> {
    let mut heads: Vec<String> = out
        .lines()
        .filter_map(|line| line.split_once("refs/heads/"))
        .map(|(_, name)| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    heads.sort();
    heads
}

/// OS login name of the current user.
pub fn os_user() -> Option<String> {
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|u| u.name)
        .or_else(|| env::var_os("USER").map(|u: OsString| u.to_string_lossy().into_owned()))
        .filter(|s| !s.is_empty())
}
