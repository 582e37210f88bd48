use anyhow::{Result, bail};
use chrono::{Local, NaiveDateTime};
use clap::{Arg, ArgAction, ArgMatches, Command};
use tracing::info;

use super::VERSION;
use crate::config::Settings;
use crate::error::Abort;
use crate::exec::CmdOutput;
use crate::git::{self, BranchRef, Git, InProgress};
use crate::lfs;
use crate::output::{self, Console, PALETTE, PushOutcome, PushRow, Tone};
use crate::prompt::{Prompter, StdinPrompter};
use crate::recovery;
use crate::rejection;

const DEFAULT_COMMIT_PREFIX: &str = "[default commit from mypush]";

pub fn cmd() -> Command {
    Command::new("mypush")
        .about("Push local work, recovering from large-file rejections with Git LFS")
        .version(VERSION)
        .arg(
            Arg::new("default")
                .short('d')
                .long("default")
                .action(ArgAction::SetTrue)
                .help("Commit all uncommitted changes with a default message first"),
        )
        .arg(
            Arg::new("current")
                .short('c')
                .long("current")
                .action(ArgAction::SetTrue)
                .help("Push only the current branch"),
        )
        .arg(
            Arg::new("force")
                .short('f')
                .long("force")
                .action(ArgAction::SetTrue)
                .help("Force-push the current branch (--force-with-lease)"),
        )
        .arg(
            Arg::new("tags")
                .short('t')
                .long("tags")
                .action(ArgAction::SetTrue)
                .help("Push tags only"),
        )
        .arg(
            Arg::new("no-lfs")
                .long("no-lfs")
                .action(ArgAction::SetTrue)
                .help("Skip the LFS stale-tracking cleanup"),
        )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PushOptions {
    pub default_commit: bool,
    pub current_only: bool,
    pub force: bool,
    pub tags: bool,
    pub no_lfs: bool,
}

impl PushOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        PushOptions {
            default_commit: matches.get_flag("default"),
            current_only: matches.get_flag("current"),
            force: matches.get_flag("force"),
            tags: matches.get_flag("tags"),
            no_lfs: matches.get_flag("no-lfs"),
        }
    }
}

pub fn run(matches: &ArgMatches) -> Result<()> {
    let opts = PushOptions::from_matches(matches);
    let console = Console::new(&PALETTE, false);
    let settings = Settings::load()?;
    let git = Git::new(std::env::current_dir()?);
    publish(&git, &console, &settings, &mut StdinPrompter, &opts)?;
    Ok(())
}

/// Leftovers of an earlier run found at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interrupted {
    /// A merge, cherry-pick, revert or rebase is unfinished. Always fatal.
    InProgress(InProgress),
    /// The current branch has commits its upstream lacks.
    Unpushed { branch: String, commits: u32 },
    None,
}

pub fn detect_interrupted(git: &Git) -> Result<Interrupted> {
    if let Some(op) = git.in_progress()? {
        return Ok(Interrupted::InProgress(op));
    }
    let branch = git.current_branch()?;
    if branch.is_empty() || !git.has_upstream(&branch) {
        return Ok(Interrupted::None);
    }
    let commits = git.unpushed_count(&branch)?;
    Ok(if commits > 0 {
        Interrupted::Unpushed { branch, commits }
    } else {
        Interrupted::None
    })
}

pub fn default_commit_message(user: &str, at: &NaiveDateTime) -> String {
    format!(
        "{} user: {} at {}",
        DEFAULT_COMMIT_PREFIX,
        user,
        at.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Stages everything and commits it under the default message. Returns
/// false when there was nothing to commit.
pub fn auto_commit(git: &Git, console: &Console) -> Result<bool> {
    let user = git
        .user_name()
        .or_else(git::os_user)
        .unwrap_or_else(|| "unknown".into());
    let message = default_commit_message(&user, &Local::now().naive_local());

    console.step("AUTO", "committing all changes...");
    git.add_all()?;
    let out = git.commit_with_message(&message)?;
    if out.success() {
        console.ok(format!("committed: {}", message));
        return Ok(true);
    }

    let text = out.combined();
    if text.contains("nothing to commit") || text.contains("no changes added to commit") {
        console.warn("nothing to commit");
        return Ok(false);
    }
    bail!("git commit failed: {}", text.trim())
}

/// Local branches with something to publish: no upstream yet, or commits
/// the upstream lacks. Branches that are only behind are left alone.
pub fn branches_to_push(git: &Git) -> Result<Vec<BranchRef>> {
    let mut out = Vec::new();
    for branch in git.local_branches()? {
        if !git.has_upstream(&branch) {
            out.push(BranchRef::new_branch(branch));
        } else if git.unpushed_count(&branch)? > 0 {
            out.push(BranchRef::tracked(branch));
        }
    }
    Ok(out)
}

fn current_target(git: &Git) -> Result<BranchRef> {
    let branch = git.current_branch()?;
    if branch.is_empty() {
        return Err(Abort::Precondition("HEAD is detached; check out a branch to push".into()).into());
    }
    Ok(if git.has_upstream(&branch) {
        BranchRef::tracked(branch)
    } else {
        BranchRef::new_branch(branch)
    })
}

/// One line explaining a failed push.
fn failure_reason(out: &CmdOutput) -> String {
    out.combined()
        .lines()
        .map(str::trim)
        .find(|l| l.contains("[rejected]") || l.starts_with("error:") || l.starts_with("fatal:"))
        .map(String::from)
        .unwrap_or_else(|| format!("exit status {}", out.code))
}

/// Pushes one branch, handing large-file rejections to recovery.
pub fn push_branch(
    git: &Git,
    console: &Console,
    settings: &Settings,
    prompter: &mut dyn Prompter,
    branch: &BranchRef,
) -> PushOutcome {
    let action = if branch.is_new { "new branch" } else { "branch" };
    console.step("PUSH", format!("{}: {}", action, branch.name));

    let out = match git.push(
        &settings.remote,
        branch,
        &mut console.sink(),
        settings.poll_interval,
    ) {
        Ok(out) => out,
        Err(e) => {
            console.error(format!("push failed: {}: {:#}", branch.name, e));
            return PushOutcome::Failed(format!("{:#}", e));
        }
    };
    if out.success() {
        console.ok(format!("pushed {}", branch.name));
        return PushOutcome::Pushed;
    }

    let text = out.combined();
    if let Some(sig) = rejection::detect(&text, &settings.signatures) {
        info!(branch = %branch, signature = %sig.name, "large-file rejection");
        return match recovery::recover(git, console, settings, prompter, branch, &text) {
            Ok(()) => PushOutcome::Recovered,
            Err(e) => {
                console.error(format!("{}: {}", branch.name, e));
                PushOutcome::Failed(e.to_string())
            }
        };
    }

    console.error(format!("push failed: {}", branch.name));
    PushOutcome::Failed(failure_reason(&out))
}

fn force_push(
    git: &Git,
    console: &Console,
    settings: &Settings,
    prompter: &mut dyn Prompter,
) -> Result<()> {
    let branch = git.current_branch()?;
    if branch.is_empty() {
        return Err(Abort::Precondition("HEAD is detached; check out a branch to force-push".into()).into());
    }

    console.warn(format!(
        "force-pushing {} to {} with --force-with-lease",
        branch, settings.remote
    ));
    let answer = prompter
        .ask("This may overwrite remote changes. Type 'yes' to continue:")
        .unwrap_or_default();
    if !answer.trim().eq_ignore_ascii_case("yes") {
        console.say(Tone::Warn, "[CANCEL] force push cancelled");
        return Ok(());
    }

    let out = git.push_force_with_lease(
        &settings.remote,
        &branch,
        &mut console.sink(),
        settings.poll_interval,
    )?;
    if out.success() {
        console.ok(format!("force-pushed {}", branch));
    } else {
        console.error(format!("force push failed: {}", failure_reason(&out)));
    }
    Ok(())
}

fn push_tags(git: &Git, console: &Console, settings: &Settings) -> Result<()> {
    console.info("pushing all tags...");
    let out = git.push_tags(&settings.remote, &mut console.sink(), settings.poll_interval)?;
    if out.success() {
        console.ok("tags pushed");
    } else {
        console.error(format!("tag push failed: {}", failure_reason(&out)));
    }
    Ok(())
}

/// Runs a whole push. Returns one row per branch attempted; force and
/// tag-only runs return none.
pub fn publish(
    git: &Git,
    console: &Console,
    settings: &Settings,
    prompter: &mut dyn Prompter,
    opts: &PushOptions,
) -> Result<Vec<PushRow>> {
    console.banner("pushing...");

    if !git.is_repo() {
        return Err(Abort::NotARepository.into());
    }
    let git = git.rooted()?;

    if !opts.no_lfs {
        if let Err(e) = lfs::cleanup_stale(&git, console) {
            console.warn(format!("LFS cleanup failed: {:#}", e));
        }
    }

    let resuming = match detect_interrupted(&git)? {
        Interrupted::InProgress(op) => {
            return Err(Abort::Precondition(format!(
                "a {} is in progress; finish or abort it before pushing",
                op
            ))
            .into());
        }
        // force and tag-only runs never reach the dirty-tree check
        Interrupted::Unpushed { .. } if opts.force || opts.tags => false,
        Interrupted::Unpushed { branch, commits } => {
            console.warn(format!("{} has {} unpushed commit(s)", branch, commits));
            prompter.confirm(
                &format!("Resume pushing {} unpushed commit(s) on {}?", commits, branch),
                true,
            )
        }
        Interrupted::None => false,
    };

    if opts.force {
        force_push(&git, console, settings, prompter)?;
        return Ok(Vec::new());
    }
    if opts.tags {
        push_tags(&git, console, settings)?;
        return Ok(Vec::new());
    }

    if resuming {
        console.info("resuming: skipping the uncommitted-changes check");
    } else if git.is_dirty()? {
        if opts.default_commit {
            auto_commit(&git, console)?;
            console.blank();
        } else {
            console.warn("there are uncommitted changes:");
            console.plain(git.short_status()?);
            return Err(Abort::Precondition(
                "commit your changes first, or use -d to commit them automatically".into(),
            )
            .into());
        }
    }

    console.info("checking which branches need pushing...");
    let targets = if opts.current_only {
        vec![current_target(&git)?]
    } else {
        branches_to_push(&git)?
    };
    if targets.is_empty() {
        console.ok("nothing to push");
        return Ok(Vec::new());
    }
    console.info(format!("{} branch(es) to push", targets.len()));

    let mut rows = Vec::new();
    for branch in &targets {
        let outcome = push_branch(&git, console, settings, prompter, branch);
        rows.push(PushRow {
            branch: branch.name.clone(),
            outcome,
        });
    }

    output::render_push_summary(console, &rows)?;
    console.ok("done");
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::Scripted;
    use crate::testutil::{
        fake_lfs_bin, git_in, install_size_limit_hook, local_commit, second_clone,
        setup_clone_repo,
    };
    use chrono::NaiveDate;

    fn opts() -> PushOptions {
        PushOptions {
            no_lfs: true,
            ..PushOptions::default()
        }
    }

    fn run_publish(
        git: &Git,
        answers: &[&str],
        opts: &PushOptions,
    ) -> (Result<Vec<PushRow>>, Scripted) {
        let mut p = Scripted::new(answers.iter().copied());
        let result = publish(
            git,
            &Console::silent(),
            &Settings::defaults().unwrap(),
            &mut p,
            opts,
        );
        (result, p)
    }

    fn is_precondition(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<Abort>(), Some(Abort::Precondition(_)))
    }

    #[test]
    fn test_default_commit_message() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(9, 7, 1)
            .unwrap();
        assert_eq!(
            default_commit_message("alice", &at),
            "[default commit from mypush] user: alice at 2024-03-05 09:07:01"
        );
    }

    #[test]
    fn test_failure_reason() {
        let cases = vec![
            (
                "rejected line",
                " ! [rejected]        main -> main (fetch first)\nerror: failed to push some refs\n",
                1,
                "! [rejected]        main -> main (fetch first)",
            ),
            (
                "fatal line",
                "fatal: 'nowhere' does not appear to be a git repository\n",
                128,
                "fatal: 'nowhere' does not appear to be a git repository",
            ),
            ("no recognisable line", "something odd\n", 1, "exit status 1"),
        ];
        for (name, stdout, code, want) in cases {
            let out = CmdOutput {
                code,
                stdout: stdout.into(),
                stderr: String::new(),
            };
            assert_eq!(failure_reason(&out), want, "{}", name);
        }
    }

    #[test]
    fn test_branches_to_push_marks_new_branch() {
        let (clone, _remote, _ct, _rt) = setup_clone_repo();
        git_in(&clone, &["checkout", "-b", "feature-x"]);
        local_commit(&clone, "x.txt", "x");

        let got = branches_to_push(&Git::new(&clone)).unwrap();
        let text: Vec<String> = got.iter().map(|b| b.to_string()).collect();
        assert_eq!(text, vec!["feature-x:new"]);
    }

    #[test]
    fn test_branches_to_push_skips_behind_only() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        let (other, _ot) = second_clone(&remote);
        local_commit(&other, "o.txt", "o");
        git_in(&other, &["push", "origin", "main"]);
        git_in(&clone, &["fetch", "origin"]);

        assert!(branches_to_push(&Git::new(&clone)).unwrap().is_empty());

        local_commit(&clone, "c.txt", "c");
        assert_eq!(
            branches_to_push(&Git::new(&clone)).unwrap(),
            vec![BranchRef::tracked("main")]
        );
    }

    #[test]
    fn test_publish_new_branch_sets_upstream() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        git_in(&clone, &["checkout", "-b", "feature-x"]);
        local_commit(&clone, "x.txt", "x");

        let (result, p) = run_publish(&Git::new(&clone), &[], &opts());
        let rows = result.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].branch, "feature-x");
        assert_eq!(rows[0].outcome, PushOutcome::Pushed);
        assert!(p.asked.is_empty());

        let git = Git::new(&clone);
        assert!(git.has_upstream("feature-x"));
        assert_eq!(
            git.rev_parse("feature-x").unwrap(),
            git_in(&remote, &["rev-parse", "feature-x"])
        );
    }

    #[test]
    fn test_in_progress_operation_is_fatal() {
        let (clone, _remote, _ct, _rt) = setup_clone_repo();
        let head = git_in(&clone, &["rev-parse", "HEAD"]);
        std::fs::write(clone.join(".git").join("MERGE_HEAD"), format!("{}\n", head)).unwrap();

        let git = Git::new(&clone);
        assert_eq!(
            detect_interrupted(&git).unwrap(),
            Interrupted::InProgress(InProgress::Merge)
        );
        let (result, p) = run_publish(&git, &["y"], &opts());
        assert!(is_precondition(&result.unwrap_err()));
        assert!(p.asked.is_empty());
    }

    #[test]
    fn test_resume_skips_dirty_gate() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        local_commit(&clone, "a.txt", "a");
        std::fs::write(clone.join("scratch.txt"), "not for commit").unwrap();

        let git = Git::new(&clone);
        assert_eq!(
            detect_interrupted(&git).unwrap(),
            Interrupted::Unpushed {
                branch: "main".into(),
                commits: 1
            }
        );

        let (result, _p) = run_publish(&git, &["y"], &opts());
        let rows = result.unwrap();
        assert_eq!(rows[0].outcome, PushOutcome::Pushed);
        assert_eq!(
            git.rev_parse("main").unwrap(),
            git_in(&remote, &["rev-parse", "main"])
        );
        // left alone: no auto commit while resuming
        assert!(git.is_dirty().unwrap());
    }

    #[test]
    fn test_declined_resume_still_checks_dirty_tree() {
        let (clone, _remote, _ct, _rt) = setup_clone_repo();
        local_commit(&clone, "a.txt", "a");
        std::fs::write(clone.join("scratch.txt"), "x").unwrap();

        let (result, _p) = run_publish(&Git::new(&clone), &["n"], &opts());
        assert!(is_precondition(&result.unwrap_err()));
    }

    #[test]
    fn test_dirty_tree_without_default_aborts() {
        let (clone, _remote, _ct, _rt) = setup_clone_repo();
        std::fs::write(clone.join("README.md"), "edited\n").unwrap();
        let git = Git::new(&clone);
        let before = git.count_commits("HEAD").unwrap();

        let (result, _p) = run_publish(&git, &[], &opts());
        assert!(is_precondition(&result.unwrap_err()));
        assert_eq!(git.count_commits("HEAD").unwrap(), before);
        assert!(git.is_dirty().unwrap());
    }

    #[test]
    fn test_default_commits_and_pushes() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        std::fs::write(clone.join("README.md"), "edited\n").unwrap();
        std::fs::write(clone.join("new.txt"), "new\n").unwrap();

        let o = PushOptions {
            default_commit: true,
            ..opts()
        };
        let (result, _p) = run_publish(&Git::new(&clone), &[], &o);
        assert_eq!(result.unwrap()[0].outcome, PushOutcome::Pushed);

        let git = Git::new(&clone);
        assert!(!git.is_dirty().unwrap());
        let message = git.head_message().unwrap();
        assert!(
            message.starts_with("[default commit from mypush] user: Test at "),
            "{}",
            message
        );
        assert_eq!(
            git.rev_parse("main").unwrap(),
            git_in(&remote, &["rev-parse", "main"])
        );
    }

    #[test]
    fn test_auto_commit_with_nothing_to_commit() {
        let (clone, _remote, _ct, _rt) = setup_clone_repo();
        assert!(!auto_commit(&Git::new(&clone), &Console::silent()).unwrap());
    }

    #[test]
    fn test_current_only_on_detached_head() {
        let (clone, _remote, _ct, _rt) = setup_clone_repo();
        git_in(&clone, &["checkout", "--detach"]);
        let o = PushOptions {
            current_only: true,
            ..opts()
        };
        let (result, _p) = run_publish(&Git::new(&clone), &[], &o);
        assert!(is_precondition(&result.unwrap_err()));
    }

    #[test]
    fn test_current_only_pushes_just_the_current_branch() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        git_in(&clone, &["branch", "side"]);
        git_in(&clone, &["checkout", "-b", "topic"]);
        local_commit(&clone, "t.txt", "t");

        let o = PushOptions {
            current_only: true,
            ..opts()
        };
        let (result, _p) = run_publish(&Git::new(&clone), &[], &o);
        let rows = result.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].branch, "topic");
        let heads = git_in(&remote, &["for-each-ref", "--format=%(refname:short)", "refs/heads/"]);
        assert_eq!(heads.lines().collect::<Vec<_>>(), vec!["main", "topic"]);
    }

    #[test]
    fn test_rejected_branch_does_not_stop_the_run() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        let (other, _ot) = second_clone(&remote);
        local_commit(&other, "o.txt", "o");
        git_in(&other, &["push", "origin", "main"]);

        local_commit(&clone, "c.txt", "c");
        git_in(&clone, &["checkout", "-b", "feature-y"]);
        local_commit(&clone, "y.txt", "y");

        let (result, _p) = run_publish(&Git::new(&clone), &[], &opts());
        let rows = result.unwrap();
        let outcomes: Vec<(&str, bool)> = rows
            .iter()
            .map(|r| (r.branch.as_str(), r.outcome.succeeded()))
            .collect();
        assert_eq!(outcomes, vec![("feature-y", true), ("main", false)]);
    }

    #[test]
    fn test_force_requires_literal_yes() {
        let cases = vec![("y is not enough", "y", false), ("yes any case", "YES", true)];
        for (name, answer, forced) in cases {
            let (clone, remote, _ct, _rt) = setup_clone_repo();
            local_commit(&clone, "a.txt", "a");
            git_in(&clone, &["push", "origin", "main"]);
            git_in(&clone, &["commit", "--amend", "-m", "reworded"]);
            let before = git_in(&remote, &["rev-parse", "main"]);

            let o = PushOptions {
                force: true,
                ..opts()
            };
            // the amended commit is unpushed, yet only the force prompt is asked
            let (result, p) = run_publish(&Git::new(&clone), &[answer], &o);
            assert!(result.unwrap().is_empty(), "{}", name);
            assert_eq!(p.asked.len(), 1, "{}", name);
            assert_eq!(p.remaining(), 0, "{}", name);

            let after = git_in(&remote, &["rev-parse", "main"]);
            if forced {
                assert_eq!(after, git_in(&clone, &["rev-parse", "main"]), "{}", name);
            } else {
                assert_eq!(after, before, "{}", name);
            }
        }
    }

    #[test]
    fn test_tags_only() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        git_in(&clone, &["tag", "v2.0"]);
        let o = PushOptions {
            tags: true,
            ..opts()
        };
        let (result, p) = run_publish(&Git::new(&clone), &[], &o);
        assert!(result.unwrap().is_empty());
        assert_eq!(git_in(&remote, &["tag"]), "v2.0");
        assert!(p.asked.is_empty());
    }

    #[test]
    fn test_tags_only_skips_resume_prompt() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        local_commit(&clone, "a.txt", "a");
        git_in(&clone, &["tag", "v3.0"]);
        let before = git_in(&remote, &["rev-parse", "main"]);
        let o = PushOptions {
            tags: true,
            ..opts()
        };
        let (result, p) = run_publish(&Git::new(&clone), &[], &o);
        assert!(result.unwrap().is_empty());
        assert!(p.asked.is_empty());
        assert_eq!(git_in(&remote, &["rev-parse", "main"]), before);
    }

    #[test]
    fn test_large_file_rejection_is_recovered() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        install_size_limit_hook(&remote, "big.bin", true);
        std::fs::write(clone.join("big.bin"), vec![7u8; 2048]).unwrap();
        git_in(&clone, &["add", "big.bin"]);
        git_in(&clone, &["commit", "-m", "Add big file"]);

        let bin = fake_lfs_bin();
        let git = Git::new(&clone).with_path_prefix(bin.path());
        // resume, consent, confirm detected path
        let (result, p) = run_publish(&git, &["y", "y", "y"], &opts());
        let rows = result.unwrap();
        assert_eq!(rows[0].outcome, PushOutcome::Recovered);
        assert_eq!(p.remaining(), 0);
        assert_eq!(git.head_message().unwrap(), "Add big file\n\n[LFS Added]");
        assert_eq!(
            git.rev_parse("main").unwrap(),
            git_in(&remote, &["rev-parse", "main"])
        );
    }

    #[test]
    fn test_rejected_other_branch_leaves_current_branch_intact() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        install_size_limit_hook(&remote, "big.bin", true);
        git_in(&clone, &["checkout", "-b", "feature"]);
        std::fs::write(clone.join("big.bin"), vec![7u8; 2048]).unwrap();
        git_in(&clone, &["add", "big.bin"]);
        git_in(&clone, &["commit", "-m", "Add big file"]);
        git_in(&clone, &["checkout", "main"]);
        local_commit(&clone, "work.txt", "work");

        let bin = fake_lfs_bin();
        let git = Git::new(&clone).with_path_prefix(bin.path());
        let main_before = git.rev_parse("main").unwrap();
        let feature_before = git.rev_parse("feature").unwrap();

        // decline resuming main, then agree to everything recovery asks
        let (result, _p) = run_publish(&git, &["n", "y", "y"], &opts());
        let rows = result.unwrap();
        let outcomes: Vec<(&str, bool)> = rows
            .iter()
            .map(|r| (r.branch.as_str(), r.outcome.succeeded()))
            .collect();
        assert_eq!(outcomes, vec![("feature", false), ("main", true)]);
        match &rows[0].outcome {
            PushOutcome::Failed(reason) => assert!(reason.contains("not checked out"), "{}", reason),
            other => panic!("unexpected outcome {:?}", other),
        }

        assert_eq!(git.rev_parse("main").unwrap(), main_before);
        assert_eq!(git_in(&remote, &["rev-parse", "main"]), main_before);
        assert_eq!(git.rev_parse("feature").unwrap(), feature_before);
        assert!(!git.is_dirty().unwrap());
    }

    #[test]
    fn test_declined_recovery_records_failure() {
        let (clone, remote, _ct, _rt) = setup_clone_repo();
        install_size_limit_hook(&remote, "big.bin", true);
        std::fs::write(clone.join("big.bin"), vec![7u8; 2048]).unwrap();
        git_in(&clone, &["add", "big.bin"]);
        git_in(&clone, &["commit", "-m", "Add big file"]);
        let head = git_in(&clone, &["rev-parse", "HEAD"]);

        let (result, _p) = run_publish(&Git::new(&clone), &["y", "n"], &opts());
        let rows = result.unwrap();
        assert!(!rows[0].outcome.succeeded());
        assert_eq!(git_in(&clone, &["rev-parse", "HEAD"]), head);
    }
}
