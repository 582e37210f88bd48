//! Large-file push recovery.
//!
//! When the remote refuses a push because a file exceeds its size limit,
//! the last commit is undone with a soft reset (index and working tree stay
//! as they are), the file is put under LFS tracking, everything is
//! recommitted under the original message plus [`LFS_MARKER`], and the push
//! is retried once.

use std::io::Write;

use thiserror::Error;
use tracing::info;

use crate::config::Settings;
use crate::git::{BranchRef, Git};
use crate::lfs;
use crate::output::{Console, Tone};
use crate::prompt::Prompter;
use crate::rejection;

pub const LFS_MARKER: &str = "[LFS Added]";

#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("LFS recovery declined")]
    Declined,
    #[error("no large-file path provided")]
    NoPath,
    #[error("git lfs is not available")]
    LfsUnavailable,
    /// Recovery rewrites HEAD, so it only works on the checked-out branch.
    #[error("{0} is not checked out; check it out and rerun mypush -c")]
    NotCheckedOut(String),
    #[error("{step} failed: {detail}")]
    Step { step: &'static str, detail: String },
    #[error("push still rejected after LFS recovery")]
    RetryFailed(String),
}

impl RecoveryError {
    fn step(step: &'static str, err: impl std::fmt::Display) -> Self {
        RecoveryError::Step {
            step,
            detail: err.to_string(),
        }
    }
}

/// `<original>\n\n[LFS Added]`.
pub fn marked_message(original: &str) -> String {
    format!("{}\n\n{}", original, LFS_MARKER)
}

/// State of one recovery attempt.
#[derive(Debug)]
pub struct Session {
    pub branch: BranchRef,
    pub error_text: String,
    pub path: Option<String>,
    pub original_message: Option<String>,
}

impl Session {
    pub fn new(branch: BranchRef, error_text: impl Into<String>) -> Self {
        Session {
            branch,
            error_text: error_text.into(),
            path: None,
            original_message: None,
        }
    }

    /// Picks the file to move to LFS: the path found in the rejection text
    /// if the operator confirms it, otherwise one they type in.
    pub fn identify(
        &mut self,
        prompter: &mut dyn Prompter,
        console: &Console,
        signatures: &[rejection::Signature],
    ) -> Result<&str, RecoveryError> {
        let mut chosen = None;
        if let Some(found) = rejection::extract_path(&self.error_text, signatures) {
            console.step("LFS", format!("detected large file: {}", found));
            if prompter.confirm(&format!("Use {}?", found), true) {
                chosen = Some(found);
            }
        }
        if chosen.is_none() {
            chosen = prompter
                .ask("Path of the large file (relative to the repository root):")
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty());
        }
        let path = chosen.ok_or(RecoveryError::NoPath)?;
        Ok(self.path.insert(path).as_str())
    }

    /// Fails unless the branch being recovered is the one HEAD points at.
    pub fn ensure_checked_out(&self, git: &Git) -> Result<(), RecoveryError> {
        let current = git
            .current_branch()
            .map_err(|e| RecoveryError::step("read current branch", format!("{:#}", e)))?;
        if current != self.branch.name {
            return Err(RecoveryError::NotCheckedOut(self.branch.name.clone()));
        }
        Ok(())
    }

    /// Undoes the failing commit and stages the file again under LFS.
    pub fn rewrite(&mut self, git: &Git, console: &Console) -> Result<(), RecoveryError> {
        let path = self.path.clone().ok_or(RecoveryError::NoPath)?;
        self.ensure_checked_out(git)?;

        if !lfs::available(git) {
            return Err(RecoveryError::LfsUnavailable);
        }
        git.rev_parse("HEAD~1")
            .map_err(|_| RecoveryError::step("undo commit", "the commit has no parent"))?;

        let message = git
            .head_message()
            .map_err(|e| RecoveryError::step("read commit message", format!("{:#}", e)))?;
        self.original_message = Some(message);

        console.step("LFS", "undoing the last commit (changes stay staged)...");
        info!(branch = %self.branch, "soft reset for LFS recovery");
        git.reset_soft_parent()
            .map_err(|e| RecoveryError::step("undo commit", format!("{:#}", e)))?;

        console.step("LFS", format!("tracking {} with LFS...", path));
        lfs::install(git).map_err(|e| RecoveryError::step("git lfs install", format!("{:#}", e)))?;
        lfs::track(git, &path).map_err(|e| RecoveryError::step("git lfs track", format!("{:#}", e)))?;
        git.add_paths(&[lfs::ATTRIBUTES_FILE, &path])
            .map_err(|e| RecoveryError::step("stage tracked file", format!("{:#}", e)))?;
        Ok(())
    }

    /// Commits the staged change set with the original message plus the
    /// marker. The message travels through a temporary file that is removed
    /// on every path.
    pub fn recommit(&self, git: &Git, console: &Console) -> Result<(), RecoveryError> {
        let original = self
            .original_message
            .as_deref()
            .ok_or_else(|| RecoveryError::step("recommit", "original message was not saved"))?;

        console.step("LFS", "recommitting...");
        let mut file = tempfile::NamedTempFile::new()
            .map_err(|e| RecoveryError::step("write commit message", e))?;
        file.write_all(marked_message(original).as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| RecoveryError::step("write commit message", e))?;

        let out = git
            .commit_from_file(file.path())
            .map_err(|e| RecoveryError::step("recommit", format!("{:#}", e)))?;
        if !out.success() {
            return Err(RecoveryError::step("recommit", out.combined().trim()));
        }
        Ok(())
    }

    /// The single retry. A second rejection of any kind is final.
    pub fn retry(
        &self,
        git: &Git,
        console: &Console,
        settings: &Settings,
    ) -> Result<(), RecoveryError> {
        console.step("LFS", format!("retrying push of {}...", self.branch.name));
        let out = git
            .push(
                &settings.remote,
                &self.branch,
                &mut console.sink(),
                settings.poll_interval,
            )
            .map_err(|e| RecoveryError::step("push", format!("{:#}", e)))?;
        if out.success() {
            console.ok("push succeeded after LFS recovery");
            Ok(())
        } else {
            let output = out.combined().trim().to_string();
            console.error("push still failing after LFS recovery");
            console.plain(&output);
            Err(RecoveryError::RetryFailed(output))
        }
    }
}

/// Runs the whole recovery for a rejected push of `branch`.
pub fn recover(
    git: &Git,
    console: &Console,
    settings: &Settings,
    prompter: &mut dyn Prompter,
    branch: &BranchRef,
    error_text: &str,
) -> Result<(), RecoveryError> {
    console.warn("push rejected: a file exceeds the remote's size limit");
    console.blank();
    console.say(Tone::Error, format!("details:\n{}", error_text.trim()));
    console.blank();

    let mut session = Session::new(branch.clone(), error_text);
    session.ensure_checked_out(git)?;

    if !prompter.confirm("Move the file to Git LFS and retry the push?", true) {
        console.warn("LFS recovery cancelled");
        return Err(RecoveryError::Declined);
    }

    session.identify(prompter, console, &settings.signatures)?;

    let result = session
        .rewrite(git, console)
        .and_then(|()| session.recommit(git, console));
    if let Err(e) = result {
        if let Some(message) = session.original_message.as_deref() {
            console.error(format!(
                "{}; the last commit was undone and its changes are staged. Original message:\n{}",
                e, message
            ));
        }
        return Err(e);
    }

    session.retry(git, console, settings)
}
