//! Git LFS helpers, all via the `git lfs` subcommand.

use anyhow::{Result, bail};

use crate::git::Git;
use crate::output::Console;

/// The tracking-metadata file `git lfs track` maintains.
pub const ATTRIBUTES_FILE: &str = ".gitattributes";

pub fn available(git: &Git) -> bool {
    git.exec(&["lfs", "version"])
        .map(|o| o.success())
        .unwrap_or(false)
}

pub fn install(git: &Git) -> Result<()> {
    git.run(&["lfs", "install"])?;
    Ok(())
}

pub fn track(git: &Git, path: &str) -> Result<()> {
    git.run(&["lfs", "track", "--", path])?;
    Ok(())
}

pub fn untrack(git: &Git, path: &str) -> Result<()> {
    git.run(&["lfs", "untrack", "--", path])?;
    Ok(())
}

/// Paths of LFS-managed files, relative to the top level.
pub fn tracked_files(git: &Git) -> Result<Vec<String>> {
    let out = git.exec(&["lfs", "ls-files", "-n"])?;
    if !out.success() {
        bail!("git lfs ls-files: exit status {}\n{}", out.code, out.stderr.trim());
    }
    Ok(out
        .stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Stops tracking LFS files that no longer exist in the working tree and
/// stages the updated attributes. Returns the untracked paths.
///
/// Does nothing when the extension is missing or nothing is tracked.
pub fn cleanup_stale(git: &Git, console: &Console) -> Result<Vec<String>> {
    console.info("checking LFS-tracked files...");

    if !available(git) {
        console.warn("git lfs is not installed, skipping LFS check");
        return Ok(Vec::new());
    }

    let tracked = match tracked_files(git) {
        Ok(t) if !t.is_empty() => t,
        _ => {
            console.ok("LFS status is clean (nothing tracked)");
            return Ok(Vec::new());
        }
    };

    let git = git.rooted()?;
    let root = git.dir().to_path_buf();
    let mut untracked = Vec::new();
    for path in &tracked {
        if root.join(path).exists() {
            continue;
        }
        console.step("LFS-CLEAN", format!("tracked file was deleted: {}", path));
        match untrack(&git, path) {
            Ok(()) => untracked.push(path.clone()),
            Err(e) => console.error(format!("cannot untrack {}: {:#}", path, e)),
        }
    }

    if untracked.is_empty() {
        console.ok("LFS files are all present");
        return Ok(untracked);
    }

    git.add_paths(&[ATTRIBUTES_FILE])?;
    console.ok(format!(
        "untracked {} missing file(s); {} staged",
        untracked.len(),
        ATTRIBUTES_FILE
    ));
    Ok(untracked)
}
