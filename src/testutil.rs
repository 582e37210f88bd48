//! Shared test utilities for git-based tests.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Runs git in `dir` and asserts success. Returns trimmed stdout.
pub fn git_in(dir: &Path, args: &[&str]) -> String {
    let out = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {:?}: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn configure_identity(dir: &Path) {
    for args in &[
        vec!["config", "user.email", "test@test.com"],
        vec!["config", "user.name", "Test"],
        vec!["config", "commit.gpgsign", "false"],
        vec!["config", "tag.gpgsign", "false"],
    ] {
        git_in(dir, args);
    }
}

/// Creates a bare remote with one commit on main and clones it.
/// Returns (clone_dir, remote_dir, clone_tempdir, remote_tempdir).
pub fn setup_clone_repo() -> (PathBuf, PathBuf, tempfile::TempDir, tempfile::TempDir) {
    let remote_tmp = tempfile::tempdir().unwrap();
    let remote = remote_tmp.path().join("remote.git");
    std::fs::create_dir(&remote).unwrap();
    git_in(&remote, &["init", "--bare", "--initial-branch=main"]);

    // Seed the remote from a throwaway working copy
    let seed_tmp = tempfile::tempdir().unwrap();
    let seed = seed_tmp.path().to_path_buf();
    git_in(&seed, &["init", "--initial-branch=main"]);
    configure_identity(&seed);
    std::fs::write(seed.join("README.md"), "hello\n").unwrap();
    git_in(&seed, &["add", "README.md"]);
    git_in(&seed, &["commit", "-m", "initial"]);
    git_in(&seed, &["push", remote.to_str().unwrap(), "main"]);

    let clone_tmp = tempfile::tempdir().unwrap();
    let clone_dir = clone_with_identity(&remote, &clone_tmp.path().join("repo"));

    (clone_dir, remote, clone_tmp, remote_tmp)
}

/// Clones `remote` into `dest` and configures a test identity.
pub fn clone_with_identity(remote: &Path, dest: &Path) -> PathBuf {
    let out = Command::new("git")
        .args(["clone", remote.to_str().unwrap(), dest.to_str().unwrap()])
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "clone: {}",
        String::from_utf8_lossy(&out.stderr)
    );
    configure_identity(dest);
    dest.to_path_buf()
}

/// A second working copy of `remote`, for simulating other people's pushes.
pub fn second_clone(remote: &Path) -> (PathBuf, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let dir = clone_with_identity(remote, &tmp.path().join("other"));
    (dir, tmp)
}

/// Commits a file in a repo on the current branch.
pub fn local_commit(dir: &Path, file: &str, content: &str) {
    std::fs::write(dir.join(file), content).unwrap();
    git_in(dir, &["add", file]);
    git_in(dir, &["commit", "-m", &format!("add {}", file)]);
}

fn write_script(path: &Path, body: &str) {
    std::fs::write(path, body).unwrap();
    let mut perms = std::fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms).unwrap();
}

/// A directory holding a minimal `git-lfs` stand-in that edits
/// `.gitattributes` the way the real `track`/`untrack`/`ls-files` do.
pub fn fake_lfs_bin() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    write_script(
        &tmp.path().join("git-lfs"),
        r#"#!/bin/sh
cmd="$1"; shift
[ "$1" = "--" ] && shift
case "$cmd" in
  version|--version) echo "git-lfs/3.4.0 (fake)" ;;
  install) echo "Git LFS initialized." ;;
  track)
    for p in "$@"; do
      echo "$p filter=lfs diff=lfs merge=lfs -text" >> .gitattributes
      echo "Tracking \"$p\""
    done ;;
  untrack)
    for p in "$@"; do
      if [ -f .gitattributes ]; then
        grep -v "^$p " .gitattributes > .gitattributes.tmp
        mv .gitattributes.tmp .gitattributes
      fi
      echo "Untracking \"$p\""
    done ;;
  ls-files)
    [ -f .gitattributes ] && grep 'filter=lfs' .gitattributes | cut -d' ' -f1
    exit 0 ;;
  *) exit 1 ;;
esac
"#,
    );
    tmp
}

/// A directory whose `git-lfs` fails every command.
pub fn broken_lfs_bin() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    write_script(
        &tmp.path().join("git-lfs"),
        "#!/bin/sh\necho 'git-lfs: broken' >&2\nexit 1\n",
    );
    tmp
}

/// Installs a pre-receive hook rejecting any pushed tip that contains
/// `file`. With `lfs_clears` the rejection is lifted once `.gitattributes`
/// routes `file` through LFS.
pub fn install_size_limit_hook(remote: &Path, file: &str, lfs_clears: bool) {
    let clears = if lfs_clears {
        format!(
            "git cat-file -p \"$new:.gitattributes\" 2>/dev/null | grep -q '^{} filter=lfs' && continue",
            file
        )
    } else {
        String::new()
    };
    let body = format!(
        r#"#!/bin/sh
zero=0000000000000000000000000000000000000000
while read old new ref; do
  [ "$new" = "$zero" ] && continue
  git cat-file -e "$new:{file}" 2>/dev/null || continue
  {clears}
  echo "error: File {file} is 120.00 MB; this exceeds GitHub's file size limit of 100.00 MB" >&2
  echo "error: GH001: Large files detected. You may want to try Git Large File Storage - https://git-lfs.github.com." >&2
  exit 1
done
exit 0
"#,
        file = file,
        clears = clears
    );
    write_script(&remote.join("hooks").join("pre-receive"), &body);
}
