//! Best-effort capture of the code revision a run was produced with.

use crate::model::Provenance;
use std::path::Path;
use std::process::Command;

pub fn capture(dir: &Path) -> Provenance {
    let commit = git(dir, &["rev-parse", "HEAD"]);
    if commit.is_none() {
        return Provenance::default();
    }
    let branch = git(dir, &["rev-parse", "--abbrev-ref", "HEAD"]);
    let dirty = git(dir, &["status", "--porcelain"]).map(|s| !s.is_empty());
    Provenance {
        git_commit: commit,
        git_branch: branch,
        git_dirty: dirty,
    }
}

fn git(dir: &Path, args: &[&str]) -> Option<String> {
    let out = Command::new("git").args(args).current_dir(dir).output().ok()?;
    if !out.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
}
