//! Git synchronization collaborator.
//!
//! Keeps the local checkout of the content repository current and reports
//! what changed, shelling out to the `git` binary:
//! 1. Clone on first run (the work dir has no checkout yet).
//! 2. On later runs, record HEAD, fetch + hard-reset to the remote branch,
//!    and diff the two trees with `--name-status` rename/copy detection.
//! 3. Parse the diff into [`ChangeRecord`]s for the classifier.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

use crate::config::Config;
use crate::models::{ChangeKind, ChangeRecord};

pub struct GitSync {
    repository: String,
    branch: String,
    user: Option<String>,
    password: Option<String>,
    work_dir: PathBuf,
}

impl GitSync {
    pub fn new(config: &Config) -> Self {
        GitSync {
            repository: config.git.repository.clone(),
            branch: config.git.branch.clone(),
            user: config.git.user.clone(),
            password: config.git.password.clone(),
            work_dir: config.content.work_dir.clone(),
        }
    }

    /// Clones the content repository unless the work dir already holds a
    /// checkout. Returns `true` when a fresh clone was made.
    pub fn clone_if_missing(&self) -> Result<bool> {
        if self.work_dir.join(".git").exists() {
            return Ok(false);
        }

        std::fs::create_dir_all(&self.work_dir).with_context(|| {
            format!("Failed to create work dir: {}", self.work_dir.display())
        })?;

        info!(repository = %self.repository, "cloning content repository");
        let url = self.authenticated_url();
        let mut cmd = Command::new("git");
        cmd.args(["clone", "--branch", &self.branch, "--single-branch"]);
        cmd.arg(&url);
        cmd.arg(&self.work_dir);

        let output = cmd
            .output()
            .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git clone failed: {}", stderr.trim());
        }

        Ok(true)
    }

    /// Updates the checkout to the remote branch head and returns the
    /// changes since the previous head. Empty when already up to date.
    pub fn pull(&self) -> Result<Vec<ChangeRecord>> {
        let old_head = self.run_git(&["rev-parse", "HEAD"])?;

        self.run_git(&["fetch", "origin", &self.branch])?;
        let remote_ref = format!("origin/{}", self.branch);
        self.run_git(&["reset", "--hard", &remote_ref])?;

        let new_head = self.run_git(&["rev-parse", "HEAD"])?;
        if old_head == new_head {
            return Ok(Vec::new());
        }

        info!(from = %old_head, to = %new_head, "content repository advanced");
        let diff = self.run_git(&[
            "diff",
            "--name-status",
            "--find-renames",
            "--find-copies",
            &old_head,
            &new_head,
        ])?;

        Ok(parse_name_status(&diff))
    }

    fn run_git(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.work_dir)
            .output()
            .with_context(|| format!("Failed to execute 'git {}'", args.join(" ")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("git {} failed: {}", args.join(" "), stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Embeds configured credentials into an https remote URL.
    fn authenticated_url(&self) -> String {
        match (&self.user, self.repository.strip_prefix("https://")) {
            (Some(user), Some(rest)) => {
                let password = self.password.as_deref().unwrap_or("");
                format!("https://{}:{}@{}", user, password, rest)
            }
            _ => self.repository.clone(),
        }
    }
}

/// Parses `git diff --name-status` output into change records.
///
/// Lines look like `M\tpath`, `A\tpath`, `D\tpath`, or with a similarity
/// score and two paths for renames/copies: `R100\told\tnew`.
pub fn parse_name_status(diff: &str) -> Vec<ChangeRecord> {
    let mut changes = Vec::new();

    for line in diff.lines() {
        let mut parts = line.split('\t');
        let status = match parts.next() {
            Some(s) if !s.is_empty() => s,
            _ => continue,
        };
        let kind = ChangeKind::from_status(status);

        let record = match kind {
            ChangeKind::Rename | ChangeKind::Copy => {
                let old = parts.next().map(str::to_string);
                let new = parts.next().map(str::to_string);
                ChangeRecord {
                    kind,
                    old_path: old,
                    new_path: new,
                }
            }
            ChangeKind::Delete => ChangeRecord {
                kind,
                old_path: parts.next().map(str::to_string),
                new_path: None,
            },
            _ => {
                let path = parts.next().map(str::to_string);
                ChangeRecord {
                    kind,
                    old_path: path.clone(),
                    new_path: path,
                }
            }
        };

        changes.push(record);
    }

    changes
}
