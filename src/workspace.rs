use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Mutex, mpsc};

use serde::{Deserialize, Serialize};

use crate::domain::DiffStats;
use crate::event_log::{Event, EventLogger};
use crate::multiplexer::sanitize_session_name;

pub const WORKTREES_DIR: &str = "worktrees";
const PROTECTED_BRANCHES: [&str; 3] = ["main", "master", "develop"];

pub trait GitRunner: Send + Sync {
    fn run(&self, dir: &Path, args: &[String]) -> Result<String, String>;
}

pub struct CommandGitRunner;

impl GitRunner for CommandGitRunner {
    fn run(&self, dir: &Path, args: &[String]) -> Result<String, String> {
        let output = Command::new("git")
            .arg("--no-pager")
            .args(args)
            .current_dir(dir)
            .output()
            .map_err(|error| error.to_string())?;

        if output.status.success() {
            return String::from_utf8(output.stdout)
                .map_err(|error| format!("git output utf8 decode failed: {error}"));
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() {
            return Err(format!("git exited with status {}", output.status));
        }
        Err(stderr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceError {
    NeedsInitialCommit,
    ProtectedBranchMissing(String),
    Git { operation: &'static str, message: String },
    Io { operation: &'static str, message: String },
}

impl WorkspaceError {
    pub fn message(&self) -> String {
        match self {
            Self::NeedsInitialCommit => {
                "this appears to be a brand new repository: create an initial commit first"
                    .to_string()
            }
            Self::ProtectedBranchMissing(branch) => {
                format!("branch '{branch}' does not exist")
            }
            Self::Git { operation, message } => format!("{operation} failed: {message}"),
            Self::Io { operation, message } => format!("{operation} failed: {message}"),
        }
    }
}

fn git_error(operation: &'static str, message: String) -> WorkspaceError {
    WorkspaceError::Git { operation, message }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorktreeData {
    pub repo_path: PathBuf,
    pub worktree_path: PathBuf,
    pub branch_name: String,
    pub base_commit_sha: String,
    pub original_branch: String,
    pub direct_mode: bool,
}

pub struct GitWorktree {
    repo_path: PathBuf,
    worktree_path: PathBuf,
    branch_name: String,
    base_commit_sha: Mutex<String>,
    original_branch: Mutex<String>,
    direct_mode: bool,
    runner: Box<dyn GitRunner>,
}

pub fn worktree_path_for(repo_path: &Path, session_title: &str) -> PathBuf {
    repo_path
        .join(WORKTREES_DIR)
        .join(sanitize_session_name(session_title))
}

impl GitWorktree {
    pub fn new(repo_path: &Path, session_title: &str, branch_name: &str) -> Self {
        Self::with_runner(
            repo_path,
            session_title,
            branch_name,
            Box::new(CommandGitRunner),
        )
    }

    pub fn with_runner(
        repo_path: &Path,
        session_title: &str,
        branch_name: &str,
        runner: Box<dyn GitRunner>,
    ) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            worktree_path: worktree_path_for(repo_path, session_title),
            branch_name: branch_name.to_string(),
            base_commit_sha: Mutex::new(String::new()),
            original_branch: Mutex::new(String::new()),
            direct_mode: false,
            runner,
        }
    }

    pub fn new_direct(repo_path: &Path, branch_name: &str) -> Self {
        Self::direct_with_runner(repo_path, branch_name, Box::new(CommandGitRunner))
    }

    pub fn direct_with_runner(
        repo_path: &Path,
        branch_name: &str,
        runner: Box<dyn GitRunner>,
    ) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            worktree_path: repo_path.to_path_buf(),
            branch_name: branch_name.to_string(),
            base_commit_sha: Mutex::new(String::new()),
            original_branch: Mutex::new(String::new()),
            direct_mode: true,
            runner,
        }
    }

    pub fn from_data(data: &WorktreeData) -> Self {
        Self::from_data_with_runner(data, Box::new(CommandGitRunner))
    }

    pub fn from_data_with_runner(data: &WorktreeData, runner: Box<dyn GitRunner>) -> Self {
        Self {
            repo_path: data.repo_path.clone(),
            worktree_path: data.worktree_path.clone(),
            branch_name: data.branch_name.clone(),
            base_commit_sha: Mutex::new(data.base_commit_sha.clone()),
            original_branch: Mutex::new(data.original_branch.clone()),
            direct_mode: data.direct_mode,
            runner,
        }
    }

    pub fn to_data(&self) -> WorktreeData {
        WorktreeData {
            repo_path: self.repo_path.clone(),
            worktree_path: self.worktree_path.clone(),
            branch_name: self.branch_name.clone(),
            base_commit_sha: self.base_commit_sha(),
            original_branch: self.original_branch(),
            direct_mode: self.direct_mode,
        }
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    pub fn worktree_path(&self) -> &Path {
        &self.worktree_path
    }

    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    pub fn direct_mode(&self) -> bool {
        self.direct_mode
    }

    pub fn base_commit_sha(&self) -> String {
        self.base_commit_sha
            .lock()
            .map(|sha| sha.clone())
            .unwrap_or_default()
    }

    pub fn original_branch(&self) -> String {
        self.original_branch
            .lock()
            .map(|branch| branch.clone())
            .unwrap_or_default()
    }

    fn git(&self, dir: &Path, operation: &'static str, args: &[&str]) -> Result<String, WorkspaceError> {
        let args: Vec<String> = args.iter().map(|value| (*value).to_string()).collect();
        self.runner
            .run(dir, &args)
            .map_err(|message| git_error(operation, message))
    }

    fn branch_exists(&self) -> bool {
        self.git(
            &self.repo_path,
            "branch lookup",
            &[
                "rev-parse",
                "--verify",
                "--quiet",
                &format!("refs/heads/{}", self.branch_name),
            ],
        )
        .is_ok()
    }

    pub fn setup(&self) -> Result<(), WorkspaceError> {
        if self.direct_mode {
            return self.setup_direct();
        }

        // Directory creation and the branch-existence probe are
        // independent; run both and join on a two-slot channel.
        let worktrees_dir = self.repo_path.join(WORKTREES_DIR);
        let (sender, receiver) = mpsc::channel();
        let mut branch_exists = false;
        std::thread::scope(|scope| {
            let dir_sender = sender.clone();
            let dir = worktrees_dir.clone();
            scope.spawn(move || {
                let result = fs::create_dir_all(&dir).map_err(|error| WorkspaceError::Io {
                    operation: "worktrees directory create",
                    message: error.to_string(),
                });
                let _ = dir_sender.send(result.map(|()| false));
            });
            scope.spawn(|| {
                let _ = sender.send(Ok(self.branch_exists()));
            });
        });
        for _ in 0..2 {
            match receiver.recv() {
                Ok(Ok(exists)) => branch_exists = branch_exists || exists,
                Ok(Err(error)) => return Err(error),
                Err(_) => break,
            }
        }

        if branch_exists {
            return self.setup_from_existing_branch();
        }
        self.setup_new_worktree()
    }

    fn setup_from_existing_branch(&self) -> Result<(), WorkspaceError> {
        // A stale worktree at the target path is expected after a crash.
        let _ = self.git(
            &self.repo_path,
            "worktree remove",
            &[
                "worktree",
                "remove",
                "-f",
                &self.worktree_path.to_string_lossy(),
            ],
        );

        self.git(
            &self.repo_path,
            "worktree add",
            &[
                "worktree",
                "add",
                &self.worktree_path.to_string_lossy(),
                &self.branch_name,
            ],
        )?;

        // First setup against a pre-existing branch: pin the base to the
        // branch tip. Re-setups after a pause keep the recorded base.
        if self.base_commit_sha().is_empty() {
            let tip = self
                .git(
                    &self.repo_path,
                    "branch tip lookup",
                    &["rev-parse", &format!("refs/heads/{}", self.branch_name)],
                )?
                .trim()
                .to_string();
            if let Ok(mut base) = self.base_commit_sha.lock() {
                *base = tip;
            }
        }
        Ok(())
    }

    fn setup_new_worktree(&self) -> Result<(), WorkspaceError> {
        let _ = self.git(
            &self.repo_path,
            "worktree remove",
            &[
                "worktree",
                "remove",
                "-f",
                &self.worktree_path.to_string_lossy(),
            ],
        );
        // A leftover ref from an interrupted run would make worktree add -b fail.
        let _ = self.git(
            &self.repo_path,
            "stale branch delete",
            &["branch", "-D", &self.branch_name],
        );

        let head = match self.git(&self.repo_path, "rev-parse HEAD", &["rev-parse", "HEAD"]) {
            Ok(output) => output.trim().to_string(),
            Err(WorkspaceError::Git { message, .. })
                if message.contains("ambiguous argument 'HEAD'")
                    || message.contains("not a valid object name") =>
            {
                return Err(WorkspaceError::NeedsInitialCommit);
            }
            Err(error) => return Err(error),
        };

        if let Ok(mut base) = self.base_commit_sha.lock() {
            *base = head.clone();
        }

        self.git(
            &self.repo_path,
            "worktree add",
            &[
                "worktree",
                "add",
                "-b",
                &self.branch_name,
                &self.worktree_path.to_string_lossy(),
                &head,
            ],
        )?;
        Ok(())
    }

    pub fn setup_direct(&self) -> Result<(), WorkspaceError> {
        if let Ok(current) = self.git(
            &self.repo_path,
            "current branch lookup",
            &["rev-parse", "--abbrev-ref", "HEAD"],
        ) && let Ok(mut original) = self.original_branch.lock()
            && original.is_empty()
        {
            *original = current.trim().to_string();
        }

        let branch_exists = self.branch_exists();
        if !branch_exists {
            if PROTECTED_BRANCHES.contains(&self.branch_name.as_str()) {
                return Err(WorkspaceError::ProtectedBranchMissing(
                    self.branch_name.clone(),
                ));
            }

            let head = self
                .git(&self.repo_path, "rev-parse HEAD", &["rev-parse", "HEAD"])?
                .trim()
                .to_string();
            self.git(
                &self.repo_path,
                "checkout -b",
                &["checkout", "-b", &self.branch_name],
            )?;
            if let Ok(mut base) = self.base_commit_sha.lock() {
                *base = head;
            }
            return Ok(());
        }

        self.git(&self.repo_path, "checkout", &["checkout", &self.branch_name])?;
        if self.base_commit_sha().is_empty() {
            let tip = self
                .git(
                    &self.repo_path,
                    "branch tip lookup",
                    &[
                        "rev-parse",
                        &format!("refs/heads/{}", self.branch_name),
                    ],
                )?
                .trim()
                .to_string();
            if let Ok(mut base) = self.base_commit_sha.lock() {
                *base = tip;
            }
        }
        Ok(())
    }

    pub fn cleanup(&self) -> Result<(), WorkspaceError> {
        if self.direct_mode {
            return self.cleanup_direct();
        }

        let mut failures = Vec::new();

        if self.worktree_path.exists()
            && let Err(error) = self.git(
                &self.repo_path,
                "worktree remove",
                &[
                    "worktree",
                    "remove",
                    "-f",
                    &self.worktree_path.to_string_lossy(),
                ],
            )
        {
            failures.push(error.message());
        }

        if self.branch_exists()
            && let Err(error) = self.git(
                &self.repo_path,
                "branch delete",
                &["branch", "-D", &self.branch_name],
            )
        {
            failures.push(error.message());
        }

        if let Err(error) = self.prune() {
            failures.push(error.message());
        }

        if failures.is_empty() {
            return Ok(());
        }
        Err(git_error("cleanup", failures.join("; ")))
    }

    // Direct mode never deletes branches; at most it restores the branch
    // that was checked out before the session started.
    fn cleanup_direct(&self) -> Result<(), WorkspaceError> {
        let original = self.original_branch();
        if !original.is_empty() && original != self.branch_name {
            self.git(
                &self.repo_path,
                "checkout original branch",
                &["checkout", &original],
            )?;
        }
        Ok(())
    }

    pub fn remove(&self) -> Result<(), WorkspaceError> {
        if self.direct_mode {
            return Ok(());
        }

        self.git(
            &self.repo_path,
            "worktree remove",
            &[
                "worktree",
                "remove",
                "-f",
                &self.worktree_path.to_string_lossy(),
            ],
        )?;
        Ok(())
    }

    pub fn prune(&self) -> Result<(), WorkspaceError> {
        self.git(&self.repo_path, "worktree prune", &["worktree", "prune"])?;
        Ok(())
    }

    pub fn is_dirty(&self) -> Result<bool, WorkspaceError> {
        let output = self.git(
            &self.worktree_path,
            "status",
            &["status", "--porcelain"],
        )?;
        Ok(!output.trim().is_empty())
    }

    pub fn is_branch_checked_out(&self) -> Result<bool, WorkspaceError> {
        let output = self.git(
            &self.repo_path,
            "worktree list",
            &["worktree", "list", "--porcelain"],
        )?;
        let needle = format!("branch refs/heads/{}", self.branch_name);
        Ok(output.lines().any(|line| line.trim() == needle))
    }

    pub fn push_changes(&self, message: &str, auto_commit: bool) -> Result<(), WorkspaceError> {
        self.git(&self.worktree_path, "stage changes", &["add", "-A"])?;

        let staged = self.git(
            &self.worktree_path,
            "staged lookup",
            &["diff", "--cached", "--name-only"],
        )?;
        if !staged.trim().is_empty() || auto_commit {
            match self.git(&self.worktree_path, "commit", &["commit", "-m", message]) {
                Ok(_) => {}
                Err(WorkspaceError::Git { message, .. })
                    if message.contains("nothing to commit")
                        || message.contains("nothing added to commit") => {}
                Err(error) => return Err(error),
            }
        }

        self.git(
            &self.worktree_path,
            "push",
            &["push", "origin", &self.branch_name],
        )?;
        Ok(())
    }

    // Lightweight numstat counts against the base commit; untracked
    // files are invisible here.
    pub fn diff(&self) -> DiffStats {
        let base = self.base_commit_sha();
        let output = match self.git(
            &self.worktree_path,
            "diff --numstat",
            &["diff", "--numstat", "--no-ext-diff", &base],
        ) {
            Ok(output) => output,
            Err(error) => return DiffStats::with_error(error.message()),
        };

        let (added, removed) = parse_numstat(&output);
        DiffStats {
            added,
            removed,
            content: String::new(),
            error: None,
        }
    }

    pub fn diff_full(&self) -> DiffStats {
        // Intent-to-add makes untracked files visible to diff.
        if let Err(error) = self.git(&self.worktree_path, "add -N", &["add", "-N", "."]) {
            return DiffStats::with_error(error.message());
        }

        let base = self.base_commit_sha();
        let content = match self.git(&self.worktree_path, "diff", &["diff", &base]) {
            Ok(content) => content,
            Err(error) => return DiffStats::with_error(error.message()),
        };

        let (added, removed) = count_diff_lines(&content);
        DiffStats {
            added,
            removed,
            content,
            error: None,
        }
    }
}

pub fn parse_numstat(output: &str) -> (usize, usize) {
    let mut added = 0usize;
    let mut removed = 0usize;

    for line in output.lines() {
        let mut parts = line.split('\t');
        let (Some(added_field), Some(removed_field)) = (parts.next(), parts.next()) else {
            continue;
        };
        // Binary files report '-' in both count columns.
        if let Ok(value) = added_field.parse::<usize>() {
            added += value;
        }
        if let Ok(value) = removed_field.parse::<usize>() {
            removed += value;
        }
    }

    (added, removed)
}

pub fn count_diff_lines(content: &str) -> (usize, usize) {
    let mut added = 0usize;
    let mut removed = 0usize;

    for line in content.lines() {
        if line.starts_with('+') && !line.starts_with("+++") {
            added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            removed += 1;
        }
    }

    (added, removed)
}

pub fn parse_worktree_branches(porcelain: &str) -> Vec<(PathBuf, String)> {
    let mut entries = Vec::new();
    let mut current_path: Option<PathBuf> = None;

    for line in porcelain.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            current_path = Some(PathBuf::from(path));
            continue;
        }
        if let Some(branch_ref) = line.strip_prefix("branch ")
            && let Some(path) = current_path.clone()
        {
            let branch = branch_ref
                .strip_prefix("refs/heads/")
                .unwrap_or(branch_ref)
                .to_string();
            entries.push((path, branch));
        }
    }

    entries
}

// Crash-recovery sweep: every directory under <repo>/worktrees is an
// orphaned session workspace. Branch deletion failures are logged and
// skipped so one broken branch cannot wedge the whole sweep.
pub fn cleanup_worktrees(
    repo_path: &Path,
    runner: &dyn GitRunner,
    log: &dyn EventLogger,
) -> Result<(), WorkspaceError> {
    let worktrees_dir = repo_path.join(WORKTREES_DIR);
    let entries = fs::read_dir(&worktrees_dir).map_err(|error| WorkspaceError::Io {
        operation: "worktrees directory read",
        message: error.to_string(),
    })?;

    let porcelain = runner
        .run(
            repo_path,
            &[
                "worktree".to_string(),
                "list".to_string(),
                "--porcelain".to_string(),
            ],
        )
        .map_err(|message| git_error("worktree list", message))?;
    let worktree_branches = parse_worktree_branches(&porcelain);

    for entry in entries.flatten() {
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }

        let dir_name = entry.file_name();
        let branch = worktree_branches
            .iter()
            .find(|(path, _)| path.ends_with(&dir_name))
            .map(|(_, branch)| branch.clone());
        if let Some(branch) = branch
            && let Err(message) = runner.run(
                repo_path,
                &["branch".to_string(), "-D".to_string(), branch.clone()],
            )
        {
            log.log(
                Event::warning("recovery", "branch delete failed")
                    .with_data("branch", serde_json::Value::from(branch))
                    .with_data("error", serde_json::Value::from(message)),
            );
        }

        let _ = fs::remove_dir_all(entry.path());
    }

    runner
        .run(
            repo_path,
            &["worktree".to_string(), "prune".to_string()],
        )
        .map_err(|message| git_error("worktree prune", message))?;
    Ok(())
}
