use std::path::{Path, PathBuf};
use std::sync::{Arc, mpsc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DiffStats, Status, validate_title};
use crate::multiplexer::{
    CmdExecutor, ProcessCmdExecutor, ProcessPtyFactory, PtyFactory, TmuxSession,
};
use crate::workspace::{CommandGitRunner, GitRunner, GitWorktree, WorktreeData};

const DEFAULT_PANE_WIDTH: u16 = 80;
const DEFAULT_PANE_HEIGHT: u16 = 24;
const BRANCH_GENERATION_ATTEMPTS: u32 = 50;

#[derive(Debug, Clone, Default)]
pub struct InstanceOptions {
    pub title: String,
    pub path: String,
    pub program: String,
    pub auto_yes: bool,
    pub direct_mode: bool,
    pub direct_branch: String,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceData {
    pub title: String,
    pub path: PathBuf,
    pub branch: String,
    pub program: String,
    pub direct_mode: bool,
    pub direct_branch: String,
    pub status: Status,
    pub height: u16,
    pub width: u16,
    pub auto_yes: bool,
    pub prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub diff_stats: DiffStats,
    pub worktree: Option<WorktreeData>,
}

pub struct Instance {
    pub title: String,
    pub path: PathBuf,
    pub branch: String,
    pub program: String,
    pub direct_mode: bool,
    pub direct_branch: String,
    pub status: Status,
    pub height: u16,
    pub width: u16,
    pub auto_yes: bool,
    pub prompt: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    diff_stats: DiffStats,
    started: bool,
    tmux: Option<Arc<TmuxSession>>,
    worktree: Option<Arc<GitWorktree>>,
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("title", &self.title)
            .field("path", &self.path)
            .field("branch", &self.branch)
            .field("program", &self.program)
            .field("direct_mode", &self.direct_mode)
            .field("direct_branch", &self.direct_branch)
            .field("status", &self.status)
            .field("height", &self.height)
            .field("width", &self.width)
            .field("auto_yes", &self.auto_yes)
            .field("prompt", &self.prompt)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .field("diff_stats", &self.diff_stats)
            .field("started", &self.started)
            .field("tmux", &self.tmux.is_some())
            .field("worktree", &self.worktree.is_some())
            .finish()
    }
}

impl Instance {
    pub fn new(opts: InstanceOptions) -> Result<Self, String> {
        if opts.program.trim().is_empty() {
            return Err("program cannot be empty".to_string());
        }
        if opts.direct_mode && opts.direct_branch.trim().is_empty() {
            return Err("direct mode requires a branch name".to_string());
        }
        if !opts.title.is_empty() {
            validate_title(&opts.title).map_err(|error| error.message())?;
        }

        let path = std::path::absolute(&opts.path)
            .map_err(|error| format!("cannot resolve repository path: {error}"))?;
        let branch = if opts.direct_mode {
            opts.direct_branch.clone()
        } else {
            String::new()
        };

        let now = Utc::now();
        Ok(Self {
            title: opts.title,
            path,
            branch,
            program: opts.program,
            direct_mode: opts.direct_mode,
            direct_branch: opts.direct_branch,
            status: Status::Ready,
            height: DEFAULT_PANE_HEIGHT,
            width: DEFAULT_PANE_WIDTH,
            auto_yes: opts.auto_yes,
            prompt: opts.prompt,
            created_at: now,
            updated_at: now,
            diff_stats: DiffStats::default(),
            started: false,
            tmux: None,
            worktree: None,
        })
    }

    pub fn set_title(&mut self, title: String) -> Result<(), String> {
        if !title.is_empty() {
            validate_title(&title).map_err(|error| error.message())?;
        }
        self.title = title;
        self.touch();
        Ok(())
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn paused(&self) -> bool {
        self.status == Status::Paused
    }

    pub fn tmux_alive(&self) -> bool {
        self.tmux
            .as_ref()
            .is_some_and(|session| session.is_running())
    }

    pub fn set_status(&mut self, status: Status) {
        self.status = status;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn tmux_session(&self) -> Option<Arc<TmuxSession>> {
        self.tmux.clone()
    }

    pub fn git_worktree(&self) -> Result<Arc<GitWorktree>, String> {
        self.worktree
            .clone()
            .ok_or_else(|| format!("session '{}' has no workspace yet", self.title))
    }

    pub fn start(&mut self, first_time: bool) -> Result<(), String> {
        self.start_with_io(
            first_time,
            Box::new(CommandGitRunner),
            Box::new(ProcessCmdExecutor),
            Box::new(ProcessPtyFactory),
        )
    }

    pub fn start_with_io(
        &mut self,
        first_time: bool,
        runner: Box<dyn GitRunner>,
        executor: Box<dyn CmdExecutor>,
        pty_factory: Box<dyn PtyFactory>,
    ) -> Result<(), String> {
        if self.started {
            return Err(format!("session '{}' is already started", self.title));
        }
        validate_title(&self.title).map_err(|error| error.message())?;

        self.status = Status::Loading;

        let worktree = if self.direct_mode {
            self.branch = self.direct_branch.clone();
            GitWorktree::direct_with_runner(&self.path, &self.branch, runner)
        } else {
            if self.branch.is_empty() {
                self.branch = generate_branch_name(runner.as_ref(), &self.path, &self.title);
            }
            GitWorktree::with_runner(&self.path, &self.title, &self.branch, runner)
        };

        if let Err(error) = worktree.setup() {
            // Roll back whatever half-created state setup left behind.
            let _ = worktree.cleanup();
            self.status = Status::Ready;
            return Err(format!("workspace setup failed: {}", error.message()));
        }

        let tmux = TmuxSession::with_io(&self.title, &self.program, executor, pty_factory);
        if let Err(error) = tmux.start(worktree.worktree_path()) {
            let _ = worktree.cleanup();
            self.status = Status::Ready;
            return Err(format!("session start failed: {error}"));
        }
        let _ = tmux.set_detached_size(self.width, self.height);

        if first_time && let Some(prompt) = self.prompt.clone() {
            let _ = tmux.send_keys(&prompt);
            let _ = tmux.tap_enter();
        }

        self.worktree = Some(Arc::new(worktree));
        self.tmux = Some(Arc::new(tmux));
        self.started = true;
        if first_time {
            self.created_at = Utc::now();
        }
        self.set_status(Status::Running);
        Ok(())
    }

    // Direct mode has no worktree to tear down; pausing is a status
    // change only.
    pub fn pause(&mut self) -> Result<(), String> {
        if !self.started {
            return Err(format!("session '{}' is not started", self.title));
        }
        if self.paused() {
            return Err(format!("session '{}' is already paused", self.title));
        }

        if self.direct_mode {
            self.set_status(Status::Paused);
            return Ok(());
        }

        if let Some(tmux) = self.tmux.take() {
            tmux.kill()
                .map_err(|error| format!("pause failed: {error}"))?;
        }

        let worktree = self.git_worktree()?;
        worktree
            .remove()
            .map_err(|error| format!("pause failed: {}", error.message()))?;

        self.set_status(Status::Paused);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), String> {
        self.resume_with_io(Box::new(ProcessCmdExecutor), Box::new(ProcessPtyFactory))
    }

    pub fn resume_with_io(
        &mut self,
        executor: Box<dyn CmdExecutor>,
        pty_factory: Box<dyn PtyFactory>,
    ) -> Result<(), String> {
        if !self.paused() {
            return Err(format!("session '{}' is not paused", self.title));
        }

        if self.direct_mode {
            self.set_status(Status::Running);
            return Ok(());
        }

        let worktree = self.git_worktree()?;
        worktree
            .setup()
            .map_err(|error| format!("resume failed: {}", error.message()))?;

        let tmux = TmuxSession::with_io(&self.title, &self.program, executor, pty_factory);
        tmux.start(worktree.worktree_path())
            .map_err(|error| format!("resume failed: {error}"))?;
        let _ = tmux.set_detached_size(self.width, self.height);

        self.tmux = Some(Arc::new(tmux));
        self.started = true;
        self.set_status(Status::Running);
        Ok(())
    }

    // Pane teardown failures are ignored; the pane may already be gone.
    pub fn kill(&mut self) -> Result<(), String> {
        if let Some(tmux) = self.tmux.take() {
            let _ = tmux.kill();
        }
        if let Some(worktree) = self.worktree.take() {
            worktree
                .cleanup()
                .map_err(|error| format!("kill failed: {}", error.message()))?;
        }
        self.started = false;
        self.touch();
        Ok(())
    }

    pub fn attach(&self) -> Result<mpsc::Receiver<()>, String> {
        let Some(tmux) = self.tmux.as_ref() else {
            return Err(format!("session '{}' has no pane to attach", self.title));
        };
        tmux.attach().map_err(|error| format!("attach failed: {error}"))
    }

    pub fn set_preview_size(&mut self, width: u16, height: u16) -> Result<(), String> {
        self.width = width;
        self.height = height;
        if let Some(tmux) = self.tmux.as_ref() {
            tmux.set_detached_size(width, height)
                .map_err(|error| format!("resize failed: {error}"))?;
        }
        Ok(())
    }

    pub fn preview(&self) -> Result<String, String> {
        let Some(tmux) = self.tmux.as_ref() else {
            return Ok(String::new());
        };
        let (content, _, _) = tmux
            .capture_unified(false, self.height)
            .map_err(|error| format!("preview failed: {error}"))?;
        Ok(content)
    }

    pub fn has_updated(&self) -> Result<(bool, bool), String> {
        let Some(tmux) = self.tmux.as_ref() else {
            return Ok((false, false));
        };
        tmux.has_updated()
            .map_err(|error| format!("status probe failed: {error}"))
    }

    pub fn send_prompt(&self, text: &str) -> Result<(), String> {
        let Some(tmux) = self.tmux.as_ref() else {
            return Err(format!("session '{}' has no pane", self.title));
        };
        tmux.send_keys(text)
            .and_then(|()| tmux.tap_enter())
            .map_err(|error| format!("prompt send failed: {error}"))
    }

    pub fn tap_enter(&self) -> Result<(), String> {
        let Some(tmux) = self.tmux.as_ref() else {
            return Err(format!("session '{}' has no pane", self.title));
        };
        tmux.tap_enter()
            .map_err(|error| format!("enter send failed: {error}"))
    }

    pub fn update_diff_stats(&mut self) -> Result<(), String> {
        let worktree = self.git_worktree()?;
        let stats = worktree.diff_full();
        let error = stats.error.clone();
        self.set_diff_stats(stats);
        match error {
            Some(message) => Err(message),
            None => Ok(()),
        }
    }

    pub fn set_diff_stats(&mut self, stats: DiffStats) {
        self.diff_stats = stats;
        self.touch();
    }

    // Most recent computed stats, possibly stale; never blocks.
    pub fn get_diff_stats(&self) -> &DiffStats {
        &self.diff_stats
    }

    pub fn to_data(&self) -> InstanceData {
        InstanceData {
            title: self.title.clone(),
            path: self.path.clone(),
            branch: self.branch.clone(),
            program: self.program.clone(),
            direct_mode: self.direct_mode,
            direct_branch: self.direct_branch.clone(),
            status: self.status,
            height: self.height,
            width: self.width,
            auto_yes: self.auto_yes,
            prompt: self.prompt.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            diff_stats: self.diff_stats.clone(),
            worktree: self.worktree.as_ref().map(|worktree| worktree.to_data()),
        }
    }

    pub fn from_data(data: InstanceData) -> Self {
        let started = data.worktree.is_some();
        let status = match data.status {
            Status::Loading => Status::Ready,
            other => other,
        };
        let worktree = data
            .worktree
            .as_ref()
            .map(|snapshot| Arc::new(GitWorktree::from_data(snapshot)));

        Self {
            title: data.title,
            path: data.path,
            branch: data.branch,
            program: data.program,
            direct_mode: data.direct_mode,
            direct_branch: data.direct_branch,
            status,
            height: data.height,
            width: data.width,
            auto_yes: data.auto_yes,
            prompt: data.prompt,
            created_at: data.created_at,
            updated_at: data.updated_at,
            diff_stats: data.diff_stats,
            started,
            tmux: None,
            worktree,
        }
    }

    #[cfg(test)]
    pub fn force_started_with_tmux(&mut self, tmux: Arc<TmuxSession>) {
        self.tmux = Some(tmux);
        self.started = true;
        self.status = Status::Running;
    }

    #[cfg(test)]
    pub fn force_worktree(&mut self, worktree: Arc<GitWorktree>) {
        self.worktree = Some(worktree);
        self.started = true;
    }

    // Re-bind the detached pane after a restart. A vanished pane is not
    // an error here; the caller demotes the session to Paused.
    pub fn rebind_pane(&mut self) -> Result<(), String> {
        self.rebind_pane_with_io(Box::new(ProcessCmdExecutor), Box::new(ProcessPtyFactory))
    }

    pub fn rebind_pane_with_io(
        &mut self,
        executor: Box<dyn CmdExecutor>,
        pty_factory: Box<dyn PtyFactory>,
    ) -> Result<(), String> {
        let tmux = TmuxSession::with_io(&self.title, &self.program, executor, pty_factory);
        tmux.restore()
            .map_err(|error| format!("pane restore failed: {error}"))?;
        self.tmux = Some(Arc::new(tmux));
        Ok(())
    }
}

fn branch_slug(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = false;

    for character in title.chars() {
        let mapped = if character.is_ascii_alphanumeric() || character == '_' {
            character
        } else {
            '-'
        };

        if mapped == '-' {
            if !last_dash {
                slug.push('-');
            }
            last_dash = true;
            continue;
        }

        slug.push(mapped);
        last_dash = false;
    }

    let trimmed = slug.trim_matches('-');
    if trimmed.is_empty() {
        return "session".to_string();
    }
    trimmed.to_string()
}

fn branch_ref_exists(runner: &dyn GitRunner, repo_path: &Path, branch: &str) -> bool {
    runner
        .run(
            repo_path,
            &[
                "rev-parse".to_string(),
                "--verify".to_string(),
                "--quiet".to_string(),
                format!("refs/heads/{branch}"),
            ],
        )
        .is_ok()
}

fn generate_branch_name(runner: &dyn GitRunner, repo_path: &Path, title: &str) -> String {
    let base = branch_slug(title);
    let mut candidate = base.clone();
    let mut attempt = 2u32;

    while branch_ref_exists(runner, repo_path, &candidate) {
        candidate = format!("{base}-{attempt}");
        attempt += 1;
        if attempt > BRANCH_GENERATION_ATTEMPTS {
            break;
        }
    }

    candidate
}
