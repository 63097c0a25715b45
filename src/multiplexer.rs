use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::{Duration, Instant};

use crate::monitor::{StatusMonitor, prompt_pending};
use crate::process::{execute_command, stderr_or_status};

pub const SESSION_PREFIX: &str = "claudesquad_";

#[cfg(not(test))]
const CAPTURE_CACHE_TTL: Duration = Duration::from_millis(400);
#[cfg(test)]
const CAPTURE_CACHE_TTL: Duration = Duration::from_millis(40);

pub trait CmdExecutor: Send + Sync {
    fn run(&self, command: &[String]) -> std::io::Result<()>;
    fn output(&self, command: &[String]) -> std::io::Result<String>;
}

pub struct ProcessCmdExecutor;

impl CmdExecutor for ProcessCmdExecutor {
    fn run(&self, command: &[String]) -> std::io::Result<()> {
        execute_command(command)
    }

    fn output(&self, command: &[String]) -> std::io::Result<String> {
        crate::process::command_output(command)
    }
}

pub trait PtyChild: Send {
    fn wait(&mut self) -> std::io::Result<()>;
    fn kill(&mut self) -> std::io::Result<()>;
}

pub trait PtyFactory: Send + Sync {
    // A background pseudoterminal whose output nobody reads directly;
    // pane content is observed through capture-pane instead.
    fn start(&self, command: &[String]) -> std::io::Result<Box<dyn PtyChild>>;

    // A pseudoterminal hooked to the controlling terminal, used while
    // the operator is attached.
    fn start_interactive(&self, command: &[String]) -> std::io::Result<Box<dyn PtyChild>> {
        self.start(command)
    }
}

struct ProcessPtyChild(std::process::Child);

impl PtyChild for ProcessPtyChild {
    fn wait(&mut self) -> std::io::Result<()> {
        let status = self.0.wait()?;
        if status.success() {
            return Ok(());
        }
        Err(std::io::Error::other(format!("exit status {status}")))
    }

    fn kill(&mut self) -> std::io::Result<()> {
        self.0.kill()?;
        let _ = self.0.wait();
        Ok(())
    }
}

pub struct ProcessPtyFactory;

impl ProcessPtyFactory {
    fn spawn(command: &[String], interactive: bool) -> std::io::Result<Box<dyn PtyChild>> {
        let Some((binary, args)) = command.split_first() else {
            return Err(std::io::Error::other("empty pty command"));
        };

        let mut spawned = Command::new(binary);
        spawned.args(args);
        if !interactive {
            spawned
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        Ok(Box::new(ProcessPtyChild(spawned.spawn()?)))
    }
}

impl PtyFactory for ProcessPtyFactory {
    fn start(&self, command: &[String]) -> std::io::Result<Box<dyn PtyChild>> {
        Self::spawn(command, false)
    }

    fn start_interactive(&self, command: &[String]) -> std::io::Result<Box<dyn PtyChild>> {
        Self::spawn(command, true)
    }
}

pub fn sanitize_session_name(raw: &str) -> String {
    let mut sanitized = String::with_capacity(SESSION_PREFIX.len() + raw.len());
    sanitized.push_str(SESSION_PREFIX);
    let mut last_underscore = false;

    for character in raw.chars() {
        let mapped = if character.is_ascii_alphanumeric() || character == '_' {
            character
        } else {
            '_'
        };

        if mapped == '_' {
            if !last_underscore {
                sanitized.push('_');
            }
            last_underscore = true;
            continue;
        }

        sanitized.push(mapped);
        last_underscore = false;
    }

    sanitized
}

pub fn content_hash(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

struct CaptureEntry {
    content: String,
    hash: u64,
    taken_at: Instant,
}

pub struct TmuxSession {
    raw_name: String,
    sanitized_name: String,
    program: String,
    executor: Box<dyn CmdExecutor>,
    pty_factory: Box<dyn PtyFactory>,
    monitor: StatusMonitor,
    capture_cache: Mutex<HashMap<(bool, u16), CaptureEntry>>,
    pty: Mutex<Option<Box<dyn PtyChild>>>,
    attached: Arc<AtomicBool>,
    geometry: Mutex<(u16, u16)>,
}

impl TmuxSession {
    pub fn new(raw_name: &str, program: &str) -> Self {
        Self::with_io(
            raw_name,
            program,
            Box::new(ProcessCmdExecutor),
            Box::new(ProcessPtyFactory),
        )
    }

    pub fn with_io(
        raw_name: &str,
        program: &str,
        executor: Box<dyn CmdExecutor>,
        pty_factory: Box<dyn PtyFactory>,
    ) -> Self {
        Self {
            raw_name: raw_name.to_string(),
            sanitized_name: sanitize_session_name(raw_name),
            program: program.to_string(),
            executor,
            pty_factory,
            monitor: StatusMonitor::new(),
            capture_cache: Mutex::new(HashMap::new()),
            pty: Mutex::new(None),
            attached: Arc::new(AtomicBool::new(false)),
            geometry: Mutex::new((80, 24)),
        }
    }

    pub fn raw_name(&self) -> &str {
        &self.raw_name
    }

    pub fn sanitized_name(&self) -> &str {
        &self.sanitized_name
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn is_running(&self) -> bool {
        self.executor
            .run(&tmux_args(&["has-session", "-t", &self.sanitized_name]))
            .is_ok()
    }

    pub fn start(&self, workdir: &Path) -> std::io::Result<()> {
        if self.is_running() {
            return Err(std::io::Error::other(format!(
                "tmux session '{}' already exists",
                self.sanitized_name
            )));
        }

        let create = tmux_args(&[
            "new-session",
            "-d",
            "-s",
            &self.sanitized_name,
            "-c",
            &workdir.to_string_lossy(),
            &self.program,
        ]);
        let mut child = self
            .pty_factory
            .start(&create)
            .map_err(|error| wrap_tmux_error("new-session", &self.sanitized_name, &error))?;
        child
            .wait()
            .map_err(|error| wrap_tmux_error("new-session", &self.sanitized_name, &error))?;

        self.restore()
    }

    pub fn restore(&self) -> std::io::Result<()> {
        if !self.is_running() {
            return Err(std::io::Error::other(format!(
                "no tmux session '{}' to restore",
                self.sanitized_name
            )));
        }

        let attach = tmux_args(&["attach-session", "-t", &self.sanitized_name]);
        let child = self
            .pty_factory
            .start(&attach)
            .map_err(|error| wrap_tmux_error("attach-session", &self.sanitized_name, &error))?;

        if let Ok(mut pty) = self.pty.lock() {
            if let Some(mut previous) = pty.take() {
                let _ = previous.kill();
            }
            *pty = Some(child);
        }

        Ok(())
    }

    pub fn attach(&self) -> std::io::Result<mpsc::Receiver<()>> {
        if self.attached.swap(true, Ordering::SeqCst) {
            return Err(std::io::Error::other(format!(
                "tmux session '{}' is already attached",
                self.sanitized_name
            )));
        }

        let attach = tmux_args(&["attach-session", "-t", &self.sanitized_name]);
        let mut child = match self.pty_factory.start_interactive(&attach) {
            Ok(child) => child,
            Err(error) => {
                self.attached.store(false, Ordering::SeqCst);
                return Err(wrap_tmux_error(
                    "attach-session",
                    &self.sanitized_name,
                    &error,
                ));
            }
        };

        let (done_tx, done_rx) = mpsc::channel();
        let attached = Arc::clone(&self.attached);
        std::thread::spawn(move || {
            let _ = child.wait();
            attached.store(false, Ordering::SeqCst);
            let _ = done_tx.send(());
        });

        Ok(done_rx)
    }

    // Closes the attach pseudoterminal only; the detached session keeps
    // running inside tmux.
    pub fn close(&self) {
        if let Ok(mut pty) = self.pty.lock()
            && let Some(mut child) = pty.take()
        {
            let _ = child.kill();
        }
    }

    pub fn kill(&self) -> std::io::Result<()> {
        self.close();
        self.executor
            .run(&tmux_args(&["kill-session", "-t", &self.sanitized_name]))
            .map_err(|error| wrap_tmux_error("kill-session", &self.sanitized_name, &error))
    }

    // Newlines inside text arrive as literal key sequences; the
    // terminal enter press is a separate tap_enter call.
    pub fn send_keys(&self, text: &str) -> std::io::Result<()> {
        self.executor
            .run(&tmux_args(&[
                "send-keys",
                "-t",
                &self.sanitized_name,
                "-l",
                text,
            ]))
            .map_err(|error| wrap_tmux_error("send-keys", &self.sanitized_name, &error))
    }

    pub fn tap_enter(&self) -> std::io::Result<()> {
        self.executor
            .run(&tmux_args(&["send-keys", "-t", &self.sanitized_name, "Enter"]))
            .map_err(|error| wrap_tmux_error("send-keys", &self.sanitized_name, &error))
    }

    pub fn set_detached_size(&self, width: u16, height: u16) -> std::io::Result<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }

        if let Ok(mut geometry) = self.geometry.lock() {
            *geometry = (width, height);
        }

        self.executor
            .run(&tmux_args(&[
                "resize-window",
                "-t",
                &self.sanitized_name,
                "-x",
                &width.to_string(),
                "-y",
                &height.to_string(),
            ]))
            .map_err(|error| wrap_tmux_error("resize-window", &self.sanitized_name, &error))
    }

    pub fn height(&self) -> u16 {
        self.geometry.lock().map(|geometry| geometry.1).unwrap_or(24)
    }

    fn capture_args(sanitized_name: &str, full: bool, height: u16) -> Vec<String> {
        if full {
            return tmux_args(&["capture-pane", "-p", "-t", sanitized_name, "-S", "-"]);
        }

        tmux_args(&[
            "capture-pane",
            "-p",
            "-t",
            sanitized_name,
            "-S",
            &format!("-{height}"),
            "-E",
            "-1",
        ])
    }

    pub fn capture_unified(
        &self,
        full: bool,
        height: u16,
    ) -> std::io::Result<(String, u64, bool)> {
        let key = (full, height);
        if let Ok(cache) = self.capture_cache.lock()
            && let Some(entry) = cache.get(&key)
            && entry.taken_at.elapsed() < CAPTURE_CACHE_TTL
        {
            return Ok((entry.content.clone(), entry.hash, true));
        }

        let args = Self::capture_args(&self.sanitized_name, full, height);
        let content = self
            .executor
            .output(&args)
            .map_err(|error| wrap_tmux_error("capture-pane", &self.sanitized_name, &error))?;
        let hash = content_hash(&content);

        if let Ok(mut cache) = self.capture_cache.lock() {
            cache.insert(
                key,
                CaptureEntry {
                    content: content.clone(),
                    hash,
                    taken_at: Instant::now(),
                },
            );
        }

        Ok((content, hash, false))
    }

    // A cached capture compares equal against its own prior hash, so a
    // cache hit correctly reads as updated = false.
    pub fn has_updated(&self) -> std::io::Result<(bool, bool)> {
        let (content, hash, _) = self.capture_unified(false, self.height())?;
        let updated = self.monitor.observe(hash);
        let prompt = prompt_pending(&self.program, &content);
        Ok((updated, prompt))
    }
}

fn tmux_args(args: &[&str]) -> Vec<String> {
    let mut command = Vec::with_capacity(args.len() + 1);
    command.push("tmux".to_string());
    command.extend(args.iter().map(|value| (*value).to_string()));
    command
}

fn wrap_tmux_error(operation: &str, session: &str, error: &std::io::Error) -> std::io::Error {
    std::io::Error::other(format!("tmux {operation} failed for '{session}': {error}"))
}

pub fn probe_tmux_binary() -> std::io::Result<()> {
    let output = Command::new("tmux").arg("-V").output()?;
    if output.status.success() {
        return Ok(());
    }
    Err(std::io::Error::other(format!(
        "tmux -V failed: {}",
        stderr_or_status(&output)
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use proptest::prelude::*;

    use super::{
        CmdExecutor, PtyChild, PtyFactory, SESSION_PREFIX, TmuxSession, sanitize_session_name,
    };

    type RecordedCommands = Arc<Mutex<Vec<Vec<String>>>>;

    struct StubExecutor {
        commands: RecordedCommands,
        capture_output: Arc<Mutex<String>>,
        capture_calls: Arc<Mutex<usize>>,
        session_exists: Arc<Mutex<bool>>,
    }

    impl StubExecutor {
        fn new() -> Self {
            Self {
                commands: Arc::new(Mutex::new(Vec::new())),
                capture_output: Arc::new(Mutex::new("hello world".to_string())),
                capture_calls: Arc::new(Mutex::new(0)),
                session_exists: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl CmdExecutor for StubExecutor {
        fn run(&self, command: &[String]) -> std::io::Result<()> {
            self.commands
                .lock()
                .expect("commands lock")
                .push(command.to_vec());
            if command.get(1).map(String::as_str) == Some("has-session") {
                if *self.session_exists.lock().expect("exists lock") {
                    return Ok(());
                }
                return Err(std::io::Error::other("can't find session"));
            }
            Ok(())
        }

        fn output(&self, command: &[String]) -> std::io::Result<String> {
            self.commands
                .lock()
                .expect("commands lock")
                .push(command.to_vec());
            if command.get(1).map(String::as_str) == Some("capture-pane") {
                *self.capture_calls.lock().expect("calls lock") += 1;
            }
            Ok(self.capture_output.lock().expect("output lock").clone())
        }
    }

    struct StubPtyChild;

    impl PtyChild for StubPtyChild {
        fn wait(&mut self) -> std::io::Result<()> {
            Ok(())
        }

        fn kill(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct StubPtyFactory {
        commands: RecordedCommands,
        session_exists: Arc<Mutex<bool>>,
    }

    impl PtyFactory for StubPtyFactory {
        fn start(&self, command: &[String]) -> std::io::Result<Box<dyn PtyChild>> {
            self.commands
                .lock()
                .expect("pty lock")
                .push(command.to_vec());
            if command.get(1).map(String::as_str) == Some("new-session") {
                *self.session_exists.lock().expect("exists lock") = true;
            }
            Ok(Box::new(StubPtyChild))
        }
    }

    struct SessionFixture {
        session: TmuxSession,
        commands: RecordedCommands,
        pty_commands: RecordedCommands,
        capture_output: Arc<Mutex<String>>,
        capture_calls: Arc<Mutex<usize>>,
        session_exists: Arc<Mutex<bool>>,
    }

    fn fixture(raw_name: &str, program: &str) -> SessionFixture {
        let executor = StubExecutor::new();
        let commands = Arc::clone(&executor.commands);
        let capture_output = Arc::clone(&executor.capture_output);
        let capture_calls = Arc::clone(&executor.capture_calls);
        let session_exists = Arc::clone(&executor.session_exists);
        let pty_commands: RecordedCommands = Arc::new(Mutex::new(Vec::new()));
        let factory = StubPtyFactory {
            commands: Arc::clone(&pty_commands),
            session_exists: Arc::clone(&session_exists),
        };
        SessionFixture {
            session: TmuxSession::with_io(raw_name, program, Box::new(executor), Box::new(factory)),
            commands,
            pty_commands,
            capture_output,
            capture_calls,
            session_exists,
        }
    }

    #[test]
    fn sanitize_prefixes_and_collapses_invalid_runs() {
        let session = fixture("a sd f . . asdf", "claude").session;
        assert_eq!(session.raw_name(), "a sd f . . asdf");
        assert_eq!(session.program(), "claude");
        assert_eq!(
            session.sanitized_name(),
            format!("{SESSION_PREFIX}a_sd_f_asdf")
        );

        assert_eq!(
            sanitize_session_name("asdf"),
            format!("{SESSION_PREFIX}asdf")
        );
        assert_eq!(
            sanitize_session_name("a sd f . . asdf"),
            format!("{SESSION_PREFIX}a_sd_f_asdf")
        );
        assert_eq!(
            sanitize_session_name("demo-1"),
            format!("{SESSION_PREFIX}demo_1")
        );
    }

    proptest! {
        #[test]
        fn sanitize_output_is_always_prefixed_and_safe(raw in ".{0,48}") {
            let sanitized = sanitize_session_name(&raw);
            prop_assert!(sanitized.starts_with(SESSION_PREFIX));
            prop_assert!(
                sanitized
                    .chars()
                    .all(|value| value.is_ascii_alphanumeric() || value == '_')
            );
        }
    }

    #[test]
    fn start_creates_detached_session_then_attaches() {
        let fixture = fixture("test-session", "claude");
        let workdir = std::env::temp_dir();

        fixture.session.start(&workdir).expect("start should succeed");

        let pty_commands = fixture.pty_commands.lock().expect("pty lock");
        assert_eq!(pty_commands.len(), 2);
        assert_eq!(
            pty_commands[0],
            vec![
                "tmux".to_string(),
                "new-session".to_string(),
                "-d".to_string(),
                "-s".to_string(),
                format!("{SESSION_PREFIX}test_session"),
                "-c".to_string(),
                workdir.to_string_lossy().to_string(),
                "claude".to_string(),
            ]
        );
        assert_eq!(
            pty_commands[1],
            vec![
                "tmux".to_string(),
                "attach-session".to_string(),
                "-t".to_string(),
                format!("{SESSION_PREFIX}test_session"),
            ]
        );
    }

    #[test]
    fn start_fails_when_session_name_is_taken() {
        let fixture = fixture("taken", "claude");
        *fixture.session_exists.lock().expect("exists lock") = true;

        let error = fixture
            .session
            .start(&std::env::temp_dir())
            .expect_err("start should fail");
        assert!(error.to_string().contains("already exists"));
        assert!(fixture.pty_commands.lock().expect("pty lock").is_empty());
    }

    #[test]
    fn restore_requires_a_live_session() {
        let fixture = fixture("gone", "claude");
        let error = fixture.session.restore().expect_err("restore should fail");
        assert!(error.to_string().contains("no tmux session"));
    }

    #[test]
    fn bounded_capture_requests_last_height_lines() {
        let fixture = fixture("cap", "claude");
        fixture
            .session
            .capture_unified(false, 42)
            .expect("capture should succeed");

        let commands = fixture.commands.lock().expect("commands lock");
        let capture = commands
            .iter()
            .find(|command| command.get(1).map(String::as_str) == Some("capture-pane"))
            .expect("capture command should be issued");
        assert_eq!(
            capture,
            &vec![
                "tmux".to_string(),
                "capture-pane".to_string(),
                "-p".to_string(),
                "-t".to_string(),
                format!("{SESSION_PREFIX}cap"),
                "-S".to_string(),
                "-42".to_string(),
                "-E".to_string(),
                "-1".to_string(),
            ]
        );
    }

    #[test]
    fn repeated_captures_within_ttl_hit_the_cache() {
        let fixture = fixture("cache", "claude");

        let (_, _, hit) = fixture
            .session
            .capture_unified(false, 0)
            .expect("first capture");
        assert!(!hit);
        let (_, _, hit) = fixture
            .session
            .capture_unified(false, 0)
            .expect("second capture");
        assert!(hit);

        assert_eq!(*fixture.capture_calls.lock().expect("calls lock"), 1);
    }

    #[test]
    fn has_updated_reports_change_on_first_observation_only() {
        let fixture = fixture("hash", "bash");

        let (updated, prompt) = fixture.session.has_updated().expect("first probe");
        assert!(updated);
        assert!(!prompt);

        let (updated, _) = fixture.session.has_updated().expect("second probe");
        assert!(!updated);

        // After the cache TTL lapses a changed capture reads as updated.
        *fixture.capture_output.lock().expect("output lock") = "different content".to_string();
        std::thread::sleep(Duration::from_millis(60));
        let (updated, _) = fixture.session.has_updated().expect("third probe");
        assert!(updated);
    }

    #[test]
    fn has_updated_detects_claude_prompt() {
        let fixture = fixture("prompt", "claude");
        *fixture.capture_output.lock().expect("output lock") =
            "No, and tell Claude what to do differently".to_string();

        let (_, prompt) = fixture.session.has_updated().expect("probe");
        assert!(prompt);
    }

    #[test]
    fn send_keys_uses_literal_flag_and_enter_is_separate() {
        let fixture = fixture("keys", "claude");
        fixture
            .session
            .send_keys("fix the bug\nthen run tests")
            .expect("send-keys should succeed");
        fixture.session.tap_enter().expect("enter should succeed");

        let commands = fixture.commands.lock().expect("commands lock");
        let sends: Vec<&Vec<String>> = commands
            .iter()
            .filter(|command| command.get(1).map(String::as_str) == Some("send-keys"))
            .collect();
        assert_eq!(sends.len(), 2);
        assert_eq!(sends[0][4], "-l");
        assert_eq!(sends[0][5], "fix the bug\nthen run tests");
        assert_eq!(sends[1][4], "Enter");
    }
}
