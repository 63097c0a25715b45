use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use squad::workspace::{GitWorktree, worktree_path_for};

struct TestDir {
    path: PathBuf,
}

impl TestDir {
    fn new(label: &str) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "squad-git-{label}-{}-{timestamp}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("test dir should be created");
        Self { path }
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("git should run");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn init_repo(dir: &Path) {
    fs::create_dir_all(dir).expect("repo dir should be created");
    run_git(dir, &["init", "-b", "main"]);
    run_git(dir, &["config", "user.email", "test@example.com"]);
    run_git(dir, &["config", "user.name", "Test User"]);
    fs::write(dir.join("file.txt"), "line1\n").expect("file should be written");
    run_git(dir, &["add", "file.txt"]);
    run_git(dir, &["commit", "-m", "initial commit"]);
}

fn current_branch(dir: &Path) -> String {
    run_git(dir, &["rev-parse", "--abbrev-ref", "HEAD"])
        .trim()
        .to_string()
}

fn branch_exists(dir: &Path, branch: &str) -> bool {
    Command::new("git")
        .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
        .current_dir(dir)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[test]
fn worktree_setup_diff_and_cleanup() {
    if !git_available() {
        eprintln!("skipping: git is not available");
        return;
    }

    let temp = TestDir::new("lifecycle");
    let repo = temp.path.join("repo");
    init_repo(&repo);

    let worktree = GitWorktree::new(&repo, "demo", "demo");
    worktree.setup().expect("setup should succeed");

    let expected_path = worktree_path_for(&repo, "demo");
    assert_eq!(worktree.worktree_path(), expected_path.as_path());
    assert!(expected_path.is_dir(), "worktree directory should exist");
    assert!(branch_exists(&repo, "demo"), "session branch should exist");
    assert!(!worktree.base_commit_sha().is_empty());

    // One added line in a tracked file, two lines in an untracked file.
    fs::write(expected_path.join("file.txt"), "line1\nline2\n")
        .expect("tracked file should be writable");
    fs::write(expected_path.join("new.txt"), "a\nb\n").expect("untracked file should be writable");

    assert!(worktree.is_dirty().expect("dirty check should succeed"));

    let counts = worktree.diff();
    assert!(counts.error.is_none(), "diff error: {:?}", counts.error);
    assert_eq!(counts.added, 1);
    assert_eq!(counts.content, "");

    let full = worktree.diff_full();
    assert!(full.error.is_none(), "diff error: {:?}", full.error);
    assert!(full.added >= 3, "expected at least 3 added, got {}", full.added);
    assert!(full.content.contains("new.txt"));
    assert!(full.content.contains("file.txt"));

    worktree.cleanup().expect("cleanup should succeed");
    assert!(!expected_path.exists(), "worktree directory should be gone");
    assert!(!branch_exists(&repo, "demo"), "session branch should be gone");
}

#[test]
fn direct_mode_checks_out_and_restores() {
    if !git_available() {
        eprintln!("skipping: git is not available");
        return;
    }

    let temp = TestDir::new("direct");
    let repo = temp.path.join("repo");
    init_repo(&repo);
    assert_eq!(current_branch(&repo), "main");

    let worktree = GitWorktree::new_direct(&repo, "feature-x");
    worktree.setup().expect("direct setup should succeed");

    assert_eq!(current_branch(&repo), "feature-x");
    assert_eq!(worktree.worktree_path(), repo.as_path());
    assert_eq!(worktree.original_branch(), "main");
    assert!(!worktree.base_commit_sha().is_empty());

    worktree.cleanup().expect("direct cleanup should succeed");
    assert_eq!(current_branch(&repo), "main");
    assert!(
        branch_exists(&repo, "feature-x"),
        "direct cleanup must never delete branches"
    );
}

#[test]
fn setup_reuses_an_existing_branch_after_pause() {
    if !git_available() {
        eprintln!("skipping: git is not available");
        return;
    }

    let temp = TestDir::new("resume");
    let repo = temp.path.join("repo");
    init_repo(&repo);

    let worktree = GitWorktree::new(&repo, "resumable", "resumable");
    worktree.setup().expect("setup should succeed");
    let base = worktree.base_commit_sha();

    // Pause removes the worktree but keeps the branch.
    worktree.remove().expect("remove should succeed");
    assert!(!worktree.worktree_path().exists());
    assert!(branch_exists(&repo, "resumable"));

    // Resume re-provisions from the retained branch; the base commit is
    // never rewritten.
    worktree.setup().expect("re-setup should succeed");
    assert!(worktree.worktree_path().is_dir());
    assert_eq!(worktree.base_commit_sha(), base);

    worktree.cleanup().expect("cleanup should succeed");
}
