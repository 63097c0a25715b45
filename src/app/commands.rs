use std::sync::{Arc, mpsc};

use ftui::Cmd;

use crate::multiplexer::TmuxSession;
use crate::workspace::GitWorktree;

use super::msg::{DiffProbeCompletion, DiffWatchTick, Msg, StatusProbeCompletion};
use super::{
    DIFF_PROBE_TIMEOUT, DIFF_WATCH_INTERVAL, ERROR_HIDE_DELAY, METADATA_TICK_INTERVAL,
    PREVIEW_TICK_INTERVAL, STATUS_PROBE_TIMEOUT,
};

pub(super) fn preview_tick_cmd() -> Cmd<Msg> {
    Cmd::task(move || {
        std::thread::sleep(PREVIEW_TICK_INTERVAL);
        Msg::PreviewTick
    })
}

pub(super) fn metadata_tick_cmd() -> Cmd<Msg> {
    Cmd::task(move || {
        std::thread::sleep(METADATA_TICK_INTERVAL);
        Msg::MetadataTick
    })
}

pub(super) fn hide_error_cmd() -> Cmd<Msg> {
    Cmd::task(move || {
        std::thread::sleep(ERROR_HIDE_DELAY);
        Msg::HideError
    })
}

pub(super) fn detach_wait_cmd(done: mpsc::Receiver<()>) -> Cmd<Msg> {
    Cmd::task(move || {
        let _ = done.recv();
        Msg::Detached
    })
}

// Runs the capture on a helper thread and races it against the probe
// timeout; a late completion is dropped with the channel.
pub(super) fn status_probe_cmd(title: String, tmux: Arc<TmuxSession>) -> Cmd<Msg> {
    Cmd::task(move || {
        let (sender, receiver) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = sender.send(tmux.has_updated());
        });

        let completion = match receiver.recv_timeout(STATUS_PROBE_TIMEOUT) {
            Ok(Ok((updated, prompt))) => StatusProbeCompletion {
                title,
                updated,
                prompt,
                error: None,
            },
            Ok(Err(error)) => StatusProbeCompletion {
                title,
                updated: false,
                prompt: false,
                error: Some(error.to_string()),
            },
            Err(_) => StatusProbeCompletion {
                title,
                updated: false,
                prompt: false,
                error: Some("tmux status probe timed out".to_string()),
            },
        };
        Msg::StatusProbed(completion)
    })
}

pub(super) fn diff_probe_cmd(title: String, worktree: Arc<GitWorktree>) -> Cmd<Msg> {
    Cmd::task(move || {
        let (sender, receiver) = mpsc::channel();
        std::thread::spawn(move || {
            let _ = sender.send(worktree.diff_full());
        });

        let completion = match receiver.recv_timeout(DIFF_PROBE_TIMEOUT) {
            Ok(stats) => {
                let error = stats.error.clone();
                DiffProbeCompletion {
                    title,
                    stats: Some(stats),
                    error,
                }
            }
            Err(_) => DiffProbeCompletion {
                title,
                stats: None,
                error: Some("git diff timed out".to_string()),
            },
        };
        Msg::DiffProbed(completion)
    })
}

pub(super) fn diff_watch_cmd(generation: u64, worktree: Arc<GitWorktree>) -> Cmd<Msg> {
    Cmd::task(move || {
        std::thread::sleep(DIFF_WATCH_INTERVAL);
        let dirty = worktree
            .is_dirty()
            .map_err(|error| error.message());
        Msg::DiffWatchTicked(DiffWatchTick { generation, dirty })
    })
}
