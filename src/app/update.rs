use chrono::Utc;
use ftui::Cmd;
use ftui::core::event::{KeyCode, KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use ftui::core::geometry::Rect;
use serde_json::Value;

use crate::domain::{Status, TITLE_MAX_CHARS};
use crate::event_log::Event as LogEvent;

use super::commands::{
    diff_probe_cmd, diff_watch_cmd, metadata_tick_cmd, preview_tick_cmd, status_probe_cmd,
};
use super::keymap::{KeyAction, global_action, is_ctrl_c};
use super::msg::{DiffProbeCompletion, DiffWatchTick, Msg, StatusProbeCompletion};
use super::view::layout_for;
use super::{ConfirmAction, DismissAction, HelpKind, Home, UiState};

fn rect_contains(rect: Rect, x: u16, y: u16) -> bool {
    x >= rect.x
        && x < rect.x.saturating_add(rect.width)
        && y >= rect.y
        && y < rect.y.saturating_add(rect.height)
}

impl Home {
    pub(super) fn update_model(&mut self, msg: Msg) -> Cmd<Msg> {
        match msg {
            Msg::Key(key_event) => self.handle_key(key_event),
            Msg::Mouse(mouse_event) => self.handle_mouse(mouse_event),
            Msg::Resize { width, height } => {
                self.handle_resize(width, height);
                Cmd::None
            }
            Msg::PreviewTick => self.handle_preview_tick(),
            Msg::MetadataTick => self.handle_metadata_tick(),
            Msg::StatusProbed(completion) => {
                self.apply_status_probe(completion);
                Cmd::None
            }
            Msg::DiffProbed(completion) => {
                self.apply_diff_probe(completion);
                Cmd::None
            }
            Msg::DiffWatchTicked(tick) => self.handle_diff_watch_tick(tick),
            Msg::Detached => {
                self.state = UiState::Default;
                Cmd::None
            }
            Msg::HideError => {
                self.errbox.clear();
                Cmd::None
            }
            Msg::Noop => Cmd::None,
        }
    }

    // Both tickers reschedule themselves unconditionally; losing either
    // one stalls the dashboard.
    fn handle_metadata_tick(&mut self) -> Cmd<Msg> {
        let mut cmds: Vec<Cmd<Msg>> = self
            .probe_targets(Utc::now())
            .into_iter()
            .map(|(title, tmux)| status_probe_cmd(title, tmux))
            .collect();
        cmds.push(metadata_tick_cmd());
        Cmd::batch(cmds)
    }

    fn handle_preview_tick(&mut self) -> Cmd<Msg> {
        self.animation_frame = self.animation_frame.wrapping_add(1);
        let mut preview_error = None;
        if let Some(instance) = self.list.selected() {
            match instance.preview() {
                Ok(text) => self.tabs.set_preview(text),
                Err(message) => preview_error = Some(message),
            }
        }

        let tick = preview_tick_cmd();
        match preview_error {
            Some(message) => Cmd::batch(vec![self.handle_error(message), tick]),
            None => tick,
        }
    }

    pub(super) fn apply_status_probe(&mut self, completion: StatusProbeCompletion) {
        let Some(instance) = self.list.find_mut(&completion.title) else {
            // The session was killed while the probe was in flight.
            self.event_log.log(
                LogEvent::new("probe", "discarded")
                    .with_data("session", Value::from(completion.title)),
            );
            return;
        };

        if let Some(error) = completion.error {
            self.event_log.log(
                LogEvent::warning("probe", error)
                    .with_data("session", Value::from(completion.title)),
            );
            return;
        }

        if completion.updated {
            instance.set_status(Status::Running);
        } else if completion.prompt && instance.auto_yes {
            let _ = instance.tap_enter();
        } else {
            instance.set_status(Status::Ready);
        }
    }

    pub(super) fn apply_diff_probe(&mut self, completion: DiffProbeCompletion) {
        if let Some(error) = completion.error {
            self.event_log.log(
                LogEvent::warning("diff", error)
                    .with_data("session", Value::from(completion.title)),
            );
            return;
        }

        let Some(stats) = completion.stats else {
            return;
        };
        let selected_title = self
            .list
            .selected()
            .map(|instance| instance.title.clone());
        let Some(instance) = self.list.find_mut(&completion.title) else {
            return;
        };
        instance.set_diff_stats(stats.clone());
        if selected_title.as_deref() == Some(completion.title.as_str()) {
            self.tabs.set_diff(&stats);
        }
    }

    fn handle_diff_watch_tick(&mut self, tick: DiffWatchTick) -> Cmd<Msg> {
        if !self.tabs.is_in_diff_tab() {
            self.diff_watch = None;
            return Cmd::None;
        }
        let Some(watch) = self.diff_watch.as_mut() else {
            return Cmd::None;
        };
        // A superseded watcher keeps ticking until its last command
        // drains; its generation no longer matches.
        if watch.generation != tick.generation {
            return Cmd::None;
        }

        let title = watch.title.clone();
        let generation = watch.generation;
        let mut changed = false;
        match tick.dirty {
            Ok(dirty) => {
                changed = dirty != watch.last_dirty;
                watch.last_dirty = dirty;
            }
            Err(message) => {
                self.event_log.log(
                    LogEvent::warning("diff-watch", message)
                        .with_data("session", Value::from(title.clone())),
                );
            }
        }

        let Some(worktree) = self
            .list
            .find(&title)
            .and_then(|instance| instance.git_worktree().ok())
        else {
            self.diff_watch = None;
            return Cmd::None;
        };

        let mut cmds = Vec::new();
        if changed {
            cmds.push(diff_probe_cmd(title, std::sync::Arc::clone(&worktree)));
        }
        cmds.push(diff_watch_cmd(generation, worktree));
        Cmd::batch(cmds)
    }

    pub(super) fn handle_resize(&mut self, width: u16, height: u16) {
        self.viewport_width = width;
        self.viewport_height = height;
        self.stacked = width < super::STACKED_LAYOUT_BREAKPOINT;

        let layout = layout_for(width, height);
        self.tabs.set_size(layout.tabs.width, layout.tabs.height);
        self.errbox.set_width(width);

        let preview_width = layout.tabs.width.saturating_sub(2);
        let preview_height = layout.tabs.height.saturating_sub(3);
        for instance in self.list.instances_mut() {
            if !instance.started() || instance.paused() {
                continue;
            }
            if let Err(message) = instance.set_preview_size(preview_width, preview_height) {
                self.event_log.log(LogEvent::warning("resize", message));
            }
        }
    }

    fn handle_key(&mut self, key_event: KeyEvent) -> Cmd<Msg> {
        match self.state {
            UiState::Help => self.dismiss_help(),
            UiState::Confirm => self.handle_confirm_key(key_event),
            UiState::NewInstanceNaming => self.handle_naming_key(key_event),
            UiState::Prompting => self.handle_prompting_key(key_event),
            UiState::Default => self.handle_default_key(key_event),
        }
    }

    fn handle_confirm_key(&mut self, key_event: KeyEvent) -> Cmd<Msg> {
        match key_event.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                let Some(confirm) = self.confirm.take() else {
                    self.state = UiState::Default;
                    return Cmd::None;
                };
                self.state = UiState::Default;
                self.execute_confirmed(confirm.action)
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Escape => {
                self.confirm = None;
                self.state = UiState::Default;
                Cmd::None
            }
            _ => Cmd::None,
        }
    }

    pub(super) fn execute_confirmed(&mut self, action: ConfirmAction) -> Cmd<Msg> {
        match action {
            ConfirmAction::Kill { title } => self.execute_kill(&title),
            ConfirmAction::Push { title } => self.execute_push(&title),
        }
    }

    pub(super) fn execute_kill(&mut self, title: &str) -> Cmd<Msg> {
        let Some(index) = self
            .list
            .instances()
            .iter()
            .position(|instance| instance.title == title)
        else {
            return Cmd::None;
        };

        // Killing a session whose branch is checked out in any worktree
        // would strand that checkout; direct mode works on the branch
        // itself, so the guard does not apply there.
        let instance = &self.list.instances()[index];
        if !instance.direct_mode {
            let checked_out = instance
                .git_worktree()
                .and_then(|worktree| worktree.is_branch_checked_out().map_err(|e| e.message()));
            match checked_out {
                Ok(true) => {
                    return self
                        .handle_error(format!("session '{title}' is currently checked out"));
                }
                Ok(false) => {}
                Err(message) => return self.handle_error(message),
            }
        }

        if let Err(message) = self.storage.delete_instance(title) {
            return self.handle_error(message);
        }

        self.list.set_selected(index);
        let kill_result = match self.list.selected_mut() {
            Some(instance) => instance.kill(),
            None => Ok(()),
        };
        self.list.remove_selected();
        self.event_log.log(
            LogEvent::new("session", "killed").with_data("session", Value::from(title)),
        );

        let changed = self.instance_changed();
        match kill_result {
            Ok(()) => changed,
            Err(message) => Cmd::batch(vec![self.handle_error(message), changed]),
        }
    }

    pub(super) fn execute_push(&mut self, title: &str) -> Cmd<Msg> {
        let Some(instance) = self.list.find(title) else {
            return Cmd::None;
        };
        let worktree = match instance.git_worktree() {
            Ok(worktree) => worktree,
            Err(message) => return self.handle_error(message),
        };

        let message = format!(
            "[claudesquad] update from '{title}' on {}",
            Utc::now().to_rfc2822()
        );
        if let Err(error) = worktree.push_changes(&message, true) {
            return self.handle_error(error.message());
        }

        self.event_log.log(
            LogEvent::new("session", "pushed").with_data("session", Value::from(title)),
        );
        Cmd::None
    }

    fn provisional_title(&self) -> Option<String> {
        if !self.list.has_provisional() {
            return None;
        }
        self.list
            .instances()
            .last()
            .map(|instance| instance.title.clone())
    }

    fn handle_naming_key(&mut self, key_event: KeyEvent) -> Cmd<Msg> {
        if is_ctrl_c(&key_event) || key_event.code == KeyCode::Escape {
            self.cancel_new_instance();
            return Cmd::None;
        }

        match key_event.code {
            KeyCode::Enter => self.submit_new_instance(),
            KeyCode::Backspace => {
                if let Some(instance) = self.list.instances_mut().last_mut() {
                    instance.title.pop();
                }
                Cmd::None
            }
            KeyCode::Char(character) => {
                let Some(title) = self.provisional_title() else {
                    return Cmd::None;
                };
                if title.chars().count() >= TITLE_MAX_CHARS {
                    return self.handle_error(format!(
                        "title cannot be longer than {TITLE_MAX_CHARS} characters"
                    ));
                }
                let mut updated = title;
                updated.push(character);
                let result = match self.list.instances_mut().last_mut() {
                    Some(instance) => instance.set_title(updated),
                    None => Ok(()),
                };
                match result {
                    Ok(()) => Cmd::None,
                    Err(message) => self.handle_error(message),
                }
            }
            _ => Cmd::None,
        }
    }

    fn submit_new_instance(&mut self) -> Cmd<Msg> {
        let Some(title) = self.provisional_title() else {
            self.state = UiState::Default;
            return Cmd::None;
        };
        if title.is_empty() {
            return self.handle_error("title cannot be empty".to_string());
        }

        let count = self.list.num_instances();
        let duplicate = self
            .list
            .instances()
            .iter()
            .take(count.saturating_sub(1))
            .any(|instance| instance.title == title);
        if duplicate {
            return self.handle_error(format!("title '{title}' is already in use"));
        }

        let start_result = match self.list.instances_mut().last_mut() {
            Some(instance) => instance.start(true),
            None => Ok(()),
        };
        if let Err(message) = start_result {
            self.cancel_new_instance();
            return self.handle_error(message);
        }

        if self.auto_yes && let Some(instance) = self.list.instances_mut().last_mut() {
            instance.auto_yes = true;
        }
        if let Err(message) = self.save_all() {
            return self.handle_error(message);
        }
        self.list.finalize_instance();
        self.state = UiState::Default;

        let changed = self.instance_changed();
        if self.prompt_after_name {
            self.prompt_after_name = false;
            self.prompt_input.clear();
            self.state = UiState::Prompting;
            return changed;
        }

        let help = self.show_help(HelpKind::SessionStarted, None);
        Cmd::batch(vec![changed, help])
    }

    fn handle_prompting_key(&mut self, key_event: KeyEvent) -> Cmd<Msg> {
        match key_event.code {
            KeyCode::Escape => {
                self.prompt_input.clear();
                self.state = UiState::Default;
                self.show_help(HelpKind::SessionStarted, None)
            }
            KeyCode::Enter => {
                let prompt = std::mem::take(&mut self.prompt_input);
                let send_result = match self.list.selected() {
                    Some(instance) => instance.send_prompt(&prompt),
                    None => Ok(()),
                };
                self.state = UiState::Default;
                let help = self.show_help(HelpKind::SessionStarted, None);
                match send_result {
                    Ok(()) => help,
                    Err(message) => Cmd::batch(vec![self.handle_error(message), help]),
                }
            }
            KeyCode::Backspace => {
                self.prompt_input.pop();
                Cmd::None
            }
            KeyCode::Char(character) => {
                self.prompt_input.push(character);
                Cmd::None
            }
            _ => Cmd::None,
        }
    }

    fn handle_default_key(&mut self, key_event: KeyEvent) -> Cmd<Msg> {
        let Some(action) = global_action(&key_event) else {
            return Cmd::None;
        };

        match action {
            KeyAction::Quit => match self.save_all() {
                Ok(()) => Cmd::Quit,
                Err(message) => self.handle_error(message),
            },
            KeyAction::Up => {
                self.list.up();
                self.instance_changed()
            }
            KeyAction::Down => {
                self.list.down();
                self.instance_changed()
            }
            KeyAction::SelectIndex(index) => {
                if index < self.list.num_instances() {
                    self.list.set_selected(index);
                    return self.instance_changed();
                }
                Cmd::None
            }
            KeyAction::ToggleTab => {
                self.tabs.toggle();
                self.instance_changed()
            }
            KeyAction::ScrollUp => {
                self.tabs.scroll_up();
                Cmd::None
            }
            KeyAction::ScrollDown => {
                self.tabs.scroll_down();
                Cmd::None
            }
            KeyAction::PageUp => {
                self.tabs.page_up();
                Cmd::None
            }
            KeyAction::PageDown => {
                self.tabs.page_down();
                Cmd::None
            }
            KeyAction::HalfPageUp => {
                self.tabs.half_page_up();
                Cmd::None
            }
            KeyAction::HalfPageDown => {
                self.tabs.half_page_down();
                Cmd::None
            }
            KeyAction::GotoTop => {
                self.tabs.goto_top();
                Cmd::None
            }
            KeyAction::GotoBottom => {
                self.tabs.goto_bottom();
                Cmd::None
            }
            KeyAction::HunkPrev => {
                self.tabs.jump_prev_hunk();
                Cmd::None
            }
            KeyAction::HunkNext => {
                self.tabs.jump_next_hunk();
                Cmd::None
            }
            KeyAction::FilePrev => {
                self.tabs.jump_prev_file();
                Cmd::None
            }
            KeyAction::FileNext => {
                self.tabs.jump_next_file();
                Cmd::None
            }
            KeyAction::New => self.begin_new_instance(false),
            KeyAction::NewWithPrompt => self.begin_new_instance(true),
            KeyAction::Help => self.show_help(HelpKind::General, None),
            KeyAction::Kill => {
                let Some(title) = self.list.selected().map(|i| i.title.clone()) else {
                    return Cmd::None;
                };
                self.confirm_action(
                    format!("[!] Kill session '{title}'?"),
                    ConfirmAction::Kill { title },
                );
                Cmd::None
            }
            KeyAction::Push => {
                let Some(title) = self.list.selected().map(|i| i.title.clone()) else {
                    return Cmd::None;
                };
                self.confirm_action(
                    format!("[!] Push changes from session '{title}'?"),
                    ConfirmAction::Push { title },
                );
                Cmd::None
            }
            KeyAction::Checkout => {
                let Some(title) = self.list.selected().map(|i| i.title.clone()) else {
                    return Cmd::None;
                };
                self.show_help(
                    HelpKind::BeforeCheckout,
                    Some(DismissAction::Pause { title }),
                )
            }
            KeyAction::Resume => {
                let resume_result = match self.list.selected_mut() {
                    Some(instance) if instance.paused() => instance.resume(),
                    Some(_) => Err("session is not paused".to_string()),
                    None => return Cmd::None,
                };
                match resume_result {
                    Ok(()) => self.instance_changed(),
                    Err(message) => self.handle_error(message),
                }
            }
            KeyAction::Attach => {
                let attachable = self
                    .list
                    .selected()
                    .is_some_and(|instance| !instance.paused() && instance.tmux_alive());
                if !attachable {
                    return Cmd::None;
                }
                self.show_help(HelpKind::BeforeAttach, Some(DismissAction::Attach))
            }
        }
    }

    fn handle_mouse(&mut self, mouse_event: MouseEvent) -> Cmd<Msg> {
        if self.state != UiState::Default {
            return Cmd::None;
        }

        match mouse_event.kind {
            MouseEventKind::ScrollUp => {
                self.tabs.scroll_up();
                Cmd::None
            }
            MouseEventKind::ScrollDown => {
                self.tabs.scroll_down();
                Cmd::None
            }
            MouseEventKind::Down(MouseButton::Left) => {
                let layout = layout_for(self.viewport_width.max(1), self.viewport_height.max(1));
                if rect_contains(layout.tabs, mouse_event.x, mouse_event.y) {
                    let tab = self.tabs.hit_test_tab(
                        mouse_event.x - layout.tabs.x,
                        mouse_event.y - layout.tabs.y,
                    );
                    if let Some(tab) = tab
                        && tab != self.tabs.active_tab()
                    {
                        self.tabs.set_active(tab);
                        return self.instance_changed();
                    }
                    return Cmd::None;
                }
                if rect_contains(layout.list, mouse_event.x, mouse_event.y) {
                    let row = self.list.hit_test(mouse_event.y - layout.list.y);
                    if let Some(row) = row {
                        self.list.set_selected(row);
                        return self.instance_changed();
                    }
                }
                Cmd::None
            }
            _ => Cmd::None,
        }
    }
}
