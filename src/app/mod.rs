use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ftui::render::frame::Frame;
use ftui::{App, Cmd, Model, ScreenMode};

use crate::event_log::{Event as LogEvent, EventLogger, FileEventLogger, NullEventLogger};
use crate::multiplexer::TmuxSession;
use crate::session::{Instance, InstanceOptions};
use crate::storage::{AppState, Storage};
use crate::ui::errbox::ErrBox;
use crate::ui::list::SessionList;
use crate::ui::tabs::TabbedWindow;

mod commands;
mod keymap;
mod msg;
mod update;
mod view;

use commands::{metadata_tick_cmd, preview_tick_cmd};
use msg::Msg;

pub const GLOBAL_INSTANCE_LIMIT: usize = 10;

const METADATA_TICK_INTERVAL: Duration = Duration::from_millis(500);
const PREVIEW_TICK_INTERVAL: Duration = Duration::from_millis(250);
const DIFF_WATCH_INTERVAL: Duration = Duration::from_millis(300);
const STATUS_PROBE_TIMEOUT: Duration = Duration::from_millis(400);
const DIFF_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);
const ERROR_HIDE_DELAY: Duration = Duration::from_secs(3);
const MAX_PROBES_PER_TICK: usize = 4;
const WARMUP_WINDOW: Duration = Duration::from_secs(5);
const STACKED_LAYOUT_BREAKPOINT: u16 = 90;

const HELP_SEEN_STARTED: u32 = 1 << 0;
const HELP_SEEN_ATTACH: u32 = 1 << 1;
const HELP_SEEN_CHECKOUT: u32 = 1 << 2;

#[derive(Debug, Clone, Default)]
pub struct Launch {
    pub program: String,
    pub auto_yes: bool,
    pub direct_mode: bool,
    pub direct_branch: String,
    pub event_log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum UiState {
    Default,
    NewInstanceNaming,
    Prompting,
    Help,
    Confirm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HelpKind {
    General,
    SessionStarted,
    BeforeAttach,
    BeforeCheckout,
}

impl HelpKind {
    // General help is always available; the contextual screens show once
    // per install and are remembered in AppState.
    pub(crate) fn seen_bit(self) -> Option<u32> {
        match self {
            Self::General => None,
            Self::SessionStarted => Some(HELP_SEEN_STARTED),
            Self::BeforeAttach => Some(HELP_SEEN_ATTACH),
            Self::BeforeCheckout => Some(HELP_SEEN_CHECKOUT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DismissAction {
    Attach,
    Pause { title: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct HelpScreen {
    pub(crate) kind: HelpKind,
    pub(crate) dismiss: Option<DismissAction>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConfirmAction {
    Kill { title: String },
    Push { title: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Confirm {
    pub(crate) message: String,
    pub(crate) action: ConfirmAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiffWatch {
    pub(crate) title: String,
    pub(crate) generation: u64,
    pub(crate) last_dirty: bool,
}

pub(crate) struct Home {
    program: String,
    auto_yes: bool,
    direct_mode: bool,
    direct_branch: String,
    storage: Storage,
    app_state: AppState,
    state: UiState,
    prompt_after_name: bool,
    list: SessionList,
    tabs: TabbedWindow,
    errbox: ErrBox,
    prompt_input: String,
    help: Option<HelpScreen>,
    confirm: Option<Confirm>,
    diff_watch: Option<DiffWatch>,
    watch_generation: u64,
    viewport_width: u16,
    viewport_height: u16,
    stacked: bool,
    animation_frame: usize,
    event_log: Box<dyn EventLogger>,
}

impl Home {
    pub(crate) fn new(
        launch: Launch,
        storage: Storage,
        event_log: Box<dyn EventLogger>,
    ) -> Result<Self, String> {
        let (instances, app_state) = storage.load_instances(event_log.as_ref())?;
        Ok(Self::from_parts(launch, storage, app_state, instances, event_log))
    }

    pub(crate) fn from_parts(
        launch: Launch,
        storage: Storage,
        app_state: AppState,
        instances: Vec<Instance>,
        event_log: Box<dyn EventLogger>,
    ) -> Self {
        let mut list = SessionList::new();
        for mut instance in instances {
            if launch.auto_yes {
                instance.auto_yes = true;
            }
            list.add_instance(instance);
        }

        Self {
            program: launch.program,
            auto_yes: launch.auto_yes,
            direct_mode: launch.direct_mode,
            direct_branch: launch.direct_branch,
            storage,
            app_state,
            state: UiState::Default,
            prompt_after_name: false,
            list,
            tabs: TabbedWindow::new(),
            errbox: ErrBox::new(),
            prompt_input: String::new(),
            help: None,
            confirm: None,
            diff_watch: None,
            watch_generation: 0,
            viewport_width: 0,
            viewport_height: 0,
            stacked: false,
            animation_frame: 0,
            event_log,
        }
    }

    pub(crate) fn handle_error(&mut self, message: String) -> Cmd<Msg> {
        self.event_log
            .log(LogEvent::warning("dashboard", message.clone()));
        self.errbox.set_error(message);
        commands::hide_error_cmd()
    }

    pub(crate) fn save_all(&mut self) -> Result<(), String> {
        self.storage
            .save_instances(self.list.instances(), &self.app_state)
    }

    fn new_instance_options(&self) -> InstanceOptions {
        InstanceOptions {
            title: String::new(),
            path: ".".to_string(),
            program: self.program.clone(),
            auto_yes: false,
            direct_mode: self.direct_mode,
            direct_branch: self.direct_branch.clone(),
            prompt: None,
        }
    }

    // Creates the provisional instance the naming state edits in place.
    pub(crate) fn begin_new_instance(&mut self, with_prompt: bool) -> Cmd<Msg> {
        if self.list.num_instances() >= GLOBAL_INSTANCE_LIMIT {
            return self.handle_error(format!(
                "you can't create more than {GLOBAL_INSTANCE_LIMIT} instances"
            ));
        }

        let instance = match Instance::new(self.new_instance_options()) {
            Ok(instance) => instance,
            Err(message) => return self.handle_error(message),
        };

        self.list.begin_instance(instance);
        self.list.set_selected(self.list.num_instances() - 1);
        self.state = UiState::NewInstanceNaming;
        self.prompt_after_name = with_prompt;
        Cmd::None
    }

    pub(crate) fn cancel_new_instance(&mut self) {
        if let Some(mut provisional) = self.list.take_provisional() {
            let _ = provisional.kill();
        }
        self.state = UiState::Default;
        self.prompt_after_name = false;
    }

    pub(crate) fn show_help(&mut self, kind: HelpKind, dismiss: Option<DismissAction>) -> Cmd<Msg> {
        if let Some(bit) = kind.seen_bit() {
            if self.app_state.has_seen(bit) {
                return self.run_dismiss_action(dismiss);
            }
            self.app_state.mark_seen(bit);
            if let Err(message) = self.save_all() {
                self.event_log
                    .log(LogEvent::warning("storage", message));
            }
        }

        self.help = Some(HelpScreen { kind, dismiss });
        self.state = UiState::Help;
        Cmd::None
    }

    pub(crate) fn dismiss_help(&mut self) -> Cmd<Msg> {
        let dismiss = self.help.take().and_then(|screen| screen.dismiss);
        self.state = UiState::Default;
        self.run_dismiss_action(dismiss)
    }

    fn run_dismiss_action(&mut self, dismiss: Option<DismissAction>) -> Cmd<Msg> {
        match dismiss {
            None => Cmd::None,
            Some(DismissAction::Attach) => self.attach_selected(),
            Some(DismissAction::Pause { title }) => {
                let result = match self.list.find_mut(&title) {
                    Some(instance) => instance.pause(),
                    None => return Cmd::None,
                };
                if let Err(message) = result {
                    return self.handle_error(message);
                }
                self.instance_changed()
            }
        }
    }

    fn attach_selected(&mut self) -> Cmd<Msg> {
        match self.list.attach_selected() {
            Ok(done) => {
                self.event_log.log(
                    LogEvent::new("attach", "attached").with_data(
                        "session",
                        serde_json::Value::from(
                            self.list
                                .selected()
                                .map(|instance| instance.title.clone())
                                .unwrap_or_default(),
                        ),
                    ),
                );
                commands::detach_wait_cmd(done)
            }
            Err(message) => self.handle_error(message),
        }
    }

    pub(crate) fn confirm_action(&mut self, message: String, action: ConfirmAction) {
        self.confirm = Some(Confirm { message, action });
        self.state = UiState::Confirm;
    }

    // Refreshes everything derived from the current selection and keeps
    // the diff watcher pinned to it.
    pub(crate) fn instance_changed(&mut self) -> Cmd<Msg> {
        let selected_stats = self
            .list
            .selected()
            .map(|instance| instance.get_diff_stats().clone());
        if let Some(stats) = selected_stats {
            self.tabs.set_diff(&stats);
        } else {
            self.tabs.set_diff(&crate::domain::DiffStats::default());
        }

        if !self.tabs.is_in_diff_tab() {
            self.diff_watch = None;
            return Cmd::None;
        }

        let Some((title, worktree)) = self.list.selected().and_then(|instance| {
            let worktree = instance.git_worktree().ok()?;
            Some((instance.title.clone(), worktree))
        }) else {
            self.diff_watch = None;
            return Cmd::None;
        };

        let mut cmds = vec![commands::diff_probe_cmd(title.clone(), Arc::clone(&worktree))];
        let needs_new_watch = self
            .diff_watch
            .as_ref()
            .is_none_or(|watch| watch.title != title);
        if needs_new_watch {
            self.watch_generation += 1;
            self.diff_watch = Some(DiffWatch {
                title,
                generation: self.watch_generation,
                last_dirty: false,
            });
            cmds.push(commands::diff_watch_cmd(self.watch_generation, worktree));
        }

        Cmd::batch(cmds)
    }

    // Probe eligibility: started and unpaused, and either selected,
    // auto-acknowledging, or inside the post-creation warmup window.
    pub(crate) fn probe_targets(&self, now: DateTime<Utc>) -> Vec<(String, Arc<TmuxSession>)> {
        let selected_index = self.list.selected_index();
        let mut targets = Vec::new();

        for (index, instance) in self.list.instances().iter().enumerate() {
            if targets.len() >= MAX_PROBES_PER_TICK {
                break;
            }
            if !instance.started() || instance.paused() {
                continue;
            }

            let warmup = now
                .signed_duration_since(instance.created_at)
                .to_std()
                .map(|age| age < WARMUP_WINDOW)
                .unwrap_or(true);
            if index != selected_index && !instance.auto_yes && !warmup {
                continue;
            }

            if let Some(tmux) = instance.tmux_session() {
                targets.push((instance.title.clone(), tmux));
            }
        }

        targets
    }
}

impl Model for Home {
    type Message = Msg;

    fn init(&mut self) -> Cmd<Self::Message> {
        Cmd::batch(vec![preview_tick_cmd(), metadata_tick_cmd()])
    }

    fn update(&mut self, msg: Msg) -> Cmd<Self::Message> {
        self.update_model(msg)
    }

    fn view(&self, frame: &mut Frame) {
        self.render_model(frame);
    }
}

pub fn run_dashboard(launch: Launch) -> std::io::Result<()> {
    let event_log: Box<dyn EventLogger> = match launch.event_log_path.as_ref() {
        Some(path) => Box::new(FileEventLogger::open(path)?),
        None => Box::new(NullEventLogger),
    };

    let storage = Storage::new().map_err(std::io::Error::other)?;
    let home = Home::new(launch, storage, event_log).map_err(std::io::Error::other)?;

    App::new(home)
        .screen_mode(ScreenMode::AltScreen)
        .with_mouse()
        .run()
}
