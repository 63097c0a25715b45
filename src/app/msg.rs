use ftui::core::event::{Event, KeyEvent, MouseEvent};

use crate::domain::DiffStats;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Msg {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize { width: u16, height: u16 },
    PreviewTick,
    MetadataTick,
    StatusProbed(StatusProbeCompletion),
    DiffProbed(DiffProbeCompletion),
    DiffWatchTicked(DiffWatchTick),
    Detached,
    HideError,
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusProbeCompletion {
    pub(crate) title: String,
    pub(crate) updated: bool,
    pub(crate) prompt: bool,
    pub(crate) error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DiffProbeCompletion {
    pub(crate) title: String,
    pub(crate) stats: Option<DiffStats>,
    pub(crate) error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiffWatchTick {
    pub(crate) generation: u64,
    pub(crate) dirty: Result<bool, String>,
}

impl From<Event> for Msg {
    fn from(event: Event) -> Self {
        match event {
            Event::Key(key_event) => Self::Key(key_event),
            Event::Mouse(mouse_event) => Self::Mouse(mouse_event),
            Event::Resize { width, height } => Self::Resize { width, height },
            _ => Self::Noop,
        }
    }
}
