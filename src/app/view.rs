use ftui::core::geometry::Rect;
use ftui::layout::{Constraint, Flex};
use ftui::render::frame::Frame;
use ftui::text::{Line as FtLine, Span as FtSpan, Text as FtText};
use ftui::widgets::Widget;
use ftui::widgets::block::Block;
use ftui::widgets::borders::Borders;
use ftui::widgets::paragraph::Paragraph;
use ftui::{PackedRgba, Style};
use ftui_extras::text_effects::{ColorGradient, StyledText, TextEffect};

use crate::domain::Status;
use crate::session::Instance;
use crate::ui::tabs::{DiffLineKind, TAB_LABELS, diff_line_kind};

use super::{
    GLOBAL_INSTANCE_LIMIT, HelpKind, Home, PREVIEW_TICK_INTERVAL, STACKED_LAYOUT_BREAKPOINT,
    UiState,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Layout {
    pub(super) list: Rect,
    pub(super) tabs: Rect,
    pub(super) menu: Rect,
    pub(super) err: Rect,
}

// One breakpoint: narrow terminals stack the list above the tab pane,
// wide ones split 30/70 side by side.
pub(super) fn layout_for(width: u16, height: u16) -> Layout {
    let area = Rect::from_size(width, height);
    let rows = Flex::vertical()
        .constraints([Constraint::Fill, Constraint::Fixed(1), Constraint::Fixed(1)])
        .split(area);
    let content = rows[0];

    if width < STACKED_LAYOUT_BREAKPOINT {
        let list_height =
            u16::try_from((u32::from(content.height) * 35) / 100).unwrap_or(content.height);
        let panes = Flex::vertical()
            .constraints([Constraint::Fixed(list_height.max(3)), Constraint::Fill])
            .split(content);
        return Layout {
            list: panes[0],
            tabs: panes[1],
            menu: rows[1],
            err: rows[2],
        };
    }

    let list_width = u16::try_from((u32::from(content.width) * 30) / 100).unwrap_or(content.width);
    let panes = Flex::horizontal()
        .constraints([Constraint::Fixed(list_width), Constraint::Fill])
        .split(content);
    Layout {
        list: panes[0],
        tabs: panes[1],
        menu: rows[1],
        err: rows[2],
    }
}

#[derive(Debug, Clone, Copy)]
struct UiTheme {
    text: PackedRgba,
    dim: PackedRgba,
    accent: PackedRgba,
    running: PackedRgba,
    paused: PackedRgba,
    danger: PackedRgba,
    surface: PackedRgba,
    teal: PackedRgba,
}

fn ui_theme() -> UiTheme {
    UiTheme {
        text: PackedRgba::rgb(205, 214, 244),
        dim: PackedRgba::rgb(127, 132, 156),
        accent: PackedRgba::rgb(137, 180, 250),
        running: PackedRgba::rgb(166, 227, 161),
        paused: PackedRgba::rgb(249, 226, 175),
        danger: PackedRgba::rgb(243, 139, 168),
        surface: PackedRgba::rgb(49, 50, 68),
        teal: PackedRgba::rgb(148, 226, 213),
    }
}

fn diff_line_style(theme: &UiTheme, line: &str) -> Style {
    match diff_line_kind(line) {
        DiffLineKind::Hunk => Style::new().fg(theme.teal),
        DiffLineKind::Addition => Style::new().fg(theme.running),
        DiffLineKind::Deletion => Style::new().fg(theme.danger),
        DiffLineKind::Context => Style::new().fg(theme.text),
    }
}

fn status_color(theme: &UiTheme, status: Status) -> PackedRgba {
    match status {
        Status::Running => theme.running,
        Status::Ready => theme.accent,
        Status::Loading => theme.dim,
        Status::Paused => theme.paused,
    }
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect::new(
        area.x + (area.width - width) / 2,
        area.y + (area.height - height) / 2,
        width,
        height,
    )
}

fn pad_line(value: &str, width: usize) -> String {
    let mut out: String = value.chars().take(width).collect();
    while out.chars().count() < width {
        out.push(' ');
    }
    out
}

impl Home {
    pub(super) fn render_model(&self, frame: &mut Frame) {
        let layout = layout_for(frame.width().max(1), frame.height().max(1));

        self.render_list_pane(frame, layout.list);
        self.render_tab_pane(frame, layout.tabs);
        self.render_menu(frame, layout.menu);
        self.render_errbox(frame, layout.err);

        match self.state {
            UiState::Default => {}
            UiState::NewInstanceNaming => self.render_naming_overlay(frame),
            UiState::Prompting => self.render_prompting_overlay(frame),
            UiState::Help => self.render_help_overlay(frame),
            UiState::Confirm => self.render_confirm_overlay(frame),
        }
    }

    fn render_list_pane(&self, frame: &mut Frame, area: Rect) {
        if area.is_empty() {
            return;
        }

        let theme = ui_theme();
        let block = Block::new()
            .borders(Borders::ALL)
            .border_style(Style::new().fg(theme.surface));
        let inner = block.inner(area);
        block.render(area, frame);
        if inner.is_empty() {
            return;
        }

        let width = usize::from(inner.width);
        let mut lines: Vec<FtLine> = vec![
            FtLine::raw(""),
            FtLine::from_spans(vec![FtSpan::styled(
                pad_line(
                    &format!(" {}/{GLOBAL_INSTANCE_LIMIT} sessions", self.list.num_instances()),
                    width,
                ),
                Style::new().fg(theme.dim),
            )]),
            FtLine::raw(""),
            FtLine::raw(""),
        ];

        for (index, instance) in self.list.instances().iter().enumerate() {
            let selected = index == self.list.selected_index();
            lines.extend(session_row_lines(&theme, instance, index, selected, width));
            if lines.len() >= usize::from(inner.height) {
                break;
            }
        }
        lines.truncate(usize::from(inner.height));

        Paragraph::new(FtText::from_lines(lines)).render(inner, frame);

        // Animated app title over the first inner row.
        let title_area = Rect::new(inner.x, inner.y, inner.width, 1);
        StyledText::new(" Claude Squad")
            .bold()
            .base_color(theme.accent)
            .effect(TextEffect::AnimatedGradient {
                gradient: ColorGradient::new(vec![
                    (0.0, theme.accent),
                    (0.5, theme.text),
                    (1.0, theme.accent),
                ]),
                speed: 0.6,
            })
            .time(self.animation_frame as f64 * PREVIEW_TICK_INTERVAL.as_secs_f64())
            .render(title_area, frame);
    }

    fn render_tab_pane(&self, frame: &mut Frame, area: Rect) {
        if area.is_empty() {
            return;
        }

        let theme = ui_theme();
        let mut tab_spans: Vec<FtSpan> = Vec::new();
        for (index, label) in TAB_LABELS.iter().enumerate() {
            let style = if index == self.tabs.active_tab().index() {
                Style::new().fg(theme.text).bg(theme.surface).bold()
            } else {
                Style::new().fg(theme.dim)
            };
            tab_spans.push(FtSpan::styled((*label).to_string(), style));
        }

        let width = usize::from(area.width);
        let mut lines: Vec<FtLine> = vec![
            FtLine::from_spans(tab_spans),
            FtLine::from_spans(vec![FtSpan::styled(
                "─".repeat(width),
                Style::new().fg(theme.surface),
            )]),
        ];

        // The diff tab colors hunk headers, additions and deletions; the
        // preview tab shows captured pane text untouched.
        let in_diff_tab = self.tabs.is_in_diff_tab();
        for content_line in self.tabs.visible_lines() {
            if in_diff_tab {
                lines.push(FtLine::from_spans(vec![FtSpan::styled(
                    content_line.to_string(),
                    diff_line_style(&theme, content_line),
                )]));
            } else {
                lines.push(FtLine::raw(content_line.to_string()));
            }
        }

        let content_rows = usize::from(area.height).saturating_sub(1);
        while lines.len() < content_rows {
            lines.push(FtLine::raw(""));
        }
        lines.truncate(content_rows);
        lines.push(self.tab_footer_line(&theme, width));

        Paragraph::new(FtText::from_lines(lines)).render(area, frame);
    }

    fn tab_footer_line(&self, theme: &UiTheme, width: usize) -> FtLine {
        let stats = self.tabs.diff_stats();
        if let Some(error) = stats.error.as_deref() {
            return FtLine::from_spans(vec![FtSpan::styled(
                pad_line(&format!(" diff error: {error}"), width),
                Style::new().fg(theme.danger),
            )]);
        }
        if stats.is_empty() {
            return FtLine::from_spans(vec![FtSpan::styled(
                pad_line(" no changes", width),
                Style::new().fg(theme.dim),
            )]);
        }

        let additions = format!(" {} additions(+)", stats.added);
        let deletions = format!(" {} deletions(-)", stats.removed);
        let used = additions.chars().count() + deletions.chars().count();
        FtLine::from_spans(vec![
            FtSpan::styled(additions, Style::new().fg(theme.running)),
            FtSpan::styled(deletions, Style::new().fg(theme.danger)),
            FtSpan::styled(
                " ".repeat(width.saturating_sub(used)),
                Style::new().fg(theme.dim),
            ),
        ])
    }

    fn render_menu(&self, frame: &mut Frame, area: Rect) {
        if area.is_empty() {
            return;
        }

        let theme = ui_theme();
        let hints = match self.state {
            UiState::Default => {
                "n new · N new+prompt · D kill · p push · c checkout · r resume · ↵ attach · tab switch · q quit · ? help"
            }
            UiState::NewInstanceNaming => "type a title · enter submit · esc cancel",
            UiState::Prompting => "type a prompt · enter send · esc cancel",
            UiState::Help => "press any key to continue",
            UiState::Confirm => "y confirm · n cancel",
        };

        let line = FtLine::from_spans(vec![FtSpan::styled(
            pad_line(hints, usize::from(area.width)),
            Style::new().fg(theme.dim),
        )]);
        Paragraph::new(FtText::from_line(line)).render(area, frame);
    }

    fn render_errbox(&self, frame: &mut Frame, area: Rect) {
        if area.is_empty() || self.errbox.is_empty() {
            return;
        }

        let theme = ui_theme();
        let line = FtLine::from_spans(vec![FtSpan::styled(
            pad_line(&self.errbox.line(), usize::from(area.width)),
            Style::new().fg(theme.danger),
        )]);
        Paragraph::new(FtText::from_line(line)).render(area, frame);
    }

    fn render_overlay_box(&self, frame: &mut Frame, title: &str, body: Vec<(String, Style)>) {
        let area = Rect::from_size(frame.width(), frame.height());
        let height = u16::try_from(body.len() + 2).unwrap_or(u16::MAX);
        let overlay = centered_rect(area, area.width.saturating_sub(4).min(60), height);
        if overlay.is_empty() {
            return;
        }

        let theme = ui_theme();
        let block = Block::new()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::new().fg(theme.accent));
        let inner = block.inner(overlay);
        block.render(overlay, frame);
        if inner.is_empty() {
            return;
        }

        let width = usize::from(inner.width);
        let padded: Vec<FtLine> = body
            .into_iter()
            .map(|(text, style)| {
                FtLine::from_spans(vec![FtSpan::styled(pad_line(&text, width), style)])
            })
            .collect();
        Paragraph::new(FtText::from_lines(padded)).render(inner, frame);
    }

    fn render_naming_overlay(&self, frame: &mut Frame) {
        let theme = ui_theme();
        let title = self
            .list
            .instances()
            .last()
            .map(|instance| instance.title.clone())
            .unwrap_or_default();
        self.render_overlay_box(
            frame,
            "New session",
            vec![
                ("Session title:".to_string(), Style::new().fg(theme.dim)),
                (format!("> {title}█"), Style::new().fg(theme.text)),
            ],
        );
    }

    fn render_prompting_overlay(&self, frame: &mut Frame) {
        let theme = ui_theme();
        let target = self
            .list
            .selected()
            .map(|instance| instance.title.clone())
            .unwrap_or_default();
        self.render_overlay_box(
            frame,
            "Prompt",
            vec![
                (
                    format!("Prompt for '{target}':"),
                    Style::new().fg(theme.dim),
                ),
                (
                    format!("> {}█", self.prompt_input),
                    Style::new().fg(theme.text),
                ),
            ],
        );
    }

    fn render_help_overlay(&self, frame: &mut Frame) {
        let theme = ui_theme();
        let kind = self
            .help
            .as_ref()
            .map(|screen| screen.kind)
            .unwrap_or(HelpKind::General);
        let body: Vec<(String, Style)> = help_text(kind)
            .into_iter()
            .map(|line| (line.to_string(), Style::new().fg(theme.text)))
            .collect();
        self.render_overlay_box(frame, "Help", body);
    }

    fn render_confirm_overlay(&self, frame: &mut Frame) {
        let theme = ui_theme();
        let message = self
            .confirm
            .as_ref()
            .map(|confirm| confirm.message.clone())
            .unwrap_or_default();
        self.render_overlay_box(
            frame,
            "Confirm",
            vec![
                (message, Style::new().fg(theme.text)),
                ("(y)es / (n)o".to_string(), Style::new().fg(theme.dim)),
            ],
        );
    }
}

fn session_row_lines(
    theme: &UiTheme,
    instance: &Instance,
    index: usize,
    selected: bool,
    width: usize,
) -> Vec<FtLine> {
    let marker = instance.status.marker();
    let ordinal = if index == 9 { 0 } else { index + 1 };
    let title_style = if selected {
        Style::new().fg(theme.text).bg(theme.surface).bold()
    } else {
        Style::new().fg(theme.text)
    };

    let stats = instance.get_diff_stats();
    let detail = if instance.paused() {
        format!("{} · resume with r", instance.status.label())
    } else if stats.is_empty() {
        format!("{} · no changes", instance.status.label())
    } else {
        format!(
            "{} · +{} -{}",
            instance.status.label(),
            stats.added,
            stats.removed
        )
    };

    vec![
        FtLine::from_spans(vec![
            FtSpan::styled(
                pad_line(&format!(" {ordinal}. "), 5),
                Style::new().fg(theme.dim),
            ),
            FtSpan::styled(
                format!("{marker} "),
                Style::new().fg(status_color(theme, instance.status)),
            ),
            FtSpan::styled(
                pad_line(&instance.title, width.saturating_sub(7)),
                title_style,
            ),
        ]),
        FtLine::from_spans(vec![FtSpan::styled(
            pad_line(&format!("     {}", instance.branch), width),
            Style::new().fg(theme.dim),
        )]),
        FtLine::from_spans(vec![FtSpan::styled(
            pad_line(&format!("     {detail}"), width),
            Style::new().fg(theme.dim),
        )]),
        FtLine::raw(""),
    ]
}

fn help_text(kind: HelpKind) -> Vec<&'static str> {
    match kind {
        HelpKind::General => vec![
            "n      create a new session",
            "N      create a session and send a prompt",
            "enter  attach to the selected session",
            "tab    switch between preview and diff",
            "D      kill the selected session",
            "p      push the session branch",
            "c      checkout: pause and free the worktree",
            "r      resume a paused session",
            "1-9,0  select a session by number",
            "q      quit",
        ],
        HelpKind::SessionStarted => vec![
            "The session is running in a detached tmux pane.",
            "",
            "The list shows its live status; press enter to",
            "attach, tab to inspect its diff against the base",
            "commit, and p to push the branch when it is ready.",
        ],
        HelpKind::BeforeAttach => vec![
            "You are about to attach to the session's tmux pane.",
            "",
            "Detach with ctrl-b d to return to the dashboard;",
            "the assistant keeps running while detached.",
        ],
        HelpKind::BeforeCheckout => vec![
            "Checkout pauses the session: the pane is closed and",
            "the worktree is removed, but the branch is kept so",
            "you can check it out in your own repository.",
            "",
            "Resume the session later with r.",
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::{STACKED_LAYOUT_BREAKPOINT, layout_for};
    use crate::ui::list::LIST_CONTENT_START;

    #[test]
    fn wide_layout_splits_side_by_side() {
        let layout = layout_for(120, 40);
        assert_eq!(layout.list.width, 36); // 30% of 120
        assert_eq!(layout.tabs.width, 84);
        assert_eq!(layout.list.height, layout.tabs.height);
        assert_eq!(layout.menu.height, 1);
        assert_eq!(layout.err.height, 1);
    }

    #[test]
    fn narrow_layout_stacks_list_above_tabs() {
        let layout = layout_for(STACKED_LAYOUT_BREAKPOINT - 1, 40);
        assert_eq!(layout.list.width, layout.tabs.width);
        assert_eq!(layout.list.height, 13); // 35% of 38 content rows
        assert!(layout.tabs.y > layout.list.y);
    }

    #[test]
    fn stacked_list_keeps_a_minimum_height() {
        let layout = layout_for(40, 8);
        assert!(layout.list.height >= 3);
    }

    #[test]
    fn list_rows_leave_room_for_the_header_block() {
        // Border row plus four header lines puts the first session row
        // at the hit-test content start.
        assert_eq!(LIST_CONTENT_START, 5);
    }
}
