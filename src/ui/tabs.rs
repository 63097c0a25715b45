use crate::domain::DiffStats;

pub const TAB_LABELS: [&str; 2] = [" Preview ", " Diff "];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Tab {
    #[default]
    Preview,
    Diff,
}

impl Tab {
    pub const fn index(self) -> usize {
        match self {
            Self::Preview => 0,
            Self::Diff => 1,
        }
    }
}

// Scroll and navigation state for the right-hand pane. Content is kept
// as plain text; the renderer slices the visible window out of it.
pub struct TabbedWindow {
    active: Tab,
    preview_text: String,
    diff_stats: DiffStats,
    diff_lines: Vec<String>,
    hunk_starts: Vec<usize>,
    file_starts: Vec<usize>,
    preview_scroll: usize,
    diff_scroll: usize,
    width: u16,
    height: u16,
}

impl TabbedWindow {
    pub fn new() -> Self {
        Self {
            active: Tab::Preview,
            preview_text: String::new(),
            diff_stats: DiffStats::default(),
            diff_lines: Vec::new(),
            hunk_starts: Vec::new(),
            file_starts: Vec::new(),
            preview_scroll: 0,
            diff_scroll: 0,
            width: 0,
            height: 0,
        }
    }

    pub fn set_size(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
    }

    pub fn size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    // Rows available for content below the tab bar.
    pub fn content_height(&self) -> usize {
        usize::from(self.height.saturating_sub(3))
    }

    pub fn active_tab(&self) -> Tab {
        self.active
    }

    pub fn is_in_diff_tab(&self) -> bool {
        self.active == Tab::Diff
    }

    pub fn toggle(&mut self) {
        self.active = match self.active {
            Tab::Preview => Tab::Diff,
            Tab::Diff => Tab::Preview,
        };
    }

    pub fn set_active(&mut self, tab: Tab) {
        self.active = tab;
    }

    // Tab labels sit on the first row of the window.
    pub fn hit_test_tab(&self, x: u16, y: u16) -> Option<Tab> {
        if y != 0 {
            return None;
        }
        let x = usize::from(x);
        let preview_end = TAB_LABELS[0].chars().count();
        let diff_end = preview_end + TAB_LABELS[1].chars().count();
        if x < preview_end {
            return Some(Tab::Preview);
        }
        if x < diff_end {
            return Some(Tab::Diff);
        }
        None
    }

    pub fn set_preview(&mut self, text: String) {
        self.preview_text = text;
        let total = self.preview_text.lines().count();
        self.preview_scroll = total.saturating_sub(self.content_height());
    }

    pub fn preview_text(&self) -> &str {
        &self.preview_text
    }

    pub fn set_diff(&mut self, stats: &DiffStats) {
        self.diff_lines = stats.content.lines().map(str::to_string).collect();
        self.hunk_starts = positions_of(&self.diff_lines, "@@");
        self.file_starts = positions_of(&self.diff_lines, "diff --git");
        self.diff_stats = stats.clone();
        self.diff_scroll = self.diff_scroll.min(self.max_scroll());
    }

    pub fn diff_stats(&self) -> &DiffStats {
        &self.diff_stats
    }

    pub fn scroll_offset(&self) -> usize {
        match self.active {
            Tab::Preview => self.preview_scroll,
            Tab::Diff => self.diff_scroll,
        }
    }

    pub fn visible_lines(&self) -> Vec<&str> {
        let height = self.content_height();
        match self.active {
            Tab::Preview => self
                .preview_text
                .lines()
                .skip(self.preview_scroll)
                .take(height)
                .collect(),
            Tab::Diff => self
                .diff_lines
                .iter()
                .skip(self.diff_scroll)
                .take(height)
                .map(String::as_str)
                .collect(),
        }
    }

    fn total_lines(&self) -> usize {
        match self.active {
            Tab::Preview => self.preview_text.lines().count(),
            Tab::Diff => self.diff_lines.len(),
        }
    }

    fn max_scroll(&self) -> usize {
        self.total_lines().saturating_sub(self.content_height())
    }

    fn scroll_to(&mut self, offset: usize) {
        let clamped = offset.min(self.max_scroll());
        match self.active {
            Tab::Preview => self.preview_scroll = clamped,
            Tab::Diff => self.diff_scroll = clamped,
        }
    }

    pub fn scroll_up(&mut self) {
        self.scroll_to(self.scroll_offset().saturating_sub(1));
    }

    pub fn scroll_down(&mut self) {
        self.scroll_to(self.scroll_offset() + 1);
    }

    pub fn page_up(&mut self) {
        self.scroll_to(self.scroll_offset().saturating_sub(self.content_height()));
    }

    pub fn page_down(&mut self) {
        self.scroll_to(self.scroll_offset() + self.content_height());
    }

    pub fn half_page_up(&mut self) {
        self.scroll_to(
            self.scroll_offset()
                .saturating_sub(self.content_height() / 2),
        );
    }

    pub fn half_page_down(&mut self) {
        self.scroll_to(self.scroll_offset() + self.content_height() / 2);
    }

    pub fn goto_top(&mut self) {
        self.scroll_to(0);
    }

    pub fn goto_bottom(&mut self) {
        self.scroll_to(self.max_scroll());
    }

    pub fn jump_next_hunk(&mut self) {
        self.jump_forward_to(&self.hunk_starts.clone());
    }

    pub fn jump_prev_hunk(&mut self) {
        self.jump_backward_to(&self.hunk_starts.clone());
    }

    pub fn jump_next_file(&mut self) {
        self.jump_forward_to(&self.file_starts.clone());
    }

    pub fn jump_prev_file(&mut self) {
        self.jump_backward_to(&self.file_starts.clone());
    }

    fn jump_forward_to(&mut self, starts: &[usize]) {
        if self.active != Tab::Diff {
            return;
        }
        if let Some(next) = starts.iter().find(|line| **line > self.diff_scroll) {
            self.scroll_to(*next);
        }
    }

    fn jump_backward_to(&mut self, starts: &[usize]) {
        if self.active != Tab::Diff {
            return;
        }
        if let Some(previous) = starts
            .iter()
            .rev()
            .find(|line| **line < self.diff_scroll)
        {
            self.scroll_to(*previous);
        }
    }
}

impl Default for TabbedWindow {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    Hunk,
    Addition,
    Deletion,
    Context,
}

// Classifies a diff line for rendering: hunk headers, then real
// additions and deletions. The `+++`/`---` file headers count as
// context, not as changes.
pub fn diff_line_kind(line: &str) -> DiffLineKind {
    if line.starts_with("@@") {
        return DiffLineKind::Hunk;
    }

    let bytes = line.as_bytes();
    if bytes.first() == Some(&b'+') && bytes.get(1) != Some(&b'+') {
        return DiffLineKind::Addition;
    }
    if bytes.first() == Some(&b'-') && bytes.get(1) != Some(&b'-') {
        return DiffLineKind::Deletion;
    }

    DiffLineKind::Context
}

fn positions_of(lines: &[String], prefix: &str) -> Vec<usize> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.starts_with(prefix))
        .map(|(index, _)| index)
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::domain::DiffStats;

    use super::{DiffLineKind, Tab, TabbedWindow, diff_line_kind};

    fn sample_diff() -> DiffStats {
        let content = "diff --git a/one.rs b/one.rs\n--- a/one.rs\n+++ b/one.rs\n@@ -1,2 +1,3 @@\n line\n+added\n@@ -9,2 +10,2 @@\n other\n-gone\ndiff --git a/two.rs b/two.rs\n--- a/two.rs\n+++ b/two.rs\n@@ -1 +1 @@\n-x\n+y\n";
        DiffStats {
            added: 2,
            removed: 2,
            content: content.to_string(),
            error: None,
        }
    }

    fn window() -> TabbedWindow {
        let mut window = TabbedWindow::new();
        window.set_size(80, 8);
        window.set_active(Tab::Diff);
        window.set_diff(&sample_diff());
        window
    }

    #[test]
    fn toggle_flips_between_preview_and_diff() {
        let mut window = TabbedWindow::new();
        assert_eq!(window.active_tab(), Tab::Preview);
        window.toggle();
        assert!(window.is_in_diff_tab());
        window.toggle();
        assert_eq!(window.active_tab(), Tab::Preview);
    }

    #[test]
    fn hunk_jumps_move_between_hunk_headers() {
        let mut window = window();
        assert_eq!(window.scroll_offset(), 0);

        window.jump_next_hunk();
        assert_eq!(window.scroll_offset(), 3);
        window.jump_next_hunk();
        assert_eq!(window.scroll_offset(), 6);
        window.jump_prev_hunk();
        assert_eq!(window.scroll_offset(), 3);
    }

    #[test]
    fn file_jumps_move_between_file_headers() {
        let mut window = window();
        window.jump_next_file();
        assert_eq!(window.scroll_offset(), 9);
        window.jump_prev_file();
        assert_eq!(window.scroll_offset(), 0);
    }

    #[test]
    fn scrolling_clamps_to_content() {
        let mut window = window();
        window.goto_bottom();
        let bottom = window.scroll_offset();
        window.scroll_down();
        assert_eq!(window.scroll_offset(), bottom);

        window.goto_top();
        window.scroll_up();
        assert_eq!(window.scroll_offset(), 0);
    }

    #[test]
    fn preview_pins_to_bottom_on_update() {
        let mut window = TabbedWindow::new();
        window.set_size(80, 8);
        let text: String = (0..20).map(|index| format!("line {index}\n")).collect();
        window.set_preview(text);

        // 20 lines, 5 visible: offset lands on 15.
        assert_eq!(window.scroll_offset(), 15);
        assert_eq!(window.visible_lines().len(), 5);
        assert_eq!(window.visible_lines()[0], "line 15");
        assert!(window.preview_text().starts_with("line 0"));
    }

    #[test]
    fn diff_lines_classify_hunks_changes_and_headers() {
        let input = [
            ("diff --git a/file.txt b/file.txt", DiffLineKind::Context),
            ("index 1111111..2222222 100644", DiffLineKind::Context),
            ("--- a/file.txt", DiffLineKind::Context),
            ("+++ b/file.txt", DiffLineKind::Context),
            ("@@ -1,3 +1,4 @@", DiffLineKind::Hunk),
            (" line unchanged", DiffLineKind::Context),
            ("+added line", DiffLineKind::Addition),
            ("-removed line", DiffLineKind::Deletion),
            ("", DiffLineKind::Context),
        ];

        for (line, expected) in input {
            assert_eq!(diff_line_kind(line), expected, "line: {line:?}");
        }

        // Bare markers with no text behind them still count as changes.
        assert_eq!(diff_line_kind("+"), DiffLineKind::Addition);
        assert_eq!(diff_line_kind("-"), DiffLineKind::Deletion);
    }

    #[test]
    fn tab_hit_test_resolves_labels() {
        let window = window();
        assert_eq!(window.hit_test_tab(1, 0), Some(Tab::Preview));
        assert_eq!(window.hit_test_tab(10, 0), Some(Tab::Diff));
        assert_eq!(window.hit_test_tab(30, 0), None);
        assert_eq!(window.hit_test_tab(1, 2), None);
    }
}
