use std::sync::mpsc;

use crate::session::Instance;

// Row geometry shared with the renderer: rows start after the list
// header block and each entry occupies a fixed number of lines.
pub const LIST_CONTENT_START: u16 = 5;
pub const LIST_ROW_LINES: u16 = 4;

pub struct SessionList {
    items: Vec<Instance>,
    selected: usize,
    provisional: bool,
}

impl SessionList {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            selected: 0,
            provisional: false,
        }
    }

    pub fn instances(&self) -> &[Instance] {
        &self.items
    }

    pub fn instances_mut(&mut self) -> &mut [Instance] {
        &mut self.items
    }

    pub fn num_instances(&self) -> usize {
        self.items.len()
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&Instance> {
        self.items.get(self.selected)
    }

    pub fn selected_mut(&mut self) -> Option<&mut Instance> {
        self.items.get_mut(self.selected)
    }

    pub fn find(&self, title: &str) -> Option<&Instance> {
        self.items.iter().find(|instance| instance.title == title)
    }

    pub fn find_mut(&mut self, title: &str) -> Option<&mut Instance> {
        self.items
            .iter_mut()
            .find(|instance| instance.title == title)
    }

    pub fn add_instance(&mut self, instance: Instance) {
        self.items.push(instance);
    }

    // A provisional instance exists while the operator is still typing
    // its title; it either gets finalized on Enter or killed on Escape.
    pub fn begin_instance(&mut self, instance: Instance) {
        self.items.push(instance);
        self.provisional = true;
    }

    pub fn has_provisional(&self) -> bool {
        self.provisional
    }

    // Finalization happens exactly once per successful create; calling
    // it with nothing provisional is a checked no-op.
    pub fn finalize_instance(&mut self) {
        self.provisional = false;
    }

    pub fn take_provisional(&mut self) -> Option<Instance> {
        if !self.provisional {
            return None;
        }
        self.provisional = false;
        let instance = self.items.pop();
        self.clamp_selection();
        instance
    }

    pub fn up(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
        }
    }

    pub fn down(&mut self) {
        let last = self.items.len().saturating_sub(1);
        if self.selected < last {
            self.selected += 1;
        }
    }

    pub fn set_selected(&mut self, index: usize) {
        if self.items.is_empty() {
            return;
        }
        self.selected = index.min(self.items.len() - 1);
    }

    fn clamp_selection(&mut self) {
        if self.items.is_empty() {
            self.selected = 0;
            return;
        }
        self.selected = self.selected.min(self.items.len() - 1);
    }

    pub fn hit_test(&self, y: u16) -> Option<usize> {
        if y < LIST_CONTENT_START {
            return None;
        }
        let index = usize::from((y - LIST_CONTENT_START) / LIST_ROW_LINES);
        if index >= self.items.len() {
            return None;
        }
        Some(index)
    }

    pub fn remove_selected(&mut self) -> Option<Instance> {
        if self.items.is_empty() {
            return None;
        }
        let removed = self.items.remove(self.selected);
        self.clamp_selection();
        Some(removed)
    }

    pub fn attach_selected(&mut self) -> Result<mpsc::Receiver<()>, String> {
        let Some(instance) = self.selected() else {
            return Err("no session selected".to_string());
        };
        instance.attach()
    }
}

impl Default for SessionList {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use crate::session::{Instance, InstanceOptions};

    use super::{LIST_CONTENT_START, LIST_ROW_LINES, SessionList};

    fn instance(title: &str) -> Instance {
        Instance::new(InstanceOptions {
            title: title.to_string(),
            path: ".".to_string(),
            program: "claude".to_string(),
            ..InstanceOptions::default()
        })
        .expect("instance should be valid")
    }

    fn list_with(count: usize) -> SessionList {
        let mut list = SessionList::new();
        for index in 0..count {
            list.add_instance(instance(&format!("session-{index}")));
        }
        list
    }

    #[test]
    fn hit_test_maps_rows_and_rejects_header() {
        let list = list_with(5);

        assert_eq!(list.hit_test(0), None);
        assert_eq!(list.hit_test(LIST_CONTENT_START - 1), None);
        assert_eq!(list.hit_test(LIST_CONTENT_START), Some(0));
        assert_eq!(list.hit_test(LIST_CONTENT_START + LIST_ROW_LINES), Some(1));
        assert_eq!(
            list.hit_test(LIST_CONTENT_START + 2 * LIST_ROW_LINES),
            Some(2)
        );
        // Below the last populated row nothing is selectable.
        assert_eq!(
            list.hit_test(LIST_CONTENT_START + 9 * LIST_ROW_LINES),
            None
        );
    }

    #[test]
    fn selection_clamps_at_both_ends() {
        let mut list = list_with(3);

        list.up();
        assert_eq!(list.selected_index(), 0);

        list.down();
        list.down();
        list.down();
        list.down();
        assert_eq!(list.selected_index(), 2);

        list.set_selected(99);
        assert_eq!(list.selected_index(), 2);
    }

    #[test]
    fn set_selected_on_empty_list_is_a_no_op() {
        let mut list = SessionList::new();
        list.set_selected(3);
        assert_eq!(list.selected_index(), 0);
        assert!(list.selected().is_none());
    }

    #[test]
    fn provisional_instances_can_be_taken_back() {
        let mut list = list_with(1);
        list.begin_instance(instance("draft"));
        list.set_selected(1);
        assert!(list.has_provisional());

        let taken = list.take_provisional().expect("draft should be returned");
        assert_eq!(taken.title, "draft");
        assert!(!list.has_provisional());
        assert_eq!(list.num_instances(), 1);
        assert_eq!(list.selected_index(), 0);

        // Nothing provisional left; a second take is a no-op.
        assert!(list.take_provisional().is_none());
        assert_eq!(list.num_instances(), 1);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut list = list_with(0);
        list.begin_instance(instance("keeper"));
        list.finalize_instance();
        list.finalize_instance();

        assert!(!list.has_provisional());
        assert!(list.take_provisional().is_none());
        assert_eq!(list.num_instances(), 1);
    }

    #[test]
    fn remove_selected_clamps_cursor() {
        let mut list = list_with(2);
        list.set_selected(1);

        let removed = list.remove_selected().expect("remove should succeed");
        assert_eq!(removed.title, "session-1");
        assert_eq!(list.selected_index(), 0);
        assert_eq!(list.num_instances(), 1);
    }
}
