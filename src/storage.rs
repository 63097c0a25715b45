use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::Status;
use crate::event_log::{Event, EventLogger};
use crate::session::{Instance, InstanceData};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppState {
    #[serde(default)]
    pub help_screens_seen: u32,
}

impl AppState {
    pub fn has_seen(&self, screen_bit: u32) -> bool {
        self.help_screens_seen & screen_bit != 0
    }

    pub fn mark_seen(&mut self, screen_bit: u32) {
        self.help_screens_seen |= screen_bit;
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateFile {
    #[serde(default)]
    instances: Vec<InstanceData>,
    #[serde(default)]
    app_state: AppState,
}

pub struct Storage {
    state_path: PathBuf,
}

impl Storage {
    pub fn new() -> Result<Self, String> {
        let state_path =
            crate::config::state_path().ok_or_else(|| "cannot resolve state path".to_string())?;
        Ok(Self { state_path })
    }

    pub fn at_path(state_path: PathBuf) -> Self {
        Self { state_path }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    fn read_state(&self) -> Result<StateFile, String> {
        let raw = match fs::read_to_string(&self.state_path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StateFile::default());
            }
            Err(error) => return Err(format!("state read failed: {error}")),
        };

        serde_json::from_str(&raw).map_err(|error| format!("state parse failed: {error}"))
    }

    // Overwrites are atomic: encode to a sibling tmp file, then rename.
    fn write_state(&self, state: &StateFile) -> Result<(), String> {
        let Some(parent) = self.state_path.parent() else {
            return Err("state path missing parent directory".to_string());
        };
        fs::create_dir_all(parent)
            .map_err(|error| format!("state directory create failed: {error}"))?;

        let encoded = serde_json::to_string_pretty(state)
            .map_err(|error| format!("state encode failed: {error}"))?;
        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, encoded).map_err(|error| format!("state write failed: {error}"))?;
        fs::rename(&tmp_path, &self.state_path)
            .map_err(|error| format!("state rename failed: {error}"))
    }

    pub fn load_data(&self) -> Result<(Vec<InstanceData>, AppState), String> {
        let state = self.read_state()?;
        Ok((state.instances, state.app_state))
    }

    pub fn save_instances(
        &self,
        instances: &[Instance],
        app_state: &AppState,
    ) -> Result<(), String> {
        let state = StateFile {
            instances: instances.iter().map(Instance::to_data).collect(),
            app_state: *app_state,
        };
        self.write_state(&state)
    }

    pub fn delete_instance(&self, title: &str) -> Result<(), String> {
        let mut state = self.read_state()?;
        state.instances.retain(|instance| instance.title != title);
        self.write_state(&state)
    }

    // Rehydrates the saved set in order. Panes are re-bound where the
    // detached tmux session still exists; a vanished pane demotes the
    // entry to Paused so the operator can resume it.
    pub fn load_instances(
        &self,
        log: &dyn EventLogger,
    ) -> Result<(Vec<Instance>, AppState), String> {
        let (data, app_state) = self.load_data()?;
        let mut instances = Vec::with_capacity(data.len());

        for entry in data {
            let mut instance = Instance::from_data(entry);
            if instance.started() && !instance.paused() {
                if let Err(message) = instance.rebind_pane() {
                    log.log(
                        Event::warning("restore", "pane restore failed, marking paused")
                            .with_data("session", Value::from(instance.title.clone()))
                            .with_data("error", Value::from(message)),
                    );
                    instance.set_status(Status::Paused);
                }
            }
            instances.push(instance);
        }

        Ok((instances, app_state))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use crate::session::{Instance, InstanceOptions};

    use super::{AppState, Storage};

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
                "squad-storage-{label}-{}-{timestamp}",
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

    fn instance(title: &str) -> Instance {
        Instance::new(InstanceOptions {
            title: title.to_string(),
            path: ".".to_string(),
            program: "claude".to_string(),
            ..InstanceOptions::default()
        })
        .expect("instance should be valid")
    }

    #[test]
    fn missing_state_file_loads_empty_set() {
        let temp = TestDir::new("missing");
        let storage = Storage::at_path(temp.path.join("state.json"));

        let (instances, app_state) = storage.load_data().expect("load should succeed");
        assert!(instances.is_empty());
        assert_eq!(app_state, AppState::default());
    }

    #[test]
    fn save_and_load_round_trip_preserves_order() {
        let temp = TestDir::new("roundtrip");
        let storage = Storage::at_path(temp.path.join("state.json"));
        let instances = vec![instance("alpha"), instance("beta"), instance("gamma")];
        let mut app_state = AppState::default();
        app_state.mark_seen(0b10);

        storage
            .save_instances(&instances, &app_state)
            .expect("save should succeed");
        let (loaded, loaded_state) = storage.load_data().expect("load should succeed");

        let titles: Vec<&str> = loaded.iter().map(|entry| entry.title.as_str()).collect();
        assert_eq!(titles, vec!["alpha", "beta", "gamma"]);
        assert!(loaded_state.has_seen(0b10));
        assert!(!loaded_state.has_seen(0b1));

        // No tmp file left behind after the atomic rename.
        assert!(!temp.path.join("state.json.tmp").exists());
    }

    #[test]
    fn delete_instance_removes_single_entry() {
        let temp = TestDir::new("delete");
        let storage = Storage::at_path(temp.path.join("state.json"));
        let instances = vec![instance("keep"), instance("drop")];

        storage
            .save_instances(&instances, &AppState::default())
            .expect("save should succeed");
        storage
            .delete_instance("drop")
            .expect("delete should succeed");

        let (loaded, _) = storage.load_data().expect("load should succeed");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "keep");
    }

    #[test]
    fn vanished_pane_demotes_restored_session_to_paused() {
        use std::sync::Arc;

        use crate::domain::Status;
        use crate::event_log::NullEventLogger;
        use crate::workspace::GitWorktree;

        let temp = TestDir::new("restore");
        let storage = Storage::at_path(temp.path.join("state.json"));

        let mut started = instance("survivor");
        started.force_worktree(Arc::new(GitWorktree::new(&temp.path, "survivor", "survivor")));
        started.set_status(Status::Running);
        storage
            .save_instances(&[started], &AppState::default())
            .expect("save should succeed");

        // No tmux session named claudesquad_survivor exists, so the pane
        // rebind fails and the entry comes back needing resume.
        let (restored, _) = storage
            .load_instances(&NullEventLogger)
            .expect("load should succeed");
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].status, Status::Paused);
        assert!(restored[0].started());
    }

    #[test]
    fn overwrite_replaces_previous_contents() {
        let temp = TestDir::new("overwrite");
        let storage = Storage::at_path(temp.path.join("state.json"));

        storage
            .save_instances(&[instance("first")], &AppState::default())
            .expect("first save should succeed");
        storage
            .save_instances(&[instance("second")], &AppState::default())
            .expect("second save should succeed");

        let (loaded, _) = storage.load_data().expect("load should succeed");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].title, "second");
    }
}
