use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Per-destination async locks so copies of one file run one after another
/// while different files proceed in parallel.
#[derive(Clone, Default)]
pub struct PathLocks {
    slots: Arc<Mutex<HashMap<PathBuf, Slot>>>,
}

/// Held for the duration of one decide-and-copy pipeline.
pub struct PathGuard {
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
    slots: Arc<Mutex<HashMap<PathBuf, Slot>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, path: &Path) -> PathGuard {
        let slot = {
            let mut slots = self.slots.lock();
            slots
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        let guard = slot.lock_owned().await;
        PathGuard {
            path: path.to_path_buf(),
            guard: Some(guard),
            slots: self.slots.clone(),
        }
    }

    /// Number of destinations with a pipeline running or queued.
    pub fn active(&self) -> usize {
        self.slots.lock().len()
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock();
        drop(self.guard.take());

        // The map holds one reference; any other means someone is still waiting
        if let Some(slot) = slots.get(&self.path) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.path);
            }
        }
    }
}
