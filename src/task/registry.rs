use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct Entry {
    token: CancellationToken,
    generation: u64,
}

/// Process-wide set of tasks that are still allowed to report progress.
///
/// Every operation takes the lock once and releases it before returning, so
/// membership changes are totally ordered. Removing an entry cancels its
/// token, which is how the runner learns it should stop.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, Entry>>,
    next_generation: AtomicU64,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // membership is a plain map insert/remove, a poisoned lock still holds a consistent map
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `id` and returns a guard that removes it again when dropped.
    /// Registering an id that is already live cancels the older stream.
    pub fn register(self: &Arc<Self>, id: &str) -> RegistrationGuard {
        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let previous = self.lock().insert(
            id.to_string(),
            Entry { token: token.clone(), generation },
        );

        if let Some(previous) = previous {
            warn!(task_id = %id, "Task registered twice, cancelling the previous stream");
            previous.token.cancel();
        }
        info!(task_id = %id, "Task registered");

        RegistrationGuard {
            registry: Arc::clone(self),
            id: id.to_string(),
            generation,
            token,
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Removes `id` and cancels its token. Returns whether it was present;
    /// removing an absent id does nothing.
    pub fn deregister(&self, id: &str) -> bool {
        let removed = self.lock().remove(id);
        match removed {
            Some(entry) => {
                entry.token.cancel();
                info!(task_id = %id, "Task deregistered");
                true
            }
            None => {
                debug!(task_id = %id, "Task already deregistered");
                false
            }
        }
    }

    /// Removes `id` only if it still belongs to the given registration.
    fn release(&self, id: &str, generation: u64) -> bool {
        let removed = {
            let mut tasks = self.lock();
            match tasks.get(id) {
                Some(entry) if entry.generation == generation => tasks.remove(id),
                _ => None,
            }
        };
        match removed {
            Some(entry) => {
                entry.token.cancel();
                info!(task_id = %id, "Task deregistered");
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Live registration of one stream. Dropping it deregisters the task, so a
/// client that goes away mid-stream still cleans up.
pub struct RegistrationGuard {
    registry: Arc<TaskRegistry>,
    id: String,
    generation: u64,
    token: CancellationToken,
}

impl RegistrationGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_active(&self) -> bool {
        self.registry.is_active(&self.id)
    }

    /// Deregisters now. Returns `false` when a cancel request got there first.
    pub fn release(&self) -> bool {
        self.registry.release(&self.id, self.generation)
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry.release(&self.id, self.generation);
    }
}
