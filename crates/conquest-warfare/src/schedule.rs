//! Registry of cancellable delayed tasks.
//!
//! Each task is keyed by `(player, purpose)`; the purpose names the battle
//! it acts on. Scheduling a key that already
//! has a pending task aborts the old one. When a task's delay elapses it
//! claims its registry entry, but only if its generation still matches; a
//! task that was replaced or cancelled in the meantime does nothing.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::debug;

use conquest_types::{BattleId, PlayerId};

/// Why a task was scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskPurpose {
    /// Remove a participant who stayed outside the battle zone.
    Desertion(BattleId),
    /// Bring a dead participant back.
    Respawn(BattleId),
}

type TaskKey = (PlayerId, TaskPurpose);

#[derive(Debug)]
struct PendingTask {
    generation: u64,
    handle: AbortHandle,
}

type TaskTable = HashMap<TaskKey, PendingTask>;

fn lock(table: &Mutex<TaskTable>) -> MutexGuard<'_, TaskTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Delayed tasks keyed by `(player, purpose)`.
#[derive(Debug, Default)]
pub struct TaskScheduler {
    tasks: Arc<Mutex<TaskTable>>,
    next_generation: AtomicU64,
}

impl TaskScheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` after `delay`, replacing any pending task for the key.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, player: PlayerId, purpose: TaskPurpose, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let key = (player, purpose);
        let tasks = Arc::clone(&self.tasks);

        // Hold the table while spawning so the task cannot claim its entry
        // before the entry exists.
        let mut table = lock(&self.tasks);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let claimed = {
                let mut table = lock(&tasks);
                match table.get(&key) {
                    Some(pending) if pending.generation == generation => {
                        table.remove(&key);
                        true
                    }
                    _ => false,
                }
            };
            if claimed {
                work.await;
            }
        });

        let replaced = table.insert(
            key,
            PendingTask {
                generation,
                handle: handle.abort_handle(),
            },
        );
        if let Some(previous) = replaced {
            previous.handle.abort();
            debug!(%player, ?purpose, "replaced pending task");
        }
    }

    /// Cancel the pending task for the key. Returns whether one existed.
    pub fn cancel(&self, player: PlayerId, purpose: TaskPurpose) -> bool {
        let removed = lock(&self.tasks).remove(&(player, purpose));
        removed.map(|pending| pending.handle.abort()).is_some()
    }

    /// Cancel every pending task for `player`.
    pub fn cancel_all(&self, player: PlayerId) -> usize {
        self.cancel_matching(player, |_| true)
    }

    /// Cancel the pending tasks for `player` whose purpose matches.
    pub fn cancel_matching(
        &self,
        player: PlayerId,
        matches: impl Fn(TaskPurpose) -> bool,
    ) -> usize {
        let mut table = lock(&self.tasks);
        let keys: Vec<TaskKey> = table
            .keys()
            .filter(|(p, purpose)| *p == player && matches(*purpose))
            .copied()
            .collect();
        for key in &keys {
            if let Some(pending) = table.remove(key) {
                pending.handle.abort();
            }
        }
        keys.len()
    }

    /// Whether a task is pending for the key.
    pub fn is_pending(&self, player: PlayerId, purpose: TaskPurpose) -> bool {
        lock(&self.tasks).contains_key(&(player, purpose))
    }

    /// Number of pending tasks.
    pub fn pending_count(&self) -> usize {
        lock(&self.tasks).len()
    }
}
