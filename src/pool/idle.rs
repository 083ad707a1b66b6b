//! Deferring work to the host's idle time

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::sync::{Mutex, PoisonError};

/// Work to run once the host event loop has nothing better to do
pub type IdleTask = Box<dyn FnOnce() + Send>;

/// Schedules tasks onto the host's next idle slice
pub trait IdleScheduler: Send + Sync {
    fn schedule_idle(&self, task: IdleTask);
}

/// Channel-backed idle queue.
///
/// The host calls [`run_pending`](Self::run_pending) from its idle handler,
/// on the thread that owns its surfaces.
pub struct IdleQueue {
    sender: Sender<IdleTask>,
    receiver: Mutex<Receiver<IdleTask>>,
    pending: AtomicUsize,
}

impl IdleQueue {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            pending: AtomicUsize::new(0),
        }
    }

    /// Number of queued tasks
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Run the tasks queued so far. Tasks they schedule wait for the next call.
    pub fn run_pending(&self) -> usize {
        let tasks: Vec<IdleTask> = {
            let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.try_iter().collect()
        };
        self.pending.fetch_sub(tasks.len(), Ordering::SeqCst);

        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Keep running idle slices until nothing is queued or `max_rounds` is hit
    pub fn run_until_idle(&self, max_rounds: usize) -> usize {
        let mut total = 0;
        for _ in 0..max_rounds {
            let ran = self.run_pending();
            if ran == 0 {
                break;
            }
            total += ran;
        }
        total
    }
}

impl Default for IdleQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl IdleScheduler for IdleQueue {
    fn schedule_idle(&self, task: IdleTask) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(task).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
