//! Cooperative task registry that drives clients one tick at a time.
//!
//! # Design
//! Tasks are owned by the scheduler and addressed by [`TaskId`]. A pass
//! (`work`) invokes every live task once, in registration order, with the
//! caller's monotonic time. A task that reports `Finished` is dropped in the
//! same pass, which releases everything it owns. Nothing here blocks except
//! the explicit `run_until_idle` convenience loop.
//!
//! Code running inside a pass (a completion callback, say) cannot borrow the
//! scheduler. It registers follow-up work through a [`Spawner`] instead, and
//! the queued tasks join the registry when the pass ends.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Returned by [`Task::work`] after each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Finished,
}

/// A unit of cooperative work. `work` must return promptly.
pub trait Task {
    fn work(&mut self, now_ms: u64) -> TaskStatus;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(usize);

/// Cloneable handle that queues tasks for a [`Scheduler`] without borrowing it.
#[derive(Clone, Default)]
pub struct Spawner {
    inbox: Rc<RefCell<Vec<Box<dyn Task>>>>,
}

impl Spawner {
    pub fn spawn(&self, task: Box<dyn Task>) {
        self.inbox.borrow_mut().push(task);
    }

    /// Tasks queued but not yet admitted.
    pub fn pending(&self) -> usize {
        self.inbox.borrow().len()
    }
}

impl std::fmt::Debug for Spawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spawner").field("pending", &self.pending()).finish()
    }
}

#[derive(Default)]
pub struct Scheduler {
    slots: Vec<Option<Box<dyn Task>>>,
    free: Vec<usize>,
    spawner: Spawner,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn(&mut self, task: Box<dyn Task>) -> TaskId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(task);
                TaskId(index)
            }
            None => {
                self.slots.push(Some(task));
                TaskId(self.slots.len() - 1)
            }
        }
    }

    /// Handle for registering tasks from code that cannot reach `self`.
    pub fn spawner(&self) -> Spawner {
        self.spawner.clone()
    }

    /// Run one pass over all live tasks. Tasks queued on a [`Spawner`] are
    /// admitted before and after the pass, so work queued during a pass
    /// first runs on the next one.
    pub fn work(&mut self, now_ms: u64) {
        self.admit_queued();
        for index in 0..self.slots.len() {
            let Some(task) = self.slots[index].as_mut() else {
                continue;
            };
            if task.work(now_ms) == TaskStatus::Finished {
                self.slots[index] = None;
                self.free.push(index);
            }
        }
        self.admit_queued();
    }

    fn admit_queued(&mut self) {
        let queued = std::mem::take(&mut *self.spawner.inbox.borrow_mut());
        for task in queued {
            self.spawn(task);
        }
    }

    /// Drop a task without running it again. Returns false if it already
    /// finished.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        match self.slots.get_mut(id.0).and_then(Option::take) {
            Some(_) => {
                self.free.push(id.0);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: TaskId) -> bool {
        matches!(self.slots.get(id.0), Some(Some(_)))
    }

    /// Live tasks, including queued ones not yet admitted.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count() + self.spawner.pending()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `work` with [`monotonic_ms`] until no tasks remain, sleeping
    /// `tick` between passes.
    pub fn run_until_idle(&mut self, tick: Duration) {
        while !self.is_empty() {
            self.work(monotonic_ms());
            if !self.is_empty() {
                std::thread::sleep(tick);
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("tasks", &self.len()).finish()
    }
}

/// Milliseconds since the first call in this process; starts at 1 so a
/// zero timestamp never occurs.
pub fn monotonic_ms() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as u64 + 1
}
