#![forbid(unsafe_code)]

//! Cooperative, frame-driven task scheduler.
//!
//! The host drives the scheduler by calling [`Scheduler::run_frame`] once per
//! frame. A frame advances the [`FrameClock`], polls every live task once,
//! then drains the end-of-frame queue.
//!
//! # Invariants
//!
//! 1. A cancelled task is never polled again, even if it was cancelled by an
//!    earlier task in the same frame or by itself.
//! 2. Tasks spawned while a frame runs are first polled on the next frame.
//! 3. End-of-frame callbacks queued while the queue drains run at the end of
//!    the next frame.
//! 4. Tasks and callbacks run outside the scheduler's borrow, so they may
//!    spawn, cancel, defer or [`clear`](Scheduler::clear) freely.
//!
//! # Failure Modes
//!
//! | Condition | Behavior |
//! |-----------|----------|
//! | `clear()` during a frame | Tasks polled this frame are dropped, not re-queued |
//! | Task panics | Propagates to the `run_frame` caller |

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use bindy_core::{FrameClock, FrameTime};

/// Result of polling a task once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPoll {
    /// Keep polling on later frames.
    Pending,
    /// Finished; drop the task.
    Done,
}

/// Cancellation handle for a spawned task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    cancelled: Rc<Cell<bool>>,
}

impl TaskHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stop the task. It will not be polled again.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

type TaskFn = Box<dyn FnMut(FrameTime) -> TaskPoll>;

struct Task {
    cancelled: Rc<Cell<bool>>,
    poll: TaskFn,
}

#[derive(Default)]
struct SchedulerState {
    tasks: Vec<Task>,
    deferred: VecDeque<Box<dyn FnOnce()>>,
    next_id: u64,
    epoch: u64,
}

/// Shared handle to a cooperative scheduler.
#[derive(Clone, Default)]
pub struct Scheduler {
    state: Rc<RefCell<SchedulerState>>,
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Scheduler")
            .field("tasks", &state.tasks.len())
            .field("deferred", &state.deferred.len())
            .finish()
    }
}

thread_local! {
    static GLOBAL: Scheduler = Scheduler::new();
}

impl Scheduler {
    /// A standalone scheduler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// This thread's global scheduler.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.with(Clone::clone)
    }

    /// Whether both handles point at the same scheduler.
    #[must_use]
    pub fn ptr_eq(&self, other: &Scheduler) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Register a task polled once per frame until it returns
    /// [`TaskPoll::Done`] or is cancelled.
    pub fn spawn(&self, task: impl FnMut(FrameTime) -> TaskPoll + 'static) -> TaskHandle {
        let cancelled = Rc::new(Cell::new(false));
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.tasks.push(Task {
            cancelled: Rc::clone(&cancelled),
            poll: Box::new(task),
        });
        TaskHandle { id, cancelled }
    }

    /// Run `callback` once, after all tasks of the current (or next) frame.
    pub fn defer_to_end_of_frame(&self, callback: impl FnOnce() + 'static) {
        self.state.borrow_mut().deferred.push_back(Box::new(callback));
    }

    /// Advance the clock by `delta`, poll tasks, then drain the end-of-frame
    /// queue. Returns the new clock snapshot.
    pub fn run_frame(&self, delta: Duration) -> FrameTime {
        let now = FrameClock::advance(delta);
        let (tasks, epoch) = {
            let mut state = self.state.borrow_mut();
            (std::mem::take(&mut state.tasks), state.epoch)
        };

        let mut kept = Vec::with_capacity(tasks.len());
        for mut task in tasks {
            if task.cancelled.get() {
                continue;
            }
            if (task.poll)(now) == TaskPoll::Pending && !task.cancelled.get() {
                kept.push(task);
            }
        }

        {
            let mut state = self.state.borrow_mut();
            if state.epoch == epoch {
                kept.append(&mut state.tasks);
                state.tasks = kept;
            }
        }

        let deferred = std::mem::take(&mut self.state.borrow_mut().deferred);
        for callback in deferred {
            callback();
        }
        now
    }

    /// Run `frames` frames of `delta` each.
    pub fn run_frames(&self, frames: usize, delta: Duration) -> FrameTime {
        let mut now = FrameClock::now();
        for _ in 0..frames {
            now = self.run_frame(delta);
        }
        now
    }

    /// Number of live tasks.
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.state
            .borrow()
            .tasks
            .iter()
            .filter(|t| !t.cancelled.get())
            .count()
    }

    /// Number of queued end-of-frame callbacks.
    #[must_use]
    pub fn deferred_count(&self) -> usize {
        self.state.borrow().deferred.len()
    }

    /// Cancel every task and drop every queued callback.
    pub fn clear(&self) {
        let (tasks, deferred) = {
            let mut state = self.state.borrow_mut();
            state.epoch += 1;
            (
                std::mem::take(&mut state.tasks),
                std::mem::take(&mut state.deferred),
            )
        };
        for task in &tasks {
            task.cancelled.set(true);
        }
        tracing::debug!(
            tasks = tasks.len(),
            deferred = deferred.len(),
            "scheduler cleared"
        );
        // Captured state is dropped outside the borrow.
        drop(tasks);
        drop(deferred);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(16);

    #[test]
    fn polls_until_done() {
        let scheduler = Scheduler::new();
        let polls = Rc::new(Cell::new(0));
        let p = Rc::clone(&polls);
        scheduler.spawn(move |_| {
            p.set(p.get() + 1);
            if p.get() == 3 {
                TaskPoll::Done
            } else {
                TaskPoll::Pending
            }
        });
        scheduler.run_frames(5, FRAME);
        assert_eq!(polls.get(), 3);
        assert_eq!(scheduler.task_count(), 0);
    }

    #[test]
    fn cancelled_task_is_not_polled() {
        let scheduler = Scheduler::new();
        let polls = Rc::new(Cell::new(0));
        let p = Rc::clone(&polls);
        let handle = scheduler.spawn(move |_| {
            p.set(p.get() + 1);
            TaskPoll::Pending
        });
        scheduler.run_frame(FRAME);
        handle.cancel();
        scheduler.run_frames(3, FRAME);
        assert_eq!(polls.get(), 1);
        assert!(handle.is_cancelled());
    }

    #[test]
    fn task_can_cancel_itself() {
        let scheduler = Scheduler::new();
        let polls = Rc::new(Cell::new(0));
        let slot: Rc<RefCell<Option<TaskHandle>>> = Rc::new(RefCell::new(None));
        let p = Rc::clone(&polls);
        let s = Rc::clone(&slot);
        let handle = scheduler.spawn(move |_| {
            p.set(p.get() + 1);
            if let Some(h) = s.borrow().as_ref() {
                h.cancel();
            }
            TaskPoll::Pending
        });
        *slot.borrow_mut() = Some(handle);
        scheduler.run_frames(3, FRAME);
        assert_eq!(polls.get(), 1);
    }

    #[test]
    fn spawned_during_frame_runs_next_frame() {
        let scheduler = Scheduler::new();
        let inner_polls = Rc::new(Cell::new(0));
        let sched = scheduler.clone();
        let ip = Rc::clone(&inner_polls);
        scheduler.spawn(move |_| {
            let ip = Rc::clone(&ip);
            sched.spawn(move |_| {
                ip.set(ip.get() + 1);
                TaskPoll::Done
            });
            TaskPoll::Done
        });
        scheduler.run_frame(FRAME);
        assert_eq!(inner_polls.get(), 0);
        scheduler.run_frame(FRAME);
        assert_eq!(inner_polls.get(), 1);
    }

    #[test]
    fn deferred_runs_after_tasks() {
        let scheduler = Scheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let l1 = Rc::clone(&log);
        scheduler.defer_to_end_of_frame(move || l1.borrow_mut().push("deferred"));
        let l2 = Rc::clone(&log);
        scheduler.spawn(move |_| {
            l2.borrow_mut().push("task");
            TaskPoll::Done
        });
        scheduler.run_frame(FRAME);
        assert_eq!(*log.borrow(), vec!["task", "deferred"]);
        assert_eq!(scheduler.deferred_count(), 0);
    }

    #[test]
    fn run_frame_advances_clock() {
        FrameClock::reset();
        let scheduler = Scheduler::new();
        let seen = Rc::new(Cell::new(0));
        let s = Rc::clone(&seen);
        scheduler.spawn(move |now| {
            s.set(now.frame);
            TaskPoll::Pending
        });
        let now = scheduler.run_frames(2, FRAME);
        assert_eq!(now.frame, 2);
        assert_eq!(seen.get(), 2);
        assert_eq!(now.elapsed, FRAME * 2);
    }

    #[test]
    fn clear_cancels_everything() {
        let scheduler = Scheduler::new();
        let handle = scheduler.spawn(|_| TaskPoll::Pending);
        scheduler.defer_to_end_of_frame(|| panic!("cleared callbacks never run"));
        scheduler.clear();
        assert!(handle.is_cancelled());
        assert_eq!(scheduler.task_count(), 0);
        scheduler.run_frame(FRAME);
    }

    #[test]
    fn clear_from_inside_a_task_drops_survivors() {
        let scheduler = Scheduler::new();
        let sched = scheduler.clone();
        scheduler.spawn(move |_| {
            sched.clear();
            TaskPoll::Pending
        });
        scheduler.run_frame(FRAME);
        assert_eq!(scheduler.task_count(), 0);
    }
}
