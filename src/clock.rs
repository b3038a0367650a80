//! Frame-clock timing. The whole core shares this one clock: camera
//! transitions consume the per-frame delta directly, while delayed effects
//! (continue prompt, hazard resets) go through [`TaskQueue`] instead of
//! wall-clock timers, so headless runs and tests stay deterministic.

use std::cmp::Ordering;

/// Accumulated frame time, in seconds since the game was created.
#[derive(Debug, Clone, Copy, Default)]
pub struct GameClock {
    now: f64,
}

impl GameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance by one frame delta. Negative or non-finite deltas are ignored.
    pub fn advance(&mut self, dt: f64) {
        if dt.is_finite() && dt > 0.0 {
            self.now += dt;
        }
    }

    pub fn now(&self) -> f64 {
        self.now
    }
}

type Task = Box<dyn FnOnce()>;

struct ScheduledTask {
    due: f64,
    seq: u64,
    task: Task,
}

/// One-shot tasks scheduled against the frame clock.
#[derive(Default)]
pub struct TaskQueue {
    tasks: Vec<ScheduledTask>,
    now: f64,
    next_seq: u64,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_at(&mut self, due: f64, task: impl FnOnce() + 'static) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(ScheduledTask {
            due,
            seq,
            task: Box::new(task),
        });
    }

    /// Schedule relative to the last `run_due` time.
    pub fn schedule_in(&mut self, delay: f64, task: impl FnOnce() + 'static) {
        self.schedule_at(self.now + delay.max(0.0), task);
    }

    /// Run every task whose deadline has passed, in deadline order (insertion
    /// order breaks ties). Tasks scheduled while running are picked up on the
    /// next call. Returns the number of tasks run.
    pub fn run_due(&mut self, now: f64) -> usize {
        self.now = now;
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|t| t.due <= now);
        self.tasks = pending;
        due.sort_by(|a, b| {
            a.due
                .partial_cmp(&b.due)
                .unwrap_or(Ordering::Equal)
                .then(a.seq.cmp(&b.seq))
        });
        let count = due.len();
        for scheduled in due {
            (scheduled.task)();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn clock_ignores_invalid_deltas() {
        let mut clock = GameClock::new();
        clock.advance(0.5);
        clock.advance(-1.0);
        clock.advance(f64::NAN);
        assert_eq!(clock.now(), 0.5);
    }

    #[test]
    fn tasks_run_when_due() {
        let mut queue = TaskQueue::new();
        let fired = Rc::new(RefCell::new(Vec::new()));

        let log = fired.clone();
        queue.schedule_at(1.0, move || log.borrow_mut().push("a"));
        let log = fired.clone();
        queue.schedule_at(2.0, move || log.borrow_mut().push("b"));

        assert_eq!(queue.run_due(0.5), 0);
        assert_eq!(queue.run_due(1.0), 1);
        assert_eq!(*fired.borrow(), vec!["a"]);
        assert_eq!(queue.run_due(5.0), 1);
        assert_eq!(*fired.borrow(), vec!["a", "b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn due_tasks_run_in_deadline_order() {
        let mut queue = TaskQueue::new();
        let fired = Rc::new(RefCell::new(Vec::new()));

        let log = fired.clone();
        queue.schedule_at(3.0, move || log.borrow_mut().push(3));
        let log = fired.clone();
        queue.schedule_at(1.0, move || log.borrow_mut().push(1));
        let log = fired.clone();
        queue.schedule_at(2.0, move || log.borrow_mut().push(2));

        queue.run_due(10.0);
        assert_eq!(*fired.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn schedule_in_is_relative_to_last_run() {
        let mut queue = TaskQueue::new();
        let fired = Rc::new(RefCell::new(0u32));

        queue.run_due(10.0);
        let counter = fired.clone();
        queue.schedule_in(1.5, move || *counter.borrow_mut() += 1);

        queue.run_due(11.0);
        assert_eq!(*fired.borrow(), 0);
        queue.run_due(11.5);
        assert_eq!(*fired.borrow(), 1);
    }
}
