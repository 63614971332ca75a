//! One-shot and periodic timers on the event loop.
//!
//! A [`Timer`] runs its callback as a task on the current tokio `LocalSet`,
//! so the callback may touch `Rc` / `RefCell` pipeline state directly.
//! [`start`](Timer::start) and [`stop`](Timer::stop) must be called from
//! inside a `LocalSet`.
//!
//! Every start bumps a generation counter and the task checks it before each
//! callback, so an expiry that was already queued when the timer was stopped
//! or restarted never runs.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

/// Shortest period a periodic timer runs with.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    OneShot,
    Periodic,
}

#[derive(Default)]
struct TimerState {
    generation: Cell<u64>,
    armed: Cell<bool>,
}

pub struct Timer {
    timeout: Cell<Duration>,
    kind: TimerKind,
    state: Rc<TimerState>,
    task: RefCell<Option<JoinHandle<()>>>,
}

impl Timer {
    pub fn new(timeout: Duration, kind: TimerKind) -> Self {
        Self {
            timeout: Cell::new(timeout),
            kind,
            state: Rc::new(TimerState::default()),
            task: RefCell::new(None),
        }
    }

    /// (Re)arm the timer.  A running timer is stopped first.
    pub fn start(&self, mut callback: impl FnMut() + 'static) {
        self.stop();
        let generation = self.state.generation.get();
        let state = Rc::clone(&self.state);
        let timeout = self.timeout.get();
        state.armed.set(true);

        let task = match self.kind {
            TimerKind::OneShot => tokio::task::spawn_local(async move {
                time::sleep(timeout).await;
                if state.generation.get() == generation {
                    state.armed.set(false);
                    callback();
                }
            }),
            TimerKind::Periodic => tokio::task::spawn_local(async move {
                let period = timeout.max(MIN_PERIOD);
                let mut ticker = time::interval_at(Instant::now() + period, period);
                loop {
                    ticker.tick().await;
                    if state.generation.get() != generation {
                        break;
                    }
                    callback();
                }
            }),
        };
        *self.task.borrow_mut() = Some(task);
    }

    /// Disarm the timer.  Safe to call at any time, any number of times.
    pub fn stop(&self) {
        self.state
            .generation
            .set(self.state.generation.get().wrapping_add(1));
        self.state.armed.set(false);
        if let Some(task) = self.task.borrow_mut().take() {
            task.abort();
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.armed.get()
    }

    /// Change the timeout.  Takes effect on the next [`start`](Self::start).
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout.set(timeout);
    }

    pub fn timeout(&self) -> Duration {
        self.timeout.get()
    }

    pub fn kind(&self) -> TimerKind {
        self.kind
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
