//! Feeds samples produced on a foreign thread into the event-loop pipeline.
//!
//! ```text
//!  foreign thread                         event loop (LocalSet)
//! ┌──────────────────┐  Mutex<InputQueue>  ┌──────────────────────────┐
//! │ ThreadSourceWriter│ ── samples/flush ─▶│ ThreadSource::drain      │─▶ sink
//! │  write / flush    │ ── Notify ───────▶ │  swap queue, write, flush│
//! │  wait_all_flushed │ ◀─ Condvar ─────── │  ack ⇒ all_flushed       │
//! └──────────────────┘                     └──────────────────────────┘
//! ```
//!
//! The input-queue mutex is the only lock shared with the foreign thread.
//! The event loop takes the whole input queue in one swap, so it never sees a
//! partial write.  New samples cancel a flush that has not been issued
//! downstream yet; once issued, the flush runs to completion and samples that
//! arrive meanwhile wait for the acknowledgement.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::endpoint::{AudioSource, SinkSlot};

struct InputQueue {
    samples: Vec<f32>,
    flush: bool,
    all_flushed: bool,
}

struct Shared {
    queue: Mutex<InputQueue>,
    cond: Condvar,
    wake: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, InputQueue> {
        // The queue stays consistent even if a holder panicked.
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// ThreadSourceWriter
// ---------------------------------------------------------------------------

/// The foreign-thread handle of a [`ThreadSource`].
#[derive(Clone)]
pub struct ThreadSourceWriter {
    shared: Arc<Shared>,
}

impl ThreadSourceWriter {
    /// Queue samples for the pipeline.  Cancels a flush that has not been
    /// issued downstream yet.
    pub fn write(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        {
            let mut queue = self.shared.lock();
            queue.flush = false;
            queue.all_flushed = false;
            queue.samples.extend_from_slice(samples);
        }
        self.shared.wake.notify_one();
    }

    /// Request a flush once everything queued so far has been written.
    pub fn flush(&self) {
        self.shared.lock().flush = true;
        self.shared.wake.notify_one();
    }

    /// Block until the downstream sink has acknowledged a flush covering all
    /// queued samples.  Must not be called from the event-loop thread.
    pub fn wait_all_flushed(&self) {
        let mut queue = self.shared.lock();
        while !queue.all_flushed {
            queue = self
                .shared
                .cond
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait_all_flushed`](Self::wait_all_flushed) with a limit.
    /// Returns `false` on timeout.
    pub fn wait_all_flushed_timeout(&self, timeout: Duration) -> bool {
        let queue = self.shared.lock();
        let (queue, _) = self
            .shared
            .cond
            .wait_timeout_while(queue, timeout, |q| !q.all_flushed)
            .unwrap_or_else(PoisonError::into_inner);
        queue.all_flushed
    }
}

// ---------------------------------------------------------------------------
// ThreadSource
// ---------------------------------------------------------------------------

/// The event-loop end: an [`AudioSource`] fed by [`ThreadSourceWriter`]s.
pub struct ThreadSource {
    shared: Arc<Shared>,
    output: RefCell<Vec<f32>>,
    output_pos: Cell<usize>,
    /// Samples went downstream since the last flush.
    unflushed: Cell<bool>,
    draining: Cell<bool>,
    drain_again: Cell<bool>,
    task: RefCell<Option<JoinHandle<()>>>,
    sink: SinkSlot,
}

impl ThreadSource {
    /// Create the source and its drain task.  Must be called inside a tokio
    /// `LocalSet`.
    pub fn new() -> Rc<Self> {
        let shared = Arc::new(Shared {
            queue: Mutex::new(InputQueue {
                samples: Vec::new(),
                flush: false,
                all_flushed: true,
            }),
            cond: Condvar::new(),
            wake: Notify::new(),
        });

        let source = Rc::new_cyclic(|weak: &std::rc::Weak<ThreadSource>| {
            let weak = weak.clone();
            let wake = Arc::clone(&shared);
            let task = tokio::task::spawn_local(async move {
                loop {
                    wake.wake.notified().await;
                    match weak.upgrade() {
                        Some(source) => source.drain(),
                        None => break,
                    }
                }
            });
            Self {
                shared,
                output: RefCell::new(Vec::new()),
                output_pos: Cell::new(0),
                unflushed: Cell::new(false),
                draining: Cell::new(false),
                drain_again: Cell::new(false),
                task: RefCell::new(Some(task)),
                sink: SinkSlot::new(),
            }
        });
        log::debug!("thread source: drain task started");
        source
    }

    /// A handle for the producing thread.
    pub fn writer(&self) -> ThreadSourceWriter {
        ThreadSourceWriter {
            shared: Arc::clone(&self.shared),
        }
    }

    fn drain(&self) {
        if self.draining.get() {
            self.drain_again.set(true);
            return;
        }
        self.draining.set(true);
        loop {
            self.drain_again.set(false);
            self.drain_once();
            if !self.drain_again.get() {
                break;
            }
        }
        self.draining.set(false);
    }

    fn drain_once(&self) {
        if self.sink.is_flushing() {
            return;
        }

        loop {
            if self.output_pos.get() >= self.output.borrow().len() {
                let mut queue = self.shared.lock();
                if !queue.samples.is_empty() {
                    let mut output = self.output.borrow_mut();
                    output.clear();
                    std::mem::swap(&mut *output, &mut queue.samples);
                    self.output_pos.set(0);
                } else if queue.flush {
                    queue.flush = false;
                    if self.unflushed.replace(false) {
                        drop(queue);
                        if !self.sink.flush() {
                            self.flush_completed();
                        }
                    } else {
                        queue.all_flushed = true;
                        self.shared.cond.notify_all();
                    }
                    return;
                } else {
                    return;
                }
            }

            let output = self.output.take();
            let pos = self.output_pos.get();
            let written = self.sink.write(&output[pos..]);
            let short = pos + written < output.len();
            self.output_pos.set(pos + written);
            self.output.replace(output);

            if written > 0 {
                self.unflushed.set(true);
            }
            if short {
                return;
            }
        }
    }

    fn flush_completed(&self) {
        {
            let mut queue = self.shared.lock();
            let output_empty = self.output_pos.get() >= self.output.borrow().len();
            if output_empty && queue.samples.is_empty() {
                queue.all_flushed = true;
                self.shared.cond.notify_all();
            }
        }
        self.drain();
    }
}

impl AudioSource for ThreadSource {
    fn resume_output(&self) {
        self.drain();
    }

    fn all_samples_flushed(&self) {
        self.sink.flush_done();
        self.flush_completed();
    }

    fn sink_slot(&self) -> &SinkSlot {
        &self.sink
    }
}

impl Drop for ThreadSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
