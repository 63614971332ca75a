//! Test doubles for exercising backpressure and flush ordering.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::adapters::PushSource;
use super::endpoint::{AudioSink, SourceSlot};

/// What a [`RecordingSink`] saw, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Samples(usize),
    Flush,
}

/// A sink that records everything, with an optional acceptance budget and
/// automatic or manual flush acknowledgement.
pub(crate) struct RecordingSink {
    source: SourceSlot,
    samples: RefCell<Vec<f32>>,
    events: RefCell<Vec<SinkEvent>>,
    budget: Cell<Option<usize>>,
    auto_ack: Cell<bool>,
    flush_pending: Cell<bool>,
}

impl RecordingSink {
    /// Unlimited acceptance, flushes acknowledged at once.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            source: SourceSlot::new(),
            samples: RefCell::new(Vec::new()),
            events: RefCell::new(Vec::new()),
            budget: Cell::new(None),
            auto_ack: Cell::new(true),
            flush_pending: Cell::new(false),
        })
    }

    pub fn set_budget(&self, budget: Option<usize>) {
        self.budget.set(budget);
    }

    pub fn set_auto_ack(&self, auto_ack: bool) {
        self.auto_ack.set(auto_ack);
    }

    /// Allow `n` more samples and resume the source.
    pub fn grant(&self, n: usize) {
        let budget = self.budget.get().unwrap_or(0) + n;
        self.budget.set(Some(budget));
        self.source.resume();
    }

    /// Remove the budget and resume the source.
    pub fn set_unlimited(&self) {
        self.budget.set(None);
        self.source.resume();
    }

    pub fn ack_flush(&self) {
        assert!(self.flush_pending.replace(false), "no flush to acknowledge");
        self.source.flushed();
    }

    pub fn is_flush_pending(&self) -> bool {
        self.flush_pending.get()
    }

    pub fn samples(&self) -> Vec<f32> {
        self.samples.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.samples.borrow().len()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.borrow().clone()
    }

    pub fn flush_count(&self) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|e| **e == SinkEvent::Flush)
            .count()
    }
}

impl AudioSink for RecordingSink {
    fn write_samples(&self, samples: &[f32]) -> usize {
        assert!(
            !self.flush_pending.get(),
            "write while a flush is outstanding"
        );
        let accepted = match self.budget.get() {
            None => samples.len(),
            Some(budget) => {
                let n = budget.min(samples.len());
                self.budget.set(Some(budget - n));
                n
            }
        };
        if accepted > 0 {
            self.samples
                .borrow_mut()
                .extend_from_slice(&samples[..accepted]);
            self.events.borrow_mut().push(SinkEvent::Samples(accepted));
        }
        accepted
    }

    fn flush_samples(&self) {
        assert!(!self.flush_pending.get(), "flush while a flush is outstanding");
        self.events.borrow_mut().push(SinkEvent::Flush);
        if self.auto_ack.get() {
            self.source.flushed();
        } else {
            self.flush_pending.set(true);
        }
    }

    fn source_slot(&self) -> &SourceSlot {
        &self.source
    }
}

/// Resume / flush-acknowledgement counters of a [`tracked_source`].
#[derive(Clone, Default)]
pub(crate) struct SourceCounters {
    pub resumed: Rc<Cell<usize>>,
    pub flushed: Rc<Cell<usize>>,
}

/// A [`PushSource`] that counts its notifications.
pub(crate) fn tracked_source() -> (Rc<PushSource>, SourceCounters) {
    let src = Rc::new(PushSource::new());
    let counters = SourceCounters::default();

    let resumed = Rc::clone(&counters.resumed);
    src.set_resume_handler(move || resumed.set(resumed.get() + 1));
    let flushed = Rc::clone(&counters.flushed);
    src.set_flushed_handler(move || flushed.set(flushed.get() + 1));

    (src, counters)
}

/// `n` samples counting up from `start`, for order checks.
pub(crate) fn ramp(start: usize, n: usize) -> Vec<f32> {
    (start..start + n).map(|i| i as f32).collect()
}
