//! Edge adapters: application code on the event-loop thread pushing samples
//! into a chain ([`PushSource`]) or taking them out of one
//! ([`CallbackSink`]).

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::endpoint::{AudioSink, AudioSource, SinkSlot, SourceSlot};

type Handler = Rc<dyn Fn()>;

// ---------------------------------------------------------------------------
// PushSource
// ---------------------------------------------------------------------------

/// A source driven by explicit [`write`](Self::write) / [`flush`](Self::flush)
/// calls.
///
/// After a short write the resume handler fires once the sink can take more;
/// the flushed handler fires once per acknowledged flush.
#[derive(Default)]
pub struct PushSource {
    sink: SinkSlot,
    stalled: Cell<bool>,
    on_resume: RefCell<Option<Handler>>,
    on_flushed: RefCell<Option<Handler>>,
}

impl PushSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_resume_handler(&self, handler: impl Fn() + 'static) {
        *self.on_resume.borrow_mut() = Some(Rc::new(handler));
    }

    pub fn set_flushed_handler(&self, handler: impl Fn() + 'static) {
        *self.on_flushed.borrow_mut() = Some(Rc::new(handler));
    }

    /// Write samples downstream.  While a flush is outstanding nothing is
    /// accepted and the resume handler fires after the acknowledgement.
    pub fn write(&self, samples: &[f32]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        if self.sink.is_flushing() {
            self.stalled.set(true);
            return 0;
        }
        let written = self.sink.write(samples);
        if written < samples.len() {
            self.stalled.set(true);
        }
        written
    }

    pub fn flush(&self) {
        if !self.sink.flush() {
            self.notify(&self.on_flushed);
        }
    }

    pub fn is_flushing(&self) -> bool {
        self.sink.is_flushing()
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled.get()
    }

    fn notify(&self, handler: &RefCell<Option<Handler>>) {
        let handler = handler.borrow().clone();
        if let Some(handler) = handler {
            handler();
        }
    }
}

impl AudioSource for PushSource {
    fn resume_output(&self) {
        if self.stalled.replace(false) {
            self.notify(&self.on_resume);
        }
    }

    fn all_samples_flushed(&self) {
        if self.sink.flush_done() {
            self.notify(&self.on_flushed);
            self.resume_output();
        }
    }

    fn sink_slot(&self) -> &SinkSlot {
        &self.sink
    }
}

// ---------------------------------------------------------------------------
// CallbackSink
// ---------------------------------------------------------------------------

/// A sink that hands every write to a closure.
///
/// The closure returns how many samples it took.  After a short count the
/// owner calls [`resume`](Self::resume) when it can take more.  Without a
/// flush handler flushes are acknowledged immediately; with one, the owner
/// answers through [`acknowledge_flush`](Self::acknowledge_flush).
///
/// The closures must not call back into this sink's `write_samples`.
pub struct CallbackSink {
    source: SourceSlot,
    on_samples: RefCell<Box<dyn FnMut(&[f32]) -> usize>>,
    on_flush: RefCell<Option<Box<dyn FnMut()>>>,
    flush_pending: Cell<bool>,
}

impl CallbackSink {
    pub fn new(on_samples: impl FnMut(&[f32]) -> usize + 'static) -> Self {
        Self {
            source: SourceSlot::new(),
            on_samples: RefCell::new(Box::new(on_samples)),
            on_flush: RefCell::new(None),
            flush_pending: Cell::new(false),
        }
    }

    pub fn with_flush_handler(self, on_flush: impl FnMut() + 'static) -> Self {
        *self.on_flush.borrow_mut() = Some(Box::new(on_flush));
        self
    }

    pub fn resume(&self) {
        self.source.resume();
    }

    pub fn acknowledge_flush(&self) {
        if self.flush_pending.replace(false) {
            self.source.flushed();
        }
    }

    pub fn is_flush_pending(&self) -> bool {
        self.flush_pending.get()
    }
}

impl AudioSink for CallbackSink {
    fn write_samples(&self, samples: &[f32]) -> usize {
        let taken = (self.on_samples.borrow_mut())(samples);
        taken.min(samples.len())
    }

    fn flush_samples(&self) {
        self.flush_pending.set(true);
        let handler = self.on_flush.borrow_mut().take();
        match handler {
            Some(mut handler) => {
                handler();
                let mut slot = self.on_flush.borrow_mut();
                if slot.is_none() {
                    *slot = Some(handler);
                }
            }
            None => self.acknowledge_flush(),
        }
    }

    fn source_slot(&self) -> &SourceSlot {
        &self.source
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::connect;
    use crate::pipeline::testing::{tracked_source, RecordingSink};

    // ---- PushSource ---

    #[test]
    fn unconnected_push_source_flushes_immediately() {
        let (src, counters) = tracked_source();
        assert_eq!(src.write(&[1.0; 3]), 3);
        src.flush();
        assert_eq!(counters.flushed.get(), 1);
    }

    #[test]
    fn short_write_resumes_once() {
        let (src, counters) = tracked_source();
        let sink = RecordingSink::new();
        sink.set_budget(Some(1));
        connect(src.clone(), sink.clone()).unwrap();

        assert_eq!(src.write(&[1.0, 2.0]), 1);
        assert!(src.is_stalled());
        sink.grant(10);
        sink.grant(10);
        assert_eq!(counters.resumed.get(), 1);
    }

    #[test]
    fn write_during_flush_is_refused_then_resumed() {
        let (src, counters) = tracked_source();
        let sink = RecordingSink::new();
        sink.set_auto_ack(false);
        connect(src.clone(), sink.clone()).unwrap();

        src.write(&[1.0]);
        src.flush();
        assert_eq!(src.write(&[2.0]), 0);
        sink.ack_flush();

        assert_eq!(counters.flushed.get(), 1);
        assert_eq!(counters.resumed.get(), 1);
        assert_eq!(src.write(&[2.0]), 1);
        assert_eq!(sink.samples(), vec![1.0, 2.0]);
    }

    // ---- CallbackSink ---

    #[test]
    fn callback_sink_takes_what_the_closure_accepts() {
        let got = Rc::new(RefCell::new(Vec::new()));
        let got2 = Rc::clone(&got);
        let sink = Rc::new(CallbackSink::new(move |s: &[f32]| {
            let n = s.len().min(2);
            got2.borrow_mut().extend_from_slice(&s[..n]);
            n
        }));
        let (src, counters) = tracked_source();
        connect(src.clone(), sink.clone()).unwrap();

        assert_eq!(src.write(&[1.0, 2.0, 3.0]), 2);
        sink.resume();
        assert_eq!(counters.resumed.get(), 1);
        assert_eq!(*got.borrow(), vec![1.0, 2.0]);
    }

    #[test]
    fn callback_sink_flush_handler_defers_ack() {
        let flushes = Rc::new(Cell::new(0));
        let flushes2 = Rc::clone(&flushes);
        let sink = Rc::new(
            CallbackSink::new(|s: &[f32]| s.len())
                .with_flush_handler(move || flushes2.set(flushes2.get() + 1)),
        );
        let (src, counters) = tracked_source();
        connect(src.clone(), sink.clone()).unwrap();

        src.write(&[1.0]);
        src.flush();
        assert_eq!(flushes.get(), 1);
        assert_eq!(counters.flushed.get(), 0);
        assert!(sink.is_flush_pending());

        sink.acknowledge_flush();
        sink.acknowledge_flush();
        assert_eq!(counters.flushed.get(), 1);
    }

    #[test]
    fn callback_sink_without_handler_acks_at_once() {
        let sink = Rc::new(CallbackSink::new(|s: &[f32]| s.len()));
        let (src, counters) = tracked_source();
        connect(src.clone(), sink).unwrap();
        src.flush();
        assert_eq!(counters.flushed.get(), 1);
        assert!(!src.is_flushing());
    }
}
