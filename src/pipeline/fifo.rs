//! Elastic sample buffer between two stages.
//!
//! ```text
//!            ┌──────────────── AudioFifo ────────────────┐
//! upstream ─▶│ direct path (empty, ready) ───────────────▶│─▶ downstream
//!            │ otherwise ─▶ SampleRing ─▶ ≤ 800 per write │
//!            └────────────────────────────────────────────┘
//! ```
//!
//! Policies:
//!
//! * **overwrite**: when full, the oldest samples are dropped instead of
//!   refusing input.
//! * **prebuffer**: output starts only once `prebuf_samples` are queued;
//!   re-armed after every flush and clear.
//! * **paused output**: content accumulates but is not forwarded until the
//!   output is unpaused.
//! * **buffering disabled**: writes pass straight through and backpressure
//!   is handed upstream unchanged.

use std::cell::{Cell, RefCell};

use crate::audio::SampleRing;

use super::endpoint::{AudioSink, AudioSource, SinkSlot, SourceSlot};

/// Largest block handed downstream in one write.
pub const MAX_WRITE_SIZE: usize = 800;

// ---------------------------------------------------------------------------
// AudioFifo
// ---------------------------------------------------------------------------

pub struct AudioFifo {
    ring: RefCell<SampleRing>,
    scratch: RefCell<Vec<f32>>,
    overwrite: Cell<bool>,
    output_paused: Cell<bool>,
    /// Downstream refused part of a write and owes us a resume.
    output_stopped: Cell<bool>,
    prebuf_samples: Cell<usize>,
    prebuf: Cell<bool>,
    /// Upstream asked for a flush we have not acknowledged yet.
    is_flushing: Cell<bool>,
    /// We refused part of an upstream write and owe it a resume.
    input_stopped: Cell<bool>,
    buffering_enabled: Cell<bool>,
    disable_buffering_when_flushed: Cell<bool>,
    writing: Cell<bool>,
    resume_pending: Cell<bool>,
    source: SourceSlot,
    sink: SinkSlot,
}

impl AudioFifo {
    /// # Panics
    ///
    /// Panics if `capacity == 0`.
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: RefCell::new(SampleRing::new(capacity)),
            scratch: RefCell::new(Vec::with_capacity(MAX_WRITE_SIZE)),
            overwrite: Cell::new(false),
            output_paused: Cell::new(false),
            output_stopped: Cell::new(false),
            prebuf_samples: Cell::new(0),
            prebuf: Cell::new(false),
            is_flushing: Cell::new(false),
            input_stopped: Cell::new(false),
            buffering_enabled: Cell::new(true),
            disable_buffering_when_flushed: Cell::new(false),
            writing: Cell::new(false),
            resume_pending: Cell::new(false),
            source: SourceSlot::new(),
            sink: SinkSlot::new(),
        }
    }

    pub fn with_overwrite(self, overwrite: bool) -> Self {
        self.set_overwrite(overwrite);
        self
    }

    pub fn with_prebuf_samples(self, samples: usize) -> Self {
        self.set_prebuf_samples(samples);
        self
    }

    pub fn with_output_paused(self, paused: bool) -> Self {
        self.output_paused.set(paused);
        self
    }

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------

    /// Reallocate the storage.  Buffered samples are discarded.
    pub fn set_size(&self, capacity: usize) {
        self.ring.borrow_mut().resize(capacity);
        let clamped = self.prebuf_samples.get().min(capacity - 1);
        self.prebuf_samples.set(clamped);
        self.clear();
    }

    pub fn set_overwrite(&self, overwrite: bool) {
        self.overwrite.set(overwrite);
    }

    pub fn overwrite(&self) -> bool {
        self.overwrite.get()
    }

    /// Number of samples to collect before output starts, at most
    /// `capacity - 1`.
    pub fn set_prebuf_samples(&self, samples: usize) {
        let clamped = samples.min(self.capacity() - 1);
        self.prebuf_samples.set(clamped);
        if self.is_empty() {
            self.prebuf.set(clamped > 0);
        }
    }

    pub fn prebuf_samples(&self) -> usize {
        self.prebuf_samples.get()
    }

    /// Turn buffering on or off.  Switching it off while samples are queued
    /// takes effect once they have been flushed out.
    pub fn enable_buffering(&self, enable: bool) {
        if enable {
            self.disable_buffering_when_flushed.set(false);
            if !self.buffering_enabled.replace(true) && self.input_stopped.replace(false) {
                self.source.resume();
            }
        } else if self.buffering_enabled.get() {
            if self.is_empty() {
                self.buffering_enabled.set(false);
            } else {
                self.disable_buffering_when_flushed.set(true);
            }
        }
    }

    pub fn buffering_enabled(&self) -> bool {
        self.buffering_enabled.get()
    }

    /// Pause or release the output.  Releasing forwards everything that was
    /// collected while paused, in order.
    pub fn set_output_paused(&self, paused: bool) {
        let was_paused = self.output_paused.replace(paused);
        if !was_paused || paused {
            return;
        }
        if self.buffering_enabled.get() {
            self.write_from_fifo();
        } else if self.input_stopped.replace(false) {
            self.source.resume();
        }
    }

    pub fn is_output_paused(&self) -> bool {
        self.output_paused.get()
    }

    /// Discard everything buffered.  A flush waiting behind the discarded
    /// samples is forwarded at once.
    pub fn clear(&self) {
        let was_empty = self.is_empty();
        self.ring.borrow_mut().clear();
        self.prebuf.set(self.prebuf_samples.get() > 0);

        if self.is_flushing.get() && !was_empty {
            self.flush_downstream();
        }
        if self.input_stopped.replace(false) {
            self.source.resume();
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Samples ready for output.  Reads 0 while prebuffering below the
    /// threshold unless `ignore_prebuf` is set.
    pub fn samples_in_fifo(&self, ignore_prebuf: bool) -> usize {
        let len = self.ring.borrow().len();
        if !ignore_prebuf
            && self.prebuf.get()
            && !self.is_flushing.get()
            && len < self.prebuf_samples.get()
        {
            return 0;
        }
        len
    }

    pub fn is_empty(&self) -> bool {
        self.ring.borrow().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.ring.borrow().is_full()
    }

    pub fn space_avail(&self) -> usize {
        self.ring.borrow().space()
    }

    pub fn capacity(&self) -> usize {
        self.ring.borrow().capacity()
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn output_blocked(&self) -> bool {
        self.output_paused.get()
            || self.output_stopped.get()
            || self.writing.get()
            || self.sink.is_flushing()
    }

    /// Write straight through to the sink.  Returns how much was taken.
    fn write_direct(&self, samples: &[f32]) -> usize {
        self.writing.set(true);
        let mut written = 0;
        while written < samples.len() {
            let n = self.sink.write(&samples[written..]);
            written += n;
            if written < samples.len() && !self.resume_pending.replace(false) {
                self.output_stopped.set(true);
                break;
            }
        }
        self.resume_pending.set(false);
        self.writing.set(false);
        written
    }

    fn write_from_fifo(&self) {
        if self.output_blocked() {
            return;
        }

        self.writing.set(true);
        loop {
            let avail = self.samples_in_fifo(false);
            if avail == 0 {
                break;
            }

            let mut chunk = self.scratch.take();
            chunk.clear();
            chunk.extend_from_slice(self.ring.borrow().peek(avail.min(MAX_WRITE_SIZE)));
            let written = self.sink.write(&chunk);
            self.ring.borrow_mut().consume(written);
            let short = written < chunk.len();
            self.scratch.replace(chunk);

            if short && !self.resume_pending.replace(false) {
                self.output_stopped.set(true);
                break;
            }
        }
        self.resume_pending.set(false);
        self.writing.set(false);

        if self.input_stopped.get() && !self.is_full() {
            self.input_stopped.set(false);
            self.source.resume();
        }
        if self.is_flushing.get() && self.is_empty() {
            self.flush_downstream();
        }
    }

    fn flush_downstream(&self) {
        if self.sink.is_flushing() {
            return;
        }
        log::trace!("fifo: flushing downstream");
        if !self.sink.flush() {
            self.flush_completed();
        }
    }

    fn flush_completed(&self) {
        if self.is_empty() {
            if self.disable_buffering_when_flushed.replace(false) {
                self.buffering_enabled.set(false);
            }
            if self.is_flushing.replace(false) {
                self.source.flushed();
            }
        }
        self.write_from_fifo();
    }
}

// ---------------------------------------------------------------------------
// Endpoint protocol
// ---------------------------------------------------------------------------

impl AudioSink for AudioFifo {
    fn write_samples(&self, samples: &[f32]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        self.is_flushing.set(false);
        self.input_stopped.set(false);

        let overwrite = self.overwrite.get();
        if self.is_full() && !overwrite && self.buffering_enabled.get() {
            self.input_stopped.set(true);
            return 0;
        }

        let mut written = 0;
        if self.is_empty() && !self.prebuf.get() && !self.output_blocked() {
            written = self.write_direct(samples);
        }

        if self.buffering_enabled.get() {
            while written < samples.len() {
                let rest = &samples[written..];
                let dropped = if overwrite {
                    (self.ring.borrow().len() + rest.len()).saturating_sub(self.capacity())
                } else {
                    0
                };
                let pushed = self.ring.borrow_mut().push_slice(rest, overwrite);
                if dropped > 0 {
                    log::trace!("fifo: overwrote {dropped} samples");
                }
                written += pushed;

                if self.prebuf.get() && self.samples_in_fifo(false) > 0 {
                    self.prebuf.set(false);
                }
                self.write_from_fifo();
                if pushed == 0 {
                    break;
                }
            }
        }

        self.input_stopped.set(written < samples.len());
        written
    }

    fn flush_samples(&self) {
        self.is_flushing.set(true);
        self.prebuf.set(self.prebuf_samples.get() > 0);
        if self.is_empty() {
            self.flush_downstream();
        } else {
            self.write_from_fifo();
        }
    }

    fn source_slot(&self) -> &SourceSlot {
        &self.source
    }
}

impl AudioSource for AudioFifo {
    fn resume_output(&self) {
        if self.writing.get() {
            self.output_stopped.set(false);
            self.resume_pending.set(true);
            return;
        }
        if !self.output_stopped.replace(false) {
            return;
        }
        if self.buffering_enabled.get() {
            self.write_from_fifo();
        } else if self.input_stopped.replace(false) {
            self.source.resume();
        }
    }

    fn all_samples_flushed(&self) {
        self.sink.flush_done();
        self.flush_completed();
    }

    fn sink_slot(&self) -> &SinkSlot {
        &self.sink
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::pipeline::connect;
    use crate::pipeline::testing::{ramp, tracked_source, RecordingSink, SinkEvent};

    fn chain(fifo: AudioFifo) -> (
        Rc<crate::pipeline::PushSource>,
        crate::pipeline::testing::SourceCounters,
        Rc<AudioFifo>,
        Rc<RecordingSink>,
    ) {
        let (src, counters) = tracked_source();
        let fifo = Rc::new(fifo);
        let sink = RecordingSink::new();
        connect(src.clone(), fifo.clone()).unwrap();
        connect(fifo.clone(), sink.clone()).unwrap();
        (src, counters, fifo, sink)
    }

    // ---- Pass-through and buffering ---

    #[test]
    fn empty_fifo_passes_straight_through() {
        let (src, _, fifo, sink) = chain(AudioFifo::new(16));
        assert_eq!(src.write(&ramp(0, 10)), 10);
        assert_eq!(sink.samples(), ramp(0, 10));
        assert!(fifo.is_empty());
    }

    #[test]
    fn backpressure_is_absorbed_and_released_in_order() {
        let (src, counters, fifo, sink) = chain(AudioFifo::new(16));
        sink.set_budget(Some(4));

        assert_eq!(src.write(&ramp(0, 10)), 10);
        assert_eq!(fifo.samples_in_fifo(true), 6);

        sink.set_unlimited();
        assert_eq!(sink.samples(), ramp(0, 10));
        assert!(fifo.is_empty());
        assert_eq!(counters.resumed.get(), 0);
    }

    #[test]
    fn full_fifo_refuses_and_resumes_upstream() {
        let (src, counters, fifo, sink) = chain(AudioFifo::new(8));
        sink.set_budget(Some(0));

        assert_eq!(src.write(&ramp(0, 20)), 8);
        assert!(fifo.is_full());
        assert_eq!(fifo.space_avail(), 0);

        sink.grant(100);
        assert_eq!(sink.samples(), ramp(0, 8));
        assert_eq!(counters.resumed.get(), 1);

        assert_eq!(src.write(&ramp(8, 12)), 12);
        assert_eq!(sink.samples(), ramp(0, 20));
    }

    #[test]
    fn overwrite_keeps_newest_samples() {
        let fifo = AudioFifo::new(4)
            .with_overwrite(true)
            .with_output_paused(true);
        let (src, _, fifo, sink) = chain(fifo);

        assert_eq!(src.write(&ramp(0, 6)), 6);
        assert!(sink.samples().is_empty());

        fifo.set_output_paused(false);
        assert_eq!(sink.samples(), ramp(2, 4));
    }

    #[test]
    fn output_is_written_in_bounded_chunks() {
        let (src, _, fifo, sink) = chain(AudioFifo::new(4000).with_output_paused(true));
        src.write(&ramp(0, 2000));
        fifo.set_output_paused(false);
        assert_eq!(
            sink.events(),
            vec![
                SinkEvent::Samples(MAX_WRITE_SIZE),
                SinkEvent::Samples(MAX_WRITE_SIZE),
                SinkEvent::Samples(400),
            ]
        );
    }

    #[test]
    fn wrapped_content_comes_out_in_order() {
        let (src, _, fifo, sink) = chain(AudioFifo::new(8));
        sink.set_budget(Some(0));
        src.write(&ramp(0, 6));
        sink.grant(4);
        // Ring now holds 4, 5; the next write wraps around the end.
        src.write(&ramp(6, 5));
        assert_eq!(fifo.samples_in_fifo(true), 7);
        sink.set_unlimited();
        assert_eq!(sink.samples(), ramp(0, 11));
    }

    // ---- Prebuffering ---

    #[test]
    fn prebuffer_holds_output_until_threshold() {
        let (src, _, fifo, sink) = chain(AudioFifo::new(32).with_prebuf_samples(5));

        src.write(&ramp(0, 3));
        assert!(sink.samples().is_empty());
        assert_eq!(fifo.samples_in_fifo(false), 0);
        assert_eq!(fifo.samples_in_fifo(true), 3);

        src.write(&ramp(3, 3));
        assert_eq!(sink.samples(), ramp(0, 6));
    }

    #[test]
    fn flush_releases_a_short_prebuffer_and_rearms_it() {
        let (src, counters, _fifo, sink) = chain(AudioFifo::new(32).with_prebuf_samples(5));

        src.write(&ramp(0, 3));
        src.flush();
        assert_eq!(sink.samples(), ramp(0, 3));
        assert_eq!(counters.flushed.get(), 1);

        src.write(&ramp(3, 3));
        assert_eq!(sink.len(), 3);
    }

    #[test]
    fn prebuf_is_clamped_below_capacity() {
        let fifo = AudioFifo::new(10);
        fifo.set_prebuf_samples(50);
        assert_eq!(fifo.prebuf_samples(), 9);
        fifo.set_size(4);
        assert_eq!(fifo.prebuf_samples(), 3);
        assert_eq!(fifo.capacity(), 4);
    }

    // ---- Flushing ---

    #[test]
    fn flush_of_empty_fifo_is_forwarded_at_once() {
        let (src, counters, _fifo, sink) = chain(AudioFifo::new(8));
        src.write(&ramp(0, 2));
        src.flush();
        assert_eq!(sink.events(), vec![SinkEvent::Samples(2), SinkEvent::Flush]);
        assert_eq!(counters.flushed.get(), 1);
    }

    #[test]
    fn flush_waits_for_buffered_samples() {
        let (src, counters, _fifo, sink) = chain(AudioFifo::new(16));
        sink.set_budget(Some(2));
        sink.set_auto_ack(false);

        src.write(&ramp(0, 6));
        src.flush();
        assert_eq!(sink.flush_count(), 0);

        sink.set_unlimited();
        assert_eq!(
            sink.events(),
            vec![SinkEvent::Samples(2), SinkEvent::Samples(4), SinkEvent::Flush]
        );
        assert_eq!(counters.flushed.get(), 0);

        sink.ack_flush();
        assert_eq!(counters.flushed.get(), 1);
    }

    #[test]
    fn clear_forwards_a_waiting_flush() {
        let (src, counters, fifo, sink) = chain(AudioFifo::new(16).with_output_paused(true));
        src.write(&ramp(0, 6));
        src.flush();
        assert_eq!(counters.flushed.get(), 0);

        fifo.clear();
        assert!(sink.samples().is_empty());
        assert_eq!(sink.flush_count(), 1);
        assert_eq!(counters.flushed.get(), 1);
    }

    #[test]
    fn unconnected_fifo_acknowledges_flush_when_drained() {
        let (src, counters) = tracked_source();
        let fifo = Rc::new(AudioFifo::new(8));
        connect(src.clone(), fifo.clone()).unwrap();

        src.write(&ramp(0, 4));
        src.flush();
        assert_eq!(counters.flushed.get(), 1);
        assert!(fifo.is_empty());
    }

    // ---- Pause / clear ---

    #[test]
    fn paused_output_accumulates_then_releases_in_order() {
        let (src, _, fifo, sink) = chain(AudioFifo::new(32).with_output_paused(true));
        src.write(&ramp(0, 5));
        src.write(&ramp(5, 5));
        assert!(sink.samples().is_empty());
        assert!(fifo.is_output_paused());

        fifo.set_output_paused(false);
        assert_eq!(sink.samples(), ramp(0, 10));
    }

    #[test]
    fn clear_discards_and_resumes_stopped_input() {
        let (src, counters, fifo, sink) = chain(AudioFifo::new(4).with_output_paused(true));
        assert_eq!(src.write(&ramp(0, 6)), 4);

        fifo.clear();
        assert!(fifo.is_empty());
        assert_eq!(counters.resumed.get(), 1);

        fifo.set_output_paused(false);
        assert!(sink.samples().is_empty());
    }

    // ---- Buffering disabled ---

    #[test]
    fn disabled_buffering_passes_backpressure_upstream() {
        let (src, counters, fifo, sink) = chain(AudioFifo::new(16));
        fifo.enable_buffering(false);
        sink.set_budget(Some(3));

        assert_eq!(src.write(&ramp(0, 5)), 3);
        assert!(fifo.is_empty());

        sink.grant(10);
        assert_eq!(counters.resumed.get(), 1);
        assert_eq!(src.write(&ramp(3, 2)), 2);
        assert_eq!(sink.samples(), ramp(0, 5));
    }

    #[test]
    fn disabling_buffering_waits_for_flush() {
        let (src, _, fifo, sink) = chain(AudioFifo::new(16).with_output_paused(true));
        src.write(&ramp(0, 4));
        fifo.enable_buffering(false);
        assert!(fifo.buffering_enabled());

        fifo.set_output_paused(false);
        src.flush();
        assert!(!fifo.buffering_enabled());
        assert_eq!(sink.samples(), ramp(0, 4));
    }
}
