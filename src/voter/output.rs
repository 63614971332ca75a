//! The voter's combined audio output.
//!
//! ```text
//!  sat 0 fifo ─▶ SatGate 0 ─┐
//!  sat 1 fifo ─▶ SatGate 1 ─┼─▶ VoterOutput ─▶ downstream sink
//!  sat 2 fifo ─▶ SatGate 2 ─┘        (only the active gate passes)
//! ```
//!
//! Gates of inactive satellites swallow their writes and have their flushes
//! acknowledged locally, so a satellite buffer never blocks on a receiver
//! that lost the vote.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::pipeline::{AudioSink, AudioSource, SinkSlot, SourceSlot};

// ---------------------------------------------------------------------------
// VoterOutput
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct VoterOutput {
    sink: SinkSlot,
    gates: RefCell<Vec<Weak<SatGate>>>,
    active: Cell<Option<usize>>,
    /// Gates whose flush waits for the downstream acknowledgement.
    flush_waiters: RefCell<Vec<usize>>,
}

impl VoterOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the gate for satellite `index`.  Indices are handed out in
    /// order starting at 0.
    pub fn add_gate(self: &Rc<Self>) -> Rc<SatGate> {
        let mut gates = self.gates.borrow_mut();
        let gate = Rc::new(SatGate {
            index: gates.len(),
            source: SourceSlot::new(),
            stalled: Cell::new(false),
            output: Rc::clone(self),
        });
        gates.push(Rc::downgrade(&gate));
        gate
    }

    /// Select the satellite whose audio passes, or none.
    pub fn set_active(&self, active: Option<usize>) {
        self.active.set(active);
    }

    pub fn active(&self) -> Option<usize> {
        self.active.get()
    }

    fn gate(&self, index: usize) -> Option<Rc<SatGate>> {
        self.gates.borrow().get(index).and_then(Weak::upgrade)
    }

    fn write_from(&self, index: usize, samples: &[f32]) -> usize {
        if self.active.get() != Some(index) {
            return samples.len();
        }
        if self.sink.is_flushing() {
            return 0;
        }
        self.sink.write(samples)
    }

    fn flush_from(&self, index: usize) {
        if self.active.get() != Some(index) {
            if let Some(gate) = self.gate(index) {
                gate.source.flushed();
            }
            return;
        }
        self.flush_waiters.borrow_mut().push(index);
        if self.sink.is_flushing() {
            return;
        }
        if !self.sink.flush() {
            self.flush_completed();
        }
    }

    fn flush_completed(&self) {
        let waiters = self.flush_waiters.take();
        for index in waiters {
            if let Some(gate) = self.gate(index) {
                gate.source.flushed();
            }
        }
        self.resume_gates();
    }

    fn resume_gates(&self) {
        let gates: Vec<Rc<SatGate>> = self
            .gates
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();
        for gate in gates {
            if gate.stalled.replace(false) {
                gate.source.resume();
            }
        }
    }
}

impl AudioSource for VoterOutput {
    fn resume_output(&self) {
        self.resume_gates();
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
// SatGate
// ---------------------------------------------------------------------------

/// The sink end of one satellite buffer.
pub(crate) struct SatGate {
    index: usize,
    source: SourceSlot,
    stalled: Cell<bool>,
    output: Rc<VoterOutput>,
}

impl SatGate {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl AudioSink for SatGate {
    fn write_samples(&self, samples: &[f32]) -> usize {
        let written = self.output.write_from(self.index, samples);
        if written < samples.len() {
            self.stalled.set(true);
        }
        written
    }

    fn flush_samples(&self) {
        self.output.flush_from(self.index);
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
    use crate::pipeline::testing::{
        ramp, tracked_source, RecordingSink, SinkEvent, SourceCounters,
    };
    use crate::pipeline::{connect, PushSource};

    type Setup = (
        Rc<VoterOutput>,
        Vec<Rc<PushSource>>,
        Vec<SourceCounters>,
        Rc<RecordingSink>,
    );

    fn setup(n: usize) -> Setup {
        let output = Rc::new(VoterOutput::new());
        let sink = RecordingSink::new();
        connect(output.clone(), sink.clone()).unwrap();

        let mut sources = Vec::new();
        let mut counters = Vec::new();
        for _ in 0..n {
            let gate = output.add_gate();
            let (src, cnt) = tracked_source();
            connect(src.clone(), gate).unwrap();
            sources.push(src);
            counters.push(cnt);
        }
        (output, sources, counters, sink)
    }

    #[test]
    fn only_the_active_gate_passes() {
        let (output, src, _, sink) = setup(2);
        assert_eq!(src[0].write(&ramp(0, 4)), 4);
        assert_eq!(sink.len(), 0);

        output.set_active(Some(1));
        assert_eq!(src[0].write(&ramp(0, 4)), 4);
        assert_eq!(src[1].write(&ramp(10, 4)), 4);
        assert_eq!(sink.samples(), ramp(10, 4));
        assert_eq!(output.active(), Some(1));
    }

    #[test]
    fn inactive_flush_is_acknowledged_locally() {
        let (output, src, cnt, sink) = setup(2);
        output.set_active(Some(1));
        src[0].write(&ramp(0, 2));
        src[0].flush();
        assert_eq!(cnt[0].flushed.get(), 1);
        assert_eq!(sink.flush_count(), 0);
    }

    #[test]
    fn active_flush_waits_for_downstream() {
        let (output, src, cnt, sink) = setup(2);
        sink.set_auto_ack(false);
        output.set_active(Some(0));

        src[0].write(&ramp(0, 3));
        src[0].flush();
        assert_eq!(sink.events(), vec![SinkEvent::Samples(3), SinkEvent::Flush]);
        assert_eq!(cnt[0].flushed.get(), 0);

        sink.ack_flush();
        assert_eq!(cnt[0].flushed.get(), 1);
    }

    #[test]
    fn switching_during_a_flush_stalls_the_new_gate() {
        let (output, src, cnt, sink) = setup(2);
        sink.set_auto_ack(false);
        output.set_active(Some(0));
        src[0].write(&ramp(0, 3));
        src[0].flush();

        output.set_active(Some(1));
        assert_eq!(src[1].write(&ramp(10, 2)), 0);
        assert!(src[1].is_stalled());

        sink.ack_flush();
        assert_eq!(cnt[0].flushed.get(), 1);
        assert_eq!(cnt[1].resumed.get(), 1);
        assert_eq!(src[1].write(&ramp(10, 2)), 2);
        assert_eq!(sink.samples(), vec![0.0, 1.0, 2.0, 10.0, 11.0]);
    }

    #[test]
    fn backpressure_reaches_the_active_gate() {
        let (output, src, cnt, sink) = setup(1);
        output.set_active(Some(0));
        sink.set_budget(Some(2));
        assert_eq!(src[0].write(&ramp(0, 5)), 2);

        sink.grant(10);
        assert_eq!(cnt[0].resumed.get(), 1);
    }

    #[test]
    fn unconnected_output_discards_and_acks() {
        let output = Rc::new(VoterOutput::new());
        let gate = output.add_gate();
        let (src, cnt) = tracked_source();
        connect(src.clone(), gate.clone()).unwrap();
        assert_eq!(gate.index(), 0);

        output.set_active(Some(0));
        assert_eq!(src.write(&ramp(0, 8)), 8);
        src.flush();
        assert_eq!(cnt.flushed.get(), 1);
    }
}
