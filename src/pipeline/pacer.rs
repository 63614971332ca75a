//! Re-times a bursty producer to the nominal sample rate.
//!
//! ```text
//! prebuffering ──prebuffer target reached──▶ pacing (periodic timer)
//!      ▲                                        │
//!      └──── tick with a partial block ─────────┘
//!      └──── flush acknowledged ────────────────┘
//! ```
//!
//! While prebuffering, input goes straight through.  Once the prebuffer
//! target has been passed a periodic timer with period
//! `block_size / sample_rate` is armed and input only fills a block buffer;
//! each tick releases exactly one full block.  A tick that finds the block
//! incomplete emits nothing, stops the timer and goes back to prebuffering.
//! The partial block is kept and goes out ahead of the next input, or
//! straight away if a flush is waiting.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::runtime::{Timer, TimerKind};

use super::endpoint::{AudioSink, AudioSource, SinkSlot, SourceSlot};

pub struct AudioPacer {
    block_size: usize,
    prebuf_samples: usize,
    block: RefCell<Vec<f32>>,
    /// Output the sink has not taken yet, sent before anything else.
    backlog: RefCell<Vec<f32>>,
    prebuf_left: Cell<usize>,
    pacing: Cell<bool>,
    timer: Timer,
    /// Upstream flush not yet forwarded.
    flush_requested: Cell<bool>,
    /// Forwarded flush whose acknowledgement goes upstream.
    is_flushing: Cell<bool>,
    input_stopped: Cell<bool>,
    output_stopped: Cell<bool>,
    writing: Cell<bool>,
    resume_pending: Cell<bool>,
    weak_self: Weak<AudioPacer>,
    source: SourceSlot,
    sink: SinkSlot,
}

impl AudioPacer {
    /// # Panics
    ///
    /// Panics if `sample_rate` or `block_size` is zero.
    pub fn new(sample_rate: u32, block_size: usize, prebuf_ms: u32) -> Rc<Self> {
        assert!(sample_rate > 0, "pacer sample rate must be > 0");
        assert!(block_size > 0, "pacer block size must be > 0");

        let prebuf_samples = (prebuf_ms as u64 * sample_rate as u64 / 1000) as usize;
        let period =
            Duration::from_micros(block_size as u64 * 1_000_000 / sample_rate as u64);

        Rc::new_cyclic(|weak_self| Self {
            block_size,
            prebuf_samples,
            block: RefCell::new(Vec::with_capacity(block_size)),
            backlog: RefCell::new(Vec::new()),
            prebuf_left: Cell::new(prebuf_samples),
            pacing: Cell::new(false),
            timer: Timer::new(period, TimerKind::Periodic),
            flush_requested: Cell::new(false),
            is_flushing: Cell::new(false),
            input_stopped: Cell::new(false),
            output_stopped: Cell::new(false),
            writing: Cell::new(false),
            resume_pending: Cell::new(false),
            weak_self: weak_self.clone(),
            source: SourceSlot::new(),
            sink: SinkSlot::new(),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn is_pacing(&self) -> bool {
        self.pacing.get()
    }

    /// Time between released blocks.
    pub fn period(&self) -> Duration {
        self.timer.timeout()
    }

    fn start_pacing(&self) {
        self.pacing.set(true);
        let weak = self.weak_self.clone();
        self.timer.start(move || {
            if let Some(pacer) = weak.upgrade() {
                pacer.tick();
            }
        });
    }

    fn stop_pacing(&self) {
        self.timer.stop();
        self.pacing.set(false);
        self.prebuf_left.set(self.prebuf_samples);
    }

    /// Write to the sink; whatever it refuses joins the backlog.
    fn output(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        if !self.drain_backlog() {
            self.backlog.borrow_mut().extend_from_slice(samples);
            return;
        }

        self.writing.set(true);
        let mut written = 0;
        while written < samples.len() {
            written += self.sink.write(&samples[written..]);
            if written < samples.len() && !self.resume_pending.replace(false) {
                self.output_stopped.set(true);
                break;
            }
        }
        self.resume_pending.set(false);
        self.writing.set(false);

        if written < samples.len() {
            self.backlog
                .borrow_mut()
                .extend_from_slice(&samples[written..]);
        }
    }

    /// Returns `true` once the backlog is empty.
    fn drain_backlog(&self) -> bool {
        if self.backlog.borrow().is_empty() {
            return true;
        }
        if self.output_stopped.get() || self.writing.get() || self.sink.is_flushing() {
            return false;
        }
        let backlog = self.backlog.take();
        self.output(&backlog);
        self.backlog.borrow().is_empty()
    }

    fn tick(&self) {
        if !self.drain_backlog() {
            return;
        }

        if self.block.borrow().len() < self.block_size {
            log::debug!(
                "pacer: underrun with {} of {} samples",
                self.block.borrow().len(),
                self.block_size
            );
            self.stop_pacing();
            let partial = self.block.take();
            self.backlog.borrow_mut().extend_from_slice(&partial);
            if self.flush_requested.get() && self.drain_backlog() {
                self.flush_downstream();
            }
        } else {
            let block = self.block.replace(Vec::with_capacity(self.block_size));
            self.output(&block);
            if self.flush_requested.get() && self.backlog.borrow().is_empty() {
                self.flush_downstream();
            }
        }

        if self.input_stopped.replace(false) {
            self.source.resume();
        }
    }

    fn flush_downstream(&self) {
        if !self.flush_requested.get() || self.sink.is_flushing() {
            return;
        }
        self.flush_requested.set(false);
        self.is_flushing.set(true);
        if !self.sink.flush() {
            self.flush_completed();
        }
    }

    fn flush_completed(&self) {
        if self.block.borrow().is_empty() && self.backlog.borrow().is_empty() {
            self.stop_pacing();
        }
        if self.is_flushing.replace(false) {
            self.source.flushed();
        } else if self.input_stopped.replace(false) {
            self.source.resume();
        }
    }
}

impl AudioSink for AudioPacer {
    fn write_samples(&self, samples: &[f32]) -> usize {
        if samples.is_empty() {
            return 0;
        }
        self.flush_requested.set(false);
        self.input_stopped.set(false);

        if !self.drain_backlog() {
            self.input_stopped.set(true);
            return 0;
        }

        let mut written = 0;
        if !self.pacing.get() {
            let direct = self.prebuf_left.get().min(samples.len());
            self.output(&samples[..direct]);
            self.prebuf_left.set(self.prebuf_left.get() - direct);
            written = direct;
            if self.prebuf_left.get() == 0 {
                self.start_pacing();
            }
        }

        if self.pacing.get() && written < samples.len() {
            let mut block = self.block.borrow_mut();
            let n = (self.block_size - block.len()).min(samples.len() - written);
            block.extend_from_slice(&samples[written..written + n]);
            written += n;
        }

        if written < samples.len() {
            self.input_stopped.set(true);
        }
        written
    }

    fn flush_samples(&self) {
        self.flush_requested.set(true);
        if !self.pacing.get() {
            if self.drain_backlog() {
                self.flush_downstream();
            }
        } else if self.block.borrow().is_empty() && self.backlog.borrow().is_empty() {
            self.flush_downstream();
        }
    }

    fn source_slot(&self) -> &SourceSlot {
        &self.source
    }
}

impl AudioSource for AudioPacer {
    fn resume_output(&self) {
        if self.writing.get() {
            self.output_stopped.set(false);
            self.resume_pending.set(true);
            return;
        }
        if !self.output_stopped.replace(false) || !self.drain_backlog() {
            return;
        }
        if !self.pacing.get() || self.block.borrow().is_empty() {
            self.flush_downstream();
        }
        if self.input_stopped.replace(false) {
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
    use super::*;
    use crate::pipeline::connect;
    use crate::pipeline::testing::{ramp, tracked_source, RecordingSink, SinkEvent};
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    const RATE: u32 = 8_000;
    const BLOCK: usize = 80; // 10 ms
    const PREBUF_MS: u32 = 20; // 160 samples

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn chain() -> (
        Rc<crate::pipeline::PushSource>,
        crate::pipeline::testing::SourceCounters,
        Rc<AudioPacer>,
        Rc<RecordingSink>,
    ) {
        let (src, counters) = tracked_source();
        let pacer = AudioPacer::new(RATE, BLOCK, PREBUF_MS);
        let sink = RecordingSink::new();
        connect(src.clone(), pacer.clone()).unwrap();
        connect(pacer.clone(), sink.clone()).unwrap();
        (src, counters, pacer, sink)
    }

    #[test]
    fn period_matches_block_duration() {
        let pacer = AudioPacer::new(RATE, BLOCK, PREBUF_MS);
        assert_eq!(pacer.period(), ms(10));
        assert!(!pacer.is_pacing());
    }

    #[tokio::test(start_paused = true)]
    async fn prebuffer_passes_straight_through() {
        LocalSet::new()
            .run_until(async {
                let (src, _, pacer, sink) = chain();
                assert_eq!(src.write(&ramp(0, 100)), 100);
                assert_eq!(sink.samples(), ramp(0, 100));
                assert!(!pacer.is_pacing());

                // 60 more complete the prebuffer, the other 40 start a block.
                assert_eq!(src.write(&ramp(100, 100)), 100);
                assert_eq!(sink.samples(), ramp(0, 160));
                assert!(pacer.is_pacing());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn steady_state_releases_one_block_per_tick() {
        LocalSet::new()
            .run_until(async {
                let (src, counters, _pacer, sink) = chain();
                src.write(&ramp(0, 160));
                assert_eq!(src.write(&ramp(160, 80)), 80);
                assert_eq!(src.write(&ramp(240, 10)), 0);

                sleep(ms(5)).await;
                assert_eq!(sink.len(), 160);

                sleep(ms(10)).await;
                assert_eq!(sink.samples(), ramp(0, 240));
                assert_eq!(counters.resumed.get(), 1);

                assert_eq!(src.write(&ramp(240, 80)), 80);
                sleep(ms(10)).await;
                assert_eq!(sink.samples(), ramp(0, 320));
                assert_eq!(
                    sink.events(),
                    vec![
                        SinkEvent::Samples(160),
                        SinkEvent::Samples(80),
                        SinkEvent::Samples(80)
                    ]
                );
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn underrun_emits_nothing_and_restarts_prebuffering() {
        LocalSet::new()
            .run_until(async {
                let (src, _, pacer, sink) = chain();
                src.write(&ramp(0, 160));
                src.write(&ramp(160, 30));

                sleep(ms(15)).await;
                assert_eq!(sink.len(), 160);
                assert!(!pacer.is_pacing());

                // The held partial block goes out first, then the new input.
                src.write(&ramp(190, 50));
                assert_eq!(sink.samples(), ramp(0, 240));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn flush_is_deferred_until_the_block_is_out() {
        LocalSet::new()
            .run_until(async {
                let (src, counters, pacer, sink) = chain();
                src.write(&ramp(0, 160));
                src.write(&ramp(160, 80));
                src.flush();
                assert_eq!(sink.flush_count(), 0);
                assert_eq!(counters.flushed.get(), 0);

                sleep(ms(15)).await;
                assert_eq!(
                    sink.events(),
                    vec![
                        SinkEvent::Samples(160),
                        SinkEvent::Samples(80),
                        SinkEvent::Flush
                    ]
                );
                assert_eq!(counters.flushed.get(), 1);
                assert!(!pacer.is_pacing());

                // Fresh prebuffer for the next transmission.
                src.write(&ramp(240, 100));
                assert_eq!(sink.len(), 340);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn flush_with_partial_block_releases_it_at_the_tick() {
        LocalSet::new()
            .run_until(async {
                let (src, counters, _pacer, sink) = chain();
                src.write(&ramp(0, 160));
                src.write(&ramp(160, 30));
                src.flush();

                sleep(ms(15)).await;
                assert_eq!(sink.samples(), ramp(0, 190));
                assert_eq!(sink.flush_count(), 1);
                assert_eq!(counters.flushed.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn flush_while_prebuffering_is_immediate() {
        LocalSet::new()
            .run_until(async {
                let (src, counters, _pacer, sink) = chain();
                src.write(&ramp(0, 50));
                src.flush();
                assert_eq!(sink.flush_count(), 1);
                assert_eq!(counters.flushed.get(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn refused_output_is_resent_on_resume() {
        LocalSet::new()
            .run_until(async {
                let (src, counters, _pacer, sink) = chain();
                sink.set_budget(Some(60));

                assert_eq!(src.write(&ramp(0, 100)), 100);
                assert_eq!(sink.len(), 60);
                assert_eq!(src.write(&ramp(100, 10)), 0);

                sink.grant(1000);
                assert_eq!(sink.samples(), ramp(0, 100));
                assert_eq!(counters.resumed.get(), 1);
            })
            .await;
    }
}
