//! Demo entry point: streams tone bursts from a producer thread through the
//! resampling pipeline into a paced level meter, then runs a voter over
//! simulated receivers if `voter.toml` has a `[Voter]` section.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`StreamSettings`] from disk (returns default on first run) and
//!    the voter [`Config`] (empty when `voter.toml` is missing).
//! 3. Create a current-thread [`tokio`] runtime and a `LocalSet`.
//! 4. Wire ThreadSource → decimator → interpolator → fifo → pacer → meter.
//! 5. Spawn the producer thread, which writes bursts in real time, flushes
//!    after each one and waits for the flush to come back.
//! 6. Wait for the producer on the event loop and report the meter.
//! 7. With a `[Voter]` section, let every simulated receiver open at once
//!    and report which one the voter picked.
//!
//! A minimal `voter.toml`:
//!
//! ```toml
//! [Voter]
//! RECEIVERS = ["Rx1", "Rx2", "Rx3"]
//! VOTING_DELAY = 200
//! ```

use std::cell::{Cell, RefCell};
use std::f32::consts::PI;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use tokio::sync::oneshot;
use tokio::task::LocalSet;

use ham_stream::{
    audio::FirCoefficients,
    config::{AppPaths, Config, StreamSettings},
    pipeline::{
        connect, AudioDecimator, AudioFifo, AudioInterpolator, AudioPacer, AudioSource,
        CallbackSink, PushSource, ThreadSource, ThreadSourceWriter,
    },
    voter::{Receiver, RxEvent, RxEventHandler, Voter},
    INTERNAL_SAMPLE_RATE,
};

/// Number of tone bursts the producer sends.
const BURSTS: usize = 3;
/// Length of one burst.
const BURST_MS: u32 = 500;
/// Producer chunk length.
const CHUNK_MS: u32 = 20;
const TONE_HZ: f32 = 1000.0;
/// Section of `voter.toml` the demo voter reads.
const VOTER_SECTION: &str = "Voter";
/// Signal levels handed to the simulated receivers, in turn.
const SIM_LEVELS: [f32; 3] = [12.0, 30.0, 21.0];

fn tone(phase: &mut f32, step: f32, len: usize) -> Vec<f32> {
    (0..len)
        .map(|_| {
            let s = 0.5 * phase.sin();
            *phase = (*phase + step) % (2.0 * PI);
            s
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Level meter
// ---------------------------------------------------------------------------

/// Accumulates peak and RMS over one reporting window.
struct LevelMeter {
    window: usize,
    count: Cell<usize>,
    sum_sq: Cell<f64>,
    peak: Cell<f32>,
    total: Cell<usize>,
}

impl LevelMeter {
    fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            count: Cell::new(0),
            sum_sq: Cell::new(0.0),
            peak: Cell::new(0.0),
            total: Cell::new(0),
        }
    }

    fn update(&self, samples: &[f32]) {
        for &s in samples {
            self.sum_sq.set(self.sum_sq.get() + f64::from(s) * f64::from(s));
            self.peak.set(self.peak.get().max(s.abs()));
            self.count.set(self.count.get() + 1);
            if self.count.get() >= self.window {
                self.report();
            }
        }
        self.total.set(self.total.get() + samples.len());
    }

    fn report(&self) {
        let count = self.count.replace(0);
        if count == 0 {
            return;
        }
        let rms = (self.sum_sq.replace(0.0) / count as f64).sqrt();
        let peak = self.peak.replace(0.0);
        log::info!("meter: {count} samples, rms {rms:.3}, peak {peak:.3}");
    }
}

// ---------------------------------------------------------------------------
// Producer
// ---------------------------------------------------------------------------

fn produce(writer: ThreadSourceWriter, sample_rate: u32) {
    let chunk = (CHUNK_MS * sample_rate / 1000) as usize;
    let chunks = (BURST_MS / CHUNK_MS) as usize;
    let step = 2.0 * PI * TONE_HZ / sample_rate as f32;

    for burst in 0..BURSTS {
        let mut phase = 0.0f32;
        for _ in 0..chunks {
            writer.write(&tone(&mut phase, step, chunk));
            std::thread::sleep(Duration::from_millis(u64::from(CHUNK_MS)));
        }

        writer.flush();
        if writer.wait_all_flushed_timeout(Duration::from_secs(5)) {
            log::info!("producer: burst {} delivered", burst + 1);
        } else {
            log::warn!("producer: burst {} not acknowledged in time", burst + 1);
        }
    }
}

// ---------------------------------------------------------------------------
// Simulated receivers
// ---------------------------------------------------------------------------

/// A receiver with a fixed signal level whose squelch the demo drives.
struct SimRx {
    name: String,
    level: f32,
    open: Cell<bool>,
    muted: Cell<bool>,
    audio: Rc<PushSource>,
    handler: RefCell<Option<Rc<dyn Fn(RxEvent)>>>,
}

impl SimRx {
    fn new(name: &str, level: f32) -> Rc<Self> {
        Rc::new(Self {
            name: name.to_owned(),
            level,
            open: Cell::new(false),
            muted: Cell::new(true),
            audio: Rc::new(PushSource::new()),
            handler: RefCell::new(None),
        })
    }

    fn set_open(&self, open: bool) {
        if self.open.replace(open) == open {
            return;
        }
        let handler = self.handler.borrow().clone();
        if let Some(handler) = handler {
            handler(RxEvent::Squelch { open });
        }
    }

    fn send(&self, samples: &[f32]) {
        if self.open.get() {
            self.audio.write(samples);
        }
    }
}

impl Receiver for SimRx {
    fn name(&self) -> &str {
        &self.name
    }

    fn signal_strength(&self) -> f32 {
        self.level
    }

    fn squelch_is_open(&self) -> bool {
        self.open.get()
    }

    fn set_muted(&self, muted: bool) {
        if self.muted.replace(muted) != muted {
            log::debug!("{}: {}", self.name, if muted { "muted" } else { "unmuted" });
        }
    }

    fn reset(&self) {
        self.open.set(false);
    }

    fn audio_source(&self) -> Rc<dyn AudioSource> {
        self.audio.clone()
    }

    fn set_event_handler(&self, handler: RxEventHandler) {
        *self.handler.borrow_mut() = Some(Rc::from(handler));
    }
}

/// Open every receiver at once, keep them talking for twice the voting
/// delay and report the winner.
async fn run_voter(cfg: &Config) -> Result<()> {
    let mut receivers: Vec<Rc<SimRx>> = Vec::new();
    let voter = Voter::initialize(cfg, VOTER_SECTION, |name| {
        let level = SIM_LEVELS[receivers.len() % SIM_LEVELS.len()];
        let rx = SimRx::new(name, level);
        receivers.push(Rc::clone(&rx));
        Some(rx as Rc<dyn Receiver>)
    })?;
    log::info!(
        "voter: {} receivers, voting delay {:?}",
        voter.receiver_count(),
        voter.voting_delay()
    );

    let heard = Rc::new(Cell::new(0usize));
    let counter = Rc::clone(&heard);
    let sink = Rc::new(CallbackSink::new(move |samples: &[f32]| {
        counter.set(counter.get() + samples.len());
        samples.len()
    }));
    connect(voter.audio_source(), sink)?;
    voter.set_event_handler(Box::new(|event: RxEvent| log::info!("voter event: {event:?}")));

    let rate = INTERNAL_SAMPLE_RATE;
    let chunk = (CHUNK_MS * rate / 1000) as usize;
    let step = 2.0 * PI * TONE_HZ / rate as f32;
    let talk_ms = (voter.voting_delay().as_millis() as u32 * 2).max(BURST_MS);

    for rx in &receivers {
        rx.set_open(true);
    }
    let mut phase = 0.0f32;
    for _ in 0..talk_ms / CHUNK_MS {
        let samples = tone(&mut phase, step, chunk);
        for rx in &receivers {
            rx.send(&samples);
        }
        tokio::time::sleep(Duration::from_millis(u64::from(CHUNK_MS))).await;
    }

    let winner = voter
        .active_rx()
        .and_then(|i| receivers.get(i))
        .map_or("nobody", |rx| rx.name());
    log::info!(
        "voter: {winner} won (id {}), {} samples heard",
        voter.sql_rx_id(),
        heard.get()
    );

    for rx in &receivers {
        rx.set_open(false);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Assembly
// ---------------------------------------------------------------------------

async fn run(settings: StreamSettings, voter_cfg: Config) -> Result<()> {
    let rate = settings.audio.sample_rate;
    let factor = settings.resampler.factor;
    ensure!(rate > 0, "audio.sample_rate must be > 0");
    ensure!(factor > 0, "resampler.factor must be > 0");
    ensure!(settings.resampler.taps > 0, "resampler.taps must be > 0");
    ensure!(settings.pacer.block_size > 0, "pacer.block_size must be > 0");

    let coeffs = FirCoefficients::lowpass(settings.resampler.taps, 0.45 / factor as f32);

    let source = ThreadSource::new();
    let decimator = Rc::new(AudioDecimator::decimator(factor, coeffs.clone()));
    let interpolator = Rc::new(AudioInterpolator::interpolator(factor, coeffs));
    let fifo = Rc::new(
        AudioFifo::new(settings.fifo.size_samples(rate))
            .with_prebuf_samples(settings.fifo.prebuf_samples(rate)),
    );
    let pacer = AudioPacer::new(rate, settings.pacer.block_size, settings.pacer.prebuf_ms);

    let meter = Rc::new(LevelMeter::new(rate as usize / 4));
    let sink_meter = Rc::clone(&meter);
    let sink = Rc::new(CallbackSink::new(move |samples: &[f32]| {
        sink_meter.update(samples);
        samples.len()
    }));

    connect(source.clone(), decimator.clone())?;
    connect(decimator, interpolator.clone())?;
    connect(interpolator, fifo.clone())?;
    connect(fifo, pacer.clone())?;
    connect(pacer.clone(), sink)?;
    log::info!(
        "pipeline: {rate} Hz, resample factor {factor}, pacer block {} ({:?})",
        pacer.block_size(),
        pacer.period()
    );

    let writer = source.writer();
    let (done_tx, done_rx) = oneshot::channel();
    let producer = std::thread::spawn(move || {
        produce(writer, rate);
        let _ = done_tx.send(());
    });

    done_rx.await?;
    producer
        .join()
        .map_err(|_| anyhow!("producer thread panicked"))?;

    meter.report();
    log::info!("done: {} samples delivered", meter.total.get());

    if voter_cfg.sections().any(|s| s == VOTER_SECTION) {
        run_voter(&voter_cfg).await?;
    } else {
        log::info!("no [{VOTER_SECTION}] section configured; skipping the voter");
    }
    Ok(())
}

fn main() -> Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("ham-stream demo starting up");

    // 2. Configuration
    if StreamSettings::is_first_run() {
        log::info!("no settings file yet; using defaults");
    }
    let settings = StreamSettings::load().unwrap_or_else(|e| {
        log::warn!("Failed to load settings ({e:#}); using defaults");
        StreamSettings::default()
    });
    let paths = AppPaths::new();
    log::debug!("config directory: {}", paths.config_dir().display());
    let voter_cfg = Config::load_from(&paths.voter_file)?;

    // 3. Event loop
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    LocalSet::new().block_on(&rt, run(settings, voter_cfg))
}
