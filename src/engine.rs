use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::command::Timeline;
use crate::config::{ConfigError, EngineConfig};
use crate::device::{AudioOutput, DeviceError, NodeId, Waveform};
use crate::phase::{Phase, PhaseClock};
use crate::scheduler::ConvergenceScheduler;
use crate::snapshot::{Snapshot, SnapshotFeed};
use crate::voices::{Voice, VoiceSet};

/// Master gain floor the entry swell starts from; exponential ramps cannot
/// start at zero.
const MASTER_FLOOR: f64 = 0.001;
/// Master level reached by the end of the entry swell.
const MASTER_LEVEL: f64 = 0.6;
/// Crescendo peak hit shortly after convergence lands.
const CRESCENDO_PEAK: f64 = 1.0;
/// Level the crescendo settles back to for the rest of the sustain.
const MASTER_SETTLE: f64 = 0.85;
/// Exponential fade target.
const FADE_FLOOR: f64 = 1e-4;
/// Attack time of a voice's entry ramp, after its randomized entry delay.
const VOICE_ATTACK: f64 = 0.4;
/// Poll cadence of the auto-stop watchdog thread.
const WATCHDOG_INTERVAL: Duration = Duration::from_millis(25);

struct ActiveRun {
    voices: VoiceSet,
    started_at: f64,
    master: NodeId,
    oscillators: Vec<NodeId>,
    feed: SnapshotFeed,
    fade_announced: bool,
}

struct EngineState {
    config: EngineConfig,
    clock: PhaseClock,
    device: Box<dyn AudioOutput>,
    rng: StdRng,
    run: Option<ActiveRun>,
    /// Bumped on every start and stop; a watchdog whose generation no longer
    /// matches has been superseded and must exit without side effects.
    generation: u64,
}

/// Orchestrates one playback run at a time: voice creation, the precomputed
/// device timeline, gain envelopes, the auto-stop watchdog, and the snapshot
/// feed. All state mutation goes through this handle.
#[derive(Clone)]
pub struct SynthesisEngine {
    shared: Arc<Mutex<EngineState>>,
}

impl SynthesisEngine {
    pub fn new(config: EngineConfig, device: Box<dyn AudioOutput>) -> Result<Self, ConfigError> {
        Self::build(config, device, StdRng::from_entropy())
    }

    /// Seeded variant; runs with the same seed and config draw identical
    /// voice sets.
    pub fn with_seed(
        config: EngineConfig,
        device: Box<dyn AudioOutput>,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        Self::build(config, device, StdRng::seed_from_u64(seed))
    }

    fn build(
        config: EngineConfig,
        device: Box<dyn AudioOutput>,
        rng: StdRng,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock = PhaseClock::new(&config);
        Ok(Self {
            shared: Arc::new(Mutex::new(EngineState {
                config,
                clock,
                device,
                rng,
                run: None,
                generation: 0,
            })),
        })
    }

    /// Begin a run. No-op while already playing. On a device failure the
    /// engine stays Idle with no voices allocated.
    pub fn start(&self) -> Result<(), DeviceError> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        if state.run.is_some() {
            return Ok(());
        }
        state.device.resume_if_suspended()?;

        let voices = VoiceSet::generate(&state.config, &mut state.rng);
        let device = state.device.as_mut();
        let started_at = device.current_time();

        let destination = device.destination();
        let master = device.create_gain(MASTER_FLOOR);
        device.connect(master, destination);

        let mut timeline = Timeline::new();
        let base_gain = 1.0 / voices.len() as f64;
        let mut oscillators = Vec::with_capacity(voices.len());
        for voice in voices.iter() {
            let oscillator = device.create_oscillator(Waveform::Sawtooth, voice.start_frequency);
            let gain = device.create_gain(0.0);
            device.connect(oscillator, gain);
            device.connect(gain, master);
            schedule_voice_entry(&mut timeline, gain, voice, base_gain, started_at);
            oscillators.push(oscillator);
        }

        schedule_master_envelope(&mut timeline, master, &state.clock, started_at);
        schedule_convergence(&mut timeline, &oscillators, &voices, &state.clock, started_at);

        debug!(commands = timeline.len(), "submitting device timeline");
        timeline.submit(device);
        for &oscillator in &oscillators {
            device.start_node(oscillator);
        }

        state.generation += 1;
        let generation = state.generation;
        let feed = SnapshotFeed::new(voices.len());
        state.run = Some(ActiveRun {
            voices,
            started_at,
            master,
            oscillators,
            feed,
            fade_announced: false,
        });
        info!(
            voices = state.config.voice_count,
            total_duration = state.clock.total_duration(),
            "playback started"
        );
        drop(guard);

        self.arm_auto_stop(generation);
        Ok(())
    }

    /// End the current run. Idempotent; from Idle it only re-asserts Idle.
    pub fn stop(&self) {
        stop_locked(&mut self.shared.lock());
    }

    /// Sample the engine for the snapshot stream. Host-driven at whatever
    /// cadence the host likes; returns None once the engine is Idle so the
    /// feed self-terminates instead of emitting stale data.
    pub fn tick(&self) -> Option<Snapshot> {
        let mut guard = self.shared.lock();
        let state = &mut *guard;
        let run = state.run.as_mut()?;

        let now = state.device.current_time();
        let elapsed = now - run.started_at;
        let phase = state.clock.phase_at(elapsed);
        let scheduler = ConvergenceScheduler::new(&state.clock);
        let current: Vec<f64> = run
            .voices
            .iter()
            .map(|voice| current_frequency(voice, phase, &scheduler, elapsed))
            .collect();
        run.feed.record(elapsed, &current);

        let targets = run.voices.iter().map(|v| v.target_frequency).collect();
        Some(run.feed.publish(
            targets,
            current,
            elapsed,
            state.clock.total_duration(),
            now,
        ))
    }

    pub fn current_phase(&self) -> Phase {
        let state = self.shared.lock();
        match &state.run {
            None => Phase::Idle,
            Some(run) => state
                .clock
                .phase_at(state.device.current_time() - run.started_at),
        }
    }

    /// Seconds since the run started; 0 while Idle.
    pub fn elapsed_time(&self) -> f64 {
        let state = self.shared.lock();
        match &state.run {
            None => 0.0,
            Some(run) => state.device.current_time() - run.started_at,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.shared.lock().run.is_some()
    }

    pub fn total_duration(&self) -> f64 {
        self.shared.lock().clock.total_duration()
    }

    /// Watchdog for the current run: announces the fade once elapsed time
    /// crosses the fade boundary (the fade ramp itself is already on the
    /// device timeline) and stops the engine when the run is over. A stop or
    /// restart bumps the generation, which retires the thread.
    fn arm_auto_stop(&self, generation: u64) {
        let shared = Arc::clone(&self.shared);
        thread::spawn(move || loop {
            thread::sleep(WATCHDOG_INTERVAL);
            let mut guard = shared.lock();
            let state = &mut *guard;
            if state.generation != generation {
                return;
            }
            let Some(run) = state.run.as_mut() else {
                return;
            };
            let elapsed = state.device.current_time() - run.started_at;
            if !run.fade_announced && state.clock.is_fading(elapsed) {
                run.fade_announced = true;
                info!(elapsed, "fade-out begun");
            }
            if elapsed >= state.clock.total_duration() {
                stop_locked(state);
                info!("auto-stop");
                return;
            }
        });
    }
}

fn stop_locked(state: &mut EngineState) {
    let Some(run) = state.run.take() else {
        return;
    };
    for oscillator in run.oscillators {
        state.device.stop_node(oscillator);
    }
    state.generation += 1;
    info!("playback stopped");
}

fn current_frequency(
    voice: &Voice,
    phase: Phase,
    scheduler: &ConvergenceScheduler,
    elapsed: f64,
) -> f64 {
    match phase {
        Phase::Idle | Phase::Chaos => voice.start_frequency,
        Phase::Converge => {
            ConvergenceScheduler::frequency_at(voice, scheduler.eased_progress(elapsed))
        }
        Phase::Sustain => voice.target_frequency,
    }
}

/// Voice gain: silent until the entry delay passes, then a linear ramp up to
/// the voice's compensated share of the mix.
fn schedule_voice_entry(
    timeline: &mut Timeline,
    gain: NodeId,
    voice: &Voice,
    base_gain: f64,
    started_at: f64,
) {
    let level = base_gain * voice.compensation_gain;
    let ramp_start = started_at + voice.entry_delay;
    timeline.set_value(gain, 0.0, started_at);
    timeline.set_value(gain, 0.0, ramp_start);
    timeline.linear_ramp(gain, level, ramp_start + VOICE_ATTACK);
}

/// Master gain over the whole run: entry swell during the first second of
/// chaos, crescendo peak and settle once convergence lands, exponential
/// fade to near-silence from the fade boundary.
fn schedule_master_envelope(
    timeline: &mut Timeline,
    master: NodeId,
    clock: &PhaseClock,
    started_at: f64,
) {
    let swell = clock.chaos_end().min(1.0);
    timeline.set_value(master, MASTER_FLOOR, started_at);
    timeline.exponential_ramp(master, MASTER_LEVEL, started_at + swell);

    let converge_end = started_at + clock.converge_end();
    let sustain = clock.fade_start() - clock.converge_end();
    let rise = (sustain * 0.5).min(1.0);
    let settle = sustain.min(2.0);
    timeline.set_value(master, MASTER_LEVEL, converge_end);
    timeline.linear_ramp(master, CRESCENDO_PEAK, converge_end + rise);
    timeline.linear_ramp(master, MASTER_SETTLE, converge_end + settle);

    let fade_start = started_at + clock.fade_start();
    timeline.set_value(master, MASTER_SETTLE, fade_start);
    timeline.exponential_ramp(master, FADE_FLOOR, started_at + clock.total_duration());
}

fn schedule_convergence(
    timeline: &mut Timeline,
    oscillators: &[NodeId],
    voices: &VoiceSet,
    clock: &PhaseClock,
    started_at: f64,
) {
    let scheduler = ConvergenceScheduler::new(clock);
    for set_point in scheduler.plan(voices) {
        let time = started_at + set_point.time;
        for (&oscillator, &frequency) in oscillators.iter().zip(&set_point.frequencies) {
            timeline.set_value(oscillator, frequency, time);
        }
    }
}
