use crate::config::EngineConfig;

/// Lifecycle phase of one playback run. `Idle` is only entered through an
/// explicit stop (user or auto-stop); while playing, phases advance strictly
/// forward with elapsed time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Chaos,
    Converge,
    Sustain,
}

/// Derives the phase and progress for any elapsed time, recomputed from
/// scratch on every call so a missed or late tick can never leave stale
/// state behind.
#[derive(Clone, Copy, Debug)]
pub struct PhaseClock {
    chaos: f64,
    converge: f64,
    sustain: f64,
    fade: f64,
}

impl PhaseClock {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            chaos: config.chaos_duration,
            converge: config.converge_duration,
            sustain: config.sustain_duration,
            fade: config.fade_duration,
        }
    }

    pub fn chaos_end(&self) -> f64 {
        self.chaos
    }

    pub fn converge_end(&self) -> f64 {
        self.chaos + self.converge
    }

    pub fn fade_start(&self) -> f64 {
        self.chaos + self.converge + self.sustain
    }

    pub fn total_duration(&self) -> f64 {
        self.chaos + self.converge + self.sustain + self.fade
    }

    /// Phase for an elapsed time within a running playback. A boundary value
    /// belongs to the later phase: elapsed == chaos_end is already Converge.
    pub fn phase_at(&self, elapsed: f64) -> Phase {
        if elapsed < self.chaos_end() {
            Phase::Chaos
        } else if elapsed < self.converge_end() {
            Phase::Converge
        } else {
            Phase::Sustain
        }
    }

    /// Fraction [0, 1] through the current phase. Sustain spans the sustain
    /// and fade durations together, since fade is a sub-state of sustain.
    pub fn progress_within_phase(&self, elapsed: f64) -> f64 {
        let (start, length) = match self.phase_at(elapsed) {
            Phase::Idle | Phase::Chaos => (0.0, self.chaos),
            Phase::Converge => (self.chaos_end(), self.converge),
            Phase::Sustain => (self.converge_end(), self.sustain + self.fade),
        };
        ((elapsed - start) / length).clamp(0.0, 1.0)
    }

    /// True once elapsed time has crossed the fade-out boundary.
    pub fn is_fading(&self, elapsed: f64) -> bool {
        elapsed >= self.fade_start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> PhaseClock {
        PhaseClock::new(&EngineConfig::default())
    }

    #[test]
    fn phase_boundaries_belong_to_the_later_phase() {
        let clock = clock();
        assert_eq!(clock.phase_at(0.0), Phase::Chaos);
        assert_eq!(clock.phase_at(3.999), Phase::Chaos);
        assert_eq!(clock.phase_at(4.0), Phase::Converge);
        assert_eq!(clock.phase_at(4.001), Phase::Converge);
        assert_eq!(clock.phase_at(6.999), Phase::Converge);
        assert_eq!(clock.phase_at(7.0), Phase::Sustain);
        assert_eq!(clock.phase_at(11.5), Phase::Sustain);
        assert_eq!(clock.phase_at(100.0), Phase::Sustain);
    }

    #[test]
    fn totals_match_the_duration_sum() {
        let clock = clock();
        assert_eq!(clock.chaos_end(), 4.0);
        assert_eq!(clock.converge_end(), 7.0);
        assert_eq!(clock.fade_start(), 11.0);
        assert_eq!(clock.total_duration(), 12.0);
    }

    #[test]
    fn progress_within_each_phase() {
        let clock = clock();
        assert_eq!(clock.progress_within_phase(0.0), 0.0);
        assert!((clock.progress_within_phase(2.0) - 0.5).abs() < 1e-12);
        assert!((clock.progress_within_phase(5.5) - 0.5).abs() < 1e-12);
        assert!((clock.progress_within_phase(9.5) - 0.5).abs() < 1e-12);
        assert_eq!(clock.progress_within_phase(12.0), 1.0);
        assert_eq!(clock.progress_within_phase(20.0), 1.0);
    }

    #[test]
    fn fade_is_a_sustain_substate() {
        let clock = clock();
        assert!(!clock.is_fading(10.999));
        assert!(clock.is_fading(11.0));
        assert_eq!(clock.phase_at(11.0), Phase::Sustain);
    }
}
