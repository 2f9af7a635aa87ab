use std::f64::consts::PI;

use crate::phase::PhaseClock;
use crate::voices::{Voice, VoiceSet};

/// Cadence of the precomputed convergence set-points, seconds. Dense enough
/// that the device never produces an audible frequency step.
pub const SET_POINT_INTERVAL: f64 = 0.010;

/// Cosine ease-in-out with zero slope at both ends. Inputs outside [0, 1]
/// clamp so the endpoints are exact in floating point.
pub fn ease_in_out(p: f64) -> f64 {
    if p <= 0.0 {
        0.0
    } else if p >= 1.0 {
        1.0
    } else {
        0.5 * (1.0 - (PI * p).cos())
    }
}

/// One timed frequency update covering every voice; `frequencies[i]` belongs
/// to voice `i`.
#[derive(Clone, Debug, PartialEq)]
pub struct SetPoint {
    pub time: f64,
    pub frequencies: Vec<f64>,
}

/// Computes the full chaos-to-sustain frequency timeline ahead of playback,
/// and answers the same interpolation question for live snapshot queries so
/// a sampled value always matches what the device will eventually play.
#[derive(Clone, Copy, Debug)]
pub struct ConvergenceScheduler {
    chaos_end: f64,
    duration: f64,
}

impl ConvergenceScheduler {
    pub fn new(clock: &PhaseClock) -> Self {
        Self {
            chaos_end: clock.chaos_end(),
            duration: clock.converge_end() - clock.chaos_end(),
        }
    }

    /// Dense set-point sequence for the whole converge window. The first
    /// point reproduces each voice's start frequency exactly and the last
    /// reproduces its target exactly.
    pub fn plan(&self, voices: &VoiceSet) -> Vec<SetPoint> {
        let updates = self.update_count();
        (0..=updates)
            .map(|k| {
                let eased = ease_in_out(k as f64 / updates as f64);
                SetPoint {
                    time: self.chaos_end + k as f64 * SET_POINT_INTERVAL,
                    frequencies: voices
                        .iter()
                        .map(|voice| Self::frequency_at(voice, eased))
                        .collect(),
                }
            })
            .collect()
    }

    /// Eased progress for an elapsed time, for live interpolation queries.
    pub fn eased_progress(&self, elapsed: f64) -> f64 {
        ease_in_out((elapsed - self.chaos_end) / self.duration)
    }

    /// Voice frequency at an eased progress value. The endpoints return the
    /// start and target frequencies themselves; `a + (b - a) * 1.0` is not
    /// guaranteed to round back to `b`.
    pub fn frequency_at(voice: &Voice, eased: f64) -> f64 {
        if eased <= 0.0 {
            voice.start_frequency
        } else if eased >= 1.0 {
            voice.target_frequency
        } else {
            voice.start_frequency + (voice.target_frequency - voice.start_frequency) * eased
        }
    }

    fn update_count(&self) -> usize {
        // the epsilon keeps an exact multiple of the interval from rounding
        // down to one update short
        let n = (self.duration / SET_POINT_INTERVAL + 1e-9).floor() as usize;
        n.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fixture() -> (ConvergenceScheduler, VoiceSet) {
        let config = EngineConfig::default();
        let clock = PhaseClock::new(&config);
        let mut rng = StdRng::seed_from_u64(11);
        (
            ConvergenceScheduler::new(&clock),
            VoiceSet::generate(&config, &mut rng),
        )
    }

    #[test]
    fn ease_endpoints_are_exact() {
        assert_eq!(ease_in_out(0.0), 0.0);
        assert_eq!(ease_in_out(1.0), 1.0);
        assert_eq!(ease_in_out(-0.5), 0.0);
        assert_eq!(ease_in_out(2.0), 1.0);
        assert!((ease_in_out(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ease_is_monotonic() {
        let mut previous = 0.0;
        for k in 1..=1000 {
            let value = ease_in_out(k as f64 / 1000.0);
            assert!(value >= previous);
            previous = value;
        }
    }

    #[test]
    fn plan_covers_the_converge_window_at_fixed_cadence() {
        let (scheduler, voices) = fixture();
        let plan = scheduler.plan(&voices);
        // 3 s window at 10 ms cadence: updates 0..=300
        assert_eq!(plan.len(), 301);
        assert_eq!(plan[0].time, 4.0);
        assert!((plan[1].time - plan[0].time - SET_POINT_INTERVAL).abs() < 1e-12);
        assert!(plan.last().unwrap().time <= 7.0 + 1e-9);
        for point in &plan {
            assert_eq!(point.frequencies.len(), voices.len());
        }
    }

    #[test]
    fn plan_endpoints_reproduce_start_and_target_exactly() {
        let (scheduler, voices) = fixture();
        let plan = scheduler.plan(&voices);
        let first = plan.first().unwrap();
        let last = plan.last().unwrap();
        for (i, voice) in voices.iter().enumerate() {
            assert_eq!(first.frequencies[i], voice.start_frequency);
            assert_eq!(last.frequencies[i], voice.target_frequency);
        }
    }

    #[test]
    fn trajectories_never_overshoot() {
        let (scheduler, voices) = fixture();
        let plan = scheduler.plan(&voices);
        for (i, voice) in voices.iter().enumerate() {
            let rising = voice.target_frequency >= voice.start_frequency;
            let mut previous = voice.start_frequency;
            for point in &plan {
                let f = point.frequencies[i];
                if rising {
                    assert!(f >= previous - 1e-9);
                } else {
                    assert!(f <= previous + 1e-9);
                }
                previous = f;
            }
        }
    }

    #[test]
    fn live_query_matches_the_plan_formula() {
        let (scheduler, voices) = fixture();
        let voice = &voices.voices()[0];
        assert_eq!(
            ConvergenceScheduler::frequency_at(voice, scheduler.eased_progress(4.0)),
            voice.start_frequency
        );
        assert_eq!(
            ConvergenceScheduler::frequency_at(voice, scheduler.eased_progress(7.0)),
            voice.target_frequency
        );
        let mid = ConvergenceScheduler::frequency_at(voice, scheduler.eased_progress(5.5));
        let (lo, hi) = if voice.start_frequency < voice.target_frequency {
            (voice.start_frequency, voice.target_frequency)
        } else {
            (voice.target_frequency, voice.start_frequency)
        };
        assert!(mid > lo && mid < hi);
    }
}
