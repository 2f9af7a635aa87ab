use rand::Rng;

use crate::config::EngineConfig;
use crate::loudness;

/// D-major ladder the chord converges onto: D, F#, A repeated over five
/// octaves. Order is significant; voice `i` targets entry `i mod 15`.
pub const TARGET_LADDER: [f64; 15] = [
    73.42, 92.50, 110.00, 146.83, 185.00, 220.00, 293.66, 369.99, 440.00, 587.33, 739.99, 880.00,
    1174.66, 1479.98, 1760.00,
];

/// Upper bound on the randomized per-voice entry delay, seconds. Staggered
/// entries keep the voices from phasing against each other at onset.
pub const MAX_ENTRY_DELAY: f64 = 0.5;

/// One oscillator trajectory from a random start frequency to its ladder
/// target. All fields are fixed at creation; the current frequency is always
/// derived from phase and elapsed time, never stored.
#[derive(Clone, Debug, PartialEq)]
pub struct Voice {
    pub index: usize,
    pub start_frequency: f64,
    pub target_frequency: f64,
    pub compensation_gain: f64,
    pub entry_delay: f64,
}

/// Fixed-size set of voices created fresh on every start and discarded on
/// stop. Runs never share voices.
#[derive(Clone, Debug)]
pub struct VoiceSet {
    voices: Vec<Voice>,
}

impl VoiceSet {
    /// Draw a new voice set. The generator is injected so runs are
    /// reproducible under a fixed seed.
    pub fn generate<R: Rng>(config: &EngineConfig, rng: &mut R) -> Self {
        let voices = (0..config.voice_count)
            .map(|index| {
                let target_frequency = TARGET_LADDER[index % TARGET_LADDER.len()];
                Voice {
                    index,
                    start_frequency: rng.gen_range(config.min_start_freq..config.max_start_freq),
                    target_frequency,
                    compensation_gain: loudness::gain(target_frequency),
                    entry_delay: rng.gen_range(0.0..MAX_ENTRY_DELAY),
                }
            })
            .collect();
        Self { voices }
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Voice> {
        self.voices.iter()
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn generate(seed: u64) -> VoiceSet {
        let config = EngineConfig::default();
        let mut rng = StdRng::seed_from_u64(seed);
        VoiceSet::generate(&config, &mut rng)
    }

    #[test]
    fn ladder_wraps_after_fifteen_voices() {
        let set = generate(7);
        assert_eq!(set.len(), 30);
        let voices = set.voices();
        assert_eq!(voices[0].target_frequency, voices[15].target_frequency);
        assert_eq!(voices[14].target_frequency, voices[29].target_frequency);
        assert_eq!(voices[0].target_frequency, 73.42);
        assert_eq!(voices[8].target_frequency, 440.00);
    }

    #[test]
    fn start_frequencies_stay_in_range() {
        let config = EngineConfig::default();
        let set = generate(7);
        for voice in set.iter() {
            assert!(voice.start_frequency >= config.min_start_freq);
            assert!(voice.start_frequency < config.max_start_freq);
            assert!(voice.entry_delay >= 0.0 && voice.entry_delay < MAX_ENTRY_DELAY);
        }
    }

    #[test]
    fn compensation_gain_is_fixed_from_the_target() {
        let set = generate(7);
        for voice in set.iter() {
            assert_eq!(voice.compensation_gain, loudness::gain(voice.target_frequency));
        }
        // low targets get boosted, mid targets stay at the reference
        assert_eq!(set.voices()[0].compensation_gain, 3.0);
        assert_eq!(set.voices()[8].compensation_gain, 1.5);
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        let a = generate(42);
        let b = generate(42);
        let c = generate(43);
        assert_eq!(a.voices(), b.voices());
        assert_ne!(a.voices(), c.voices());
    }
}
