use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Engine configuration, validated before the engine will accept it.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct EngineConfig {
    #[serde(default = "default_voice_count")]
    pub voice_count: usize,
    /// Lower bound (inclusive) of the random start-frequency range, Hz.
    #[serde(default = "default_min_start_freq")]
    pub min_start_freq: f64,
    /// Upper bound (exclusive) of the random start-frequency range, Hz.
    #[serde(default = "default_max_start_freq")]
    pub max_start_freq: f64,
    #[serde(default = "default_chaos_duration")]
    pub chaos_duration: f64,
    #[serde(default = "default_converge_duration")]
    pub converge_duration: f64,
    #[serde(default = "default_sustain_duration")]
    pub sustain_duration: f64,
    #[serde(default = "default_fade_duration")]
    pub fade_duration: f64,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_voice_count() -> usize {
    30
}

fn default_min_start_freq() -> f64 {
    200.0
}

fn default_max_start_freq() -> f64 {
    400.0
}

fn default_chaos_duration() -> f64 {
    4.0
}

fn default_converge_duration() -> f64 {
    3.0
}

fn default_sustain_duration() -> f64 {
    4.0
}

fn default_fade_duration() -> f64 {
    1.0
}

fn default_sample_rate() -> u32 {
    44_100
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            voice_count: default_voice_count(),
            min_start_freq: default_min_start_freq(),
            max_start_freq: default_max_start_freq(),
            chaos_duration: default_chaos_duration(),
            converge_duration: default_converge_duration(),
            sustain_duration: default_sustain_duration(),
            fade_duration: default_fade_duration(),
            sample_rate: default_sample_rate(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.voice_count < 1 {
            return Err(ConfigError::NoVoices);
        }
        if self.min_start_freq <= 0.0 || self.min_start_freq >= self.max_start_freq {
            return Err(ConfigError::BadStartRange {
                min: self.min_start_freq,
                max: self.max_start_freq,
            });
        }
        for (field, value) in [
            ("chaos_duration", self.chaos_duration),
            ("converge_duration", self.converge_duration),
            ("sustain_duration", self.sustain_duration),
            ("fade_duration", self.fade_duration),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositiveDuration { field, value });
            }
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::BadSampleRate);
        }
        Ok(())
    }

    pub fn total_duration(&self) -> f64 {
        self.chaos_duration + self.converge_duration + self.sustain_duration + self.fade_duration
    }

    /// Elapsed time at which the fade-out begins.
    pub fn fade_start(&self) -> f64 {
        self.chaos_duration + self.converge_duration + self.sustain_duration
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&text)
    }

    /// Write a default configuration file that can be edited and passed back
    /// with `--config`.
    pub fn generate_default<P: AsRef<Path>>(path: P) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(&Self::default())
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path.as_ref(), text).map_err(|e| ConfigError::Io(e.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    NoVoices,
    BadStartRange { min: f64, max: f64 },
    NonPositiveDuration { field: &'static str, value: f64 },
    BadSampleRate,
    Parse(String),
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NoVoices => write!(f, "voice_count must be at least 1"),
            ConfigError::BadStartRange { min, max } => write!(
                f,
                "start frequency range requires 0 < min < max, got [{min}, {max})"
            ),
            ConfigError::NonPositiveDuration { field, value } => {
                write!(f, "{field} must be positive, got {value}")
            }
            ConfigError::BadSampleRate => write!(f, "sample_rate must be positive"),
            ConfigError::Parse(msg) => write!(f, "config parse error: {msg}"),
            ConfigError::Io(msg) => write!(f, "config io error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
