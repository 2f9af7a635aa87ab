use std::fmt;
use std::time::Instant;

/// Handle to a node owned by the output device. Node 0 is always the
/// device's destination (the physical output).
pub type NodeId = usize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Sawtooth,
}

/// Capability set the engine schedules against. The engine owns the handle
/// exclusively; everything it does to the device goes through these calls,
/// most of them ahead of real time.
pub trait AudioOutput: Send {
    /// Bring the device out of a suspended state, acquiring it if needed.
    /// Failing here must leave the device unusable but otherwise unchanged.
    fn resume_if_suspended(&mut self) -> Result<(), DeviceError>;

    /// Device clock, seconds. This is the engine's time base.
    fn current_time(&self) -> f64;

    fn destination(&self) -> NodeId {
        0
    }

    fn create_oscillator(&mut self, waveform: Waveform, frequency: f64) -> NodeId;
    fn create_gain(&mut self, value: f64) -> NodeId;
    fn connect(&mut self, source: NodeId, sink: NodeId);

    fn set_value_at(&mut self, node: NodeId, value: f64, time: f64);
    fn linear_ramp_to(&mut self, node: NodeId, value: f64, time: f64);
    fn exponential_ramp_to(&mut self, node: NodeId, value: f64, time: f64);

    fn start_node(&mut self, node: NodeId);
    fn stop_node(&mut self, node: NodeId);
}

#[derive(Debug)]
pub enum DeviceError {
    /// The output device could not be acquired or resumed.
    Unavailable(String),
    /// The device was acquired but its stream could not be built or started.
    Stream(String),
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::Unavailable(msg) => write!(f, "output device unavailable: {msg}"),
            DeviceError::Stream(msg) => write!(f, "output stream error: {msg}"),
        }
    }
}

impl std::error::Error for DeviceError {}

/// Headless device: keeps a wall-clock time base and discards all
/// scheduling. Lets the snapshot feed run on machines without audio output.
pub struct NullDevice {
    origin: Option<Instant>,
    next_node: NodeId,
}

impl NullDevice {
    pub fn new() -> Self {
        Self {
            origin: None,
            next_node: 0,
        }
    }
}

impl Default for NullDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutput for NullDevice {
    fn resume_if_suspended(&mut self) -> Result<(), DeviceError> {
        if self.origin.is_none() {
            self.origin = Some(Instant::now());
        }
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.origin
            .map(|origin| origin.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn create_oscillator(&mut self, _waveform: Waveform, _frequency: f64) -> NodeId {
        self.next_node += 1;
        self.next_node
    }

    fn create_gain(&mut self, _value: f64) -> NodeId {
        self.next_node += 1;
        self.next_node
    }

    fn connect(&mut self, _source: NodeId, _sink: NodeId) {}
    fn set_value_at(&mut self, _node: NodeId, _value: f64, _time: f64) {}
    fn linear_ramp_to(&mut self, _node: NodeId, _value: f64, _time: f64) {}
    fn exponential_ramp_to(&mut self, _node: NodeId, _value: f64, _time: f64) {}
    fn start_node(&mut self, _node: NodeId) {}
    fn stop_node(&mut self, _node: NodeId) {}
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_device_allocates_distinct_nodes() {
        let mut device = NullDevice::new();
        assert_eq!(device.destination(), 0);
        let a = device.create_oscillator(Waveform::Sawtooth, 220.0);
        let b = device.create_gain(1.0);
        assert_ne!(a, b);
        assert_ne!(a, device.destination());
    }

    #[test]
    fn null_device_clock_starts_at_resume() {
        let mut device = NullDevice::new();
        assert_eq!(device.current_time(), 0.0);
        device.resume_if_suspended().unwrap();
        assert!(device.current_time() >= 0.0);
    }
}
