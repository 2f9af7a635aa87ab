//! Output-device adapters: a cpal-backed realtime device and an offline
//! renderer, both driving the same oscillator/gain node graph with
//! Web-Audio-style timed parameter automation.

use std::f64::consts::TAU;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use parking_lot::Mutex;
use tracing::{error, info};

use crate::device::{AudioOutput, DeviceError, NodeId, Waveform};

#[derive(Clone, Copy, Debug, PartialEq)]
enum RampKind {
    Set,
    Linear,
    Exponential,
}

#[derive(Clone, Copy, Debug)]
struct AutomationEvent {
    time: f64,
    value: f64,
    kind: RampKind,
}

/// Scheduled parameter. Evaluation walks forward with a cursor since render
/// time is monotonic; ramps interpolate from the previous event's value.
#[derive(Debug)]
struct Param {
    initial: f64,
    events: Vec<AutomationEvent>,
    cursor: usize,
}

impl Param {
    fn new(initial: f64) -> Self {
        Self {
            initial,
            events: Vec::new(),
            cursor: 0,
        }
    }

    fn insert(&mut self, event: AutomationEvent) {
        let index = self.events.partition_point(|e| e.time <= event.time);
        self.events.insert(index, event);
        if index < self.cursor {
            self.cursor = index;
        }
    }

    fn value_at(&mut self, time: f64) -> f64 {
        while self.cursor < self.events.len() && self.events[self.cursor].time <= time {
            self.cursor += 1;
        }
        let (previous_time, previous_value) = if self.cursor == 0 {
            (0.0, self.initial)
        } else {
            let previous = self.events[self.cursor - 1];
            (previous.time, previous.value)
        };
        match self.events.get(self.cursor) {
            None => previous_value,
            Some(next) => {
                let span = next.time - previous_time;
                match next.kind {
                    RampKind::Set => previous_value,
                    _ if span <= 0.0 => next.value,
                    RampKind::Linear => {
                        previous_value + (next.value - previous_value) * (time - previous_time) / span
                    }
                    RampKind::Exponential => {
                        if previous_value <= 0.0 || next.value <= 0.0 {
                            // exponential ramps are undefined across zero;
                            // fall back to a linear segment
                            previous_value
                                + (next.value - previous_value) * (time - previous_time) / span
                        } else {
                            previous_value
                                * (next.value / previous_value).powf((time - previous_time) / span)
                        }
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
enum NodeKind {
    Destination,
    Oscillator {
        waveform: Waveform,
        frequency: Param,
        phase: f64,
        playing: bool,
        output: Option<NodeId>,
    },
    Gain {
        gain: Param,
        output: Option<NodeId>,
    },
}

/// The audio graph shared between the scheduling side and the render side.
/// Oscillators feed gain chains that terminate at the destination.
pub(crate) struct Graph {
    sample_rate: f64,
    frames: u64,
    nodes: Vec<NodeKind>,
    levels: Vec<f64>,
}

impl Graph {
    fn new(sample_rate: f64) -> Self {
        Self {
            sample_rate,
            frames: 0,
            nodes: vec![NodeKind::Destination],
            levels: Vec::new(),
        }
    }

    fn current_time(&self) -> f64 {
        self.frames as f64 / self.sample_rate
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn create_oscillator(&mut self, waveform: Waveform, frequency: f64) -> NodeId {
        self.nodes.push(NodeKind::Oscillator {
            waveform,
            frequency: Param::new(frequency),
            phase: 0.0,
            playing: false,
            output: None,
        });
        self.nodes.len() - 1
    }

    fn create_gain(&mut self, value: f64) -> NodeId {
        self.nodes.push(NodeKind::Gain {
            gain: Param::new(value),
            output: None,
        });
        self.nodes.len() - 1
    }

    fn connect(&mut self, source: NodeId, sink: NodeId) {
        match self.nodes.get_mut(source) {
            Some(NodeKind::Oscillator { output, .. }) | Some(NodeKind::Gain { output, .. }) => {
                *output = Some(sink)
            }
            _ => {}
        }
    }

    fn schedule(&mut self, node: NodeId, event: AutomationEvent) {
        match self.nodes.get_mut(node) {
            Some(NodeKind::Oscillator { frequency, .. }) => frequency.insert(event),
            Some(NodeKind::Gain { gain, .. }) => gain.insert(event),
            _ => {}
        }
    }

    fn set_playing(&mut self, node: NodeId, value: bool) {
        if let Some(NodeKind::Oscillator { playing, .. }) = self.nodes.get_mut(node) {
            *playing = value;
        }
    }

    fn render_frame(&mut self) -> f32 {
        let time = self.current_time();
        let sample_rate = self.sample_rate;
        self.frames += 1;

        if self.levels.len() != self.nodes.len() {
            self.levels.resize(self.nodes.len(), 1.0);
        }
        for index in 0..self.nodes.len() {
            if let NodeKind::Gain { gain, .. } = &mut self.nodes[index] {
                self.levels[index] = gain.value_at(time);
            }
        }

        let mut mix = 0.0f64;
        for index in 0..self.nodes.len() {
            let (sample, start) = match &mut self.nodes[index] {
                NodeKind::Oscillator {
                    waveform,
                    frequency,
                    phase,
                    playing: true,
                    output,
                } => {
                    let f = frequency.value_at(time);
                    let sample = match waveform {
                        Waveform::Sine => (TAU * *phase).sin(),
                        Waveform::Sawtooth => 2.0 * *phase - 1.0,
                    };
                    *phase += f / sample_rate;
                    *phase -= phase.floor();
                    (sample, *output)
                }
                _ => continue,
            };

            let mut level = 1.0;
            let mut next = start;
            let mut reached_destination = false;
            let mut hops = 0;
            while let Some(id) = next {
                hops += 1;
                if hops > self.nodes.len() {
                    break;
                }
                match &self.nodes[id] {
                    NodeKind::Destination => {
                        reached_destination = true;
                        break;
                    }
                    NodeKind::Gain { output, .. } => {
                        level *= self.levels[id];
                        next = *output;
                    }
                    NodeKind::Oscillator { .. } => break,
                }
            }
            if reached_destination {
                mix += sample * level;
            }
        }
        mix as f32
    }

    fn render_block(&mut self, buffer: &mut [f32], channels: usize) {
        for frame in buffer.chunks_mut(channels) {
            let sample = self.render_frame().clamp(-1.0, 1.0);
            for out in frame {
                *out = sample;
            }
        }
    }
}

type SharedGraph = Arc<Mutex<Graph>>;

fn graph_output(graph: &SharedGraph) -> GraphOps {
    GraphOps {
        graph: Arc::clone(graph),
    }
}

/// Common AudioOutput plumbing over a shared graph.
struct GraphOps {
    graph: SharedGraph,
}

impl GraphOps {
    fn schedule(&self, node: NodeId, value: f64, time: f64, kind: RampKind) {
        self.graph
            .lock()
            .schedule(node, AutomationEvent { time, value, kind });
    }
}

/// Realtime output through the default cpal device. The stream lives on its
/// own thread because cpal streams cannot move between threads.
pub struct CpalDevice {
    ops: GraphOps,
    running: Arc<AtomicBool>,
    started: bool,
}

impl CpalDevice {
    pub fn new(sample_rate: u32) -> Self {
        let graph = Arc::new(Mutex::new(Graph::new(sample_rate as f64)));
        Self {
            ops: graph_output(&graph),
            running: Arc::new(AtomicBool::new(false)),
            started: false,
        }
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl AudioOutput for CpalDevice {
    fn resume_if_suspended(&mut self) -> Result<(), DeviceError> {
        if self.started {
            return Ok(());
        }
        self.running.store(true, Ordering::SeqCst);
        let graph = Arc::clone(&self.ops.graph);
        let running = Arc::clone(&self.running);
        let (ready, status) = mpsc::channel();
        thread::spawn(move || run_stream(graph, running, ready));
        match status.recv() {
            Ok(Ok(())) => {
                self.started = true;
                Ok(())
            }
            Ok(Err(e)) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(DeviceError::Unavailable("audio thread exited".into()))
            }
        }
    }

    fn current_time(&self) -> f64 {
        self.ops.graph.lock().current_time()
    }

    fn create_oscillator(&mut self, waveform: Waveform, frequency: f64) -> NodeId {
        self.ops.graph.lock().create_oscillator(waveform, frequency)
    }

    fn create_gain(&mut self, value: f64) -> NodeId {
        self.ops.graph.lock().create_gain(value)
    }

    fn connect(&mut self, source: NodeId, sink: NodeId) {
        self.ops.graph.lock().connect(source, sink);
    }

    fn set_value_at(&mut self, node: NodeId, value: f64, time: f64) {
        self.ops.schedule(node, value, time, RampKind::Set);
    }

    fn linear_ramp_to(&mut self, node: NodeId, value: f64, time: f64) {
        self.ops.schedule(node, value, time, RampKind::Linear);
    }

    fn exponential_ramp_to(&mut self, node: NodeId, value: f64, time: f64) {
        self.ops.schedule(node, value, time, RampKind::Exponential);
    }

    fn start_node(&mut self, node: NodeId) {
        self.ops.graph.lock().set_playing(node, true);
    }

    fn stop_node(&mut self, node: NodeId) {
        self.ops.graph.lock().set_playing(node, false);
    }
}

fn run_stream(
    graph: SharedGraph,
    running: Arc<AtomicBool>,
    ready: mpsc::Sender<Result<(), DeviceError>>,
) {
    let host = cpal::default_host();
    let Some(device) = host.default_output_device() else {
        let _ = ready.send(Err(DeviceError::Unavailable("no output device".into())));
        return;
    };
    let supported = match device.default_output_config() {
        Ok(config) => config,
        Err(e) => {
            let _ = ready.send(Err(DeviceError::Unavailable(e.to_string())));
            return;
        }
    };
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.into();
    let channels = config.channels as usize;
    graph.lock().set_sample_rate(config.sample_rate.0 as f64);
    info!(
        rate = config.sample_rate.0,
        channels, "audio stream starting"
    );

    let callback_graph = Arc::clone(&graph);
    let audio_callback = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
        callback_graph.lock().render_block(data, channels);
    };
    let err_fn = |err| error!("stream error: {err}");

    let stream = match sample_format {
        SampleFormat::F32 => device.build_output_stream(&config, audio_callback, err_fn, None),
        other => {
            let _ = ready.send(Err(DeviceError::Stream(format!(
                "unsupported sample format {other:?}"
            ))));
            return;
        }
    };
    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready.send(Err(DeviceError::Stream(e.to_string())));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready.send(Err(DeviceError::Stream(e.to_string())));
        return;
    }
    let _ = ready.send(Ok(()));

    // keep the stream alive until the device is dropped
    while running.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }
}

/// Offline variant of the same graph: no stream, time advances only as
/// frames are pulled, so a whole run renders as fast as the CPU allows.
pub struct OfflineDevice {
    ops: GraphOps,
    sample_rate: u32,
}

impl OfflineDevice {
    pub fn new(sample_rate: u32) -> Self {
        let graph = Arc::new(Mutex::new(Graph::new(sample_rate as f64)));
        Self {
            ops: graph_output(&graph),
            sample_rate,
        }
    }

    /// Renderer handle to keep after the device itself moves into the
    /// engine.
    pub fn renderer(&self) -> OfflineRenderer {
        OfflineRenderer {
            graph: Arc::clone(&self.ops.graph),
            sample_rate: self.sample_rate,
        }
    }
}

impl AudioOutput for OfflineDevice {
    fn resume_if_suspended(&mut self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn current_time(&self) -> f64 {
        self.ops.graph.lock().current_time()
    }

    fn create_oscillator(&mut self, waveform: Waveform, frequency: f64) -> NodeId {
        self.ops.graph.lock().create_oscillator(waveform, frequency)
    }

    fn create_gain(&mut self, value: f64) -> NodeId {
        self.ops.graph.lock().create_gain(value)
    }

    fn connect(&mut self, source: NodeId, sink: NodeId) {
        self.ops.graph.lock().connect(source, sink);
    }

    fn set_value_at(&mut self, node: NodeId, value: f64, time: f64) {
        self.ops.schedule(node, value, time, RampKind::Set);
    }

    fn linear_ramp_to(&mut self, node: NodeId, value: f64, time: f64) {
        self.ops.schedule(node, value, time, RampKind::Linear);
    }

    fn exponential_ramp_to(&mut self, node: NodeId, value: f64, time: f64) {
        self.ops.schedule(node, value, time, RampKind::Exponential);
    }

    fn start_node(&mut self, node: NodeId) {
        self.ops.graph.lock().set_playing(node, true);
    }

    fn stop_node(&mut self, node: NodeId) {
        self.ops.graph.lock().set_playing(node, false);
    }
}

pub struct OfflineRenderer {
    graph: SharedGraph,
    sample_rate: u32,
}

impl OfflineRenderer {
    /// Render `duration` seconds of the scheduled graph to a 16-bit stereo
    /// WAV file.
    pub fn render_to_wav<P: AsRef<Path>>(
        &self,
        duration: f64,
        path: P,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
        let mut remaining = (duration * self.sample_rate as f64) as usize;
        let mut buffer = vec![0.0f32; 512 * 2];
        while remaining > 0 {
            let frames = 512.min(remaining);
            buffer.resize(frames * 2, 0.0);
            self.graph.lock().render_block(&mut buffer[..frames * 2], 2);
            for sample in &buffer[..frames * 2] {
                writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
            }
            remaining -= frames;
        }
        writer.finalize()?;
        Ok(())
    }
}
