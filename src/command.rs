use crate::device::{AudioOutput, NodeId};

/// Parameter operation scheduled against a device node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ParamOp {
    SetValue(f64),
    LinearRampTo(f64),
    ExponentialRampTo(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DeviceCommand {
    pub node: NodeId,
    pub time: f64,
    pub op: ParamOp,
}

/// Ordered list of timed parameter commands, built in full before playback
/// and handed to the device in one pass. Audio timing never depends on the
/// sampling loop staying live.
#[derive(Clone, Debug, Default)]
pub struct Timeline {
    commands: Vec<DeviceCommand>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_value(&mut self, node: NodeId, value: f64, time: f64) {
        self.commands.push(DeviceCommand {
            node,
            time,
            op: ParamOp::SetValue(value),
        });
    }

    pub fn linear_ramp(&mut self, node: NodeId, value: f64, time: f64) {
        self.commands.push(DeviceCommand {
            node,
            time,
            op: ParamOp::LinearRampTo(value),
        });
    }

    pub fn exponential_ramp(&mut self, node: NodeId, value: f64, time: f64) {
        self.commands.push(DeviceCommand {
            node,
            time,
            op: ParamOp::ExponentialRampTo(value),
        });
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Submit every command in time order. Insertion order breaks ties so an
    /// anchor set at time t lands before a ramp targeting the same t.
    pub fn submit(mut self, device: &mut dyn AudioOutput) {
        self.commands.sort_by(|a, b| a.time.total_cmp(&b.time));
        for command in self.commands {
            match command.op {
                ParamOp::SetValue(value) => device.set_value_at(command.node, value, command.time),
                ParamOp::LinearRampTo(value) => {
                    device.linear_ramp_to(command.node, value, command.time)
                }
                ParamOp::ExponentialRampTo(value) => {
                    device.exponential_ramp_to(command.node, value, command.time)
                }
            }
        }
    }
}
