use serde::Serialize;

/// One sampled (time, frequency) pair in a voice's history.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct FrequencyHistoryPoint {
    /// Seconds since the run started.
    pub time: f64,
    pub frequency: f64,
}

/// Immutable export of engine state for an external renderer. The field
/// layout is the data contract across the rendering boundary; consumers get
/// their own copy and can never reach back into engine-owned buffers.
#[derive(Clone, Debug, Serialize)]
pub struct Snapshot {
    pub target_frequencies: Vec<f64>,
    pub current_frequencies: Vec<f64>,
    /// Cumulative history per voice, indexed like the frequency vectors.
    pub frequency_history: Vec<Vec<FrequencyHistoryPoint>>,
    pub elapsed_time: f64,
    pub total_duration: f64,
    pub device_timestamp: f64,
}

/// History store behind the snapshot stream. Grows unbounded for the length
/// of one run; the engine discards it wholesale on stop.
#[derive(Debug)]
pub struct SnapshotFeed {
    histories: Vec<Vec<FrequencyHistoryPoint>>,
}

impl SnapshotFeed {
    pub fn new(voice_count: usize) -> Self {
        Self {
            histories: vec![Vec::new(); voice_count],
        }
    }

    /// Append one sampled frequency per voice.
    pub fn record(&mut self, elapsed: f64, frequencies: &[f64]) {
        for (history, &frequency) in self.histories.iter_mut().zip(frequencies) {
            history.push(FrequencyHistoryPoint {
                time: elapsed,
                frequency,
            });
        }
    }

    /// Publish a frozen snapshot; histories are copied, not shared.
    pub fn publish(
        &self,
        target_frequencies: Vec<f64>,
        current_frequencies: Vec<f64>,
        elapsed_time: f64,
        total_duration: f64,
        device_timestamp: f64,
    ) -> Snapshot {
        Snapshot {
            target_frequencies,
            current_frequencies,
            frequency_history: self.histories.clone(),
            elapsed_time,
            total_duration,
            device_timestamp,
        }
    }

    pub fn points_per_voice(&self) -> usize {
        self.histories.first().map(Vec::len).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_appends_one_point_per_voice() {
        let mut feed = SnapshotFeed::new(3);
        feed.record(0.5, &[200.0, 250.0, 300.0]);
        feed.record(1.0, &[201.0, 251.0, 301.0]);
        assert_eq!(feed.points_per_voice(), 2);

        let snapshot = feed.publish(vec![73.42; 3], vec![201.0, 251.0, 301.0], 1.0, 12.0, 1.0);
        assert_eq!(snapshot.frequency_history.len(), 3);
        assert_eq!(
            snapshot.frequency_history[1][0],
            FrequencyHistoryPoint {
                time: 0.5,
                frequency: 250.0
            }
        );
    }

    #[test]
    fn published_history_is_a_copy() {
        let mut feed = SnapshotFeed::new(1);
        feed.record(0.5, &[200.0]);
        let early = feed.publish(vec![73.42], vec![200.0], 0.5, 12.0, 0.5);
        feed.record(1.0, &[210.0]);
        let late = feed.publish(vec![73.42], vec![210.0], 1.0, 12.0, 1.0);

        assert_eq!(early.frequency_history[0].len(), 1);
        assert_eq!(late.frequency_history[0].len(), 2);
    }

    #[test]
    fn snapshot_serializes_with_the_contract_fields() {
        let mut feed = SnapshotFeed::new(1);
        feed.record(0.25, &[320.0]);
        let snapshot = feed.publish(vec![440.0], vec![320.0], 0.25, 12.0, 0.25);
        let json = serde_json::to_value(&snapshot).unwrap();
        for field in [
            "target_frequencies",
            "current_frequencies",
            "frequency_history",
            "elapsed_time",
            "total_duration",
            "device_timestamp",
        ] {
            assert!(json.get(field).is_some(), "missing field {field}");
        }
    }
}
