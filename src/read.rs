//! Caller-owned read record exchanged with the decoder.

/// Signal, call and quality arrays for one read.
///
/// The decoder reads `raw_measurements` (and, for staged decodes,
/// `normalized_measurements` and `sequence`) and writes everything else.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BasecallerRead {
    /// Measured signal, one value per flow.
    pub raw_measurements: Vec<f32>,
    /// Signal after additive and multiplicative correction.
    pub normalized_measurements: Vec<f32>,
    /// Signal predicted by the called sequence.
    pub prediction: Vec<f32>,
    /// Called bases as uppercase ASCII.
    pub sequence: Vec<u8>,
    /// Additive offset subtracted at each flow.
    pub additive_correction: Vec<f32>,
    /// Gain divided out at each flow.
    pub multiplicative_correction: Vec<f32>,
    /// Mass of the called hypothesis at each flow's incorporation.
    pub state_inphase: Vec<f32>,
    /// Total live mass at each flow's incorporation.
    pub state_total: Vec<f32>,
    /// Per-base penalty normalized by window width.
    pub penalty_residual: Vec<f32>,
    /// Per-base penalty gap to the nearest alternative hypothesis.
    pub penalty_mismatch: Vec<f32>,
}

impl BasecallerRead {
    /// Wrap a raw flow signal; the normalized signal starts as a copy of it.
    pub fn new(raw_measurements: Vec<f32>) -> Self {
        let num_flows = raw_measurements.len();
        Self {
            normalized_measurements: raw_measurements.clone(),
            raw_measurements,
            prediction: vec![0.0; num_flows],
            additive_correction: vec![0.0; num_flows],
            multiplicative_correction: vec![1.0; num_flows],
            state_inphase: vec![0.0; num_flows],
            ..Self::default()
        }
    }

    /// Attach a previously called sequence (for staged decodes and simulation).
    pub fn with_sequence(mut self, sequence: impl Into<Vec<u8>>) -> Self {
        self.sequence = sequence.into();
        self
    }

    /// Number of flows in the raw signal.
    pub fn num_flows(&self) -> usize {
        self.raw_measurements.len()
    }

    /// Called sequence as a string.
    pub fn sequence_string(&self) -> String {
        String::from_utf8_lossy(&self.sequence).into_owned()
    }

    /// Sum of squared differences between normalized and predicted signal.
    pub fn squared_residual(&self) -> f32 {
        let mut total = 0.0f32;
        for (measured, predicted) in self
            .normalized_measurements
            .iter()
            .zip(self.prediction.iter())
        {
            let residual = measured - predicted;
            total += residual * residual;
        }
        total
    }

    /// Advisory fingerprint of the decoder outputs (sequence, normalized and
    /// predicted signal, quality arrays).
    pub fn fingerprint(&self) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&(self.sequence.len() as u64).to_le_bytes());
        hasher.update(&self.sequence);
        for values in [
            &self.normalized_measurements,
            &self.prediction,
            &self.additive_correction,
            &self.multiplicative_correction,
            &self.state_inphase,
            &self.state_total,
            &self.penalty_residual,
            &self.penalty_mismatch,
        ] {
            hasher.update(&(values.len() as u64).to_le_bytes());
            for value in values {
                hasher.update(&value.to_le_bytes());
            }
        }
        hasher.finalize()
    }

    /// Size every per-flow output array to `num_flows`.
    pub(crate) fn prepare_outputs(&mut self, num_flows: usize) {
        for values in [
            &mut self.normalized_measurements,
            &mut self.prediction,
            &mut self.additive_correction,
            &mut self.state_inphase,
        ] {
            values.resize(num_flows, 0.0);
        }
        self.multiplicative_correction.resize(num_flows, 1.0);
    }
}
