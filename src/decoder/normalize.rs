//! Windowed median normalization of the raw signal.
//!
//! The additive offset is estimated from flows the prediction calls empty,
//! the multiplicative gain from flows it calls incorporating. Estimates are
//! taken per window and interpolated linearly between window midpoints.

/// Predictions below this count as empty flows for offset estimation.
const EMPTY_FLOW_THRESHOLD: f32 = 0.3;
/// Predictions above this count as incorporating flows for gain estimation.
const INCORPORATION_THRESHOLD: f32 = 0.5;
/// A window needs more than this many samples to update an estimate.
const MIN_SAMPLES: usize = 5;

/// Reusable median scratch for one window size.
#[derive(Debug, Clone)]
pub(crate) struct WindowedNormalizer {
    window_size: usize,
    samples: Vec<f32>,
}

impl WindowedNormalizer {
    pub(crate) fn new(window_size: usize) -> Self {
        Self {
            window_size,
            samples: Vec::with_capacity(window_size),
        }
    }

    /// Median of the collected samples, if there are enough of them.
    fn median(&mut self) -> Option<f32> {
        if self.samples.len() <= MIN_SAMPLES {
            return None;
        }
        let middle = self.samples.len() / 2;
        let (_, median, _) = self.samples.select_nth_unstable_by(middle, f32::total_cmp);
        Some(*median)
    }

    /// Estimate corrections over `num_steps + 1` windows and write the
    /// normalized signal into `norm`.
    ///
    /// `predicted` is the prediction of the current best call; its length
    /// bounds the flows used for estimation.
    pub(crate) fn normalize(
        &mut self,
        raw: &[f32],
        predicted: &[f32],
        norm: &mut [f32],
        additive: &mut [f32],
        multiplicative: &mut [f32],
        num_steps: usize,
    ) {
        let num_flows = raw.len();
        let window = self.window_size;
        let estimable = num_flows.min(predicted.len());

        // Additive offset.
        let mut next = 0.0f32;
        let mut estim_flow = 0;
        let mut apply_flow = 0;
        for step in 0..=num_steps {
            let window_end = estim_flow + window;
            let window_middle = estim_flow + window / 2;
            if window_middle > num_flows {
                break;
            }
            let mut normalizer = next;

            self.samples.clear();
            while estim_flow < window_end && estim_flow < estimable {
                if predicted[estim_flow] < EMPTY_FLOW_THRESHOLD {
                    self.samples.push(raw[estim_flow] - predicted[estim_flow]);
                }
                estim_flow += 1;
            }
            if let Some(median) = self.median() {
                next = median;
                if step == 0 {
                    normalizer = next;
                }
            }

            let delta = (next - normalizer) / window as f32;
            while apply_flow < window_middle && apply_flow < num_flows {
                norm[apply_flow] = raw[apply_flow] - normalizer;
                additive[apply_flow] = normalizer;
                normalizer += delta;
                apply_flow += 1;
            }
        }
        for flow in apply_flow..num_flows {
            norm[flow] = raw[flow] - next;
            additive[flow] = next;
        }

        // Multiplicative gain.
        let mut next = 1.0f32;
        let mut estim_flow = 0;
        let mut apply_flow = 0;
        for step in 0..=num_steps {
            let window_end = estim_flow + window;
            let window_middle = estim_flow + window / 2;
            if window_middle > num_flows {
                break;
            }
            let mut normalizer = next;

            self.samples.clear();
            while estim_flow < window_end && estim_flow < estimable {
                let expected = predicted[estim_flow];
                if expected > INCORPORATION_THRESHOLD && norm[estim_flow] > 0.0 {
                    self.samples.push(norm[estim_flow] / expected);
                }
                estim_flow += 1;
            }
            if let Some(median) = self.median() {
                next = median;
                if step == 0 {
                    normalizer = next;
                }
            }

            let delta = (next - normalizer) / window as f32;
            while apply_flow < window_middle && apply_flow < num_flows {
                norm[apply_flow] /= normalizer;
                multiplicative[apply_flow] = normalizer;
                normalizer += delta;
                apply_flow += 1;
            }
        }
        for flow in apply_flow..num_flows {
            norm[flow] /= next;
            multiplicative[flow] = next;
        }
    }
}
