//! Candidate partial calls ("paths") and the fixed-capacity pool that holds
//! them during a search.
//!
//! A path carries its probability-mass distribution over a window of flows,
//! the cumulative predicted signal, the bases called so far and the scalar
//! bookkeeping the pruning rules read. Buffers are sized once per
//! configuration so extending a path never allocates.

mod pool;

pub use pool::{PathPool, BEST_RANK, MAX_PATHS, POOL_SIZE};

use crate::flow::MAX_FLOWS;

/// Longest homopolymer run a path may call.
pub const MAX_HP_LENGTH: usize = 23;
/// Longest sequence a path may call.
pub const MAX_SEQUENCE_LENGTH: usize = 2 * MAX_FLOWS - 10;
/// State mass below this is treated as zero when trimming windows.
pub const MIN_FRACTION: f32 = 1e-6;

/// One candidate partial base call.
#[derive(Debug, Clone)]
pub struct PathRecord {
    /// Flow of the most recent incorporation.
    pub flow: usize,
    /// First flow with non-negligible state (inclusive).
    pub window_start: usize,
    /// End of the state window (exclusive).
    pub window_end: usize,
    /// Probability mass per flow; meaningful inside the window.
    pub state: Vec<f32>,
    /// Cumulative predicted signal per flow; meaningful below `window_end`.
    pub pred: Vec<f32>,
    /// Called bases as uppercase ASCII.
    pub sequence: Vec<u8>,
    /// Length of the trailing homopolymer run.
    pub last_hp: usize,
    /// Squared residual settled to the left of the window.
    pub res: f32,
    /// Cumulative search metric.
    pub metr: f32,
    /// Metric normalized by flow, used for eviction.
    pub flow_metr: f32,
    /// Combined penalty of the last extension.
    pub penalty: f32,
    /// Non-zero when the last call was an ambiguous near-zero incorporation.
    pub dot_count: u8,
    /// Lane of the last extension.
    pub nuc: usize,
    calib_a: Vec<f32>,
    calib_b: Vec<f32>,
    calib_len: usize,
    state_inphase: Vec<f32>,
}

impl PathRecord {
    /// Allocate a path able to cover `num_flows` flows.
    pub fn with_flows(num_flows: usize) -> Self {
        // Window extension writes one past the last flow.
        let len = num_flows + 1;
        Self {
            flow: 0,
            window_start: 0,
            window_end: 0,
            state: vec![0.0; len],
            pred: vec![0.0; len],
            sequence: Vec::with_capacity(MAX_SEQUENCE_LENGTH),
            last_hp: 0,
            res: 0.0,
            metr: 0.0,
            flow_metr: 0.0,
            penalty: 0.0,
            dot_count: 0,
            nuc: 0,
            calib_a: vec![1.0; len],
            calib_b: vec![0.0; len],
            calib_len: 0,
            state_inphase: vec![0.0; len],
        }
    }

    /// Reset to the root of a search: no bases called, all mass at flow 0.
    pub fn reset_root(&mut self) {
        self.flow = 0;
        self.window_start = 0;
        self.window_end = 1;
        self.res = 0.0;
        self.metr = 0.0;
        self.flow_metr = 0.0;
        self.penalty = 0.0;
        self.dot_count = 0;
        self.nuc = 0;
        self.state[0] = 1.0;
        self.pred[0] = 0.0;
        self.sequence.clear();
        self.last_hp = 0;
        self.calib_a[0] = 1.0;
        self.calib_b[0] = 0.0;
        self.calib_len = 1;
        self.state_inphase[0] = 0.0;
    }

    /// Number of called bases.
    #[inline]
    pub fn sequence_len(&self) -> usize {
        self.sequence.len()
    }

    /// Append a base, maintaining the trailing homopolymer length.
    pub fn push_base(&mut self, base: u8) {
        if self.sequence.last().is_some_and(|&last| last != base) {
            self.last_hp = 0;
        }
        self.last_hp += 1;
        self.sequence.push(base);
    }

    /// Affine recalibration `(A, B)` at `flow`; identity past the recorded extent.
    #[inline]
    pub fn calibration(&self, flow: usize) -> (f32, f32) {
        if flow < self.calib_len {
            (self.calib_a[flow], self.calib_b[flow])
        } else {
            (1.0, 0.0)
        }
    }

    /// Copy the parent's coefficients up to its incorporation flow.
    pub(crate) fn inherit_calibration(&mut self, parent: &PathRecord) {
        let upto = (parent.flow + 1).min(parent.calib_len);
        self.calib_a[..upto].copy_from_slice(&parent.calib_a[..upto]);
        self.calib_b[..upto].copy_from_slice(&parent.calib_b[..upto]);
        self.calib_a[upto..=parent.flow].fill(1.0);
        self.calib_b[upto..=parent.flow].fill(0.0);
        self.calib_len = parent.flow + 1;
    }

    /// Identity coefficients after `from_flow`, then `(a, b)` at the current flow.
    pub(crate) fn extend_calibration(&mut self, from_flow: usize, a: f32, b: f32) {
        if from_flow + 1 < self.flow {
            self.calib_a[from_flow + 1..self.flow].fill(1.0);
            self.calib_b[from_flow + 1..self.flow].fill(0.0);
        }
        self.calib_a[self.flow] = a;
        self.calib_b[self.flow] = b;
        self.calib_len = self.flow + 1;
    }

    /// Drop every recalibration coefficient.
    pub(crate) fn clear_calibration(&mut self) {
        self.calib_len = 0;
    }

    /// In-phase fraction per flow.
    pub fn state_inphase(&self) -> &[f32] {
        &self.state_inphase
    }

    /// Copy the parent's in-phase fractions up to its incorporation flow.
    pub(crate) fn inherit_inphase(&mut self, parent: &PathRecord) {
        self.state_inphase[..=parent.flow].copy_from_slice(&parent.state_inphase[..=parent.flow]);
    }

    /// Fill `[from_flow, flow]` with the in-phase mass at the current flow and
    /// clear the rest of the window.
    pub(crate) fn extend_inphase(&mut self, from_flow: usize, inphase: f32) {
        self.state_inphase[from_flow..=self.flow].fill(inphase);
        // Entries past the incorporation flow are zeroed, never left from an
        // earlier extension.
        if self.flow + 1 < self.window_end {
            self.state_inphase[self.flow + 1..self.window_end].fill(0.0);
        }
    }

    /// Zero the in-phase fractions.
    pub(crate) fn clear_inphase(&mut self) {
        self.state_inphase.fill(0.0);
    }
}
