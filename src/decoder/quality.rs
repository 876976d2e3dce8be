//! Per-base and per-flow quality metrics for a called sequence.

use super::{check_sequence, Decoder};
use crate::flow::NUM_NUCLEOTIDES;
use crate::path::MAX_HP_LENGTH;
use crate::propagate;
use crate::read::BasecallerRead;
use crate::DecoderError;

/// Penalty assigned to hypotheses that cannot be extended.
const CAPPED_PENALTY: f32 = 25.0;
/// Lower bound reported for in-phase and total state mass.
const STATE_FLOOR: f32 = 0.01;

impl Decoder {
    /// Replay `read.sequence` against `read.normalized_measurements` and
    /// record quality metrics.
    ///
    /// For every base, `penalty_residual` holds the called hypothesis'
    /// penalty per flow of its window and `penalty_mismatch` the largest gap
    /// between that penalty and an alternative nucleotide (at least `-1`).
    /// For every flow, `state_inphase` and `state_total` hold the called
    /// mass at the most recent incorporation and the total live mass, both
    /// floored at `0.01`. The prediction of the replayed call is written to
    /// `read.prediction`.
    pub fn compute_qv_metrics(&mut self, read: &mut BasecallerRead) -> Result<(), DecoderError> {
        let num_flows = self.num_flows();
        self.check_signal(read.normalized_measurements.len())?;
        check_sequence(&read.sequence)?;

        read.state_inphase.clear();
        read.state_inphase.resize(num_flows, 1.0);
        read.state_total.clear();
        read.state_total.resize(num_flows, 1.0);
        read.penalty_residual.clear();
        read.penalty_mismatch.clear();
        if read.sequence.is_empty() {
            return Ok(());
        }
        let len = read.sequence.len();
        read.penalty_residual.resize(len, 0.0);
        read.penalty_mismatch.resize(len, 0.0);

        self.norm.copy_from_slice(&read.normalized_measurements);
        let Self {
            model,
            pool,
            scratch,
            norm,
            ..
        } = self;
        let model = &*model;
        let norm: &[f32] = norm;
        let order = model.order();

        let mut parent_slot = pool.slot_of(0);
        let mut child_slot = pool.slot_of(1);
        pool.slot_mut(parent_slot).reset_root();

        let mut recent_inphase = 1.0f32;
        let mut recent_total = 1.0f32;
        let mut base = 0;
        for solution_flow in 0..num_flows {
            while base < len && read.sequence[base] == order.base_at(solution_flow) {
                let parent = pool.slot(parent_slot);
                propagate::expand(model, norm, false, parent, num_flows, scratch);

                // A parent at the homopolymer cap caps all four lanes, not only
                // the lane extending its run.
                let mut penalty = [0.0f32; NUM_NUCLEOTIDES];
                for (nuc, slot) in penalty.iter_mut().enumerate() {
                    let flow = scratch.flow(nuc);
                    *slot = if flow >= num_flows || parent.last_hp >= MAX_HP_LENGTH {
                        CAPPED_PENALTY
                    } else {
                        scratch.positive_before(nuc, flow)
                            + scratch.negative_before(nuc, scratch.window_end(nuc))
                    };
                }
                let called = order.nuc_at(solution_flow);

                let (parent, child) = pool.pair_mut(parent_slot, child_slot);
                child.flow = scratch.flow(called);
                child.window_start = scratch.window_start(called);
                child.window_end = scratch.window_end(called);
                let window_end = child.window_end;
                scratch.copy_lane(called, child, window_end);
                recent_total = 0.0;
                for flow in scratch.origin()..window_end {
                    recent_total += child.state[flow];
                }
                child.pred[..parent.window_start]
                    .copy_from_slice(&parent.pred[..parent.window_start]);
                child.last_hp = if child.flow == parent.flow {
                    parent.last_hp + 1
                } else {
                    1
                };
                recent_inphase = scratch.state_at(called, solution_flow);

                read.penalty_residual[base] = 0.0;
                if solution_flow > parent.window_start {
                    read.penalty_residual[base] =
                        penalty[called] / (solution_flow - parent.window_start) as f32;
                }
                let mut mismatch = -1.0f32;
                for (nuc, &alternative) in penalty.iter().enumerate() {
                    if nuc != called {
                        mismatch = mismatch.max(penalty[called] - alternative);
                    }
                }
                read.penalty_mismatch[base] = mismatch;

                std::mem::swap(&mut parent_slot, &mut child_slot);
                base += 1;
            }
            read.state_inphase[solution_flow] = recent_inphase.max(STATE_FLOOR);
            read.state_total[solution_flow] = recent_total.max(STATE_FLOOR);
        }

        let parent = pool.slot(parent_slot);
        read.prediction.clear();
        read.prediction.resize(num_flows, 0.0);
        read.prediction[..parent.window_end].copy_from_slice(&parent.pred[..parent.window_end]);
        Ok(())
    }
}
