//! Bounded best-first search over candidate paths.
//!
//! Each iteration prunes the live set, expands the path with the lowest
//! metric by all four nucleotides, scores it as a complete call, and keeps
//! children whose penalties fall within a band of the best sibling. One child
//! may be folded into the parent in place when the parent is not the new
//! best call.

use tracing::trace;

use super::Decoder;
use crate::flow::{FlowModel, Nucleotide, NUM_NUCLEOTIDES};
use crate::path::{PathRecord, BEST_RANK, MAX_HP_LENGTH, MAX_PATHS, MAX_SEQUENCE_LENGTH};
use crate::propagate::{self, Expansion};
use crate::recalibration::RecalibrationModel;

/// Children at or above this penalty are discarded outright.
const PENALTY_CEILING: f32 = 20.0;
/// Starting value of the best sibling penalty.
const INITIAL_BEST_PENALTY: f64 = 25.0;
/// Admission band relative to the best penalty seen so far.
const PENALTY_BAND: f64 = 0.2;
/// Retention band relative to the best penalty of all siblings.
const SETTLED_PENALTY_BAND: f32 = 0.2;
/// Normalized incorporation signal below which a call counts as a dot.
const DOT_THRESHOLD: f32 = 0.3;
/// Search ends once the cheapest live path reaches this metric.
const METRIC_CEILING: f32 = 1000.0;
const INITIAL_BEST_DISTANCE: f32 = 1e20;
/// Age pruning applies once more than this many paths are live.
const AGE_PRUNING_MIN_PATHS: usize = 3;
/// Population pruning leaves at most this many paths before an expansion.
const MAX_LIVE_BEFORE_EXPANSION: usize = MAX_PATHS - 4;

/// Sibling penalty band.
///
/// Admission compares each child with the best penalty seen so far, so a
/// child admitted early may fall outside the band once a better sibling is
/// scored; [`PenaltyBand::retains`] applies the settled band afterwards.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PenaltyBand {
    best: f64,
}

impl PenaltyBand {
    pub(crate) fn new() -> Self {
        Self {
            best: INITIAL_BEST_PENALTY,
        }
    }

    /// Admit `penalty` against the running best, lowering it when beaten.
    pub(crate) fn admit(&mut self, penalty: f32) -> bool {
        let penalty = f64::from(penalty);
        if self.best > penalty {
            self.best = penalty;
            true
        } else {
            !(penalty - self.best >= PENALTY_BAND)
        }
    }

    /// Whether `penalty` is within the band of the settled best.
    pub(crate) fn retains(&self, penalty: f32) -> bool {
        !(f64::from(penalty) - self.best >= f64::from(SETTLED_PENALTY_BAND))
    }
}

/// Metric terms of one child hypothesis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct ChildScore {
    /// Parent residual plus the child's positive residuals before its
    /// window and negative residuals inside it.
    pub metr: f32,
    /// Residual settled to the left of the child's window.
    pub res: f32,
    /// Positive residuals before the incorporation flow plus negative
    /// residuals through the window end.
    pub flow_metr: f32,
    /// `flow_metr` plus the negative residuals counted a second time.
    pub penalty: f32,
}

/// Score hypothesis `nuc` of the expansion in `scratch`.
pub(crate) fn score_child(parent_res: f32, scratch: &Expansion, nuc: usize) -> ChildScore {
    let flow = scratch.flow(nuc);
    let start = scratch.window_start(nuc);
    let end = scratch.window_end(nuc);

    let mut metr = parent_res + scratch.positive_before(nuc, start);
    let mut flow_metr = scratch.positive_before(nuc, flow);
    let mut penalty = scratch.negative_before(nuc, end);
    let res = metr + scratch.negative_before(nuc, start);
    metr += penalty;
    flow_metr += penalty;
    penalty += flow_metr;
    ChildScore {
        metr,
        res,
        flow_metr,
        penalty,
    }
}

/// Suffix sums of squared signal: `tail[f]` is the energy of flows `f..`.
pub(crate) fn accumulate_tail_energy(norm: &[f32], tail: &mut [f32]) {
    let mut sum = 0.0f32;
    tail[norm.len()] = 0.0;
    for flow in (0..norm.len()).rev() {
        sum += norm[flow] * norm[flow];
        tail[flow] = sum;
    }
}

/// Sum of squared differences, accumulated in flow order.
pub(crate) fn squared_distance(measured: &[f32], predicted: &[f32]) -> f32 {
    let mut total = 0.0f32;
    for (m, p) in measured.iter().zip(predicted) {
        let residual = m - p;
        total += residual * residual;
    }
    total
}

/// Predicted signal at `flow`, affine-corrected when recalibrating.
#[inline]
fn corrected_pred(path: &PathRecord, flow: usize, recalibrate: bool) -> f32 {
    if recalibrate {
        let (a, b) = path.calibration(flow);
        path.pred[flow] * a + b
    } else {
        path.pred[flow]
    }
}

/// Copies expansion results into surviving paths.
struct Grower<'a> {
    model: &'a FlowModel,
    scratch: &'a Expansion,
    calibration: Option<&'a RecalibrationModel>,
    track_inphase: bool,
}

impl Grower<'_> {
    /// Turn a scored child record into a full path derived from `parent`.
    fn adopt(&self, parent: &PathRecord, child: &mut PathRecord) {
        let order = self.model.order();
        child.flow_metr = (child.metr + 0.5 * child.flow_metr) / child.flow as f32;
        let (nuc, window_end) = (child.nuc, child.window_end);
        self.scratch.copy_lane(nuc, child, window_end);
        child.pred[..parent.window_start].copy_from_slice(&parent.pred[..parent.window_start]);

        child.sequence.clear();
        child.sequence.extend_from_slice(&parent.sequence);
        child.last_hp = parent.last_hp;
        child.push_base(order.base_at(child.flow));

        if self.track_inphase {
            child.inherit_inphase(parent);
            child.extend_inphase(parent.flow, self.scratch.state_at(child.nuc, child.flow));
        }
        if let Some(recalibration) = self.calibration {
            child.inherit_calibration(parent);
            let (a, b) = recalibration.lookup(child.flow, order.nuc_at(child.flow), child.last_hp);
            child.extend_calibration(parent.flow, a, b);
        }
    }

    /// Extend `parent` in place by the hypothesis recorded in `child`.
    fn extend_in_place(&self, child: &PathRecord, parent: &mut PathRecord) {
        let order = self.model.order();
        let previous_flow = parent.flow;
        parent.flow = child.flow;
        parent.window_end = child.window_end;
        parent.res = child.res;
        parent.metr = child.metr;
        parent.flow_metr = (child.metr + 0.5 * child.flow_metr) / child.flow as f32;
        parent.dot_count = child.dot_count;
        self.scratch.copy_lane(child.nuc, parent, child.window_end);
        parent.push_base(order.base_at(parent.flow));

        if let Some(recalibration) = self.calibration {
            let (a, b) =
                recalibration.lookup(parent.flow, order.nuc_at(parent.flow), parent.last_hp);
            parent.extend_calibration(previous_flow, a, b);
        }
        if self.track_inphase {
            parent.extend_inphase(previous_flow, self.scratch.state_at(child.nuc, parent.flow));
        }
        parent.window_start = child.window_start;
    }
}

impl Decoder {
    /// Search for the best call over `[begin_flow, end_flow)` against the
    /// current normalized signal.
    ///
    /// With `begin_flow > 0` the best path's sequence is first replayed up to
    /// `begin_flow`. Returns `true` when that sequence ends before
    /// `begin_flow`; the replayed path then becomes the best path and no
    /// search runs.
    pub(super) fn solve(&mut self, begin_flow: usize, end_flow: usize) -> bool {
        accumulate_tail_energy(&self.norm, &mut self.tail_energy);

        let Self {
            model,
            pool,
            scratch,
            norm,
            tail_energy,
            recalibration,
            recalibrate,
            track_inphase,
            max_path_delay,
            ..
        } = self;
        let model: &FlowModel = model;
        let norm: &[f32] = norm;
        let tail_energy: &[f32] = tail_energy;
        let max_path_delay = *max_path_delay;
        let calibration = if *recalibrate {
            recalibration.as_deref()
        } else {
            None
        };
        let recalibrating = calibration.is_some();

        let root_slot = pool.slot_of(0);
        pool.slot_mut(root_slot).reset_root();

        if begin_flow > 0 {
            let best_slot = pool.slot_of(BEST_RANK);
            let (best, parent) = pool.pair_mut(best_slot, root_slot);
            for &base in &best.sequence {
                let Some(nucleotide) = Nucleotide::from_ascii(base) else {
                    break;
                };
                if model.next_occurrence(parent.flow)[nucleotide.index()] >= end_flow {
                    break;
                }
                parent.push_base(base);
                propagate::advance(model, parent, nucleotide.index(), end_flow);
                for flow in parent.window_start..parent.window_end {
                    parent.pred[flow] += parent.state[flow];
                }
                if parent.flow >= begin_flow {
                    break;
                }
            }
            let exhausted = parent.window_end < begin_flow;
            if !exhausted {
                let settled = parent.window_start;
                parent.res = squared_distance(&norm[..settled], &parent.pred[..settled]);
            }
            if exhausted {
                pool.assign(BEST_RANK, root_slot);
                pool.assign(0, best_slot);
                return true;
            }
        }

        {
            let best = pool.at_mut(BEST_RANK);
            best.window_end = 0;
            best.sequence.clear();
        }

        let mut live = 1usize;
        let mut best_dist = INITIAL_BEST_DISTANCE;
        let mut iterations = 0usize;

        loop {
            iterations += 1;

            if live > AGE_PRUNING_MIN_PATHS {
                let furthest = (0..live).map(|rank| pool.at(rank).flow).max().unwrap_or(0);
                if furthest > max_path_delay {
                    let cutoff = furthest - max_path_delay;
                    for rank in (0..live).rev() {
                        if pool.at(rank).flow < cutoff {
                            live -= 1;
                            pool.swap(rank, live);
                        }
                    }
                }
            }

            while live > MAX_LIVE_BEFORE_EXPANSION {
                let mut worst = 0;
                for rank in 1..live {
                    if pool.at(worst).flow_metr < pool.at(rank).flow_metr {
                        worst = rank;
                    }
                }
                live -= 1;
                pool.swap(worst, live);
            }

            let mut cheapest = 0;
            for rank in 1..live {
                if pool.at(cheapest).metr > pool.at(rank).metr {
                    cheapest = rank;
                }
            }
            let parent_slot = pool.slot_of(cheapest);
            if pool.slot(parent_slot).metr >= METRIC_CEILING {
                break;
            }

            propagate::expand(
                model,
                norm,
                recalibrating,
                pool.slot(parent_slot),
                end_flow,
                scratch,
            );

            let mut band = PenaltyBand::new();
            let mut next_free = live;
            for nuc in 0..NUM_NUCLEOTIDES {
                let child_slot = pool.slot_of(next_free);
                let (parent, child) = pool.pair_mut(parent_slot, child_slot);
                let flow = scratch.flow(nuc);
                child.flow = flow;
                child.window_start = scratch.window_start(nuc);
                child.window_end = scratch.window_end(nuc);

                if flow >= end_flow
                    || parent.last_hp >= MAX_HP_LENGTH
                    || parent.sequence_len() >= MAX_SEQUENCE_LENGTH
                {
                    continue;
                }

                let score = score_child(parent.res, scratch, nuc);
                child.res = score.res;
                if score.penalty >= PENALTY_CEILING || !band.admit(score.penalty) {
                    continue;
                }
                if score.metr > best_dist {
                    continue;
                }

                let mut signal = norm[flow];
                if flow < parent.window_end {
                    signal -= corrected_pred(parent, flow, recalibrating);
                }
                signal /= scratch.state_at(nuc, flow);
                child.dot_count = 0;
                if signal < DOT_THRESHOLD {
                    if parent.dot_count > 0 {
                        continue;
                    }
                    child.dot_count = 1;
                }

                child.metr = score.metr;
                child.flow_metr = score.flow_metr;
                child.penalty = score.penalty;
                child.nuc = nuc;
                next_free += 1;
            }

            // Distance of the parent read as a complete call.
            let parent = pool.slot(parent_slot);
            let mut dist = parent.res
                + (tail_energy[parent.window_end] - tail_energy[end_flow]);
            for flow in parent.window_start..parent.window_end {
                let residual = norm[flow] - corrected_pred(parent, flow, recalibrating);
                dist += residual * residual;
            }

            let mut parent_rank = Some(cheapest);
            let mut best_rank = None;
            if best_dist > dist {
                best_rank = parent_rank.take();
            }

            let grower = Grower {
                model,
                scratch: &*scratch,
                calibration,
                track_inphase: *track_inphase,
            };
            let mut extension = None;
            while live < next_free {
                let child_slot = pool.slot_of(live);
                if !band.retains(pool.slot(child_slot).penalty) {
                    next_free -= 1;
                    pool.swap(live, next_free);
                } else if extension.is_none() && parent_rank.is_some() {
                    next_free -= 1;
                    pool.swap(live, next_free);
                    extension = Some(next_free);
                } else {
                    let (parent, child) = pool.pair_mut(parent_slot, child_slot);
                    grower.adopt(parent, child);
                    live += 1;
                }
            }

            if let Some(child_rank) = extension {
                let child_slot = pool.slot_of(child_rank);
                let (child, parent) = pool.pair_mut(child_slot, parent_slot);
                grower.extend_in_place(child, parent);
                parent_rank = None;
            }

            if let Some(rank) = best_rank {
                best_dist = dist;
                live -= 1;
                let previous_best = pool.slot_of(BEST_RANK);
                let last = pool.slot_of(live);
                pool.assign(rank, last);
                pool.assign(live, previous_best);
                pool.assign(BEST_RANK, parent_slot);
            } else if let Some(rank) = parent_rank {
                live -= 1;
                let last = pool.slot_of(live);
                pool.assign(rank, last);
                pool.assign(live, parent_slot);
            }

            if live == 0 {
                break;
            }
        }

        trace!(
            begin_flow,
            end_flow,
            iterations,
            best_dist,
            bases = pool.best().sequence_len(),
            "search pass finished"
        );
        false
    }
}
