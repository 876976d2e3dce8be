//! State propagation: how a path's probability mass moves when one more base
//! is incorporated.
//!
//! [`expand`] evaluates all four nucleotide hypotheses for a parent at once,
//! writing per-lane state, prediction and cumulative residual sums into an
//! [`Expansion`] scratch owned by the caller. It never touches the parent, so
//! the parent and the scratch can never alias. [`advance`] moves a single path
//! by a known nucleotide and is used when replaying or simulating an already
//! decided sequence.

use crate::flow::{FlowModel, NUM_NUCLEOTIDES};
use crate::path::{PathRecord, MIN_FRACTION};

type Lanes<T> = [T; NUM_NUCLEOTIDES];

/// Per-hypothesis results of one expansion.
///
/// Flow-indexed buffers are stored relative to the parent's window start
/// (`origin`). The cumulative residual buffers carry a leading zero entry so
/// that `*_before(flow)` reads the sum over `[origin, flow)`.
#[derive(Debug, Clone)]
pub struct Expansion {
    flow: Lanes<usize>,
    window_start: Lanes<usize>,
    window_end: Lanes<usize>,
    origin: usize,
    written: usize,
    state: Vec<Lanes<f32>>,
    pred: Vec<Lanes<f32>>,
    negative: Vec<Lanes<f32>>,
    positive: Vec<Lanes<f32>>,
}

impl Expansion {
    /// Allocate scratch for expansions over `num_flows` flows.
    pub fn with_flows(num_flows: usize) -> Self {
        let len = num_flows + 2;
        Self {
            flow: [0; NUM_NUCLEOTIDES],
            window_start: [0; NUM_NUCLEOTIDES],
            window_end: [0; NUM_NUCLEOTIDES],
            origin: 0,
            written: 0,
            state: vec![[0.0; NUM_NUCLEOTIDES]; len],
            pred: vec![[0.0; NUM_NUCLEOTIDES]; len],
            negative: vec![[0.0; NUM_NUCLEOTIDES]; len],
            positive: vec![[0.0; NUM_NUCLEOTIDES]; len],
        }
    }

    /// Flow at which hypothesis `nuc` incorporates, capped by the flow bound.
    #[inline]
    pub fn flow(&self, nuc: usize) -> usize {
        self.flow[nuc]
    }

    /// Window start of hypothesis `nuc`.
    #[inline]
    pub fn window_start(&self, nuc: usize) -> usize {
        self.window_start[nuc]
    }

    /// Window end of hypothesis `nuc`.
    #[inline]
    pub fn window_end(&self, nuc: usize) -> usize {
        self.window_end[nuc]
    }

    /// First flow covered by the buffers (the parent's window start).
    #[inline]
    pub fn origin(&self) -> usize {
        self.origin
    }

    /// State mass of hypothesis `nuc` at `flow`.
    #[inline]
    pub fn state_at(&self, nuc: usize, flow: usize) -> f32 {
        match flow.checked_sub(self.origin) {
            Some(offset) if offset < self.written => self.state[offset][nuc],
            _ => 0.0,
        }
    }

    /// Predicted signal of hypothesis `nuc` at `flow`.
    #[inline]
    pub fn pred_at(&self, nuc: usize, flow: usize) -> f32 {
        match flow.checked_sub(self.origin) {
            Some(offset) if offset < self.written => self.pred[offset][nuc],
            _ => 0.0,
        }
    }

    /// Sum of squared negative residuals over `[origin, flow)`.
    #[inline]
    pub fn negative_before(&self, nuc: usize, flow: usize) -> f32 {
        self.negative[flow.saturating_sub(self.origin).min(self.written)][nuc]
    }

    /// Sum of squared positive residuals over `[origin, flow)`.
    #[inline]
    pub fn positive_before(&self, nuc: usize, flow: usize) -> f32 {
        self.positive[flow.saturating_sub(self.origin).min(self.written)][nuc]
    }

    /// Copy the state and prediction of hypothesis `nuc` over `[origin, upto)` into `path`.
    pub fn copy_lane(&self, nuc: usize, path: &mut PathRecord, upto: usize) {
        for flow in self.origin..upto {
            path.state[flow] = self.state_at(nuc, flow);
            path.pred[flow] = self.pred_at(nuc, flow);
        }
    }
}

struct Walk<'a> {
    model: &'a FlowModel,
    measured: &'a [f32],
    recalibrate: bool,
    parent: &'a PathRecord,
    extends: Lanes<bool>,
    alive: Lanes<f32>,
    negative: Lanes<f32>,
    positive: Lanes<f32>,
    start: Lanes<usize>,
    end: Lanes<usize>,
}

impl Walk<'_> {
    /// Move mass through `flow` for every lane and record the residuals.
    fn step(&mut self, out: &mut Expansion, flow: usize) -> Lanes<f32> {
        let inside = flow < self.parent.window_end;
        let (carried, base_pred) = if inside {
            (self.parent.state[flow], self.parent.pred[flow])
        } else {
            (0.0, 0.0)
        };
        let transition = self.model.transition(flow);
        let calibration = if self.recalibrate {
            Some(self.parent.calibration(flow)).filter(|&(_, b)| b != 0.0)
        } else {
            None
        };
        let offset = flow - out.origin;
        let mut mass = [0.0f32; NUM_NUCLEOTIDES];
        for nuc in 0..NUM_NUCLEOTIDES {
            if inside {
                self.alive[nuc] += carried;
            }
            mass[nuc] = if self.extends[nuc] {
                carried
            } else {
                transition[nuc] * self.alive[nuc]
            };
            self.alive[nuc] -= mass[nuc];

            let pred = if inside { base_pred + mass[nuc] } else { mass[nuc] };
            let predicted = match calibration {
                Some((a, b)) => pred * a + b,
                None => pred,
            };
            let residual = self.measured[flow] - predicted;
            let squared = residual * residual;
            if residual.is_sign_negative() {
                self.negative[nuc] += squared;
            } else {
                self.positive[nuc] += squared;
            }
            out.state[offset][nuc] = mass[nuc];
            out.pred[offset][nuc] = pred;
        }
        out.negative[offset + 1] = self.negative;
        out.positive[offset + 1] = self.positive;
        out.written = offset + 1;
        mass
    }

    /// Advance window starts of lanes whose leading mass fell below the floor.
    fn advance_starts(&mut self, flow: usize, mass: &Lanes<f32>) -> bool {
        let mut moved = false;
        for nuc in 0..NUM_NUCLEOTIDES {
            let floor = if !self.extends[nuc] && self.start[nuc] == flow {
                MIN_FRACTION
            } else {
                0.0
            };
            if !(floor <= mass[nuc]) {
                self.start[nuc] += 1;
                moved = true;
            }
        }
        moved
    }

    /// A window never becomes empty.
    fn keep_nonempty(&mut self) {
        for nuc in 0..NUM_NUCLEOTIDES {
            if self.start[nuc] == self.end[nuc] {
                self.start[nuc] -= 1;
            }
        }
    }

    /// Grow window ends of lanes that still carry mass past their last flow.
    fn advance_ends(&mut self, flow: usize) -> bool {
        let mut moved = false;
        for nuc in 0..NUM_NUCLEOTIDES {
            let alive = if !self.extends[nuc] && self.end[nuc] == flow + 1 {
                self.alive[nuc]
            } else {
                0.0
            };
            if !(alive <= MIN_FRACTION) {
                self.end[nuc] += 1;
                moved = true;
            }
        }
        moved
    }
}

/// Expand `parent` by all four nucleotides, bounded by `end` flows.
///
/// `measured` is the signal residuals are taken against; when `recalibrate`
/// is set, predictions at flows where the parent carries a non-zero additive
/// coefficient are affine-corrected before the residual is computed (stored
/// predictions stay uncorrected).
pub fn expand(
    model: &FlowModel,
    measured: &[f32],
    recalibrate: bool,
    parent: &PathRecord,
    end: usize,
    out: &mut Expansion,
) {
    let next = model.next_occurrence(parent.flow);
    let mut extends = [false; NUM_NUCLEOTIDES];
    for nuc in 0..NUM_NUCLEOTIDES {
        out.flow[nuc] = next[nuc].min(end);
        extends[nuc] = out.flow[nuc] == parent.flow;
    }
    out.origin = parent.window_start;
    out.written = 0;
    out.negative[0] = [0.0; NUM_NUCLEOTIDES];
    out.positive[0] = [0.0; NUM_NUCLEOTIDES];

    let mut walk = Walk {
        model,
        measured,
        recalibrate,
        parent,
        extends,
        alive: [0.0; NUM_NUCLEOTIDES],
        negative: [0.0; NUM_NUCLEOTIDES],
        positive: [0.0; NUM_NUCLEOTIDES],
        start: [parent.window_start; NUM_NUCLEOTIDES],
        end: [parent.window_end; NUM_NUCLEOTIDES],
    };

    debug_assert!(parent.window_end <= end, "parent window past the flow bound");
    let last = parent.window_end - 1;
    let mut flow = parent.window_start;
    let mut advancing = true;

    // Leading flows: trim window starts while any lane keeps shedding mass.
    while flow < last {
        let mass = walk.step(out, flow);
        advancing = walk.advance_starts(flow, &mass);
        flow += 1;
        if !advancing {
            break;
        }
    }

    if !advancing {
        while flow < last {
            walk.step(out, flow);
            flow += 1;
        }
        walk.step(out, flow);
        advancing = walk.advance_ends(flow);
        flow += 1;
        while flow < end && advancing {
            walk.step(out, flow);
            advancing = walk.advance_ends(flow);
            flow += 1;
        }
    } else {
        // Starts were still moving at the last parent flow.
        let mass = walk.step(out, flow);
        walk.advance_starts(flow, &mass);
        walk.keep_nonempty();
        advancing = walk.advance_ends(flow);
        flow += 1;
        while flow < end && advancing {
            let mass = walk.step(out, flow);
            walk.advance_starts(flow, &mass);
            walk.keep_nonempty();
            advancing = walk.advance_ends(flow);
            flow += 1;
        }
    }

    out.window_start = walk.start;
    for nuc in 0..NUM_NUCLEOTIDES {
        out.window_end[nuc] = walk.end[nuc].min(end);
    }
}

/// Incorporate one `nuc` into `path`, bounded by `end` flows.
///
/// Extending the current homopolymer leaves the state untouched; the caller
/// adds the state to the prediction afterwards.
pub fn advance(model: &FlowModel, path: &mut PathRecord, nuc: usize, end: usize) {
    let target = model.next_occurrence(path.flow)[nuc].min(end);
    if path.flow == target {
        return;
    }
    path.flow = target;

    let transition = |flow: usize| model.transition(flow)[nuc];
    let mut alive = 0.0f32;
    let mut start = path.window_start;
    let mut stop = path.window_end;
    let last = stop - 1;
    let mut flow = start;

    while flow < last {
        alive += path.state[flow];
        let mass = alive * transition(flow);
        path.state[flow] = mass;
        alive -= mass;
        flow += 1;
        if !(mass < MIN_FRACTION) {
            break;
        }
        start += 1;
    }

    if flow > start {
        while flow < last {
            alive += path.state[flow];
            let mass = alive * transition(flow);
            path.state[flow] = mass;
            alive -= mass;
            flow += 1;
        }
        alive += path.state[flow];
        while flow < end {
            let mass = alive * transition(flow);
            path.state[flow] = mass;
            alive -= mass;
            if !(alive > MIN_FRACTION) {
                break;
            }
            flow += 1;
            path.pred[flow] = 0.0;
            stop += 1;
        }
    } else {
        alive += path.state[flow];
        while flow < stop {
            let mass = alive * transition(flow);
            path.state[flow] = mass;
            alive -= mass;
            let at_start = flow == start;
            flow += 1;
            if at_start && flow < stop && mass < MIN_FRACTION {
                start += 1;
            }
            if flow == stop && stop < end && alive > MIN_FRACTION {
                path.pred[stop] = 0.0;
                stop += 1;
            }
        }
    }

    path.window_start = start;
    // The tail walk can step one past `end` while mass is still alive.
    path.window_end = stop.min(end);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::{FlowOrder, Nucleotide};

    fn ideal_model(flows: usize) -> FlowModel {
        FlowModel::new(FlowOrder::new("TACG", flows).expect("valid order"), 0.0, 0.0)
    }

    fn root(flows: usize) -> PathRecord {
        let mut path = PathRecord::with_flows(flows);
        path.reset_root();
        path
    }

    #[test]
    fn root_expansion_places_each_hypothesis_at_its_flow() {
        let model = ideal_model(8);
        let measured = [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0];
        let mut out = Expansion::with_flows(8);
        expand(&model, &measured, false, &root(8), 8, &mut out);

        // A, C, G first dispensed at flows 1..3; T extends at flow 0.
        assert_eq!(
            [out.flow(0), out.flow(1), out.flow(2), out.flow(3)],
            [1, 2, 3, 0]
        );
        assert_eq!(
            [out.window_end(0), out.window_end(1), out.window_end(2), out.window_end(3)],
            [2, 3, 4, 1]
        );
        for nuc in 0..NUM_NUCLEOTIDES {
            assert_eq!(out.window_start(nuc), 0);
            assert_eq!(out.state_at(nuc, out.flow(nuc)), 1.0);
        }

        let t = Nucleotide::T.index();
        assert_eq!(out.pred_at(t, 0), 1.0);
        assert_eq!(out.negative_before(t, 1), 0.0);
        assert_eq!(out.positive_before(t, 1), 0.0);

        let a = Nucleotide::A.index();
        assert_eq!(out.positive_before(a, 1), 1.0);
        assert_eq!(out.negative_before(a, 2), 1.0);
    }

    #[test]
    fn windows_stay_ordered_and_bounded() {
        let model = FlowModel::new(FlowOrder::new("TACG", 40).expect("valid order"), 0.05, 0.03);
        let measured = vec![0.5f32; 40];
        let mut out = Expansion::with_flows(40);
        let mut path = root(40);
        for &base in b"TACGGTCA" {
            let nuc = Nucleotide::from_ascii(base).expect("base").index();
            expand(&model, &measured, false, &path, 40, &mut out);
            for lane in 0..NUM_NUCLEOTIDES {
                assert!(out.window_start(lane) < out.window_end(lane));
                assert!(out.window_end(lane) <= 40);
            }
            path.flow = out.flow(nuc);
            out.copy_lane(nuc, &mut path, out.window_end(nuc));
            path.window_start = out.window_start(nuc);
            path.window_end = out.window_end(nuc);
            let mass: f32 = path.state[path.window_start..path.window_end].iter().sum();
            assert!(mass <= 1.0 + 1e-5, "mass {mass} exceeds one");
        }
    }

    #[test]
    fn advance_matches_expansion_lane() {
        let model = FlowModel::new(FlowOrder::new("TACG", 32).expect("valid order"), 0.02, 0.01);
        let measured = vec![0.0f32; 32];
        let mut out = Expansion::with_flows(32);
        let mut expanded = root(32);
        let mut advanced = root(32);
        for &base in b"TTGCA" {
            let nuc = Nucleotide::from_ascii(base).expect("base").index();
            expand(&model, &measured, false, &expanded, 32, &mut out);
            let end = out.window_end(nuc);
            out.copy_lane(nuc, &mut expanded, end);
            expanded.flow = out.flow(nuc);
            expanded.window_start = out.window_start(nuc);
            expanded.window_end = end;

            advance(&model, &mut advanced, nuc, 32);
            for flow in advanced.window_start..advanced.window_end {
                advanced.pred[flow] += advanced.state[flow];
            }

            assert_eq!(advanced.flow, expanded.flow);
            assert_eq!(advanced.window_end, expanded.window_end);
            for flow in advanced.window_start.max(expanded.window_start)..end {
                assert!((advanced.pred[flow] - expanded.pred[flow]).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn advance_clamps_window_to_flow_bound() {
        let flows = 12;
        let model = FlowModel::new(FlowOrder::new("TACG", flows).expect("valid order"), 0.1, 0.2);
        let mut path = root(flows);
        for (step, &base) in b"TACGTACG".iter().enumerate() {
            let nuc = Nucleotide::from_ascii(base).expect("base").index();
            if model.next_occurrence(path.flow)[nuc] >= flows {
                break;
            }
            advance(&model, &mut path, nuc, flows);
            assert!(path.window_start < path.window_end, "step {step}");
            assert!(path.window_end <= flows, "step {step}: window ends at {}", path.window_end);
            if step >= 2 {
                // Mass is still alive at the last flow.
                assert_eq!(path.window_end, flows);
            }
        }

        // The clamped path is a valid parent for a bounded expansion.
        let measured = vec![0.5f32; flows];
        let mut out = Expansion::with_flows(flows);
        expand(&model, &measured, false, &path, flows, &mut out);
        for lane in 0..NUM_NUCLEOTIDES {
            assert!(out.window_end(lane) <= flows);
        }
    }

    #[test]
    fn homopolymer_advance_keeps_state() {
        let model = ideal_model(8);
        let mut path = root(8);
        advance(&model, &mut path, Nucleotide::T.index(), 8);
        assert_eq!(path.flow, 0);
        assert_eq!((path.window_start, path.window_end), (0, 1));
        assert_eq!(path.state[0], 1.0);
    }
}
