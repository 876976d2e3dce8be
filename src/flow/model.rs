use super::order::{FlowOrder, NUM_NUCLEOTIDES};

/// Per-flow probabilities that a waiting template incorporates each nucleotide.
pub type Transition = [f32; NUM_NUCLEOTIDES];

/// Flow-order model: next-occurrence tables and per-flow transition vectors.
///
/// Immutable for the duration of a decode; rebuilt by [`FlowModel::configure`]
/// and [`FlowModel::set_parameters`].
#[derive(Debug, Clone)]
pub struct FlowModel {
    order: FlowOrder,
    next_occurrence: Vec<[usize; NUM_NUCLEOTIDES]>,
    transitions: Vec<Transition>,
    carry_forward: f64,
    incomplete_extension: f64,
}

impl FlowModel {
    /// Build a model for `order` with the given phasing parameters.
    pub fn new(order: FlowOrder, carry_forward: f64, incomplete_extension: f64) -> Self {
        let mut model = Self {
            order: order.clone(),
            next_occurrence: Vec::new(),
            transitions: Vec::new(),
            carry_forward,
            incomplete_extension,
        };
        model.configure(order);
        model
    }

    /// Replace the flow order and rebuild every table.
    pub fn configure(&mut self, order: FlowOrder) {
        let num_flows = order.num_flows();
        let mut next = [num_flows; NUM_NUCLEOTIDES];
        self.next_occurrence.clear();
        self.next_occurrence.resize(num_flows, next);
        for flow in (0..num_flows).rev() {
            next[order.nuc_at(flow)] = flow;
            self.next_occurrence[flow] = next;
        }
        self.order = order;
        self.rebuild_transitions();
    }

    /// Rebuild transition vectors for new carry-forward / incomplete-extension rates.
    pub fn set_parameters(&mut self, carry_forward: f64, incomplete_extension: f64) {
        self.carry_forward = carry_forward;
        self.incomplete_extension = incomplete_extension;
        self.rebuild_transitions();
    }

    fn rebuild_transitions(&mut self) {
        let num_flows = self.order.num_flows();
        let mut carry = [0.0f64; NUM_NUCLEOTIDES];
        self.transitions.clear();
        self.transitions.reserve(num_flows);
        for flow in 0..num_flows {
            carry[self.order.nuc_at(flow)] = 1.0;
            let mut transition = [0.0f32; NUM_NUCLEOTIDES];
            for (nuc, slot) in transition.iter_mut().enumerate() {
                *slot = (carry[nuc] * (1.0 - self.incomplete_extension)) as f32;
                carry[nuc] *= self.carry_forward;
            }
            self.transitions.push(transition);
        }
    }

    /// Flow order the tables were built from.
    pub fn order(&self) -> &FlowOrder {
        &self.order
    }

    /// Number of flows.
    #[inline]
    pub fn num_flows(&self) -> usize {
        self.order.num_flows()
    }

    /// Carry-forward rate.
    pub fn carry_forward(&self) -> f64 {
        self.carry_forward
    }

    /// Incomplete-extension rate.
    pub fn incomplete_extension(&self) -> f64 {
        self.incomplete_extension
    }

    /// First flow at or after `flow` dispensing each nucleotide (`num_flows` if none).
    #[inline]
    pub fn next_occurrence(&self, flow: usize) -> &[usize; NUM_NUCLEOTIDES] {
        &self.next_occurrence[flow]
    }

    /// Transition probabilities at `flow`.
    #[inline]
    pub fn transition(&self, flow: usize) -> &Transition {
        &self.transitions[flow]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::Nucleotide;

    fn model(cycle: &str, flows: usize, cf: f64, ie: f64) -> FlowModel {
        FlowModel::new(FlowOrder::new(cycle, flows).expect("valid order"), cf, ie)
    }

    #[test]
    fn next_occurrence_points_forward() {
        let model = model("TACG", 8, 0.0, 0.0);
        assert_eq!(model.next_occurrence(0), &[1, 2, 3, 0]);
        assert_eq!(model.next_occurrence(1), &[1, 2, 3, 4]);
        assert_eq!(model.next_occurrence(5), &[5, 6, 7, 8]);
        assert_eq!(model.next_occurrence(7), &[8, 8, 7, 8]);
    }

    #[test]
    fn next_occurrence_is_monotone() {
        let model = model("TACGTACGTCTGAGCATCGATCGATGTACAGC", 400, 0.0, 0.0);
        for flow in 1..model.num_flows() {
            for nuc in 0..NUM_NUCLEOTIDES {
                assert!(model.next_occurrence(flow)[nuc] >= model.next_occurrence(flow - 1)[nuc]);
                assert!(model.next_occurrence(flow)[nuc] <= model.num_flows());
            }
        }
    }

    #[test]
    fn ideal_chemistry_only_incorporates_dispensed_base() {
        let model = model("TACG", 8, 0.0, 0.0);
        for flow in 0..8 {
            let dispensed = model.order().nuc_at(flow);
            for nuc in 0..NUM_NUCLEOTIDES {
                let expected = if nuc == dispensed { 1.0 } else { 0.0 };
                assert_eq!(model.transition(flow)[nuc], expected);
            }
        }
    }

    #[test]
    fn carry_forward_decays_geometrically() {
        let model = model("TACG", 8, 0.1, 0.2);
        let t = Nucleotide::T.index();
        assert!((model.transition(4)[t] - 0.8).abs() < 1e-7);
        assert!((model.transition(5)[t] - 0.08).abs() < 1e-7);
        assert!((model.transition(6)[t] - 0.008).abs() < 1e-7);
        // A has not been dispensed before flow 1.
        assert_eq!(model.transition(0)[Nucleotide::A.index()], 0.0);
    }
}
