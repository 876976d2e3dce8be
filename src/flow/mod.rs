//! Flow-space primitives: the nucleotide alphabet, the cyclic dispensation
//! order, and the per-flow model derived from it.
//!
//! Everything the decoder needs to know about the chemistry lives here. A
//! [`FlowOrder`] answers "which nucleotide is dispensed at flow `i`", and a
//! [`FlowModel`] turns that into next-occurrence tables and per-flow
//! transition probabilities parameterized by carry-forward and
//! incomplete-extension rates.

mod model;
mod order;

pub use model::{FlowModel, Transition};
pub use order::{FlowOrder, Nucleotide, MAX_FLOWS, NUM_NUCLEOTIDES};
