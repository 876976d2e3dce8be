//! # Flow-space base calling with a phasing-aware tree search
//!
//! This library turns the per-flow signal of a flow-based sequencing run into
//! called bases. Each flow dispenses one nucleotide; templates that fall out
//! of phase (carry-forward, incomplete extension) smear signal across
//! neighbouring flows, so the decoder models the probability mass of every
//! candidate call explicitly and searches for the call whose predicted signal
//! best explains the measurements.
//!
//! ## Pipeline
//!
//! 1. **Flow model**: next-occurrence tables and transition probabilities
//!    from the flow order and two phasing rates ([`flow`]).
//! 2. **Propagation**: four-way expansion of a candidate path by the next
//!    base ([`propagate`]).
//! 3. **Search**: a bounded pool of paths, pruned by residual penalties, that
//!    keeps the best complete call ([`decoder`]).
//! 4. **Normalization**: windowed median estimates of additive offset and
//!    multiplicative gain, interleaved with search passes.
//! 5. **Quality metrics**: a deterministic walk of the final call that
//!    records per-base penalties and per-flow in-phase mass.
//!
//! ## Usage Example
//!
//! ```
//! use phasecall::{BasecallerRead, Decoder, DecoderConfig};
//!
//! let config = DecoderConfig::new("TACG", 8)?.with_phasing(0.0, 0.0);
//! let mut decoder = Decoder::new(&config)?;
//! let mut read = BasecallerRead::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0]);
//! decoder.normalize_and_solve(&mut read)?;
//! decoder.compute_qv_metrics(&mut read)?;
//! assert_eq!(read.sequence, b"TGT");
//! # Ok::<(), phasecall::DecoderError>(())
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod decoder; // Search, normalization and quality passes
pub mod flow; // Flow order and flow-order model
pub mod path; // Candidate paths and the path pool
pub mod propagate; // Four-way state propagation
pub mod read; // Caller-owned read record
pub mod recalibration; // Affine recalibration tables
/// Python bindings for exposing the decoder to external runtimes.
#[cfg(feature = "python-bindings")]
pub mod python_bindings;

pub use decoder::{Decoder, Segment};
pub use flow::{FlowModel, FlowOrder, Nucleotide};
pub use read::BasecallerRead;
pub use recalibration::RecalibrationModel;

use thiserror::Error;

/// Errors raised while configuring a decoder or validating its inputs.
///
/// Decoding itself never fails: every boundary condition inside the search
/// is a pruning or termination rule.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecoderError {
    /// The flow order has no nucleotides.
    #[error("flow order is empty")]
    EmptyFlowOrder,

    /// The flow order contains something other than `A`, `C`, `G` or `T`.
    #[error("invalid nucleotide {base:?} at flow order position {position}")]
    InvalidFlowNucleotide {
        /// Offending character.
        base: char,
        /// Position within the flow-order cycle.
        position: usize,
    },

    /// Flow count is zero or above the supported maximum.
    #[error("flow count {num_flows} outside 1..={max}")]
    InvalidFlowCount {
        /// Requested number of flows.
        num_flows: usize,
        /// Largest supported number of flows.
        max: usize,
    },

    /// Normalization window must cover at least one flow.
    #[error("normalization window size must be > 0")]
    InvalidWindowSize,

    /// A per-flow array does not match the configured flow count.
    #[error("signal has {actual} flows, decoder is configured for {expected}")]
    SignalLength {
        /// Configured number of flows.
        expected: usize,
        /// Length supplied by the caller.
        actual: usize,
    },

    /// A called sequence contains a non-ACGT base.
    #[error("invalid base {base:?} at sequence position {position}")]
    InvalidBase {
        /// Offending character.
        base: char,
        /// Position within the sequence.
        position: usize,
    },

    /// A called sequence is longer than any path can hold.
    #[error("sequence of {len} bases exceeds the maximum of {max}")]
    SequenceTooLong {
        /// Sequence length supplied by the caller.
        len: usize,
        /// Longest supported sequence.
        max: usize,
    },

    /// A staged decode was asked for an empty or out-of-range flow interval.
    #[error("flow range {begin}..{end} invalid for {num_flows} flows")]
    FlowRange {
        /// First flow of the requested interval.
        begin: usize,
        /// End of the requested interval (exclusive).
        end: usize,
        /// Configured number of flows.
        num_flows: usize,
    },

    /// Recalibration tables do not match the decoder's flow count.
    #[error("recalibration model covers {actual} flows, decoder is configured for {expected}")]
    RecalibrationFlows {
        /// Configured number of flows.
        expected: usize,
        /// Flows covered by the model.
        actual: usize,
    },

    /// Recalibration tables are malformed.
    #[error("invalid recalibration table: {0}")]
    InvalidRecalibration(String),
}

/// Configuration parameters for a [`Decoder`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecoderConfig {
    /// Nucleotide dispensation cycle.
    pub flow_order: String,
    /// Number of flows per read.
    pub num_flows: usize,
    /// Carry-forward rate.
    pub carry_forward: f64,
    /// Incomplete-extension rate.
    pub incomplete_extension: f64,
    /// Flows per normalization window.
    pub window_size: usize,
    /// Paths lagging the furthest path by more than this many flows are dropped.
    pub max_path_delay: usize,
}

impl DecoderConfig {
    /// Flow order used when none is given.
    pub const DEFAULT_FLOW_ORDER: &'static str = "TACG";
    /// Default normalization window.
    pub const DEFAULT_WINDOW_SIZE: usize = 38;
    /// Default age-pruning delay.
    pub const DEFAULT_MAX_PATH_DELAY: usize = 40;

    /// Configuration for `num_flows` flows of `flow_order` with ideal chemistry.
    pub fn new(flow_order: impl Into<String>, num_flows: usize) -> Result<Self, DecoderError> {
        let flow_order = flow_order.into();
        FlowOrder::new(&flow_order, num_flows)?;
        Ok(Self {
            flow_order,
            num_flows,
            carry_forward: 0.0,
            incomplete_extension: 0.0,
            window_size: Self::DEFAULT_WINDOW_SIZE,
            max_path_delay: Self::DEFAULT_MAX_PATH_DELAY,
        })
    }

    /// Set the carry-forward and incomplete-extension rates.
    pub fn with_phasing(mut self, carry_forward: f64, incomplete_extension: f64) -> Self {
        self.carry_forward = carry_forward;
        self.incomplete_extension = incomplete_extension;
        self
    }

    /// Set the normalization window size.
    pub fn with_window_size(mut self, window_size: usize) -> Result<Self, DecoderError> {
        if window_size == 0 {
            return Err(DecoderError::InvalidWindowSize);
        }
        self.window_size = window_size;
        Ok(self)
    }

    /// Set the age-pruning delay.
    pub fn with_max_path_delay(mut self, max_path_delay: usize) -> Self {
        self.max_path_delay = max_path_delay;
        self
    }

    /// Parsed flow order.
    pub fn flow_order(&self) -> Result<FlowOrder, DecoderError> {
        FlowOrder::new(&self.flow_order, self.num_flows)
    }
}

impl Default for DecoderConfig {
    /// A single `TACG` cycle with the default window.
    fn default() -> Self {
        Self {
            flow_order: Self::DEFAULT_FLOW_ORDER.to_string(),
            num_flows: Self::DEFAULT_FLOW_ORDER.len(),
            carry_forward: 0.0,
            incomplete_extension: 0.0,
            window_size: Self::DEFAULT_WINDOW_SIZE,
            max_path_delay: Self::DEFAULT_MAX_PATH_DELAY,
        }
    }
}
