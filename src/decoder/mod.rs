//! The decoder: search passes interleaved with signal normalization, plus
//! simulation and quality-metric walks over a called sequence.
//!
//! A [`Decoder`] owns every buffer it needs (path pool, expansion scratch,
//! normalized signal, tail energies), sized once per flow configuration.
//! Reads are processed one at a time; run one decoder per thread to decode
//! reads in parallel. A recalibration model may be shared between decoders.

mod normalize;
mod quality;
mod search;

use std::sync::Arc;

use tracing::{debug, debug_span};

use crate::flow::{FlowModel, FlowOrder, Nucleotide};
use crate::path::{PathPool, PathRecord, BEST_RANK, MAX_SEQUENCE_LENGTH};
use crate::propagate::{self, Expansion};
use crate::read::BasecallerRead;
use crate::recalibration::RecalibrationModel;
use crate::{DecoderConfig, DecoderError};

use normalize::WindowedNormalizer;

/// Flow interval `[begin, end)` solved by one search pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Segment {
    /// First flow the pass may call.
    pub begin: usize,
    /// Flow bound of the pass (exclusive).
    pub end: usize,
}

/// Build the pass schedule: overlapping windows of `2 * window_size` flows
/// advancing by `window_size`, then a tail window, then one full-read pass.
fn build_schedule(num_flows: usize, window_size: usize) -> Vec<Segment> {
    let span = 2 * window_size;
    let mut schedule = Vec::new();
    let mut end = span;
    while end < num_flows {
        schedule.push(Segment {
            begin: end - span,
            end,
        });
        end += window_size;
    }
    schedule.push(Segment {
        begin: num_flows.saturating_sub(span),
        end: num_flows,
    });
    schedule.push(Segment {
        begin: 0,
        end: num_flows,
    });
    schedule
}

/// Phasing-aware tree-search base caller for one flow configuration.
#[derive(Debug)]
pub struct Decoder {
    model: FlowModel,
    window_size: usize,
    max_path_delay: usize,
    schedule: Vec<Segment>,
    pool: PathPool,
    scratch: Expansion,
    norm: Vec<f32>,
    tail_energy: Vec<f32>,
    normalizer: WindowedNormalizer,
    recalibration: Option<Arc<RecalibrationModel>>,
    recalibrate: bool,
    track_inphase: bool,
}

impl Decoder {
    /// Build a decoder from `config`.
    pub fn new(config: &DecoderConfig) -> Result<Self, DecoderError> {
        if config.window_size == 0 {
            return Err(DecoderError::InvalidWindowSize);
        }
        let order = config.flow_order()?;
        let num_flows = order.num_flows();
        let model = FlowModel::new(order, config.carry_forward, config.incomplete_extension);
        debug!(
            num_flows,
            window_size = config.window_size,
            carry_forward = config.carry_forward,
            incomplete_extension = config.incomplete_extension,
            "decoder configured"
        );
        Ok(Self {
            model,
            window_size: config.window_size,
            max_path_delay: config.max_path_delay,
            schedule: build_schedule(num_flows, config.window_size),
            pool: PathPool::new(num_flows),
            scratch: Expansion::with_flows(num_flows),
            norm: vec![0.0; num_flows],
            tail_energy: vec![0.0; num_flows + 1],
            normalizer: WindowedNormalizer::new(config.window_size),
            recalibration: None,
            recalibrate: false,
            track_inphase: false,
        })
    }

    /// Switch to a new flow order and normalization window.
    ///
    /// Buffers are resized, the pass schedule is rebuilt and any attached
    /// recalibration model is detached. Phasing rates are kept.
    pub fn reconfigure(&mut self, order: FlowOrder, window_size: usize) -> Result<(), DecoderError> {
        if window_size == 0 {
            return Err(DecoderError::InvalidWindowSize);
        }
        let num_flows = order.num_flows();
        self.model.configure(order);
        self.window_size = window_size;
        self.schedule = build_schedule(num_flows, window_size);
        self.pool = PathPool::new(num_flows);
        self.scratch = Expansion::with_flows(num_flows);
        self.norm = vec![0.0; num_flows];
        self.tail_energy = vec![0.0; num_flows + 1];
        self.normalizer = WindowedNormalizer::new(window_size);
        self.recalibration = None;
        self.recalibrate = false;
        self.track_inphase = false;
        debug!(num_flows, window_size, "decoder reconfigured");
        Ok(())
    }

    /// Rebuild transition probabilities for new phasing rates.
    pub fn set_model_parameters(&mut self, carry_forward: f64, incomplete_extension: f64) {
        self.model.set_parameters(carry_forward, incomplete_extension);
    }

    /// Attach a recalibration model, applied during the final search pass.
    pub fn set_recalibration_model(
        &mut self,
        model: Arc<RecalibrationModel>,
    ) -> Result<(), DecoderError> {
        if model.num_flows() != self.num_flows() {
            return Err(DecoderError::RecalibrationFlows {
                expected: self.num_flows(),
                actual: model.num_flows(),
            });
        }
        self.recalibration = Some(model);
        Ok(())
    }

    /// Detach the recalibration model.
    pub fn clear_recalibration_model(&mut self) {
        self.recalibration = None;
    }

    /// Whether a recalibration model is attached.
    pub fn has_recalibration_model(&self) -> bool {
        self.recalibration.is_some()
    }

    /// Flow order in use.
    pub fn flow_order(&self) -> &FlowOrder {
        self.model.order()
    }

    /// Flow model in use.
    pub fn model(&self) -> &FlowModel {
        &self.model
    }

    /// Number of flows per read.
    pub fn num_flows(&self) -> usize {
        self.model.num_flows()
    }

    /// Normalization window size.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Age-pruning delay.
    pub fn max_path_delay(&self) -> usize {
        self.max_path_delay
    }

    /// Pass schedule: normalization passes followed by the final full-read pass.
    pub fn segments(&self) -> &[Segment] {
        &self.schedule
    }

    /// Best complete path of the most recent search.
    pub fn best_path(&self) -> &PathRecord {
        self.pool.best()
    }

    /// Every path slot left by the most recent pass, live or free.
    pub fn paths(&self) -> impl Iterator<Item = &PathRecord> {
        self.pool.iter()
    }

    /// Normalize the raw signal and call bases.
    ///
    /// Alternates windowed search passes with re-estimation of the additive
    /// and multiplicative corrections, then runs one full-read pass (with
    /// recalibration if a model is attached) that also tracks in-phase mass.
    /// Fills the sequence, normalized signal, prediction, corrections and
    /// in-phase arrays of `read`.
    pub fn normalize_and_solve(&mut self, read: &mut BasecallerRead) -> Result<(), DecoderError> {
        let num_flows = self.num_flows();
        self.check_signal(read.raw_measurements.len())?;
        let _span = debug_span!("normalize_and_solve", num_flows).entered();

        read.prepare_outputs(num_flows);
        self.norm.copy_from_slice(&read.raw_measurements);

        let normalization_steps = self.schedule.len() - 1;
        for step in 0..normalization_steps {
            let segment = self.schedule[step];
            let exhausted = self.solve(segment.begin, segment.end);
            self.normalize_step(read, step);
            if exhausted {
                debug!(step, "called sequence ends before pass start");
                break;
            }
        }

        self.recalibrate = self.recalibration.is_some();
        self.track_inphase = true;
        let final_pass = self.schedule[normalization_steps];
        self.solve(final_pass.begin, final_pass.end);

        let best = self.pool.best();
        read.sequence.clear();
        read.sequence.extend_from_slice(&best.sequence);
        read.normalized_measurements.copy_from_slice(&self.norm);
        read.prediction.fill(0.0);
        read.prediction[..best.window_end].copy_from_slice(&best.pred[..best.window_end]);
        read.state_inphase.fill(0.0);
        read.state_inphase[..best.window_end]
            .copy_from_slice(&best.state_inphase()[..best.window_end]);

        for path in self.pool.slots_mut() {
            path.clear_calibration();
            path.clear_inphase();
        }
        self.recalibrate = false;
        self.track_inphase = false;

        debug!(
            bases = read.sequence.len(),
            residual = read.squared_residual(),
            "read decoded"
        );
        Ok(())
    }

    /// Re-solve an already normalized read over `[begin_flow, end_flow)`.
    ///
    /// The first `begin_flow` flows of `read.sequence` are kept; the rest of
    /// the call is searched again. Fills the sequence, normalized signal and
    /// prediction of `read`.
    pub fn solve_read(
        &mut self,
        read: &mut BasecallerRead,
        begin_flow: usize,
        end_flow: usize,
    ) -> Result<(), DecoderError> {
        let num_flows = self.num_flows();
        self.check_signal(read.normalized_measurements.len())?;
        if end_flow == 0 || end_flow > num_flows || begin_flow > end_flow {
            return Err(DecoderError::FlowRange {
                begin: begin_flow,
                end: end_flow,
                num_flows,
            });
        }
        check_sequence(&read.sequence)?;
        let _span = debug_span!("solve_read", begin_flow, end_flow).entered();

        self.norm.copy_from_slice(&read.normalized_measurements);
        {
            let best = self.pool.at_mut(BEST_RANK);
            best.pred.fill(0.0);
            best.sequence.clear();
            best.sequence.extend_from_slice(&read.sequence);
        }

        self.solve(begin_flow, end_flow);

        let best = self.pool.best();
        read.prediction.resize(num_flows, 0.0);
        read.sequence.clear();
        read.sequence.extend_from_slice(&best.sequence);
        read.normalized_measurements.copy_from_slice(&self.norm);
        read.prediction.fill(0.0);
        read.prediction[..best.window_end].copy_from_slice(&best.pred[..best.window_end]);
        Ok(())
    }

    /// Predict the signal of `read.sequence` over the first `max_flows` flows.
    ///
    /// Bases that would incorporate at or beyond `max_flows` are ignored.
    /// Writes `read.prediction`.
    pub fn simulate(&mut self, read: &mut BasecallerRead, max_flows: usize) -> Result<(), DecoderError> {
        let num_flows = self.num_flows();
        let max_flows = max_flows.min(num_flows);
        check_sequence(&read.sequence)?;

        let model = &self.model;
        let path = self.pool.at_mut(0);
        path.reset_root();
        for &base in &read.sequence {
            let nuc = nucleotide_index(base);
            if model.next_occurrence(path.flow)[nuc] >= max_flows {
                break;
            }
            propagate::advance(model, path, nuc, max_flows);
            for flow in path.window_start..path.window_end {
                path.pred[flow] += path.state[flow];
            }
        }

        read.prediction.clear();
        read.prediction.resize(num_flows, 0.0);
        read.prediction[..path.window_end].copy_from_slice(&path.pred[..path.window_end]);
        Ok(())
    }

    /// Re-estimate the additive and multiplicative corrections from the best
    /// path's prediction, using `num_steps + 1` windows.
    ///
    /// Writes the corrections and the normalized signal into `read`.
    pub fn windowed_normalize(
        &mut self,
        read: &mut BasecallerRead,
        num_steps: usize,
    ) -> Result<(), DecoderError> {
        let num_flows = self.num_flows();
        self.check_signal(read.raw_measurements.len())?;
        read.prepare_outputs(num_flows);
        self.normalize_step(read, num_steps);
        read.normalized_measurements.copy_from_slice(&self.norm);
        Ok(())
    }

    fn normalize_step(&mut self, read: &mut BasecallerRead, num_steps: usize) {
        let best = self.pool.best();
        let predicted = &best.pred[..best.window_end];
        self.normalizer.normalize(
            &read.raw_measurements,
            predicted,
            &mut self.norm,
            &mut read.additive_correction,
            &mut read.multiplicative_correction,
            num_steps,
        );
    }

    fn check_signal(&self, len: usize) -> Result<(), DecoderError> {
        let expected = self.num_flows();
        if len != expected {
            return Err(DecoderError::SignalLength {
                expected,
                actual: len,
            });
        }
        Ok(())
    }
}

/// Validate a called sequence: uppercase ACGT within the path capacity.
fn check_sequence(sequence: &[u8]) -> Result<(), DecoderError> {
    if sequence.len() > MAX_SEQUENCE_LENGTH {
        return Err(DecoderError::SequenceTooLong {
            len: sequence.len(),
            max: MAX_SEQUENCE_LENGTH,
        });
    }
    if let Some(position) = sequence
        .iter()
        .position(|&base| Nucleotide::from_ascii(base).is_none())
    {
        return Err(DecoderError::InvalidBase {
            base: sequence[position] as char,
            position,
        });
    }
    Ok(())
}

/// Lane of a base already validated by [`check_sequence`].
#[inline]
fn nucleotide_index(base: u8) -> usize {
    Nucleotide::from_ascii(base).map_or(0, Nucleotide::index)
}
