//! Affine recalibration of predicted signal.
//!
//! A model maps `(flow, nucleotide, homopolymer length)` to coefficients
//! `(A, B)`; during the final search pass predictions are corrected to
//! `pred * A + B` before residuals are taken. Tables are built once and
//! shared read-only (usually behind an `Arc`) by every decoder that uses
//! them.

use crate::flow::NUM_NUCLEOTIDES;
use crate::path::MAX_HP_LENGTH;
use crate::DecoderError;

const HP_BINS: usize = MAX_HP_LENGTH + 1;

/// Per-flow, per-nucleotide, per-homopolymer-length affine coefficients.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecalibrationModel {
    num_flows: usize,
    gains: Vec<f32>,
    offsets: Vec<f32>,
}

impl RecalibrationModel {
    /// Identity coefficients (`A = 1`, `B = 0`) everywhere.
    pub fn identity(num_flows: usize) -> Self {
        let len = num_flows * NUM_NUCLEOTIDES * HP_BINS;
        Self {
            num_flows,
            gains: vec![1.0; len],
            offsets: vec![0.0; len],
        }
    }

    /// Build a model by evaluating `coefficients(flow, nuc, hp)` for every entry.
    pub fn from_fn<F>(num_flows: usize, mut coefficients: F) -> Self
    where
        F: FnMut(usize, usize, usize) -> (f32, f32),
    {
        let mut model = Self::identity(num_flows);
        for flow in 0..num_flows {
            for nuc in 0..NUM_NUCLEOTIDES {
                for hp in 0..HP_BINS {
                    let (gain, offset) = coefficients(flow, nuc, hp);
                    let index = model.index(flow, nuc, hp);
                    model.gains[index] = gain;
                    model.offsets[index] = offset;
                }
            }
        }
        model
    }

    /// Build a model from nested `[flow][nucleotide][hp]` tables.
    ///
    /// Homopolymer rows may be shorter than `MAX_HP_LENGTH + 1`; missing
    /// lengths reuse the last coefficient supplied.
    pub fn from_tables(
        gains: &[Vec<Vec<f32>>],
        offsets: &[Vec<Vec<f32>>],
    ) -> Result<Self, DecoderError> {
        if gains.len() != offsets.len() {
            return Err(DecoderError::InvalidRecalibration(format!(
                "gain table covers {} flows, offset table {}",
                gains.len(),
                offsets.len()
            )));
        }
        let mut model = Self::identity(gains.len());
        for (flow, (gain_rows, offset_rows)) in gains.iter().zip(offsets).enumerate() {
            if gain_rows.len() != NUM_NUCLEOTIDES || offset_rows.len() != NUM_NUCLEOTIDES {
                return Err(DecoderError::InvalidRecalibration(format!(
                    "flow {flow} must have {NUM_NUCLEOTIDES} nucleotide rows"
                )));
            }
            for nuc in 0..NUM_NUCLEOTIDES {
                let (gain_row, offset_row) = (&gain_rows[nuc], &offset_rows[nuc]);
                if gain_row.is_empty() || gain_row.len() != offset_row.len() {
                    return Err(DecoderError::InvalidRecalibration(format!(
                        "flow {flow} nucleotide {nuc}: gain and offset rows must be non-empty and equal length"
                    )));
                }
                if gain_row.len() > HP_BINS {
                    return Err(DecoderError::InvalidRecalibration(format!(
                        "flow {flow} nucleotide {nuc}: {} homopolymer bins exceed {HP_BINS}",
                        gain_row.len()
                    )));
                }
                for hp in 0..HP_BINS {
                    let source = hp.min(gain_row.len() - 1);
                    let index = model.index(flow, nuc, hp);
                    model.gains[index] = gain_row[source];
                    model.offsets[index] = offset_row[source];
                }
            }
        }
        Ok(model)
    }

    /// Number of flows covered.
    pub fn num_flows(&self) -> usize {
        self.num_flows
    }

    /// Coefficients `(A, B)` for a call of `hp` bases of `nuc` at `flow`.
    #[inline]
    pub fn lookup(&self, flow: usize, nuc: usize, hp: usize) -> (f32, f32) {
        let index = self.index(flow, nuc, hp.min(MAX_HP_LENGTH));
        (self.gains[index], self.offsets[index])
    }

    #[inline]
    fn index(&self, flow: usize, nuc: usize, hp: usize) -> usize {
        (flow * NUM_NUCLEOTIDES + nuc) * HP_BINS + hp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_model_is_neutral() {
        let model = RecalibrationModel::identity(10);
        assert_eq!(model.lookup(9, 3, MAX_HP_LENGTH), (1.0, 0.0));
        assert_eq!(model.num_flows(), 10);
    }

    #[test]
    fn from_fn_indexes_every_axis() {
        let model = RecalibrationModel::from_fn(6, |flow, nuc, hp| {
            (1.0 + flow as f32, (nuc * 100 + hp) as f32)
        });
        assert_eq!(model.lookup(4, 2, 7), (5.0, 207.0));
        // Lengths past the cap share the last bin.
        assert_eq!(model.lookup(0, 1, 99), (1.0, (100 + MAX_HP_LENGTH) as f32));
    }

    #[test]
    fn tables_extend_short_rows() {
        let gains = vec![vec![vec![1.0, 1.1]; 4]; 2];
        let offsets = vec![vec![vec![0.0, 0.2]; 4]; 2];
        let model = RecalibrationModel::from_tables(&gains, &offsets).expect("valid tables");
        assert_eq!(model.lookup(1, 0, 0), (1.0, 0.0));
        assert_eq!(model.lookup(1, 0, 1), (1.1, 0.2));
        assert_eq!(model.lookup(1, 0, 5), (1.1, 0.2));
    }

    #[test]
    fn malformed_tables_are_rejected() {
        let gains = vec![vec![vec![1.0]; 3]];
        let offsets = vec![vec![vec![0.0]; 3]];
        assert!(matches!(
            RecalibrationModel::from_tables(&gains, &offsets),
            Err(DecoderError::InvalidRecalibration(_))
        ));
        let gains = vec![vec![vec![1.0]; 4]];
        assert!(RecalibrationModel::from_tables(&gains, &[]).is_err());
    }
}
