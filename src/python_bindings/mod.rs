//! Python bindings that expose the decoder via PyO3.
use pyo3::{exceptions::PyValueError, prelude::*, types::PyModule};

use crate::{BasecallerRead, Decoder, DecoderConfig, DecoderError};

fn to_py_err(err: DecoderError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Python-facing decoder for one flow configuration.
#[pyclass]
#[derive(Debug)]
pub struct PyDecoder {
    decoder: Decoder,
}

#[pymethods]
impl PyDecoder {
    #[new]
    #[pyo3(signature = (
        flow_order,
        num_flows,
        carry_forward = 0.0,
        incomplete_extension = 0.0,
        window_size = DecoderConfig::DEFAULT_WINDOW_SIZE
    ))]
    /// Create a decoder for `num_flows` flows of `flow_order`.
    pub fn new(
        flow_order: &str,
        num_flows: usize,
        carry_forward: f64,
        incomplete_extension: f64,
        window_size: usize,
    ) -> PyResult<Self> {
        let config = DecoderConfig::new(flow_order, num_flows)
            .and_then(|config| config.with_window_size(window_size))
            .map_err(to_py_err)?
            .with_phasing(carry_forward, incomplete_extension);
        let decoder = Decoder::new(&config).map_err(to_py_err)?;
        Ok(Self { decoder })
    }

    /// Number of flows per read.
    pub fn num_flows(&self) -> usize {
        self.decoder.num_flows()
    }

    /// Call bases from a raw flowgram.
    ///
    /// Returns:
    ///     Tuple of `(sequence, normalized_signal, prediction)`.
    pub fn decode(&mut self, raw: Vec<f32>) -> PyResult<(String, Vec<f32>, Vec<f32>)> {
        let mut read = BasecallerRead::new(raw);
        self.decoder
            .normalize_and_solve(&mut read)
            .map_err(to_py_err)?;
        Ok((
            read.sequence_string(),
            read.normalized_measurements,
            read.prediction,
        ))
    }

    /// Call bases and compute quality metrics.
    ///
    /// Returns:
    ///     Tuple of `(sequence, penalty_residual, penalty_mismatch, state_inphase)`.
    pub fn decode_with_quality(
        &mut self,
        raw: Vec<f32>,
    ) -> PyResult<(String, Vec<f32>, Vec<f32>, Vec<f32>)> {
        let mut read = BasecallerRead::new(raw);
        self.decoder
            .normalize_and_solve(&mut read)
            .map_err(to_py_err)?;
        self.decoder
            .compute_qv_metrics(&mut read)
            .map_err(to_py_err)?;
        Ok((
            read.sequence_string(),
            read.penalty_residual,
            read.penalty_mismatch,
            read.state_inphase,
        ))
    }

    /// Predict the flowgram of a base sequence.
    pub fn simulate(&mut self, sequence: &str) -> PyResult<Vec<f32>> {
        let num_flows = self.decoder.num_flows();
        let mut read = BasecallerRead::new(vec![0.0; num_flows])
            .with_sequence(sequence.trim().to_ascii_uppercase());
        self.decoder
            .simulate(&mut read, num_flows)
            .map_err(to_py_err)?;
        Ok(read.prediction)
    }
}

/// Python module definition.
#[pymodule]
pub fn phasecall_py(_py: Python<'_>, m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyDecoder>()?;
    Ok(())
}
