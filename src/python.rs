//! Python bindings, built with the `python` feature.

use std::path::PathBuf;

use pyo3::exceptions::{PyOSError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyBytes, PyDict, PyList};

use crate::error::TrainError;
use crate::trainer::{Trainer, TrainerConfig};

fn to_py_err(err: TrainError) -> PyErr {
    match err {
        TrainError::Io { .. } | TrainError::Read(_) => PyOSError::new_err(err.to_string()),
        _ => PyValueError::new_err(err.to_string()),
    }
}

/// Train a byte-level BPE vocabulary on the file at `input_path`.
///
/// Returns `(vocab, merges)`: a dict from symbol ID to bytes, and the list of
/// merged `(bytes, bytes)` pairs in the order they were learned.
#[pyfunction]
#[pyo3(signature = (input_path, vocab_size, special_tokens, num_workers=None, pattern=None))]
#[pyo3(text_signature = "(input_path, vocab_size, special_tokens, num_workers=None, pattern=None)")]
fn train_bpe<'py>(
    py: Python<'py>,
    input_path: PathBuf,
    vocab_size: u32,
    special_tokens: Vec<String>,
    num_workers: Option<usize>,
    pattern: Option<String>,
) -> PyResult<(Bound<'py, PyDict>, Bound<'py, PyList>)> {
    let trainer = Trainer::new(TrainerConfig {
        vocab_size,
        special_tokens,
        num_workers,
        pattern,
        split_token: None,
    });
    let output = py
        .detach(|| trainer.train_from_file(&input_path))
        .map_err(to_py_err)?;

    let vocab = PyDict::new(py);
    for (id, bytes) in output.vocab.iter() {
        vocab.set_item(id, PyBytes::new(py, bytes))?;
    }
    let merges = PyList::empty(py);
    for (left, right) in &output.merges {
        merges.append((PyBytes::new(py, left), PyBytes::new(py, right)))?;
    }
    Ok((vocab, merges))
}

#[pymodule]
fn bpetrain(m: &Bound<'_, PyModule>) -> PyResult<()> {
    pyo3_log::init();
    m.add_function(wrap_pyfunction!(train_bpe, m)?)?;
    Ok(())
}
