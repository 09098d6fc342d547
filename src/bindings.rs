//! Python extension module.
//!
//! Thin wrappers over the codec, signature and sync entry points for the
//! Python web application. Errors surface as `ValueError` for bad input and
//! `RuntimeError` for provider or store failures.

use std::path::PathBuf;

use pyo3::exceptions::{PyRuntimeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::codec::key_value;
use crate::config::TriageConfig;
use crate::crashinfo::{CrashInfo, ProgramConfiguration};
use crate::signature::{normalize_line_endings, CompiledSignature};
use crate::tasks::{check_mirror_revision, global_sync_stats, SyncOutcome};
use crate::init_logger;

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn runtime_error(e: impl std::fmt::Display) -> PyErr {
    PyRuntimeError::new_err(e.to_string())
}

fn build_crash_info(
    stdout: &str,
    stderr: &str,
    crash_data: &str,
    product: &str,
    platform: &str,
    os: &str,
) -> CrashInfo {
    CrashInfo::from_raw_crash_data(
        stdout,
        stderr,
        ProgramConfiguration::new(product, platform, os, None),
        crash_data,
    )
}

/// Encode `KEY=VALUE` entries as the stored JSON object.
#[pyfunction]
fn encode_key_value_list(entries: Vec<String>) -> PyResult<String> {
    key_value::encode(&entries).map_err(value_error)
}

/// Decode a stored JSON object into `KEY=VALUE` entries.
#[pyfunction]
fn decode_key_value_list(text: &str) -> PyResult<Vec<String>> {
    key_value::decode(text).map_err(value_error)
}

#[pyfunction]
fn normalize_signature(text: &str) -> String {
    normalize_line_endings(text)
}

/// Hash of the canonical form of a signature document.
#[pyfunction]
fn signature_hash(text: &str) -> PyResult<String> {
    let compiled = CompiledSignature::compile(text).map_err(value_error)?;
    Ok(compiled.signature_hash())
}

#[pyfunction]
#[pyo3(signature = (signature, stdout, stderr, crash_data, product, platform, os))]
fn signature_matches(
    signature: &str,
    stdout: &str,
    stderr: &str,
    crash_data: &str,
    product: &str,
    platform: &str,
    os: &str,
) -> PyResult<bool> {
    let compiled = CompiledSignature::compile(signature).map_err(value_error)?;
    let info = build_crash_info(stdout, stderr, crash_data, product, platform, os);
    Ok(compiled.matches(&info))
}

#[pyfunction]
fn short_signature(
    stdout: &str,
    stderr: &str,
    crash_data: &str,
    product: &str,
    platform: &str,
    os: &str,
) -> String {
    build_crash_info(stdout, stderr, crash_data, product, platform, os).short_signature()
}

/// Ensure `revision` is present in the mirror at `location`.
///
/// Provider commands are bounded by `CRASHTRIAGE_PROVIDER_TIMEOUT_SECS`.
/// Returns `"known"` or `"updated"`.
#[pyfunction]
#[pyo3(signature = (classname, location, revision))]
fn check_revision(
    py: Python<'_>,
    classname: &str,
    location: PathBuf,
    revision: &str,
) -> PyResult<String> {
    init_logger();
    let config = TriageConfig::from_env().map_err(value_error)?;

    let outcome = py
        .allow_threads(|| check_mirror_revision(classname, location, revision, &config))
        .map_err(runtime_error)?;
    match outcome {
        SyncOutcome::AlreadyKnown => Ok("known".to_string()),
        SyncOutcome::UpdatedUnverified => Ok("updated".to_string()),
    }
}

/// Counters of all revision checks run in this process.
#[pyfunction]
fn sync_stats(py: Python<'_>) -> PyResult<Py<PyAny>> {
    let snapshot = global_sync_stats().snapshot();
    let stats = PyDict::new(py);
    stats.set_item("runs", snapshot.runs)?;
    stats.set_item("already_known", snapshot.already_known)?;
    stats.set_item("updated_unverified", snapshot.updated_unverified)?;
    stats.set_item("failed", snapshot.failed)?;
    Ok(stats.into())
}

/// Python module definition
#[pymodule]
fn crashtriage_core(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(encode_key_value_list, m)?)?;
    m.add_function(wrap_pyfunction!(decode_key_value_list, m)?)?;
    m.add_function(wrap_pyfunction!(normalize_signature, m)?)?;
    m.add_function(wrap_pyfunction!(signature_hash, m)?)?;
    m.add_function(wrap_pyfunction!(signature_matches, m)?)?;
    m.add_function(wrap_pyfunction!(short_signature, m)?)?;
    m.add_function(wrap_pyfunction!(check_revision, m)?)?;
    m.add_function(wrap_pyfunction!(sync_stats, m)?)?;
    Ok(())
}
