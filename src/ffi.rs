//! Python FFI bindings via PyO3.
//!
//! Exposes rule building and zone classification to Python. Rules are passed
//! as JSON in the same shape [`RuleDefinition`] deserialises from; arrays are
//! plain lists of floats.
//!
//! # Building the Python extension
//!
//! ```bash
//! pip install maturin
//! maturin develop --features python-ffi
//! ```
//!
//! # Usage
//!
//! ```python
//! from facies_core import TruncationRule
//!
//! rule = TruncationRule(definition_json, [("F1", 1), ("F2", 2), ("F3", 3)])
//! codes, fractions = rule.classify_zone([p1, p2, p3], [grf1, grf2, grf3], resolution=100)
//! ```

#![allow(non_snake_case)]

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::builder::{RuleBuilder, RuleDefinition};
use crate::classifier::{classify, AuxiliaryFields};
use crate::error::TruncationError;
use crate::report::TruncationMapSnapshot;
use crate::rule::{Category, TruncationStructure};
use crate::signature::{SignatureCache, SignatureCacheConfig, ZoneClassification, ZoneProbabilities};
use crate::thresholds::compute_thresholds;

fn to_py_err(e: TruncationError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Validated truncation rule for one zone.
///
/// Args:
///     definition_json: rule definition as a JSON string
///     categories: list of (name, facies code) in the zone's order; probability
///         arrays and volume fractions follow this order
#[pyclass(name = "TruncationRule")]
pub struct PyTruncationRule {
    inner: TruncationStructure,
    zone_names: Vec<String>,
}

impl PyTruncationRule {
    fn run_zone(
        &self,
        probabilities: ZoneProbabilities<'_>,
        fields: &[Vec<f64>],
        resolution: u32,
        max_distinct_ratio: f64,
    ) -> PyResult<ZoneClassification> {
        let fields = AuxiliaryFields::from_vecs(fields).map_err(to_py_err)?;
        let config = SignatureCacheConfig {
            resolution,
            max_distinct_ratio,
        };
        SignatureCache::new(&self.inner, config)
            .and_then(|cache| cache.classify_zone(probabilities, &fields))
            .map_err(to_py_err)
    }
}

#[pymethods]
impl PyTruncationRule {
    /// Build and validate a rule.
    #[new]
    pub fn new(definition_json: &str, categories: Vec<(String, i32)>) -> PyResult<Self> {
        let definition: RuleDefinition = serde_json::from_str(definition_json)
            .map_err(|e| PyValueError::new_err(format!("invalid rule definition: {e}")))?;
        let zone: Vec<Category> = categories
            .iter()
            .map(|(name, code)| Category::new(name.clone(), *code))
            .collect();
        let inner = RuleBuilder::new(&zone).build(&definition).map_err(to_py_err)?;
        Ok(Self {
            inner,
            zone_names: categories.into_iter().map(|(name, _)| name).collect(),
        })
    }

    /// Category names in zone order.
    #[getter]
    pub fn categories(&self) -> Vec<String> {
        self.zone_names.clone()
    }

    /// Auxiliary field names, background fields first.
    #[getter]
    pub fn fields(&self) -> Vec<String> {
        self.inner.field_names().to_vec()
    }

    /// Number of auxiliary fields each cell needs.
    #[getter]
    pub fn num_fields(&self) -> usize {
        self.inner.num_aux_fields()
    }

    /// Classify a zone with per-cell probabilities.
    ///
    /// Args:
    ///     probabilities: one list per category (zone order), one value per cell
    ///     fields: one list per auxiliary field, one value per cell
    ///     resolution: signature quantization resolution, 50..=1000
    ///     max_distinct_ratio: grouping threshold on distinct signatures per cell
    ///
    /// Returns:
    ///     (codes, volume_fractions)
    #[pyo3(signature = (probabilities, fields, resolution=100, max_distinct_ratio=0.2))]
    pub fn classify_zone(
        &self,
        probabilities: Vec<Vec<f64>>,
        fields: Vec<Vec<f64>>,
        resolution: u32,
        max_distinct_ratio: f64,
    ) -> PyResult<(Vec<i32>, Vec<f64>)> {
        let zone = self.run_zone(
            ZoneProbabilities::PerCell(&probabilities),
            &fields,
            resolution,
            max_distinct_ratio,
        )?;
        Ok((zone.codes, zone.volume_fractions))
    }

    /// Classify a zone whose probabilities are the same in every cell.
    pub fn classify_constant(
        &self,
        probabilities: Vec<f64>,
        fields: Vec<Vec<f64>>,
    ) -> PyResult<(Vec<i32>, Vec<f64>)> {
        let defaults = SignatureCacheConfig::default();
        let zone = self.run_zone(
            ZoneProbabilities::Constant(&probabilities),
            &fields,
            defaults.resolution,
            defaults.max_distinct_ratio,
        )?;
        Ok((zone.codes, zone.volume_fractions))
    }

    /// Facies code of a single cell.
    pub fn classify_cell(&self, probabilities: Vec<f64>, coordinate: Vec<f64>) -> PyResult<i32> {
        let thresholds = compute_thresholds(&self.inner, &probabilities).map_err(to_py_err)?;
        classify(&self.inner, &thresholds, &coordinate).map_err(to_py_err)
    }

    /// Truncation map of one probability vector as JSON.
    pub fn truncation_map(&self, probabilities: Vec<f64>) -> PyResult<String> {
        let thresholds = compute_thresholds(&self.inner, &probabilities).map_err(to_py_err)?;
        let snapshot = TruncationMapSnapshot::from_thresholds(&self.inner, &thresholds);
        serde_json::to_string(&snapshot).map_err(|e| PyValueError::new_err(e.to_string()))
    }

    /// Python repr string.
    pub fn __repr__(&self) -> String {
        format!(
            "TruncationRule(categories={}, overlay_groups={})",
            self.inner.num_categories(),
            self.inner.overlay_groups().len()
        )
    }
}

/// Python module entry point.
#[pymodule]
pub fn facies_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyTruncationRule>()?;
    m.add("__version__", env!("CARGO_PKG_VERSION"))?;
    m.add("DEFAULT_RESOLUTION", crate::signature::DEFAULT_RESOLUTION)?;
    Ok(())
}
