/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Signature-cached zone classification.
//!
//! Millions of cells often share a handful of distinct probability vectors.
//! [`SignatureCache`] quantizes every cell's vector to a signature, groups
//! cells by signature and computes thresholds once per group.
//!
//! # Quantization
//!
//! Each row is normalized to sum to one (uniform when all zero), then each
//! probability becomes an integer number of `1 / resolution` units.
//! Rounding can leave the units summing to `resolution ± k`; up to
//! [`REBALANCE_STEPS`] times, the largest entry (lowest slot on ties) moves one
//! unit toward an exact sum. Larger drifts are left as they are and counted in
//! [`CacheStats::unbalanced_signatures`].
//!
//! # Dispatch
//!
//! | Input | Path |
//! |-------|------|
//! | one vector for the whole zone | [`DispatchPath::Constant`]: thresholds once, batch walk over all cells |
//! | distinct signatures < `max_distinct_ratio × cells` | [`DispatchPath::Grouped`]: thresholds per signature, batch walk per group (scalar for single-cell groups) |
//! | otherwise | [`DispatchPath::PerCell`]: thresholds per cell from the unquantized vector |
//!
//! With the `parallel` feature the grouped path runs one rayon task per
//! signature group; every task owns its thresholds.

use alloc::vec::Vec;

use hashbrown::HashMap;
use tracing::{debug, trace, warn};

use crate::classifier::{classify_order, for_each_cell, AuxiliaryFields};
use crate::error::{Result, TruncationError};
use crate::numeric::round_non_negative;
use crate::rule::{TruncationStructure, MAX_AUX_FIELDS};
use crate::thresholds::ComputedThresholds;

/// Default quantization resolution.
pub const DEFAULT_RESOLUTION: u32 = 100;

/// Smallest accepted resolution.
pub const MIN_RESOLUTION: u32 = 50;

/// Largest accepted resolution.
pub const MAX_RESOLUTION: u32 = 1000;

/// Default ratio of distinct signatures to cells below which grouping pays off.
pub const DEFAULT_MAX_DISTINCT_RATIO: f64 = 0.2;

/// Maximum number of one-unit corrections applied to a quantized signature.
pub const REBALANCE_STEPS: usize = 2;

// ─── SignatureCacheConfig ────────────────────────────────────────────────────

/// Configuration for [`SignatureCache`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignatureCacheConfig {
    /// Quantization units per probability. Range `[50, 1000]`, default 100.
    pub resolution: u32,

    /// Grouping is used while `distinct signatures < max_distinct_ratio × cells`.
    /// Range `(0, 1]`, default 0.2.
    pub max_distinct_ratio: f64,
}

impl Default for SignatureCacheConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            max_distinct_ratio: DEFAULT_MAX_DISTINCT_RATIO,
        }
    }
}

impl SignatureCacheConfig {
    /// Default configuration with a different resolution.
    pub fn with_resolution(resolution: u32) -> Self {
        Self {
            resolution,
            ..Self::default()
        }
    }

    /// Check both parameters are in range.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_RESOLUTION..=MAX_RESOLUTION).contains(&self.resolution) {
            return Err(TruncationError::InvalidConfig("resolution must be in [50, 1000]"));
        }
        if !(self.max_distinct_ratio > 0.0 && self.max_distinct_ratio <= 1.0) {
            return Err(TruncationError::InvalidConfig("max_distinct_ratio must be in (0, 1]"));
        }
        Ok(())
    }
}

// ─── Quantization ────────────────────────────────────────────────────────────

/// Normalize `probabilities`, quantize them into `signature` (units of
/// `1 / resolution`) and rebalance toward an exact sum.
///
/// An all-zero vector is read as uniform, as the threshold calculator does.
/// Returns `true` when the units sum to exactly `resolution` afterwards.
pub fn quantize_signature(probabilities: &[f64], resolution: u32, signature: &mut Vec<u32>) -> bool {
    let sum: f64 = probabilities.iter().sum();
    let uniform = 1.0 / probabilities.len().max(1) as f64;
    let scale = resolution as f64;
    signature.clear();
    signature.extend(probabilities.iter().map(|&p| {
        let share = if sum > 0.0 { p / sum } else { uniform };
        round_non_negative(share * scale)
    }));
    rebalance(signature, resolution)
}

fn rebalance(signature: &mut [u32], resolution: u32) -> bool {
    let target = u64::from(resolution);
    for _ in 0..REBALANCE_STEPS {
        let sum: u64 = signature.iter().map(|&u| u64::from(u)).sum();
        let Some(largest) = largest_slot(signature) else {
            return false;
        };
        if sum > target {
            signature[largest] -= 1;
        } else if sum < target {
            signature[largest] += 1;
        } else {
            return true;
        }
    }
    signature.iter().map(|&u| u64::from(u)).sum::<u64>() == target
}

/// Slot of the largest entry; the lowest slot wins ties.
fn largest_slot(signature: &[u32]) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (slot, &units) in signature.iter().enumerate() {
        match best {
            Some((_, top)) if units <= top => {}
            _ => best = Some((slot, units)),
        }
    }
    best.map(|(slot, _)| slot)
}

/// Expand a signature back to probabilities.
pub fn signature_probabilities(signature: &[u32], resolution: u32, out: &mut [f64]) {
    let scale = resolution as f64;
    for (p, &units) in out.iter_mut().zip(signature) {
        *p = units as f64 / scale;
    }
}

/// Quantized, rebalanced copy of `probabilities`.
pub fn quantize(probabilities: &[f64], resolution: u32) -> Vec<f64> {
    let mut signature = Vec::with_capacity(probabilities.len());
    quantize_signature(probabilities, resolution, &mut signature);
    let mut out = alloc::vec![0.0; probabilities.len()];
    signature_probabilities(&signature, resolution, &mut out);
    out
}

// ─── Inputs and outputs ──────────────────────────────────────────────────────

/// Category probabilities for one zone, in zone-slot order.
#[derive(Clone, Copy, Debug)]
pub enum ZoneProbabilities<'a> {
    /// One probability per category, shared by every cell.
    Constant(&'a [f64]),
    /// One array per category with one probability per cell.
    PerCell(&'a [Vec<f64>]),
}

/// Strategy chosen for a zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DispatchPath {
    /// Constant probabilities: one threshold computation.
    Constant,
    /// Thresholds computed once per distinct signature.
    Grouped,
    /// Thresholds computed for every cell.
    PerCell,
}

impl DispatchPath {
    /// Choose between grouped and per-cell evaluation.
    pub fn select(distinct: usize, cells: usize, max_distinct_ratio: f64) -> Self {
        if (distinct as f64) < max_distinct_ratio * cells as f64 {
            DispatchPath::Grouped
        } else {
            DispatchPath::PerCell
        }
    }
}

/// Counters collected while classifying one zone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CacheStats {
    /// Cells classified.
    pub cells: usize,
    /// Distinct quantized signatures (1 for a constant zone).
    pub distinct_signatures: usize,
    /// Calls to the threshold calculator.
    pub threshold_computations: usize,
    /// Cells resolved through the batch walk.
    pub batched_cells: usize,
    /// Cells resolved one at a time.
    pub scalar_cells: usize,
    /// Cells whose probability vector determined the category outright.
    pub determined_cells: usize,
    /// Signatures that still missed an exact sum after rebalancing.
    pub unbalanced_signatures: usize,
}

/// Result of classifying one zone.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneClassification {
    /// Facies code per cell, aligned with the input cells.
    pub codes: Vec<i32>,
    /// Cell count per zone slot.
    pub counts: Vec<u64>,
    /// Volume fraction per zone slot (`counts / cells`).
    pub volume_fractions: Vec<f64>,
    /// Strategy used.
    pub path: DispatchPath,
    /// Evaluation counters.
    pub stats: CacheStats,
}

/// Cells sharing one signature.
#[derive(Clone, Debug)]
struct SignatureGroup {
    signature: Vec<u32>,
    cells: Vec<usize>,
}

/// Accumulates codes and counts while a zone is classified.
struct ZoneOutput<'s> {
    structure: &'s TruncationStructure,
    codes: Vec<i32>,
    counts: Vec<u64>,
}

impl<'s> ZoneOutput<'s> {
    fn new(structure: &'s TruncationStructure, cells: usize) -> Self {
        Self {
            structure,
            codes: alloc::vec![0; cells],
            counts: alloc::vec![0; structure.num_categories()],
        }
    }

    #[inline]
    fn record(&mut self, cell: usize, slot: usize) {
        self.codes[cell] = self.structure.code_of_slot(slot);
        self.counts[slot] += 1;
    }

    fn finish(self, path: DispatchPath, stats: CacheStats) -> ZoneClassification {
        let total = stats.cells;
        let volume_fractions = self
            .counts
            .iter()
            .map(|&c| if total > 0 { c as f64 / total as f64 } else { 0.0 })
            .collect();
        ZoneClassification {
            codes: self.codes,
            counts: self.counts,
            volume_fractions,
            path,
            stats,
        }
    }
}

// ─── SignatureCache ──────────────────────────────────────────────────────────

/// Zone classifier that amortizes threshold computation over cells with
/// identical quantized probabilities.
///
/// Groups are built per [`SignatureCache::classify_zone`] call and dropped
/// when it returns.
pub struct SignatureCache<'s> {
    structure: &'s TruncationStructure,
    config: SignatureCacheConfig,
}

impl<'s> SignatureCache<'s> {
    /// Cache over `structure` with a validated configuration.
    pub fn new(structure: &'s TruncationStructure, config: SignatureCacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { structure, config })
    }

    /// Active configuration.
    pub fn config(&self) -> &SignatureCacheConfig {
        &self.config
    }

    /// Classify every cell of a zone.
    ///
    /// `fields` supplies one column per auxiliary field; `probabilities`
    /// either one constant vector or one column per category.
    pub fn classify_zone(
        &self,
        probabilities: ZoneProbabilities<'_>,
        fields: &AuxiliaryFields<'_>,
    ) -> Result<ZoneClassification> {
        fields.require(self.structure)?;
        let cells = fields.len();
        let mut out = ZoneOutput::new(self.structure, cells);
        let mut stats = CacheStats {
            cells,
            ..CacheStats::default()
        };

        let path = match probabilities {
            ZoneProbabilities::Constant(vector) => {
                self.classify_constant(vector, fields, &mut out, &mut stats)?;
                DispatchPath::Constant
            }
            ZoneProbabilities::PerCell(columns) => {
                self.check_columns(columns, cells)?;
                let groups = self.group_cells(columns, cells, &mut stats)?;
                let path = DispatchPath::select(groups.len(), cells, self.config.max_distinct_ratio);
                debug!(
                    cells,
                    distinct = groups.len(),
                    resolution = self.config.resolution,
                    path = ?path,
                    "signature dispatch"
                );
                match path {
                    DispatchPath::Grouped => self.classify_groups(&groups, fields, &mut out, &mut stats)?,
                    _ => self.classify_per_cell(columns, fields, &mut out, &mut stats)?,
                }
                path
            }
        };

        debug!(
            cells,
            threshold_computations = stats.threshold_computations,
            determined_cells = stats.determined_cells,
            "zone classified"
        );
        Ok(out.finish(path, stats))
    }

    fn check_columns(&self, columns: &[Vec<f64>], cells: usize) -> Result<()> {
        let expected = self.structure.num_categories();
        if columns.len() != expected {
            return Err(TruncationError::DimensionMismatch {
                what: "probability arrays",
                expected,
                found: columns.len(),
            });
        }
        for column in columns {
            if column.len() != cells {
                return Err(TruncationError::DimensionMismatch {
                    what: "probability array length",
                    expected: cells,
                    found: column.len(),
                });
            }
        }
        Ok(())
    }

    fn classify_constant(
        &self,
        vector: &[f64],
        fields: &AuxiliaryFields<'_>,
        out: &mut ZoneOutput<'_>,
        stats: &mut CacheStats,
    ) -> Result<()> {
        let thresholds = ComputedThresholds::compute(self.structure, vector)?;
        stats.distinct_signatures = 1;
        stats.threshold_computations = 1;
        stats.batched_cells = fields.len();
        if thresholds.determined().is_some() {
            stats.determined_cells = fields.len();
        }
        for_each_cell(self.structure, &thresholds, fields, 0..fields.len(), |cell, slot| {
            out.record(cell, slot)
        });
        Ok(())
    }

    /// Quantize every cell and bucket cells by signature, in first-seen order.
    fn group_cells(
        &self,
        columns: &[Vec<f64>],
        cells: usize,
        stats: &mut CacheStats,
    ) -> Result<Vec<SignatureGroup>> {
        let resolution = self.config.resolution;
        let mut lookup: HashMap<Vec<u32>, usize> = HashMap::new();
        let mut groups: Vec<SignatureGroup> = Vec::new();
        let mut row = alloc::vec![0.0; columns.len()];
        let mut signature = Vec::with_capacity(columns.len());

        for cell in 0..cells {
            for (slot, column) in columns.iter().enumerate() {
                let value = column[cell];
                if !value.is_finite() || value < 0.0 {
                    return Err(TruncationError::InvalidProbability { slot, value });
                }
                row[slot] = value;
            }
            let balanced = quantize_signature(&row, resolution, &mut signature);
            match lookup.get(&signature) {
                Some(&g) => groups[g].cells.push(cell),
                None => {
                    if !balanced {
                        stats.unbalanced_signatures += 1;
                    }
                    lookup.insert(signature.clone(), groups.len());
                    groups.push(SignatureGroup {
                        signature: signature.clone(),
                        cells: alloc::vec![cell],
                    });
                }
            }
        }

        stats.distinct_signatures = groups.len();
        if stats.unbalanced_signatures > 0 {
            warn!(
                unbalanced = stats.unbalanced_signatures,
                resolution,
                "quantized signatures do not sum to one after rebalancing"
            );
        }
        Ok(groups)
    }

    #[cfg(not(feature = "parallel"))]
    fn classify_groups(
        &self,
        groups: &[SignatureGroup],
        fields: &AuxiliaryFields<'_>,
        out: &mut ZoneOutput<'_>,
        stats: &mut CacheStats,
    ) -> Result<()> {
        let structure = self.structure;
        let mut thresholds = ComputedThresholds::new(structure);
        let mut probabilities = alloc::vec![0.0; structure.num_categories()];
        let mut buf = [0.0; MAX_AUX_FIELDS];

        for group in groups {
            signature_probabilities(&group.signature, self.config.resolution, &mut probabilities);
            thresholds.update(structure, &probabilities)?;
            stats.threshold_computations += 1;
            trace!(cells = group.cells.len(), determined = ?thresholds.determined(), "signature thresholds");
            if thresholds.determined().is_some() {
                stats.determined_cells += group.cells.len();
            }

            if let [cell] = group.cells.as_slice() {
                let coordinate = fields.gather(*cell, &mut buf);
                let order = classify_order(structure, &thresholds, coordinate);
                out.record(*cell, structure.index().slot(order));
                stats.scalar_cells += 1;
            } else {
                for_each_cell(structure, &thresholds, fields, group.cells.iter().copied(), |cell, slot| {
                    out.record(cell, slot)
                });
                stats.batched_cells += group.cells.len();
            }
        }
        Ok(())
    }

    #[cfg(feature = "parallel")]
    fn classify_groups(
        &self,
        groups: &[SignatureGroup],
        fields: &AuxiliaryFields<'_>,
        out: &mut ZoneOutput<'_>,
        stats: &mut CacheStats,
    ) -> Result<()> {
        use rayon::prelude::*;

        let structure = self.structure;
        let resolution = self.config.resolution;
        let partials = groups
            .par_iter()
            .map(|group| -> Result<(bool, Vec<usize>)> {
                let mut probabilities = alloc::vec![0.0; structure.num_categories()];
                signature_probabilities(&group.signature, resolution, &mut probabilities);
                let thresholds = ComputedThresholds::compute(structure, &probabilities)?;
                let mut slots = Vec::with_capacity(group.cells.len());
                if let [cell] = group.cells.as_slice() {
                    let mut buf = [0.0; MAX_AUX_FIELDS];
                    let coordinate = fields.gather(*cell, &mut buf);
                    slots.push(structure.index().slot(classify_order(structure, &thresholds, coordinate)));
                } else {
                    for_each_cell(structure, &thresholds, fields, group.cells.iter().copied(), |_, slot| {
                        slots.push(slot)
                    });
                }
                Ok((thresholds.determined().is_some(), slots))
            })
            .collect::<Result<Vec<_>>>()?;
        trace!(groups = groups.len(), "signature groups evaluated");

        for (group, (determined, slots)) in groups.iter().zip(partials) {
            for (&cell, &slot) in group.cells.iter().zip(&slots) {
                out.record(cell, slot);
            }
            stats.threshold_computations += 1;
            if determined {
                stats.determined_cells += group.cells.len();
            }
            if group.cells.len() == 1 {
                stats.scalar_cells += 1;
            } else {
                stats.batched_cells += group.cells.len();
            }
        }
        Ok(())
    }

    fn classify_per_cell(
        &self,
        columns: &[Vec<f64>],
        fields: &AuxiliaryFields<'_>,
        out: &mut ZoneOutput<'_>,
        stats: &mut CacheStats,
    ) -> Result<()> {
        let structure = self.structure;
        let mut thresholds = ComputedThresholds::new(structure);
        let mut row = alloc::vec![0.0; columns.len()];
        let mut buf = [0.0; MAX_AUX_FIELDS];

        for cell in 0..fields.len() {
            for (slot, column) in columns.iter().enumerate() {
                row[slot] = column[cell];
            }
            thresholds.update(structure, &row)?;
            stats.threshold_computations += 1;
            if thresholds.determined().is_some() {
                stats.determined_cells += 1;
            }
            let coordinate = fields.gather(cell, &mut buf);
            let order = classify_order(structure, &thresholds, coordinate);
            out.record(cell, structure.index().slot(order));
            stats.scalar_cells += 1;
        }
        Ok(())
    }
}

/// Classify a zone with the default grouping ratio and the given resolution.
pub fn classify_zone(
    structure: &TruncationStructure,
    probabilities: ZoneProbabilities<'_>,
    fields: &AuxiliaryFields<'_>,
    resolution: u32,
) -> Result<ZoneClassification> {
    SignatureCache::new(structure, SignatureCacheConfig::with_resolution(resolution))?
        .classify_zone(probabilities, fields)
}
