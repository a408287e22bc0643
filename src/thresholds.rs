/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Per-cell threshold computation: node probabilities, rectangles and overlay
//! intervals for one probability vector.
//!
//! # Algorithm
//!
//! 1. Normalize the input, then floor every entry to
//!    `[PROBABILITY_FLOOR, 1 − PROBABILITY_FLOOR]` and renormalize.
//! 2. If a category exceeds [`DETERMINED_THRESHOLD`] the cell is determined;
//!    no geometry is computed.
//! 3. Re-expand overlay backgrounds and compute the overlay intervals
//!    (see [`crate::overlay`]).
//! 4. Drop overlay categories from the background vector and renormalize.
//! 5. Bottom-up: leaf = category probability × fraction, region = Σ children.
//!    The root must equal 1.0 within [`ROOT_TOLERANCE`].
//! 6. Top-down: children split the parent rectangle along the parent's axis
//!    in proportion to their probability, in declaration order.
//!
//! Results are kept in a side table keyed by [`NodeId`]; the rule itself is
//! never mutated. One [`ComputedThresholds`] per worker is enough for
//! concurrent evaluation of the same [`TruncationStructure`].

use alloc::vec::Vec;

use heapless::Vec as HVec;

use crate::error::{Result, TruncationError};
use crate::numeric::abs;
use crate::overlay::{resolve_overlay, OverlayInterval};
use crate::rule::{Node, NodeId, Polygon, Rect, TruncationStructure, MAX_OVERLAY_GROUPS};

/// Lower clamp applied to every category probability.
pub const PROBABILITY_FLOOR: f64 = 5e-5;

/// A category above this probability determines the cell outright.
pub const DETERMINED_THRESHOLD: f64 = 1.0 - 1e-4;

/// Allowed deviation of the root node probability from 1.0.
pub const ROOT_TOLERANCE: f64 = 1e-3;

/// Clamp every entry to `[PROBABILITY_FLOOR, 1 − PROBABILITY_FLOOR]`, then
/// rescale so the entries sum to exactly one.
pub fn floor_and_normalize(probabilities: &mut [f64]) {
    for p in probabilities.iter_mut() {
        *p = p.clamp(PROBABILITY_FLOOR, 1.0 - PROBABILITY_FLOOR);
    }
    normalize(probabilities);
}

/// Rescale to sum one. A zero vector is left unchanged.
fn normalize(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

/// Geometry and overlay intervals of one probability vector.
#[derive(Clone, Debug, PartialEq)]
pub struct ComputedThresholds {
    /// Floored category probabilities, by order index.
    probabilities: Vec<f64>,
    /// Background probabilities after overlay re-expansion, by order index.
    background: Vec<f64>,
    /// Probability per node.
    node_probability: Vec<f64>,
    /// Rectangle per node.
    rects: Vec<Rect>,
    /// Overlay interval per group.
    intervals: HVec<OverlayInterval, MAX_OVERLAY_GROUPS>,
    /// Order index of a determined category.
    determined: Option<usize>,
    /// Set by a successful update, cleared when one starts.
    computed: bool,
}

impl ComputedThresholds {
    /// Allocate an empty side table sized for `structure`.
    ///
    /// The table is unusable until [`ComputedThresholds::update`] succeeds.
    pub(crate) fn new(structure: &TruncationStructure) -> Self {
        let n_cat = structure.num_categories();
        let n_nodes = structure.node_count();
        Self {
            probabilities: alloc::vec![0.0; n_cat],
            background: alloc::vec![0.0; n_cat],
            node_probability: alloc::vec![0.0; n_nodes],
            rects: alloc::vec![Rect::EMPTY; n_nodes],
            intervals: HVec::new(),
            determined: None,
            computed: false,
        }
    }

    /// Compute thresholds for `probabilities`, given in zone-slot order.
    pub fn compute(structure: &TruncationStructure, probabilities: &[f64]) -> Result<Self> {
        let mut thresholds = Self::new(structure);
        thresholds.update(structure, probabilities)?;
        Ok(thresholds)
    }

    /// Recompute in place for a new probability vector, reusing the buffers.
    ///
    /// Fails with [`TruncationError::InternalConsistency`] if the node
    /// probabilities do not add up to one. Any failure leaves `self` marked
    /// as not computed until the next successful update.
    pub fn update(&mut self, structure: &TruncationStructure, probabilities: &[f64]) -> Result<()> {
        self.computed = false;
        let n_cat = structure.num_categories();
        if probabilities.len() != n_cat {
            return Err(TruncationError::DimensionMismatch {
                what: "probability vector",
                expected: n_cat,
                found: probabilities.len(),
            });
        }
        let index = structure.index();
        for (slot, &value) in probabilities.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(TruncationError::InvalidProbability { slot, value });
            }
            self.probabilities[index.order(slot)] = value;
        }
        normalize(&mut self.probabilities);

        self.intervals.clear();
        self.determined = self
            .probabilities
            .iter()
            .position(|&p| p > DETERMINED_THRESHOLD);
        if self.determined.is_some() {
            self.computed = true;
            return Ok(());
        }

        floor_and_normalize(&mut self.probabilities);
        self.background.copy_from_slice(&self.probabilities);
        for group in structure.overlay_groups() {
            let interval = resolve_overlay(group, &mut self.background);
            // Capacity matches MAX_OVERLAY_GROUPS, which the builder enforces.
            let _ = self.intervals.push(interval);
        }
        for group in structure.overlay_groups() {
            self.background[group.overlay] = 0.0;
        }
        normalize(&mut self.background);

        self.accumulate_node_probabilities(structure)?;
        self.partition(structure);
        self.computed = true;
        Ok(())
    }

    /// Bottom-up pass. Children always follow their parent in the arena, so
    /// reverse index order visits children first.
    fn accumulate_node_probabilities(&mut self, structure: &TruncationStructure) -> Result<()> {
        for (i, node) in structure.nodes().iter().enumerate().rev() {
            let p = match node {
                Node::Category { category, fraction } => self.background[*category] * fraction,
                Node::Region { children, .. } => children
                    .iter()
                    .map(|c| self.node_probability[c.index()])
                    .sum(),
            };
            self.node_probability[i] = p;
        }
        let root = self.node_probability[NodeId::ROOT.index()];
        if abs(root - 1.0) > ROOT_TOLERANCE {
            return Err(TruncationError::InternalConsistency {
                root_probability: root,
                tolerance: ROOT_TOLERANCE,
            });
        }
        Ok(())
    }

    /// Top-down pass over the arena in pre-order.
    fn partition(&mut self, structure: &TruncationStructure) {
        self.rects[NodeId::ROOT.index()] = Rect::UNIT;
        for (i, node) in structure.nodes().iter().enumerate() {
            let Node::Region { axis, children } = node else {
                continue;
            };
            let parent = self.rects[i];
            let parent_prob = self.node_probability[i];
            let (lo, hi) = parent.extent(*axis);
            let span = hi - lo;

            let mut cursor = lo;
            let last = children.len() - 1;
            for (k, child) in children.iter().enumerate() {
                let share = if parent_prob > 0.0 {
                    self.node_probability[child.index()] / parent_prob
                } else {
                    0.0
                };
                let upper = if k == last { hi } else { (cursor + span * share).min(hi) };
                self.rects[child.index()] = parent.with_extent(*axis, cursor, upper);
                cursor = upper;
            }
        }
    }

    /// Whether the last update succeeded.
    #[inline]
    pub fn is_computed(&self) -> bool {
        self.computed
    }

    /// Fail unless the last update succeeded.
    pub fn require(&self) -> Result<()> {
        if self.computed {
            Ok(())
        } else {
            Err(TruncationError::ThresholdsNotComputed)
        }
    }

    /// Order index of the determined category, if the cell is determined.
    #[inline]
    pub fn determined(&self) -> Option<usize> {
        self.determined
    }

    /// Floored category probabilities, by order index.
    pub fn probabilities(&self) -> &[f64] {
        &self.probabilities
    }

    /// Background probabilities after overlay re-expansion, by order index.
    pub fn background_probabilities(&self) -> &[f64] {
        &self.background
    }

    /// Probability of `node`.
    #[inline]
    pub fn node_probability(&self, node: NodeId) -> f64 {
        self.node_probability[node.index()]
    }

    /// Rectangle of `node`.
    #[inline]
    pub fn rect(&self, node: NodeId) -> &Rect {
        &self.rects[node.index()]
    }

    /// Overlay intervals, one per group. Empty when the cell is determined.
    pub fn overlay_intervals(&self) -> &[OverlayInterval] {
        &self.intervals
    }

    /// Overlay interval of group `g`.
    #[inline]
    pub fn interval(&self, g: usize) -> &OverlayInterval {
        &self.intervals[g]
    }

    /// One polygon per background leaf: `(node, order index, polygon)`.
    ///
    /// Empty for a determined cell, which has no geometry, and for a table
    /// that has not been computed.
    pub fn polygons<'a>(
        &'a self,
        structure: &'a TruncationStructure,
    ) -> impl Iterator<Item = (NodeId, usize, Polygon)> + 'a {
        let active = self.computed && self.determined.is_none();
        structure
            .leaves()
            .filter(move |_| active)
            .map(move |(id, category, _)| (id, category, self.rects[id.index()].polygon()))
    }
}

/// Compute thresholds for one probability vector in zone-slot order.
pub fn compute_thresholds(
    structure: &TruncationStructure,
    probabilities: &[f64],
) -> Result<ComputedThresholds> {
    ComputedThresholds::compute(structure, probabilities)
}
