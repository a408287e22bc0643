//! Serializable truncation map for one probability vector.
//!
//! A [`TruncationMapSnapshot`] captures everything needed to draw the
//! truncation map of a cell or zone: each category's probabilities, the
//! polygon of every background leaf and the overlay intervals. Rows follow
//! order-index order; each category carries its zone slot so the rows can be
//! lined up with the caller's arrays.
//!
//! # Example
//!
//! ```rust,ignore
//! use facies_core::report::TruncationMapSnapshot;
//!
//! let thresholds = compute_thresholds(&rule, &[0.3, 0.5, 0.2])?;
//! let snapshot = TruncationMapSnapshot::from_thresholds(&rule, &thresholds);
//! let json = serde_json::to_string(&snapshot)?;
//! ```
//!
//! Requires the `serde` feature.

use alloc::string::String;
use alloc::vec::Vec;

use crate::overlay::OverlayInterval;
use crate::rule::TruncationStructure;
use crate::thresholds::ComputedThresholds;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u16 = 1;

/// Truncation map of one evaluated probability vector.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct TruncationMapSnapshot {
    /// Always [`SNAPSHOT_VERSION`] for new snapshots.
    pub version: u16,
    /// Names of the auxiliary fields, background fields first.
    pub fields: Vec<String>,
    /// One record per category, in order-index order.
    pub categories: Vec<CategoryRecord>,
    /// One record per background leaf, in tree order. Empty when determined.
    pub polygons: Vec<PolygonRecord>,
    /// One record per overlay group. Empty when determined.
    pub intervals: Vec<IntervalRecord>,
    /// Name of the category that took the whole cell, if any.
    pub determined: Option<String>,
}

/// Per-category row.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct CategoryRecord {
    /// Category name.
    pub name: String,
    /// Facies code.
    pub code: i32,
    /// Position in the caller's zone list.
    pub zone_slot: usize,
    /// Whether the category is an overlay.
    pub is_overlay: bool,
    /// Floored, normalized probability.
    pub probability: f64,
    /// Probability after overlay re-expansion (0 for overlays).
    pub background_probability: f64,
}

/// Rectangle of one background leaf.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct PolygonRecord {
    /// Category the leaf belongs to.
    pub category: String,
    /// Corners, counter-clockwise from the lower-left.
    pub corners: Vec<[f64; 2]>,
    /// Enclosed area, equal to the leaf's probability.
    pub area: f64,
}

/// Overlay interval of one group.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct IntervalRecord {
    /// Overlay category name.
    pub overlay: String,
    /// Auxiliary field the interval is measured on.
    pub field: String,
    /// Exclusive lower bound.
    pub low: f64,
    /// Inclusive upper bound.
    pub high: f64,
    /// Background share of the group.
    pub delta_h: f64,
}

impl IntervalRecord {
    fn new(overlay: String, field: String, interval: &OverlayInterval) -> Self {
        Self {
            overlay,
            field,
            low: interval.low,
            high: interval.high,
            delta_h: interval.delta_h,
        }
    }
}

impl TruncationMapSnapshot {
    /// Snapshot `thresholds`, which must have been computed for `structure`.
    pub fn from_thresholds(structure: &TruncationStructure, thresholds: &ComputedThresholds) -> Self {
        let index = structure.index();
        let categories = structure
            .categories()
            .iter()
            .enumerate()
            .map(|(order, category)| CategoryRecord {
                name: category.name.clone(),
                code: category.code,
                zone_slot: index.slot(order),
                is_overlay: category.is_overlay,
                probability: thresholds.probabilities()[order],
                background_probability: thresholds.background_probabilities()[order],
            })
            .collect();

        let polygons = thresholds
            .polygons(structure)
            .map(|(_, order, polygon)| PolygonRecord {
                category: structure.category(order).name.clone(),
                corners: polygon.corners.iter().map(|&(x, y)| [x, y]).collect(),
                area: polygon.area(),
            })
            .collect();

        let field_name = |g: usize| {
            structure
                .field_names()
                .get(crate::rule::BACKGROUND_FIELDS + g)
                .cloned()
                .unwrap_or_default()
        };
        let intervals = thresholds
            .overlay_intervals()
            .iter()
            .zip(structure.overlay_groups())
            .enumerate()
            .map(|(g, (interval, group))| {
                IntervalRecord::new(structure.category(group.overlay).name.clone(), field_name(g), interval)
            })
            .collect();

        Self {
            version: SNAPSHOT_VERSION,
            fields: structure.field_names().to_vec(),
            categories,
            polygons,
            intervals,
            determined: thresholds
                .determined()
                .map(|order| structure.category(order).name.clone()),
        }
    }

    /// Sum of polygon areas; one for any non-determined snapshot.
    pub fn total_area(&self) -> f64 {
        self.polygons.iter().map(|p| p.area).sum()
    }
}
