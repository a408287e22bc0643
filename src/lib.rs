//! # facies-core
//!
//! Truncation-rule engine for assigning facies to grid cells.
//!
//! A truncation rule partitions the unit square spanned by two auxiliary
//! fields into one or more polygons per facies category, sized so each
//! category's area equals its probability. Overlay categories then claim an
//! interval on an extra field inside a group of background categories. A
//! cell's facies is the polygon (or overlay interval) its field values fall
//! into.
//!
//! ## The pipeline
//!
//! ```text
//! RuleDefinition ──RuleBuilder──▶ TruncationStructure        (once per zone)
//!                                        │
//! probabilities ──ThresholdCalculator────▶ ComputedThresholds (per signature)
//!                                        │
//! auxiliary fields ──Classifier──────────▶ facies codes
//!                     ▲
//!               SignatureCache  (groups cells, picks the dispatch path)
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`rule`] | [`TruncationStructure`], [`Category`], [`Axis`] | Immutable node arena, order/slot index |
//! | [`builder`] | [`RuleBuilder`], [`RuleDefinition`] | Validate a hierarchical definition |
//! | [`overlay`] | [`OverlayInterval`] | Background re-expansion and overlay intervals |
//! | [`thresholds`] | [`ComputedThresholds`] | Per-vector rectangles and intervals |
//! | [`classifier`] | [`AuxiliaryFields`], [`classify`] | Scalar and batch cell classification |
//! | [`signature`] | [`SignatureCache`], [`ZoneClassification`] | Quantized signature grouping and dispatch |
//! | `report` | `TruncationMapSnapshot` | Serialisable truncation map (requires `serde`) |
//! | `ffi` | `TruncationRule` | Python bindings (requires `python-ffi`) |
//! | [`error`] | [`TruncationError`], [`ValidationError`] | Error taxonomy |
//!
//! ## Example
//!
//! ```rust
//! use facies_core::{
//!     classify_zone, Axis, AuxiliaryFields, Category, OverlayDefinition, RuleBuilder,
//!     RuleDefinition, RuleItem, ZoneProbabilities,
//! };
//!
//! let zone = [Category::new("F1", 1), Category::new("F2", 2), Category::new("F3", 3)];
//! let definition = RuleDefinition::new(
//!     Axis::Vertical,
//!     vec![RuleItem::category("F1", 1.0), RuleItem::category("F2", 1.0)],
//! )
//! .with_overlay(OverlayDefinition::new("F3", ["F1", "F2"], 0.5))
//! .with_fields(["x", "y", "z"]);
//! let rule = RuleBuilder::new(&zone).build(&definition).unwrap();
//!
//! let x = [0.2, 0.8];
//! let y = [0.5, 0.5];
//! let z = [0.05, 0.5];
//! let fields = AuxiliaryFields::new(&[&x, &y, &z]).unwrap();
//! let result = classify_zone(&rule, ZoneProbabilities::Constant(&[0.4, 0.4, 0.2]), &fields, 100).unwrap();
//! assert_eq!(result.codes, [1, 3]);
//! ```
//!
//! ## `no_std`
//!
//! The crate is `no_std` + `alloc` by default. `std` is pulled in by the
//! `parallel` feature (rayon-backed signature groups) and by `python-ffi`.
//!
//! ## License
//!
//! Business Source License 1.1. Free for evaluation and non-production use.

#![cfg_attr(not(any(feature = "std", feature = "python-ffi", test)), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

pub mod error;
pub mod rule;
pub mod builder;
pub mod overlay;
pub mod thresholds;
pub mod classifier;
pub mod signature;
mod numeric;

#[cfg(feature = "serde")]
pub mod report;

#[cfg(feature = "python-ffi")]
pub mod ffi;

pub use builder::{OverlayDefinition, RuleBuilder, RuleDefinition, RuleItem};
pub use classifier::{classify, classify_batch, classify_slot, AuxiliaryFields, BatchClassification};
pub use error::{Result, TruncationError, ValidationError};
pub use overlay::OverlayInterval;
pub use rule::{Axis, Category, CategoryIndex, Node, NodeId, OverlayGroup, Polygon, Rect, TruncationStructure};
pub use signature::{
    classify_zone, quantize, CacheStats, DispatchPath, SignatureCache, SignatureCacheConfig,
    ZoneClassification, ZoneProbabilities,
};
pub use thresholds::{compute_thresholds, floor_and_normalize, ComputedThresholds};
