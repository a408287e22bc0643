//! Error taxonomy for rule building, threshold computation and classification.
//!
//! Three families, none of them retried:
//!
//! - [`ValidationError`]: the rule definition is malformed or inconsistent with
//!   the zone's category list. Raised once, at build time.
//! - [`TruncationError::InternalConsistency`]: node probabilities do not add up
//!   to one after threshold computation. Aborts the whole zone.
//! - [`TruncationError::DimensionMismatch`]: a coordinate, probability vector or
//!   per-cell array has the wrong length.

use alloc::string::String;

use thiserror::Error;

/// Result alias used by every fallible operation in this crate.
pub type Result<T> = core::result::Result<T, TruncationError>;

/// A rule definition that cannot be turned into a [`TruncationStructure`].
///
/// Every variant names the offending category, fraction or group.
///
/// [`TruncationStructure`]: crate::rule::TruncationStructure
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ValidationError {
    /// A probability fraction outside `[0, 1]` (or not finite).
    #[error("category '{category}' has probability fraction {fraction} outside [0, 1]")]
    InvalidFraction {
        /// Category the fraction belongs to.
        category: String,
        /// Offending fraction.
        fraction: f64,
    },

    /// The rule references a category that is not modelled in the zone.
    #[error("category '{0}' is not in the zone's category list")]
    UnknownCategory(String),

    /// A zone category that the rule never places.
    #[error("zone category '{0}' does not appear in the truncation rule")]
    MissingCategory(String),

    /// The zone category list names the same category twice.
    #[error("category '{0}' is listed twice in the zone")]
    DuplicateCategory(String),

    /// A category used as overlay and as background (or as a tree leaf).
    #[error("category '{0}' is used both as overlay and as background")]
    OverlayConflict(String),

    /// A category declared as the overlay of more than one group.
    #[error("category '{0}' is the overlay category of more than one group")]
    DuplicateOverlay(String),

    /// Two overlay groups claim the same background category.
    #[error("background category '{category}' is shared by overlay groups {first} and {second}")]
    SharedBackground {
        /// Shared background category.
        category: String,
        /// Index of the first group claiming it.
        first: usize,
        /// Index of the second group claiming it.
        second: usize,
    },

    /// An overlay group background member that is not a leaf of the rule tree.
    #[error("background category '{category}' of overlay group {group} is not placed in the rule tree")]
    BackgroundNotInRule {
        /// Background category name.
        category: String,
        /// Overlay group index.
        group: usize,
    },

    /// An overlay group without background categories.
    #[error("overlay group {0} has no background categories")]
    EmptyBackground(usize),

    /// Truncation interval center outside `[0, 1]`.
    #[error("overlay group {group} has truncation interval center {center} outside [0, 1]")]
    InvalidIntervalCenter {
        /// Overlay group index.
        group: usize,
        /// Offending center.
        center: f64,
    },

    /// The probability fractions of a background category do not add up to one.
    #[error("probability fractions of category '{category}' sum to {sum}, expected 1.0")]
    FractionSum {
        /// Category name.
        category: String,
        /// Actual sum.
        sum: f64,
    },

    /// The declared auxiliary field count is not `2 + overlay groups`.
    #[error("rule declares {declared} auxiliary fields but needs {expected}")]
    FieldCountMismatch {
        /// `2 + number of overlay groups`.
        expected: usize,
        /// Number of field names in the definition.
        declared: usize,
    },

    /// Regions nested deeper than three levels.
    #[error("region nesting exceeds {max} levels")]
    TooDeep {
        /// Maximum supported depth.
        max: usize,
    },

    /// A region without children.
    #[error("region at level {level} has no children")]
    EmptyRegion {
        /// Nesting level of the empty region (1-based).
        level: usize,
    },

    /// A region declares an axis that breaks the fixed alternation.
    #[error("region at level {level} declares axis {declared:?}, expected {expected:?}")]
    AxisAlternation {
        /// Nesting level (1-based).
        level: usize,
        /// Axis implied by the level-1 axis.
        expected: crate::rule::Axis,
        /// Axis written in the definition.
        declared: crate::rule::Axis,
    },

    /// More overlay groups than the fixed capacity.
    #[error("rule declares {count} overlay groups, at most {max} are supported")]
    TooManyOverlayGroups {
        /// Declared group count.
        count: usize,
        /// Capacity.
        max: usize,
    },
}

/// Errors surfaced while building rules or classifying cells.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum TruncationError {
    /// Rule definition rejected at build time.
    #[error("invalid truncation rule: {0}")]
    Validation(#[from] ValidationError),

    /// The root region probability drifted away from 1.0.
    #[error("root node probability is {root_probability}, expected 1.0 within {tolerance}")]
    InternalConsistency {
        /// Computed root probability.
        root_probability: f64,
        /// Allowed deviation.
        tolerance: f64,
    },

    /// A per-cell input has the wrong number of components.
    #[error("{what}: expected {expected} components, found {found}")]
    DimensionMismatch {
        /// Which input was malformed.
        what: &'static str,
        /// Required length.
        expected: usize,
        /// Supplied length.
        found: usize,
    },

    /// A probability that is negative or not finite.
    #[error("probability {value} for zone slot {slot} is negative or not finite")]
    InvalidProbability {
        /// Zone slot of the offending entry.
        slot: usize,
        /// Offending value.
        value: f64,
    },

    /// Thresholds used before a successful computation, or after a failed one.
    #[error("thresholds have not been computed for a valid probability vector")]
    ThresholdsNotComputed,

    /// Signature cache configuration out of range.
    #[error("invalid signature cache configuration: {0}")]
    InvalidConfig(&'static str),
}
