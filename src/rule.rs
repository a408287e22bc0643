/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Truncation rule data model: categories, the node arena and the immutable
//! [`TruncationStructure`] built once per zone.
//!
//! # Layout
//!
//! Nodes live in a flat arena addressed by [`NodeId`]. The arena is stored in
//! pre-order: a region is always pushed before its children, so every parent
//! index is smaller than the indices of its children. Threshold computation
//! relies on this to run bottom-up (reverse index order) and top-down
//! (forward index order) without recursion.
//!
//! Categories carry two indices:
//!
//! - **order index**: position in first-discovery order over the rule
//!   (tree leaves left to right, then overlay categories by group). Used
//!   internally by the tree and the overlay groups.
//! - **zone slot**: position in the caller's category list. Probability
//!   vectors and volume fractions are indexed by zone slot.
//!
//! [`CategoryIndex`] is the validated bijection between the two.
//!
//! # Invariants
//!
//! - Every background category's fractions sum to 1.0 (±1e-3).
//! - Overlay groups have pairwise disjoint background sets.
//! - `num_aux_fields() == 2 + overlay_groups().len()`.
//! - Every zone category appears once as background (possibly split) or once as overlay.

use alloc::string::String;
use alloc::vec::Vec;

/// Number of auxiliary fields that drive the background subdivision.
pub const BACKGROUND_FIELDS: usize = 2;

/// Maximum number of overlay groups per rule.
pub const MAX_OVERLAY_GROUPS: usize = 8;

/// Maximum number of auxiliary fields a rule can consume.
pub const MAX_AUX_FIELDS: usize = BACKGROUND_FIELDS + MAX_OVERLAY_GROUPS;

/// Maximum region nesting depth (L1/L2/L3).
pub const MAX_DEPTH: usize = 3;

// ─── Axis ────────────────────────────────────────────────────────────────────

/// Subdivision direction of a region.
///
/// A `Vertical` region is cut by vertical lines, so its children sit side by
/// side along `x` (the first background field). A `Horizontal` region stacks its
/// children bottom to top along `y` (the second background field).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    /// Children stacked along `y`.
    #[cfg_attr(feature = "serde", serde(alias = "H"))]
    Horizontal,
    /// Children side by side along `x`.
    #[cfg_attr(feature = "serde", serde(alias = "V"))]
    Vertical,
}

impl Axis {
    /// The other axis.
    pub fn opposite(self) -> Self {
        match self {
            Axis::Horizontal => Axis::Vertical,
            Axis::Vertical => Axis::Horizontal,
        }
    }

    /// Axis used at nesting `level` (1-based) when level 1 uses `self`.
    ///
    /// Odd levels reuse the level-1 axis, even levels use the opposite one.
    pub fn at_level(self, level: usize) -> Self {
        if level % 2 == 1 {
            self
        } else {
            self.opposite()
        }
    }

    /// Pick the coordinate this axis compares against.
    #[inline]
    pub fn select(self, x: f64, y: f64) -> f64 {
        match self {
            Axis::Vertical => x,
            Axis::Horizontal => y,
        }
    }
}

// ─── Category ────────────────────────────────────────────────────────────────

/// A modelled facies.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Category {
    /// Unique facies name.
    pub name: String,
    /// Code from the global facies table, written to the grid.
    pub code: i32,
    /// Whether this category overrides background categories.
    ///
    /// Set by the builder; the value supplied with the zone list is ignored.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_overlay: bool,
}

impl Category {
    /// A background category with the given name and facies code.
    pub fn new(name: impl Into<String>, code: i32) -> Self {
        Self {
            name: name.into(),
            code,
            is_overlay: false,
        }
    }
}

// ─── Nodes ───────────────────────────────────────────────────────────────────

/// Index of a node in the structure's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// The root region, always the first arena entry.
    pub const ROOT: NodeId = NodeId(0);

    /// Arena position of this node.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One node of the rule tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Rectangle split along `axis` into `children`, in declaration order.
    Region {
        /// Subdivision direction.
        axis: Axis,
        /// Child nodes, never empty.
        children: Vec<NodeId>,
    },
    /// Leaf polygon assigned to a background category.
    Category {
        /// Order index of the category.
        category: usize,
        /// Share of the category's probability held by this leaf.
        fraction: f64,
    },
}

// ─── Overlay groups ──────────────────────────────────────────────────────────

/// An overlay category together with the background categories it may replace.
#[derive(Clone, Debug, PartialEq)]
pub struct OverlayGroup {
    /// Order index of the overlay category.
    pub overlay: usize,
    /// Order indices of the background categories, in declaration order.
    pub background: Vec<usize>,
    /// Center of the overlay interval on this group's auxiliary field.
    pub center: f64,
}

// ─── CategoryIndex ───────────────────────────────────────────────────────────

/// Bijection between order indices and zone slots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryIndex {
    slot_of_order: Vec<usize>,
    order_of_slot: Vec<usize>,
}

impl CategoryIndex {
    /// Build from the zone slot of every order index.
    ///
    /// `slot_of_order` must be a permutation of `0..len`; the builder
    /// guarantees this before calling.
    pub(crate) fn from_slots(slot_of_order: Vec<usize>) -> Self {
        let mut order_of_slot = alloc::vec![0; slot_of_order.len()];
        for (order, &slot) in slot_of_order.iter().enumerate() {
            order_of_slot[slot] = order;
        }
        Self {
            slot_of_order,
            order_of_slot,
        }
    }

    /// Number of categories.
    pub fn len(&self) -> usize {
        self.slot_of_order.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.slot_of_order.is_empty()
    }

    /// Zone slot of an order index.
    #[inline]
    pub fn slot(&self, order: usize) -> usize {
        self.slot_of_order[order]
    }

    /// Order index of a zone slot.
    #[inline]
    pub fn order(&self, slot: usize) -> usize {
        self.order_of_slot[slot]
    }
}

// ─── Geometry ────────────────────────────────────────────────────────────────

/// Axis-aligned rectangle inside the unit square.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    /// Left edge.
    pub xmin: f64,
    /// Right edge.
    pub xmax: f64,
    /// Bottom edge.
    pub ymin: f64,
    /// Top edge.
    pub ymax: f64,
}

impl Rect {
    /// The full unit square owned by the root region.
    pub const UNIT: Rect = Rect {
        xmin: 0.0,
        xmax: 1.0,
        ymin: 0.0,
        ymax: 1.0,
    };

    /// Degenerate rectangle used before thresholds are computed.
    pub const EMPTY: Rect = Rect {
        xmin: 0.0,
        xmax: 0.0,
        ymin: 0.0,
        ymax: 0.0,
    };

    /// Area of the rectangle.
    pub fn area(&self) -> f64 {
        (self.xmax - self.xmin) * (self.ymax - self.ymin)
    }

    /// Lower and upper bound along `axis`.
    #[inline]
    pub fn extent(&self, axis: Axis) -> (f64, f64) {
        match axis {
            Axis::Vertical => (self.xmin, self.xmax),
            Axis::Horizontal => (self.ymin, self.ymax),
        }
    }

    /// Upper bound along `axis`.
    #[inline]
    pub fn upper(&self, axis: Axis) -> f64 {
        self.extent(axis).1
    }

    /// Copy of this rectangle with its extent along `axis` replaced.
    pub fn with_extent(&self, axis: Axis, lo: f64, hi: f64) -> Rect {
        match axis {
            Axis::Vertical => Rect {
                xmin: lo,
                xmax: hi,
                ..*self
            },
            Axis::Horizontal => Rect {
                ymin: lo,
                ymax: hi,
                ..*self
            },
        }
    }

    /// Whether `(x, y)` lies inside (edges inclusive).
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Corner polygon of this rectangle.
    pub fn polygon(&self) -> Polygon {
        Polygon {
            corners: [
                (self.xmin, self.ymin),
                (self.xmax, self.ymin),
                (self.xmax, self.ymax),
                (self.xmin, self.ymax),
            ],
        }
    }
}

/// Read-only corner list of a leaf rectangle, for plotting and reports.
///
/// Corners run counter-clockwise from the lower-left corner.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Polygon {
    /// Corner points `(x, y)`.
    pub corners: [(f64, f64); 4],
}

impl Polygon {
    /// Signed area by the shoelace formula (positive for counter-clockwise corners).
    pub fn area(&self) -> f64 {
        let c = &self.corners;
        let mut twice = 0.0;
        for i in 0..4 {
            let (x0, y0) = c[i];
            let (x1, y1) = c[(i + 1) % 4];
            twice += x0 * y1 - x1 * y0;
        }
        0.5 * twice
    }
}

// ─── TruncationStructure ─────────────────────────────────────────────────────

/// Validated, immutable truncation rule for one zone.
///
/// Built by [`crate::builder::RuleBuilder`]. Per-cell geometry is never stored
/// here; it lives in [`crate::thresholds::ComputedThresholds`], so a single
/// structure can be shared by any number of threads.
#[derive(Clone, Debug, PartialEq)]
pub struct TruncationStructure {
    nodes: Vec<Node>,
    categories: Vec<Category>,
    index: CategoryIndex,
    groups: Vec<OverlayGroup>,
    group_of: Vec<Option<usize>>,
    field_names: Vec<String>,
}

impl TruncationStructure {
    pub(crate) fn from_parts(
        nodes: Vec<Node>,
        categories: Vec<Category>,
        index: CategoryIndex,
        groups: Vec<OverlayGroup>,
        field_names: Vec<String>,
    ) -> Self {
        let mut group_of = alloc::vec![None; categories.len()];
        for (g, group) in groups.iter().enumerate() {
            for &bg in &group.background {
                group_of[bg] = Some(g);
            }
        }
        Self {
            nodes,
            categories,
            index,
            groups,
            group_of,
            field_names,
        }
    }

    /// All nodes in pre-order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Node by id.
    #[inline]
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    /// Number of arena nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Categories in order-index order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// Category by order index.
    pub fn category(&self, order: usize) -> &Category {
        &self.categories[order]
    }

    /// Number of categories in the zone.
    pub fn num_categories(&self) -> usize {
        self.categories.len()
    }

    /// Order index ↔ zone slot bijection.
    pub fn index(&self) -> &CategoryIndex {
        &self.index
    }

    /// Overlay groups in declaration order.
    pub fn overlay_groups(&self) -> &[OverlayGroup] {
        &self.groups
    }

    /// The overlay group whose background set contains `order`, if any.
    #[inline]
    pub fn overlay_group_of(&self, order: usize) -> Option<usize> {
        self.group_of[order]
    }

    /// Auxiliary fields required per cell: two background fields plus one per overlay group.
    pub fn num_aux_fields(&self) -> usize {
        BACKGROUND_FIELDS + self.groups.len()
    }

    /// Declared auxiliary field names, background fields first.
    pub fn field_names(&self) -> &[String] {
        &self.field_names
    }

    /// Facies code of a zone slot.
    #[inline]
    pub fn code_of_slot(&self, slot: usize) -> i32 {
        self.categories[self.index.order(slot)].code
    }

    /// Order index of a category by name.
    pub fn find(&self, name: &str) -> Option<usize> {
        self.categories.iter().position(|c| c.name == name)
    }

    /// Zone slot of a category by name.
    pub fn slot_of(&self, name: &str) -> Option<usize> {
        self.find(name).map(|order| self.index.slot(order))
    }

    /// Category leaves in pre-order: `(node, order index, fraction)`.
    pub fn leaves(&self) -> impl Iterator<Item = (NodeId, usize, f64)> + '_ {
        self.nodes.iter().enumerate().filter_map(|(i, n)| match n {
            Node::Category { category, fraction } => Some((NodeId(i as u32), *category, *fraction)),
            Node::Region { .. } => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_alternation() {
        assert_eq!(Axis::Horizontal.at_level(1), Axis::Horizontal);
        assert_eq!(Axis::Horizontal.at_level(2), Axis::Vertical);
        assert_eq!(Axis::Horizontal.at_level(3), Axis::Horizontal);
        assert_eq!(Axis::Vertical.at_level(2), Axis::Horizontal);
    }

    #[test]
    fn test_axis_selects_coordinate() {
        assert_eq!(Axis::Vertical.select(0.3, 0.2), 0.3);
        assert_eq!(Axis::Horizontal.select(0.3, 0.2), 0.2);
    }

    #[test]
    fn test_rect_with_extent() {
        let r = Rect::UNIT.with_extent(Axis::Horizontal, 0.25, 0.75);
        assert_eq!(r, Rect { xmin: 0.0, xmax: 1.0, ymin: 0.25, ymax: 0.75 });
        assert!((r.area() - 0.5).abs() < 1e-12);
        assert_eq!(r.upper(Axis::Horizontal), 0.75);
        assert_eq!(r.upper(Axis::Vertical), 1.0);
    }

    #[test]
    fn test_polygon_area_matches_rect() {
        let r = Rect { xmin: 0.1, xmax: 0.4, ymin: 0.5, ymax: 1.0 };
        let p = r.polygon();
        assert!((p.area() - r.area()).abs() < 1e-12);
        assert_eq!(p.corners[0], (0.1, 0.5));
        assert_eq!(p.corners[2], (0.4, 1.0));
    }

    #[test]
    fn test_category_index_is_a_bijection() {
        let idx = CategoryIndex::from_slots(vec![2, 0, 1]);
        for order in 0..3 {
            assert_eq!(idx.order(idx.slot(order)), order);
        }
        assert_eq!(idx.order(2), 0);
        assert_eq!(idx.len(), 3);
    }
}
