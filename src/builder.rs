/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Rule definition interchange types and the [`RuleBuilder`] that validates
//! them into a [`TruncationStructure`].
//!
//! # Definition shape
//!
//! ```text
//! Rule {
//!   axis: H|V                                   level-1 subdivision
//!   children: [ Category{ name, probFrac }
//!             | Region{ axis?, children } ]     depth ≤ 3
//!   overlays: [ { overlayCategory, backgroundCategories, truncIntervalCenter } ]
//!   fields:   [ name, ... ]                     2 + overlay groups
//! }
//! ```
//!
//! Axes alternate with depth: level 2 uses the opposite of level 1, level 3
//! reuses level 1. A region may restate its axis; a mismatch is rejected.
//!
//! With the `serde` feature the definition deserialises from JSON:
//!
//! ```rust,ignore
//! let json = r#"{
//!   "axis": "H",
//!   "children": [
//!     {"kind": "category", "name": "F1", "probFrac": 1.0},
//!     {"kind": "category", "name": "F2", "probFrac": 1.0}
//!   ],
//!   "fields": ["GRF1", "GRF2"]
//! }"#;
//! let definition: RuleDefinition = serde_json::from_str(json)?;
//! ```

use alloc::borrow::ToOwned;
use alloc::string::String;
use alloc::vec::Vec;

use hashbrown::HashMap;
use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::rule::{
    Axis, Category, CategoryIndex, Node, NodeId, OverlayGroup, TruncationStructure,
    BACKGROUND_FIELDS, MAX_DEPTH, MAX_OVERLAY_GROUPS,
};

/// Allowed deviation of a background category's fraction sum from 1.0.
pub const FRACTION_SUM_TOLERANCE: f64 = 1e-3;

// ─── Interchange types ───────────────────────────────────────────────────────

/// Hierarchical rule description consumed by [`RuleBuilder`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleDefinition {
    /// Level-1 subdivision axis.
    pub axis: Axis,
    /// Level-1 children in declaration order.
    pub children: Vec<RuleItem>,
    /// Overlay groups in declaration order.
    #[cfg_attr(feature = "serde", serde(default))]
    pub overlays: Vec<OverlayDefinition>,
    /// Auxiliary field names: two background fields, then one per overlay group.
    pub fields: Vec<String>,
}

impl RuleDefinition {
    /// A rule without overlays or declared fields.
    pub fn new(axis: Axis, children: Vec<RuleItem>) -> Self {
        Self {
            axis,
            children,
            overlays: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Append an overlay group.
    pub fn with_overlay(mut self, overlay: OverlayDefinition) -> Self {
        self.overlays.push(overlay);
        self
    }

    /// Declare the auxiliary field names.
    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// One entry of a region's child list.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum RuleItem {
    /// Leaf polygon for a background category.
    Category {
        /// Category name, must be in the zone's category list.
        name: String,
        /// Share of the category's probability assigned to this leaf.
        #[cfg_attr(feature = "serde", serde(rename = "probFrac"))]
        fraction: f64,
    },
    /// Nested region; its axis follows the fixed alternation.
    Region {
        /// Optional restatement of the implied axis.
        #[cfg_attr(feature = "serde", serde(default))]
        axis: Option<Axis>,
        /// Child entries in declaration order.
        children: Vec<RuleItem>,
    },
}

impl RuleItem {
    /// Leaf for `name` holding `fraction` of its probability.
    pub fn category(name: impl Into<String>, fraction: f64) -> Self {
        RuleItem::Category {
            name: name.into(),
            fraction,
        }
    }

    /// Nested region with the implied axis.
    pub fn region(children: Vec<RuleItem>) -> Self {
        RuleItem::Region {
            axis: None,
            children,
        }
    }
}

/// An overlay category and the background categories it may override.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct OverlayDefinition {
    /// Overlay category name.
    pub overlay_category: String,
    /// Background category names.
    pub background_categories: Vec<String>,
    /// Center of the overlay interval, in `[0, 1]`.
    pub trunc_interval_center: f64,
}

impl OverlayDefinition {
    /// Overlay group for `overlay` over `background`, centered at `center`.
    pub fn new<I, S>(overlay: impl Into<String>, background: I, center: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            overlay_category: overlay.into(),
            background_categories: background.into_iter().map(Into::into).collect(),
            trunc_interval_center: center,
        }
    }
}

// ─── RuleBuilder ─────────────────────────────────────────────────────────────

/// Validates a [`RuleDefinition`] against a zone's category list.
///
/// The zone list fixes the zone slot of every category (probability vectors
/// use this order) and supplies the facies codes.
pub struct RuleBuilder<'z> {
    zone: &'z [Category],
}

/// Mutable state of one build.
struct BuildState<'z> {
    zone: &'z [Category],
    slot_by_name: HashMap<&'z str, usize>,
    overlay_names: HashMap<&'z str, usize>,
    order_by_name: HashMap<&'z str, usize>,
    nodes: Vec<Node>,
    categories: Vec<Category>,
    slot_of_order: Vec<usize>,
    fraction_sums: Vec<f64>,
}

impl<'z> RuleBuilder<'z> {
    /// Builder for a zone modelling `categories_in_zone`, in zone-slot order.
    pub fn new(categories_in_zone: &'z [Category]) -> Self {
        Self {
            zone: categories_in_zone,
        }
    }

    /// Validate `definition` and produce the linked structure.
    pub fn build(&self, definition: &RuleDefinition) -> Result<TruncationStructure> {
        let mut state = BuildState::new(self.zone)?;

        let expected_fields = BACKGROUND_FIELDS + definition.overlays.len();
        if definition.overlays.len() > MAX_OVERLAY_GROUPS {
            return Err(ValidationError::TooManyOverlayGroups {
                count: definition.overlays.len(),
                max: MAX_OVERLAY_GROUPS,
            }
            .into());
        }
        if definition.fields.len() != expected_fields {
            return Err(ValidationError::FieldCountMismatch {
                expected: expected_fields,
                declared: definition.fields.len(),
            }
            .into());
        }

        state.register_overlays(&definition.overlays)?;
        state.push_region(definition.axis, None, &definition.children, 1, definition.axis)?;
        state.check_fraction_sums()?;
        let groups = state.link_overlays(&definition.overlays)?;
        state.check_zone_coverage()?;

        let index = CategoryIndex::from_slots(state.slot_of_order);
        let structure = TruncationStructure::from_parts(
            state.nodes,
            state.categories,
            index,
            groups,
            definition.fields.clone(),
        );
        debug!(
            categories = structure.num_categories(),
            nodes = structure.node_count(),
            overlay_groups = structure.overlay_groups().len(),
            "truncation rule built"
        );
        Ok(structure)
    }
}

impl<'z> BuildState<'z> {
    fn new(zone: &'z [Category]) -> Result<Self> {
        let mut slot_by_name = HashMap::with_capacity(zone.len());
        for (slot, category) in zone.iter().enumerate() {
            if slot_by_name.insert(category.name.as_str(), slot).is_some() {
                return Err(ValidationError::DuplicateCategory(category.name.clone()).into());
            }
        }
        Ok(Self {
            zone,
            slot_by_name,
            overlay_names: HashMap::new(),
            order_by_name: HashMap::with_capacity(zone.len()),
            nodes: Vec::new(),
            categories: Vec::with_capacity(zone.len()),
            slot_of_order: Vec::with_capacity(zone.len()),
            fraction_sums: Vec::with_capacity(zone.len()),
        })
    }

    fn zone_slot(&self, name: &str) -> Result<usize> {
        self.slot_by_name
            .get(name)
            .copied()
            .ok_or_else(|| ValidationError::UnknownCategory(name.to_owned()).into())
    }

    /// Record overlay category names before the tree walk so leaves can be
    /// checked against them.
    fn register_overlays(&mut self, overlays: &[OverlayDefinition]) -> Result<()> {
        let zone = self.zone;
        for (g, overlay) in overlays.iter().enumerate() {
            let slot = self.zone_slot(&overlay.overlay_category)?;
            let name = zone[slot].name.as_str();
            if self.overlay_names.insert(name, g).is_some() {
                return Err(ValidationError::DuplicateOverlay(name.to_owned()).into());
            }
            let center = overlay.trunc_interval_center;
            if !center.is_finite() || !(0.0..=1.0).contains(&center) {
                return Err(ValidationError::InvalidIntervalCenter { group: g, center }.into());
            }
            if overlay.background_categories.is_empty() {
                return Err(ValidationError::EmptyBackground(g).into());
            }
        }
        Ok(())
    }

    /// Assign the next order index to the zone category at `slot`.
    fn discover(&mut self, slot: usize) -> usize {
        let zone = self.zone;
        let category = &zone[slot];
        if let Some(&order) = self.order_by_name.get(category.name.as_str()) {
            return order;
        }
        let order = self.categories.len();
        self.order_by_name.insert(category.name.as_str(), order);
        self.categories.push(Category::new(category.name.clone(), category.code));
        self.slot_of_order.push(slot);
        self.fraction_sums.push(0.0);
        order
    }

    fn push_region(
        &mut self,
        axis: Axis,
        declared: Option<Axis>,
        items: &[RuleItem],
        level: usize,
        root_axis: Axis,
    ) -> Result<NodeId> {
        if level > MAX_DEPTH {
            return Err(ValidationError::TooDeep { max: MAX_DEPTH }.into());
        }
        if let Some(declared) = declared {
            if declared != axis {
                return Err(ValidationError::AxisAlternation {
                    level,
                    expected: axis,
                    declared,
                }
                .into());
            }
        }
        if items.is_empty() {
            return Err(ValidationError::EmptyRegion { level }.into());
        }

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::Region {
            axis,
            children: Vec::new(),
        });

        let mut children = Vec::with_capacity(items.len());
        for item in items {
            let child = match item {
                RuleItem::Category { name, fraction } => self.push_leaf(name, *fraction)?,
                RuleItem::Region {
                    axis: child_axis,
                    children: grandchildren,
                } => self.push_region(
                    root_axis.at_level(level + 1),
                    *child_axis,
                    grandchildren,
                    level + 1,
                    root_axis,
                )?,
            };
            children.push(child);
        }

        if let Node::Region { children: slot, .. } = &mut self.nodes[id.index()] {
            *slot = children;
        }
        Ok(id)
    }

    fn push_leaf(&mut self, name: &str, fraction: f64) -> Result<NodeId> {
        if !fraction.is_finite() || !(0.0..=1.0).contains(&fraction) {
            return Err(ValidationError::InvalidFraction {
                category: name.to_owned(),
                fraction,
            }
            .into());
        }
        let slot = self.zone_slot(name)?;
        if self.overlay_names.contains_key(name) {
            return Err(ValidationError::OverlayConflict(name.to_owned()).into());
        }
        let order = self.discover(slot);
        self.fraction_sums[order] += fraction;

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node::Category {
            category: order,
            fraction,
        });
        Ok(id)
    }

    fn check_fraction_sums(&self) -> Result<()> {
        for (order, &sum) in self.fraction_sums.iter().enumerate() {
            let deviation = sum - 1.0;
            if deviation > FRACTION_SUM_TOLERANCE || deviation < -FRACTION_SUM_TOLERANCE {
                return Err(ValidationError::FractionSum {
                    category: self.categories[order].name.clone(),
                    sum,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Resolve overlay groups to order indices. Overlay categories are
    /// discovered after all tree leaves, in group order.
    fn link_overlays(&mut self, overlays: &[OverlayDefinition]) -> Result<Vec<OverlayGroup>> {
        let zone = self.zone;
        let background_count = self.categories.len();
        let mut owner: HashMap<usize, usize> = HashMap::new();
        let mut groups = Vec::with_capacity(overlays.len());

        for (g, def) in overlays.iter().enumerate() {
            let overlay_slot = self.zone_slot(&def.overlay_category)?;
            let overlay = self.discover(overlay_slot);
            self.categories[overlay].is_overlay = true;

            let mut background = Vec::with_capacity(def.background_categories.len());
            for name in &def.background_categories {
                let slot = self.zone_slot(name)?;
                let name = zone[slot].name.as_str();
                if self.overlay_names.contains_key(name) {
                    return Err(ValidationError::OverlayConflict(name.to_owned()).into());
                }
                let order = match self.order_by_name.get(name) {
                    Some(&order) if order < background_count => order,
                    _ => {
                        return Err(ValidationError::BackgroundNotInRule {
                            category: name.to_owned(),
                            group: g,
                        }
                        .into())
                    }
                };
                match owner.get(&order) {
                    Some(&first) if first != g => {
                        return Err(ValidationError::SharedBackground {
                            category: name.to_owned(),
                            first,
                            second: g,
                        }
                        .into());
                    }
                    Some(_) => continue,
                    None => {
                        owner.insert(order, g);
                        background.push(order);
                    }
                }
            }

            groups.push(OverlayGroup {
                overlay,
                background,
                center: def.trunc_interval_center,
            });
        }
        Ok(groups)
    }

    fn check_zone_coverage(&self) -> Result<()> {
        for category in self.zone {
            if !self.order_by_name.contains_key(category.name.as_str()) {
                return Err(ValidationError::MissingCategory(category.name.clone()).into());
            }
        }
        Ok(())
    }
}
