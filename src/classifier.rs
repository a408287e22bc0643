/*
 * This source code is licensed under the Business Source License 1.1.
 */

//! Coordinate → category classification.
//!
//! Walks the rule tree from the root with the cell's two background
//! coordinates, then applies the overlay test of the leaf's group:
//!
//! ```text
//! determined?            → determined category
//! Region(axis, children) → first child whose upper bound along axis ≥ coordinate
//!                          (last child when none qualifies)
//! Category(c)            → overlay of c's group if low < aux[2 + g] ≤ high, else c
//! ```
//!
//! The batch path runs the same walk over many cells that share one
//! [`ComputedThresholds`]; it is not a different algorithm.

use alloc::vec::Vec;

use heapless::Vec as HVec;

use crate::error::{Result, TruncationError};
use crate::rule::{Node, NodeId, TruncationStructure, BACKGROUND_FIELDS, MAX_AUX_FIELDS};
use crate::thresholds::ComputedThresholds;

// ─── AuxiliaryFields ─────────────────────────────────────────────────────────

/// Column view of a zone's auxiliary fields: one slice per field, one value
/// per active cell, all of equal length.
#[derive(Clone, Debug)]
pub struct AuxiliaryFields<'a> {
    columns: HVec<&'a [f64], MAX_AUX_FIELDS>,
    cells: usize,
}

impl<'a> AuxiliaryFields<'a> {
    /// Wrap field columns. All columns must have the same length.
    pub fn new(columns: &[&'a [f64]]) -> Result<Self> {
        let mut stored = HVec::new();
        let cells = columns.first().map_or(0, |c| c.len());
        for column in columns {
            if column.len() != cells {
                return Err(TruncationError::DimensionMismatch {
                    what: "auxiliary field length",
                    expected: cells,
                    found: column.len(),
                });
            }
            stored
                .push(*column)
                .map_err(|_| TruncationError::DimensionMismatch {
                    what: "auxiliary field count",
                    expected: MAX_AUX_FIELDS,
                    found: columns.len(),
                })?;
        }
        Ok(Self {
            columns: stored,
            cells,
        })
    }

    /// Wrap owned field columns.
    pub fn from_vecs(columns: &'a [Vec<f64>]) -> Result<Self> {
        let mut refs: HVec<&'a [f64], MAX_AUX_FIELDS> = HVec::new();
        for column in columns {
            refs.push(column.as_slice())
                .map_err(|_| TruncationError::DimensionMismatch {
                    what: "auxiliary field count",
                    expected: MAX_AUX_FIELDS,
                    found: columns.len(),
                })?;
        }
        Self::new(&refs)
    }

    /// Number of fields.
    pub fn count(&self) -> usize {
        self.columns.len()
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        self.cells
    }

    /// Whether there are no cells.
    pub fn is_empty(&self) -> bool {
        self.cells == 0
    }

    /// Copy the coordinates of `cell` into `buf` and return the filled prefix.
    #[inline]
    pub fn gather<'b>(&self, cell: usize, buf: &'b mut [f64; MAX_AUX_FIELDS]) -> &'b [f64] {
        for (slot, column) in buf.iter_mut().zip(self.columns.iter()) {
            *slot = column[cell];
        }
        &buf[..self.columns.len()]
    }

    /// Fail unless every cell carries at least the rule's field count.
    pub fn require(&self, structure: &TruncationStructure) -> Result<()> {
        let expected = structure.num_aux_fields();
        if self.columns.len() < expected {
            return Err(TruncationError::DimensionMismatch {
                what: "field coordinate",
                expected,
                found: self.columns.len(),
            });
        }
        Ok(())
    }
}

// ─── Scalar path ─────────────────────────────────────────────────────────────

/// Classify one cell; returns the category's order index.
///
/// `coordinate` must hold at least `structure.num_aux_fields()` values.
#[inline]
pub(crate) fn classify_order(
    structure: &TruncationStructure,
    thresholds: &ComputedThresholds,
    coordinate: &[f64],
) -> usize {
    if let Some(order) = thresholds.determined() {
        return order;
    }
    let (x, y) = (coordinate[0], coordinate[1]);
    let mut id = NodeId::ROOT;
    loop {
        match structure.node(id) {
            Node::Region { axis, children } => {
                let v = axis.select(x, y);
                let fallback = children[children.len() - 1];
                id = children
                    .iter()
                    .copied()
                    .find(|&c| v <= thresholds.rect(c).upper(*axis))
                    .unwrap_or(fallback);
            }
            Node::Category { category, .. } => {
                let category = *category;
                if let Some(g) = structure.overlay_group_of(category) {
                    if thresholds.interval(g).contains(coordinate[BACKGROUND_FIELDS + g]) {
                        return structure.overlay_groups()[g].overlay;
                    }
                }
                return category;
            }
        }
    }
}

fn check_coordinate(structure: &TruncationStructure, coordinate: &[f64]) -> Result<()> {
    let expected = structure.num_aux_fields();
    if coordinate.len() < expected {
        return Err(TruncationError::DimensionMismatch {
            what: "field coordinate",
            expected,
            found: coordinate.len(),
        });
    }
    Ok(())
}

/// Classify one cell; returns the category's zone slot.
pub fn classify_slot(
    structure: &TruncationStructure,
    thresholds: &ComputedThresholds,
    coordinate: &[f64],
) -> Result<usize> {
    thresholds.require()?;
    check_coordinate(structure, coordinate)?;
    Ok(structure
        .index()
        .slot(classify_order(structure, thresholds, coordinate)))
}

/// Classify one cell; returns the category's facies code.
pub fn classify(
    structure: &TruncationStructure,
    thresholds: &ComputedThresholds,
    coordinate: &[f64],
) -> Result<i32> {
    thresholds.require()?;
    check_coordinate(structure, coordinate)?;
    let order = classify_order(structure, thresholds, coordinate);
    Ok(structure.category(order).code)
}

// ─── Batch path ──────────────────────────────────────────────────────────────

/// Codes and per-slot counts from one batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchClassification {
    /// Facies code per cell.
    pub codes: Vec<i32>,
    /// Cell count per zone slot.
    pub counts: Vec<u64>,
}

/// Run the scalar walk over `cells`, reporting `(cell, zone slot)` to `sink`.
///
/// Field count must already be checked with [`AuxiliaryFields::require`].
pub(crate) fn for_each_cell<I, F>(
    structure: &TruncationStructure,
    thresholds: &ComputedThresholds,
    fields: &AuxiliaryFields<'_>,
    cells: I,
    mut sink: F,
) where
    I: IntoIterator<Item = usize>,
    F: FnMut(usize, usize),
{
    let index = structure.index();
    if let Some(order) = thresholds.determined() {
        let slot = index.slot(order);
        for cell in cells {
            sink(cell, slot);
        }
        return;
    }
    let mut buf = [0.0; MAX_AUX_FIELDS];
    for cell in cells {
        let coordinate = fields.gather(cell, &mut buf);
        sink(cell, index.slot(classify_order(structure, thresholds, coordinate)));
    }
}

/// Classify every cell of `fields` against one set of thresholds.
pub fn classify_batch(
    structure: &TruncationStructure,
    thresholds: &ComputedThresholds,
    fields: &AuxiliaryFields<'_>,
) -> Result<BatchClassification> {
    thresholds.require()?;
    fields.require(structure)?;
    let mut codes = alloc::vec![0; fields.len()];
    let mut counts = alloc::vec![0u64; structure.num_categories()];
    for_each_cell(structure, thresholds, fields, 0..fields.len(), |cell, slot| {
        codes[cell] = structure.code_of_slot(slot);
        counts[slot] += 1;
    });
    Ok(BatchClassification { codes, counts })
}
