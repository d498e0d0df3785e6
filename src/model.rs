//! Data models for order tables and packing manifests.
//!
//! This module defines the structures that flow through a manifest run:
//! - `Cell` / `RawRow`: one row of the order table as received from the store
//! - `TableRow`: a validated order-table row
//! - `Order`, `OrderLine`, `FillerLine`: one order normalized for allocation
//! - `PlacementRow`: one line of the resulting packing manifest

use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use thiserror::Error;
use utoipa::ToSchema;

/// Number of columns in an order-table row and in a manifest row.
pub const ROW_ARITY: usize = 7;

/// A single table cell: the store hands out text, numbers or nothing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum Cell {
    /// JSON `null`, as exported for blank spreadsheet cells.
    Empty,
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Cell {
    /// Textual form of the cell, integral floats printed without fraction.
    pub fn as_text(&self) -> String {
        match self {
            Cell::Empty => String::new(),
            Cell::Integer(value) => value.to_string(),
            Cell::Float(value) if value.fract() == 0.0 && value.is_finite() => {
                format!("{value:.0}")
            }
            Cell::Float(value) => value.to_string(),
            Cell::Text(value) => value.clone(),
        }
    }

    /// Interprets the cell as a non-negative whole count.
    ///
    /// # Examples
    /// ```
    /// use box_manifest::model::Cell;
    ///
    /// assert_eq!(Cell::from(" 12 ").as_count(), Some(12));
    /// assert_eq!(Cell::Float(4.0).as_count(), Some(4));
    /// assert_eq!(Cell::Float(4.5).as_count(), None);
    /// assert_eq!(Cell::from("twelve").as_count(), None);
    /// ```
    pub fn as_count(&self) -> Option<u32> {
        match self {
            Cell::Empty => None,
            Cell::Integer(value) => u32::try_from(*value).ok(),
            Cell::Float(value) => {
                if value.is_finite()
                    && value.fract() == 0.0
                    && (0.0..=f64::from(u32::MAX)).contains(value)
                {
                    Some(*value as u32)
                } else {
                    None
                }
            }
            Cell::Text(value) => value.trim().parse::<u32>().ok(),
        }
    }

    /// Checks whether the cell holds no value.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(value) => value.trim().is_empty(),
            _ => false,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Text(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Text(value)
    }
}

impl From<u32> for Cell {
    fn from(value: u32) -> Self {
        Cell::Integer(i64::from(value))
    }
}

/// One row of the order table, columns in the order
/// `order_code, order_num, product_id, product_name, category, quantity, ratio`.
pub type RawRow = Vec<Cell>;

/// Why a row was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("expected {expected} columns, found {found}")]
    Arity { expected: usize, found: usize },
    #[error("quantity '{0}' is not a non-negative whole number")]
    Quantity(String),
    #[error("ratio '{0}' is not a positive whole number")]
    Ratio(String),
}

/// A row of the order table failed structural validation.
///
/// `row` is the 1-based position in the table as received, header included.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("row {row} is malformed: {reason}")]
pub struct MalformedRowError {
    pub row: usize,
    pub reason: MalformedReason,
}

/// Category tags that mark the special rows of an order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CategoryTags {
    /// Tag of the row whose quantity declares the order's box count.
    pub box_count: String,
    /// Tag of the row naming the filler product.
    pub filler: String,
}

impl CategoryTags {
    pub const DEFAULT_BOX_COUNT: &'static str = "CUSTOM SET";
    pub const DEFAULT_FILLER: &'static str = "Riempimento";

    pub fn new(box_count: impl Into<String>, filler: impl Into<String>) -> Self {
        Self {
            box_count: box_count.into(),
            filler: filler.into(),
        }
    }

    /// Classifies a category value.
    pub fn kind_of(&self, category: &str) -> RowKind {
        if category == self.box_count {
            RowKind::BoxCount
        } else if category == self.filler {
            RowKind::Filler
        } else {
            RowKind::Product
        }
    }
}

impl Default for CategoryTags {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BOX_COUNT, Self::DEFAULT_FILLER)
    }
}

/// Role of a row within its order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RowKind {
    BoxCount,
    Filler,
    Product,
}

/// A validated order-table row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableRow {
    pub order_code: String,
    pub order_num: String,
    pub product_id: String,
    pub product_name: String,
    pub category: String,
    pub kind: RowKind,
    pub quantity: u32,
    /// Blank only on box-count and filler rows.
    pub ratio: Option<u32>,
}

impl TableRow {
    /// Validates a raw row.
    ///
    /// # Parameters
    /// * `row` - 1-based position of the row, used in error reports
    /// * `cells` - The raw cells
    /// * `tags` - Tags identifying box-count and filler rows
    pub fn parse(row: usize, cells: &[Cell], tags: &CategoryTags) -> Result<Self, MalformedRowError> {
        let malformed = |reason| MalformedRowError { row, reason };

        if cells.len() != ROW_ARITY {
            return Err(malformed(MalformedReason::Arity {
                expected: ROW_ARITY,
                found: cells.len(),
            }));
        }

        let category = cells[4].as_text();
        let kind = tags.kind_of(&category);

        let quantity = cells[5]
            .as_count()
            .ok_or_else(|| malformed(MalformedReason::Quantity(cells[5].as_text())))?;

        let ratio_cell = &cells[6];
        let ratio = match (kind, ratio_cell.as_count()) {
            (RowKind::Product, Some(ratio)) if ratio > 0 => Some(ratio),
            (RowKind::Product, _) => {
                return Err(malformed(MalformedReason::Ratio(ratio_cell.as_text())));
            }
            (_, _) if ratio_cell.is_blank() => None,
            (_, Some(ratio)) => Some(ratio),
            (_, None) => return Err(malformed(MalformedReason::Ratio(ratio_cell.as_text()))),
        };

        Ok(Self {
            order_code: cells[0].as_text(),
            order_num: cells[1].as_text(),
            product_id: cells[2].as_text(),
            product_name: cells[3].as_text(),
            category,
            kind,
            quantity,
            ratio,
        })
    }
}

/// One product entry of an order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderLine {
    /// Order code written on this product's manifest rows.
    pub order_code: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    /// Product units that exactly fill one box; always positive.
    pub ratio: u32,
}

/// Product used to pad boxes left under-full.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FillerLine {
    pub order_code: String,
    pub product_id: String,
    pub product_name: String,
    /// Quantity placed into each padded box.
    pub quantity: u32,
}

/// One order, ready for allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Order {
    pub order_num: String,
    pub box_count: u32,
    pub lines: Vec<OrderLine>,
    pub filler: Option<FillerLine>,
}

/// One record of the packing manifest: a quantity of a product in a specific box.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(
    example = json!({
        "order_code": "A-17",
        "product_id": "P-100",
        "product_name": "Honey jar 250g",
        "quantity": 50,
        "box_index": 1,
        "tag": "di",
        "box_count": 3
    })
)]
pub struct PlacementRow {
    pub order_code: String,
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    /// 1-based box number within the order.
    pub box_index: u32,
    pub tag: String,
    pub box_count: u32,
}

impl PlacementRow {
    /// Serializes the row into the seven manifest columns.
    pub fn to_cells(&self) -> RawRow {
        vec![
            Cell::from(self.order_code.as_str()),
            Cell::from(self.product_id.as_str()),
            Cell::from(self.product_name.as_str()),
            Cell::from(self.quantity),
            Cell::from(self.box_index),
            Cell::from(self.tag.as_str()),
            Cell::from(self.box_count),
        ]
    }
}
