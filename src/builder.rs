//! Normalizes the raw order table into per-order structures.
//!
//! The table is validated and captured once as an immutable [`OrderSnapshot`];
//! every extraction afterwards is a pure read over that snapshot.

use std::collections::HashSet;

use tracing::debug;

use crate::model::{
    CategoryTags, FillerLine, MalformedRowError, Order, OrderLine, RawRow, RowKind, TableRow,
};

/// Validated, category-sorted copy of the order table.
#[derive(Clone, Debug)]
pub struct OrderSnapshot {
    rows: Vec<TableRow>,
}

impl OrderSnapshot {
    /// Validates the raw table and captures it.
    ///
    /// The header row is dropped when `has_header` is set. The remaining rows are
    /// sorted by category tag, keeping the table order within a category.
    ///
    /// # Returns
    /// The snapshot, or the first malformed row. No partial snapshot is produced.
    pub fn from_table(
        table: &[RawRow],
        tags: &CategoryTags,
        has_header: bool,
    ) -> Result<Self, MalformedRowError> {
        let mut rows = table
            .iter()
            .enumerate()
            .skip(usize::from(has_header))
            .map(|(idx, cells)| TableRow::parse(idx + 1, cells, tags))
            .collect::<Result<Vec<_>, _>>()?;

        rows.sort_by(|a, b| a.category.cmp(&b.category));
        debug!(rows = rows.len(), "order table captured");

        Ok(Self { rows })
    }

    /// Number of data rows in the snapshot.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn rows_of<'a>(&'a self, order_num: &'a str) -> impl Iterator<Item = &'a TableRow> + 'a {
        self.rows.iter().filter(move |row| row.order_num == order_num)
    }

    /// Quantity declared by the order's box-count row, 0 when the order has none.
    pub fn extract_box_count(&self, order_num: &str) -> u32 {
        self.rows_of(order_num)
            .find(|row| row.kind == RowKind::BoxCount)
            .map_or(0, |row| row.quantity)
    }

    /// Product lines of the order in snapshot order, special rows excluded.
    pub fn extract_lines(&self, order_num: &str) -> Vec<OrderLine> {
        self.rows_of(order_num)
            .filter(|row| row.kind == RowKind::Product)
            .filter_map(|row| {
                // Product rows always carry a ratio after validation.
                let ratio = row.ratio?;
                Some(OrderLine {
                    order_code: self.order_code_for(order_num, &row.product_id),
                    product_id: row.product_id.clone(),
                    product_name: row.product_name.clone(),
                    quantity: row.quantity,
                    ratio,
                })
            })
            .collect()
    }

    /// Filler row of the order, if any.
    pub fn extract_filler(&self, order_num: &str) -> Option<FillerLine> {
        self.rows_of(order_num)
            .find(|row| row.kind == RowKind::Filler)
            .map(|row| FillerLine {
                order_code: row.order_code.clone(),
                product_id: row.product_id.clone(),
                product_name: row.product_name.clone(),
                quantity: row.quantity,
            })
    }

    /// All order numbers in first-seen order, without duplicates.
    pub fn distinct_order_numbers(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.rows
            .iter()
            .filter(|row| seen.insert(row.order_num.as_str()))
            .map(|row| row.order_num.clone())
            .collect()
    }

    /// Order code of the first row of `order_num` carrying `product_id`, or an empty
    /// string.
    pub fn order_code_for(&self, order_num: &str, product_id: &str) -> String {
        self.rows_of(order_num)
            .find(|row| row.product_id == product_id)
            .map(|row| row.order_code.clone())
            .unwrap_or_default()
    }

    /// Assembles the full order structure for `order_num`.
    pub fn build_order(&self, order_num: &str) -> Order {
        Order {
            order_num: order_num.to_string(),
            box_count: self.extract_box_count(order_num),
            lines: self.extract_lines(order_num),
            filler: self.extract_filler(order_num),
        }
    }
}
