//! Runs the allocation over every order of a table and collects the manifest.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::allocator::{
    AllocationConfig, AllocationError, AllocationEvent, OrderSummary, Shortage,
    allocate_order_with_progress,
};
use crate::builder::OrderSnapshot;
use crate::model::{CategoryTags, MalformedRowError, PlacementRow, RawRow};

/// Settings of a complete manifest run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub tags: CategoryTags,
    /// Tag written on every manifest row.
    pub placement_tag: String,
    /// Whether the first table row is a header.
    pub has_header: bool,
    pub allocation: AllocationConfig,
}

impl RunConfig {
    pub const DEFAULT_PLACEMENT_TAG: &'static str = "di";
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tags: CategoryTags::default(),
            placement_tag: Self::DEFAULT_PLACEMENT_TAG.to_string(),
            has_header: true,
            allocation: AllocationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error(transparent)]
    Malformed(#[from] MalformedRowError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Manifest of a run together with the per-order outcome.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RunReport {
    pub manifest: Vec<PlacementRow>,
    pub orders: Vec<OrderSummary>,
}

impl RunReport {
    /// All shortages across the run.
    pub fn shortages(&self) -> impl Iterator<Item = &Shortage> {
        self.orders.iter().flat_map(|order| order.shortages.iter())
    }

    /// Indicates whether every line of every order was placed.
    pub fn is_complete(&self) -> bool {
        self.orders.iter().all(OrderSummary::is_complete)
    }

    /// Manifest rows serialized as table rows.
    pub fn manifest_cells(&self) -> Vec<RawRow> {
        self.manifest.iter().map(PlacementRow::to_cells).collect()
    }
}

/// Allocates every order of the snapshot.
pub fn run(snapshot: &OrderSnapshot, config: &RunConfig) -> Result<RunReport, RunError> {
    run_with_progress(snapshot, config, |_| {})
}

/// Validates a raw table and allocates every order in it.
pub fn run_table(table: &[RawRow], config: &RunConfig) -> Result<RunReport, RunError> {
    let snapshot = OrderSnapshot::from_table(table, &config.tags, config.has_header)?;
    run(&snapshot, config)
}

/// Allocation of all orders with a progress callback.
///
/// Orders are processed in discovery order, each at most once even when its rows
/// are spread over the table. Any error aborts the run without a partial report.
pub fn run_with_progress(
    snapshot: &OrderSnapshot,
    config: &RunConfig,
    mut on_event: impl FnMut(&AllocationEvent),
) -> Result<RunReport, RunError> {
    let mut report = RunReport::default();

    for order_num in snapshot.distinct_order_numbers() {
        let order = snapshot.build_order(&order_num);
        let allocation = allocate_order_with_progress(
            &order,
            &config.placement_tag,
            &config.allocation,
            &mut on_event,
        )?;

        report.manifest.extend(allocation.placements);
        report.orders.push(allocation.summary);
    }

    let shortages = report.shortages().count();
    if shortages > 0 {
        warn!(shortages, "manifest is incomplete");
    }
    info!(
        orders = report.orders.len(),
        rows = report.manifest.len(),
        "manifest computed"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::ShortagePolicy;
    use crate::model::{Cell, MalformedReason};

    fn row(values: [&str; 7]) -> RawRow {
        values.into_iter().map(Cell::from).collect()
    }

    fn table() -> Vec<RawRow> {
        vec![
            row(["Code", "Order", "Id", "Name", "Category", "Qty", "Ratio"]),
            row(["A-1", "1001", "P-1", "Honey", "Food", "125", "50"]),
            row(["A-1", "1001", "BOX", "Box", "CUSTOM SET", "3", ""]),
            row(["A-1", "1001", "F-1", "Paper", "Riempimento", "2", ""]),
            row(["B-7", "2002", "P-2", "Soap", "Food", "20", "20"]),
            row(["B-7", "2002", "P-3", "Jam", "Food", "40", "40"]),
            row(["B-7", "2002", "BOX", "Box", "CUSTOM SET", "3", ""]),
            row(["B-7", "2002", "F-2", "Straw", "Riempimento", "1", ""]),
        ]
    }

    #[test]
    fn builds_manifest_in_discovery_order() {
        let report = run_table(&table(), &RunConfig::default()).expect("run succeeds");

        let rows: Vec<_> = report
            .manifest
            .iter()
            .map(|p| (p.order_code.as_str(), p.product_id.as_str(), p.quantity, p.box_index))
            .collect();
        assert_eq!(
            rows,
            [
                ("A-1", "P-1", 50, 1),
                ("A-1", "P-1", 50, 2),
                ("A-1", "P-1", 25, 3),
                ("A-1", "F-1", 2, 3),
                ("B-7", "P-2", 20, 1),
                ("B-7", "P-3", 40, 2),
                ("B-7", "F-2", 1, 3),
            ]
        );
        assert!(report.manifest.iter().all(|p| p.tag == "di" && p.box_count == 3));
        assert_eq!(report.orders.len(), 2);
        assert!(report.is_complete());
    }

    #[test]
    fn each_order_is_allocated_once() {
        // Rows of 1001 and 2002 alternate, before and after the category sort.
        let mut table = table();
        table.swap(2, 5);
        let report = run_table(&table, &RunConfig::default()).expect("run succeeds");

        let orders: Vec<_> = report.orders.iter().map(|o| o.order_num.as_str()).collect();
        assert_eq!(orders, ["1001", "2002"]);
        let rows_of_1001 = report
            .manifest
            .iter()
            .filter(|p| p.order_code == "A-1")
            .count();
        assert_eq!(rows_of_1001, 4);
        assert_eq!(report.manifest.len(), 7);
    }

    #[test]
    fn malformed_row_yields_no_manifest() {
        let mut table = table();
        table[4].pop();
        let err = run_table(&table, &RunConfig::default()).unwrap_err();
        match err {
            RunError::Malformed(err) => {
                assert_eq!(err.row, 5);
                assert!(matches!(err.reason, MalformedReason::Arity { found: 6, .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn shortages_are_collected_across_orders() {
        let mut table = table();
        table[2] = row(["A-1", "1001", "BOX", "Box", "CUSTOM SET", "2", ""]);
        let report = run_table(&table, &RunConfig::default()).expect("run succeeds");

        let shortages: Vec<_> = report.shortages().collect();
        assert_eq!(shortages.len(), 1);
        assert_eq!(shortages[0].order_num, "1001");
        assert_eq!(shortages[0].missing, 25);
        assert!(!report.is_complete());
    }

    #[test]
    fn failing_shortage_policy_aborts_run() {
        let mut table = table();
        table[2] = row(["A-1", "1001", "BOX", "Box", "CUSTOM SET", "2", ""]);
        let config = RunConfig {
            allocation: AllocationConfig::builder()
                .shortage_policy(ShortagePolicy::Fail)
                .build(),
            ..RunConfig::default()
        };
        let err = run_table(&table, &config).unwrap_err();
        assert!(matches!(err, RunError::Allocation(AllocationError::Incomplete(_))));
    }

    #[test]
    fn custom_placement_tag_is_written() {
        let config = RunConfig {
            placement_tag: "pack".to_string(),
            ..RunConfig::default()
        };
        let report = run_table(&table(), &config).expect("run succeeds");
        assert!(report.manifest.iter().all(|p| p.tag == "pack"));
        assert_eq!(report.manifest_cells()[0][5], Cell::from("pack"));
    }

    #[test]
    fn empty_table_yields_empty_manifest() {
        let report = run_table(&table()[..1], &RunConfig::default()).expect("run succeeds");
        assert!(report.manifest.is_empty());
        assert!(report.orders.is_empty());
    }
}
