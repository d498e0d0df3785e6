//! Box allocation for a single order.
//!
//! Lines are placed greedily into the order's boxes in index order. A line that does
//! not fit into the current box is split: the part that fits goes into the box, the
//! rest spills over into the following boxes. Once every line is placed, boxes left
//! under-full are padded with the order's filler product.

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::capacity::{
    BOX_CAPACITY, largest_fitting_quantity, occupation_units, remaining_units,
};
use crate::model::{Order, OrderLine, PlacementRow};

/// How a box's occupation changes when a line is split into it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OccupancyUpdate {
    /// The split part's occupation is added to what the box already holds.
    #[default]
    Additive,
    /// The split part's occupation replaces the box's occupation, as older
    /// manifests were computed.
    Overwrite,
}

impl OccupancyUpdate {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "additive" | "add" => Some(Self::Additive),
            "overwrite" | "set" => Some(Self::Overwrite),
            _ => None,
        }
    }
}

/// What happens when an order runs out of boxes before a line is placed.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ShortagePolicy {
    /// Keep the partial placements and report the shortage alongside them.
    #[default]
    Report,
    /// Abort with [`AllocationError::Incomplete`].
    Fail,
}

impl ShortagePolicy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "report" | "warn" => Some(Self::Report),
            "fail" | "error" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// Configuration of the allocation algorithm.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct AllocationConfig {
    pub occupancy_update: OccupancyUpdate,
    pub shortage_policy: ShortagePolicy,
}

impl AllocationConfig {
    /// Creates a builder for a custom configuration.
    pub fn builder() -> AllocationConfigBuilder {
        AllocationConfigBuilder::default()
    }
}

/// Builder for [`AllocationConfig`].
#[derive(Clone, Debug, Default)]
pub struct AllocationConfigBuilder {
    config: AllocationConfig,
}

impl AllocationConfigBuilder {
    pub fn occupancy_update(mut self, update: OccupancyUpdate) -> Self {
        self.config.occupancy_update = update;
        self
    }

    pub fn shortage_policy(mut self, policy: ShortagePolicy) -> Self {
        self.config.shortage_policy = policy;
        self
    }

    pub fn build(self) -> AllocationConfig {
        self.config
    }
}

/// Occupation of one box of an order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct BoxState {
    /// 1-based box number.
    pub index: u32,
    /// Capacity units in use, at most [`BOX_CAPACITY`].
    pub occupied: u32,
}

impl BoxState {
    fn empty(index: u32) -> Self {
        Self { index, occupied: 0 }
    }

    pub fn is_full(&self) -> bool {
        self.occupied >= BOX_CAPACITY
    }

    pub fn available(&self) -> u32 {
        remaining_units(self.occupied)
    }
}

/// Placement state of a single order line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Pending,
    PartiallyPlaced,
    Complete,
}

/// Progress of one order line through the allocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct LineProgress {
    pub product_id: String,
    pub ordered: u32,
    pub placed: u32,
    pub status: LineStatus,
}

impl LineProgress {
    fn pending(line: &OrderLine) -> Self {
        let status = if line.quantity == 0 {
            LineStatus::Complete
        } else {
            LineStatus::Pending
        };
        Self {
            product_id: line.product_id.clone(),
            ordered: line.quantity,
            placed: 0,
            status,
        }
    }

    fn record(&mut self, quantity: u32) {
        self.placed += quantity;
        self.status = if self.placed >= self.ordered {
            LineStatus::Complete
        } else {
            LineStatus::PartiallyPlaced
        };
    }

    /// Units still waiting for a box.
    pub fn remaining(&self) -> u32 {
        self.ordered.saturating_sub(self.placed)
    }
}

/// A line whose quantity did not fit into the order's boxes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct Shortage {
    pub order_num: String,
    pub product_id: String,
    pub ordered: u32,
    pub missing: u32,
    pub box_count: u32,
}

impl std::fmt::Display for Shortage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "order {}: {} of {} units of product {} do not fit into {} boxes",
            self.order_num, self.missing, self.ordered, self.product_id, self.box_count
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("incomplete allocation, {0}")]
    Incomplete(Shortage),
    #[error("order {order_num}: product {product_id} has a ratio of 0")]
    ZeroRatio {
        order_num: String,
        product_id: String,
    },
}

/// Allocation outcome of one order without its placements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderSummary {
    pub order_num: String,
    pub box_count: u32,
    pub boxes: Vec<BoxState>,
    pub lines: Vec<LineProgress>,
    pub shortages: Vec<Shortage>,
}

impl OrderSummary {
    /// Indices of boxes that are not full, in increasing order.
    pub fn incomplete_boxes(&self) -> Vec<u32> {
        incomplete_indices(&self.boxes)
    }

    /// Indicates whether every line was placed in full.
    pub fn is_complete(&self) -> bool {
        self.lines
            .iter()
            .all(|line| line.status == LineStatus::Complete)
    }
}

/// Result of allocating one order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderAllocation {
    pub placements: Vec<PlacementRow>,
    pub summary: OrderSummary,
}

/// Events emitted while an order is allocated, for live progress views.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type")]
pub enum AllocationEvent {
    /// Allocation of an order begins.
    OrderStarted {
        order_num: String,
        box_count: u32,
        lines: usize,
    },
    /// A quantity of a product was put into a box.
    ProductPlaced {
        order_num: String,
        box_index: u32,
        product_id: String,
        quantity: u32,
        occupied: u32,
    },
    /// A box was padded with the filler product.
    FillerPlaced {
        order_num: String,
        box_index: u32,
        product_id: String,
        quantity: u32,
    },
    /// A line ran out of boxes.
    LineShort {
        order_num: String,
        product_id: String,
        missing: u32,
    },
    /// Allocation of an order is done.
    OrderFinished {
        order_num: String,
        placements: usize,
        incomplete_boxes: Vec<u32>,
    },
}

/// Allocates one order with the given placement tag and configuration.
///
/// Fails with [`AllocationError::ZeroRatio`] before placing anything if a line has a
/// ratio of 0, and with [`AllocationError::Incomplete`] on a shortage under
/// [`ShortagePolicy::Fail`].
///
/// # Examples
/// ```
/// use box_manifest::allocator::{AllocationConfig, allocate_order};
/// use box_manifest::model::{Order, OrderLine};
///
/// let order = Order {
///     order_num: "1001".to_string(),
///     box_count: 2,
///     lines: vec![OrderLine {
///         order_code: "A-1".to_string(),
///         product_id: "P-1".to_string(),
///         product_name: "Honey".to_string(),
///         quantity: 100,
///         ratio: 50,
///     }],
///     filler: None,
/// };
///
/// let allocation = allocate_order(&order, "di", &AllocationConfig::default()).unwrap();
/// assert_eq!(allocation.placements.len(), 2);
/// assert!(allocation.summary.is_complete());
/// ```
pub fn allocate_order(
    order: &Order,
    tag: &str,
    config: &AllocationConfig,
) -> Result<OrderAllocation, AllocationError> {
    allocate_order_with_progress(order, tag, config, |_| {})
}

/// Allocation with a progress callback invoked for every step.
pub fn allocate_order_with_progress(
    order: &Order,
    tag: &str,
    config: &AllocationConfig,
    mut on_event: impl FnMut(&AllocationEvent),
) -> Result<OrderAllocation, AllocationError> {
    if let Some(line) = order.lines.iter().find(|line| line.ratio == 0) {
        return Err(AllocationError::ZeroRatio {
            order_num: order.order_num.clone(),
            product_id: line.product_id.clone(),
        });
    }

    on_event(&AllocationEvent::OrderStarted {
        order_num: order.order_num.clone(),
        box_count: order.box_count,
        lines: order.lines.len(),
    });

    let mut boxes: Vec<BoxState> = (1..=order.box_count).map(BoxState::empty).collect();
    let mut placements = Vec::new();
    let mut lines = Vec::with_capacity(order.lines.len());
    let mut shortages = Vec::new();

    for line in &order.lines {
        let mut progress = LineProgress::pending(line);

        for slot in boxes.iter_mut() {
            let remainder = progress.remaining();
            if remainder == 0 {
                break;
            }
            if slot.is_full() {
                continue;
            }

            let Some(quantity) = place_into(slot, line.ratio, remainder, config.occupancy_update)
            else {
                continue;
            };

            progress.record(quantity);
            placements.push(PlacementRow {
                order_code: line.order_code.clone(),
                product_id: line.product_id.clone(),
                product_name: line.product_name.clone(),
                quantity,
                box_index: slot.index,
                tag: tag.to_string(),
                box_count: order.box_count,
            });
            debug!(
                order = %order.order_num,
                product = %line.product_id,
                box_index = slot.index,
                quantity,
                occupied = slot.occupied,
                "product placed"
            );
            on_event(&AllocationEvent::ProductPlaced {
                order_num: order.order_num.clone(),
                box_index: slot.index,
                product_id: line.product_id.clone(),
                quantity,
                occupied: slot.occupied,
            });
        }

        let missing = progress.remaining();
        if missing > 0 {
            let shortage = Shortage {
                order_num: order.order_num.clone(),
                product_id: line.product_id.clone(),
                ordered: line.quantity,
                missing,
                box_count: order.box_count,
            };
            if config.shortage_policy == ShortagePolicy::Fail {
                return Err(AllocationError::Incomplete(shortage));
            }
            warn!("{shortage}");
            on_event(&AllocationEvent::LineShort {
                order_num: order.order_num.clone(),
                product_id: line.product_id.clone(),
                missing,
            });
            shortages.push(shortage);
        }
        lines.push(progress);
    }

    if let Some(filler) = &order.filler {
        for index in filler_targets(&boxes) {
            placements.push(PlacementRow {
                order_code: filler.order_code.clone(),
                product_id: filler.product_id.clone(),
                product_name: filler.product_name.clone(),
                quantity: filler.quantity,
                box_index: index,
                tag: tag.to_string(),
                box_count: order.box_count,
            });
            on_event(&AllocationEvent::FillerPlaced {
                order_num: order.order_num.clone(),
                box_index: index,
                product_id: filler.product_id.clone(),
                quantity: filler.quantity,
            });
        }
    }

    on_event(&AllocationEvent::OrderFinished {
        order_num: order.order_num.clone(),
        placements: placements.len(),
        incomplete_boxes: incomplete_indices(&boxes),
    });

    Ok(OrderAllocation {
        placements,
        summary: OrderSummary {
            order_num: order.order_num.clone(),
            box_count: order.box_count,
            boxes,
            lines,
            shortages,
        },
    })
}

/// Puts as much of `remainder` into the box as fits.
///
/// # Returns
/// The quantity placed, or `None` if not a single unit fits.
fn place_into(
    slot: &mut BoxState,
    ratio: u32,
    remainder: u32,
    update: OccupancyUpdate,
) -> Option<u32> {
    let available = slot.available();
    let required = occupation_units(remainder, ratio);
    if required <= available {
        slot.occupied += required;
        return Some(remainder);
    }

    let possible = largest_fitting_quantity(available, ratio);
    if possible == 0 {
        return None;
    }

    let occupation = occupation_units(possible, ratio);
    slot.occupied = match update {
        OccupancyUpdate::Additive => slot.occupied + occupation,
        OccupancyUpdate::Overwrite => occupation,
    };
    Some(possible)
}

/// Boxes that receive the filler product.
///
/// Incomplete boxes are visited in index order. Empty boxes are always padded. The
/// last incomplete box is padded as well, unless an empty box was padded before it.
/// Other partially filled boxes are left as they are.
fn filler_targets(boxes: &[BoxState]) -> Vec<u32> {
    let incomplete = incomplete_indices(boxes);
    let Some(&last) = incomplete.last() else {
        return Vec::new();
    };

    let mut found_empty = false;
    let mut targets = Vec::new();
    for slot in boxes.iter().filter(|slot| !slot.is_full()) {
        if slot.index == last && !found_empty {
            targets.push(slot.index);
        } else if slot.occupied == 0 {
            found_empty = true;
            targets.push(slot.index);
        }
    }
    targets
}

fn incomplete_indices(boxes: &[BoxState]) -> Vec<u32> {
    boxes
        .iter()
        .filter(|slot| !slot.is_full())
        .map(|slot| slot.index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FillerLine;

    fn line(product_id: &str, quantity: u32, ratio: u32) -> OrderLine {
        OrderLine {
            order_code: "A-1".to_string(),
            product_id: product_id.to_string(),
            product_name: format!("Product {product_id}"),
            quantity,
            ratio,
        }
    }

    fn filler() -> FillerLine {
        FillerLine {
            order_code: "A-1".to_string(),
            product_id: "F-1".to_string(),
            product_name: "Paper".to_string(),
            quantity: 2,
        }
    }

    fn order(box_count: u32, lines: Vec<OrderLine>, filler: Option<FillerLine>) -> Order {
        Order {
            order_num: "1001".to_string(),
            box_count,
            lines,
            filler,
        }
    }

    fn allocate(order: &Order) -> OrderAllocation {
        allocate_order(order, "di", &AllocationConfig::default()).expect("allocation succeeds")
    }

    fn placed(allocation: &OrderAllocation) -> Vec<(&str, u32, u32)> {
        allocation
            .placements
            .iter()
            .map(|p| (p.product_id.as_str(), p.quantity, p.box_index))
            .collect()
    }

    fn occupation(allocation: &OrderAllocation) -> Vec<u32> {
        allocation.summary.boxes.iter().map(|b| b.occupied).collect()
    }

    #[test]
    fn exact_ratio_fills_first_box() {
        let allocation = allocate(&order(2, vec![line("P-1", 40, 40)], None));
        assert_eq!(placed(&allocation), [("P-1", 40, 1)]);
        assert_eq!(occupation(&allocation), [100, 0]);
        assert!(allocation.summary.is_complete());
    }

    #[test]
    fn double_ratio_splits_evenly_over_two_boxes() {
        let allocation = allocate(&order(3, vec![line("P-1", 60, 30)], None));
        assert_eq!(placed(&allocation), [("P-1", 30, 1), ("P-1", 30, 2)]);
        assert_eq!(occupation(&allocation), [100, 100, 0]);
    }

    #[test]
    fn spills_remainder_into_following_boxes() {
        let allocation = allocate(&order(3, vec![line("P-1", 125, 50)], Some(filler())));
        assert_eq!(
            placed(&allocation),
            [("P-1", 50, 1), ("P-1", 50, 2), ("P-1", 25, 3), ("F-1", 2, 3)]
        );
        assert_eq!(occupation(&allocation), [100, 100, 50]);
        assert_eq!(allocation.summary.incomplete_boxes(), [3]);
    }

    #[test]
    fn filler_pads_single_empty_last_box() {
        let allocation = allocate(&order(
            3,
            vec![line("P-1", 20, 20), line("P-2", 10, 10)],
            Some(filler()),
        ));
        let filler_rows: Vec<_> = allocation
            .placements
            .iter()
            .filter(|p| p.product_id == "F-1")
            .collect();
        assert_eq!(filler_rows.len(), 1);
        assert_eq!(filler_rows[0].box_index, 3);
        assert_eq!(filler_rows[0].quantity, 2);
    }

    #[test]
    fn filler_skips_partial_boxes_once_an_empty_box_was_padded() {
        // box 1 half full, boxes 2 and 3 empty
        let allocation = allocate(&order(3, vec![line("P-1", 10, 20)], Some(filler())));
        let targets: Vec<_> = allocation
            .placements
            .iter()
            .filter(|p| p.product_id == "F-1")
            .map(|p| p.box_index)
            .collect();
        assert_eq!(targets, [2, 3]);
    }

    #[test]
    fn filler_only_tops_up_last_partial_box() {
        // box 1 full, boxes 2 and 3 partially filled
        let boxes = [
            BoxState { index: 1, occupied: 100 },
            BoxState { index: 2, occupied: 60 },
            BoxState { index: 3, occupied: 50 },
        ];
        assert_eq!(filler_targets(&boxes), [3]);

        let all_full = [BoxState { index: 1, occupied: 100 }];
        assert!(filler_targets(&all_full).is_empty());
    }

    #[test]
    fn missing_filler_leaves_boxes_untouched() {
        let allocation = allocate(&order(3, vec![line("P-1", 10, 20)], None));
        assert_eq!(placed(&allocation), [("P-1", 10, 1)]);
        assert_eq!(allocation.summary.incomplete_boxes(), [1, 2, 3]);
    }

    #[test]
    fn every_line_is_placed_after_an_earlier_line_completes() {
        let allocation = allocate(&order(
            2,
            vec![line("P-1", 10, 20), line("P-2", 5, 10), line("P-3", 20, 20)],
            None,
        ));
        assert_eq!(
            placed(&allocation),
            [("P-1", 10, 1), ("P-2", 5, 1), ("P-3", 20, 2)]
        );
        assert!(
            allocation
                .summary
                .lines
                .iter()
                .all(|l| l.status == LineStatus::Complete)
        );
    }

    #[test]
    fn additive_update_keeps_prior_occupation() {
        // P-1 takes 30 units of box 1; P-2 needs 150 units and splits 70 + 80
        let allocation = allocate(&order(2, vec![line("P-1", 3, 10), line("P-2", 15, 10)], None));
        assert_eq!(
            placed(&allocation),
            [("P-1", 3, 1), ("P-2", 7, 1), ("P-2", 8, 2)]
        );
        assert_eq!(occupation(&allocation), [100, 80]);
    }

    #[test]
    fn overwrite_update_discards_prior_occupation() {
        let config = AllocationConfig::builder()
            .occupancy_update(OccupancyUpdate::Overwrite)
            .build();
        let order = order(2, vec![line("P-1", 3, 10), line("P-2", 15, 10)], None);
        let allocation = allocate_order(&order, "di", &config).expect("allocation succeeds");

        // box 1 is recorded at 70 instead of 100, so the next line may reuse it
        assert_eq!(
            placed(&allocation),
            [("P-1", 3, 1), ("P-2", 7, 1), ("P-2", 8, 2)]
        );
        assert_eq!(occupation(&allocation), [70, 80]);
    }

    #[test]
    fn split_quantity_is_lowered_until_it_fits() {
        // box 1 keeps 30 free units; 2 units of ratio 5 round up to 40
        let allocation = allocate(&order(3, vec![line("P-1", 14, 20), line("P-2", 10, 5)], None));
        assert_eq!(
            placed(&allocation),
            [("P-1", 14, 1), ("P-2", 1, 1), ("P-2", 5, 2), ("P-2", 4, 3)]
        );
        assert_eq!(occupation(&allocation), [90, 100, 80]);
        for slot in &allocation.summary.boxes {
            assert!(slot.occupied <= BOX_CAPACITY, "box {} overflows", slot.index);
        }
    }

    #[test]
    fn shortage_is_reported_by_default() {
        let allocation = allocate(&order(2, vec![line("P-1", 250, 100)], None));
        assert_eq!(placed(&allocation), [("P-1", 100, 1), ("P-1", 100, 2)]);
        assert_eq!(allocation.summary.shortages.len(), 1);
        assert_eq!(allocation.summary.shortages[0].missing, 50);
        assert_eq!(allocation.summary.lines[0].status, LineStatus::PartiallyPlaced);
        assert!(!allocation.summary.is_complete());
    }

    #[test]
    fn shortage_fails_when_configured() {
        let config = AllocationConfig::builder()
            .shortage_policy(ShortagePolicy::Fail)
            .build();
        let err = allocate_order(&order(1, vec![line("P-1", 30, 20)], None), "di", &config)
            .unwrap_err();
        let AllocationError::Incomplete(shortage) = err else {
            panic!("expected Incomplete, got {err:?}");
        };
        assert_eq!(shortage.missing, 10);
        assert_eq!(shortage.product_id, "P-1");
    }

    #[test]
    fn zero_ratio_is_rejected() {
        let order = order(2, vec![line("P-1", 10, 5), line("P-2", 10, 0)], None);
        let err = allocate_order(&order, "di", &AllocationConfig::default()).unwrap_err();
        assert_eq!(
            err,
            AllocationError::ZeroRatio {
                order_num: order.order_num.clone(),
                product_id: "P-2".to_string(),
            }
        );
    }

    #[test]
    fn zero_boxes_leave_every_line_pending() {
        let allocation = allocate(&order(0, vec![line("P-1", 5, 10)], Some(filler())));
        assert!(allocation.placements.is_empty());
        assert_eq!(allocation.summary.lines[0].status, LineStatus::Pending);
        assert_eq!(allocation.summary.shortages[0].missing, 5);
    }

    #[test]
    fn zero_quantity_line_is_complete_without_placements() {
        let allocation = allocate(&order(1, vec![line("P-1", 0, 10)], None));
        assert!(allocation.placements.is_empty());
        assert_eq!(allocation.summary.lines[0].status, LineStatus::Complete);
    }

    #[test]
    fn tiny_gap_is_skipped() {
        // box 1 ends at 99 units; one unit of ratio 10 needs 10 units
        let allocation = allocate(&order(
            2,
            vec![line("P-1", 99, 100), line("P-2", 1, 10)],
            None,
        ));
        assert_eq!(placed(&allocation), [("P-1", 99, 1), ("P-2", 1, 2)]);
        assert_eq!(occupation(&allocation), [99, 10]);
    }

    #[test]
    fn emits_progress_events() {
        let mut events = Vec::new();
        allocate_order_with_progress(
            &order(2, vec![line("P-1", 25, 50)], Some(filler())),
            "di",
            &AllocationConfig::default(),
            |evt| events.push(evt.clone()),
        )
        .expect("allocation succeeds");

        assert!(matches!(events.first(), Some(AllocationEvent::OrderStarted { box_count: 2, .. })));
        assert!(events.iter().any(|evt| matches!(
            evt,
            AllocationEvent::ProductPlaced { box_index: 1, quantity: 25, occupied: 50, .. }
        )));
        // box 1 is partial but not the last incomplete box
        let filler_boxes: Vec<_> = events
            .iter()
            .filter_map(|evt| match evt {
                AllocationEvent::FillerPlaced { box_index, .. } => Some(*box_index),
                _ => None,
            })
            .collect();
        assert_eq!(filler_boxes, [2]);
        assert!(matches!(
            events.last(),
            Some(AllocationEvent::OrderFinished { placements: 2, .. })
        ));
    }

    #[test]
    fn policies_parse_from_names() {
        assert_eq!(OccupancyUpdate::from_name("Additive"), Some(OccupancyUpdate::Additive));
        assert_eq!(OccupancyUpdate::from_name(" overwrite "), Some(OccupancyUpdate::Overwrite));
        assert_eq!(OccupancyUpdate::from_name("merge"), None);
        assert_eq!(ShortagePolicy::from_name("FAIL"), Some(ShortagePolicy::Fail));
        assert_eq!(ShortagePolicy::from_name("report"), Some(ShortagePolicy::Report));
        assert_eq!(ShortagePolicy::from_name("ignore"), None);
    }
}
