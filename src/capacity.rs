//! Capacity model for shipping boxes.
//!
//! Every box holds [`BOX_CAPACITY`] capacity units. A product's ratio is the number
//! of its units that fill one box on their own, so `ratio` units occupy the whole box
//! and any other quantity occupies a proportional share of it.
//!
//! All conversions round half-to-even on exact integer arithmetic, which keeps the
//! results independent of floating point representation.

/// Capacity units of a completely full box.
pub const BOX_CAPACITY: u32 = 100;

/// Capacity units occupied by `quantity` product units with the given ratio.
///
/// # Examples
/// ```
/// use box_manifest::capacity::occupation_units;
///
/// assert_eq!(occupation_units(25, 50), 50);
/// assert_eq!(occupation_units(125, 50), 250);
/// ```
pub fn occupation_units(quantity: u32, ratio: u32) -> u32 {
    debug_assert!(ratio > 0, "ratio must be positive");
    round_half_even(
        u64::from(quantity) * u64::from(BOX_CAPACITY),
        u64::from(ratio),
    )
}

/// Product units that fill `available` capacity units, rounded to the nearest unit.
///
/// The rounded value may occupy slightly more than `available`; use
/// [`largest_fitting_quantity`] when the result has to fit.
pub fn fitting_quantity(available: u32, ratio: u32) -> u32 {
    round_half_even(
        u64::from(available) * u64::from(ratio),
        u64::from(BOX_CAPACITY),
    )
}

/// Largest quantity close to [`fitting_quantity`] whose occupation does not exceed
/// `available`.
pub fn largest_fitting_quantity(available: u32, ratio: u32) -> u32 {
    let mut quantity = fitting_quantity(available, ratio);
    while quantity > 0 && occupation_units(quantity, ratio) > available {
        quantity -= 1;
    }
    quantity
}

/// Capacity units still free in a box with the given occupation.
#[inline]
pub fn remaining_units(occupied: u32) -> u32 {
    BOX_CAPACITY.saturating_sub(occupied)
}

fn round_half_even(numerator: u64, denominator: u64) -> u32 {
    let quotient = numerator / denominator;
    let twice_remainder = (numerator % denominator) * 2;
    let rounded = match twice_remainder.cmp(&denominator) {
        std::cmp::Ordering::Less => quotient,
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal if quotient % 2 == 0 => quotient,
        std::cmp::Ordering::Equal => quotient + 1,
    };
    u32::try_from(rounded).unwrap_or(u32::MAX)
}
