//! Box manifest generation for order tables.
//!
//! Orders are read as raw table rows, grouped per order number and distributed
//! over a fixed number of boxes of 100 capacity units each. The result is a
//! manifest with one row per placement, including the filler padding of boxes
//! that were left partly empty.

pub mod allocator;
pub mod api;
pub mod builder;
pub mod capacity;
pub mod config;
pub mod model;
pub mod orchestrator;
pub mod store;
pub mod task;
