pub mod aggregates;
pub mod enriched_rows;
