pub mod location;
pub mod record;

pub use location::{Location, UNRESOLVED};
pub use record::{EnrichedRow, RawRow, ENRICHED_COLUMNS, ID_COLUMN, TABLE_NAME};
