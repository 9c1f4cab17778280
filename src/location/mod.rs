pub mod cache;
pub mod geocoder;

pub use cache::{CacheStats, CacheStore, LocationCache};
pub use geocoder::{GeocodeMatch, Geocoder, LookupFailure, OpenCageGeocoder};
