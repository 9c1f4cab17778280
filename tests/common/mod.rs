#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use usage_pipeline::db::Database;
use usage_pipeline::location::{GeocodeMatch, Geocoder, LookupFailure};
use usage_pipeline::models::{EnrichedRow, Location, RawRow};

pub fn open_db(dir: &tempfile::TempDir) -> Database {
    Database::new(dir.path().join("usage.sqlite3")).unwrap()
}

pub fn row(age: i64, gender: &str, city: &str) -> EnrichedRow {
    RawRow {
        age,
        gender: gender.to_string(),
        app_count: 5,
        social_media_usage: 60.0,
        productivity_usage: 30.0,
        gaming_usage: 10.0,
        city: city.to_string(),
    }
    .enrich(1)
    .unwrap()
    .with_location(Location::new("WA", "USA"))
}

/// Geocoder that answers from a fixed script and records every call.
pub struct FakeGeocoder {
    calls: AtomicUsize,
    seen: Mutex<Vec<String>>,
    answer: Result<GeocodeMatch, LookupFailure>,
}

impl FakeGeocoder {
    pub fn resolving(region: &str, country: &str) -> Self {
        Self::with_answer(Ok(GeocodeMatch {
            region: Some(region.to_string()),
            country: Some(country.to_string()),
        }))
    }

    pub fn failing(failure: LookupFailure) -> Self {
        Self::with_answer(Err(failure))
    }

    fn with_answer(answer: Result<GeocodeMatch, LookupFailure>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
            answer,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn lookup(&self, place: &str) -> Result<GeocodeMatch, LookupFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(place.to_string());
        self.answer.clone()
    }
}
