//! Row enrichment: parse, derive usage shares, resolve the city's location.

use crate::error::Result;
use crate::location::{Geocoder, LocationCache};
use crate::models::{EnrichedRow, RawRow};
use crate::tabular::TabularRecord;

/// Enriches one tokenized record. Parsing and the zero-usage check run before
/// the location lookup, so a rejected row never touches the cache.
pub async fn enrich_record(
    record: &TabularRecord,
    cache: &mut LocationCache,
    geocoder: &dyn Geocoder,
) -> Result<EnrichedRow> {
    let row = RawRow::parse(record.line, &record.fields)?.enrich(record.line)?;
    let location = cache.resolve(&row.raw.city, geocoder).await;
    Ok(row.with_location(location))
}

/// Forward-only pass over the source records producing enriched rows.
///
/// The first error ends the pass: `next_row` yields it once and then `None`.
pub struct Transformer<'a, I> {
    records: I,
    cache: &'a mut LocationCache,
    geocoder: &'a dyn Geocoder,
    emitted: usize,
    finished: bool,
}

impl<'a, I> Transformer<'a, I>
where
    I: Iterator<Item = Result<TabularRecord>>,
{
    pub fn new(records: I, cache: &'a mut LocationCache, geocoder: &'a dyn Geocoder) -> Self {
        Self {
            records,
            cache,
            geocoder,
            emitted: 0,
            finished: false,
        }
    }

    pub async fn next_row(&mut self) -> Option<Result<EnrichedRow>> {
        if self.finished {
            return None;
        }

        let record = match self.records.next() {
            Some(Ok(record)) => record,
            Some(Err(err)) => {
                self.finished = true;
                return Some(Err(err));
            }
            None => {
                self.finished = true;
                return None;
            }
        };

        match enrich_record(&record, self.cache, self.geocoder).await {
            Ok(row) => {
                self.emitted += 1;
                Some(Ok(row))
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }

    /// Rows produced so far.
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Drains the pass into memory, stopping at the first error.
    pub async fn collect_rows(mut self) -> Result<Vec<EnrichedRow>> {
        let mut rows = Vec::new();
        while let Some(row) = self.next_row().await {
            rows.push(row?);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::location::{GeocodeMatch, LookupFailure};
    use crate::models::Location;
    use crate::tabular::TabularReader;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingGeocoder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Geocoder for RecordingGeocoder {
        async fn lookup(&self, place: &str) -> std::result::Result<GeocodeMatch, LookupFailure> {
            self.seen.lock().unwrap().push(place.to_string());
            match place {
                "Paris" => Ok(GeocodeMatch {
                    region: Some("Ile-de-France".into()),
                    country: Some("France".into()),
                }),
                "Atlantis" => Err(LookupFailure::QuotaExceeded),
                _ => Ok(GeocodeMatch::default()),
            }
        }
    }

    #[tokio::test]
    async fn cached_city_needs_no_lookup() {
        let geocoder = RecordingGeocoder::default();
        let mut cache = LocationCache::new();
        cache.insert("Tacoma", Location::new("WA", "USA"));

        let text = "25,F,10,60,30,10,Tacoma\n";
        let rows = Transformer::new(TabularReader::new(text, false), &mut cache, &geocoder)
            .collect_rows()
            .await
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].location, Location::new("WA", "USA"));
        assert!(geocoder.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn repeated_cities_are_looked_up_once() {
        let geocoder = RecordingGeocoder::default();
        let mut cache = LocationCache::new();

        let text = "25,F,10,60,30,10,Paris\n30,M,4,1,1,1,Paris\n41,F,2,5,5,0,Atlantis\n";
        let rows = Transformer::new(TabularReader::new(text, false), &mut cache, &geocoder)
            .collect_rows()
            .await
            .unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].location.country, "France");
        assert_eq!(rows[2].location, Location::unresolved());
        assert_eq!(*geocoder.seen.lock().unwrap(), vec!["Paris", "Atlantis"]);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn first_bad_row_ends_the_pass() {
        let geocoder = RecordingGeocoder::default();
        let mut cache = LocationCache::new();

        let text = "25,F,10,60,30,10,Paris\n30,M,4,0,0,0,Lyon\n41,F,2,5,5,0,Nice\n";
        let mut transformer =
            Transformer::new(TabularReader::new(text, false), &mut cache, &geocoder);

        assert!(transformer.next_row().await.unwrap().is_ok());
        let err = transformer.next_row().await.unwrap().unwrap_err();
        assert!(matches!(err, PipelineError::DegenerateUsage { line: 2, .. }));
        assert!(transformer.next_row().await.is_none());
        assert_eq!(transformer.emitted(), 1);

        assert_eq!(*geocoder.seen.lock().unwrap(), vec!["Paris"]);
    }
}
