//! Survey row model.
//!
//! A raw row carries the seven fields of the source file. Enrichment adds the
//! usage total, the three usage shares and the resolved location.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::location::Location;

pub const RAW_FIELD_COUNT: usize = 7;

/// Destination table for enriched rows.
pub const TABLE_NAME: &str = "data";

/// Column names of the enriched row, in staged-file and table order.
pub const ENRICHED_COLUMNS: [&str; 13] = [
    "userAge",
    "userGender",
    "userNumberOfApps",
    "userSocialMediaUsage",
    "userPercentOfSocialMedia",
    "userProductivityAppUsage",
    "userPercentOfProductivityAppUsage",
    "userGamingAppUsage",
    "userPercentOfGamingAppUsage",
    "userTotalAppUsage",
    "userCity",
    "resultState",
    "resultCountry",
];

/// Synthetic primary key column of the destination table.
pub const ID_COLUMN: &str = "userID";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRow {
    pub age: i64,
    pub gender: String,
    pub app_count: i64,
    pub social_media_usage: f64,
    pub productivity_usage: f64,
    pub gaming_usage: f64,
    pub city: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRow {
    pub raw: RawRow,
    pub total_usage: f64,
    pub social_media_share: f64,
    pub productivity_share: f64,
    pub gaming_share: f64,
    pub location: Location,
}

fn parse_int(line: usize, name: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|err| PipelineError::malformed(line, format!("{name} '{value}': {err}")))
}

fn parse_real(line: usize, name: &str, value: &str) -> Result<f64> {
    let parsed = value
        .trim()
        .parse::<f64>()
        .map_err(|err| PipelineError::malformed(line, format!("{name} '{value}': {err}")))?;
    if !parsed.is_finite() {
        return Err(PipelineError::malformed(
            line,
            format!("{name} '{value}' is not a finite number"),
        ));
    }
    Ok(parsed)
}

impl RawRow {
    /// Parses one tokenized source record. `line` is only used for error reporting.
    pub fn parse(line: usize, fields: &[String]) -> Result<Self> {
        if fields.len() != RAW_FIELD_COUNT {
            return Err(PipelineError::malformed(
                line,
                format!(
                    "expected {RAW_FIELD_COUNT} fields, found {}",
                    fields.len()
                ),
            ));
        }

        Ok(Self {
            age: parse_int(line, "age", &fields[0])?,
            gender: fields[1].trim().to_string(),
            app_count: parse_int(line, "app count", &fields[2])?,
            social_media_usage: parse_real(line, "social media usage", &fields[3])?,
            productivity_usage: parse_real(line, "productivity usage", &fields[4])?,
            gaming_usage: parse_real(line, "gaming usage", &fields[5])?,
            city: fields[6].trim().to_string(),
        })
    }

    pub fn total_usage(&self) -> f64 {
        self.social_media_usage + self.productivity_usage + self.gaming_usage
    }

    /// Computes the derived usage fields. The location starts out unresolved.
    pub fn enrich(self, line: usize) -> Result<EnrichedRow> {
        let total = self.total_usage();
        // finite inputs can still overflow to infinity when summed
        if total == 0.0 || !total.is_finite() {
            return Err(PipelineError::DegenerateUsage {
                line,
                city: self.city,
            });
        }

        Ok(EnrichedRow {
            total_usage: total,
            social_media_share: self.social_media_usage / total,
            productivity_share: self.productivity_usage / total,
            gaming_share: self.gaming_usage / total,
            raw: self,
            location: Location::unresolved(),
        })
    }
}

/// Rounds to the 2-decimal precision used for persisted derived fields.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl EnrichedRow {
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Copy with the derived numeric fields rounded for persistence.
    pub fn rounded(&self) -> Self {
        let mut row = self.clone();
        row.total_usage = round2(row.total_usage);
        row.social_media_share = round2(row.social_media_share);
        row.productivity_share = round2(row.productivity_share);
        row.gaming_share = round2(row.gaming_share);
        row
    }

    /// Fields in [`ENRICHED_COLUMNS`] order, derived values with 2 decimals.
    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.raw.age.to_string(),
            self.raw.gender.clone(),
            self.raw.app_count.to_string(),
            self.raw.social_media_usage.to_string(),
            format!("{:.2}", self.social_media_share),
            self.raw.productivity_usage.to_string(),
            format!("{:.2}", self.productivity_share),
            self.raw.gaming_usage.to_string(),
            format!("{:.2}", self.gaming_share),
            format!("{:.2}", self.total_usage),
            self.raw.city.clone(),
            self.location.region.clone(),
            self.location.country.clone(),
        ]
    }

    /// Parses a record written by [`EnrichedRow::to_fields`].
    pub fn from_fields(line: usize, fields: &[String]) -> Result<Self> {
        if fields.len() != ENRICHED_COLUMNS.len() {
            return Err(PipelineError::malformed(
                line,
                format!(
                    "expected {} fields, found {}",
                    ENRICHED_COLUMNS.len(),
                    fields.len()
                ),
            ));
        }

        let raw = RawRow {
            age: parse_int(line, ENRICHED_COLUMNS[0], &fields[0])?,
            gender: fields[1].clone(),
            app_count: parse_int(line, ENRICHED_COLUMNS[2], &fields[2])?,
            social_media_usage: parse_real(line, ENRICHED_COLUMNS[3], &fields[3])?,
            productivity_usage: parse_real(line, ENRICHED_COLUMNS[5], &fields[5])?,
            gaming_usage: parse_real(line, ENRICHED_COLUMNS[7], &fields[7])?,
            city: fields[10].clone(),
        };

        Ok(Self {
            raw,
            social_media_share: parse_real(line, ENRICHED_COLUMNS[4], &fields[4])?,
            productivity_share: parse_real(line, ENRICHED_COLUMNS[6], &fields[6])?,
            gaming_share: parse_real(line, ENRICHED_COLUMNS[8], &fields[8])?,
            total_usage: parse_real(line, ENRICHED_COLUMNS[9], &fields[9])?,
            location: Location::new(fields[11].clone(), fields[12].clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn shares_sum_to_one() {
        let samples = [
            ["25", "F", "12", "120.5", "30", "45.25", "Tacoma"],
            ["61", "M", "3", "0", "0", "0.01", "Seattle"],
            ["19", "F", "40", "1e6", "3.3", "7", "Boise"],
        ];
        for sample in samples {
            let row = RawRow::parse(1, &fields(&sample)).unwrap().enrich(1).unwrap();
            let sum = row.social_media_share + row.productivity_share + row.gaming_share;
            assert!((sum - 1.0).abs() < 1e-6, "sum was {sum}");
        }
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        let err = RawRow::parse(4, &fields(&["25", "F", "12"])).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { line: 4, .. }));
    }

    #[test]
    fn unparseable_number_is_malformed() {
        let err = RawRow::parse(2, &fields(&["x", "F", "12", "1", "1", "1", "Tacoma"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { .. }));

        let err = RawRow::parse(2, &fields(&["20", "F", "12", "NaN", "1", "1", "Tacoma"]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRecord { .. }));
    }

    #[test]
    fn zero_usage_is_degenerate() {
        let raw = RawRow::parse(9, &fields(&["30", "M", "5", "0", "0", "0", "Tacoma"])).unwrap();
        let err = raw.enrich(9).unwrap_err();
        match err {
            PipelineError::DegenerateUsage { line, city } => {
                assert_eq!(line, 9);
                assert_eq!(city, "Tacoma");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn overflowing_total_is_degenerate() {
        let raw = RawRow::parse(
            3,
            &fields(&["25", "F", "5", "1e308", "1e308", "1", "Tacoma"]),
        )
        .unwrap();
        assert!(raw.total_usage().is_infinite());

        let err = raw.enrich(3).unwrap_err();
        assert!(matches!(err, PipelineError::DegenerateUsage { line: 3, .. }));
    }

    #[test]
    fn staged_fields_use_two_decimals() {
        let row = RawRow::parse(1, &fields(&["25", "F", "12", "10", "10", "10", "Tacoma"]))
            .unwrap()
            .enrich(1)
            .unwrap()
            .with_location(Location::new("WA", "USA"));
        let out = row.to_fields();
        assert_eq!(out[4], "0.33");
        assert_eq!(out[9], "30.00");
        assert_eq!(out[11], "WA");

        let parsed = EnrichedRow::from_fields(2, &out).unwrap();
        assert_eq!(parsed, row.rounded());
    }
}
