use anyhow::{Context, Result};
use rusqlite::params;

use crate::db::{connection::Database, migrations::run_migrations};
use crate::models::EnrichedRow;

const INSERT_ENRICHED_ROW: &str = "INSERT INTO data (
        userAge,
        userGender,
        userNumberOfApps,
        userSocialMediaUsage,
        userPercentOfSocialMedia,
        userProductivityAppUsage,
        userPercentOfProductivityAppUsage,
        userGamingAppUsage,
        userPercentOfGamingAppUsage,
        userTotalAppUsage,
        userCity,
        resultState,
        resultCountry
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

impl Database {
    /// Creates the `data` table if it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.execute(|conn| run_migrations(conn)).await
    }

    /// Inserts `rows` in one transaction. Derived fields are rounded to 2 decimals.
    pub async fn insert_enriched_rows(&self, rows: Vec<EnrichedRow>) -> Result<usize> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;

            {
                let mut stmt = tx
                    .prepare_cached(INSERT_ENRICHED_ROW)
                    .context("failed to prepare insert")?;
                for row in rows.iter().map(EnrichedRow::rounded) {
                    stmt.execute(params![
                        row.raw.age,
                        row.raw.gender,
                        row.raw.app_count,
                        row.raw.social_media_usage,
                        row.social_media_share,
                        row.raw.productivity_usage,
                        row.productivity_share,
                        row.raw.gaming_usage,
                        row.gaming_share,
                        row.total_usage,
                        row.raw.city,
                        row.location.region,
                        row.location.country,
                    ])
                    .with_context(|| format!("failed to insert row for city '{}'", row.raw.city))?;
                }
            }

            tx.commit().context("failed to commit batch")?;
            Ok(rows.len())
        })
        .await
    }

    pub async fn count_enriched_rows(&self) -> Result<u64> {
        self.execute(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM data", [], |row| row.get(0))
                .context("failed to count rows")?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
        .await
    }
}
