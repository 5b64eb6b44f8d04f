use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::schema::processing_results;

/// Summary of the most recent processing run for a filing
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = processing_results)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProcessingResult {
    pub id: i32,
    pub filing_id: i32,
    pub processing_tier: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub table_count: i32,
    pub section_count: i32,
    pub processing_duration: f64,
    pub result_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// New processing result for insertion
#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = processing_results)]
pub struct NewProcessingResult {
    pub filing_id: i32,
    pub processing_tier: String,
    pub success: bool,
    pub error_message: Option<String>,
    pub table_count: i32,
    pub section_count: i32,
    pub processing_duration: f64,
    pub result_data: Option<serde_json::Value>,
}

impl ProcessingResult {
    /// Load all results created within a calendar day (UTC)
    pub async fn for_date(
        pool: &crate::database::DatabasePool,
        date: chrono::NaiveDate,
    ) -> crate::error::AppResult<Vec<Self>> {
        use crate::schema::processing_results::dsl;

        let mut conn = pool.get().await?;

        let day_start = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| crate::error::AppError::internal_error("invalid date"))?;
        let day_end = day_start + chrono::Duration::days(1);

        let results = dsl::processing_results
            .filter(dsl::created_at.ge(day_start))
            .filter(dsl::created_at.lt(day_end))
            .load::<Self>(&mut conn)
            .await?;

        Ok(results)
    }

    /// Delete results older than the cutoff
    pub async fn cleanup_older_than(
        pool: &crate::database::DatabasePool,
        cutoff: DateTime<Utc>,
    ) -> crate::error::AppResult<usize> {
        use crate::schema::processing_results::dsl;

        let mut conn = pool.get().await?;

        let deleted = diesel::delete(dsl::processing_results.filter(dsl::created_at.lt(cutoff)))
            .execute(&mut conn)
            .await?;

        Ok(deleted)
    }
}
