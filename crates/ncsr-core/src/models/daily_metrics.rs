use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::schema::processing_metrics_daily;

/// Persisted daily aggregate, recomputed from processing_results rows
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = processing_metrics_daily)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProcessingMetricsDaily {
    pub id: i32,
    pub date: NaiveDate,
    pub total_files_processed: i32,
    pub successful_files: i32,
    pub failed_files: i32,
    pub avg_processing_duration: f64,
    pub total_tables_extracted: i32,
    pub dead_lettered: i32,
    pub success_rate: f64,
    pub created_at: DateTime<Utc>,
}

/// New daily aggregate for upsert
#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = processing_metrics_daily)]
pub struct NewProcessingMetricsDaily {
    pub date: NaiveDate,
    pub total_files_processed: i32,
    pub successful_files: i32,
    pub failed_files: i32,
    pub avg_processing_duration: f64,
    pub total_tables_extracted: i32,
    pub dead_lettered: i32,
    pub success_rate: f64,
}

impl ProcessingMetricsDaily {
    /// Upsert the aggregate row for a date
    pub async fn upsert(
        pool: &crate::database::DatabasePool,
        new_metrics: &NewProcessingMetricsDaily,
    ) -> crate::error::AppResult<Self> {
        use crate::schema::processing_metrics_daily::dsl;

        let mut conn = pool.get().await?;

        let metrics = diesel::insert_into(dsl::processing_metrics_daily)
            .values(new_metrics)
            .on_conflict(dsl::date)
            .do_update()
            .set((
                dsl::total_files_processed.eq(new_metrics.total_files_processed),
                dsl::successful_files.eq(new_metrics.successful_files),
                dsl::failed_files.eq(new_metrics.failed_files),
                dsl::avg_processing_duration.eq(new_metrics.avg_processing_duration),
                dsl::total_tables_extracted.eq(new_metrics.total_tables_extracted),
                dsl::dead_lettered.eq(new_metrics.dead_lettered),
                dsl::success_rate.eq(new_metrics.success_rate),
            ))
            .get_result::<Self>(&mut conn)
            .await?;

        Ok(metrics)
    }

    /// Load the aggregate row for a date, if present
    pub async fn for_date(
        pool: &crate::database::DatabasePool,
        date: NaiveDate,
    ) -> crate::error::AppResult<Option<Self>> {
        use crate::schema::processing_metrics_daily::dsl;

        let mut conn = pool.get().await?;

        let metrics = dsl::processing_metrics_daily
            .filter(dsl::date.eq(date))
            .first::<Self>(&mut conn)
            .await
            .optional()?;

        Ok(metrics)
    }
}
