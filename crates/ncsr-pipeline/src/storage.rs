use bigdecimal::BigDecimal;
use chrono::{NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use std::str::FromStr;
use tracing::{debug, info};

use ncsr_core::models::{
    NewFundMetadata, NewNcsrSection, NewNcsrTable, NewNcsrTableRow, NewProcessingMetricsDaily,
    NewProcessingResult, NewXbrlFact, ProcessingMetricsDaily, ProcessingResult,
};
use ncsr_core::schema::{
    dead_letter_queue, filings, fund_metadata, ncsr_sections, ncsr_table_rows, ncsr_tables,
    processing_results, xbrl_facts,
};
use ncsr_core::{AppError, AppResult, DatabasePool, DeadLetterEntry, Filing, UpdateFiling};

use crate::parser::{FundProfile, ParseResult};

/// **Persistence Layer**
///
/// Writes a parse result into the granular schema inside one transaction:
/// the filing row update, fund metadata, sections, tables with their
/// long-form rows, XBRL facts, and the run summary. Any failure rolls the
/// whole write back; no half-written filings reach the database.
#[derive(Debug, Clone)]
pub struct PersistenceLayer {
    pool: DatabasePool,
}

/// Counts from a retention sweep
#[derive(Debug, Clone, Default)]
pub struct CleanupSummary {
    pub filings_deleted: usize,
    pub results_deleted: usize,
    pub dlq_entries_deleted: usize,
}

impl PersistenceLayer {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Persist a parse result for a filing.
    ///
    /// The filing row is marked completed iff the parse succeeded; child
    /// rows are written only on success. Header-derived fields fill in only
    /// where the filing row is currently null, so a retry never clobbers
    /// metadata from an earlier, fuller parse.
    pub async fn save(
        &self,
        filing_id: i32,
        result: &ParseResult,
        tier: ncsr_core::ProcessingTier,
        duration_secs: f64,
    ) -> AppResult<()> {
        let mut conn = self.pool.get().await?;
        let now = Utc::now();

        let result_data = serde_json::to_value(result)?;

        conn.transaction::<(), AppError, _>(|conn| {
            async move {
                let filing: Filing = filings::table
                    .filter(filings::id.eq(filing_id))
                    .first(conn)
                    .await?;

                let status = if result.success {
                    "completed"
                } else {
                    "failed"
                };
                let metadata = result.metadata.as_ref();

                // Header-derived fields only fill in where the row is
                // currently null; a lighter retry never clobbers them
                let update = UpdateFiling {
                    processing_status: Some(status.to_string()),
                    processing_tier: Some(tier.to_string()),
                    parsing_strategy: result.strategy.map(|s| s.to_string()),
                    sgml_parsed: Some(result.sgml_parsed),
                    xbrl_parsed: Some(result.xbrl_parsed),
                    sgml_parsing_time: result.timings.sgml,
                    xbrl_parsing_time: result.timings.xbrl,
                    html_parsing_time: result.timings.html,
                    xbrl_facts_count: Some(result.xbrl_facts.len() as i32),
                    period_of_report: filing
                        .period_of_report
                        .or_else(|| metadata.and_then(|m| m.period_of_report)),
                    acceptance_datetime: filing
                        .acceptance_datetime
                        .or_else(|| metadata.and_then(|m| m.acceptance_datetime)),
                    sic: filing
                        .sic
                        .clone()
                        .or_else(|| metadata.and_then(|m| m.sic.clone())),
                    state_of_incorporation: filing
                        .state_of_incorporation
                        .clone()
                        .or_else(|| metadata.and_then(|m| m.state_of_incorporation.clone())),
                    fiscal_year_end: filing
                        .fiscal_year_end
                        .clone()
                        .or_else(|| metadata.and_then(|m| m.fiscal_year_end.clone())),
                    business_address: filing
                        .business_address
                        .clone()
                        .or_else(|| metadata.and_then(|m| m.business_address.clone())),
                    business_phone: filing
                        .business_phone
                        .clone()
                        .or_else(|| metadata.and_then(|m| m.business_phone.clone())),
                    file_size_mb: None,
                    updated_at: Some(now),
                };

                diesel::update(filings::table.filter(filings::id.eq(filing_id)))
                    .set(&update)
                    .execute(conn)
                    .await?;

                if result.success {
                    if let Some(fund) = &result.fund {
                        let new_metadata = fund_metadata_row(filing_id, fund, result)?;
                        diesel::delete(
                            fund_metadata::table.filter(fund_metadata::filing_id.eq(filing_id)),
                        )
                        .execute(conn)
                        .await?;
                        diesel::insert_into(fund_metadata::table)
                            .values(&new_metadata)
                            .execute(conn)
                            .await?;
                    }

                    let sections: Vec<NewNcsrSection> = result
                        .sections
                        .iter()
                        .map(|s| NewNcsrSection {
                            filing_id,
                            section_name: s.section_name.clone(),
                            section_type: s.section_type.clone(),
                            text_clean: s.text_clean.clone(),
                            word_count: s.word_count as i32,
                        })
                        .collect();
                    if !sections.is_empty() {
                        diesel::insert_into(ncsr_sections::table)
                            .values(&sections)
                            .execute(conn)
                            .await?;
                    }

                    for table in &result.tables {
                        let new_table = NewNcsrTable {
                            filing_id,
                            table_type: table.table_type.clone(),
                            caption: table.caption.clone(),
                            table_html: table.table_html.clone(),
                            row_count: table.row_count,
                            column_count: table.column_count,
                        };
                        // Flush the table first to obtain its id for the rows
                        let table_id: i32 = diesel::insert_into(ncsr_tables::table)
                            .values(&new_table)
                            .returning(ncsr_tables::id)
                            .get_result(conn)
                            .await?;

                        let rows: Vec<NewNcsrTableRow> = table
                            .rows
                            .iter()
                            .map(|r| NewNcsrTableRow {
                                table_id,
                                row_index: r.row_index,
                                col_name: r.col_name.clone(),
                                col_value: r.col_value.clone(),
                                col_type: r.col_type.clone(),
                            })
                            .collect();
                        if !rows.is_empty() {
                            diesel::insert_into(ncsr_table_rows::table)
                                .values(&rows)
                                .execute(conn)
                                .await?;
                        }
                    }

                    let facts: Vec<NewXbrlFact> = result
                        .xbrl_facts
                        .iter()
                        .map(|f| NewXbrlFact {
                            filing_id,
                            concept: f.concept.chars().take(255).collect(),
                            value: f.value.clone(),
                            unit_ref: f.unit_ref.clone(),
                            context_ref: f.context_ref.clone(),
                            period_start_date: f.period_start,
                            period_end_date: f.period_end,
                            period_instant: f.period_instant,
                            entity_identifier: f.entity_identifier.clone(),
                            decimals: f.decimals,
                            scale: f.scale,
                            precision: f.precision,
                            additional_attributes: if f.additional_attributes.is_empty() {
                                None
                            } else {
                                Some(serde_json::Value::Object(f.additional_attributes.clone()))
                            },
                        })
                        .collect();
                    if !facts.is_empty() {
                        diesel::insert_into(xbrl_facts::table)
                            .values(&facts)
                            .execute(conn)
                            .await?;
                    }
                }

                let summary = NewProcessingResult {
                    filing_id,
                    processing_tier: tier.to_string(),
                    success: result.success,
                    error_message: result.error.clone(),
                    table_count: result.tables.len() as i32,
                    section_count: result.sections.len() as i32,
                    processing_duration: duration_secs,
                    result_data: Some(result_data),
                };
                diesel::insert_into(processing_results::table)
                    .values(&summary)
                    .on_conflict(processing_results::filing_id)
                    .do_update()
                    .set((
                        processing_results::processing_tier.eq(summary.processing_tier.clone()),
                        processing_results::success.eq(summary.success),
                        processing_results::error_message.eq(summary.error_message.clone()),
                        processing_results::table_count.eq(summary.table_count),
                        processing_results::section_count.eq(summary.section_count),
                        processing_results::processing_duration.eq(summary.processing_duration),
                        processing_results::result_data.eq(summary.result_data.clone()),
                        processing_results::created_at.eq(now),
                    ))
                    .execute(conn)
                    .await?;

                Ok(())
            }
            .scope_boxed()
        })
        .await?;

        debug!(filing_id, "Saved granular processing result");
        Ok(())
    }

    /// Recompute the persisted daily aggregate from the run summaries
    pub async fn daily_metrics(&self, date: NaiveDate) -> AppResult<ProcessingMetricsDaily> {
        let results = ProcessingResult::for_date(&self.pool, date).await?;

        let total = results.len() as i32;
        let successful = results.iter().filter(|r| r.success).count() as i32;
        let failed = total - successful;
        let total_duration: f64 = results.iter().map(|r| r.processing_duration).sum();
        let total_tables: i32 = results.iter().map(|r| r.table_count).sum();

        let dead_lettered = self.dead_lettered_on(date).await?;

        let new_metrics = NewProcessingMetricsDaily {
            date,
            total_files_processed: total,
            successful_files: successful,
            failed_files: failed,
            avg_processing_duration: if total > 0 {
                total_duration / total as f64
            } else {
                0.0
            },
            total_tables_extracted: total_tables,
            dead_lettered,
            success_rate: if total > 0 {
                successful as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        };

        ProcessingMetricsDaily::upsert(&self.pool, &new_metrics).await
    }

    async fn dead_lettered_on(&self, date: NaiveDate) -> AppResult<i32> {
        let mut conn = self.pool.get().await?;

        let day_start = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .ok_or_else(|| AppError::internal_error("invalid date"))?;
        let day_end = day_start + chrono::Duration::days(1);

        let count: i64 = dead_letter_queue::table
            .filter(dead_letter_queue::created_at.ge(day_start))
            .filter(dead_letter_queue::created_at.lt(day_end))
            .count()
            .get_result(&mut conn)
            .await?;

        Ok(count as i32)
    }

    /// Sweep completed/failed filings, old run summaries and exhausted DLQ
    /// entries past the retention window
    pub async fn cleanup(&self, retention_days: i64) -> AppResult<CleanupSummary> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);

        let results_deleted = ProcessingResult::cleanup_older_than(&self.pool, cutoff).await?;
        let filings_deleted = Filing::cleanup_older_than(&self.pool, cutoff).await?;
        let dlq_entries_deleted = DeadLetterEntry::cleanup_older_than(&self.pool, cutoff).await?;

        let summary = CleanupSummary {
            filings_deleted,
            results_deleted,
            dlq_entries_deleted,
        };
        info!(
            filings = summary.filings_deleted,
            results = summary.results_deleted,
            dlq = summary.dlq_entries_deleted,
            "Retention cleanup completed"
        );
        Ok(summary)
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }
}

/// Convert the parsed fund profile into the database row, parsing the
/// numeric strings into decimals
fn fund_metadata_row(
    filing_id: i32,
    fund: &FundProfile,
    result: &ParseResult,
) -> AppResult<NewFundMetadata> {
    let mut raw = serde_json::Map::new();
    for (key, value) in &fund.raw {
        raw.insert(key.clone(), serde_json::Value::String(value.clone()));
    }
    for (key, value) in &result.key_metrics {
        raw.entry(format!("key_metric_{}", key))
            .or_insert_with(|| serde_json::Value::String(value.clone()));
    }

    Ok(NewFundMetadata {
        filing_id,
        fund_name: fund.fund_name.clone(),
        total_net_assets: fund
            .total_net_assets
            .as_deref()
            .and_then(|v| BigDecimal::from_str(v).ok()),
        shares_outstanding: fund.shares_outstanding,
        nav_per_share: fund
            .nav_per_share
            .as_deref()
            .and_then(|v| BigDecimal::from_str(v).ok()),
        expense_ratio: fund
            .expense_ratio
            .as_deref()
            .and_then(|v| BigDecimal::from_str(v).ok()),
        portfolio_date: fund.portfolio_date,
        raw_data: if raw.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(raw))
        },
    })
}
