use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use ncsr_core::{
    AppError, AppResult, DatabasePool, DeadLetterEntry, FailureType, Filing, NewFiling,
    NightBatchItem, ProcessingStatus, ProcessingTier, Settings,
};

use crate::discovery::{DailyFeed, FilingDescriptor};
use crate::fetcher::SecHttpClient;
use crate::metrics::ProcessingMetrics;
use crate::parser::{FilingParser, ParseResult};
use crate::rate_limiter::RateLimiter;
use crate::storage::PersistenceLayer;
use crate::tier::TierRouter;
use crate::utils::{build_filing_text_url, bytes_to_mb};

/// Outcome of one filing attempt, for the per-date summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilingOutcome {
    Completed,
    Failed,
    DeadLettered,
}

/// Per-date processing summary
#[derive(Debug, Clone, Default)]
pub struct DateSummary {
    pub discovered: usize,
    pub already_known: usize,
    pub attempted: usize,
    pub completed: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// Night-batch summary
#[derive(Debug, Clone, Default)]
pub struct NightBatchSummary {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub duration_secs: f64,
}

/// **Tiered Processor**
///
/// The orchestrator: discovers filings for a date, filters out the ones
/// already persisted, and drives each new one through route → fetch → parse
/// (under the tier's timeout) → persist. Every filing runs inside a fault
/// boundary; a failure is recorded in the dead-letter queue and the loop
/// moves on. Night-batch mode replays retry candidates at their suggested
/// tier.
pub struct TieredProcessor {
    pool: DatabasePool,
    settings: Settings,
    client: SecHttpClient,
    feed: DailyFeed,
    router: TierRouter,
    parser: FilingParser,
    storage: PersistenceLayer,
    metrics: ProcessingMetrics,
}

impl TieredProcessor {
    pub fn new(pool: DatabasePool, settings: Settings) -> AppResult<Self> {
        let rate_limiter = RateLimiter::new(settings.rate_limit_delay)?;
        let client = SecHttpClient::new(&settings.sec_user_agent, rate_limiter)?;
        let feed = DailyFeed::new(client.clone());
        let router = TierRouter::from_settings(&settings)?;
        let storage = PersistenceLayer::new(pool.clone());

        Ok(Self {
            pool,
            settings,
            client,
            feed,
            router,
            parser: FilingParser::new(),
            storage,
            metrics: ProcessingMetrics::default(),
        })
    }

    /// Process every new filing for a date, in master-index order
    pub async fn process_date(
        &mut self,
        date: NaiveDate,
        form_types: &[String],
        max_filings: Option<usize>,
    ) -> AppResult<DateSummary> {
        info!(%date, "Starting processing for date");
        let mut summary = DateSummary::default();

        let descriptors = self.feed.filings_for_date(date, form_types).await?;
        summary.discovered = descriptors.len();
        if descriptors.is_empty() {
            info!(%date, "No filings discovered");
            return Ok(summary);
        }

        let accessions: Vec<String> = descriptors
            .iter()
            .map(|d| d.accession_number.clone())
            .collect();
        let existing = Filing::existing_accessions(&self.pool, &accessions).await?;
        summary.already_known = existing.len();

        let mut new_filings: Vec<FilingDescriptor> = descriptors
            .into_iter()
            .filter(|d| !existing.contains(&d.accession_number))
            .collect();
        if let Some(cap) = max_filings {
            new_filings.truncate(cap);
        }
        info!(count = new_filings.len(), "Processing new filings");

        for (index, descriptor) in new_filings.iter().enumerate() {
            summary.attempted += 1;
            match self.process_descriptor(descriptor).await {
                Ok(FilingOutcome::Completed) => summary.completed += 1,
                Ok(FilingOutcome::Failed) => summary.failed += 1,
                Ok(FilingOutcome::DeadLettered) => summary.dead_lettered += 1,
                Err(e) => {
                    // The fault boundary: a filing that could not even be
                    // recorded must not abort the date
                    e.log_with_context("process_date item");
                    summary.failed += 1;
                }
            }

            if (index + 1) % 10 == 0 {
                info!(
                    processed = index + 1,
                    total = new_filings.len(),
                    "Batch progress"
                );
            }
        }

        match self.storage.daily_metrics(date).await {
            Ok(aggregate) => info!(
                %date,
                total = aggregate.total_files_processed,
                successful = aggregate.successful_files,
                failed = aggregate.failed_files,
                "Daily aggregate updated"
            ),
            Err(e) => e.log_with_context("daily metrics"),
        }
        info!(report = %self.metrics.daily_report(), "Daily summary");

        Ok(summary)
    }

    /// Process one discovered filing inside the fault boundary
    async fn process_descriptor(
        &mut self,
        descriptor: &FilingDescriptor,
    ) -> AppResult<FilingOutcome> {
        let size_mb = match self.client.content_length(&descriptor.filing_url).await {
            Ok(Some(bytes)) => bytes_to_mb(bytes),
            Ok(None) => 0.0,
            Err(_) => 0.0,
        };

        let new_filing = NewFiling {
            accession_number: descriptor.accession_number.clone(),
            cik: descriptor.cik.clone(),
            company_name: descriptor.company_name.clone(),
            form_type: descriptor.form_type.clone(),
            filing_date: descriptor.filing_date,
            file_size_mb: size_mb,
            filing_url: Some(descriptor.filing_url.clone()),
        };
        let filing = Filing::create_or_update(&self.pool, &new_filing).await?;

        let tier = self.router.tier_for(size_mb);
        Filing::set_processing_state(&self.pool, filing.id, tier, ProcessingStatus::Processing)
            .await?;

        if tier == ProcessingTier::DeadLetter {
            // Never attempted: straight to the queue, no body fetch
            let reason = format!(
                "File too large for processing: {:.1}MB > {:.1}MB",
                size_mb,
                self.router.large_threshold()
            );
            DeadLetterEntry::add_filing(
                &self.pool,
                filing.id,
                &reason,
                size_mb,
                FailureType::FileTooLarge,
                Some(tier),
            )
            .await?;
            self.metrics.record_failure();
            warn!(
                accession = %descriptor.accession_number,
                size_mb,
                "Routed oversized filing to dead-letter queue"
            );
            return Ok(FilingOutcome::DeadLettered);
        }

        match self
            .attempt_filing(filing.id, &descriptor.filing_url, tier)
            .await
        {
            Ok(outcome) => {
                if outcome.success {
                    self.metrics
                        .record_success(tier, outcome.duration_secs, size_mb);
                    info!(
                        accession = %descriptor.accession_number,
                        %tier,
                        duration_secs = outcome.duration_secs,
                        "Processed filing"
                    );
                    Ok(FilingOutcome::Completed)
                } else {
                    let reason = outcome
                        .error
                        .unwrap_or_else(|| "parse produced no result".to_string());
                    self.record_failure(
                        filing.id,
                        size_mb,
                        tier,
                        FailureType::Parsing,
                        &reason,
                        false,
                    )
                    .await?;
                    Ok(FilingOutcome::Failed)
                }
            }
            Err(e) => {
                let failure_type = classify_failure(&e);
                self.record_failure(filing.id, size_mb, tier, failure_type, &e.to_string(), true)
                    .await?;
                Ok(FilingOutcome::Failed)
            }
        }
    }

    /// Drain retry candidates from the dead-letter queue, each at its
    /// suggested tier
    pub async fn process_night_batch(&mut self, batch_size: usize) -> AppResult<NightBatchSummary> {
        info!(batch_size, "Starting night batch processing");
        let started = Instant::now();

        let batch = DeadLetterEntry::get_night_batch(
            &self.pool,
            batch_size as i64,
            self.settings.dlq_max_file_size_mb,
        )
        .await?;

        let mut summary = NightBatchSummary {
            processed: batch.len(),
            ..NightBatchSummary::default()
        };
        if batch.is_empty() {
            info!("No filings available for night batch processing");
            return Ok(summary);
        }

        for item in &batch {
            match self.retry_item(item).await {
                Ok(true) => {
                    summary.successful += 1;
                    info!(filing_id = item.filing_id, "Night batch: reprocessed filing");
                }
                Ok(false) => {
                    summary.failed += 1;
                    warn!(filing_id = item.filing_id, "Night batch: filing failed again");
                }
                Err(e) => {
                    summary.failed += 1;
                    e.log_with_context("night batch item");
                    if let Err(mark_err) =
                        DeadLetterEntry::mark_processed(&self.pool, item.filing_id, false).await
                    {
                        mark_err.log_with_context("night batch bookkeeping");
                    }
                }
            }
        }

        summary.duration_secs = started.elapsed().as_secs_f64();
        info!(
            processed = summary.processed,
            successful = summary.successful,
            failed = summary.failed,
            duration_secs = summary.duration_secs,
            "Night batch completed"
        );
        Ok(summary)
    }

    async fn retry_item(&mut self, item: &NightBatchItem) -> AppResult<bool> {
        let tier = item.suggested_tier;
        let url = item
            .filing_url
            .clone()
            .unwrap_or_else(|| build_filing_text_url(&item.cik, &item.accession_number));

        // failed → processing is the one permitted backwards transition
        Filing::set_processing_state(&self.pool, item.filing_id, tier, ProcessingStatus::Processing)
            .await?;

        match self.attempt_filing(item.filing_id, &url, tier).await {
            Ok(outcome) if outcome.success => {
                DeadLetterEntry::mark_processed(&self.pool, item.filing_id, true).await?;
                self.metrics
                    .record_success(tier, outcome.duration_secs, item.file_size_mb);
                Ok(true)
            }
            Ok(_) => {
                DeadLetterEntry::mark_processed(&self.pool, item.filing_id, false).await?;
                Ok(false)
            }
            Err(e) => {
                e.log_with_context("night batch retry");
                Filing::set_processing_state(
                    &self.pool,
                    item.filing_id,
                    tier,
                    ProcessingStatus::Failed,
                )
                .await?;
                DeadLetterEntry::mark_processed(&self.pool, item.filing_id, false).await?;
                Ok(false)
            }
        }
    }

    /// Fetch, parse under the tier timeout, and persist one filing
    async fn attempt_filing(
        &self,
        filing_id: i32,
        url: &str,
        tier: ProcessingTier,
    ) -> AppResult<AttemptOutcome> {
        let content = self.client.get_text(url).await?;

        let started = Instant::now();
        let parse_result = self
            .parse_with_timeout(content, tier, self.router.timeout_for(tier))
            .await?;
        let duration_secs = started.elapsed().as_secs_f64();

        self.storage
            .save(filing_id, &parse_result, tier, duration_secs)
            .await?;

        Ok(AttemptOutcome {
            success: parse_result.success,
            duration_secs,
            error: parse_result.error,
        })
    }

    /// Run the CPU-bound parse off the async runtime, bounded by the tier
    /// timeout. On timeout the parse task is abandoned; the transaction only
    /// opens after a parse returns, so no partial rows can exist.
    async fn parse_with_timeout(
        &self,
        content: String,
        tier: ProcessingTier,
        timeout: Duration,
    ) -> AppResult<ParseResult> {
        let parser = self.parser.clone();
        let handle = tokio::task::spawn_blocking(move || parser.parse(&content, tier));

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AppError::internal_error(format!(
                "Parse task failed: {}",
                join_error
            ))),
            Err(_) => Err(AppError::Timeout {
                operation: format!("{} tier parse", tier),
                seconds: timeout.as_secs(),
            }),
        }
    }

    /// Record a failed attempt: mark the filing failed, enqueue (or bump)
    /// the dead-letter entry, and log. `mark_failed` is false when the
    /// persistence layer already wrote the failed status with the summary.
    async fn record_failure(
        &mut self,
        filing_id: i32,
        size_mb: f64,
        tier: ProcessingTier,
        failure_type: FailureType,
        reason: &str,
        mark_failed: bool,
    ) -> AppResult<()> {
        if mark_failed {
            Filing::set_processing_state(&self.pool, filing_id, tier, ProcessingStatus::Failed)
                .await?;
        }
        DeadLetterEntry::add_filing(
            &self.pool,
            filing_id,
            reason,
            size_mb,
            failure_type,
            Some(tier),
        )
        .await?;
        self.metrics.record_failure();
        warn!(filing_id, %failure_type, reason, "Filing routed to dead-letter queue");
        Ok(())
    }

    /// Snapshot of the in-memory counters
    pub fn metrics(&self) -> ProcessingMetrics {
        self.metrics.clone()
    }

    /// Retention sweep across filings, summaries, and queue entries
    pub async fn cleanup(&self, retention_days: i64) -> AppResult<crate::storage::CleanupSummary> {
        self.storage.cleanup(retention_days).await
    }
}

/// Outcome of a fetch-parse-persist attempt
#[derive(Debug, Clone)]
struct AttemptOutcome {
    success: bool,
    duration_secs: f64,
    error: Option<String>,
}

/// Map an error to the dead-letter failure taxonomy
pub fn classify_failure(error: &AppError) -> FailureType {
    match error {
        AppError::Timeout { .. } => FailureType::Timeout,
        AppError::OutOfMemory(_) => FailureType::Memory,
        AppError::ExternalApiError(_) | AppError::NotFound(_) => FailureType::Network,
        AppError::ParserError(_) => FailureType::Parsing,
        _ => FailureType::Processing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_failure() {
        // REQUIREMENT: Errors map onto the dead-letter failure taxonomy
        assert_eq!(
            classify_failure(&AppError::Timeout {
                operation: "standard tier parse".to_string(),
                seconds: 300
            }),
            FailureType::Timeout
        );
        assert_eq!(
            classify_failure(&AppError::OutOfMemory("reserve failed".to_string())),
            FailureType::Memory
        );
        assert_eq!(
            classify_failure(&AppError::ExternalApiError("HTTP 503".to_string())),
            FailureType::Network
        );
        assert_eq!(
            classify_failure(&AppError::NotFound("gone".to_string())),
            FailureType::Network
        );
        assert_eq!(
            classify_failure(&AppError::ParserError("bad xml".to_string())),
            FailureType::Parsing
        );
        assert_eq!(
            classify_failure(&AppError::internal_error("anything else")),
            FailureType::Processing
        );
    }
}
