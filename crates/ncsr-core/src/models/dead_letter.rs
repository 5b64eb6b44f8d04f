use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::filing::ProcessingTier;
use crate::schema::{dead_letter_queue, filings};

/// **Dead Letter Queue Entry**
///
/// At most one row per filing. Tracks why processing failed, how many times a
/// retry has been attempted, and when the next attempt may run. Eligibility,
/// backoff, priority, and the suggested tier are recomputed on every failed
/// attempt.
///
/// State machine per filing:
/// eligible/pending → served (night batch) → removed on success, or back to
/// eligible/exhausted on failure.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = dead_letter_queue)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DeadLetterEntry {
    pub id: i32,
    pub filing_id: i32,
    pub failure_reason: String,
    pub failure_type: String,
    pub original_tier: Option<String>,
    pub file_size_mb: f64,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub retry_eligible: bool,
    pub last_attempt: DateTime<Utc>,
    pub next_retry: Option<DateTime<Utc>>,
    pub suggested_tier: Option<String>,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New dead-letter entry for insertion
#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = dead_letter_queue)]
pub struct NewDeadLetterEntry {
    pub filing_id: i32,
    pub failure_reason: String,
    pub failure_type: String,
    pub original_tier: Option<String>,
    pub file_size_mb: f64,
    pub attempt_count: i32,
    pub retry_eligible: bool,
    pub last_attempt: DateTime<Utc>,
    pub next_retry: Option<DateTime<Utc>>,
    pub suggested_tier: Option<String>,
    pub priority: i32,
}

/// Failure classification, stored on the entry and used by the retry policy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FailureType {
    Timeout,
    Memory,
    Network,
    Parsing,
    Processing,
    FileTooLarge,
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureType::Timeout => write!(f, "timeout"),
            FailureType::Memory => write!(f, "memory"),
            FailureType::Network => write!(f, "network"),
            FailureType::Parsing => write!(f, "parsing"),
            FailureType::Processing => write!(f, "processing"),
            FailureType::FileTooLarge => write!(f, "file_too_large"),
        }
    }
}

impl From<String> for FailureType {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "timeout" => FailureType::Timeout,
            "memory" => FailureType::Memory,
            "network" => FailureType::Network,
            "parsing" => FailureType::Parsing,
            "file_too_large" => FailureType::FileTooLarge,
            _ => FailureType::Processing,
        }
    }
}

/// Retry candidate served to the night batch, joined with its filing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NightBatchItem {
    pub filing_id: i32,
    pub accession_number: String,
    pub cik: String,
    pub company_name: String,
    pub file_size_mb: f64,
    pub attempt_count: i32,
    pub suggested_tier: ProcessingTier,
    pub failure_type: String,
    pub original_tier: Option<String>,
    pub filing_url: Option<String>,
    pub priority: i32,
    pub last_failure_reason: String,
}

/// Aggregate view of the queue for monitoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStatistics {
    pub total_entries: i64,
    pub eligible_for_retry: i64,
    pub ready_for_retry: i64,
}

/// Whether a filing may be retried at all, given its history.
///
/// The limits compound: the attempt ceiling applies everywhere, large files
/// get fewer chances, and memory/parsing failures are cut off earlier.
pub fn retry_eligibility(attempt_count: i32, file_size_mb: f64, failure_type: FailureType) -> bool {
    if attempt_count >= 5 {
        return false;
    }

    if file_size_mb > 100.0 {
        return false;
    }
    if file_size_mb > 50.0 && attempt_count >= 2 {
        return false;
    }

    if failure_type == FailureType::Memory && file_size_mb > 25.0 {
        return false;
    }
    if failure_type == FailureType::Parsing && attempt_count >= 3 {
        return false;
    }

    true
}

/// Exponential backoff: 24h, 48h, 96h, 192h cap
pub fn backoff_hours(attempt_count: i32) -> i64 {
    let exponent = (attempt_count - 1).clamp(0, 31) as u32;
    (24i64.saturating_mul(2i64.saturating_pow(exponent))).min(192)
}

/// Suggest a more conservative tier for the next attempt
pub fn suggest_tier(
    attempt_count: i32,
    file_size_mb: f64,
    failure_type: FailureType,
) -> ProcessingTier {
    if failure_type == FailureType::Memory || file_size_mb > 30.0 {
        ProcessingTier::Minimal
    } else if attempt_count >= 2 || file_size_mb > 15.0 {
        ProcessingTier::Limited
    } else {
        ProcessingTier::Standard
    }
}

/// Retry priority in 1..=5: small files and transient failures first
pub fn calculate_priority(file_size_mb: f64, failure_type: FailureType) -> i32 {
    let mut priority = 1;

    if file_size_mb < 5.0 {
        priority += 2;
    } else if file_size_mb < 15.0 {
        priority += 1;
    }

    match failure_type {
        FailureType::Network => priority += 1,
        FailureType::Memory | FailureType::Timeout => priority -= 1,
        _ => {}
    }

    priority.clamp(1, 5)
}

impl DeadLetterEntry {
    /// Record a failure for a filing.
    ///
    /// Idempotent on filing_id: a second call updates the existing row,
    /// increments the attempt count, and recomputes eligibility, backoff,
    /// priority and the suggested tier. When the entry is no longer
    /// retry-eligible the filing's status flips to dead_letter; the queue is
    /// the only writer of that status.
    pub async fn add_filing(
        pool: &crate::database::DatabasePool,
        filing_id: i32,
        error: &str,
        file_size_mb: f64,
        failure_type: FailureType,
        original_tier: Option<ProcessingTier>,
    ) -> crate::error::AppResult<Self> {
        use crate::schema::dead_letter_queue::dsl;

        let mut conn = pool.get().await?;
        let now = Utc::now();
        let reason: String = error.chars().take(500).collect();

        let entry = conn
            .transaction::<Self, crate::error::AppError, _>(|conn| {
                async move {
                    let existing = dsl::dead_letter_queue
                        .filter(dsl::filing_id.eq(filing_id))
                        .first::<Self>(conn)
                        .await
                        .optional()?;

                    let entry = if let Some(existing) = existing {
                        let attempts = existing.attempt_count + 1;
                        let eligible = retry_eligibility(attempts, file_size_mb, failure_type);
                        let next_retry = eligible
                            .then(|| now + Duration::hours(backoff_hours(attempts)));
                        let suggested = eligible.then(|| {
                            suggest_tier(attempts, file_size_mb, failure_type).to_string()
                        });

                        diesel::update(dsl::dead_letter_queue.filter(dsl::id.eq(existing.id)))
                            .set((
                                dsl::attempt_count.eq(attempts),
                                dsl::last_attempt.eq(now),
                                dsl::failure_reason.eq(&reason),
                                dsl::failure_type.eq(failure_type.to_string()),
                                dsl::file_size_mb.eq(file_size_mb),
                                dsl::retry_eligible.eq(eligible),
                                dsl::next_retry.eq(next_retry),
                                dsl::suggested_tier.eq(suggested),
                                dsl::priority
                                    .eq(calculate_priority(file_size_mb, failure_type)),
                                dsl::updated_at.eq(now),
                            ))
                            .get_result::<Self>(conn)
                            .await?
                    } else {
                        let eligible = retry_eligibility(1, file_size_mb, failure_type);
                        let new_entry = NewDeadLetterEntry {
                            filing_id,
                            failure_reason: reason.clone(),
                            failure_type: failure_type.to_string(),
                            original_tier: original_tier.map(|t| t.to_string()),
                            file_size_mb,
                            attempt_count: 1,
                            retry_eligible: eligible,
                            last_attempt: now,
                            next_retry: eligible.then(|| now + Duration::hours(24)),
                            suggested_tier: eligible.then(|| {
                                suggest_tier(1, file_size_mb, failure_type).to_string()
                            }),
                            priority: calculate_priority(file_size_mb, failure_type),
                        };

                        diesel::insert_into(dsl::dead_letter_queue)
                            .values(&new_entry)
                            .get_result::<Self>(conn)
                            .await?
                    };

                    // Sole writer of the dead_letter status; the persistence
                    // layer never sets it. Entries still eligible for retry
                    // leave the filing marked failed.
                    if !entry.retry_eligible {
                        diesel::update(filings::table.filter(filings::id.eq(filing_id)))
                            .set((
                                filings::processing_status.eq("dead_letter"),
                                filings::updated_at.eq(now),
                            ))
                            .execute(conn)
                            .await?;
                    }

                    Ok(entry)
                }
                .scope_boxed()
            })
            .await?;

        info!(
            filing_id,
            attempt = entry.attempt_count,
            retry_eligible = entry.retry_eligible,
            "Recorded dead-letter entry"
        );

        Ok(entry)
    }

    /// Settle a retry attempt: remove the entry on success, otherwise bump
    /// the attempt count and recompute the retry schedule.
    pub async fn mark_processed(
        pool: &crate::database::DatabasePool,
        filing_id: i32,
        success: bool,
    ) -> crate::error::AppResult<()> {
        use crate::schema::dead_letter_queue::dsl;

        let mut conn = pool.get().await?;
        let now = Utc::now();

        let existing = dsl::dead_letter_queue
            .filter(dsl::filing_id.eq(filing_id))
            .first::<Self>(&mut conn)
            .await
            .optional()?;

        let Some(entry) = existing else {
            return Ok(());
        };

        if success {
            diesel::delete(dsl::dead_letter_queue.filter(dsl::id.eq(entry.id)))
                .execute(&mut conn)
                .await?;
            info!(filing_id, "Removed filing from DLQ after successful retry");
        } else {
            let attempts = entry.attempt_count + 1;
            let failure_type = FailureType::from(entry.failure_type.clone());
            let eligible = retry_eligibility(attempts, entry.file_size_mb, failure_type);
            let next_retry = eligible.then(|| now + Duration::hours(backoff_hours(attempts)));

            diesel::update(dsl::dead_letter_queue.filter(dsl::id.eq(entry.id)))
                .set((
                    dsl::attempt_count.eq(attempts),
                    dsl::last_attempt.eq(now),
                    dsl::retry_eligible.eq(eligible),
                    dsl::next_retry.eq(next_retry),
                    dsl::updated_at.eq(now),
                ))
                .execute(&mut conn)
                .await?;

            if !eligible {
                diesel::update(filings::table.filter(filings::id.eq(filing_id)))
                    .set((
                        filings::processing_status.eq("dead_letter"),
                        filings::updated_at.eq(now),
                    ))
                    .execute(&mut conn)
                    .await?;
            }
            info!(
                filing_id,
                attempt = attempts,
                retry_eligible = eligible,
                "Updated DLQ entry after failed retry"
            );
        }

        Ok(())
    }

    /// Select retry candidates for the night batch.
    ///
    /// Ordering favors high priority, then small files, then fewer attempts,
    /// then age — so cheap, likely-transient failures recover first.
    pub async fn get_night_batch(
        pool: &crate::database::DatabasePool,
        limit: i64,
        max_file_size_mb: f64,
    ) -> crate::error::AppResult<Vec<NightBatchItem>> {
        use crate::schema::dead_letter_queue::dsl;

        let mut conn = pool.get().await?;
        let now = Utc::now();

        type Row = (
            i32,
            f64,
            i32,
            Option<String>,
            String,
            Option<String>,
            i32,
            String,
            String,
            String,
            String,
            Option<String>,
        );

        let rows: Vec<Row> = dsl::dead_letter_queue
            .inner_join(filings::table)
            .filter(dsl::retry_eligible.eq(true))
            .filter(dsl::next_retry.le(now))
            .filter(dsl::attempt_count.lt(dsl::max_attempts))
            .filter(dsl::file_size_mb.le(max_file_size_mb))
            .order((
                dsl::priority.desc(),
                dsl::file_size_mb.asc(),
                dsl::attempt_count.asc(),
                dsl::created_at.asc(),
            ))
            .limit(limit)
            .select((
                dsl::filing_id,
                dsl::file_size_mb,
                dsl::attempt_count,
                dsl::suggested_tier,
                dsl::failure_type,
                dsl::original_tier,
                dsl::priority,
                dsl::failure_reason,
                filings::accession_number,
                filings::cik,
                filings::company_name,
                filings::filing_url,
            ))
            .load(&mut conn)
            .await?;

        let batch = rows
            .into_iter()
            .map(
                |(
                    filing_id,
                    file_size_mb,
                    attempt_count,
                    suggested_tier,
                    failure_type,
                    original_tier,
                    priority,
                    last_failure_reason,
                    accession_number,
                    cik,
                    company_name,
                    filing_url,
                )| NightBatchItem {
                    filing_id,
                    accession_number,
                    cik,
                    company_name,
                    file_size_mb,
                    attempt_count,
                    suggested_tier: ProcessingTier::from(
                        suggested_tier.unwrap_or_else(|| "limited".to_string()),
                    ),
                    failure_type,
                    original_tier,
                    filing_url,
                    priority,
                    last_failure_reason,
                },
            )
            .collect();

        Ok(batch)
    }

    /// Queue totals for monitoring
    pub async fn retry_statistics(
        pool: &crate::database::DatabasePool,
    ) -> crate::error::AppResult<RetryStatistics> {
        use crate::schema::dead_letter_queue::dsl;

        let mut conn = pool.get().await?;
        let now = Utc::now();

        let total_entries: i64 = dsl::dead_letter_queue.count().get_result(&mut conn).await?;
        let eligible_for_retry: i64 = dsl::dead_letter_queue
            .filter(dsl::retry_eligible.eq(true))
            .count()
            .get_result(&mut conn)
            .await?;
        let ready_for_retry: i64 = dsl::dead_letter_queue
            .filter(dsl::retry_eligible.eq(true))
            .filter(dsl::next_retry.le(now))
            .count()
            .get_result(&mut conn)
            .await?;

        Ok(RetryStatistics {
            total_entries,
            eligible_for_retry,
            ready_for_retry,
        })
    }

    /// Delete ineligible entries older than the cutoff
    pub async fn cleanup_older_than(
        pool: &crate::database::DatabasePool,
        cutoff: DateTime<Utc>,
    ) -> crate::error::AppResult<usize> {
        use crate::schema::dead_letter_queue::dsl;

        let mut conn = pool.get().await?;

        let deleted = diesel::delete(
            dsl::dead_letter_queue
                .filter(dsl::retry_eligible.eq(false))
                .filter(dsl::created_at.lt(cutoff)),
        )
        .execute(&mut conn)
        .await?;

        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_eligibility_attempt_ceiling() {
        // REQUIREMENT: Filings are retried at most five times
        assert!(retry_eligibility(4, 1.0, FailureType::Network));
        assert!(!retry_eligibility(5, 1.0, FailureType::Network));
        assert!(!retry_eligibility(6, 1.0, FailureType::Network));
    }

    #[test]
    fn test_retry_eligibility_size_limits() {
        // Very large files are never retried
        assert!(!retry_eligibility(1, 100.1, FailureType::Network));
        // Large files get at most two attempts
        assert!(retry_eligibility(1, 60.0, FailureType::Network));
        assert!(!retry_eligibility(2, 60.0, FailureType::Network));
    }

    #[test]
    fn test_retry_eligibility_failure_type_limits() {
        // Memory failures on files over 25 MB will just fail again
        assert!(retry_eligibility(1, 25.0, FailureType::Memory));
        assert!(!retry_eligibility(1, 25.1, FailureType::Memory));
        // Parsing failures are cut off after three attempts
        assert!(retry_eligibility(2, 1.0, FailureType::Parsing));
        assert!(!retry_eligibility(3, 1.0, FailureType::Parsing));
    }

    #[test]
    fn test_backoff_is_monotonic_and_capped() {
        // REQUIREMENT: Backoff doubles per attempt, 24h .. 192h
        assert_eq!(backoff_hours(1), 24);
        assert_eq!(backoff_hours(2), 48);
        assert_eq!(backoff_hours(3), 96);
        assert_eq!(backoff_hours(4), 192);
        assert_eq!(backoff_hours(5), 192);

        for n in 1..5 {
            assert!(backoff_hours(n) <= backoff_hours(n + 1));
            assert!(backoff_hours(n) <= 192);
        }
    }

    #[test]
    fn test_suggest_tier() {
        // Memory failures and big files drop straight to minimal
        assert_eq!(
            suggest_tier(1, 1.0, FailureType::Memory),
            ProcessingTier::Minimal
        );
        assert_eq!(
            suggest_tier(1, 31.0, FailureType::Timeout),
            ProcessingTier::Minimal
        );
        // Repeat offenders and mid-size files get limited
        assert_eq!(
            suggest_tier(2, 1.0, FailureType::Network),
            ProcessingTier::Limited
        );
        assert_eq!(
            suggest_tier(1, 16.0, FailureType::Network),
            ProcessingTier::Limited
        );
        // First failure on a small file retries at standard
        assert_eq!(
            suggest_tier(1, 1.0, FailureType::Network),
            ProcessingTier::Standard
        );
    }

    #[test]
    fn test_priority_formula() {
        // Small file + network failure: 1 + 2 + 1 = 4
        assert_eq!(calculate_priority(2.0, FailureType::Network), 4);
        // Mid-size file, neutral failure: 1 + 1 = 2
        assert_eq!(calculate_priority(10.0, FailureType::Processing), 2);
        // Large file + memory failure clamps at the floor
        assert_eq!(calculate_priority(40.0, FailureType::Memory), 1);
        // Everything is clamped into 1..=5
        for size in [0.5, 4.9, 14.9, 30.0, 120.0] {
            for ft in [
                FailureType::Timeout,
                FailureType::Memory,
                FailureType::Network,
                FailureType::Parsing,
                FailureType::Processing,
                FailureType::FileTooLarge,
            ] {
                let p = calculate_priority(size, ft);
                assert!((1..=5).contains(&p));
            }
        }
    }

    #[test]
    fn test_failure_type_round_trip() {
        for ft in [
            FailureType::Timeout,
            FailureType::Memory,
            FailureType::Network,
            FailureType::Parsing,
            FailureType::Processing,
            FailureType::FileTooLarge,
        ] {
            assert_eq!(FailureType::from(ft.to_string()), ft);
        }
        assert_eq!(
            FailureType::from("unknown".to_string()),
            FailureType::Processing
        );
    }
}
