use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use validator::Validate;

use crate::schema::filings;

/// **Filing Model**
///
/// One row per unique SEC accession number. Carries the header metadata
/// extracted from the filing and the processing state the pipeline moves
/// through (pending → processing → completed/failed, with dead_letter
/// reserved for filings the queue declared unprocessable).
///
/// # Database Schema
/// Maps to the `filings` table. `accession_number` is the natural unique key;
/// all child tables cascade from `id`.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = filings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Filing {
    /// Surrogate primary key; children reference this id
    pub id: i32,

    /// SEC accession number, format `\d{10}-\d{2}-\d{6}`
    pub accession_number: String,

    /// Central Index Key as it appeared in the master index (leading zeros kept)
    pub cik: String,

    /// Company name from the master index or the SEC header
    pub company_name: String,

    /// SEC form type (N-CSR, N-CSRS)
    pub form_type: String,

    /// Date the filing was submitted
    pub filing_date: NaiveDate,

    /// Reporting period the filing covers
    pub period_of_report: Option<NaiveDate>,

    /// Timestamp the SEC accepted the submission
    pub acceptance_datetime: Option<DateTime<Utc>>,

    /// Standard Industrial Classification code
    pub sic: Option<String>,

    /// Two-letter state of incorporation
    pub state_of_incorporation: Option<String>,

    /// Fiscal year end, MMDD
    pub fiscal_year_end: Option<String>,

    /// Business address from the SEC header
    pub business_address: Option<String>,

    /// Business phone from the SEC header
    pub business_phone: Option<String>,

    /// Reported size of the filing text in megabytes
    pub file_size_mb: f64,

    /// Source URL the filing body was fetched from
    pub filing_url: Option<String>,

    /// Processing status: pending, processing, completed, failed, dead_letter
    pub processing_status: String,

    /// Tier chosen by the router; null only while status is pending
    pub processing_tier: Option<String>,

    /// Parsing strategy the pipeline selected: sgml_only, xbrl_only, hybrid
    pub parsing_strategy: Option<String>,

    /// Whether the SGML sub-parser succeeded
    pub sgml_parsed: bool,

    /// Whether the XBRL sub-parser succeeded
    pub xbrl_parsed: bool,

    /// Per-parser wall-clock timings in seconds
    pub sgml_parsing_time: Option<f64>,
    pub xbrl_parsing_time: Option<f64>,
    pub html_parsing_time: Option<f64>,

    /// Number of inline XBRL facts extracted
    pub xbrl_facts_count: Option<i32>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New filing for insertion, keyed by accession number
#[derive(Debug, Clone, Insertable, Validate, Deserialize)]
#[diesel(table_name = filings)]
pub struct NewFiling {
    #[validate(length(min = 1, max = 32))]
    pub accession_number: String,
    #[validate(length(min = 1, max = 20))]
    pub cik: String,
    #[validate(length(min = 1, max = 512))]
    pub company_name: String,
    #[validate(length(min = 1, max = 32))]
    pub form_type: String,
    pub filing_date: NaiveDate,
    pub file_size_mb: f64,
    pub filing_url: Option<String>,
}

/// Filing update model used by the persistence layer after a parse
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = filings)]
pub struct UpdateFiling {
    pub processing_status: Option<String>,
    pub processing_tier: Option<String>,
    pub parsing_strategy: Option<String>,
    pub sgml_parsed: Option<bool>,
    pub xbrl_parsed: Option<bool>,
    pub sgml_parsing_time: Option<f64>,
    pub xbrl_parsing_time: Option<f64>,
    pub html_parsing_time: Option<f64>,
    pub xbrl_facts_count: Option<i32>,
    pub period_of_report: Option<NaiveDate>,
    pub acceptance_datetime: Option<DateTime<Utc>>,
    pub sic: Option<String>,
    pub state_of_incorporation: Option<String>,
    pub fiscal_year_end: Option<String>,
    pub business_address: Option<String>,
    pub business_phone: Option<String>,
    pub file_size_mb: Option<f64>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Processing status enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    DeadLetter,
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingStatus::Pending => write!(f, "pending"),
            ProcessingStatus::Processing => write!(f, "processing"),
            ProcessingStatus::Completed => write!(f, "completed"),
            ProcessingStatus::Failed => write!(f, "failed"),
            ProcessingStatus::DeadLetter => write!(f, "dead_letter"),
        }
    }
}

impl From<String> for ProcessingStatus {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "processing" => ProcessingStatus::Processing,
            "completed" => ProcessingStatus::Completed,
            "failed" => ProcessingStatus::Failed,
            "dead_letter" => ProcessingStatus::DeadLetter,
            _ => ProcessingStatus::Pending,
        }
    }
}

/// Processing tier enumeration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProcessingTier {
    Standard,
    Limited,
    Minimal,
    DeadLetter,
}

impl std::fmt::Display for ProcessingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessingTier::Standard => write!(f, "standard"),
            ProcessingTier::Limited => write!(f, "limited"),
            ProcessingTier::Minimal => write!(f, "minimal"),
            ProcessingTier::DeadLetter => write!(f, "dead_letter"),
        }
    }
}

impl From<String> for ProcessingTier {
    fn from(s: String) -> Self {
        match s.to_lowercase().as_str() {
            "standard" => ProcessingTier::Standard,
            "minimal" => ProcessingTier::Minimal,
            "dead_letter" => ProcessingTier::DeadLetter,
            _ => ProcessingTier::Limited,
        }
    }
}

/// Parsing strategy selected by content inspection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ParsingStrategy {
    SgmlOnly,
    XbrlOnly,
    Hybrid,
}

impl std::fmt::Display for ParsingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParsingStrategy::SgmlOnly => write!(f, "sgml_only"),
            ParsingStrategy::XbrlOnly => write!(f, "xbrl_only"),
            ParsingStrategy::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl Filing {
    /// Upsert a filing keyed by accession number.
    ///
    /// A repeated discovery of the same accession updates the descriptor
    /// fields in place and never creates a second row.
    pub async fn create_or_update(
        pool: &crate::database::DatabasePool,
        new_filing: &NewFiling,
    ) -> crate::error::AppResult<Self> {
        use crate::schema::filings::dsl;

        let mut conn = pool.get().await?;

        let filing = diesel::insert_into(dsl::filings)
            .values(new_filing)
            .on_conflict(dsl::accession_number)
            .do_update()
            .set((
                dsl::company_name.eq(&new_filing.company_name),
                dsl::form_type.eq(&new_filing.form_type),
                dsl::filing_date.eq(new_filing.filing_date),
                dsl::file_size_mb.eq(new_filing.file_size_mb),
                dsl::filing_url.eq(new_filing.filing_url.as_deref()),
                dsl::updated_at.eq(Utc::now()),
            ))
            .get_result::<Self>(&mut conn)
            .await?;

        Ok(filing)
    }

    /// Move a filing into a tier and status before the parse starts
    pub async fn set_processing_state(
        pool: &crate::database::DatabasePool,
        id: i32,
        tier: ProcessingTier,
        status: ProcessingStatus,
    ) -> crate::error::AppResult<Self> {
        use crate::schema::filings::dsl;

        let mut conn = pool.get().await?;

        let filing = diesel::update(dsl::filings.filter(dsl::id.eq(id)))
            .set((
                dsl::processing_tier.eq(tier.to_string()),
                dsl::processing_status.eq(status.to_string()),
                dsl::updated_at.eq(Utc::now()),
            ))
            .get_result::<Self>(&mut conn)
            .await?;

        Ok(filing)
    }

    /// Look up a filing by its accession number
    pub async fn get_by_accession(
        pool: &crate::database::DatabasePool,
        accession: &str,
    ) -> crate::error::AppResult<Option<Self>> {
        use crate::schema::filings::dsl;

        let mut conn = pool.get().await?;

        let filing = dsl::filings
            .filter(dsl::accession_number.eq(accession))
            .first::<Self>(&mut conn)
            .await
            .optional()?;

        Ok(filing)
    }

    /// Return the subset of the given accession numbers already persisted.
    /// Used by the orchestrator to skip filings discovered on earlier runs.
    pub async fn existing_accessions(
        pool: &crate::database::DatabasePool,
        accessions: &[String],
    ) -> crate::error::AppResult<HashSet<String>> {
        use crate::schema::filings::dsl;

        if accessions.is_empty() {
            return Ok(HashSet::new());
        }

        let mut conn = pool.get().await?;

        let existing: Vec<String> = dsl::filings
            .filter(dsl::accession_number.eq_any(accessions))
            .select(dsl::accession_number)
            .load(&mut conn)
            .await?;

        Ok(existing.into_iter().collect())
    }

    /// Delete completed/failed filings not touched since the cutoff.
    /// Child rows go with them via cascade.
    pub async fn cleanup_older_than(
        pool: &crate::database::DatabasePool,
        cutoff: DateTime<Utc>,
    ) -> crate::error::AppResult<usize> {
        use crate::schema::filings::dsl;

        let mut conn = pool.get().await?;

        let deleted = diesel::delete(
            dsl::filings
                .filter(dsl::updated_at.lt(cutoff))
                .filter(dsl::processing_status.eq_any(vec!["completed", "failed"])),
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
    fn test_processing_status_round_trip() {
        // REQUIREMENT: Status strings stored in varchar columns must map back
        // to the enum without loss
        for status in [
            ProcessingStatus::Pending,
            ProcessingStatus::Processing,
            ProcessingStatus::Completed,
            ProcessingStatus::Failed,
            ProcessingStatus::DeadLetter,
        ] {
            assert_eq!(ProcessingStatus::from(status.to_string()), status);
        }

        // Unknown values fall back to pending
        assert_eq!(
            ProcessingStatus::from("bogus".to_string()),
            ProcessingStatus::Pending
        );
    }

    #[test]
    fn test_processing_tier_round_trip() {
        for tier in [
            ProcessingTier::Standard,
            ProcessingTier::Limited,
            ProcessingTier::Minimal,
            ProcessingTier::DeadLetter,
        ] {
            assert_eq!(ProcessingTier::from(tier.to_string()), tier);
        }
    }

    #[test]
    fn test_parsing_strategy_display() {
        assert_eq!(ParsingStrategy::SgmlOnly.to_string(), "sgml_only");
        assert_eq!(ParsingStrategy::XbrlOnly.to_string(), "xbrl_only");
        assert_eq!(ParsingStrategy::Hybrid.to_string(), "hybrid");
    }

    #[test]
    fn test_new_filing_validation() {
        // REQUIREMENT: Discovered descriptors are validated before insertion
        // PURPOSE: An empty accession number must never reach the database
        let valid = NewFiling {
            accession_number: "0001193125-24-000001".to_string(),
            cik: "1084380".to_string(),
            company_name: "TIAA-CREF FUNDS".to_string(),
            form_type: "N-CSR".to_string(),
            filing_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            file_size_mb: 3.2,
            filing_url: None,
        };
        assert!(valid.validate().is_ok());

        let invalid = NewFiling {
            accession_number: String::new(),
            ..valid
        };
        assert!(invalid.validate().is_err());
    }
}
