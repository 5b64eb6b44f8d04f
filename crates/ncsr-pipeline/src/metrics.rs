use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use ncsr_core::ProcessingTier;

/// **In-memory daily counters**
///
/// Mutated only by the orchestrator; pure reporting, no feedback into
/// routing. The persisted aggregate is recomputed separately from the run
/// summaries by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    pub date: NaiveDate,
    pub standard_processed: u32,
    pub limited_processed: u32,
    pub minimal_processed: u32,
    pub dead_lettered: u32,
    pub total_processed: u32,
    pub total_duration: f64,
    pub large_files_count: u32,
}

impl Default for ProcessingMetrics {
    fn default() -> Self {
        Self::new(Utc::now().date_naive())
    }
}

impl ProcessingMetrics {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            standard_processed: 0,
            limited_processed: 0,
            minimal_processed: 0,
            dead_lettered: 0,
            total_processed: 0,
            total_duration: 0.0,
            large_files_count: 0,
        }
    }

    /// Record a successfully processed filing
    pub fn record_success(&mut self, tier: ProcessingTier, duration_secs: f64, file_size_mb: f64) {
        self.total_processed += 1;
        self.total_duration += duration_secs;

        if file_size_mb > 50.0 {
            self.large_files_count += 1;
        }

        match tier {
            ProcessingTier::Standard => self.standard_processed += 1,
            ProcessingTier::Limited => self.limited_processed += 1,
            ProcessingTier::Minimal => self.minimal_processed += 1,
            ProcessingTier::DeadLetter => {}
        }
    }

    /// Record a filing routed to the dead-letter queue
    pub fn record_failure(&mut self) {
        self.dead_lettered += 1;
    }

    pub fn success_rate(&self) -> f64 {
        let attempts = self.total_processed + self.dead_lettered;
        if attempts == 0 {
            return 0.0;
        }
        self.total_processed as f64 / attempts as f64 * 100.0
    }

    pub fn average_duration(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.total_duration / self.total_processed as f64
    }

    /// Daily summary for the end-of-run log line
    pub fn daily_report(&self) -> serde_json::Value {
        serde_json::json!({
            "date": self.date.to_string(),
            "success_rate": self.success_rate(),
            "total_processed": self.total_processed,
            "standard_processed": self.standard_processed,
            "limited_processed": self.limited_processed,
            "minimal_processed": self.minimal_processed,
            "average_duration": self.average_duration(),
            "large_files_today": self.large_files_count,
            "dead_letters": self.dead_lettered,
        })
    }
}
