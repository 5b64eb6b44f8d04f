pub mod daily_metrics;
pub mod dead_letter;
pub mod filing;
pub mod fund_metadata;
pub mod processing_result;
pub mod section;
pub mod table;
pub mod xbrl_fact;

pub use daily_metrics::{NewProcessingMetricsDaily, ProcessingMetricsDaily};
pub use dead_letter::{
    backoff_hours, calculate_priority, retry_eligibility, suggest_tier, DeadLetterEntry,
    FailureType, NewDeadLetterEntry, NightBatchItem, RetryStatistics,
};
pub use filing::{
    Filing, NewFiling, ParsingStrategy, ProcessingStatus, ProcessingTier, UpdateFiling,
};
pub use fund_metadata::{FundMetadata, NewFundMetadata};
pub use processing_result::{NewProcessingResult, ProcessingResult};
pub use section::{NcsrSection, NewNcsrSection, SectionType};
pub use table::{ColumnType, NcsrTable, NcsrTableRow, NewNcsrTable, NewNcsrTableRow};
pub use xbrl_fact::{NewXbrlFact, XbrlFact};
