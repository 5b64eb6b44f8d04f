pub mod html;
pub mod sgml;
pub mod xbrl;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use ncsr_core::{AppError, AppResult, ParsingStrategy, ProcessingTier};

/// Filing metadata extracted from the SEC header (or, for pure inline XBRL
/// documents, sniffed from the content). Unknown header keys are preserved
/// verbatim in `additional`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilingMetadata {
    pub accession_number: Option<String>,
    pub cik: Option<String>,
    pub company_name: Option<String>,
    pub form_type: Option<String>,
    pub filing_date: Option<NaiveDate>,
    pub period_of_report: Option<NaiveDate>,
    pub acceptance_datetime: Option<DateTime<Utc>>,
    pub sic: Option<String>,
    pub state_of_incorporation: Option<String>,
    pub fiscal_year_end: Option<String>,
    pub business_address: Option<String>,
    pub business_phone: Option<String>,
    pub document_count: Option<i32>,
    pub additional: BTreeMap<String, String>,
}

/// One inline XBRL fact with its resolved context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedFact {
    pub concept: String,
    pub value: Option<String>,
    pub unit_ref: Option<String>,
    pub context_ref: Option<String>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub period_instant: Option<NaiveDate>,
    pub entity_identifier: Option<String>,
    pub decimals: Option<i32>,
    pub scale: Option<i32>,
    pub precision: Option<i32>,
    pub additional_attributes: serde_json::Map<String, serde_json::Value>,
}

/// Text section carved out of the document body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSection {
    pub section_name: String,
    pub section_type: String,
    pub text_clean: String,
    pub word_count: usize,
}

/// One scalar cell in long form
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTableRow {
    pub row_index: i32,
    pub col_name: String,
    pub col_value: String,
    pub col_type: String,
}

/// Table with preserved HTML, grid dimensions and normalized cells
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedTable {
    pub table_type: String,
    pub caption: Option<String>,
    pub table_html: String,
    pub row_count: i32,
    pub column_count: i32,
    pub rows: Vec<ParsedTableRow>,
}

/// Fund-level figures surfaced from the document body
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundProfile {
    pub fund_name: Option<String>,
    pub total_net_assets: Option<String>,
    pub shares_outstanding: Option<i64>,
    pub nav_per_share: Option<String>,
    pub expense_ratio: Option<String>,
    pub portfolio_date: Option<NaiveDate>,
    pub raw: BTreeMap<String, String>,
}

impl FundProfile {
    pub fn is_empty(&self) -> bool {
        self.fund_name.is_none()
            && self.total_net_assets.is_none()
            && self.shares_outstanding.is_none()
            && self.nav_per_share.is_none()
            && self.expense_ratio.is_none()
            && self.portfolio_date.is_none()
            && self.raw.is_empty()
    }
}

/// Wall-clock seconds spent in each sub-parser
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ParserTimings {
    pub sgml: Option<f64>,
    pub xbrl: Option<f64>,
    pub html: Option<f64>,
}

/// Normalized output of the parser pipeline, the same shape regardless of
/// whether the input was SGML, inline XBRL, or both
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParseResult {
    pub success: bool,
    pub strategy: Option<ParsingStrategy>,
    pub metadata: Option<FilingMetadata>,
    pub fund: Option<FundProfile>,
    pub xbrl_facts: Vec<ParsedFact>,
    pub sections: Vec<ParsedSection>,
    pub tables: Vec<ParsedTable>,
    /// Key metrics from the minimal tier's direct regex scan
    pub key_metrics: BTreeMap<String, String>,
    pub sgml_parsed: bool,
    pub xbrl_parsed: bool,
    pub timings: ParserTimings,
    pub error: Option<String>,
}

impl ParseResult {
    fn incompatible() -> Self {
        Self {
            success: false,
            error: Some("incompatible_content".to_string()),
            ..Self::default()
        }
    }
}

/// **Filing Parser**
///
/// Integrated parser over the three content shapes SEC filings arrive in.
/// Content inspection picks the strategy; sub-parser failures are captured in
/// the result rather than propagated, so a filing with a broken XBRL island
/// still yields its SGML header. The only error that escapes is allocation
/// failure while assembling the hybrid document body, which the orchestrator
/// classifies as a memory failure.
#[derive(Debug, Clone, Default)]
pub struct FilingParser;

impl FilingParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse filing content at the given tier depth.
    ///
    /// The HTML section/table walk only runs for the standard and limited
    /// tiers; the minimal tier bounds its work to regex scans applied later
    /// by the extraction adapter.
    pub fn parse(&self, content: &str, tier: ProcessingTier) -> AppResult<ParseResult> {
        let Some(strategy) = detect_strategy(content) else {
            return Ok(ParseResult::incompatible());
        };
        debug!(%strategy, "Detected parsing strategy");

        let mut result = ParseResult {
            strategy: Some(strategy),
            ..ParseResult::default()
        };
        let mut errors: Vec<String> = Vec::new();

        // The body the XBRL and HTML passes operate on: for SGML shapes it is
        // the concatenation of the embedded document bodies, otherwise the
        // content itself.
        let body: std::borrow::Cow<'_, str> = match strategy {
            ParsingStrategy::SgmlOnly | ParsingStrategy::Hybrid => {
                let started = Instant::now();
                match sgml::parse_sgml(content) {
                    Ok(parsed) => {
                        result.timings.sgml = Some(started.elapsed().as_secs_f64());
                        result.sgml_parsed = true;
                        result.metadata = Some(parsed.metadata);
                        std::borrow::Cow::Owned(sgml::concat_document_bodies(&parsed.documents)?)
                    }
                    Err(AppError::OutOfMemory(msg)) => return Err(AppError::OutOfMemory(msg)),
                    Err(e) => {
                        result.timings.sgml = Some(started.elapsed().as_secs_f64());
                        errors.push(format!("sgml: {}", e));
                        std::borrow::Cow::Borrowed(content)
                    }
                }
            }
            ParsingStrategy::XbrlOnly => std::borrow::Cow::Borrowed(content),
        };

        if matches!(strategy, ParsingStrategy::XbrlOnly | ParsingStrategy::Hybrid) {
            let started = Instant::now();
            match xbrl::parse_inline_xbrl(&body) {
                Ok(facts) => {
                    result.timings.xbrl = Some(started.elapsed().as_secs_f64());
                    result.xbrl_parsed = true;
                    result.xbrl_facts.extend(facts);
                }
                Err(e) => {
                    result.timings.xbrl = Some(started.elapsed().as_secs_f64());
                    errors.push(format!("xbrl: {}", e));
                }
            }

            // For pure XBRL documents the header is absent; sniff what little
            // metadata the content carries
            if result.metadata.is_none() {
                result.metadata = xbrl::sniff_metadata(&body);
            }
        }

        // Legacy HTML path: sections and tables from the document body
        if matches!(tier, ProcessingTier::Standard | ProcessingTier::Limited) {
            let started = Instant::now();
            result.sections = html::extract_sections(&body);
            result.tables = html::extract_tables(&body);
            let window = match tier {
                ProcessingTier::Limited => Some(html::LIMITED_METADATA_WINDOW),
                _ => None,
            };
            let fund = html::extract_fund_profile(&body, window);
            if !fund.is_empty() {
                result.fund = Some(fund);
            }
            result.timings.html = Some(started.elapsed().as_secs_f64());
        }

        crate::extract::apply_tier(&mut result, tier, &body);

        result.success = result.sgml_parsed || result.xbrl_parsed;
        if !errors.is_empty() {
            result.error = Some(errors.join("; "));
        }

        Ok(result)
    }
}

/// SGML markers per the SEC dissemination format
const SGML_MARKERS: &[&str] = &[
    "<sec-document>",
    "<sec-header>",
    "accession-number:",
    "<document>",
];

/// Inline XBRL markers
const XBRL_MARKERS: &[&str] = &[
    "xmlns:ix=",
    "<ix:nonfraction",
    "<ix:nonnumeric",
    "inlinexbrl",
    "xbrl.org",
];

/// Inspect content markers and choose a strategy; None means the content is
/// neither SGML nor inline XBRL and the filing is rejected
pub fn detect_strategy(content: &str) -> Option<ParsingStrategy> {
    let lower = content.to_lowercase();

    let has_sgml = SGML_MARKERS.iter().any(|m| lower.contains(m));
    let has_xbrl = XBRL_MARKERS.iter().any(|m| lower.contains(m));

    match (has_sgml, has_xbrl) {
        (true, true) => Some(ParsingStrategy::Hybrid),
        (true, false) => Some(ParsingStrategy::SgmlOnly),
        (false, true) => Some(ParsingStrategy::XbrlOnly),
        (false, false) => None,
    }
}
