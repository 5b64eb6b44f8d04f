use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use ncsr_core::{ProcessingTier, SectionType};

use crate::parser::{FundProfile, ParseResult, ParsedSection};

/// The limited tier keeps only the first tables in document order
pub const MAX_LIMITED_TABLES: usize = 10;

/// The minimal tier bounds its scans to the head of the document
const KEY_METRICS_WINDOW: usize = 200 * 1024;
const CRITICAL_SECTIONS_WINDOW: usize = 300 * 1024;
const BASIC_METADATA_WINDOW: usize = 20 * 1024;

/// Key-metric patterns applied directly to the raw body, no table parsing
static KEY_METRICS_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "nav_per_share",
            Regex::new(r"(?i)net\s+asset\s+value[^\n]*?\$?([\d,]+\.?\d*)").expect("nav regex"),
        ),
        (
            "total_assets",
            Regex::new(r"(?i)total\s+(?:net\s+)?assets[^\n]*?\$?([\d,]+\.?\d*)")
                .expect("total assets regex"),
        ),
        (
            "expense_ratio",
            Regex::new(r"(?i)expense\s+ratio[^\n]*?([\d]+\.?\d*%)").expect("expense regex"),
        ),
        (
            "management_fee",
            Regex::new(r"(?i)management\s+fee[^\n]*?([\d]+\.?\d*%)").expect("fee regex"),
        ),
        (
            "portfolio_turnover",
            Regex::new(r"(?i)portfolio\s+turnover[^\n]*?([\d]+\.?\d*%)").expect("turnover regex"),
        ),
        (
            "shares_outstanding",
            Regex::new(r"(?i)shares\s+outstanding[^\n]*?([\d][\d,]*)").expect("shares regex"),
        ),
    ]
});

/// Critical-section patterns for the minimal tier
static CRITICAL_SECTION_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        (
            "investment_objective",
            Regex::new(r"(?is)(?:investment\s+objective|objective)[:\s]+([^.]{50,300})")
                .expect("objective regex"),
        ),
        (
            "fund_summary",
            Regex::new(r"(?is)(?:fund\s+summary|summary)[:\s]+([^.]{100,500})")
                .expect("summary regex"),
        ),
        (
            "performance_summary",
            Regex::new(r"(?is)(?:performance\s+summary|total\s+return)[:\s]+([^.]{50,300})")
                .expect("performance regex"),
        ),
    ]
});

static TITLE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<title[^>]*>([^<]*)</title>").expect("title regex"));

fn byte_window(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Apply tier gating to a parse result after the sub-parsers ran.
///
/// - standard: full result, untouched
/// - limited: truncate to the first tables in document order
/// - minimal: no tables; key metrics and critical sections come from
///   bounded regex scans over the raw body
pub fn apply_tier(result: &mut ParseResult, tier: ProcessingTier, body: &str) {
    match tier {
        ProcessingTier::Standard => {}
        ProcessingTier::Limited => {
            result.tables.truncate(MAX_LIMITED_TABLES);
        }
        ProcessingTier::Minimal => {
            result.tables.clear();
            result.key_metrics = extract_key_metrics(body);
            result.sections = extract_critical_sections(body);

            let mut profile = result.fund.take().unwrap_or_default();
            if profile.fund_name.is_none() {
                profile.fund_name = extract_title(body);
            }
            merge_key_metrics(&mut profile, &result.key_metrics);
            if !profile.is_empty() {
                result.fund = Some(profile);
            }
        }
        ProcessingTier::DeadLetter => {
            // Routed before parsing; nothing ever reaches this arm
        }
    }
}

/// Key metrics via direct regex over the head of the body
pub fn extract_key_metrics(body: &str) -> BTreeMap<String, String> {
    let sample = byte_window(body, KEY_METRICS_WINDOW);
    let mut metrics = BTreeMap::new();

    for (name, pattern) in KEY_METRICS_PATTERNS.iter() {
        if let Some(value) = pattern.captures(sample).and_then(|c| c.get(1)) {
            metrics.insert(name.to_string(), value.as_str().trim().to_string());
        }
    }

    metrics
}

/// Critical sections as plain text, bounded to the head of the body
pub fn extract_critical_sections(body: &str) -> Vec<ParsedSection> {
    let sample = byte_window(body, CRITICAL_SECTIONS_WINDOW);
    let mut sections = Vec::new();

    for (name, pattern) in CRITICAL_SECTION_PATTERNS.iter() {
        let Some(text) = pattern.captures(sample).and_then(|c| c.get(1)) else {
            continue;
        };
        let text_clean = text
            .as_str()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if text_clean.is_empty() {
            continue;
        }
        sections.push(ParsedSection {
            section_name: name.to_string(),
            section_type: SectionType::classify(name).to_string(),
            word_count: text_clean.split_whitespace().count(),
            text_clean,
        });
    }

    sections
}

fn extract_title(body: &str) -> Option<String> {
    let sample = byte_window(body, BASIC_METADATA_WINDOW);
    TITLE_TAG
        .captures(sample)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Fold scanned metric strings into the typed fund profile fields
fn merge_key_metrics(profile: &mut FundProfile, metrics: &BTreeMap<String, String>) {
    for (name, value) in metrics {
        profile.raw.insert(name.clone(), value.clone());
    }

    if profile.nav_per_share.is_none() {
        profile.nav_per_share = metrics.get("nav_per_share").map(|v| v.replace(',', ""));
    }
    if profile.total_net_assets.is_none() {
        profile.total_net_assets = metrics.get("total_assets").map(|v| v.replace(',', ""));
    }
    if profile.expense_ratio.is_none() {
        profile.expense_ratio = metrics
            .get("expense_ratio")
            .map(|v| v.trim_end_matches('%').to_string());
    }
    if profile.shares_outstanding.is_none() {
        profile.shares_outstanding = metrics
            .get("shares_outstanding")
            .and_then(|v| v.replace(',', "").parse().ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParsedTable;

    const MINIMAL_BODY: &str = r#"<html><head><title>Balanced Trust Semi-Annual Report</title></head><body>
<p>Investment Objective: The fund seeks long-term capital appreciation together with current income through a diversified portfolio of equity and fixed income securities</p>
<p>Net asset value per share $12.34</p>
<p>Total net assets 1,234,567</p>
<p>Expense ratio 0.75%</p>
<p>Management fee 0.50%</p>
<p>Portfolio turnover 42%</p>
<p>Shares outstanding 100,042</p>
</body></html>"#;

    fn table(name: &str) -> ParsedTable {
        ParsedTable {
            table_type: "other".to_string(),
            caption: Some(name.to_string()),
            table_html: String::new(),
            row_count: 1,
            column_count: 1,
            rows: Vec::new(),
        }
    }

    #[test]
    fn test_extract_key_metrics() {
        // REQUIREMENT: The minimal tier extracts key metrics via direct regex
        // without parsing any tables
        let metrics = extract_key_metrics(MINIMAL_BODY);

        assert_eq!(metrics.get("nav_per_share").map(String::as_str), Some("12.34"));
        assert_eq!(
            metrics.get("total_assets").map(String::as_str),
            Some("1,234,567")
        );
        assert_eq!(
            metrics.get("expense_ratio").map(String::as_str),
            Some("0.75%")
        );
        assert_eq!(
            metrics.get("management_fee").map(String::as_str),
            Some("0.50%")
        );
        assert_eq!(
            metrics.get("portfolio_turnover").map(String::as_str),
            Some("42%")
        );
        assert_eq!(
            metrics.get("shares_outstanding").map(String::as_str),
            Some("100,042")
        );
    }

    #[test]
    fn test_extract_critical_sections() {
        let sections = extract_critical_sections(MINIMAL_BODY);
        let objective = sections
            .iter()
            .find(|s| s.section_name == "investment_objective")
            .expect("objective section");
        assert!(objective.text_clean.contains("long-term capital appreciation"));
        assert_eq!(
            objective.word_count,
            objective.text_clean.split_whitespace().count()
        );
    }

    #[test]
    fn test_limited_tier_truncates_tables() {
        // REQUIREMENT: The limited tier keeps the first 10 tables in
        // document order
        let mut result = ParseResult::default();
        result.tables = (0..15).map(|i| table(&format!("t{}", i))).collect();

        apply_tier(&mut result, ProcessingTier::Limited, "");

        assert_eq!(result.tables.len(), MAX_LIMITED_TABLES);
        assert_eq!(result.tables[0].caption.as_deref(), Some("t0"));
        assert_eq!(result.tables[9].caption.as_deref(), Some("t9"));
    }

    #[test]
    fn test_minimal_tier_drops_tables_and_scans_metrics() {
        let mut result = ParseResult::default();
        result.tables = vec![table("t0")];

        apply_tier(&mut result, ProcessingTier::Minimal, MINIMAL_BODY);

        assert!(result.tables.is_empty());
        assert!(!result.key_metrics.is_empty());

        let profile = result.fund.expect("fund profile");
        assert_eq!(profile.nav_per_share.as_deref(), Some("12.34"));
        assert_eq!(profile.total_net_assets.as_deref(), Some("1234567"));
        assert_eq!(profile.expense_ratio.as_deref(), Some("0.75"));
        assert_eq!(profile.shares_outstanding, Some(100_042));
        assert_eq!(
            profile.fund_name.as_deref(),
            Some("Balanced Trust Semi-Annual Report")
        );
    }

    #[test]
    fn test_standard_tier_is_untouched() {
        let mut result = ParseResult::default();
        result.tables = (0..15).map(|i| table(&format!("t{}", i))).collect();

        apply_tier(&mut result, ProcessingTier::Standard, MINIMAL_BODY);

        assert_eq!(result.tables.len(), 15);
        assert!(result.key_metrics.is_empty());
    }
}
