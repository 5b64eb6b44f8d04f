use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use ncsr_core::{ColumnType, SectionType};

use super::{FundProfile, ParsedSection, ParsedTable, ParsedTableRow};

/// The limited tier bounds its fund-metadata scan to the head of the document
pub const LIMITED_METADATA_WINDOW: usize = 50 * 1024;

static HEADERS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, h3, h4").expect("header selector"));
static TABLES: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("table selector"));
static CAPTION: Lazy<Selector> = Lazy::new(|| Selector::parse("caption").expect("caption selector"));
static ROWS: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("tr selector"));
static CELLS: Lazy<Selector> = Lazy::new(|| Selector::parse("th, td").expect("cell selector"));
static FUND_NAME_HEADERS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h1, h2, title").expect("fund name selector"));

static NUMBER_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[\d,]+(?:\.\d*)?$").expect("number regex"));
static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{1,2}[/-]\d{1,2}[/-]\d{2,4}").expect("slash date regex"));
static WORD_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\w+\s\d{1,2},\s\d{4}").expect("word date regex"));

static TOTAL_NET_ASSETS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)total\s+net\s+assets[:\s$]*([0-9,]+(?:\.[0-9]+)?)").expect("tna regex")
});
static NET_ASSETS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)net\s+assets[:\s$]*([0-9,]+(?:\.[0-9]+)?)").expect("net assets regex")
});
static PERIOD_OF_REPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:period\s+of\s+report|for\s+the\s+period\s+ended)[^.]{0,120}?((?:[A-Za-z]+\s+\d{1,2},\s+\d{4})|(?:\d{4}-\d{2}-\d{2}))",
    )
    .expect("period regex")
});

fn header_rank(tag: &str) -> Option<u8> {
    match tag {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        _ => None,
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

/// Cut a prefix of at most `limit` bytes without splitting a character
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

/// Walk headers h1..h4 in document order; each section owns the non-header
/// siblings that follow it until the next header of equal or higher rank.
pub fn extract_sections(html: &str) -> Vec<ParsedSection> {
    if html.is_empty() {
        return Vec::new();
    }

    let document = Html::parse_document(html);
    let mut sections = Vec::new();

    for header in document.select(&HEADERS) {
        let section_name = element_text(header);
        if section_name.is_empty() {
            continue;
        }
        let Some(rank) = header_rank(header.value().name()) else {
            continue;
        };

        let mut content: Vec<String> = Vec::new();
        for sibling in header.next_siblings() {
            let Some(element) = ElementRef::wrap(sibling) else {
                continue;
            };
            if let Some(sibling_rank) = header_rank(element.value().name()) {
                if sibling_rank <= rank {
                    break;
                }
            }
            let text = element_text(element);
            if !text.is_empty() {
                content.push(text);
            }
        }

        let text_clean = content.join(" ");
        if text_clean.is_empty() {
            continue;
        }

        let word_count = text_clean.split_whitespace().count();
        sections.push(ParsedSection {
            section_type: SectionType::classify(&section_name).to_string(),
            section_name: truncate_chars(&section_name, 250),
            text_clean,
            word_count,
        });
    }

    sections
}

/// Extract every `<table>`: caption, preserved HTML, the parsed grid, and
/// each non-empty cell as a typed long-form row.
pub fn extract_tables(html: &str) -> Vec<ParsedTable> {
    if html.is_empty() {
        return Vec::new();
    }

    let document = Html::parse_document(html);
    let mut tables = Vec::new();

    for (index, table) in document.select(&TABLES).enumerate() {
        let caption = table
            .select(&CAPTION)
            .next()
            .map(element_text)
            .filter(|c| !c.is_empty())
            .or_else(|| preceding_caption(table));

        let grid: Vec<Vec<String>> = table
            .select(&ROWS)
            .map(|tr| tr.select(&CELLS).map(element_text).collect())
            .filter(|row: &Vec<String>| !row.is_empty())
            .collect();

        if grid.is_empty() {
            continue;
        }

        let mut rows_iter = grid.into_iter();
        let header_row = rows_iter.next().unwrap_or_default();
        let col_names: Vec<String> = header_row
            .iter()
            .enumerate()
            .map(|(i, name)| {
                if name.is_empty() {
                    format!("col_{}", i)
                } else {
                    truncate_chars(name, 250)
                }
            })
            .collect();

        let data_rows: Vec<Vec<String>> = rows_iter.collect();
        let mut rows = Vec::new();
        for (row_index, row) in data_rows.iter().enumerate() {
            for (col_index, value) in row.iter().enumerate() {
                if value.trim().is_empty() {
                    continue;
                }
                let col_name = col_names
                    .get(col_index)
                    .cloned()
                    .unwrap_or_else(|| format!("col_{}", col_index));
                rows.push(ParsedTableRow {
                    row_index: row_index as i32,
                    col_name,
                    col_value: value.clone(),
                    col_type: infer_column_type(value).to_string(),
                });
            }
        }

        let table_type = classify_table_type(caption.as_deref().unwrap_or(""), &col_names);
        tables.push(ParsedTable {
            table_type,
            caption: Some(
                caption
                    .map(|c| truncate_chars(&c, 500))
                    .unwrap_or_else(|| format!("Table {}", index + 1)),
            ),
            table_html: table.html(),
            row_count: data_rows.len() as i32,
            column_count: col_names.len() as i32,
            rows,
        });
    }

    tables
}

/// The nearest preceding header or paragraph stands in for a missing caption
fn preceding_caption(table: ElementRef<'_>) -> Option<String> {
    let mut node = *table;
    loop {
        for sibling in node.prev_siblings() {
            if let Some(element) = ElementRef::wrap(sibling) {
                let name = element.value().name();
                if matches!(name, "h1" | "h2" | "h3" | "h4" | "p") {
                    let text = element_text(element);
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
            }
        }
        node = node.parent()?;
    }
}

/// Classify a table by caption keywords and header-row keywords
pub fn classify_table_type(caption: &str, col_names: &[String]) -> String {
    let caption_lower = caption.to_lowercase();
    let columns_lower = col_names.join(" ").to_lowercase();

    if ["portfolio", "holding", "investment"]
        .iter()
        .any(|w| caption_lower.contains(w))
    {
        return "portfolio_holdings".to_string();
    }
    if ["security", "shares", "market value", "principal amount"]
        .iter()
        .any(|w| columns_lower.contains(w))
    {
        return "portfolio_holdings".to_string();
    }
    if ["performance", "return", "yield"]
        .iter()
        .any(|w| caption_lower.contains(w))
    {
        return "performance_data".to_string();
    }
    if ["financial", "statement", "assets", "liabilities", "operations"]
        .iter()
        .any(|w| caption_lower.contains(w))
    {
        return "financial_summary".to_string();
    }
    "other".to_string()
}

/// Infer the scalar type of a table cell
pub fn infer_column_type(value: &str) -> ColumnType {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return ColumnType::Null;
    }
    if trimmed.contains('%') {
        return ColumnType::Percentage;
    }
    if trimmed.contains('$') || trimmed.contains('€') || trimmed.contains('£') {
        return ColumnType::Currency;
    }

    // Parenthesized numbers are negatives in financial tables
    let cleaned = trimmed.replace('$', "").replace('(', "-").replace(')', "");
    if NUMBER_VALUE.is_match(cleaned.trim()) {
        return ColumnType::Number;
    }

    if SLASH_DATE.is_match(trimmed) || WORD_DATE.is_match(trimmed) {
        return ColumnType::Date;
    }

    ColumnType::Text
}

/// Pull fund-level figures out of the document body. The heading match keeps
/// the fund/trust/portfolio keyword set; headings without any of those words
/// are not treated as fund names.
pub fn extract_fund_profile(html: &str, window: Option<usize>) -> FundProfile {
    let mut profile = FundProfile::default();
    if html.is_empty() {
        return profile;
    }

    let slice = match window {
        Some(limit) => byte_window(html, limit),
        None => html,
    };
    let document = Html::parse_document(slice);

    for heading in document.select(&FUND_NAME_HEADERS) {
        let text = element_text(heading);
        let lower = text.to_lowercase();
        if ["fund", "trust", "portfolio"]
            .iter()
            .any(|w| lower.contains(w))
        {
            profile.fund_name = Some(truncate_chars(&text, 500));
            break;
        }
    }

    let body_text = document
        .root_element()
        .text()
        .collect::<Vec<_>>()
        .join(" ");

    let assets = TOTAL_NET_ASSETS
        .captures(&body_text)
        .or_else(|| NET_ASSETS.captures(&body_text))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().replace(',', ""));
    if let Some(assets) = assets {
        profile
            .raw
            .insert("total_net_assets".to_string(), assets.clone());
        profile.total_net_assets = Some(assets);
    }

    if let Some(date_text) = PERIOD_OF_REPORT
        .captures(&body_text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    {
        profile.portfolio_date = chrono::NaiveDate::parse_from_str(date_text, "%B %d, %Y")
            .or_else(|_| chrono::NaiveDate::parse_from_str(date_text, "%Y-%m-%d"))
            .ok();
        if profile.portfolio_date.is_some() {
            profile
                .raw
                .insert("period_of_report".to_string(), date_text.to_string());
        }
    }

    if let Some(name) = &profile.fund_name {
        profile.raw.insert("fund_name".to_string(), name.clone());
    }

    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"<html><head><title>Growth Fund Annual Report</title></head><body>
<h2>Portfolio of Investments</h2>
<p>Holdings as of October 31, 2023.</p>
<table>
<tr><th>Security</th><th>Shares</th><th>Market Value</th></tr>
<tr><td>ACME CORP</td><td>1,000</td><td>$25,000</td></tr>
<tr><td>WIDGET INC</td><td>500</td><td>$12,500</td></tr>
</table>
<h2>Fund Performance</h2>
<p>The fund returned 5.12% for the period. Total net assets: 1,234,567.89</p>
<h3>Expense Example</h3>
<p>Expense ratio details here.</p>
</body></html>"#;

    #[test]
    fn test_extract_sections_walks_headers() {
        // REQUIREMENT: Sections attach following siblings until the next
        // header of equal or higher rank
        let sections = extract_sections(SAMPLE_HTML);

        let portfolio = sections
            .iter()
            .find(|s| s.section_name == "Portfolio of Investments")
            .expect("portfolio section");
        assert_eq!(portfolio.section_type, "portfolio");
        assert!(portfolio.text_clean.contains("Holdings as of"));

        let performance = sections
            .iter()
            .find(|s| s.section_name == "Fund Performance")
            .expect("performance section");
        assert_eq!(performance.section_type, "performance");
        // The h3 under it has lower rank, so its text is attached
        assert!(performance.text_clean.contains("Expense ratio details"));
    }

    #[test]
    fn test_section_word_count_matches_whitespace_split() {
        // REQUIREMENT: word_count equals the whitespace-split length of
        // text_clean
        for section in extract_sections(SAMPLE_HTML) {
            assert_eq!(
                section.word_count,
                section.text_clean.split_whitespace().count()
            );
        }
    }

    #[test]
    fn test_extract_tables_grid_and_rows() {
        let tables = extract_tables(SAMPLE_HTML);
        assert_eq!(tables.len(), 1);

        let table = &tables[0];
        // Header keywords classify this as holdings even without a caption tag
        assert_eq!(table.table_type, "portfolio_holdings");
        assert_eq!(table.row_count, 2);
        assert_eq!(table.column_count, 3);
        // 2 data rows x 3 non-empty cells
        assert_eq!(table.rows.len(), 6);

        let value_cell = table
            .rows
            .iter()
            .find(|r| r.col_name == "Market Value" && r.row_index == 0)
            .expect("market value cell");
        assert_eq!(value_cell.col_value, "$25,000");
        assert_eq!(value_cell.col_type, "currency");

        let shares_cell = table
            .rows
            .iter()
            .find(|r| r.col_name == "Shares" && r.row_index == 0)
            .expect("shares cell");
        assert_eq!(shares_cell.col_type, "number");
    }

    #[test]
    fn test_caption_from_preceding_header() {
        let tables = extract_tables(SAMPLE_HTML);
        // No <caption>; the nearest preceding header/paragraph stands in
        let caption = tables[0].caption.as_deref().unwrap();
        assert!(caption.contains("Holdings as of") || caption.contains("Portfolio"));
    }

    #[test]
    fn test_infer_column_type() {
        assert_eq!(infer_column_type("5.12%"), ColumnType::Percentage);
        assert_eq!(infer_column_type("$25,000"), ColumnType::Currency);
        assert_eq!(infer_column_type("€100"), ColumnType::Currency);
        assert_eq!(infer_column_type("1,000"), ColumnType::Number);
        assert_eq!(infer_column_type("(1,250)"), ColumnType::Number);
        assert_eq!(infer_column_type("-42.5"), ColumnType::Number);
        assert_eq!(infer_column_type("10/31/2023"), ColumnType::Date);
        assert_eq!(infer_column_type("October 31, 2023"), ColumnType::Date);
        assert_eq!(infer_column_type("ACME CORP"), ColumnType::Text);
        assert_eq!(infer_column_type("   "), ColumnType::Null);
    }

    #[test]
    fn test_classify_table_type() {
        assert_eq!(
            classify_table_type("Schedule of Investments", &[]),
            "portfolio_holdings"
        );
        assert_eq!(
            classify_table_type("", &["Security".to_string(), "Shares".to_string()]),
            "portfolio_holdings"
        );
        assert_eq!(
            classify_table_type("Average Annual Returns", &[]),
            "performance_data"
        );
        assert_eq!(
            classify_table_type("Statement of Assets and Liabilities", &[]),
            "financial_summary"
        );
        assert_eq!(classify_table_type("Trustee Information", &[]), "other");
    }

    #[test]
    fn test_extract_fund_profile() {
        let profile = extract_fund_profile(SAMPLE_HTML, None);
        assert_eq!(
            profile.fund_name.as_deref(),
            Some("Growth Fund Annual Report")
        );
        assert_eq!(profile.total_net_assets.as_deref(), Some("1234567.89"));
    }

    #[test]
    fn test_fund_profile_window_bounds_the_scan() {
        // A window smaller than the position of the net-assets text must
        // not see it
        let profile = extract_fund_profile(SAMPLE_HTML, Some(64));
        assert!(profile.total_net_assets.is_none());
    }

    #[test]
    fn test_byte_window_respects_char_boundaries() {
        let text = "净资产总额 total";
        // Slicing mid-character must not panic
        for limit in 0..text.len() {
            let _ = byte_window(text, limit);
        }
    }

    #[test]
    fn test_empty_html() {
        assert!(extract_sections("").is_empty());
        assert!(extract_tables("").is_empty());
        assert!(extract_fund_profile("", None).is_empty());
    }
}
