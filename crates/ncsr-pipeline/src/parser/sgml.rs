use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use ncsr_core::{AppError, AppResult};

use super::FilingMetadata;

static HEADER_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<SEC-HEADER>(.*?)</SEC-HEADER>").expect("header regex is valid")
});

static DOCUMENT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<DOCUMENT>(.*?)</DOCUMENT>").expect("document regex is valid")
});

static TEXT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<TEXT>(.*?)</TEXT>").expect("text regex is valid"));

static TAG_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(TYPE|SEQUENCE|FILENAME|DESCRIPTION)>([^<\r\n]+)").expect("tag field regex")
});

static SIC_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[(\d{1,4})\]").expect("sic code regex"));

/// One `<DOCUMENT>` block of an SGML submission
#[derive(Debug, Clone, Default)]
pub struct SgmlDocument {
    pub doc_type: Option<String>,
    pub sequence: Option<String>,
    pub filename: Option<String>,
    pub description: Option<String>,
    pub text: String,
}

/// Parsed SGML submission: header metadata plus embedded documents
#[derive(Debug, Clone)]
pub struct SgmlParsed {
    pub metadata: FilingMetadata,
    pub documents: Vec<SgmlDocument>,
}

/// Parse an SGML dissemination file: the SEC header into a normalized
/// key/value map and each `<DOCUMENT>` block into its body.
pub fn parse_sgml(content: &str) -> AppResult<SgmlParsed> {
    let header_text = extract_header_text(content)
        .ok_or_else(|| AppError::parser_error("No SEC header found in SGML content"))?;

    let metadata = parse_header(header_text);
    let documents = extract_documents(content);

    Ok(SgmlParsed {
        metadata,
        documents,
    })
}

/// The header block, or everything before the first `<DOCUMENT>` when the
/// explicit `<SEC-HEADER>` wrapper is absent
fn extract_header_text(content: &str) -> Option<&str> {
    if let Some(caps) = HEADER_BLOCK.captures(content) {
        return caps.get(1).map(|m| m.as_str());
    }

    let lower = content.to_lowercase();
    let end = lower.find("<document>")?;
    let head = &content[..end];
    // Without any recognizable header key this is not an SGML header
    if head.to_uppercase().contains("ACCESSION-NUMBER") {
        Some(head)
    } else {
        None
    }
}

/// Parse header lines into filing metadata.
///
/// Keys come in two shapes (`ACCESSION-NUMBER: value` and
/// `<ACCEPTANCE-DATETIME>value`) and mixed hyphen/underscore spellings;
/// everything is normalized to lowercase snake_case at this boundary. Known
/// fields populate the metadata struct on first occurrence; everything else
/// is preserved in the additional map.
pub fn parse_header(header_text: &str) -> FilingMetadata {
    let mut metadata = FilingMetadata::default();
    let mut current_section: Option<String> = None;
    let mut business_address_parts: Vec<String> = Vec::new();

    for raw_line in header_text.lines() {
        let line = raw_line.trim();
        if line.is_empty() {
            continue;
        }

        let Some((key, value)) = split_header_line(line) else {
            continue;
        };
        let key = normalize_key(&key);
        let value = value.trim().to_string();

        if value.is_empty() {
            // A bare "BUSINESS ADDRESS:" line opens a subsection
            current_section = Some(key);
            continue;
        }

        if current_section.as_deref() == Some("business_address")
            && matches!(key.as_str(), "street_1" | "street_2" | "city" | "state" | "zip")
        {
            business_address_parts.push(value.clone());
        }

        let scoped_key = match &current_section {
            Some(section) if matches!(key.as_str(), "street_1" | "street_2" | "city" | "state" | "zip" | "phone") => {
                format!("{}_{}", section, key)
            }
            _ => key.clone(),
        };
        metadata
            .additional
            .entry(scoped_key)
            .or_insert_with(|| value.clone());

        apply_known_field(&mut metadata, &key, &value);
    }

    if metadata.business_address.is_none() && !business_address_parts.is_empty() {
        metadata.business_address = Some(business_address_parts.join(", "));
    }

    metadata
}

fn split_header_line(line: &str) -> Option<(String, String)> {
    if let Some(rest) = line.strip_prefix('<') {
        // `<ACCEPTANCE-DATETIME>20240102093015`
        if rest.starts_with('/') {
            return None;
        }
        let end = rest.find('>')?;
        return Some((rest[..end].to_string(), rest[end + 1..].to_string()));
    }

    let idx = line.find(':')?;
    Some((line[..idx].to_string(), line[idx + 1..].to_string()))
}

/// Lowercase snake_case: hyphenated and spaced header keys collapse to one form
pub fn normalize_key(key: &str) -> String {
    key.trim()
        .to_lowercase()
        .replace(['-', ' '], "_")
}

fn apply_known_field(metadata: &mut FilingMetadata, key: &str, value: &str) {
    match key {
        "accession_number" => set_if_none(&mut metadata.accession_number, value),
        "central_index_key" | "cik" => set_if_none(&mut metadata.cik, value),
        "company_conformed_name" => set_if_none(&mut metadata.company_name, value),
        "conformed_submission_type" | "form_type" => set_if_none(&mut metadata.form_type, value),
        "filed_as_of_date" => {
            if metadata.filing_date.is_none() {
                metadata.filing_date = parse_compact_date(value);
            }
        }
        "conformed_period_of_report" => {
            if metadata.period_of_report.is_none() {
                metadata.period_of_report = parse_compact_date(value);
            }
        }
        "acceptance_datetime" => {
            if metadata.acceptance_datetime.is_none() {
                metadata.acceptance_datetime =
                    NaiveDateTime::parse_from_str(value, "%Y%m%d%H%M%S")
                        .ok()
                        .map(|dt| dt.and_utc());
            }
        }
        "standard_industrial_classification" => {
            if metadata.sic.is_none() {
                // "ELECTRONIC COMPUTERS [3571]" carries the code in brackets
                let code = SIC_CODE
                    .captures(value)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| value.chars().take(10).collect());
                metadata.sic = Some(code);
            }
        }
        "state_of_incorporation" => set_if_none(&mut metadata.state_of_incorporation, value),
        "fiscal_year_end" => set_if_none(&mut metadata.fiscal_year_end, value),
        "business_phone" => set_if_none(&mut metadata.business_phone, value),
        "public_document_count" => {
            if metadata.document_count.is_none() {
                metadata.document_count = value.trim().parse().ok();
            }
        }
        _ => {}
    }
}

fn set_if_none(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        *slot = Some(value.to_string());
    }
}

fn parse_compact_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y%m%d").ok()
}

/// Extract each `<DOCUMENT>...</DOCUMENT>` block with its tag fields and body
pub fn extract_documents(content: &str) -> Vec<SgmlDocument> {
    let mut documents = Vec::new();

    for caps in DOCUMENT_BLOCK.captures_iter(content) {
        let Some(block) = caps.get(1).map(|m| m.as_str()) else {
            continue;
        };

        let mut document = SgmlDocument::default();

        for field in TAG_FIELD.captures_iter(block) {
            let value = field[2].trim().to_string();
            match field[1].to_uppercase().as_str() {
                "TYPE" => document.doc_type = Some(value),
                "SEQUENCE" => document.sequence = Some(value),
                "FILENAME" => document.filename = Some(value),
                "DESCRIPTION" => document.description = Some(value),
                _ => {}
            }
        }

        if let Some(text) = TEXT_BLOCK.captures(block).and_then(|c| c.get(1)) {
            document.text = text.as_str().trim().to_string();
        }

        documents.push(document);
    }

    documents
}

/// Concatenate embedded document bodies for the downstream XBRL/HTML passes.
///
/// The reservation goes through `try_reserve` so a filing too large for the
/// heap surfaces as a memory failure instead of aborting the process.
pub fn concat_document_bodies(documents: &[SgmlDocument]) -> AppResult<String> {
    let total: usize = documents.iter().map(|d| d.text.len() + 1).sum();

    let mut combined = String::new();
    combined.try_reserve(total).map_err(|_| {
        AppError::OutOfMemory(format!(
            "failed to reserve {} bytes for embedded document bodies",
            total
        ))
    })?;

    for document in documents {
        combined.push_str(&document.text);
        combined.push('\n');
    }

    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "\
ACCESSION-NUMBER: 0001193125-24-000001
CONFORMED-SUBMISSION-TYPE: N-CSR
PUBLIC-DOCUMENT-COUNT: 3
CONFORMED-PERIOD-OF-REPORT: 20231031
FILED-AS-OF-DATE: 20240102
<ACCEPTANCE-DATETIME>20240102093015
COMPANY-CONFORMED-NAME: TIAA-CREF FUNDS
CENTRAL-INDEX-KEY: 0001084380
STANDARD-INDUSTRIAL-CLASSIFICATION: ELECTRONIC COMPUTERS [3571]
STATE-OF-INCORPORATION: DE
FISCAL-YEAR-END: 1031
BUSINESS ADDRESS:
\tSTREET 1: 730 THIRD AVENUE
\tCITY: NEW YORK
\tSTATE: NY
\tZIP: 10017
\tBUSINESS-PHONE: 212-490-9000
SOME-UNKNOWN-KEY: preserved verbatim
";

    #[test]
    fn test_parse_header_known_fields() {
        // REQUIREMENT: Known header keys populate the metadata object with
        // hyphen-normalized lookups
        let metadata = parse_header(HEADER);

        assert_eq!(
            metadata.accession_number.as_deref(),
            Some("0001193125-24-000001")
        );
        assert_eq!(metadata.cik.as_deref(), Some("0001084380"));
        assert_eq!(metadata.company_name.as_deref(), Some("TIAA-CREF FUNDS"));
        assert_eq!(metadata.form_type.as_deref(), Some("N-CSR"));
        assert_eq!(
            metadata.filing_date,
            NaiveDate::from_ymd_opt(2024, 1, 2)
        );
        assert_eq!(
            metadata.period_of_report,
            NaiveDate::from_ymd_opt(2023, 10, 31)
        );
        assert_eq!(metadata.sic.as_deref(), Some("3571"));
        assert_eq!(metadata.state_of_incorporation.as_deref(), Some("DE"));
        assert_eq!(metadata.fiscal_year_end.as_deref(), Some("1031"));
        assert_eq!(metadata.business_phone.as_deref(), Some("212-490-9000"));
        assert_eq!(metadata.document_count, Some(3));
    }

    #[test]
    fn test_acceptance_datetime_angle_form() {
        let metadata = parse_header(HEADER);
        let accepted = metadata.acceptance_datetime.expect("acceptance datetime");
        assert_eq!(accepted.to_rfc3339(), "2024-01-02T09:30:15+00:00");
    }

    #[test]
    fn test_business_address_is_composed_from_subsection() {
        let metadata = parse_header(HEADER);
        assert_eq!(
            metadata.business_address.as_deref(),
            Some("730 THIRD AVENUE, NEW YORK, NY, 10017")
        );
    }

    #[test]
    fn test_unknown_keys_are_preserved() {
        // REQUIREMENT: Unknown keys land in the additional-metadata blob
        let metadata = parse_header(HEADER);
        assert_eq!(
            metadata.additional.get("some_unknown_key").map(String::as_str),
            Some("preserved verbatim")
        );
    }

    #[test]
    fn test_normalize_key_variants() {
        assert_eq!(normalize_key("CENTRAL-INDEX-KEY"), "central_index_key");
        assert_eq!(normalize_key("Central Index Key"), "central_index_key");
        assert_eq!(normalize_key("  FISCAL-YEAR-END "), "fiscal_year_end");
    }

    #[test]
    fn test_extract_documents() {
        let content = "\
<DOCUMENT>
<TYPE>N-CSR
<SEQUENCE>1
<FILENAME>report.htm
<DESCRIPTION>FORM N-CSR
<TEXT>
<html><body>first body</body></html>
</TEXT>
</DOCUMENT>
<DOCUMENT>
<TYPE>GRAPHIC
<SEQUENCE>2
<FILENAME>chart.jpg
<TEXT>
binary-ish payload
</TEXT>
</DOCUMENT>";

        let documents = extract_documents(content);
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].doc_type.as_deref(), Some("N-CSR"));
        assert_eq!(documents[0].sequence.as_deref(), Some("1"));
        assert_eq!(documents[0].filename.as_deref(), Some("report.htm"));
        assert_eq!(documents[0].description.as_deref(), Some("FORM N-CSR"));
        assert!(documents[0].text.contains("first body"));
        assert_eq!(documents[1].doc_type.as_deref(), Some("GRAPHIC"));
        assert!(documents[1].description.is_none());
    }

    #[test]
    fn test_concat_document_bodies() {
        let documents = vec![
            SgmlDocument {
                text: "one".to_string(),
                ..SgmlDocument::default()
            },
            SgmlDocument {
                text: "two".to_string(),
                ..SgmlDocument::default()
            },
        ];
        let combined = concat_document_bodies(&documents).unwrap();
        assert_eq!(combined, "one\ntwo\n");
    }

    #[test]
    fn test_parse_sgml_without_header_is_an_error() {
        let err = parse_sgml("<DOCUMENT><TEXT>no header</TEXT></DOCUMENT>").unwrap_err();
        assert!(matches!(err, AppError::ParserError(_)));
    }
}
