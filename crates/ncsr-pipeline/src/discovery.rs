use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use ncsr_core::{AppError, AppResult};

use crate::fetcher::SecHttpClient;
use crate::utils::{is_valid_accession_number, is_valid_cik};

const SEC_BASE_URL: &str = "https://www.sec.gov";

/// The master index is pipe-delimited after a fixed 11-line header:
/// `CIK|Company Name|Form Type|Date Filed|edgar/data/...`
const MASTER_INDEX_HEADER_LINES: usize = 11;

static MASTER_INDEX_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<cik>\d+)\|(?P<company_name>.+?)\|(?P<form_type>[-A-Z0-9/ ]+?)\|(?P<date_filed>\d{4}-\d{2}-\d{2})\|(?P<file_name>edgar/data/.+)$",
    )
    .expect("master index line regex is valid")
});

/// Descriptor for a filing discovered in a daily master index
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilingDescriptor {
    pub accession_number: String,
    pub cik: String,
    pub company_name: String,
    pub form_type: String,
    pub filing_date: NaiveDate,

    /// URL of the complete submission text file, from the index path
    pub filing_url: String,
}

/// **Daily Feed**
///
/// Discovery source over the SEC daily master indexes. Produces filing
/// descriptors for a target date, optionally filtered by form type. A day
/// with no index (404) is an empty day, not an error.
pub struct DailyFeed {
    client: SecHttpClient,
    base_url: String,
}

impl DailyFeed {
    pub fn new(client: SecHttpClient) -> Self {
        Self {
            client,
            base_url: SEC_BASE_URL.to_string(),
        }
    }

    /// Point the feed at a different host (tests)
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Fetch and parse the master index for a date
    pub async fn filings_for_date(
        &self,
        date: NaiveDate,
        form_types: &[String],
    ) -> AppResult<Vec<FilingDescriptor>> {
        let url = build_index_url(&self.base_url, date);
        info!(%url, "Downloading master index");

        let content = match self.client.get_text(&url).await {
            Ok(content) => content,
            Err(AppError::NotFound(_)) => {
                info!(date = %date, "No master index for date");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let filings = parse_master_index(&content, form_types);
        info!(date = %date, count = filings.len(), "Discovered filings");
        Ok(filings)
    }
}

/// Master index URL for a date: derived from year, quarter and yyyymmdd
pub fn build_index_url(base_url: &str, date: NaiveDate) -> String {
    let quarter = (date.month() - 1) / 3 + 1;
    format!(
        "{}/Archives/edgar/daily-index/{}/QTR{}/master.{}.idx",
        base_url,
        date.year(),
        quarter,
        date.format("%Y%m%d")
    )
}

/// Parse a master index body into descriptors, filtering by form type.
///
/// Form types in the index occasionally carry trailing spaces; the whitelist
/// comparison happens after trimming.
pub fn parse_master_index(content: &str, form_types: &[String]) -> Vec<FilingDescriptor> {
    let mut filings = Vec::new();

    for line in content.lines().skip(MASTER_INDEX_HEADER_LINES) {
        let Some(caps) = MASTER_INDEX_LINE.captures(line.trim()) else {
            continue;
        };

        let form_type = caps["form_type"].trim().to_string();
        if !form_types.is_empty() && !form_types.iter().any(|f| f == &form_type) {
            continue;
        }

        let Ok(filing_date) = NaiveDate::parse_from_str(&caps["date_filed"], "%Y-%m-%d") else {
            warn!(line, "Master index line with unparseable date");
            continue;
        };

        let file_name = &caps["file_name"];
        let accession_number = file_name
            .rsplit('/')
            .next()
            .unwrap_or(file_name)
            .trim_end_matches(".txt")
            .to_string();
        if !is_valid_accession_number(&accession_number) || !is_valid_cik(&caps["cik"]) {
            warn!(line, "Master index line with malformed identifiers");
            continue;
        }

        filings.push(FilingDescriptor {
            accession_number,
            cik: caps["cik"].to_string(),
            company_name: caps["company_name"].trim().to_string(),
            form_type,
            filing_date,
            filing_url: format!("{}/Archives/{}", SEC_BASE_URL, file_name),
        });
    }

    filings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limiter::RateLimiter;

    const SAMPLE_INDEX: &str = "\
Description:           Daily Index of EDGAR Dissemination Feed
Last Data Received:    January 2, 2024
Comments:              webmaster@sec.gov
Anonymous FTP:         ftp://ftp.sec.gov/edgar/





CIK|Company Name|Form Type|Date Filed|File Name
--------------------------------------------------------------------------------
1084380|TIAA-CREF FUNDS|N-CSR|2024-01-02|edgar/data/1084380/0001193125-24-000001.txt
320193|Apple Inc.|10-K|2024-01-02|edgar/data/320193/0000320193-24-000001.txt
1234567|SOME TRUST|N-CSRS |2024-01-02|edgar/data/1234567/0000123456-24-000099.txt
";

    fn test_client() -> SecHttpClient {
        SecHttpClient::new("Test Operator test@example.com", RateLimiter::sec_edgar())
            .expect("client")
    }

    #[test]
    fn test_parse_master_index_filters_by_form_type() {
        // REQUIREMENT: Only whitelisted form types are returned
        let filings =
            parse_master_index(SAMPLE_INDEX, &["N-CSR".to_string(), "N-CSRS".to_string()]);

        assert_eq!(filings.len(), 2);
        assert_eq!(filings[0].accession_number, "0001193125-24-000001");
        assert_eq!(filings[0].cik, "1084380");
        assert_eq!(filings[0].company_name, "TIAA-CREF FUNDS");
        assert_eq!(filings[0].form_type, "N-CSR");
        assert_eq!(
            filings[0].filing_date,
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(
            filings[0].filing_url,
            "https://www.sec.gov/Archives/edgar/data/1084380/0001193125-24-000001.txt"
        );
    }

    #[test]
    fn test_form_type_with_trailing_space_matches_after_trim() {
        // The index line for SOME TRUST carries "N-CSRS " with a trailing space
        let filings = parse_master_index(SAMPLE_INDEX, &["N-CSRS".to_string()]);
        assert_eq!(filings.len(), 1);
        assert_eq!(filings[0].form_type, "N-CSRS");
        assert_eq!(filings[0].cik, "1234567");
    }

    #[test]
    fn test_empty_whitelist_returns_all_filings() {
        let filings = parse_master_index(SAMPLE_INDEX, &[]);
        assert_eq!(filings.len(), 3);
    }

    #[test]
    fn test_empty_index_yields_no_filings() {
        assert!(parse_master_index("", &[]).is_empty());
    }

    #[test]
    fn test_build_index_url_quarters() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert_eq!(
            build_index_url(SEC_BASE_URL, date),
            "https://www.sec.gov/Archives/edgar/daily-index/2024/QTR1/master.20240102.idx"
        );

        let date = NaiveDate::from_ymd_opt(2024, 11, 15).unwrap();
        assert_eq!(
            build_index_url(SEC_BASE_URL, date),
            "https://www.sec.gov/Archives/edgar/daily-index/2024/QTR4/master.20241115.idx"
        );
    }

    #[tokio::test]
    async fn test_missing_index_is_an_empty_day() {
        // REQUIREMENT: A 404 on the master index means no filings that day,
        // not an error
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", mockito::Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let feed = DailyFeed::new(test_client()).with_base_url(&server.url());
        let date = NaiveDate::from_ymd_opt(2024, 1, 6).unwrap();

        let filings = feed.filings_for_date(date, &[]).await.unwrap();
        assert!(filings.is_empty());
    }

    #[tokio::test]
    async fn test_filings_for_date_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock(
                "GET",
                "/Archives/edgar/daily-index/2024/QTR1/master.20240102.idx",
            )
            .with_status(200)
            .with_body(SAMPLE_INDEX)
            .create_async()
            .await;

        let feed = DailyFeed::new(test_client()).with_base_url(&server.url());
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();

        let filings = feed
            .filings_for_date(date, &["N-CSR".to_string()])
            .await
            .unwrap();
        assert_eq!(filings.len(), 1);
        assert_eq!(filings[0].company_name, "TIAA-CREF FUNDS");
    }
}
