use once_cell::sync::Lazy;
use regex::Regex;

static ACCESSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{10}-\d{2}-\d{6}$").expect("accession regex"));

/// Validate SEC accession number format (`\d{10}-\d{2}-\d{6}`)
pub fn is_valid_accession_number(accession: &str) -> bool {
    ACCESSION.is_match(accession)
}

/// Remove leading zeros from a CIK for URL construction.
/// The stored column keeps the CIK exactly as the index reported it.
pub fn unpad_cik(cik: &str) -> &str {
    let trimmed = cik.trim_start_matches('0');
    if trimmed.is_empty() {
        "0"
    } else {
        trimmed
    }
}

/// Validate CIK format: 1..=10 digits
pub fn is_valid_cik(cik: &str) -> bool {
    !cik.is_empty() && cik.len() <= 10 && cik.chars().all(|c| c.is_ascii_digit())
}

/// Complete submission text URL:
/// `https://www.sec.gov/Archives/edgar/data/{cik}/{accession}.txt`
pub fn build_filing_text_url(cik: &str, accession: &str) -> String {
    format!(
        "https://www.sec.gov/Archives/edgar/data/{}/{}.txt",
        unpad_cik(cik),
        accession
    )
}

/// Bytes to megabytes
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_accession_number() {
        assert!(is_valid_accession_number("0001193125-24-000001"));
        assert!(!is_valid_accession_number("1193125-24-000001"));
        assert!(!is_valid_accession_number("0001193125-24-1"));
        assert!(!is_valid_accession_number("000119312524000001"));
    }

    #[test]
    fn test_unpad_cik_keeps_leading_zero_free_form() {
        // REQUIREMENT: CIK leading zeros are retained in string columns but
        // stripped for URL construction
        assert_eq!(unpad_cik("0001084380"), "1084380");
        assert_eq!(unpad_cik("1084380"), "1084380");
        assert_eq!(unpad_cik("0000000000"), "0");
    }

    #[test]
    fn test_is_valid_cik() {
        assert!(is_valid_cik("1084380"));
        assert!(is_valid_cik("0001084380"));
        assert!(!is_valid_cik(""));
        assert!(!is_valid_cik("12345678901"));
        assert!(!is_valid_cik("abc123"));
    }

    #[test]
    fn test_build_filing_text_url() {
        assert_eq!(
            build_filing_text_url("0001084380", "0001193125-24-000001"),
            "https://www.sec.gov/Archives/edgar/data/1084380/0001193125-24-000001.txt"
        );
    }

    #[test]
    fn test_bytes_to_mb() {
        assert!((bytes_to_mb(3_355_443) - 3.2).abs() < 0.01);
        assert_eq!(bytes_to_mb(0), 0.0);
    }
}
