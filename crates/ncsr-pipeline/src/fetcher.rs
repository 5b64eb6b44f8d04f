use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING, USER_AGENT};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use ncsr_core::{AppError, AppResult};

use crate::rate_limiter::RateLimiter;

const READ_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;

/// **SEC HTTP Client**
///
/// Rate-limited byte fetcher for SEC endpoints. Every request carries the
/// operator-identifying User-Agent the SEC requires and acquires a permit
/// from the process-wide rate limiter first. Transient failures (connect
/// errors, timeouts, 5xx) are retried up to three times with 1s/2s/4s
/// backoff; the final failure surfaces as an external API error carrying the
/// last status.
#[derive(Debug, Clone)]
pub struct SecHttpClient {
    client: Client,
    rate_limiter: RateLimiter,
    retry_base_delay: Duration,
}

impl SecHttpClient {
    pub fn new(user_agent: &str, rate_limiter: RateLimiter) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|_| AppError::config_error("SEC_USER_AGENT is not a valid header"))?,
        );
        headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(READ_TIMEOUT)
            .build()
            .map_err(|e| AppError::internal_error(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            rate_limiter,
            retry_base_delay: Duration::from_secs(1),
        })
    }

    /// Override the retry backoff base (tests)
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Fetch a URL as text, retrying transient failures.
    ///
    /// A 404 surfaces as `AppError::NotFound` so callers can distinguish
    /// "nothing there" (an empty index day) from a real failure.
    pub async fn get_text(&self, url: &str) -> AppResult<String> {
        let mut last_error = String::new();

        for attempt in 0..MAX_RETRIES {
            self.rate_limiter.wait_for_permit().await;
            debug!(url, attempt, "Fetching");

            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.text().await.map_err(|e| {
                            AppError::ExternalApiError(format!(
                                "Failed to read response body from {}: {}",
                                url, e
                            ))
                        });
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(AppError::not_found(url));
                    }
                    if !status.is_server_error() {
                        // Client errors other than 404 will not improve on retry
                        return Err(AppError::ExternalApiError(format!(
                            "HTTP {} fetching {}",
                            status, url
                        )));
                    }
                    last_error = format!("HTTP {}", status);
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            warn!(url, attempt = attempt + 1, error = %last_error, "Fetch attempt failed");
            if attempt + 1 < MAX_RETRIES {
                sleep(self.retry_base_delay * 2u32.pow(attempt)).await;
            }
        }

        Err(AppError::ExternalApiError(format!(
            "All {} attempts failed for {}: {}",
            MAX_RETRIES, url, last_error
        )))
    }

    /// Probe the reported size of a resource without downloading it.
    ///
    /// Returns None when the server does not advertise a length or the probe
    /// fails; the caller treats an unknown size as small.
    pub async fn content_length(&self, url: &str) -> AppResult<Option<u64>> {
        self.rate_limiter.wait_for_permit().await;

        match self.client.head(url).send().await {
            Ok(response) => {
                if response.status() == StatusCode::NOT_FOUND {
                    return Err(AppError::not_found(url));
                }
                Ok(response.content_length())
            }
            Err(e) => {
                debug!(url, error = %e, "HEAD probe failed; size unknown");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> SecHttpClient {
        SecHttpClient::new("Test Operator test@example.com", RateLimiter::sec_edgar())
            .expect("client")
            .with_retry_base_delay(Duration::from_millis(10))
    }

    #[tokio::test]
    async fn test_get_text_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/filing.txt")
            .with_status(200)
            .with_body("<SEC-DOCUMENT>hello</SEC-DOCUMENT>")
            .create_async()
            .await;

        let body = test_client()
            .get_text(&format!("{}/filing.txt", server.url()))
            .await
            .unwrap();

        assert!(body.contains("hello"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_text_retries_transient_5xx_three_times() {
        // REQUIREMENT: Transient 5xx responses are retried with backoff up to
        // three attempts; the final failure carries the last status
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky.txt")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let err = test_client()
            .get_text(&format!("{}/flaky.txt", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ExternalApiError(_)));
        assert!(err.to_string().contains("503"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_text_client_errors_are_not_retried() {
        // A 403 will not improve on retry; exactly one attempt is made
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/denied.txt")
            .with_status(403)
            .expect(1)
            .create_async()
            .await;

        let err = test_client()
            .get_text(&format!("{}/denied.txt", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ExternalApiError(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_text_not_found_is_distinct() {
        // 404 must not be retried: an index that does not exist means "no
        // filings that day", not an outage
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing.idx")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let err = test_client()
            .get_text(&format!("{}/missing.idx", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_content_length_probe() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("HEAD", "/sized.txt")
            .with_status(200)
            .with_header("content-length", "3355443")
            .create_async()
            .await;

        let size = test_client()
            .content_length(&format!("{}/sized.txt", server.url()))
            .await
            .unwrap();

        assert_eq!(size, Some(3_355_443));
    }
}
