//! Pwned Passwords range API.
//!
//! Sends the first five hex characters of the SHA-1 digest and scans the
//! returned `SUFFIX:COUNT` lines for the remaining 35 locally. With padding
//! enabled the API mixes in zero-count decoy suffixes, which read as "not
//! breached".

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use warden_common::WardenError;
use warden_common::constants::{HIBP_PROVIDER, headers};

use super::pacer::Pacer;
use super::source::BreachSource;
use crate::config::VerificationConfig;
use crate::fingerprint::RangeQuery;

/// Range API client
pub struct HibpSource {
    http: reqwest::Client,
    base_url: String,
    add_padding: bool,
    pacer: Pacer,
}

impl HibpSource {
    pub fn new(config: &VerificationConfig) -> Result<Self, WardenError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| WardenError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(http, config))
    }

    /// Reuse an existing HTTP client
    pub fn with_client(http: reqwest::Client, config: &VerificationConfig) -> Self {
        let mut base_url = config.api_base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            http,
            base_url,
            add_padding: config.add_padding,
            pacer: Pacer::new(Duration::from_millis(config.min_request_interval_ms)),
        }
    }
}

#[async_trait]
impl BreachSource for HibpSource {
    fn provider(&self) -> &str {
        HIBP_PROVIDER
    }

    async fn ready(&self) {
        self.pacer.wait().await;
    }

    async fn lookup(&self, query: &RangeQuery) -> Result<u64, WardenError> {
        let mut request = self.http.get(format!("{}{}", self.base_url, query.prefix()));
        if self.add_padding {
            request = request.header(headers::ADD_PADDING, "true");
        }

        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();

        match status {
            StatusCode::OK => {}
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get(headers::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse().ok());
                return Err(WardenError::RateLimited { retry_after_secs });
            }
            s if s.is_server_error() => {
                return Err(WardenError::ServiceUnavailable(format!("provider returned {}", s)));
            }
            s => return Err(WardenError::Rejected { status: s.as_u16() }),
        }

        let body = response.text().await.map_err(map_transport_error)?;
        let count = parse_range(&body, query.suffix())?;
        tracing::debug!(prefix = query.prefix(), breached = count > 0, "Range lookup complete");
        Ok(count)
    }
}

fn map_transport_error(error: reqwest::Error) -> WardenError {
    if error.is_timeout() {
        WardenError::Timeout(error.to_string())
    } else if error.is_decode() || error.is_body() {
        WardenError::MalformedResponse(error.to_string())
    } else {
        WardenError::Network(error.to_string())
    }
}

/// Breach count for `suffix` in a range response body. Missing means 0.
pub fn parse_range(body: &str, suffix: &str) -> Result<u64, WardenError> {
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (hash, count) = line
            .split_once(':')
            .ok_or_else(|| WardenError::MalformedResponse(format!("unexpected line: {:.40}", line)))?;
        if hash.trim().eq_ignore_ascii_case(suffix) {
            return count
                .trim()
                .parse()
                .map_err(|_| WardenError::MalformedResponse(format!("bad count: {:.20}", count)));
        }
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUFFIX: &str = "1E4C9B93F3F0682250B6CF8331B7EE68FD8";

    #[test]
    fn test_parse_finds_matching_suffix() {
        let body = format!(
            "003D68EB55068C33ACE09247EE4C639306B:3\r\n{}:9545824\r\n011053FD0102E94D6AE2F8B83D76FAF94F6:1\r\n",
            SUFFIX
        );
        assert_eq!(parse_range(&body, SUFFIX), Ok(9_545_824));
    }

    #[test]
    fn test_parse_absent_suffix_is_zero() {
        let body = "003D68EB55068C33ACE09247EE4C639306B:3\n";
        assert_eq!(parse_range(body, SUFFIX), Ok(0));
    }

    #[test]
    fn test_empty_body_is_not_breached() {
        assert_eq!(parse_range("", SUFFIX), Ok(0));
    }

    #[test]
    fn test_padding_entries_read_as_safe() {
        let body = format!("{}:0\n", SUFFIX);
        assert_eq!(parse_range(&body, SUFFIX), Ok(0));
    }

    #[test]
    fn test_suffix_match_is_case_insensitive() {
        let body = format!("{}:2\n", SUFFIX.to_lowercase());
        assert_eq!(parse_range(&body, SUFFIX), Ok(2));
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            parse_range("<html>oops</html>", SUFFIX),
            Err(WardenError::MalformedResponse(_))
        ));
        let body = format!("{}:lots\n", SUFFIX);
        assert!(matches!(
            parse_range(&body, SUFFIX),
            Err(WardenError::MalformedResponse(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_are_paced() {
        let source = HibpSource::new(&VerificationConfig::default()).unwrap();
        let started = tokio::time::Instant::now();
        source.ready().await;
        source.ready().await;
        source.ready().await;
        assert!(started.elapsed() >= Duration::from_millis(200));
    }
}
