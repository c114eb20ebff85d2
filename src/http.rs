//! The outbound `mapOutput` request: URL construction, HMAC signing, and
//! echoed-reply validation (§6).

use std::time::Duration;

use reqwest::{Client, ClientBuilder, Response};
use tracing::{debug, instrument};
use url::Url;

use crate::error::FetchError;
use crate::hmac_auth::{self, AUTH_HEADER, REPLY_HEADER};

const CONNECT_TIMEOUT_SECS: u64 = 30;
const READ_TIMEOUT_SECS: u64 = 300;

/// One host's `mapOutput` request, built once per [`Fetcher`](crate::fetcher::Fetcher) run.
pub struct MapOutputClient {
    client: Client,
    hmac_key: Vec<u8>,
}

impl MapOutputClient {
    /// Creates a client with default connect/read timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration below — this should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(hmac_key: impl Into<Vec<u8>>) -> Self {
        Self::with_timeouts(hmac_key, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeouts, for tests that need tight
    /// bounds.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(hmac_key: impl Into<Vec<u8>>, connect_secs: u64, read_secs: u64) -> Self {
        let client = build_client(connect_secs, read_secs)
            .expect("failed to build HTTP client with static configuration");
        Self {
            client,
            hmac_key: hmac_key.into(),
        }
    }

    /// Builds the `mapOutput` URL for one host/partition/batch.
    ///
    /// # Errors
    ///
    /// Returns a [`url::ParseError`] wrapped as a plain `String` if `host`
    /// is not a valid URL host.
    pub fn build_url(
        encrypted: bool,
        host: &str,
        port: u16,
        job_id: &str,
        partition: i32,
        path_components: &[String],
    ) -> Result<Url, String> {
        let scheme = if encrypted { "https" } else { "http" };
        let mut url = Url::parse(&format!("{scheme}://{host}:{port}/mapOutput"))
            .map_err(|e| e.to_string())?;
        url.query_pairs_mut()
            .append_pair("job", job_id)
            .append_pair("reduce", &partition.to_string())
            .append_pair("map", &path_components.join(","));
        Ok(url)
    }

    /// Issues the request and validates the server's echoed HMAC reply
    /// before returning the streaming response.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Connect`] if the request itself fails, or
    /// [`FetchError::Validation`] if the server's `X-ShuffleFetch-Reply`
    /// header is missing or does not verify.
    #[instrument(skip(self))]
    pub async fn connect_and_validate(
        &self,
        host: &str,
        port: u16,
        url: &Url,
    ) -> Result<Response, FetchError> {
        let signed = hmac_auth::sign(&self.hmac_key, url.as_str());

        debug!(url = %url, "sending mapOutput request");
        let response = self
            .client
            .get(url.clone())
            .header(AUTH_HEADER, &signed)
            .send()
            .await
            .map_err(|e| FetchError::connect(host, port, e))?;

        let reply = response
            .headers()
            .get(REPLY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                FetchError::validation(host, port, "missing X-ShuffleFetch-Reply header")
            })?;

        if !hmac_auth::verify_reply(&self.hmac_key, &signed, reply) {
            return Err(FetchError::validation(
                host,
                port,
                "X-ShuffleFetch-Reply did not verify",
            ));
        }

        Ok(response)
    }
}

fn build_client(connect_secs: u64, read_secs: u64) -> reqwest::Result<Client> {
    ClientBuilder::new()
        .connect_timeout(Duration::from_secs(connect_secs))
        .timeout(Duration::from_secs(read_secs))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_url_carries_job_partition_and_joined_paths() {
        let url = MapOutputClient::build_url(
            false,
            "shuffle-host",
            13562,
            "app_001",
            3,
            &["p1".to_string(), "p2".to_string()],
        )
        .unwrap();
        assert_eq!(url.scheme(), "http");
        assert_eq!(url.host_str(), Some("shuffle-host"));
        assert_eq!(url.port(), Some(13562));
        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("job"), Some(&"app_001".to_string()));
        assert_eq!(query.get("reduce"), Some(&"3".to_string()));
        assert_eq!(query.get("map"), Some(&"p1,p2".to_string()));
    }

    #[test]
    fn encrypted_transfer_selects_https() {
        let url = MapOutputClient::build_url(true, "host", 1, "app", 0, &[]).unwrap();
        assert_eq!(url.scheme(), "https");
    }
}
