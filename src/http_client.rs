use anyhow::{Context, Result};
use log::debug;
#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use reqwest::Client;
use std::time::Duration;
use trait_variant::make;

/// Status and raw body of one device response
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl DeviceResponse {
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Issues single GET requests to the device
///
/// Any status is returned as data; only failures to get a response at all
/// (connect error, timeout, broken body) are errors.
#[make(Send)]
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait DeviceTransport {
    async fn get(&self, path: &str, timeout: Duration) -> Result<DeviceResponse>;
}

/// Plain HTTP transport to the device's access point
#[derive(Clone, Debug)]
pub struct HttpTransport {
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn build_url(&self, path: &str) -> String {
        // Normalize path to always start with a single "/"
        let normalized_path = path.trim_start_matches('/');
        format!("{}/{normalized_path}", self.base_url)
    }

    /// Fresh client for one request
    ///
    /// Per-attempt timeouts differ, so clients are never shared between
    /// requests; dropping it closes its connections.
    fn session(timeout: Duration) -> Result<Client> {
        Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .context("failed to create HTTP client")
    }
}

impl DeviceTransport for HttpTransport {
    async fn get(&self, path: &str, timeout: Duration) -> Result<DeviceResponse> {
        let url = self.build_url(path);
        debug!("GET {url} (timeout {timeout:?})");

        let session = Self::session(timeout)?;
        let res = session
            .get(&url)
            .send()
            .await
            .context(format!("failed to send GET request to {url}"))?;

        let status = res.status().as_u16();
        let body = res
            .bytes()
            .await
            .context("failed to read response body")?
            .to_vec();

        debug!("GET {url} returned {status} with {} bytes", body.len());

        Ok(DeviceResponse { status, body })
    }
}
