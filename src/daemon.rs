//! Blocking HTTP client for the jadx daemon.
//!
//! Every daemon route is a GET with query parameters that answers a JSON
//! object shaped `{"result": ...}` or `{"error": ...}`. The daemon reports
//! failures as JSON bodies on non-2xx statuses, so those bodies are still
//! decoded and handed back as values; only transport failures and
//! non-JSON bodies become errors.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::config::Config;
use crate::debug_log;

pub struct DaemonClient {
    base_url: String,
}

impl DaemonClient {
    pub fn new(cfg: &Config) -> Self {
        Self::from_url(cfg.base_url())
    }

    pub fn from_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self { base_url }
    }

    pub fn get(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug_log!("daemon GET {url} {params:?}");

        let mut request = ureq::get(&url);
        for (key, value) in params {
            request = request.query(key, value);
        }

        let body = match request.call() {
            Ok(response) => response.into_string()?,
            // Error bodies ({"error": ...}) ride on 4xx/5xx statuses.
            Err(ureq::Error::Status(_code, response)) => response.into_string()?,
            Err(e) => return Err(e).with_context(|| format!("request to {url} failed")),
        };

        serde_json::from_str(&body)
            .with_context(|| format!("daemon returned a non-JSON body from {url}"))
    }
}
