pub mod error;

pub use error::{BrowserlessError, Result};

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Slack added on top of the page-side timeouts so Browserless reports its
/// own timeout before the HTTP request gives up.
const REQUEST_SLACK: Duration = Duration::from_secs(5);

/// Lifecycle event Browserless waits for before considering navigation done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaitUntil {
    #[serde(rename = "domcontentloaded")]
    DomContentLoaded,
    #[serde(rename = "load")]
    Load,
    #[serde(rename = "networkidle0")]
    NetworkIdle,
}

#[derive(Debug, Clone, Serialize)]
pub struct GotoOptions {
    #[serde(rename = "waitUntil")]
    pub wait_until: WaitUntil,
    /// Milliseconds.
    pub timeout: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitForSelector {
    pub selector: String,
    /// Milliseconds.
    pub timeout: u64,
}

/// Body of a `/content` call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRequest {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goto_options: Option<GotoOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_for_selector: Option<WaitForSelector>,
    /// Return whatever rendered even if a wait timed out.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub best_attempt: bool,
}

impl ContentRequest {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            goto_options: None,
            wait_for_selector: None,
            best_attempt: false,
        }
    }

    pub fn goto(mut self, wait_until: WaitUntil, timeout: Duration) -> Self {
        self.goto_options = Some(GotoOptions {
            wait_until,
            timeout: timeout.as_millis() as u64,
        });
        self
    }

    pub fn wait_for(mut self, selector: &str, timeout: Duration) -> Self {
        self.wait_for_selector = Some(WaitForSelector {
            selector: selector.to_string(),
            timeout: timeout.as_millis() as u64,
        });
        self
    }

    pub fn best_attempt(mut self) -> Self {
        self.best_attempt = true;
        self
    }

    /// Upper bound for the whole HTTP round trip.
    fn budget(&self) -> Option<Duration> {
        let goto = self.goto_options.as_ref().map(|g| g.timeout).unwrap_or(0);
        let wait = self.wait_for_selector.as_ref().map(|w| w.timeout).unwrap_or(0);
        if goto == 0 && wait == 0 {
            return None;
        }
        Some(Duration::from_millis(goto + wait) + REQUEST_SLACK)
    }
}

/// Subset of the DevTools `/json/version` payload.
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserVersion {
    #[serde(rename = "Browser")]
    pub browser: String,
    #[serde(rename = "Protocol-Version", default)]
    pub protocol_version: Option<String>,
}

pub struct BrowserlessClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BrowserlessClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        let mut endpoint = format!("{}{path}", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={token}"));
        }
        endpoint
    }

    /// Probe the remote browser. Used as a cheap liveness check on attach.
    pub async fn version(&self) -> Result<BrowserVersion> {
        let resp = self.client.get(self.endpoint("/json/version")).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.json().await?)
    }

    /// Fetch fully-rendered HTML content for a URL via Browserless /content endpoint.
    pub async fn content(&self, url: &str) -> Result<String> {
        self.content_with(&ContentRequest::new(url)).await
    }

    /// `/content` with navigation and selector-wait options.
    pub async fn content_with(&self, request: &ContentRequest) -> Result<String> {
        let mut builder = self
            .client
            .post(self.endpoint("/content"))
            .header("Content-Type", "application/json")
            .json(request);
        if let Some(budget) = request.budget() {
            builder = builder.timeout(budget);
        }

        tracing::debug!(url = %request.url, "browserless: requesting content");
        let resp = builder.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(BrowserlessError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(resp.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_request_serializes_browserless_field_names() {
        let req = ContentRequest::new("https://example.com/player/Alice")
            .goto(WaitUntil::DomContentLoaded, Duration::from_secs(30))
            .wait_for("#root", Duration::from_secs(15))
            .best_attempt();

        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["url"], "https://example.com/player/Alice");
        assert_eq!(json["gotoOptions"]["waitUntil"], "domcontentloaded");
        assert_eq!(json["gotoOptions"]["timeout"], 30_000);
        assert_eq!(json["waitForSelector"]["selector"], "#root");
        assert_eq!(json["waitForSelector"]["timeout"], 15_000);
        assert_eq!(json["bestAttempt"], true);
    }

    #[test]
    fn bare_request_omits_optional_fields() {
        let json = serde_json::to_value(ContentRequest::new("https://example.com")).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), 1);
        assert!(obj.contains_key("url"));
    }

    #[test]
    fn budget_covers_both_waits() {
        let req = ContentRequest::new("https://example.com")
            .goto(WaitUntil::Load, Duration::from_secs(2))
            .wait_for("body", Duration::from_secs(3));
        assert_eq!(req.budget(), Some(Duration::from_secs(5) + REQUEST_SLACK));
        assert_eq!(ContentRequest::new("https://example.com").budget(), None);
    }

    #[test]
    fn api_408_counts_as_timeout() {
        let err = BrowserlessError::Api {
            status: 408,
            message: "Timed out".into(),
        };
        assert!(err.is_timeout());
        assert!(!BrowserlessError::Network("refused".into()).is_timeout());
    }
}
