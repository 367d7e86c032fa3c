// Remote Browserless backend. "Launch" attaches: it builds the client and
// probes the remote browser; page contexts are snapshots of /content calls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use browserless_client::{BrowserlessClient, ContentRequest};
use tracing::{debug, info};

use super::{DomSnapshot, EngineHandle, NavigateOptions, PageContext, RenderEngine, WaitUntil};
use crate::error::{RenderError, RenderResult};

pub struct BrowserlessEngine {
    base_url: String,
    token: Option<String>,
}

impl BrowserlessEngine {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        Self {
            base_url: base_url.to_string(),
            token: token.map(String::from),
        }
    }
}

#[async_trait]
impl RenderEngine for BrowserlessEngine {
    async fn launch(&self) -> RenderResult<Arc<dyn EngineHandle>> {
        let client = BrowserlessClient::new(&self.base_url, self.token.as_deref())
            .map_err(|e| RenderError::Launch(e.to_string()))?;
        let version = client
            .version()
            .await
            .map_err(|e| RenderError::Launch(format!("browserless unreachable: {e}")))?;

        info!(base_url = %client.base_url(), browser = %version.browser, "browserless: attached");

        Ok(Arc::new(BrowserlessHandle {
            client: Arc::new(client),
            closed: AtomicBool::new(false),
        }))
    }
}

struct BrowserlessHandle {
    client: Arc<BrowserlessClient>,
    closed: AtomicBool,
}

#[async_trait]
impl EngineHandle for BrowserlessHandle {
    async fn new_context(&self) -> RenderResult<Box<dyn PageContext>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RenderError::Closed);
        }
        Ok(Box::new(BrowserlessPage {
            client: self.client.clone(),
            navigation: None,
            dom: DomSnapshot::default(),
        }))
    }

    async fn close(&self) -> RenderResult<()> {
        // Browserless tears a browser down after each /content call, so
        // there is nothing remote to release.
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

struct BrowserlessPage {
    client: Arc<BrowserlessClient>,
    navigation: Option<(String, NavigateOptions)>,
    dom: DomSnapshot,
}

fn wait_until(condition: WaitUntil) -> browserless_client::WaitUntil {
    match condition {
        WaitUntil::DomContentLoaded => browserless_client::WaitUntil::DomContentLoaded,
        WaitUntil::Load => browserless_client::WaitUntil::Load,
        WaitUntil::NetworkIdle => browserless_client::WaitUntil::NetworkIdle,
    }
}

fn map_error(
    url: &str,
    what: &str,
    after: Duration,
    err: browserless_client::BrowserlessError,
) -> RenderError {
    if err.is_timeout() {
        RenderError::Timeout {
            what: what.to_string(),
            after,
        }
    } else {
        RenderError::Navigation {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl PageContext for BrowserlessPage {
    async fn navigate(&mut self, url: &str, options: NavigateOptions) -> RenderResult<()> {
        debug!(url, wait_until = ?options.wait_until, "browserless: navigating");
        let request =
            ContentRequest::new(url).goto(wait_until(options.wait_until), options.timeout);

        let html = self
            .client
            .content_with(&request)
            .await
            .map_err(|e| map_error(url, &format!("navigation to {url}"), options.timeout, e))?;

        if html.trim().is_empty() {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                message: "empty HTML response".to_string(),
            });
        }

        self.dom = DomSnapshot::new(html);
        self.navigation = Some((url.to_string(), options));
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> RenderResult<()> {
        if self.dom.contains(selector)? {
            return Ok(());
        }
        let (url, options) = self.navigation.clone().ok_or_else(|| RenderError::Navigation {
            url: String::new(),
            message: "wait_for called before navigate".to_string(),
        })?;

        // Re-render with the wait pushed to the remote browser.
        let request = ContentRequest::new(&url)
            .goto(wait_until(options.wait_until), options.timeout)
            .wait_for(selector, timeout)
            .best_attempt();
        let what = format!("selector {selector:?}");
        let html = self
            .client
            .content_with(&request)
            .await
            .map_err(|e| map_error(&url, &what, timeout, e))?;

        self.dom = DomSnapshot::new(html);
        if self.dom.contains(selector)? {
            Ok(())
        } else {
            Err(RenderError::Timeout { what, after: timeout })
        }
    }

    async fn read(&mut self, selector: &str) -> RenderResult<Option<String>> {
        self.dom.text(selector)
    }

    async fn close(&mut self) -> RenderResult<()> {
        self.dom = DomSnapshot::default();
        self.navigation = None;
        Ok(())
    }
}
