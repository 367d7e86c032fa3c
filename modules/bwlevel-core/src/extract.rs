use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Locators;
use crate::error::RenderResult;
use crate::render::{NavigateOptions, PageContext, WaitUntil};
use crate::types::Resolution;

/// One extraction attempt against a page context. Never fails: every
/// problem is reported as [`Resolution::Unknown`].
#[async_trait]
pub trait Extract: Send + Sync {
    async fn extract(&self, page: &mut dyn PageContext, url: &str) -> Resolution;
}

/// Reads the level (or the concealed marker) from a rendered profile page.
pub struct ContentExtractor {
    locators: Locators,
    navigation_timeout: Duration,
    content_timeout: Duration,
}

impl ContentExtractor {
    pub fn new(
        locators: Locators,
        navigation_timeout: Duration,
        content_timeout: Duration,
    ) -> Self {
        Self {
            locators,
            navigation_timeout,
            content_timeout,
        }
    }

    async fn try_extract(
        &self,
        page: &mut dyn PageContext,
        url: &str,
    ) -> RenderResult<Resolution> {
        // DOM-ready rather than network idle: profile pages keep polling.
        page.navigate(
            url,
            NavigateOptions {
                wait_until: WaitUntil::DomContentLoaded,
                timeout: self.navigation_timeout,
            },
        )
        .await?;
        page.wait_for(&self.locators.container, self.content_timeout).await?;

        let text = page.read(&self.locators.level).await?;
        if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            return Ok(match parse_level(&text) {
                Some(level) => Resolution::Numeric(level),
                None => {
                    warn!(url, text = %text, "extract: malformed level text");
                    Resolution::Unknown
                }
            });
        }

        if page.read(&self.locators.concealed).await?.is_some() {
            return Ok(Resolution::Concealed);
        }
        Ok(Resolution::Unknown)
    }
}

#[async_trait]
impl Extract for ContentExtractor {
    async fn extract(&self, page: &mut dyn PageContext, url: &str) -> Resolution {
        match self.try_extract(page, url).await {
            Ok(resolution) => {
                debug!(url, result = %resolution, "extract: attempt finished");
                resolution
            }
            Err(e) => {
                warn!(url, error = %e, "extract: attempt failed");
                Resolution::Unknown
            }
        }
    }
}

/// Digits of `text` as a level. `None` when no digits remain or the value
/// overflows; never zero-by-default.
pub fn parse_level(text: &str) -> Option<u64> {
    let digits: String = text.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits.parse().ok()
}
