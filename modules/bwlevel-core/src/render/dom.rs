use scraper::{Html, Selector};

use crate::error::{RenderError, RenderResult};

/// Check that `selector` parses as CSS.
pub fn validate_selector(selector: &str) -> RenderResult<()> {
    parse(selector).map(|_| ())
}

fn parse(selector: &str) -> RenderResult<Selector> {
    Selector::parse(selector).map_err(|e| RenderError::InvalidLocator {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Rendered markup captured from a page, queried with CSS selectors.
///
/// Holds the raw HTML and re-parses per query: `scraper::Html` is not
/// `Send`, and page contexts live across await points.
#[derive(Debug, Clone, Default)]
pub struct DomSnapshot {
    html: String,
}

impl DomSnapshot {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn contains(&self, selector: &str) -> RenderResult<bool> {
        let selector = parse(selector)?;
        let document = Html::parse_document(&self.html);
        let found = document.select(&selector).next().is_some();
        Ok(found)
    }

    /// Whitespace-normalised text of the first match.
    pub fn text(&self, selector: &str) -> RenderResult<Option<String>> {
        let selector = parse(selector)?;
        let document = Html::parse_document(&self.html);
        let text = document.select(&selector).next().map(|element| {
            element
                .text()
                .flat_map(str::split_whitespace)
                .collect::<Vec<_>>()
                .join(" ")
        });
        Ok(text)
    }
}
