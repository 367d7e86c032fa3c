use std::time::Duration;

/// Result type alias for rendering-engine operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Engine launch failed: {0}")]
    Launch(String),

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("Invalid locator {selector:?}: {message}")]
    InvalidLocator { selector: String, message: String },

    #[error("Render session is closed")]
    Closed,

    #[error("Backend error: {0}")]
    Backend(String),
}

impl RenderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RenderError::Timeout { .. })
    }
}
