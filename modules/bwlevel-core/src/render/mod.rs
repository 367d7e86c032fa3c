// Rendering engine seam.
//
// RenderEngine launches one long-lived EngineHandle; the handle hands out
// short-lived PageContexts, one per resolution. Two backends: a local
// headless Chrome and a remote Browserless instance.

mod browserless;
mod chrome;
mod dom;
mod session;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RenderResult;

pub use browserless::BrowserlessEngine;
pub use chrome::ChromeEngine;
pub use dom::{validate_selector, DomSnapshot};
pub use session::RenderSessionManager;

/// When navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitUntil {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

#[derive(Debug, Clone, Copy)]
pub struct NavigateOptions {
    pub wait_until: WaitUntil,
    pub timeout: Duration,
}

#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Start (or attach to) the engine. Called at most once per live session.
    async fn launch(&self) -> RenderResult<Arc<dyn EngineHandle>>;
}

#[async_trait]
pub trait EngineHandle: Send + Sync {
    /// Open an isolated browsing context.
    async fn new_context(&self) -> RenderResult<Box<dyn PageContext>>;

    /// Release the engine. Contexts opened afterwards fail with `Closed`.
    async fn close(&self) -> RenderResult<()>;
}

/// One isolated browsing context. Implementations also release their
/// resources on drop, so a cancelled resolution never leaks a context.
#[async_trait]
pub trait PageContext: Send {
    async fn navigate(&mut self, url: &str, options: NavigateOptions) -> RenderResult<()>;

    /// Suspend until `selector` matches or `timeout` elapses.
    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> RenderResult<()>;

    /// Text of the first element matching `selector`, `None` if nothing matches.
    async fn read(&mut self, selector: &str) -> RenderResult<Option<String>>;

    async fn close(&mut self) -> RenderResult<()>;
}
