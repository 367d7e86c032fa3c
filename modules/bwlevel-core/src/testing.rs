// Test doubles for the rendering seam and the extractor.
//
// - MockEngine (RenderEngine): in-memory engine serving scripted pages per
//   URL, with counters for launches, closes, contexts and navigations
// - MockPage (PageContext): page handed out by MockEngine
// - ScriptedExtractor (Extract): returns a queued sequence of results

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{RenderError, RenderResult};
use crate::extract::Extract;
use crate::render::{DomSnapshot, EngineHandle, NavigateOptions, PageContext, RenderEngine};
use crate::types::Resolution;

// ---------------------------------------------------------------------------
// Page scripts
// ---------------------------------------------------------------------------

/// What a navigation to a URL produces.
#[derive(Debug, Clone)]
pub enum PageScript {
    /// Navigation succeeds with this markup.
    Html(String),
    /// Navigation fails.
    NavigationError,
    /// Navigation never finishes before its timeout.
    Hang,
}

impl PageScript {
    pub fn html(html: &str) -> Self {
        PageScript::Html(html.to_string())
    }
}

#[derive(Default)]
struct Counters {
    launches: AtomicUsize,
    closes: AtomicUsize,
    contexts_opened: AtomicUsize,
    contexts_closed: AtomicUsize,
    contexts_live: AtomicUsize,
    navigations: AtomicUsize,
}

#[derive(Default)]
struct MockState {
    counters: Counters,
    /// Per-URL queue; the last script repeats once the queue drains.
    pages: Mutex<HashMap<String, VecDeque<PageScript>>>,
    failed_launches_left: AtomicUsize,
}

impl MockState {
    fn next_script(&self, url: &str) -> PageScript {
        let mut pages = self.pages.lock().unwrap();
        match pages.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(PageScript::NavigationError),
            None => PageScript::NavigationError,
        }
    }
}

// ---------------------------------------------------------------------------
// MockEngine
// ---------------------------------------------------------------------------

/// Scripted engine. Builder pattern: `.page()`, `.pages()`, `.fail_launches()`,
/// `.launch_delay()`, `.navigation_delay()`, `.hang_on_close()`.
pub struct MockEngine {
    state: Arc<MockState>,
    launch_delay: Duration,
    navigation_delay: Duration,
    hang_on_close: bool,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState::default()),
            launch_delay: Duration::ZERO,
            navigation_delay: Duration::ZERO,
            hang_on_close: false,
        }
    }

    pub fn page(self, url: &str, script: PageScript) -> Self {
        self.set_pages(url, vec![script]);
        self
    }

    pub fn pages(self, url: &str, scripts: Vec<PageScript>) -> Self {
        self.set_pages(url, scripts);
        self
    }

    pub fn fail_launches(self, count: usize) -> Self {
        self.state.failed_launches_left.store(count, Ordering::SeqCst);
        self
    }

    pub fn launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn navigation_delay(mut self, delay: Duration) -> Self {
        self.navigation_delay = delay;
        self
    }

    pub fn hang_on_close(mut self) -> Self {
        self.hang_on_close = true;
        self
    }

    /// Replace the script for `url` on a live engine.
    pub fn set_pages(&self, url: &str, scripts: Vec<PageScript>) {
        self.state
            .pages
            .lock()
            .unwrap()
            .insert(url.to_string(), scripts.into());
    }

    pub fn launches(&self) -> usize {
        self.state.counters.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.counters.closes.load(Ordering::SeqCst)
    }

    pub fn contexts_opened(&self) -> usize {
        self.state.counters.contexts_opened.load(Ordering::SeqCst)
    }

    /// Contexts released through `close()`.
    pub fn contexts_closed(&self) -> usize {
        self.state.counters.contexts_closed.load(Ordering::SeqCst)
    }

    /// Contexts not yet dropped.
    pub fn contexts_live(&self) -> usize {
        self.state.counters.contexts_live.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> usize {
        self.state.counters.navigations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderEngine for MockEngine {
    async fn launch(&self) -> RenderResult<Arc<dyn EngineHandle>> {
        self.state.counters.launches.fetch_add(1, Ordering::SeqCst);
        if !self.launch_delay.is_zero() {
            tokio::time::sleep(self.launch_delay).await;
        }

        let failing = self
            .state
            .failed_launches_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RenderError::Launch("scripted launch failure".into()));
        }

        Ok(Arc::new(MockHandle {
            state: self.state.clone(),
            navigation_delay: self.navigation_delay,
            hang_on_close: self.hang_on_close,
            closed: Mutex::new(false),
        }))
    }
}

struct MockHandle {
    state: Arc<MockState>,
    navigation_delay: Duration,
    hang_on_close: bool,
    closed: Mutex<bool>,
}

#[async_trait]
impl EngineHandle for MockHandle {
    async fn new_context(&self) -> RenderResult<Box<dyn PageContext>> {
        if *self.closed.lock().unwrap() {
            return Err(RenderError::Closed);
        }
        self.state.counters.contexts_opened.fetch_add(1, Ordering::SeqCst);
        self.state.counters.contexts_live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockPage {
            state: self.state.clone(),
            navigation_delay: self.navigation_delay,
            dom: DomSnapshot::default(),
        }))
    }

    async fn close(&self) -> RenderResult<()> {
        if self.hang_on_close {
            std::future::pending::<()>().await;
        }
        *self.closed.lock().unwrap() = true;
        self.state.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MockPage
// ---------------------------------------------------------------------------

pub struct MockPage {
    state: Arc<MockState>,
    navigation_delay: Duration,
    dom: DomSnapshot,
}

impl MockPage {
    /// A page with no engine behind it; every navigation fails.
    pub fn detached() -> Self {
        let state = Arc::new(MockState::default());
        state.counters.contexts_live.fetch_add(1, Ordering::SeqCst);
        Self {
            state,
            navigation_delay: Duration::ZERO,
            dom: DomSnapshot::default(),
        }
    }
}

impl Drop for MockPage {
    fn drop(&mut self) {
        self.state.counters.contexts_live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PageContext for MockPage {
    async fn navigate(&mut self, url: &str, options: NavigateOptions) -> RenderResult<()> {
        self.state.counters.navigations.fetch_add(1, Ordering::SeqCst);
        if !self.navigation_delay.is_zero() {
            tokio::time::sleep(self.navigation_delay).await;
        }

        match self.state.next_script(url) {
            PageScript::Html(html) => {
                self.dom = DomSnapshot::new(html);
                Ok(())
            }
            PageScript::NavigationError => Err(RenderError::Navigation {
                url: url.to_string(),
                message: "scripted navigation failure".into(),
            }),
            PageScript::Hang => {
                tokio::time::sleep(options.timeout).await;
                Err(RenderError::Timeout {
                    what: format!("navigation to {url}"),
                    after: options.timeout,
                })
            }
        }
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> RenderResult<()> {
        if self.dom.contains(selector)? {
            Ok(())
        } else {
            tokio::time::sleep(timeout).await;
            Err(RenderError::Timeout {
                what: format!("selector {selector:?}"),
                after: timeout,
            })
        }
    }

    async fn read(&mut self, selector: &str) -> RenderResult<Option<String>> {
        self.dom.text(selector)
    }

    async fn close(&mut self) -> RenderResult<()> {
        self.state.counters.contexts_closed.fetch_add(1, Ordering::SeqCst);
        self.dom = DomSnapshot::default();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedExtractor
// ---------------------------------------------------------------------------

/// Returns queued results in order; the last one repeats.
pub struct ScriptedExtractor {
    results: Mutex<VecDeque<Resolution>>,
    calls: AtomicUsize,
}

impl ScriptedExtractor {
    pub fn always(result: Resolution) -> Self {
        Self::sequence(vec![result])
    }

    pub fn sequence(results: Vec<Resolution>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Extract for ScriptedExtractor {
    async fn extract(&self, _page: &mut dyn PageContext, _url: &str) -> Resolution {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut results = self.results.lock().unwrap();
        if results.len() > 1 {
            results.pop_front().unwrap_or(Resolution::Unknown)
        } else {
            results.front().copied().unwrap_or(Resolution::Unknown)
        }
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Profile markup in the shape the sample locators expect.
pub fn profile_html(level_text: &str) -> String {
    format!(
        r#"<html><body><div id="root"><div class="pagelayout-body">
             <div class="h-flex"><span class="level">{level_text}</span><span>name</span></div>
           </div></div></body></html>"#
    )
}

/// Profile markup for a nicked player: container present, no level.
pub fn concealed_html() -> String {
    r#"<html><body><div id="root"><div class="pagelayout-body">
         <div class="nicked">This player is nicked</div>
       </div></div></body></html>"#
        .to_string()
}

/// Locators matching [`profile_html`] and [`concealed_html`].
pub fn sample_locators() -> crate::config::Locators {
    crate::config::Locators {
        container: "#root .pagelayout-body".to_string(),
        level: "#root .h-flex > span.level".to_string(),
        concealed: "#root .nicked".to_string(),
    }
}
