// Local headless Chrome backend.
//
// Chrome is driven through `--dump-dom`: each render is one short-lived
// process that loads the page, lets scripts run for a virtual time budget,
// and prints the serialized DOM. The long-lived part is the engine handle,
// which owns the profile root and the concurrency limit.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{DomSnapshot, EngineHandle, NavigateOptions, PageContext, RenderEngine};
use crate::error::{RenderError, RenderResult};

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);
/// Script time granted to the first render of a page.
const INITIAL_VIRTUAL_BUDGET: Duration = Duration::from_secs(2);
/// Re-renders during a selector wait start here and double.
const WAIT_VIRTUAL_BUDGET: Duration = Duration::from_secs(4);

pub struct ChromeEngine {
    bin: String,
    max_concurrent: usize,
}

impl ChromeEngine {
    pub fn new(bin: &str, max_concurrent: usize) -> Self {
        Self {
            bin: bin.to_string(),
            max_concurrent: max_concurrent.max(1),
        }
    }
}

#[async_trait]
impl RenderEngine for ChromeEngine {
    async fn launch(&self) -> RenderResult<Arc<dyn EngineHandle>> {
        let output = tokio::time::timeout(
            VERSION_TIMEOUT,
            tokio::process::Command::new(&self.bin)
                .arg("--version")
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| RenderError::Launch(format!("{} --version timed out", self.bin)))?
        .map_err(|e| RenderError::Launch(format!("failed to run {}: {e}", self.bin)))?;

        if !output.status.success() {
            return Err(RenderError::Launch(format!(
                "{} --version exited with {}",
                self.bin, output.status
            )));
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();

        let profiles = tempfile::Builder::new()
            .prefix("bwlevel-chrome-")
            .tempdir()
            .map_err(|e| RenderError::Launch(format!("failed to create profile root: {e}")))?;

        info!(
            bin = %self.bin,
            version = %version,
            max_concurrent = self.max_concurrent,
            "chrome: engine ready"
        );

        Ok(Arc::new(ChromeHandle {
            bin: self.bin.clone(),
            root: profiles.path().to_path_buf(),
            profiles: Mutex::new(Some(profiles)),
            semaphore: Arc::new(Semaphore::new(self.max_concurrent)),
        }))
    }
}

struct ChromeHandle {
    bin: String,
    root: PathBuf,
    profiles: Mutex<Option<TempDir>>,
    semaphore: Arc<Semaphore>,
}

#[async_trait]
impl EngineHandle for ChromeHandle {
    async fn new_context(&self) -> RenderResult<Box<dyn PageContext>> {
        if self.semaphore.is_closed() {
            return Err(RenderError::Closed);
        }
        // Each context gets its own profile: Chrome locks its user-data-dir.
        let profile = tempfile::tempdir_in(&self.root)
            .map_err(|e| RenderError::Backend(format!("failed to create profile dir: {e}")))?;

        Ok(Box::new(ChromePage {
            bin: self.bin.clone(),
            profile: Some(profile),
            semaphore: self.semaphore.clone(),
            url: None,
            dom: DomSnapshot::default(),
        }))
    }

    async fn close(&self) -> RenderResult<()> {
        self.semaphore.close();
        let profiles = self.profiles.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(dir) = profiles {
            dir.close()
                .map_err(|e| RenderError::Backend(format!("failed to remove profile root: {e}")))?;
        }
        Ok(())
    }
}

struct ChromePage {
    bin: String,
    profile: Option<TempDir>,
    semaphore: Arc<Semaphore>,
    url: Option<String>,
    dom: DomSnapshot,
}

impl ChromePage {
    /// One `--dump-dom` run bounded by `timeout`.
    async fn dump_dom(
        &self,
        url: &str,
        virtual_budget: Duration,
        timeout: Duration,
    ) -> RenderResult<DomSnapshot> {
        let profile = self.profile.as_ref().ok_or(RenderError::Closed)?;
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| RenderError::Closed)?;

        let result = tokio::time::timeout(
            timeout,
            tokio::process::Command::new(&self.bin)
                .args([
                    "--headless",
                    "--no-sandbox",
                    "--disable-gpu",
                    "--disable-dev-shm-usage",
                    &format!("--user-data-dir={}", profile.path().display()),
                    &format!("--virtual-time-budget={}", virtual_budget.as_millis()),
                    "--dump-dom",
                    url,
                ])
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) if output.status.success() => {
                if output.stdout.is_empty() {
                    return Err(RenderError::Navigation {
                        url: url.to_string(),
                        message: "empty DOM output".to_string(),
                    });
                }
                Ok(DomSnapshot::new(String::from_utf8_lossy(&output.stdout)))
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                warn!(url, stderr = %stderr, "chrome: exited with error");
                Err(RenderError::Navigation {
                    url: url.to_string(),
                    message: format!("chrome exited with {}", output.status),
                })
            }
            Ok(Err(e)) => Err(RenderError::Backend(format!("failed to run chrome: {e}"))),
            Err(_) => Err(RenderError::Timeout {
                what: format!("render of {url}"),
                after: timeout,
            }),
        }
    }
}

#[async_trait]
impl PageContext for ChromePage {
    async fn navigate(&mut self, url: &str, options: NavigateOptions) -> RenderResult<()> {
        let parsed = url::Url::parse(url).map_err(|e| RenderError::Navigation {
            url: url.to_string(),
            message: format!("invalid URL: {e}"),
        })?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(RenderError::Navigation {
                url: url.to_string(),
                message: format!("only http/https URLs allowed, got: {}", parsed.scheme()),
            });
        }

        // --dump-dom fires after the load event; the wait condition only
        // shapes how long scripts get to run before the snapshot.
        debug!(url, wait_until = ?options.wait_until, "chrome: navigating");
        let budget = INITIAL_VIRTUAL_BUDGET.min(options.timeout);
        self.dom = self.dump_dom(url, budget, options.timeout).await?;
        self.url = Some(url.to_string());
        Ok(())
    }

    async fn wait_for(&mut self, selector: &str, timeout: Duration) -> RenderResult<()> {
        if self.dom.contains(selector)? {
            return Ok(());
        }
        let url = self.url.clone().ok_or_else(|| RenderError::Navigation {
            url: String::new(),
            message: "wait_for called before navigate".to_string(),
        })?;

        let deadline = Instant::now() + timeout;
        let mut budget = WAIT_VIRTUAL_BUDGET;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RenderError::Timeout {
                    what: format!("selector {selector:?}"),
                    after: timeout,
                });
            }

            debug!(url = %url, selector, budget_ms = budget.as_millis() as u64, "chrome: re-rendering for selector");
            match self.dump_dom(&url, budget.min(remaining), remaining).await {
                Ok(dom) => {
                    self.dom = dom;
                    if self.dom.contains(selector)? {
                        return Ok(());
                    }
                }
                Err(e) if e.is_timeout() => {
                    return Err(RenderError::Timeout {
                        what: format!("selector {selector:?}"),
                        after: timeout,
                    });
                }
                Err(e) => return Err(e),
            }
            budget = budget.saturating_mul(2).min(timeout);
        }
    }

    async fn read(&mut self, selector: &str) -> RenderResult<Option<String>> {
        self.dom.text(selector)
    }

    async fn close(&mut self) -> RenderResult<()> {
        self.dom = DomSnapshot::default();
        self.url = None;
        if let Some(profile) = self.profile.take() {
            profile
                .close()
                .map_err(|e| RenderError::Backend(format!("failed to remove profile dir: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(unix)]
    use std::path::Path;

    const LEVEL_PAGE: &str = r#"<html><body><div id="root"><span class="level">[LVL 9]</span></div></body></html>"#;
    const EMPTY_PAGE: &str = r#"<html><body><div id="root">no stats</div></body></html>"#;

    /// Stand-in chrome binary: answers `--version`, and for `--dump-dom`
    /// prints `late` once `ready_after` renders have happened, `early` before.
    #[cfg(unix)]
    fn stub_chrome(dir: &Path, early: &str, late: &str, ready_after: u32) -> String {
        use std::os::unix::fs::PermissionsExt;

        let counter = dir.join("renders");
        let script = format!(
            r#"#!/bin/sh
for arg in "$@"; do
  if [ "$arg" = "--version" ]; then echo "Chromium 0.0 (stub)"; exit 0; fi
done
n=$(cat "{counter}" 2>/dev/null || echo 0)
n=$((n + 1))
echo "$n" > "{counter}"
if [ "$n" -ge {ready_after} ]; then echo '{late}'; else echo '{early}'; fi
"#,
            counter = counter.display(),
        );
        let bin = dir.join("chrome-stub");
        std::fs::write(&bin, script).unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        bin.display().to_string()
    }

    fn navigate_options() -> NavigateOptions {
        NavigateOptions {
            wait_until: crate::render::WaitUntil::DomContentLoaded,
            timeout: Duration::from_secs(10),
        }
    }

    #[tokio::test]
    async fn launch_fails_for_missing_binary() {
        let engine = ChromeEngine::new("/nonexistent/chromium-bwlevel-test", 1);
        let err = engine.launch().await.err().unwrap();
        assert!(matches!(err, RenderError::Launch(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn selector_found_on_later_render() {
        let dir = tempfile::tempdir().unwrap();
        let bin = stub_chrome(dir.path(), EMPTY_PAGE, LEVEL_PAGE, 3);
        let handle = ChromeEngine::new(&bin, 1).launch().await.unwrap();
        let mut page = handle.new_context().await.unwrap();

        page.navigate("https://karma.test/player/Alice", navigate_options())
            .await
            .unwrap();
        assert_eq!(page.read("span.level").await.unwrap(), None);

        page.wait_for("span.level", Duration::from_secs(10)).await.unwrap();
        assert_eq!(
            page.read("span.level").await.unwrap().as_deref(),
            Some("[LVL 9]")
        );

        page.close().await.unwrap();
        handle.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn selector_never_present_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let bin = stub_chrome(dir.path(), EMPTY_PAGE, EMPTY_PAGE, 1);
        let handle = ChromeEngine::new(&bin, 1).launch().await.unwrap();
        let mut page = handle.new_context().await.unwrap();

        page.navigate("https://karma.test/player/Alice", navigate_options())
            .await
            .unwrap();

        // Fast renders without the selector keep re-rendering until the deadline.
        let timeout = Duration::from_secs(2);
        let started = std::time::Instant::now();
        let err = page.wait_for("#never", timeout).await.unwrap_err();

        assert!(err.is_timeout(), "unexpected error: {err}");
        assert!(started.elapsed() >= timeout - Duration::from_millis(100));

        page.close().await.unwrap();
        handle.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_http_url_is_rejected_without_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let bin = stub_chrome(dir.path(), LEVEL_PAGE, LEVEL_PAGE, 1);
        let handle = ChromeEngine::new(&bin, 1).launch().await.unwrap();
        let mut page = handle.new_context().await.unwrap();

        let err = page
            .navigate("file:///etc/passwd", navigate_options())
            .await
            .unwrap_err();

        assert!(matches!(err, RenderError::Navigation { .. }));
        assert!(!dir.path().join("renders").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn closed_handle_refuses_new_contexts() {
        let dir = tempfile::tempdir().unwrap();
        let bin = stub_chrome(dir.path(), LEVEL_PAGE, LEVEL_PAGE, 1);
        let handle = ChromeEngine::new(&bin, 1).launch().await.unwrap();

        handle.close().await.unwrap();

        let err = handle.new_context().await.err().unwrap();
        assert!(matches!(err, RenderError::Closed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn page_close_removes_its_profile_dir() {
        let dir = tempfile::tempdir().unwrap();
        let bin = stub_chrome(dir.path(), LEVEL_PAGE, LEVEL_PAGE, 1);
        let root = tempfile::tempdir().unwrap();
        let profile = tempfile::tempdir_in(root.path()).unwrap();
        let profile_path = profile.path().to_path_buf();
        let mut page = ChromePage {
            bin,
            profile: Some(profile),
            semaphore: Arc::new(Semaphore::new(1)),
            url: None,
            dom: DomSnapshot::default(),
        };

        page.navigate("https://karma.test/player/Alice", navigate_options())
            .await
            .unwrap();
        page.close().await.unwrap();

        assert!(!profile_path.exists());
        let err = page
            .navigate("https://karma.test/player/Alice", navigate_options())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Closed));
    }
}
