use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

use super::{EngineHandle, PageContext, RenderEngine};
use crate::error::RenderResult;

/// Owns the one shared engine handle.
///
/// The handle is launched lazily on first use. Launch and shutdown run under
/// the same async mutex, so concurrent first callers wait for a single launch
/// instead of racing to start a second engine.
pub struct RenderSessionManager {
    engine: Arc<dyn RenderEngine>,
    session: Mutex<Option<Arc<dyn EngineHandle>>>,
    shutdown_timeout: Duration,
}

impl RenderSessionManager {
    pub fn new(engine: Arc<dyn RenderEngine>, shutdown_timeout: Duration) -> Self {
        Self {
            engine,
            session: Mutex::new(None),
            shutdown_timeout,
        }
    }

    /// Current engine handle, launching it if needed. A failed launch leaves
    /// nothing memoized; the next caller tries again.
    pub async fn acquire_session(&self) -> RenderResult<Arc<dyn EngineHandle>> {
        let mut guard = self.session.lock().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(handle.clone());
        }

        info!("render: launching engine");
        let handle = self.engine.launch().await?;
        *guard = Some(handle.clone());
        info!("render: engine ready");
        Ok(handle)
    }

    pub async fn new_page_context(
        &self,
        session: &Arc<dyn EngineHandle>,
    ) -> RenderResult<Box<dyn PageContext>> {
        session.new_context().await
    }

    pub async fn is_launched(&self) -> bool {
        self.session.lock().await.is_some()
    }

    /// Close the engine if one is running. Safe to call repeatedly or before
    /// any launch. The close is bounded by the shutdown timeout; the handle
    /// is forgotten either way, so a later acquire relaunches.
    pub async fn shutdown(&self) {
        let Some(handle) = self.session.lock().await.take() else {
            return;
        };

        info!("render: closing engine");
        match tokio::time::timeout(self.shutdown_timeout, handle.close()).await {
            Ok(Ok(())) => info!("render: engine closed"),
            Ok(Err(e)) => warn!(error = %e, "render: engine close failed"),
            Err(_) => warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "render: engine close timed out, abandoning handle"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockEngine;

    #[tokio::test]
    async fn shutdown_before_launch_is_a_noop() {
        let engine = Arc::new(MockEngine::new());
        let manager = RenderSessionManager::new(engine.clone(), Duration::from_secs(1));

        manager.shutdown().await;
        manager.shutdown().await;

        assert!(!manager.is_launched().await);
        assert_eq!(engine.launches(), 0);
        assert_eq!(engine.closes(), 0);
    }

    #[tokio::test]
    async fn acquire_reuses_the_launched_handle() {
        let engine = Arc::new(MockEngine::new());
        let manager = RenderSessionManager::new(engine.clone(), Duration::from_secs(1));

        let a = manager.acquire_session().await.unwrap();
        let b = manager.acquire_session().await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(engine.launches(), 1);
    }

    #[tokio::test]
    async fn shutdown_twice_closes_once_and_clears_session() {
        let engine = Arc::new(MockEngine::new());
        let manager = RenderSessionManager::new(engine.clone(), Duration::from_secs(1));
        manager.acquire_session().await.unwrap();

        manager.shutdown().await;
        assert!(!manager.is_launched().await);
        manager.shutdown().await;
        assert!(!manager.is_launched().await);

        assert_eq!(engine.closes(), 1);
    }

    #[tokio::test]
    async fn acquire_after_shutdown_relaunches() {
        let engine = Arc::new(MockEngine::new());
        let manager = RenderSessionManager::new(engine.clone(), Duration::from_secs(1));

        manager.acquire_session().await.unwrap();
        manager.shutdown().await;
        manager.acquire_session().await.unwrap();

        assert_eq!(engine.launches(), 2);
    }

    #[tokio::test]
    async fn failed_launch_is_not_memoized() {
        let engine = Arc::new(MockEngine::new().fail_launches(1));
        let manager = RenderSessionManager::new(engine.clone(), Duration::from_secs(1));

        assert!(manager.acquire_session().await.is_err());
        assert!(!manager.is_launched().await);
        assert!(manager.acquire_session().await.is_ok());
        assert_eq!(engine.launches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_close_is_bounded() {
        let engine = Arc::new(MockEngine::new().hang_on_close());
        let manager = RenderSessionManager::new(engine.clone(), Duration::from_secs(5));
        manager.acquire_session().await.unwrap();

        let started = tokio::time::Instant::now();
        manager.shutdown().await;

        assert!(started.elapsed() >= Duration::from_secs(5));
        assert!(started.elapsed() < Duration::from_secs(6));
        assert!(!manager.is_launched().await);
    }

    #[tokio::test]
    async fn concurrent_first_acquires_launch_once() {
        let engine = Arc::new(MockEngine::new().launch_delay(Duration::from_millis(20)));
        let manager = Arc::new(RenderSessionManager::new(engine.clone(), Duration::from_secs(1)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.acquire_session().await.is_ok() })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap());
        }

        assert_eq!(engine.launches(), 1);
    }
}
