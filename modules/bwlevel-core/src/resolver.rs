// Resolver: the public entry point.
//
// resolve(name): fresh cache entry → return it. Otherwise render the profile
// (one shared render per name at a time), write back definitive results, and
// fall back to a stale entry when the refresh comes back Unknown.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::cache::CacheStore;
use crate::config::{FileConfig, Locators, ProfileConfig, ResolverSettings};
use crate::error::RenderResult;
use crate::extract::{ContentExtractor, Extract};
use crate::render::{RenderEngine, RenderSessionManager};
use crate::retry::{resolve_with_retry, RetryPolicy};
use crate::types::{PlayerName, Resolution};

type InflightRender = Shared<BoxFuture<'static, Resolution>>;

/// In-flight renders keyed by name, tagged so a finished render only ever
/// removes its own entry.
type InflightMap = HashMap<PlayerName, (u64, InflightRender)>;

/// Cheap to clone; clones share the cache and the render session.
#[derive(Clone)]
pub struct Resolver {
    inner: Arc<ResolverInner>,
}

struct ResolverInner {
    cache: CacheStore,
    sessions: RenderSessionManager,
    extractor: Arc<dyn Extract>,
    profile: ProfileConfig,
    policy: RetryPolicy,
    inflight: Mutex<InflightMap>,
    next_render_id: AtomicU64,
}

impl Resolver {
    pub fn new(
        engine: Arc<dyn RenderEngine>,
        profile: ProfileConfig,
        locators: Locators,
        settings: &ResolverSettings,
    ) -> Self {
        let extractor = ContentExtractor::new(
            locators,
            settings.navigation_timeout(),
            settings.content_timeout(),
        );
        Self::with_extractor(engine, Arc::new(extractor), profile, settings)
    }

    pub fn from_config(engine: Arc<dyn RenderEngine>, config: &FileConfig) -> Self {
        Self::new(
            engine,
            config.profile.clone(),
            config.locators.clone(),
            &config.resolver,
        )
    }

    /// Resolver with a custom extraction step.
    pub fn with_extractor(
        engine: Arc<dyn RenderEngine>,
        extractor: Arc<dyn Extract>,
        profile: ProfileConfig,
        settings: &ResolverSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                cache: CacheStore::new(settings.ttl()),
                sessions: RenderSessionManager::new(engine, settings.shutdown_timeout()),
                extractor,
                profile,
                policy: RetryPolicy {
                    max_attempts: settings.max_attempts,
                    delay: settings.retry_delay(),
                },
                inflight: Mutex::new(HashMap::new()),
                next_render_id: AtomicU64::new(0),
            }),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    pub fn sessions(&self) -> &RenderSessionManager {
        &self.inner.sessions
    }

    /// Resolve a player's level. Never fails: problems come back as
    /// [`Resolution::Unknown`].
    pub async fn resolve(&self, name: &str) -> Resolution {
        let Some(name) = PlayerName::parse(name) else {
            warn!("resolve: blank player name");
            return Resolution::Unknown;
        };

        let now = Instant::now();
        if let Some(entry) = self.inner.cache.fresh(&name, now) {
            debug!(name = %name, result = %entry.result, "resolve: cache hit");
            return entry.result;
        }

        self.shared_refresh(name, now).await
    }

    /// [`Resolver::resolve`] bounded by `deadline`. Giving up only abandons
    /// this caller's wait; the render carries on and still fills the cache.
    pub async fn resolve_within(&self, name: &str, deadline: Duration) -> Resolution {
        match tokio::time::timeout(deadline, self.resolve(name)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    name,
                    deadline_secs = deadline.as_secs(),
                    "resolve: caller deadline elapsed"
                );
                Resolution::Unknown
            }
        }
    }

    /// Close the shared render session. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.sessions.shutdown().await;
    }

    /// Join the in-flight render for `name`, starting one if there is none.
    async fn shared_refresh(&self, name: PlayerName, now: Instant) -> Resolution {
        let render = {
            let mut inflight = self.inner.inflight();
            match inflight.get(&name) {
                Some((_, render)) => {
                    debug!(name = %name, "resolve: joining in-flight render");
                    render.clone()
                }
                None => {
                    let id = self.inner.next_render_id.fetch_add(1, Ordering::Relaxed);
                    let render = self.spawn_refresh(name.clone(), id, now);
                    inflight.insert(name, (id, render.clone()));
                    render
                }
            }
        };
        render.await
    }

    /// The refresh runs on its own task so dropped callers cannot cancel it.
    /// Called with the in-flight map locked; the task's own cleanup waits for
    /// the insert.
    fn spawn_refresh(&self, name: PlayerName, id: u64, now: Instant) -> InflightRender {
        let inner = self.inner.clone();
        let key = name.clone();
        let task = tokio::spawn(async move {
            let result = inner.refresh(&key, now).await;
            inner.finish(&key, id);
            result
        });

        let inner = self.inner.clone();
        async move {
            let result = task.await.unwrap_or_else(|e| {
                error!(name = %name, error = %e, "resolve: render task failed");
                Resolution::Unknown
            });
            // Covers a panicked task; a no-op after a normal finish.
            inner.finish(&name, id);
            result
        }
        .boxed()
        .shared()
    }
}

impl ResolverInner {
    fn inflight(&self) -> MutexGuard<'_, InflightMap> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn finish(&self, name: &PlayerName, id: u64) {
        let mut inflight = self.inflight();
        if inflight.get(name).is_some_and(|(current, _)| *current == id) {
            inflight.remove(name);
        }
    }

    async fn refresh(&self, name: &PlayerName, now: Instant) -> Resolution {
        let url = self.profile.url_for(name);
        let started = Instant::now();

        let result = match self.render(&url).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    name = %name,
                    url = %url,
                    error = %e,
                    "resolve: render session unavailable"
                );
                Resolution::Unknown
            }
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if result.is_definitive() {
            self.cache.put(name, result, now);
            info!(name = %name, result = %result, elapsed_ms, "resolve: cached");
            return result;
        }

        if let Some(stale) = self.cache.get(name) {
            warn!(
                name = %name,
                result = %stale.result,
                elapsed_ms,
                "resolve: refresh failed, serving stale entry"
            );
            return stale.result;
        }

        info!(name = %name, elapsed_ms, "resolve: no value");
        Resolution::Unknown
    }

    /// One page context for the whole retry sequence, closed on the way out.
    async fn render(&self, url: &str) -> RenderResult<Resolution> {
        let session = self.sessions.acquire_session().await?;
        let mut page = self.sessions.new_page_context(&session).await?;

        let result =
            resolve_with_retry(self.extractor.as_ref(), page.as_mut(), url, self.policy).await;

        if let Err(e) = page.close().await {
            warn!(url, error = %e, "resolve: failed to close page context");
        }
        Ok(result)
    }
}
