use std::time::Duration;

use tracing::{debug, info};

use crate::extract::Extract;
use crate::render::PageContext;
use crate::types::Resolution;

/// Bounded, fixed-delay retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            delay: Duration::from_secs(1),
        }
    }
}

/// Run `extractor` until it returns a definitive answer or the attempt
/// budget runs out. Sleeps between attempts only, never after the last.
pub async fn resolve_with_retry<E>(
    extractor: &E,
    page: &mut dyn PageContext,
    url: &str,
    policy: RetryPolicy,
) -> Resolution
where
    E: Extract + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        let result = extractor.extract(page, url).await;
        if result.is_definitive() {
            info!(url, attempt, result = %result, "retry: resolved");
            return result;
        }

        if attempt < max_attempts {
            debug!(url, attempt, max_attempts, "retry: no value yet, retrying");
            tokio::time::sleep(policy.delay).await;
        }
    }

    info!(url, attempts = max_attempts, "retry: exhausted");
    Resolution::Unknown
}
