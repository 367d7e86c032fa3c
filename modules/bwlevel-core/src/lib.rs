//! Player level resolution: a TTL cache in front of a rendered-page
//! extraction pipeline that shares one long-lived rendering engine.

pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod render;
pub mod resolver;
pub mod retry;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;

pub use cache::{CacheEntry, CacheStore};
pub use config::{load_config, EngineConfig, FileConfig, Locators, ProfileConfig, ResolverSettings};
pub use error::{RenderError, RenderResult};
pub use extract::{ContentExtractor, Extract};
pub use resolver::Resolver;
pub use retry::{resolve_with_retry, RetryPolicy};
pub use types::{PlayerName, Resolution, ResolutionStatus, ResolutionView};
