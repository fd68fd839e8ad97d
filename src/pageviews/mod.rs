//! Page view data: the upstream pageview API client and its caching wrapper.

pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod dates;
pub mod http;
pub mod service;
pub mod types;

use color_eyre::Result;
use std::sync::Arc;
use tracing::debug;

use crate::cache::{ConfiguredStore, NoopStore, SqliteStore};
use crate::config::Config;

pub use cached_client::CachedPageViewService;
pub use client::WikimediaClient;
pub use dates::{Clock, DateRange, FixedClock, SystemClock};
pub use http::{HttpFetch, OriginalRequest, ReqwestFetcher};
pub use service::PageViewService;
pub use types::{Access, Agent, Metric, PageData, Scope, TimeSeries, TopPage};

/// The service stack used by the binary.
pub type DefaultService = CachedPageViewService<WikimediaClient<ReqwestFetcher>, ConfiguredStore>;

/// Build the cached service described by `config`. Upstream requests are
/// attributed to `original_request` when given.
pub fn build_service(
  config: &Config,
  original_request: Option<OriginalRequest>,
) -> Result<DefaultService> {
  build_service_with(
    config,
    ReqwestFetcher::new()?,
    Arc::new(SystemClock),
    original_request,
  )
}

/// Build the cached service over an arbitrary transport and clock.
pub fn build_service_with<H: HttpFetch>(
  config: &Config,
  http: H,
  clock: Arc<dyn Clock>,
  original_request: Option<OriginalRequest>,
) -> Result<CachedPageViewService<WikimediaClient<H>, ConfiguredStore>> {
  let mut inner = WikimediaClient::new(http, &config.upstream, clock.clone())?;
  if let Some(original_request) = original_request {
    inner = inner.with_original_request(original_request);
  }

  let store = if config.cache.enabled {
    let store = SqliteStore::open(config.cache.path.as_deref())?;
    ConfiguredStore::Sqlite(store)
  } else {
    debug!("Caching disabled");
    ConfiguredStore::Disabled(NoopStore)
  };

  Ok(
    CachedPageViewService::new(inner, store, config.cache.prefix.clone())
      .with_cached_days(config.cache.cached_days())
      .with_clock(clock),
  )
}
