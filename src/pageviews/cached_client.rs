//! Page view service that wraps another service with transparent caching.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::cache::{CacheLayer, CacheSlot, CacheStore};
use crate::config::MIN_CACHED_DAYS;
use crate::status::{Message, Status};

use super::cache::PageViewKey;
use super::dates::{self, Clock, DateRange, SystemClock};
use super::service::PageViewService;
use super::types::{Metric, PageData, Scope, TimeSeries, TopPage};

/// Upper bound of the random delay added to every success expiry, so that
/// entries written together don't all expire together.
const MAX_JITTER_SECS: u64 = 600;

/// Per-title outcome while a multi-title request is being assembled.
struct Resolved {
  views: TimeSeries,
  ok: bool,
}

/// Page view service with transparent caching support.
///
/// Upstream is always asked for `cached_days` days so that every cache entry
/// has the same width; responses are cut or padded to what the caller asked for.
/// Failures are cached too (for [`crate::cache::ERROR_EXPIRY`]) so a broken
/// upstream isn't hammered.
pub struct CachedPageViewService<S: PageViewService, C: CacheStore> {
  inner: S,
  cache: CacheLayer<C>,
  /// Disambiguates instances sharing one store
  prefix: String,
  cached_days: u32,
  clock: Arc<dyn Clock>,
}

impl<S: PageViewService, C: CacheStore> CachedPageViewService<S, C> {
  pub fn new(inner: S, store: C, prefix: impl Into<String>) -> Self {
    Self {
      inner,
      cache: CacheLayer::new(store),
      prefix: prefix.into(),
      cached_days: MIN_CACHED_DAYS,
      clock: Arc::new(SystemClock),
    }
  }

  /// Width of cached series. Must be at least the largest `days` callers use,
  /// otherwise longer requests are padded with empty days.
  pub fn with_cached_days(mut self, cached_days: u32) -> Self {
    self.cached_days = cached_days.max(1);
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn cached_days(&self) -> u32 {
    self.cached_days
  }

  fn range(&self) -> DateRange {
    DateRange::from_clock(self.clock.as_ref())
  }

  fn success_expiry(&self, metric: Metric, scope: Scope) -> Duration {
    Duration::from_secs(self.get_cache_expiry(metric, scope))
  }

  /// Cut or pad a cached-width series to `days`.
  fn reshape(&self, series: &TimeSeries, days: u32) -> Result<TimeSeries> {
    if series.is_empty() {
      return Ok(self.range().empty_range(days));
    }
    dates::fit_to_width(series, self.cached_days, days)
  }

  fn article_key(&self, title: &str, metric: Metric) -> String {
    self.cache.key(&PageViewKey::Article {
      prefix: self.prefix.clone(),
      days: self.cached_days,
      metric,
      title: title.to_string(),
    })
  }

  /// Check a freshly fetched series. Anything narrower than the cached
  /// width is unusable; the title is then reported with empty days.
  fn validate_series(&self, title: &str, views: Option<TimeSeries>) -> Option<TimeSeries> {
    let expected = self.cached_days as usize;
    match views {
      Some(views) if views.len() >= expected => {
        Some(dates::truncate_to_last(&views, self.cached_days))
      }
      Some(views) => {
        warn!(
          %title,
          days = views.len(),
          expected,
          "Upstream returned fewer days than requested"
        );
        None
      }
      None => {
        warn!(%title, "Upstream returned no data for an attempted title");
        None
      }
    }
  }

  /// Resolve titles from the cache first and fetch the rest in one batch.
  ///
  /// The result is the longest prefix of `titles` in which every title was
  /// resolved, either from the cache or by the upstream call.
  async fn titles_with_cache(
    &self,
    titles: &[String],
    metric: Metric,
  ) -> Result<(Vec<(String, Resolved)>, Vec<Message>)> {
    let keys: Vec<String> = titles.iter().map(|t| self.article_key(t, metric)).collect();
    let cached = self.cache.lookup_many::<TimeSeries>(&keys)?;

    let mut resolved: HashMap<&str, Resolved> = HashMap::with_capacity(titles.len());
    let mut uncached = Vec::new();
    for (title, key) in titles.iter().zip(&keys) {
      match cached.get(key) {
        Some(CacheSlot::Success(views)) => {
          resolved.insert(
            title,
            Resolved {
              views: views.clone(),
              ok: true,
            },
          );
        }
        Some(CacheSlot::Failure) => {
          resolved.insert(
            title,
            Resolved {
              views: TimeSeries::new(),
              ok: false,
            },
          );
        }
        None => uncached.push(title.clone()),
      }
    }
    debug!(
      titles = titles.len(),
      uncached = uncached.len(),
      %metric,
      "Looked up article cache"
    );

    if !uncached.is_empty() {
      let status = self
        .inner
        .get_page_data(&uncached, self.cached_days, metric)
        .await?;
      // upstream may stop early; titles it didn't attempt stay unresolved
      let attempted: HashMap<String, bool> = status.success().iter().cloned().collect();
      let mut pages: HashMap<String, TimeSeries> = status
        .into_value()
        .into_iter()
        .map(|page| (page.title, page.views))
        .collect();

      for title in titles {
        let Some(&upstream_ok) = attempted.get(title) else {
          continue;
        };
        if resolved.contains_key(title.as_str()) {
          continue;
        }
        let views = self.validate_series(title, pages.remove(title));
        let key = self.article_key(title, metric);
        let entry = match views {
          Some(views) if upstream_ok => {
            self
              .cache
              .store_success(&key, &views, self.success_expiry(metric, Scope::Article))?;
            Resolved { views, ok: true }
          }
          _ => {
            self.cache.store_failure(&key)?;
            Resolved {
              views: TimeSeries::new(),
              ok: false,
            }
          }
        };
        resolved.insert(title, entry);
      }
    }

    let mut result = Vec::with_capacity(titles.len());
    let mut messages = Vec::new();
    for title in titles {
      let Some(entry) = resolved.remove(title.as_str()) else {
        debug!(%title, "Truncating result at first unresolved title");
        break;
      };
      if !entry.ok {
        messages.push(Message::cached_error_title(title, self.cache.error_expiry()));
      }
      result.push((title.clone(), entry));
    }
    Ok((result, messages))
  }
}

#[async_trait]
impl<S: PageViewService, C: CacheStore> PageViewService for CachedPageViewService<S, C> {
  fn supports(&self, metric: Metric, scope: Scope) -> bool {
    self.inner.supports(metric, scope)
  }

  async fn get_page_data(
    &self,
    titles: &[String],
    days: u32,
    metric: Metric,
  ) -> Result<Status<Vec<PageData>>> {
    if days == 0 {
      return Err(eyre!("Invalid days: {}", days));
    }

    let mut seen = HashSet::new();
    let titles: Vec<String> = titles
      .iter()
      .filter(|t| seen.insert(t.as_str()))
      .cloned()
      .collect();
    if titles.is_empty() {
      return Ok(Status::good(Vec::new()));
    }

    let (resolved, messages) = self.titles_with_cache(&titles, metric).await?;

    let mut pages = Vec::with_capacity(resolved.len());
    let mut success = Vec::with_capacity(resolved.len());
    for (title, entry) in resolved {
      let views = self.reshape(&entry.views, days)?;
      pages.push(PageData::new(title.clone(), views));
      success.push((title, entry.ok));
    }

    let ok = success.iter().any(|(_, ok)| *ok);
    Ok(Status::new(pages, ok, messages).with_success(success))
  }

  async fn get_site_data(&self, days: u32, metric: Metric) -> Result<Status<TimeSeries>> {
    if days == 0 {
      return Err(eyre!("Invalid days: {}", days));
    }
    let key = PageViewKey::Site {
      prefix: self.prefix.clone(),
      days: self.cached_days,
      metric,
    };

    let status = self
      .cache
      .fetch(
        &key,
        || self.success_expiry(metric, Scope::Site),
        || self.inner.get_site_data(self.cached_days, metric),
      )
      .await?;

    let views = if status.is_ok() {
      self.reshape(status.value(), days)?
    } else {
      self.range().empty_range(days)
    };
    Ok(status.map(|_| views))
  }

  async fn get_top_pages(&self, metric: Metric) -> Result<Status<Vec<TopPage>>> {
    let key = PageViewKey::Top {
      prefix: self.prefix.clone(),
      metric,
    };

    self
      .cache
      .fetch(
        &key,
        || self.success_expiry(metric, Scope::Top),
        || self.inner.get_top_pages(metric),
      )
      .await
  }

  fn get_cache_expiry(&self, metric: Metric, scope: Scope) -> u64 {
    // add some random delay to prevent cache stampedes
    self.inner.get_cache_expiry(metric, scope) + rand::thread_rng().gen_range(0..=MAX_JITTER_SECS)
  }
}
