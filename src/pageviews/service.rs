use async_trait::async_trait;
use color_eyre::Result;

use super::types::{Metric, PageData, Scope, TimeSeries, TopPage};
use crate::status::Status;

/// Access to page view data.
///
/// Implementations either talk to an analytics backend directly or wrap
/// another implementation (e.g. to add caching). `Err` is reserved for
/// invalid arguments and local failures; upstream problems are reported
/// through the returned [`Status`].
#[async_trait]
pub trait PageViewService: Send + Sync {
  /// Whether data is available for the metric/scope combination.
  fn supports(&self, metric: Metric, scope: Scope) -> bool;

  /// Daily counts for the last `days` days for each title.
  ///
  /// The result keeps the order of `titles`, but may cover only a prefix
  /// of them if fetching everything is considered too expensive. Per-title
  /// success flags are attached to the status.
  async fn get_page_data(
    &self,
    titles: &[String],
    days: u32,
    metric: Metric,
  ) -> Result<Status<Vec<PageData>>>;

  /// Total daily counts for the whole site for the last `days` days.
  async fn get_site_data(&self, days: u32, metric: Metric) -> Result<Status<TimeSeries>>;

  /// Most viewed pages, in descending order.
  async fn get_top_pages(&self, metric: Metric) -> Result<Status<Vec<TopPage>>>;

  /// How long results for this metric/scope may be cached, in seconds.
  fn get_cache_expiry(&self, metric: Metric, scope: Scope) -> u64;
}
