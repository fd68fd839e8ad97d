//! Command handlers behind the `pvi` subcommands.
//!
//! Handlers talk to any [`PageViewService`] and return serializable output.
//! A status that is not OK becomes an error; an OK status with messages has
//! them attached as warnings.

use chrono::NaiveDate;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::pageviews::types::find_page;
use crate::pageviews::{Metric, PageData, PageViewService, Scope, TimeSeries, TopPage};
use crate::status::Status;

/// Window used by `info`.
pub const INFO_DAYS: u32 = 30;

pub const DEFAULT_TOP_LIMIT: usize = 10;
pub const MAX_TOP_LIMIT: usize = 500;

/// Result of a command, printed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandOutput<T> {
  pub data: T,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub warnings: Vec<String>,
  /// Pass this back to get the next batch
  #[serde(rename = "continue", skip_serializing_if = "Option::is_none")]
  pub continue_from: Option<String>,
}

impl<T> CommandOutput<T> {
  fn new(data: T, warnings: Vec<String>) -> Self {
    Self {
      data,
      warnings,
      continue_from: None,
    }
  }
}

/// Summary shown for a single page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageInfo {
  pub title: String,
  pub total: u64,
  pub first_day: Option<NaiveDate>,
  pub last_day: Option<NaiveDate>,
}

/// Parse a metric by its API name (`pageviews`, `uniques`).
pub fn parse_metric(name: &str) -> std::result::Result<Metric, String> {
  Metric::ALL
    .into_iter()
    .find(|m| m.api_name() == name)
    .ok_or_else(|| format!("unknown metric '{}' (expected pageviews or uniques)", name))
}

/// Requested day count, defaulting to (and capped at) `max_days`.
pub fn validate_days(days: Option<u32>, max_days: u32) -> Result<u32> {
  let days = days.unwrap_or(max_days);
  if days == 0 || days > max_days {
    return Err(eyre!("days must be between 1 and {}", max_days));
  }
  Ok(days)
}

fn ensure_supported<S: PageViewService>(service: &S, metric: Metric, scope: Scope) -> Result<()> {
  if !service.supports(metric, scope) {
    return Err(eyre!(
      "Metric '{}' is not supported for {}",
      metric.api_name(),
      scope.api_name()
    ));
  }
  Ok(())
}

/// Split a status into its value and warning texts, or fail with its messages.
fn unwrap_status<T>(status: Status<T>) -> Result<(T, Vec<String>)> {
  if !status.is_ok() {
    let texts: Vec<String> = status.messages().iter().map(|m| m.text()).collect();
    return Err(eyre!("{}", texts.join("; ")));
  }
  let status = status.into_warnings();
  let warnings = status.messages().iter().map(|m| m.text()).collect();
  Ok((status.into_value(), warnings))
}

/// Daily counts for a set of pages.
///
/// Titles are handled in sorted order, starting at `continue_from`. If the
/// service returns only some of them, the first missing title is the
/// continuation point.
pub async fn page_views<S: PageViewService>(
  service: &S,
  titles: &[String],
  days: u32,
  metric: Metric,
  continue_from: Option<&str>,
) -> Result<CommandOutput<Vec<PageData>>> {
  ensure_supported(service, metric, Scope::Article)?;

  let mut titles: Vec<String> = titles
    .iter()
    .filter(|t| continue_from.map_or(true, |c| t.as_str() >= c))
    .cloned()
    .collect();
  titles.sort();
  titles.dedup();
  if titles.is_empty() {
    return Ok(CommandOutput::new(Vec::new(), Vec::new()));
  }

  let status = service.get_page_data(&titles, days, metric).await?;
  let (pages, warnings) = unwrap_status(status)?;

  let mut output = CommandOutput::new(Vec::with_capacity(pages.len()), warnings);
  for title in &titles {
    match find_page(&pages, title) {
      Some(views) => output.data.push(PageData::new(title.clone(), views.clone())),
      None => {
        output.continue_from = Some(title.clone());
        break;
      }
    }
  }
  Ok(output)
}

/// Daily counts for the whole site.
pub async fn site_views<S: PageViewService>(
  service: &S,
  days: u32,
  metric: Metric,
) -> Result<CommandOutput<TimeSeries>> {
  ensure_supported(service, metric, Scope::Site)?;

  let status = service.get_site_data(days, metric).await?;
  let (views, warnings) = unwrap_status(status)?;
  Ok(CommandOutput::new(views, warnings))
}

/// One page of the most viewed list.
pub async fn most_viewed<S: PageViewService>(
  service: &S,
  metric: Metric,
  limit: usize,
  offset: usize,
) -> Result<CommandOutput<Vec<TopPage>>> {
  ensure_supported(service, metric, Scope::Top)?;
  if limit == 0 || limit > MAX_TOP_LIMIT {
    return Err(eyre!("limit must be between 1 and {}", MAX_TOP_LIMIT));
  }

  let status = service.get_top_pages(metric).await?;
  let (top, warnings) = unwrap_status(status)?;

  let total = top.len();
  let page: Vec<TopPage> = top.into_iter().skip(offset).take(limit).collect();
  let mut output = CommandOutput::new(page, warnings);
  let next = offset.saturating_add(limit);
  if next < total {
    output.continue_from = Some(next.to_string());
  }
  Ok(output)
}

/// Recent view total for one page; `None` if the service has no page views.
pub async fn page_info<S: PageViewService>(
  service: &S,
  title: &str,
) -> Result<Option<CommandOutput<PageInfo>>> {
  if !service.supports(Metric::View, Scope::Article) {
    return Ok(None);
  }

  let titles = [title.to_string()];
  let status = service
    .get_page_data(&titles, INFO_DAYS, Metric::View)
    .await?;
  let (pages, warnings) = unwrap_status(status)?;

  let views = find_page(&pages, title)
    .cloned()
    .unwrap_or_default();
  let info = PageInfo {
    title: title.to_string(),
    total: views.total(),
    first_day: views.first_day(),
    last_day: views.last_day(),
  };
  Ok(Some(CommandOutput::new(info, warnings)))
}

/// Which metrics each command can serve, keyed by API module name.
pub fn supported_metrics<S: PageViewService>(service: &S) -> BTreeMap<String, BTreeMap<String, bool>> {
  Scope::ALL
    .into_iter()
    .map(|scope| {
      let metrics = Metric::ALL
        .into_iter()
        .map(|metric| (metric.api_name().to_string(), service.supports(metric, scope)))
        .collect();
      (scope.api_name().to_string(), metrics)
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::status::{codes, Message, Severity};
  use async_trait::async_trait;
  use std::sync::Mutex;

  fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  fn one_day(count: u64) -> TimeSeries {
    [(day("2000-01-05"), Some(count))].into_iter().collect()
  }

  /// Serves at most `limit` titles per call and records what it was asked for.
  struct StubService {
    limit: usize,
    failing: Vec<String>,
    top: Vec<TopPage>,
    requested: Mutex<Vec<Vec<String>>>,
  }

  impl StubService {
    fn new(limit: usize) -> Self {
      Self {
        limit,
        failing: Vec::new(),
        top: (1..=25)
          .rev()
          .map(|i| TopPage::new(format!("Page_{}", i), i))
          .collect(),
        requested: Mutex::new(Vec::new()),
      }
    }
  }

  #[async_trait]
  impl PageViewService for StubService {
    fn supports(&self, metric: Metric, scope: Scope) -> bool {
      metric == Metric::View || scope == Scope::Site
    }

    async fn get_page_data(
      &self,
      titles: &[String],
      _days: u32,
      _metric: Metric,
    ) -> Result<Status<Vec<PageData>>> {
      self.requested.lock().unwrap().push(titles.to_vec());
      let served = &titles[..titles.len().min(self.limit)];
      let pages = served
        .iter()
        .map(|t| PageData::new(t.clone(), one_day(t.len() as u64)))
        .collect();
      let success: Vec<(String, bool)> = served
        .iter()
        .map(|t| (t.clone(), !self.failing.contains(t)))
        .collect();
      let ok = success.iter().any(|(_, ok)| *ok);
      let messages = success
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(t, _)| Message::error(codes::CACHED_ERROR_TITLE, vec![t.clone(), "30 minutes".to_string()]))
        .collect();
      Ok(Status::new(pages, ok, messages).with_success(success))
    }

    async fn get_site_data(&self, _days: u32, metric: Metric) -> Result<Status<TimeSeries>> {
      match metric {
        Metric::View => Ok(Status::good(one_day(100))),
        Metric::Unique => Ok(Status::fatal(TimeSeries::new(), Message::bad_status(500))),
      }
    }

    async fn get_top_pages(&self, _metric: Metric) -> Result<Status<Vec<TopPage>>> {
      Ok(Status::good(self.top.clone()))
    }

    fn get_cache_expiry(&self, _metric: Metric, _scope: Scope) -> u64 {
      0
    }
  }

  fn titles(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
  }

  fn returned(output: &CommandOutput<Vec<PageData>>) -> Vec<&str> {
    output.data.iter().map(|p| p.title.as_str()).collect()
  }

  #[test]
  fn test_parse_metric() {
    assert_eq!(parse_metric("pageviews"), Ok(Metric::View));
    assert_eq!(parse_metric("uniques"), Ok(Metric::Unique));
    assert!(parse_metric("views").is_err());
  }

  #[test]
  fn test_validate_days() {
    assert_eq!(validate_days(None, 60).unwrap(), 60);
    assert_eq!(validate_days(Some(7), 60).unwrap(), 7);
    assert!(validate_days(Some(0), 60).is_err());
    assert!(validate_days(Some(61), 60).is_err());
  }

  #[tokio::test]
  async fn test_page_views_sorts_and_continues() {
    let service = StubService::new(2);
    let output = page_views(&service, &titles(&["C", "A", "B"]), 1, Metric::View, None)
      .await
      .unwrap();
    assert_eq!(returned(&output), vec!["A", "B"]);
    assert_eq!(output.continue_from.as_deref(), Some("C"));
    assert!(output.warnings.is_empty());

    let output = page_views(&service, &titles(&["C", "A", "B"]), 1, Metric::View, Some("C"))
      .await
      .unwrap();
    assert_eq!(returned(&output), vec!["C"]);
    assert_eq!(output.continue_from, None);
    assert_eq!(service.requested.lock().unwrap()[1], titles(&["C"]));
  }

  #[tokio::test]
  async fn test_page_views_partial_failure_becomes_warning() {
    let mut service = StubService::new(5);
    service.failing = titles(&["B"]);
    let output = page_views(&service, &titles(&["A", "B"]), 1, Metric::View, None)
      .await
      .unwrap();
    assert_eq!(returned(&output), vec!["A", "B"]);
    assert_eq!(output.warnings.len(), 1);
    assert!(output.warnings[0].contains("B"));
  }

  #[tokio::test]
  async fn test_page_views_total_failure_is_an_error() {
    let mut service = StubService::new(5);
    service.failing = titles(&["A"]);
    assert!(page_views(&service, &titles(&["A"]), 1, Metric::View, None)
      .await
      .is_err());
  }

  #[tokio::test]
  async fn test_page_views_rejects_unsupported_metric() {
    let service = StubService::new(5);
    assert!(page_views(&service, &titles(&["A"]), 1, Metric::Unique, None)
      .await
      .is_err());
    assert!(service.requested.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_site_views() {
    let service = StubService::new(5);
    let output = site_views(&service, 1, Metric::View).await.unwrap();
    assert_eq!(output.data, one_day(100));
    assert!(site_views(&service, 1, Metric::Unique).await.is_err());
  }

  #[tokio::test]
  async fn test_most_viewed_pagination() {
    let service = StubService::new(5);
    let output = most_viewed(&service, Metric::View, 10, 0).await.unwrap();
    assert_eq!(output.data.len(), 10);
    assert_eq!(output.data[0], TopPage::new("Page_25", 25));
    assert_eq!(output.continue_from.as_deref(), Some("10"));

    let output = most_viewed(&service, Metric::View, 10, 20).await.unwrap();
    assert_eq!(output.data.len(), 5);
    assert_eq!(output.continue_from, None);

    assert!(most_viewed(&service, Metric::View, 0, 0).await.is_err());
    assert!(most_viewed(&service, Metric::View, MAX_TOP_LIMIT + 1, 0).await.is_err());
    assert!(most_viewed(&service, Metric::Unique, 10, 0).await.is_err());
  }

  #[tokio::test]
  async fn test_most_viewed_offset_past_the_end() {
    let service = StubService::new(5);
    let output = most_viewed(&service, Metric::View, MAX_TOP_LIMIT, usize::MAX)
      .await
      .unwrap();
    assert!(output.data.is_empty());
    assert_eq!(output.continue_from, None);
  }

  #[tokio::test]
  async fn test_page_info() {
    let service = StubService::new(5);
    let output = page_info(&service, "Main_Page").await.unwrap().unwrap();
    assert_eq!(
      output.data,
      PageInfo {
        title: "Main_Page".to_string(),
        total: 9,
        first_day: Some(day("2000-01-05")),
        last_day: Some(day("2000-01-05")),
      }
    );
  }

  #[tokio::test]
  async fn test_page_info_failure_is_an_error() {
    let mut service = StubService::new(5);
    service.failing = titles(&["Main_Page"]);
    assert!(page_info(&service, "Main_Page").await.is_err());
  }

  #[test]
  fn test_supported_metrics() {
    let matrix = supported_metrics(&StubService::new(5));
    assert_eq!(matrix.len(), 3);
    assert_eq!(matrix["pageviews"]["pageviews"], true);
    assert_eq!(matrix["pageviews"]["uniques"], false);
    assert_eq!(matrix["siteviews"]["uniques"], true);
    assert_eq!(matrix["mostviewed"]["uniques"], false);
  }

  #[test]
  fn test_unwrap_status_downgrades_messages() {
    let status = Status::new(1, true, vec![Message::bad_status(500)]);
    let (value, warnings) = unwrap_status(status).unwrap();
    assert_eq!(value, 1);
    assert_eq!(warnings.len(), 1);

    let status = Status::fatal(1, Message::bad_status(500));
    assert!(unwrap_status(status).is_err());
    // severity is what downgrading changes
    assert_eq!(
      Status::fatal(1, Message::bad_status(500)).into_warnings().messages()[0].severity,
      Severity::Warning
    );
  }
}
