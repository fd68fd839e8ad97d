use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use super::api_types::{parse_items, ApiDailyItem, ApiErrorBody, ApiTopItem};
use super::dates::{self, Clock, DateRange};
use super::http::{HttpFetch, OriginalRequest};
use super::service::PageViewService;
use super::types::{Access, Agent, Metric, PageData, Scope, TimeSeries, TopPage};
use crate::config::UpstreamConfig;
use crate::status::{Message, Status};

/// Only daily data is supported; other granularities would complicate the
/// service interface.
const GRANULARITY: &str = "daily";

/// Page view client for the Wikimedia pageview API.
pub struct WikimediaClient<H: HttpFetch> {
  http: H,
  clock: Arc<dyn Clock>,
  endpoint: String,
  project: String,
  access: Access,
  agent: Agent,
  /// Max number of titles looked up per call (None for unlimited)
  lookup_limit: Option<usize>,
  timeout: Duration,
  original_request: Option<OriginalRequest>,
}

impl<H: HttpFetch> WikimediaClient<H> {
  pub fn new(http: H, config: &UpstreamConfig, clock: Arc<dyn Clock>) -> Result<Self> {
    if config.project.trim().is_empty() {
      return Err(eyre!("'project' is required"));
    }
    let endpoint = config.endpoint.trim_end_matches('/').to_string();
    url::Url::parse(&endpoint).map_err(|e| eyre!("Invalid endpoint {}: {}", endpoint, e))?;

    Ok(Self {
      http,
      clock,
      endpoint,
      project: config.project.clone(),
      access: config.access,
      agent: config.agent,
      lookup_limit: config.request_limit,
      timeout: Duration::from_secs(config.timeout_secs),
      original_request: None,
    })
  }

  /// Attribute upstream requests to the request that asked for the data.
  pub fn with_original_request(mut self, original_request: OriginalRequest) -> Self {
    self.original_request = Some(original_request);
    self
  }

  fn range(&self) -> DateRange {
    DateRange::from_clock(self.clock.as_ref())
  }

  fn article_url(&self, title: &str, range: &DateRange, days: u32) -> String {
    // "/" must be encoded too
    let encoded: String = url::form_urlencoded::byte_serialize(title.as_bytes()).collect();
    format!(
      "{}/metrics/pageviews/per-article/{}/{}/{}/{}/{}/{}/{}",
      self.endpoint,
      self.project,
      self.access.as_str(),
      self.agent.as_str(),
      encoded,
      GRANULARITY,
      range.first_day(days).format("%Y%m%d"),
      range.last_complete_day().format("%Y%m%d"),
    )
  }

  fn aggregate_url(&self, range: &DateRange, days: u32) -> String {
    format!(
      "{}/metrics/pageviews/aggregate/{}/{}/{}/{}/{}/{}",
      self.endpoint,
      self.project,
      self.access.as_str(),
      self.agent.as_str(),
      GRANULARITY,
      range.first_day(days).format("%Y%m%d00"),
      range.last_complete_day().format("%Y%m%d00"),
    )
  }

  fn unique_devices_url(&self, range: &DateRange, days: u32) -> Result<String> {
    let site = self
      .access
      .unique_devices_site()
      .ok_or_else(|| eyre!("Unique device counts for mobile apps are not supported"))?;
    Ok(format!(
      "{}/metrics/unique-devices/{}/{}/{}/{}/{}",
      self.endpoint,
      self.project,
      site,
      GRANULARITY,
      range.first_day(days).format("%Y%m%d"),
      range.last_complete_day().format("%Y%m%d"),
    ))
  }

  fn top_url(&self, range: &DateRange) -> String {
    format!(
      "{}/metrics/pageviews/top/{}/{}/{}",
      self.endpoint,
      self.project,
      self.access.as_str(),
      range.last_complete_day().format("%Y/%m/%d"),
    )
  }

  /// One upstream round trip. The "no data" 404 comes back as a good,
  /// empty `items` response.
  async fn request(&self, url: &str) -> Status<Value> {
    let response = match self
      .http
      .get(url, self.timeout, self.original_request.as_ref())
      .await
    {
      Ok(response) => response,
      Err(e) => {
        error!(requesturl = %url, error = %e, "Failed fetching page view data");
        return Status::fatal(Value::Null, Message::request_error(e.to_string()));
      }
    };

    if response.is_success() {
      return match serde_json::from_str(&response.body) {
        Ok(value) => Status::good(value),
        Err(e) => {
          error!(requesturl = %url, error = %e, "Failed parsing page view data");
          Status::fatal(Value::Null, Message::invalid_json(e.to_string()))
        }
      };
    }

    let api_error = ApiErrorBody::from_body(&response.body).unwrap_or_default();
    if response.status == 404 && api_error.is_not_found() {
      // the API answers 404 when there were simply no views
      debug!(requesturl = %url, "No page view data available");
      return Status::good(json!({ "items": [] }));
    }

    let mut messages = vec![Message::bad_status(response.status)];
    let detail = api_error.detail_text();
    error!(
      requesturl = %url,
      error = %messages[0].text(),
      apierror_type = ?api_error.error_type,
      apierror_title = ?api_error.title,
      apierror_method = ?api_error.method,
      apierror_detail = ?detail,
      apierror_uri = ?api_error.uri,
      "Failed fetching page view data"
    );
    if let Some(detail) = detail {
      messages.push(Message::upstream_detail(detail));
    }
    Status::new(Value::Null, false, messages)
  }

  /// Fill `series` from a daily response; `false` if the body has the wrong shape.
  fn fill_series(series: &mut TimeSeries, body: &Value, metric: Metric) -> bool {
    let Some(items) = parse_items::<ApiDailyItem>(body) else {
      return false;
    };
    for item in items {
      let count = match metric {
        Metric::View => item.views,
        Metric::Unique => item.devices,
      };
      if let Some(day) = item.day() {
        series.fill(day, count);
      }
    }
    true
  }
}

#[async_trait]
impl<H: HttpFetch> PageViewService for WikimediaClient<H> {
  fn supports(&self, metric: Metric, scope: Scope) -> bool {
    match metric {
      Metric::View => true,
      Metric::Unique => scope == Scope::Site && self.access != Access::MobileApp,
    }
  }

  async fn get_page_data(
    &self,
    titles: &[String],
    days: u32,
    metric: Metric,
  ) -> Result<Status<Vec<PageData>>> {
    if metric != Metric::View {
      return Err(eyre!("Invalid metric: {}", metric));
    }
    if titles.is_empty() {
      return Ok(Status::good(Vec::new()));
    }
    if days == 0 {
      return Err(eyre!("Invalid days: {}", days));
    }
    let titles = match self.lookup_limit {
      Some(limit) => &titles[..titles.len().min(limit)],
      None => titles,
    };

    let range = self.range();
    let mut pages = Vec::with_capacity(titles.len());
    let mut success = Vec::with_capacity(titles.len());
    let mut messages = Vec::new();

    for title in titles {
      let mut views = range.empty_range(days);
      let request = self.request(&self.article_url(title, &range, days)).await;
      let ok = if request.is_ok() {
        let valid = Self::fill_series(&mut views, request.value(), metric);
        if !valid {
          messages.push(Message::invalid_response());
        }
        valid
      } else {
        false
      };
      messages.extend(request.messages().iter().cloned());
      pages.push(PageData::new(title.clone(), views));
      success.push((title.clone(), ok));
    }

    let ok = success.iter().any(|(_, ok)| *ok);
    Ok(Status::new(pages, ok, messages).with_success(success))
  }

  async fn get_site_data(&self, days: u32, metric: Metric) -> Result<Status<TimeSeries>> {
    if days == 0 {
      return Err(eyre!("Invalid days: {}", days));
    }
    let range = self.range();
    let url = match metric {
      Metric::View => self.aggregate_url(&range, days),
      Metric::Unique => self.unique_devices_url(&range, days)?,
    };

    let mut series = range.empty_range(days);
    let request = self.request(&url).await;
    if !request.is_ok() {
      let messages = request.messages().to_vec();
      return Ok(Status::new(series, false, messages));
    }
    if !Self::fill_series(&mut series, request.value(), metric) {
      return Ok(Status::fatal(series, Message::invalid_response()));
    }
    Ok(Status::good(series))
  }

  async fn get_top_pages(&self, metric: Metric) -> Result<Status<Vec<TopPage>>> {
    if metric != Metric::View {
      return Err(eyre!("Invalid metric: {}", metric));
    }
    let range = self.range();
    let request = self.request(&self.top_url(&range)).await;
    if !request.is_ok() {
      let messages = request.messages().to_vec();
      return Ok(Status::new(Vec::new(), false, messages));
    }

    match parse_items::<ApiTopItem>(request.value()) {
      // empty result set, no error; the "no data" 404 ends up here too
      Some(items) if items.is_empty() => Ok(Status::good(Vec::new())),
      Some(mut items) => {
        let top = items
          .swap_remove(0)
          .articles
          .into_iter()
          .map(|a| TopPage::new(a.article, a.views))
          .collect();
        Ok(Status::good(top))
      }
      None => Ok(Status::fatal(Vec::new(), Message::invalid_response())),
    }
  }

  fn get_cache_expiry(&self, _metric: Metric, _scope: Scope) -> u64 {
    // data is valid until the end of the day
    dates::seconds_until_next_day(self.clock.now())
  }
}
