use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Quantity being measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
  /// Page view count
  View,
  /// Unique visitors (devices), estimated by the upstream
  Unique,
}

impl Metric {
  pub const ALL: [Metric; 2] = [Metric::View, Metric::Unique];

  pub fn as_str(&self) -> &'static str {
    match self {
      Metric::View => "view",
      Metric::Unique => "unique",
    }
  }

  /// Name used on the command line and in API output.
  pub fn api_name(&self) -> &'static str {
    match self {
      Metric::View => "pageviews",
      Metric::Unique => "uniques",
    }
  }
}

impl fmt::Display for Metric {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Shape of the requested data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
  /// Daily series for one article
  Article,
  /// Daily series for the whole site
  Site,
  /// Ranked list of the most viewed articles
  Top,
}

impl Scope {
  pub const ALL: [Scope; 3] = [Scope::Article, Scope::Site, Scope::Top];

  pub fn as_str(&self) -> &'static str {
    match self {
      Scope::Article => "article",
      Scope::Site => "site",
      Scope::Top => "top",
    }
  }

  /// Name of the query module exposing this scope.
  pub fn api_name(&self) -> &'static str {
    match self {
      Scope::Article => "pageviews",
      Scope::Site => "siteviews",
      Scope::Top => "mostviewed",
    }
  }
}

impl fmt::Display for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Access method filter of the pageview API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Access {
  #[default]
  AllAccess,
  Desktop,
  MobileApp,
  MobileWeb,
}

impl Access {
  pub fn as_str(&self) -> &'static str {
    match self {
      Access::AllAccess => "all-access",
      Access::Desktop => "desktop",
      Access::MobileApp => "mobile-app",
      Access::MobileWeb => "mobile-web",
    }
  }

  /// Site variant used by the unique devices endpoint. Apps have none.
  pub fn unique_devices_site(&self) -> Option<&'static str> {
    match self {
      Access::AllAccess => Some("all-sites"),
      Access::Desktop => Some("desktop-site"),
      Access::MobileWeb => Some("mobile-site"),
      Access::MobileApp => None,
    }
  }
}

/// Agent type filter of the pageview API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Agent {
  AllAgents,
  #[default]
  User,
  Spider,
  Bot,
}

impl Agent {
  pub fn as_str(&self) -> &'static str {
    match self {
      Agent::AllAgents => "all-agents",
      Agent::User => "user",
      Agent::Spider => "spider",
      Agent::Bot => "bot",
    }
  }
}

/// Daily counts over a contiguous run of days, ascending.
///
/// `None` means no data (or a failure) for that day, as opposed to a
/// measured zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSeries(BTreeMap<NaiveDate, Option<u64>>);

impl TimeSeries {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn first_day(&self) -> Option<NaiveDate> {
    self.0.keys().next().copied()
  }

  pub fn last_day(&self) -> Option<NaiveDate> {
    self.0.keys().next_back().copied()
  }

  pub fn get(&self, day: NaiveDate) -> Option<Option<u64>> {
    self.0.get(&day).copied()
  }

  /// Set the count for a day already in the series. Days outside the
  /// series are ignored so the width never changes; returns whether the
  /// day was present.
  pub fn fill(&mut self, day: NaiveDate, count: Option<u64>) -> bool {
    match self.0.get_mut(&day) {
      Some(slot) => {
        *slot = count;
        true
      }
      None => false,
    }
  }

  pub(crate) fn insert(&mut self, day: NaiveDate, count: Option<u64>) {
    self.0.insert(day, count);
  }

  pub fn iter(&self) -> impl DoubleEndedIterator<Item = (NaiveDate, Option<u64>)> + '_ {
    self.0.iter().map(|(day, count)| (*day, *count))
  }

  pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
    self.0.keys().copied()
  }

  /// Sum of all known counts.
  pub fn total(&self) -> u64 {
    self.0.values().flatten().sum()
  }

  /// Whether every day follows the previous one without a gap.
  pub fn is_contiguous(&self) -> bool {
    self
      .0
      .keys()
      .zip(self.0.keys().skip(1))
      .all(|(a, b)| a.succ_opt() == Some(*b))
  }
}

impl FromIterator<(NaiveDate, Option<u64>)> for TimeSeries {
  fn from_iter<I: IntoIterator<Item = (NaiveDate, Option<u64>)>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

/// Daily series for one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageData {
  pub title: String,
  pub views: TimeSeries,
}

impl PageData {
  pub fn new(title: impl Into<String>, views: TimeSeries) -> Self {
    Self {
      title: title.into(),
      views,
    }
  }
}

/// Find the series for `title` in an ordered page list.
pub fn find_page<'a>(pages: &'a [PageData], title: &str) -> Option<&'a TimeSeries> {
  pages.iter().find(|p| p.title == title).map(|p| &p.views)
}

/// One entry of the most-viewed list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopPage {
  pub title: String,
  pub count: u64,
}

impl TopPage {
  pub fn new(title: impl Into<String>, count: u64) -> Self {
    Self {
      title: title.into(),
      count,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn day(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
  }

  #[test]
  fn test_fill_ignores_days_outside_series() {
    let mut series: TimeSeries = [(day("2000-01-01"), None), (day("2000-01-02"), None)]
      .into_iter()
      .collect();
    assert!(series.fill(day("2000-01-02"), Some(5)));
    assert!(!series.fill(day("2000-01-09"), Some(7)));
    assert_eq!(series.len(), 2);
    assert_eq!(series.get(day("2000-01-02")), Some(Some(5)));
    assert_eq!(series.total(), 5);
  }

  #[test]
  fn test_contiguity() {
    let gap: TimeSeries = [(day("2000-01-01"), None), (day("2000-01-03"), None)]
      .into_iter()
      .collect();
    assert!(!gap.is_contiguous());

    let month_end: TimeSeries = [(day("2000-01-31"), None), (day("2000-02-01"), Some(0))]
      .into_iter()
      .collect();
    assert!(month_end.is_contiguous());
  }

  #[test]
  fn test_series_serializes_as_date_map() {
    let series: TimeSeries = [(day("2000-01-01"), Some(3)), (day("2000-01-02"), None)]
      .into_iter()
      .collect();
    let json = serde_json::to_string(&series).unwrap();
    assert_eq!(json, r#"{"2000-01-01":3,"2000-01-02":null}"#);
    let back: TimeSeries = serde_json::from_str(&json).unwrap();
    assert_eq!(back, series);
  }

  #[test]
  fn test_config_names() {
    let access: Access = serde_json::from_str("\"mobile-app\"").unwrap();
    assert_eq!(access, Access::MobileApp);
    assert_eq!(access.unique_devices_site(), None);
    let agent: Agent = serde_json::from_str("\"all-agents\"").unwrap();
    assert_eq!(agent.as_str(), "all-agents");
    assert!(serde_json::from_str::<Agent>("\"robot\"").is_err());
  }
}
