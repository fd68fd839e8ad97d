//! Serde-deserializable types matching pageview API responses.
//!
//! These types are separate from domain types to allow clean deserialization
//! while keeping domain types focused on application needs.

use chrono::NaiveDate;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;

/// `type` of the error body the API sends when it has no data at all.
pub const NOT_FOUND_TYPE: &str = "https://mediawiki.org/wiki/HyperSwitch/errors/not_found";

/// Every successful response wraps its payload in `items`.
#[derive(Debug, Deserialize)]
pub struct ApiItemsResponse<T> {
  pub items: Vec<T>,
}

/// Parse the `items` array of a response, `None` if the shape is wrong.
pub fn parse_items<T: DeserializeOwned>(value: &Value) -> Option<Vec<T>> {
  ApiItemsResponse::<T>::deserialize(value)
    .ok()
    .map(|response| response.items)
}

// ============================================================================
// Daily series (per-article, aggregate, unique devices)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiDailyItem {
  /// YYYYMMDD or YYYYMMDDHH
  pub timestamp: String,
  #[serde(default)]
  pub views: Option<u64>,
  #[serde(default)]
  pub devices: Option<u64>,
}

impl ApiDailyItem {
  pub fn day(&self) -> Option<NaiveDate> {
    let ymd = self.timestamp.get(0..8)?;
    NaiveDate::parse_from_str(ymd, "%Y%m%d").ok()
  }
}

// ============================================================================
// Top articles
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiTopItem {
  pub articles: Vec<ApiTopArticle>,
}

#[derive(Debug, Deserialize)]
pub struct ApiTopArticle {
  pub article: String,
  pub views: u64,
}

// ============================================================================
// Errors
// ============================================================================

/// Error body; `detail` is sometimes a list of strings.
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
  #[serde(rename = "type")]
  pub error_type: Option<String>,
  pub title: Option<String>,
  pub method: Option<String>,
  pub detail: Option<ApiErrorDetail>,
  pub uri: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiErrorDetail {
  Text(String),
  List(Vec<String>),
}

impl ApiErrorBody {
  pub fn from_body(body: &str) -> Option<Self> {
    serde_json::from_str(body).ok()
  }

  pub fn is_not_found(&self) -> bool {
    self.error_type.as_deref() == Some(NOT_FOUND_TYPE)
  }

  pub fn detail_text(&self) -> Option<String> {
    match self.detail.as_ref()? {
      ApiErrorDetail::Text(text) => Some(text.clone()),
      ApiErrorDetail::List(parts) => Some(parts.join(", ")),
    }
  }
}
