//! Immutable result type returned by every page view operation.
//!
//! Upstream failures never surface as `Err`: they are carried here as
//! messages next to whatever (possibly null-filled) value could be produced.

use serde::Serialize;
use std::time::Duration;

/// Message codes shared between the adapter, the cache layer and callers.
pub mod codes {
  pub const CACHED_ERROR: &str = "pvi-cached-error";
  pub const CACHED_ERROR_TITLE: &str = "pvi-cached-error-title";
  pub const INVALID_RESPONSE: &str = "pvi-invalidresponse";
  pub const INVALID_JSON: &str = "pvi-invalidjson";
  pub const UPSTREAM_DETAIL: &str = "pvi-upstream-detail";
  pub const HTTP_BAD_STATUS: &str = "http-bad-status";
  pub const HTTP_REQUEST_ERROR: &str = "http-request-error";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Error,
  Warning,
}

/// A single annotation on a [`Status`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
  pub severity: Severity,
  pub code: String,
  pub params: Vec<String>,
}

impl Message {
  pub fn error(code: &str, params: Vec<String>) -> Self {
    Self {
      severity: Severity::Error,
      code: code.to_string(),
      params,
    }
  }

  /// Served from a cached failure; retry after `expiry`.
  pub fn cached_error(expiry: Duration) -> Self {
    Self::error(codes::CACHED_ERROR, vec![format_duration(expiry)])
  }

  /// Per-title variant of [`Message::cached_error`].
  pub fn cached_error_title(title: &str, expiry: Duration) -> Self {
    Self::error(
      codes::CACHED_ERROR_TITLE,
      vec![title.to_string(), format_duration(expiry)],
    )
  }

  pub fn invalid_response() -> Self {
    Self::error(codes::INVALID_RESPONSE, Vec::new())
  }

  pub fn invalid_json(detail: impl Into<String>) -> Self {
    Self::error(codes::INVALID_JSON, vec![detail.into()])
  }

  pub fn bad_status(status: u16) -> Self {
    Self::error(codes::HTTP_BAD_STATUS, vec![status.to_string()])
  }

  pub fn request_error(detail: impl Into<String>) -> Self {
    Self::error(codes::HTTP_REQUEST_ERROR, vec![detail.into()])
  }

  pub fn upstream_detail(detail: impl Into<String>) -> Self {
    Self::error(codes::UPSTREAM_DETAIL, vec![detail.into()])
  }

  /// Human readable rendering, used for logs and CLI output.
  pub fn text(&self) -> String {
    let params = &self.params;
    let param = |i: usize| params.get(i).map(String::as_str).unwrap_or("");
    match self.code.as_str() {
      codes::CACHED_ERROR => format!(
        "Fetching page view data failed; the error is cached, retry after {}",
        param(0)
      ),
      codes::CACHED_ERROR_TITLE => format!(
        "Fetching page view data for {} failed; the error is cached, retry after {}",
        param(0),
        param(1)
      ),
      codes::INVALID_RESPONSE => "The page view service returned an invalid response".to_string(),
      codes::INVALID_JSON => format!("Could not parse the upstream response: {}", param(0)),
      codes::HTTP_BAD_STATUS => format!("HTTP request failed with status {}", param(0)),
      codes::HTTP_REQUEST_ERROR => format!("HTTP request failed: {}", param(0)),
      _ => params.join(", "),
    }
  }
}

/// Outcome of a page view operation.
///
/// `ok` means the value is usable; `good` additionally means there is nothing
/// to report. Multi-title operations also carry per-title success flags in
/// input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Status<T> {
  value: T,
  ok: bool,
  messages: Vec<Message>,
  #[serde(skip_serializing_if = "Vec::is_empty")]
  success: Vec<(String, bool)>,
}

impl<T> Status<T> {
  pub fn new(value: T, ok: bool, messages: Vec<Message>) -> Self {
    Self {
      value,
      ok,
      messages,
      success: Vec::new(),
    }
  }

  pub fn good(value: T) -> Self {
    Self::new(value, true, Vec::new())
  }

  pub fn fatal(value: T, message: Message) -> Self {
    Self::new(value, false, vec![message])
  }

  /// Attach per-item success flags.
  pub fn with_success(mut self, success: Vec<(String, bool)>) -> Self {
    self.success = success;
    self
  }

  pub fn is_ok(&self) -> bool {
    self.ok
  }

  pub fn is_good(&self) -> bool {
    self.ok && self.messages.is_empty()
  }

  pub fn value(&self) -> &T {
    &self.value
  }

  pub fn into_value(self) -> T {
    self.value
  }

  pub fn messages(&self) -> &[Message] {
    &self.messages
  }

  pub fn has_message(&self, code: &str) -> bool {
    self.messages.iter().any(|m| m.code == code)
  }

  pub fn success(&self) -> &[(String, bool)] {
    &self.success
  }

  /// Success flag for one item, if the item is part of the result.
  pub fn item_success(&self, item: &str) -> Option<bool> {
    self
      .success
      .iter()
      .find(|(key, _)| key == item)
      .map(|(_, ok)| *ok)
  }

  pub fn success_count(&self) -> usize {
    self.success.iter().filter(|(_, ok)| *ok).count()
  }

  pub fn fail_count(&self) -> usize {
    self.success.len() - self.success_count()
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Status<U> {
    Status {
      value: f(self.value),
      ok: self.ok,
      messages: self.messages,
      success: self.success,
    }
  }

  /// Same status with every error downgraded to a warning. Callers use this
  /// on success paths so that partial failures become annotations.
  pub fn into_warnings(self) -> Self {
    let messages = self
      .messages
      .into_iter()
      .map(|m| Message {
        severity: Severity::Warning,
        ..m
      })
      .collect();
    Self { messages, ..self }
  }
}

/// Render a duration the way users read it ("30 minutes", "1 hour").
fn format_duration(duration: Duration) -> String {
  let secs = duration.as_secs();
  let (amount, unit) = if secs >= 3600 && secs % 3600 == 0 {
    (secs / 3600, "hour")
  } else if secs >= 60 && secs % 60 == 0 {
    (secs / 60, "minute")
  } else {
    (secs, "second")
  };
  if amount == 1 {
    format!("{} {}", amount, unit)
  } else {
    format!("{} {}s", amount, unit)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_good_status_has_no_messages() {
    let status = Status::good(5);
    assert!(status.is_ok());
    assert!(status.is_good());
    assert_eq!(*status.value(), 5);
  }

  #[test]
  fn test_ok_with_messages_is_not_good() {
    let status = Status::new((), true, vec![Message::invalid_response()]);
    assert!(status.is_ok());
    assert!(!status.is_good());
    assert!(status.has_message(codes::INVALID_RESPONSE));
  }

  #[test]
  fn test_success_counts() {
    let status = Status::good(()).with_success(vec![
      ("A".to_string(), true),
      ("B".to_string(), false),
      ("C".to_string(), true),
    ]);
    assert_eq!(status.success_count(), 2);
    assert_eq!(status.fail_count(), 1);
    assert_eq!(status.item_success("B"), Some(false));
    assert_eq!(status.item_success("Z"), None);
  }

  #[test]
  fn test_into_warnings_keeps_codes() {
    let status = Status::new((), true, vec![Message::cached_error_title("K", Duration::from_secs(1800))])
      .into_warnings();
    assert!(status.is_ok());
    assert_eq!(status.messages()[0].severity, Severity::Warning);
    assert!(status.has_message(codes::CACHED_ERROR_TITLE));
  }

  #[test]
  fn test_cached_error_text() {
    let message = Message::cached_error(Duration::from_secs(1800));
    assert_eq!(message.params, vec!["30 minutes".to_string()]);
    assert!(message.text().contains("retry after 30 minutes"));
  }

  #[test]
  fn test_format_duration() {
    assert_eq!(format_duration(Duration::from_secs(3600)), "1 hour");
    assert_eq!(format_duration(Duration::from_secs(90)), "90 seconds");
    assert_eq!(format_duration(Duration::from_secs(120)), "2 minutes");
  }
}
