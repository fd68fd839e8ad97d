//! Cache keys for page view queries.

use sha2::{Digest, Sha256};

use crate::cache::QueryKey;

use super::types::{Metric, Scope};

/// Leading key component shared by every page view entry.
const KEY_NAMESPACE: &str = "pvi";

/// Query key types for page view data.
///
/// Site and article entries always hold `days` (the cached width) days of
/// data, so the width is part of the key. Top lists are width-independent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PageViewKey {
  Site {
    prefix: String,
    days: u32,
    metric: Metric,
  },
  Top {
    prefix: String,
    metric: Metric,
  },
  Article {
    prefix: String,
    days: u32,
    metric: Metric,
    title: String,
  },
}

impl PageViewKey {
  pub fn scope(&self) -> Scope {
    match self {
      Self::Site { .. } => Scope::Site,
      Self::Top { .. } => Scope::Top,
      Self::Article { .. } => Scope::Article,
    }
  }
}

impl QueryKey for PageViewKey {
  fn cache_parts(&self) -> Vec<String> {
    let (prefix, days, metric) = match self {
      Self::Site {
        prefix,
        days,
        metric,
      }
      | Self::Article {
        prefix,
        days,
        metric,
        ..
      } => (prefix, days.to_string(), metric),
      Self::Top { prefix, metric } => (prefix, String::new(), metric),
    };

    let mut parts = vec![
      KEY_NAMESPACE.to_string(),
      prefix.clone(),
      days,
      metric.as_str().to_string(),
      self.scope().as_str().to_string(),
    ];
    if let Self::Article { title, .. } = self {
      // titles can be long and contain anything
      parts.push(hex::encode(Sha256::digest(title.as_bytes())));
    }
    parts
  }

  fn description(&self) -> String {
    match self {
      Self::Site { days, metric, .. } => format!("site {} ({} days)", metric, days),
      Self::Top { metric, .. } => format!("top {}", metric),
      Self::Article {
        days,
        metric,
        title,
        ..
      } => format!("article {} {} ({} days)", title, metric, days),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  fn article(title: &str, metric: Metric) -> PageViewKey {
    PageViewKey::Article {
      prefix: "wiki".to_string(),
      days: 30,
      metric,
      title: title.to_string(),
    }
  }

  #[test]
  fn test_keys_are_distinct() {
    let keys = vec![
      PageViewKey::Site {
        prefix: "wiki".to_string(),
        days: 30,
        metric: Metric::View,
      },
      PageViewKey::Site {
        prefix: "wiki".to_string(),
        days: 60,
        metric: Metric::View,
      },
      PageViewKey::Site {
        prefix: "other".to_string(),
        days: 30,
        metric: Metric::View,
      },
      PageViewKey::Site {
        prefix: "wiki".to_string(),
        days: 30,
        metric: Metric::Unique,
      },
      PageViewKey::Top {
        prefix: "wiki".to_string(),
        metric: Metric::View,
      },
      PageViewKey::Top {
        prefix: "wiki".to_string(),
        metric: Metric::Unique,
      },
      article("A", Metric::View),
      article("B", Metric::View),
      article("A", Metric::Unique),
    ];
    let parts: HashSet<Vec<String>> = keys.iter().map(|k| k.cache_parts()).collect();
    assert_eq!(parts.len(), keys.len());
  }

  #[test]
  fn test_article_key_hashes_title() {
    let parts = article("Foo/Bar: baz", Metric::View).cache_parts();
    assert_eq!(&parts[..5], &["pvi", "wiki", "30", "view", "article"]);
    assert_eq!(parts[5].len(), 64);
    assert!(parts[5].chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn test_top_key_has_no_width() {
    let parts = PageViewKey::Top {
      prefix: String::new(),
      metric: Metric::View,
    }
    .cache_parts();
    assert_eq!(parts, vec!["pvi", "", "", "view", "top"]);
  }
}
