//! Page view analytics for wikis, served through a caching layer in front of
//! the Wikimedia pageview API.

pub mod cache;
pub mod commands;
pub mod config;
pub mod pageviews;
pub mod status;

pub use pageviews::{CachedPageViewService, PageViewService};
pub use status::{Message, Severity, Status};
