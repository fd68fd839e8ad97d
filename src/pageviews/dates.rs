//! Date window math: which days a trailing N-day series covers.
//!
//! All dates are UTC calendar days. Working on `NaiveDate` keeps the math
//! free of DST and leap-second effects.

use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use color_eyre::{eyre::eyre, Result};

use super::types::TimeSeries;

/// Source of the current time, injected so tests can pin "today".
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

/// A clock that never moves.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
  /// A clock set to midday of the day after `last_complete_day`.
  pub fn after(last_complete_day: NaiveDate) -> Self {
    let today = last_complete_day
      .checked_add_days(Days::new(1))
      .unwrap_or(last_complete_day);
    let noon = today.and_hms_opt(12, 0, 0).unwrap_or_default();
    Self(Utc.from_utc_datetime(&noon))
  }
}

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.0
  }
}

/// The trailing window of days with complete upstream data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
  last_complete_day: NaiveDate,
}

impl DateRange {
  /// Window as seen at `now`: the current day is still incomplete, so the
  /// window ends yesterday.
  pub fn at(now: DateTime<Utc>) -> Self {
    let today = now.date_naive();
    Self {
      last_complete_day: today.checked_sub_days(Days::new(1)).unwrap_or(today),
    }
  }

  pub fn from_clock(clock: &dyn Clock) -> Self {
    Self::at(clock.now())
  }

  pub fn ending(last_complete_day: NaiveDate) -> Self {
    Self { last_complete_day }
  }

  pub fn last_complete_day(&self) -> NaiveDate {
    self.last_complete_day
  }

  /// First day of a `days` wide window.
  pub fn first_day(&self, days: u32) -> NaiveDate {
    self
      .last_complete_day
      .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
      .unwrap_or(NaiveDate::MIN)
  }

  /// `days` consecutive days ending at the last complete day, all `None`.
  pub fn empty_range(&self, days: u32) -> TimeSeries {
    if days == 0 {
      return TimeSeries::new();
    }
    self
      .first_day(days)
      .iter_days()
      .take(days as usize)
      .map(|day| (day, None))
      .collect()
  }
}

/// Left-pad a contiguous series with `None` days so it is `days` wide and
/// still ends on the same day. Series that are already wide enough are
/// returned unchanged.
pub fn extend(series: &TimeSeries, days: u32) -> Result<TimeSeries> {
  let first = series
    .first_day()
    .ok_or_else(|| eyre!("Cannot extend an empty date range"))?;

  let mut extended = series.clone();
  let missing = (days as usize).saturating_sub(series.len());
  let mut day = first;
  for _ in 0..missing {
    day = day
      .pred_opt()
      .ok_or_else(|| eyre!("Date range extends before the earliest representable day"))?;
    extended.insert(day, None);
  }
  Ok(extended)
}

/// The trailing `days` entries of a series.
pub fn truncate_to_last(series: &TimeSeries, days: u32) -> TimeSeries {
  let skip = series.len().saturating_sub(days as usize);
  series.iter().skip(skip).collect()
}

/// Reshape a series of the cached width to the width a caller asked for.
pub fn fit_to_width(series: &TimeSeries, cached_days: u32, days: u32) -> Result<TimeSeries> {
  if days < cached_days {
    Ok(truncate_to_last(series, days))
  } else if days > cached_days {
    extend(series, days)
  } else {
    Ok(series.clone())
  }
}

/// Seconds until the next UTC midnight, when a new day of data appears.
pub fn seconds_until_next_day(now: DateTime<Utc>) -> u64 {
  let next_midnight = now
    .date_naive()
    .succ_opt()
    .and_then(|day| day.and_hms_opt(0, 0, 0))
    .map(|midnight| Utc.from_utc_datetime(&midnight));

  match next_midnight {
    Some(midnight) => (midnight - now).num_seconds().max(0) as u64,
    None => 0,
  }
}
