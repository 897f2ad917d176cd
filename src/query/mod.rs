pub mod summary;

pub use summary::{summarize, Summary};

use crate::dataset::{Dataset, FieldNames, Reading, Station};
use crate::error::{AppError, Result};
use crate::timestamp::parse_timestamp;
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

const DAY_WINDOW_DAYS: i64 = 1;
const MONTH_WINDOW_DAYS: i64 = 30;
const SEASON_WINDOW_DAYS: i64 = 90;

/// Raw per-station query options, as received at the HTTP boundary.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StationParams {
    pub filter: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    All,
    Latest,
    Day,
    Month,
    Season,
    Custom,
}

impl FilterKind {
    /// Unknown or empty names select everything
    pub fn from_name(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_ascii_lowercase()).as_deref() {
            Some("latest") => FilterKind::Latest,
            Some("day") => FilterKind::Day,
            Some("month") => FilterKind::Month,
            Some("season") => FilterKind::Season,
            Some("custom") => FilterKind::Custom,
            _ => FilterKind::All,
        }
    }

    /// Name echoed in responses, `None` for the unfiltered case
    pub fn name(&self) -> Option<&'static str> {
        match self {
            FilterKind::All => None,
            FilterKind::Latest => Some("latest"),
            FilterKind::Day => Some("day"),
            FilterKind::Month => Some("month"),
            FilterKind::Season => Some("season"),
            FilterKind::Custom => Some("custom"),
        }
    }
}

/// A validated temporal selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalFilter {
    All,
    Latest,
    /// Last 24 hours before the newest reading
    Day,
    /// Last 30 days before the newest reading
    RollingMonth,
    CalendarMonth { year: i32, month: u32 },
    /// Last 90 days before the newest reading
    Season,
    /// Inclusive on both ends
    Custom {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
}

impl TemporalFilter {
    pub fn from_params(params: &StationParams) -> Result<Self> {
        if let Some(year) = params.year {
            if !(1..=9999).contains(&year) {
                return Err(AppError::BadRequest(format!(
                    "year must be between 1 and 9999, got {}",
                    year
                )));
            }
        }
        if let Some(month) = params.month {
            if !(1..=12).contains(&month) {
                return Err(AppError::BadRequest(format!(
                    "month must be between 1 and 12, got {}",
                    month
                )));
            }
        }

        let filter = match FilterKind::from_name(params.filter.as_deref()) {
            FilterKind::All => TemporalFilter::All,
            FilterKind::Latest => TemporalFilter::Latest,
            FilterKind::Day => TemporalFilter::Day,
            FilterKind::Season => TemporalFilter::Season,
            FilterKind::Month => match (params.year, params.month) {
                (Some(year), Some(month)) => TemporalFilter::CalendarMonth { year, month },
                (None, None) => TemporalFilter::RollingMonth,
                _ => {
                    return Err(AppError::BadRequest(
                        "year and month must be supplied together".to_string(),
                    ))
                }
            },
            FilterKind::Custom => {
                let start = required_bound("start", params.start.as_deref())?;
                let end = required_bound("end", params.end.as_deref())?;
                if start > end {
                    return Err(AppError::BadRequest(format!(
                        "start ({}) must not be after end ({})",
                        start, end
                    )));
                }
                TemporalFilter::Custom { start, end }
            }
        };

        Ok(filter)
    }

    pub fn kind(&self) -> FilterKind {
        match self {
            TemporalFilter::All => FilterKind::All,
            TemporalFilter::Latest => FilterKind::Latest,
            TemporalFilter::Day => FilterKind::Day,
            TemporalFilter::RollingMonth | TemporalFilter::CalendarMonth { .. } => FilterKind::Month,
            TemporalFilter::Season => FilterKind::Season,
            TemporalFilter::Custom { .. } => FilterKind::Custom,
        }
    }

    /// Select from readings paired with their parsed timestamps, in stored order.
    ///
    /// Rolling windows are anchored at the newest timestamp in `timed`.
    pub fn select<'a>(&self, timed: &[(NaiveDateTime, &'a Reading)]) -> Vec<&'a Reading> {
        let Some(now) = timed.iter().map(|(ts, _)| *ts).max() else {
            return Vec::new();
        };

        match *self {
            TemporalFilter::All => timed.iter().map(|(_, r)| *r).collect(),
            TemporalFilter::Latest => {
                // First reading carrying the maximum timestamp
                timed
                    .iter()
                    .find(|(ts, _)| *ts == now)
                    .map(|(_, r)| *r)
                    .into_iter()
                    .collect()
            }
            TemporalFilter::Day => since(timed, days_before(now, DAY_WINDOW_DAYS)),
            TemporalFilter::RollingMonth => since(timed, days_before(now, MONTH_WINDOW_DAYS)),
            TemporalFilter::Season => since(timed, days_before(now, SEASON_WINDOW_DAYS)),
            TemporalFilter::CalendarMonth { year, month } => match month_bounds(year, month) {
                Some((first, next)) => timed
                    .iter()
                    .filter(|(ts, _)| *ts >= first && *ts < next)
                    .map(|(_, r)| *r)
                    .collect(),
                None => Vec::new(),
            },
            TemporalFilter::Custom { start, end } => timed
                .iter()
                .filter(|(ts, _)| *ts >= start && *ts <= end)
                .map(|(_, r)| *r)
                .collect(),
        }
    }
}

fn required_bound(name: &str, raw: Option<&str>) -> Result<NaiveDateTime> {
    let raw = raw.filter(|s| !s.trim().is_empty()).ok_or_else(|| {
        AppError::BadRequest("custom filter requires both 'start' and 'end'".to_string())
    })?;
    parse_timestamp(raw).ok_or_else(|| {
        AppError::BadRequest(format!("Invalid {} timestamp: '{}'", name, raw))
    })
}

fn days_before(now: NaiveDateTime, days: i64) -> NaiveDateTime {
    now.checked_sub_signed(Duration::days(days))
        .unwrap_or(NaiveDateTime::MIN)
}

fn since<'a>(timed: &[(NaiveDateTime, &'a Reading)], cutoff: NaiveDateTime) -> Vec<&'a Reading> {
    timed
        .iter()
        .filter(|(ts, _)| *ts >= cutoff)
        .map(|(_, r)| *r)
        .collect()
}

/// First instant of the month and first instant of the following month
fn month_bounds(year: i32, month: u32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)?
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)?
    };
    Some((first.and_time(NaiveTime::MIN), next.and_time(NaiveTime::MIN)))
}

/// Response body of a per-station query. Borrows readings from the dataset.
#[derive(Debug, Clone, Serialize)]
pub struct StationReport<'a> {
    pub station_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub district: Option<&'a str>,
    pub filter: Option<&'static str>,
    #[serde(serialize_with = "summary::serialize_summary")]
    pub summary: Option<Summary>,
    pub data: Vec<&'a Reading>,
}

/// Read-only query layer over an immutable dataset.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    dataset: Arc<Dataset>,
    fields: FieldNames,
}

impl QueryEngine {
    pub fn new(dataset: Arc<Dataset>, fields: FieldNames) -> Self {
        Self { dataset, fields }
    }

    /// Every station id, in dataset order
    pub fn list_stations(&self) -> Vec<&str> {
        self.dataset.stations().map(|s| s.id.as_str()).collect()
    }

    /// Distinct state names, sorted ascending
    pub fn list_states(&self) -> Vec<&str> {
        self.dataset
            .stations()
            .filter_map(|s| s.state.as_deref())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct districts of the stations in `state` (case-insensitive), sorted ascending
    pub fn list_districts(&self, state: &str) -> Vec<&str> {
        self.dataset
            .stations()
            .filter(|s| s.in_state(state))
            .filter_map(|s| s.district.as_deref())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Station ids passing every supplied filter; `None` imposes no constraint
    pub fn stations_matching(&self, state: Option<&str>, district: Option<&str>) -> Vec<&str> {
        self.dataset
            .stations()
            .filter(|s| state.map_or(true, |st| s.in_state(st)))
            .filter(|s| district.map_or(true, |d| s.in_district(d)))
            .map(|s| s.id.as_str())
            .collect()
    }

    pub fn station_data(&self, station_id: &str, params: &StationParams) -> Result<StationReport<'_>> {
        let station = self
            .dataset
            .get(station_id)
            .ok_or_else(|| AppError::NotFound(format!("Station '{}' not found", station_id)))?;

        let filter = TemporalFilter::from_params(params)?;
        if params.limit == Some(0) {
            return Err(AppError::BadRequest("limit must be at least 1".to_string()));
        }

        Ok(self.report(station, filter, params.limit))
    }

    fn report<'a>(
        &self,
        station: &'a Station,
        filter: TemporalFilter,
        limit: Option<usize>,
    ) -> StationReport<'a> {
        let timed: Vec<(NaiveDateTime, &Reading)> = station
            .readings
            .iter()
            .filter_map(|r| r.timestamp(&self.fields.timestamp).map(|ts| (ts, r)))
            .collect();

        let mut data = filter.select(&timed);
        let summary = summarize(data.iter().copied(), &self.fields.water_level);

        if let Some(limit) = limit {
            if data.len() > limit {
                data.drain(..data.len() - limit);
            }
        }

        debug!(
            "Station {} filter {:?}: {} of {} readings with valid timestamps",
            station.id,
            filter,
            data.len(),
            timed.len()
        );

        StationReport {
            station_id: &station.id,
            state: station.state.as_deref(),
            district: station.district.as_deref(),
            filter: filter.kind().name(),
            summary,
            data,
        }
    }
}
