use crate::dataset::Reading;
use serde::{Serialize, Serializer};

/// Aggregate statistics over the water levels of a set of readings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    /// Rounded to 2 decimal places, half away from zero
    pub avg: f64,
}

/// Summarize the readings that carry a numeric water level.
///
/// Returns `None` when there is nothing to summarize; callers render that
/// as an empty object rather than zeros.
pub fn summarize<'a, I>(readings: I, water_level_field: &str) -> Option<Summary>
where
    I: IntoIterator<Item = &'a Reading>,
{
    let mut count = 0usize;
    let mut mean = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for level in readings
        .into_iter()
        .filter_map(|r| r.water_level(water_level_field))
    {
        count += 1;
        // Running mean stays finite where a plain sum would overflow
        mean += (level - mean) / count as f64;
        min = min.min(level);
        max = max.max(level);
    }

    if count == 0 {
        return None;
    }

    Some(Summary {
        count,
        min,
        max,
        avg: round2(mean),
    })
}

fn round2(value: f64) -> f64 {
    let scaled = (value * 100.0).round() / 100.0;
    // Scaling overflows for magnitudes near f64::MAX, which need no rounding anyway
    if scaled.is_finite() {
        scaled
    } else {
        value
    }
}

/// Serialize an absent summary as `{}`
pub(crate) fn serialize_summary<S>(
    summary: &Option<Summary>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match summary {
        Some(summary) => summary.serialize(serializer),
        None => serde_json::Map::new().serialize(serializer),
    }
}
