use crate::config::{DatasetConfig, SourceFormat};
use crate::dataset::models::lookup_ignore_case;
use crate::dataset::{Dataset, FieldNames, Reading, Station};
use crate::error::{AppError, Result};
use serde::Deserialize;
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use tracing::{info, warn};

/// Default failure threshold - fail if more than 10% of rows fail to parse
const DEFAULT_FAILURE_THRESHOLD: f64 = 0.10;

#[derive(Debug, Clone, Default)]
pub struct LoadStats {
    pub total_rows: usize,
    pub parsed_successfully: usize,
    pub parse_failures: usize,
    pub empty_rows: usize,
    pub failure_rate: f64,
    pub stations: usize,
    pub readings: usize,
    /// Kept in the dataset, skipped at query time
    pub unusable_timestamps: usize,
    pub missing_water_levels: usize,
}

impl LoadStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finalize(&mut self) {
        let non_empty = self.total_rows - self.empty_rows;
        self.failure_rate = if non_empty > 0 {
            self.parse_failures as f64 / non_empty as f64
        } else {
            0.0
        };
    }

    pub fn exceeds_threshold(&self, threshold: f64) -> bool {
        self.failure_rate > threshold
    }
}

/// Station entry of a JSON object source: a bare reading list, or one with metadata
#[derive(Deserialize)]
#[serde(untagged)]
enum StationEntry {
    Readings(Vec<Value>),
    Detailed {
        #[serde(default)]
        state: Option<String>,
        #[serde(default)]
        district: Option<String>,
        #[serde(default)]
        readings: Vec<Value>,
    },
}

pub struct Loader;

impl Loader {
    /// Read and parse the configured dataset file
    pub fn load(config: &DatasetConfig) -> Result<(Dataset, LoadStats)> {
        let format = config.resolved_format()?;
        info!("Loading {:?} dataset from {}", format, config.path.display());

        let content = std::fs::read_to_string(&config.path).map_err(|e| {
            AppError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read dataset {}: {}", config.path.display(), e),
            ))
        })?;

        let (dataset, stats) = match format {
            SourceFormat::Csv => {
                Self::parse_csv_with_threshold(&content, &config.fields, config.failure_threshold)?
            }
            SourceFormat::Json => {
                Self::parse_json_with_threshold(&content, &config.fields, config.failure_threshold)?
            }
        };

        info!(
            "Dataset loaded: {} stations, {} readings, {} rejected rows",
            stats.stations, stats.readings, stats.parse_failures
        );
        if stats.unusable_timestamps > 0 {
            warn!(
                "{} readings have a missing or malformed '{}' and will be skipped by queries",
                stats.unusable_timestamps, config.fields.timestamp
            );
        }
        if stats.missing_water_levels > 0 {
            warn!(
                "{} readings have no numeric '{}' and will not count towards summaries",
                stats.missing_water_levels, config.fields.water_level
            );
        }

        Ok((dataset, stats))
    }

    /// Parse a flat CSV table, one reading per row
    pub fn parse_csv(content: &str, fields: &FieldNames) -> Result<(Dataset, LoadStats)> {
        Self::parse_csv_with_threshold(content, fields, DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn parse_csv_with_threshold(
        content: &str,
        fields: &FieldNames,
        failure_threshold: f64,
    ) -> Result<(Dataset, LoadStats)> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());
        let headers = reader.headers()?.clone();

        let mut grouper = StationGrouper::new(fields);
        let mut stats = LoadStats::new();

        for (row_num, record) in reader.records().enumerate() {
            stats.total_rows += 1;

            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    stats.parse_failures += 1;
                    warn!("Failed to parse CSV row {}: {}", row_num + 1, e);
                    continue;
                }
            };

            if record.iter().all(|cell| cell.is_empty()) {
                stats.empty_rows += 1;
                continue;
            }

            let row: Map<String, Value> = headers
                .iter()
                .zip(record.iter())
                .map(|(header, cell)| {
                    let value = if fields.is_grouping_column(header) {
                        text_value(cell)
                    } else {
                        cell_value(cell)
                    };
                    (header.to_string(), value)
                })
                .collect();

            match grouper.push_row(row) {
                Ok(()) => stats.parsed_successfully += 1,
                Err(e) => {
                    stats.parse_failures += 1;
                    warn!(
                        "Rejected CSV row {} (failure {}/{}): {}",
                        row_num + 1,
                        stats.parse_failures,
                        stats.total_rows - stats.empty_rows,
                        e
                    );
                }
            }
        }

        Self::finish(grouper.into_stations(), stats, fields, failure_threshold)
    }

    /// Parse a JSON object keyed by station id, or a flat array of row objects
    pub fn parse_json(content: &str, fields: &FieldNames) -> Result<(Dataset, LoadStats)> {
        Self::parse_json_with_threshold(content, fields, DEFAULT_FAILURE_THRESHOLD)
    }

    pub fn parse_json_with_threshold(
        content: &str,
        fields: &FieldNames,
        failure_threshold: f64,
    ) -> Result<(Dataset, LoadStats)> {
        let root: Value = serde_json::from_str(content)?;
        let mut stats = LoadStats::new();

        let stations = match root {
            Value::Object(entries) => {
                let mut stations = Vec::with_capacity(entries.len());
                for (station_id, entry) in entries {
                    let entry: StationEntry = serde_json::from_value(entry).map_err(|e| {
                        AppError::InvalidData(format!(
                            "Station '{}' must be a reading list or an object with 'readings': {}",
                            station_id, e
                        ))
                    })?;
                    let (state, district, raw_readings) = match entry {
                        StationEntry::Readings(readings) => (None, None, readings),
                        StationEntry::Detailed {
                            state,
                            district,
                            readings,
                        } => (state, district, readings),
                    };

                    let mut station = Station::new(station_id);
                    station.state = state.filter(|s| !s.trim().is_empty());
                    station.district = district.filter(|d| !d.trim().is_empty());

                    for (pos, raw) in raw_readings.into_iter().enumerate() {
                        stats.total_rows += 1;
                        match raw {
                            Value::Object(map) => {
                                station.readings.push(Reading::new(map));
                                stats.parsed_successfully += 1;
                            }
                            other => {
                                stats.parse_failures += 1;
                                warn!(
                                    "Rejected reading {} of station {}: expected an object, got {}",
                                    pos + 1,
                                    station.id,
                                    json_kind(&other)
                                );
                            }
                        }
                    }
                    stations.push(station);
                }
                stations
            }
            Value::Array(rows) => {
                let mut grouper = StationGrouper::new(fields);
                for (row_num, raw) in rows.into_iter().enumerate() {
                    stats.total_rows += 1;
                    let result = match raw {
                        Value::Object(row) => grouper.push_row(row),
                        other => Err(AppError::Parse(format!(
                            "expected an object, got {}",
                            json_kind(&other)
                        ))),
                    };
                    match result {
                        Ok(()) => stats.parsed_successfully += 1,
                        Err(e) => {
                            stats.parse_failures += 1;
                            warn!("Rejected JSON row {}: {}", row_num + 1, e);
                        }
                    }
                }
                grouper.into_stations()
            }
            other => {
                return Err(AppError::InvalidData(format!(
                    "Dataset root must be an object or an array, got {}",
                    json_kind(&other)
                )))
            }
        };

        Self::finish(stations, stats, fields, failure_threshold)
    }

    fn finish(
        stations: Vec<Station>,
        mut stats: LoadStats,
        fields: &FieldNames,
        failure_threshold: f64,
    ) -> Result<(Dataset, LoadStats)> {
        stats.finalize();

        // Validate parse success rate
        if stats.exceeds_threshold(failure_threshold) {
            return Err(AppError::Parse(format!(
                "Parse failure rate {:.1}% exceeds threshold {:.1}%: {} failures out of {} non-empty rows",
                stats.failure_rate * 100.0,
                failure_threshold * 100.0,
                stats.parse_failures,
                stats.total_rows - stats.empty_rows
            )));
        }

        if stations.is_empty() {
            return Err(AppError::Parse("Dataset contains no stations".to_string()));
        }

        for reading in stations.iter().flat_map(|s| s.readings.iter()) {
            stats.readings += 1;
            if reading.timestamp(&fields.timestamp).is_none() {
                stats.unusable_timestamps += 1;
            }
            if reading.water_level(&fields.water_level).is_none() {
                stats.missing_water_levels += 1;
            }
        }
        stats.stations = stations.len();

        Ok((Dataset::new(stations)?, stats))
    }
}

/// Groups flat rows into stations, preserving first-seen station order
struct StationGrouper<'f> {
    fields: &'f FieldNames,
    stations: Vec<Station>,
    index: HashMap<String, usize>,
}

impl<'f> StationGrouper<'f> {
    fn new(fields: &'f FieldNames) -> Self {
        Self {
            fields,
            stations: Vec::new(),
            index: HashMap::new(),
        }
    }

    fn push_row(&mut self, row: Map<String, Value>) -> Result<()> {
        let station_id = lookup_text(&row, &self.fields.station_id).ok_or_else(|| {
            AppError::Parse(format!("missing '{}' value", self.fields.station_id))
        })?;
        let state = lookup_text(&row, &self.fields.state);
        let district = lookup_text(&row, &self.fields.district);

        let pos = match self.index.get(&station_id) {
            Some(&pos) => pos,
            None => {
                self.stations.push(Station::new(station_id.clone()));
                self.index.insert(station_id, self.stations.len() - 1);
                self.stations.len() - 1
            }
        };

        let station = &mut self.stations[pos];
        if station.state.is_none() {
            station.state = state;
        }
        if station.district.is_none() {
            station.district = district;
        }
        station.readings.push(Reading::new(row));
        Ok(())
    }

    fn into_stations(self) -> Vec<Station> {
        self.stations
    }
}

impl FieldNames {
    /// Station, state and district columns keep their raw text
    fn is_grouping_column(&self, header: &str) -> bool {
        [&self.station_id, &self.state, &self.district]
            .iter()
            .any(|name| name.eq_ignore_ascii_case(header))
    }
}

/// Non-empty text of the first key matching `name` case-insensitively
fn lookup_text(row: &Map<String, Value>, name: &str) -> Option<String> {
    let text = match lookup_ignore_case(row, name)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

fn text_value(cell: &str) -> Value {
    if cell.is_empty() {
        Value::Null
    } else {
        Value::String(cell.to_string())
    }
}

/// Numeric cells become JSON numbers, empty cells become null
fn cell_value(cell: &str) -> Value {
    if cell.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    if let Some(n) = cell
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(Number::from_f64)
    {
        return Value::Number(n);
    }
    Value::String(cell.to_string())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
