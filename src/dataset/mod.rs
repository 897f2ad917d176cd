pub mod models;

pub use models::{FieldNames, Reading, Station};

use crate::error::{AppError, Result};
use std::collections::HashMap;

/// Immutable collection of stations keyed by id, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    stations: Vec<Station>,
    index: HashMap<String, usize>,
}

impl Dataset {
    pub fn new(stations: Vec<Station>) -> Result<Self> {
        let mut index = HashMap::with_capacity(stations.len());
        for (pos, station) in stations.iter().enumerate() {
            if index.insert(station.id.clone(), pos).is_some() {
                return Err(AppError::InvalidData(format!(
                    "Duplicate station id '{}'",
                    station.id
                )));
            }
        }
        Ok(Self { stations, index })
    }

    pub fn get(&self, station_id: &str) -> Option<&Station> {
        self.index.get(station_id).map(|&pos| &self.stations[pos])
    }

    pub fn stations(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn reading_count(&self) -> usize {
        self.stations.iter().map(|s| s.readings.len()).sum()
    }
}
