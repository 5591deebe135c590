//! Output sinks for fitted maps.

use crate::data::FitMaps;
use crate::error::WriterError;
use std::collections::BTreeMap;

/// Receives finished maps. Only one thread ever calls a writer at a time.
pub trait MapWriter: Send {
    /// Maps of one detector, or of the detector sum when `detector` is `None`.
    fn write_maps(&mut self, file: &str, detector: Option<usize>, maps: &FitMaps) -> Result<(), WriterError>;

    /// Detector-averaged maps of one file.
    fn write_average(&mut self, file: &str, maps: &FitMaps) -> Result<(), WriterError>;
}

/// Keeps every write in memory.
#[derive(Debug, Default)]
pub struct InMemoryWriter {
    maps: BTreeMap<(String, Option<usize>), FitMaps>,
    averages: BTreeMap<String, FitMaps>,
}

impl InMemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn maps(&self, file: &str, detector: Option<usize>) -> Option<&FitMaps> {
        self.maps.get(&(file.to_string(), detector))
    }

    pub fn average(&self, file: &str) -> Option<&FitMaps> {
        self.averages.get(file)
    }

    /// Number of `write_maps` outputs held.
    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty() && self.averages.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &(String, Option<usize>)> {
        self.maps.keys()
    }
}

impl MapWriter for InMemoryWriter {
    fn write_maps(&mut self, file: &str, detector: Option<usize>, maps: &FitMaps) -> Result<(), WriterError> {
        self.maps.insert((file.to_string(), detector), maps.clone());
        Ok(())
    }

    fn write_average(&mut self, file: &str, maps: &FitMaps) -> Result<(), WriterError> {
        self.averages.insert(file.to_string(), maps.clone());
        Ok(())
    }
}
