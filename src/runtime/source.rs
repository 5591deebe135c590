//! Dataset readers as seen by the pipeline.
//!
//! File formats live outside this crate; a reader only has to hand over
//! per-pixel spectra for a (file, detector) pair.

use crate::data::{SpectraVolume, Spectrum};
use crate::error::SourceError;
use std::collections::HashMap;

/// Raster and channel dimensions of one detector in one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanShape {
    pub rows: usize,
    pub cols: usize,
    pub channels: usize,
}

impl ScanShape {
    pub fn pixels(&self) -> usize {
        self.rows * self.cols
    }
}

/// Supplies spectra to the pipeline.
pub trait SpectraSource: Send + Sync {
    /// Files found in the dataset, used when the job names none.
    fn dataset_files(&self) -> Vec<String> {
        Vec::new()
    }

    fn scan_shape(&self, file: &str, detector: usize) -> Result<ScanShape, SourceError>;

    /// Every pixel of one detector, loaded at once.
    fn load_volume(&self, file: &str, detector: usize) -> Result<SpectraVolume, SourceError>;

    /// Push pixels into `sink` as they are read. `sink` returns `false` to
    /// stop early.
    fn stream_spectra(
        &self,
        file: &str,
        detector: usize,
        sink: &mut dyn FnMut(usize, usize, Spectrum) -> bool,
    ) -> Result<(), SourceError> {
        let volume = self.load_volume(file, detector)?;
        for row in 0..volume.rows() {
            for col in 0..volume.cols() {
                if !sink(row, col, volume.spectrum(row, col).clone()) {
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Size on disk in bytes, if known.
    fn file_size(&self, file: &str) -> Option<u64>;
}

/// Source backed by volumes held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    files: Vec<String>,
    volumes: HashMap<(String, usize), SpectraVolume>,
    sizes: HashMap<String, u64>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the volume of `detector` in `file`.
    pub fn insert(&mut self, file: &str, detector: usize, volume: SpectraVolume) {
        if !self.files.iter().any(|f| f == file) {
            self.files.push(file.to_string());
        }
        self.volumes.insert((file.to_string(), detector), volume);
    }

    pub fn with_volume(mut self, file: &str, detector: usize, volume: SpectraVolume) -> Self {
        self.insert(file, detector, volume);
        self
    }

    /// Override the reported file size.
    pub fn set_file_size(&mut self, file: &str, bytes: u64) {
        self.sizes.insert(file.to_string(), bytes);
    }

    fn volume(&self, file: &str, detector: usize) -> Result<&SpectraVolume, SourceError> {
        if !self.files.iter().any(|f| f == file) {
            return Err(SourceError::FileNotFound(file.to_string()));
        }
        self.volumes
            .get(&(file.to_string(), detector))
            .ok_or_else(|| SourceError::DetectorNotFound {
                file: file.to_string(),
                detector,
            })
    }
}

impl SpectraSource for InMemorySource {
    fn dataset_files(&self) -> Vec<String> {
        self.files.clone()
    }

    fn scan_shape(&self, file: &str, detector: usize) -> Result<ScanShape, SourceError> {
        let volume = self.volume(file, detector)?;
        Ok(ScanShape {
            rows: volume.rows(),
            cols: volume.cols(),
            channels: volume.channels(),
        })
    }

    fn load_volume(&self, file: &str, detector: usize) -> Result<SpectraVolume, SourceError> {
        self.volume(file, detector).cloned()
    }

    fn file_size(&self, file: &str) -> Option<u64> {
        if let Some(size) = self.sizes.get(file) {
            return Some(*size);
        }
        let bytes: usize = self
            .volumes
            .iter()
            .filter(|((f, _), _)| f == file)
            .map(|(_, v)| v.spectra().iter().map(Spectrum::len).sum::<usize>() * 8)
            .sum();
        (bytes > 0).then_some(bytes as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn volume(rows: usize, cols: usize) -> SpectraVolume {
        let spectra = (0..rows * cols)
            .map(|i| Spectrum::new(vec![i as f64; 4]))
            .collect();
        SpectraVolume::from_spectra(rows, cols, spectra).unwrap()
    }

    #[test]
    fn test_lookup_errors() {
        let source = InMemorySource::new().with_volume("a.mda", 0, volume(2, 2));
        assert_eq!(
            source.scan_shape("a.mda", 0).unwrap(),
            ScanShape { rows: 2, cols: 2, channels: 4 }
        );
        assert!(matches!(source.load_volume("b.mda", 0), Err(SourceError::FileNotFound(_))));
        assert!(matches!(
            source.load_volume("a.mda", 3),
            Err(SourceError::DetectorNotFound { detector: 3, .. })
        ));
    }

    #[test]
    fn test_default_stream_visits_row_major_and_stops() {
        let source = InMemorySource::new().with_volume("a.mda", 0, volume(2, 3));
        let mut seen = Vec::new();
        source
            .stream_spectra("a.mda", 0, &mut |row, col, spectrum| {
                seen.push((row, col, spectrum[0]));
                seen.len() < 4
            })
            .unwrap();
        assert_eq!(seen, vec![(0, 0, 0.0), (0, 1, 1.0), (0, 2, 2.0), (1, 0, 3.0)]);
    }

    #[test]
    fn test_file_size() {
        let mut source = InMemorySource::new()
            .with_volume("a.mda", 0, volume(2, 2))
            .with_volume("a.mda", 1, volume(2, 2));
        assert_eq!(source.file_size("a.mda"), Some(2 * 4 * 4 * 8));
        source.set_file_size("a.mda", 7);
        assert_eq!(source.file_size("a.mda"), Some(7));
        assert_eq!(source.file_size("missing"), None);
        assert_eq!(source.dataset_files(), vec!["a.mda".to_string()]);
    }
}
