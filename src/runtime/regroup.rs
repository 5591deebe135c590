//! Regrouping pool collecting completed stream blocks into per-detector maps.

use crate::data::{FitMaps, StreamBlock};
use crate::error::StreamBlockError;
use ndarray::Array2;
use std::collections::HashMap;
use tracing::warn;

/// Maps under construction for one (dataset file, detector).
struct Group {
    maps: FitMaps,
    seen: Array2<bool>,
    expected: usize,
    received: usize,
}

/// Pool for regrouping pixels of many files and detectors.
///
/// Owned by the single aggregator; workers never touch it.
pub struct RegroupPool {
    groups: HashMap<(String, usize), Group>,
}

impl RegroupPool {
    /// Create a new empty pool.
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// Open a group expecting one block per pixel of `maps`.
    pub fn expect(&mut self, dataset: &str, detector: usize, maps: FitMaps) {
        let expected = maps.rows() * maps.cols();
        self.groups.insert(
            (dataset.to_string(), detector),
            Group {
                seen: Array2::from_elem((maps.rows(), maps.cols()), false),
                maps,
                expected,
                received: 0,
            },
        );
    }

    /// Aggregate a completed block.
    ///
    /// Returns the group's maps, removed from the pool, once its last pixel
    /// has arrived. Blocks of unknown groups, blocks outside the raster and
    /// repeated pixels are dropped with a warning.
    pub fn add(&mut self, mut block: StreamBlock) -> Result<Option<FitMaps>, StreamBlockError> {
        let key = (block.dataset().to_string(), block.detector());
        let Some(group) = self.groups.get_mut(&key) else {
            warn!(
                dataset = block.dataset(),
                detector = block.detector(),
                "block for unknown group dropped"
            );
            return Ok(None);
        };
        let pixel = [block.row(), block.col()];
        match group.seen.get(pixel) {
            Some(false) => {}
            Some(true) => {
                warn!(row = pixel[0], col = pixel[1], "repeated pixel dropped");
                return Ok(None);
            }
            None => {
                warn!(row = pixel[0], col = pixel[1], "pixel outside raster dropped");
                return Ok(None);
            }
        }
        block.aggregate_into(&mut group.maps)?;
        group.seen[pixel] = true;
        group.received += 1;

        if group.received < group.expected {
            return Ok(None);
        }
        Ok(self.groups.remove(&key).map(|g| g.maps))
    }

    /// Number of blocks aggregated so far for a group.
    pub fn received(&self, dataset: &str, detector: usize) -> usize {
        self.groups
            .get(&(dataset.to_string(), detector))
            .map(|g| g.received)
            .unwrap_or(0)
    }

    /// Check if a group is still waiting for pixels.
    pub fn is_pending(&self, dataset: &str, detector: usize) -> bool {
        self.groups.contains_key(&(dataset.to_string(), detector))
    }

    /// Remove a group whether or not every pixel arrived.
    pub fn take(&mut self, dataset: &str, detector: usize) -> Option<FitMaps> {
        let group = self.groups.remove(&(dataset.to_string(), detector))?;
        if group.received < group.expected {
            warn!(
                dataset,
                detector,
                received = group.received,
                expected = group.expected,
                "taking incomplete maps"
            );
        }
        Some(group.maps)
    }

    /// Get the number of open groups.
    pub fn pending_count(&self) -> usize {
        self.groups.len()
    }

    /// Drop every open group.
    pub fn clear(&mut self) {
        self.groups.clear();
    }
}

impl Default for RegroupPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{FitElement, FitElements, Spectrum};
    use crate::fitting::{OptimizerKind, RoutineKind, RoutineRegistry};
    use crate::model::SpectraModel;
    use std::sync::Arc;

    fn elements() -> Arc<FitElements> {
        let mut set = FitElements::new();
        set.insert(FitElement::new("Fe", 26, &[("ka1", 6.404, 1.0)]));
        Arc::new(set)
    }

    fn completed(dataset: &str, detector: usize, row: usize, col: usize, value: f64) -> StreamBlock {
        let mut counts = vec![0.0; 1024];
        counts[640] = value;
        let mut block = StreamBlock::new(
            row,
            col,
            detector,
            Arc::from(dataset),
            Spectrum::new(counts),
            &[RoutineKind::Roi],
            Some(elements()),
        )
        .unwrap();
        let registry = RoutineRegistry::with_kinds(&[RoutineKind::Roi], OptimizerKind::Lmfit);
        block.fit(&registry, &SpectraModel::default()).unwrap();
        block
    }

    #[test]
    fn test_group_completes_on_last_pixel() {
        let mut pool = RegroupPool::new();
        pool.expect("a", 0, FitMaps::new(1, 2, &[RoutineKind::Roi], &elements()));
        pool.expect("a", 1, FitMaps::new(1, 2, &[RoutineKind::Roi], &elements()));

        assert!(pool.add(completed("a", 0, 0, 1, 7.0)).unwrap().is_none());
        assert!(pool.add(completed("a", 1, 0, 0, 3.0)).unwrap().is_none());
        assert_eq!(pool.received("a", 0), 1);

        let maps = pool.add(completed("a", 0, 0, 0, 5.0)).unwrap().unwrap();
        let fe = maps.map(RoutineKind::Roi, "Fe").unwrap();
        assert_eq!(fe[[0, 0]], 5.0);
        assert_eq!(fe[[0, 1]], 7.0);
        assert!(!pool.is_pending("a", 0));
        assert_eq!(pool.pending_count(), 1);
    }

    #[test]
    fn test_unknown_group_and_take() {
        let mut pool = RegroupPool::new();
        assert!(pool.add(completed("b", 0, 0, 0, 1.0)).unwrap().is_none());

        pool.expect("a", 0, FitMaps::new(2, 2, &[RoutineKind::Roi], &elements()));
        pool.add(completed("a", 0, 1, 1, 2.0)).unwrap();
        let partial = pool.take("a", 0).unwrap();
        assert_eq!(partial.map(RoutineKind::Roi, "Fe").unwrap()[[1, 1]], 2.0);
        assert!(pool.take("a", 0).is_none());
    }

    #[test]
    fn test_stray_blocks_do_not_complete_group() {
        let mut pool = RegroupPool::new();
        pool.expect("a", 0, FitMaps::new(1, 2, &[RoutineKind::Roi], &elements()));

        assert!(pool.add(completed("a", 0, 0, 0, 5.0)).unwrap().is_none());
        assert!(pool.add(completed("a", 0, 0, 0, 9.0)).unwrap().is_none());
        assert!(pool.add(completed("a", 0, 3, 0, 9.0)).unwrap().is_none());
        assert!(pool.add(completed("a", 0, 0, 2, 9.0)).unwrap().is_none());
        assert_eq!(pool.received("a", 0), 1);
        assert!(pool.is_pending("a", 0));

        let maps = pool.add(completed("a", 0, 0, 1, 7.0)).unwrap().unwrap();
        let fe = maps.map(RoutineKind::Roi, "Fe").unwrap();
        assert_eq!(fe[[0, 0]], 5.0);
        assert_eq!(fe[[0, 1]], 7.0);
    }

    #[test]
    fn test_unfinished_block_is_rejected() {
        let mut pool = RegroupPool::new();
        pool.expect("a", 0, FitMaps::new(1, 1, &[RoutineKind::Roi], &elements()));
        let block = StreamBlock::new(
            0,
            0,
            0,
            Arc::from("a"),
            Spectrum::zeros(8),
            &[RoutineKind::Roi],
            Some(elements()),
        )
        .unwrap();
        assert!(matches!(pool.add(block), Err(StreamBlockError::Incomplete { .. })));
    }
}
