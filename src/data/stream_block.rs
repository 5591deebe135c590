//! Per-pixel unit of work carried through the streaming pipeline.

use super::fit_element::FitElements;
use super::fit_maps::FitMaps;
use super::spectrum::Spectrum;
use crate::error::StreamBlockError;
use crate::fitting::{zero_counts, FitCounts, RoutineKind, RoutineRegistry};
use crate::model::SpectraModel;
use std::sync::Arc;

/// Lifecycle of a [`StreamBlock`]. States are only ever visited in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BlockState {
    Constructed,
    Fitting,
    Complete,
    Aggregated,
}

/// Results of one routine for one pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct FittingBlock {
    pub kind: RoutineKind,
    pub counts: FitCounts,
}

/// One pixel of one detector: its spectrum, the shared element set and one
/// [`FittingBlock`] per configured routine.
#[derive(Debug, Clone)]
pub struct StreamBlock {
    row: usize,
    col: usize,
    detector: usize,
    dataset: Arc<str>,
    spectrum: Spectrum,
    elements: Arc<FitElements>,
    blocks: Vec<FittingBlock>,
    state: BlockState,
}

impl StreamBlock {
    /// Create a block with every routine's counts zeroed.
    ///
    /// Fails when `elements` is `None`.
    pub fn new(
        row: usize,
        col: usize,
        detector: usize,
        dataset: Arc<str>,
        spectrum: Spectrum,
        routines: &[RoutineKind],
        elements: Option<Arc<FitElements>>,
    ) -> Result<Self, StreamBlockError> {
        let elements = elements.ok_or(StreamBlockError::MissingElements { row, col })?;
        let blocks = routines
            .iter()
            .map(|&kind| FittingBlock {
                kind,
                counts: zero_counts(&elements),
            })
            .collect();
        Ok(Self {
            row,
            col,
            detector,
            dataset,
            spectrum,
            elements,
            blocks,
            state: BlockState::Constructed,
        })
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn detector(&self) -> usize {
        self.detector
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn spectrum(&self) -> &Spectrum {
        &self.spectrum
    }

    pub fn elements(&self) -> &Arc<FitElements> {
        &self.elements
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    pub fn fitting_blocks(&self) -> &[FittingBlock] {
        &self.blocks
    }

    /// Counts of the routine `kind`, if it is configured on this block.
    pub fn counts(&self, kind: RoutineKind) -> Option<&FitCounts> {
        self.blocks.iter().find(|b| b.kind == kind).map(|b| &b.counts)
    }

    fn advance(&mut self, from: BlockState, to: BlockState) -> Result<(), StreamBlockError> {
        if self.state != from {
            return Err(StreamBlockError::InvalidTransition {
                row: self.row,
                col: self.col,
                from: self.state,
                to,
            });
        }
        self.state = to;
        Ok(())
    }

    /// Run every configured routine found in `routines`, then mark complete.
    ///
    /// A routine kind missing from the registry leaves its counts at zero.
    pub fn fit(&mut self, routines: &RoutineRegistry, model: &SpectraModel) -> Result<(), StreamBlockError> {
        self.advance(BlockState::Constructed, BlockState::Fitting)?;
        for block in &mut self.blocks {
            let Some(routine) = routines.get(block.kind) else {
                continue;
            };
            let counts = routine.fit_spectra(model, &self.spectrum, &self.elements);
            for (name, value) in block.counts.iter_mut() {
                if let Some(fitted) = counts.get(name) {
                    *value = *fitted;
                }
            }
        }
        self.advance(BlockState::Fitting, BlockState::Complete)
    }

    /// Copy results into `maps` and retire the block.
    pub fn aggregate_into(&mut self, maps: &mut FitMaps) -> Result<(), StreamBlockError> {
        if self.state != BlockState::Complete {
            return Err(StreamBlockError::Incomplete {
                row: self.row,
                col: self.col,
            });
        }
        for block in &self.blocks {
            maps.set_counts(block.kind, self.row, self.col, &block.counts);
        }
        self.advance(BlockState::Complete, BlockState::Aggregated)
    }
}
