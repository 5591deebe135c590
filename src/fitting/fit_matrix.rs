//! Per-element reference spectra as the columns of a dense matrix.
//!
//! A matrix is tied to the channel window, element list and peak shape it was
//! built from. Routines rebuild it whenever any of those change and otherwise
//! share one copy across every pixel of a run.

use crate::data::{EnergyRange, FitElements, Spectrum};
use crate::model::{PeakShape, SpectraModel};
use nalgebra::{DMatrix, DVector};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// `channels × elements` reference spectra.
#[derive(Clone, Debug, PartialEq)]
pub struct FitMatrix {
    matrix: DMatrix<f64>,
    names: Vec<String>,
    columns: HashMap<String, usize>,
    range: EnergyRange,
    shape: PeakShape,
}

impl FitMatrix {
    /// One unit-amplitude column per element over `range`.
    pub fn build(model: &SpectraModel, elements: &FitElements, range: EnergyRange) -> Self {
        let names: Vec<String> = elements.names().map(str::to_string).collect();
        let mut matrix = DMatrix::zeros(range.count(), names.len());
        let mut columns = HashMap::with_capacity(names.len());

        for (col, element) in elements.iter().enumerate() {
            let reference = model.generate(element, range);
            for (row, value) in reference.counts().iter().enumerate() {
                matrix[(row, col)] = *value;
            }
            columns.insert(element.name.clone(), col);
        }

        Self {
            matrix,
            names,
            columns,
            range,
            shape: model.shape(),
        }
    }

    /// Whether this matrix still describes `model` over `range`.
    pub fn is_valid_for(&self, model: &SpectraModel, elements: &FitElements, range: EnergyRange) -> bool {
        self.range == range
            && self.shape == model.shape()
            && self.names.len() == elements.len()
            && elements.names().zip(&self.names).all(|(a, b)| a == b.as_str())
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    pub fn range(&self) -> EnergyRange {
        self.range
    }

    /// Element names in column order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.get(name).copied()
    }

    pub fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.matrix.ncols()
    }

    /// The part of `spectrum` this matrix covers, zero padded if short.
    pub fn rhs(&self, spectrum: &Spectrum) -> DVector<f64> {
        let slice = spectrum.sub_spectrum(self.range);
        DVector::from_fn(self.nrows(), |i, _| slice.get(i).copied().unwrap_or(0.0))
    }
}

/// Matrix state shared by the SVD and NNLS routines.
#[derive(Default)]
pub struct MatrixFitBase {
    matrix: Option<Arc<FitMatrix>>,
    range: Option<EnergyRange>,
}

impl MatrixFitBase {
    /// Rebuild the matrix unless the current one is still valid.
    ///
    /// Returns `true` when a new matrix was built.
    pub fn initialize(&mut self, model: &SpectraModel, elements: &FitElements, range: EnergyRange) -> bool {
        self.range = Some(range);
        if let Some(existing) = &self.matrix {
            if existing.is_valid_for(model, elements, range) {
                debug!("reusing fit matrix");
                return false;
            }
        }
        debug!(
            rows = range.count(),
            cols = elements.len(),
            "building fit matrix"
        );
        self.matrix = Some(Arc::new(FitMatrix::build(model, elements, range)));
        true
    }

    pub fn matrix(&self) -> Option<&Arc<FitMatrix>> {
        self.matrix.as_ref()
    }

    /// The matrix to fit `spectrum` with.
    ///
    /// Falls back to a one-off build when the routine was not initialized for
    /// this model, so a stale matrix is never used.
    pub fn matrix_for(
        &self,
        model: &SpectraModel,
        elements: &FitElements,
        spectrum: &Spectrum,
    ) -> (Arc<FitMatrix>, bool) {
        let range = self
            .range
            .unwrap_or_else(|| EnergyRange::full(spectrum.len()));
        match &self.matrix {
            Some(matrix) if matrix.is_valid_for(model, elements, range) => (matrix.clone(), true),
            _ => {
                warn!("fit matrix missing or stale, building a temporary one");
                (Arc::new(FitMatrix::build(model, elements, range)), false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FitElement;
    use crate::model::{FitParameters, ENERGY_OFFSET};

    fn elements() -> FitElements {
        let mut set = FitElements::new();
        set.insert(FitElement::new("Fe", 26, &[("ka1", 6.404, 0.58), ("kb1", 7.058, 0.13)]));
        set.insert(FitElement::new("Cu", 29, &[("ka1", 8.048, 0.58), ("kb1", 8.905, 0.13)]));
        set
    }

    #[test]
    fn test_build_shape_and_columns() {
        let model = SpectraModel::default();
        let range = EnergyRange::new(500, 999);
        let fm = FitMatrix::build(&model, &elements(), range);
        assert_eq!(fm.nrows(), 500);
        assert_eq!(fm.ncols(), 2);
        assert_eq!(fm.names(), &["Cu".to_string(), "Fe".to_string()]);
        assert_eq!(fm.column("Fe"), Some(1));
        assert!(fm.column("Zn").is_none());

        // Fe column peaks near channel 640
        let col = fm.matrix().column(1);
        let peak = col.iamax();
        assert!((peak as i64 + 500 - 640).abs() <= 1);
    }

    #[test]
    fn test_rebuild_is_bit_identical() {
        let model = SpectraModel::default();
        let range = EnergyRange::new(100, 1200);
        let a = FitMatrix::build(&model, &elements(), range);
        let b = FitMatrix::build(&model, &elements(), range);
        assert_eq!(a, b);
        for (x, y) in a.matrix().iter().zip(b.matrix().iter()) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_base_reuses_and_rebuilds() {
        let model = SpectraModel::default();
        let mut base = MatrixFitBase::default();
        assert!(base.initialize(&model, &elements(), EnergyRange::new(100, 1200)));
        let first = base.matrix().unwrap().clone();
        assert!(!base.initialize(&model, &elements(), EnergyRange::new(100, 1200)));
        assert!(Arc::ptr_eq(&first, base.matrix().unwrap()));

        // new window forces a rebuild
        assert!(base.initialize(&model, &elements(), EnergyRange::new(100, 1100)));
        assert_eq!(base.matrix().unwrap().nrows(), 1001);

        // so does a calibration change
        let mut params = FitParameters::new();
        params.set_value(ENERGY_OFFSET, 0.01);
        let shifted = SpectraModel::new(params);
        assert!(base.initialize(&shifted, &elements(), EnergyRange::new(100, 1100)));
    }

    #[test]
    fn test_stale_matrix_is_not_used() {
        let model = SpectraModel::default();
        let mut base = MatrixFitBase::default();
        base.initialize(&model, &elements(), EnergyRange::new(100, 1200));

        let mut params = FitParameters::new();
        params.set_value(ENERGY_OFFSET, 0.02);
        let shifted = SpectraModel::new(params);
        let (matrix, reused) = base.matrix_for(&shifted, &elements(), &Spectrum::zeros(2048));
        assert!(!reused);
        assert_eq!(matrix.as_ref(), &FitMatrix::build(&shifted, &elements(), EnergyRange::new(100, 1200)));
    }

    #[test]
    fn test_rhs_pads_short_spectra() {
        let model = SpectraModel::default();
        let fm = FitMatrix::build(&model, &elements(), EnergyRange::new(2, 5));
        let rhs = fm.rhs(&Spectrum::new(vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(rhs.as_slice(), &[3.0, 4.0, 0.0, 0.0]);
    }
}
