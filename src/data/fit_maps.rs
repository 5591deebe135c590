//! Per-element 2D result maps for one dataset file and detector.

use super::fit_element::FitElements;
use super::quantification::QuantificationFactors;
use crate::fitting::{FitCounts, RoutineKind, NUM_ITR};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Element name (or [`NUM_ITR`]) to a `rows × cols` map.
pub type ElementMaps = BTreeMap<String, Array2<f64>>;

/// Fitted intensity maps, one set per routine.
#[derive(Debug, Clone, PartialEq)]
pub struct FitMaps {
    rows: usize,
    cols: usize,
    maps: BTreeMap<RoutineKind, ElementMaps>,
    quantified: BTreeMap<RoutineKind, ElementMaps>,
}

impl FitMaps {
    /// Zeroed maps for every routine and element, plus an iteration map.
    pub fn new(rows: usize, cols: usize, routines: &[RoutineKind], elements: &FitElements) -> Self {
        let mut maps = BTreeMap::new();
        for &kind in routines {
            let mut per_element: ElementMaps = elements
                .names()
                .map(|name| (name.to_string(), Array2::zeros((rows, cols))))
                .collect();
            per_element.insert(NUM_ITR.to_string(), Array2::zeros((rows, cols)));
            maps.insert(kind, per_element);
        }
        Self {
            rows,
            cols,
            maps,
            quantified: BTreeMap::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn routines(&self) -> impl Iterator<Item = RoutineKind> + '_ {
        self.maps.keys().copied()
    }

    /// Every map of one routine, keyed by element name.
    pub fn routine_maps(&self, kind: RoutineKind) -> Option<&ElementMaps> {
        self.maps.get(&kind)
    }

    pub fn map(&self, kind: RoutineKind, element: &str) -> Option<&Array2<f64>> {
        self.maps.get(&kind)?.get(element)
    }

    pub fn iteration_map(&self, kind: RoutineKind) -> Option<&Array2<f64>> {
        self.map(kind, NUM_ITR)
    }

    /// Quantified map, present after [`FitMaps::apply_quantification`].
    pub fn quantified(&self, kind: RoutineKind, element: &str) -> Option<&Array2<f64>> {
        self.quantified.get(&kind)?.get(element)
    }

    pub fn has_quantified(&self) -> bool {
        !self.quantified.is_empty()
    }

    /// Store one pixel's counts. Names without a map are ignored.
    pub fn set_counts(&mut self, kind: RoutineKind, row: usize, col: usize, counts: &FitCounts) {
        if row >= self.rows || col >= self.cols {
            return;
        }
        let Some(per_element) = self.maps.get_mut(&kind) else {
            return;
        };
        for (name, map) in per_element.iter_mut() {
            if let Some(value) = counts.get(name) {
                map[[row, col]] = *value;
            }
        }
    }

    /// Add a counts-times-factor copy of every element map.
    pub fn apply_quantification(&mut self, factors: &QuantificationFactors) {
        self.quantified.clear();
        for (&kind, per_element) in &self.maps {
            let scaled: ElementMaps = per_element
                .iter()
                .filter(|(name, _)| name.as_str() != NUM_ITR)
                .filter_map(|(name, map)| {
                    let factor = factors.factor(kind, name)?;
                    Some((name.clone(), map * factor))
                })
                .collect();
            if !scaled.is_empty() {
                self.quantified.insert(kind, scaled);
            }
        }
    }

    /// Element-wise mean of maps with identical shape and layout.
    ///
    /// Returns `None` for an empty slice or mismatched shapes.
    pub fn average(all: &[FitMaps]) -> Option<FitMaps> {
        let (first, rest) = all.split_first()?;
        if rest
            .iter()
            .any(|m| m.rows != first.rows || m.cols != first.cols || !same_layout(&m.maps, &first.maps))
        {
            return None;
        }

        let n = all.len() as f64;
        let mean = |pick: fn(&FitMaps) -> &BTreeMap<RoutineKind, ElementMaps>| {
            let mut out = pick(first).clone();
            for (kind, per_element) in out.iter_mut() {
                for (name, map) in per_element.iter_mut() {
                    for other in rest {
                        if let Some(m) = pick(other).get(kind).and_then(|e| e.get(name)) {
                            *map += m;
                        }
                    }
                    *map /= n;
                }
            }
            out
        };

        let quantified = if all.iter().all(|m| same_layout(&m.quantified, &first.quantified)) {
            mean(|m| &m.quantified)
        } else {
            BTreeMap::new()
        };

        Some(FitMaps {
            rows: first.rows,
            cols: first.cols,
            maps: mean(|m| &m.maps),
            quantified,
        })
    }
}

fn same_layout(a: &BTreeMap<RoutineKind, ElementMaps>, b: &BTreeMap<RoutineKind, ElementMaps>) -> bool {
    a.len() == b.len()
        && a.iter().zip(b.iter()).all(|((ka, ea), (kb, eb))| {
            ka == kb && ea.len() == eb.len() && ea.keys().zip(eb.keys()).all(|(x, y)| x == y)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FitElement;

    fn elements() -> FitElements {
        let mut set = FitElements::new();
        set.insert(FitElement::new("Fe", 26, &[("ka1", 6.404, 1.0)]));
        set.insert(FitElement::new("Cu", 29, &[("ka1", 8.048, 1.0)]));
        set
    }

    fn counts(fe: f64, cu: f64, itr: f64) -> FitCounts {
        [("Fe", fe), ("Cu", cu), (NUM_ITR, itr), ("Zn", 9.0)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    #[test]
    fn test_new_and_set() {
        let mut maps = FitMaps::new(2, 3, &[RoutineKind::Roi, RoutineKind::Nnls], &elements());
        assert_eq!(maps.routines().collect::<Vec<_>>(), vec![RoutineKind::Roi, RoutineKind::Nnls]);
        assert_eq!(maps.map(RoutineKind::Roi, "Fe").unwrap().dim(), (2, 3));

        maps.set_counts(RoutineKind::Nnls, 1, 2, &counts(5.0, 6.0, 3.0));
        assert_eq!(maps.map(RoutineKind::Nnls, "Fe").unwrap()[[1, 2]], 5.0);
        assert_eq!(maps.iteration_map(RoutineKind::Nnls).unwrap()[[1, 2]], 3.0);
        // unconfigured names and routines are ignored
        assert!(maps.map(RoutineKind::Nnls, "Zn").is_none());
        maps.set_counts(RoutineKind::Svd, 0, 0, &counts(1.0, 1.0, 1.0));
        maps.set_counts(RoutineKind::Nnls, 9, 9, &counts(1.0, 1.0, 1.0));
        assert_eq!(maps.map(RoutineKind::Roi, "Fe").unwrap().sum(), 0.0);
    }

    #[test]
    fn test_average() {
        let mut a = FitMaps::new(1, 2, &[RoutineKind::Roi], &elements());
        let mut b = a.clone();
        a.set_counts(RoutineKind::Roi, 0, 0, &counts(2.0, 4.0, 0.0));
        b.set_counts(RoutineKind::Roi, 0, 0, &counts(4.0, 0.0, 0.0));
        let avg = FitMaps::average(&[a, b]).unwrap();
        assert_eq!(avg.map(RoutineKind::Roi, "Fe").unwrap()[[0, 0]], 3.0);
        assert_eq!(avg.map(RoutineKind::Roi, "Cu").unwrap()[[0, 0]], 2.0);
    }

    #[test]
    fn test_average_rejects_mismatch() {
        let a = FitMaps::new(1, 2, &[RoutineKind::Roi], &elements());
        let b = FitMaps::new(2, 2, &[RoutineKind::Roi], &elements());
        let c = FitMaps::new(1, 2, &[RoutineKind::Svd], &elements());
        assert!(FitMaps::average(&[]).is_none());
        assert!(FitMaps::average(&[a.clone(), b]).is_none());
        assert!(FitMaps::average(&[a, c]).is_none());
    }

    #[test]
    fn test_quantification_scales_maps() {
        let mut maps = FitMaps::new(1, 1, &[RoutineKind::Roi], &elements());
        maps.set_counts(RoutineKind::Roi, 0, 0, &counts(10.0, 20.0, 0.0));
        let mut factors = QuantificationFactors::default();
        factors.insert(RoutineKind::Roi, "Fe", 0.5);
        maps.apply_quantification(&factors);
        assert!(maps.has_quantified());
        assert_eq!(maps.quantified(RoutineKind::Roi, "Fe").unwrap()[[0, 0]], 5.0);
        assert!(maps.quantified(RoutineKind::Roi, "Cu").is_none());
        assert!(maps.quantified(RoutineKind::Roi, NUM_ITR).is_none());
    }
}
