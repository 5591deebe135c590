//! The set of elements fitted in a job, with their selected emission lines.

use super::element::ElementRegistry;
use std::collections::BTreeMap;
use tracing::warn;

/// Emission line series selected by the name suffix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LineSeries {
    K,
    L,
    M,
}

impl LineSeries {
    /// Split `"Pb_L"` into `("Pb", L)`; a bare symbol means K lines.
    pub fn from_name(name: &str) -> (&str, LineSeries) {
        if let Some(symbol) = name.strip_suffix("_L") {
            (symbol, LineSeries::L)
        } else if let Some(symbol) = name.strip_suffix("_M") {
            (symbol, LineSeries::M)
        } else {
            (name, LineSeries::K)
        }
    }

    /// Line labels belonging to this series.
    pub fn labels(&self) -> &'static [&'static str] {
        match self {
            LineSeries::K => &["ka1", "ka2", "kb1", "kb2"],
            LineSeries::L => &[
                "la1", "la2", "lb1", "lb2", "lb3", "lb4", "lb5", "lg1", "lg2", "lg3", "lg4", "ll",
                "ln",
            ],
            LineSeries::M => &["ma1", "ma2", "mb", "mg"],
        }
    }
}

/// One emission line used by the spectral model.
#[derive(Clone, Debug, PartialEq)]
pub struct EmissionLine {
    pub label: String,
    /// Line energy (keV).
    pub energy: f64,
    /// Fraction of the element's series intensity in this line.
    pub ratio: f64,
}

/// An element as fitted: requested name plus selected lines.
#[derive(Clone, Debug, PartialEq)]
pub struct FitElement {
    /// Requested name, e.g. `Fe` or `Pb_L`.
    pub name: String,
    pub number: u32,
    pub series: LineSeries,
    pub lines: Vec<EmissionLine>,
}

impl FitElement {
    /// Build from explicit `(label, energy, yield)` lines. Ratios are normalized.
    pub fn new(name: impl Into<String>, number: u32, lines: &[(&str, f64, f64)]) -> Self {
        let name = name.into();
        let (_, series) = LineSeries::from_name(&name);
        let lines = normalize_lines(
            lines
                .iter()
                .filter(|(_, energy, y)| *energy > 0.0 && *y > 0.0)
                .map(|(label, energy, y)| EmissionLine {
                    label: label.to_string(),
                    energy: *energy,
                    ratio: *y,
                })
                .collect(),
        );
        Self {
            name,
            number,
            series,
            lines,
        }
    }

    /// Strongest line of the series.
    pub fn primary_line(&self) -> Option<&EmissionLine> {
        self.lines
            .iter()
            .max_by(|a, b| a.ratio.partial_cmp(&b.ratio).unwrap_or(std::cmp::Ordering::Equal))
    }
}

fn normalize_lines(mut lines: Vec<EmissionLine>) -> Vec<EmissionLine> {
    let total: f64 = lines.iter().map(|l| l.ratio).sum();
    if total > 0.0 {
        for line in &mut lines {
            line.ratio /= total;
        }
    }
    lines
}

/// Elements to fit, ordered by name so matrix columns are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitElements {
    elements: BTreeMap<String, FitElement>,
}

impl FitElements {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve names against the registry. Unknown names and names without
    /// usable lines are skipped with a warning.
    pub fn from_names<S: AsRef<str>>(registry: &ElementRegistry, names: &[S]) -> Self {
        let mut set = Self::new();
        for name in names {
            let name = name.as_ref();
            let (_, series) = LineSeries::from_name(name);
            let Some(info) = registry.get(name) else {
                warn!(element = name, "unknown element, not fitted");
                continue;
            };

            let lines: Vec<(&str, f64, f64)> = series
                .labels()
                .iter()
                .map(|label| (*label, info.line_energy(label), info.line_yield(label)))
                .collect();
            let element = FitElement::new(name, info.number, &lines);
            if element.lines.is_empty() {
                warn!(element = name, "no emission lines in series, not fitted");
                continue;
            }
            set.insert(element);
        }
        set
    }

    pub fn insert(&mut self, element: FitElement) {
        self.elements.insert(element.name.clone(), element);
    }

    pub fn get(&self, name: &str) -> Option<&FitElement> {
        self.elements.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.elements.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FitElement> {
        self.elements.values()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.elements.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::ElementTables;

    #[test]
    fn test_series_from_name() {
        assert_eq!(LineSeries::from_name("Fe"), ("Fe", LineSeries::K));
        assert_eq!(LineSeries::from_name("Pb_L"), ("Pb", LineSeries::L));
        assert_eq!(LineSeries::from_name("Au_M"), ("Au", LineSeries::M));
    }

    #[test]
    fn test_from_names_selects_series() {
        let registry = ElementRegistry::load(ElementTables::reference_k_lines()).unwrap();
        let set = FitElements::from_names(&registry, &["Fe", "Pb_L", "Pb", "Xx", "Ca_M"]);

        // Pb has no K lines and Ca no M lines in the table
        assert_eq!(set.names().collect::<Vec<_>>(), vec!["Fe", "Pb_L"]);

        let fe = set.get("Fe").unwrap();
        assert_eq!(fe.number, 26);
        assert_eq!(fe.lines.len(), 3);
        let total: f64 = fe.lines.iter().map(|l| l.ratio).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(fe.primary_line().unwrap().label, "ka1");

        let pb = set.get("Pb_L").unwrap();
        assert_eq!(pb.series, LineSeries::L);
        assert_eq!(pb.primary_line().unwrap().label, "la1");
    }

    #[test]
    fn test_manual_element_drops_empty_lines() {
        let el = FitElement::new("Cu", 29, &[("ka1", 8.048, 2.0), ("kb2", 0.0, 1.0), ("kb1", 8.9, 0.0)]);
        assert_eq!(el.lines.len(), 1);
        assert_eq!(el.lines[0].ratio, 1.0);
    }
}
