//! Element line registry.
//!
//! Holds per-element emission lines, yields, edges and tabulated atomic
//! scattering factors. Built once with [`ElementRegistry::load`] and then
//! shared read-only (usually as `Arc<ElementRegistry>`) by every worker.

use super::compound::parse_compound;
use super::constants::{
    atomic_weight, AVOGADRO, BINDING_EDGES, ELEMENT_SYMBOLS, HC_ANGSTROMS, JUMP_EDGES,
    MAX_ATOMIC_NUMBER, RE, XRF_LINES, YIELD_SHELLS,
};
use crate::error::RegistryError;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::Arc;
use tracing::warn;

/// Identifier accepted by [`ElementRegistry::get`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKey<'a> {
    Number(u32),
    Name(&'a str),
}

impl From<u32> for ElementKey<'_> {
    fn from(number: u32) -> Self {
        ElementKey::Number(number)
    }
}

impl<'a> From<&'a str> for ElementKey<'a> {
    fn from(name: &'a str) -> Self {
        ElementKey::Name(name)
    }
}

/// Reference data for one element.
#[derive(Clone, Debug)]
pub struct ElementInfo {
    /// Atomic number.
    pub number: u32,
    /// Element symbol.
    pub name: String,
    /// Density (g/cm³).
    pub density: f64,
    /// Line energies (keV) keyed by line label (`ka1`, `lb2`, ...).
    pub xrf: HashMap<String, f64>,
    /// Absolute line yields keyed by line label.
    pub xrf_abs_yield: HashMap<String, f64>,
    /// Fluorescence yields keyed by shell.
    pub yield_d: HashMap<String, f64>,
    /// Binding energies (keV) keyed by edge.
    pub binding_e: HashMap<String, f64>,
    /// Jump ratios keyed by edge.
    pub jump: HashMap<String, f64>,
    f1: Vec<f64>,
    f2: Vec<f64>,
    energies: Arc<[f64]>,
}

impl ElementInfo {
    fn empty(number: u32, energies: Arc<[f64]>) -> Self {
        let zeros = |labels: &[&str]| -> HashMap<String, f64> {
            labels.iter().map(|l| (l.to_string(), 0.0)).collect()
        };

        Self {
            number,
            name: ELEMENT_SYMBOLS[number as usize].to_string(),
            density: 1.0,
            xrf: zeros(&XRF_LINES),
            xrf_abs_yield: zeros(&XRF_LINES),
            yield_d: zeros(&YIELD_SHELLS),
            binding_e: zeros(&BINDING_EDGES),
            jump: zeros(&JUMP_EDGES),
            f1: Vec::new(),
            f2: Vec::new(),
            energies,
        }
    }

    /// Line energy in keV, 0 when unknown.
    pub fn line_energy(&self, label: &str) -> f64 {
        self.xrf.get(label).copied().unwrap_or(0.0)
    }

    /// Absolute yield of a line, 0 when unknown.
    pub fn line_yield(&self, label: &str) -> f64 {
        self.xrf_abs_yield.get(label).copied().unwrap_or(0.0)
    }

    /// Whether this entry carries scattering factors.
    pub fn has_scattering_factors(&self) -> bool {
        !self.f2.is_empty()
    }

    /// Real part of the scattering factor table.
    pub fn f1(&self) -> &[f64] {
        &self.f1
    }

    /// The registry-wide energy grid this entry's factors are sampled on.
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Indices `(lo, hi)` of the grid points with `e[lo] < energy <= e[hi]`.
    pub fn get_energies_between(&self, energy: f64) -> Option<(usize, usize)> {
        bracket(&self.energies, energy)
    }

    /// Imaginary scattering factor at `energy`, interpolated in log-log space.
    ///
    /// Returns 0 outside the tabulated range or when the entry has no table.
    pub fn get_f2(&self, energy: f64) -> f64 {
        if self.f2.is_empty() {
            return 0.0;
        }
        let Some((lo, hi)) = self.get_energies_between(energy) else {
            return 0.0;
        };
        log_log_interpolate(
            self.energies[lo],
            self.energies[hi],
            self.f2[lo].abs(),
            self.f2[hi].abs(),
            energy,
        )
    }

    /// Absorption index β for this element at `density` (g/cm³).
    pub fn calc_beta(&self, density: f64, energy: f64) -> f64 {
        beta_constant(density, atomic_weight(self.number), energy) * self.get_f2(energy)
    }
}

/// Index pair bracketing `energy` in an ascending grid.
fn bracket(grid: &[f64], energy: f64) -> Option<(usize, usize)> {
    if grid.len() < 2 || !energy.is_finite() {
        return None;
    }
    let hi = grid.partition_point(|&e| e < energy);
    if hi == 0 || hi >= grid.len() {
        return None;
    }
    Some((hi - 1, hi))
}

fn log_log_interpolate(e_lo: f64, e_hi: f64, f_lo: f64, f_hi: f64, energy: f64) -> f64 {
    let fraction = (energy.ln() - e_lo.ln()) / (e_hi.ln() - e_lo.ln());
    if f_lo <= 0.0 || f_hi <= 0.0 {
        // ln(0) would poison the result
        return f_lo + fraction * (f_hi - f_lo);
    }
    (f_lo.ln() + fraction * (f_hi.ln() - f_lo.ln())).exp()
}

/// `r_e · λ² · N / (2π)` with λ in cm and N in molecules per cm³.
fn beta_constant(density: f64, atomic_weight: f64, energy: f64) -> f64 {
    if atomic_weight == 0.0 || energy <= 0.0 {
        return 0.0;
    }
    let molecules_per_cc = density * AVOGADRO / atomic_weight;
    let wavelength_angstroms = HC_ANGSTROMS / energy;
    RE * (1.0e-16 * wavelength_angstroms * wavelength_angstroms) * molecules_per_cc / (2.0 * PI)
}

/// Raw per-element values handed to [`ElementRegistry::load`].
#[derive(Clone, Debug, Default)]
pub struct ElementRecord {
    pub number: u32,
    pub density: Option<f64>,
    pub xrf: HashMap<String, f64>,
    pub xrf_abs_yield: HashMap<String, f64>,
    pub yield_d: HashMap<String, f64>,
    pub binding_e: HashMap<String, f64>,
    pub jump: HashMap<String, f64>,
    /// Real scattering factors on the shared grid (empty for none).
    pub f1: Vec<f64>,
    /// Imaginary scattering factors on the shared grid (empty for none).
    pub f2: Vec<f64>,
}

impl ElementRecord {
    pub fn new(number: u32) -> Self {
        Self {
            number,
            ..Default::default()
        }
    }

    /// Add an emission line with its energy (keV) and yield.
    pub fn with_line(mut self, label: &str, energy: f64, abs_yield: f64) -> Self {
        self.xrf.insert(label.to_string(), energy);
        self.xrf_abs_yield.insert(label.to_string(), abs_yield);
        self
    }
}

/// The two external tables: XRF line data and scattering factors.
#[derive(Clone, Debug, Default)]
pub struct ElementTables {
    /// Ascending energy grid (keV) for all scattering factors.
    pub energies: Vec<f64>,
    pub elements: Vec<ElementRecord>,
    /// Compound formula → density (g/cm³).
    pub compounds: HashMap<String, f64>,
}

impl ElementTables {
    /// Real K (and a few L) line energies for common elements with a smooth
    /// synthetic f2 curve for every element. Meant for tests and demos.
    pub fn reference_k_lines() -> Self {
        const K_LINES: [(&str, f64, f64, f64); 12] = [
            ("P", 2.014, 2.013, 2.139),
            ("S", 2.308, 2.307, 2.464),
            ("K", 3.314, 3.311, 3.590),
            ("Ca", 3.692, 3.688, 4.013),
            ("Ti", 4.511, 4.505, 4.932),
            ("Cr", 5.415, 5.405, 5.947),
            ("Mn", 5.899, 5.888, 6.490),
            ("Fe", 6.404, 6.391, 7.058),
            ("Co", 6.930, 6.915, 7.649),
            ("Ni", 7.478, 7.461, 8.265),
            ("Cu", 8.048, 8.028, 8.905),
            ("Zn", 8.639, 8.616, 9.572),
        ];
        const L_LINES: [(&str, f64, f64); 2] = [("Au", 9.713, 11.442), ("Pb", 10.551, 12.614)];

        let energies: Vec<f64> = [1.0, 2.0, 3.0, 5.0, 8.0, 12.0, 20.0, 30.0].to_vec();
        let mut elements = Vec::new();

        for number in 1..=MAX_ATOMIC_NUMBER {
            let symbol = ELEMENT_SYMBOLS[number as usize];
            let z = number as f64;
            let mut record = ElementRecord::new(number);
            record.f1 = energies.iter().map(|_| z).collect();
            record.f2 = energies.iter().map(|e| z * e.powf(-1.8)).collect();

            if let Some(&(_, ka1, ka2, kb1)) = K_LINES.iter().find(|l| l.0 == symbol) {
                record = record
                    .with_line("ka1", ka1, 0.58)
                    .with_line("ka2", ka2, 0.29)
                    .with_line("kb1", kb1, 0.13);
            }
            if let Some(&(_, la1, lb1)) = L_LINES.iter().find(|l| l.0 == symbol) {
                record = record.with_line("la1", la1, 0.7).with_line("lb1", lb1, 0.3);
            }
            elements.push(record);
        }

        let mut compounds = HashMap::new();
        compounds.insert("N:78.08,O:20.95,Ar:0.93".to_string(), 0.001_205);

        Self {
            energies,
            elements,
            compounds,
        }
    }
}

/// Read-only element reference data for one process.
#[derive(Debug)]
pub struct ElementRegistry {
    energies: Arc<[f64]>,
    by_number: HashMap<u32, ElementInfo>,
    by_name: HashMap<String, u32>,
    compounds: HashMap<String, f64>,
}

impl ElementRegistry {
    /// Build the registry for atomic numbers 1..=91 and overlay `tables`.
    pub fn load(tables: ElementTables) -> Result<Self, RegistryError> {
        validate_grid(&tables.energies)?;
        let energies: Arc<[f64]> = Arc::from(tables.energies);
        let mut registry = Self {
            energies: energies.clone(),
            by_number: HashMap::new(),
            by_name: HashMap::new(),
            compounds: tables.compounds,
        };
        registry.generate_default_elements(1, MAX_ATOMIC_NUMBER);

        for record in tables.elements {
            registry.apply_record(record)?;
        }
        Ok(registry)
    }

    fn generate_default_elements(&mut self, start: u32, end: u32) {
        for number in start..=end {
            let element = ElementInfo::empty(number, self.energies.clone());
            let name = element.name.clone();
            self.by_name.insert(name.clone(), number);
            self.by_name.insert(format!("{name}_L"), number);
            self.by_name.insert(format!("{name}_M"), number);
            self.by_number.insert(number, element);
        }
    }

    fn apply_record(&mut self, record: ElementRecord) -> Result<(), RegistryError> {
        let grid_len = self.energies.len();
        let element = self
            .by_number
            .get_mut(&record.number)
            .ok_or(RegistryError::UnknownAtomicNumber(record.number))?;

        for (values, label) in [(&record.f1, "f1"), (&record.f2, "f2")] {
            if !values.is_empty() && values.len() != grid_len {
                return Err(RegistryError::ScatteringLengthMismatch {
                    element: format!("{} {label}", element.name),
                    expected: grid_len,
                    actual: values.len(),
                });
            }
        }

        if let Some(density) = record.density {
            element.density = density;
        }
        element.xrf.extend(record.xrf);
        element.xrf_abs_yield.extend(record.xrf_abs_yield);
        element.yield_d.extend(record.yield_d);
        element.binding_e.extend(record.binding_e);
        element.jump.extend(record.jump);
        element.f1 = record.f1;
        element.f2 = record.f2;
        Ok(())
    }

    /// Look up an element by atomic number, symbol, or `_L`/`_M` alias.
    pub fn get<'a>(&self, key: impl Into<ElementKey<'a>>) -> Option<&ElementInfo> {
        match key.into() {
            ElementKey::Number(number) => self.by_number.get(&number),
            ElementKey::Name(name) => self
                .by_name
                .get(name)
                .and_then(|number| self.by_number.get(number)),
        }
    }

    /// The shared scattering-factor energy grid.
    pub fn energies(&self) -> &[f64] {
        &self.energies
    }

    /// Number of registered elements.
    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    /// Density of a known compound formula.
    pub fn compound_density(&self, compound: &str) -> Option<f64> {
        self.compounds.get(compound).copied()
    }

    /// f2 of an element at `energy`; 0 with a warning when unavailable.
    pub fn f2(&self, name: &str, energy: f64) -> f64 {
        let Some(element) = self.get(name) else {
            warn!(element = name, "unknown element, f2 defaults to 0");
            return 0.0;
        };
        if !element.has_scattering_factors() {
            warn!(element = name, "no scattering factors, f2 defaults to 0");
            return 0.0;
        }
        if element.get_energies_between(energy).is_none() {
            warn!(element = name, energy, "energy outside scattering table, f2 defaults to 0");
            return 0.0;
        }
        element.get_f2(energy)
    }

    /// β for an element or a registered compound; 0 with a warning otherwise.
    pub fn beta(&self, name: &str, density: f64, energy: f64) -> f64 {
        if let Some(element) = self.get(name) {
            if element.get_energies_between(energy).is_none() || !element.has_scattering_factors()
            {
                warn!(element = name, energy, "energy outside scattering table, beta defaults to 0");
                return 0.0;
            }
            element.calc_beta(density, energy)
        } else if self.compounds.contains_key(name) {
            self.calc_compound_beta(name, density, energy)
        } else {
            warn!(element = name, "could not find element or compound");
            0.0
        }
    }

    /// β of a `symbol:weight_percent,...` mixture.
    ///
    /// Malformed tokens and unknown symbols are skipped; this never fails.
    pub fn calc_compound_beta(&self, compound: &str, density: f64, energy: f64) -> f64 {
        let parsed = parse_compound(compound);
        for token in &parsed.skipped {
            warn!(compound, token = token.as_str(), "skipping malformed compound token");
        }

        let mut weight = 0.0;
        let mut f2 = 0.0;
        for part in &parsed.parts {
            let Some(element) = self.get(part.symbol.as_str()) else {
                warn!(compound, symbol = part.symbol.as_str(), "unknown compound symbol");
                continue;
            };
            let element_weight = atomic_weight(element.number);
            if element_weight == 0.0 {
                continue;
            }
            weight += part.weight_percent * element_weight;
            f2 += element.get_f2(energy);
        }

        beta_constant(density, weight, energy) * f2
    }
}

fn validate_grid(energies: &[f64]) -> Result<(), RegistryError> {
    if energies.is_empty() {
        return Err(RegistryError::EmptyEnergyGrid);
    }
    if let Some(index) = energies.windows(2).position(|w| !(w[1] > w[0])) {
        return Err(RegistryError::NonAscendingEnergyGrid { index: index + 1 });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ElementRegistry {
        ElementRegistry::load(ElementTables::reference_k_lines()).unwrap()
    }

    #[test]
    fn test_default_range_and_aliases() {
        let reg = registry();
        assert_eq!(reg.len(), 91);
        assert_eq!(reg.get(26u32).unwrap().name, "Fe");
        assert_eq!(reg.get("Fe").unwrap().number, 26);
        assert_eq!(reg.get("Fe_L").unwrap().number, 26);
        assert_eq!(reg.get("Fe_M").unwrap().number, 26);
        assert!(reg.get("U").is_none());
        assert!(reg.get(0u32).is_none());
    }

    #[test]
    fn test_aliases_share_entry() {
        let reg = registry();
        let plain = reg.get("Cu").unwrap() as *const ElementInfo;
        let alias = reg.get("Cu_L").unwrap() as *const ElementInfo;
        assert_eq!(plain, alias);
    }

    #[test]
    fn test_grid_is_shared() {
        let reg = registry();
        let fe = reg.get("Fe").unwrap();
        let cu = reg.get("Cu").unwrap();
        assert_eq!(fe.energies().as_ptr(), cu.energies().as_ptr());
        assert_eq!(fe.energies().as_ptr(), reg.energies().as_ptr());
    }

    #[test]
    fn test_invalid_grid() {
        let mut tables = ElementTables::reference_k_lines();
        tables.energies = vec![1.0, 3.0, 2.0];
        tables.elements.clear();
        assert_eq!(
            ElementRegistry::load(tables).unwrap_err(),
            RegistryError::NonAscendingEnergyGrid { index: 2 }
        );

        let tables = ElementTables::default();
        assert_eq!(
            ElementRegistry::load(tables).unwrap_err(),
            RegistryError::EmptyEnergyGrid
        );
    }

    #[test]
    fn test_length_mismatch() {
        let mut tables = ElementTables::reference_k_lines();
        tables.elements[0].f2.pop();
        assert!(matches!(
            ElementRegistry::load(tables),
            Err(RegistryError::ScatteringLengthMismatch { .. })
        ));
    }

    #[test]
    fn test_f2_on_grid_points_and_between() {
        let reg = registry();
        let fe = reg.get("Fe").unwrap();
        // exact upper bracket point reproduces the table
        assert!((reg.f2("Fe", 8.0) - 26.0 * 8.0f64.powf(-1.8)).abs() < 1e-9);
        // power law is exact under log-log interpolation
        let e = 6.5;
        assert!((fe.get_f2(e) - 26.0 * e.powf(-1.8)).abs() < 1e-9);
    }

    #[test]
    fn test_f2_monotonic_between_points() {
        let reg = registry();
        let mut last = reg.f2("Cu", 5.0 + 1e-6);
        let mut e = 5.1;
        while e <= 8.0 {
            let value = reg.f2("Cu", e);
            assert!(value < last, "f2 should decrease at {e}");
            last = value;
            e += 0.1;
        }
    }

    #[test]
    fn test_out_of_range_is_zero() {
        let reg = registry();
        assert_eq!(reg.f2("Fe", 0.5), 0.0);
        assert_eq!(reg.f2("Fe", 1.0), 0.0);
        assert_eq!(reg.f2("Fe", 31.0), 0.0);
        assert_eq!(reg.beta("Fe", 7.87, 40.0), 0.0);
        assert_eq!(reg.beta("Nope", 1.0, 5.0), 0.0);
        assert_eq!(reg.f2("Nope", 5.0), 0.0);
    }

    #[test]
    fn test_beta_scales_with_density() {
        let reg = registry();
        let b1 = reg.beta("Fe", 1.0, 6.0);
        let b2 = reg.beta("Fe", 2.0, 6.0);
        assert!(b1 > 0.0);
        assert!((b2 / b1 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_compound_beta() {
        let reg = registry();
        let air = "N:78.08,O:20.95,Ar:0.93";
        let beta = reg.beta(air, 0.001_205, 6.0);
        assert!(beta > 0.0);
        assert_eq!(beta, reg.calc_compound_beta(air, 0.001_205, 6.0));

        // a token without ':' drops that term instead of failing
        let partial = reg.calc_compound_beta("N:78.08,O20.95,Ar:0.93", 0.001_205, 6.0);
        assert!(partial > 0.0);
        assert!(partial != beta);

        // unknown symbols and fully malformed input still return a number
        assert_eq!(reg.calc_compound_beta("Xx:10", 1.0, 6.0), 0.0);
        assert_eq!(reg.calc_compound_beta("garbage", 1.0, 6.0), 0.0);
    }
}
