//! Physical constants and per-element reference values.

/// Avogadro's number (1/mol).
pub const AVOGADRO: f64 = 6.022_045_31e23;

/// h·c in keV·Å, so `HC_ANGSTROMS / energy_kev` is a wavelength in Å.
pub const HC_ANGSTROMS: f64 = 12.398_52;

/// Classical electron radius (cm).
pub const RE: f64 = 2.817_938_070e-13;

/// FWHM = `SIGMA_TO_FWHM` · σ for a Gaussian.
pub const SIGMA_TO_FWHM: f64 = 2.354_820_045;

/// Mean energy (keV) to create an electron-hole pair in silicon.
pub const SI_PAIR_ENERGY: f64 = 2.96e-3;

/// Highest atomic number registered by default.
pub const MAX_ATOMIC_NUMBER: u32 = 91;

/// Element symbols indexed by atomic number. Index 0 is unused.
pub const ELEMENT_SYMBOLS: [&str; 92] = [
    "", "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S",
    "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge",
    "As", "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd",
    "In", "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd",
    "Tb", "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg",
    "Tl", "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa",
];

/// Standard atomic weights (g/mol) indexed by atomic number. Index 0 is unused.
pub const ELEMENT_WEIGHTS: [f64; 92] = [
    0.0, 1.008, 4.0026, 6.94, 9.0122, 10.81, 12.011, 14.007, 15.999, 18.998, 20.180, 22.990,
    24.305, 26.982, 28.085, 30.974, 32.06, 35.45, 39.948, 39.098, 40.078, 44.956, 47.867, 50.942,
    51.996, 54.938, 55.845, 58.933, 58.693, 63.546, 65.38, 69.723, 72.630, 74.922, 78.971, 79.904,
    83.798, 85.468, 87.62, 88.906, 91.224, 92.906, 95.95, 98.0, 101.07, 102.91, 106.42, 107.87,
    112.41, 114.82, 118.71, 121.76, 127.60, 126.90, 131.29, 132.91, 137.33, 138.91, 140.12,
    140.91, 144.24, 145.0, 150.36, 151.96, 157.25, 158.93, 162.50, 164.93, 167.26, 168.93,
    173.05, 174.97, 178.49, 180.95, 183.84, 186.21, 190.23, 192.22, 195.08, 196.97, 200.59,
    204.38, 207.2, 208.98, 209.0, 210.0, 222.0, 223.0, 226.0, 227.0, 232.04, 231.04,
];

/// Emission line labels carried by every element entry.
pub const XRF_LINES: [&str; 21] = [
    "ka1", "ka2", "kb1", "kb2", "la1", "la2", "lb1", "lb2", "lb3", "lb4", "lb5", "lg1", "lg2",
    "lg3", "lg4", "ll", "ln", "ma1", "ma2", "mb", "mg",
];

/// Fluorescence yield shells.
pub const YIELD_SHELLS: [&str; 5] = ["k", "l1", "l2", "l3", "m"];

/// Binding energy edges.
pub const BINDING_EDGES: [&str; 24] = [
    "K", "L1", "L2", "L3", "M1", "M2", "M3", "M4", "M5", "N1", "N2", "N3", "N4", "N5", "N6",
    "N7", "O1", "O2", "O3", "O4", "O5", "P1", "P2", "P3",
];

/// Absorption edges that carry a jump ratio.
pub const JUMP_EDGES: [&str; 17] = [
    "K", "L1", "L2", "L3", "M1", "M2", "M3", "M4", "M5", "N1", "N2", "N3", "N4", "N5", "O1",
    "O2", "O3",
];

/// Atomic weight for `number`, or 0 when unknown.
pub fn atomic_weight(number: u32) -> f64 {
    ELEMENT_WEIGHTS.get(number as usize).copied().unwrap_or(0.0)
}

/// Atomic number for a bare element symbol.
pub fn atomic_number(symbol: &str) -> Option<u32> {
    ELEMENT_SYMBOLS
        .iter()
        .skip(1)
        .position(|s| *s == symbol)
        .map(|i| i as u32 + 1)
}
