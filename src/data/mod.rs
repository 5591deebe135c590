//! Data structures for XRF map fitting.

pub mod compound;
pub mod constants;
pub mod element;
pub mod fit_element;
pub mod fit_maps;
pub mod quantification;
pub mod spectrum;
pub mod stream_block;

pub use compound::{parse_compound, CompoundPart, ParsedCompound};
pub use element::{ElementInfo, ElementKey, ElementRecord, ElementRegistry, ElementTables};
pub use fit_element::{EmissionLine, FitElement, FitElements, LineSeries};
pub use fit_maps::{ElementMaps, FitMaps};
pub use quantification::{QuantificationFactors, QuantificationStandard};
pub use spectrum::{EnergyRange, SpectraVolume, Spectrum};
pub use stream_block::{BlockState, FittingBlock, StreamBlock};
