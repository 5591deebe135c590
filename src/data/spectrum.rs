//! Measured spectra and the channel window they are fitted over.

use std::ops::Index;

/// Photon counts per energy channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Spectrum {
    counts: Vec<f64>,
}

impl Spectrum {
    /// Wrap raw counts. Negative or non-finite counts are clamped to 0.
    pub fn new(counts: Vec<f64>) -> Self {
        let counts = counts
            .into_iter()
            .map(|c| if c.is_finite() && c > 0.0 { c } else { 0.0 })
            .collect();
        Self { counts }
    }

    /// All-zero spectrum with `channels` channels.
    pub fn zeros(channels: usize) -> Self {
        Self {
            counts: vec![0.0; channels],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    #[inline]
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Counts inside `range`, clamped to the spectrum length.
    pub fn sub_spectrum(&self, range: EnergyRange) -> &[f64] {
        let (start, end) = range.clamp_to(self.len());
        &self.counts[start..end]
    }

    /// Add another spectrum channel by channel, growing to the longer length.
    pub fn accumulate(&mut self, other: &Spectrum) {
        if other.len() > self.len() {
            self.counts.resize(other.len(), 0.0);
        }
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += b;
        }
    }

    /// Total counts.
    pub fn sum(&self) -> f64 {
        self.counts.iter().sum()
    }
}

impl Index<usize> for Spectrum {
    type Output = f64;

    fn index(&self, index: usize) -> &f64 {
        &self.counts[index]
    }
}

/// Inclusive channel window `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EnergyRange {
    pub min: usize,
    pub max: usize,
}

impl EnergyRange {
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            min: min.min(max),
            max: min.max(max),
        }
    }

    /// Whole spectrum of `channels` channels.
    pub fn full(channels: usize) -> Self {
        Self::new(0, channels.saturating_sub(1))
    }

    /// Number of channels in the window.
    pub fn count(&self) -> usize {
        self.max - self.min + 1
    }

    /// Half-open `[start, end)` slice bounds within a spectrum of `len`.
    pub fn clamp_to(&self, len: usize) -> (usize, usize) {
        let start = self.min.min(len);
        let end = (self.max + 1).min(len);
        (start, end.max(start))
    }

    pub fn contains(&self, channel: usize) -> bool {
        channel >= self.min && channel <= self.max
    }
}

/// Every pixel spectrum of one detector in one dataset file.
#[derive(Clone, Debug)]
pub struct SpectraVolume {
    rows: usize,
    cols: usize,
    spectra: Vec<Spectrum>,
}

impl SpectraVolume {
    /// Empty volume with `rows × cols` zero spectra of `channels` channels.
    pub fn new(rows: usize, cols: usize, channels: usize) -> Self {
        Self {
            rows,
            cols,
            spectra: vec![Spectrum::zeros(channels); rows * cols],
        }
    }

    /// Build from row-major spectra. Returns `None` when the count is wrong.
    pub fn from_spectra(rows: usize, cols: usize, spectra: Vec<Spectrum>) -> Option<Self> {
        (spectra.len() == rows * cols).then_some(Self {
            rows,
            cols,
            spectra,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Channels per spectrum (from the first pixel).
    pub fn channels(&self) -> usize {
        self.spectra.first().map(Spectrum::len).unwrap_or(0)
    }

    pub fn spectrum(&self, row: usize, col: usize) -> &Spectrum {
        &self.spectra[row * self.cols + col]
    }

    pub fn set_spectrum(&mut self, row: usize, col: usize, spectrum: Spectrum) {
        self.spectra[row * self.cols + col] = spectrum;
    }

    /// Row-major spectra.
    pub fn spectra(&self) -> &[Spectrum] {
        &self.spectra
    }

    /// Add another volume pixel by pixel.
    ///
    /// Returns `false` and leaves `self` untouched when the rasters differ.
    pub fn accumulate(&mut self, other: &SpectraVolume) -> bool {
        if self.rows != other.rows || self.cols != other.cols {
            return false;
        }
        for (a, b) in self.spectra.iter_mut().zip(other.spectra.iter()) {
            a.accumulate(b);
        }
        true
    }

    /// Sum of every pixel spectrum.
    pub fn integrated_spectrum(&self) -> Spectrum {
        let mut total = Spectrum::zeros(self.channels());
        for spectrum in &self.spectra {
            total.accumulate(spectrum);
        }
        total
    }
}
