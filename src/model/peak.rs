//! Peak shape primitives for fluorescence lines.
//!
//! Each shape is area-normalized in energy: integrating over energy gives the
//! `gain` passed in, so multiplying by the channel width yields counts.

use libm::erfc;
use std::f64::consts::{PI, SQRT_2};

/// Gaussian with area `gain` centered at `delta = 0`.
#[inline]
pub fn gauss_peak(gain: f64, sigma: f64, delta: f64) -> f64 {
    if sigma <= 0.0 {
        return 0.0;
    }
    let arg = delta / sigma;
    gain / (sigma * (2.0 * PI).sqrt()) * (-0.5 * arg * arg).exp()
}

/// Incomplete charge collection step below the line.
#[inline]
pub fn gauss_step(gain: f64, sigma: f64, delta: f64, peak_energy: f64) -> f64 {
    if sigma <= 0.0 || peak_energy <= 0.0 {
        return 0.0;
    }
    gain / 2.0 / peak_energy * erfc(delta / (SQRT_2 * sigma))
}

/// Exponential low-energy tail convolved with the detector response.
#[inline]
pub fn gauss_tail(gain: f64, sigma: f64, delta: f64, gamma: f64) -> f64 {
    if sigma <= 0.0 || gamma <= 0.0 {
        return 0.0;
    }
    let exponent = delta / (gamma * sigma);
    if exponent > 50.0 {
        return 0.0;
    }
    gain / 2.0 / gamma / sigma
        * exponent.exp()
        * erfc(delta / (SQRT_2 * sigma) + 1.0 / (SQRT_2 * gamma))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_erfc_reference_values() {
        assert!((erfc(0.0) - 1.0).abs() < 1e-7);
        assert!((erfc(1.0) - 0.157_299_207).abs() < 1e-7);
        assert!((erfc(-1.0) - 1.842_700_793).abs() < 1e-7);
        assert!(erfc(10.0) < 1e-20);
        assert!((erfc(-10.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_gauss_area() {
        let sigma = 0.08;
        let de = 0.001;
        let area: f64 = (-1000..=1000).map(|i| gauss_peak(5.0, sigma, i as f64 * de) * de).sum();
        assert!((area - 5.0).abs() < 1e-6, "area {area}");
        assert_eq!(gauss_peak(1.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_step_and_tail_sit_below_peak() {
        let sigma = 0.1;
        assert!(gauss_step(1.0, sigma, -1.0, 6.4) > gauss_step(1.0, sigma, 1.0, 6.4));
        assert!(gauss_tail(1.0, sigma, -0.5, 2.0) > gauss_tail(1.0, sigma, 0.5, 2.0));
        assert_eq!(gauss_tail(1.0, sigma, 100.0, 2.0), 0.0);
        assert!(gauss_tail(1.0, sigma, -0.3, 2.0).is_finite());
    }
}
