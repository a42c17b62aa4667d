//! Harvested-volume arithmetic: 1 mm of rain over 1 m² of rooftop is 1 litre,
//! scaled by the building's runoff coefficient.

use core::fmt;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq)]
pub enum HarvestError {
    /// Rainfall must be a finite, non-negative number of millimetres.
    NegativeRainfall(f64),
    /// Rooftop area must be finite and strictly positive.
    NonPositiveArea(f64),
    /// Runoff coefficient must be in (0, 1].
    RunoffOutOfRange(f64),
}

impl Display for HarvestError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            HarvestError::NegativeRainfall(v) => write!(f, "rainfall must be >= 0 mm, got {}", v),
            HarvestError::NonPositiveArea(v) => write!(f, "rooftop area must be > 0 m2, got {}", v),
            HarvestError::RunoffOutOfRange(v) => {
                write!(f, "runoff coefficient must be in (0, 1], got {}", v)
            }
        }
    }
}

impl Error for HarvestError {}

/// Estimate the harvested volume in litres for one day and one building.
///
/// Pure and deterministic. Inputs are validated rather than clamped; callers
/// render the error, they never get a silently zeroed estimate.
pub fn estimate(
    rainfall_mm: f64,
    rooftop_area_m2: f64,
    runoff_coefficient: f64,
) -> Result<f64, HarvestError> {
    if !rainfall_mm.is_finite() || rainfall_mm < 0.0 {
        return Err(HarvestError::NegativeRainfall(rainfall_mm));
    }
    if !rooftop_area_m2.is_finite() || rooftop_area_m2 <= 0.0 {
        return Err(HarvestError::NonPositiveArea(rooftop_area_m2));
    }
    if !runoff_coefficient.is_finite() || runoff_coefficient <= 0.0 || runoff_coefficient > 1.0 {
        return Err(HarvestError::RunoffOutOfRange(runoff_coefficient));
    }
    Ok(rainfall_mm * rooftop_area_m2 * runoff_coefficient)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mm_times_m2_is_litres() {
        // 10 mm over a 500 m2 rooftop at full capture -> 5000 L
        assert_eq!(estimate(10.0, 500.0, 1.0).unwrap(), 5000.0);
    }

    #[test]
    fn runoff_coefficient_scales_the_estimate() {
        assert_eq!(estimate(10.0, 500.0, 0.8).unwrap(), 4000.0);
    }

    #[test]
    fn zero_rainfall_is_valid_and_yields_zero() {
        assert_eq!(estimate(0.0, 120.0, 0.9).unwrap(), 0.0);
    }

    #[test]
    fn rejects_negative_rainfall() {
        assert_eq!(
            estimate(-1.0, 500.0, 1.0),
            Err(HarvestError::NegativeRainfall(-1.0))
        );
    }

    #[test]
    fn rejects_non_positive_area() {
        assert!(matches!(
            estimate(5.0, 0.0, 1.0),
            Err(HarvestError::NonPositiveArea(_))
        ));
        assert!(matches!(
            estimate(5.0, -3.0, 1.0),
            Err(HarvestError::NonPositiveArea(_))
        ));
    }

    #[test]
    fn rejects_bad_runoff_coefficient() {
        assert!(matches!(
            estimate(5.0, 100.0, 0.0),
            Err(HarvestError::RunoffOutOfRange(_))
        ));
        assert!(matches!(
            estimate(5.0, 100.0, 1.5),
            Err(HarvestError::RunoffOutOfRange(_))
        ));
    }

    #[test]
    fn rejects_non_finite_inputs() {
        assert!(estimate(f64::NAN, 100.0, 1.0).is_err());
        assert!(estimate(5.0, f64::INFINITY, 1.0).is_err());
    }
}
