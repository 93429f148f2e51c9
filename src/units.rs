//! Figure-size normalisation. Charts are sized in inches, word clouds in pixels.
use std::str::FromStr;

use crate::error::{GseaError, Result, ValidationError};

/// Pixels per inch used for every px <-> in conversion.
pub const DPI: f64 = 300.0;
const CM_PER_INCH: f64 = 2.54;
/// Largest chart side, in inches.
pub const MAX_CHART_INCHES: f64 = 50.0;
/// Largest word-cloud side, in pixels.
pub const MAX_WORDCLOUD_PIXELS: f64 = 3000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Centimeters,
    Pixels,
    Inches,
    /// value is already in the canonical unit of the target
    Unspecified,
}

impl FromStr for Unit {
    type Err = ValidationError;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "cm" => Ok(Unit::Centimeters),
            "px" => Ok(Unit::Pixels),
            "in" => Ok(Unit::Inches),
            "" => Ok(Unit::Unspecified),
            other => Err(ValidationError::MalformedArgument(format!(
                "unknown unit '{other}' (expected cm, px or in)"
            ))),
        }
    }
}

/// Canonical unit of a sizing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Canonical {
    Inches,
    Pixels,
}

impl Canonical {
    fn limit(self) -> f64 {
        match self {
            Canonical::Inches => MAX_CHART_INCHES,
            Canonical::Pixels => MAX_WORDCLOUD_PIXELS,
        }
    }
    fn name(self) -> &'static str {
        match self {
            Canonical::Inches => "in",
            Canonical::Pixels => "px",
        }
    }
}

pub fn to_canonical(unit: Unit, value: f64, target: Canonical) -> f64 {
    match (target, unit) {
        (_, Unit::Unspecified) => value,
        (Canonical::Inches, Unit::Inches) => value,
        (Canonical::Inches, Unit::Centimeters) => value / CM_PER_INCH,
        (Canonical::Inches, Unit::Pixels) => value / DPI,
        (Canonical::Pixels, Unit::Pixels) => value,
        (Canonical::Pixels, Unit::Inches) => value * DPI,
        (Canonical::Pixels, Unit::Centimeters) => value / CM_PER_INCH * DPI,
    }
}

/// Requested figure size, already in its canonical unit and within the cap.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FigureSize {
    pub width: f64,
    pub height: f64,
    pub canonical: Canonical,
}

impl FigureSize {
    pub fn new(width: f64, height: f64, unit: Unit, canonical: Canonical) -> Result<Self> {
        if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
            return Err(ValidationError::InvalidParameter(format!(
                "Figure width and height must be positive (got {width} x {height})."
            ))
            .into());
        }
        let w = to_canonical(unit, width, canonical);
        let h = to_canonical(unit, height, canonical);
        let limit = canonical.limit();
        if w > limit || h > limit {
            return Err(GseaError::SizeLimit {
                width: w,
                height: h,
                limit,
                unit: canonical.name(),
            });
        }
        Ok(FigureSize {
            width: w,
            height: h,
            canonical,
        })
    }

    /// Canvas size in pixels.
    pub fn pixels(&self) -> (u32, u32) {
        let scale = match self.canonical {
            Canonical::Inches => DPI,
            Canonical::Pixels => 1.0,
        };
        (
            ((self.width * scale).round() as u32).max(1),
            ((self.height * scale).round() as u32).max(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_units() {
        assert_eq!("cm".parse::<Unit>().unwrap(), Unit::Centimeters);
        assert_eq!("".parse::<Unit>().unwrap(), Unit::Unspecified);
        assert!("mm".parse::<Unit>().is_err());
    }

    #[test]
    fn just_over_the_chart_cap_in_every_unit() {
        let over = 50.0001;
        for (unit, v) in [
            (Unit::Inches, over),
            (Unit::Unspecified, over),
            (Unit::Centimeters, over * CM_PER_INCH),
            (Unit::Pixels, over * DPI),
        ] {
            let err = FigureSize::new(v, 1.0, unit, Canonical::Inches).unwrap_err();
            assert!(matches!(err, GseaError::SizeLimit { .. }), "{unit:?}");
            let err = FigureSize::new(1.0, v, unit, Canonical::Inches).unwrap_err();
            assert!(matches!(err, GseaError::SizeLimit { .. }), "{unit:?}");
        }
    }

    #[test]
    fn exactly_at_the_cap_is_accepted() {
        let ok = FigureSize::new(50.0, 50.0, Unit::Inches, Canonical::Inches).unwrap();
        assert_eq!(ok.pixels(), (15000, 15000));
        assert!(FigureSize::new(15000.0, 10.0, Unit::Pixels, Canonical::Inches).is_ok());
        assert!(FigureSize::new(3000.0, 3000.0, Unit::Unspecified, Canonical::Pixels).is_ok());
        assert!(FigureSize::new(3001.0, 10.0, Unit::Pixels, Canonical::Pixels).is_err());
    }

    #[test]
    fn conversions() {
        assert!((to_canonical(Unit::Centimeters, 2.54, Canonical::Inches) - 1.0).abs() < 1e-12);
        assert_eq!(to_canonical(Unit::Pixels, 600.0, Canonical::Inches), 2.0);
        assert_eq!(to_canonical(Unit::Inches, 2.0, Canonical::Pixels), 600.0);
        let s = FigureSize::new(2.54, 5.08, Unit::Centimeters, Canonical::Inches).unwrap();
        assert_eq!(s.pixels(), (300, 600));
    }

    #[test]
    fn non_positive_sizes_are_rejected() {
        let err = FigureSize::new(0.0, 1.0, Unit::Inches, Canonical::Inches).unwrap_err();
        assert!(matches!(err, GseaError::Validation(_)));
    }
}
