//! Scaled-decimal "Real" values
//!
//! A real is an integer mantissa combined with a hint describing how to scale
//! it: `value = mantissa × 10^exponent` for exponent hints, or
//! `value = mantissa / 2^n` for fraction hints. Three hints carry no mantissa
//! and encode the IEEE special values.

use crate::common::errors::{ValidationError, ValidationResult};
use num_enum::TryFromPrimitive;
use std::fmt;

/// Scaling hint for a [`Real`]
///
/// Wire values 0-21 are exponents -14..=+7, 22-30 are fractions 1/1..1/256,
/// 33-35 are the special values. 31 and 32 are reserved.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive)]
pub enum RealHint {
    ExponentNeg14 = 0,
    ExponentNeg13 = 1,
    ExponentNeg12 = 2,
    ExponentNeg11 = 3,
    ExponentNeg10 = 4,
    ExponentNeg9 = 5,
    ExponentNeg8 = 6,
    ExponentNeg7 = 7,
    ExponentNeg6 = 8,
    ExponentNeg5 = 9,
    ExponentNeg4 = 10,
    ExponentNeg3 = 11,
    ExponentNeg2 = 12,
    ExponentNeg1 = 13,
    Exponent0 = 14,
    ExponentPos1 = 15,
    ExponentPos2 = 16,
    ExponentPos3 = 17,
    ExponentPos4 = 18,
    ExponentPos5 = 19,
    ExponentPos6 = 20,
    ExponentPos7 = 21,
    Fraction1 = 22,
    Fraction2 = 23,
    Fraction4 = 24,
    Fraction8 = 25,
    Fraction16 = 26,
    Fraction32 = 27,
    Fraction64 = 28,
    Fraction128 = 29,
    Fraction256 = 30,
    Infinity = 33,
    NegInfinity = 34,
    NotANumber = 35,
}

impl RealHint {
    /// Power-of-ten exponent for exponent hints
    pub fn exponent(self) -> Option<i32> {
        let raw = self as u8;
        (raw <= RealHint::ExponentPos7 as u8).then(|| raw as i32 - 14)
    }

    /// Denominator for fraction hints
    pub fn denominator(self) -> Option<u32> {
        let raw = self as u8;
        (RealHint::Fraction1 as u8..=RealHint::Fraction256 as u8)
            .contains(&raw)
            .then(|| 1u32 << (raw - RealHint::Fraction1 as u8))
    }

    /// Hints whose value is fully described without a mantissa
    pub fn is_special(self) -> bool {
        matches!(
            self,
            RealHint::Infinity | RealHint::NegInfinity | RealHint::NotANumber
        )
    }

    /// Exponent hint for a power of ten in -14..=7
    pub fn from_exponent(exponent: i32) -> ValidationResult<Self> {
        if !(-14..=7).contains(&exponent) {
            return Err(ValidationError::invalid(
                "real exponent",
                format!("{exponent} is outside -14..=7"),
            ));
        }
        RealHint::try_from((exponent + 14) as u8)
            .map_err(|_| ValidationError::invalid("real exponent", exponent.to_string()))
    }
}

/// Scaled-decimal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Real {
    mantissa: i64,
    hint: RealHint,
}

impl Real {
    pub fn new(mantissa: i64, hint: RealHint) -> Self {
        // Special hints carry no mantissa on the wire
        let mantissa = if hint.is_special() { 0 } else { mantissa };
        Self { mantissa, hint }
    }

    pub fn infinity() -> Self {
        Self::new(0, RealHint::Infinity)
    }

    pub fn neg_infinity() -> Self {
        Self::new(0, RealHint::NegInfinity)
    }

    pub fn nan() -> Self {
        Self::new(0, RealHint::NotANumber)
    }

    /// Convert a double using the requested hint, rounding to the nearest mantissa
    pub fn from_f64(value: f64, hint: RealHint) -> ValidationResult<Self> {
        if value.is_nan() {
            return Ok(Self::nan());
        }
        if value.is_infinite() {
            return Ok(if value > 0.0 {
                Self::infinity()
            } else {
                Self::neg_infinity()
            });
        }
        let scaled = if let Some(exponent) = hint.exponent() {
            value / 10f64.powi(exponent)
        } else if let Some(denominator) = hint.denominator() {
            value * denominator as f64
        } else {
            return Err(ValidationError::invalid(
                "real hint",
                format!("{hint:?} cannot scale a finite value"),
            ));
        };
        let rounded = scaled.round();
        if rounded > i64::MAX as f64 || rounded < i64::MIN as f64 {
            return Err(ValidationError::invalid(
                "real mantissa",
                format!("{value} overflows with hint {hint:?}"),
            ));
        }
        Ok(Self::new(rounded as i64, hint))
    }

    pub fn mantissa(&self) -> i64 {
        self.mantissa
    }

    pub fn hint(&self) -> RealHint {
        self.hint
    }

    pub fn to_f64(&self) -> f64 {
        match self.hint {
            RealHint::Infinity => f64::INFINITY,
            RealHint::NegInfinity => f64::NEG_INFINITY,
            RealHint::NotANumber => f64::NAN,
            hint => {
                if let Some(exponent) = hint.exponent() {
                    self.mantissa as f64 * 10f64.powi(exponent)
                } else {
                    let denominator = hint.denominator().unwrap_or(1);
                    self.mantissa as f64 / denominator as f64
                }
            }
        }
    }
}

impl fmt::Display for Real {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.hint.exponent() {
            Some(exponent) if exponent < 0 => {
                let digits = (-exponent) as usize;
                let sign = if self.mantissa < 0 { "-" } else { "" };
                let abs = self.mantissa.unsigned_abs().to_string();
                let padded = format!("{abs:0>width$}", width = digits + 1);
                let (int_part, frac_part) = padded.split_at(padded.len() - digits);
                write!(f, "{sign}{int_part}.{frac_part}")
            }
            _ => write!(f, "{}", self.to_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_hints_scale_by_powers_of_ten() {
        let price = Real::new(3990, RealHint::ExponentNeg2);
        assert!((price.to_f64() - 39.90).abs() < 1e-9);
        assert_eq!(price.to_string(), "39.90");
        assert_eq!(Real::new(-5, RealHint::ExponentNeg3).to_string(), "-0.005");
        assert_eq!(RealHint::ExponentPos7.exponent(), Some(7));
        assert_eq!(RealHint::Fraction1.exponent(), None);
    }

    #[test]
    fn fraction_hints_divide_by_powers_of_two() {
        let value = Real::new(3, RealHint::Fraction4);
        assert!((value.to_f64() - 0.75).abs() < 1e-12);
        assert_eq!(RealHint::Fraction256.denominator(), Some(256));
    }

    #[test]
    fn reserved_and_unknown_hints_are_rejected() {
        assert!(RealHint::try_from(31u8).is_err());
        assert!(RealHint::try_from(32u8).is_err());
        assert!(RealHint::try_from(36u8).is_err());
        assert!(RealHint::from_exponent(8).is_err());
        assert_eq!(RealHint::from_exponent(-2).unwrap(), RealHint::ExponentNeg2);
    }

    #[test]
    fn special_values_drop_mantissa() {
        assert_eq!(Real::new(42, RealHint::Infinity).mantissa(), 0);
        assert!(Real::nan().to_f64().is_nan());
        assert_eq!(
            Real::from_f64(f64::NEG_INFINITY, RealHint::Exponent0).unwrap(),
            Real::neg_infinity()
        );
    }

    #[test]
    fn from_f64_rounds_to_nearest_mantissa() {
        let real = Real::from_f64(101.256, RealHint::ExponentNeg2).unwrap();
        assert_eq!(real.mantissa(), 10126);
        assert!(Real::from_f64(1.0, RealHint::NotANumber).is_err());
    }
}
