//! Constraint checking for option values.
//!
//! The same predicate backs catalog display and negotiation: a value is legal
//! for an option when it has the option's declared type and satisfies its
//! [`Constraint`]. The automatic sentinel bypasses the constraint on options
//! that declare support for it.

use crate::traits::{Constraint, OptionDescriptor, Value, ValueType};

/// Relative tolerance when checking that a real value sits on a quantization grid.
const GRID_TOLERANCE: f64 = 1e-9;

/// Why a value is not legal for an option.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Violation {
    /// The option has no automatic setting.
    #[error("option does not support automatic values")]
    AutoUnsupported,
    /// The value's type differs from the declared type.
    #[error("expected a {expected} value, got {found}")]
    TypeMismatch {
        /// Declared type.
        expected: ValueType,
        /// Supplied value.
        found: Value,
    },
    /// The value lies outside the closed range.
    #[error("{value} is outside {min}..{max}")]
    OutOfRange {
        /// Supplied value.
        value: Value,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },
    /// The value is in range but not a multiple of the step above `min`.
    #[error("{value} is not {min} plus a multiple of {quant}")]
    OffGrid {
        /// Supplied value.
        value: Value,
        /// Lower bound.
        min: f64,
        /// Quantization step.
        quant: f64,
    },
    /// The value is not one of the enumerated values.
    #[error("{value} is not one of the allowed values")]
    NotInList {
        /// Supplied value.
        value: Value,
    },
}

/// Check `value` against the option's type and constraint.
///
/// # Errors
///
/// Returns the first [`Violation`] found. Out-of-grid values are rejected,
/// never rounded.
pub fn check(option: &OptionDescriptor, value: &Value) -> Result<(), Violation> {
    if *value == Value::Auto {
        return if option.automatic {
            Ok(())
        } else {
            Err(Violation::AutoUnsupported)
        };
    }

    if value.value_type() != Some(option.value_type) {
        return Err(Violation::TypeMismatch {
            expected: option.value_type,
            found: value.clone(),
        });
    }

    match &option.constraint {
        Constraint::None => Ok(()),
        Constraint::Range { min, max, quant } => {
            check_range(option.value_type, value, *min, *max, *quant)
        }
        Constraint::List(values) => {
            if values.contains(value) {
                Ok(())
            } else {
                Err(Violation::NotInList {
                    value: value.clone(),
                })
            }
        }
    }
}

/// Whether `value` is legal for the option.
#[must_use]
pub fn is_valid(option: &OptionDescriptor, value: &Value) -> bool {
    check(option, value).is_ok()
}

fn check_range(
    value_type: ValueType,
    value: &Value,
    min: f64,
    max: f64,
    quant: f64,
) -> Result<(), Violation> {
    let out_of_range = || Violation::OutOfRange {
        value: value.clone(),
        min,
        max,
    };
    let v = value.as_f64().ok_or_else(out_of_range)?;
    if !(min..=max).contains(&v) {
        return Err(out_of_range());
    }
    if quant == 0.0 {
        return Ok(());
    }

    let on_grid = match value_type {
        ValueType::Int => on_int_grid(v, min, quant),
        ValueType::Real => on_real_grid(v, min, quant),
        _ => true,
    };
    if on_grid {
        Ok(())
    } else {
        Err(Violation::OffGrid {
            value: value.clone(),
            min,
            quant,
        })
    }
}

/// Exact modulo for whole-number steps; a fractional step falls back to the
/// real-number grid.
#[allow(clippy::cast_possible_truncation)]
fn on_int_grid(v: f64, min: f64, quant: f64) -> bool {
    if quant.fract() != 0.0 || min.fract() != 0.0 {
        return on_real_grid(v, min, quant);
    }
    let (v, min, quant) = (v as i64, min as i64, quant as i64);
    (v - min) % quant == 0
}

fn on_real_grid(v: f64, min: f64, quant: f64) -> bool {
    let steps = (v - min) / quant;
    (steps - steps.round()).abs() <= GRID_TOLERANCE * steps.abs().max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolution() -> OptionDescriptor {
        OptionDescriptor::new("resolution", ValueType::Int).with_range(100.0, 1200.0, 100.0)
    }

    fn mode() -> OptionDescriptor {
        OptionDescriptor::new("mode", ValueType::Str).with_list(vec![
            Value::Str("lineart".to_owned()),
            Value::Str("gray".to_owned()),
            Value::Str("color".to_owned()),
        ])
    }

    #[test]
    fn test_range_accepts_every_grid_point() {
        let option = resolution();
        for v in (100..=1200).step_by(100) {
            assert!(is_valid(&option, &Value::Int(v)), "{v} should be accepted");
        }
    }

    #[test]
    fn test_range_rejects_off_grid_and_out_of_range() {
        let option = resolution();
        assert!(matches!(
            check(&option, &Value::Int(650)),
            Err(Violation::OffGrid { .. })
        ));
        assert!(matches!(
            check(&option, &Value::Int(1300)),
            Err(Violation::OutOfRange { .. })
        ));
        assert!(matches!(
            check(&option, &Value::Int(0)),
            Err(Violation::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_range_grid_stops_below_max() {
        let option = OptionDescriptor::new("x", ValueType::Int).with_range(0.0, 10.0, 3.0);
        assert!(is_valid(&option, &Value::Int(9)));
        assert!(!is_valid(&option, &Value::Int(10)));
    }

    #[test]
    fn test_real_range_with_step() {
        let option = OptionDescriptor::new("gamma", ValueType::Real).with_range(0.5, 3.0, 0.1);
        assert!(is_valid(&option, &Value::Real(0.7)));
        assert!(is_valid(&option, &Value::Real(3.0)));
        assert!(!is_valid(&option, &Value::Real(0.75)));
    }

    #[test]
    fn test_range_rejects_non_finite_reals() {
        let stepless = OptionDescriptor::new("tl-x", ValueType::Real).with_range(0.0, 215.9, 0.0);
        let stepped = OptionDescriptor::new("gamma", ValueType::Real).with_range(0.5, 3.0, 0.1);
        for v in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(
                matches!(check(&stepless, &Value::Real(v)), Err(Violation::OutOfRange { .. })),
                "{v} should be outside 0..215.9"
            );
            assert!(!is_valid(&stepped, &Value::Real(v)), "{v} should be rejected");
        }
    }

    #[test]
    fn test_int_range_with_fractional_step() {
        let option = OptionDescriptor::new("x", ValueType::Int).with_range(0.0, 10.0, 2.5);
        assert!(is_valid(&option, &Value::Int(5)));
        assert!(is_valid(&option, &Value::Int(10)));
        assert!(matches!(
            check(&option, &Value::Int(3)),
            Err(Violation::OffGrid { .. })
        ));
    }

    #[test]
    fn test_range_without_step() {
        let option = OptionDescriptor::new("tl-x", ValueType::Real).with_range(0.0, 215.9, 0.0);
        assert!(is_valid(&option, &Value::Real(12.345)));
        assert!(!is_valid(&option, &Value::Real(216.0)));
    }

    #[test]
    fn test_list_accepts_exactly_listed_values() {
        let option = mode();
        assert!(is_valid(&option, &Value::Str("color".to_owned())));
        assert!(matches!(
            check(&option, &Value::Str("Color".to_owned())),
            Err(Violation::NotInList { .. })
        ));
        assert!(!is_valid(&option, &Value::Str("halftone".to_owned())));
    }

    #[test]
    fn test_numeric_list() {
        let option = OptionDescriptor::new("depth", ValueType::Int)
            .with_list(vec![Value::Int(1), Value::Int(8), Value::Int(16)]);
        assert!(is_valid(&option, &Value::Int(8)));
        assert!(!is_valid(&option, &Value::Int(12)));
    }

    #[test]
    fn test_type_mismatch() {
        assert!(matches!(
            check(&resolution(), &Value::Str("600".to_owned())),
            Err(Violation::TypeMismatch { .. })
        ));
        assert!(matches!(
            check(&resolution(), &Value::Real(600.0)),
            Err(Violation::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_auto_requires_support() {
        assert_eq!(
            check(&resolution(), &Value::Auto),
            Err(Violation::AutoUnsupported)
        );
        let option = resolution().automatic();
        assert!(is_valid(&option, &Value::Auto));
    }

    #[test]
    fn test_unconstrained_accepts_any_value_of_type() {
        let option = OptionDescriptor::new("preview", ValueType::Bool);
        assert!(is_valid(&option, &Value::Bool(false)));
        assert!(!is_valid(&option, &Value::Int(0)));
    }
}
