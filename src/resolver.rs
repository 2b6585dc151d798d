//! Variable and unit resolution
//!
//! Substitutes dimension placeholders into step templates, converting from
//! canonical millimeters to the unit the step declares. Pure functions of
//! their inputs; nothing here touches the page.
//!
//! Rounding policy: half up, at a configurable decimal precision (engine
//! default 2). Whole values render without a fractional part, so a 300 mm
//! width substitutes as `300` in mm and `30` in cm.

use crate::model::{DimensionInput, DimensionVar, Unit};
use crate::{Error, Result};

/// Convert a canonical millimeter value to the declared unit.
///
/// The conversion is linear (`cm = mm / 10`) and rounded half up at
/// `precision` decimals.
pub fn convert(value_mm: f64, unit: Unit, precision: u32) -> f64 {
    let converted = match unit {
        Unit::Mm => value_mm,
        Unit::Cm => value_mm / 10.0,
    };
    round_half_up(converted, precision)
}

/// Round half up at `precision` decimals. Inputs are non-negative by the
/// dimension invariant, so half-away-from-zero and half-up coincide.
pub fn round_half_up(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Render a converted value the way websites expect form input: no trailing
/// fractional zeros, no decimal point on whole numbers.
pub fn format_value(value: f64, precision: u32) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        let rendered = format!("{:.*}", precision as usize, value);
        rendered
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// Substitute every `{thickness}` / `{length}` / `{height}` / `{width}` /
/// `{quantity}` placeholder in `template` with the dimension converted to
/// `unit`. Non-placeholder text passes through unchanged; quantity is a count
/// and is never unit-converted.
pub fn resolve(
    template: &str,
    unit: Unit,
    dims: &DimensionInput,
    precision: u32,
) -> Result<String> {
    let mut resolved = template.to_string();

    for (name, var) in DimensionVar::PLACEHOLDERS {
        let placeholder = format!("{{{}}}", name);
        if !resolved.contains(&placeholder) {
            continue;
        }

        let raw = dims.get(*var);
        let value = if var.is_length() {
            convert(raw, unit, precision)
        } else {
            raw
        };
        resolved = resolved.replace(&placeholder, &format_value(value, precision));
    }

    // A placeholder that survives substitution is a typo in the template.
    if let Some(start) = resolved.find('{') {
        if let Some(end) = resolved[start..].find('}') {
            return Err(Error::config_invalid(format!(
                "unknown placeholder '{}' in template '{}'",
                &resolved[start..start + end + 1],
                template
            )));
        }
    }

    Ok(resolved)
}
