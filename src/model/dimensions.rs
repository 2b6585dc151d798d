//! Dimension inputs and units
//!
//! Dimensions are always stored in millimeters; any other representation is
//! derived at substitution time and never written back.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Physical dimensions of the requested piece, canonical millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionInput {
    /// Material thickness in millimeters
    pub thickness_mm: f64,
    /// Piece length in millimeters
    pub length_mm: f64,
    /// Piece width in millimeters
    pub width_mm: f64,
    /// Number of pieces
    pub quantity: u32,
}

impl DimensionInput {
    pub fn new(thickness_mm: f64, length_mm: f64, width_mm: f64, quantity: u32) -> Self {
        Self {
            thickness_mm,
            length_mm,
            width_mm,
            quantity,
        }
    }

    /// Structural validation: measurements non-negative, quantity positive.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("thickness", self.thickness_mm),
            ("length", self.length_mm),
            ("width", self.width_mm),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::config_invalid(format!(
                    "dimension '{}' must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.quantity == 0 {
            return Err(Error::config_invalid("quantity must be positive"));
        }
        Ok(())
    }

    /// Millimeter value for a substitution variable.
    pub fn get(&self, var: DimensionVar) -> f64 {
        match var {
            DimensionVar::Thickness => self.thickness_mm,
            DimensionVar::Length => self.length_mm,
            DimensionVar::Width => self.width_mm,
            DimensionVar::Quantity => f64::from(self.quantity),
        }
    }
}

/// The substitution variables a template may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimensionVar {
    Thickness,
    Length,
    Width,
    Quantity,
}

impl DimensionVar {
    /// All recognized placeholder spellings, in substitution order.
    /// `height` is an alias websites commonly use for the length field.
    pub const PLACEHOLDERS: &'static [(&'static str, DimensionVar)] = &[
        ("thickness", DimensionVar::Thickness),
        ("length", DimensionVar::Length),
        ("height", DimensionVar::Length),
        ("width", DimensionVar::Width),
        ("quantity", DimensionVar::Quantity),
    ];

    /// Quantity is a count, not a length; it is never unit-converted.
    pub fn is_length(&self) -> bool {
        !matches!(self, DimensionVar::Quantity)
    }
}

/// Unit a step declares for its substituted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[default]
    Mm,
    Cm,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_negative() {
        let dims = DimensionInput::new(-1.0, 500.0, 300.0, 1);
        assert!(dims.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_quantity() {
        let dims = DimensionInput::new(2.0, 500.0, 300.0, 0);
        assert!(dims.validate().is_err());
    }

    #[test]
    fn test_height_aliases_length() {
        let dims = DimensionInput::new(2.0, 500.0, 300.0, 4);
        let (_, var) = DimensionVar::PLACEHOLDERS
            .iter()
            .find(|(name, _)| *name == "height")
            .unwrap();
        assert_eq!(dims.get(*var), 500.0);
    }

    #[test]
    fn test_unknown_unit_rejected() {
        let result: std::result::Result<Unit, _> = serde_json::from_str("\"inch\"");
        assert!(result.is_err());
    }
}
