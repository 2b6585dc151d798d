//! Price extraction and normalization
//!
//! Parses a numeric price out of arbitrary page text, tolerating both
//! continental (`1.234,56`) and anglophone (`1,234.56`) separator styles,
//! evaluates optional per-item calculation expressions, and strips VAT from
//! gross readings.

use regex::Regex;
use std::sync::OnceLock;

use crate::collaborators::VatInfo;
use crate::model::{DimensionInput, DimensionVar, PriceResult};
use crate::{Error, Result};

fn price_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // The longest run of digits with embedded separators; currency
        // symbols and surrounding text fall away by not matching.
        Regex::new(r"(\d(?:[\d.,]*\d)?)").expect("price pattern is valid")
    })
}

/// Extract the first numeric value from price text.
///
/// When both separators appear, the rightmost one is the decimal mark. A lone
/// comma or dot is a decimal mark when at most two digits follow it, a
/// grouping separator otherwise.
pub fn extract_price(text: &str) -> Result<f64> {
    let captures = price_pattern()
        .captures(text)
        .ok_or_else(|| Error::price_parse(format!("no numeric value in '{}'", text.trim())))?;
    let number = captures.get(1).map(|m| m.as_str()).unwrap_or_default();

    let normalized = normalize_separators(number);
    normalized
        .parse::<f64>()
        .map_err(|_| Error::price_parse(format!("unparsable number '{}' in '{}'", number, text)))
}

fn normalize_separators(number: &str) -> String {
    let last_dot = number.rfind('.');
    let last_comma = number.rfind(',');

    match (last_dot, last_comma) {
        (Some(dot), Some(comma)) if comma > dot => {
            // 1.234,56 — comma is the decimal mark
            number.replace('.', "").replace(',', ".")
        }
        (Some(_), Some(_)) => {
            // 1,234.56 — dot is the decimal mark
            number.replace(',', "")
        }
        (None, Some(comma)) => single_separator(number, ',', comma),
        (Some(dot), None) => single_separator(number, '.', dot),
        _ => number.to_string(),
    }
}

/// One separator kind only: repeated occurrences are grouping; a single one
/// is a decimal mark when at most two digits follow it.
fn single_separator(number: &str, separator: char, last_index: usize) -> String {
    let occurrences = number.matches(separator).count();
    let digits_after = number.len() - last_index - 1;

    if occurrences > 1 || digits_after > 2 {
        number.replace(separator, "")
    } else {
        number.replace(separator, ".")
    }
}

/// Evaluate a per-item calculation expression against the extracted price.
///
/// The expression language is fixed: numeric literals, the `price`
/// identifier, dimension placeholders (substituted before parsing), the four
/// arithmetic operators and parentheses. Anything else is a configuration
/// error.
pub fn evaluate_calculation(expression: &str, price: f64, dims: &DimensionInput) -> Result<f64> {
    let mut substituted = expression.to_string();
    for (name, var) in DimensionVar::PLACEHOLDERS {
        let placeholder = format!("{{{}}}", name);
        if substituted.contains(&placeholder) {
            substituted = substituted.replace(&placeholder, &dims.get(*var).to_string());
        }
    }

    let mut parser = ExprParser::new(&substituted, price);
    let value = parser.expression()?;
    parser.expect_end()?;

    if !value.is_finite() {
        return Err(Error::config_invalid(format!(
            "calculation '{}' did not produce a finite value",
            expression
        )));
    }
    Ok(value)
}

/// Apply VAT normalization: `net = gross / (1 + rate)`.
pub fn normalize_vat(amount: f64, includes_vat: bool, vat: &VatInfo) -> PriceResult {
    let (net, gross) = if includes_vat {
        (amount / (1.0 + vat.rate), amount)
    } else {
        (amount, amount * (1.0 + vat.rate))
    };

    PriceResult {
        amount,
        currency: vat.currency.clone(),
        includes_vat,
        net,
        gross,
    }
}

/// Minimal recursive-descent parser over `+ - * /`, parentheses, numbers and
/// the `price` identifier.
struct ExprParser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    source: &'a str,
    price: f64,
}

impl<'a> ExprParser<'a> {
    fn new(source: &'a str, price: f64) -> Self {
        Self {
            chars: source.chars().peekable(),
            source,
            price,
        }
    }

    fn skip_spaces(&mut self) {
        while matches!(self.chars.peek(), Some(c) if c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn error(&self, what: &str) -> Error {
        Error::config_invalid(format!("calculation '{}': {}", self.source, what))
    }

    fn expression(&mut self) -> Result<f64> {
        let mut value = self.term()?;
        loop {
            self.skip_spaces();
            match self.chars.peek() {
                Some('+') => {
                    self.chars.next();
                    value += self.term()?;
                }
                Some('-') => {
                    self.chars.next();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64> {
        let mut value = self.factor()?;
        loop {
            self.skip_spaces();
            match self.chars.peek() {
                Some('*') => {
                    self.chars.next();
                    value *= self.factor()?;
                }
                Some('/') => {
                    self.chars.next();
                    let divisor = self.factor()?;
                    if divisor == 0.0 {
                        return Err(self.error("division by zero"));
                    }
                    value /= divisor;
                }
                _ => return Ok(value),
            }
        }
    }

    fn factor(&mut self) -> Result<f64> {
        self.skip_spaces();
        match self.chars.peek() {
            Some('(') => {
                self.chars.next();
                let value = self.expression()?;
                self.skip_spaces();
                if self.chars.next() != Some(')') {
                    return Err(self.error("missing closing parenthesis"));
                }
                Ok(value)
            }
            Some('-') => {
                self.chars.next();
                Ok(-self.factor()?)
            }
            Some(c) if c.is_ascii_digit() || *c == '.' => {
                let mut literal = String::new();
                while matches!(self.chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
                    literal.push(self.chars.next().unwrap());
                }
                literal
                    .parse()
                    .map_err(|_| self.error(&format!("bad number '{}'", literal)))
            }
            Some(c) if c.is_ascii_alphabetic() => {
                let mut ident = String::new();
                while matches!(self.chars.peek(), Some(c) if c.is_ascii_alphanumeric() || *c == '_')
                {
                    ident.push(self.chars.next().unwrap());
                }
                if ident == "price" {
                    Ok(self.price)
                } else {
                    Err(self.error(&format!("unknown identifier '{}'", ident)))
                }
            }
            _ => Err(self.error("unexpected end of expression")),
        }
    }

    fn expect_end(&mut self) -> Result<()> {
        self.skip_spaces();
        match self.chars.peek().copied() {
            None => Ok(()),
            Some(c) => Err(self.error(&format!("unexpected character '{}'", c))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dims() -> DimensionInput {
        DimensionInput::new(2.0, 500.0, 300.0, 4)
    }

    fn eur(rate: f64) -> VatInfo {
        VatInfo {
            rate,
            currency: "EUR".to_string(),
        }
    }

    #[test]
    fn test_extract_plain() {
        assert_eq!(extract_price("121.00").unwrap(), 121.00);
        assert_eq!(extract_price("29,81").unwrap(), 29.81);
    }

    #[test]
    fn test_extract_with_currency_symbols() {
        assert_eq!(extract_price("€ 121,00").unwrap(), 121.00);
        assert_eq!(extract_price("$1,234.56").unwrap(), 1234.56);
        assert_eq!(extract_price("1.234,56 €").unwrap(), 1234.56);
    }

    #[test]
    fn test_extract_lone_comma_grouping() {
        // Three digits after a lone comma: grouping, not decimals.
        assert_eq!(extract_price("1,234").unwrap(), 1234.0);
    }

    #[test]
    fn test_extract_ungrouped_decimal() {
        assert_eq!(extract_price("1234.56").unwrap(), 1234.56);
    }

    #[test]
    fn test_extract_repeated_grouping() {
        assert_eq!(extract_price("1.234.567").unwrap(), 1_234_567.0);
    }

    #[test]
    fn test_extract_from_surrounding_text() {
        assert_eq!(
            extract_price("Prijs per m²: € 34,95 incl. btw").unwrap(),
            34.95
        );
    }

    #[test]
    fn test_extract_rejects_no_number() {
        let err = extract_price("op aanvraag").unwrap_err();
        assert!(matches!(err, Error::PriceParse(_)));
    }

    #[test]
    fn test_calculation_per_unit() {
        let value = evaluate_calculation("price / {quantity}", 40.0, &dims()).unwrap();
        assert_eq!(value, 10.0);
    }

    #[test]
    fn test_calculation_area() {
        // price per mm² scaled to the requested piece
        let value =
            evaluate_calculation("price * {length} * {width} / 1000000", 2.0, &dims()).unwrap();
        assert!((value - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_calculation_parentheses_and_precedence() {
        let value = evaluate_calculation("(price + 2) * 3", 4.0, &dims()).unwrap();
        assert_eq!(value, 18.0);
        let value = evaluate_calculation("price + 2 * 3", 4.0, &dims()).unwrap();
        assert_eq!(value, 10.0);
    }

    #[test]
    fn test_calculation_division_by_zero() {
        let err = evaluate_calculation("price / 0", 4.0, &dims()).unwrap_err();
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_calculation_unknown_identifier() {
        let err = evaluate_calculation("price * tax", 4.0, &dims()).unwrap_err();
        assert!(matches!(err, Error::ConfigInvalid(_)));
    }

    #[test]
    fn test_vat_strip_from_gross() {
        let result = normalize_vat(121.0, true, &eur(0.21));
        assert!((result.net - 100.0).abs() < 1e-6);
        assert_eq!(result.gross, 121.0);
        assert_eq!(result.currency, "EUR");
    }

    #[test]
    fn test_vat_add_to_net() {
        let result = normalize_vat(100.0, false, &eur(0.21));
        assert_eq!(result.net, 100.0);
        assert!((result.gross - 121.0).abs() < 1e-6);
    }

    #[test]
    fn test_vat_relative_tolerance() {
        for gross in [0.01, 1.0, 99.99, 12345.67] {
            for rate in [0.09, 0.19, 0.21, 0.25] {
                let result = normalize_vat(gross, true, &eur(rate));
                let relative = (result.net * (1.0 + rate) - gross).abs() / gross;
                assert!(relative < 1e-6);
            }
        }
    }
}
