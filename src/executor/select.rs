//! Option matching for select-like controls
//!
//! Exact value matches are handled by the driver. When they miss, the
//! fallback order here is: numeric match with a digit-count guard (so a
//! requested 2 never matches a 20mm option), then case-insensitive partial
//! label match.

use regex::Regex;
use std::sync::OnceLock;

use crate::session::SelectOption;

fn number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(\d+(?:[.,]\d+)?)").expect("number pattern is valid"))
}

fn leading_number(text: &str) -> Option<f64> {
    number_pattern()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', ".").parse().ok())
}

fn digit_count(value: f64) -> usize {
    (value.trunc().abs() as u64).to_string().len()
}

/// Pick the option best matching `wanted`, returning its `value` attribute.
pub fn best_match(options: &[SelectOption], wanted: &str) -> Option<String> {
    let wanted_trimmed = wanted.trim();

    // Exact label match first; the driver already tried exact values.
    if let Some(option) = options
        .iter()
        .find(|o| o.label.trim().eq_ignore_ascii_case(wanted_trimmed))
    {
        return Some(option.value.clone());
    }

    // Numeric: "2" should match "2mm" or "2 mm", never "20mm".
    if let Ok(target) = wanted_trimmed.replace(',', ".").parse::<f64>() {
        if let Some(option) = options.iter().find(|o| {
            leading_number(&o.label)
                .or_else(|| leading_number(&o.value))
                .map(|v| (v - target).abs() < 0.01 && digit_count(v) == digit_count(target))
                .unwrap_or(false)
        }) {
            return Some(option.value.clone());
        }
        return None;
    }

    // Partial text match for non-numeric selections.
    let wanted_lower = wanted_trimmed.to_lowercase();
    options
        .iter()
        .find(|o| o.label.to_lowercase().contains(&wanted_lower))
        .map(|o| o.value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(raw: &[(&str, &str)]) -> Vec<SelectOption> {
        raw.iter()
            .map(|(value, label)| SelectOption {
                value: (*value).to_string(),
                label: (*label).to_string(),
            })
            .collect()
    }

    #[test]
    fn test_numeric_match_with_unit_suffix() {
        let opts = options(&[("17", "2mm"), ("18", "3mm"), ("19", "4 mm")]);
        assert_eq!(best_match(&opts, "3").unwrap(), "18");
        assert_eq!(best_match(&opts, "4").unwrap(), "19");
    }

    #[test]
    fn test_digit_count_guard() {
        // A requested 2 must not match the 20mm option.
        let opts = options(&[("a", "20mm"), ("b", "25mm")]);
        assert_eq!(best_match(&opts, "2"), None);
    }

    #[test]
    fn test_decimal_comma_request() {
        let opts = options(&[("x", "1,5mm"), ("y", "2mm")]);
        assert_eq!(best_match(&opts, "1.5").unwrap(), "x");
    }

    #[test]
    fn test_exact_label_beats_partial() {
        let opts = options(&[("1", "Glanzend wit"), ("2", "Wit")]);
        assert_eq!(best_match(&opts, "wit").unwrap(), "2");
    }

    #[test]
    fn test_partial_label_match() {
        let opts = options(&[("1", "Acrylaat glanzend"), ("2", "Polycarbonaat helder")]);
        assert_eq!(best_match(&opts, "helder").unwrap(), "2");
    }

    #[test]
    fn test_no_match() {
        let opts = options(&[("1", "2mm"), ("2", "3mm")]);
        assert_eq!(best_match(&opts, "10"), None);
        assert_eq!(best_match(&opts, "matzwart"), None);
    }
}
