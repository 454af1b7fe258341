use std::fmt;

use serde::{Deserialize, Serialize};

/// A single attribute value in a population or source table.
///
/// Cells that have not been imputed yet are represented as `None` at the
/// table level; a `Value` is always present data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
}

impl Eq for Value {}

impl Value {
    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn as_display(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Number(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
        }
    }

    /// Numeric view of the value; text is accepted when it parses as a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(f) => Some(*f),
            Value::Text(s) => parse_number(s),
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            (Value::Number(_), Value::Text(_)) => std::cmp::Ordering::Less,
            (Value::Text(_), Value::Number(_)) => std::cmp::Ordering::Greater,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

/// Parses a raw CSV field into a cell. Empty fields are missing values.
///
/// Fields keep their exact text: `01` and `1` are different categories, and
/// numeric coercion is left to the policies that need a number.
pub fn parse_cell(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(Value::Text(trimmed.to_string()))
}

/// Reads `value` as a finite number, rejecting the `inf`/`NaN` spellings
/// that `f64::from_str` would otherwise accept.
pub fn parse_number(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() || !looks_numeric(trimmed) {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

fn looks_numeric(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_cell_treats_empty_as_missing() {
        assert_eq!(parse_cell(""), None);
        assert_eq!(parse_cell("   "), None);
    }

    #[test]
    fn parse_cell_keeps_the_exact_text() {
        assert_eq!(parse_cell("01"), Some(Value::text("01")));
        assert_eq!(parse_cell(" 1e3 "), Some(Value::text("1e3")));
        assert_eq!(parse_cell("20-24"), Some(Value::text("20-24")));
    }

    #[test]
    fn parse_number_rejects_special_float_spellings() {
        assert_eq!(parse_number("-5"), Some(-5.0));
        assert_eq!(parse_number(" 2.5 "), Some(2.5));
        assert_eq!(parse_number("Nan"), None);
        assert_eq!(parse_number("inf"), None);
        assert_eq!(parse_number("20-24"), None);
    }

    #[test]
    fn whole_numbers_display_without_fraction() {
        assert_eq!(Value::Number(15.0).as_display(), "15");
        assert_eq!(Value::Number(2.5).as_display(), "2.5");
    }

    #[test]
    fn as_number_coerces_numeric_text() {
        assert_eq!(Value::text("10").as_number(), Some(10.0));
        assert_eq!(Value::text("Male").as_number(), None);
        assert_eq!(Value::text("Infinity").as_number(), None);
    }

    #[test]
    fn numbers_order_before_text() {
        assert!(Value::Number(100.0) < Value::text("1"));
        assert!(Value::Number(2.0) < Value::Number(10.0));
    }
}
