// Numeric interpretation of raw cell values

use crate::data::Value;

/// Three-valued state of a field in a row, checked the same way by the
/// chunker and the series assembler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldState {
    Numeric(f64),
    NonNumeric,
    Absent,
}

impl FieldState {
    pub fn of(value: Option<&Value>) -> Self {
        match value {
            None | Some(Value::Empty) => FieldState::Absent,
            Some(Value::Number(n)) if n.is_finite() => FieldState::Numeric(*n),
            Some(Value::Number(_)) => FieldState::NonNumeric,
            Some(Value::Text(s)) => {
                if s.trim().is_empty() {
                    FieldState::Absent
                } else {
                    parse_number(s).map_or(FieldState::NonNumeric, FieldState::Numeric)
                }
            }
        }
    }

    pub fn number(self) -> Option<f64> {
        match self {
            FieldState::Numeric(n) => Some(n),
            _ => None,
        }
    }
}

/// Parse a numeric string, tolerating surrounding whitespace and thousands
/// separators. Only finite results are accepted.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let cleaned: String = trimmed.chars().filter(|c| *c != ',').collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Lenient leading-number parse for coordinates (`"12.5N"` -> 12.5).
pub fn parse_leading_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = trimmed.as_bytes();

    while end < bytes.len() {
        let c = bytes[end];
        match c {
            b'0'..=b'9' => seen_digit = true,
            b'+' | b'-' if end == 0 => {}
            b'+' | b'-' if seen_exp && matches!(bytes[end - 1], b'e' | b'E') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'e' | b'E' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }

    // back off a dangling exponent marker or sign
    let mut candidate = &trimmed[..end];
    while let Some(last) = candidate.chars().last() {
        if matches!(last, 'e' | 'E' | '+' | '-') {
            candidate = &candidate[..candidate.len() - 1];
        } else {
            break;
        }
    }

    if !seen_digit {
        return None;
    }
    candidate.parse::<f64>().ok().filter(|n| n.is_finite())
}
