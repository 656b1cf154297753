//! FILENAME: metric-engine/src/number_format.rs
//! PURPOSE: Number formatting utilities for displaying metric values.
//! CONTEXT: Every computed value carries a display string built from its
//! template's (or virtual metric's) display format and decimal places.
//! A missing value renders as the configured null marker, never as "0".

use crate::definition::DisplayFormat;

pub const DEFAULT_CURRENCY_SYMBOL: &str = "$";
pub const DEFAULT_NULL_DISPLAY: &str = "-";

/// Formatting options that are not part of a display format.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberFormatter {
    pub currency_symbol: String,
    pub null_display: String,
}

impl Default for NumberFormatter {
    fn default() -> Self {
        NumberFormatter {
            currency_symbol: DEFAULT_CURRENCY_SYMBOL.to_string(),
            null_display: DEFAULT_NULL_DISPLAY.to_string(),
        }
    }
}

impl NumberFormatter {
    pub fn format(&self, value: f64, format: DisplayFormat, decimal_places: u8) -> String {
        match format {
            DisplayFormat::Number => format_decimal(value, decimal_places),
            DisplayFormat::Integer => format_decimal(value, 0),
            DisplayFormat::Percentage => format_percentage(value, decimal_places),
            DisplayFormat::Currency => format_currency(value, decimal_places, &self.currency_symbol),
        }
    }

    pub fn format_optional(&self, value: Option<f64>, format: DisplayFormat, decimal_places: u8) -> String {
        match value {
            Some(v) => self.format(v, format, decimal_places),
            None => self.null_display.clone(),
        }
    }
}

/// Format a value with the default currency symbol.
pub fn format_value(value: f64, format: DisplayFormat, decimal_places: u8) -> String {
    NumberFormatter::default().format(value, format, decimal_places)
}

/// Format an optional value; `None` renders as "-".
pub fn format_optional(value: Option<f64>, format: DisplayFormat, decimal_places: u8) -> String {
    NumberFormatter::default().format_optional(value, format, decimal_places)
}

/// Format a number with specified decimal places and thousands separator.
fn format_decimal(value: f64, decimal_places: u8) -> String {
    add_thousands_separator(&rounded(value, decimal_places))
}

/// Fixed-point rendering that never shows a negative zero.
fn rounded(value: f64, decimal_places: u8) -> String {
    let s = format!("{:.prec$}", value, prec = decimal_places as usize);
    if s.starts_with('-') && s.chars().all(|c| matches!(c, '-' | '0' | '.')) {
        s[1..].to_string()
    } else {
        s
    }
}

/// Add thousands separators to a numeric string.
fn add_thousands_separator(s: &str) -> String {
    let (integer_part, decimal_part) = match s.split_once('.') {
        Some((int, dec)) => (int, Some(dec)),
        None => (s, None),
    };

    let negative = integer_part.starts_with('-');
    let digits: Vec<char> = integer_part.chars().filter(|c| c.is_ascii_digit()).collect();

    let mut result = String::with_capacity(s.len() + digits.len() / 3 + 1);
    if negative {
        result.push('-');
    }

    let len = digits.len();
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    if let Some(decimal) = decimal_part {
        result.push('.');
        result.push_str(decimal);
    }

    result
}

/// Format a number as currency. Negatives are parenthesised.
fn format_currency(value: f64, decimal_places: u8, symbol: &str) -> String {
    let body = add_thousands_separator(&rounded(value.abs(), decimal_places));
    let with_symbol = format!("{}{}", symbol, body);

    if value < 0.0 && rounded(value, decimal_places).starts_with('-') {
        format!("({})", with_symbol)
    } else {
        with_symbol
    }
}

/// Format a ratio as percentage.
fn format_percentage(value: f64, decimal_places: u8) -> String {
    format!("{}%", rounded(value * 100.0, decimal_places))
}
