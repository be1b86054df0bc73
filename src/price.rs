use std::sync::LazyLock;

use regex::Regex;

// Only digits, separators and the sign survive
static NON_NUMERIC: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^\d.,-]").ok());

/// Turns a provider price string such as `"$1,234.56"`, `"1.234,56€"` or
/// `"12,--€"` into a number.
///
/// Currency symbols and unit markers are dropped. When both `.` and `,` occur
/// the rightmost one is the decimal separator and the other one groups
/// thousands. A single separator kind is a decimal separator unless it shows
/// up more than once, in which case it only groups thousands.
///
/// Anything that cannot be parsed yields `0.0`.
pub fn clean_price(raw: Option<&str>) -> f64 {
    let (Some(raw), Some(non_numeric)) = (raw, NON_NUMERIC.as_ref()) else {
        return 0.0;
    };

    let stripped = non_numeric.replace_all(raw, "");
    let trimmed = stripped.trim_end_matches(['.', ',', '-']);

    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let normalized = normalize_separators(digits);

    let value = match normalized.parse::<f64>() {
        Ok(value) if value.is_finite() => value,
        _ => return 0.0,
    };

    if negative {
        -value
    } else {
        value
    }
}

fn normalize_separators(digits: &str) -> String {
    let Some(last) = digits.rfind(['.', ',']) else {
        return digits.to_owned();
    };

    let decimal = digits[last..].chars().next().unwrap_or('.');
    let has_dot = digits.contains('.');
    let has_comma = digits.contains(',');

    if has_dot && has_comma {
        let grouping = if decimal == '.' { ',' } else { '.' };
        return digits
            .chars()
            .filter(|c| *c != grouping)
            .map(|c| if c == decimal { '.' } else { c })
            .collect();
    }

    if digits.matches(decimal).count() > 1 {
        return digits.chars().filter(|c| *c != decimal).collect();
    }

    digits.replace(decimal, ".")
}
