//! Currency string handling
//!
//! Amounts travel through the app as display strings (`"$10.000"`). This is
//! the single place that turns them into integers and back.

/// Parse a display amount into whole currency units
///
/// Strips `$`, `.`, `,` and whitespace, then reads what is left as a
/// non-negative integer. Anything else (empty, negative, letters, overflow)
/// yields `0`.
pub fn parse_amount(raw: &str) -> u64 {
    let digits: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | '.' | ',') && !c.is_whitespace())
        .collect();

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }

    digits.parse::<u64>().unwrap_or(0)
}

/// Format whole currency units as `$` plus `.`-grouped thousands
pub fn format_amount(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    grouped.push('$');

    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    grouped
}
