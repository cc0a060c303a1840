//! Cell formatting helpers.

/// Format a spreadsheet amount cell as US currency.
///
/// Accepts plain numbers and numbers already written with `$` and thousands
/// separators. Whole amounts render without cents (`$50,000`); fractional
/// amounts are rounded half-up to cents (`$1,234.50`). Anything that is not a
/// number is returned trimmed and otherwise untouched.
pub fn format_currency(raw: &str) -> String {
    let trimmed = raw.trim();
    match parse_cents(trimmed) {
        Some(cents) => render_cents(cents),
        None => trimmed.to_string(),
    }
}

/// Normalize a comma-separated tag cell to `a, b, c`.
pub fn format_tags(raw: &str) -> String {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_cents(raw: &str) -> Option<i128> {
    let (negative, rest) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start()),
        None => (false, raw),
    };
    let rest = rest.strip_prefix('$').unwrap_or(rest).trim();
    let digits: String = rest.chars().filter(|c| *c != ',').collect();
    let (whole, frac) = digits.split_once('.').unwrap_or((digits.as_str(), ""));

    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !frac.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    // i128 holds 38 digits; keep well clear of overflow.
    if whole.len() > 30 {
        return None;
    }

    let whole_value: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut frac_digits = frac.bytes().map(|b| i128::from(b - b'0'));
    let tenths = frac_digits.next().unwrap_or(0);
    let hundredths = frac_digits.next().unwrap_or(0);
    let round_up = frac_digits.next().is_some_and(|d| d >= 5);

    let mut cents = whole_value * 100 + tenths * 10 + hundredths;
    if round_up {
        cents += 1;
    }
    Some(if negative { -cents } else { cents })
}

fn render_cents(cents: i128) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    let whole = group_thousands(&(abs / 100).to_string());
    match abs % 100 {
        0 => format!("{sign}${whole}"),
        frac => format!("{sign}${whole}.{frac:02}"),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
