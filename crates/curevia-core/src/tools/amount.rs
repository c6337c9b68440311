//! Amount parsing and localized currency formatting

use lazy_static::lazy_static;
use regex::Regex;

use crate::language::Language;

lazy_static! {
    static ref AMOUNT: Regex =
        Regex::new(r"\d{1,3}(?:[ \u{a0}.,]\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d{1,2})?").unwrap();
}

/// First positive amount mentioned in `text`
pub fn find_amount(text: &str) -> Option<f64> {
    AMOUNT
        .find_iter(text)
        .filter_map(|m| parse_amount(m.as_str()))
        .find(|v| *v > 0.0)
}

/// Parse a loosely written amount such as `120 000`, `120,000.50`,
/// `120.000,50` or `100000 kr`.
///
/// When both separators occur the last one is the decimal mark. A lone
/// separator kind is a thousands separator when it repeats or is followed
/// by exactly three digits.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) => {
            let (decimal, thousands) = if comma > dot { (',', '.') } else { ('.', ',') };
            cleaned.replace(thousands, "").replace(decimal, ".")
        }
        (Some(_), None) => normalize_single(&cleaned, ','),
        (None, Some(_)) => normalize_single(&cleaned, '.'),
        (None, None) => cleaned,
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn normalize_single(s: &str, sep: char) -> String {
    let count = s.matches(sep).count();
    let tail = s.rsplit(sep).next().unwrap_or_default();
    if count > 1 || tail.len() == 3 {
        s.replace(sep, "")
    } else {
        s.replace(sep, ".")
    }
}

fn group_digits(value: u64, sep: char) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(ch);
    }
    out
}

/// Whole currency units, formatted the way each market writes them
pub fn format_amount(value: f64, lang: Language) -> String {
    let rounded = value.round() as i64;
    let sign = if rounded < 0 { "-" } else { "" };
    let abs = rounded.unsigned_abs();
    match lang {
        Language::Sv => format!("{sign}{} kr", group_digits(abs, ' ')),
        Language::En => format!("{sign}SEK {}", group_digits(abs, ',')),
        Language::No => format!("{sign}kr {}", group_digits(abs, ' ')),
        Language::Da => format!("{sign}{} kr.", group_digits(abs, '.')),
    }
}

/// A rate such as `0.3142` as `31,4 %` (or `31.4%` in English)
pub fn format_percent(rate: f64, lang: Language) -> String {
    let pct = rate * 100.0;
    let text = if (pct - pct.round()).abs() < 0.05 {
        format!("{:.0}", pct)
    } else {
        format!("{:.1}", pct)
    };
    match lang {
        Language::En => format!("{text}%"),
        _ => format!("{} %", text.replace('.', ",")),
    }
}
