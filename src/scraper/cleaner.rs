use chrono::NaiveDate;

use crate::models::{FieldKind, FieldValue};

// ── Coercion ──────────────────────────────────────────────────────────────────

/// Placeholders the sites print instead of a number.
fn is_placeholder(s: &str) -> bool {
    matches!(s, "" | "-" | "--" | "—" | "–" | "N/A" | "n/a" | "NA")
}

/// Counting stat: strip thousands separators, parse as integer.
/// "1,234" → 1234 | "12.0" → 12 | "-" / "" / "abc" → None
pub fn parse_count(s: &str) -> Option<i64> {
    let s = s.trim();
    if is_placeholder(s) {
        return None;
    }
    let cleaned = s.replace(',', "");
    if let Ok(n) = cleaned.parse::<i64>() {
        return Some(n);
    }
    // Some tables print integral floats ("12.0")
    let f: f64 = cleaned.parse().ok()?;
    // `as` saturates, so out-of-range values would read as i64::MAX
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.is_finite() && f.fract() == 0.0 && in_range).then(|| f as i64)
}

/// Same as `parse_count` for an optional cell (missing column, short row).
pub fn parse_count_opt(s: Option<&str>) -> Option<i64> {
    s.and_then(parse_count)
}

/// "1.5" → 1.5 | "1,204.5" → 1204.5 | "-" → None
pub fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if is_placeholder(s) {
        return None;
    }
    s.replace(',', "").parse::<f64>().ok().filter(|f| f.is_finite())
}

/// Collapse whitespace; empty and placeholder text become None.
pub fn clean_text(s: &str) -> Option<String> {
    let s = normalize_ws(s);
    if is_placeholder(&s) { None } else { Some(s) }
}

/// Coerce a raw cell into the field's kind. Never fails: unparsable input is
/// the absence marker.
pub fn coerce(kind: FieldKind, raw: Option<&str>) -> FieldValue {
    match kind {
        FieldKind::Count => FieldValue::Count(parse_count_opt(raw)),
        FieldKind::Decimal => FieldValue::Decimal(raw.and_then(parse_decimal)),
        FieldKind::Text => FieldValue::Text(raw.and_then(clean_text)),
    }
}

// ── Text ──────────────────────────────────────────────────────────────────────

pub fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse dates as the sites print them: ISO, "Sat, Oct 5, 2024",
/// "Oct 5, 2024", "October 5, 2024", or the compact "20241005".
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = normalize_ws(s);
    if s.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%a, %b %d, %Y", "%A, %B %d, %Y", "%Y%m%d"] {
        if let Ok(d) = NaiveDate::parse_from_str(&s, fmt) {
            return Some(d);
        }
    }

    // "7:30 PM, March 3, 2025" (scorebox meta) → keep the date part
    if let Some((_, rest)) = s.split_once(", ") {
        if rest != s {
            return parse_date(rest);
        }
    }

    None
}

/// Leading `YYYYMMDD` of a sports-reference game id: "202501150LAL".
pub fn date_from_game_id(game_id: &str) -> Option<NaiveDate> {
    let prefix = game_id.get(..8)?;
    NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()
}

/// Turn free text into a stable id fragment: "Ohio State" → "Ohio_State".
pub fn slug(s: &str) -> String {
    normalize_ws(s).replace(' ', "_")
}

// ── Tests ─────────────────────────────────────────────────────────────────────
