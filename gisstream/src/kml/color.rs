//! KML color parsing.

use crate::feature::Color;

/// Parses KML's `aabbggrr` hex notation. A leading `#` is ignored and a
/// 6-digit `bbggrr` form gets a full-opacity alpha. Anything else yields
/// `None`; the caller logs and keeps going.
pub(crate) fn parse_color(raw: &str) -> Option<Color> {
    let s = raw.trim().trim_start_matches('#');
    let digits = match s.len() {
        8 => s.to_string(),
        6 => format!("ff{s}"),
        _ => return None,
    };
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some(Color {
        alpha: byte(0)?,
        blue: byte(2)?,
        green: byte(4)?,
        red: byte(6)?,
    })
}
