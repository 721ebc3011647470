//! Lenient KML timestamp parsing.
//!
//! Accepts the XML Schema lexical forms `yyyy`, `yyyy-MM`, `yyyy-MM-dd`
//! and `yyyy-MM-ddTHH:mm[:ss[.SSS]][Z|±HH:MM]`. Missing timezones mean
//! UTC; missing seconds are tolerated; non-dateTime forms have a zero
//! time of day.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};

pub(crate) fn parse_kml_time(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if s.contains('T') {
        parse_date_time(s)
    } else {
        parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)).map(naive_utc)
    }
}

fn naive_utc(dt: NaiveDateTime) -> DateTime<Utc> {
    Utc.from_utc_datetime(&dt)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let mut parts = s.splitn(3, '-');
    // A leading '-' (negative year) is not tolerated; no KML in the wild
    // carries one.
    let year: i32 = parts.next()?.parse().ok()?;
    let month: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 1,
    };
    let day: u32 = match parts.next() {
        Some(d) => d.parse().ok()?,
        None => 1,
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_date_time(s: &str) -> Option<DateTime<Utc>> {
    // Zone-qualified forms first.
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f%:z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%dT%H:%M%:z",
    ] {
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    // A trailing `Z` or no zone at all both mean UTC.
    let naive = s.strip_suffix('Z').unwrap_or(s);
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive, fmt) {
            return Some(naive_utc(dt));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(s: &str) -> String {
        parse_kml_time(s)
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
            .unwrap_or_default()
    }

    #[test]
    fn full_date_time_with_zone() {
        assert_eq!(ts("2009-03-14T18:10:46Z"), "2009-03-14T18:10:46Z");
        assert_eq!(ts("2009-03-14T18:10:46.123Z"), "2009-03-14T18:10:46Z");
        assert_eq!(ts("2009-03-14T18:10:46+01:00"), "2009-03-14T17:10:46Z");
    }

    #[test]
    fn missing_seconds_tolerated() {
        assert_eq!(ts("2009-03-14T18:10"), "2009-03-14T18:10:00Z");
        assert_eq!(ts("2009-03-14T18:10Z"), "2009-03-14T18:10:00Z");
        assert_eq!(ts("2009-03-14T18:10+02:00"), "2009-03-14T16:10:00Z");
    }

    #[test]
    fn missing_zone_means_utc() {
        assert_eq!(ts("2009-03-14T18:10:46"), "2009-03-14T18:10:46Z");
    }

    #[test]
    fn date_only_forms_zero_the_time() {
        assert_eq!(ts("2009-03-14"), "2009-03-14T00:00:00Z");
        assert_eq!(ts("2009-03"), "2009-03-01T00:00:00Z");
        assert_eq!(ts("2009"), "2009-01-01T00:00:00Z");
    }

    #[test]
    fn garbage_yields_none() {
        assert!(parse_kml_time("not a date").is_none());
        assert!(parse_kml_time("2009-13").is_none());
        assert!(parse_kml_time("").is_none());
    }
}
