//! Record shaping for API responses: derived display fields, date
//! formatting, and tolerant parsing of loosely-typed stored values.

use chrono::{Datelike, NaiveDate, NaiveDateTime};

/// Calendar-aware age: decrements when the birthday has not yet occurred
/// in the current year.
pub fn age_from_birth_date(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

/// Parse a `"systolic/diastolic"` string. Malformed input degrades to
/// `(0, 0)` rather than failing the response.
pub fn parse_blood_pressure(raw: &str) -> (u32, u32) {
    let Some((sys, dia)) = raw.split_once('/') else {
        return (0, 0);
    };
    match (sys.trim().parse(), dia.trim().parse()) {
        (Ok(s), Ok(d)) => (s, d),
        _ => (0, 0),
    }
}

/// `YYYY-MM-DD`
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// `HH:mm`
pub fn format_time(dt: NaiveDateTime) -> String {
    dt.format("%H:%M").to_string()
}

/// Display name for a populated soft reference; broken references render
/// as `"Unknown Doctor"`, `"Unknown Patient"`, etc.
pub fn display_name(resolved: Option<String>, entity: &str) -> String {
    match resolved {
        Some(name) if !name.is_empty() => name,
        _ => format!("Unknown {entity}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_before_birthday() {
        assert_eq!(age_from_birth_date(day(2000, 6, 15), day(2024, 6, 14)), 23);
    }

    #[test]
    fn age_on_birthday() {
        assert_eq!(age_from_birth_date(day(2000, 6, 15), day(2024, 6, 15)), 24);
    }

    #[test]
    fn age_after_birthday() {
        assert_eq!(age_from_birth_date(day(2000, 6, 15), day(2024, 11, 2)), 24);
    }

    #[test]
    fn age_earlier_month() {
        assert_eq!(age_from_birth_date(day(2000, 6, 15), day(2024, 2, 20)), 23);
    }

    #[test]
    fn blood_pressure_well_formed() {
        assert_eq!(parse_blood_pressure("120/80"), (120, 80));
        assert_eq!(parse_blood_pressure(" 135 / 85 "), (135, 85));
    }

    #[test]
    fn blood_pressure_malformed_degrades() {
        assert_eq!(parse_blood_pressure("120"), (0, 0));
        assert_eq!(parse_blood_pressure(""), (0, 0));
        assert_eq!(parse_blood_pressure("high/low"), (0, 0));
        assert_eq!(parse_blood_pressure("120/"), (0, 0));
    }

    #[test]
    fn display_name_placeholder() {
        assert_eq!(display_name(None, "Doctor"), "Unknown Doctor");
        assert_eq!(display_name(Some("".into()), "Patient"), "Unknown Patient");
        assert_eq!(
            display_name(Some("Dr. Chen".into()), "Doctor"),
            "Dr. Chen"
        );
    }

    #[test]
    fn time_formatting() {
        let dt = NaiveDateTime::parse_from_str("2025-03-01 09:05:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(format_time(dt), "09:05");
        assert_eq!(format_date(dt.date()), "2025-03-01");
    }
}
