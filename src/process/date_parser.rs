use chrono::{Datelike, NaiveDate, NaiveDateTime};

const DATE_FORMATS: &[&str] = &["%d-%b-%Y", "%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

/// Parse a report-period date as the SEC writes it (`31-MAR-2023`) or in the
/// common ISO / US / compact forms.
pub fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    // YYYYMMDD; chrono's %Y would swallow all eight digits
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let year: i32 = s[0..4].parse().ok()?;
        let month: u32 = s[4..6].parse().ok()?;
        let day: u32 = s[6..8].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    let titled = title_case_words(s);
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&titled, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
}

/// Calendar year of a report-period date, if it parses.
pub fn report_year(raw: &str) -> Option<i32> {
    parse_report_date(raw).map(|d| d.year())
}

/// `31-MAR-2023` → `31-Mar-2023`
fn title_case_words(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_ascii_alphabetic() {
            out.push(if in_word {
                c.to_ascii_lowercase()
            } else {
                c.to_ascii_uppercase()
            });
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sec_and_iso_dates() {
        let q1 = NaiveDate::from_ymd_opt(2023, 3, 31).unwrap();
        assert_eq!(parse_report_date("31-MAR-2023"), Some(q1));
        assert_eq!(parse_report_date("31-mar-2023"), Some(q1));
        assert_eq!(parse_report_date("2023-03-31"), Some(q1));
        assert_eq!(parse_report_date("2023-03-31 00:00:00"), Some(q1));
        assert_eq!(parse_report_date("03/31/2023"), Some(q1));
        assert_eq!(parse_report_date("20230331"), Some(q1));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(report_year(""), None);
        assert_eq!(report_year("N/A"), None);
        assert_eq!(report_year("2023-13-45"), None);
        assert_eq!(report_year("30-FEB-2023"), None);
        assert_eq!(report_year("31-DEC-2024"), Some(2024));
    }
}
