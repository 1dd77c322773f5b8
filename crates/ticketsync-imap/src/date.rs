//! IMAP date formatting.
//!
//! SEARCH date criteria use the RFC 3501 `date` production:
//! `date-day "-" date-month "-" date-year`, with the day not zero-padded.

use chrono::{Datelike, NaiveDate};

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Formats a date as `D-Mon-YYYY` (for example `5-Jan-2024`).
#[must_use]
pub fn format_imap_date(date: NaiveDate) -> String {
    format!(
        "{}-{}-{}",
        date.day(),
        MONTHS[date.month0() as usize],
        date.year()
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_single_digit_day() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(format_imap_date(date), "5-Jan-2024");
    }

    #[test]
    fn test_end_of_year() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 31).unwrap();
        assert_eq!(format_imap_date(date), "31-Dec-2024");
    }

    proptest! {
        #[test]
        fn prop_round_trips_through_chrono(days in 0i64..40_000) {
            let base = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            let date = base + chrono::Duration::days(days);
            let formatted = format_imap_date(date);
            let parsed = NaiveDate::parse_from_str(&formatted, "%d-%b-%Y").unwrap();
            prop_assert_eq!(parsed, date);
            prop_assert!(!formatted.starts_with('0'));
        }
    }
}
