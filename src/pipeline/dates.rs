//! Date heuristic: the latest plausible calendar date mentioned in a text.
//!
//! Loan documents repeat older reference dates (origination, prior
//! statements) next to the date the copy was printed or signed. The latest
//! explicit date is the best available proxy for "which copy is newer".
//!
//! ## Layers
//!
//! 1. Formatted dates, most specific pattern first: `MM/DD/YYYY`,
//!    `YYYY-MM-DD`, `Month DD, YYYY`. Every match is parsed strictly
//!    (impossible dates such as `02/30/2023` are dropped) and kept only if
//!    its year lies in `[1990, reference + 1]`.
//! 2. Only when layer 1 finds nothing: bare years `2010`–`2029`, bounded by
//!    `[1990, reference + 2]`, each read as January 1st.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

/// Earliest year considered plausible for a loan document.
pub const MIN_YEAR: i32 = 1990;

static RE_SLASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());

static RE_ISO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").unwrap());

static RE_MONTH_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b",
    )
    .unwrap()
});

static RE_BARE_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(20[12]\d)\b").unwrap());

/// Latest date in `text`, with the plausibility window anchored on the
/// current calendar year.
pub fn latest_date(text: &str) -> Option<NaiveDate> {
    latest_date_as_of(text, chrono::Local::now().year())
}

/// Latest date in `text`, with the plausibility window anchored on
/// `reference_year`.
pub fn latest_date_as_of(text: &str, reference_year: i32) -> Option<NaiveDate> {
    formatted_dates(text, reference_year)
        .max()
        .or_else(|| bare_years(text, reference_year).max())
}

fn formatted_dates(text: &str, reference_year: i32) -> impl Iterator<Item = NaiveDate> + '_ {
    let slash = RE_SLASH.captures_iter(text).filter_map(|c| {
        ymd(&c[3], &c[1], &c[2])
    });
    let iso = RE_ISO.captures_iter(text).filter_map(|c| {
        ymd(&c[1], &c[2], &c[3])
    });
    let named = RE_MONTH_NAME.captures_iter(text).filter_map(|c| {
        let month = month_number(&c[1])?;
        let day: u32 = c[2].parse().ok()?;
        let year: i32 = c[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)
    });

    slash
        .chain(iso)
        .chain(named)
        .filter(move |d| (MIN_YEAR..=reference_year + 1).contains(&d.year()))
}

fn bare_years(text: &str, reference_year: i32) -> impl Iterator<Item = NaiveDate> + '_ {
    RE_BARE_YEAR
        .captures_iter(text)
        .filter_map(|c| c[1].parse::<i32>().ok())
        .filter(move |y| (MIN_YEAR..=reference_year + 2).contains(y))
        .filter_map(|y| NaiveDate::from_ymd_opt(y, 1, 1))
}

/// Strict numeric construction; out-of-range months or days yield `None`.
fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn month_number(name: &str) -> Option<u32> {
    let prefix: String = name.chars().take(3).collect::<String>().to_ascii_lowercase();
    let n = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(n)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn picks_latest_slash_date() {
        let text = "Originated 03/15/2023. Printed 04/20/2023.";
        assert_eq!(latest_date_as_of(text, 2024), Some(d(2023, 4, 20)));
    }

    #[test]
    fn bare_year_falls_back_to_january_first() {
        assert_eq!(
            latest_date_as_of("Tax year 2022 summary", 2024),
            Some(d(2022, 1, 1))
        );
    }

    #[test]
    fn no_date_tokens_is_absent() {
        assert_eq!(latest_date_as_of("Borrower signature page", 2024), None);
    }

    #[test]
    fn iso_and_month_name_dates() {
        let text = "Effective 2021-06-30, signed July 4th, 2021 and Aug. 2 2021";
        assert_eq!(latest_date_as_of(text, 2024), Some(d(2021, 8, 2)));
    }

    #[test]
    fn impossible_dates_are_rejected() {
        assert_eq!(latest_date_as_of("Due 02/30/2023", 2024), Some(d(2023, 1, 1)));
        assert_eq!(latest_date_as_of("Ref 13/01/2008", 2024), None);
    }

    #[test]
    fn formatted_dates_outside_window_are_ignored() {
        let text = "Deed recorded 05/01/1985, reissued 05/01/2020, maturity 05/01/2050";
        assert_eq!(latest_date_as_of(text, 2024), Some(d(2020, 5, 1)));
    }

    #[test]
    fn formatted_date_suppresses_year_fallback() {
        // The bare 2028 would win if the fallback layer ran.
        let text = "Statement 01/31/2023 projection through 2028";
        assert_eq!(latest_date_as_of(text, 2024), Some(d(2023, 1, 31)));
    }

    #[test]
    fn bare_years_respect_both_windows() {
        assert_eq!(latest_date_as_of("since 2009", 2024), None);
        assert_eq!(latest_date_as_of("2026 outlook", 2024), Some(d(2026, 1, 1)));
        assert_eq!(latest_date_as_of("2027 outlook", 2024), None);
    }

    #[test]
    fn next_year_formatted_date_allowed() {
        assert_eq!(latest_date_as_of("01/02/2025", 2024), Some(d(2025, 1, 2)));
        assert_eq!(latest_date_as_of("01/02/2026", 2024), Some(d(2026, 1, 1)));
    }

    #[test]
    fn month_names_are_case_insensitive() {
        assert_eq!(
            latest_date_as_of("SEPTEMBER 9, 2019", 2024),
            Some(d(2019, 9, 9))
        );
    }

    #[test]
    fn current_year_wrapper_finds_dates() {
        assert_eq!(latest_date("Closing date 03/15/2023"), Some(d(2023, 3, 15)));
    }
}
