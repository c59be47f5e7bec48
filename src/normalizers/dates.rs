// =============================================================================
// normalizers/dates.rs - BIRTHDATES, AGES AND OTHER CALENDAR DATES
// =============================================================================
//
// The profile header renders the date of birth with the age glued on:
//
//   "Mar 20, 1998 (27)"      english site
//   "20.03.1998 (27)"        german site
//   "20/03/1998(27)"         several others
//   "20 de mar. de 1998 (27)"
//
// Date and age are two separate matches over two disjoint pieces of the
// string. The parenthesised age is found first and cut out; whatever is left
// is handed to the date parser. Either half can fail without taking the other
// down with it.
// =============================================================================

use std::ops::Range;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

use super::Normalized;

const MAX_AGE: u32 = 130;

static AGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\(\s*(\d{1,3})\s*\)").expect("age pattern compiles"));

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("iso date pattern compiles"));

static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})[./-](\d{1,2})[./-](\d{4})\b").expect("numeric date pattern compiles")
});

// "Mar 20, 1998", "March 20 1998"
static MONTH_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\p{L}+)\.?\s+(\d{1,2}),?\s+(\d{4})\b").expect("month-first pattern compiles")
});

// "20. März 1998", "20 mars 1998", "20 de mar. de 1998"
static DAY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\.?\s+(?:de\s+)?(\p{L}+)\.?\s+(?:de\s+)?(\d{4})\b")
        .expect("day-first pattern compiles")
});

/// Date and age as recovered from one birthdate fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BirthInfo {
    pub date: Option<NaiveDate>,
    pub age: Option<u32>,
}

/// Month number for an English, German, Spanish, French, Italian or
/// Portuguese month name or abbreviation.
fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_lowercase();
    let month = match lower.as_str() {
        "jan" | "january" | "januar" | "jän" | "jänner" | "ene" | "enero" | "janv" | "janvier"
        | "gen" | "gennaio" | "janeiro" => 1,
        "feb" | "february" | "februar" | "febrero" | "févr" | "fév" | "fevr" | "février" | "fevrier"
        | "febbraio" | "fev" | "fevereiro" => 2,
        "mar" | "march" | "mär" | "märz" | "marz" | "marzo" | "mars" | "março" | "marco" => 3,
        "apr" | "april" | "abr" | "abril" | "avr" | "avril" | "aprile" => 4,
        "may" | "mai" | "mayo" | "mag" | "maggio" | "maio" => 5,
        "jun" | "june" | "juni" | "junio" | "juin" | "giu" | "giugno" | "junho" => 6,
        "jul" | "july" | "juli" | "julio" | "juil" | "juillet" | "lug" | "luglio" | "julho" => 7,
        "aug" | "august" | "ago" | "agosto" | "août" | "aout" => 8,
        "sep" | "sept" | "september" | "septiembre" | "set" | "septembre" | "settembre"
        | "setembro" => 9,
        "oct" | "october" | "okt" | "oktober" | "octubre" | "octobre" | "ott" | "ottobre" | "out"
        | "outubro" => 10,
        "nov" | "november" | "noviembre" | "novembre" | "novembro" => 11,
        "dec" | "december" | "dez" | "dezember" | "dic" | "diciembre" | "déc" | "décembre"
        | "decembre" | "dicembre" | "dezembro" => 12,
        _ => return None,
    };
    Some(month)
}

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

/// Parse a calendar date in any of the layouts the site uses.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let text = raw.trim().trim_start_matches(['°', '*', '†']).trim();
    if text.is_empty() {
        return None;
    }

    if let Some(c) = ISO_DATE.captures(text) {
        return ymd(&c[1], c[2].parse().ok()?, &c[3]);
    }
    if let Some(c) = NUMERIC_DATE.captures(text) {
        return ymd(&c[3], c[2].parse().ok()?, &c[1]);
    }
    if let Some(c) = MONTH_FIRST.captures(text) {
        if let Some(month) = month_from_name(&c[1]) {
            return ymd(&c[3], month, &c[2]);
        }
    }
    if let Some(c) = DAY_FIRST.captures(text) {
        if let Some(month) = month_from_name(&c[2]) {
            return ymd(&c[3], month, &c[1]);
        }
    }
    None
}

/// The parenthesised age and the byte range it occupies.
fn find_age(raw: &str) -> Option<(Option<u32>, Range<usize>)> {
    let caps = AGE.captures(raw)?;
    let span = caps.get(0)?.range();
    let age = caps[1].parse::<u32>().ok().filter(|a| *a <= MAX_AGE);
    Some((age, span))
}

/// Split a birthdate fragment into its date and age halves.
pub fn parse_birthdate_age(raw: &str) -> BirthInfo {
    let (age, date_text) = match find_age(raw) {
        Some((age, span)) => {
            let mut rest = String::with_capacity(raw.len());
            rest.push_str(&raw[..span.start]);
            rest.push(' ');
            rest.push_str(&raw[span.end..]);
            (age, rest)
        }
        None => (None, raw.to_string()),
    };

    BirthInfo {
        date: parse_date(&date_text),
        age,
    }
}

/// Birthdate and age as assembler fields.
///
/// A birthdate region that yields no date is `Unparseable`. A missing age is
/// only `Absent` (retired and deceased players have none); an age that is
/// there but out of range is `Unparseable`.
pub fn birth_fields(raw: Option<&str>) -> (Normalized<NaiveDate>, Normalized<u32>) {
    let Some(text) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return (Normalized::Absent, Normalized::Absent);
    };

    let info = parse_birthdate_age(text);
    let date = match info.date {
        Some(d) => Normalized::Value(d),
        None => Normalized::Unparseable(text.to_string()),
    };
    let age = match (info.age, find_age(text)) {
        (Some(a), _) => Normalized::Value(a),
        (None, Some(_)) => Normalized::Unparseable(text.to_string()),
        (None, None) => Normalized::Absent,
    };
    (date, age)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_english_date_with_age() {
        let info = parse_birthdate_age("Mar 20, 1998 (27)");
        assert_eq!(info.date, Some(d(1998, 3, 20)));
        assert_eq!(info.age, Some(27));
    }

    #[test]
    fn test_date_without_age() {
        let info = parse_birthdate_age("Mar 20, 1998");
        assert_eq!(info.date, Some(d(1998, 3, 20)));
        assert_eq!(info.age, None);
    }

    #[test]
    fn test_dotted_date_with_glued_age() {
        let info = parse_birthdate_age("20.03.1998(27)");
        assert_eq!(info.date, Some(d(1998, 3, 20)));
        assert_eq!(info.age, Some(27));
    }

    #[test]
    fn test_malformed_yields_nothing() {
        assert_eq!(parse_birthdate_age("unknown"), BirthInfo::default());
        assert_eq!(parse_birthdate_age("(abc) 1998"), BirthInfo::default());
    }

    #[test]
    fn test_age_without_date() {
        let info = parse_birthdate_age("?? (31)");
        assert_eq!(info.date, None);
        assert_eq!(info.age, Some(31));
    }

    #[test]
    fn test_localized_layouts() {
        assert_eq!(parse_date("20. März 1998"), Some(d(1998, 3, 20)));
        assert_eq!(parse_date("20 de mar. de 1998"), Some(d(1998, 3, 20)));
        assert_eq!(parse_date("20 mars 1998"), Some(d(1998, 3, 20)));
        assert_eq!(parse_date("Dez 1, 2001"), Some(d(2001, 12, 1)));
        assert_eq!(parse_date("20/03/1998"), Some(d(1998, 3, 20)));
        assert_eq!(parse_date("20-03-1998"), Some(d(1998, 3, 20)));
        assert_eq!(parse_date("1998-03-20"), Some(d(1998, 3, 20)));
        assert_eq!(parse_date("* 20.03.1998"), Some(d(1998, 3, 20)));
        assert_eq!(parse_date("September 3, 2004"), Some(d(2004, 9, 3)));
    }

    #[test]
    fn test_impossible_dates_are_rejected() {
        assert_eq!(parse_date("31.02.1998"), None);
        assert_eq!(parse_date("Foo 20, 1998"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_out_of_range_age_is_dropped() {
        let info = parse_birthdate_age("Mar 20, 1998 (999)");
        assert_eq!(info.date, Some(d(1998, 3, 20)));
        assert_eq!(info.age, None);
    }

    #[test]
    fn test_birth_fields_degradation() {
        let (date, age) = birth_fields(Some("Mar 20, 1998"));
        assert_eq!(date, Normalized::Value(d(1998, 3, 20)));
        assert_eq!(age, Normalized::Absent);

        let (date, age) = birth_fields(Some("garbage"));
        assert!(date.is_unparseable());
        assert_eq!(age, Normalized::Absent);

        let (date, age) = birth_fields(None);
        assert_eq!(date, Normalized::Absent);
        assert_eq!(age, Normalized::Absent);

        let (_, age) = birth_fields(Some("Mar 20, 1998 (400)"));
        assert!(age.is_unparseable());
    }
}
