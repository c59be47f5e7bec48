// =============================================================================
// normalizers/mod.rs - RAW PAGE TEXT IN, TYPED VALUES OUT
// =============================================================================
//
// Each normalizer takes one raw text fragment scraped from a page region and
// either produces a typed value or says, explicitly, that it could not. None
// of them panic and none of them return errors: garbage in is
// `Normalized::Unparseable(garbage)`, nothing in is `Normalized::Absent`.
//
// The parse functions themselves (`dates::parse_date`, `money::parse_amount`,
// ...) return plain `Option`s so they are easy to test and compose. The
// wrappers in this file lift them into `Normalized` for the assembler.
// =============================================================================

pub mod dates;
pub mod money;
pub mod position;
pub mod text;

use serde::Serialize;

pub use dates::{birth_fields, parse_birthdate_age, parse_date, BirthInfo};
pub use money::{market_value, parse_amount, parse_market_value, transfer_fee};
pub use position::parse_position;
pub use text::{clean, id_from_href, parse_count, parse_decimal, parse_foot, parse_height_cm, parse_season_id};

/// The result of normalizing one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Normalized<T> {
    Value(T),
    /// The page region was not there, or held the site's "unknown" marker.
    Absent,
    /// The region was there but held text we could not read.
    Unparseable(String),
}

impl<T> Normalized<T> {
    /// Run `parse` over a raw fragment. Missing or blank input is `Absent`;
    /// a parser that gives up yields `Unparseable` carrying the raw text.
    pub fn from_raw<F>(raw: Option<&str>, parse: F) -> Self
    where
        F: FnOnce(&str) -> Option<T>,
    {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None => Normalized::Absent,
            Some(text) => match parse(text) {
                Some(value) => Normalized::Value(value),
                None => Normalized::Unparseable(text.to_string()),
            },
        }
    }

    pub fn value(self) -> Option<T> {
        match self {
            Normalized::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_ref(&self) -> Normalized<&T> {
        match self {
            Normalized::Value(v) => Normalized::Value(v),
            Normalized::Absent => Normalized::Absent,
            Normalized::Unparseable(raw) => Normalized::Unparseable(raw.clone()),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Normalized<U> {
        match self {
            Normalized::Value(v) => Normalized::Value(f(v)),
            Normalized::Absent => Normalized::Absent,
            Normalized::Unparseable(raw) => Normalized::Unparseable(raw),
        }
    }

    pub fn is_value(&self) -> bool {
        matches!(self, Normalized::Value(_))
    }

    pub fn is_unparseable(&self) -> bool {
        matches!(self, Normalized::Unparseable(_))
    }
}

impl<T> From<Option<T>> for Normalized<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Normalized::Value(v),
            None => Normalized::Absent,
        }
    }
}

/// Cleaned text. Only ever `Value` or `Absent`.
pub fn text_field(raw: Option<&str>) -> Normalized<String> {
    raw.and_then(clean).into()
}

/// A non-negative count, e.g. "#10", "Squad size: 27", "Seats: 81.365".
pub fn count_field(raw: Option<&str>) -> Normalized<u32> {
    Normalized::from_raw(raw, parse_count)
}
