// =============================================================================
// assembler.rs - NORMALIZED FIELDS IN, RECORD OUT
// =============================================================================
//
// An extractor pulls raw fragments off a page and runs each through a
// normalizer. What comes back is a `Normalized<T>` per field. The assembler
// turns those into plain `Option<T>` record fields while keeping score:
//
//   take(name, v)     Absent is fine (the page simply has no such data)
//   require(name, v)  Absent means the page lost a region it always has
//
// Unparseable is always a miss. When the record is built, any misses turn a
// `Complete` outcome into `Degraded { record, missing }`.
//
// Pure functions over values; no I/O, no page access.
// =============================================================================

use serde::Serialize;

use crate::metrics::OutcomeLabel;
use crate::normalizers::Normalized;

/// What an extractor hands back for one id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome<R> {
    Complete { record: R },
    /// Some fields could not be read. They are `None` in the record and
    /// named in `missing`.
    Degraded { record: R, missing: Vec<String> },
    NotFound,
}

impl<R> Outcome<R> {
    pub fn record(&self) -> Option<&R> {
        match self {
            Outcome::Complete { record } | Outcome::Degraded { record, .. } => Some(record),
            Outcome::NotFound => None,
        }
    }

    pub fn into_record(self) -> Option<R> {
        match self {
            Outcome::Complete { record } | Outcome::Degraded { record, .. } => Some(record),
            Outcome::NotFound => None,
        }
    }

    pub fn missing(&self) -> &[String] {
        match self {
            Outcome::Degraded { missing, .. } => missing,
            _ => &[],
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Outcome::Complete { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Outcome::NotFound)
    }

    pub fn label(&self) -> OutcomeLabel {
        match self {
            Outcome::Complete { .. } => OutcomeLabel::Complete,
            Outcome::Degraded { .. } => OutcomeLabel::Degraded,
            Outcome::NotFound => OutcomeLabel::NotFound,
        }
    }

    pub fn map<U, F: FnOnce(R) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Outcome::Complete { record } => Outcome::Complete { record: f(record) },
            Outcome::Degraded { record, missing } => Outcome::Degraded {
                record: f(record),
                missing,
            },
            Outcome::NotFound => Outcome::NotFound,
        }
    }
}

/// Collects fields for one record and remembers which ones it could not fill.
#[derive(Debug, Default)]
pub struct Assembly {
    missing: Vec<String>,
}

impl Assembly {
    pub fn new() -> Self {
        Self::default()
    }

    fn miss(&mut self, name: &str) {
        if !self.missing.iter().any(|m| m == name) {
            self.missing.push(name.to_string());
        }
    }

    /// An optional field.
    pub fn take<T>(&mut self, name: &str, value: Normalized<T>) -> Option<T> {
        match value {
            Normalized::Value(v) => Some(v),
            Normalized::Absent => None,
            Normalized::Unparseable(_) => {
                self.miss(name);
                None
            }
        }
    }

    /// A field every well-formed page carries.
    pub fn require<T>(&mut self, name: &str, value: Normalized<T>) -> Option<T> {
        match value {
            Normalized::Value(v) => Some(v),
            Normalized::Absent | Normalized::Unparseable(_) => {
                self.miss(name);
                None
            }
        }
    }

    /// Fold in collection rows. A row that produced no record (it had no
    /// identity of its own) is reported as `rows[i]`; a row that came out
    /// degraded contributes `rows[i].field` for each of its misses.
    pub fn rows<R>(&mut self, rows: Vec<Option<(R, Assembly)>>) -> Vec<R> {
        let mut kept = Vec::with_capacity(rows.len());
        for (i, row) in rows.into_iter().enumerate() {
            match row {
                Some((record, assembly)) => {
                    for field in assembly.missing {
                        self.miss(&format!("rows[{}].{}", i, field));
                    }
                    kept.push(record);
                }
                None => self.miss(&format!("rows[{}]", i)),
            }
        }
        kept
    }

    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn finish<R>(self, record: R) -> Outcome<R> {
        if self.missing.is_empty() {
            Outcome::Complete { record }
        } else {
            Outcome::Degraded {
                record,
                missing: self.missing,
            }
        }
    }
}
