//! Locating the two indicator columns in a report table.
//!
//! The report tables are not laid out consistently across dates, and for some
//! dates the table extraction mangles the header of the critical column. The
//! base rules match the usual headers; the dated overrides below point at the
//! header that ends up above the critical figures on those dates.

use std::{ops::Range, sync::LazyLock};

use chrono::{Datelike, NaiveDate};
use log::{debug, warn};
use regex::Regex;

use crate::{
    attachment::AttachmentKind,
    table::{Cell, Table},
};

/// Rows searched for header text. PDF tables are searched from their first
/// row; a worksheet's first row is its title line and is never searched.
pub fn header_scan_rows(kind: AttachmentKind) -> Range<usize> {
    match kind {
        AttachmentKind::Pdf => 0..10,
        AttachmentKind::Spreadsheet => 1..11,
    }
}

const HOSPITALIZED_HEADER: &str = "入院者数";
const CRITICAL_HEADER: &str = "うち重症者数";

static HIGHCARE_NOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]*)\([0-9]").expect("static regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Hospitalized,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderMatch {
    Contains(&'static str),
    Equals(&'static str),
}

impl HeaderMatch {
    fn matches(&self, header: &str) -> bool {
        match self {
            HeaderMatch::Contains(needle) => header.contains(needle),
            HeaderMatch::Equals(expected) => header == *expected,
        }
    }
}

type Ymd = (i32, u32, u32);

#[derive(Debug, Clone, Copy)]
enum DateSpan {
    Range(Ymd, Ymd),
    On(Ymd),
}

impl DateSpan {
    fn covers(&self, date: NaiveDate) -> bool {
        let ymd = (date.year(), date.month(), date.day());
        match *self {
            DateSpan::Range(from, to) => from <= ymd && ymd <= to,
            DateSpan::On(day) => day == ymd,
        }
    }
}

struct HeaderOverride {
    spans: &'static [DateSpan],
    header: HeaderMatch,
    indicator: Indicator,
}

static HEADER_OVERRIDES: &[HeaderOverride] = &[
    HeaderOverride {
        spans: &[
            DateSpan::Range((2020, 8, 26), (2020, 11, 11)),
            DateSpan::On((2020, 12, 16)),
        ],
        header: HeaderMatch::Contains("最終フェーズにおける即応病床(計画)数(注5)"),
        indicator: Indicator::Critical,
    },
    HeaderOverride {
        spans: &[DateSpan::On((2020, 5, 13))],
        header: HeaderMatch::Equals("(4)自宅療養者数"),
        indicator: Indicator::Critical,
    },
    HeaderOverride {
        spans: &[DateSpan::Range((2020, 11, 18), (2020, 12, 9))],
        header: HeaderMatch::Equals("確保病床数(注4)"),
        indicator: Indicator::Critical,
    },
];

/// Reports whose critical figure carries a high-care footnote, e.g.
/// `123(45)注6`.
const HIGHCARE_NOTE_DATES: &[DateSpan] =
    &[DateSpan::On((2020, 8, 26)), DateSpan::On((2020, 9, 16))];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocatedColumns {
    pub hospitalized: Option<usize>,
    pub critical: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Indicators {
    pub hospitalized: Option<i64>,
    pub critical: Option<i64>,
}

/// Column indices of both indicators for a report published on `date`.
///
/// Base rules keep their first match. Dated overrides always take the latest
/// match, replacing whatever a base rule found.
pub fn locate_columns(table: &Table, date: NaiveDate, kind: AttachmentKind) -> LocatedColumns {
    let scan = header_scan_rows(kind);
    let overrides: Vec<&HeaderOverride> = HEADER_OVERRIDES
        .iter()
        .filter(|rule| rule.spans.iter().any(|span| span.covers(date)))
        .collect();

    let mut located = LocatedColumns::default();
    for (index, column) in table.columns().enumerate() {
        for header in column
            .iter()
            .skip(scan.start)
            .take(scan.len())
            .filter_map(|cell| cell.as_header_text())
        {
            if located.hospitalized.is_none() && header.contains(HOSPITALIZED_HEADER) {
                located.hospitalized = Some(index);
            }
            if located.critical.is_none() && header.contains(CRITICAL_HEADER) {
                located.critical = Some(index);
            }
            for rule in &overrides {
                if rule.header.matches(&header) {
                    match rule.indicator {
                        Indicator::Hospitalized => located.hospitalized = Some(index),
                        Indicator::Critical => located.critical = Some(index),
                    }
                }
            }
        }
    }
    located
}

/// Last non-missing cell of a column with thousands separators removed.
pub fn last_value(table: &Table, column: usize) -> Option<String> {
    table
        .column(column)
        .filter(|cell| !cell.is_missing())
        .last()
        .map(|cell: &Cell| cell.to_value_string().replace(',', ""))
}

/// Digits in front of the parenthesised high-care count.
pub fn strip_highcare_note(value: &str) -> Option<String> {
    if !value.contains('注') {
        return None;
    }
    HIGHCARE_NOTE_RE
        .captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn parse_count(raw: &str) -> Option<i64> {
    match raw.trim().parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            debug!("not an integer: {raw:?}");
            None
        }
    }
}

pub fn extract_indicators(table: &Table, date: NaiveDate, kind: AttachmentKind) -> Indicators {
    let located = locate_columns(table, date, kind);
    debug!("{date}: located columns {located:?}");

    let hospitalized = located
        .hospitalized
        .and_then(|col| last_value(table, col))
        .and_then(|raw| parse_count(&raw));

    let critical = located
        .critical
        .and_then(|col| last_value(table, col))
        .and_then(|raw| {
            if !HIGHCARE_NOTE_DATES.iter().any(|span| span.covers(date)) {
                return Some(raw);
            }
            let stripped = strip_highcare_note(&raw);
            if stripped.is_none() {
                warn!("{date}: expected a high-care footnote in {raw:?}");
            }
            stripped
        })
        .and_then(|raw| parse_count(&raw));

    Indicators {
        hospitalized,
        critical,
    }
}
