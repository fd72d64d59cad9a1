//! Page range parsing.
//!
//! Turns user-typed expressions such as `"1, 3-5, 10-end"` into validated,
//! 1-indexed page intervals. Parsing is forgiving: a malformed or
//! out-of-bounds token is dropped and the rest of the expression still counts.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Keywords that stand for the last page on the right side of a range.
pub const DEFAULT_END_KEYWORDS: &[&str] = &["end", "son"];

/// An inclusive, 1-indexed page interval.
///
/// Always satisfies `1 <= start <= end <= total_pages` for the document it was
/// validated against. Deserialized intervals are checked for `1 <= start <= end`;
/// the upper bound is checked when the interval meets a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval")]
pub struct PageInterval {
    start: u32,
    end: u32,
}

#[derive(Deserialize)]
struct RawInterval {
    start: u32,
    end: u32,
}

impl TryFrom<RawInterval> for PageInterval {
    type Error = String;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        if raw.start >= 1 && raw.start <= raw.end {
            Ok(Self {
                start: raw.start,
                end: raw.end,
            })
        } else {
            Err(format!("invalid page interval {}-{}", raw.start, raw.end))
        }
    }
}

impl PageInterval {
    /// Validate an interval against a document with `total_pages` pages.
    pub fn new(start: u32, end: u32, total_pages: u32) -> Option<Self> {
        if start >= 1 && start <= end && end <= total_pages {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Single-page interval.
    pub fn single(page: u32, total_pages: u32) -> Option<Self> {
        Self::new(page, page, total_pages)
    }

    /// First page (1-indexed).
    pub fn start(&self) -> u32 {
        self.start
    }

    /// Last page (1-indexed, inclusive).
    pub fn end(&self) -> u32 {
        self.end
    }

    /// Number of pages covered.
    pub fn len(&self) -> u32 {
        self.end - self.start + 1
    }

    /// Intervals are never empty.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// 1-indexed page numbers in the interval.
    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }

    /// 0-indexed page indices, as handed to the document library.
    pub fn indices(&self) -> Vec<usize> {
        self.pages().map(|p| (p - 1) as usize).collect()
    }
}

impl fmt::Display for PageInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Intervals sorted ascending by start page.
///
/// Overlapping and duplicate intervals are kept as separate entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<PageInterval>", into = "Vec<PageInterval>")]
pub struct RangeSet {
    intervals: Vec<PageInterval>,
}

impl From<Vec<PageInterval>> for RangeSet {
    fn from(intervals: Vec<PageInterval>) -> Self {
        Self::from_intervals(intervals)
    }
}

impl From<RangeSet> for Vec<PageInterval> {
    fn from(set: RangeSet) -> Self {
        set.intervals
    }
}

impl RangeSet {
    /// Build a set from intervals, sorting them (stably) by start page.
    pub fn from_intervals(mut intervals: Vec<PageInterval>) -> Self {
        intervals.sort_by_key(|i| i.start);
        Self { intervals }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PageInterval> {
        self.intervals.iter()
    }

    pub fn as_slice(&self) -> &[PageInterval] {
        &self.intervals
    }

    /// Every selected page in set order, repeats included.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.intervals.iter().flat_map(|i| i.pages()).collect()
    }

    /// Canonical `start-end` form, comma separated.
    pub fn to_canonical_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, interval) in self.intervals.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{interval}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a RangeSet {
    type Item = &'a PageInterval;
    type IntoIter = std::slice::Iter<'a, PageInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}

/// Range expression parser with a configurable set of end-of-document keywords.
#[derive(Debug, Clone)]
pub struct RangeParser {
    end_keywords: Vec<String>,
}

impl RangeParser {
    /// Create a parser that recognizes the default end keywords.
    pub fn new() -> Self {
        Self {
            end_keywords: DEFAULT_END_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    /// Replace the end-of-document keywords (matched case-insensitively).
    pub fn with_end_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.end_keywords = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .collect();
        self
    }

    /// Parse `input` against a document of `max_pages` pages.
    pub fn parse(&self, input: &str, max_pages: u32) -> RangeSet {
        let intervals = input
            .split(',')
            .map(str::trim)
            .filter_map(|token| {
                let interval = self.parse_token(token, max_pages);
                if interval.is_none() && !token.is_empty() {
                    trace!("Dropping range token {:?} (max {} pages)", token, max_pages);
                }
                interval
            })
            .collect();

        RangeSet::from_intervals(intervals)
    }

    fn parse_token(&self, token: &str, max_pages: u32) -> Option<PageInterval> {
        if token.contains('-') {
            let mut parts = token.split('-').map(str::trim);
            let start = leading_integer(parts.next()?)?;
            let end_str = parts.next()?;
            let end = if self.is_end_keyword(end_str) {
                max_pages
            } else {
                leading_integer(end_str)?
            };
            PageInterval::new(start, end, max_pages)
        } else {
            PageInterval::single(leading_integer(token)?, max_pages)
        }
    }

    fn is_end_keyword(&self, s: &str) -> bool {
        let lower = s.to_lowercase();
        self.end_keywords.iter().any(|k| *k == lower)
    }
}

impl Default for RangeParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a range expression with the default end keywords.
pub fn parse_ranges(input: &str, max_pages: u32) -> RangeSet {
    RangeParser::new().parse(input, max_pages)
}

/// Leading decimal digits of `s` as an integer (`"12abc"` -> 12).
///
/// Returns `None` when `s` does not start with a digit or the value does not
/// fit in a `u32`. A leading `+` is accepted; a leading `-` never reaches this
/// point because the caller splits on dashes.
fn leading_integer(s: &str) -> Option<u32> {
    let s = s.strip_prefix('+').unwrap_or(s);
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok()
}
