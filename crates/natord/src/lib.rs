//! Natural-order string comparison.
//!
//! Splits each string into maximal digit runs and maximal non-digit runs and
//! compares the runs pairwise, so that `"page2"` sorts before `"page10"`
//! where plain lexicographic comparison would not. Digit runs are compared by
//! numeric value at arbitrary precision — leading zeros are stripped and the
//! remaining digits compared by length, then position — so a pathological
//! filename with a hundred-digit sequence can never overflow an integer
//! parse.

use std::cmp::Ordering;

/// Whether text runs are compared with or without case folding.
///
/// Digit runs always compare numerically regardless of this setting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CaseSensitivity {
    Sensitive,
    /// Case folding via [`char::to_lowercase`] (the default, and what the
    /// library path ordering uses).
    #[default]
    Insensitive,
}

/// Compare two strings in natural order, case-insensitively.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
///
/// assert_eq!(longbox_natord::compare("page2", "page10"), Ordering::Less);
/// assert_eq!(longbox_natord::compare("Tome 3", "tome 03"), Ordering::Equal);
/// ```
pub fn compare(a: &str, b: &str) -> Ordering {
    compare_with(a, b, CaseSensitivity::Insensitive)
}

/// Compare two strings in natural order with the requested case sensitivity.
///
/// Rules, applied to each pair of runs in turn:
///
/// - two digit runs compare by numeric value (arbitrary precision);
/// - a digit run sorts before a text run at the same position;
/// - two text runs compare code point by code point, folded when insensitive;
/// - if every compared run is equal, the shorter string sorts first.
pub fn compare_with(a: &str, b: &str, case: CaseSensitivity) -> Ordering {
    let mut left = Runs::new(a);
    let mut right = Runs::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(Run::Digits(x)), Some(Run::Digits(y))) => {
                let ord = compare_digit_runs(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            },
            // Numbers sort before text at the same position.
            (Some(Run::Digits(_)), Some(Run::Text(_))) => return Ordering::Less,
            (Some(Run::Text(_)), Some(Run::Digits(_))) => return Ordering::Greater,
            (Some(Run::Text(x)), Some(Run::Text(y))) => {
                let ord = compare_text_runs(x, y, case);
                if ord != Ordering::Equal {
                    return ord;
                }
            },
        }
    }
}

enum Run<'a> {
    Digits(&'a str),
    Text(&'a str),
}

/// Iterator over the maximal digit/non-digit runs of a string.
///
/// Only ASCII digits form numeric runs. Other Unicode digits (Arabic-Indic,
/// fullwidth, ...) stay in text runs and compare by code point: filenames mix
/// numbering systems rarely enough that guessing a numeric value for them
/// causes more surprises than it prevents.
struct Runs<'a> {
    rest: &'a str,
}
impl<'a> Runs<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}
impl<'a> Iterator for Runs<'a> {
    type Item = Run<'a>;
    fn next(&mut self) -> Option<Run<'a>> {
        let first = self.rest.chars().next()?;
        let digits = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digits)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (run, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(if digits { Run::Digits(run) } else { Run::Text(run) })
    }
}

/// Numeric comparison of two all-digit runs without parsing them into a
/// fixed-width integer.
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    // More significant digits wins; equal widths compare positionally.
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn compare_text_runs(a: &str, b: &str, case: CaseSensitivity) -> Ordering {
    match case {
        CaseSensitivity::Sensitive => a.cmp(b),
        CaseSensitivity::Insensitive => {
            a.chars().flat_map(char::to_lowercase).cmp(b.chars().flat_map(char::to_lowercase))
        },
    }
}
