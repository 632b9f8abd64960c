//! Answer-key matching for objective questions.
//!
//! Keys may list several accepted literals separated by `/`
//! (`"ten / 10"`); a match against any of them counts.

use serde::{Deserialize, Serialize};

/// How a candidate answer is compared with its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Normalized equality, falling back to [`MatchMode::NumericLoose`].
    Word,
    /// Compare with spaces, hyphens and parentheses removed.
    NumericLoose,
    /// Case-insensitive literal comparison with no fallback. Used for
    /// true/false/not-given questions.
    Strict,
}

/// Normalize free text for comparison: smart quotes and dashes to ASCII,
/// lowercase, trimmed, internal whitespace collapsed to single spaces.
pub fn normalize(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' | '\u{2032}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' | '\u{2033}' => '"',
            '\u{2013}' | '\u{2014}' | '\u{2212}' => '-',
            other => other,
        })
        .collect();
    mapped
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip the separators people type inconsistently in phone numbers,
/// codes and quantities.
fn loosen(normalized: &str) -> String {
    normalized
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect()
}

/// Split a key into its accepted alternatives, dropping empty ones.
pub fn alternatives(key: &str) -> impl Iterator<Item = &str> {
    key.split('/').map(str::trim).filter(|a| !a.is_empty())
}

/// Decide whether `given` matches `key` under `mode`.
///
/// Empty or whitespace-only input is always incorrect.
pub fn is_correct(given: &str, key: &str, mode: MatchMode) -> bool {
    let given = normalize(given);
    if given.is_empty() {
        return false;
    }

    match mode {
        MatchMode::Strict => alternatives(key).any(|alt| normalize(alt) == given),
        MatchMode::Word => {
            alternatives(key).any(|alt| normalize(alt) == given)
                || loose_match(&given, key)
        }
        MatchMode::NumericLoose => loose_match(&given, key),
    }
}

fn loose_match(given_normalized: &str, key: &str) -> bool {
    let given = loosen(given_normalized);
    if given.is_empty() {
        return false;
    }
    alternatives(key).any(|alt| loosen(&normalize(alt)) == given)
}
