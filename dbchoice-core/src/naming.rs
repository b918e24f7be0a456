//! Identifier rules for enum members

use once_cell::sync::Lazy;
use regex::Regex;

static IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\p{XID_Start}_]\p{XID_Continue}*$").unwrap());

/// Whether `name` can be used verbatim as an enum member identifier.
///
/// Follows Unicode identifier syntax: a letter or `_`, then letters, digits,
/// and connector punctuation.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Derive the member identifier for a stored `value`.
///
/// ASCII letters are uppercased and every other non-alphanumeric character
/// becomes `_`. Results that are empty or start with a digit get `guard`
/// prepended.
pub fn member_identifier(value: &str, guard: &str) -> String {
    let slug: String = value
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();

    match slug.chars().next() {
        None => guard.to_string(),
        Some(c) if c.is_ascii_digit() => format!("{}{}", guard, slug),
        Some(_) => slug,
    }
}
