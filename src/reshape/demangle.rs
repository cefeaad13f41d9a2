//! Parsing of wide-format column names.
//!
//! The raw dump encodes up to four HOA fee slots per property by mangling a
//! slot index into the column name, e.g. `HOA1FeeValue` or `Fee1HOA2`. The
//! demangler normalizes every such name to `<base>HOA_<slot>` so the
//! reshaper can group repeated attributes by their `<base>HOA_` stub.

/// Parse a wide column name into its base attribute and slot index
///
/// Matches only the literal token `HOA` immediately followed by a single
/// digit 1-4; digits elsewhere in the name are left alone. The base is the
/// name with the matched token removed (the `HOA` literal is re-attached by
/// [`demangle_name`]).
#[must_use]
pub fn parse_wide_name(name: &str) -> Option<(String, u8)> {
    for (idx, _) in name.match_indices("HOA") {
        let rest = &name.as_bytes()[idx + 3..];
        if let Some(&digit) = rest.first() {
            if (b'1'..=b'4').contains(&digit) {
                let base = format!("{}{}", &name[..idx], &name[idx + 4..]);
                return Some((base, digit - b'0'));
            }
        }
    }
    None
}

/// Normalize one wide column name to `<base>HOA_<slot>` form
///
/// Names without a slot token pass through unchanged.
#[must_use]
pub fn demangle_name(name: &str) -> String {
    match parse_wide_name(name) {
        Some((base, slot)) => format!("{base}HOA_{slot}"),
        None => name.to_string(),
    }
}

/// Normalize a full column list, preserving order
#[must_use]
pub fn demangle_columns(names: &[String]) -> Vec<String> {
    names.iter().map(|name| demangle_name(name)).collect()
}

/// Parse a demangled column name back into (base attribute, slot index)
///
/// Inverse of [`demangle_name`] for names that carried a slot token.
#[must_use]
pub fn parse_long_name(name: &str) -> Option<(&str, u8)> {
    let stem = name.strip_suffix(|c: char| c.is_ascii_digit())?;
    let base = stem.strip_suffix("HOA_")?;
    let digit = name.as_bytes()[name.len() - 1];
    (b'1'..=b'4').contains(&digit).then_some((base, digit - b'0'))
}
