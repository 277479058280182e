//! Culture descriptors for locale-aware value rendering.
//!
//! A [`Culture`] is a normalized locale tag plus the handful of conventions
//! that bindings need when they turn numbers into text (or text back into
//! numbers): the decimal separator and the digit-group separator.
//!
//! # Invariants
//!
//! 1. A `Culture` name is always a normalized tag (`"de-CH"`, never
//!    `"de_CH.UTF-8"`). The invariant culture has an empty name.
//! 2. Separators are derived from the tag alone; two cultures with the same
//!    name compare equal.
//! 3. Normalization never fails: unusable tags collapse to `"en"`.

use core::fmt;

/// Locale identifier (e.g., `"en"`, `"en-US"`, `"fr-CA"`).
pub type Locale = String;

/// Number-rendering conventions for one locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Culture {
    name: Locale,
    decimal_separator: char,
    group_separator: char,
}

impl Culture {
    /// Build a culture from a locale tag.
    ///
    /// The tag is normalized first; see [`normalize_locale`].
    #[must_use]
    pub fn new(tag: &str) -> Self {
        let name = normalize_locale(tag).unwrap_or_else(|| "en".to_string());
        let (decimal_separator, group_separator) = separators_for(&name);
        Self {
            name,
            decimal_separator,
            group_separator,
        }
    }

    /// The culture-neutral conventions: `.` for decimals, `,` for groups.
    #[must_use]
    pub fn invariant() -> Self {
        Self {
            name: Locale::new(),
            decimal_separator: '.',
            group_separator: ',',
        }
    }

    /// Normalized locale tag. Empty for the invariant culture.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Primary language subtag (`"pt"` for `"pt-BR"`).
    #[must_use]
    pub fn language(&self) -> &str {
        self.name.split('-').next().unwrap_or("")
    }

    #[must_use]
    pub fn decimal_separator(&self) -> char {
        self.decimal_separator
    }

    #[must_use]
    pub fn group_separator(&self) -> char {
        self.group_separator
    }

    #[must_use]
    pub fn is_invariant(&self) -> bool {
        self.name.is_empty()
    }

    /// Rewrite a culture-formatted decimal string into the `.`-separated
    /// form Rust's parsers accept. Group separators are dropped.
    #[must_use]
    pub fn delocalize_number(&self, text: &str) -> String {
        text.trim()
            .chars()
            .filter(|&c| c != self.group_separator)
            .map(|c| if c == self.decimal_separator { '.' } else { c })
            .collect()
    }
}

impl Default for Culture {
    fn default() -> Self {
        Self::invariant()
    }
}

impl fmt::Display for Culture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            f.write_str("(invariant)")
        } else {
            f.write_str(&self.name)
        }
    }
}

/// Normalize a raw locale string as found in `LANG`/`LC_ALL`.
///
/// Strips the encoding (`.UTF-8`) and modifier (`@euro`) suffixes, turns
/// `_` into `-`, and maps `C`/`POSIX` to `"en"`. Returns `None` for blank
/// input.
#[must_use]
pub fn normalize_locale(raw: &str) -> Option<Locale> {
    let raw = raw.trim();
    let raw = raw.split('@').next().unwrap_or(raw);
    let raw = raw.split('.').next().unwrap_or(raw).trim();
    if raw.is_empty() {
        return None;
    }
    if raw.eq_ignore_ascii_case("c") || raw.eq_ignore_ascii_case("posix") {
        return Some("en".to_string());
    }
    Some(raw.replace('_', "-"))
}

fn separators_for(tag: &str) -> (char, char) {
    let mut parts = tag.split('-');
    let language = parts.next().unwrap_or("").to_ascii_lowercase();
    let region = parts.next().unwrap_or("").to_ascii_uppercase();

    match (language.as_str(), region.as_str()) {
        ("de", "CH") | ("it", "CH") => ('.', '\''),
        ("de" | "es" | "it" | "nl" | "pt" | "tr" | "id" | "da", _) => (',', '.'),
        ("fr" | "ru" | "pl" | "cs" | "sv" | "fi" | "nb" | "uk" | "sk", _) => (',', ' '),
        _ => ('.', ','),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_encoding_and_modifier() {
        assert_eq!(normalize_locale("fr_FR.UTF-8"), Some("fr-FR".into()));
        assert_eq!(normalize_locale("de_DE@euro"), Some("de-DE".into()));
        assert_eq!(normalize_locale("  en_US  "), Some("en-US".into()));
    }

    #[test]
    fn normalize_posix_is_english() {
        assert_eq!(normalize_locale("C"), Some("en".into()));
        assert_eq!(normalize_locale("POSIX"), Some("en".into()));
        assert_eq!(normalize_locale("C.UTF-8"), Some("en".into()));
    }

    #[test]
    fn normalize_blank_is_none() {
        assert_eq!(normalize_locale(""), None);
        assert_eq!(normalize_locale(".UTF-8"), None);
    }

    #[test]
    fn separators_follow_language() {
        let en = Culture::new("en-US");
        assert_eq!((en.decimal_separator(), en.group_separator()), ('.', ','));

        let de = Culture::new("de_DE.UTF-8");
        assert_eq!(de.name(), "de-DE");
        assert_eq!((de.decimal_separator(), de.group_separator()), (',', '.'));

        let fr = Culture::new("fr");
        assert_eq!((fr.decimal_separator(), fr.group_separator()), (',', ' '));

        let ch = Culture::new("de-CH");
        assert_eq!((ch.decimal_separator(), ch.group_separator()), ('.', '\''));
    }

    #[test]
    fn invariant_culture() {
        let inv = Culture::invariant();
        assert!(inv.is_invariant());
        assert_eq!(inv.name(), "");
        assert_eq!(inv.to_string(), "(invariant)");
        assert_eq!(Culture::default(), inv);
    }

    #[test]
    fn language_subtag() {
        assert_eq!(Culture::new("pt-BR").language(), "pt");
        assert_eq!(Culture::new("ja").language(), "ja");
    }

    #[test]
    fn delocalize_number_uses_culture_separators() {
        let de = Culture::new("de");
        assert_eq!(de.delocalize_number("1.234,5"), "1234.5");
        let en = Culture::new("en");
        assert_eq!(en.delocalize_number(" 1,234.5 "), "1234.5");
    }
}
