//! Case and diacritic folding.
//!
//! All fuzzy comparisons in the pipeline happen over a folded form: NFD
//! decomposition, combining marks removed, lowercased. The folded form is
//! what variant keys, phonetic candidates and the diacritics-restore map are
//! indexed by.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Fold a string: NFD, strip combining marks, lowercase.
pub fn fold(s: &str) -> String {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Fold a string while keeping a 1:1 char alignment with the input.
///
/// Each input char maps to exactly one output char (its decomposed base
/// letter, lowercased), so char offsets found in the folded copy are valid
/// offsets into the original. Used for accent-agnostic regex matching where
/// the replacement must splice back into the unfolded text.
pub fn fold_char_aligned(s: &str) -> String {
    s.chars()
        .map(|c| {
            let base = c.nfd().find(|d| !is_combining_mark(*d)).unwrap_or(c);
            base.to_lowercase().next().unwrap_or(base)
        })
        .collect()
}

/// Apply NFC and convert non-breaking spaces to ordinary spaces.
pub fn nfc_clean(s: &str) -> String {
    s.nfc()
        .map(|c| match c {
            '\u{00A0}' | '\u{202F}' => ' ',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_strips_diacritics_and_case() {
        assert_eq!(fold("Cariës"), "caries");
        assert_eq!(fold("PERI-APICAAL"), "peri-apicaal");
        assert_eq!(fold("röntgenfoto"), "rontgenfoto");
    }

    #[test]
    fn char_aligned_fold_preserves_length() {
        for s in ["Cariës", "één", "déjà vu", "element 14"] {
            assert_eq!(s.chars().count(), fold_char_aligned(s).chars().count());
        }
        assert_eq!(fold_char_aligned("Cariës"), "caries");
    }

    #[test]
    fn nfc_clean_replaces_nbsp() {
        assert_eq!(nfc_clean("15\u{00A0}mm"), "15 mm");
        // e + combining acute composes to a single char
        assert_eq!(nfc_clean("e\u{0301}"), "é");
    }
}
