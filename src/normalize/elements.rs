//! Tooth-element recognition.
//!
//! The preprocessing pass spaces out separators that sit directly between
//! digits so the element stage sees clean tokens; the element stage then
//! rewrites valid element numbers, digit pairs, Dutch number-word pairs and
//! the `de DD` article form into the canonical `element DD` shape.
//!
//! A valid element is `DD` with the first digit 1–4 (permanent) or 5–8
//! (deciduous) and the second digit 1–8.

use super::tokens::{Tok, preserving_edges, rebuild, tokenize};
use crate::lexicon::Snapshot;
use std::collections::BTreeSet;

/// Words that establish dental context for the rules below.
const CONTEXT_WORDS: &[&str] = &["element", "tand", "kies", "molaar", "premolaar"];

/// Unit tokens that veto element conversion of the preceding digits.
const UNIT_TOKENS: &[&str] = &["mm", "cm", "ml", "%"];

/// True for a two-digit string satisfying the element constraint.
pub fn is_valid_element(dd: &str) -> bool {
    let mut digits = dd.chars();
    match (digits.next(), digits.next(), digits.next()) {
        (Some(d1), Some(d2), None) => ('1'..='8').contains(&d1) && ('1'..='8').contains(&d2),
        _ => false,
    }
}

/// Insert a space around each separator that sits directly between two
/// digits, then collapse runs of blanks.
pub fn space_separators(text: &str, separators: &BTreeSet<char>) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        let between_digits = i > 0
            && i + 1 < chars.len()
            && chars[i - 1].is_ascii_digit()
            && chars[i + 1].is_ascii_digit();
        if between_digits && c != ' ' && separators.contains(&c) {
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    collapse_blanks(&out)
}

fn collapse_blanks(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_blank = false;
    for c in s.chars() {
        if c == ' ' || c == '\t' {
            if !in_blank {
                out.push(' ');
            }
            in_blank = true;
        } else {
            in_blank = false;
            out.push(c);
        }
    }
    out
}

/// Rewrite element references.
///
/// Rule priority per position: unit guard, comma-list guard, context
/// lookbehind, pair forms, article cleanup, number-word pairs. Conversions
/// emit `element DD` unless a dental-context word directly precedes, in
/// which case the bare `DD` suffices.
pub fn parse_elements(text: &str, snapshot: &Snapshot) -> String {
    preserving_edges(text, |text| parse_elements_inner(text, snapshot))
}

fn parse_elements_inner(text: &str, snapshot: &Snapshot) -> String {
    let toks = tokenize(text);
    let mut out: Vec<String> = Vec::with_capacity(toks.len());
    let mut i = 0;

    while i < toks.len() {
        let t = &toks[i];
        let in_context = last_core_is_context(&out);

        // number-word pairs ("een vier" → 14), inside and outside context
        if t.lead.is_empty() && t.trail.is_empty() {
            if let Some(consumed) = try_number_words(&toks, i, in_context, snapshot, &mut out) {
                i += consumed;
                continue;
            }
        }

        if t.is_digits() {
            match t.core.chars().count() {
                2 if is_valid_element(&t.core) => {
                    if unit_follows(&toks, i + 1) || in_context {
                        out.push(t.text());
                    } else {
                        out.push(format!("{}element", t.lead));
                        out.push(format!("{}{}", t.core, t.trail));
                    }
                    i += 1;
                    continue;
                }
                1 => {
                    if in_comma_list(&toks, i) {
                        out.push(t.text());
                        i += 1;
                        continue;
                    }
                    if let Some((next_i, dd, trail)) = try_digit_pair(&toks, i, snapshot) {
                        if !unit_follows(&toks, next_i + 1) && is_valid_element(&dd) {
                            if !in_context {
                                out.push("element".to_string());
                            }
                            out.push(format!("{dd}{trail}"));
                            i = next_i + 1;
                            continue;
                        }
                    }
                    out.push(t.text());
                    i += 1;
                    continue;
                }
                _ => {}
            }
        }

        // article cleanup: "de DD" → "element DD"
        if t.trail.is_empty() && t.lead.is_empty() && t.core.eq_ignore_ascii_case("de") {
            if let Some(next) = toks.get(i + 1) {
                if next.is_digits()
                    && is_valid_element(&next.core)
                    && !unit_follows(&toks, i + 2)
                {
                    out.push("element".to_string());
                    i += 1;
                    continue;
                }
            }
        }

        out.push(t.text());
        i += 1;
    }

    rebuild(&out)
}

/// Whether the previously emitted token is a dental-context word.
fn last_core_is_context(out: &[String]) -> bool {
    out.last().is_some_and(|last| {
        let core: String = last
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        CONTEXT_WORDS.contains(&core.as_str())
    })
}

fn unit_follows(toks: &[Tok], idx: usize) -> bool {
    toks.get(idx).is_some_and(|t| {
        let text = t.text().to_lowercase();
        let trimmed = text.trim_end_matches(|c: char| !c.is_alphanumeric() && c != '%');
        UNIT_TOKENS.contains(&trimmed) || UNIT_TOKENS.contains(&text.as_str())
    })
}

/// Comma-list guard: a single digit joined to neighbouring single digits by
/// commas stays a list (`1, 2, 3`), whether the comma is glued to the token
/// or stands alone.
fn in_comma_list(toks: &[Tok], i: usize) -> bool {
    let joined_forward = toks[i].trail.starts_with(',')
        && toks.get(i + 1).is_some_and(|n| n.is_digits() && n.core.chars().count() == 1);
    let joined_backward = i > 0
        && toks[i - 1].trail.starts_with(',')
        && toks[i - 1].is_digits()
        && toks[i - 1].core.chars().count() == 1;
    let spaced_forward = toks.get(i + 1).is_some_and(|s| s.is_sep(','))
        && toks.get(i + 2).is_some_and(|n| n.is_digits() && n.core.chars().count() == 1);
    let spaced_backward = i >= 2
        && toks[i - 1].is_sep(',')
        && toks[i - 2].is_digits()
        && toks[i - 2].core.chars().count() == 1;
    joined_forward || joined_backward || spaced_forward || spaced_backward
}

/// Pair forms: `d sep d` with `sep` in the configured separator set (a bare
/// space counts). Returns the index of the second digit, the fused `DD` and
/// its trailing punctuation.
fn try_digit_pair(toks: &[Tok], i: usize, snapshot: &Snapshot) -> Option<(usize, String, String)> {
    let first = &toks[i];
    if !first.trail.is_empty() {
        return None;
    }
    // "1 - 4": explicit separator token between the digits
    if let Some(sep) = toks.get(i + 1) {
        if sep.core.is_empty() && sep.lead.is_empty() {
            let sep_char: Vec<char> = sep.trail.chars().collect();
            if sep_char.len() == 1
                && sep_char[0] != ','
                && snapshot.separators().contains(&sep_char[0])
            {
                if let Some(second) = toks.get(i + 2) {
                    if second.is_digits() && second.core.chars().count() == 1 {
                        return Some((
                            i + 2,
                            format!("{}{}", first.core, second.core),
                            second.trail.clone(),
                        ));
                    }
                }
            }
        }
        // "1 4": adjacency, the space itself being the separator
        if snapshot.separators().contains(&' ')
            && sep.is_digits()
            && sep.core.chars().count() == 1
            && sep.lead.is_empty()
        {
            return Some((
                i + 1,
                format!("{}{}", first.core, sep.core),
                sep.trail.clone(),
            ));
        }
    }
    None
}

/// Number-word pairs: two consecutive Dutch digit words forming a valid
/// element. Emits into `out` and returns the number of tokens consumed.
fn try_number_words(
    toks: &[Tok],
    i: usize,
    in_context: bool,
    snapshot: &Snapshot,
    out: &mut Vec<String>,
) -> Option<usize> {
    let next = toks.get(i + 1)?;
    if !next.lead.is_empty() {
        return None;
    }
    let d1 = digit_word(&toks[i].core, in_context, snapshot)?;
    let d2 = digit_word(&next.core, in_context, snapshot)?;
    let dd = format!("{d1}{d2}");
    if !is_valid_element(&dd) || unit_follows(toks, i + 2) {
        return None;
    }
    if !in_context {
        out.push("element".to_string());
    }
    out.push(format!("{dd}{}", next.trail));
    Some(2)
}

/// Look up a Dutch number word, accent-folded so `één` counts as `een`.
/// `een` only counts as a digit in dental context; everywhere else it
/// stays the article/numeral word it is.
fn digit_word<'a>(word: &str, in_context: bool, snapshot: &'a Snapshot) -> Option<&'a str> {
    let folded = super::fold::fold(word);
    if folded == "een" && !in_context {
        return None;
    }
    snapshot.digit_word(&folded).filter(|d| d.len() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::Snapshot;

    fn snap() -> Snapshot {
        Snapshot::builder().build()
    }

    fn run(text: &str) -> String {
        let s = snap();
        let spaced = space_separators(text, s.separators());
        parse_elements(&spaced, &s)
    }

    #[test]
    fn separator_spacing() {
        let s = snap();
        assert_eq!(space_separators("14;15;16", s.separators()), "14 ; 15 ; 16");
        assert_eq!(space_separators("1-4", s.separators()), "1 - 4");
        // separators not between digits stay put
        assert_eq!(space_separators("ca. 14", s.separators()), "ca. 14");
        assert_eq!(space_separators("a-b", s.separators()), "a-b");
    }

    #[test]
    fn bare_elements_get_prefixed() {
        assert_eq!(run("14;15;16"), "element 14 ; element 15 ; element 16");
        assert_eq!(run("11"), "element 11");
    }

    #[test]
    fn context_suppresses_double_prefix() {
        assert_eq!(run("element 14"), "element 14");
        assert_eq!(run("tand 14"), "tand 14");
        assert_eq!(run("kies 36"), "kies 36");
    }

    #[test]
    fn article_cleanup() {
        assert_eq!(run("de 11"), "element 11");
        assert_eq!(run("de 11 en de 21"), "element 11 en element 21");
    }

    #[test]
    fn unit_guard() {
        assert_eq!(run("15 mm"), "15 mm");
        assert_eq!(run("30 %"), "30 %");
        assert_eq!(run("de 15 mm"), "de 15 mm");
    }

    #[test]
    fn comma_list_guard() {
        assert_eq!(run("1, 2, 3"), "1, 2, 3");
        assert_eq!(run("1 , 2 , 3"), "1 , 2 , 3");
    }

    #[test]
    fn digit_pairs_fuse() {
        assert_eq!(run("1-4"), "element 14");
        assert_eq!(run("2/6"), "element 26");
        assert_eq!(run("tand 1-4"), "tand 14");
    }

    #[test]
    fn invalid_pairs_stay() {
        assert_eq!(run("9-9"), "9 - 9");
        assert_eq!(run("49"), "49");
        assert_eq!(run("19"), "19");
    }

    #[test]
    fn number_words() {
        assert_eq!(run("tand een vier"), "tand 14");
        assert_eq!(run("element een vier"), "element 14");
        assert_eq!(run("tand één vier"), "tand 14");
        assert_eq!(run("twee vier"), "element 24");
        // "een" outside context is the article, never a digit
        assert_eq!(run("een vier"), "een vier");
    }

    #[test]
    fn number_words_respect_unit_guard() {
        assert_eq!(run("twee vier mm"), "twee vier mm");
    }
}
