//! Final cleanup: whitespace, unit compaction, element dedupe, article
//! stripping and the sentence-dot policy.

use crate::lexicon::Snapshot;
use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder for abbreviation dots while sentence dots are removed.
const DOT_HOLD: char = '\u{FFF2}';

static LOOSE_PUNCT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([;,])").expect("static regex"));
static UNIT_GAP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d)\s+(mm|cm|ml|%)").expect("static regex"));
static ARTICLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[dD]e (element\b)").expect("static regex"));

/// Run the configured postprocessing steps over one open segment.
pub fn postprocess(text: &str, snapshot: &Snapshot) -> String {
    let flags = snapshot.postprocess_flags();
    let mut s = collapse_whitespace(text);
    s = LOOSE_PUNCT.replace_all(&s, "$1").into_owned();
    if flags.compact_units {
        s = compact_units(&s);
    }
    if flags.dedupe_elements {
        s = crate::normalize::tokens::preserving_edges(&s, dedupe_elements);
    }
    if flags.strip_leading_article {
        s = ARTICLE.replace_all(&s, "$1").into_owned();
    }
    if flags.remove_sentence_dots {
        s = remove_sentence_dots(&s, snapshot.abbreviations());
    }
    collapse_whitespace(&s)
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            in_space = false;
            out.push(c);
        }
    }
    out
}

/// `30 %` → `30%`, `15 mm` → `15mm`; only when the unit directly follows a
/// number, and only when nothing alphanumeric continues the unit.
fn compact_units(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_end = 0;
    for caps in UNIT_GAP.captures_iter(s) {
        let Some(m) = caps.get(0) else { continue };
        let after = s[m.end()..].chars().next();
        if after.is_some_and(char::is_alphanumeric) {
            continue;
        }
        out.push_str(&s[last_end..m.start()]);
        out.push_str(&caps[1]);
        out.push_str(&caps[2]);
        last_end = m.end();
    }
    out.push_str(&s[last_end..]);
    out
}

/// `element element` → `element`; `element NN element NN` → `element NN`.
fn dedupe_elements(s: &str) -> String {
    let mut toks: Vec<&str> = s.split(' ').filter(|t| !t.is_empty()).collect();
    let mut changed = true;
    while changed {
        changed = false;
        let mut out: Vec<&str> = Vec::with_capacity(toks.len());
        let mut i = 0;
        while i < toks.len() {
            if toks[i] == "element" && toks.get(i + 1) == Some(&"element") {
                out.push("element");
                i += 2;
                changed = true;
                continue;
            }
            if toks[i] == "element"
                && toks.get(i + 2) == Some(&"element")
                && i + 3 < toks.len()
                && toks[i + 1] == toks[i + 3]
                && toks[i + 1].chars().all(|c| c.is_ascii_digit())
            {
                out.push("element");
                out.push(toks[i + 1]);
                i += 4;
                changed = true;
                continue;
            }
            out.push(toks[i]);
            i += 1;
        }
        toks = out;
    }
    toks.join(" ")
}

/// Drop dots that are neither between two digits nor part of a canonical
/// abbreviation. Abbreviation dots are parked on a placeholder first and
/// restored afterwards.
fn remove_sentence_dots(s: &str, abbreviations: &[String]) -> String {
    let mut held = s.to_string();
    for abbr in abbreviations {
        let parked = abbr.replace('.', &DOT_HOLD.to_string());
        held = held.replace(abbr.as_str(), &parked);
    }

    let chars: Vec<char> = held.chars().collect();
    let mut out = String::with_capacity(held.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '.' {
            let between_digits = i > 0
                && i + 1 < chars.len()
                && chars[i - 1].is_ascii_digit()
                && chars[i + 1].is_ascii_digit();
            if !between_digits {
                continue;
            }
        }
        out.push(c);
    }
    out.replace(DOT_HOLD, ".")
}
