//! Custom pattern replacement.
//!
//! User-configured `{regex, replacement}` pairs run in order against an
//! accent-folded copy of the text that stays char-aligned with the
//! original, so match offsets can be spliced back into the unfolded text
//! and surrounding punctuation survives untouched. Backreferences in the
//! replacement (`$1`, `${name}`) splice the original chars of the captured
//! span, never the folded copy.

use super::fold::fold_char_aligned;
use crate::lexicon::Snapshot;
use std::collections::HashMap;

/// Apply every compiled pattern in configured order.
pub fn apply_patterns(text: &str, snapshot: &Snapshot) -> String {
    let mut current = text.to_string();
    for pattern in snapshot.patterns() {
        current = apply_one(&current, &pattern.regex, &pattern.replacement);
    }
    current
}

fn apply_one(text: &str, regex: &regex::Regex, replacement: &str) -> String {
    let folded = fold_char_aligned(text);
    if !regex.is_match(&folded) {
        return text.to_string();
    }

    // byte offset in folded → char index (both strings share char counts)
    let char_of_byte: HashMap<usize, usize> = folded
        .char_indices()
        .enumerate()
        .map(|(ci, (bi, _))| (bi, ci))
        .collect();
    let orig: Vec<char> = text.chars().collect();

    let mut out = String::with_capacity(text.len());
    let mut last_char = 0;
    for caps in regex.captures_iter(&folded) {
        let Some(m) = caps.get(0) else { continue };
        let (start, end) = char_range(m, &char_of_byte, orig.len());
        if start < last_char {
            continue;
        }
        out.extend(&orig[last_char..start]);
        expand_from_original(&caps, replacement, &char_of_byte, &orig, &mut out);
        last_char = end;
    }
    out.extend(&orig[last_char..]);
    out
}

/// Map a match's byte range in the folded copy to a char range in the
/// original.
fn char_range(
    m: regex::Match<'_>,
    char_of_byte: &HashMap<usize, usize>,
    fallback: usize,
) -> (usize, usize) {
    let start = char_of_byte.get(&m.start()).copied().unwrap_or(fallback);
    let end = char_of_byte.get(&m.end()).copied().unwrap_or(fallback);
    (start, end)
}

/// Expand a `$1`/`${name}`-style template, taking group contents from the
/// original text via the char-aligned offsets.
fn expand_from_original(
    caps: &regex::Captures<'_>,
    template: &str,
    char_of_byte: &HashMap<usize, usize>,
    orig: &[char],
    out: &mut String,
) {
    let mut rest = template.chars().peekable();
    while let Some(c) = rest.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match rest.peek() {
            Some('$') => {
                rest.next();
                out.push('$');
            }
            Some('{') => {
                rest.next();
                let name: String = rest.by_ref().take_while(|&c| c != '}').collect();
                push_group(caps, &name, char_of_byte, orig, out);
            }
            Some(d) if d.is_ascii_digit() => {
                let mut name = String::new();
                while let Some(d) = rest.peek().filter(|d| d.is_ascii_digit()) {
                    name.push(*d);
                    rest.next();
                }
                push_group(caps, &name, char_of_byte, orig, out);
            }
            _ => out.push('$'),
        }
    }
}

fn push_group(
    caps: &regex::Captures<'_>,
    name: &str,
    char_of_byte: &HashMap<usize, usize>,
    orig: &[char],
    out: &mut String,
) {
    let group = match name.parse::<usize>() {
        Ok(index) => caps.get(index),
        Err(_) => caps.name(name),
    };
    if let Some(m) = group {
        let (start, end) = char_range(m, char_of_byte, orig.len());
        out.extend(&orig[start..end]);
    }
}
