//! Token rewrite passes: variant lookup, hyphen prepass, fuzzy promotion
//! and diacritics restoration.

use super::fold::fold;
use super::phonetic::PhoneticMatcher;
use super::tokens::{preserving_edges, rebuild, tokenize};
use crate::lexicon::Snapshot;
use once_cell::sync::Lazy;
use regex::Regex;

static NUMERIC_RANGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+-\d+$").expect("static regex"));

/// Replace tokens and multi-token windows by their canonical form.
///
/// Windows are tried widest-first; the original trailing punctuation of the
/// last window token is preserved.
pub fn apply_variants(text: &str, snapshot: &Snapshot) -> String {
    if snapshot.max_variant_words() == 0 {
        return text.to_string();
    }
    preserving_edges(text, |text| apply_variants_inner(text, snapshot))
}

fn apply_variants_inner(text: &str, snapshot: &Snapshot) -> String {
    let toks = tokenize(text);
    let mut out: Vec<String> = Vec::with_capacity(toks.len());
    let mut i = 0;

    'outer: while i < toks.len() {
        // tokens already canonical stay put, dots and all
        if !toks[i].core.is_empty() && snapshot.is_canonical_folded(&toks[i].text()) {
            out.push(toks[i].text());
            i += 1;
            continue;
        }
        let widest = snapshot.max_variant_words().min(toks.len() - i);
        for width in (1..=widest).rev() {
            let window = &toks[i..i + width];
            // punctuation inside the window breaks it
            if window[..width - 1]
                .iter()
                .any(|t| !t.trail.is_empty() || !t.lead.is_empty())
                || !window[width - 1].lead.is_empty()
            {
                continue;
            }
            let key = fold(
                &window
                    .iter()
                    .map(|t| t.core.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
            );
            if key.is_empty() {
                continue;
            }
            if let Some(canonical) = snapshot.variant_canonical(&key) {
                out.push(format!("{canonical}{}", window[width - 1].trail));
                i += width;
                continue 'outer;
            }
        }
        out.push(toks[i].text());
        i += 1;
    }
    rebuild(&out)
}

/// Split hyphenated tokens that are neither canonical nor numeric
/// ranges, so the halves get their own shot at variant/fuzzy promotion.
pub fn split_hyphens(text: &str, snapshot: &Snapshot) -> String {
    preserving_edges(text, |text| split_hyphens_inner(text, snapshot))
}

fn split_hyphens_inner(text: &str, snapshot: &Snapshot) -> String {
    let toks = tokenize(text);
    let mut out: Vec<String> = Vec::with_capacity(toks.len());
    for t in &toks {
        let splittable = t.core.contains('-')
            && !NUMERIC_RANGE.is_match(&t.core)
            && !snapshot.is_canonical_folded(&t.core);
        if splittable {
            out.push(format!(
                "{}{}{}",
                t.lead,
                t.core.replace('-', " "),
                t.trail
            ));
        } else {
            out.push(t.text());
        }
    }
    rebuild(&out)
}

/// Promote tokens and windows to their best phonetic candidate.
pub fn phonetic_pass(text: &str, snapshot: &Snapshot) -> String {
    let matcher = PhoneticMatcher::new(
        snapshot.phonetic_candidates(),
        snapshot.phonetic_threshold(),
    );
    let max_words = matcher.max_candidate_words();
    if max_words == 0 {
        return text.to_string();
    }
    preserving_edges(text, |text| phonetic_pass_inner(text, &matcher, max_words, snapshot))
}

fn phonetic_pass_inner(
    text: &str,
    matcher: &PhoneticMatcher<'_>,
    max_words: usize,
    snapshot: &Snapshot,
) -> String {
    let toks = tokenize(text);
    let mut out: Vec<String> = Vec::with_capacity(toks.len());
    let mut i = 0;

    'outer: while i < toks.len() {
        let t = &toks[i];
        if t.core.is_empty() || t.is_digits() || t.core.chars().any(|c| c.is_ascii_digit()) {
            out.push(t.text());
            i += 1;
            continue;
        }
        // exact canonical (with its punctuation, e.g. "ca.") is left alone
        if snapshot.is_canonical_folded(&t.text()) {
            out.push(t.text());
            i += 1;
            continue;
        }

        let widest = max_words.min(toks.len() - i);
        for width in (2..=widest).rev() {
            let window = &toks[i..i + width];
            if window[..width - 1]
                .iter()
                .any(|t| !t.trail.is_empty() || !t.lead.is_empty())
                || !window[width - 1].lead.is_empty()
                || window.iter().any(|t| t.core.is_empty() || t.is_digits())
            {
                continue;
            }
            let words: Vec<&str> = window.iter().map(|t| t.core.as_str()).collect();
            if let Some(hit) = matcher.best_window_match(&words) {
                out.push(format!("{}{}", hit.canonical, window[width - 1].trail));
                i += width;
                continue 'outer;
            }
        }

        match matcher.best_match(&t.core) {
            Some(hit) => out.push(format!("{}{}{}", t.lead, hit.canonical, t.trail)),
            None => out.push(t.text()),
        }
        i += 1;
    }
    rebuild(&out)
}

/// Restore diacritics on tokens whose folded form maps to exactly one
/// canonical spelling.
pub fn restore_diacritics(text: &str, snapshot: &Snapshot) -> String {
    preserving_edges(text, |text| restore_diacritics_inner(text, snapshot))
}

fn restore_diacritics_inner(text: &str, snapshot: &Snapshot) -> String {
    let toks = tokenize(text);
    let mut out: Vec<String> = Vec::with_capacity(toks.len());
    for t in &toks {
        if t.core.is_empty() {
            out.push(t.text());
            continue;
        }
        match snapshot.diacritics_restore(&fold(&t.core)) {
            Some(canonical) if canonical != t.core => {
                out.push(format!("{}{}{}", t.lead, canonical, t.trail));
            }
            _ => out.push(t.text()),
        }
    }
    rebuild(&out)
}
