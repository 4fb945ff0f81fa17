//! The immutable lexicon snapshot consumed by the normalization pipeline.
//!
//! A [`Snapshot`] is built once (per user, by the loader) and then only read.
//! All derived lookup structures — folded variant keys, the phonetic
//! candidate list, the diacritics-restore map, the abbreviation set — are
//! computed at build time so the pipeline itself never allocates indices.

use crate::normalize::fold::fold;
use crate::normalize::phonetic::CandidateEntry;
use regex::RegexBuilder;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::warn;
use unicode_normalization::UnicodeNormalization;

/// Default element-number separators.
const DEFAULT_SEPARATORS: &[char] = &['-', ' ', ',', ';', '/'];

/// Default acceptance threshold for the phonetic matcher.
pub const DEFAULT_PHONETIC_THRESHOLD: f64 = 0.84;

/// A compiled custom rewrite pattern.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// Case-insensitive regex, matched against accent-folded text.
    pub regex: regex::Regex,
    /// Replacement template (supports `$1`-style groups).
    pub replacement: String,
}

/// Postprocessing feature flags.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct PostprocessFlags {
    pub remove_sentence_dots: bool,
    pub compact_units: bool,
    pub dedupe_elements: bool,
    pub strip_leading_article: bool,
}

impl Default for PostprocessFlags {
    fn default() -> Self {
        Self {
            remove_sentence_dots: true,
            compact_units: true,
            dedupe_elements: true,
            strip_leading_article: true,
        }
    }
}

/// Per-stage switches. All stages default to on.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct StageSwitches {
    pub protected_wrap: bool,
    pub unicode_cleanup: bool,
    pub preprocessing: bool,
    pub element_parsing: bool,
    pub pattern_replacement: bool,
    pub variant_generation: bool,
    pub hyphen_split: bool,
    pub phonetic: bool,
    pub diacritics_restore: bool,
    pub postprocess: bool,
}

impl Default for StageSwitches {
    fn default() -> Self {
        Self {
            protected_wrap: true,
            unicode_cleanup: true,
            preprocessing: true,
            element_parsing: true,
            pattern_replacement: true,
            variant_generation: true,
            hyphen_split: true,
            phonetic: true,
            diacritics_restore: true,
            postprocess: true,
        }
    }
}

/// Outcome slot in the diacritics-restore map.
#[derive(Debug, Clone)]
enum DiacriticsTarget {
    Unique(String),
    Ambiguous,
}

/// Immutable bundle of lexicon and pipeline configuration.
#[derive(Debug)]
pub struct Snapshot {
    canonicals: BTreeSet<String>,
    canonicals_folded: HashSet<String>,
    variants: HashMap<String, String>,
    patterns: Vec<CompiledPattern>,
    protected_words: Vec<String>,
    separators: BTreeSet<char>,
    digit_words: HashMap<String, String>,
    phonetic_threshold: f64,
    postprocess: PostprocessFlags,
    stages: StageSwitches,
    max_variant_words: usize,
    diacritics: HashMap<String, DiacriticsTarget>,
    abbreviations: Vec<String>,
    candidates: Vec<CandidateEntry>,
}

impl Snapshot {
    pub fn builder() -> SnapshotBuilder {
        SnapshotBuilder::default()
    }

    pub fn canonicals(&self) -> &BTreeSet<String> {
        &self.canonicals
    }

    /// True when the folded form of `term` is a canonical term.
    pub fn is_canonical_folded(&self, term: &str) -> bool {
        self.canonicals_folded.contains(&fold(term))
    }

    /// Folded variant key → canonical form.
    pub fn variant_canonical(&self, folded_key: &str) -> Option<&str> {
        self.variants.get(folded_key).map(String::as_str)
    }

    /// Longest variant key, in words.
    pub fn max_variant_words(&self) -> usize {
        self.max_variant_words
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    pub fn protected_words(&self) -> &[String] {
        &self.protected_words
    }

    pub fn separators(&self) -> &BTreeSet<char> {
        &self.separators
    }

    /// Dutch number word → digit string.
    pub fn digit_word(&self, word: &str) -> Option<&str> {
        self.digit_words.get(word).map(String::as_str)
    }

    pub fn phonetic_threshold(&self) -> f64 {
        self.phonetic_threshold
    }

    pub fn postprocess_flags(&self) -> PostprocessFlags {
        self.postprocess
    }

    pub fn stages(&self) -> StageSwitches {
        self.stages
    }

    /// Unique diacritics restoration for a folded token, if any.
    pub fn diacritics_restore(&self, folded: &str) -> Option<&str> {
        match self.diacritics.get(folded) {
            Some(DiacriticsTarget::Unique(c)) => Some(c.as_str()),
            _ => None,
        }
    }

    /// Canonicals ending in `.`, protected from sentence-dot removal.
    pub fn abbreviations(&self) -> &[String] {
        &self.abbreviations
    }

    /// Prepared phonetic candidates, one per canonical.
    pub fn phonetic_candidates(&self) -> &[CandidateEntry] {
        &self.candidates
    }
}

/// Accumulates raw lexicon data and computes the derived indices on build.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    canonicals: BTreeSet<String>,
    variants: Vec<(String, String)>,
    patterns: Vec<(String, String)>,
    protected_words: Vec<String>,
    separators: Option<Vec<String>>,
    digit_words: Option<HashMap<String, String>>,
    phonetic_threshold: Option<f64>,
    postprocess: PostprocessFlags,
    stages: StageSwitches,
}

impl SnapshotBuilder {
    /// Add a canonical term. Empty terms are ignored; NFC is applied.
    pub fn canonical(mut self, term: &str) -> Self {
        let term: String = term.trim().nfc().collect();
        if !term.is_empty() {
            self.canonicals.insert(term);
        }
        self
    }

    /// Add a variant → canonical binding.
    pub fn variant(mut self, variant: &str, canonical: &str) -> Self {
        if !variant.trim().is_empty() && !canonical.trim().is_empty() {
            self.variants
                .push((variant.trim().to_string(), canonical.trim().nfc().collect()));
        }
        self
    }

    /// Append a custom `{regex, replacement}` pattern.
    pub fn pattern(mut self, regex: &str, replacement: &str) -> Self {
        self.patterns.push((regex.to_string(), replacement.to_string()));
        self
    }

    /// Add a protected word, preserved verbatim by the pipeline.
    pub fn protected(mut self, word: &str) -> Self {
        let word = word.trim();
        if !word.is_empty() {
            self.protected_words.push(word.to_string());
        }
        self
    }

    /// Override the element separator set (single-char strings).
    pub fn separators<I: IntoIterator<Item = S>, S: Into<String>>(mut self, seps: I) -> Self {
        self.separators = Some(seps.into_iter().map(Into::into).collect());
        self
    }

    /// Override the Dutch number-word table.
    pub fn digit_words(mut self, words: HashMap<String, String>) -> Self {
        self.digit_words = Some(words);
        self
    }

    pub fn phonetic_threshold(mut self, threshold: f64) -> Self {
        self.phonetic_threshold = Some(threshold.clamp(0.0, 1.0));
        self
    }

    pub fn postprocess(mut self, flags: PostprocessFlags) -> Self {
        self.postprocess = flags;
        self
    }

    pub fn stages(mut self, stages: StageSwitches) -> Self {
        self.stages = stages;
        self
    }

    /// Build the immutable snapshot, computing all derived indices.
    pub fn build(self) -> Snapshot {
        let canonicals = self.canonicals;
        let canonicals_folded: HashSet<String> = canonicals.iter().map(|c| fold(c)).collect();

        let mut variants = HashMap::new();
        let mut max_variant_words = 0;
        for (variant, canonical) in self.variants {
            let key = fold(&variant);
            max_variant_words = max_variant_words.max(key.split_whitespace().count());
            variants.insert(key, canonical);
        }

        let mut patterns = Vec::new();
        for (source, replacement) in self.patterns {
            match RegexBuilder::new(&source).case_insensitive(true).build() {
                Ok(regex) => patterns.push(CompiledPattern { regex, replacement }),
                Err(e) => warn!(pattern = %source, "skipping invalid custom pattern: {e}"),
            }
        }

        let separators: BTreeSet<char> = match self.separators {
            Some(seps) => seps.iter().filter_map(|s| s.chars().next()).collect(),
            None => DEFAULT_SEPARATORS.iter().copied().collect(),
        };

        let digit_words = self.digit_words.unwrap_or_else(default_digit_words);

        let mut diacritics: HashMap<String, DiacriticsTarget> = HashMap::new();
        for c in &canonicals {
            let key = fold(c);
            diacritics
                .entry(key)
                .and_modify(|slot| {
                    if !matches!(slot, DiacriticsTarget::Unique(existing) if existing == c) {
                        *slot = DiacriticsTarget::Ambiguous;
                    }
                })
                .or_insert_with(|| DiacriticsTarget::Unique(c.clone()));
        }

        let abbreviations: Vec<String> = canonicals
            .iter()
            .filter(|c| c.ends_with('.'))
            .cloned()
            .collect();

        let candidates: Vec<CandidateEntry> =
            canonicals.iter().map(|c| CandidateEntry::new(c)).collect();

        Snapshot {
            canonicals,
            canonicals_folded,
            variants,
            patterns,
            protected_words: self.protected_words,
            separators,
            digit_words,
            phonetic_threshold: self.phonetic_threshold.unwrap_or(DEFAULT_PHONETIC_THRESHOLD),
            postprocess: self.postprocess,
            stages: self.stages,
            max_variant_words,
            diacritics,
            abbreviations,
            candidates,
        }
    }
}

/// Dutch number words for element aggregation. `een` is context-conditional
/// and handled by the element stage, not by this table alone.
fn default_digit_words() -> HashMap<String, String> {
    [
        ("nul", "0"),
        ("een", "1"),
        ("twee", "2"),
        ("drie", "3"),
        ("vier", "4"),
        ("vijf", "5"),
        ("zes", "6"),
        ("zeven", "7"),
        ("acht", "8"),
        ("negen", "9"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
