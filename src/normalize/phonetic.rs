//! Phonetic/fuzzy matching of tokens against canonical terms.
//!
//! Scoring is a folded-Levenshtein base with a gated Soundex bonus, tuned
//! for Dutch dental vocabulary. The matcher does not consult the snapshot;
//! the pipeline hands it a prepared candidate list.

use super::fold::fold;

/// Bonus added when Soundex codes agree and the base score is close enough.
const SOUNDEX_BONUS: f64 = 0.05;
/// How far below the acceptance threshold the Soundex gate opens.
const SOUNDEX_GATE: f64 = 0.06;
/// Minimum per-word score inside a multi-word window.
const WINDOW_WORD_MIN: f64 = 0.60;
/// Minimum average score for a two-word window.
const WINDOW_AVG_MIN_BIGRAM: f64 = 0.70;
/// Minimum average score for windows of three or more words.
const WINDOW_AVG_MIN_LONG: f64 = 0.75;
/// Required non-prefix agreement (in chars) when a generic prefix is involved.
const CORE_AGREEMENT_MIN: usize = 5;

/// Prefixes that do not count towards the match core. Longest first so the
/// scan below is longest-match.
const GENERIC_PREFIXES: &[&str] = &[
    "inter", "mesio", "disto", "supra", "extra", "intra", "peri", "post", "sub", "pre", "re", "co",
];

/// Suffix pairs that block a promotion (Dutch adjective endings must not be
/// rewritten into Latin noun forms).
const TOKEN_BLOCK_SUFFIXES: &[&str] = &["eer", "air", "aal"];
const CANONICAL_BLOCK_SUFFIXES: &[&str] = &["um", "us"];

/// A canonical term prepared for matching.
#[derive(Debug, Clone)]
pub struct CandidateEntry {
    /// The canonical output form.
    pub canonical: String,
    /// Folded full form.
    pub folded: String,
    /// Folded form split on whitespace, for window alignment.
    pub words: Vec<String>,
    /// Soundex code of the folded full form.
    pub soundex: String,
}

impl CandidateEntry {
    pub fn new(canonical: &str) -> Self {
        let folded = fold(canonical);
        let words = folded.split_whitespace().map(ToString::to_string).collect();
        let soundex = soundex(&folded);
        Self {
            canonical: canonical.to_string(),
            folded,
            words,
            soundex,
        }
    }
}

/// Best-candidate result.
#[derive(Debug, Clone, PartialEq)]
pub struct PhoneticMatch {
    pub canonical: String,
    pub score: f64,
}

/// Matches tokens and token windows against a fixed candidate list.
pub struct PhoneticMatcher<'a> {
    candidates: &'a [CandidateEntry],
    threshold: f64,
}

impl<'a> PhoneticMatcher<'a> {
    pub fn new(candidates: &'a [CandidateEntry], threshold: f64) -> Self {
        Self {
            candidates,
            threshold,
        }
    }

    /// Widest candidate in words, bounding the window scan.
    pub fn max_candidate_words(&self) -> usize {
        self.candidates
            .iter()
            .map(|c| c.words.len())
            .max()
            .unwrap_or(0)
    }

    /// Match a single token against the single-word candidates.
    pub fn best_match(&self, token: &str) -> Option<PhoneticMatch> {
        let tf = fold(token);
        if tf.is_empty() || tf.chars().any(|c| c.is_ascii_digit()) {
            return None;
        }
        let tf_soundex = soundex(&tf);

        let mut best: Option<(f64, &CandidateEntry)> = None;
        for cand in self.candidates.iter().filter(|c| c.words.len() == 1) {
            if tf == cand.folded {
                best = pick(best, 1.0, cand);
                continue;
            }
            if suffix_blocked(&tf, &cand.folded) {
                continue;
            }
            let score = scored(&tf, &tf_soundex, cand, self.threshold);
            if score < self.threshold || !core_agreement_ok(&tf, &cand.folded) {
                continue;
            }
            best = pick(best, score, cand);
        }
        best.map(|(score, cand)| PhoneticMatch {
            canonical: cand.canonical.clone(),
            score,
        })
    }

    /// Match a window of tokens against candidates with the same word count.
    ///
    /// Every window word must align with the corresponding candidate word.
    pub fn best_window_match(&self, window: &[&str]) -> Option<PhoneticMatch> {
        if window.len() < 2 {
            return None;
        }
        let folded_words: Vec<String> = window.iter().map(|w| fold(w)).collect();
        if folded_words
            .iter()
            .any(|w| w.is_empty() || w.chars().any(|c| c.is_ascii_digit()))
        {
            return None;
        }
        let joined = folded_words.join(" ");
        let joined_soundex = soundex(&joined);
        let avg_min = if window.len() == 2 {
            WINDOW_AVG_MIN_BIGRAM
        } else {
            WINDOW_AVG_MIN_LONG
        };

        let mut best: Option<(f64, &CandidateEntry)> = None;
        for cand in self
            .candidates
            .iter()
            .filter(|c| c.words.len() == window.len())
        {
            if joined == cand.folded {
                best = pick(best, 1.0, cand);
                continue;
            }
            if suffix_blocked(&joined, &cand.folded) {
                continue;
            }
            let word_scores: Vec<f64> = folded_words
                .iter()
                .zip(&cand.words)
                .map(|(w, cw)| base_score(w, cw))
                .collect();
            if word_scores.iter().any(|&s| s < WINDOW_WORD_MIN) {
                continue;
            }
            let avg = word_scores.iter().sum::<f64>() / word_scores.len() as f64;
            if avg < avg_min {
                continue;
            }
            let score = scored_full(&joined, &joined_soundex, &cand.folded, &cand.soundex, self.threshold);
            if score < self.threshold || !core_agreement_ok(&joined, &cand.folded) {
                continue;
            }
            best = pick(best, score, cand);
        }
        best.map(|(score, cand)| PhoneticMatch {
            canonical: cand.canonical.clone(),
            score,
        })
    }
}

fn pick<'a>(
    best: Option<(f64, &'a CandidateEntry)>,
    score: f64,
    cand: &'a CandidateEntry,
) -> Option<(f64, &'a CandidateEntry)> {
    match best {
        None => Some((score, cand)),
        Some((bs, bc)) => {
            let better = score > bs
                || (score == bs
                    && (cand.folded.chars().count() > bc.folded.chars().count()
                        || (cand.folded.chars().count() == bc.folded.chars().count()
                            && cand.canonical < bc.canonical)));
            if better { Some((score, cand)) } else { Some((bs, bc)) }
        }
    }
}

fn scored(tf: &str, tf_soundex: &str, cand: &CandidateEntry, threshold: f64) -> f64 {
    scored_full(tf, tf_soundex, &cand.folded, &cand.soundex, threshold)
}

fn scored_full(tf: &str, tf_soundex: &str, cf: &str, c_soundex: &str, threshold: f64) -> f64 {
    let base = base_score(tf, cf);
    if base >= threshold - SOUNDEX_GATE && tf_soundex == c_soundex {
        (base + SOUNDEX_BONUS).min(1.0)
    } else {
        base
    }
}

/// `1 − L / max(|t|,|c|)` over folded chars.
fn base_score(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    1.0 - levenshtein(a, b) as f64 / max_len as f64
}

fn suffix_blocked(token: &str, canonical: &str) -> bool {
    TOKEN_BLOCK_SUFFIXES.iter().any(|s| token.ends_with(s))
        && CANONICAL_BLOCK_SUFFIXES
            .iter()
            .any(|s| canonical.ends_with(s))
}

/// Strip one generic prefix (and a following hyphen) from a folded string.
fn strip_generic_prefix(s: &str) -> (&str, bool) {
    for p in GENERIC_PREFIXES {
        if let Some(rest) = s.strip_prefix(p) {
            let rest = rest.strip_prefix('-').unwrap_or(rest);
            if !rest.is_empty() {
                return (rest, true);
            }
        }
    }
    (s, false)
}

/// Generic prefixes do not contribute to the match core; when one is
/// involved the cores must still agree in at least five characters.
fn core_agreement_ok(token: &str, canonical: &str) -> bool {
    let (tc, t_stripped) = strip_generic_prefix(token);
    let (cc, c_stripped) = strip_generic_prefix(canonical);
    if !t_stripped && !c_stripped {
        return true;
    }
    let max_len = tc.chars().count().max(cc.chars().count());
    max_len.saturating_sub(levenshtein(tc, cc)) >= CORE_AGREEMENT_MIN
}

/// Char-wise Levenshtein distance, two-row DP.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(ca != cb);
            curr[j + 1] = sub.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Classical 4-character Soundex over the alphabetic chars of a folded
/// string. The dialect is deliberately not part of the matcher contract;
/// only the gate and bonus are.
pub fn soundex(s: &str) -> String {
    let mut out = String::new();
    let mut prev_code = 0u8;
    for c in s.chars().filter(char::is_ascii_alphabetic) {
        let lower = c.to_ascii_lowercase();
        let code = match lower {
            'b' | 'f' | 'p' | 'v' => 1,
            'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => 2,
            'd' | 't' => 3,
            'l' => 4,
            'm' | 'n' => 5,
            'r' => 6,
            _ => 0,
        };
        if out.is_empty() {
            out.push(lower.to_ascii_uppercase());
            prev_code = code;
            continue;
        }
        if code != 0 && code != prev_code {
            out.push((b'0' + code) as char);
            if out.len() == 4 {
                break;
            }
        }
        // h and w are transparent; vowels reset the run
        if lower != 'h' && lower != 'w' {
            prev_code = code;
        }
    }
    if out.is_empty() {
        return "0000".to_string();
    }
    while out.len() < 4 {
        out.push('0');
    }
    out
}
