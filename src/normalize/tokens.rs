//! Whitespace tokenization with edge-punctuation bookkeeping.
//!
//! The element, variant and phonetic stages all work token-wise but must
//! preserve the punctuation glued to a word (`"ca.,"`, `"(14)"`). A [`Tok`]
//! keeps the leading and trailing punctuation apart from the core so stages
//! can rewrite the core and re-attach the rest.

/// A whitespace-delimited token split into edge punctuation and core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tok {
    /// Leading non-alphanumeric chars (e.g. an opening paren).
    pub lead: String,
    /// The word/number core. May be empty for punctuation-only tokens.
    pub core: String,
    /// Trailing non-alphanumeric chars (e.g. `,` or `.`).
    pub trail: String,
}

impl Tok {
    /// The token exactly as it appeared in the input.
    pub fn text(&self) -> String {
        format!("{}{}{}", self.lead, self.core, self.trail)
    }

    /// True when the core is one or more ASCII digits.
    pub fn is_digits(&self) -> bool {
        !self.core.is_empty() && self.core.chars().all(|c| c.is_ascii_digit())
    }

    /// True when the token is a single punctuation char equal to `c`.
    pub fn is_sep(&self, c: char) -> bool {
        self.core.is_empty() && self.lead.is_empty() && self.trail.chars().eq(std::iter::once(c))
    }
}

/// Split on whitespace, separating edge punctuation from each token core.
///
/// Internal punctuation (hyphens in `peri-apicaal`, the dot in `1.5`) stays
/// in the core; only a run of non-alphanumeric chars at either edge is
/// peeled off.
pub fn tokenize(text: &str) -> Vec<Tok> {
    text.split_whitespace().map(split_edges).collect()
}

/// Rebuild a token list into a single-space-joined string.
pub fn rebuild(toks: &[String]) -> String {
    toks.join(" ")
}

/// Run a token-level rewrite on the trimmed text while keeping the edge
/// whitespace. Open segments between protected spans carry their word
/// boundaries in that whitespace; a plain split-and-join would glue the
/// rewritten text onto the neighbouring protected word.
pub fn preserving_edges<F: FnOnce(&str) -> String>(text: &str, f: F) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return text.to_string();
    }
    let start = trimmed.as_ptr() as usize - text.as_ptr() as usize;
    let end = start + trimmed.len();
    format!("{}{}{}", &text[..start], f(trimmed), &text[end..])
}

fn split_edges(word: &str) -> Tok {
    let chars: Vec<char> = word.chars().collect();
    let is_core = |c: &char| c.is_alphanumeric();

    let start = chars.iter().position(is_core).unwrap_or(chars.len());
    let end = chars.iter().rposition(is_core).map_or(start, |i| i + 1);

    Tok {
        lead: chars[..start].iter().collect(),
        core: chars[start..end].iter().collect(),
        trail: chars[end..].iter().collect(),
    }
}
