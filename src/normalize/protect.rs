//! Protected-word wrapping (first stage) and unwrapping (last stage).
//!
//! Protected words are wrapped in a pair of private-use sentinels so the
//! stages in between can skip them wholesale. The sentinels are stripped at
//! the very end; the enclosed text is restored byte-for-byte.

/// Opens a protected span.
pub const SENTINEL_OPEN: char = '\u{FFF0}';
/// Closes a protected span.
pub const SENTINEL_CLOSE: char = '\u{FFF1}';

/// Wrap every whole-word occurrence of a protected word in sentinels.
///
/// Matching is case-insensitive; the output keeps the source casing. Longer
/// words win when protected words overlap.
pub fn wrap_protected(text: &str, protected: &[String]) -> String {
    if protected.is_empty() {
        return text.to_string();
    }
    let mut words: Vec<&str> = protected
        .iter()
        .map(String::as_str)
        .filter(|w| !w.is_empty())
        .collect();
    words.sort_by_key(|w| std::cmp::Reverse(w.chars().count()));

    let chars: Vec<char> = text.chars().collect();
    let folded: Vec<char> = chars.iter().flat_map(|c| c.to_lowercase().next()).collect();

    let mut out = String::with_capacity(text.len() + 8);
    let mut i = 0;
    'scan: while i < chars.len() {
        for w in &words {
            let wlen = w.chars().count();
            if i + wlen > chars.len() {
                continue;
            }
            let matches = w
                .chars()
                .map(|c| c.to_lowercase().next().unwrap_or(c))
                .eq(folded[i..i + wlen].iter().copied());
            if !matches {
                continue;
            }
            // whole-word check against the surrounding chars
            let before_ok = i == 0 || !chars[i - 1].is_alphanumeric();
            let after_ok = i + wlen == chars.len() || !chars[i + wlen].is_alphanumeric();
            if before_ok && after_ok {
                out.push(SENTINEL_OPEN);
                out.extend(&chars[i..i + wlen]);
                out.push(SENTINEL_CLOSE);
                i += wlen;
                continue 'scan;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// A sentinel-delimited view of the working text.
///
/// Stages transform the open segments only; protected segments ride along
/// untouched until [`Segments::unwrap`].
#[derive(Debug, Clone)]
pub struct Segments {
    parts: Vec<Segment>,
}

#[derive(Debug, Clone)]
enum Segment {
    Open(String),
    Protected(String),
}

impl Segments {
    /// Split sentinel-wrapped text into open and protected segments.
    pub fn parse(text: &str) -> Self {
        let mut parts = Vec::new();
        let mut current = String::new();
        let mut protected = false;
        for c in text.chars() {
            match c {
                SENTINEL_OPEN => {
                    if !current.is_empty() {
                        parts.push(Segment::Open(std::mem::take(&mut current)));
                    }
                    protected = true;
                }
                SENTINEL_CLOSE => {
                    parts.push(Segment::Protected(std::mem::take(&mut current)));
                    protected = false;
                }
                other => current.push(other),
            }
        }
        if !current.is_empty() {
            if protected {
                // unbalanced sentinel in the input; treat the tail as protected
                parts.push(Segment::Protected(current));
            } else {
                parts.push(Segment::Open(current));
            }
        }
        Self { parts }
    }

    /// Apply `f` to every open segment.
    pub fn map_open<F: Fn(&str) -> String>(&mut self, f: F) {
        for part in &mut self.parts {
            if let Segment::Open(s) = part {
                *s = f(s);
            }
        }
    }

    /// Trim whitespace at the outermost edges (never inside protected text).
    pub fn trim_ends(&mut self) {
        if let Some(Segment::Open(s)) = self.parts.first_mut() {
            *s = s.trim_start().to_string();
        }
        if let Some(Segment::Open(s)) = self.parts.last_mut() {
            *s = s.trim_end().to_string();
        }
        self.parts.retain(|p| match p {
            Segment::Open(s) => !s.is_empty(),
            Segment::Protected(_) => true,
        });
    }

    /// Render with sentinels, for the per-stage debug trace.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Segment::Open(s) => out.push_str(s),
                Segment::Protected(s) => {
                    out.push(SENTINEL_OPEN);
                    out.push_str(s);
                    out.push(SENTINEL_CLOSE);
                }
            }
        }
        out
    }

    /// Strip sentinels and restore protected text verbatim.
    pub fn unwrap(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Segment::Open(s) | Segment::Protected(s) => out.push_str(s),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(ws: &[&str]) -> Vec<String> {
        ws.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn wraps_whole_words_case_insensitively() {
        let out = wrap_protected("een opg maken", &words(&["OPG"]));
        assert_eq!(out, format!("een {SENTINEL_OPEN}opg{SENTINEL_CLOSE} maken"));
    }

    #[test]
    fn keeps_source_casing() {
        let out = wrap_protected("Paro status", &words(&["paro"]));
        assert!(out.contains(&format!("{SENTINEL_OPEN}Paro{SENTINEL_CLOSE}")));
    }

    #[test]
    fn no_partial_word_match() {
        let out = wrap_protected("opgraven", &words(&["opg"]));
        assert_eq!(out, "opgraven");
    }

    #[test]
    fn longer_word_wins() {
        let out = wrap_protected("opg status", &words(&["opg", "opg status"]));
        assert_eq!(
            out,
            format!("{SENTINEL_OPEN}opg status{SENTINEL_CLOSE}")
        );
    }

    #[test]
    fn segments_round_trip() {
        let wrapped = wrap_protected("voor OPG na", &words(&["OPG"]));
        let mut segs = Segments::parse(&wrapped);
        segs.map_open(str::to_uppercase);
        assert_eq!(segs.unwrap(), "VOOR OPG NA");
    }

    #[test]
    fn trim_only_touches_open_edges() {
        let wrapped = wrap_protected("  OPG  ", &words(&["OPG"]));
        let mut segs = Segments::parse(&wrapped);
        segs.trim_ends();
        assert_eq!(segs.unwrap(), "OPG");
    }
}
