//! The normalization pipeline driver.
//!
//! Stages run in a fixed order, each consuming the previous stage's output.
//! Protected spans are wrapped first and skipped by every stage in between;
//! the sentinels are stripped last. The pipeline is a pure function of its
//! inputs: no I/O, no clock, no global state.

use super::elements::{parse_elements, space_separators};
use super::fold::nfc_clean;
use super::patterns::apply_patterns;
use super::postprocess::postprocess;
use super::protect::{Segments, wrap_protected};
use super::variants::{apply_variants, phonetic_pass, restore_diacritics, split_hyphens};
use crate::error::{GatewayError, Result};
use crate::lexicon::Snapshot;
use serde::Serialize;

/// One intermediate string in the per-stage debug trace.
#[derive(Debug, Clone, Serialize)]
pub struct StageTrace {
    pub stage: &'static str,
    pub text: String,
}

/// Output of [`normalize`].
#[derive(Debug, Clone, Serialize)]
pub struct NormalizationResult {
    /// The canonical text.
    pub normalized_text: String,
    /// Ordered per-stage intermediates, for debugging and tests.
    pub debug: Vec<StageTrace>,
    /// Echo of the input language tag.
    pub language: String,
}

/// Normalize raw transcript text against a lexicon snapshot.
///
/// # Errors
///
/// Fails only when the snapshot carries no element separators; every other
/// input produces a result (possibly identical to the input).
pub fn normalize(text: &str, language: &str, snapshot: &Snapshot) -> Result<NormalizationResult> {
    if snapshot.separators().is_empty() {
        return Err(GatewayError::ConfigMissing("element_separators".to_string()));
    }

    let stages = snapshot.stages();
    let mut debug = Vec::new();

    let wrapped = if stages.protected_wrap {
        wrap_protected(text, snapshot.protected_words())
    } else {
        text.to_string()
    };
    debug.push(StageTrace {
        stage: "protected_wrap",
        text: wrapped.clone(),
    });

    let mut segs = Segments::parse(&wrapped);

    let run = |segs: &mut Segments,
                   debug: &mut Vec<StageTrace>,
                   enabled: bool,
                   stage: &'static str,
                   f: &dyn Fn(&str) -> String| {
        if enabled {
            segs.map_open(f);
        }
        debug.push(StageTrace {
            stage,
            text: segs.render(),
        });
    };

    run(&mut segs, &mut debug, stages.unicode_cleanup, "unicode_cleanup", &|s| {
        nfc_clean(s)
    });
    run(&mut segs, &mut debug, stages.preprocessing, "preprocessing", &|s| {
        space_separators(s, snapshot.separators())
    });
    run(&mut segs, &mut debug, stages.element_parsing, "element_parsing", &|s| {
        parse_elements(s, snapshot)
    });
    run(
        &mut segs,
        &mut debug,
        stages.pattern_replacement,
        "pattern_replacement",
        &|s| apply_patterns(s, snapshot),
    );
    run(
        &mut segs,
        &mut debug,
        stages.variant_generation,
        "variant_generation",
        &|s| apply_variants(s, snapshot),
    );
    run(&mut segs, &mut debug, stages.hyphen_split, "hyphen_split", &|s| {
        split_hyphens(s, snapshot)
    });
    run(&mut segs, &mut debug, stages.phonetic, "phonetic", &|s| {
        phonetic_pass(s, snapshot)
    });
    run(
        &mut segs,
        &mut debug,
        stages.diacritics_restore,
        "diacritics_restore",
        &|s| restore_diacritics(s, snapshot),
    );
    run(&mut segs, &mut debug, stages.postprocess, "postprocessing", &|s| {
        postprocess(s, snapshot)
    });

    segs.trim_ends();
    let normalized_text = segs.unwrap();
    debug.push(StageTrace {
        stage: "protected_unwrap",
        text: normalized_text.clone(),
    });

    Ok(NormalizationResult {
        normalized_text,
        debug,
        language: language.to_string(),
    })
}
