//! Assembles per-user snapshots from the store documents.

use super::snapshot::{PostprocessFlags, Snapshot, StageSwitches};
use super::store::LexiconStore;
use crate::error::{GatewayError, Result};
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// `{category → {canonical → [variants]}}`.
type LexiconMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UserDocument {
    lexicon: LexiconMap,
    custom_patterns: Vec<PatternDoc>,
    protected_words: Vec<String>,
    config: Option<ConfigDoc>,
}

#[derive(Debug, Clone, Deserialize)]
struct PatternDoc {
    #[serde(rename = "match")]
    match_: String,
    replace: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigDoc {
    variant_generation: Option<ToggleDoc>,
    phonetic: Option<PhoneticDoc>,
    postprocess: Option<PostprocessFlags>,
    normalization: Option<NormalizationDoc>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
struct ToggleDoc {
    enabled: bool,
}

impl Default for ToggleDoc {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct PhoneticDoc {
    enabled: bool,
    threshold: f64,
}

impl Default for PhoneticDoc {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: super::snapshot::DEFAULT_PHONETIC_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct NormalizationDoc {
    element_separators: Vec<String>,
    digit_words: Option<HashMap<String, String>>,
    protected_wrap: bool,
    unicode_cleanup: bool,
    preprocessing: bool,
    element_parsing: bool,
    pattern_replacement: bool,
    hyphen_split: bool,
    diacritics_restore: bool,
    postprocess: bool,
}

impl Default for NormalizationDoc {
    fn default() -> Self {
        Self {
            element_separators: ["-", " ", ",", ";", "/"].map(String::from).to_vec(),
            digit_words: None,
            protected_wrap: true,
            unicode_cleanup: true,
            preprocessing: true,
            element_parsing: true,
            pattern_replacement: true,
            hyphen_split: true,
            diacritics_restore: true,
            postprocess: true,
        }
    }
}

/// Builds and caches one [`Snapshot`] per user.
///
/// Snapshots are created on the first request for a user and reused until
/// [`LexiconLoader::invalidate`] drops them.
pub struct LexiconLoader {
    store: Arc<dyn LexiconStore>,
    cache: DashMap<String, Arc<Snapshot>>,
}

impl LexiconLoader {
    pub fn new(store: Arc<dyn LexiconStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
        }
    }

    /// Fetch the cached snapshot for a user, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG_MISSING` when a required configuration section is
    /// absent, or a store error when a document cannot be read.
    pub async fn snapshot(&self, user_id: &str) -> Result<Arc<Snapshot>> {
        if let Some(cached) = self.cache.get(user_id) {
            return Ok(Arc::clone(&cached));
        }
        let built = Arc::new(self.build(user_id).await?);
        self.cache.insert(user_id.to_string(), Arc::clone(&built));
        debug!(user_id, "lexicon snapshot built");
        Ok(built)
    }

    /// Drop a cached snapshot so the next request rebuilds it.
    pub fn invalidate(&self, user_id: &str) {
        self.cache.remove(user_id);
    }

    async fn build(&self, user_id: &str) -> Result<Snapshot> {
        let global: LexiconMap = from_value(self.store.global_lexicon().await?, "global_lexicon")?;
        let protected: Vec<String> =
            from_value(self.store.protected_words().await?, "protected_words")?;
        let mut config: ConfigDoc = from_value(self.store.config().await?, "config")?;
        let user: UserDocument = match self.store.user_document(user_id).await? {
            Some(doc) => from_value(doc, "user_document")?,
            None => UserDocument::default(),
        };

        if let Some(user_config) = user.config {
            merge_config(&mut config, user_config);
        }
        let Some(normalization) = config.normalization else {
            return Err(GatewayError::ConfigMissing("normalization".to_string()));
        };
        let phonetic = config.phonetic.unwrap_or_default();
        let variant_generation = config.variant_generation.unwrap_or_default();

        let mut builder = Snapshot::builder()
            .phonetic_threshold(phonetic.threshold)
            .postprocess(config.postprocess.unwrap_or_default())
            .stages(StageSwitches {
                protected_wrap: normalization.protected_wrap,
                unicode_cleanup: normalization.unicode_cleanup,
                preprocessing: normalization.preprocessing,
                element_parsing: normalization.element_parsing,
                pattern_replacement: normalization.pattern_replacement,
                variant_generation: variant_generation.enabled,
                hyphen_split: normalization.hyphen_split,
                phonetic: phonetic.enabled,
                diacritics_restore: normalization.diacritics_restore,
                postprocess: normalization.postprocess,
            })
            .separators(normalization.element_separators.clone());
        if let Some(words) = normalization.digit_words {
            builder = builder.digit_words(words);
        }

        let mut lexicon = global;
        for (category, entries) in user.lexicon {
            lexicon.entry(category).or_default().extend(entries);
        }

        // main categories first: they define the canonical set the
        // abbreviation categories may promote into
        let mut main_canonicals = BTreeSet::new();
        for (category, entries) in &lexicon {
            if category.ends_with("_abbr") {
                continue;
            }
            for (canonical, variants) in entries {
                main_canonicals.insert(canonical.clone());
                builder = builder.canonical(canonical);
                for variant in variants {
                    builder = builder.variant(variant, canonical);
                }
            }
        }
        for (category, entries) in &lexicon {
            if !category.ends_with("_abbr") {
                continue;
            }
            for (canonical, variants) in entries {
                if main_canonicals.contains(canonical) {
                    builder = builder.canonical(canonical);
                }
                for variant in variants {
                    builder = builder.variant(variant, canonical);
                }
            }
        }

        for word in protected.iter().chain(user.protected_words.iter()) {
            builder = builder.protected(word);
        }
        for pattern in &user.custom_patterns {
            builder = builder.pattern(&pattern.match_, &pattern.replace);
        }

        Ok(builder.build())
    }
}

fn merge_config(base: &mut ConfigDoc, overlay: ConfigDoc) {
    if overlay.variant_generation.is_some() {
        base.variant_generation = overlay.variant_generation;
    }
    if overlay.phonetic.is_some() {
        base.phonetic = overlay.phonetic;
    }
    if overlay.postprocess.is_some() {
        base.postprocess = overlay.postprocess;
    }
    if overlay.normalization.is_some() {
        base.normalization = overlay.normalization;
    }
}

fn from_value<T: serde::de::DeserializeOwned>(value: serde_json::Value, doc: &str) -> Result<T> {
    serde_json::from_value(value).map_err(|e| GatewayError::Store(format!("{doc}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::MemoryStore;
    use serde_json::json;

    fn store() -> MemoryStore {
        MemoryStore::new(
            json!({
                "anatomie": {
                    "cariës": ["karies", "caries"],
                    "ca.": []
                },
                "anatomie_abbr": {
                    "ca.": ["circa"],
                    "n.v.t.": ["niet van toepassing"]
                }
            }),
            json!(["OPG", "NVvT"]),
            json!({
                "phonetic": {"threshold": 0.84},
                "normalization": {}
            }),
        )
    }

    #[tokio::test]
    async fn builds_and_caches_snapshot() {
        let loader = LexiconLoader::new(Arc::new(store()));
        let snap = loader.snapshot("jan").await.expect("snapshot");
        assert!(snap.canonicals().contains("cariës"));
        assert_eq!(snap.variant_canonical("circa"), Some("ca."));
        assert_eq!(snap.protected_words(), ["OPG", "NVvT"]);

        let again = loader.snapshot("jan").await.expect("snapshot");
        assert!(Arc::ptr_eq(&snap, &again));
        loader.invalidate("jan");
        let rebuilt = loader.snapshot("jan").await.expect("snapshot");
        assert!(!Arc::ptr_eq(&snap, &rebuilt));
    }

    #[tokio::test]
    async fn abbr_promotion_requires_main_canonical() {
        let loader = LexiconLoader::new(Arc::new(store()));
        let snap = loader.snapshot("jan").await.expect("snapshot");
        // "ca." is in a main category: promoted, dot-protected
        assert!(snap.canonicals().contains("ca."));
        assert!(snap.abbreviations().contains(&"ca.".to_string()));
        // "n.v.t." only appears under _abbr: variants-only
        assert!(!snap.canonicals().contains("n.v.t."));
        assert_eq!(snap.variant_canonical("niet van toepassing"), Some("n.v.t."));
    }

    #[tokio::test]
    async fn missing_normalization_section_is_config_missing() {
        let store = MemoryStore::new(json!({}), json!([]), json!({"phonetic": {}}));
        // serde sees no "normalization" key: None
        let loader = LexiconLoader::new(Arc::new(store));
        let err = loader.snapshot("jan").await.unwrap_err();
        assert_eq!(err.wire_code(), "CONFIG_MISSING");
    }

    #[tokio::test]
    async fn user_overlay_extends_lexicon() {
        let store = store();
        store.users.insert(
            "piet".to_string(),
            json!({
                "lexicon": {"eigen": {"composiet": ["composite"]}},
                "custom_patterns": [{"match": "\\bkanaal\\b", "replace": "wortelkanaal"}],
                "protected_words": ["PietCo"],
                "config": {"phonetic": {"enabled": true, "threshold": 0.9}}
            }),
        );
        let loader = LexiconLoader::new(Arc::new(store));
        let snap = loader.snapshot("piet").await.expect("snapshot");
        assert!(snap.canonicals().contains("composiet"));
        assert_eq!(snap.patterns().len(), 1);
        assert!(snap.protected_words().contains(&"PietCo".to_string()));
        assert!((snap.phonetic_threshold() - 0.9).abs() < f64::EPSILON);
    }
}
