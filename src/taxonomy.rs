//! Taxonomy store: the accumulated category → label → description document.
//!
//! The taxonomy is read at the start of every interpretation (it becomes LLM
//! context) and written at most once per interpretation (labels the LLM
//! reports as new). Two rules hold for every write path:
//!
//! * **Additive only.** A merge inserts missing labels and missing
//!   categories. An existing label keeps its first description forever.
//! * **Reload under lock.** [`TaxonomyRepository::merge`] takes the store's
//!   single lock, re-reads the current document, merges, and persists before
//!   releasing. Two concurrent requests therefore cannot each merge into a
//!   stale copy and clobber the other's additions.
//!
//! The persistence medium sits behind [`TaxonomyRepository`]; the merge rules
//! live on [`Taxonomy`] itself so every backend shares them.

use crate::error::AvError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Categories present in a freshly created taxonomy.
pub const DEFAULT_CATEGORIES: [&str; 4] = ["devices", "symbols", "abbreviations", "wire_labels"];

/// Category that flat (uncategorised) entries are filed under.
pub const LEGACY_CATEGORY: &str = "devices";

/// Default location of the shared taxonomy document.
pub const DEFAULT_TAXONOMY_PATH: &str = "taxonomy_db.json";

/// A taxonomy document: category → (label → description).
///
/// Ordered maps keep serialisation (and therefore the prompt) deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Taxonomy(BTreeMap<String, BTreeMap<String, String>>);

impl Taxonomy {
    /// An empty document with the default categories present.
    pub fn seeded() -> Self {
        let mut t = Self::default();
        for category in DEFAULT_CATEGORIES {
            t.0.insert(category.to_string(), BTreeMap::new());
        }
        t
    }

    /// Read a loosely-typed JSON value as a taxonomy.
    ///
    /// Accepts the nested shape (`{"devices": {"DMPS3": "..."}}`) and the
    /// flat shape older replies use (`{"DMPS3": "..."}`), which is filed under
    /// [`LEGACY_CATEGORY`]. Non-string descriptions are stringified; a value
    /// that is not an object yields an empty taxonomy.
    pub fn from_value(value: &Value) -> Self {
        let mut out = Self::default();
        let Some(object) = value.as_object() else {
            return out;
        };

        for (key, v) in object {
            match v {
                Value::Object(labels) => {
                    let category = out.0.entry(key.clone()).or_default();
                    for (label, description) in labels {
                        category
                            .entry(label.clone())
                            .or_insert_with(|| describe(description));
                    }
                }
                Value::Null => {}
                other => {
                    out.0
                        .entry(LEGACY_CATEGORY.to_string())
                        .or_default()
                        .entry(key.clone())
                        .or_insert_with(|| describe(other));
                }
            }
        }
        out
    }

    /// Additively merge `delta` into `self`, returning the number of labels added.
    ///
    /// Labels already present keep their description even when `delta`
    /// carries a different one. Missing categories are created, including
    /// empty ones, which do not count as additions.
    pub fn merge_from(&mut self, delta: &Taxonomy) -> usize {
        let mut added = 0;
        for (category, labels) in &delta.0 {
            let target = self.0.entry(category.clone()).or_default();
            for (label, description) in labels {
                if !target.contains_key(label) {
                    target.insert(label.clone(), description.clone());
                    added += 1;
                }
            }
        }
        added
    }

    /// Look up a label's description.
    pub fn get(&self, category: &str, label: &str) -> Option<&str> {
        self.0.get(category)?.get(label).map(String::as_str)
    }

    /// Insert a label unless it already exists. Returns true when inserted.
    pub fn insert(
        &mut self,
        category: impl Into<String>,
        label: impl Into<String>,
        description: impl Into<String>,
    ) -> bool {
        let labels = self.0.entry(category.into()).or_default();
        let label = label.into();
        if labels.contains_key(&label) {
            return false;
        }
        labels.insert(label, description.into());
        true
    }

    /// Iterate categories in name order.
    pub fn categories(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, String>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Total number of labels across all categories.
    pub fn label_count(&self) -> usize {
        self.0.values().map(BTreeMap::len).sum()
    }

    /// True when no category holds any label.
    pub fn is_empty(&self) -> bool {
        self.label_count() == 0
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Result of a [`TaxonomyRepository::merge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Labels that were not previously present.
    pub added: usize,
    /// Whether the backing document was rewritten.
    pub persisted: bool,
}

/// Storage for the shared taxonomy.
#[async_trait]
pub trait TaxonomyRepository: Send + Sync {
    /// Current document. A store that has never been written returns
    /// [`Taxonomy::seeded`].
    async fn load(&self) -> Result<Taxonomy, AvError>;

    /// Atomically merge `delta` into the stored document (see module docs).
    async fn merge(&self, delta: &Taxonomy) -> Result<MergeOutcome, AvError>;
}

// ── File-backed store ────────────────────────────────────────────────────

/// A taxonomy persisted as one pretty-printed JSON document.
pub struct FileTaxonomyStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTaxonomyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<Taxonomy, AvError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No taxonomy at {}, using defaults", self.path.display());
                return Ok(Taxonomy::seeded());
            }
            Err(source) => {
                return Err(AvError::TaxonomyRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let value: Value =
            serde_json::from_slice(&bytes).map_err(|source| AvError::TaxonomyMalformed {
                path: self.path.clone(),
                source,
            })?;
        Ok(Taxonomy::from_value(&value))
    }

    /// Write via temp file + rename so readers never observe a partial file.
    async fn persist(&self, taxonomy: &Taxonomy) -> Result<(), AvError> {
        let write_err = |detail: String| AvError::TaxonomyWrite {
            path: self.path.clone(),
            detail,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| write_err(e.to_string()))?;
            }
        }

        let json = serde_json::to_string_pretty(taxonomy).map_err(|e| write_err(e.to_string()))?;
        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| write_err(e.to_string()))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| write_err(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl TaxonomyRepository for FileTaxonomyStore {
    async fn load(&self) -> Result<Taxonomy, AvError> {
        self.read_document().await
    }

    async fn merge(&self, delta: &Taxonomy) -> Result<MergeOutcome, AvError> {
        let _guard = self.lock.lock().await;

        let mut current = self.read_document().await?;
        let added = current.merge_from(delta);
        if added == 0 {
            return Ok(MergeOutcome {
                added,
                persisted: false,
            });
        }

        self.persist(&current).await?;
        info!(
            "Taxonomy updated: {} new labels ({} total) → {}",
            added,
            current.label_count(),
            self.path.display()
        );
        Ok(MergeOutcome {
            added,
            persisted: true,
        })
    }
}

// ── In-memory store ──────────────────────────────────────────────────────

/// A taxonomy held in process memory. Same contract as the file store.
pub struct MemoryTaxonomyStore {
    document: Mutex<Taxonomy>,
}

impl MemoryTaxonomyStore {
    pub fn new(initial: Taxonomy) -> Self {
        Self {
            document: Mutex::new(initial),
        }
    }

    /// Copy of the current document.
    pub async fn snapshot(&self) -> Taxonomy {
        self.document.lock().await.clone()
    }
}

impl Default for MemoryTaxonomyStore {
    fn default() -> Self {
        Self::new(Taxonomy::seeded())
    }
}

#[async_trait]
impl TaxonomyRepository for MemoryTaxonomyStore {
    async fn load(&self) -> Result<Taxonomy, AvError> {
        Ok(self.document.lock().await.clone())
    }

    async fn merge(&self, delta: &Taxonomy) -> Result<MergeOutcome, AvError> {
        let mut document = self.document.lock().await;
        let added = document.merge_from(delta);
        Ok(MergeOutcome {
            added,
            persisted: added > 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn delta(value: Value) -> Taxonomy {
        Taxonomy::from_value(&value)
    }

    #[test]
    fn seeded_has_default_categories_and_no_labels() {
        let t = Taxonomy::seeded();
        assert_eq!(t.categories().count(), 4);
        assert!(t.is_empty());
    }

    #[test]
    fn merge_is_idempotent() {
        let mut t = Taxonomy::seeded();
        let d = delta(json!({"devices": {"DMP64": "Extron DSP"}, "symbols": {"⊗": "ceiling speaker"}}));
        assert_eq!(t.merge_from(&d), 2);
        let after_first = t.clone();
        assert_eq!(t.merge_from(&d), 0);
        assert_eq!(t, after_first);
    }

    #[test]
    fn merge_never_overwrites_existing_label() {
        let mut t = Taxonomy::default();
        t.insert("devices", "DMPS3", "Crestron control processor");
        let added = t.merge_from(&delta(json!({"devices": {"DMPS3": "something else"}})));
        assert_eq!(added, 0);
        assert_eq!(t.get("devices", "DMPS3"), Some("Crestron control processor"));
    }

    #[test]
    fn merge_creates_missing_categories() {
        let mut t = Taxonomy::default();
        t.merge_from(&delta(json!({"wire_labels": {"W-101": "HDMI run, rack to display"}})));
        assert_eq!(t.get("wire_labels", "W-101"), Some("HDMI run, rack to display"));
    }

    #[test]
    fn flat_entries_are_filed_under_devices() {
        let t = delta(json!({"Extron switcher": "AV switcher"}));
        assert_eq!(t.get(LEGACY_CATEGORY, "Extron switcher"), Some("AV switcher"));
    }

    #[test]
    fn non_object_value_is_empty() {
        assert!(delta(json!(["a", "b"])).is_empty());
        assert!(delta(Value::Null).is_empty());
    }

    #[test]
    fn non_string_descriptions_are_stringified() {
        let t = delta(json!({"devices": {"AMP-1": 4, "MIC": null}}));
        assert_eq!(t.get("devices", "AMP-1"), Some("4"));
        assert_eq!(t.get("devices", "MIC"), Some(""));
    }

    #[tokio::test]
    async fn file_store_missing_file_loads_seeded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTaxonomyStore::new(dir.path().join("taxonomy_db.json"));
        assert_eq!(store.load().await.unwrap(), Taxonomy::seeded());
    }

    #[tokio::test]
    async fn file_store_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy_db.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = FileTaxonomyStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(AvError::TaxonomyMalformed { .. })
        ));
    }

    #[tokio::test]
    async fn file_store_skips_write_when_nothing_new() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy_db.json");
        let store = FileTaxonomyStore::new(&path);

        let outcome = store.merge(&Taxonomy::default()).await.unwrap();
        assert_eq!(outcome, MergeOutcome { added: 0, persisted: false });
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_store_reloads_before_merging() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy_db.json");
        let store = FileTaxonomyStore::new(&path);
        store
            .merge(&delta(json!({"devices": {"DMPS3": "Crestron control processor"}})))
            .await
            .unwrap();

        // Another writer adds a label behind this store's back.
        let mut external: Taxonomy =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        external.insert("symbols", "◎", "ceiling speaker");
        std::fs::write(&path, serde_json::to_string(&external).unwrap()).unwrap();

        store
            .merge(&delta(json!({"devices": {"DTP": "Extron twisted-pair"}})))
            .await
            .unwrap();

        let reloaded = store.load().await.unwrap();
        assert_eq!(reloaded.get("symbols", "◎"), Some("ceiling speaker"));
        assert_eq!(reloaded.get("devices", "DTP"), Some("Extron twisted-pair"));
        assert_eq!(reloaded.get("devices", "DMPS3"), Some("Crestron control processor"));
    }

    #[tokio::test]
    async fn concurrent_merges_keep_every_label() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileTaxonomyStore::new(dir.path().join("taxonomy_db.json")));

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let mut d = Taxonomy::default();
                d.insert("devices", format!("DEV-{i}"), format!("device {i}"));
                store.merge(&d).await.unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap().added, 1);
        }

        let t = store.load().await.unwrap();
        assert_eq!(t.label_count(), 16);
    }

    #[tokio::test]
    async fn memory_store_follows_the_same_rules() {
        let store = MemoryTaxonomyStore::default();
        let d = delta(json!({"abbreviations": {"DSP": "digital signal processor"}}));
        assert_eq!(store.merge(&d).await.unwrap().added, 1);
        assert_eq!(store.merge(&d).await.unwrap().added, 0);
        assert_eq!(
            store.snapshot().await.get("abbreviations", "DSP"),
            Some("digital signal processor")
        );
    }
}
