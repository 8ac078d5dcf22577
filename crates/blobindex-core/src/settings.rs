use crate::blobref::BlobRef;
use std::collections::HashMap;

///
/// IndexSettings
///
/// Runtime knobs, sourced from the environment at construction. Tests use
/// [`IndexSettings::from_env_map`] so they never mutate process state.
///

#[derive(Clone, Debug)]
pub struct IndexSettings {
    /// `REDO_INDEX_ON_RECEIVE`: re-process a blob even when its `have` row
    /// already carries the `|indexed` suffix.
    pub redo_index_on_receive: bool,

    /// `DEBUG`: verbose ingest logging.
    pub debug: bool,

    /// `DEBUG_IMAGES`: verbose EXIF logging.
    pub debug_images: bool,

    /// `REINDEX_START`: resume a full reindex at this ref.
    pub reindex_start: Option<BlobRef>,

    /// `TESTREINDEX_DISABLE_OOO`: run dependents synchronously instead of
    /// on the worker pool, for deterministic tests.
    pub disable_ooo_pool: bool,

    /// Parallelism of the out-of-order re-index pool.
    pub reindex_workers: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            redo_index_on_receive: false,
            debug: false,
            debug_images: false,
            reindex_start: None,
            disable_ooo_pool: false,
            reindex_workers: 4,
        }
    }
}

impl IndexSettings {
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    #[must_use]
    pub fn from_env_map(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|name| vars.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str| lookup(name).is_some_and(|v| is_truthy(&v));

        Self {
            redo_index_on_receive: flag("REDO_INDEX_ON_RECEIVE"),
            debug: flag("DEBUG"),
            debug_images: flag("DEBUG_IMAGES"),
            reindex_start: lookup("REINDEX_START").and_then(|v| BlobRef::parse_opt(&v)),
            disable_ooo_pool: flag("TESTREINDEX_DISABLE_OOO"),
            ..Self::default()
        }
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_off() {
        let s = IndexSettings::default();
        assert!(!s.redo_index_on_receive);
        assert!(!s.disable_ooo_pool);
        assert_eq!(s.reindex_workers, 4);
    }

    #[test]
    fn env_map_parsing() {
        let start = BlobRef::from_sha224(b"resume-here");
        let vars: HashMap<String, String> = [
            ("REDO_INDEX_ON_RECEIVE".to_string(), "1".to_string()),
            ("DEBUG".to_string(), "true".to_string()),
            ("DEBUG_IMAGES".to_string(), "0".to_string()),
            ("REINDEX_START".to_string(), start.to_string()),
            ("TESTREINDEX_DISABLE_OOO".to_string(), "yes".to_string()),
        ]
        .into();

        let s = IndexSettings::from_env_map(&vars);
        assert!(s.redo_index_on_receive);
        assert!(s.debug);
        assert!(!s.debug_images);
        assert_eq!(s.reindex_start, Some(start));
        assert!(s.disable_ooo_pool);
    }
}
