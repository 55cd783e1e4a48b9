//! Shared, explicitly scoped dictionary cache
//!
//! A consumer that downloads a dictionary, or a provider configured with
//! dictionary files, stores the result here under a name. Components that
//! need it receive the registry by `Arc`; there is no process-wide instance.

use super::DataDictionary;
use crate::error::CodecResult;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Default)]
pub struct DictionaryRegistry {
    entries: RwLock<HashMap<String, Arc<DataDictionary>>>,
}

impl DictionaryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `dictionary` under `name`, replacing any previous entry
    pub fn insert(&self, name: impl Into<String>, dictionary: DataDictionary) -> Arc<DataDictionary> {
        let dictionary = Arc::new(dictionary);
        self.entries.write().insert(name.into(), Arc::clone(&dictionary));
        dictionary
    }

    pub fn get(&self, name: &str) -> Option<Arc<DataDictionary>> {
        self.entries.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<DataDictionary>> {
        self.entries.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Cached dictionary for this file pair, loading it on first use
    pub fn load_files(
        &self,
        field_path: impl AsRef<Path>,
        enum_path: impl AsRef<Path>,
    ) -> CodecResult<Arc<DataDictionary>> {
        let (field_path, enum_path) = (field_path.as_ref(), enum_path.as_ref());
        let name = format!("{}|{}", field_path.display(), enum_path.display());
        if let Some(existing) = self.get(&name) {
            return Ok(existing);
        }
        let dictionary = DataDictionary::load_files(field_path, enum_path)?;
        info!(
            fields = dictionary.field_count(),
            enum_tables = dictionary.enum_tables().len(),
            source = %name,
            "Dictionary loaded"
        );
        Ok(self.insert(name, dictionary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registries_are_independent() {
        let first = DictionaryRegistry::new();
        let second = DictionaryRegistry::new();
        first.insert("default", DataDictionary::new());
        assert!(first.contains("default"));
        assert!(!second.contains("default"));
        assert!(first.remove("default").is_some());
        assert!(first.is_empty());
    }

    #[test]
    fn missing_files_report_an_error() {
        let registry = DictionaryRegistry::new();
        assert!(registry.load_files("/nonexistent/RDMFieldDictionary", "/nonexistent/enumtype.def").is_err());
        assert!(registry.is_empty());
    }
}
