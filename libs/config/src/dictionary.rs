//! Where the data dictionary comes from

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Field and enum dictionary files in the standard text formats
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryFiles {
    pub field_path: PathBuf,
    pub enum_path: PathBuf,
}

impl DictionaryFiles {
    pub(crate) fn expand(&mut self) -> crate::Result<()> {
        self.field_path = crate::loader::expand_path("dictionary.field_path", &self.field_path)?;
        self.enum_path = crate::loader::expand_path("dictionary.enum_path", &self.enum_path)?;
        Ok(())
    }
}

/// How a consumer obtains its dictionary
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DictionarySource {
    /// Request `RWFFld` and `RWFEnum` from the provider after the directory refresh
    Download,
    /// Load local files at startup
    Files(DictionaryFiles),
    /// Decode without field definitions
    #[default]
    Disabled,
}
