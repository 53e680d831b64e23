use std::path::PathBuf;

/// Cache configuration.
#[derive(Clone, serde::Deserialize, serde::Serialize, Debug, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory under which the files backing the cache are stored.
    pub base_dir: PathBuf,

    /// Sync the backing file to disk after each update.
    ///
    /// This is slow and only useful if the data in the backing
    /// file must survive a crash, which the cache itself never
    /// relies on, as known ranges are not persisted.
    #[serde(default)]
    pub sync_on_update: bool,
}

impl CacheConfig {
    pub fn new(base_dir: PathBuf) -> Self {
        Self {
            base_dir,
            sync_on_update: false,
        }
    }
}
