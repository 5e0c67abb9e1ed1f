//! Options for opening a local store.

/// Knobs honored by [`crate::LocalStore::open_with_config`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Create the store directory when it does not exist yet.
    pub create_if_missing: bool,

    /// Fsync the journal after every append. Turning this off trades
    /// crash durability of the last few writes for speed.
    pub sync_on_write: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
        }
    }
}

impl StoreConfig {
    /// Same as [`StoreConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides directory creation.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Overrides per-append fsync.
    #[must_use]
    pub const fn sync_on_write(mut self, value: bool) -> Self {
        self.sync_on_write = value;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_favor_safety() {
        let config = StoreConfig::default();
        assert!(config.create_if_missing);
        assert!(config.sync_on_write);
    }

    #[test]
    fn overrides_stick() {
        let config = StoreConfig::new()
            .create_if_missing(false)
            .sync_on_write(false);

        assert!(!config.create_if_missing);
        assert!(!config.sync_on_write);
    }
}
