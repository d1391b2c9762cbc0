use crate::{IgnoreMatcher, SettingsError};
use doiuse_config::ValidationSettings;
use std::sync::{Arc, PoisonError, RwLock};

/// Settings of the current configuration generation, with derived state.
#[derive(Debug)]
pub struct ActiveSettings {
    pub validation: ValidationSettings,
    /// Compiled from `validation.ignore_file_globs`.
    pub ignore: IgnoreMatcher,
}

impl ActiveSettings {
    #[must_use]
    pub fn new(validation: ValidationSettings) -> Self {
        let ignore = IgnoreMatcher::new(&validation.ignore_file_globs);
        Self { validation, ignore }
    }
}

/// Holds the live validation settings.
///
/// Replaced wholesale on every configuration change. Passes that already
/// hold an `Arc` keep seeing the settings they started with.
#[derive(Debug, Default)]
pub struct SettingsStore {
    current: RwLock<Option<Arc<ActiveSettings>>>,
}

impl SettingsStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, settings: ValidationSettings) -> Arc<ActiveSettings> {
        let active = Arc::new(ActiveSettings::new(settings));
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&active));
        active
    }

    pub fn current(&self) -> Result<Arc<ActiveSettings>, SettingsError> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(SettingsError::NotInitialized)
    }
}
