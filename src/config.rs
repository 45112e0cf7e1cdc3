use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::app_dirs::AppDirs;
use crate::error::ConfigError;
use crate::settings::Settings;

pub trait ConfigStore: Send + Sync {
    fn load(&self) -> Settings;
    fn save(&self, settings: &Settings) -> Result<(), ConfigError>;
}

/// Settings persisted as pretty JSON on disk
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new() -> Self {
        Self {
            path: AppDirs::config_path(),
        }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    /// Missing or unreadable files yield defaults; a partial file is merged
    /// over them.
    fn load(&self) -> Settings {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(_) => return Settings::default(),
        };
        match serde_json::from_slice::<Settings>(&bytes) {
            Ok(settings) => settings.merged_with_defaults(),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring corrupt settings file");
                Settings::default()
            }
        }
    }

    fn save(&self, settings: &Settings) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(settings)?;
        fs::write(&self.path, data)?;
        Ok(())
    }
}
