use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "faceoff";

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// Practice history lives under $HOME/.local/state/faceoff when HOME is set
    pub fn db_path() -> PathBuf {
        if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".local")
                .join("state")
                .join(APP_NAME)
                .join("history.db")
        } else if let Some(proj_dirs) = ProjectDirs::from("", "", APP_NAME) {
            proj_dirs.data_local_dir().join("history.db")
        } else {
            PathBuf::from("faceoff_history.db")
        }
    }

    pub fn config_path() -> PathBuf {
        ProjectDirs::from("", "", APP_NAME)
            .map(|pd| pd.config_dir().join("settings.json"))
            .unwrap_or_else(|| PathBuf::from("faceoff_settings.json"))
    }
}
