use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tempfile::NamedTempFile;
use vidchat_answer::DEFAULT_BASE_URL;

use crate::panel::PanelTexts;

pub const SETTINGS_DIRECTORY_NAME: &str = "vidchat";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const ENV_PREFIX: &str = "VIDCHAT_";
pub const DEFAULT_BANNER_DURATION_MS: u64 = 5_000;
pub const DEFAULT_GREETING: &str =
    "👋 Hi! I can answer questions about the current YouTube video. What would you like to know?";
pub const DEFAULT_APOLOGY: &str =
    "Sorry, I encountered an error. Please try again or check if the video has transcripts enabled.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelSettings {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_banner_duration_ms")]
    pub banner_duration_ms: u64,
    #[serde(default = "default_greeting")]
    pub greeting: String,
    #[serde(default = "default_apology")]
    pub apology: String,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            banner_duration_ms: default_banner_duration_ms(),
            greeting: default_greeting(),
            apology: default_apology(),
        }
    }
}

impl PanelSettings {
    pub fn normalized(mut self) -> Self {
        let base = self.api_base_url.trim().trim_end_matches('/');
        self.api_base_url = if base.is_empty() {
            default_api_base_url()
        } else {
            base.to_string()
        };
        if self.banner_duration_ms == 0 {
            self.banner_duration_ms = default_banner_duration_ms();
        }
        if self.greeting.trim().is_empty() {
            self.greeting = default_greeting();
        }
        if self.apology.trim().is_empty() {
            self.apology = default_apology();
        }

        self
    }

    pub fn banner_duration(&self) -> Duration {
        Duration::from_millis(self.banner_duration_ms)
    }

    pub fn texts(&self) -> PanelTexts {
        PanelTexts {
            greeting: self.greeting.clone(),
            apology: self.apology.clone(),
            ..PanelTexts::default()
        }
    }
}

/// Live settings plus the file they persist to.
#[derive(Debug)]
pub struct SettingsStore {
    settings: Arc<ArcSwap<PanelSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".vidchat"))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_layers(
            Figment::from(Serialized::defaults(PanelSettings::default()))
                .merge(Json::file(&config_path))
                .merge(Env::prefixed(ENV_PREFIX)),
            &config_path,
        );
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    /// Store without the environment layer, so tests see only the file.
    #[cfg(test)]
    fn from_file(config_path: PathBuf) -> Self {
        let settings = Self::load_layers(
            Figment::from(Serialized::defaults(PanelSettings::default()))
                .merge(Json::file(&config_path)),
            &config_path,
        );
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<PanelSettings> {
        self.settings.load_full()
    }

    /// Normalizes, writes and then publishes `settings`.
    ///
    /// Readers keep seeing the previous value if writing fails.
    pub fn update(&self, settings: PanelSettings) -> Result<Arc<PanelSettings>, SettingsError> {
        let settings = Arc::new(settings.normalized());
        self.write_file(&settings)?;
        self.settings.store(settings.clone());
        Ok(settings)
    }

    /// Replaces only the answering service base URL.
    pub fn save_api_base_url(
        &self,
        api_base_url: impl Into<String>,
    ) -> Result<Arc<PanelSettings>, SettingsError> {
        let mut settings = (*self.settings()).clone();
        settings.api_base_url = api_base_url.into();
        self.update(settings)
    }

    fn load_layers(figment: Figment, path: &Path) -> PanelSettings {
        if !path.exists() {
            tracing::info!(path = ?path, "settings file not found, using defaults and environment");
        }

        match figment.extract::<PanelSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(path = ?path, error = %error, "failed to parse settings, using defaults");
                PanelSettings::default()
            }
        }
    }

    /// Stages the JSON in a sibling temp file, then moves it over the settings file.
    fn write_file(&self, settings: &PanelSettings) -> Result<(), SettingsError> {
        let directory = match self.config_path.parent() {
            Some(directory) if !directory.as_os_str().is_empty() => directory,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(directory).context(PrepareDirectorySnafu {
            stage: "settings-directory",
            path: directory.to_path_buf(),
        })?;

        let mut staged = NamedTempFile::new_in(directory).context(StageFileSnafu {
            stage: "settings-stage",
            path: directory.to_path_buf(),
        })?;
        serde_json::to_writer_pretty(staged.as_file_mut(), settings).context(EncodeSnafu {
            stage: "settings-encode",
        })?;
        staged.persist(&self.config_path).context(ReplaceFileSnafu {
            stage: "settings-replace",
            path: self.config_path.clone(),
        })?;

        tracing::info!(path = ?self.config_path, api_base_url = %settings.api_base_url, "settings saved");
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("cannot prepare settings directory {path:?} (`{stage}`): {source}"))]
    PrepareDirectory {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot stage settings in {path:?} (`{stage}`): {source}"))]
    StageFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cannot encode settings (`{stage}`): {source}"))]
    Encode {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("cannot replace settings file {path:?} (`{stage}`): {source}"))]
    ReplaceFile {
        stage: &'static str,
        path: PathBuf,
        source: tempfile::PersistError,
    },
}

fn default_api_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_banner_duration_ms() -> u64 {
    DEFAULT_BANNER_DURATION_MS
}

fn default_greeting() -> String {
    DEFAULT_GREETING.to_string()
}

fn default_apology() -> String {
    DEFAULT_APOLOGY.to_string()
}
