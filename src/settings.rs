use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{Result, TelloError};

pub const DEFAULT_DRONE_HOST: &str = "192.168.10.1";
pub const DEFAULT_COMMAND_PORT: u16 = 8889;
pub const DEFAULT_VIDEO_PORT: u16 = 11111;

const API_TOKEN_VAR: &str = "HUGGINGFACE_API_TOKEN";

/// Flight, video and analysis settings.
///
/// Loaded from a flat TOML file in which every key is optional, eg.
///
/// ```toml
/// api_token = "hf_..."
/// model_name = "microsoft/StreamVLM"
/// max_movement_distance = 300
/// emergency_words = ["emergency", "stop", "halt", "abort", "cancel"]
/// ```
///
/// The `HUGGINGFACE_API_TOKEN` environment variable, when set, takes
/// precedence over `api_token`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Hugging Face inference API token; no token means simulated analysis
    pub api_token: Option<String>,
    /// Hosted vision-language model to query
    pub model_name: String,
    /// Seconds between automatic scene analyses
    pub auto_analysis_interval: u64,
    /// Number of analyses kept in memory
    pub max_analysis_history: usize,

    pub min_movement_distance: u32,
    pub max_movement_distance: u32,
    pub min_rotation_angle: u32,
    pub max_rotation_angle: u32,
    pub default_movement_distance: u32,
    pub default_rotation_angle: u32,

    /// Words that abort everything else in an instruction
    pub emergency_words: Vec<String>,

    pub drone_host: String,
    /// Drone's command port
    pub command_port: u16,
    /// Local port commands are sent from; 0 picks any free port
    pub local_command_port: u16,
    pub video_port: u16,
    /// How long a single video candidate gets to produce a frame
    pub video_probe_timeout_ms: u64,
    /// How long to wait for the drone to reply to a command
    pub response_timeout_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_token: None,
            model_name: "microsoft/StreamVLM".to_string(),
            auto_analysis_interval: 5,
            max_analysis_history: 10,
            min_movement_distance: 20,
            max_movement_distance: 500,
            min_rotation_angle: 1,
            max_rotation_angle: 360,
            default_movement_distance: 50,
            default_rotation_angle: 90,
            emergency_words: ["emergency", "stop", "halt", "abort"]
                .iter()
                .map(|w| w.to_string())
                .collect(),
            drone_host: DEFAULT_DRONE_HOST.to_string(),
            command_port: DEFAULT_COMMAND_PORT,
            local_command_port: DEFAULT_COMMAND_PORT,
            video_port: DEFAULT_VIDEO_PORT,
            video_probe_timeout_ms: 2000,
            response_timeout_ms: 10_000,
        }
    }
}

impl Settings {
    /// Reads settings from a TOML file, then applies environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("loading settings from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        let mut settings = Self::from_toml(&text)?;
        settings.apply_env();
        Ok(settings)
    }

    /// Defaults plus environment overrides, for when there is no settings file.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        settings.apply_env();
        settings
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(text)
            .map_err(|e| TelloError::Settings { msg: e.to_string() })?;
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env(&mut self) {
        self.override_token(std::env::var(API_TOKEN_VAR).ok());
    }

    /// A non-blank `token` replaces the configured one.
    fn override_token(&mut self, token: Option<String>) {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            debug!("using API token from {API_TOKEN_VAR}");
            self.api_token = Some(token);
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.min_movement_distance > self.max_movement_distance {
            return Err(TelloError::Settings {
                msg: format!(
                    "min_movement_distance {} exceeds max_movement_distance {}",
                    self.min_movement_distance, self.max_movement_distance
                ),
            });
        }
        if self.min_rotation_angle > self.max_rotation_angle {
            return Err(TelloError::Settings {
                msg: format!(
                    "min_rotation_angle {} exceeds max_rotation_angle {}",
                    self.min_rotation_angle, self.max_rotation_angle
                ),
            });
        }
        if self.max_analysis_history == 0 {
            return Err(TelloError::Settings {
                msg: "max_analysis_history must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// The API token, if one is configured and non-blank.
    pub fn token(&self) -> Option<&str> {
        self.api_token.as_deref().filter(|t| !t.trim().is_empty())
    }

    pub fn clamp_distance(&self, cm: u32) -> u32 {
        cm.clamp(self.min_movement_distance, self.max_movement_distance)
    }

    pub fn clamp_angle(&self, degrees: u32) -> u32 {
        degrees.clamp(self.min_rotation_angle, self.max_rotation_angle)
    }

    pub fn video_probe_timeout(&self) -> Duration {
        Duration::from_millis(self.video_probe_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    pub fn analysis_interval(&self) -> Duration {
        Duration::from_secs(self.auto_analysis_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let settings = Settings::from_toml("").unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.max_movement_distance, 500);
        assert_eq!(settings.drone_host, "192.168.10.1");
    }

    #[test]
    fn partial_file_overrides_only_named_keys() {
        let settings = Settings::from_toml(
            r#"
            model_name = "Salesforce/blip2-opt-2.7b"
            max_movement_distance = 300
            emergency_words = ["abort", "cancel"]
            "#,
        )
        .unwrap();
        assert_eq!(settings.model_name, "Salesforce/blip2-opt-2.7b");
        assert_eq!(settings.max_movement_distance, 300);
        assert_eq!(settings.min_movement_distance, 20);
        assert_eq!(settings.emergency_words, vec!["abort", "cancel"]);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let err = Settings::from_toml("max_altitude_cm = 3").unwrap_err();
        assert!(matches!(err, TelloError::Settings { .. }));
    }

    #[test]
    fn inverted_limits_are_rejected() {
        let err = Settings::from_toml("min_rotation_angle = 400").unwrap_err();
        assert!(err.to_string().contains("min_rotation_angle"));
    }

    #[test]
    fn blank_token_counts_as_missing() {
        let settings = Settings::from_toml(r#"api_token = "  ""#).unwrap();
        assert_eq!(settings.token(), None);
    }

    #[test]
    fn token_override() {
        let mut settings = Settings::from_toml(r#"api_token = "hf_file""#).unwrap();

        settings.override_token(None);
        assert_eq!(settings.token(), Some("hf_file"));

        settings.override_token(Some(" \t".to_string()));
        assert_eq!(settings.token(), Some("hf_file"));

        settings.override_token(Some("hf_env".to_string()));
        assert_eq!(settings.token(), Some("hf_env"));
    }

    #[test]
    fn environment_token_wins_over_file() {
        // the only test touching the variable, so it can't race another
        let path = std::env::temp_dir().join(format!("tello-pilot-settings-{}.toml", std::process::id()));
        std::fs::write(&path, r#"api_token = "hf_file""#).unwrap();

        std::env::set_var(API_TOKEN_VAR, "hf_env");
        let overridden = Settings::load(&path).unwrap();
        std::env::set_var(API_TOKEN_VAR, "   ");
        let blank = Settings::load(&path).unwrap();
        std::env::remove_var(API_TOKEN_VAR);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(overridden.token(), Some("hf_env"));
        assert_eq!(blank.token(), Some("hf_file"));
    }

    #[test]
    fn clamps_to_limits() {
        let settings = Settings::default();
        assert_eq!(settings.clamp_distance(5), 20);
        assert_eq!(settings.clamp_distance(1000), 500);
        assert_eq!(settings.clamp_angle(0), 1);
        assert_eq!(settings.clamp_angle(720), 360);
    }
}
