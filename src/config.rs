use anyhow::{Context, Result};
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::audio::{session::EngineSettings, volume::VolumeSettings};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Paths
    pub data_dir: PathBuf,
    pub sounds_dir: PathBuf,

    // APIs
    pub speech_api_url: String,
    pub speech_api_token: String,
    pub youtube_api_key: Option<String>, // Sin ella no hay autoplay

    // Motor de audio
    pub idle_disconnect_timeout: Duration,
    pub reconnect_settle_delay: Duration,
    pub announcement_volume_ratio: f32,
    pub volume_safety_multiplier: f32,
    pub fallback_volume: f32,
    pub fallback_volume_multiplier: f32,
    pub fallback_volume_maximum: f32,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            // Discord
            discord_token: env::var("DISCORD_TOKEN").context("DISCORD_TOKEN no configurado")?,
            application_id: env::var("APPLICATION_ID")
                .context("APPLICATION_ID no configurado")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: optional("GUILD_ID").map(|id| id.parse()).transpose()?,

            // Paths
            data_dir: optional("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            sounds_dir: optional("SOUNDS_DIR").map_or(defaults.sounds_dir, PathBuf::from),

            // APIs
            speech_api_url: optional("SPEECH_API_URL").unwrap_or(defaults.speech_api_url),
            speech_api_token: optional("SPEECH_API_TOKEN").unwrap_or_default(),
            youtube_api_key: optional("YOUTUBE_API_KEY"),

            // Motor de audio
            idle_disconnect_timeout: duration_or("IDLE_DISCONNECT_TIMEOUT", defaults.idle_disconnect_timeout)?,
            reconnect_settle_delay: duration_or("RECONNECT_SETTLE_DELAY", defaults.reconnect_settle_delay)?,
            announcement_volume_ratio: parsed_or("ANNOUNCEMENT_VOLUME_RATIO", defaults.announcement_volume_ratio)?,
            volume_safety_multiplier: parsed_or("VOLUME_SAFETY_MULTIPLIER", defaults.volume_safety_multiplier)?,
            fallback_volume: parsed_or("FALLBACK_VOLUME", defaults.fallback_volume)?,
            fallback_volume_multiplier: parsed_or("FALLBACK_VOLUME_MULTIPLIER", defaults.fallback_volume_multiplier)?,
            fallback_volume_maximum: parsed_or("FALLBACK_VOLUME_MAXIMUM", defaults.fallback_volume_maximum)?,
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Idle timeout must be greater than zero
    /// - Multipliers and the announcement ratio must be finite and positive
    /// - Fallback volume must be between 0 and the fallback maximum
    pub fn validate(&self) -> Result<()> {
        if self.idle_disconnect_timeout.is_zero() {
            anyhow::bail!("Idle disconnect timeout must be greater than 0");
        }

        for (name, value) in [
            ("Announcement volume ratio", self.announcement_volume_ratio),
            ("Volume safety multiplier", self.volume_safety_multiplier),
            ("Fallback volume multiplier", self.fallback_volume_multiplier),
            ("Fallback volume maximum", self.fallback_volume_maximum),
        ] {
            if !value.is_finite() || value <= 0.0 {
                anyhow::bail!("{} must be a positive number, got: {}", name, value);
            }
        }

        if !(0.0..=self.fallback_volume_maximum).contains(&self.fallback_volume) {
            anyhow::bail!(
                "Fallback volume must be between 0 and {}, got: {}",
                self.fallback_volume_maximum,
                self.fallback_volume
            );
        }

        Ok(())
    }

    /// Parámetros del motor de audio derivados de la configuración
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            idle_timeout: self.idle_disconnect_timeout,
            settle_delay: self.reconnect_settle_delay,
            announcement_volume_ratio: self.announcement_volume_ratio,
            volume: VolumeSettings {
                fallback_volume: self.fallback_volume,
                safety_multiplier: self.volume_safety_multiplier,
                fallback_multiplier: self.fallback_volume_multiplier,
                fallback_maximum: self.fallback_volume_maximum,
            },
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Tokens and API keys are never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Paths: data={} sounds={}\n  \
            Speech API: {}\n  \
            Idle: {} (settle {})\n  \
            Volume: fallback {} x{} max {}, safety x{}, announcements x{}\n  \
            Features: Autoplay={}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.data_dir.display(),
            self.sounds_dir.display(),
            self.speech_api_url,
            humantime::format_duration(self.idle_disconnect_timeout),
            humantime::format_duration(self.reconnect_settle_delay),
            self.fallback_volume,
            self.fallback_volume_multiplier,
            self.fallback_volume_maximum,
            self.volume_safety_multiplier,
            self.announcement_volume_ratio,
            self.youtube_api_key.is_some()
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            data_dir: "/app/data".into(),
            sounds_dir: "/app/sounds".into(),

            speech_api_url: "http://localhost:5000".to_string(),
            speech_api_token: String::new(),
            youtube_api_key: None,

            idle_disconnect_timeout: engine.idle_timeout,
            reconnect_settle_delay: engine.settle_delay,
            announcement_volume_ratio: engine.announcement_volume_ratio,
            volume_safety_multiplier: engine.volume.safety_multiplier,
            fallback_volume: engine.volume.fallback_volume,
            fallback_volume_multiplier: engine.volume.fallback_multiplier,
            fallback_volume_maximum: engine.volume.fallback_maximum,
        }
    }
}

/// Variable de entorno no vacía
fn optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw.parse().with_context(|| format!("{} inválido: {}", key, raw)),
        None => Ok(default),
    }
}

/// Duraciones en formato humantime (`30s`, `500ms`, `1m 30s`)
fn duration_or(key: &str, default: Duration) -> Result<Duration> {
    match optional(key) {
        Some(raw) => humantime::parse_duration(&raw).with_context(|| format!("{} inválido: {}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid_and_match_engine() {
        let config = Config::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.engine_settings(), EngineSettings::default());
    }

    #[test]
    fn engine_settings_follow_config() {
        let config = Config {
            idle_disconnect_timeout: Duration::from_secs(90),
            announcement_volume_ratio: 4.0,
            fallback_volume_maximum: 150.0,
            ..Config::default()
        };

        let settings = config.engine_settings();

        assert_eq!(settings.idle_timeout, Duration::from_secs(90));
        assert_eq!(settings.announcement_volume_ratio, 4.0);
        assert_eq!(settings.volume.fallback_maximum, 150.0);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_idle = Config {
            idle_disconnect_timeout: Duration::ZERO,
            ..Config::default()
        };
        let negative_ratio = Config {
            announcement_volume_ratio: -1.0,
            ..Config::default()
        };
        let loud_fallback = Config {
            fallback_volume: 250.0,
            ..Config::default()
        };

        assert!(zero_idle.validate().is_err());
        assert!(negative_ratio.validate().is_err());
        assert!(loud_fallback.validate().is_err());
    }

    #[test]
    fn summary_hides_secrets() {
        let config = Config {
            discord_token: "super-secret-token".to_string(),
            speech_api_token: "speech-secret".to_string(),
            youtube_api_key: Some("yt-secret".to_string()),
            ..Config::default()
        };

        let summary = config.summary();

        assert!(!summary.contains("super-secret-token"));
        assert!(!summary.contains("speech-secret"));
        assert!(!summary.contains("yt-secret"));
        assert!(summary.contains("Idle: 30s (settle 500ms)"));
        assert!(summary.contains("Autoplay=true"));
    }

    #[test]
    fn unset_variables_fall_back() {
        assert_eq!(parsed_or("DISBOT_TEST_UNSET_NUMBER", 7.5_f32).unwrap(), 7.5);
        assert_eq!(
            duration_or("DISBOT_TEST_UNSET_DURATION", Duration::from_secs(3)).unwrap(),
            Duration::from_secs(3)
        );
    }
}
