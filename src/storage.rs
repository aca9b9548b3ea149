use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serenity::model::id::GuildId;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tracing::{info, warn, error};

use crate::speech::TtsProvider;

/// Configuración de audio de una guild almacenada en JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildConfig {
    pub guild_id: u64,
    pub tts_provider: TtsProvider,
    pub tts_voice_google: String,
    pub tts_voice_ibm: String,
    /// Anunciar por voz el siguiente item de la cola
    pub queue_tts_voice: bool,
    /// Anunciar por voz la desconexión por inactividad
    pub disconnect_tts_voice: bool,
    pub volume_multiplier: Option<f32>,
    pub volume_maximum: Option<f32>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            guild_id: 0,
            tts_provider: TtsProvider::Google,
            tts_voice_google: "en-US".to_string(),
            tts_voice_ibm: "en-US_AllisonV3Voice".to_string(),
            queue_tts_voice: false,
            disconnect_tts_voice: true,
            volume_multiplier: None,
            volume_maximum: None,
        }
    }
}

impl GuildConfig {
    /// Voz configurada para el proveedor actual
    pub fn tts_voice(&self) -> &str {
        match self.tts_provider {
            TtsProvider::Google => &self.tts_voice_google,
            TtsProvider::Ibm => &self.tts_voice_ibm,
        }
    }
}

/// Acceso de solo lectura a la configuración de guild
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuildConfigStore: Send + Sync {
    async fn fetch(&self, guild_id: GuildId) -> Result<GuildConfig>;
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonStorage {
    data_dir: PathBuf,
    guilds_cache: RwLock<HashMap<u64, GuildConfig>>,
}

impl JsonStorage {
    pub async fn new(data_dir: PathBuf) -> Result<Self> {
        let guilds_dir = data_dir.join("guilds");
        fs::create_dir_all(&guilds_dir)
            .await
            .with_context(|| format!("No se pudo crear {}", guilds_dir.display()))?;

        info!("📁 Storage inicializado en: {}", data_dir.display());

        let storage = Self {
            data_dir,
            guilds_cache: RwLock::new(HashMap::new()),
        };

        // Cargar configuraciones existentes
        storage.load_all_guilds().await?;

        Ok(storage)
    }

    /// Obtiene la configuración de una guild, creando la de por defecto si no existe
    pub async fn get_guild_config(&self, guild_id: u64) -> Result<GuildConfig> {
        if let Some(config) = self.guilds_cache.read().get(&guild_id) {
            return Ok(config.clone());
        }

        match self.load_guild_config(guild_id).await {
            Ok(config) => {
                self.guilds_cache.write().insert(guild_id, config.clone());
                Ok(config)
            }
            Err(_) => {
                let config = GuildConfig {
                    guild_id,
                    ..GuildConfig::default()
                };

                self.save_guild_config(&config).await?;
                self.guilds_cache.write().insert(guild_id, config.clone());

                info!("📝 Configuración por defecto creada para guild {}", guild_id);
                Ok(config)
            }
        }
    }

    /// Actualiza la configuración de una guild
    pub async fn update_guild_config(&self, config: GuildConfig) -> Result<()> {
        let guild_id = config.guild_id;

        self.save_guild_config(&config).await?;
        self.guilds_cache.write().insert(guild_id, config);

        info!("💾 Configuración actualizada para guild {}", guild_id);
        Ok(())
    }

    /// Lista las guilds con configuración
    pub fn list_guilds(&self) -> Vec<u64> {
        self.guilds_cache.read().keys().copied().collect()
    }

    /// Elimina la configuración de una guild que ya no existe
    pub async fn remove_guild_config(&self, guild_id: u64) -> Result<()> {
        self.guilds_cache.write().remove(&guild_id);

        let path = self.guild_file_path(guild_id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                info!("🗑️ Configuración eliminada para guild: {}", guild_id);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Error eliminando configuración para guild {}: {}", guild_id, e);
                Err(e.into())
            }
        }
    }

    // Métodos privados

    async fn load_guild_config(&self, guild_id: u64) -> Result<GuildConfig> {
        let content = fs::read_to_string(self.guild_file_path(guild_id)).await?;
        let config: GuildConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    async fn save_guild_config(&self, config: &GuildConfig) -> Result<()> {
        let content = serde_json::to_string_pretty(config)?;
        fs::write(self.guild_file_path(config.guild_id), content).await?;
        Ok(())
    }

    async fn load_all_guilds(&self) -> Result<()> {
        let mut files = fs::read_dir(self.data_dir.join("guilds")).await?;
        let mut loaded_count = 0;

        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }

            let guild_id = path
                .file_stem()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("guild_"))
                .and_then(|id| id.parse::<u64>().ok());

            if let Some(guild_id) = guild_id {
                match self.load_guild_config(guild_id).await {
                    Ok(config) => {
                        self.guilds_cache.write().insert(guild_id, config);
                        loaded_count += 1;
                    }
                    Err(e) => {
                        warn!("Error cargando configuración para guild {}: {}", guild_id, e);
                    }
                }
            }
        }

        if loaded_count > 0 {
            info!("📂 Cargadas {} configuraciones de guild", loaded_count);
        }

        Ok(())
    }

    fn guild_file_path(&self, guild_id: u64) -> PathBuf {
        self.data_dir.join("guilds").join(format!("guild_{}.json", guild_id))
    }
}

#[async_trait]
impl GuildConfigStore for JsonStorage {
    async fn fetch(&self, guild_id: GuildId) -> Result<GuildConfig> {
        self.get_guild_config(guild_id.get()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("disbot-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn creates_default_config_on_first_fetch() {
        let dir = temp_dir("defaults");
        let storage = JsonStorage::new(dir.clone()).await.unwrap();

        let config = storage.fetch(GuildId::new(42)).await.unwrap();

        assert_eq!(config.guild_id, 42);
        assert_eq!(config.tts_voice(), "en-US");
        assert!(dir.join("guilds").join("guild_42.json").exists());
        assert_eq!(storage.list_guilds(), vec![42]);
    }

    #[tokio::test]
    async fn updates_survive_reload() {
        let dir = temp_dir("reload");
        {
            let storage = JsonStorage::new(dir.clone()).await.unwrap();
            let mut config = storage.get_guild_config(7).await.unwrap();
            config.tts_provider = TtsProvider::Ibm;
            config.volume_maximum = Some(100.0);
            storage.update_guild_config(config).await.unwrap();
        }

        let storage = JsonStorage::new(dir).await.unwrap();
        let config = storage.get_guild_config(7).await.unwrap();

        assert_eq!(config.tts_provider, TtsProvider::Ibm);
        assert_eq!(config.tts_voice(), "en-US_AllisonV3Voice");
        assert_eq!(config.volume_maximum, Some(100.0));
    }

    #[tokio::test]
    async fn partial_files_fall_back_to_defaults() {
        let dir = temp_dir("partial");
        std::fs::create_dir_all(dir.join("guilds")).unwrap();
        std::fs::write(
            dir.join("guilds").join("guild_9.json"),
            r#"{"guild_id": 9, "queue_tts_voice": true}"#,
        )
        .unwrap();

        let storage = JsonStorage::new(dir).await.unwrap();
        let config = storage.get_guild_config(9).await.unwrap();

        assert!(config.queue_tts_voice);
        assert!(config.disconnect_tts_voice);
        assert_eq!(config.volume_multiplier, None);
    }

    #[tokio::test]
    async fn removing_unknown_guild_is_fine() {
        let storage = JsonStorage::new(temp_dir("remove")).await.unwrap();
        storage.get_guild_config(5).await.unwrap();

        storage.remove_guild_config(5).await.unwrap();
        storage.remove_guild_config(6).await.unwrap();

        assert!(storage.list_guilds().is_empty());
    }
}
