use serenity::model::id::GuildId;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::error::{AudioError, PlaybackError};
use crate::storage::GuildConfigStore;

/// Valores de respaldo cuando la guild no configura su volumen
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeSettings {
    pub fallback_volume: f32,
    /// Escala fija aplicada siempre, sin importar la configuración de la guild
    pub safety_multiplier: f32,
    pub fallback_multiplier: f32,
    pub fallback_maximum: f32,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        Self {
            fallback_volume: 50.0,
            safety_multiplier: 0.00175,
            fallback_multiplier: 1.0,
            fallback_maximum: 200.0,
        }
    }
}

/// Salida de audio a la que se le aplica el volumen final
pub trait VolumeOutput: Send + Sync {
    fn apply_volume(&self, level: f32) -> Result<(), PlaybackError>;
}

/// Volumen de una guild en escala "humana" (0..máximo de la guild).
///
/// El multiplicador y el máximo se leen de la configuración de la guild
/// cada vez que se aplican, nunca se cachean.
pub struct VolumeManager {
    guild_id: GuildId,
    configs: Arc<dyn GuildConfigStore>,
    settings: VolumeSettings,
    volume: f32,
    last_volume: f32,
    muted: bool,
}

impl VolumeManager {
    pub fn new(guild_id: GuildId, configs: Arc<dyn GuildConfigStore>, settings: VolumeSettings) -> Self {
        Self {
            guild_id,
            configs,
            settings,
            volume: settings.fallback_volume,
            last_volume: settings.fallback_volume,
            muted: false,
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn last_volume(&self) -> f32 {
        self.last_volume
    }

    pub fn muted(&self) -> bool {
        self.muted
    }

    /// Multiplicador efectivo: el de la guild por la escala de seguridad
    pub async fn multiplier(&self) -> f32 {
        let guild_multiplier = match self.configs.fetch(self.guild_id).await {
            Ok(config) => config.volume_multiplier.unwrap_or(self.settings.fallback_multiplier),
            Err(e) => {
                warn!("⚠️ No se pudo leer la configuración de volumen de guild {}: {}", self.guild_id, e);
                self.settings.fallback_multiplier
            }
        };
        guild_multiplier * self.settings.safety_multiplier
    }

    pub async fn maximum(&self) -> f32 {
        match self.configs.fetch(self.guild_id).await {
            Ok(config) => config.volume_maximum.unwrap_or(self.settings.fallback_maximum),
            Err(e) => {
                warn!("⚠️ No se pudo leer la configuración de volumen de guild {}: {}", self.guild_id, e);
                self.settings.fallback_maximum
            }
        }
    }

    /// Nivel que debe recibir un stream nuevo
    pub async fn output_level(&self) -> f32 {
        self.volume * self.multiplier().await
    }

    /// Ajusta el volumen y lo aplica a la salida activa, si la hay
    pub async fn set_volume(
        &mut self,
        value: f32,
        update_last_volume: bool,
        clamp: bool,
        output: Option<&dyn VolumeOutput>,
    ) -> Result<f32, AudioError> {
        self.muted = false;
        self.apply(value, update_last_volume, clamp, output).await
    }

    pub async fn increase_volume(&mut self, amount: f32, output: Option<&dyn VolumeOutput>) -> Result<f32, AudioError> {
        self.set_volume(self.volume + amount, true, true, output).await
    }

    pub async fn decrease_volume(&mut self, amount: f32, output: Option<&dyn VolumeOutput>) -> Result<f32, AudioError> {
        self.set_volume(self.volume - amount, true, true, output).await
    }

    /// Silencia o restaura el volumen previo al silencio
    pub async fn toggle_mute(&mut self, value: Option<bool>, output: Option<&dyn VolumeOutput>) -> Result<bool, AudioError> {
        let muted = value.unwrap_or(!self.muted);
        if muted == self.muted {
            return Ok(muted);
        }

        if muted {
            self.apply(0.0, true, true, output).await?;
            info!("🔇 Guild {} silenciada", self.guild_id);
        } else {
            self.apply(self.last_volume, false, true, output).await?;
            info!("🔊 Guild {} con sonido otra vez", self.guild_id);
        }

        self.muted = muted;
        Ok(muted)
    }

    async fn apply(
        &mut self,
        value: f32,
        update_last_volume: bool,
        clamp: bool,
        output: Option<&dyn VolumeOutput>,
    ) -> Result<f32, AudioError> {
        let maximum = if clamp { self.maximum().await } else { f32::MAX };

        if update_last_volume {
            self.last_volume = self.volume;
        }

        self.volume = if value.is_finite() {
            value.clamp(0.0, maximum.max(0.0))
        } else {
            error!("❌ El volumen no es un número válido ({}), usando {}", value, self.settings.fallback_volume);
            self.settings.fallback_volume
        };

        if let Some(output) = output {
            let level = self.volume * self.multiplier().await;
            output
                .apply_volume(level)
                .map_err(|e| AudioError::Volume(e.to_string()))?;
        }

        info!("🔊 Volumen de guild {} ajustado a {}", self.guild_id, self.volume);
        Ok(self.volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{GuildConfig, MockGuildConfigStore};
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingOutput {
        levels: Mutex<Vec<f32>>,
    }

    impl VolumeOutput for RecordingOutput {
        fn apply_volume(&self, level: f32) -> Result<(), PlaybackError> {
            self.levels.lock().push(level);
            Ok(())
        }
    }

    fn manager_with(config: GuildConfig) -> VolumeManager {
        let mut store = MockGuildConfigStore::new();
        store.expect_fetch().returning(move |_| Ok(config.clone()));
        VolumeManager::new(GuildId::new(1), Arc::new(store), VolumeSettings::default())
    }

    fn limited(maximum: f32, multiplier: f32) -> GuildConfig {
        GuildConfig {
            volume_maximum: Some(maximum),
            volume_multiplier: Some(multiplier),
            ..GuildConfig::default()
        }
    }

    #[tokio::test]
    async fn clamps_to_guild_maximum() {
        let mut volume = manager_with(limited(100.0, 1.0));

        assert_eq!(volume.set_volume(150.0, true, true, None).await.unwrap(), 100.0);
        assert_eq!(volume.set_volume(1100.0, true, true, None).await.unwrap(), 100.0);
        assert_eq!(volume.set_volume(-20.0, true, true, None).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn unclamped_volume_ignores_maximum_but_not_zero() {
        let mut volume = manager_with(limited(100.0, 1.0));

        assert_eq!(volume.set_volume(400.0, true, false, None).await.unwrap(), 400.0);
        assert_eq!(volume.set_volume(-1.0, true, false, None).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn records_last_volume_only_when_asked() {
        let mut volume = manager_with(limited(100.0, 1.0));

        volume.set_volume(80.0, true, true, None).await.unwrap();
        assert_eq!(volume.last_volume(), 50.0);

        volume.set_volume(30.0, false, true, None).await.unwrap();
        assert_eq!(volume.last_volume(), 50.0);
        assert_eq!(volume.volume(), 30.0);
    }

    #[tokio::test]
    async fn applies_scaled_level_to_output() {
        let mut volume = manager_with(limited(200.0, 2.0));
        let output = RecordingOutput::default();

        volume.set_volume(100.0, true, true, Some(&output)).await.unwrap();

        let levels = output.levels.lock().clone();
        assert_eq!(levels.len(), 1);
        assert!((levels[0] - 100.0 * 2.0 * 0.00175).abs() < 1e-6);
    }

    #[tokio::test]
    async fn nan_resets_to_fallback() {
        let mut volume = manager_with(limited(100.0, 1.0));

        assert_eq!(volume.set_volume(f32::NAN, true, true, None).await.unwrap(), 50.0);
        assert_eq!(volume.set_volume(f32::INFINITY, true, false, None).await.unwrap(), 50.0);
    }

    #[tokio::test]
    async fn unclamped_infinity_never_reaches_the_stream() {
        let mut volume = manager_with(limited(100.0, 2.0));
        let output = RecordingOutput::default();

        volume.set_volume(f32::INFINITY, true, false, Some(&output)).await.unwrap();
        volume.set_volume(f32::NEG_INFINITY, true, false, Some(&output)).await.unwrap();

        let levels = output.levels.lock().clone();
        assert_eq!(levels.len(), 2);
        for level in levels {
            assert!((level - 50.0 * 2.0 * 0.00175).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn mute_round_trip_restores_exact_volume() {
        let mut volume = manager_with(limited(100.0, 1.0));
        volume.set_volume(73.0, true, true, None).await.unwrap();

        assert!(volume.toggle_mute(None, None).await.unwrap());
        assert_eq!(volume.volume(), 0.0);

        assert!(!volume.toggle_mute(None, None).await.unwrap());
        assert_eq!(volume.volume(), 73.0);
    }

    #[tokio::test]
    async fn muting_twice_keeps_restore_point() {
        let mut volume = manager_with(limited(100.0, 1.0));
        volume.set_volume(64.0, true, true, None).await.unwrap();

        volume.toggle_mute(Some(true), None).await.unwrap();
        volume.toggle_mute(Some(true), None).await.unwrap();
        volume.toggle_mute(Some(false), None).await.unwrap();

        assert_eq!(volume.volume(), 64.0);
    }

    #[tokio::test]
    async fn deltas_respect_bounds() {
        let mut volume = manager_with(limited(100.0, 1.0));

        assert_eq!(volume.increase_volume(10.0, None).await.unwrap(), 60.0);
        assert_eq!(volume.increase_volume(100.0, None).await.unwrap(), 100.0);
        assert_eq!(volume.decrease_volume(250.0, None).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn missing_guild_values_use_fallbacks() {
        let volume = manager_with(GuildConfig::default());

        assert_eq!(volume.maximum().await, 200.0);
        assert!((volume.multiplier().await - 0.00175).abs() < 1e-9);
    }

    #[tokio::test]
    async fn config_changes_apply_on_next_set() {
        let config = Arc::new(Mutex::new(limited(100.0, 1.0)));
        let shared = config.clone();
        let mut store = MockGuildConfigStore::new();
        store.expect_fetch().returning(move |_| Ok(shared.lock().clone()));
        let mut volume = VolumeManager::new(GuildId::new(1), Arc::new(store), VolumeSettings::default());

        assert_eq!(volume.set_volume(150.0, true, true, None).await.unwrap(), 100.0);
        config.lock().volume_maximum = Some(150.0);
        assert_eq!(volume.set_volume(150.0, true, true, None).await.unwrap(), 150.0);
    }
}
