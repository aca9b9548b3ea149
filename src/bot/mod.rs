//! # Bot Module
//!
//! Discord glue for DisBot: slash-command registration, interaction
//! dispatch and the gateway events the audio engine cares about.
//!
//! ## Architecture
//!
//! The bot is built around the [`DisBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It owns:
//!
//! - The per-guild audio sessions through [`GuildRegistry`]
//! - Guild settings via [`JsonStorage`]
//! - The YouTube client and speech synthesizer used to build queue items
//!
//! Commands never touch the voice connection directly; everything goes
//! through the guild's session.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, Guild, GuildId, Interaction, Ready, UnavailableGuild, VoiceState},
    async_trait,
};
use std::{path::Path, sync::Arc};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::registry::GuildRegistry, config::Config, sources::YouTubeClient, speech::SpeechSynthesizer,
    storage::JsonStorage,
};

/// Main Discord bot handler for DisBot.
///
/// ## Fields
///
/// - `config`: Bot configuration (tokens, paths, engine tuning)
/// - `registry`: One audio session per guild
/// - `storage`: Persistent JSON storage for guild settings
/// - `speech`: Text-to-speech backend for `/say`
/// - `youtube`: Metadata lookups and playable inputs for `/play`
pub struct DisBot {
    config: Arc<Config>,
    pub registry: Arc<GuildRegistry>,
    pub storage: Arc<JsonStorage>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub youtube: YouTubeClient,
}

impl DisBot {
    /// Creates a new instance of the bot handler.
    ///
    /// # Arguments
    ///
    /// * `config` - Bot configuration
    /// * `registry` - Guild session registry, already wired to songbird
    /// * `storage` - Guild settings store (also the engine's config source)
    /// * `speech` - Speech synthesizer for TTS items
    /// * `youtube` - YouTube client for `/play`
    pub fn new(
        config: Config,
        registry: Arc<GuildRegistry>,
        storage: Arc<JsonStorage>,
        speech: Arc<dyn SpeechSynthesizer>,
        youtube: YouTubeClient,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            storage,
            speech,
            youtube,
        }
    }

    pub fn sounds_dir(&self) -> &Path {
        &self.config.sounds_dir
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered per guild when `GUILD_ID` is set (fast
    /// propagation, useful for development) and globally otherwise.
    ///
    /// # Required Permissions
    ///
    /// The bot must have `applications.commands` permission in the target guild(s).
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for DisBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("📂 {} guilds con configuración guardada", self.storage.list_guilds().len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    /// Handles incoming slash commands. Errors are logged but don't crash the bot.
    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command_interaction) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Detects the bot being disconnected from voice by someone else.
    ///
    /// The guild session drops its queue and stream, the same as an
    /// explicit `/leave` minus the call to the voice platform.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        if old.is_some() && new.channel_id.is_none() {
            info!("🔌 Bot desconectado en guild {}", guild_id);

            if let Some(session) = self.registry.get(guild_id) {
                if let Err(e) = session.connection_lost().await {
                    error!("Error al limpiar la sesión de audio: {:?}", e);
                }
            }
        } else if let Some(channel_id) = new.channel_id {
            debug!("Bot en canal de voz {} de guild {}", channel_id, guild_id);
        }
    }

    async fn guild_delete(&self, _ctx: Context, incomplete: UnavailableGuild, _full: Option<Guild>) {
        // Una guild no disponible por una caída de Discord no se olvida
        if incomplete.unavailable {
            return;
        }

        info!("🚪 El bot salió de la guild {}", incomplete.id);
        self.registry.evict(incomplete.id);

        if let Err(e) = self.storage.remove_guild_config(incomplete.id.get()).await {
            warn!("Error eliminando configuración de guild {}: {:?}", incomplete.id, e);
        }
    }
}
