use anyhow::Result;
use serenity::{
    builder::{CreateInteractionResponse, CreateInteractionResponseMessage, EditInteractionResponse},
    model::{
        application::{CommandDataOptionValue, CommandInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{
        error::{AudioError, QueueError},
        queue::{AddOutcome, LoopType},
        session::{SessionHandle, SessionSnapshot},
    },
    bot::DisBot,
    sources::{self, Announcer},
    storage::{GuildConfig, GuildConfigStore},
};

const QUEUE_PAGE_SIZE: usize = 10;

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &DisBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let session = bot.registry.session(guild_id);
    let result = match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, &session, guild_id).await,
        "play" => handle_play(ctx, &command, bot, &session, guild_id).await,
        "say" => handle_say(ctx, &command, bot, &session, guild_id).await,
        "sound" => handle_sound(ctx, &command, bot, &session, guild_id).await,
        "pause" => bot
            .registry
            .controller(guild_id)
            .pause()
            .await
            .map(|_| "⏸️ Reproducción pausada".to_string())
            .map_err(Into::into),
        "resume" => bot
            .registry
            .controller(guild_id)
            .resume()
            .await
            .map(|_| "▶️ Reproducción reanudada".to_string())
            .map_err(Into::into),
        "skip" => bot
            .registry
            .controller(guild_id)
            .skip()
            .await
            .map(|_| "⏭️ Saltado".to_string())
            .map_err(Into::into),
        "stop" => session
            .clear(true)
            .await
            .map(|_| "⏹️ Reproducción detenida y cola limpiada".to_string())
            .map_err(Into::into),
        "leave" => bot
            .registry
            .controller(guild_id)
            .disconnect()
            .await
            .map(|_| "👋 Desconectado del canal de voz".to_string())
            .map_err(Into::into),
        "queue" => handle_queue(&command, &session).await,
        "remove" => handle_remove(&command, &session).await,
        "shuffle" => session
            .shuffle()
            .await
            .map(|_| "🔀 Cola mezclada".to_string())
            .map_err(Into::into),
        "clear" => handle_clear(&command, &session).await,
        "loop" => handle_loop(&command, &session).await,
        "looptype" => handle_looptype(&command, &session).await,
        "autoplay" => handle_autoplay(&command, &session).await,
        "volume" => handle_volume(&command, &session).await,
        "mute" => handle_mute(&command, &session).await,
        "settings" => handle_settings(&command, bot, guild_id).await,
        _ => Ok("❌ Comando no reconocido".to_string()),
    };

    let content = match result {
        Ok(content) => content,
        Err(e) => {
            warn!("⚠️ /{} falló en guild {}: {:#}", command.data.name, guild_id, e);
            user_message(&e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    session: &SessionHandle,
    guild_id: GuildId,
) -> Result<String> {
    let channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;
    let force = bool_option(command, "force").unwrap_or(false);

    let reused = session.connect(channel_id, force).await?;

    Ok(if reused {
        format!("🔊 Ya estaba conectado a <#{}>", channel_id)
    } else {
        format!("🔊 Conectado a <#{}>", channel_id)
    })
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &DisBot,
    session: &SessionHandle,
    guild_id: GuildId,
) -> Result<String> {
    let query = str_option(command, "query").ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    ensure_connected(ctx, command, session, guild_id).await?;

    let video = bot.youtube.video_info(query).await?;
    let item = sources::youtube_item(bot.youtube.clone(), video, Some(announcer(ctx, command.channel_id)))
        .with_requested_by(command.user.id);
    let description = item.description.clone();

    let outcome = session.enqueue(item, position_option(command)).await?;
    Ok(added_message(&description, outcome))
}

async fn handle_say(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &DisBot,
    session: &SessionHandle,
    guild_id: GuildId,
) -> Result<String> {
    let text = str_option(command, "text").ok_or_else(|| anyhow::anyhow!("Texto no proporcionado"))?;

    ensure_connected(ctx, command, session, guild_id).await?;

    let config = bot.storage.fetch(guild_id).await?;
    let item = sources::tts_item(
        bot.speech.clone(),
        text.to_string(),
        config.tts_provider,
        config.tts_voice().to_string(),
        None,
    )
    .with_requested_by(command.user.id);
    let description = item.description.clone();

    let outcome = session.enqueue(item, position_option(command)).await?;
    Ok(added_message(&description, outcome))
}

async fn handle_sound(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &DisBot,
    session: &SessionHandle,
    guild_id: GuildId,
) -> Result<String> {
    let name = str_option(command, "name").ok_or_else(|| anyhow::anyhow!("Nombre no proporcionado"))?;
    let item = sources::mp3_item(bot.sounds_dir(), name, Some(announcer(ctx, command.channel_id)))?
        .with_requested_by(command.user.id);
    let description = item.description.clone();

    ensure_connected(ctx, command, session, guild_id).await?;

    let outcome = session.enqueue(item, position_option(command)).await?;
    Ok(added_message(&description, outcome))
}

async fn handle_queue(command: &CommandInteraction, session: &SessionHandle) -> Result<String> {
    let page = int_option(command, "page").unwrap_or(1).max(1) as usize;
    let snapshot = session.snapshot().await?;
    Ok(format_queue(&snapshot, page))
}

async fn handle_remove(command: &CommandInteraction, session: &SessionHandle) -> Result<String> {
    let position = int_option(command, "position").ok_or_else(|| anyhow::anyhow!("Posición no proporcionada"))?;
    let position = usize::try_from(position).map_err(|_| AudioError::from(QueueError::InvalidPosition))?;

    let removed = session.remove(position).await?;
    Ok(format!("🗑️ Quitado de la cola: {}", removed.description))
}

async fn handle_clear(command: &CommandInteraction, session: &SessionHandle) -> Result<String> {
    let all = bool_option(command, "all").unwrap_or(false);
    session.clear(all).await?;

    Ok(if all {
        "🧹 Cola limpiada por completo".to_string()
    } else {
        "🧹 Cola limpiada (se mantiene lo que suena)".to_string()
    })
}

async fn handle_loop(command: &CommandInteraction, session: &SessionHandle) -> Result<String> {
    let enabled = session.toggle_loop(bool_option(command, "enabled")).await?;
    Ok(if enabled {
        "🔁 Repetición activada".to_string()
    } else {
        "➡️ Repetición desactivada".to_string()
    })
}

async fn handle_looptype(command: &CommandInteraction, session: &SessionHandle) -> Result<String> {
    let mode = str_option(command, "mode").unwrap_or("single");
    let loop_type: LoopType = mode.parse().map_err(AudioError::from)?;

    session.set_loop_type(loop_type).await?;
    Ok(format!("🔁 Modo de repetición: {}", loop_type))
}

async fn handle_autoplay(command: &CommandInteraction, session: &SessionHandle) -> Result<String> {
    let enabled = session.toggle_autoplay(bool_option(command, "enabled")).await?;
    Ok(if enabled {
        "📻 Autoplay activado".to_string()
    } else {
        "📻 Autoplay desactivado".to_string()
    })
}

async fn handle_volume(command: &CommandInteraction, session: &SessionHandle) -> Result<String> {
    let volume = match (number_option(command, "level"), number_option(command, "step")) {
        (Some(level), _) => session.set_volume(level as f32).await?,
        (None, Some(step)) if step >= 0.0 => session.increase_volume(step as f32).await?,
        (None, Some(step)) => session.decrease_volume(-step as f32).await?,
        (None, None) => {
            let snapshot = session.snapshot().await?;
            return Ok(format!("🔊 Volumen actual: {}", snapshot.volume));
        }
    };

    Ok(format!("🔊 Volumen ajustado a {}", volume))
}

async fn handle_mute(command: &CommandInteraction, session: &SessionHandle) -> Result<String> {
    let muted = session.toggle_mute(bool_option(command, "enabled")).await?;
    Ok(if muted {
        "🔇 Silenciado".to_string()
    } else {
        "🔊 Volumen restaurado".to_string()
    })
}

async fn handle_settings(command: &CommandInteraction, bot: &DisBot, guild_id: GuildId) -> Result<String> {
    let mut config = bot.storage.get_guild_config(guild_id.get()).await?;
    let change = SettingsChange::from_command(command);
    if change.is_empty() {
        return Ok(settings_text(&config));
    }

    change.apply(&mut config)?;
    config.guild_id = guild_id.get();
    bot.storage.update_guild_config(config.clone()).await?;

    info!("⚙️ {} cambió la configuración de guild {}", command.user.name, guild_id);
    Ok(format!("✅ Configuración actualizada\n{}", settings_text(&config)))
}

/// Cambios pedidos con `/settings`; `None` deja el valor como está
#[derive(Debug, Default)]
struct SettingsChange {
    announce_next: Option<bool>,
    announce_leave: Option<bool>,
    max_volume: Option<f64>,
    volume_multiplier: Option<f64>,
}

impl SettingsChange {
    fn from_command(command: &CommandInteraction) -> Self {
        Self {
            announce_next: bool_option(command, "announce_next"),
            announce_leave: bool_option(command, "announce_leave"),
            max_volume: number_option(command, "max_volume"),
            volume_multiplier: number_option(command, "volume_multiplier"),
        }
    }

    fn is_empty(&self) -> bool {
        self.announce_next.is_none()
            && self.announce_leave.is_none()
            && self.max_volume.is_none()
            && self.volume_multiplier.is_none()
    }

    /// Valida todo antes de tocar la configuración
    fn apply(&self, config: &mut GuildConfig) -> Result<()> {
        let max_volume = self.max_volume.map(|v| positive("max_volume", v)).transpose()?;
        let multiplier = self
            .volume_multiplier
            .map(|v| positive("volume_multiplier", v))
            .transpose()?;

        if let Some(enabled) = self.announce_next {
            config.queue_tts_voice = enabled;
        }
        if let Some(enabled) = self.announce_leave {
            config.disconnect_tts_voice = enabled;
        }
        if max_volume.is_some() {
            config.volume_maximum = max_volume;
        }
        if multiplier.is_some() {
            config.volume_multiplier = multiplier;
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<f32> {
    let value = value as f32;
    if !value.is_finite() || value <= 0.0 {
        anyhow::bail!("{} debe ser un número positivo", name);
    }
    Ok(value)
}

fn settings_text(config: &GuildConfig) -> String {
    let on_off = |enabled: bool| if enabled { "on" } else { "off" };
    let or_default = |value: Option<f32>| value.map_or("por defecto".to_string(), |v| v.to_string());

    format!(
        "⚙️ Anunciar siguiente: {} · Anunciar salida: {} · Volumen máximo: {} · Multiplicador: {}",
        on_off(config.queue_tts_voice),
        on_off(config.disconnect_tts_voice),
        or_default(config.volume_maximum),
        or_default(config.volume_multiplier)
    )
}

// Funciones auxiliares

/// Conecta al canal del usuario si la sesión no tiene conexión
async fn ensure_connected(
    ctx: &Context,
    command: &CommandInteraction,
    session: &SessionHandle,
    guild_id: GuildId,
) -> Result<()> {
    let snapshot = session.snapshot().await?;
    if snapshot.channel_id.is_none() {
        let channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;
        session.connect(channel_id, false).await?;
    }
    Ok(())
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

/// Publica "Now playing" en el canal donde se pidió el item
fn announcer(ctx: &Context, channel_id: ChannelId) -> Announcer {
    let http = ctx.http.clone();
    Arc::new(move |description: &str| {
        let http = http.clone();
        let content = format!("🎶 Now playing: {}", description);
        tokio::spawn(async move {
            if let Err(e) = channel_id.say(&*http, content).await {
                warn!("⚠️ No se pudo anunciar en {}: {:?}", channel_id, e);
            }
        });
    })
}

fn option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a CommandDataOptionValue> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .map(|opt| &opt.value)
}

fn str_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    option(command, name).and_then(|value| value.as_str())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    option(command, name).and_then(|value| value.as_i64())
}

fn number_option(command: &CommandInteraction, name: &str) -> Option<f64> {
    option(command, name).and_then(|value| value.as_f64())
}

fn bool_option(command: &CommandInteraction, name: &str) -> Option<bool> {
    option(command, name).and_then(|value| value.as_bool())
}

fn position_option(command: &CommandInteraction) -> Option<usize> {
    int_option(command, "position").and_then(|position| usize::try_from(position).ok())
}

fn added_message(description: &str, outcome: AddOutcome) -> String {
    if outcome.starts_playback {
        format!("🎵 Reproduciendo: {}", description)
    } else {
        format!("➕ Agregado en la posición {}: {}", outcome.position, description)
    }
}

/// Texto plano con una página de la cola
fn format_queue(snapshot: &SessionSnapshot, page: usize) -> String {
    let queue = &snapshot.queue;
    if queue.items.is_empty() {
        return "📭 La cola está vacía".to_string();
    }

    let (entries, total_pages) = queue.page(page, QUEUE_PAGE_SIZE);
    let page = page.clamp(1, total_pages);
    let loop_state = if queue.loop_enabled {
        queue.loop_type.to_string()
    } else {
        "off".to_string()
    };

    let mut lines = vec![format!(
        "📜 Cola ({} items, página {}/{}) · loop: {} · autoplay: {}",
        queue.items.len(),
        page,
        total_pages,
        loop_state,
        if queue.autoplay_enabled { "on" } else { "off" }
    )];

    let first = (page - 1) * QUEUE_PAGE_SIZE + 1;
    for (offset, entry) in entries.iter().enumerate() {
        let position = first + offset;
        let marker = if position == 1 { "▶️ " } else { "" };
        lines.push(format!("{}{}. [{}] {}", marker, position, entry.kind, entry.description));
    }

    lines.join("\n")
}

/// Mensaje para el usuario a partir de un error del comando
fn user_message(error: &anyhow::Error) -> String {
    let Some(audio) = error.downcast_ref::<AudioError>() else {
        return format!("❌ {}", error);
    };

    match audio {
        AudioError::NotConnected => "❌ No estoy conectado a un canal de voz".to_string(),
        AudioError::NothingPlaying => "❌ No hay nada reproduciéndose".to_string(),
        AudioError::SessionClosed => "❌ La sesión de audio se cerró, intenta de nuevo".to_string(),
        AudioError::Queue(QueueError::IndexOutOfRange { index, len }) => {
            format!("❌ No hay nada en la posición {} (la cola tiene {} items)", index, len)
        }
        AudioError::Connection(e) => format!("❌ No pude conectarme: {}", e),
        AudioError::Playback(e) => format!("❌ Error de reproducción: {}", e),
        other => format!("❌ {}", other),
    }
}
