use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId, Permissions},
    prelude::Context,
};

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }

    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;

    Ok(())
}

fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        play_command(),
        say_command(),
        sound_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        stop_command(),
        leave_command(),
        queue_command(),
        remove_command(),
        shuffle_command(),
        clear_command(),
        loop_command(),
        looptype_command(),
        autoplay_command(),
        volume_command(),
        mute_command(),
        settings_command(),
    ]
}

fn toggle_option(description: &str) -> CreateCommandOption {
    CreateCommandOption::new(CommandOptionType::Boolean, "enabled", description)
}

fn position_option() -> CreateCommandOption {
    CreateCommandOption::new(
        CommandOptionType::Integer,
        "position",
        "Posición en la cola (1 = ahora)",
    )
    .min_int_value(1)
}

// Comandos de conexión

fn join_command() -> CreateCommand {
    CreateCommand::new("join")
        .description("Conecta el bot a tu canal de voz")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "force",
            "Reconectar aunque ya esté en el canal",
        ))
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Desconecta el bot del canal de voz")
}

// Comandos para agregar a la cola

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce un video de YouTube")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
        .add_option(position_option())
}

fn say_command() -> CreateCommand {
    CreateCommand::new("say")
        .description("Lee un texto en voz alta")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "text", "Texto a leer")
                .required(true)
                .max_length(500),
        )
        .add_option(position_option())
}

fn sound_command() -> CreateCommand {
    CreateCommand::new("sound")
        .description("Reproduce un sonido guardado")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "name", "Nombre del sonido")
                .required(true),
        )
        .add_option(position_option())
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta al siguiente item")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción y limpia la cola")
}

// Comandos de cola

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue")
        .description("Muestra la cola de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "page", "Número de página")
                .min_int_value(1),
        )
}

fn remove_command() -> CreateCommand {
    CreateCommand::new("remove")
        .description("Quita un item de la cola")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "position", "Posición a quitar")
                .min_int_value(1)
                .required(true),
        )
}

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Mezcla la cola (sin tocar lo que suena)")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear")
        .description("Limpia la cola de reproducción")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "all",
            "Quitar también lo que está sonando",
        ))
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Activa/desactiva la repetición")
        .add_option(toggle_option("Estado deseado (por defecto alterna)"))
}

fn looptype_command() -> CreateCommand {
    CreateCommand::new("looptype")
        .description("Configura el modo de repetición")
        .add_option(
            CreateCommandOption::new(CommandOptionType::String, "mode", "Modo de repetición")
                .add_string_choice("Repetir el item", "single")
                .add_string_choice("Repetir la cola", "multiple")
                .add_string_choice("Reinsertar al azar", "shuffle")
                .required(true),
        )
}

fn autoplay_command() -> CreateCommand {
    CreateCommand::new("autoplay")
        .description("Sigue con videos relacionados cuando la cola termina")
        .add_option(toggle_option("Estado deseado (por defecto alterna)"))
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Number, "level", "Nuevo nivel de volumen")
                .min_number_value(0.0),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Number,
            "step",
            "Subir (positivo) o bajar (negativo) el volumen",
        ))
}

fn mute_command() -> CreateCommand {
    CreateCommand::new("mute")
        .description("Silencia o restaura el volumen")
        .add_option(toggle_option("Estado deseado (por defecto alterna)"))
}

// Comandos de administración

fn settings_command() -> CreateCommand {
    CreateCommand::new("settings")
        .description("Muestra o cambia la configuración de audio del servidor")
        .default_member_permissions(Permissions::MANAGE_GUILD)
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "announce_next",
            "Anunciar por voz el siguiente item",
        ))
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "announce_leave",
            "Anunciar por voz la desconexión por inactividad",
        ))
        .add_option(
            CreateCommandOption::new(CommandOptionType::Number, "max_volume", "Volumen máximo")
                .min_number_value(1.0),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Number,
                "volume_multiplier",
                "Multiplicador aplicado al volumen",
            )
            .min_number_value(0.01),
        )
}
