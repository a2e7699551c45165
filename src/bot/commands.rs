use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

fn all_commands() -> Vec<CreateCommand> {
    vec![
        play_command(),
        pause_command(),
        resume_command(),
        skip_command(),
        voteskip_command(),
        stop_command(),
        queue_command(),
        nowplaying_command(),
        random_command(),
        any_command(),
        loop_command(),
        autoplay_command(),
        clear_command(),
        volume_command(),
        addpermiss_command(),
        help_command(),
    ]
}

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

// Comandos de reproducción

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción de YouTube o Spotify")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "URL o término de búsqueda",
            )
            .required(true),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "playlist",
            "Cargar como playlist (YouTube, Spotify o búsqueda)",
        ))
}

// Comandos de control

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta la canción actual")
}

fn voteskip_command() -> CreateCommand {
    CreateCommand::new("voteskip").description("Vota para saltar la canción actual")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la música y desconecta el bot")
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

fn nowplaying_command() -> CreateCommand {
    CreateCommand::new("nowplaying").description("Muestra la canción actual")
}

fn random_command() -> CreateCommand {
    CreateCommand::new("random").description("Mezcla aleatoriamente la cola")
}

fn any_command() -> CreateCommand {
    CreateCommand::new("any").description("Reproduce una canción aleatoria de la cola")
}

fn loop_command() -> CreateCommand {
    CreateCommand::new("loop")
        .description("Repite la canción actual")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Boolean, "enabled", "Activar o desactivar")
                .required(true),
        )
}

fn autoplay_command() -> CreateCommand {
    CreateCommand::new("autoplay")
        .description("Activa/desactiva canciones relacionadas al terminar la cola")
}

fn clear_command() -> CreateCommand {
    CreateCommand::new("clear").description("Limpia la cola de reproducción")
}

// Comandos de audio

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Ajusta el volumen de reproducción")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Nivel de volumen (0-100)")
                .min_int_value(0)
                .max_int_value(100)
                .required(true),
        )
}

// Comandos adicionales

fn addpermiss_command() -> CreateCommand {
    CreateCommand::new("addpermiss")
        .description("Da permisos a un usuario para controlar la música")
        .add_option(
            CreateCommandOption::new(CommandOptionType::User, "user", "Usuario al que dar permisos")
                .required(true),
        )
}

fn help_command() -> CreateCommand {
    CreateCommand::new("help").description("Muestra los comandos disponibles")
}
