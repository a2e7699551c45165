use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};

use crate::{
    audio::{
        notice::Notice,
        queue::{PlaybackState, QueueInfo},
    },
    sources::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Lag Music";

pub const QUEUE_PAGE_SIZE: usize = 10;

/// Keeps a full page under Discord's 1024-char field limit.
const QUEUE_TITLE_MAX_CHARS: usize = 70;

/// Embed for a notice coming from the playback controller.
pub fn create_notice_embed(notice: &Notice) -> CreateEmbed {
    match notice {
        Notice::NowPlaying(track) => create_now_playing_embed(track),
        Notice::SkippingAfterError { title, reason } => create_skipping_embed(title, reason),
        Notice::PlaybackFault { title } => create_fault_embed(title),
        Notice::QueueEnded => create_queue_ended_embed(),
    }
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &Track) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**[{}]({})**", track.title, track.url))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", &track.duration, true)
        .field("👤 Solicitado por", &track.requested_by, true)
        .field("🔗 Fuente", track.source.as_str(), true);

    if !track.thumbnail.is_empty() {
        embed = embed.thumbnail(&track.thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, position: usize) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(format!("**[{}]({})**", track.title, track.url))
        .color(colors::SUCCESS_GREEN)
        .field("⏱️ Duración", &track.duration, true)
        .field("📍 Posición", position.to_string(), true)
        .field("🔗 Fuente", track.source.as_str(), true);

    if !track.thumbnail.is_empty() {
        embed = embed.thumbnail(&track.thumbnail);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_playlist_added_embed(tracks: &[Track]) -> CreateEmbed {
    let preview: String = tracks
        .iter()
        .take(5)
        .enumerate()
        .map(|(i, track)| format!("**{}**. {}\n", i + 1, track.title))
        .collect();

    let mut embed = CreateEmbed::default()
        .title("📋 Playlist Agregada")
        .description(format!("Se agregaron **{}** canciones a la cola", tracks.len()))
        .color(colors::MUSIC_PURPLE);

    if !preview.is_empty() {
        embed = embed.field("Primeras canciones", preview, false);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn create_skipping_embed(title: &str, reason: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("⚠️ No se pudo reproducir")
        .description(format!("**{}**\n{}\n\nSaltando a la siguiente canción...", title, reason))
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn create_fault_embed(title: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error de reproducción")
        .description(format!(
            "**{}** falló varias veces durante la reproducción. Saltando...",
            title
        ))
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

fn create_queue_ended_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("📭 Cola terminada")
        .description("No hay más canciones en la cola.\n\n💡 Usa `/play <canción>` para seguir escuchando")
        .color(colors::NEUTRAL_GRAY)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

pub fn create_queue_embed(queue_info: &QueueInfo, page: usize) -> CreateEmbed {
    let queue_page = queue_info.get_page(page, QUEUE_PAGE_SIZE);

    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if queue_info.current.is_none() && queue_page.total_items == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &queue_info.current {
        let status = match queue_info.state {
            PlaybackState::Paused => "⏸️ Pausado",
            PlaybackState::Resolving => "⏳ Cargando",
            _ => "▶️ Reproduciendo",
        };
        embed = embed.field(
            status,
            format!(
                "**{}** `[{}]` • {}",
                truncate_title(&current.title),
                current.duration,
                current.requested_by
            ),
            false,
        );
    }

    // Próximas canciones
    if !queue_page.items.is_empty() {
        let description: String = queue_page
            .items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                format!(
                    "**{}**. {} `[{}]`\n",
                    queue_page.offset + i + 1,
                    truncate_title(&item.title),
                    item.duration
                )
            })
            .collect();

        embed = embed.field("Próximas canciones", description, false);
    }

    embed = embed.field("Información", queue_status_line(queue_info), false);

    // Paginación
    if queue_page.total_pages > 1 {
        embed = embed.footer(CreateEmbedFooter::new(format!(
            "Página {} de {} • Lag Music",
            queue_page.current_page, queue_page.total_pages
        )));
    } else {
        embed = embed.footer(CreateEmbedFooter::new(STANDARD_FOOTER));
    }

    embed.timestamp(Timestamp::now())
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= QUEUE_TITLE_MAX_CHARS {
        return title.to_string();
    }

    let cut: String = title.chars().take(QUEUE_TITLE_MAX_CHARS - 1).collect();
    format!("{}…", cut.trim_end())
}

fn queue_status_line(queue_info: &QueueInfo) -> String {
    let mut info = format!(
        "**Total:** {} canciones • 🔊 {}%",
        queue_info.items.len(),
        queue_info.volume
    );

    if queue_info.loop_enabled {
        info.push_str(" • 🔁 **Repetir**");
    }
    if queue_info.shuffle {
        info.push_str(" • 🔀 **Aleatorio**");
    }
    if queue_info.autoplay {
        info.push_str(" • 📻 **Autoplay**");
    }

    info
}

pub fn create_help_embed() -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Lag Music - Comandos")
        .color(colors::INFO_BLUE)
        .description("Música desde YouTube y Spotify en tu canal de voz")
        .field(
            "🎵 Reproducción",
            "• `/play <canción> [playlist]` - Reproduce una canción o playlist\n\
            • `/pause` - Pausa la reproducción\n\
            • `/resume` - Reanuda la reproducción\n\
            • `/skip` - Salta la canción actual\n\
            • `/voteskip` - Vota para saltar\n\
            • `/stop` - Detiene y desconecta",
            false,
        )
        .field(
            "📜 Cola",
            "• `/queue [página]` - Muestra la cola\n\
            • `/nowplaying` - Canción actual\n\
            • `/random` - Mezcla la cola\n\
            • `/any` - Reproduce una canción al azar de la cola\n\
            • `/loop <activar>` - Repite la canción actual\n\
            • `/autoplay` - Canciones relacionadas al terminar la cola\n\
            • `/clear` - Limpia la cola",
            false,
        )
        .field(
            "🎛️ Otros",
            "• `/volume <0-100>` - Ajusta el volumen\n\
            • `/addpermiss <usuario>` - Permite a un usuario controlar tu canal",
            false,
        )
        .field(
            "🎵 Fuentes Soportadas",
            "• YouTube (URLs, playlists y búsqueda)\n\
            • Spotify (canciones, playlists y álbumes)",
            false,
        )
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceType;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn track(title: &str) -> Track {
        Track::new(title, "https://www.youtube.com/watch?v=abc", 215, "https://img/abc.jpg", "ana", SourceType::YouTube)
    }

    fn json(embed: CreateEmbed) -> Value {
        serde_json::to_value(embed).expect("embed serializable")
    }

    fn field_values(value: &Value) -> Vec<String> {
        value["fields"]
            .as_array()
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| f["value"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[test]
    fn now_playing_shows_link_requester_and_source() {
        let value = json(create_notice_embed(&Notice::NowPlaying(track("Song"))));

        assert_eq!(value["title"], "🎵 Reproduciendo Ahora");
        assert_eq!(
            value["description"],
            "**[Song](https://www.youtube.com/watch?v=abc)**"
        );
        assert_eq!(field_values(&value), vec!["3:35", "ana", "youtube"]);
        assert_eq!(value["thumbnail"]["url"], "https://img/abc.jpg");
    }

    #[test]
    fn queue_page_numbers_continue_across_pages() {
        let info = QueueInfo {
            current: Some(track("now")),
            items: (1..=12).map(|i| track(&format!("t{}", i))).collect(),
            state: PlaybackState::Playing,
            loop_enabled: true,
            shuffle: false,
            autoplay: false,
            volume: 80,
        };

        let value = json(create_queue_embed(&info, 2));
        let fields = field_values(&value);

        assert!(fields[1].starts_with("**11**. t11"));
        assert!(fields[2].contains("🔁"));
        assert!(fields[2].contains("80%"));
    }

    #[test]
    fn long_titles_fit_in_one_field() {
        let long = "ñ".repeat(300);
        let info = QueueInfo {
            current: Some(track(&long)),
            items: (0..QUEUE_PAGE_SIZE).map(|_| track(&long)).collect(),
            state: PlaybackState::Playing,
            loop_enabled: false,
            shuffle: false,
            autoplay: false,
            volume: 100,
        };

        let value = json(create_queue_embed(&info, 1));
        for field in field_values(&value) {
            assert!(field.chars().count() <= 1024, "{} chars", field.chars().count());
        }
        assert_eq!(truncate_title(&long).chars().count(), QUEUE_TITLE_MAX_CHARS);
        assert_eq!(truncate_title("corto"), "corto");
    }

    #[test]
    fn empty_queue_has_no_fields() {
        let info = QueueInfo {
            current: None,
            items: Vec::new(),
            state: PlaybackState::ConnectedIdle,
            loop_enabled: false,
            shuffle: false,
            autoplay: false,
            volume: 100,
        };

        let value = json(create_queue_embed(&info, 1));
        assert!(field_values(&value).is_empty());
    }
}
