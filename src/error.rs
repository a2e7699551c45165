//! Error types for the music subsystem.
//!
//! Command handlers and startup code work with [`anyhow::Result`]; the
//! resolver and playback layers use the typed errors below so callers can
//! decide between "show the message", "try the next track" and "tear down".

use thiserror::Error;

/// Failures resolving a user query into a [`Track`](crate::sources::Track).
///
/// The `Display` text is the message shown to the user as-is.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("SoundCloud no está soportado actualmente. Por favor usa búsquedas de YouTube o URLs de YouTube.")]
    Unsupported,

    #[error("URL de YouTube inválida. Verifica el enlace.")]
    InvalidYouTubeUrl,

    #[error("No se pudo obtener información del video. Intenta con otro enlace.")]
    VideoUnavailable,

    #[error("No se pudo obtener información de Spotify.")]
    SpotifyUnavailable,

    #[error("Para playlists y álbumes de Spotify, usa el comando con la opción `playlist`.")]
    SpotifyCollection,

    #[error("URL de Spotify no válida.")]
    InvalidSpotifyUrl,

    #[error("No se encontró \"{0}\" en YouTube.")]
    NotFoundOnYouTube(String),

    #[error("No se encontró la playlist o no tiene canciones.")]
    EmptyPlaylist,
}

/// Failures on the playback path. None of these escape the controller:
/// they end up as a retry, an advance or a teardown.
#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("no hay conexión de voz activa")]
    NotConnected,

    #[error("URL de YouTube no válida: {0}")]
    InvalidUrl(String),

    #[error("todas las fuentes de audio fallaron (Piped, Cobalt, Invidious)")]
    ResolutionExhausted,

    #[error("fallo del transcodificador: {0}")]
    Transcode(String),

    #[error("error del reproductor de voz: {0}")]
    Sink(String),

    #[error("la pista fue reemplazada mientras se resolvía")]
    Superseded,
}

/// Outcome of a single proxy-instance probe.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("HTTP {0}")]
    Http(reqwest::StatusCode),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("respuesta inválida: {0}")]
    Malformed(String),

    #[error("timeout tras {0:?}")]
    Timeout(std::time::Duration),
}
