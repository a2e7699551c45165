//! # Sources Module
//!
//! Everything that turns a user query into something playable:
//!
//! - [`resolver`] maps a query (free text, YouTube URL, Spotify URL) to a [`Track`]
//! - [`youtube`] talks to `yt-dlp` for search and metadata
//! - [`spotify`] reads public Spotify metadata (the audio never comes from Spotify)
//! - [`audio_url`] finds a direct audio stream for a video by probing three
//!   proxy families in order: [`piped`], [`cobalt`], [`invidious`]

pub mod audio_url;
pub mod cobalt;
pub mod invidious;
pub mod piped;
pub mod resolver;
pub mod spotify;
pub mod youtube;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

#[cfg(test)]
use mockall::automock;

pub use audio_url::AudioUrlResolver;
pub use resolver::TrackResolver;
pub use spotify::SpotifyClient;
pub use youtube::YtDlpClient;

static VIDEO_ID_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"(?:youtube\.com/watch\?v=|youtu\.be/|youtube\.com/embed/)([^&\n?#]+)")
            .expect("patrón de video válido"),
        Regex::new(r"youtube\.com/shorts/([^&\n?#]+)").expect("patrón de shorts válido"),
    ]
});

static PLAYLIST_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]list=([^&#]+)").expect("patrón de playlist válido"));

/// Where a track's metadata came from. Audio always comes from YouTube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    YouTube,
    Spotify,
    SoundCloud,
    Other,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::YouTube => "youtube",
            SourceType::Spotify => "spotify",
            SourceType::SoundCloud => "soundcloud",
            SourceType::Other => "other",
        }
    }
}

/// One playable item with display metadata. Never mutated once built.
#[derive(Debug, Clone)]
pub struct Track {
    pub title: String,
    pub url: String,
    pub duration: String,
    pub thumbnail: String,
    pub requested_by: String,
    pub source: SourceType,
}

impl Track {
    pub fn new(
        title: impl Into<String>,
        url: impl Into<String>,
        duration_secs: u64,
        thumbnail: impl Into<String>,
        requested_by: impl Into<String>,
        source: SourceType,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            duration: format_duration(duration_secs),
            thumbnail: thumbnail.into(),
            requested_by: requested_by.into(),
            source,
        }
    }

    pub fn from_video(video: &VideoInfo, requested_by: &str, source: SourceType) -> Self {
        Self::new(
            video.title.clone(),
            video.url(),
            video.duration_secs.unwrap_or(0),
            video.thumbnail.clone().unwrap_or_default(),
            requested_by,
            source,
        )
    }

    pub fn video_id(&self) -> Option<String> {
        extract_video_id(&self.url)
    }
}

/// Search/metadata result for one YouTube video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub duration_secs: Option<u64>,
    pub thumbnail: Option<String>,
}

impl VideoInfo {
    pub fn url(&self) -> String {
        watch_url(&self.id)
    }
}

/// YouTube metadata backend. Errors mean "the backend failed", an empty
/// result means "nothing matched".
#[cfg_attr(test, automock)]
#[async_trait]
pub trait VideoSearch: Send + Sync {
    /// Busca videos y devuelve hasta `limit` resultados en orden de relevancia
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoInfo>>;

    /// Metadata de un video concreto
    async fn video(&self, video_id: &str) -> Result<Option<VideoInfo>>;

    /// Videos de una playlist, hasta `limit`
    async fn playlist(&self, list_id: &str, limit: usize) -> Result<Vec<VideoInfo>>;

    /// ID de la primera playlist que coincide con la búsqueda
    async fn find_playlist(&self, query: &str) -> Result<Option<String>>;
}

pub fn is_youtube_url(query: &str) -> bool {
    query.contains("youtube.com") || query.contains("youtu.be")
}

pub fn is_soundcloud_url(query: &str) -> bool {
    query.contains("soundcloud.com")
}

/// Extracts the video ID from watch, short-link, embed and shorts URLs.
pub fn extract_video_id(url: &str) -> Option<String> {
    VIDEO_ID_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
}

pub fn youtube_playlist_id(url: &str) -> Option<String> {
    if !url.contains("youtube.com/playlist") {
        return None;
    }
    PLAYLIST_ID_PATTERN
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={}", video_id)
}

/// `m:ss`, minutes unbounded.
pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn extracts_ids_from_every_url_form() {
        let id = Some("dQw4w9WgXcQ".to_string());
        assert_eq!(extract_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42"), id);
        assert_eq!(extract_video_id("https://youtu.be/dQw4w9WgXcQ?si=abc"), id);
        assert_eq!(extract_video_id("https://www.youtube.com/embed/dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://youtube.com/shorts/dQw4w9WgXcQ"), id);
        assert_eq!(extract_video_id("https://example.com/video"), None);
    }

    #[test]
    fn playlist_id_requires_playlist_path() {
        assert_eq!(
            youtube_playlist_id("https://www.youtube.com/playlist?list=PL123&si=x"),
            Some("PL123".to_string())
        );
        assert_eq!(youtube_playlist_id("https://www.youtube.com/watch?v=abc&list=PL123"), None);
    }

    #[test]
    fn formats_durations_as_minutes_and_seconds() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3725), "62:05");
    }

    #[test]
    fn youtube_url_detection() {
        assert!(is_youtube_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://youtu.be/dQw4w9WgXcQ"));
        assert!(is_youtube_url("https://music.youtube.com/watch?v=test"));
        assert!(!is_youtube_url("https://example.com/video"));
        assert!(is_soundcloud_url("https://soundcloud.com/artist/song"));
    }
}
