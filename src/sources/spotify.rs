//! Public Spotify metadata.
//!
//! Spotify is only used to learn *what* the user wants: the title and artist
//! are then searched on YouTube. No credentials are needed; the public embed
//! page ships its state as JSON, which is read defensively.

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::config::PLAYLIST_HARD_LIMIT;

static SPOTIFY_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:open\.)?spotify\.com/(?:intl-[a-z]+/)?(track|playlist|album)/([A-Za-z0-9]+)")
        .expect("patrón de Spotify válido")
});

static NEXT_DATA: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<script id="__NEXT_DATA__" type="application/json">(.*?)</script>"#)
        .expect("patrón de __NEXT_DATA__ válido")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpotifyKind {
    Track,
    Playlist,
    Album,
}

impl SpotifyKind {
    fn as_str(&self) -> &'static str {
        match self {
            SpotifyKind::Track => "track",
            SpotifyKind::Playlist => "playlist",
            SpotifyKind::Album => "album",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyTrackInfo {
    pub title: String,
    pub artist: String,
    pub thumbnail: Option<String>,
}

impl SpotifyTrackInfo {
    /// Query used to find the same song on YouTube.
    pub fn search_query(&self) -> String {
        format!("{} {}", self.title, self.artist.replace(',', ""))
    }

    pub fn display_title(&self) -> String {
        format!("{} - {}", self.title, self.artist)
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait SpotifyLookup: Send + Sync {
    /// Metadata of a single track URL; `None` when the page had no usable data.
    async fn track(&self, url: &str) -> Result<Option<SpotifyTrackInfo>>;

    /// Tracks of a playlist or album URL, capped at 50.
    async fn collection(&self, url: &str) -> Result<Vec<SpotifyTrackInfo>>;
}

pub struct SpotifyClient {
    client: reqwest::Client,
}

impl SpotifyClient {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .context("Error creando cliente HTTP de Spotify")?;

        Ok(Self { client })
    }

    async fn fetch_entity(&self, kind: SpotifyKind, id: &str) -> Result<Value> {
        let url = format!("https://open.spotify.com/embed/{}/{}", kind.as_str(), id);
        debug!("🎧 Leyendo metadata de Spotify: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Error en request a Spotify")?;

        if !response.status().is_success() {
            anyhow::bail!("HTTP error: {}", response.status());
        }

        let html = response.text().await.context("Error leyendo HTML de Spotify")?;
        extract_entity(&html).ok_or_else(|| anyhow::anyhow!("La página de Spotify no contiene datos"))
    }
}

#[async_trait]
impl SpotifyLookup for SpotifyClient {
    async fn track(&self, url: &str) -> Result<Option<SpotifyTrackInfo>> {
        let Some((SpotifyKind::Track, id)) = parse_spotify_url(url) else {
            anyhow::bail!("No es una URL de canción de Spotify: {}", url);
        };

        let entity = self.fetch_entity(SpotifyKind::Track, &id).await?;
        Ok(track_from_entity(&entity))
    }

    async fn collection(&self, url: &str) -> Result<Vec<SpotifyTrackInfo>> {
        let (kind, id) = match parse_spotify_url(url) {
            Some((kind @ (SpotifyKind::Playlist | SpotifyKind::Album), id)) => (kind, id),
            _ => anyhow::bail!("No es una playlist o álbum de Spotify: {}", url),
        };

        let entity = self.fetch_entity(kind, &id).await?;
        let tracks = tracks_from_entity(&entity);
        if tracks.is_empty() {
            warn!("⚠️ Spotify {} sin canciones legibles", id);
        }
        Ok(tracks)
    }
}

pub fn is_spotify_url(url: &str) -> bool {
    url.contains("spotify.com") || url.contains("open.spotify")
}

pub fn parse_spotify_url(url: &str) -> Option<(SpotifyKind, String)> {
    let captures = SPOTIFY_URL.captures(url)?;
    let kind = match captures.get(1)?.as_str() {
        "track" => SpotifyKind::Track,
        "playlist" => SpotifyKind::Playlist,
        "album" => SpotifyKind::Album,
        _ => return None,
    };
    Some((kind, captures.get(2)?.as_str().to_string()))
}

fn extract_entity(html: &str) -> Option<Value> {
    let raw = NEXT_DATA.captures(html)?.get(1)?.as_str();
    let data: Value = serde_json::from_str(raw).ok()?;
    data.pointer("/props/pageProps/state/data/entity").cloned()
}

fn cover_art(entity: &Value) -> Option<String> {
    entity
        .pointer("/coverArt/sources/0/url")
        .or_else(|| entity.pointer("/visualIdentity/image/0/url"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn track_from_entity(entity: &Value) -> Option<SpotifyTrackInfo> {
    let title = entity
        .get("name")
        .or_else(|| entity.get("title"))
        .and_then(Value::as_str)?
        .to_string();

    let artists: Vec<&str> = entity
        .get("artists")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(|a| a.get("name").and_then(Value::as_str)).collect())
        .unwrap_or_default();

    let artist = if artists.is_empty() {
        entity
            .get("subtitle")
            .and_then(Value::as_str)
            .map(clean_artist)
            .unwrap_or_else(|| "Unknown Artist".to_string())
    } else {
        artists.join(", ")
    };

    Some(SpotifyTrackInfo {
        title,
        artist,
        thumbnail: cover_art(entity),
    })
}

fn tracks_from_entity(entity: &Value) -> Vec<SpotifyTrackInfo> {
    let cover = cover_art(entity);

    entity
        .get("trackList")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|item| {
                    let title = item.get("title").and_then(Value::as_str)?;
                    let artist = item
                        .get("subtitle")
                        .and_then(Value::as_str)
                        .map(clean_artist)
                        .unwrap_or_else(|| "Unknown Artist".to_string());
                    Some(SpotifyTrackInfo {
                        title: title.to_string(),
                        artist,
                        thumbnail: cover.clone(),
                    })
                })
                .take(PLAYLIST_HARD_LIMIT)
                .collect()
        })
        .unwrap_or_default()
}

// Spotify separa artistas con espacios no separables
fn clean_artist(raw: &str) -> String {
    raw.replace('\u{a0}', " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn classifies_spotify_urls() {
        assert_eq!(
            parse_spotify_url("https://open.spotify.com/intl-es/track/4uLU6hMCjMI75M1A2tKUQC?si=1"),
            Some((SpotifyKind::Track, "4uLU6hMCjMI75M1A2tKUQC".to_string()))
        );
        assert_eq!(
            parse_spotify_url("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M"),
            Some((SpotifyKind::Playlist, "37i9dQZF1DXcBWIGoYBM5M".to_string()))
        );
        assert_eq!(
            parse_spotify_url("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3"),
            Some((SpotifyKind::Album, "1DFixLWuPkv3KT3TnV35m3".to_string()))
        );
        assert_eq!(parse_spotify_url("https://open.spotify.com/artist/xyz"), None);
        assert!(is_spotify_url("https://open.spotify.com/artist/xyz"));
    }

    #[test]
    fn reads_track_entity_from_embed_page() {
        let state = json!({
            "props": {"pageProps": {"state": {"data": {"entity": {
                "name": "Bohemian Rhapsody",
                "artists": [{"name": "Queen"}],
                "coverArt": {"sources": [{"url": "https://i.scdn.co/cover.jpg"}]}
            }}}}}
        });
        let html = format!(
            r#"<html><script id="__NEXT_DATA__" type="application/json">{}</script></html>"#,
            state
        );

        let entity = extract_entity(&html).expect("entity");
        let track = track_from_entity(&entity).expect("track");

        assert_eq!(
            track,
            SpotifyTrackInfo {
                title: "Bohemian Rhapsody".to_string(),
                artist: "Queen".to_string(),
                thumbnail: Some("https://i.scdn.co/cover.jpg".to_string()),
            }
        );
        assert_eq!(track.search_query(), "Bohemian Rhapsody Queen");
        assert_eq!(track.display_title(), "Bohemian Rhapsody - Queen");
    }

    #[test]
    fn reads_track_list_and_skips_malformed_items() {
        let entity = json!({
            "visualIdentity": {"image": [{"url": "cover.jpg"}]},
            "trackList": [
                {"title": "One", "subtitle": "A,\u{a0}B"},
                {"subtitle": "missing title"},
                {"title": "Two"}
            ]
        });

        let tracks = tracks_from_entity(&entity);
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].artist, "A, B");
        assert_eq!(tracks[0].thumbnail.as_deref(), Some("cover.jpg"));
        assert_eq!(tracks[1].artist, "Unknown Artist");
    }
}
