use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::spotify::{self, SpotifyKind, SpotifyLookup, SpotifyTrackInfo};
use super::{SourceType, Track, VideoSearch};
use crate::error::ResolveError;

/// Búsquedas de YouTube simultáneas al convertir playlists de Spotify
const PLAYLIST_SEARCH_CONCURRENCY: usize = 4;

/// Maps a user query to playable [`Track`]s.
///
/// Only metadata is resolved here. The audio stream URL is found later, at
/// play time, by [`AudioUrlResolver`](super::AudioUrlResolver).
pub struct TrackResolver {
    search: Arc<dyn VideoSearch>,
    spotify: Arc<dyn SpotifyLookup>,
    playlist_limit: usize,
}

impl TrackResolver {
    pub fn new(
        search: Arc<dyn VideoSearch>,
        spotify: Arc<dyn SpotifyLookup>,
        playlist_limit: usize,
    ) -> Self {
        Self {
            search,
            spotify,
            playlist_limit: playlist_limit.clamp(1, crate::config::PLAYLIST_HARD_LIMIT),
        }
    }

    /// Resolves a single track. `Ok(None)` means the search matched nothing.
    pub async fn resolve(&self, query: &str, requested_by: &str) -> Result<Option<Track>, ResolveError> {
        let query = query.trim();

        if super::is_soundcloud_url(query) {
            return Err(ResolveError::Unsupported);
        }

        if spotify::is_spotify_url(query) {
            return match spotify::parse_spotify_url(query) {
                Some((SpotifyKind::Track, _)) => self.resolve_spotify_track(query, requested_by).await.map(Some),
                Some(_) => Err(ResolveError::SpotifyCollection),
                None => Err(ResolveError::InvalidSpotifyUrl),
            };
        }

        if super::is_youtube_url(query) {
            return self.resolve_youtube_url(query, requested_by).await.map(Some);
        }

        match self.search.search(query, 1).await {
            Ok(results) => Ok(results
                .first()
                .map(|video| Track::from_video(video, requested_by, SourceType::YouTube))),
            Err(e) => {
                warn!("⚠️ Búsqueda fallida para '{}': {:?}", query, e);
                Ok(None)
            }
        }
    }

    /// Resolves a playlist or album into at most `playlist_limit` tracks.
    ///
    /// Items that cannot be found are left out; only a completely empty
    /// result is an error.
    pub async fn resolve_playlist(&self, query: &str, requested_by: &str) -> Result<Vec<Track>, ResolveError> {
        let query = query.trim();

        if super::is_soundcloud_url(query) {
            return Err(ResolveError::Unsupported);
        }

        let tracks = if spotify::is_spotify_url(query) {
            match spotify::parse_spotify_url(query) {
                Some((SpotifyKind::Track, _)) => vec![self.resolve_spotify_track(query, requested_by).await?],
                Some(_) => self.resolve_spotify_collection(query, requested_by).await?,
                None => return Err(ResolveError::InvalidSpotifyUrl),
            }
        } else if let Some(list_id) = super::youtube_playlist_id(query) {
            self.load_youtube_playlist(&list_id, requested_by).await
        } else if super::is_youtube_url(query) {
            vec![self.resolve_youtube_url(query, requested_by).await?]
        } else {
            match self.search.find_playlist(query).await {
                Ok(Some(list_id)) => self.load_youtube_playlist(&list_id, requested_by).await,
                Ok(None) => Vec::new(),
                Err(e) => {
                    warn!("⚠️ Búsqueda de playlist fallida para '{}': {:?}", query, e);
                    Vec::new()
                }
            }
        };

        if tracks.is_empty() {
            return Err(ResolveError::EmptyPlaylist);
        }

        info!("📋 Playlist resuelta: {} canciones", tracks.len());
        Ok(tracks)
    }

    async fn resolve_youtube_url(&self, url: &str, requested_by: &str) -> Result<Track, ResolveError> {
        let video_id = super::extract_video_id(url).ok_or(ResolveError::InvalidYouTubeUrl)?;

        match self.search.video(&video_id).await {
            Ok(Some(video)) => Ok(Track::from_video(&video, requested_by, SourceType::YouTube)),
            Ok(None) => Err(ResolveError::VideoUnavailable),
            Err(e) => {
                warn!("⚠️ No se pudo obtener el video {}: {:?}", video_id, e);
                Err(ResolveError::VideoUnavailable)
            }
        }
    }

    async fn resolve_spotify_track(&self, url: &str, requested_by: &str) -> Result<Track, ResolveError> {
        let info = match self.spotify.track(url).await {
            Ok(Some(info)) => info,
            Ok(None) => return Err(ResolveError::SpotifyUnavailable),
            Err(e) => {
                warn!("⚠️ Error leyendo Spotify {}: {:?}", url, e);
                return Err(ResolveError::SpotifyUnavailable);
            }
        };

        self.match_on_youtube(&info, requested_by)
            .await
            .ok_or_else(|| ResolveError::NotFoundOnYouTube(info.display_title()))
    }

    async fn resolve_spotify_collection(&self, url: &str, requested_by: &str) -> Result<Vec<Track>, ResolveError> {
        let items = self.spotify.collection(url).await.map_err(|e| {
            warn!("⚠️ Error leyendo colección de Spotify {}: {:?}", url, e);
            ResolveError::SpotifyUnavailable
        })?;

        let limit = self.playlist_limit;
        let tracks: Vec<Track> = stream::iter(items.into_iter().take(limit))
            .map(|info| async move { self.match_on_youtube(&info, requested_by).await })
            .buffered(PLAYLIST_SEARCH_CONCURRENCY)
            .filter_map(|track| async move { track })
            .collect()
            .await;

        Ok(tracks)
    }

    /// Finds the YouTube video for a Spotify track. Failures are swallowed.
    async fn match_on_youtube(&self, info: &SpotifyTrackInfo, requested_by: &str) -> Option<Track> {
        let query = info.search_query();
        let video = match self.search.search(&query, 1).await {
            Ok(results) => results.into_iter().next()?,
            Err(e) => {
                debug!("Sin resultado en YouTube para '{}': {:?}", query, e);
                return None;
            }
        };

        let thumbnail = info
            .thumbnail
            .clone()
            .or_else(|| video.thumbnail.clone())
            .unwrap_or_default();

        Some(Track::new(
            info.display_title(),
            video.url(),
            video.duration_secs.unwrap_or(0),
            thumbnail,
            requested_by,
            SourceType::Spotify,
        ))
    }

    async fn load_youtube_playlist(&self, list_id: &str, requested_by: &str) -> Vec<Track> {
        match self.search.playlist(list_id, self.playlist_limit).await {
            Ok(videos) => videos
                .iter()
                .take(self.playlist_limit)
                .map(|video| Track::from_video(video, requested_by, SourceType::YouTube))
                .collect(),
            Err(e) => {
                warn!("⚠️ Error cargando playlist {}: {:?}", list_id, e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::spotify::MockSpotifyLookup;
    use crate::sources::{MockVideoSearch, VideoInfo};
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn video(id: &str, title: &str) -> VideoInfo {
        VideoInfo {
            id: id.to_string(),
            title: title.to_string(),
            duration_secs: Some(200),
            thumbnail: Some(format!("{}.jpg", id)),
        }
    }

    fn resolver(search: MockVideoSearch, spotify: MockSpotifyLookup) -> TrackResolver {
        TrackResolver::new(Arc::new(search), Arc::new(spotify), 50)
    }

    #[tokio::test]
    async fn soundcloud_is_rejected_without_network() {
        let resolver = resolver(MockVideoSearch::new(), MockSpotifyLookup::new());

        let result = resolver.resolve("https://soundcloud.com/artist/song", "ana").await;
        assert_eq!(result.unwrap_err(), ResolveError::Unsupported);
    }

    #[tokio::test]
    async fn free_text_takes_first_result() {
        let mut search = MockVideoSearch::new();
        search
            .expect_search()
            .with(eq("never gonna give you up"), eq(1))
            .returning(|_, _| Ok(vec![video("dQw4w9WgXcQ", "Rick Astley")]));

        let track = resolver(search, MockSpotifyLookup::new())
            .resolve("never gonna give you up", "ana")
            .await
            .unwrap()
            .expect("track");

        assert_eq!(track.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
        assert_eq!(track.duration, "3:20");
        assert_eq!(track.requested_by, "ana");
        assert_eq!(track.source, SourceType::YouTube);
    }

    #[tokio::test]
    async fn empty_search_is_not_an_error() {
        let mut search = MockVideoSearch::new();
        search.expect_search().returning(|_, _| Ok(Vec::new()));

        let result = resolver(search, MockSpotifyLookup::new()).resolve("zzzz", "ana").await;
        assert!(matches!(result, Ok(None)));
    }

    #[tokio::test]
    async fn youtube_url_fetches_that_exact_video() {
        let mut search = MockVideoSearch::new();
        search
            .expect_video()
            .with(eq("dQw4w9WgXcQ"))
            .returning(|id| Ok(Some(video(id, "Exact"))));

        let track = resolver(search, MockSpotifyLookup::new())
            .resolve("https://youtu.be/dQw4w9WgXcQ", "ana")
            .await
            .unwrap()
            .expect("track");
        assert_eq!(track.title, "Exact");

        let bad = resolver(MockVideoSearch::new(), MockSpotifyLookup::new())
            .resolve("https://www.youtube.com/feed/trending", "ana")
            .await;
        assert_eq!(bad.unwrap_err(), ResolveError::InvalidYouTubeUrl);
    }

    #[tokio::test]
    async fn spotify_track_is_searched_on_youtube() {
        let mut spotify = MockSpotifyLookup::new();
        spotify.expect_track().returning(|_| {
            Ok(Some(SpotifyTrackInfo {
                title: "Song".to_string(),
                artist: "Band".to_string(),
                thumbnail: Some("cover.jpg".to_string()),
            }))
        });
        let mut search = MockVideoSearch::new();
        search
            .expect_search()
            .with(eq("Song Band"), eq(1))
            .returning(|_, _| Ok(vec![video("abcdefghijk", "Song (Official)")]));

        let track = resolver(search, spotify)
            .resolve("https://open.spotify.com/track/abc123", "ana")
            .await
            .unwrap()
            .expect("track");

        assert_eq!(track.title, "Song - Band");
        assert_eq!(track.thumbnail, "cover.jpg");
        assert_eq!(track.source, SourceType::Spotify);
    }

    #[tokio::test]
    async fn spotify_collection_on_single_path_asks_for_playlist_option() {
        let result = resolver(MockVideoSearch::new(), MockSpotifyLookup::new())
            .resolve("https://open.spotify.com/album/abc123", "ana")
            .await;
        assert_eq!(result.unwrap_err(), ResolveError::SpotifyCollection);
    }

    #[tokio::test]
    async fn spotify_playlist_swallows_missing_items() {
        let mut spotify = MockSpotifyLookup::new();
        spotify.expect_collection().returning(|_| {
            Ok(["one", "two", "three"]
                .iter()
                .map(|title| SpotifyTrackInfo {
                    title: title.to_string(),
                    artist: "X".to_string(),
                    thumbnail: None,
                })
                .collect())
        });
        let mut search = MockVideoSearch::new();
        search.expect_search().returning(|query, _| match query {
            "two X" => Err(anyhow::anyhow!("rate limited")),
            "three X" => Ok(Vec::new()),
            _ => Ok(vec![video("aaaaaaaaaaa", "One")]),
        });

        let tracks = resolver(search, spotify)
            .resolve_playlist("https://open.spotify.com/playlist/xyz", "ana")
            .await
            .unwrap();

        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].title, "one - X");
        assert_eq!(tracks[0].thumbnail, "aaaaaaaaaaa.jpg");
    }

    #[tokio::test]
    async fn youtube_playlist_is_capped_and_empty_is_an_error() {
        let mut search = MockVideoSearch::new();
        search
            .expect_playlist()
            .with(eq("PLfull"), eq(2))
            .returning(|_, _| Ok((0..5).map(|i| video(&format!("id{}", i), "v")).collect()));
        search.expect_playlist().with(eq("PLempty"), eq(2)).returning(|_, _| Ok(Vec::new()));

        let resolver = TrackResolver::new(Arc::new(search), Arc::new(MockSpotifyLookup::new()), 2);

        let tracks = resolver
            .resolve_playlist("https://www.youtube.com/playlist?list=PLfull", "ana")
            .await
            .unwrap();
        assert_eq!(tracks.len(), 2);

        let empty = resolver
            .resolve_playlist("https://www.youtube.com/playlist?list=PLempty", "ana")
            .await;
        assert_eq!(empty.unwrap_err(), ResolveError::EmptyPlaylist);
    }

    #[tokio::test]
    async fn free_text_playlist_searches_for_a_list() {
        let mut search = MockVideoSearch::new();
        search
            .expect_find_playlist()
            .with(eq("lofi beats"))
            .returning(|_| Ok(Some("PLlofi".to_string())));
        search
            .expect_playlist()
            .with(eq("PLlofi"), eq(50))
            .returning(|_, _| Ok(vec![video("lofi0000001", "Lofi 1")]));

        let tracks = resolver(search, MockSpotifyLookup::new())
            .resolve_playlist("lofi beats", "ana")
            .await
            .unwrap();
        assert_eq!(tracks[0].title, "Lofi 1");
    }
}
