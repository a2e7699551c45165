use anyhow::{Context, Result};
use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{VideoInfo, VideoSearch};

/// Filtro de búsqueda de YouTube que devuelve solo playlists
const PLAYLIST_FILTER: &str = "EgIQAw%3D%3D";

/// YouTube metadata through `yt-dlp`.
pub struct YtDlpClient {
    binary: String,
    timeout: Duration,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Una línea de `--dump-json`. Todos los campos son opcionales: yt-dlp cambia
/// de forma según el extractor y el modo (plano o completo).
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    thumbnails: Option<Vec<YtDlpThumbnail>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpThumbnail {
    url: Option<String>,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            rate_limiter: Semaphore::new(3),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let _permit = self.rate_limiter.acquire().await?;

        debug!("🔧 yt-dlp {}", args.join(" "));

        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.binary).args(args).kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("yt-dlp excedió el tiempo límite de {:?}", self.timeout))?
        .context("Error al ejecutar yt-dlp")?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp error: {}", error.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl VideoSearch for YtDlpClient {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<VideoInfo>> {
        info!("🔍 Buscando en YouTube: {}", query);

        let search_query = format!("ytsearch{}:{}", limit, query);
        let stdout = self
            .run(&[
                "--dump-json",
                "--flat-playlist",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        Ok(parse_entries(&stdout))
    }

    async fn video(&self, video_id: &str) -> Result<Option<VideoInfo>> {
        let url = super::watch_url(video_id);
        let stdout = self
            .run(&["--dump-json", "--no-playlist", "--skip-download", "--no-warnings", &url])
            .await?;

        Ok(parse_entries(&stdout).into_iter().next())
    }

    async fn playlist(&self, list_id: &str, limit: usize) -> Result<Vec<VideoInfo>> {
        info!("📋 Obteniendo playlist: {}", list_id);

        let url = format!("https://www.youtube.com/playlist?list={}", list_id);
        let end = limit.to_string();
        let stdout = self
            .run(&["--flat-playlist", "--dump-json", "--playlist-end", &end, "--no-warnings", &url])
            .await?;

        let mut videos = parse_entries(&stdout);
        videos.truncate(limit);
        Ok(videos)
    }

    async fn find_playlist(&self, query: &str) -> Result<Option<String>> {
        let url = format!(
            "https://www.youtube.com/results?search_query={}&sp={}",
            urlencoding::encode(query),
            PLAYLIST_FILTER
        );
        let stdout = self
            .run(&["--flat-playlist", "--dump-json", "--playlist-end", "1", "--no-warnings", &url])
            .await?;

        Ok(parse_entries(&stdout).into_iter().next().map(|entry| entry.id))
    }
}

/// Parses one JSON object per line, skipping lines that lack an id or title.
fn parse_entries(stdout: &str) -> Vec<VideoInfo> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpEntry>(line).ok())
        .filter_map(|entry| {
            let thumbnail = entry.thumbnail.or_else(|| {
                entry
                    .thumbnails
                    .unwrap_or_default()
                    .into_iter()
                    .rev()
                    .find_map(|thumb| thumb.url)
            });

            Some(VideoInfo {
                id: entry.id.filter(|id| !id.is_empty())?,
                title: entry.title?,
                duration_secs: entry.duration.filter(|d| *d >= 0.0).map(|d| d as u64),
                thumbnail,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_flat_and_full_entries() {
        let stdout = concat!(
            r#"{"id":"abc123def45","title":"Song A","duration":215.0,"thumbnails":[{"url":"small.jpg"},{"url":"big.jpg"}]}"#,
            "\n",
            "not json\n",
            r#"{"id":"xyz","title":null}"#,
            "\n",
            r#"{"id":"zzz987yyy65","title":"Song B","duration":null,"thumbnail":"thumb.jpg"}"#,
        );

        let entries = parse_entries(stdout);
        assert_eq!(
            entries,
            vec![
                VideoInfo {
                    id: "abc123def45".to_string(),
                    title: "Song A".to_string(),
                    duration_secs: Some(215),
                    thumbnail: Some("big.jpg".to_string()),
                },
                VideoInfo {
                    id: "zzz987yyy65".to_string(),
                    title: "Song B".to_string(),
                    duration_secs: None,
                    thumbnail: Some("thumb.jpg".to_string()),
                },
            ]
        );
    }
}
