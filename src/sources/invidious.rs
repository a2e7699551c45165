use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::audio_url::{highest_bitrate, probe_instances, ProxyFamily, ResolvedAudio};
use crate::error::ProbeError;

/// Family C: Invidious API, `GET /api/v1/videos/{id}`.
pub struct InvidiousFamily {
    client: reqwest::Client,
    instances: Vec<String>,
    timeout: Duration,
}

impl InvidiousFamily {
    pub fn new(client: reqwest::Client, instances: Vec<String>, timeout: Duration) -> Self {
        Self {
            client,
            instances,
            timeout,
        }
    }

    async fn probe(&self, base: String, video_id: &str) -> Result<String, ProbeError> {
        let response = self
            .client
            .get(format!("{}/api/v1/videos/{}", base, video_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProbeError::Http(response.status()));
        }

        let body: Value = response.json().await?;
        let url = best_adaptive_audio(&body)?;
        Ok(absolute_url(&base, &url))
    }
}

#[async_trait]
impl ProxyFamily for InvidiousFamily {
    fn name(&self) -> &'static str {
        "Invidious"
    }

    async fn resolve(&self, video_id: &str) -> Option<ResolvedAudio> {
        probe_instances(self.name(), &self.instances, self.timeout, |base| {
            self.probe(base, video_id)
        })
        .await
    }
}

// Invidious reporta el bitrate como string o como número
fn bitrate(format: &Value) -> u64 {
    match format.get("bitrate") {
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
        _ => 0,
    }
}

fn best_adaptive_audio(body: &Value) -> Result<String, ProbeError> {
    let formats = body
        .get("adaptiveFormats")
        .and_then(Value::as_array)
        .ok_or_else(|| ProbeError::Malformed("sin adaptiveFormats".to_string()))?;

    let audio = formats.iter().filter_map(|format| {
        let is_audio = format
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| t.starts_with("audio/"));
        let url = format.get("url").and_then(Value::as_str).filter(|u| !u.is_empty())?;
        is_audio.then(|| (bitrate(format), url.to_string()))
    });

    highest_bitrate(audio).ok_or_else(|| ProbeError::Malformed("sin formatos audio con url".to_string()))
}

/// Resolves protocol-relative and path-relative URLs against the instance.
fn absolute_url(base: &str, url: &str) -> String {
    match url::Url::parse(base).and_then(|base| base.join(url)) {
        Ok(joined) => joined.to_string(),
        Err(_) => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn picks_best_audio_only_format() {
        let body = json!({
            "adaptiveFormats": [
                {"type": "video/mp4; codecs=\"avc1\"", "url": "https://v/video", "bitrate": "2000000"},
                {"type": "audio/webm; codecs=\"opus\"", "url": "https://v/opus", "bitrate": "160000"},
                {"type": "audio/mp4", "url": "https://v/aac", "bitrate": 128000},
                {"type": "audio/webm", "bitrate": "999999"}
            ]
        });
        assert_eq!(best_adaptive_audio(&body).unwrap(), "https://v/opus");
    }

    #[test]
    fn rejects_bodies_without_audio() {
        assert!(best_adaptive_audio(&json!({})).is_err());
        assert!(best_adaptive_audio(&json!({"adaptiveFormats": [{"type": "video/mp4", "url": "x"}]})).is_err());
    }

    #[test]
    fn normalizes_relative_urls() {
        assert_eq!(absolute_url("https://inv.example/", "//cdn.example/a"), "https://cdn.example/a");
        assert_eq!(
            absolute_url("https://inv.example/", "/latest_version?id=x"),
            "https://inv.example/latest_version?id=x"
        );
        assert_eq!(absolute_url("https://inv.example", "https://x/a"), "https://x/a");
    }
}
