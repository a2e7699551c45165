use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::audio_url::{highest_bitrate, probe_instances, ProxyFamily, ResolvedAudio};
use crate::error::ProbeError;

/// Family A: Piped API, `GET /streams/{id}`.
pub struct PipedFamily {
    client: reqwest::Client,
    instances: Vec<String>,
    timeout: Duration,
}

impl PipedFamily {
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
            .get(format!("{}/streams/{}", base, video_id))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProbeError::Http(response.status()));
        }

        let body: Value = response.json().await?;
        best_audio_stream(&body)
    }
}

#[async_trait]
impl ProxyFamily for PipedFamily {
    fn name(&self) -> &'static str {
        "Piped"
    }

    async fn resolve(&self, video_id: &str) -> Option<ResolvedAudio> {
        probe_instances(self.name(), &self.instances, self.timeout, |base| {
            self.probe(base, video_id)
        })
        .await
    }
}

/// Highest-bitrate entry of `audioStreams`. Streams that declare no bitrate
/// are only considered when none of them do.
fn best_audio_stream(body: &Value) -> Result<String, ProbeError> {
    let streams = body
        .get("audioStreams")
        .and_then(Value::as_array)
        .filter(|streams| !streams.is_empty())
        .ok_or_else(|| ProbeError::Malformed("sin audioStreams".to_string()))?;

    let candidates: Vec<(u64, String)> = streams
        .iter()
        .filter_map(|stream| {
            let url = stream.get("url").and_then(Value::as_str).filter(|u| !u.is_empty())?;
            let bitrate = stream
                .get("bitrate")
                .and_then(|b| b.as_u64().or_else(|| b.as_f64().map(|f| f.max(0.0) as u64)))
                .unwrap_or(0);
            Some((bitrate, url.to_string()))
        })
        .collect();

    let with_bitrate: Vec<(u64, String)> = candidates.iter().filter(|(b, _)| *b > 0).cloned().collect();
    let pool = if with_bitrate.is_empty() { candidates } else { with_bitrate };

    highest_bitrate(pool).ok_or_else(|| ProbeError::Malformed("audioStreams sin url".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn picks_highest_bitrate_stream() {
        let body = json!({
            "audioStreams": [
                {"url": "https://a/low", "bitrate": 48000},
                {"url": "https://a/high", "bitrate": 160000},
                {"url": "https://a/unknown"}
            ]
        });
        assert_eq!(best_audio_stream(&body).unwrap(), "https://a/high");
    }

    #[test]
    fn falls_back_to_streams_without_bitrate() {
        let body = json!({"audioStreams": [{"url": "https://a/only", "bitrate": 0}]});
        assert_eq!(best_audio_stream(&body).unwrap(), "https://a/only");
    }

    #[test]
    fn missing_fields_fail_the_instance() {
        assert!(best_audio_stream(&json!({"error": "rate limited"})).is_err());
        assert!(best_audio_stream(&json!({"audioStreams": []})).is_err());
        assert!(best_audio_stream(&json!({"audioStreams": [{"bitrate": 128000}]})).is_err());
    }
}
