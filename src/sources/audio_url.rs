//! Direct audio URL resolution.
//!
//! A video's audio stream is fetched through third-party proxies. Three
//! independent families are probed in a fixed order (Piped, then Cobalt,
//! then Invidious); inside a family every instance is tried in listed order
//! and the first usable answer wins. A probe never fails the whole
//! resolution: HTTP errors, timeouts and malformed bodies are logged and the
//! next instance is tried.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::cobalt::CobaltFamily;
use super::invidious::InvidiousFamily;
use super::piped::PipedFamily;
use crate::config::Config;
use crate::error::{PlaybackError, ProbeError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedAudio {
    pub url: String,
    pub family: &'static str,
    pub instance: String,
}

/// One family of interchangeable proxy instances.
#[async_trait]
pub trait ProxyFamily: Send + Sync {
    fn name(&self) -> &'static str;

    /// First usable stream URL across this family's instances.
    async fn resolve(&self, video_id: &str) -> Option<ResolvedAudio>;
}

/// Tries `probe` on each instance in order, each bounded by `timeout`.
pub async fn probe_instances<F, Fut>(
    family: &'static str,
    instances: &[String],
    timeout: Duration,
    mut probe: F,
) -> Option<ResolvedAudio>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<String, ProbeError>>,
{
    for instance in instances {
        let outcome = match tokio::time::timeout(timeout, probe(instance.clone())).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProbeError::Timeout(timeout)),
        };

        match outcome {
            Ok(url) => {
                info!("✅ {} OK: {}", family, instance);
                return Some(ResolvedAudio {
                    url,
                    family,
                    instance: instance.clone(),
                });
            }
            Err(e) => warn!("⚠️ {} {}: {}", family, instance, e),
        }
    }

    None
}

/// Picks the entry with the highest bitrate. The first one wins a tie.
pub(crate) fn highest_bitrate(candidates: impl IntoIterator<Item = (u64, String)>) -> Option<String> {
    let mut best: Option<(u64, String)> = None;
    for (bitrate, url) in candidates {
        if best.as_ref().map_or(true, |(top, _)| bitrate > *top) {
            best = Some((bitrate, url));
        }
    }
    best.map(|(_, url)| url)
}

/// Builds the HTTP client shared by every family.
pub(crate) fn http_client(user_agent: &str) -> Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .build()
        .context("Error creando cliente HTTP para proxies de audio")
}

pub struct AudioUrlResolver {
    families: Vec<Arc<dyn ProxyFamily>>,
}

impl AudioUrlResolver {
    pub fn new(config: &Config) -> Result<Self> {
        let client = http_client(&config.user_agent)?;

        Ok(Self::with_families(vec![
            Arc::new(PipedFamily::new(
                client.clone(),
                config.piped_instances.clone(),
                config.probe_timeout,
            )),
            Arc::new(CobaltFamily::new(
                client.clone(),
                config.cobalt_instances.clone(),
                config.probe_timeout,
            )),
            Arc::new(InvidiousFamily::new(
                client,
                config.invidious_instances.clone(),
                config.probe_timeout,
            )),
        ]))
    }

    pub fn with_families(families: Vec<Arc<dyn ProxyFamily>>) -> Self {
        Self { families }
    }

    /// Resolves a YouTube URL into a direct audio URL.
    pub async fn resolve(&self, video_url: &str) -> Result<ResolvedAudio, PlaybackError> {
        let video_id = super::extract_video_id(video_url)
            .ok_or_else(|| PlaybackError::InvalidUrl(video_url.to_string()))?;

        for family in &self.families {
            if let Some(resolved) = family.resolve(&video_id).await {
                info!("🎵 Reproduciendo vía {} ({})", resolved.family, resolved.instance);
                return Ok(resolved);
            }
        }

        error!("❌ Todas las fuentes fallaron para {}", video_id);
        Err(PlaybackError::ResolutionExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn instances(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_instance_falls_through_to_next_in_family() {
        let tried = Mutex::new(Vec::new());

        let resolved = probe_instances(
            "Piped",
            &instances(&["slow", "broken", "good"]),
            Duration::from_secs(18),
            |instance| {
                tried.lock().push(instance.clone());
                async move {
                    match instance.as_str() {
                        "slow" => {
                            tokio::time::sleep(Duration::from_secs(60)).await;
                            Ok("never".to_string())
                        }
                        "broken" => Err(ProbeError::Malformed("sin audioStreams".to_string())),
                        _ => Ok(format!("https://{}/audio", instance)),
                    }
                }
            },
        )
        .await
        .expect("resolved");

        assert_eq!(resolved.url, "https://good/audio");
        assert_eq!(resolved.instance, "good");
        assert_eq!(*tried.lock(), instances(&["slow", "broken", "good"]));
    }

    #[test]
    fn highest_bitrate_keeps_first_on_tie() {
        let picked = highest_bitrate(vec![
            (128, "a".to_string()),
            (160, "b".to_string()),
            (160, "c".to_string()),
        ]);
        assert_eq!(picked.as_deref(), Some("b"));
        assert_eq!(highest_bitrate(Vec::new()), None);
    }

    struct FakeFamily {
        name: &'static str,
        answer: Option<&'static str>,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl ProxyFamily for FakeFamily {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn resolve(&self, _video_id: &str) -> Option<ResolvedAudio> {
            self.calls.lock().push(self.name);
            self.answer.map(|url| ResolvedAudio {
                url: url.to_string(),
                family: self.name,
                instance: "fake".to_string(),
            })
        }
    }

    fn resolver(answers: [Option<&'static str>; 3], calls: &Arc<Mutex<Vec<&'static str>>>) -> AudioUrlResolver {
        let names = ["Piped", "Cobalt", "Invidious"];
        AudioUrlResolver::with_families(
            names
                .iter()
                .zip(answers)
                .map(|(name, answer)| {
                    Arc::new(FakeFamily {
                        name: *name,
                        answer,
                        calls: calls.clone(),
                    }) as Arc<dyn ProxyFamily>
                })
                .collect(),
        )
    }

    #[tokio::test]
    async fn families_are_tried_in_fixed_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let resolved = resolver([None, None, Some("https://inv/audio")], &calls)
            .resolve("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .unwrap();

        assert_eq!(resolved.family, "Invidious");
        assert_eq!(*calls.lock(), vec!["Piped", "Cobalt", "Invidious"]);
    }

    #[tokio::test]
    async fn earlier_family_success_stops_the_search() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let resolved = resolver([None, Some("https://cobalt/audio"), Some("x")], &calls)
            .resolve("https://youtu.be/dQw4w9WgXcQ")
            .await
            .unwrap();

        assert_eq!(resolved.url, "https://cobalt/audio");
        assert_eq!(*calls.lock(), vec!["Piped", "Cobalt"]);
    }

    #[tokio::test]
    async fn exhaustion_and_bad_urls_are_typed_errors() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let resolver = resolver([None, None, None], &calls);

        assert!(matches!(
            resolver.resolve("https://youtu.be/dQw4w9WgXcQ").await,
            Err(PlaybackError::ResolutionExhausted)
        ));
        assert!(matches!(
            resolver.resolve("https://example.com/nope").await,
            Err(PlaybackError::InvalidUrl(_))
        ));
    }
}
