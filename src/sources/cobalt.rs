use async_trait::async_trait;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use super::audio_url::{probe_instances, ProxyFamily, ResolvedAudio};
use crate::error::ProbeError;

/// Family B: Cobalt API, `POST /` with the YouTube URL.
///
/// Instances run different API versions, so each one is asked with the
/// current body shape first and the legacy one second. An HTTP error status
/// abandons the instance without trying the second shape.
pub struct CobaltFamily {
    client: reqwest::Client,
    instances: Vec<String>,
    timeout: Duration,
}

impl CobaltFamily {
    pub fn new(client: reqwest::Client, instances: Vec<String>, timeout: Duration) -> Self {
        Self {
            client,
            instances,
            timeout,
        }
    }

    async fn probe(&self, base: String, video_url: &str) -> Result<String, ProbeError> {
        first_usable(&base, video_url, |body| self.post(&base, body)).await
    }

    async fn post(&self, base: &str, body: Value) -> Result<Value, ProbeError> {
        let response = self.client.post(base).json(&body).send().await?;

        if !response.status().is_success() {
            return Err(ProbeError::Http(response.status()));
        }

        Ok(response.json().await?)
    }
}

/// Sends each body shape in turn. A reply without a usable stream moves on
/// to the next shape; a failed request abandons the instance.
async fn first_usable<F, Fut>(base: &str, video_url: &str, mut send: F) -> Result<String, ProbeError>
where
    F: FnMut(Value) -> Fut,
    Fut: Future<Output = Result<Value, ProbeError>>,
{
    let mut last_error = ProbeError::Malformed("sin respuesta".to_string());

    for body in request_bodies(video_url) {
        let data = send(body).await?;
        match stream_url(&data) {
            Ok(url) => return Ok(url),
            Err(e) => {
                debug!("Cobalt {}: {}", base, e);
                last_error = e;
            }
        }
    }

    Err(last_error)
}

#[async_trait]
impl ProxyFamily for CobaltFamily {
    fn name(&self) -> &'static str {
        "Cobalt"
    }

    async fn resolve(&self, video_id: &str) -> Option<ResolvedAudio> {
        let video_url = super::watch_url(video_id);
        probe_instances(self.name(), &self.instances, self.timeout, |base| {
            self.probe(base, &video_url)
        })
        .await
    }
}

fn request_bodies(video_url: &str) -> [Value; 2] {
    [
        json!({
            "url": video_url,
            "audioFormat": "opus",
            "downloadMode": "audio",
            "filenameStyle": "basic",
        }),
        json!({
            "url": video_url,
            "audioFormat": "opus",
            "isAudioOnly": true,
            "aFormat": "opus",
            "filenameStyle": "basic",
        }),
    ]
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty()).map(str::to_string)
}

/// Reads the stream URL out of any of the response variants.
fn stream_url(data: &Value) -> Result<String, ProbeError> {
    let status = data.get("status").and_then(Value::as_str).unwrap_or("");

    let url = match status {
        "tunnel" | "stream" | "redirect" => non_empty(data.get("url")),
        "picker" => data
            .pointer("/urls/0")
            .or_else(|| data.pointer("/picker/0"))
            .and_then(|first| non_empty(Some(first)).or_else(|| non_empty(first.get("url")))),
        "local-processing" => non_empty(data.pointer("/tunnel/0")),
        _ => None,
    };

    url.ok_or_else(|| {
        let code = data
            .pointer("/error/code")
            .or_else(|| data.pointer("/error/context"))
            .and_then(Value::as_str)
            .unwrap_or("?");
        ProbeError::Malformed(format!("status={} error={}", status, code))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;

    #[test]
    fn reads_every_response_variant() {
        for status in ["tunnel", "stream", "redirect"] {
            let data = json!({"status": status, "url": "https://c/audio"});
            assert_eq!(stream_url(&data).unwrap(), "https://c/audio");
        }

        let picker = json!({"status": "picker", "urls": ["https://c/first", "https://c/second"]});
        assert_eq!(stream_url(&picker).unwrap(), "https://c/first");

        let picker_objects = json!({"status": "picker", "picker": [{"url": "https://c/obj"}]});
        assert_eq!(stream_url(&picker_objects).unwrap(), "https://c/obj");

        let local = json!({"status": "local-processing", "tunnel": ["https://c/tunnel"]});
        assert_eq!(stream_url(&local).unwrap(), "https://c/tunnel");
    }

    #[test]
    fn error_responses_report_the_code() {
        let data = json!({"status": "error", "error": {"code": "error.api.youtube.login"}});
        let message = stream_url(&data).unwrap_err().to_string();
        assert!(message.contains("error.api.youtube.login"), "{}", message);

        assert!(stream_url(&json!({"status": "tunnel", "url": ""})).is_err());
    }

    async fn run(replies: Vec<Result<Value, ProbeError>>) -> (Result<String, ProbeError>, Vec<Value>) {
        let mut replies = VecDeque::from(replies);
        let mut sent = Vec::new();

        let outcome = first_usable("https://cobalt.example", "https://www.youtube.com/watch?v=x", |body| {
            sent.push(body);
            let reply = replies.pop_front().expect("una respuesta por envío");
            async move { reply }
        })
        .await;

        (outcome, sent)
    }

    #[tokio::test]
    async fn malformed_reply_tries_the_legacy_shape() {
        let (outcome, sent) = run(vec![
            Ok(json!({"status": "error", "error": {"code": "error.api.invalid_body"}})),
            Ok(json!({"status": "tunnel", "url": "https://c/legacy"})),
        ])
        .await;

        assert_eq!(outcome.unwrap(), "https://c/legacy");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1]["isAudioOnly"], true);
    }

    #[tokio::test]
    async fn http_error_abandons_the_instance() {
        let (outcome, sent) = run(vec![Err(ProbeError::Http(reqwest::StatusCode::TOO_MANY_REQUESTS))]).await;

        assert!(matches!(outcome, Err(ProbeError::Http(status)) if status.as_u16() == 429));
        assert_eq!(sent.len(), 1);
    }

    #[tokio::test]
    async fn both_shapes_malformed_reports_the_last_error() {
        let (outcome, sent) = run(vec![
            Ok(json!({"status": "error", "error": {"code": "first"}})),
            Ok(json!({"status": "error", "error": {"code": "second"}})),
        ])
        .await;

        let message = outcome.unwrap_err().to_string();
        assert!(message.contains("second"), "{}", message);
        assert_eq!(sent.len(), 2);
    }

    #[test]
    fn current_body_shape_goes_first() {
        let [current, legacy] = request_bodies("https://www.youtube.com/watch?v=x");
        assert_eq!(current["downloadMode"], "audio");
        assert_eq!(legacy["isAudioOnly"], true);
    }
}
