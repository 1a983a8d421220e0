//! OpenAI-compatible HTTP client: chat completions, transcription, speech.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ai::{Assistant, Error, ErrorKind, RetryPolicy, Turn};
use crate::config::OpenAiSettings;

pub struct Client {
    settings: OpenAiSettings,
    http: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    instructions: &'a str,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ApiError,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl Client {
    /// Build the client. The proxy, if any, applies to every request.
    pub fn new(settings: OpenAiSettings) -> Result<Self, Error> {
        let mut builder = reqwest::Client::builder().timeout(settings.timeout);
        if let Some(ref proxy) = settings.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| Error::invalid(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
            info!("AI requests go through proxy");
        }
        let http = builder
            .build()
            .map_err(|e| Error::invalid(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { settings, http })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url, path)
    }

    fn retry(&self) -> RetryPolicy {
        self.settings.retry
    }

    async fn try_complete(&self, turns: &[Turn]) -> Result<String, Error> {
        let request = ChatRequest {
            model: &self.settings.chat_model,
            messages: turns
                .iter()
                .map(|t| ApiMessage { role: t.role.as_str(), content: &t.content })
                .collect(),
        };

        let response = self
            .http
            .post(self.url("chat/completions"))
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(from_reqwest)?;
        let body = read_body(response).await?;

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| Error::invalid(format!("malformed completion response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| Error::invalid("empty completion"))
    }

    async fn try_transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, Error> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| Error::invalid(format!("bad audio mime type: {e}")))?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.settings.transcription_model.clone())
            .text("response_format", "text")
            .part("file", part);

        let response = self
            .http
            .post(self.url("audio/transcriptions"))
            .bearer_auth(&self.settings.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(from_reqwest)?;
        let body = read_body(response).await?;

        Ok(body.trim().to_string())
    }

    async fn try_synthesize(&self, text: &str) -> Result<Vec<u8>, Error> {
        let request = SpeechRequest {
            model: &self.settings.speech_model,
            voice: &self.settings.speech_voice,
            input: text,
            instructions: &self.settings.speech_instructions,
            // OGG/Opus, which Telegram plays as a voice note
            response_format: "opus",
        };

        let response = self
            .http
            .post(self.url("audio/speech"))
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let audio = response.bytes().await.map_err(from_reqwest)?;
        if audio.is_empty() {
            return Err(Error::invalid("empty speech response"));
        }
        Ok(audio.to_vec())
    }
}

impl Assistant for Client {
    async fn complete(&self, turns: &[Turn]) -> Result<String, Error> {
        debug!("Completion request with {} turn(s)", turns.len());
        let text = self.retry().run("chat completion", || self.try_complete(turns)).await?;
        debug!("Completion: \"{}\"", preview(&text, 100));
        Ok(text)
    }

    async fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> Result<String, Error> {
        debug!("Transcribing {} bytes ({file_name})", audio.len());
        let text = self
            .retry()
            .run("transcription", || self.try_transcribe(audio.clone(), file_name))
            .await?;
        info!("Transcribed: \"{}\"", preview(&text, 100));
        Ok(text)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, Error> {
        info!("TTS: \"{}\"", preview(text, 50));
        let audio = self.retry().run("speech synthesis", || self.try_synthesize(text)).await?;
        debug!("Got {} bytes of speech", audio.len());
        Ok(audio)
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, Error> {
    let status = response.status();
    let body = response.text().await.map_err(from_reqwest)?;
    if !status.is_success() {
        return Err(status_error(status, &body));
    }
    Ok(body)
}

fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_decode() || e.is_builder() {
        Error::invalid(e.to_string())
    } else {
        Error::transient(e.to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> Error {
    let detail = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|env| env.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect());
    Error::new(classify_status(status, body), format!("{status}: {detail}"))
}

/// Map an unsuccessful HTTP response to an error kind.
pub fn classify_status(status: StatusCode, body: &str) -> ErrorKind {
    let reported = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|env| env.error);
    let quota_reported = reported.as_ref().is_some_and(|e| {
        e.code.as_deref() == Some("insufficient_quota") || e.kind.as_deref() == Some("insufficient_quota")
    });

    match status {
        StatusCode::TOO_MANY_REQUESTS if quota_reported => ErrorKind::QuotaExceeded,
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => ErrorKind::Transient,
        StatusCode::UNAUTHORIZED | StatusCode::PAYMENT_REQUIRED | StatusCode::FORBIDDEN => {
            ErrorKind::QuotaExceeded
        }
        s if s.is_server_error() => ErrorKind::Transient,
        _ if quota_reported => ErrorKind::QuotaExceeded,
        _ => ErrorKind::InvalidRequest,
    }
}

fn mime_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next() {
        Some("mp3") => "audio/mpeg",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn settings(proxy: Option<&str>) -> OpenAiSettings {
        OpenAiSettings {
            api_key: "sk-test".into(),
            base_url: "http://localhost:9".into(),
            proxy: proxy.map(String::from),
            chat_model: "gpt-4o-mini".into(),
            transcription_model: "whisper-1".into(),
            speech_model: "gpt-4o-mini-tts".into(),
            speech_voice: "nova".into(),
            speech_instructions: String::new(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
        }
    }

    #[test]
    fn test_classify_status() {
        let quota = r#"{"error": {"message": "You exceeded your current quota", "type": "insufficient_quota", "code": "insufficient_quota"}}"#;
        let limited = r#"{"error": {"message": "Rate limit reached", "type": "requests", "code": "rate_limit_exceeded"}}"#;

        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, quota), ErrorKind::QuotaExceeded);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS, limited), ErrorKind::Transient);
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED, ""), ErrorKind::QuotaExceeded);
        assert_eq!(classify_status(StatusCode::FORBIDDEN, ""), ErrorKind::QuotaExceeded);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY, "<html>"), ErrorKind::Transient);
        assert_eq!(classify_status(StatusCode::SERVICE_UNAVAILABLE, ""), ErrorKind::Transient);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST, "{}"), ErrorKind::InvalidRequest);
        assert_eq!(classify_status(StatusCode::NOT_FOUND, ""), ErrorKind::InvalidRequest);
    }

    #[test]
    fn test_status_error_uses_api_message() {
        let body = r#"{"error": {"message": "Invalid model", "type": "invalid_request_error"}}"#;
        let err = status_error(StatusCode::BAD_REQUEST, body);
        assert_eq!(err.kind, ErrorKind::InvalidRequest);
        assert!(err.message.contains("Invalid model"));
    }

    #[test]
    fn test_client_with_proxy() {
        assert!(Client::new(settings(Some("http://127.0.0.1:3128"))).is_ok());
        assert!(Client::new(settings(None)).is_ok());
    }

    #[test]
    fn test_url_join() {
        let client = Client::new(settings(None)).unwrap();
        assert_eq!(client.url("chat/completions"), "http://localhost:9/chat/completions");
    }

    #[test]
    fn test_mime_for() {
        assert_eq!(mime_for("voice.mp3"), "audio/mpeg");
        assert_eq!(mime_for("voice.ogg"), "audio/ogg");
        assert_eq!(mime_for("voice"), "application/octet-stream");
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("hello", 10), "hello");
        assert_eq!(preview("привет мир", 6), "привет...");
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transient() {
        let client = Client::new(settings(None)).unwrap();
        let err = client.complete(&[Turn::user("hi")]).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Transient);
    }
}
