//! Voice pipeline: Telegram voice note → text, and text → voice note.
//!
//! Inbound clips are OGG/Opus. They are transcoded to MP3 with ffmpeg before
//! transcription; synthesis already returns OGG/Opus, which Telegram plays as
//! a voice note, so the outbound side needs no conversion.

use std::fmt;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::ai::{self, Assistant};

/// Lazily fetched clip bytes. Nothing is downloaded until it is awaited.
pub type Download = Pin<Box<dyn Future<Output = Result<Vec<u8>, String>> + Send>>;

/// An inbound voice note.
pub struct VoiceClip {
    pub duration_secs: u32,
    pub download: Download,
}

#[derive(Debug)]
pub enum AudioError {
    TooLong { duration_secs: u32, max_secs: u32 },
    Download(String),
    Transcode(String),
    /// Transcription came back empty.
    NoSpeech,
    Api(ai::Error),
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong { duration_secs, max_secs } => {
                write!(f, "clip is {duration_secs}s, limit is {max_secs}s")
            }
            Self::Download(e) => write!(f, "download failed: {e}"),
            Self::Transcode(e) => write!(f, "transcoding failed: {e}"),
            Self::NoSpeech => write!(f, "no speech recognised"),
            Self::Api(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for AudioError {}

impl From<ai::Error> for AudioError {
    fn from(e: ai::Error) -> Self {
        Self::Api(e)
    }
}

/// Converts Telegram's OGG/Opus into something the transcription endpoint takes.
#[derive(Debug, Clone)]
pub struct Transcoder {
    ffmpeg: Option<PathBuf>,
}

impl Transcoder {
    pub fn ffmpeg(path: impl Into<PathBuf>) -> Self {
        Self { ffmpeg: Some(path.into()) }
    }

    /// Hand the clip over unchanged.
    pub fn passthrough() -> Self {
        Self { ffmpeg: None }
    }

    /// Returns the converted bytes and a file name carrying the right extension.
    pub async fn convert(&self, ogg_data: &[u8]) -> Result<(Vec<u8>, &'static str), AudioError> {
        match self.ffmpeg {
            Some(ref ffmpeg) => {
                let mp3 = convert_ogg_to_mp3(ffmpeg, ogg_data).await.map_err(AudioError::Transcode)?;
                Ok((mp3, "voice.mp3"))
            }
            None => Ok((ogg_data.to_vec(), "voice.ogg")),
        }
    }
}

pub struct AudioPipeline {
    max_duration_secs: u32,
    transcoder: Transcoder,
}

impl AudioPipeline {
    pub fn new(max_duration_secs: u32, transcoder: Transcoder) -> Self {
        Self { max_duration_secs, transcoder }
    }

    pub fn max_duration_secs(&self) -> u32 {
        self.max_duration_secs
    }

    pub fn check_duration(&self, duration_secs: u32) -> Result<(), AudioError> {
        if duration_secs > self.max_duration_secs {
            return Err(AudioError::TooLong {
                duration_secs,
                max_secs: self.max_duration_secs,
            });
        }
        Ok(())
    }

    /// Download, transcode and transcribe a clip. Over-long clips are
    /// rejected before the download starts.
    pub async fn speech_to_text<A: Assistant>(&self, assistant: &A, clip: VoiceClip) -> Result<String, AudioError> {
        self.check_duration(clip.duration_secs)?;

        let ogg_data = clip.download.await.map_err(AudioError::Download)?;
        debug!("Downloaded voice clip ({} bytes, {}s)", ogg_data.len(), clip.duration_secs);

        let (audio, file_name) = self.transcoder.convert(&ogg_data).await?;
        let text = assistant.transcribe(audio, file_name).await?;

        if text.trim().is_empty() {
            return Err(AudioError::NoSpeech);
        }
        Ok(text)
    }

    pub async fn text_to_speech<A: Assistant>(&self, assistant: &A, text: &str) -> Result<Vec<u8>, AudioError> {
        let audio = assistant.synthesize(text).await?;
        info!("Generated {} bytes of voice audio", audio.len());
        Ok(audio)
    }
}

/// Convert OGG Opus audio to MP3 using ffmpeg.
async fn convert_ogg_to_mp3(ffmpeg: &Path, ogg_data: &[u8]) -> Result<Vec<u8>, String> {
    // ffmpeg needs seekable input for OGG, so go through a temp file
    let mut input = tempfile::Builder::new()
        .prefix("voice_")
        .suffix(".ogg")
        .tempfile()
        .map_err(|e| format!("Failed to create temp input: {e}"))?;
    input
        .write_all(ogg_data)
        .and_then(|_| input.flush())
        .map_err(|e| format!("Failed to write temp input: {e}"))?;

    let output = Command::new(ffmpeg)
        .arg("-i")
        .arg(input.path())
        .args(["-codec:a", "libmp3lame", "-q:a", "2", "-f", "mp3", "-y", "pipe:1"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("Failed to run {}: {e}", ffmpeg.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: String = stderr.lines().rev().take(3).collect::<Vec<_>>().join(" | ");
        warn!("ffmpeg exited with {}: {}", output.status, tail);
        return Err(format!("ffmpeg failed: {tail}"));
    }
    if output.stdout.is_empty() {
        return Err("ffmpeg produced no output".to_string());
    }

    debug!("Converted OGG ({} bytes) to MP3 ({} bytes)", ogg_data.len(), output.stdout.len());
    Ok(output.stdout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::FakeAssistant;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn tracked_download(bytes: &'static [u8], polled: Arc<AtomicBool>) -> Download {
        Box::pin(async move {
            polled.store(true, Ordering::SeqCst);
            Ok(bytes.to_vec())
        })
    }

    #[tokio::test]
    async fn test_too_long_clip_is_never_downloaded() {
        let pipeline = AudioPipeline::new(30, Transcoder::passthrough());
        let assistant = FakeAssistant::new();
        let polled = Arc::new(AtomicBool::new(false));

        let clip = VoiceClip { duration_secs: 45, download: tracked_download(b"ogg", polled.clone()) };
        let err = pipeline.speech_to_text(&assistant, clip).await.unwrap_err();

        assert!(matches!(err, AudioError::TooLong { duration_secs: 45, max_secs: 30 }));
        assert!(!polled.load(Ordering::SeqCst));
        assert_eq!(assistant.calls().transcribe, 0);
    }

    #[tokio::test]
    async fn test_passthrough_transcribes_ogg() {
        let pipeline = AudioPipeline::new(30, Transcoder::passthrough());
        let assistant = FakeAssistant::new().transcription("hello there");
        let polled = Arc::new(AtomicBool::new(false));

        let clip = VoiceClip { duration_secs: 30, download: tracked_download(b"ogg", polled.clone()) };
        let text = pipeline.speech_to_text(&assistant, clip).await.unwrap();

        assert_eq!(text, "hello there");
        assert!(polled.load(Ordering::SeqCst));
        assert_eq!(assistant.last_audio_name().as_deref(), Some("voice.ogg"));
    }

    #[tokio::test]
    async fn test_empty_transcription() {
        let pipeline = AudioPipeline::new(30, Transcoder::passthrough());
        let assistant = FakeAssistant::new().transcription("  ");
        let clip = VoiceClip { duration_secs: 3, download: Box::pin(async { Ok(vec![1, 2, 3]) }) };

        let err = pipeline.speech_to_text(&assistant, clip).await.unwrap_err();
        assert!(matches!(err, AudioError::NoSpeech));
    }

    #[tokio::test]
    async fn test_download_failure() {
        let pipeline = AudioPipeline::new(30, Transcoder::passthrough());
        let assistant = FakeAssistant::new();
        let clip = VoiceClip { duration_secs: 3, download: Box::pin(async { Err("gone".to_string()) }) };

        let err = pipeline.speech_to_text(&assistant, clip).await.unwrap_err();
        assert!(matches!(err, AudioError::Download(_)));
        assert_eq!(assistant.calls().transcribe, 0);
    }

    #[tokio::test]
    async fn test_missing_ffmpeg_is_recoverable() {
        let transcoder = Transcoder::ffmpeg("/nonexistent/ffmpeg");
        let err = transcoder.convert(b"not really ogg").await.unwrap_err();
        assert!(matches!(err, AudioError::Transcode(_)));
        assert!(err.to_string().contains("transcoding failed"));
    }
}
