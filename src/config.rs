use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai::RetryPolicy;

/// Settings file used when no path is passed on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "gptbot.json";

/// Environment variable holding the Telegram bot token.
pub const ENV_BOT_TOKEN: &str = "TOKEN";
/// Environment variable holding the AI provider key.
pub const ENV_API_KEY: &str = "GPT_TOKEN";
/// Environment variable holding the optional proxy URL.
pub const ENV_PROXY: &str = "PROXY";

/// Telegram rejects callback data longer than this many bytes.
const MAX_CALLBACK_DATA: usize = 64;

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::Validation(_) => None,
        }
    }
}

/// A persona the user can talk to. Its prompt lives in `prompts/talk_<id>.txt`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
}

/// A translation target. `code` is what goes into callback data and the prompt.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Language {
    pub label: String,
    pub code: String,
}

/// A quiz topic. `subject` is the phrase used when asking the model for a question.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Topic {
    pub id: String,
    pub label: String,
    pub subject: String,
}

/// Everything the menus offer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub personas: Vec<Persona>,
    pub languages: Vec<Language>,
    pub topics: Vec<Topic>,
}

impl Catalog {
    pub fn persona(&self, id: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.id == id)
    }

    pub fn language(&self, code: &str) -> Option<&Language> {
        self.languages.iter().find(|l| l.code == code)
    }

    pub fn topic(&self, id: &str) -> Option<&Topic> {
        self.topics.iter().find(|t| t.id == id)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let persona = |id: &str, name: &str| Persona { id: id.into(), name: name.into() };
        let language = |label: &str, code: &str| Language { label: label.into(), code: code.into() };
        let topic = |id: &str, label: &str, subject: &str| Topic {
            id: id.into(),
            label: label.into(),
            subject: subject.into(),
        };

        Self {
            personas: vec![
                persona("cobain", "Kurt Cobain"),
                persona("hawking", "Professor Stephen Hawking"),
                persona("nietzsche", "Friedrich Nietzsche"),
                persona("queen", "Queen Elizabeth II"),
                persona("tolkien", "J.R.R. Tolkien"),
            ],
            languages: vec![
                language("English", "english"),
                language("French", "french"),
                language("German", "german"),
                language("Spanish", "spanish"),
                language("Chinese", "chinese"),
                language("Japanese", "japanese"),
                language("Russian", "russian"),
                language("Korean", "korean"),
            ],
            topics: vec![
                topic("prog", "🐍 Programming (Python)", "programming in Python"),
                topic(
                    "math",
                    "∫ Mathematics",
                    "mathematical theories (algorithms, set theory, calculus)",
                ),
                topic("biology", "🧬 Biology", "biology"),
            ],
        }
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct ConfigFile {
    /// Overridden by `TOKEN`.
    telegram_bot_token: String,
    /// Overridden by `GPT_TOKEN`.
    openai_api_key: String,
    /// Overridden by `PROXY`.
    proxy: Option<String>,
    api_base_url: String,
    chat_model: String,
    transcription_model: String,
    speech_model: String,
    speech_voice: String,
    speech_instructions: String,
    request_timeout_secs: u64,
    retry_attempts: u32,
    retry_delay_ms: u64,
    voice_rate_limit: u32,
    voice_rate_window_secs: u64,
    max_voice_duration_secs: u32,
    /// Path to ffmpeg. Set `transcode_voice` to false to send Telegram's OGG as-is.
    ffmpeg_path: String,
    transcode_voice: bool,
    /// Sessions untouched this long are dropped, whatever flow they were in.
    session_ttl_secs: u64,
    resources_dir: String,
    log_dir: String,
    personas: Option<Vec<Persona>>,
    languages: Option<Vec<Language>>,
    quiz_topics: Option<Vec<Topic>>,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            telegram_bot_token: String::new(),
            openai_api_key: String::new(),
            proxy: None,
            api_base_url: "https://api.openai.com/v1".into(),
            chat_model: "gpt-4o-mini".into(),
            transcription_model: "whisper-1".into(),
            speech_model: "gpt-4o-mini-tts".into(),
            speech_voice: "nova".into(),
            speech_instructions: "Speak in a cheerful and positive tone.".into(),
            request_timeout_secs: 60,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            voice_rate_limit: 5,
            voice_rate_window_secs: 60,
            max_voice_duration_secs: 30,
            ffmpeg_path: "ffmpeg".into(),
            transcode_voice: true,
            session_ttl_secs: 24 * 60 * 60,
            resources_dir: "resources".into(),
            log_dir: "logs".into(),
            personas: None,
            languages: None,
            quiz_topics: None,
        }
    }
}

/// Settings for the AI provider client.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub proxy: Option<String>,
    pub chat_model: String,
    pub transcription_model: String,
    pub speech_model: String,
    pub speech_voice: String,
    pub speech_instructions: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Settings for the voice pipeline and its rate limiter.
#[derive(Debug, Clone)]
pub struct VoiceSettings {
    pub rate_limit: usize,
    pub rate_window: Duration,
    pub max_duration_secs: u32,
    /// `None` disables transcoding.
    pub ffmpeg: Option<PathBuf>,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub openai: OpenAiSettings,
    pub voice: VoiceSettings,
    pub session_ttl: Duration,
    /// Root of `messages/`, `prompts/` and `images/`.
    pub resources_dir: PathBuf,
    pub log_dir: PathBuf,
    pub catalog: Catalog,
}

impl Config {
    /// Load from the settings file (if any) and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_sources(path, |key| std::env::var(key).ok())
    }

    /// Load with an explicit environment lookup.
    ///
    /// An explicit `path` must exist. Without one, `gptbot.json` in the working
    /// directory is used when present and defaults otherwise.
    pub fn from_sources<F>(path: Option<&Path>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => read_file(path)?,
            None => {
                let default = Path::new(DEFAULT_CONFIG_PATH);
                if default.exists() {
                    read_file(default)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
        let telegram_bot_token = lookup(ENV_BOT_TOKEN).unwrap_or(file.telegram_bot_token);
        let api_key = lookup(ENV_API_KEY).unwrap_or(file.openai_api_key);
        let proxy = lookup(ENV_PROXY).or(file.proxy.filter(|p| !p.trim().is_empty()));

        if telegram_bot_token.is_empty() {
            return Err(ConfigError::Validation(format!(
                "telegram_bot_token is required (set {ENV_BOT_TOKEN})"
            )));
        }
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2 || token_parts[0].parse::<u64>().is_err() || token_parts[1].is_empty() {
            return Err(ConfigError::Validation(
                "telegram_bot_token appears invalid (expected format: 123456789:ABCdefGHI...)".into(),
            ));
        }
        if api_key.is_empty() {
            return Err(ConfigError::Validation(format!(
                "openai_api_key is required (set {ENV_API_KEY})"
            )));
        }
        if let Some(ref proxy) = proxy {
            validate_proxy(proxy)?;
        }
        if file.retry_attempts == 0 {
            return Err(ConfigError::Validation("retry_attempts must be at least 1".into()));
        }
        if file.session_ttl_secs == 0 {
            return Err(ConfigError::Validation("session_ttl_secs must be positive".into()));
        }
        if file.voice_rate_limit == 0 || file.voice_rate_window_secs == 0 {
            return Err(ConfigError::Validation(
                "voice_rate_limit and voice_rate_window_secs must be positive".into(),
            ));
        }

        let defaults = Catalog::default();
        let catalog = Catalog {
            personas: file.personas.unwrap_or(defaults.personas),
            languages: file.languages.unwrap_or(defaults.languages),
            topics: file.quiz_topics.unwrap_or(defaults.topics),
        };
        validate_catalog(&catalog)?;

        Ok(Self {
            telegram_bot_token,
            openai: OpenAiSettings {
                api_key,
                base_url: file.api_base_url.trim_end_matches('/').to_string(),
                proxy,
                chat_model: file.chat_model,
                transcription_model: file.transcription_model,
                speech_model: file.speech_model,
                speech_voice: file.speech_voice,
                speech_instructions: file.speech_instructions,
                timeout: Duration::from_secs(file.request_timeout_secs),
                retry: RetryPolicy {
                    attempts: file.retry_attempts,
                    base_delay: Duration::from_millis(file.retry_delay_ms),
                },
            },
            voice: VoiceSettings {
                rate_limit: file.voice_rate_limit as usize,
                rate_window: Duration::from_secs(file.voice_rate_window_secs),
                max_duration_secs: file.max_voice_duration_secs,
                ffmpeg: file.transcode_voice.then(|| PathBuf::from(file.ffmpeg_path)),
            },
            session_ttl: Duration::from_secs(file.session_ttl_secs),
            resources_dir: PathBuf::from(file.resources_dir),
            log_dir: PathBuf::from(file.log_dir),
            catalog,
        })
    }
}

fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::ReadFile { path: path.to_path_buf(), source: e })?;
    serde_json::from_str(&content)
        .map_err(|e| ConfigError::ParseJson { path: path.to_path_buf(), source: e })
}

fn validate_proxy(proxy: &str) -> Result<(), ConfigError> {
    let url = reqwest::Url::parse(proxy)
        .map_err(|e| ConfigError::Validation(format!("proxy '{proxy}' is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" | "socks5" | "socks5h" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "proxy scheme '{other}' is not supported (use http, https or socks5)"
        ))),
    }
}

fn validate_catalog(catalog: &Catalog) -> Result<(), ConfigError> {
    if catalog.personas.is_empty() || catalog.languages.is_empty() || catalog.topics.is_empty() {
        return Err(ConfigError::Validation(
            "personas, languages and quiz_topics must not be empty".into(),
        ));
    }

    let keys = catalog
        .personas
        .iter()
        .map(|p| ("persona", format!("talk_{}", p.id)))
        .chain(catalog.languages.iter().map(|l| ("language", format!("lang_{}", l.code))))
        .chain(catalog.topics.iter().map(|t| ("quiz topic", format!("quiz_{}", t.id))));

    for (what, data) in keys {
        if data.ends_with('_') || data.contains(char::is_whitespace) {
            return Err(ConfigError::Validation(format!("{what} id in '{data}' must be a non-empty word")));
        }
        if data.len() > MAX_CALLBACK_DATA {
            return Err(ConfigError::Validation(format!("{what} id in '{data}' is too long")));
        }
    }

    // "more" is reserved for the next-question button
    if catalog.topic("more").is_some() {
        return Err(ConfigError::Validation("quiz topic id 'more' is reserved".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn assert_err<T>(result: Result<T, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    const VALID_ENV: &[(&str, &str)] = &[
        ("TOKEN", "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"),
        ("GPT_TOKEN", "sk-test"),
    ];

    #[test]
    fn test_env_only_uses_defaults() {
        let file = write_config("{}");
        let config = Config::from_sources(Some(file.path()), env_of(VALID_ENV)).expect("should load");
        assert_eq!(config.openai.api_key, "sk-test");
        assert_eq!(config.openai.chat_model, "gpt-4o-mini");
        assert_eq!(config.openai.proxy, None);
        assert_eq!(config.voice.rate_limit, 5);
        assert_eq!(config.voice.rate_window, Duration::from_secs(60));
        assert_eq!(config.voice.max_duration_secs, 30);
        assert_eq!(config.voice.ffmpeg, Some(PathBuf::from("ffmpeg")));
        assert_eq!(config.session_ttl, Duration::from_secs(86400));
        assert_eq!(config.catalog, Catalog::default());
    }

    #[test]
    fn test_env_overrides_file() {
        let file = write_config(r#"{
            "telegram_bot_token": "1:file",
            "openai_api_key": "sk-file",
            "proxy": "http://file-proxy:3128"
        }"#);
        let env = env_of(&[
            ("TOKEN", "2:env"),
            ("GPT_TOKEN", "sk-env"),
            ("PROXY", "socks5://env-proxy:1080"),
        ]);
        let config = Config::from_sources(Some(file.path()), env).unwrap();
        assert_eq!(config.telegram_bot_token, "2:env");
        assert_eq!(config.openai.api_key, "sk-env");
        assert_eq!(config.openai.proxy.as_deref(), Some("socks5://env-proxy:1080"));
    }

    #[test]
    fn test_blank_env_falls_back_to_file() {
        let file = write_config(r#"{
            "telegram_bot_token": "1:file",
            "openai_api_key": "sk-file"
        }"#);
        let env = env_of(&[("TOKEN", ""), ("PROXY", "  ")]);
        let config = Config::from_sources(Some(file.path()), env).unwrap();
        assert_eq!(config.telegram_bot_token, "1:file");
        assert_eq!(config.openai.proxy, None);
    }

    #[test]
    fn test_tunables_from_file() {
        let file = write_config(r#"{
            "voice_rate_limit": 2,
            "voice_rate_window_secs": 10,
            "transcode_voice": false,
            "session_ttl_secs": 300,
            "api_base_url": "http://localhost:8080/v1/",
            "languages": [{"label": "Latin", "code": "latin"}]
        }"#);
        let config = Config::from_sources(Some(file.path()), env_of(VALID_ENV)).unwrap();
        assert_eq!(config.voice.rate_limit, 2);
        assert_eq!(config.voice.rate_window, Duration::from_secs(10));
        assert_eq!(config.voice.ffmpeg, None);
        assert_eq!(config.session_ttl, Duration::from_secs(300));
        assert_eq!(config.openai.base_url, "http://localhost:8080/v1");
        assert_eq!(config.catalog.languages.len(), 1);
        assert_eq!(config.catalog.language("latin").unwrap().label, "Latin");
        assert_eq!(config.catalog.personas, Catalog::default().personas);
    }

    #[test]
    fn test_missing_token() {
        let file = write_config("{}");
        let err = assert_err(Config::from_sources(Some(file.path()), env_of(&[("GPT_TOKEN", "k")])));
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("TOKEN"));
    }

    #[test]
    fn test_invalid_token_format() {
        let file = write_config("{}");
        for token in ["no_colon", "notanumber:ABC", "123456789:"] {
            let env = env_of(&[("TOKEN", token), ("GPT_TOKEN", "k")]);
            let err = assert_err(Config::from_sources(Some(file.path()), env));
            assert!(err.to_string().contains("invalid"), "token {token}");
        }
    }

    #[test]
    fn test_missing_api_key() {
        let file = write_config("{}");
        let err = assert_err(Config::from_sources(
            Some(file.path()),
            env_of(&[("TOKEN", "1:abc")]),
        ));
        assert!(err.to_string().contains("GPT_TOKEN"));
    }

    #[test]
    fn test_invalid_proxy() {
        let file = write_config("{}");
        let mut env: Vec<(&str, &str)> = VALID_ENV.to_vec();
        env.push(("PROXY", "not a url"));
        let err = assert_err(Config::from_sources(Some(file.path()), env_of(&env)));
        assert!(err.to_string().contains("proxy"));

        let mut env: Vec<(&str, &str)> = VALID_ENV.to_vec();
        env.push(("PROXY", "ftp://proxy:21"));
        let err = assert_err(Config::from_sources(Some(file.path()), env_of(&env)));
        assert!(err.to_string().contains("ftp"));
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let file = write_config(r#"{"voice_rate_limit": 0}"#);
        let err = assert_err(Config::from_sources(Some(file.path()), env_of(VALID_ENV)));
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_catalog_ids_validated() {
        let file = write_config(r#"{"personas": [{"id": "two words", "name": "X"}]}"#);
        let err = assert_err(Config::from_sources(Some(file.path()), env_of(VALID_ENV)));
        assert!(err.to_string().contains("talk_two words"));

        let file = write_config(r#"{"quiz_topics": []}"#);
        let err = assert_err(Config::from_sources(Some(file.path()), env_of(VALID_ENV)));
        assert!(err.to_string().contains("must not be empty"));

        let file = write_config(r#"{"quiz_topics": [{"id": "more", "label": "M", "subject": "m"}]}"#);
        let err = assert_err(Config::from_sources(Some(file.path()), env_of(VALID_ENV)));
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_file_not_found() {
        let err = assert_err(Config::from_sources(
            Some(Path::new("/nonexistent/path/gptbot.json")),
            env_of(VALID_ENV),
        ));
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_invalid_json() {
        let file = write_config("{ invalid json }");
        let err = assert_err(Config::from_sources(Some(file.path()), env_of(VALID_ENV)));
        assert!(matches!(err, ConfigError::ParseJson { .. }));
    }
}
