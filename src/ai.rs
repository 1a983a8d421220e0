//! Provider-neutral view of the conversational AI: turns, errors, retry.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// How a provider call failed. Handlers pick the user-facing text from this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Network trouble, timeouts, 5xx, plain rate limiting. Worth retrying.
    Transient,
    /// The provider refused or garbled this particular request.
    InvalidRequest,
    /// Account-level refusal: exhausted quota, bad key, forbidden.
    QuotaExceeded,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuotaExceeded, message)
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Transient => write!(f, "transient error: {}", self.message),
            ErrorKind::InvalidRequest => write!(f, "invalid request: {}", self.message),
            ErrorKind::QuotaExceeded => write!(f, "quota exceeded: {}", self.message),
        }
    }
}

impl std::error::Error for Error {}

/// The three provider capabilities the bot uses.
pub trait Assistant: Send + Sync {
    /// Chat completion over the whole conversation.
    fn complete(&self, turns: &[Turn]) -> impl Future<Output = Result<String, Error>> + Send;

    /// Speech-to-text. `audio` is in whatever container the pipeline produced.
    fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> impl Future<Output = Result<String, Error>> + Send;

    /// Text-to-speech, returning OGG/Opus.
    fn synthesize(&self, text: &str) -> impl Future<Output = Result<Vec<u8>, Error>> + Send;
}

/// Bounded retry with exponential backoff for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 3, base_delay: Duration::from_secs(1) }
    }
}

impl RetryPolicy {
    /// Single attempt, no waiting.
    pub fn none() -> Self {
        Self { attempts: 1, base_delay: Duration::ZERO }
    }

    /// Delay before attempt `attempt + 1` (0-based).
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1 << attempt.min(16))
    }

    /// Run `op` until it succeeds, fails non-transiently, or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt + 1 < attempts => {
                    let delay = self.delay(attempt);
                    warn!("{what} failed (attempt {}/{attempts}): {e}; retrying in {delay:?}", attempt + 1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_from_transient() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { attempts: 3, base_delay: Duration::from_millis(100) };

        let result = policy
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::transient("timeout"))
                } else {
                    Ok("done")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { attempts: 3, base_delay: Duration::from_millis(10) };

        let result: Result<(), Error> = policy
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::transient("502"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind, ErrorKind::Transient);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_skips_non_transient() {
        let calls = AtomicU32::new(0);

        for error in [Error::invalid("bad"), Error::quota("insufficient_quota")] {
            calls.store(0, Ordering::SeqCst);
            let kind = error.kind;
            let result: Result<(), Error> = RetryPolicy::default()
                .run("test", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    let error = error.clone();
                    async move { Err(error) }
                })
                .await;
            assert_eq!(result.unwrap_err().kind, kind);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy { attempts: 4, base_delay: Duration::from_millis(250) };
        assert_eq!(policy.delay(0), Duration::from_millis(250));
        assert_eq!(policy.delay(1), Duration::from_millis(500));
        assert_eq!(policy.delay(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(Error::quota("no credits").to_string(), "quota exceeded: no credits");
        assert!(Error::transient("x").is_transient());
        assert!(!Error::invalid("x").is_transient());
    }
}
