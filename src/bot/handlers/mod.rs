//! One module per command. Handlers take the user's session, talk to the
//! assistant, and return what to send. On upstream failure they leave the
//! session as it was.

pub mod gpt;
pub mod quiz;
pub mod random;
pub mod start;
pub mod talk;
pub mod translate;
pub mod voice;

use tracing::{error, warn};

use crate::ai::{self, Assistant, ErrorKind};
use crate::bot::audio::{AudioPipeline, Transcoder};
use crate::bot::keyboard::Menu;
use crate::bot::rate_limit::RateLimiter;
use crate::bot::reply::{Outbound, Reply};
use crate::bot::resources::Resources;
use crate::bot::telegram::MAX_CAPTION_CHARS;
use crate::config::{Catalog, Config};

/// Everything a handler may use besides the session.
pub struct Context<A> {
    pub assistant: A,
    pub resources: Resources,
    pub catalog: Catalog,
    pub limiter: RateLimiter,
    pub audio: AudioPipeline,
}

impl<A: Assistant> Context<A> {
    pub fn new(assistant: A, config: &Config) -> Self {
        let transcoder = match config.voice.ffmpeg {
            Some(ref ffmpeg) => Transcoder::ffmpeg(ffmpeg),
            None => Transcoder::passthrough(),
        };
        Self {
            assistant,
            resources: Resources::new(&config.resources_dir),
            catalog: config.catalog.clone(),
            limiter: RateLimiter::new(config.voice.rate_limit, config.voice.rate_window),
            audio: AudioPipeline::new(config.voice.max_duration_secs, transcoder),
        }
    }

    /// `text` under the named picture. The text rides as the caption when it
    /// fits and follows as its own message otherwise; without a picture it is
    /// sent alone.
    pub(crate) fn illustrated(&self, picture: &str, text: String, menu: Menu) -> Reply {
        let Some(path) = self.resources.image(picture) else {
            return Reply::with_menu(text, menu);
        };
        let items = if text.chars().count() <= MAX_CAPTION_CHARS {
            vec![Outbound::Photo { path, caption: Some(text), menu: Some(menu) }]
        } else {
            vec![Outbound::photo(path), Outbound::with_menu(text, menu)]
        };
        Reply { items, alert: None }
    }
}

pub(crate) const GENERIC_FAILURE: &str = "Something went wrong. Please try again.";
pub(crate) const SERVICE_UNAVAILABLE: &str =
    "The AI service is unavailable right now. Please try again later.";
pub(crate) const REQUEST_REJECTED: &str =
    "The AI service could not handle this request. Try rephrasing it.";

/// User-facing text for a failed provider call.
pub(crate) fn failure_text(e: &ai::Error) -> &'static str {
    match e.kind {
        ErrorKind::Transient => GENERIC_FAILURE,
        ErrorKind::InvalidRequest => REQUEST_REJECTED,
        ErrorKind::QuotaExceeded => SERVICE_UNAVAILABLE,
    }
}

/// Log a failed provider call and turn it into a reply.
pub(crate) fn upstream_failure(what: &str, e: &ai::Error, menu: Menu) -> Reply {
    match e.kind {
        ErrorKind::QuotaExceeded => error!("{what} failed: {e}"),
        _ => warn!("{what} failed: {e}"),
    }
    Reply::with_menu(failure_text(e), menu)
}
