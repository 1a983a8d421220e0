use teloxide::types::UserId;
use tracing::{info, warn};

use crate::ai::{Assistant, Turn};
use crate::bot::audio::{AudioError, VoiceClip};
use crate::bot::handlers::{Context, failure_text, upstream_failure};
use crate::bot::keyboard::Menu;
use crate::bot::reply::{Outbound, Reply};
use crate::bot::session::Session;

pub async fn enter<A: Assistant>(ctx: &Context<A>, session: &mut Session) -> Reply {
    *session = Session::Voice;

    let fallback = format!(
        "Send me a voice message (up to {} seconds) and I will answer with my voice.",
        ctx.audio.max_duration_secs()
    );
    let text = ctx.resources.message_or("voice", &fallback).await;
    ctx.illustrated("voice", text, Menu::VoiceControl)
}

/// A voice note in voice mode.
///
/// The duration check runs before the rate limiter so that an over-long clip
/// neither downloads anything nor uses up the user's quota.
pub async fn voice_note<A: Assistant>(ctx: &Context<A>, user: UserId, clip: VoiceClip) -> Reply {
    if let Err(e) = ctx.audio.check_duration(clip.duration_secs) {
        info!("Rejected voice note from {}: {e}", user.0);
        return Reply::with_menu(
            format!(
                "That voice message is too long. The limit is {} seconds.",
                ctx.audio.max_duration_secs()
            ),
            Menu::VoiceControl,
        );
    }

    if !ctx.limiter.allow(user) {
        let wait = ctx.limiter.retry_after(user).as_secs().max(1);
        info!("Voice rate limit hit by {}, retry in {wait}s", user.0);
        return Reply::with_menu(
            format!(
                "Too many voice messages: at most {} per {} seconds. Try again in {wait} s.",
                ctx.limiter.limit(),
                ctx.limiter.window().as_secs()
            ),
            Menu::VoiceControl,
        );
    }

    let heard = match ctx.audio.speech_to_text(&ctx.assistant, clip).await {
        Ok(text) => text,
        Err(e) => return audio_failure(&e),
    };
    info!("Transcribed voice note from {} ({} chars)", user.0, heard.len());

    let mut reply = Reply::new();
    reply.push(Outbound::text(format!("You said: {heard}")));

    let answer = match ctx.assistant.complete(&[Turn::user(heard.as_str())]).await {
        Ok(answer) => answer,
        Err(e) => {
            let mut failed = upstream_failure("Voice answer", &e, Menu::VoiceControl);
            reply.items.append(&mut failed.items);
            return reply;
        }
    };

    match ctx.audio.text_to_speech(&ctx.assistant, &answer).await {
        Ok(audio) => {
            reply.push(Outbound::voice(audio, Menu::VoiceControl));
        }
        Err(e) => {
            warn!("Speech synthesis failed, sending text instead: {e}");
            reply.push(Outbound::with_menu(answer, Menu::VoiceControl));
        }
    }
    reply
}

fn audio_failure(e: &AudioError) -> Reply {
    let text = match e {
        AudioError::TooLong { max_secs, .. } => {
            format!("That voice message is too long. The limit is {max_secs} seconds.")
        }
        AudioError::Download(_) | AudioError::Transcode(_) => {
            warn!("Voice note processing failed: {e}");
            "Could not process the voice message. Please try again.".to_string()
        }
        AudioError::NoSpeech => "I could not make out any speech. Please try again.".to_string(),
        AudioError::Api(api) => {
            warn!("Transcription failed: {api}");
            failure_text(api).to_string()
        }
    };
    Reply::with_menu(text, Menu::VoiceControl)
}

/// A voice note outside voice mode.
pub fn not_in_voice_mode() -> Reply {
    Reply::with_menu("To chat by voice, send /voice first.", Menu::Main)
}

/// Text while in voice mode.
pub fn expects_voice() -> Reply {
    Reply::with_menu("In voice mode, please send a voice message.", Menu::VoiceControl)
}

pub fn end(session: &mut Session) -> Reply {
    *session = Session::Idle;
    Reply::with_menu(
        "Voice chat finished. Send /voice to start again or /start for the main menu.",
        Menu::Main,
    )
}
