//! Picks the handler for an event given where the user currently is.

use teloxide::types::UserId;
use tracing::debug;

use crate::ai::Assistant;
use crate::bot::audio::VoiceClip;
use crate::bot::command::Command;
use crate::bot::handlers::{Context, gpt, quiz, random, start, talk, translate, voice};
use crate::bot::keyboard::CallbackData;
use crate::bot::reply::Reply;
use crate::bot::session::{QuizPhase, Session, TranslateState};

pub const UNSUPPORTED_ACTION: &str = "This action is not supported.";

/// One inbound update, stripped of Telegram specifics.
pub enum Event {
    Command(Command),
    Text(String),
    Voice(VoiceClip),
    Callback(CallbackData),
    /// Callback data we could not parse.
    UnknownCallback(String),
    /// Stickers, photos and anything else we do not handle.
    Unsupported,
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Command(c) => write!(f, "Command({c:?})"),
            Self::Text(t) => write!(f, "Text({} chars)", t.chars().count()),
            Self::Voice(clip) => write!(f, "Voice({}s)", clip.duration_secs),
            Self::Callback(data) => write!(f, "Callback({data:?})"),
            Self::UnknownCallback(data) => write!(f, "UnknownCallback({data:?})"),
            Self::Unsupported => write!(f, "Unsupported"),
        }
    }
}

/// Handle one event for `user`. The caller holds the user's session lock for
/// the whole call.
pub async fn dispatch<A: Assistant>(ctx: &Context<A>, user: UserId, session: &mut Session, event: Event) -> Reply {
    debug!("Dispatching {event:?} for {}", user.0);
    match event {
        Event::Command(command) => on_command(ctx, session, command).await,
        Event::Text(text) => on_text(ctx, session, &text).await,
        Event::Voice(clip) => match session {
            Session::Voice => voice::voice_note(ctx, user, clip).await,
            _ => voice::not_in_voice_mode(),
        },
        Event::Callback(data) => on_callback(ctx, session, data).await,
        Event::UnknownCallback(_) => Reply::alert(UNSUPPORTED_ACTION),
        Event::Unsupported => start::hint(),
    }
}

async fn on_command<A: Assistant>(ctx: &Context<A>, session: &mut Session, command: Command) -> Reply {
    match command {
        Command::Start => start::start(ctx, session).await,
        Command::Random => random::fact(ctx, session, true).await,
        Command::Gpt => gpt::enter(ctx, session).await,
        Command::Talk => talk::enter(ctx, session).await,
        Command::Quiz => quiz::enter(ctx, session).await,
        Command::Translate => translate::enter(ctx, session).await,
        Command::Voice => voice::enter(ctx, session).await,
    }
}

async fn on_text<A: Assistant>(ctx: &Context<A>, session: &mut Session, text: &str) -> Reply {
    match session {
        Session::Idle => start::hint(),
        Session::Gpt { .. } => gpt::ask(ctx, session, text).await,
        Session::ChoosingPersona => talk::not_chosen(),
        Session::Talk { .. } => talk::say(ctx, session, text).await,
        Session::Quiz(_) => quiz::answer(ctx, session, text).await,
        Session::Translate(_) => translate::translate(ctx, session, text).await,
        Session::Voice => voice::expects_voice(),
    }
}

async fn on_callback<A: Assistant>(ctx: &Context<A>, session: &mut Session, data: CallbackData) -> Reply {
    let in_quiz = matches!(session, Session::Quiz(_));
    let choosing_topic = matches!(session, Session::Quiz(q) if q.phase == QuizPhase::ChoosingTopic);
    let in_translator = matches!(session, Session::Translate(_));
    let choosing_language = matches!(session, Session::Translate(TranslateState::ChoosingLanguage));

    match data {
        CallbackData::Start => start::start(ctx, session).await,
        CallbackData::MoreFact => random::fact(ctx, session, false).await,
        CallbackData::EndGpt if matches!(session, Session::Gpt { .. }) => gpt::end(session),
        CallbackData::Persona(id) if matches!(session, Session::ChoosingPersona | Session::Talk { .. }) => {
            talk::choose(ctx, session, &id).await
        }
        CallbackData::Topic(id) if choosing_topic => quiz::choose_topic(ctx, session, &id).await,
        CallbackData::NextQuestion if in_quiz => quiz::next(ctx, session).await,
        CallbackData::ChangeTopic if in_quiz => quiz::change_topic(session),
        CallbackData::EndQuiz if in_quiz => quiz::end(session),
        CallbackData::Language(code) if choosing_language => translate::choose_language(ctx, session, &code),
        CallbackData::ChangeLanguage if in_translator => translate::change_language(session),
        CallbackData::EndTranslate if in_translator => translate::end(session),
        CallbackData::EndVoice if matches!(session, Session::Voice) => voice::end(session),
        // A button from an older message whose flow is no longer active
        _ => Reply::alert(UNSUPPORTED_ACTION),
    }
}
