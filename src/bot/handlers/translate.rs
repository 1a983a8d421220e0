use tracing::info;

use crate::ai::{Assistant, Turn};
use crate::bot::handlers::{Context, upstream_failure};
use crate::bot::keyboard::Menu;
use crate::bot::reply::Reply;
use crate::bot::session::{Session, TranslateState};

const CHOOSE_LANGUAGE: &str = "Choose the language to translate into:";

pub fn prompt(language: &str, text: &str) -> String {
    format!("Translate the following text into {language}. Reply with the translation only:\n\n{text}")
}

pub async fn enter<A: Assistant>(ctx: &Context<A>, session: &mut Session) -> Reply {
    *session = Session::Translate(TranslateState::ChoosingLanguage);

    let text = ctx.resources.message_or("translate", CHOOSE_LANGUAGE).await;
    ctx.illustrated("translate", text, Menu::Languages)
}

pub fn choose_language<A: Assistant>(ctx: &Context<A>, session: &mut Session, code: &str) -> Reply {
    let Some(language) = ctx.catalog.language(code) else {
        return Reply::with_menu("This language is not available. Pick another one.", Menu::Languages);
    };
    info!("Translation language selected: {}", language.code);
    *session = Session::Translate(TranslateState::Translating { language: language.code.clone() });
    Reply::with_menu(
        format!("Language: {}. Send the text to translate:", language.label),
        Menu::TranslatorControl,
    )
}

/// Every message is sent to the model; identical texts are not cached.
pub async fn translate<A: Assistant>(ctx: &Context<A>, session: &mut Session, text: &str) -> Reply {
    let Session::Translate(TranslateState::Translating { language: code }) = session else {
        return Reply::with_menu(CHOOSE_LANGUAGE, Menu::Languages);
    };
    let Some(language) = ctx.catalog.language(code) else {
        *session = Session::Translate(TranslateState::ChoosingLanguage);
        return Reply::with_menu(CHOOSE_LANGUAGE, Menu::Languages);
    };

    match ctx.assistant.complete(&[Turn::user(prompt(&language.label, text))]).await {
        Ok(translation) => Reply::with_menu(
            format!("Translation ({}):\n\n{}", language.label, translation.trim()),
            Menu::TranslatorControl,
        ),
        Err(e) => upstream_failure("Translation", &e, Menu::TranslatorControl),
    }
}

pub fn change_language(session: &mut Session) -> Reply {
    *session = Session::Translate(TranslateState::ChoosingLanguage);
    Reply::with_menu(CHOOSE_LANGUAGE, Menu::Languages)
}

pub fn end(session: &mut Session) -> Reply {
    *session = Session::Idle;
    Reply::with_menu(
        "Translator closed. Send /translate to use it again or /start for the main menu.",
        Menu::Main,
    )
}
