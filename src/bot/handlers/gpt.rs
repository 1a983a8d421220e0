use crate::ai::{Assistant, Turn};
use crate::bot::handlers::{Context, start, upstream_failure};
use crate::bot::keyboard::Menu;
use crate::bot::reply::Reply;
use crate::bot::session::Session;

pub async fn enter<A: Assistant>(ctx: &Context<A>, session: &mut Session) -> Reply {
    *session = Session::Gpt { history: Vec::new() };

    let text = ctx.resources.message_or("gpt", "Ask ChatGPT anything:").await;
    ctx.illustrated("gpt", text, Menu::GptExit)
}

/// One turn of free chat. History only grows on success.
pub async fn ask<A: Assistant>(ctx: &Context<A>, session: &mut Session, text: &str) -> Reply {
    let Session::Gpt { history } = session else {
        return start::hint();
    };

    let mut turns = history.clone();
    turns.push(Turn::user(text));

    match ctx.assistant.complete(&turns).await {
        Ok(answer) => {
            turns.push(Turn::assistant(answer.as_str()));
            *history = turns;
            Reply::with_menu(answer, Menu::GptExit)
        }
        Err(e) => upstream_failure("Chat completion", &e, Menu::GptExit),
    }
}

pub fn end(session: &mut Session) -> Reply {
    *session = Session::Idle;
    Reply::with_menu(
        "Chat finished. Send /gpt to start a new one or /start for the main menu.",
        Menu::Main,
    )
}
