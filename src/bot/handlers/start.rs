use crate::ai::Assistant;
use crate::bot::handlers::Context;
use crate::bot::keyboard::Menu;
use crate::bot::reply::Reply;
use crate::bot::session::Session;

const GREETING: &str = "Hi! I am a bot powered by ChatGPT. Pick what you want to do from the menu below.";

/// `/start` and every "back to menu" button. Drops whatever flow was running.
pub async fn start<A: Assistant>(ctx: &Context<A>, session: &mut Session) -> Reply {
    *session = Session::Idle;

    let text = ctx.resources.message_or("main", GREETING).await;
    ctx.illustrated("main", text, Menu::Main)
}

/// Anything we have no flow for.
pub fn hint() -> Reply {
    Reply::with_menu(
        "I did not get that. Pick a command from the menu or send /start.",
        Menu::Main,
    )
}
