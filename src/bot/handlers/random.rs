use tracing::error;

use crate::ai::{Assistant, Turn};
use crate::bot::handlers::{Context, GENERIC_FAILURE, upstream_failure};
use crate::bot::keyboard::Menu;
use crate::bot::reply::Reply;
use crate::bot::session::Session;

/// A fresh fact on every call. `with_picture` is set for the command and
/// cleared for the "one more" button. Whatever flow was running ends only
/// once a fact arrives.
pub async fn fact<A: Assistant>(ctx: &Context<A>, session: &mut Session, with_picture: bool) -> Reply {
    let prompt = match ctx.resources.prompt("random").await {
        Ok(prompt) => prompt,
        Err(e) => {
            error!("Random fact prompt missing: {e}");
            return Reply::with_menu(GENERIC_FAILURE, Menu::Main);
        }
    };

    let fact = match ctx.assistant.complete(&[Turn::user(&*prompt)]).await {
        Ok(fact) => fact,
        Err(e) => return upstream_failure("Random fact", &e, Menu::RandomFact),
    };
    *session = Session::Idle;

    if with_picture {
        ctx.illustrated("random", fact, Menu::RandomFact)
    } else {
        Reply::with_menu(fact, Menu::RandomFact)
    }
}
